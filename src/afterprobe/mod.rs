//! Post analysis over a finished probe phase
//!
//! AfterProbes derive secondary verdicts from the accumulated evidence.
//! They run sequentially, in registration order, with exclusive access to
//! the report once every probe is terminal.

use crate::config::ScannerDetail;
use crate::probe::{AnalyzedProperty, PropertyValue};
use crate::report::ReportData;
use crate::requirement::Requirement;
use log::{debug, error, info};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

pub mod oracle;

pub use oracle::ResponseOracleAfterProbe;

/// Analysis step that runs after all probes
///
/// `analyze` must be idempotent: running it twice leaves the report as
/// running it once did.
pub trait AfterProbe: Send + Sync {
    fn name(&self) -> &str;

    /// Properties the analysis looks at
    fn reads(&self) -> Vec<AnalyzedProperty> {
        Vec::new()
    }

    /// Derived properties the analysis may write
    fn writes(&self) -> Vec<AnalyzedProperty>;

    /// Minimum post analysis detail this AfterProbe runs at
    fn detail(&self) -> ScannerDetail {
        ScannerDetail::Normal
    }

    fn analyze(&self, report: &mut ReportData) -> anyhow::Result<()>;
}

/// What the pipeline did with each AfterProbe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub applied: Vec<String>,
    /// Name and error message
    pub failed: Vec<(String, String)>,
    pub skipped: Vec<String>,
}

/// Ordered AfterProbes of one scan
#[derive(Default, Clone)]
pub struct AfterProbePipeline {
    after_probes: Vec<Arc<dyn AfterProbe>>,
}

impl AfterProbePipeline {
    pub fn new(after_probes: Vec<Arc<dyn AfterProbe>>) -> Self {
        Self { after_probes }
    }

    pub fn push(&mut self, after_probe: Arc<dyn AfterProbe>) {
        self.after_probes.push(after_probe);
    }

    pub fn len(&self) -> usize {
        self.after_probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.after_probes.is_empty()
    }

    /// Run every AfterProbe allowed at `detail` against `report`
    ///
    /// Each one works on a copy that is committed only on success. A failed
    /// or panicking AfterProbe leaves the report untouched apart from its
    /// declared writes that are still unset, which become `ErrorDuringProbe`.
    pub fn run(&self, report: &mut ReportData, detail: ScannerDetail) -> PipelineSummary {
        let mut summary = PipelineSummary::default();

        for after_probe in &self.after_probes {
            let name = after_probe.name().to_string();
            if !detail.is_greater_equal_to(after_probe.detail()) {
                debug!("Skipping AfterProbe {} below detail {:?}", name, detail);
                summary.skipped.push(name);
                continue;
            }

            for property in after_probe.reads() {
                if !report.value(&property).is_terminal() {
                    debug!("AfterProbe {} reads unset property {}", name, property);
                }
            }

            let mut working = report.clone();
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| after_probe.analyze(&mut working)));

            let message = match outcome {
                Ok(Ok(())) => {
                    *report = working;
                    debug!("AfterProbe {} applied", name);
                    summary.applied.push(name);
                    continue;
                }
                Ok(Err(e)) => format!("{:#}", e),
                Err(payload) => payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic".to_string()),
            };

            error!("AfterProbe {} failed: {}", name, message);
            for property in after_probe.writes() {
                if !report.value(&property).is_terminal() {
                    report.put_derived(property, PropertyValue::ErrorDuringProbe);
                }
            }
            summary.failed.push((name, message));
        }

        info!(
            "Post analysis: {} applied, {} failed, {} skipped",
            summary.applied.len(),
            summary.failed.len(),
            summary.skipped.len()
        );
        summary
    }
}

/// Writes a boolean verdict derived from a requirement over the report
///
/// When a property the requirement reads is unknown or errored, the
/// verdict is `CouldNotTest` instead of a guess.
pub struct DerivedPropertyAfterProbe {
    name: String,
    property: AnalyzedProperty,
    requirement: Requirement,
    detail: ScannerDetail,
}

impl DerivedPropertyAfterProbe {
    pub fn new(
        name: impl Into<String>,
        property: AnalyzedProperty,
        requirement: Requirement,
    ) -> Self {
        Self {
            name: name.into(),
            property,
            requirement,
            detail: ScannerDetail::Normal,
        }
    }

    pub fn with_detail(mut self, detail: ScannerDetail) -> Self {
        self.detail = detail;
        self
    }
}

impl AfterProbe for DerivedPropertyAfterProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn reads(&self) -> Vec<AnalyzedProperty> {
        self.requirement.referenced_properties().into_iter().collect()
    }

    fn writes(&self) -> Vec<AnalyzedProperty> {
        vec![self.property.clone()]
    }

    fn detail(&self) -> ScannerDetail {
        self.detail
    }

    fn analyze(&self, report: &mut ReportData) -> anyhow::Result<()> {
        let undetermined = self.reads().iter().any(|p| {
            matches!(
                report.value(p),
                PropertyValue::Unset | PropertyValue::ErrorDuringProbe | PropertyValue::CouldNotTest
            )
        });

        let verdict = if undetermined {
            PropertyValue::CouldNotTest
        } else {
            PropertyValue::from_bool(self.requirement.evaluate(report))
        };
        report.put_derived(self.property.clone(), verdict);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeId, PropertyCategory};

    fn property(name: &str) -> AnalyzedProperty {
        AnalyzedProperty::new(name, PropertyCategory::new("test"))
    }

    struct Failing;

    impl AfterProbe for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn writes(&self) -> Vec<AnalyzedProperty> {
            vec![property("DERIVED"), property("ALREADY_SET")]
        }

        fn analyze(&self, report: &mut ReportData) -> anyhow::Result<()> {
            report.put_derived(property("HALF_WRITTEN"), PropertyValue::True);
            anyhow::bail!("missing evidence")
        }
    }

    struct Panicking;

    impl AfterProbe for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn writes(&self) -> Vec<AnalyzedProperty> {
            vec![property("PANIC_DERIVED")]
        }

        fn analyze(&self, _report: &mut ReportData) -> anyhow::Result<()> {
            panic!("index out of bounds")
        }
    }

    #[test]
    fn test_failed_after_probe_is_contained() {
        let mut report = ReportData::new();
        report.put_result(property("ALREADY_SET"), PropertyValue::False, &ProbeId::new("p"));

        let derived = DerivedPropertyAfterProbe::new(
            "derived",
            property("VULNERABLE"),
            Requirement::property_false([property("ALREADY_SET")]),
        );
        let pipeline = AfterProbePipeline::new(vec![
            Arc::new(Failing),
            Arc::new(Panicking),
            Arc::new(derived),
        ]);

        let summary = pipeline.run(&mut report, ScannerDetail::Normal);

        assert_eq!(summary.applied, vec!["derived".to_string()]);
        assert_eq!(summary.failed.len(), 2);
        assert_eq!(summary.failed[0], ("failing".to_string(), "missing evidence".to_string()));
        assert_eq!(summary.failed[1].1, "index out of bounds");

        assert_eq!(report.value(&property("HALF_WRITTEN")), &PropertyValue::Unset);
        assert_eq!(report.value(&property("DERIVED")), &PropertyValue::ErrorDuringProbe);
        assert_eq!(report.value(&property("ALREADY_SET")), &PropertyValue::False);
        assert_eq!(report.value(&property("PANIC_DERIVED")), &PropertyValue::ErrorDuringProbe);
        assert_eq!(report.value(&property("VULNERABLE")), &PropertyValue::True);
    }

    #[test]
    fn test_detail_gate() {
        let mut report = ReportData::new();
        let detailed =
            DerivedPropertyAfterProbe::new("detailed", property("X"), Requirement::AlwaysTrue)
                .with_detail(ScannerDetail::Detailed);
        let pipeline = AfterProbePipeline::new(vec![Arc::new(detailed)]);

        let summary = pipeline.run(&mut report, ScannerDetail::Normal);
        assert_eq!(summary.skipped, vec!["detailed".to_string()]);
        assert_eq!(report.value(&property("X")), &PropertyValue::Unset);

        let summary = pipeline.run(&mut report, ScannerDetail::All);
        assert_eq!(summary.applied.len(), 1);
        assert_eq!(report.value(&property("X")), &PropertyValue::True);
    }

    #[test]
    fn test_derived_property_is_undetermined_without_evidence() {
        let mut report = ReportData::new();
        report.put_result(property("CBC"), PropertyValue::ErrorDuringProbe, &ProbeId::new("p"));

        let after_probe = DerivedPropertyAfterProbe::new(
            "padding_oracle_verdict",
            property("PADDING_ORACLE"),
            Requirement::property_true([property("CBC")])
                .and(!Requirement::property_true([property("PATCHED")])),
        );
        after_probe.analyze(&mut report).unwrap();
        assert_eq!(report.value(&property("PADDING_ORACLE")), &PropertyValue::CouldNotTest);
    }
}
