//! Response oracle detection
//!
//! A probe that provokes the target with variations of the same input
//! stores the resulting response vectors. If the target answers the
//! variations differently, the difference is an oracle an attacker can
//! query. This AfterProbe turns the stored vectors into a verdict.
//!
//! On noisy targets a probe repeats its measurements and the AfterProbe
//! can be told to require a statistically significant divergence before
//! reporting an oracle.

use super::AfterProbe;
use crate::config::ScannerDetail;
use crate::probe::{AnalyzedProperty, ProbeId, PropertyValue};
use crate::report::ReportData;
use crate::vector::{pairwise, DistributionTest, ReductionPolicy};
use log::debug;

/// Noise model for the significance check
#[derive(Debug, Clone, Copy, PartialEq)]
struct Significance {
    noise_probability: f64,
    alpha: f64,
}

pub struct ResponseOracleAfterProbe {
    name: String,
    source: ProbeId,
    verdict: AnalyzedProperty,
    divergence: AnalyzedProperty,
    policy: ReductionPolicy,
    significance: Option<Significance>,
    detail: ScannerDetail,
}

impl ResponseOracleAfterProbe {
    /// `verdict` becomes `True` when the vectors stored by `source`
    /// diverge; `divergence` carries the divergence kind as text
    pub fn new(
        name: impl Into<String>,
        source: impl Into<ProbeId>,
        verdict: AnalyzedProperty,
        divergence: AnalyzedProperty,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            verdict,
            divergence,
            policy: ReductionPolicy::default(),
            significance: None,
            detail: ScannerDetail::Normal,
        }
    }

    pub fn with_policy(mut self, policy: ReductionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Only report an oracle when the distribution of distinct responses
    /// deviates from `noise_probability` with a p-value below `alpha`
    pub fn with_significance(mut self, noise_probability: f64, alpha: f64) -> Self {
        self.significance = Some(Significance {
            noise_probability,
            alpha,
        });
        self
    }

    pub fn with_detail(mut self, detail: ScannerDetail) -> Self {
        self.detail = detail;
        self
    }
}

impl AfterProbe for ResponseOracleAfterProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn writes(&self) -> Vec<AnalyzedProperty> {
        vec![self.verdict.clone(), self.divergence.clone()]
    }

    fn detail(&self) -> ScannerDetail {
        self.detail
    }

    fn analyze(&self, report: &mut ReportData) -> anyhow::Result<()> {
        let vectors = report.vectors(&self.source);
        if vectors.len() < 2 {
            debug!(
                "{}: {} vectors from {} are not enough to compare",
                self.name,
                vectors.len(),
                self.source
            );
            report.put_derived(self.verdict.clone(), PropertyValue::CouldNotTest);
            report.put_derived(self.divergence.clone(), PropertyValue::CouldNotTest);
            return Ok(());
        }

        let divergences = pairwise(vectors)?;
        let kind = self.policy.reduce(&divergences);
        debug!(
            "{}: {} pairs from {} reduce to {}",
            self.name,
            divergences.len(),
            self.source,
            kind
        );

        let mut oracle = kind.is_divergence();
        if let Some(significance) = self.significance.filter(|_| oracle) {
            let test = DistributionTest::new(vectors, significance.noise_probability);
            let p_value = test.p_value();
            oracle = p_value < significance.alpha;
            debug!(
                "{}: {} distinct responses, p-value {:.5} against alpha {}",
                self.name,
                test.distinct_responses().len(),
                p_value,
                significance.alpha
            );
        }

        report.put_derived(self.verdict.clone(), PropertyValue::from_bool(oracle));
        report.put_derived(
            self.divergence.clone(),
            PropertyValue::Text(kind.as_str().to_string()),
        );
        Ok(())
    }
}
