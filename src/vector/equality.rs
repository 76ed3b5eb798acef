//! Response equality analysis
//!
//! Two vectors are compared dimension by dimension in the order of
//! [`EqualityError::ALL`]; the first dimension that differs is the result.
//! The ordering decides which divergence an oracle reports and is therefore
//! part of the contract, not an implementation detail.

use super::ResponseVector;
use crate::error::ComparisonError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// First point at which two response vectors diverge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum EqualityError {
    None = 0,
    SocketState = 1,
    MessageCount = 2,
    RecordCount = 3,
    RecordClass = 4,
    MessageClass = 5,
    MessageContent = 6,
    RecordContentType = 7,
    RecordLength = 8,
    RecordVersion = 9,
    RecordContent = 10,
}

impl EqualityError {
    /// Every kind, in check order
    pub const ALL: [EqualityError; 11] = [
        EqualityError::None,
        EqualityError::SocketState,
        EqualityError::MessageCount,
        EqualityError::RecordCount,
        EqualityError::RecordClass,
        EqualityError::MessageClass,
        EqualityError::MessageContent,
        EqualityError::RecordContentType,
        EqualityError::RecordLength,
        EqualityError::RecordVersion,
        EqualityError::RecordContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EqualityError::None => "NONE",
            EqualityError::SocketState => "SOCKET_STATE",
            EqualityError::MessageCount => "MESSAGE_COUNT",
            EqualityError::RecordCount => "RECORD_COUNT",
            EqualityError::RecordClass => "RECORD_CLASS",
            EqualityError::MessageClass => "MESSAGE_CLASS",
            EqualityError::MessageContent => "MESSAGE_CONTENT",
            EqualityError::RecordContentType => "RECORD_CONTENT_TYPE",
            EqualityError::RecordLength => "RECORD_LENGTH",
            EqualityError::RecordVersion => "RECORD_VERSION",
            EqualityError::RecordContent => "RECORD_CONTENT",
        }
    }

    pub fn is_divergence(&self) -> bool {
        *self != EqualityError::None
    }

    /// Whether `self` is an earlier, more visible divergence than `other`
    ///
    /// `None` is coarser than nothing and everything is coarser than `None`.
    pub fn is_coarser_than(&self, other: EqualityError) -> bool {
        match (self, other) {
            (EqualityError::None, _) => false,
            (_, EqualityError::None) => true,
            (a, b) => (*a as u8) < (b as u8),
        }
    }
}

impl fmt::Display for EqualityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn first_divergence(a: &ResponseVector, b: &ResponseVector) -> EqualityError {
    if a.socket_state != b.socket_state {
        return EqualityError::SocketState;
    }
    if a.messages.len() != b.messages.len() {
        return EqualityError::MessageCount;
    }
    if a.records.len() != b.records.len() {
        return EqualityError::RecordCount;
    }

    let records = || a.records.iter().zip(&b.records);
    let messages = || a.messages.iter().zip(&b.messages);

    if records().any(|(x, y)| x.class != y.class) {
        return EqualityError::RecordClass;
    }
    if messages().any(|(x, y)| x.class != y.class) {
        return EqualityError::MessageClass;
    }
    if messages().any(|(x, y)| x.content != y.content) {
        return EqualityError::MessageContent;
    }
    if records().any(|(x, y)| x.content_type != y.content_type) {
        return EqualityError::RecordContentType;
    }
    if records().any(|(x, y)| x.length != y.length) {
        return EqualityError::RecordLength;
    }
    if records().any(|(x, y)| x.version != y.version) {
        return EqualityError::RecordVersion;
    }
    if records().any(|(x, y)| x.content != y.content) {
        return EqualityError::RecordContent;
    }

    EqualityError::None
}

/// Classify the first divergence between two response vectors
///
/// Deterministic and symmetric. Fails fast on empty or malformed vectors.
pub fn compare(a: &ResponseVector, b: &ResponseVector) -> Result<EqualityError, ComparisonError> {
    a.validate(0)?;
    b.validate(1)?;
    Ok(first_divergence(a, b))
}

/// Outcome of comparing vector `left` with vector `right`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairwiseDivergence {
    pub left: usize,
    pub right: usize,
    pub error: EqualityError,
}

/// Compare every unordered pair of `vectors`
pub fn pairwise(vectors: &[ResponseVector]) -> Result<Vec<PairwiseDivergence>, ComparisonError> {
    if vectors.len() < 2 {
        return Err(ComparisonError::NotEnoughVectors(vectors.len()));
    }
    for (index, vector) in vectors.iter().enumerate() {
        vector.validate(index)?;
    }

    let mut divergences = Vec::with_capacity(vectors.len() * (vectors.len() - 1) / 2);
    for left in 0..vectors.len() {
        for right in left + 1..vectors.len() {
            divergences.push(PairwiseDivergence {
                left,
                right,
                error: first_divergence(&vectors[left], &vectors[right]),
            });
        }
    }
    Ok(divergences)
}

/// How pairwise results collapse into one verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReductionPolicy {
    /// The coarsest divergence over all pairs
    #[default]
    MostSevere,
    /// The first divergence in pair order
    AnyDivergence,
}

impl ReductionPolicy {
    pub fn reduce(&self, divergences: &[PairwiseDivergence]) -> EqualityError {
        match self {
            ReductionPolicy::MostSevere => divergences
                .iter()
                .map(|d| d.error)
                .fold(EqualityError::None, |worst, e| {
                    if e.is_coarser_than(worst) {
                        e
                    } else {
                        worst
                    }
                }),
            ReductionPolicy::AnyDivergence => divergences
                .iter()
                .map(|d| d.error)
                .find(EqualityError::is_divergence)
                .unwrap_or(EqualityError::None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{MessageObservation, RecordObservation, SocketState};

    fn alert(description: u8) -> MessageObservation {
        MessageObservation::new("Alert", vec![2u8, description])
    }

    #[test]
    fn test_order_is_fixed() {
        for (position, kind) in EqualityError::ALL.iter().enumerate() {
            assert_eq!(*kind as u8 as usize, position);
        }
        assert_eq!(EqualityError::ALL[0], EqualityError::None);
        assert_eq!(EqualityError::ALL[10], EqualityError::RecordContent);
    }

    #[test]
    fn test_coarser_than() {
        assert!(EqualityError::SocketState.is_coarser_than(EqualityError::MessageCount));
        assert!(EqualityError::RecordContent.is_coarser_than(EqualityError::None));
        assert!(!EqualityError::None.is_coarser_than(EqualityError::RecordContent));
        assert!(!EqualityError::RecordLength.is_coarser_than(EqualityError::RecordLength));
    }

    #[test]
    fn test_socket_state_dominates() {
        let a = ResponseVector::new()
            .with_socket_state(SocketState::Closed)
            .with_message(alert(20));
        let b = ResponseVector::new()
            .with_socket_state(SocketState::Timeout)
            .with_message(alert(20))
            .with_message(alert(10));
        assert_eq!(compare(&a, &b), Ok(EqualityError::SocketState));
    }

    #[test]
    fn test_record_class_before_message_class() {
        let a = ResponseVector::new()
            .with_message(alert(20))
            .with_record(RecordObservation::new(21, 2));
        let b = ResponseVector::new()
            .with_message(MessageObservation::new("Finished", vec![0u8]))
            .with_record(RecordObservation::new(21, 2).with_class("BlobRecord"));
        assert_eq!(compare(&a, &b), Ok(EqualityError::RecordClass));
    }

    #[test]
    fn test_message_content_before_record_fields() {
        let a = ResponseVector::new()
            .with_message(alert(20))
            .with_record(RecordObservation::new(21, 2).with_version(0x0303));
        let b = ResponseVector::new()
            .with_message(alert(10))
            .with_record(RecordObservation::new(21, 3).with_version(0x0301));
        assert_eq!(compare(&a, &b), Ok(EqualityError::MessageContent));
    }

    #[test]
    fn test_record_fields() {
        let base = || ResponseVector::new().with_socket_state(SocketState::Closed);

        let a = base().with_record(RecordObservation::new(21, 2).with_version(0x0303));
        let b = base().with_record(RecordObservation::new(21, 3).with_version(0x0301));
        assert_eq!(compare(&a, &b), Ok(EqualityError::RecordLength));

        let b = base().with_record(RecordObservation::new(21, 2).with_version(0x0301));
        assert_eq!(compare(&a, &b), Ok(EqualityError::RecordVersion));

        let a = base().with_record(RecordObservation::new(23, 2).with_content(vec![1u8, 2]));
        let b = base().with_record(RecordObservation::new(23, 2).with_content(vec![1u8, 3]));
        assert_eq!(compare(&a, &b), Ok(EqualityError::RecordContent));
    }

    #[test]
    fn test_preconditions() {
        let valid = ResponseVector::new().with_socket_state(SocketState::Up);
        assert_eq!(
            compare(&valid, &ResponseVector::new()),
            Err(ComparisonError::EmptyVector { index: 1 })
        );
        assert_eq!(
            pairwise(&[valid]),
            Err(ComparisonError::NotEnoughVectors(1))
        );
    }

    #[test]
    fn test_pairwise_and_reduction() {
        let closed = ResponseVector::new()
            .with_socket_state(SocketState::Closed)
            .with_message(alert(20));
        let other_alert = ResponseVector::new()
            .with_socket_state(SocketState::Closed)
            .with_message(alert(10));
        let timeout = ResponseVector::new()
            .with_socket_state(SocketState::Timeout)
            .with_message(alert(20));

        let divergences =
            pairwise(&[closed.clone(), closed.clone(), other_alert, timeout]).unwrap();
        assert_eq!(divergences.len(), 6);
        assert_eq!(
            divergences[0],
            PairwiseDivergence {
                left: 0,
                right: 1,
                error: EqualityError::None
            }
        );
        assert_eq!(divergences[1].error, EqualityError::MessageContent);

        assert_eq!(ReductionPolicy::MostSevere.reduce(&divergences), EqualityError::SocketState);
        assert_eq!(
            ReductionPolicy::AnyDivergence.reduce(&divergences),
            EqualityError::MessageContent
        );

        let identical = pairwise(&[closed.clone(), closed]).unwrap();
        assert_eq!(ReductionPolicy::MostSevere.reduce(&identical), EqualityError::None);
        assert_eq!(ReductionPolicy::AnyDivergence.reduce(&identical), EqualityError::None);
    }
}
