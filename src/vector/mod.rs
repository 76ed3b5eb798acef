//! Captured protocol responses
//!
//! A [`ResponseVector`] is what one probing round observed on the wire: the
//! final socket state, the protocol messages that were parsed and the
//! records that carried them. Vectors are immutable once captured and are
//! compared with [`compare`] to detect behavioural differences.

use crate::error::ComparisonError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod equality;
pub mod statistics;

pub use equality::{compare, pairwise, EqualityError, PairwiseDivergence, ReductionPolicy};
pub use statistics::{DistributionTest, ResponseCounter};

/// State of the connection after the last observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SocketState {
    Up,
    Closed,
    Reset,
    Timeout,
    DataAvailable,
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketState::Up => "UP",
            SocketState::Closed => "CLOSED",
            SocketState::Reset => "RESET",
            SocketState::Timeout => "TIMEOUT",
            SocketState::DataAvailable => "DATA_AVAILABLE",
        };
        f.write_str(name)
    }
}

/// One parsed protocol message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageObservation {
    /// Message type, e.g. "Alert" or "ServerHello"
    pub class: String,
    /// Content fingerprint
    pub content: Bytes,
}

impl MessageObservation {
    pub fn new(class: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            class: class.into(),
            content: content.into(),
        }
    }
}

/// One record as seen on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordObservation {
    /// Record kind, e.g. "Record" or "BlobRecord"
    pub class: String,
    pub content_type: u8,
    /// Declared length
    pub length: usize,
    pub version: u16,
    /// Captured payload, if any; must match `length` when present
    pub content: Option<Bytes>,
}

impl RecordObservation {
    pub fn new(content_type: u8, length: usize) -> Self {
        Self {
            class: "Record".to_string(),
            content_type,
            length,
            version: 0,
            content: None,
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    pub fn with_version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    pub fn with_content(mut self, content: impl Into<Bytes>) -> Self {
        self.content = Some(content.into());
        self
    }

    fn is_malformed(&self) -> bool {
        self.content
            .as_ref()
            .map(|c| c.len() != self.length)
            .unwrap_or(false)
    }
}

/// Ordered observations of one probing round
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResponseVector {
    socket_state: Option<SocketState>,
    messages: Vec<MessageObservation>,
    records: Vec<RecordObservation>,
}

impl ResponseVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_socket_state(mut self, state: SocketState) -> Self {
        self.socket_state = Some(state);
        self
    }

    pub fn with_message(mut self, message: MessageObservation) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_record(mut self, record: RecordObservation) -> Self {
        self.records.push(record);
        self
    }

    pub fn socket_state(&self) -> Option<SocketState> {
        self.socket_state
    }

    pub fn messages(&self) -> &[MessageObservation] {
        &self.messages
    }

    pub fn records(&self) -> &[RecordObservation] {
        &self.records
    }

    /// Nothing was observed at all
    pub fn is_empty(&self) -> bool {
        self.socket_state.is_none() && self.messages.is_empty() && self.records.is_empty()
    }

    /// Check the comparison preconditions; `index` is used in the error
    pub fn validate(&self, index: usize) -> Result<(), ComparisonError> {
        if self.is_empty() {
            return Err(ComparisonError::EmptyVector { index });
        }

        if let Some((record, observation)) = self
            .records
            .iter()
            .enumerate()
            .find(|(_, r)| r.is_malformed())
        {
            return Err(ComparisonError::MalformedRecord {
                index,
                record,
                declared: observation.length,
                actual: observation.content.as_ref().map(Bytes::len).unwrap_or(0),
            });
        }

        Ok(())
    }
}

impl fmt::Display for ResponseVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.messages.iter().map(|m| m.class.as_str()).collect();
        match self.socket_state {
            Some(state) => write!(f, "[{}] {}", messages.join(","), state),
            None => write!(f, "[{}]", messages.join(",")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_vector_is_rejected() {
        assert_eq!(
            ResponseVector::new().validate(3),
            Err(ComparisonError::EmptyVector { index: 3 })
        );
        assert!(ResponseVector::new()
            .with_socket_state(SocketState::Closed)
            .validate(0)
            .is_ok());
    }

    #[test]
    fn test_malformed_record_is_rejected() {
        let vector = ResponseVector::new()
            .with_record(RecordObservation::new(22, 4).with_content(vec![1u8, 2, 3, 4]))
            .with_record(RecordObservation::new(21, 2).with_content(vec![2u8]));

        assert_eq!(
            vector.validate(1),
            Err(ComparisonError::MalformedRecord {
                index: 1,
                record: 1,
                declared: 2,
                actual: 1
            })
        );

        // records without captured content only carry the declared length
        let vector = ResponseVector::new().with_record(RecordObservation::new(22, 10));
        assert!(vector.validate(0).is_ok());
    }

    #[test]
    fn test_display() {
        let vector = ResponseVector::new()
            .with_message(MessageObservation::new("Alert", vec![2u8, 20]))
            .with_message(MessageObservation::new("ChangeCipherSpec", vec![1u8]))
            .with_socket_state(SocketState::Reset);
        assert_eq!(vector.to_string(), "[Alert,ChangeCipherSpec] RESET");
    }
}
