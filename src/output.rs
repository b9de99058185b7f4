//! Result types returned by the conversion pipeline.

use crate::error::ConvertError;
use crate::format::FormatPair;
use serde::{Deserialize, Serialize};

/// How a conversion request ended when it did not return an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The converter ran and the target was flushed.
    Converted,
    /// No converter is registered for the pair; nothing was read or written.
    NoConverter,
}

/// Report for one conversion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOutcome {
    pub pair: FormatPair,
    /// Converter name; `None` for a lookup miss.
    pub converter: Option<String>,
    pub status: OutcomeStatus,
    /// Bytes drained from the caller's source.
    pub bytes_read: u64,
    /// Bytes the converter wrote to the target.
    pub bytes_written: u64,
    /// Wall-clock time from buffering to flush.
    pub duration_ms: u64,
}

impl ConversionOutcome {
    pub(crate) fn no_converter(pair: FormatPair) -> Self {
        Self {
            pair,
            converter: None,
            status: OutcomeStatus::NoConverter,
            bytes_read: 0,
            bytes_written: 0,
            duration_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == OutcomeStatus::Converted
    }

    /// Treat a lookup miss as an error.
    ///
    /// Useful for callers (like the CLI) that have no better UX for a miss
    /// than reporting it.
    pub fn into_result(self) -> Result<ConversionOutcome, ConvertError> {
        match self.status {
            OutcomeStatus::Converted => Ok(self),
            OutcomeStatus::NoConverter => Err(ConvertError::NoConverter { pair: self.pair }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatTag;

    fn pair() -> FormatPair {
        FormatPair::new(
            FormatTag::parse("md").unwrap(),
            FormatTag::parse("docx").unwrap(),
        )
    }

    #[test]
    fn miss_is_not_success() {
        let o = ConversionOutcome::no_converter(pair());
        assert!(!o.succeeded());
        let err = o.into_result().unwrap_err();
        assert_eq!(err.to_string(), "No converter available for md → docx");
    }

    #[test]
    fn converted_passes_through_into_result() {
        let o = ConversionOutcome {
            pair: pair(),
            converter: Some("MdToDocx".into()),
            status: OutcomeStatus::Converted,
            bytes_read: 3,
            bytes_written: 9,
            duration_ms: 1,
        };
        assert!(o.succeeded());
        assert_eq!(o.clone().into_result().unwrap(), o);
    }

    #[test]
    fn serialises_status_in_snake_case() {
        let json = serde_json::to_value(ConversionOutcome::no_converter(pair())).unwrap();
        assert_eq!(json["status"], "no_converter");
        assert_eq!(json["pair"]["source"], "md");
    }
}
