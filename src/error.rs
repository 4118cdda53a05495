use thiserror::Error;

/// Per-record failures raised while transforming documents or normalizing amounts.
///
/// `Malformed` and `UnknownRun` are recoverable: the record is skipped with a warning.
/// Every other variant would silently misrepresent data and aborts the run.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("missing or invalid field `{field}`")]
    Malformed { field: &'static str },

    #[error("unknown message run type `{0}`")]
    UnknownRun(String),

    #[error("unknown superchat header color `{0}`")]
    UnknownColor(String),

    #[error("unknown currency `{0}`")]
    UnknownCurrency(String),

    #[error("invalid exchange rate for {currency}: {rate}")]
    InvalidRate { currency: String, rate: f64 },

    #[error("exchange rate lookup for {currency} failed: {message}")]
    RateService { currency: String, message: String },
}

impl RecordError {
    pub fn malformed(field: &'static str) -> Self {
        RecordError::Malformed { field }
    }

    /// True when the run may continue after skipping the offending record.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RecordError::Malformed { .. } | RecordError::UnknownRun(_))
    }
}
