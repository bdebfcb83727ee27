//! Error taxonomy for the evolution core.
//!
//! Every anomaly the core can hit surfaces as one of three kinds. Only
//! `MalformedInput` is fatal for a round; the orchestrator decides whether to
//! skip or halt based on [`EvolutionError::is_fatal`].

pub type Result<T> = std::result::Result<T, EvolutionError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvolutionError {
    /// A required field is missing or out of its domain.
    #[error("malformed input: {field}: {reason}")]
    MalformedInput { field: String, reason: String },

    /// Grading or trend analysis invoked with too few samples.
    #[error("insufficient data: need {required} sample(s), have {available}")]
    InsufficientData { required: usize, available: usize },

    /// A collaborator could not supply or accept a record.
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),
}

impl EvolutionError {
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Fatal kinds abort the round; the rest may be skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MalformedInput { .. })
    }
}

impl From<std::io::Error> for EvolutionError {
    fn from(err: std::io::Error) -> Self {
        Self::PersistenceUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for EvolutionError {
    fn from(err: serde_json::Error) -> Self {
        Self::PersistenceUnavailable(format!("json: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(EvolutionError::malformed("tp_pct", "must be positive").is_fatal());
        assert!(!EvolutionError::InsufficientData {
            required: 1,
            available: 0
        }
        .is_fatal());
        assert!(!EvolutionError::PersistenceUnavailable("disk".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = EvolutionError::malformed("win_rate", "outside 0..=100");
        assert_eq!(err.to_string(), "malformed input: win_rate: outside 0..=100");
    }
}
