use crate::trigger::TriggerKind;

/// An error type for the tuning data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TuningError {
    /// A branch of the coefficient tree has no region.
    #[error("Coefficient tree branch keyed by {0:?} has no region")]
    EmptyBranch(TriggerKind),

    /// A gain table does not hold the expected number of entries.
    #[error("Gain table size mismatch: expected {expected}, got {actual}")]
    TableSizeMismatch {
        /// Number of entries expected.
        expected: usize,
        /// Number of entries found.
        actual: usize,
    },

    /// A trigger range ends before it starts.
    #[error("Invalid trigger range [{0}, {1}]")]
    InvalidRange(f32, f32),
}
