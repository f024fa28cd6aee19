/// An error type for the hardware programming layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HwError {
    /// The declared buffer capacity cannot hold the requested write.
    #[error("Buffer capacity too small: {required} dwords required, {available} available")]
    PackingOverflow {
        /// Number of dwords the write needs.
        required: usize,
        /// Number of dwords left in the buffer.
        available: usize,
    },

    /// The two sub-field tables of a DMI table have different lengths.
    #[error("DMI sub-field tables differ in length ({0} vs {1})")]
    TableLengthMismatch(usize, usize),

    /// A register range is longer than the command header can encode.
    #[error("Register range of {0} dwords exceeds the command encoding limit")]
    RegisterRangeTooLong(usize),

    /// The command stream could not be decoded.
    #[error("Malformed command stream at dword {0}")]
    MalformedCommand(usize),
}
