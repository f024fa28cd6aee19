use ispiq_hw::HwError;
use ispiq_tuning::TuningError;

/// Broad classification of [`LscError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required input is missing or invalid.
    InvalidArgument,
    /// Scratch or calibration memory could not be allocated.
    OutOfMemory,
    /// The hardware generation is not implemented.
    Unsupported,
    /// The declared buffer capacity cannot hold the packed configuration.
    PackingOverflow,
}

/// An error type for the lens shading module.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LscError {
    /// A required input is missing.
    #[error("Missing required input: {0}")]
    MissingInput(&'static str),

    /// The frame geometry cannot be handled.
    #[error("Invalid frame geometry {0}x{1}")]
    InvalidGeometry(u32, u32),

    /// The computed mesh exceeds the mesh size of the hardware generation.
    #[error("Mesh of {0} points exceeds the hardware maximum of {1}")]
    MeshTooLarge(usize, usize),

    /// The stripe index is outside the prepared stripes.
    #[error("Stripe {0} out of {1} prepared stripes")]
    InvalidStripe(usize, usize),

    /// Scratch memory could not be allocated.
    #[error("Failed to allocate {0} bytes of scratch memory")]
    OutOfMemory(usize),

    /// The hardware version has no register layout.
    #[error("Unsupported hardware version {0:#x}")]
    UnsupportedHardware(u32),

    /// The tuning data is invalid.
    #[error(transparent)]
    Tuning(#[from] TuningError),

    /// The hardware layer rejected a write.
    #[error(transparent)]
    Hw(#[from] HwError),
}

impl LscError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LscError::MissingInput(_)
            | LscError::InvalidGeometry(..)
            | LscError::MeshTooLarge(..)
            | LscError::InvalidStripe(..)
            | LscError::Tuning(_) => ErrorKind::InvalidArgument,
            LscError::OutOfMemory(_) => ErrorKind::OutOfMemory,
            LscError::UnsupportedHardware(_) => ErrorKind::Unsupported,
            LscError::Hw(HwError::PackingOverflow { .. }) => ErrorKind::PackingOverflow,
            LscError::Hw(_) => ErrorKind::InvalidArgument,
        }
    }

    /// Whether the frame can continue with the module disabled.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::InvalidArgument | ErrorKind::Unsupported)
    }
}
