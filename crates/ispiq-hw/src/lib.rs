#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// bit-field access inside 32-bit register words.
pub mod bitfield;

/// command buffer builder and command stream decoding.
pub mod cmd_buffer;

/// DMI table encoding and the DMI backing buffer.
pub mod dmi;

/// Error types for the hardware layer.
pub mod error;

/// fixed-layout register images.
pub mod register;

pub use bitfield::BitField;
pub use cmd_buffer::{CmdBuffer, Command, DmiWrite};
pub use dmi::{DmiBuffer, DmiEntryLayout};
pub use error::HwError;
pub use register::RegisterImage;
