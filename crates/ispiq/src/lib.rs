#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// register images, DMI tables and command buffers.
#[doc(inline)]
pub use ispiq_hw as hw;

/// chromatix tuning data and its interpolation.
#[doc(inline)]
pub use ispiq_tuning as tuning;

/// lens shading correction module.
#[doc(inline)]
pub use ispiq_lsc as lsc;
