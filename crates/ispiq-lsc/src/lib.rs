#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// external correction algorithms and their loader.
pub mod algo;

/// static configuration of a module instance.
pub mod config;

/// per-frame recalculation decision.
pub(crate) mod dependency;

/// Error types for the lens shading module.
pub mod error;

/// register layouts of the supported hardware generations.
pub mod hw;

/// per-frame inputs.
pub mod input;

/// mesh geometry and resampling.
pub mod mesh;

/// the lens shading module.
pub mod module;

/// per-frame outputs.
pub mod output;

/// configuration calculation.
pub mod setting;

/// persistent module state and banks.
pub mod state;

/// stripe splitting.
pub mod stripe;

pub use algo::{AlgorithmHandle, AlgorithmLoader, CorrectionAlgorithm, GridAlgorithm, NoAlgorithms};
pub use config::LscModuleConfig;
pub use error::{ErrorKind, LscError};
pub use hw::LscHwSetting;
pub use input::{
    BgStats, BgStatsConfig, ChannelValues, CropWindow, DynamicEnableMask, FrameInput, HalTags,
    LensShadingMapMode, OemSetting, SensorGeometry, ShadingMode,
};
pub use module::LensShadingModule;
pub use output::{FrameOutput, LensShadingInfo, TuningMetadata};
pub use setting::UnpackedParameters;
pub use state::Bank;
pub use stripe::{StripeContext, StripingPlan};
