#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// per-device factory calibration of the shading tables.
pub mod calibration;

/// chromatix data of the lens shading and tintless modules.
pub mod chromatix;

/// Error types for the tuning module.
pub mod error;

/// collaborator interface of the tuning data manager.
pub mod provider;

/// tuning coefficient trees and their interpolation.
pub mod tree;

/// trigger values and region selection.
pub mod trigger;

pub use calibration::{CalibrationData, CalibrationState, LightCalibration, MAX_LIGHT_TYPES};
pub use chromatix::{
    AlscParameters, GainTables, GoldenCctData, LscChromatix, LscEnableSection, LscRegionData,
    LscReserve, PrivateInformation, TintlessChromatix, TintlessEnableSection, TintlessRegionData,
    MESH_POINTS_H, MESH_POINTS_V, MESH_ROLLOFF_SIZE,
};
pub use error::TuningError;
pub use provider::{StaticTuning, TuningMode, TuningProvider};
pub use tree::{Interpolate, TuningNode, TuningRegion};
pub use trigger::{ControlMethod, TriggerData, TriggerKind, TriggerRange, TriggerValues};
