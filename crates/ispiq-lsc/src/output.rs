use ispiq_tuning::{GainTables, MESH_POINTS_H, MESH_POINTS_V, MESH_ROLLOFF_SIZE};
use serde::{Deserialize, Serialize};

use crate::{
    input::{LensShadingMapMode, ShadingMode},
    state::Bank,
};

/// Number of channels of the lens shading map.
pub const LENS_SHADING_MAP_CHANNELS: usize = 4;

/// Lens shading map published with the frame result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LensShadingInfo {
    /// Gains interleaved as `[R, Gr, Gb, B]` per mesh point, row-major.
    pub map: Vec<f32>,
    /// Number of mesh points per row.
    pub width: usize,
    /// Number of mesh rows.
    pub height: usize,
    /// Shading mode applied to the frame.
    pub shading_mode: ShadingMode,
    /// Lens shading map mode of the frame.
    pub map_mode: LensShadingMapMode,
}

impl LensShadingInfo {
    /// A map of unit gains.
    pub fn unity(shading_mode: ShadingMode, map_mode: LensShadingMapMode) -> Self {
        Self {
            map: vec![1.0; LENS_SHADING_MAP_CHANNELS * MESH_ROLLOFF_SIZE],
            width: MESH_POINTS_H,
            height: MESH_POINTS_V,
            shading_mode,
            map_mode,
        }
    }

    /// Builds the map from full-resolution gain tables.
    ///
    /// Tables of the wrong size give a unity map.
    pub fn from_gains(
        gains: &GainTables,
        shading_mode: ShadingMode,
        map_mode: LensShadingMapMode,
    ) -> Self {
        if gains.validate(MESH_ROLLOFF_SIZE).is_err() {
            log::warn!("Shading tables of {} points, publishing a unity map", gains.len());
            return Self::unity(shading_mode, map_mode);
        }

        let map = (0..MESH_ROLLOFF_SIZE)
            .flat_map(|i| [gains.r[i], gains.gr[i], gains.gb[i], gains.b[i]])
            .collect();

        Self {
            map,
            width: MESH_POINTS_H,
            height: MESH_POINTS_V,
            shading_mode,
            map_mode,
        }
    }
}

/// Copy of the packed configuration for the tuning metadata sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuningMetadata {
    /// The register images, in programming order.
    pub register_bytes: Vec<u8>,
    /// The DMI tables, back to back.
    pub dmi_words: Vec<u32>,
}

/// What one execution produced besides the command stream.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutput {
    /// Whether the module is enabled for the frame.
    pub rolloff_enable: bool,
    /// The lens shading map.
    pub lens_shading: LensShadingInfo,
    /// Whether the dependency check asked for a new configuration.
    pub dependency_changed: bool,
    /// Whether a configuration was packed.
    pub recomputed: bool,
    /// The bank the next configuration goes to.
    pub bank: Bank,
    /// Tuning metadata, when requested.
    pub tuning_metadata: Option<TuningMetadata>,
}
