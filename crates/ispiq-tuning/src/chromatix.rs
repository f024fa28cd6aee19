use serde::{Deserialize, Serialize};

use crate::{
    error::TuningError,
    tree::{Interpolate, TuningNode},
    trigger::{ControlMethod, TriggerData, TriggerRange, TriggerValues},
};

/// Number of horizontal points of a full-resolution shading mesh.
pub const MESH_POINTS_H: usize = 17;

/// Number of vertical points of a full-resolution shading mesh.
pub const MESH_POINTS_V: usize = 13;

/// Number of points of a full-resolution shading mesh.
pub const MESH_ROLLOFF_SIZE: usize = MESH_POINTS_H * MESH_POINTS_V;

/// Per-channel rolloff gains of one shading mesh, in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainTables {
    /// Red channel gains.
    pub r: Vec<f32>,
    /// Green-on-red-row channel gains.
    pub gr: Vec<f32>,
    /// Green-on-blue-row channel gains.
    pub gb: Vec<f32>,
    /// Blue channel gains.
    pub b: Vec<f32>,
}

impl GainTables {
    /// Creates tables of `len` entries filled with `value`.
    pub fn filled(len: usize, value: f32) -> Self {
        Self {
            r: vec![value; len],
            gr: vec![value; len],
            gb: vec![value; len],
            b: vec![value; len],
        }
    }

    /// Creates full-resolution unity tables.
    pub fn unity() -> Self {
        Self::filled(MESH_ROLLOFF_SIZE, 1.0)
    }

    /// Number of entries of each table.
    pub fn len(&self) -> usize {
        self.r.len()
    }

    /// Returns true if the tables are empty.
    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }

    /// The four channels in R, Gr, Gb, B order.
    pub fn channels(&self) -> [&[f32]; 4] {
        [
            self.r.as_slice(),
            self.gr.as_slice(),
            self.gb.as_slice(),
            self.b.as_slice(),
        ]
    }

    /// The four channels in R, Gr, Gb, B order.
    pub fn channels_mut(&mut self) -> [&mut Vec<f32>; 4] {
        [&mut self.r, &mut self.gr, &mut self.gb, &mut self.b]
    }

    /// Checks that every channel holds `expected` entries.
    pub fn validate(&self, expected: usize) -> Result<(), TuningError> {
        for channel in self.channels() {
            if channel.len() != expected {
                return Err(TuningError::TableSizeMismatch {
                    expected,
                    actual: channel.len(),
                });
            }
        }
        Ok(())
    }

    /// Combines two tables entry by entry.
    pub fn zip_with<F>(&self, other: &Self, f: F) -> Self
    where
        F: Fn(f32, f32) -> f32,
    {
        let zip = |a: &[f32], b: &[f32]| -> Vec<f32> {
            a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
        };
        Self {
            r: zip(self.r.as_slice(), other.r.as_slice()),
            gr: zip(self.gr.as_slice(), other.gr.as_slice()),
            gb: zip(self.gb.as_slice(), other.gb.as_slice()),
            b: zip(self.b.as_slice(), other.b.as_slice()),
        }
    }

    /// Replaces Gr and Gb by their average.
    pub fn average_green(&mut self) {
        self.gr
            .iter_mut()
            .zip(self.gb.iter_mut())
            .for_each(|(gr, gb)| {
                let avg = (*gr + *gb) / 2.0;
                *gr = avg;
                *gb = avg;
            });
    }
}

impl Default for GainTables {
    fn default() -> Self {
        Self::unity()
    }
}

impl Interpolate for GainTables {
    fn interpolate(&self, other: &Self, ratio: f32) -> Self {
        self.zip_with(other, |a, b| a.interpolate(&b, ratio))
    }
}

/// Adaptive lens shading parameters carried by each region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlscParameters {
    /// Gain applied in bright areas.
    pub adaptive_gain_high: f32,
    /// Gain applied in dark areas.
    pub adaptive_gain_low: f32,
    /// Strength of the highlight gain.
    pub highlight_gain_strength: f32,
    /// Strength of the lowlight gain.
    pub lowlight_gain_strength: f32,
    /// Luma threshold of highlights.
    pub threshold_highlight: f32,
    /// Luma threshold of lowlights.
    pub threshold_lowlight: f32,
}

impl Interpolate for AlscParameters {
    fn interpolate(&self, other: &Self, ratio: f32) -> Self {
        Self {
            adaptive_gain_high: self.adaptive_gain_high.interpolate(&other.adaptive_gain_high, ratio),
            adaptive_gain_low: self.adaptive_gain_low.interpolate(&other.adaptive_gain_low, ratio),
            highlight_gain_strength: self
                .highlight_gain_strength
                .interpolate(&other.highlight_gain_strength, ratio),
            lowlight_gain_strength: self
                .lowlight_gain_strength
                .interpolate(&other.lowlight_gain_strength, ratio),
            threshold_highlight: self.threshold_highlight.interpolate(&other.threshold_highlight, ratio),
            threshold_lowlight: self.threshold_lowlight.interpolate(&other.threshold_lowlight, ratio),
        }
    }
}

/// Leaf data of the lens shading coefficient tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LscRegionData {
    /// Full-resolution rolloff gains.
    pub gains: GainTables,
    /// Adaptive lens shading parameters.
    #[serde(default)]
    pub alsc: AlscParameters,
}

impl Interpolate for LscRegionData {
    fn interpolate(&self, other: &Self, ratio: f32) -> Self {
        Self {
            gains: self.gains.interpolate(&other.gains, ratio),
            alsc: self.alsc.interpolate(&other.alsc, ratio),
        }
    }
}

/// Enable section of the lens shading chromatix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LscEnableSection {
    /// Enables rolloff correction.
    pub rolloff_enable: bool,
    /// Enables adaptive lens shading on generations that support it.
    pub alsc_enable: bool,
}

/// Chromatix information that is not interpolated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivateInformation {
    /// Sensitivity range over which the LED-on table fades in.
    pub led_sensitivity_trigger: TriggerRange,
}

/// Reserved (not interpolated) adaptive shading parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LscReserve {
    /// Luma weight base scale.
    pub luma_weight_base_scale: f32,
    /// Minimum luma weight base.
    pub luma_weight_base_min: u16,
    /// Minimum luma weight.
    pub luma_weight_min: u16,
}

impl Default for LscReserve {
    fn default() -> Self {
        Self {
            luma_weight_base_scale: 1.0,
            luma_weight_base_min: 0,
            luma_weight_min: 0,
        }
    }
}

/// Golden module shading tables for one CCT region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenCctData {
    /// CCT range of the region.
    pub cct_trigger: TriggerRange,
    /// Shading of the golden module.
    pub gains: GainTables,
}

/// Lens shading chromatix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LscChromatix {
    /// Identity of the tuning data this chromatix was built from.
    pub symbol_table_id: u32,
    /// Enable section.
    #[serde(default)]
    pub enable: LscEnableSection,
    /// Control method.
    #[serde(default)]
    pub control_method: ControlMethod,
    /// Private information.
    #[serde(default)]
    pub private_information: PrivateInformation,
    /// Reserved adaptive shading parameters.
    #[serde(default)]
    pub reserve: LscReserve,
    /// The interpolation tree.
    pub core: TuningNode<LscRegionData>,
    /// Golden module tables, one per CCT region.
    #[serde(default)]
    pub golden: Vec<GoldenCctData>,
}

impl LscChromatix {
    /// Checks the tree and the golden tables.
    pub fn validate(&self) -> Result<(), TuningError> {
        self.core
            .try_for_each_leaf(&mut |leaf: &LscRegionData| leaf.gains.validate(MESH_ROLLOFF_SIZE))?;
        for golden in &self.golden {
            golden.cct_trigger.validate()?;
            golden.gains.validate(MESH_ROLLOFF_SIZE)?;
        }
        Ok(())
    }

    /// Resolves the frame triggers against the chromatix control method.
    pub fn trigger_values(&self, data: &TriggerData) -> TriggerValues {
        TriggerValues::resolve(
            data,
            &self.control_method,
            self.private_information.led_sensitivity_trigger,
        )
    }

    /// Interpolates the coefficient tree for the frame triggers.
    pub fn interpolate(&self, data: &TriggerData) -> Result<LscRegionData, TuningError> {
        self.core.interpolate(&self.trigger_values(data))
    }
}

/// Enable section of the tintless chromatix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TintlessEnableSection {
    /// Enables the tintless correction algorithm.
    pub tintless_en: bool,
}

/// Tuning of the tintless correction algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TintlessRegionData {
    /// Weight of the image center.
    pub center_weight: f32,
    /// Weight of the image corners.
    pub corner_weight: f32,
    /// Enables the high accuracy mode.
    pub high_accuracy_mode: bool,
    /// Percentage of the trace kept between frames.
    pub trace_percentage: f32,
    /// Number of frames between two updates.
    pub update_delay: u8,
    /// Correction thresholds, the first one being the correction strength.
    pub thresholds: [f32; 16],
}

impl Default for TintlessRegionData {
    fn default() -> Self {
        Self {
            center_weight: 1.0,
            corner_weight: 1.0,
            high_accuracy_mode: false,
            trace_percentage: 0.0,
            update_delay: 0,
            thresholds: [0.0; 16],
        }
    }
}

/// Tintless chromatix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TintlessChromatix {
    /// Identity of the tuning data this chromatix was built from.
    pub symbol_table_id: u32,
    /// Enable section.
    pub enable: TintlessEnableSection,
    /// Algorithm tuning.
    pub data: TintlessRegionData,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::TriggerKind;
    use crate::tree::TuningRegion;
    use approx::assert_relative_eq;

    fn chromatix() -> LscChromatix {
        let region = |start: f32, end: f32, gain: f32| TuningRegion {
            range: TriggerRange::new(start, end),
            node: TuningNode::Leaf(LscRegionData {
                gains: GainTables::filled(MESH_ROLLOFF_SIZE, gain),
                alsc: AlscParameters::default(),
            }),
        };
        LscChromatix {
            symbol_table_id: 7,
            enable: LscEnableSection {
                rolloff_enable: true,
                alsc_enable: false,
            },
            control_method: ControlMethod::default(),
            private_information: PrivateInformation::default(),
            reserve: LscReserve::default(),
            core: TuningNode::Branch {
                trigger: TriggerKind::Cct,
                regions: vec![region(2800.0, 3200.0, 1.0), region(5000.0, 6500.0, 2.0)],
            },
            golden: vec![],
        }
    }

    #[test]
    fn interpolate_chromatix() -> Result<(), TuningError> {
        let chromatix = chromatix();
        chromatix.validate()?;

        let data = TriggerData {
            color_temperature: 4100.0,
            ..Default::default()
        };
        let result = chromatix.interpolate(&data)?;
        assert_eq!(result.gains.len(), MESH_ROLLOFF_SIZE);
        result
            .gains
            .channels()
            .iter()
            .for_each(|c| c.iter().for_each(|&g| assert_relative_eq!(g, 1.5)));
        Ok(())
    }

    #[test]
    fn validate_rejects_short_tables() {
        let mut chromatix = chromatix();
        chromatix.core = TuningNode::Leaf(LscRegionData {
            gains: GainTables::filled(10, 1.0),
            alsc: AlscParameters::default(),
        });
        assert_eq!(
            chromatix.validate(),
            Err(TuningError::TableSizeMismatch {
                expected: MESH_ROLLOFF_SIZE,
                actual: 10
            })
        );
    }

    #[test]
    fn average_green() {
        let mut tables = GainTables::filled(4, 1.0);
        tables.gr = vec![1.0, 2.0, 3.0, 4.0];
        tables.gb = vec![3.0, 2.0, 1.0, 0.0];
        tables.average_green();
        assert_eq!(tables.gr, vec![2.0; 4]);
        assert_eq!(tables.gb, vec![2.0; 4]);
    }

    #[test]
    fn tintless_defaults_from_json() -> Result<(), serde_json::Error> {
        let chromatix: TintlessChromatix =
            serde_json::from_str(r#"{ "symbol_table_id": 3, "enable": { "tintless_en": true } }"#)?;
        assert!(chromatix.enable.tintless_en);
        assert_eq!(chromatix.data.thresholds, [0.0; 16]);
        Ok(())
    }
}
