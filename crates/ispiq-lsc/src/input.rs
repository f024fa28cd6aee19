use ispiq_tuning::{CalibrationData, TriggerData, TuningMode, TuningProvider};
use serde::{Deserialize, Serialize};

use crate::{state::Bank, stripe::StripeContext};

/// Shading correction mode requested by the application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadingMode {
    /// No shading correction.
    Off,
    /// Shading correction without slowing the frame rate.
    #[default]
    Fast,
    /// High quality shading correction.
    HighQuality,
}

/// Whether the lens shading map is published with the frame result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LensShadingMapMode {
    /// The map is not published.
    #[default]
    Off,
    /// The map is published.
    On,
}

/// Color correction mode requested by the application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorCorrectionMode {
    /// Manual color transform.
    TransformMatrix,
    /// Automatic color correction.
    #[default]
    Fast,
    /// High quality automatic color correction.
    HighQuality,
}

/// Overall 3A control mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    /// 3A routines are off.
    Off,
    /// 3A routines are on.
    #[default]
    Auto,
    /// 3A routines follow the scene mode.
    UseSceneMode,
}

/// Auto white balance mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AwbMode {
    /// AWB is off.
    Off,
    /// AWB is running.
    #[default]
    Auto,
    /// A fixed illuminant preset.
    Preset,
}

/// Application controls of the frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalTags {
    /// Requested shading mode.
    pub shading_mode: ShadingMode,
    /// Requested lens shading map mode.
    pub lens_shading_map_mode: LensShadingMapMode,
    /// Requested color correction mode.
    pub color_correction_mode: ColorCorrectionMode,
    /// Requested control mode.
    pub control_mode: ControlMode,
    /// Requested AWB mode.
    pub awb_mode: AwbMode,
    /// AWB lock.
    pub awb_lock: bool,
    /// AE lock.
    pub ae_lock: bool,
}

impl HalTags {
    /// Whether the application drives the color transform by hand.
    pub fn is_manual_color_transform(&self) -> bool {
        self.color_correction_mode == ColorCorrectionMode::TransformMatrix
            && ((self.awb_mode == AwbMode::Off && self.control_mode == ControlMode::Auto)
                || self.control_mode == ControlMode::Off)
    }
}

/// Per-module enable bits set by the pipeline for the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicEnableMask(pub u32);

impl DynamicEnableMask {
    /// Lens shading correction.
    pub const LSC: u32 = 1 << 4;
    /// Adaptive lens shading.
    pub const ALSC: u32 = 1 << 21;
    /// Every module enabled.
    pub const ALL: Self = Self(u32::MAX);

    /// Whether every bit of `bit` is set.
    #[inline]
    pub fn is_set(&self, bit: u32) -> bool {
        self.0 & bit == bit
    }

    /// Returns the mask with `bit` cleared.
    pub fn without(self, bit: u32) -> Self {
        Self(self.0 & !bit)
    }
}

impl Default for DynamicEnableMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Vendor override of the module settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OemSetting {
    /// Forced module enable.
    pub lsc_enable: bool,
}

/// Inclusive crop window in sensor output pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropWindow {
    /// First pixel of each line.
    pub first_pixel: u32,
    /// Last pixel of each line.
    pub last_pixel: u32,
    /// First line.
    pub first_line: u32,
    /// Last line.
    pub last_line: u32,
}

impl CropWindow {
    /// Creates a window of `width` x `height` pixels at the origin.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            first_pixel: 0,
            last_pixel: width.saturating_sub(1),
            first_line: 0,
            last_line: height.saturating_sub(1),
        }
    }

    /// Width of the window.
    pub fn width(&self) -> u32 {
        self.last_pixel.saturating_add(1).saturating_sub(self.first_pixel)
    }

    /// Height of the window.
    pub fn height(&self) -> u32 {
        self.last_line.saturating_add(1).saturating_sub(self.first_line)
    }
}

/// Sensor and crop geometry of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorGeometry {
    /// Crop applied by the camera interface.
    pub camif_crop: CropWindow,
    /// Horizontal offset of the sensor output in the full array.
    pub sensor_offset_x: u32,
    /// Vertical offset of the sensor output in the full array.
    pub sensor_offset_y: u32,
    /// Sensor scaling factor.
    pub sensor_scaling_factor: f32,
    /// Sensor binning factor.
    pub sensor_binning_factor: u32,
    /// Binning factor of the receiver.
    pub csid_binning_factor: u32,
    /// Width of the full pixel array.
    pub full_res_width: u32,
    /// Height of the full pixel array.
    pub full_res_height: u32,
    /// Output size of an upstream downscaler, replacing the crop size when present.
    pub downscaled_size: Option<(u32, u32)>,
}

impl SensorGeometry {
    /// Geometry of an uncropped, unscaled full-resolution sensor.
    pub fn full_resolution(width: u32, height: u32) -> Self {
        Self {
            camif_crop: CropWindow::from_size(width, height),
            full_res_width: width,
            full_res_height: height,
            ..Default::default()
        }
    }

    /// Combined scaling of sensor, binning and receiver.
    pub fn scale(&self) -> f32 {
        self.sensor_scaling_factor
            * self.sensor_binning_factor as f32
            * self.csid_binning_factor as f32
    }
}

impl Default for SensorGeometry {
    fn default() -> Self {
        Self {
            camif_crop: CropWindow::default(),
            sensor_offset_x: 0,
            sensor_offset_y: 0,
            sensor_scaling_factor: 1.0,
            sensor_binning_factor: 1,
            csid_binning_factor: 1,
            full_res_width: 0,
            full_res_height: 0,
            downscaled_size: None,
        }
    }
}

/// Per-channel values in R, Gr, Gb, B order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelValues<T> {
    /// Red.
    pub r: T,
    /// Green on red rows.
    pub gr: T,
    /// Green on blue rows.
    pub gb: T,
    /// Blue.
    pub b: T,
}

impl<T: Copy> ChannelValues<T> {
    /// Creates values equal on every channel.
    pub fn splat(value: T) -> Self {
        Self {
            r: value,
            gr: value,
            gb: value,
            b: value,
        }
    }

    /// Applies `f` to every channel.
    pub fn map<U, F: Fn(T) -> U>(self, f: F) -> ChannelValues<U> {
        ChannelValues {
            r: f(self.r),
            gr: f(self.gr),
            gb: f(self.gb),
            b: f(self.b),
        }
    }
}

/// Configuration of a Bayer grid statistics block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgStatsConfig {
    /// Number of horizontal regions.
    pub horizontal_regions: u32,
    /// Number of vertical regions.
    pub vertical_regions: u32,
    /// Width of one region in pixels.
    pub region_width: u32,
    /// Height of one region in pixels.
    pub region_height: u32,
    /// Bit depth of the accumulated values.
    pub bit_depth: u32,
    /// Per-channel saturation thresholds.
    pub channel_gain_threshold: ChannelValues<u32>,
}

/// Parsed Bayer grid statistics of the previous frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BgStats {
    /// Configuration the statistics were collected with.
    pub config: BgStatsConfig,
    /// Per-region channel averages, row-major.
    pub regions: Vec<ChannelValues<f32>>,
}

/// Everything the module reads for one frame.
#[derive(Clone, Default)]
pub struct FrameInput<'a> {
    /// Request identifier, used for logging.
    pub request_id: u64,
    /// Application controls.
    pub hal: Option<HalTags>,
    /// 3A trigger values.
    pub triggers: Option<TriggerData>,
    /// Tuning data manager.
    pub tuning: Option<&'a dyn TuningProvider>,
    /// Tuning selection of the frame.
    pub tuning_modes: &'a [TuningMode],
    /// Whether the tuning selection changed since the previous frame.
    pub tuning_mode_changed: bool,
    /// Vendor override of the module settings.
    pub oem_setting: Option<OemSetting>,
    /// Per-module enable bits.
    pub dynamic_enable_mask: DynamicEnableMask,
    /// Sensor geometry.
    pub sensor: SensorGeometry,
    /// Forces a recalculation even if nothing changed.
    pub force_trigger_update: bool,
    /// Asks the module to keep its configuration while the correction algorithm settles.
    pub skip_correction_processing: bool,
    /// Register bit-exact test mode, ignoring the static tintless gate.
    pub register_bet_enabled: bool,
    /// Statistics for the tintless correction algorithm.
    pub tintless_stats: Option<&'a BgStats>,
    /// AWB statistics for the adaptive lens shading algorithm.
    pub awb_stats: Option<&'a BgStats>,
    /// Factory calibration of the device.
    pub calibration: Option<&'a CalibrationData>,
    /// Bank imposed by the pipeline.
    pub bank_update: Option<Bank>,
    /// Stripe processed by this call, when the frame is striped.
    pub stripe: Option<StripeContext>,
    /// Exports the packed configuration as tuning metadata.
    pub export_tuning_metadata: bool,
}

impl<'a> FrameInput<'a> {
    /// Creates an input with automatic controls and the given geometry and triggers.
    pub fn new(request_id: u64, sensor: SensorGeometry, triggers: TriggerData) -> Self {
        Self {
            request_id,
            hal: Some(HalTags::default()),
            triggers: Some(triggers),
            sensor,
            ..Default::default()
        }
    }

    /// Attaches a tuning data manager.
    pub fn with_tuning(mut self, tuning: &'a dyn TuningProvider) -> Self {
        self.tuning = Some(tuning);
        self
    }
}
