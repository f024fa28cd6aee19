use std::sync::Arc;

use ispiq_tuning::{CalibrationState, GainTables, LscChromatix, TintlessChromatix, TriggerData};

use crate::{
    error::LscError,
    input::{CropWindow, LensShadingMapMode, SensorGeometry, ShadingMode},
    setting::UnpackedParameters,
    stripe::StripeState,
};

/// One of the two alternating hardware configuration slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Bank {
    /// First slot, active after construction.
    #[default]
    Bank0,
    /// Second slot.
    Bank1,
}

impl Bank {
    /// Returns the other bank.
    #[inline]
    pub fn toggle(self) -> Self {
        match self {
            Bank::Bank0 => Bank::Bank1,
            Bank::Bank1 => Bank::Bank0,
        }
    }

    /// The value programmed in the bank select field.
    #[inline]
    pub fn index(self) -> u32 {
        match self {
            Bank::Bank0 => 0,
            Bank::Bank1 => 1,
        }
    }
}

/// Frame geometry the current configuration was computed for.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GeometryCache {
    /// Width of the full pixel array.
    pub full_res_width: u32,
    /// Height of the full pixel array.
    pub full_res_height: u32,
    /// Horizontal offset of the processed window in the full array.
    pub offset_x: u32,
    /// Vertical offset of the processed window in the full array.
    pub offset_y: u32,
    /// Width of the stream entering the module.
    pub width: u32,
    /// Height of the stream entering the module.
    pub height: u32,
    /// Combined sensor scaling.
    pub scale: f32,
}

impl GeometryCache {
    /// Derives the module geometry from the sensor geometry of the frame.
    ///
    /// The crop offsets are brought back to full-resolution coordinates with the combined
    /// scaling. An upstream downscaler replaces the stream size but not the offsets.
    pub fn from_sensor(sensor: &SensorGeometry) -> Self {
        let crop = sensor.camif_crop;
        let scale = sensor.scale();
        let (width, height) = sensor
            .downscaled_size
            .unwrap_or((crop.width(), crop.height()));

        Self {
            full_res_width: sensor.full_res_width,
            full_res_height: sensor.full_res_height,
            offset_x: sensor.sensor_offset_x + (crop.first_pixel as f32 * scale) as u32,
            offset_y: sensor.sensor_offset_y + (crop.first_line as f32 * scale) as u32,
            width,
            height,
            scale,
        }
    }
}

/// Persistent state of one lens shading module instance.
///
/// Owned by the module and mutated once per frame; never shared.
#[derive(Debug, Default)]
pub struct ModuleState {
    pub(crate) bank: Bank,
    pub(crate) chromatix: Option<Arc<LscChromatix>>,
    pub(crate) tintless_chromatix: Option<Arc<TintlessChromatix>>,
    pub(crate) tuning_enable: bool,
    pub(crate) module_enable: bool,
    pub(crate) programmed_enable: bool,
    pub(crate) dynamic_enable: bool,
    pub(crate) enable_tintless: bool,
    pub(crate) alsc_enable: bool,
    pub(crate) shading_mode: ShadingMode,
    pub(crate) map_mode: LensShadingMapMode,
    pub(crate) awb_lock_held: bool,
    pub(crate) geometry: GeometryCache,
    pub(crate) crop: CropWindow,
    pub(crate) triggers: TriggerData,
    pub(crate) calibration: CalibrationState,
    pub(crate) correction_ratio: Option<GainTables>,
    pub(crate) map_gains: Option<GainTables>,
    pub(crate) stripe: Option<StripeState>,
    pub(crate) dependency_changed: bool,
    pub(crate) pack_pending: bool,
    pub(crate) unpacked: Option<UnpackedParameters>,
    pub(crate) calculated_request: Option<u64>,
    pub(crate) alsc_scratch: Vec<u32>,
}

impl ModuleState {
    /// Creates the state of a new module instance.
    ///
    /// # Arguments
    ///
    /// * `alsc_scratch_dwords` - Size of the adaptive shading scratch buffer, zero if the
    ///   hardware has no adaptive shading.
    ///
    /// # Errors
    ///
    /// Returns [`LscError::OutOfMemory`] if the scratch buffer cannot be allocated.
    pub fn new(alsc_scratch_dwords: usize) -> Result<Self, LscError> {
        let mut alsc_scratch = Vec::new();
        alsc_scratch
            .try_reserve_exact(alsc_scratch_dwords)
            .map_err(|_| LscError::OutOfMemory(alsc_scratch_dwords * std::mem::size_of::<u32>()))?;
        alsc_scratch.resize(alsc_scratch_dwords, 0);

        Ok(Self {
            dynamic_enable: true,
            pack_pending: true,
            calibration: CalibrationState::new(),
            alsc_scratch,
            ..Default::default()
        })
    }

    /// The bank the next configuration is written to.
    #[inline]
    pub fn bank(&self) -> Bank {
        self.bank
    }

    /// Whether the module is enabled for the current frame.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.module_enable
    }

    /// Whether the last dependency check asked for a recalculation.
    #[inline]
    pub fn dependency_changed(&self) -> bool {
        self.dependency_changed
    }

    /// The geometry of the current configuration.
    #[inline]
    pub fn geometry(&self) -> &GeometryCache {
        &self.geometry
    }

    /// The last calculated configuration.
    #[inline]
    pub fn unpacked(&self) -> Option<&UnpackedParameters> {
        self.unpacked.as_ref()
    }
}
