use serde::{Deserialize, Serialize};

use crate::{
    chromatix::{GainTables, GoldenCctData, MESH_ROLLOFF_SIZE},
    error::TuningError,
    tree::Interpolate,
    trigger::select_region,
};

/// Maximum number of illuminants a device calibrates.
pub const MAX_LIGHT_TYPES: usize = 6;

/// Factory shading measurement of one illuminant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightCalibration {
    /// Whether the device carries a measurement for this illuminant.
    pub available: bool,
    /// The measured shading.
    pub gains: GainTables,
}

/// Per-device factory calibration data, as read from the sensor OTP memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    /// One entry per illuminant, at most [`MAX_LIGHT_TYPES`].
    pub lights: Vec<LightCalibration>,
}

/// Calibration tables owned by one module instance.
///
/// Tables are loaded with [`CalibrationState::load`] each time the coefficient tree changes.
/// The first [`CalibrationState::calibrate`] after a load turns the device measurements into
/// golden/device ratios; later calls reuse the ratios.
#[derive(Debug, Clone, Default)]
pub struct CalibrationState {
    tables: Vec<GainTables>,
    to_calibrate: bool,
    enabled: bool,
}

impl CalibrationState {
    /// Creates an empty calibration state with room for every illuminant.
    pub fn new() -> Self {
        Self {
            tables: Vec::with_capacity(MAX_LIGHT_TYPES),
            to_calibrate: false,
            enabled: false,
        }
    }

    /// Loads the available device tables.
    ///
    /// Missing calibration data is not an error: calibration is simply disabled.
    pub fn load(&mut self, data: Option<&CalibrationData>) {
        self.tables.clear();

        let Some(data) = data else {
            log::error!("Calibration data from sensor is not present");
            self.to_calibrate = false;
            self.enabled = false;
            return;
        };

        for light in data.lights.iter().take(MAX_LIGHT_TYPES) {
            if !light.available {
                continue;
            }
            if let Err(err) = light.gains.validate(MESH_ROLLOFF_SIZE) {
                log::warn!("Skipping calibration table: {err}");
                continue;
            }
            self.tables.push(light.gains.clone());
        }

        self.enabled = !self.tables.is_empty();
        self.to_calibrate = self.enabled;

        if !self.enabled {
            log::debug!("No calibration table available");
        }
    }

    /// Number of loaded tables.
    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }

    /// Whether calibration is applied.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the loaded tables still hold raw device measurements.
    pub fn needs_conversion(&self) -> bool {
        self.to_calibrate
    }

    /// Calibrates an interpolated table.
    ///
    /// # Arguments
    ///
    /// * `interpolated` - The table interpolated from the coefficient tree.
    /// * `golden` - The golden module tables of the chromatix, one per CCT region.
    /// * `cct` - The CCT trigger of the frame.
    ///
    /// # Returns
    ///
    /// The interpolated table multiplied by the CCT-blended golden/device ratio, with Gr and
    /// Gb replaced by their average. The input is returned unchanged when calibration is
    /// disabled.
    pub fn calibrate(
        &mut self,
        interpolated: &GainTables,
        golden: &[GoldenCctData],
        cct: f32,
    ) -> Result<GainTables, TuningError> {
        let count = golden.len().min(self.tables.len());

        if self.to_calibrate {
            self.convert_to_ratio(&golden[..count])?;
            self.to_calibrate = false;
        }

        if !self.enabled || count == 0 {
            return Ok(interpolated.clone());
        }

        let selection = select_region(golden[..count].iter().map(|g| &g.cct_trigger), cct);
        let ratio = self.tables[selection.start].interpolate(&self.tables[selection.end], selection.ratio);

        let mut output = interpolated.zip_with(&ratio, |gain, ratio| gain * ratio);
        output.average_green();

        Ok(output)
    }

    fn convert_to_ratio(&mut self, golden: &[GoldenCctData]) -> Result<(), TuningError> {
        for (table, golden) in self.tables.iter_mut().zip(golden) {
            golden.gains.validate(MESH_ROLLOFF_SIZE)?;
            for (device, golden) in table.channels_mut().into_iter().zip(golden.gains.channels()) {
                device
                    .iter_mut()
                    .zip(golden)
                    .filter(|(d, _)| d.abs() > f32::EPSILON)
                    .for_each(|(d, &g)| *d = g / *d);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::TriggerRange;
    use approx::assert_relative_eq;

    fn golden(start: f32, end: f32, gain: f32) -> GoldenCctData {
        GoldenCctData {
            cct_trigger: TriggerRange::new(start, end),
            gains: GainTables::filled(MESH_ROLLOFF_SIZE, gain),
        }
    }

    fn light(available: bool, gain: f32) -> LightCalibration {
        LightCalibration {
            available,
            gains: GainTables::filled(MESH_ROLLOFF_SIZE, gain),
        }
    }

    #[test]
    fn load_compacts_available_tables() {
        let data = CalibrationData {
            lights: vec![light(false, 1.0), light(true, 2.0), light(true, 4.0)],
        };
        let mut state = CalibrationState::new();
        state.load(Some(&data));
        assert_eq!(state.num_tables(), 2);
        assert!(state.is_enabled());
        assert!(state.needs_conversion());

        state.load(None);
        assert_eq!(state.num_tables(), 0);
        assert!(!state.is_enabled());
    }

    #[test]
    fn calibrate_blends_ratios() -> Result<(), TuningError> {
        let data = CalibrationData {
            lights: vec![light(true, 2.0), light(true, 4.0)],
        };
        let golden = vec![golden(2000.0, 3000.0, 2.0), golden(5000.0, 6000.0, 2.0)];

        let mut state = CalibrationState::new();
        state.load(Some(&data));

        let mut interpolated = GainTables::filled(MESH_ROLLOFF_SIZE, 2.0);
        interpolated.gb = vec![4.0; MESH_ROLLOFF_SIZE];

        // ratios are 1.0 at 3000K and 0.5 at 5000K
        let out = state.calibrate(&interpolated, &golden, 4000.0)?;
        assert!(!state.needs_conversion());
        assert_relative_eq!(out.r[0], 1.5);
        assert_relative_eq!(out.b[10], 1.5);
        assert_relative_eq!(out.gr[5], 2.25);
        assert_relative_eq!(out.gb[5], 2.25);

        // the ratios are only computed once
        let out = state.calibrate(&interpolated, &golden, 2500.0)?;
        assert_relative_eq!(out.r[0], 2.0);
        Ok(())
    }

    #[test]
    fn calibrate_skips_zero_entries() -> Result<(), TuningError> {
        let mut data = CalibrationData {
            lights: vec![light(true, 2.0)],
        };
        data.lights[0].gains.r[0] = 0.0;
        let golden = vec![golden(0.0, 10000.0, 3.0)];

        let mut state = CalibrationState::new();
        state.load(Some(&data));
        let out = state.calibrate(&GainTables::unity(), &golden, 5000.0)?;
        assert_relative_eq!(out.r[0], 0.0);
        assert_relative_eq!(out.r[1], 1.5);
        Ok(())
    }

    #[test]
    fn disabled_calibration_is_identity() -> Result<(), TuningError> {
        let mut state = CalibrationState::new();
        let table = GainTables::filled(MESH_ROLLOFF_SIZE, 1.25);
        let out = state.calibrate(&table, &[golden(0.0, 1.0, 1.0)], 0.5)?;
        assert_eq!(out, table);
        Ok(())
    }
}
