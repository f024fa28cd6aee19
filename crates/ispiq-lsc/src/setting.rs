use ispiq_hw::BitField;
use ispiq_tuning::{GainTables, LscRegionData, LscReserve, TintlessChromatix};

use crate::{
    algo::{
        AlscParams, CorrectionAlgorithm, CorrectionConfig, GridAlgorithm, TintlessParams,
        ALSC_GRID_POINTS,
    },
    config::ALSC_SCRATCH_BUFFER_SIZE_DWORDS,
    error::LscError,
    input::{BgStats, CropWindow},
    mesh::{GridLayout, MeshRegisters, MeshResampler},
    state::{Bank, GeometryCache},
};

/// Fraction bits of the mesh gains.
pub const GAIN_Q_FACTOR: u32 = 10;

/// Fraction bits of the luma weight base scale.
pub const LUMA_WEIGHT_BASE_SCALE_Q_FACTOR: u32 = 10;

const GAIN: BitField = BitField::new(0, 13);
const GRID_GAIN: BitField = BitField::new(0, 12);
const GRID_MEAN: BitField = BitField::new(0, 14);

/// Luma weight base scale field.
pub const LUMA_WEIGHT_BASE_SCALE: BitField = BitField::new(0, 12);
/// Luma weight base minimum field.
pub const LUMA_WEIGHT_BASE_MIN: BitField = BitField::new(12, 10);
/// Luma weight minimum field.
pub const LUMA_WEIGHT_MIN: BitField = BitField::new(22, 10);

/// Quantized mesh gains of the four Bayer channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshTables {
    /// Red gains, Q10.
    pub r: Vec<u16>,
    /// Green-on-red-row gains, Q10.
    pub gr: Vec<u16>,
    /// Green-on-blue-row gains, Q10.
    pub gb: Vec<u16>,
    /// Blue gains, Q10.
    pub b: Vec<u16>,
}

impl MeshTables {
    /// Quantizes float gains to Q10, saturating to 13 bits.
    pub fn quantize(gains: &GainTables) -> Self {
        let q = |channel: &[f32]| -> Vec<u16> {
            channel
                .iter()
                .map(|&g| quantize(g, GAIN_Q_FACTOR, GAIN))
                .collect()
        };
        Self {
            r: q(gains.r.as_slice()),
            gr: q(gains.gr.as_slice()),
            gb: q(gains.gb.as_slice()),
            b: q(gains.b.as_slice()),
        }
    }

    /// Number of points of each table.
    pub fn len(&self) -> usize {
        self.r.len()
    }

    /// Returns true if the tables are empty.
    pub fn is_empty(&self) -> bool {
        self.r.is_empty()
    }
}

#[inline]
fn quantize(value: f32, q: u32, field: BitField) -> u16 {
    let fixed = (value * (1u32 << q) as f32).round().max(0.0);
    field.saturate(fixed.min(u32::MAX as f32) as u32) as u16
}

/// A validated lens shading configuration, ready to be packed.
#[derive(Debug, Clone, PartialEq)]
pub struct UnpackedParameters {
    /// Rolloff enable.
    pub enable: bool,
    /// Adaptive shading enable.
    pub alsc_enable: bool,
    /// Crop enable.
    pub crop_enable: bool,
    /// Bank the tables are written to.
    pub bank: Bank,
    /// Mesh geometry fields.
    pub mesh: MeshRegisters,
    /// Crop window of the stream.
    pub crop: CropWindow,
    /// Luma weight base scale, Q10.
    pub luma_weight_base_scale: u32,
    /// Minimum luma weight base.
    pub luma_weight_base_min: u32,
    /// Minimum luma weight.
    pub luma_weight_min: u32,
    /// Quantized mesh gains, `mesh.points_h() * mesh.points_v()` per channel.
    pub tables: MeshTables,
    /// Adaptive shading grid gains, 12 bits.
    pub grid_gain: Vec<u16>,
    /// Adaptive shading grid means, 14 bits.
    pub grid_mean: Vec<u16>,
}

/// Tintless inputs of one calculation.
pub struct TintlessInput<'a> {
    /// Tintless tuning.
    pub chromatix: &'a TintlessChromatix,
    /// Tintless statistics.
    pub stats: &'a BgStats,
    /// The correction algorithm.
    pub algorithm: &'a mut dyn CorrectionAlgorithm,
}

/// Adaptive shading inputs of one calculation.
pub struct AlscInput<'a> {
    /// AWB statistics, if available.
    pub stats: Option<&'a BgStats>,
    /// The grid algorithm, if loaded.
    pub algorithm: Option<&'a mut dyn GridAlgorithm>,
    /// Module-owned scratch memory.
    pub scratch: &'a mut [u32],
}

/// Inputs of a full calculation.
pub struct SettingInput<'a> {
    /// Bank the configuration is written to.
    pub bank: Bank,
    /// Geometry of the stream.
    pub geometry: &'a GeometryCache,
    /// Crop window of the stream.
    pub crop: CropWindow,
    /// Interpolated and calibrated region data.
    pub region: &'a LscRegionData,
    /// Reserved tuning.
    pub reserve: &'a LscReserve,
    /// Adaptive shading enable, already gated by the hardware and dynamic mask.
    pub alsc_enable: bool,
    /// Whether the correction algorithm is enabled this frame.
    pub tintless_enable: bool,
    /// Tintless inputs, when the correction algorithm can run.
    pub tintless: Option<TintlessInput<'a>>,
    /// Adaptive shading inputs.
    pub alsc: AlscInput<'a>,
}

/// Computes the mesh geometry of a stream.
///
/// This is the only part of the calculation needed to plan stripes.
pub fn calculate_geometry(geometry: &GeometryCache) -> Result<(GridLayout, MeshRegisters), LscError> {
    let layout = GridLayout::optimize(geometry.width, geometry.height)?;
    Ok((layout, MeshRegisters::from_layout(&layout)))
}

/// Computes a full configuration.
///
/// # Arguments
///
/// * `input` - The calculation inputs.
/// * `correction_ratio` - Per-point ratio between the last corrected mesh and its input.
///   Updated when the correction algorithm succeeds and reapplied when it is disabled.
///
/// # Errors
///
/// Fails if the geometry cannot hold a mesh.
pub fn calculate(
    input: SettingInput<'_>,
    correction_ratio: &mut Option<GainTables>,
) -> Result<UnpackedParameters, LscError> {
    let (layout, mesh) = calculate_geometry(input.geometry)?;
    let resampler = MeshResampler::new(layout, input.geometry)?;
    let scaled = resampler.resample_tables(&input.region.gains);

    let corrected = match input.tintless {
        Some(tintless) if input.tintless_enable => run_correction(tintless, &layout, &mesh, &scaled),
        _ => None,
    };

    let gains = match corrected {
        Some(corrected) => {
            *correction_ratio = Some(corrected.zip_with(&scaled, |out, inp| out / inp));
            corrected
        }
        None => match correction_ratio.as_ref() {
            Some(ratio) if !input.tintless_enable && ratio.len() == scaled.len() => {
                log::debug!("Reapplying the last tintless correction");
                scaled.zip_with(ratio, |gain, ratio| gain * ratio)
            }
            _ => scaled,
        },
    };

    let reserve = input.reserve;
    let mut params = UnpackedParameters {
        enable: true,
        alsc_enable: input.alsc_enable,
        crop_enable: false,
        bank: input.bank,
        mesh,
        crop: input.crop,
        luma_weight_base_scale: u32::from(quantize(
            reserve.luma_weight_base_scale,
            LUMA_WEIGHT_BASE_SCALE_Q_FACTOR,
            LUMA_WEIGHT_BASE_SCALE,
        )),
        luma_weight_base_min: LUMA_WEIGHT_BASE_MIN.saturate(u32::from(reserve.luma_weight_base_min)),
        luma_weight_min: LUMA_WEIGHT_MIN.saturate(u32::from(reserve.luma_weight_min)),
        tables: MeshTables::quantize(&gains),
        grid_gain: vec![0; ALSC_GRID_POINTS],
        grid_mean: vec![0; ALSC_GRID_POINTS],
    };

    if params.alsc_enable {
        match run_alsc(input.alsc, input.region) {
            Some((gain, mean)) => {
                params.grid_gain = gain;
                params.grid_mean = mean;
            }
            None => params.alsc_enable = false,
        }
    }

    Ok(params)
}

fn run_correction(
    tintless: TintlessInput<'_>,
    layout: &GridLayout,
    mesh: &MeshRegisters,
    scaled: &GainTables,
) -> Option<GainTables> {
    let config = CorrectionConfig {
        subgrid_width: mesh.subgrid_width(),
        subgrid_height: mesh.subgrid_height(),
        horizontal_offset: mesh.horizontal_offset(),
        vertical_offset: mesh.vertical_offset(),
        table_width: layout.points_h(),
        table_height: layout.points_v(),
        num_subgrids: mesh.scale(),
        params: TintlessParams::from(&tintless.chromatix.data),
        saturation_limit: CorrectionConfig::saturation_limits(tintless.stats),
    };

    match tintless.algorithm.process(&config, tintless.stats, scaled) {
        Ok(corrected) if corrected.len() == scaled.len() => Some(corrected),
        Ok(corrected) => {
            log::error!(
                "Tintless output has {} points, expected {}",
                corrected.len(),
                scaled.len()
            );
            None
        }
        Err(err) => {
            log::error!("Tintless correction failed: {err}");
            None
        }
    }
}

fn run_alsc(alsc: AlscInput<'_>, region: &LscRegionData) -> Option<(Vec<u16>, Vec<u16>)> {
    let Some(stats) = alsc.stats else {
        log::debug!("AWB BG statistics not available, disabling ALSC");
        return None;
    };
    let Some(algorithm) = alsc.algorithm else {
        log::debug!("ALSC algorithm not loaded, disabling ALSC");
        return None;
    };
    if alsc.scratch.len() < ALSC_SCRATCH_BUFFER_SIZE_DWORDS {
        log::error!(
            "ALSC scratch buffer too small: expected {ALSC_SCRATCH_BUFFER_SIZE_DWORDS}, got {}",
            alsc.scratch.len()
        );
        return None;
    }

    match algorithm.process(&AlscParams::from(&region.alsc), stats, alsc.scratch) {
        Ok(out) if out.gain.len() == ALSC_GRID_POINTS && out.mean.len() == ALSC_GRID_POINTS => {
            let gain = out.gain.iter().map(|&g| quantize(g, 0, GRID_GAIN)).collect();
            let mean = out.mean.iter().map(|&m| quantize(m, 0, GRID_MEAN)).collect();
            Some((gain, mean))
        }
        Ok(_) => {
            log::error!("ALSC output does not cover the {ALSC_GRID_POINTS} grid points");
            None
        }
        Err(err) => {
            log::error!("ALSC calculation failed: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::{AlgorithmError, GridOutput};
    use ispiq_tuning::{AlscParameters, MESH_ROLLOFF_SIZE};

    struct Scale(f32);

    impl CorrectionAlgorithm for Scale {
        fn process(
            &mut self,
            config: &CorrectionConfig,
            _stats: &BgStats,
            input: &GainTables,
        ) -> Result<GainTables, AlgorithmError> {
            assert_eq!(config.table_width * config.table_height, input.len());
            Ok(input.zip_with(input, |g, _| g * self.0))
        }
    }

    struct Failing;

    impl CorrectionAlgorithm for Failing {
        fn process(
            &mut self,
            _config: &CorrectionConfig,
            _stats: &BgStats,
            _input: &GainTables,
        ) -> Result<GainTables, AlgorithmError> {
            Err(AlgorithmError::Failed("no convergence".into()))
        }
    }

    struct FlatGrid;

    impl GridAlgorithm for FlatGrid {
        fn process(
            &mut self,
            _params: &AlscParams,
            _stats: &BgStats,
            scratch: &mut [u32],
        ) -> Result<GridOutput, AlgorithmError> {
            scratch[0] = 1;
            Ok(GridOutput {
                gain: vec![5000.0; ALSC_GRID_POINTS],
                mean: vec![300.4; ALSC_GRID_POINTS],
            })
        }
    }

    fn geometry() -> GeometryCache {
        GeometryCache {
            full_res_width: 4000,
            full_res_height: 3000,
            width: 4000,
            height: 3000,
            scale: 1.0,
            ..Default::default()
        }
    }

    fn region(gain: f32) -> LscRegionData {
        LscRegionData {
            gains: GainTables::filled(MESH_ROLLOFF_SIZE, gain),
            alsc: AlscParameters::default(),
        }
    }

    fn input<'a>(
        geometry: &'a GeometryCache,
        region: &'a LscRegionData,
        reserve: &'a LscReserve,
        scratch: &'a mut [u32],
    ) -> SettingInput<'a> {
        SettingInput {
            bank: Bank::Bank1,
            geometry,
            crop: CropWindow::from_size(4000, 3000),
            region,
            reserve,
            alsc_enable: false,
            tintless_enable: false,
            tintless: None,
            alsc: AlscInput {
                stats: None,
                algorithm: None,
                scratch,
            },
        }
    }

    #[test]
    fn quantize_gains() {
        assert_eq!(quantize(1.0, GAIN_Q_FACTOR, GAIN), 1024);
        assert_eq!(quantize(2.5, GAIN_Q_FACTOR, GAIN), 2560);
        assert_eq!(quantize(7.999, GAIN_Q_FACTOR, GAIN), 8191);
        assert_eq!(quantize(20.0, GAIN_Q_FACTOR, GAIN), 8191);
        assert_eq!(quantize(-1.0, GAIN_Q_FACTOR, GAIN), 0);
    }

    #[test]
    fn calculate_plain() -> Result<(), LscError> {
        let (geometry, region, reserve) = (geometry(), region(1.5), LscReserve::default());
        let mut scratch = vec![];
        let mut ratio = None;
        let params = calculate(input(&geometry, &region, &reserve, &mut scratch), &mut ratio)?;

        assert!(params.enable);
        assert_eq!(params.bank, Bank::Bank1);
        assert_eq!(params.tables.len(), 17 * 13);
        assert!(params.tables.r.iter().all(|&g| g == 1536));
        assert_eq!(params.luma_weight_base_scale, 1024);
        assert!(ratio.is_none());
        Ok(())
    }

    #[test]
    fn correction_ratio_is_reapplied() -> Result<(), LscError> {
        let (geometry, region, reserve) = (geometry(), region(2.0), LscReserve::default());
        let chromatix = TintlessChromatix::default();
        let stats = BgStats::default();
        let mut algorithm = Scale(1.5);
        let mut scratch = vec![];
        let mut ratio = None;

        let mut setting = input(&geometry, &region, &reserve, &mut scratch);
        setting.tintless_enable = true;
        setting.tintless = Some(TintlessInput {
            chromatix: &chromatix,
            stats: &stats,
            algorithm: &mut algorithm,
        });
        let params = calculate(setting, &mut ratio)?;
        assert!(params.tables.gr.iter().all(|&g| g == 3072));
        assert!(ratio.is_some());

        // disabled afterwards: the stored ratio still applies
        let params = calculate(input(&geometry, &region, &reserve, &mut scratch), &mut ratio)?;
        assert!(params.tables.b.iter().all(|&g| g == 3072));
        Ok(())
    }

    #[test]
    fn failed_correction_uses_raw_table() -> Result<(), LscError> {
        let (geometry, region, reserve) = (geometry(), region(2.0), LscReserve::default());
        let chromatix = TintlessChromatix::default();
        let stats = BgStats::default();
        let mut algorithm = Failing;
        let mut scratch = vec![];
        let mut ratio = Some(GainTables::filled(17 * 13, 1.5));

        let mut setting = input(&geometry, &region, &reserve, &mut scratch);
        setting.tintless_enable = true;
        setting.tintless = Some(TintlessInput {
            chromatix: &chromatix,
            stats: &stats,
            algorithm: &mut algorithm,
        });
        let params = calculate(setting, &mut ratio)?;
        assert!(params.tables.r.iter().all(|&g| g == 2048));
        Ok(())
    }

    #[test]
    fn alsc_grid() -> Result<(), LscError> {
        let (geometry, region, reserve) = (geometry(), region(1.0), LscReserve::default());
        let stats = BgStats::default();
        let mut grid = FlatGrid;
        let mut scratch = vec![0; ALSC_SCRATCH_BUFFER_SIZE_DWORDS];
        let mut ratio = None;

        let mut setting = input(&geometry, &region, &reserve, &mut scratch);
        setting.alsc_enable = true;
        setting.alsc.stats = Some(&stats);
        setting.alsc.algorithm = Some(&mut grid);
        let params = calculate(setting, &mut ratio)?;
        assert!(params.alsc_enable);
        assert!(params.grid_gain.iter().all(|&g| g == 4095));
        assert!(params.grid_mean.iter().all(|&m| m == 300));
        assert_eq!(scratch[0], 1);
        Ok(())
    }

    #[test]
    fn alsc_without_stats_is_disabled() -> Result<(), LscError> {
        let (geometry, region, reserve) = (geometry(), region(1.0), LscReserve::default());
        let mut grid = FlatGrid;
        let mut scratch = vec![0; ALSC_SCRATCH_BUFFER_SIZE_DWORDS];
        let mut ratio = None;

        let mut setting = input(&geometry, &region, &reserve, &mut scratch);
        setting.alsc_enable = true;
        setting.alsc.algorithm = Some(&mut grid);
        let params = calculate(setting, &mut ratio)?;
        assert!(!params.alsc_enable);
        assert!(params.grid_gain.iter().all(|&g| g == 0));
        Ok(())
    }

    #[test]
    fn alsc_small_scratch_is_disabled() -> Result<(), LscError> {
        let (geometry, region, reserve) = (geometry(), region(1.0), LscReserve::default());
        let stats = BgStats::default();
        let mut grid = FlatGrid;
        let mut scratch = vec![0; 16];
        let mut ratio = None;

        let mut setting = input(&geometry, &region, &reserve, &mut scratch);
        setting.alsc_enable = true;
        setting.alsc.stats = Some(&stats);
        setting.alsc.algorithm = Some(&mut grid);
        assert!(!calculate(setting, &mut ratio)?.alsc_enable);
        Ok(())
    }
}
