use ispiq_tuning::{AlscParameters, GainTables, TintlessRegionData};

use crate::input::{BgStats, ChannelValues};

/// Luma coefficients of the adaptive shading algorithm, Q10.
pub const ALSC_LUMA_COEFFICIENTS: (u16, u16, u16) = (306, 601, 117);

/// Number of horizontal cells of the adaptive shading grid.
pub const ALSC_GRID_H: usize = 16;

/// Number of vertical cells of the adaptive shading grid.
pub const ALSC_GRID_V: usize = 12;

/// Number of points of the adaptive shading grid.
pub const ALSC_GRID_POINTS: usize = (ALSC_GRID_H + 1) * (ALSC_GRID_V + 1);

const ALSC_PARAM_MAX: f32 = 4095.0;

/// An error reported by an external algorithm.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AlgorithmError {
    /// The algorithm rejected its input.
    #[error("Invalid algorithm input: {0}")]
    InvalidInput(String),

    /// The algorithm failed to produce a result.
    #[error("Algorithm failed: {0}")]
    Failed(String),
}

/// Tintless parameters handed to the correction algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TintlessParams {
    /// Weight of the image center.
    pub center_weight: f32,
    /// Weight of the image corners.
    pub corner_weight: f32,
    /// High accuracy mode.
    pub high_accuracy: u8,
    /// Percentage of the trace kept between frames.
    pub trace_percentage: f32,
    /// Number of frames between two updates.
    pub update_delay: u8,
    /// Correction strength.
    pub correction_strength: u8,
    /// Correction thresholds.
    pub thresholds: [u8; 16],
}

impl From<&TintlessRegionData> for TintlessParams {
    fn from(data: &TintlessRegionData) -> Self {
        let to_u8 = |v: f32| v.round().clamp(0.0, u8::MAX as f32) as u8;
        Self {
            center_weight: data.center_weight,
            corner_weight: data.corner_weight,
            high_accuracy: u8::from(data.high_accuracy_mode),
            trace_percentage: data.trace_percentage,
            update_delay: data.update_delay,
            // truncated, unlike the rounded thresholds
            correction_strength: data.thresholds[0].clamp(0.0, u8::MAX as f32) as u8,
            thresholds: data.thresholds.map(to_u8),
        }
    }
}

/// Configuration of one correction algorithm run.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionConfig {
    /// Width of one subgrid in pixels.
    pub subgrid_width: u32,
    /// Height of one subgrid in pixels.
    pub subgrid_height: u32,
    /// Horizontal offset of the mesh origin in pixels.
    pub horizontal_offset: u32,
    /// Vertical offset of the mesh origin in pixels.
    pub vertical_offset: u32,
    /// Number of mesh points per row.
    pub table_width: usize,
    /// Number of mesh rows.
    pub table_height: usize,
    /// Number of subgrids per block.
    pub num_subgrids: u32,
    /// Tintless tuning.
    pub params: TintlessParams,
    /// Per-channel saturation limits of the statistics.
    pub saturation_limit: ChannelValues<u32>,
}

impl CorrectionConfig {
    /// Saturation limits derived from the statistics thresholds.
    ///
    /// Each limit is the channel threshold minus one, floored at zero.
    pub fn saturation_limits(stats: &BgStats) -> ChannelValues<u32> {
        let thresholds = stats.config.channel_gain_threshold;
        if [thresholds.r, thresholds.gr, thresholds.gb, thresholds.b].contains(&0) {
            log::warn!(
                "Zero channel gain threshold in statistics ({}, {}, {}, {})",
                thresholds.r,
                thresholds.gr,
                thresholds.gb,
                thresholds.b
            );
        }
        thresholds.map(|t| t.saturating_sub(1))
    }
}

/// An external algorithm correcting the rolloff mesh from live statistics.
pub trait CorrectionAlgorithm {
    /// Corrects `input`, a mesh of `config.table_width` x `config.table_height` points.
    ///
    /// # Returns
    ///
    /// The corrected mesh, with the size of `input`.
    fn process(
        &mut self,
        config: &CorrectionConfig,
        stats: &BgStats,
        input: &GainTables,
    ) -> Result<GainTables, AlgorithmError>;

    /// Whether the algorithm wants a new calculation regardless of the triggers.
    fn needs_update(&self) -> bool {
        false
    }
}

/// Adaptive shading parameters handed to the grid algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlscParams {
    /// Gain applied in bright areas.
    pub adaptive_gain_high: u16,
    /// Gain applied in dark areas.
    pub adaptive_gain_low: u16,
    /// Strength of the highlight gain.
    pub highlight_gain_strength: u16,
    /// Strength of the lowlight gain.
    pub lowlight_gain_strength: u16,
    /// Luma threshold of highlights.
    pub threshold_highlight: u16,
    /// Luma threshold of lowlights.
    pub threshold_lowlight: u16,
    /// Red luma coefficient.
    pub c_r: u16,
    /// Green luma coefficient.
    pub c_g: u16,
    /// Blue luma coefficient.
    pub c_b: u16,
    /// Max channel coefficient.
    pub c_max: u16,
}

impl From<&AlscParameters> for AlscParams {
    fn from(params: &AlscParameters) -> Self {
        let clamp = |v: f32| v.clamp(0.0, ALSC_PARAM_MAX) as u16;
        let (c_r, c_g, c_b) = ALSC_LUMA_COEFFICIENTS;
        Self {
            adaptive_gain_high: clamp(params.adaptive_gain_high),
            adaptive_gain_low: clamp(params.adaptive_gain_low),
            highlight_gain_strength: clamp(params.highlight_gain_strength),
            lowlight_gain_strength: clamp(params.lowlight_gain_strength),
            threshold_highlight: clamp(params.threshold_highlight),
            threshold_lowlight: clamp(params.threshold_lowlight),
            c_r,
            c_g,
            c_b,
            c_max: 0,
        }
    }
}

/// Grid gains and means produced by the adaptive shading algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct GridOutput {
    /// Per-point grid gain, [`ALSC_GRID_POINTS`] entries in row-major order.
    pub gain: Vec<f32>,
    /// Per-point grid mean, [`ALSC_GRID_POINTS`] entries in row-major order.
    pub mean: Vec<f32>,
}

/// An external algorithm computing the adaptive shading grid from AWB statistics.
pub trait GridAlgorithm {
    /// Computes the grid.
    ///
    /// # Arguments
    ///
    /// * `params` - The clamped adaptive shading parameters.
    /// * `stats` - The AWB Bayer grid statistics.
    /// * `scratch` - Module-owned scratch memory.
    fn process(
        &mut self,
        params: &AlscParams,
        stats: &BgStats,
        scratch: &mut [u32],
    ) -> Result<GridOutput, AlgorithmError>;
}

/// An optional external algorithm.
pub enum AlgorithmHandle<A: ?Sized> {
    /// The algorithm could not be loaded.
    Absent,
    /// The loaded algorithm.
    Loaded(Box<A>),
}

impl<A: ?Sized> AlgorithmHandle<A> {
    /// Returns true if the algorithm was loaded.
    pub fn is_loaded(&self) -> bool {
        matches!(self, AlgorithmHandle::Loaded(_))
    }

    /// Borrows the algorithm, if loaded.
    pub fn get(&self) -> Option<&A> {
        match self {
            AlgorithmHandle::Absent => None,
            AlgorithmHandle::Loaded(algo) => Some(algo.as_ref()),
        }
    }

    /// Mutably borrows the algorithm, if loaded.
    pub fn get_mut(&mut self) -> Option<&mut A> {
        match self {
            AlgorithmHandle::Absent => None,
            AlgorithmHandle::Loaded(algo) => Some(algo.as_mut()),
        }
    }
}

impl<A: ?Sized> From<Option<Box<A>>> for AlgorithmHandle<A> {
    fn from(algo: Option<Box<A>>) -> Self {
        algo.map_or(AlgorithmHandle::Absent, AlgorithmHandle::Loaded)
    }
}

impl<A: ?Sized> std::fmt::Debug for AlgorithmHandle<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlgorithmHandle::Absent => write!(f, "Absent"),
            AlgorithmHandle::Loaded(_) => write!(f, "Loaded"),
        }
    }
}

/// Resolves the external algorithms once, when a module is created.
pub trait AlgorithmLoader {
    /// Loads the rolloff correction (tintless) algorithm.
    fn load_correction(&self) -> Option<Box<dyn CorrectionAlgorithm>>;

    /// Loads the adaptive shading grid algorithm.
    fn load_grid(&self) -> Option<Box<dyn GridAlgorithm>>;
}

/// A loader without any algorithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAlgorithms;

impl AlgorithmLoader for NoAlgorithms {
    fn load_correction(&self) -> Option<Box<dyn CorrectionAlgorithm>> {
        None
    }

    fn load_grid(&self) -> Option<Box<dyn GridAlgorithm>> {
        None
    }
}
