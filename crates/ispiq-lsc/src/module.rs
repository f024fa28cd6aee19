use ispiq_hw::{CmdBuffer, DmiBuffer};
use ispiq_tuning::MESH_ROLLOFF_SIZE;

use crate::{
    algo::{AlgorithmHandle, AlgorithmLoader, CorrectionAlgorithm, GridAlgorithm},
    config::LscModuleConfig,
    dependency::{check_dependence, DependencyContext},
    error::{ErrorKind, LscError},
    hw::LscHwSetting,
    input::{FrameInput, ShadingMode},
    output::{FrameOutput, LensShadingInfo},
    setting::{self, AlscInput, SettingInput, TintlessInput},
    state::{Bank, ModuleState},
    stripe::{self, StripeRegisters, StripingPlan},
};

/// Lens shading correction module of one pipeline node.
///
/// Call [`LensShadingModule::execute`] once per frame, or once per stripe of a striped
/// frame after [`LensShadingModule::prepare_striping`]. Calls for one instance must be
/// serialized by the caller.
///
/// # Examples
///
/// ```
/// use ispiq_hw::{CmdBuffer, DmiBuffer};
/// use ispiq_lsc::{FrameInput, LensShadingModule, LscModuleConfig, NoAlgorithms, SensorGeometry};
/// use ispiq_tuning::TriggerData;
///
/// let mut module = LensShadingModule::new(LscModuleConfig::default(), &NoAlgorithms)?;
/// let mut cmd = CmdBuffer::new(module.cmd_size_dwords());
/// let mut dmi = DmiBuffer::new(0, module.dmi_length_dwords());
///
/// // no tuning data: the module stays disabled and publishes a unity map
/// let input = FrameInput::new(1, SensorGeometry::full_resolution(4000, 3000), TriggerData::default());
/// let output = module.execute(&input, &mut cmd, &mut dmi)?;
/// assert!(!output.rolloff_enable);
/// assert!(output.lens_shading.map.iter().all(|&g| g == 1.0));
/// # Ok::<(), ispiq_lsc::LscError>(())
/// ```
pub struct LensShadingModule {
    config: LscModuleConfig,
    hw: LscHwSetting,
    state: ModuleState,
    correction: AlgorithmHandle<dyn CorrectionAlgorithm>,
    grid: AlgorithmHandle<dyn GridAlgorithm>,
}

impl LensShadingModule {
    /// Creates a module instance.
    ///
    /// # Arguments
    ///
    /// * `config` - The static configuration.
    /// * `loader` - Resolves the optional external algorithms.
    ///
    /// # Errors
    ///
    /// Returns [`LscError::UnsupportedHardware`] for an unknown hardware version and
    /// [`LscError::OutOfMemory`] if the scratch memory cannot be allocated.
    pub fn new(config: LscModuleConfig, loader: &dyn AlgorithmLoader) -> Result<Self, LscError> {
        let hw = LscHwSetting::new(config.titan_version)?;

        let (scratch_dwords, grid) = if hw.supports_alsc() {
            (config.alsc_scratch_dwords, AlgorithmHandle::from(loader.load_grid()))
        } else {
            (0, AlgorithmHandle::Absent)
        };
        let state = ModuleState::new(scratch_dwords)?;

        let correction = AlgorithmHandle::from(loader.load_correction());
        if !correction.is_loaded() {
            log::warn!("Tintless algorithm not available, using interpolated tables only");
        }
        if hw.supports_alsc() && !grid.is_loaded() {
            log::warn!("ALSC algorithm not available");
        }

        log::info!(
            "Lens shading module created for hardware {:#x} ({} command dwords, {} DMI dwords)",
            config.titan_version,
            hw.cmd_size_dwords(),
            hw.dmi_length_dwords()
        );

        Ok(Self {
            config,
            hw,
            state,
            correction,
            grid,
        })
    }

    /// The static configuration.
    #[inline]
    pub fn config(&self) -> &LscModuleConfig {
        &self.config
    }

    /// The persistent module state.
    #[inline]
    pub fn state(&self) -> &ModuleState {
        &self.state
    }

    /// The register layout of the hardware generation.
    #[inline]
    pub fn hw_setting(&self) -> &LscHwSetting {
        &self.hw
    }

    /// The bank the next configuration is written to.
    #[inline]
    pub fn bank(&self) -> Bank {
        self.state.bank()
    }

    /// Whether the module is enabled for the last frame.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.state.is_enabled()
    }

    /// Command dwords one execution may write.
    pub fn cmd_size_dwords(&self) -> usize {
        self.hw.cmd_size_dwords()
    }

    /// DMI dwords one execution writes, per stripe.
    pub fn dmi_length_dwords(&self) -> usize {
        self.hw.dmi_length_dwords()
    }

    fn dependency_context(&self) -> DependencyContext {
        DependencyContext {
            tintless_allowed: self.config.tintless_enable,
            supports_alsc: self.hw.supports_alsc(),
            correction_needs_update: self.correction.get().is_some_and(|algo| algo.needs_update()),
        }
    }

    /// Plans the stripes of a frame ahead of the per-stripe executions.
    ///
    /// Runs the dependency check for the whole frame and, if the frame needs a new
    /// configuration, the mesh geometry only. The decision is reused by every
    /// [`execute`](Self::execute) call of the same request.
    ///
    /// # Arguments
    ///
    /// * `input` - The frame input.
    /// * `count` - Number of stripes.
    ///
    /// A stream that cannot be split or holds no mesh disables the module for the request
    /// and yields a disabled, empty plan; the stripes of that request then only write the
    /// module enable.
    ///
    /// # Errors
    ///
    /// Only errors that are not recoverable are returned.
    pub fn prepare_striping(&mut self, input: &FrameInput<'_>, count: usize) -> Result<StripingPlan, LscError> {
        let ctx = self.dependency_context();
        let changed = check_dependence(&mut self.state, &ctx, input, true);

        match self.plan_stripes(changed, count) {
            Ok(plan) => Ok(plan),
            Err(err) if err.is_recoverable() => {
                log::warn!(
                    "Request {}: lens shading disabled for this frame: {err}",
                    input.request_id
                );
                self.state.module_enable = false;
                if let Some(stripe) = self.state.stripe.as_mut() {
                    stripe.changed = false;
                    stripe.mesh = None;
                    stripe.stripes.clear();
                }
                Ok(StripingPlan::default())
            }
            Err(err) => Err(err),
        }
    }

    fn plan_stripes(&mut self, changed: bool, count: usize) -> Result<StripingPlan, LscError> {
        let mesh = if changed {
            Some(setting::calculate_geometry(&self.state.geometry)?.1)
        } else {
            self.state.unpacked.as_ref().map(|params| params.mesh)
        };

        let stripes: Vec<StripeRegisters> = match mesh.as_ref() {
            Some(mesh) => stripe::split(self.state.geometry.width, count)?
                .into_iter()
                .map(|stripe| StripeRegisters::new(stripe, mesh))
                .collect(),
            None => Vec::new(),
        };

        if let Some(stripe) = self.state.stripe.as_mut() {
            stripe.mesh = mesh;
            stripe.stripes = stripes.clone();
        }

        Ok(StripingPlan {
            enable: self.state.module_enable,
            changed,
            mesh,
            stripes,
        })
    }

    /// Runs the module for one frame, or one stripe of a frame.
    ///
    /// # Arguments
    ///
    /// * `input` - The frame input.
    /// * `cmd` - Command buffer of the frame or stripe.
    /// * `dmi` - DMI buffer of the frame; stripes use consecutive regions.
    ///
    /// # Errors
    ///
    /// Returns [`LscError::Hw`] with a packing overflow if a buffer is too small; nothing
    /// is written and the next frame retries. Invalid inputs disable the module for the
    /// frame instead of failing.
    pub fn execute(
        &mut self,
        input: &FrameInput<'_>,
        cmd: &mut CmdBuffer,
        dmi: &mut DmiBuffer,
    ) -> Result<FrameOutput, LscError> {
        let request_id = input.request_id;
        if let Some(stripe) = input.stripe.filter(|s| s.index >= s.count) {
            return Err(LscError::InvalidStripe(stripe.index, stripe.count));
        }
        let last_pass = input.stripe.map_or(true, |s| s.is_last());
        let dmi_offset =
            self.config.dmi_base_dwords + input.stripe.map_or(0, |s| s.index) * self.hw.dmi_length_dwords();

        let ctx = self.dependency_context();
        let changed = check_dependence(&mut self.state, &ctx, input, false);

        if let Some(bank) = input.bank_update {
            self.state.bank = bank;
        }

        let mut packed = false;
        if changed {
            if let Err(err) = self.calculate(input) {
                if !err.is_recoverable() {
                    return Err(err);
                }
                log::warn!("Request {request_id}: lens shading disabled for this frame: {err}");
                self.state.module_enable = false;
            }
        }

        if changed && self.state.module_enable {
            if let Some(params) = self.state.unpacked.as_ref() {
                let mesh = match (input.stripe, self.state.stripe.as_ref()) {
                    (Some(stripe), Some(planned)) => planned.mesh_for(request_id, &stripe, &params.mesh),
                    (Some(stripe), None) => params.mesh.for_stripe(stripe.x_offset),
                    (None, _) => params.mesh,
                };
                match self.hw.pack(params, &mesh, cmd, dmi, dmi_offset) {
                    Ok(()) => {
                        packed = true;
                        self.state.pack_pending = false;
                    }
                    Err(err) if err.kind() == ErrorKind::PackingOverflow => {
                        log::error!("Request {request_id}: {err}");
                        self.state.pack_pending = true;
                        return Err(err);
                    }
                    Err(err) => {
                        log::warn!("Request {request_id}: lens shading disabled for this frame: {err}");
                        self.state.module_enable = false;
                    }
                }
            }
        }

        let enable = self.state.module_enable && self.state.unpacked.is_some();
        if !packed && (!enable || enable != self.state.programmed_enable) {
            self.hw.pack_enable_only(enable, cmd)?;
        }

        if last_pass {
            self.state.programmed_enable = enable;
            if packed {
                self.state.bank = self.state.bank.toggle();
            }
        }
        self.state.awb_lock_held = input.hal.is_some_and(|hal| hal.awb_lock);

        if packed && self.config.register_dump {
            self.hw.dump_registers();
        }

        let tuning_metadata = input
            .export_tuning_metadata
            .then(|| self.hw.tuning_metadata());

        Ok(FrameOutput {
            rolloff_enable: self.state.module_enable,
            lens_shading: self.lens_shading_info(),
            dependency_changed: changed,
            recomputed: packed,
            bank: self.state.bank,
            tuning_metadata,
        })
    }

    // interpolates, calibrates and corrects the tables for the cached triggers
    fn calculate(&mut self, input: &FrameInput<'_>) -> Result<(), LscError> {
        if input.stripe.is_some() && self.state.calculated_request == Some(input.request_id) {
            return Ok(());
        }

        let chromatix = self
            .state
            .chromatix
            .clone()
            .ok_or(LscError::MissingInput("lens shading chromatix"))?;
        let triggers = self.state.triggers;

        let mut region = chromatix.interpolate(&triggers)?;
        region.gains.validate(MESH_ROLLOFF_SIZE)?;
        let cct = chromatix.trigger_values(&triggers).cct;
        region.gains = self
            .state
            .calibration
            .calibrate(&region.gains, &chromatix.golden, cct)?;
        self.state.map_gains = Some(region.gains.clone());

        let tintless = match (
            self.state.tintless_chromatix.as_deref(),
            input.tintless_stats,
            self.correction.get_mut(),
        ) {
            (Some(chromatix), Some(stats), Some(algorithm))
                if self.state.enable_tintless && !self.state.awb_lock_held =>
            {
                Some(TintlessInput {
                    chromatix,
                    stats,
                    algorithm,
                })
            }
            _ => None,
        };
        if self.state.enable_tintless && tintless.is_none() {
            log::debug!("Request {}: tintless correction skipped", input.request_id);
        }

        let params = setting::calculate(
            SettingInput {
                bank: self.state.bank,
                geometry: &self.state.geometry,
                crop: self.state.crop,
                region: &region,
                reserve: &chromatix.reserve,
                alsc_enable: self.state.alsc_enable,
                tintless_enable: tintless.is_some(),
                tintless,
                alsc: AlscInput {
                    stats: input.awb_stats,
                    algorithm: self.grid.get_mut().map(|algo| algo as &mut dyn GridAlgorithm),
                    scratch: &mut self.state.alsc_scratch,
                },
            },
            &mut self.state.correction_ratio,
        )?;

        log::debug!(
            "Request {}: lens shading mesh {}x{} for bank {:?}",
            input.request_id,
            params.mesh.points_h(),
            params.mesh.points_v(),
            params.bank
        );
        self.state.unpacked = Some(params);
        self.state.calculated_request = Some(input.request_id);
        Ok(())
    }

    fn lens_shading_info(&self) -> LensShadingInfo {
        let state = &self.state;
        if !state.module_enable {
            return LensShadingInfo::unity(ShadingMode::Off, state.map_mode);
        }
        match state.map_gains.as_ref() {
            Some(gains) => LensShadingInfo::from_gains(gains, state.shading_mode, state.map_mode),
            None => LensShadingInfo::unity(state.shading_mode, state.map_mode),
        }
    }
}

impl std::fmt::Debug for LensShadingModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LensShadingModule")
            .field("config", &self.config)
            .field("hw", &self.hw)
            .field("bank", &self.state.bank)
            .field("enabled", &self.state.module_enable)
            .field("correction", &self.correction)
            .field("grid", &self.grid)
            .finish()
    }
}
