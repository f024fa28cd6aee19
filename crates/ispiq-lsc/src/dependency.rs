use std::sync::Arc;

use crate::{
    input::{DynamicEnableMask, FrameInput, LensShadingMapMode, ShadingMode},
    state::{GeometryCache, ModuleState},
    stripe::StripeState,
};

/// Module-level facts the dependency check needs besides the frame input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DependencyContext {
    /// The static configuration allows the correction algorithm.
    pub tintless_allowed: bool,
    /// The hardware generation has adaptive shading.
    pub supports_alsc: bool,
    /// The loaded correction algorithm asks for a new calculation.
    pub correction_needs_update: bool,
}

fn same_chromatix<T>(cached: &Option<Arc<T>>, incoming: &Option<Arc<T>>) -> bool {
    match (cached, incoming) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Decides whether the frame needs a new configuration.
///
/// The checks run in a fixed order, each one free to overwrite the outcome of the
/// previous ones:
///
/// 1. a stripe of a frame already decided reuses that decision;
/// 2. missing application controls, triggers or tuning disable the module;
/// 3. an OEM setting imposes the enable, otherwise the tuning chromatix decides it;
/// 4. moved triggers, a correction algorithm update, a new geometry, a forced update or
///    a pending pack mark a change;
/// 5. the dynamic enable mask and the shading mode can disable the module;
/// 6. the skip flag, a manual color transform and the AWB/AE locks suppress the change.
///
/// # Arguments
///
/// * `state` - The module state, updated with the new cached signals.
/// * `ctx` - Module-level facts.
/// * `input` - The frame input.
/// * `prepare` - Whether the call plans stripes ahead of the execution.
///
/// # Returns
///
/// True if the module is enabled and needs a new configuration.
pub(crate) fn check_dependence(
    state: &mut ModuleState,
    ctx: &DependencyContext,
    input: &FrameInput<'_>,
    prepare: bool,
) -> bool {
    if !prepare && input.stripe.is_some() {
        if let Some(stripe) = state
            .stripe
            .as_ref()
            .filter(|s| s.request_id == input.request_id)
        {
            state.dependency_changed = stripe.changed;
            return stripe.changed;
        }
    }

    let changed = evaluate(state, ctx, input);
    state.dependency_changed = changed;

    if prepare || input.stripe.is_some() {
        state.stripe = Some(StripeState {
            request_id: input.request_id,
            changed,
            mesh: None,
            stripes: Vec::new(),
        });
    }

    changed
}

fn disable(state: &mut ModuleState) -> bool {
    state.module_enable = false;
    false
}

fn evaluate(state: &mut ModuleState, ctx: &DependencyContext, input: &FrameInput<'_>) -> bool {
    let request_id = input.request_id;
    let (Some(hal), Some(triggers)) = (input.hal, input.triggers) else {
        log::error!("Request {request_id}: missing application controls or trigger data");
        return disable(state);
    };
    if input.tuning.is_none() && input.oem_setting.is_none() {
        log::error!("Request {request_id}: no tuning data manager and no OEM setting");
        return disable(state);
    }

    let was_enabled = state.module_enable;
    let mut changed = false;
    let mut structural_change = false;

    let base_enable = if let Some(oem) = input.oem_setting {
        state.shading_mode = ShadingMode::Fast;
        state.map_mode = LensShadingMapMode::Off;
        if state.chromatix.is_none() {
            state.chromatix = input
                .tuning
                .and_then(|tuning| tuning.lsc_chromatix(input.tuning_modes));
        }
        oem.lsc_enable
    } else {
        let Some(tuning) = input.tuning.filter(|tuning| tuning.is_valid()) else {
            log::error!("Request {request_id}: invalid tuning data");
            return disable(state);
        };
        state.shading_mode = hal.shading_mode;
        state.map_mode = hal.lens_shading_map_mode;

        if input.tuning_mode_changed || state.chromatix.is_none() {
            let chromatix = tuning.lsc_chromatix(input.tuning_modes);
            let tintless = tuning.tintless_chromatix(input.tuning_modes);

            let Some(incoming) = chromatix.as_ref() else {
                log::error!("Request {request_id}: no lens shading chromatix for the tuning modes");
                state.chromatix = None;
                state.tuning_enable = false;
                return disable(state);
            };

            let tuning_enable = incoming.enable.rolloff_enable;
            let enable_tintless = tintless.as_ref().is_some_and(|t| t.enable.tintless_en)
                && (input.register_bet_enabled || ctx.tintless_allowed);
            let identity_changed = !same_chromatix(&state.chromatix, &chromatix);

            if identity_changed
                || tuning_enable != state.tuning_enable
                || enable_tintless != state.enable_tintless
            {
                if identity_changed {
                    structural_change = true;
                    log::debug!(
                        "Request {request_id}: lens shading chromatix {} selected",
                        incoming.symbol_table_id
                    );
                    state.calibration.load(input.calibration);
                }
                state.chromatix = chromatix;
                state.tintless_chromatix = tintless;
                state.tuning_enable = tuning_enable;
                state.enable_tintless = enable_tintless;
                changed = tuning_enable;
            }
        }

        state.tuning_enable
    };

    if base_enable {
        changed |= state.triggers.check_update(&triggers);
        changed |= state.enable_tintless && ctx.correction_needs_update;
    }

    let geometry = GeometryCache::from_sensor(&input.sensor);
    if geometry != state.geometry {
        log::debug!(
            "Request {request_id}: stream geometry {}x{} scale {}",
            geometry.width,
            geometry.height,
            geometry.scale
        );
        state.geometry = geometry;
        changed = true;
        structural_change = true;
    }
    state.crop = input.sensor.camif_crop;
    changed |= input.force_trigger_update || state.pack_pending;

    let mask = input.dynamic_enable_mask;
    let dynamic_enable = mask.is_set(DynamicEnableMask::LSC);
    if dynamic_enable && !state.dynamic_enable && base_enable {
        changed = true;
    }
    state.dynamic_enable = dynamic_enable;
    state.module_enable = base_enable && dynamic_enable;
    state.alsc_enable = ctx.supports_alsc
        && mask.is_set(DynamicEnableMask::ALSC)
        && state.chromatix.as_ref().is_some_and(|c| c.enable.alsc_enable);

    if state.shading_mode == ShadingMode::Off {
        state.module_enable = false;
        changed = false;
    }

    // a module coming back on needs a configuration even if nothing else moved
    if state.module_enable && !was_enabled {
        changed = true;
        structural_change = true;
    }

    let unsuppressed = changed;
    if input.skip_correction_processing && state.enable_tintless && state.module_enable {
        log::trace!("Request {request_id}: correction processing skipped");
        changed = false;
    }
    if hal.is_manual_color_transform() {
        changed = false;
    }
    if hal.awb_lock || hal.ae_lock {
        log::trace!("Request {request_id}: 3A locked, keeping the previous configuration");
        changed = false;
    }
    if unsuppressed && !changed && structural_change {
        // a new geometry, chromatix or enable is programmed by the first frame not suppressed
        state.pack_pending = true;
    }

    changed && state.module_enable
}
