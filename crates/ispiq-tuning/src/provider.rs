use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chromatix::{LscChromatix, TintlessChromatix};

/// One selection parameter of the tuning data (sensor mode, usecase, scene, ...).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TuningMode {
    /// Selection parameter type.
    pub mode: u16,
    /// Selected value.
    pub sub_mode: u16,
}

/// Tuning data manager collaborator.
///
/// Resolves the chromatix of a module for the current tuning modes. Returned chromatix are
/// shared and read-only; their identity may change between frames.
pub trait TuningProvider {
    /// Whether the loaded tuning data can be used.
    fn is_valid(&self) -> bool;

    /// The lens shading chromatix for the given modes.
    fn lsc_chromatix(&self, modes: &[TuningMode]) -> Option<Arc<LscChromatix>>;

    /// The tintless chromatix for the given modes.
    fn tintless_chromatix(&self, modes: &[TuningMode]) -> Option<Arc<TintlessChromatix>>;
}

/// A [`TuningProvider`] over tuning data already held in memory.
///
/// Chromatix registered for a specific mode take precedence over the default one when
/// that mode is requested.
#[derive(Debug, Clone, Default)]
pub struct StaticTuning {
    lsc: Option<Arc<LscChromatix>>,
    tintless: Option<Arc<TintlessChromatix>>,
    lsc_overrides: Vec<(TuningMode, Arc<LscChromatix>)>,
}

impl StaticTuning {
    /// Creates a provider serving the same chromatix for every mode.
    pub fn new(lsc: Option<LscChromatix>, tintless: Option<TintlessChromatix>) -> Self {
        Self {
            lsc: lsc.map(Arc::new),
            tintless: tintless.map(Arc::new),
            lsc_overrides: Vec::new(),
        }
    }

    /// Registers a lens shading chromatix for one mode.
    pub fn with_lsc_override(mut self, mode: TuningMode, chromatix: LscChromatix) -> Self {
        self.lsc_overrides.push((mode, Arc::new(chromatix)));
        self
    }
}

impl TuningProvider for StaticTuning {
    fn is_valid(&self) -> bool {
        self.lsc.is_some() || !self.lsc_overrides.is_empty()
    }

    fn lsc_chromatix(&self, modes: &[TuningMode]) -> Option<Arc<LscChromatix>> {
        self.lsc_overrides
            .iter()
            .find(|(mode, _)| modes.contains(mode))
            .map(|(_, chromatix)| chromatix.clone())
            .or_else(|| self.lsc.clone())
    }

    fn tintless_chromatix(&self, _modes: &[TuningMode]) -> Option<Arc<TintlessChromatix>> {
        self.tintless.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromatix::LscRegionData;
    use crate::tree::TuningNode;

    fn chromatix(id: u32) -> LscChromatix {
        LscChromatix {
            symbol_table_id: id,
            enable: Default::default(),
            control_method: Default::default(),
            private_information: Default::default(),
            reserve: Default::default(),
            core: TuningNode::Leaf(LscRegionData::default()),
            golden: vec![],
        }
    }

    #[test]
    fn mode_override() {
        let video = TuningMode { mode: 2, sub_mode: 1 };
        let tuning = StaticTuning::new(Some(chromatix(1)), None).with_lsc_override(video, chromatix(2));
        assert!(tuning.is_valid());

        let id = |modes: &[TuningMode]| tuning.lsc_chromatix(modes).map(|c| c.symbol_table_id);
        assert_eq!(id(&[]), Some(1));
        assert_eq!(id(&[TuningMode::default(), video]), Some(2));
        assert!(tuning.tintless_chromatix(&[]).is_none());
    }

    #[test]
    fn empty_provider_is_invalid() {
        let tuning = StaticTuning::default();
        assert!(!tuning.is_valid());
        assert!(tuning.lsc_chromatix(&[]).is_none());
    }
}
