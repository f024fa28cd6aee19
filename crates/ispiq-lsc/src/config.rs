use serde::{Deserialize, Serialize};

/// Titan 150 hardware version.
pub const TITAN_150: u32 = 0x150;
/// Titan 160 hardware version.
pub const TITAN_160: u32 = 0x160;
/// Titan 170 hardware version.
pub const TITAN_170: u32 = 0x170;
/// Titan 175 hardware version.
pub const TITAN_175: u32 = 0x175;
/// Titan 480 hardware version.
pub const TITAN_480: u32 = 0x480;

/// Minimum size of the adaptive lens shading scratch buffer, in dwords.
pub const ALSC_SCRATCH_BUFFER_SIZE_DWORDS: usize = 4 * 17 * 13 * 8;

/// Static configuration of a lens shading module instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LscModuleConfig {
    /// Hardware version of the ISP, selecting the register layout.
    pub titan_version: u32,
    /// Allows the tintless correction algorithm to run.
    pub tintless_enable: bool,
    /// Dumps the packed registers at trace level after each calculation.
    pub register_dump: bool,
    /// Size of the adaptive lens shading scratch buffer, in dwords.
    pub alsc_scratch_dwords: usize,
    /// Offset of the module tables inside the DMI buffer, in dwords.
    pub dmi_base_dwords: usize,
}

impl Default for LscModuleConfig {
    fn default() -> Self {
        Self {
            titan_version: TITAN_480,
            tintless_enable: true,
            register_dump: false,
            alsc_scratch_dwords: ALSC_SCRATCH_BUFFER_SIZE_DWORDS,
            dmi_base_dwords: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_from_json() -> Result<(), serde_json::Error> {
        let config: LscModuleConfig =
            serde_json::from_str(r#"{ "titan_version": 368, "register_dump": true }"#)?;
        assert_eq!(config.titan_version, TITAN_170);
        assert!(config.register_dump);
        assert!(config.tintless_enable);
        assert_eq!(config.alsc_scratch_dwords, ALSC_SCRATCH_BUFFER_SIZE_DWORDS);
        Ok(())
    }
}
