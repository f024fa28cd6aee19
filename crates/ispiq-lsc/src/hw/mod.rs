use ispiq_hw::{dmi::encode_table, BitField, CmdBuffer, DmiBuffer, DmiEntryLayout, DmiWrite, HwError};
use ispiq_tuning::MESH_ROLLOFF_SIZE;

use crate::{
    config::{TITAN_150, TITAN_160, TITAN_170, TITAN_175, TITAN_480},
    error::LscError,
    mesh::MeshRegisters,
    output::TuningMetadata,
    setting::UnpackedParameters,
    state::Bank,
};

/// LSC 3.4 register layout of the Titan 17x generation.
pub mod titan17x;

/// LSC 4.0 register layout of the Titan 480 generation.
pub mod titan480;

pub use titan17x::Lsc34Setting;
pub use titan480::Lsc40Setting;

/// DMI configuration register of the rolloff tables.
pub const LSC_DMI_CFG_REGISTER: u32 = 0xc24;

/// Largest number of entries of one DMI table.
pub const MAX_MESH_TABLE_DWORDS: usize = MESH_ROLLOFF_SIZE;

const DMI_SELECT_GR_R: [u32; 2] = [0x1a, 0x1b];
const DMI_SELECT_GB_B: [u32; 2] = [0x1c, 0x1d];
const DMI_SELECT_GRID: [u32; 2] = [0x1e, 0x1f];

/// One logical DMI table of a configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DmiTable<'a> {
    pub selector: u32,
    pub layout: DmiEntryLayout,
    pub low: &'a [u16],
    pub high: &'a [u16],
    pub len: usize,
}

impl<'a> DmiTable<'a> {
    /// The R|Gr mesh table.
    pub fn gr_r(params: &'a UnpackedParameters, len: usize) -> Self {
        Self {
            selector: DMI_SELECT_GR_R[bank_slot(params.bank)],
            layout: DmiEntryLayout::CHANNEL_PAIR,
            low: &params.tables.r,
            high: &params.tables.gr,
            len,
        }
    }

    /// The B|Gb mesh table.
    pub fn gb_b(params: &'a UnpackedParameters, len: usize) -> Self {
        Self {
            selector: DMI_SELECT_GB_B[bank_slot(params.bank)],
            layout: DmiEntryLayout::CHANNEL_PAIR,
            low: &params.tables.b,
            high: &params.tables.gb,
            len,
        }
    }

    /// The adaptive shading gain|mean grid.
    pub fn grid(params: &'a UnpackedParameters) -> Self {
        Self {
            selector: DMI_SELECT_GRID[bank_slot(params.bank)],
            layout: DmiEntryLayout::GAIN_MEAN,
            low: &params.grid_gain,
            high: &params.grid_mean,
            len: params.grid_gain.len(),
        }
    }
}

#[inline]
fn bank_slot(bank: Bank) -> usize {
    bank.index() as usize
}

/// Folds `(field, value)` pairs into one register word.
pub(crate) fn pack_fields(fields: &[(BitField, u32)]) -> u32 {
    fields
        .iter()
        .fold(0, |word, (field, value)| field.insert(word, *value))
}

/// Rejects tables that do not have their expected length or overflow the hardware maximum.
pub(crate) fn check_tables(tables: &[DmiTable<'_>]) -> Result<(), LscError> {
    for table in tables {
        if table.len > MAX_MESH_TABLE_DWORDS {
            return Err(LscError::MeshTooLarge(table.len, MAX_MESH_TABLE_DWORDS));
        }
        for values in [table.low, table.high] {
            if values.len() != table.len {
                return Err(HwError::TableLengthMismatch(values.len(), table.len).into());
            }
        }
    }
    Ok(())
}

/// Encodes the tables into consecutive DMI slots and references them from the command
/// stream.
///
/// Capacities must have been checked by the caller.
pub(crate) fn write_tables(
    tables: &[DmiTable<'_>],
    cmd: &mut CmdBuffer,
    dmi: &mut DmiBuffer,
    dmi_offset: usize,
) -> Result<(), LscError> {
    for (slot, table) in tables.iter().enumerate() {
        let offset = dmi_offset + slot * MAX_MESH_TABLE_DWORDS;
        let dst = dmi.region_mut(offset, table.len)?;
        let written = encode_table(&table.layout, table.low, table.high, dst)?;

        cmd.write_dmi(&DmiWrite {
            dmi_cfg_register: LSC_DMI_CFG_REGISTER,
            selector: table.selector,
            buffer: dmi.handle(),
            offset_bytes: (offset * std::mem::size_of::<u32>()) as u32,
            length_bytes: (written * std::mem::size_of::<u32>()) as u32,
        })?;
    }
    Ok(())
}

/// Register layout of one hardware generation, chosen once per module instance.
#[derive(Debug, Clone)]
pub enum LscHwSetting {
    /// Titan 150, 160, 170 and 175.
    Titan17x(Lsc34Setting),
    /// Titan 480.
    Titan480(Lsc40Setting),
}

impl LscHwSetting {
    /// Selects the layout of a hardware version.
    ///
    /// # Errors
    ///
    /// Returns [`LscError::UnsupportedHardware`] for versions without a layout.
    pub fn new(titan_version: u32) -> Result<Self, LscError> {
        match titan_version {
            TITAN_150 | TITAN_160 | TITAN_170 | TITAN_175 => {
                Ok(LscHwSetting::Titan17x(Lsc34Setting::default()))
            }
            TITAN_480 => Ok(LscHwSetting::Titan480(Lsc40Setting::default())),
            version => Err(LscError::UnsupportedHardware(version)),
        }
    }

    /// Whether the generation has adaptive shading.
    pub fn supports_alsc(&self) -> bool {
        matches!(self, LscHwSetting::Titan480(_))
    }

    /// Number of command dwords one full configuration needs.
    pub fn cmd_size_dwords(&self) -> usize {
        match self {
            LscHwSetting::Titan17x(_) => Lsc34Setting::CMD_SIZE_DWORDS,
            LscHwSetting::Titan480(_) => Lsc40Setting::CMD_SIZE_DWORDS,
        }
    }

    /// Number of DMI dwords one configuration reserves.
    pub fn dmi_length_dwords(&self) -> usize {
        match self {
            LscHwSetting::Titan17x(_) => Lsc34Setting::DMI_LENGTH_DWORDS,
            LscHwSetting::Titan480(_) => Lsc40Setting::DMI_LENGTH_DWORDS,
        }
    }

    /// Packs a configuration.
    ///
    /// # Arguments
    ///
    /// * `params` - The configuration.
    /// * `mesh` - The mesh fields to program, local to the stripe when striping.
    /// * `cmd` - The command buffer.
    /// * `dmi` - The DMI buffer.
    /// * `dmi_offset` - Offset of the tables in `dmi`, in dwords.
    ///
    /// # Errors
    ///
    /// Fails before writing anything if a buffer is too small or a table has the wrong size.
    pub fn pack(
        &mut self,
        params: &UnpackedParameters,
        mesh: &MeshRegisters,
        cmd: &mut CmdBuffer,
        dmi: &mut DmiBuffer,
        dmi_offset: usize,
    ) -> Result<(), LscError> {
        match self {
            LscHwSetting::Titan17x(setting) => setting.pack(params, mesh, cmd, dmi, dmi_offset),
            LscHwSetting::Titan480(setting) => setting.pack(params, mesh, cmd, dmi, dmi_offset),
        }
    }

    /// Writes only the module enable.
    pub fn pack_enable_only(&mut self, enable: bool, cmd: &mut CmdBuffer) -> Result<(), LscError> {
        match self {
            LscHwSetting::Titan17x(setting) => setting.pack_enable_only(enable, cmd),
            LscHwSetting::Titan480(setting) => setting.pack_enable_only(enable, cmd),
        }
    }

    /// Register words of the last packed configuration, in programming order.
    pub fn register_words(&self) -> Vec<u32> {
        match self {
            LscHwSetting::Titan17x(setting) => setting.register_words(),
            LscHwSetting::Titan480(setting) => setting.register_words(),
        }
    }

    /// Register images of the last packed configuration as raw bytes.
    pub fn register_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice::<u32, u8>(&self.register_words()).to_vec()
    }

    /// DMI tables of the last packed configuration, as written at pack time.
    pub fn dmi_words(&self) -> &[u32] {
        match self {
            LscHwSetting::Titan17x(setting) => &setting.dmi_words,
            LscHwSetting::Titan480(setting) => &setting.dmi_words,
        }
    }

    /// Copies the last packed configuration for the tuning metadata sink.
    ///
    /// Registers and tables come from the same pack, whatever the caller did with the DMI
    /// buffer since.
    pub fn tuning_metadata(&self) -> TuningMetadata {
        TuningMetadata {
            register_bytes: self.register_bytes(),
            dmi_words: self.dmi_words().to_vec(),
        }
    }

    /// Logs the last packed registers at trace level.
    pub fn dump_registers(&self) {
        for (index, word) in self.register_words().iter().enumerate() {
            log::trace!("LSC register word {index}: {word:#010x}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_selection() -> Result<(), LscError> {
        for version in [TITAN_150, TITAN_160, TITAN_170, TITAN_175] {
            let hw = LscHwSetting::new(version)?;
            assert!(!hw.supports_alsc());
            assert_eq!(hw.dmi_length_dwords(), 2 * 221);
        }
        let hw = LscHwSetting::new(TITAN_480)?;
        assert!(hw.supports_alsc());
        assert_eq!(hw.dmi_length_dwords(), 3 * 221);
        assert_eq!(hw.cmd_size_dwords(), 32);

        assert_eq!(
            LscHwSetting::new(0x680).map(|_| ()),
            Err(LscError::UnsupportedHardware(0x680))
        );
        Ok(())
    }

    #[test]
    fn fields_fold() {
        let a = BitField::new(0, 4);
        let b = BitField::new(8, 4);
        assert_eq!(pack_fields(&[(a, 0x3), (b, 0xa)]), 0x0a03);
    }
}
