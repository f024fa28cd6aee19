use ispiq_hw::{
    cmd_buffer::{required_write_dmi_size_in_dwords, required_write_reg_range_size_in_dwords},
    dmi::mesh_table_length,
    impl_register_image, BitField, CmdBuffer, DmiBuffer, RegisterImage,
};

use super::{check_tables, pack_fields, write_tables, DmiTable, MAX_MESH_TABLE_DWORDS};
use crate::{
    algo::ALSC_GRID_POINTS,
    error::LscError,
    mesh::MeshRegisters,
    setting::{UnpackedParameters, LUMA_WEIGHT_BASE_MIN, LUMA_WEIGHT_BASE_SCALE, LUMA_WEIGHT_MIN},
};

const LSC40_MODULE_CFG: u32 = 0x6200;
const LSC40_LUT_BANK_CFG: u32 = 0x6214;

const MODULE_EN: BitField = BitField::new(0, 1);
const MODULE_ALSC_EN: BitField = BitField::new(1, 1);
const MODULE_CROP_EN: BitField = BitField::new(2, 1);
const BANK_SEL: BitField = BitField::new(0, 1);

const NUM_MESHGAIN_H: BitField = BitField::new(0, 6);
const NUM_MESHGAIN_V: BitField = BitField::new(8, 6);
const INTP_FACTOR: BitField = BitField::new(16, 2);
const BWIDTH: BitField = BitField::new(0, 9);
const BHEIGHT: BitField = BitField::new(16, 9);
const MESH_GRID_BWIDTH: BitField = BitField::new(0, 11);
const MESH_GRID_BHEIGHT: BitField = BitField::new(16, 11);
const DELTA: BitField = BitField::new(0, 17);
const BLOCK_START: BitField = BitField::new(0, 6);
const SUBGRID_START: BitField = BitField::new(8, 3);
const PIXEL_INDEX_X: BitField = BitField::new(16, 11);
const PIXEL_INDEX_Y: BitField = BitField::new(16, 10);
const INIT_E1: BitField = BitField::new(0, 20);
const CROP_FIRST: BitField = BitField::new(0, 14);
const CROP_LAST: BitField = BitField::new(16, 14);

/// Bank select and rolloff configuration registers, written as one range.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Lsc40RegCmd {
    /// LUT bank select.
    pub lut_bank_cfg: u32,
    /// Rolloff configuration words 0 to 10.
    pub config: [u32; 11],
}

impl_register_image!(Lsc40RegCmd, 12);

/// Module configuration register.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Lsc40ModuleCfg {
    /// Enable, adaptive shading enable and crop enable bits.
    pub module_cfg: u32,
}

impl_register_image!(Lsc40ModuleCfg, 1);

/// LSC 4.0 register state of one module instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lsc40Setting {
    /// The last packed configuration registers.
    pub reg_cmd: Lsc40RegCmd,
    /// The last packed module configuration.
    pub module_cfg: Lsc40ModuleCfg,
    /// The DMI tables of the last packed configuration.
    pub dmi_words: Vec<u32>,
}

impl Lsc40Setting {
    /// Command dwords of one full configuration.
    pub const CMD_SIZE_DWORDS: usize = required_write_reg_range_size_in_dwords(Lsc40RegCmd::LENGTH_DWORDS)
        + required_write_reg_range_size_in_dwords(Lsc40ModuleCfg::LENGTH_DWORDS)
        + 3 * required_write_dmi_size_in_dwords();

    /// DMI dwords of one configuration: R|Gr, Gb|B and the gain|mean grid.
    pub const DMI_LENGTH_DWORDS: usize = 3 * MAX_MESH_TABLE_DWORDS;

    pub(crate) fn pack(
        &mut self,
        params: &UnpackedParameters,
        mesh: &MeshRegisters,
        cmd: &mut CmdBuffer,
        dmi: &mut DmiBuffer,
        dmi_offset: usize,
    ) -> Result<(), LscError> {
        let len = mesh_table_length(mesh.num_meshgain_h, mesh.num_meshgain_v);
        let tables = [
            DmiTable::gr_r(params, len),
            DmiTable::gb_b(params, len),
            DmiTable::grid(params),
        ];
        check_tables(&tables)?;
        if tables[2].len != ALSC_GRID_POINTS {
            return Err(LscError::MeshTooLarge(tables[2].len, ALSC_GRID_POINTS));
        }
        cmd.ensure_capacity(Self::CMD_SIZE_DWORDS)?;
        dmi.ensure_region(dmi_offset, Self::DMI_LENGTH_DWORDS)?;

        let reg_cmd = Lsc40RegCmd {
            lut_bank_cfg: pack_fields(&[(BANK_SEL, params.bank.index())]),
            config: config_words(params, mesh),
        };
        let module_cfg = Lsc40ModuleCfg {
            module_cfg: pack_fields(&[
                (MODULE_EN, u32::from(params.enable)),
                (MODULE_ALSC_EN, u32::from(params.alsc_enable)),
                (MODULE_CROP_EN, u32::from(params.crop_enable)),
            ]),
        };

        cmd.write_reg_range(LSC40_LUT_BANK_CFG, reg_cmd.as_dwords())?;
        write_tables(&tables, cmd, dmi, dmi_offset)?;
        cmd.write_reg_range(LSC40_MODULE_CFG, module_cfg.as_dwords())?;

        self.dmi_words = dmi.region(dmi_offset, Self::DMI_LENGTH_DWORDS)?.to_vec();
        self.reg_cmd = reg_cmd;
        self.module_cfg = module_cfg;
        Ok(())
    }

    pub(crate) fn pack_enable_only(&mut self, enable: bool, cmd: &mut CmdBuffer) -> Result<(), LscError> {
        let mut module_cfg = self.module_cfg;
        MODULE_EN.set(&mut module_cfg.module_cfg, u32::from(enable));
        if !enable {
            MODULE_ALSC_EN.set(&mut module_cfg.module_cfg, 0);
        }
        cmd.write_reg_range(LSC40_MODULE_CFG, module_cfg.as_dwords())?;
        self.module_cfg = module_cfg;
        Ok(())
    }

    pub(crate) fn register_words(&self) -> Vec<u32> {
        [self.reg_cmd.as_dwords(), self.module_cfg.as_dwords()].concat()
    }
}

fn config_words(params: &UnpackedParameters, mesh: &MeshRegisters) -> [u32; 11] {
    let crop = &params.crop;
    [
        pack_fields(&[
            (NUM_MESHGAIN_H, mesh.num_meshgain_h),
            (NUM_MESHGAIN_V, mesh.num_meshgain_v),
            (INTP_FACTOR, mesh.intp_factor),
        ]),
        pack_fields(&[(BWIDTH, mesh.bwidth), (BHEIGHT, mesh.bheight)]),
        pack_fields(&[
            (MESH_GRID_BWIDTH, mesh.mesh_grid_bwidth),
            (MESH_GRID_BHEIGHT, mesh.mesh_grid_bheight),
        ]),
        pack_fields(&[(DELTA, mesh.x_delta)]),
        pack_fields(&[(DELTA, mesh.y_delta)]),
        pack_fields(&[
            (BLOCK_START, mesh.lx_start),
            (SUBGRID_START, mesh.bx_start),
            (PIXEL_INDEX_X, mesh.bx_d1),
        ]),
        pack_fields(&[
            (BLOCK_START, mesh.ly_start),
            (SUBGRID_START, mesh.by_start),
            (PIXEL_INDEX_Y, mesh.by_e1),
        ]),
        pack_fields(&[(INIT_E1, mesh.by_init_e1)]),
        pack_fields(&[(CROP_FIRST, crop.first_pixel), (CROP_LAST, crop.last_pixel)]),
        pack_fields(&[(CROP_FIRST, crop.first_line), (CROP_LAST, crop.last_line)]),
        pack_fields(&[
            (LUMA_WEIGHT_BASE_SCALE, params.luma_weight_base_scale),
            (LUMA_WEIGHT_BASE_MIN, params.luma_weight_base_min),
            (LUMA_WEIGHT_MIN, params.luma_weight_min),
        ]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        input::CropWindow,
        mesh::GridLayout,
        setting::MeshTables,
        state::Bank,
    };
    use ispiq_hw::{Command, DmiEntryLayout, HwError};

    fn params(bank: Bank) -> Result<UnpackedParameters, LscError> {
        let mesh = MeshRegisters::from_layout(&GridLayout::optimize(4000, 3000)?);
        let len = mesh.points_h() * mesh.points_v();
        Ok(UnpackedParameters {
            enable: true,
            alsc_enable: true,
            crop_enable: false,
            bank,
            mesh,
            crop: CropWindow::from_size(4000, 3000),
            luma_weight_base_scale: 1024,
            luma_weight_base_min: 3,
            luma_weight_min: 5,
            tables: MeshTables {
                r: vec![1024; len],
                gr: vec![2048; len],
                gb: vec![3072; len],
                b: vec![4096; len],
            },
            grid_gain: vec![7; ALSC_GRID_POINTS],
            grid_mean: vec![9; ALSC_GRID_POINTS],
        })
    }

    #[test]
    fn cmd_size() {
        assert_eq!(Lsc40Setting::CMD_SIZE_DWORDS, 32);
    }

    #[test]
    fn pack_layout() -> Result<(), LscError> {
        let params = params(Bank::Bank1)?;
        let mut setting = Lsc40Setting::default();
        let mut cmd = CmdBuffer::new(Lsc40Setting::CMD_SIZE_DWORDS);
        let mut dmi = DmiBuffer::new(7, Lsc40Setting::DMI_LENGTH_DWORDS);

        setting.pack(&params, &params.mesh, &mut cmd, &mut dmi, 0)?;
        assert_eq!(cmd.len(), Lsc40Setting::CMD_SIZE_DWORDS);

        let commands = cmd.commands()?;
        assert_eq!(commands.len(), 5);
        let Command::RegRange { register, values } = &commands[0] else {
            panic!("expected a register range");
        };
        assert_eq!(*register, LSC40_LUT_BANK_CFG);
        assert_eq!(values[0], 1);
        assert_eq!(values[1], 15 | (11 << 8) | (1 << 16));
        assert_eq!(values[4], 16644);
        assert_eq!(values[11], 1024 | (3 << 12) | (5 << 22));

        let selectors: Vec<_> = commands[1..4]
            .iter()
            .filter_map(|c| match c {
                Command::Dmi(write) => Some((write.selector, write.offset_bytes, write.length_bytes)),
                _ => None,
            })
            .collect();
        assert_eq!(
            selectors,
            vec![(0x1b, 0, 221 * 4), (0x1d, 221 * 4, 221 * 4), (0x1f, 2 * 221 * 4, 221 * 4)]
        );
        assert!(matches!(
            &commands[4],
            Command::RegRange { register: LSC40_MODULE_CFG, values } if values == &[0b011]
        ));

        assert_eq!(
            DmiEntryLayout::CHANNEL_PAIR.unpack(dmi.as_slice()[0]),
            (1024, 2048)
        );
        assert_eq!(
            DmiEntryLayout::CHANNEL_PAIR.unpack(dmi.as_slice()[221]),
            (4096, 3072)
        );
        assert_eq!(DmiEntryLayout::GAIN_MEAN.unpack(dmi.as_slice()[442]), (7, 9));
        assert_eq!(&setting.dmi_words[..], dmi.as_slice());
        Ok(())
    }

    #[test]
    fn pack_rejects_small_buffers_without_writing() -> Result<(), LscError> {
        let params = params(Bank::Bank0)?;
        let mut setting = Lsc40Setting::default();

        let mut cmd = CmdBuffer::new(Lsc40Setting::CMD_SIZE_DWORDS - 1);
        let mut dmi = DmiBuffer::new(0, Lsc40Setting::DMI_LENGTH_DWORDS);
        let err = setting.pack(&params, &params.mesh, &mut cmd, &mut dmi, 0);
        assert!(matches!(err, Err(LscError::Hw(HwError::PackingOverflow { .. }))));
        assert!(cmd.is_empty());
        assert!(dmi.as_slice().iter().all(|&w| w == 0));

        let mut cmd = CmdBuffer::new(Lsc40Setting::CMD_SIZE_DWORDS);
        let err = setting.pack(&params, &params.mesh, &mut cmd, &mut dmi, 1);
        assert!(matches!(err, Err(LscError::Hw(HwError::PackingOverflow { .. }))));
        assert!(cmd.is_empty());
        assert_eq!(setting, Lsc40Setting::default());
        Ok(())
    }

    #[test]
    fn pack_rejects_mismatched_tables() -> Result<(), LscError> {
        let mut params = params(Bank::Bank0)?;
        params.tables.b.pop();
        let mut cmd = CmdBuffer::new(64);
        let mut dmi = DmiBuffer::new(0, Lsc40Setting::DMI_LENGTH_DWORDS);
        let err = Lsc40Setting::default().pack(&params, &params.mesh, &mut cmd, &mut dmi, 0);
        assert!(matches!(err, Err(LscError::Hw(HwError::TableLengthMismatch(220, 221)))));
        assert!(cmd.is_empty());
        Ok(())
    }

    #[test]
    fn enable_only() -> Result<(), LscError> {
        let params = params(Bank::Bank0)?;
        let mut setting = Lsc40Setting::default();
        let mut cmd = CmdBuffer::new(64);
        let mut dmi = DmiBuffer::new(0, Lsc40Setting::DMI_LENGTH_DWORDS);
        setting.pack(&params, &params.mesh, &mut cmd, &mut dmi, 0)?;

        cmd.reset();
        setting.pack_enable_only(false, &mut cmd)?;
        assert_eq!(cmd.len(), 3);
        assert_eq!(cmd.as_slice()[2], 0);

        cmd.reset();
        setting.pack_enable_only(true, &mut cmd)?;
        assert_eq!(cmd.as_slice()[2], 1);
        Ok(())
    }
}
