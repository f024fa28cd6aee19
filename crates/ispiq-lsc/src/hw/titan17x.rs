use ispiq_hw::{
    cmd_buffer::{required_write_dmi_size_in_dwords, required_write_reg_range_size_in_dwords},
    dmi::mesh_table_length,
    impl_register_image, BitField, CmdBuffer, DmiBuffer, RegisterImage,
};

use super::{check_tables, pack_fields, write_tables, DmiTable, MAX_MESH_TABLE_DWORDS};
use crate::{error::LscError, mesh::MeshRegisters, setting::UnpackedParameters};

const LSC34_MODULE_CFG: u32 = 0x6a0;
const LSC34_LUT_BANK_CFG: u32 = 0x6b4;

const MODULE_EN: BitField = BitField::new(0, 1);
const BANK_SEL: BitField = BitField::new(0, 1);

const NUM_MESHGAIN_H: BitField = BitField::new(0, 6);
const NUM_MESHGAIN_V: BitField = BitField::new(8, 6);
const INTP_FACTOR: BitField = BitField::new(0, 2);
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

/// Bank select and rolloff configuration registers, written as one range.
///
/// The left and right halves program the two IFE of a dual-IFE frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Lsc34RegCmd {
    /// LUT bank select.
    pub lut_bank_cfg: u32,
    /// Mesh gain counts.
    pub config0: u32,
    /// Interpolation factor.
    pub config1: u32,
    /// Mesh fields of the left IFE.
    pub left: [u32; 7],
    /// Mesh fields of the right IFE.
    pub right: [u32; 7],
}

impl_register_image!(Lsc34RegCmd, 17);

/// Module configuration register.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Lsc34ModuleCfg {
    /// Enable bit.
    pub module_cfg: u32,
}

impl_register_image!(Lsc34ModuleCfg, 1);

/// LSC 3.4 register state of one module instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lsc34Setting {
    /// The last packed configuration registers.
    pub reg_cmd: Lsc34RegCmd,
    /// The last packed module configuration.
    pub module_cfg: Lsc34ModuleCfg,
    /// The DMI tables of the last packed configuration.
    pub dmi_words: Vec<u32>,
}

impl Lsc34Setting {
    /// Command dwords of one full configuration.
    pub const CMD_SIZE_DWORDS: usize = required_write_reg_range_size_in_dwords(Lsc34RegCmd::LENGTH_DWORDS)
        + required_write_reg_range_size_in_dwords(Lsc34ModuleCfg::LENGTH_DWORDS)
        + 2 * required_write_dmi_size_in_dwords();

    /// DMI dwords of one configuration: R|Gr and Gb|B.
    pub const DMI_LENGTH_DWORDS: usize = 2 * MAX_MESH_TABLE_DWORDS;

    pub(crate) fn pack(
        &mut self,
        params: &UnpackedParameters,
        mesh: &MeshRegisters,
        cmd: &mut CmdBuffer,
        dmi: &mut DmiBuffer,
        dmi_offset: usize,
    ) -> Result<(), LscError> {
        let len = mesh_table_length(mesh.num_meshgain_h, mesh.num_meshgain_v);
        let tables = [DmiTable::gr_r(params, len), DmiTable::gb_b(params, len)];
        check_tables(&tables)?;
        cmd.ensure_capacity(Self::CMD_SIZE_DWORDS)?;
        dmi.ensure_region(dmi_offset, Self::DMI_LENGTH_DWORDS)?;

        let half = half_words(mesh);
        let reg_cmd = Lsc34RegCmd {
            lut_bank_cfg: pack_fields(&[(BANK_SEL, params.bank.index())]),
            config0: pack_fields(&[
                (NUM_MESHGAIN_H, mesh.num_meshgain_h),
                (NUM_MESHGAIN_V, mesh.num_meshgain_v),
            ]),
            config1: pack_fields(&[(INTP_FACTOR, mesh.intp_factor)]),
            left: half,
            right: half,
        };
        let module_cfg = Lsc34ModuleCfg {
            module_cfg: pack_fields(&[(MODULE_EN, u32::from(params.enable))]),
        };

        cmd.write_reg_range(LSC34_LUT_BANK_CFG, reg_cmd.as_dwords())?;
        write_tables(&tables, cmd, dmi, dmi_offset)?;
        cmd.write_reg_range(LSC34_MODULE_CFG, module_cfg.as_dwords())?;

        self.dmi_words = dmi.region(dmi_offset, Self::DMI_LENGTH_DWORDS)?.to_vec();
        self.reg_cmd = reg_cmd;
        self.module_cfg = module_cfg;
        Ok(())
    }

    pub(crate) fn pack_enable_only(&mut self, enable: bool, cmd: &mut CmdBuffer) -> Result<(), LscError> {
        let module_cfg = Lsc34ModuleCfg {
            module_cfg: MODULE_EN.insert(self.module_cfg.module_cfg, u32::from(enable)),
        };
        cmd.write_reg_range(LSC34_MODULE_CFG, module_cfg.as_dwords())?;
        self.module_cfg = module_cfg;
        Ok(())
    }

    pub(crate) fn register_words(&self) -> Vec<u32> {
        [self.reg_cmd.as_dwords(), self.module_cfg.as_dwords()].concat()
    }
}

fn half_words(mesh: &MeshRegisters) -> [u32; 7] {
    [
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
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{input::CropWindow, mesh::GridLayout, setting::MeshTables, state::Bank};
    use ispiq_hw::Command;

    #[test]
    fn cmd_size() {
        assert_eq!(Lsc34Setting::CMD_SIZE_DWORDS, 32);
    }

    #[test]
    fn pack_small_mesh() -> Result<(), LscError> {
        let mesh = MeshRegisters::from_layout(&GridLayout::optimize(640, 480)?);
        let len = mesh.points_h() * mesh.points_v();
        let params = UnpackedParameters {
            enable: true,
            alsc_enable: false,
            crop_enable: false,
            bank: Bank::Bank0,
            mesh,
            crop: CropWindow::from_size(640, 480),
            luma_weight_base_scale: 0,
            luma_weight_base_min: 0,
            luma_weight_min: 0,
            tables: MeshTables {
                r: vec![1024; len],
                gr: vec![1024; len],
                gb: vec![1024; len],
                b: vec![1024; len],
            },
            grid_gain: vec![],
            grid_mean: vec![],
        };

        let mut setting = Lsc34Setting::default();
        let mut cmd = CmdBuffer::new(Lsc34Setting::CMD_SIZE_DWORDS);
        let mut dmi = DmiBuffer::new(3, Lsc34Setting::DMI_LENGTH_DWORDS);
        setting.pack(&params, &mesh, &mut cmd, &mut dmi, 0)?;

        let commands = cmd.commands()?;
        let dmi_writes: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                Command::Dmi(write) => Some(write),
                _ => None,
            })
            .collect();
        assert_eq!(dmi_writes.len(), 2);
        assert!(dmi_writes.iter().all(|w| w.length_bytes as usize == len * 4));
        assert!(dmi_writes.iter().all(|w| w.buffer == 3));
        assert_eq!(setting.reg_cmd.left, setting.reg_cmd.right);
        assert_eq!(setting.register_words().len(), 18);
        Ok(())
    }
}
