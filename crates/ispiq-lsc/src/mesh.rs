use ispiq_hw::BitField;
use ispiq_tuning::{GainTables, MESH_POINTS_H, MESH_POINTS_V};

use crate::{error::LscError, state::GeometryCache};

/// Number of mesh blocks per row of a full-resolution mesh.
pub const MESH_BLOCKS_H: u32 = MESH_POINTS_H as u32 - 1;

/// Number of mesh block rows of a full-resolution mesh.
pub const MESH_BLOCKS_V: u32 = MESH_POINTS_V as u32 - 1;

/// Smallest number of mesh blocks per row.
pub const MIN_MESH_BLOCKS_H: u32 = 8;

/// Smallest number of mesh block rows.
pub const MIN_MESH_BLOCKS_V: u32 = 6;

/// Smallest gain of a resampled mesh.
pub const MIN_MESH_GAIN: f32 = 1.0;

/// Largest gain of a resampled mesh.
pub const MAX_MESH_GAIN: f32 = 7.999;

/// Fraction bits of the inverse subgrid sizes.
pub const DELTA_Q_FACTOR: u32 = 20;

const MAX_BICUBIC_LEVEL: u32 = 3;
const MIN_BLOCK_WIDTH: i64 = 18;
const MIN_BLOCK_HEIGHT: i64 = 9;
const MIN_SUBGRID_SIZE: i64 = 9;

const EXT_W: usize = MESH_POINTS_H + 2;
const EXT_H: usize = MESH_POINTS_V + 2;

const BWIDTH: BitField = BitField::new(0, 9);
const MESH_GRID_BWIDTH: BitField = BitField::new(0, 11);
const DELTA: BitField = BitField::new(0, 17);
const BLOCK_START: BitField = BitField::new(0, 6);
const SUBGRID_START: BitField = BitField::new(0, 3);
const PIXEL_INDEX_X: BitField = BitField::new(0, 11);
const PIXEL_INDEX_Y: BitField = BitField::new(0, 10);
const E_INIT: BitField = BitField::new(0, 20);

/// Partition of the per-channel stream into mesh blocks and subgrids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    /// Number of subgrids per block side, a power of two.
    pub scale: u32,
    /// Half of the horizontal mesh overhead.
    pub delta_h: u32,
    /// Half of the vertical mesh overhead.
    pub delta_v: u32,
    /// Subgrid width in per-channel pixels.
    pub subgrid_h: u32,
    /// Subgrid height in per-channel pixels.
    pub subgrid_v: u32,
    /// Number of mesh blocks per row.
    pub blocks_h: u32,
    /// Number of mesh block rows.
    pub blocks_v: u32,
}

impl GridLayout {
    /// Finds the mesh layout of a `width` x `height` Bayer stream.
    ///
    /// Starts from the full 16x12 block mesh with three bicubic subgrid levels, then lowers
    /// the level and, once exhausted, the block counts until every block and subgrid is
    /// large enough and the mesh overhang stays within one block.
    ///
    /// # Errors
    ///
    /// Returns [`LscError::InvalidGeometry`] if the stream is too small to hold a mesh.
    pub fn optimize(width: u32, height: u32) -> Result<Self, LscError> {
        let channel_w = i64::from(width >> 1);
        let channel_h = i64::from(height >> 1);

        let mut level = MAX_BICUBIC_LEVEL + 1;
        let mut blocks_h = MESH_BLOCKS_H;
        let mut blocks_v = MESH_BLOCKS_V;
        let (mut subgrid_w, mut subgrid_hgt) = (0i64, 0i64);
        let (mut over_w, mut over_h) = (0i64, 0i64);

        loop {
            if level == 0 && (blocks_h <= MIN_MESH_BLOCKS_H || blocks_v <= MIN_MESH_BLOCKS_V) {
                log::warn!("Stream {width}x{height} too small for an optimal shading mesh");
                break;
            }
            if level > 0 {
                level -= 1;
            } else {
                blocks_h -= 4;
                blocks_v -= 3;
                level = MAX_BICUBIC_LEVEL;
            }

            subgrid_w = ceil_shift(ceil_div(channel_w, i64::from(blocks_h)), level);
            let block_w = subgrid_w << level;
            over_w = block_w * i64::from(blocks_h) - channel_w;

            subgrid_hgt = ceil_shift(ceil_div(channel_h, i64::from(blocks_v)), level);
            let block_h = subgrid_hgt << level;
            over_h = block_h * i64::from(blocks_v) - channel_h;

            let half_over_w = (over_w + 1) / 2;
            let unsatisfied = block_w < MIN_BLOCK_WIDTH
                || block_h < MIN_BLOCK_HEIGHT
                || subgrid_w < MIN_SUBGRID_SIZE
                || subgrid_hgt < MIN_SUBGRID_SIZE
                || over_w >= block_w
                || over_h >= block_h
                || block_w - half_over_w < MIN_BLOCK_WIDTH
                || subgrid_w - half_over_w % subgrid_w < MIN_SUBGRID_SIZE;

            if !unsatisfied {
                break;
            }
        }

        if subgrid_w <= 0 || subgrid_hgt <= 0 || over_w < 0 || over_h < 0 {
            return Err(LscError::InvalidGeometry(width, height));
        }

        Ok(Self {
            scale: 1 << level,
            delta_h: ((over_w + 1) >> 1) as u32,
            delta_v: ((over_h + 1) >> 1) as u32,
            subgrid_h: subgrid_w as u32,
            subgrid_v: subgrid_hgt as u32,
            blocks_h,
            blocks_v,
        })
    }

    /// Number of mesh points per row.
    #[inline]
    pub fn points_h(&self) -> usize {
        self.blocks_h as usize + 1
    }

    /// Number of mesh rows.
    #[inline]
    pub fn points_v(&self) -> usize {
        self.blocks_v as usize + 1
    }

    /// Number of mesh points.
    #[inline]
    pub fn num_points(&self) -> usize {
        self.points_h() * self.points_v()
    }
}

#[inline]
fn ceil_div(a: i64, b: i64) -> i64 {
    (a + b - 1) / b
}

#[inline]
fn ceil_shift(a: i64, level: u32) -> i64 {
    (a + (1 << level) - 1) >> level
}

/// Mesh geometry fields of the rolloff registers, clamped to their widths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshRegisters {
    /// Number of mesh blocks per row minus one.
    pub num_meshgain_h: u32,
    /// Number of mesh block rows minus one.
    pub num_meshgain_v: u32,
    /// Log2 of the number of subgrids per block side.
    pub intp_factor: u32,
    /// Subgrid width minus one.
    pub bwidth: u32,
    /// Subgrid height minus one.
    pub bheight: u32,
    /// Block width minus one.
    pub mesh_grid_bwidth: u32,
    /// Block height minus one.
    pub mesh_grid_bheight: u32,
    /// Inverse subgrid width, Q20.
    pub x_delta: u32,
    /// Inverse subgrid height, Q20.
    pub y_delta: u32,
    /// First block column.
    pub lx_start: u32,
    /// First block row.
    pub ly_start: u32,
    /// First subgrid column inside the first block.
    pub bx_start: u32,
    /// First subgrid row inside the first block.
    pub by_start: u32,
    /// First pixel column inside the first subgrid.
    pub bx_d1: u32,
    /// First pixel row inside the first subgrid.
    pub by_e1: u32,
    /// Initial vertical phase, Q20.
    pub by_init_e1: u32,
    /// Horizontal start of the mesh in Bayer pixels, before any stripe offset.
    pub x_start: u32,
    /// Vertical start of the mesh in Bayer pixels.
    pub y_start: u32,
}

impl MeshRegisters {
    /// Derives the register fields of a mesh layout.
    pub fn from_layout(layout: &GridLayout) -> Self {
        let bwidth = BWIDTH.saturate(layout.subgrid_h.saturating_sub(1));
        let bheight = BWIDTH.saturate(layout.subgrid_v.saturating_sub(1));
        let x_delta = DELTA.saturate((1 << DELTA_Q_FACTOR) / (bwidth + 1));
        let y_delta = DELTA.saturate((1 << DELTA_Q_FACTOR) / (bheight + 1));

        let mut regs = Self {
            num_meshgain_h: layout.blocks_h - 1,
            num_meshgain_v: layout.blocks_v - 1,
            intp_factor: layout.scale.trailing_zeros(),
            bwidth,
            bheight,
            mesh_grid_bwidth: MESH_GRID_BWIDTH.saturate((layout.subgrid_h * layout.scale).saturating_sub(1)),
            mesh_grid_bheight: MESH_GRID_BWIDTH.saturate((layout.subgrid_v * layout.scale).saturating_sub(1)),
            x_delta,
            y_delta,
            x_start: layout.delta_h * 2,
            y_start: layout.delta_v * 2,
            ..Default::default()
        };

        let (lx, bx, bx_d1) = regs.start_indices(regs.x_start, bwidth);
        let (ly, by, by_e1) = regs.start_indices(regs.y_start, bheight);
        regs.lx_start = BLOCK_START.saturate(lx);
        regs.bx_start = SUBGRID_START.saturate(bx);
        regs.bx_d1 = PIXEL_INDEX_X.saturate(bx_d1);
        regs.ly_start = BLOCK_START.saturate(ly);
        regs.by_start = SUBGRID_START.saturate(by);
        regs.by_e1 = PIXEL_INDEX_Y.saturate(by_e1);
        regs.by_init_e1 = E_INIT.saturate(regs.by_e1 * regs.y_delta);
        regs
    }

    /// Returns the fields of a stripe starting `x_offset` Bayer pixels into the stream.
    pub fn for_stripe(&self, x_offset: u32) -> Self {
        let (lx, bx, bx_d1) = self.start_indices(self.x_start + x_offset, self.bwidth);
        Self {
            lx_start: BLOCK_START.saturate(lx),
            bx_start: SUBGRID_START.saturate(bx),
            bx_d1: PIXEL_INDEX_X.saturate(bx_d1),
            ..*self
        }
    }

    // block, subgrid and pixel index of a Bayer start position
    fn start_indices(&self, start: u32, subgrid_minus_one: u32) -> (u32, u32, u32) {
        let scale = self.scale();
        let channel_start = start >> 1;
        let subgrid = channel_start / (subgrid_minus_one + 1);
        let block = (subgrid as f32 / scale as f32).round() as u32;
        (block, subgrid & (scale - 1), channel_start % (subgrid_minus_one + 1))
    }

    /// Number of subgrids per block side.
    #[inline]
    pub fn scale(&self) -> u32 {
        1 << self.intp_factor
    }

    /// Number of mesh points per row.
    #[inline]
    pub fn points_h(&self) -> usize {
        self.num_meshgain_h as usize + 2
    }

    /// Number of mesh rows.
    #[inline]
    pub fn points_v(&self) -> usize {
        self.num_meshgain_v as usize + 2
    }

    /// Horizontal offset of the mesh origin in Bayer pixels.
    pub fn horizontal_offset(&self) -> u32 {
        self.lx_start * 2 * (self.mesh_grid_bwidth + 1) + self.bx_start * 2 * (self.bwidth + 1) + self.bx_d1 * 2
    }

    /// Vertical offset of the mesh origin in Bayer pixels.
    pub fn vertical_offset(&self) -> u32 {
        self.ly_start * 2 * (self.mesh_grid_bheight + 1) + self.by_start * 2 * (self.bheight + 1) + self.by_e1 * 2
    }

    /// Subgrid width in Bayer pixels.
    #[inline]
    pub fn subgrid_width(&self) -> u32 {
        (self.bwidth + 1) * 2
    }

    /// Subgrid height in Bayer pixels.
    #[inline]
    pub fn subgrid_height(&self) -> u32 {
        (self.bheight + 1) * 2
    }
}

/// Extends a full-resolution mesh by one block on every side.
///
/// Border points are extrapolated linearly from the two nearest points, corners along
/// the diagonal.
pub fn extend_mesh(mesh: &[f32]) -> [f32; EXT_W * EXT_H] {
    let (nx, ny) = (MESH_POINTS_H, MESH_POINTS_V);
    let at = |x: usize, y: usize| y * EXT_W + x;
    let mut out = [0.0; EXT_W * EXT_H];

    for (y, row) in mesh.chunks_exact(nx).take(ny).enumerate() {
        out[at(1, y + 1)..at(nx + 1, y + 1)].copy_from_slice(row);
    }

    out[at(0, 0)] = out[at(1, 1)] * 2.0 - out[at(2, 2)];
    out[at(0, ny + 1)] = out[at(1, ny)] * 2.0 - out[at(2, ny - 1)];
    out[at(nx + 1, ny + 1)] = out[at(nx, ny)] * 2.0 - out[at(nx - 1, ny - 1)];
    out[at(nx + 1, 0)] = out[at(nx, 1)] * 2.0 - out[at(nx - 1, 2)];

    for y in 1..=ny {
        out[at(0, y)] = out[at(1, y)] * 2.0 - out[at(2, y)];
        out[at(nx + 1, y)] = out[at(nx, y)] * 2.0 - out[at(nx - 1, y)];
    }
    for x in 1..=nx {
        out[at(x, 0)] = out[at(x, 1)] * 2.0 - out[at(x, 2)];
        out[at(x, ny + 1)] = out[at(x, ny)] * 2.0 - out[at(x, ny - 1)];
    }

    out
}

/// Catmull-Rom weights of the four taps around a fractional position.
#[inline]
fn bicubic_weights(t: f32) -> [f32; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        0.5 * (-t3 + 2.0 * t2 - t),
        0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
        0.5 * (-3.0 * t3 + 4.0 * t2 + t),
        0.5 * (t3 - t2),
    ]
}

/// Resamples full-resolution meshes onto the mesh of the stream.
#[derive(Debug, Clone, Copy)]
pub struct MeshResampler {
    layout: GridLayout,
    step_x: f32,
    step_y: f32,
    origin_x: f32,
    origin_y: f32,
    full_step_x: f32,
    full_step_y: f32,
}

impl MeshResampler {
    /// Creates a resampler for the given stream geometry.
    ///
    /// # Errors
    ///
    /// Returns [`LscError::InvalidGeometry`] if the full-resolution size cannot hold a mesh.
    pub fn new(layout: GridLayout, geometry: &GeometryCache) -> Result<Self, LscError> {
        let full_step_x = ((geometry.full_res_width >> 1) as f32 - 1.0) / MESH_BLOCKS_H as f32;
        let full_step_y = ((geometry.full_res_height >> 1) as f32 - 1.0) / MESH_BLOCKS_V as f32;
        if full_step_x <= 0.0 || full_step_y <= 0.0 {
            return Err(LscError::InvalidGeometry(
                geometry.full_res_width,
                geometry.full_res_height,
            ));
        }

        let scale = geometry.scale.max(f32::EPSILON);
        let block_w = (layout.subgrid_h * layout.scale) as f32;
        let block_h = (layout.subgrid_v * layout.scale) as f32;

        Ok(Self {
            layout,
            step_x: block_w * scale,
            step_y: block_h * scale,
            origin_x: -(layout.delta_h as f32) * scale + (geometry.offset_x / 2) as f32,
            origin_y: -(layout.delta_v as f32) * scale + (geometry.offset_y / 2) as f32,
            full_step_x,
            full_step_y,
        })
    }

    /// The layout of the output mesh.
    #[inline]
    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Resamples one channel.
    ///
    /// The border of the output mesh is interpolated bilinearly, the inside bicubically.
    /// Gains are clamped to `[MIN_MESH_GAIN, MAX_MESH_GAIN]`.
    ///
    /// # Arguments
    ///
    /// * `mesh` - A full-resolution 17x13 mesh in row-major order.
    ///
    /// # Returns
    ///
    /// The output mesh, `layout.points_h()` x `layout.points_v()` in row-major order.
    pub fn resample(&self, mesh: &[f32]) -> Vec<f32> {
        let ext = extend_mesh(mesh);
        let (points_h, points_v) = (self.layout.points_h(), self.layout.points_v());
        let mut out = Vec::with_capacity(self.layout.num_points());

        for v in 0..points_v {
            let ty = (v as f32 * self.step_y + self.origin_y + self.full_step_y) / self.full_step_y;
            for h in 0..points_h {
                let tx = (h as f32 * self.step_x + self.origin_x + self.full_step_x) / self.full_step_x;

                let border = v == 0 || h == 0 || v == points_v - 1 || h == points_h - 1;
                let value = if border {
                    bilinear(&ext, tx, ty)
                } else {
                    bicubic(&ext, tx, ty)
                };
                out.push(value.clamp(MIN_MESH_GAIN, MAX_MESH_GAIN));
            }
        }

        out
    }

    /// Resamples the four channels of a gain table.
    pub fn resample_tables(&self, tables: &GainTables) -> GainTables {
        GainTables {
            r: self.resample(&tables.r),
            gr: self.resample(&tables.gr),
            gb: self.resample(&tables.gb),
            b: self.resample(&tables.b),
        }
    }
}

// integer tap and fraction, with the tap kept inside [lo, hi]
#[inline]
fn split_position(t: f32, lo: usize, hi: usize) -> (usize, f32) {
    let i = t.floor();
    let frac = t - i;
    let i = (i.max(0.0) as usize).clamp(lo, hi);
    (i, frac)
}

fn bilinear(ext: &[f32], tx: f32, ty: f32) -> f32 {
    let (ix, fx) = split_position(tx, 0, EXT_W - 2);
    let (iy, fy) = split_position(ty, 0, EXT_H - 2);
    let row = |y: usize| (1.0 - fx) * ext[y * EXT_W + ix] + fx * ext[y * EXT_W + ix + 1];
    (1.0 - fy) * row(iy) + fy * row(iy + 1)
}

fn bicubic(ext: &[f32], tx: f32, ty: f32) -> f32 {
    let (ix, fx) = split_position(tx, 1, EXT_W - 3);
    let (iy, fy) = split_position(ty, 1, EXT_H - 3);
    let wx = bicubic_weights(fx);
    let wy = bicubic_weights(fy);

    wy.iter()
        .enumerate()
        .map(|(j, wy)| {
            let base = (iy + j - 1) * EXT_W + ix - 1;
            let row: f32 = wx.iter().zip(&ext[base..base + 4]).map(|(w, a)| w * a).sum();
            wy * row
        })
        .sum()
}
