use serde::{Deserialize, Serialize};

use crate::{error::LscError, mesh::MeshRegisters};

/// One horizontal slice of a frame, processed by one hardware unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeContext {
    /// Index of the stripe, from the left.
    pub index: usize,
    /// Number of stripes of the frame.
    pub count: usize,
    /// Horizontal offset of the stripe in the stream.
    pub x_offset: u32,
    /// Width of the stripe.
    pub width: u32,
}

impl StripeContext {
    /// Returns true for the last stripe of the frame.
    #[inline]
    pub fn is_last(&self) -> bool {
        self.index + 1 >= self.count
    }
}

/// Splits a stream into `count` stripes.
///
/// Every stripe but the last one has the same even width; the last one takes the rest.
///
/// # Errors
///
/// Returns [`LscError::InvalidStripe`] if `count` is zero and
/// [`LscError::InvalidGeometry`] if a stripe would be empty.
pub fn split(frame_width: u32, count: usize) -> Result<Vec<StripeContext>, LscError> {
    if count == 0 {
        return Err(LscError::InvalidStripe(0, 0));
    }

    let width = (frame_width / count as u32) & !1;
    if width == 0 {
        return Err(LscError::InvalidGeometry(frame_width, count as u32));
    }

    Ok((0..count)
        .map(|index| {
            let x_offset = width * index as u32;
            StripeContext {
                index,
                count,
                x_offset,
                width: if index + 1 == count {
                    frame_width - x_offset
                } else {
                    width
                },
            }
        })
        .collect())
}

/// Mesh start of one stripe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripeRegisters {
    /// The stripe.
    pub stripe: StripeContext,
    /// First block column.
    pub lx_start: u32,
    /// First subgrid column inside the first block.
    pub bx_start: u32,
    /// First pixel column inside the first subgrid.
    pub bx_d1: u32,
}

impl StripeRegisters {
    /// Derives the stripe start from the frame mesh.
    pub fn new(stripe: StripeContext, mesh: &MeshRegisters) -> Self {
        let regs = mesh.for_stripe(stripe.x_offset);
        Self {
            stripe,
            lx_start: regs.lx_start,
            bx_start: regs.bx_start,
            bx_d1: regs.bx_d1,
        }
    }

    /// Returns the frame mesh with the stripe start programmed.
    pub fn apply(&self, mesh: &MeshRegisters) -> MeshRegisters {
        MeshRegisters {
            lx_start: self.lx_start,
            bx_start: self.bx_start,
            bx_d1: self.bx_d1,
            ..*mesh
        }
    }
}

/// Striping decision of one frame, shared by all the stripes of the frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StripeState {
    /// Request the decision was taken for.
    pub request_id: u64,
    /// Whether the frame needs a new configuration.
    pub changed: bool,
    /// Frame mesh, when computed.
    pub mesh: Option<MeshRegisters>,
    /// Stripe starts planned for the frame mesh.
    pub stripes: Vec<StripeRegisters>,
}

impl StripeState {
    /// Mesh fields to program for `stripe` of request `request_id`.
    ///
    /// The planned stripe start is used while it belongs to the same request, frame mesh
    /// and stripe; anything else is derived from `frame_mesh`.
    pub fn mesh_for(&self, request_id: u64, stripe: &StripeContext, frame_mesh: &MeshRegisters) -> MeshRegisters {
        let planned = self
            .stripes
            .get(stripe.index)
            .filter(|_| self.request_id == request_id && self.mesh.as_ref() == Some(frame_mesh))
            .filter(|regs| regs.stripe.x_offset == stripe.x_offset);
        match planned {
            Some(regs) => regs.apply(frame_mesh),
            None => frame_mesh.for_stripe(stripe.x_offset),
        }
    }
}

/// Input of the striping library for the module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StripingPlan {
    /// Whether the module is enabled for the frame.
    pub enable: bool,
    /// Whether the frame needs a new configuration.
    pub changed: bool,
    /// Frame mesh fields, when computed.
    pub mesh: Option<MeshRegisters>,
    /// Per-stripe mesh starts, empty when no mesh was computed.
    pub stripes: Vec<StripeRegisters>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_even() -> Result<(), LscError> {
        let stripes = split(4000, 2)?;
        assert_eq!(stripes.len(), 2);
        assert_eq!((stripes[0].x_offset, stripes[0].width), (0, 2000));
        assert_eq!((stripes[1].x_offset, stripes[1].width), (2000, 2000));
        assert!(!stripes[0].is_last());
        assert!(stripes[1].is_last());
        Ok(())
    }

    #[test]
    fn split_keeps_even_offsets() -> Result<(), LscError> {
        let stripes = split(4002, 4)?;
        assert!(stripes.iter().all(|s| s.x_offset % 2 == 0));
        assert_eq!(stripes.iter().map(|s| s.width).sum::<u32>(), 4002);
        assert_eq!(stripes[3].width, 4002 - 3 * 1000);
        Ok(())
    }

    #[test]
    fn split_errors() {
        assert_eq!(split(4000, 0), Err(LscError::InvalidStripe(0, 0)));
        assert_eq!(split(3, 2), Err(LscError::InvalidGeometry(3, 2)));
    }

    #[test]
    fn single_stripe_matches_frame() -> Result<(), LscError> {
        let mesh = MeshRegisters {
            intp_factor: 1,
            bwidth: 62,
            x_start: 16,
            bx_d1: 8,
            ..Default::default()
        };
        let stripe = split(4000, 1)?[0];
        let regs = StripeRegisters::new(stripe, &mesh);
        assert_eq!((regs.lx_start, regs.bx_start, regs.bx_d1), (0, 0, 8));
        Ok(())
    }

    #[test]
    fn planned_stripes_are_reused() -> Result<(), LscError> {
        let mesh = MeshRegisters {
            intp_factor: 1,
            bwidth: 62,
            x_start: 16,
            ..Default::default()
        };
        let stripes = split(4000, 2)?;
        let mut planned = StripeRegisters::new(stripes[1], &mesh);
        planned.bx_d1 = 5;
        let state = StripeState {
            request_id: 3,
            changed: true,
            mesh: Some(mesh),
            stripes: vec![StripeRegisters::new(stripes[0], &mesh), planned],
        };

        let programmed = state.mesh_for(3, &stripes[1], &mesh);
        assert_eq!(programmed, planned.apply(&mesh));
        assert_eq!(programmed.bx_d1, 5);
        assert_eq!(programmed.bwidth, 62);

        // another request, another mesh or another stripe layout: derived again
        let derived = mesh.for_stripe(stripes[1].x_offset);
        assert_eq!(state.mesh_for(4, &stripes[1], &mesh), derived);
        let other = MeshRegisters { bwidth: 30, ..mesh };
        assert_eq!(state.mesh_for(3, &stripes[1], &other), other.for_stripe(stripes[1].x_offset));
        let shifted = StripeContext {
            x_offset: 1000,
            ..stripes[1]
        };
        assert_eq!(state.mesh_for(3, &shifted, &mesh), mesh.for_stripe(1000));
        Ok(())
    }
}
