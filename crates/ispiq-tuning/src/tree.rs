use serde::{Deserialize, Serialize};

use crate::{
    error::TuningError,
    trigger::{interpolation_ratio, select_region, RegionSelection, TriggerKind, TriggerRange, TriggerValues},
};

/// Linear blending of tuning data.
pub trait Interpolate: Clone {
    /// Returns `(1 - ratio) * self + ratio * other`.
    fn interpolate(&self, other: &Self, ratio: f32) -> Self;
}

impl Interpolate for f32 {
    fn interpolate(&self, other: &Self, ratio: f32) -> Self {
        (1.0 - ratio) * self + ratio * other
    }
}

/// One region of a coefficient tree branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningRegion<T> {
    /// Trigger values owned by the region.
    pub range: TriggerRange,
    /// Sub-tree used when the region is selected.
    pub node: TuningNode<T>,
}

/// A tuning coefficient tree.
///
/// Each branch is keyed by one trigger and holds its regions in ascending trigger order;
/// leaves hold region data. Branches keyed by [`TriggerKind::Led`] hold the LED-off,
/// single LED and dual LED regions in that order and ignore the region ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningNode<T> {
    /// Region data.
    Leaf(T),
    /// Regions selected by one trigger.
    Branch {
        /// The trigger keying the regions.
        trigger: TriggerKind,
        /// The regions, ordered by trigger value.
        regions: Vec<TuningRegion<T>>,
    },
}

impl<T: Interpolate> TuningNode<T> {
    /// Interpolates the tree for the given trigger values.
    ///
    /// # Errors
    ///
    /// Returns [`TuningError::EmptyBranch`] if a visited branch has no region.
    pub fn interpolate(&self, triggers: &TriggerValues) -> Result<T, TuningError> {
        match self {
            TuningNode::Leaf(data) => Ok(data.clone()),
            TuningNode::Branch { trigger, regions } => {
                if regions.is_empty() {
                    return Err(TuningError::EmptyBranch(*trigger));
                }

                let selection = match trigger {
                    TriggerKind::Led => select_led_region(regions.len(), triggers),
                    kind => select_region(regions.iter().map(|r| &r.range), triggers.value(*kind)),
                };

                let mut result = blend(regions, selection, triggers)?;

                if *trigger == TriggerKind::Led
                    && triggers.number_of_led == 2
                    && triggers.led_first_entry_ratio != 0.0
                    && regions.len() >= 3
                {
                    let second = regions[2].node.interpolate(triggers)?;
                    result = result.interpolate(&second, 1.0 - triggers.led_first_entry_ratio);
                }

                Ok(result)
            }
        }
    }

    /// Visits every leaf of the tree.
    pub fn try_for_each_leaf<F>(&self, f: &mut F) -> Result<(), TuningError>
    where
        F: FnMut(&T) -> Result<(), TuningError>,
    {
        match self {
            TuningNode::Leaf(data) => f(data),
            TuningNode::Branch { trigger, regions } => {
                if regions.is_empty() {
                    return Err(TuningError::EmptyBranch(*trigger));
                }
                for region in regions {
                    region.range.validate()?;
                    region.node.try_for_each_leaf(f)?;
                }
                Ok(())
            }
        }
    }
}

fn blend<T: Interpolate>(
    regions: &[TuningRegion<T>],
    selection: RegionSelection,
    triggers: &TriggerValues,
) -> Result<T, TuningError> {
    let first = regions[selection.start].node.interpolate(triggers)?;
    if selection.start == selection.end || selection.ratio <= 0.0 {
        return Ok(first);
    }
    let second = regions[selection.end].node.interpolate(triggers)?;
    if selection.ratio >= 1.0 {
        return Ok(second);
    }
    Ok(first.interpolate(&second, selection.ratio))
}

fn select_led_region(num_regions: usize, triggers: &TriggerValues) -> RegionSelection {
    let range = triggers.led_sensitivity_range;
    let value = triggers.led_sensitivity;

    let selection = match triggers.number_of_led {
        _ if num_regions == 1 => RegionSelection::single(0),
        0 => RegionSelection::single(0),
        1 | 2 => {
            if value >= range.end {
                RegionSelection::single(1)
            } else if value <= range.start {
                RegionSelection::single(0)
            } else {
                RegionSelection {
                    start: 0,
                    end: 1,
                    ratio: interpolation_ratio(value, range.start, range.end),
                }
            }
        }
        n => {
            log::warn!("Unexpected number of LEDs {n}, using the LED off region");
            RegionSelection::single(0)
        }
    };

    RegionSelection {
        start: selection.start.min(num_regions - 1),
        end: selection.end.min(num_regions - 1),
        ratio: selection.ratio,
    }
}
