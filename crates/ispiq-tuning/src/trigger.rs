use serde::{Deserialize, Serialize};

use crate::error::TuningError;

/// Tolerance used when comparing two float triggers.
pub const TRIGGER_EPSILON: f32 = 1e-5;

/// Returns true if two trigger values are equal within [`TRIGGER_EPSILON`].
#[inline]
pub fn trigger_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < TRIGGER_EPSILON
}

/// Live per-frame trigger values published by the 3A algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerData {
    /// AEC lux index.
    pub lux_index: f32,
    /// AEC real gain.
    pub real_gain: f32,
    /// AEC sensitivity.
    pub aec_sensitivity: f32,
    /// Exposure time in seconds.
    pub exposure_time: f32,
    /// Ratio between the long and short exposure gains.
    pub exposure_gain_ratio: f32,
    /// AWB correlated color temperature in kelvin.
    pub color_temperature: f32,
    /// Dynamic range compression gain.
    pub drc_gain: f32,
    /// LED flash sensitivity.
    pub led_sensitivity: f32,
    /// Number of LED flashes fired.
    pub number_of_led: u32,
    /// Weight of the first LED when two LEDs fire.
    pub led_first_entry_ratio: f32,
    /// Lens actuator position.
    pub lens_position: f32,
}

impl TriggerData {
    /// Compares `incoming` against the cached triggers and caches it if anything moved.
    ///
    /// # Returns
    ///
    /// True if any float trigger moved by more than [`TRIGGER_EPSILON`] or the LED
    /// sensitivity changed.
    pub fn check_update(&mut self, incoming: &TriggerData) -> bool {
        let unchanged = trigger_eq(self.lux_index, incoming.lux_index)
            && trigger_eq(self.real_gain, incoming.real_gain)
            && trigger_eq(self.aec_sensitivity, incoming.aec_sensitivity)
            && trigger_eq(self.exposure_time, incoming.exposure_time)
            && trigger_eq(self.exposure_gain_ratio, incoming.exposure_gain_ratio)
            && trigger_eq(self.color_temperature, incoming.color_temperature)
            && trigger_eq(self.drc_gain, incoming.drc_gain)
            && trigger_eq(self.led_first_entry_ratio, incoming.led_first_entry_ratio)
            && trigger_eq(self.lens_position, incoming.lens_position)
            && self.led_sensitivity == incoming.led_sensitivity;

        if !unchanged {
            *self = *incoming;
        }

        !unchanged
    }
}

/// Trigger keying one level of a coefficient tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Lens actuator position.
    LensPosition,
    /// Dynamic range compression gain.
    DrcGain,
    /// HDR exposure trigger, see [`AecHdrControl`].
    HdrAec,
    /// LED flash state.
    Led,
    /// Exposure trigger, see [`AecExpControl`].
    Aec,
    /// Correlated color temperature.
    Cct,
}

/// Which AEC output drives the AEC trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AecExpControl {
    /// The lux index.
    #[default]
    Lux,
    /// The real gain.
    Gain,
}

/// Which AEC output drives the HDR-AEC trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AecHdrControl {
    /// The exposure time.
    ExposureTime,
    /// The sensitivity.
    Sensitivity,
    /// The exposure/gain ratio.
    #[default]
    ExposureGainRatio,
}

/// Control method of a chromatix, selecting which values drive the AEC triggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlMethod {
    /// Source of the AEC trigger.
    pub aec_exp_control: AecExpControl,
    /// Source of the HDR-AEC trigger.
    pub aec_hdr_control: AecHdrControl,
}

/// Closed range `[start, end]` of trigger values owned by one region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerRange {
    /// First trigger value of the region.
    pub start: f32,
    /// Last trigger value of the region.
    pub end: f32,
}

impl TriggerRange {
    /// Creates a new trigger range.
    pub const fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    /// Checks that the range does not end before it starts.
    pub fn validate(&self) -> Result<(), TuningError> {
        if self.end < self.start {
            return Err(TuningError::InvalidRange(self.start, self.end));
        }
        Ok(())
    }

    /// Returns true if `value` lies inside the range.
    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        value >= self.start && value <= self.end
    }
}

/// Outcome of a region search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionSelection {
    /// Index of the first region to blend.
    pub start: usize,
    /// Index of the second region to blend.
    pub end: usize,
    /// Weight of the second region, in `[0, 1]`.
    pub ratio: f32,
}

impl RegionSelection {
    /// Selects a single region.
    pub const fn single(index: usize) -> Self {
        Self {
            start: index,
            end: index,
            ratio: 0.0,
        }
    }
}

/// Linear position of `value` between `start` and `end`, clamped to `[0, 1]`.
pub fn interpolation_ratio(value: f32, start: f32, end: f32) -> f32 {
    let span = end - start;
    if span.abs() < TRIGGER_EPSILON {
        return 0.0;
    }
    ((value - start) / span).clamp(0.0, 1.0)
}

/// Finds the regions to blend for `value`.
///
/// A value inside a region selects it alone. A value in the gap between two consecutive
/// regions blends them linearly. Values outside the covered range clamp to the first or
/// last region.
///
/// # Arguments
///
/// * `ranges` - The ordered trigger ranges of the regions. Must not be empty.
/// * `value` - The trigger value.
pub fn select_region<'a, I>(ranges: I, value: f32) -> RegionSelection
where
    I: IntoIterator<Item = &'a TriggerRange>,
{
    let mut last = 0;
    let mut previous: Option<&TriggerRange> = None;

    for (index, range) in ranges.into_iter().enumerate() {
        match previous {
            None if value <= range.end => return RegionSelection::single(0),
            Some(prev) if value < range.start => {
                return RegionSelection {
                    start: index - 1,
                    end: index,
                    ratio: interpolation_ratio(value, prev.end, range.start),
                };
            }
            _ if value <= range.end => return RegionSelection::single(index),
            _ => {}
        }
        previous = Some(range);
        last = index;
    }

    RegionSelection::single(last)
}

/// Trigger values resolved against the control method of a chromatix.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TriggerValues {
    /// Lens position trigger.
    pub lens_position: f32,
    /// DRC gain trigger.
    pub drc_gain: f32,
    /// HDR-AEC trigger.
    pub hdr_aec: f32,
    /// AEC trigger.
    pub aec: f32,
    /// CCT trigger.
    pub cct: f32,
    /// LED sensitivity.
    pub led_sensitivity: f32,
    /// Number of LED flashes fired.
    pub number_of_led: u32,
    /// Weight of the first LED when two LEDs fire.
    pub led_first_entry_ratio: f32,
    /// Sensitivity range over which the LED-on table fades in.
    pub led_sensitivity_range: TriggerRange,
}

impl TriggerValues {
    /// Resolves the frame triggers for one chromatix.
    pub fn resolve(data: &TriggerData, control: &ControlMethod, led_range: TriggerRange) -> Self {
        let aec = match control.aec_exp_control {
            AecExpControl::Lux => data.lux_index,
            AecExpControl::Gain => data.real_gain,
        };
        let hdr_aec = match control.aec_hdr_control {
            AecHdrControl::ExposureTime => data.exposure_time,
            AecHdrControl::Sensitivity => data.aec_sensitivity,
            AecHdrControl::ExposureGainRatio => data.exposure_gain_ratio,
        };

        Self {
            lens_position: data.lens_position,
            drc_gain: data.drc_gain,
            hdr_aec,
            aec,
            cct: data.color_temperature,
            led_sensitivity: data.led_sensitivity,
            number_of_led: data.number_of_led,
            led_first_entry_ratio: data.led_first_entry_ratio,
            led_sensitivity_range: led_range,
        }
    }

    /// The scalar trigger value of `kind`.
    pub fn value(&self, kind: TriggerKind) -> f32 {
        match kind {
            TriggerKind::LensPosition => self.lens_position,
            TriggerKind::DrcGain => self.drc_gain,
            TriggerKind::HdrAec => self.hdr_aec,
            TriggerKind::Led => self.led_sensitivity,
            TriggerKind::Aec => self.aec,
            TriggerKind::Cct => self.cct,
        }
    }
}
