use crate::core::audio::AudioHandle;
use crate::game::conductor::Conductor;
use crate::game::timing::{FALLBACK_BPM, TempoTimeline};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollSpeedSetting {
    /// Multiplier on the chart tempo.
    XMod(f32),
    /// Constant speed expressed in "BPM equivalent".
    CMod(f32),
}

impl Default for ScrollSpeedSetting {
    fn default() -> Self {
        ScrollSpeedSetting::XMod(1.0)
    }
}

impl ScrollSpeedSetting {
    /// Distance between two consecutive beats at 1x, in pixels.
    pub const ARROW_SPACING: f32 = 64.0;

    #[inline(always)]
    pub fn pixels_per_second(self, bpm: f32) -> f32 {
        match self {
            ScrollSpeedSetting::XMod(multiplier) => {
                bpm * multiplier * (Self::ARROW_SPACING / 60.0)
            }
            ScrollSpeedSetting::CMod(c_bpm) => (c_bpm / 60.0) * Self::ARROW_SPACING,
        }
    }

    #[inline(always)]
    pub fn value(self) -> f32 {
        match self {
            ScrollSpeedSetting::XMod(v) | ScrollSpeedSetting::CMod(v) => v,
        }
    }
}

impl core::fmt::Display for ScrollSpeedSetting {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ScrollSpeedSetting::XMod(v) => write!(f, "{v}x"),
            ScrollSpeedSetting::CMod(v) => write!(f, "C{v}"),
        }
    }
}

impl FromStr for ScrollSpeedSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let parse = |num: &str| {
            num.trim()
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("'{raw}' is not a valid scroll speed"))
        };
        if let Some(rest) = raw.strip_prefix(['C', 'c']) {
            return parse(rest).map(ScrollSpeedSetting::CMod);
        }
        if let Some(rest) = raw.strip_prefix(['X', 'x']) {
            return parse(rest).map(ScrollSpeedSetting::XMod);
        }
        if let Some(rest) = raw.strip_suffix(['X', 'x']) {
            return parse(rest).map(ScrollSpeedSetting::XMod);
        }
        Err(format!("'{raw}' is not a valid scroll speed"))
    }
}

/// Turns chart time into screen Y under the current scroll setting.
///
/// With a timeline attached, XMod distance is integrated segment by segment
/// so tempo changes between the note and the receptor bend the spacing.
#[derive(Debug, Clone, Default)]
pub struct ScrollSpeedCalculator {
    setting: ScrollSpeedSetting,
    timeline: Option<TempoTimeline>,
}

impl ScrollSpeedCalculator {
    pub fn new(timeline: Option<TempoTimeline>) -> Self {
        Self {
            setting: ScrollSpeedSetting::default(),
            timeline,
        }
    }

    pub fn for_conductor<A: AudioHandle>(conductor: &Conductor<A>) -> Self {
        Self::new(Some(conductor.timeline().clone()))
    }

    pub fn set_conductor<A: AudioHandle>(&mut self, conductor: Option<&Conductor<A>>) {
        self.timeline = conductor.map(|c| c.timeline().clone());
    }

    pub fn set_timeline(&mut self, timeline: Option<TempoTimeline>) {
        self.timeline = timeline;
    }

    #[inline(always)]
    pub fn timeline(&self) -> Option<&TempoTimeline> {
        self.timeline.as_ref()
    }

    #[inline(always)]
    pub fn setting(&self) -> ScrollSpeedSetting {
        self.setting
    }

    pub fn set_setting(&mut self, setting: ScrollSpeedSetting) {
        self.setting = setting;
    }

    pub fn set_xmod(&mut self, multiplier: f32) {
        self.setting = ScrollSpeedSetting::XMod(multiplier);
    }

    pub fn set_cmod(&mut self, constant_speed: f32) {
        self.setting = ScrollSpeedSetting::CMod(constant_speed);
    }

    #[inline(always)]
    pub fn calculate_scroll_speed(&self, current_bpm: f32) -> f32 {
        self.setting.pixels_per_second(current_bpm)
    }

    #[inline(always)]
    pub fn get_display_speed(&self, current_bpm: f32) -> f32 {
        self.calculate_scroll_speed(current_bpm)
    }

    pub fn convert_to_cmod(&mut self, reference_bpm: f32) {
        if let ScrollSpeedSetting::XMod(multiplier) = self.setting {
            self.set_cmod(multiplier * reference_bpm);
        }
    }

    pub fn convert_to_xmod(&mut self, reference_bpm: f32) {
        if let ScrollSpeedSetting::CMod(c_bpm) = self.setting
            && reference_bpm > 0.0
        {
            self.set_xmod(c_bpm / reference_bpm);
        }
    }

    #[inline(always)]
    fn bpm_at(&self, time: f32) -> f32 {
        self.timeline.as_ref().map_or(FALLBACK_BPM, |t| t.bpm_at(time)) as f32
    }

    /// Pixels travelled between `from_time` and `to_time` (`from_time <= to_time`).
    pub fn calculate_distance_through_sections(&self, from_time: f32, to_time: f32) -> f32 {
        let Some(timeline) = self.timeline.as_ref() else {
            let pps = self.setting.pixels_per_second(FALLBACK_BPM as f32);
            return (to_time - from_time) * pps;
        };

        let mut total_distance = 0.0;
        let mut section_start = from_time;
        for point in timeline.changes_within(from_time, to_time) {
            let pps = self.setting.pixels_per_second(self.bpm_at(section_start));
            total_distance += (point.time - section_start) * pps;
            section_start = point.time;
        }
        if section_start < to_time {
            let pps = self.setting.pixels_per_second(self.bpm_at(section_start));
            total_distance += (to_time - section_start) * pps;
        }
        total_distance
    }

    /// Screen Y of a note at `note_time` when the song is at `current_time`.
    /// Future notes sit above `strum_line_y`, past notes below it.
    pub fn calculate_note_y_position(
        &self,
        note_time: f32,
        current_time: f32,
        strum_line_y: f32,
    ) -> f32 {
        let time_diff = note_time - current_time;

        if let ScrollSpeedSetting::CMod(_) = self.setting {
            return strum_line_y - time_diff * self.setting.pixels_per_second(0.0);
        }
        if self.timeline.is_none() {
            let pps = self.setting.pixels_per_second(FALLBACK_BPM as f32);
            return strum_line_y - time_diff * pps;
        }

        let distance = if note_time >= current_time {
            self.calculate_distance_through_sections(current_time, note_time)
        } else {
            -self.calculate_distance_through_sections(note_time, current_time)
        };
        strum_line_y - distance
    }
}
