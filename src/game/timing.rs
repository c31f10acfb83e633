use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// BPM reported for any query against a timeline without tempo points.
pub const FALLBACK_BPM: f64 = 120.0;

const fn default_four() -> i32 {
    4
}

/// A timestamped tempo (and time-signature) change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingPoint {
    /// Start of the tempo segment, in seconds from the start of the audio.
    pub time: f32,
    pub bpm: f64,
    #[serde(default = "default_four")]
    pub numerator: i32,
    /// Subdivision unit used for step counting (4 = quarter notes), not a
    /// strict music-theory denominator.
    #[serde(default = "default_four")]
    pub denominator: i32,
}

impl TimingPoint {
    #[inline(always)]
    pub const fn new(time: f32, bpm: f64, numerator: i32, denominator: i32) -> Self {
        Self {
            time,
            bpm,
            numerator,
            denominator,
        }
    }

    /// Seconds covered by one step of this segment. A whole note lasts
    /// `240 / bpm` seconds and is split into `denominator` steps.
    #[inline(always)]
    pub fn seconds_per_subdivision(&self) -> f64 {
        (240.0 / self.bpm) / f64::from(self.denominator)
    }
}

/// Piecewise-constant tempo map, sorted by time and immutable once built.
///
/// Cloning is cheap: the points live behind an `Arc` so the conductor, the
/// scroll calculator and background note construction can all read the same
/// timeline.
#[derive(Debug, Clone, Default)]
pub struct TempoTimeline {
    points: Arc<[TimingPoint]>,
}

impl TempoTimeline {
    pub fn new(mut points: Vec<TimingPoint>) -> Self {
        // Stable sort: points sharing a time keep chart order, so the later
        // one is the one lookups resolve to.
        points.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            points: points.into(),
        }
    }

    #[inline(always)]
    pub fn points(&self) -> &[TimingPoint] {
        &self.points
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline(always)]
    pub fn get(&self, index: usize) -> Option<&TimingPoint> {
        self.points.get(index)
    }

    /// Index of the segment active at `time`: the latest point with
    /// `point.time <= time`, or the first point when `time` precedes them all.
    /// `None` only for an empty timeline.
    pub fn segment_index_at(&self, time: f32) -> Option<usize> {
        if self.points.is_empty() {
            return None;
        }
        let idx = self.points.partition_point(|p| p.time <= time);
        Some(idx.saturating_sub(1))
    }

    #[inline(always)]
    pub fn point_at(&self, time: f32) -> Option<&TimingPoint> {
        self.segment_index_at(time).and_then(|i| self.points.get(i))
    }

    pub fn bpm_at(&self, time: f32) -> f64 {
        self.point_at(time).map_or(FALLBACK_BPM, |p| p.bpm)
    }

    /// Tempo changes strictly after `from` and at or before `to`, in order.
    pub fn changes_within(&self, from: f32, to: f32) -> impl Iterator<Item = &TimingPoint> {
        let start = self.points.partition_point(|p| p.time <= from);
        self.points[start..].iter().take_while(move |p| p.time <= to)
    }

    /// Lowest and highest finite, positive BPM on the timeline.
    pub fn bpm_range(&self) -> Option<(f64, f64)> {
        self.points
            .iter()
            .map(|p| p.bpm)
            .filter(|bpm| bpm.is_finite() && *bpm > 0.0)
            .fold(None, |range, bpm| match range {
                None => Some((bpm, bpm)),
                Some((lo, hi)) => Some((lo.min(bpm), hi.max(bpm))),
            })
    }
}

impl From<Vec<TimingPoint>> for TempoTimeline {
    fn from(points: Vec<TimingPoint>) -> Self {
        Self::new(points)
    }
}
