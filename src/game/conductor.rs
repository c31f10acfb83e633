use crate::core::audio::{AudioDevice, AudioHandle};
use crate::game::timing::{TempoTimeline, TimingPoint};
use glam::IVec2;
use log::{debug, trace};
use serde::Serialize;
use smallvec::SmallVec;

// Oldest events are dropped past this backlog if nobody drains them.
const EVENT_BACKLOG_LIMIT: usize = 64;

/// Edges recorded by [`Conductor::update`] and [`Conductor::seek`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConductorEvent {
    Step(i32),
    Beat(i32),
    TempoChanged { index: usize, bpm: f64 },
}

/// Serializable view of everything the conductor exposes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConductorSnapshot {
    pub song_position: f32,
    pub song_duration: f32,
    pub bpm: f64,
    pub numerator: i32,
    pub denominator: i32,
    pub beat: i32,
    pub step: i32,
    pub playback_rate: f32,
}

/// The authoritative song clock.
///
/// Between hardware position updates (which arrive once per device period)
/// the song position is extrapolated from frame time; each fresh hardware
/// sample snaps it back, minus the cached device latency.
pub struct Conductor<A: AudioHandle> {
    audio: Option<A>,
    timeline: TempoTimeline,
    current_point_index: Option<usize>,

    playback_rate: f32,
    song_position: f32,
    song_duration: f32,

    last_hardware_position: f32,
    cached_latency: f32,

    current_beat: i32,
    current_step: i32,
    last_beat: i32,
    last_step: i32,

    events: SmallVec<[ConductorEvent; 4]>,
}

impl<A: AudioHandle> Conductor<A> {
    pub fn new(device: &impl AudioDevice, audio: Option<A>, timeline: TempoTimeline) -> Self {
        let song_duration = audio.as_ref().map_or(0.0, |a| a.duration());

        let latency = device.latency_info();
        let cached_latency = if latency.valid {
            latency.period_size_in_milliseconds as f32 / 1000.0
        } else {
            0.0
        };

        let current_point_index = (!timeline.is_empty()).then_some(0);

        let mut conductor = Self {
            audio,
            timeline,
            current_point_index,
            playback_rate: 1.0,
            song_position: 0.0,
            song_duration,
            last_hardware_position: 0.0,
            cached_latency,
            current_beat: 0,
            current_step: 0,
            last_beat: -1,
            last_step: -1,
            events: SmallVec::new(),
        };
        let rate = conductor.playback_rate;
        if let Some(audio) = conductor.audio.as_mut() {
            audio.set_playback_rate(rate);
        }
        debug!(
            "Conductor created: {} tempo points, latency {:.3}s, duration {:.3}s",
            conductor.timeline.len(),
            cached_latency,
            song_duration
        );
        conductor
    }

    pub fn play(&mut self) {
        if let Some(audio) = self.audio.as_mut()
            && let Err(e) = audio.play()
        {
            debug!("Conductor play request ignored: {e}");
        }
    }

    pub fn stop(&mut self) {
        if let Some(audio) = self.audio.as_mut()
            && let Err(e) = audio.pause()
        {
            trace!("Conductor stop request ignored: {e}");
        }
    }

    pub fn seek(&mut self, time_in_seconds: f32) {
        let Some(audio) = self.audio.as_mut().filter(|a| a.is_initialized()) else {
            return;
        };
        let position = time_in_seconds.max(0.0);
        audio.set_position(position);
        self.song_position = position;

        let index = self.timeline.segment_index_at(position);
        self.set_current_point(index);
        debug!("Seeked to {position:.3}s (tempo segment {index:?})");
    }

    pub fn update(&mut self, delta_time: f32) {
        let Some(audio) = self.audio.as_mut() else {
            return;
        };
        if audio.is_paused() {
            return;
        }

        // Devices publish their cursor once per period; extrapolate in between.
        let hardware_position = audio.position();
        if hardware_position != self.last_hardware_position {
            self.song_position = hardware_position - self.cached_latency;
            self.last_hardware_position = hardware_position;
        } else {
            self.song_position += delta_time * self.playback_rate;
        }

        if self.song_position < 0.0 {
            self.song_position = 0.0;
        }

        let mut reached_end = false;
        if self.song_duration <= 0.0 {
            let duration = audio.duration();
            if duration > 0.0 {
                self.song_duration = duration;
                trace!("Song duration resolved: {duration:.3}s");
            }
        } else {
            reached_end = self.song_position >= self.song_duration;
        }
        if reached_end {
            debug!("Song end reached at {:.3}s, stopping playback.", self.song_position);
            self.stop();
        }

        self.update_beat_and_step();

        if let Some(index) = self.current_point_index {
            let mut next = index;
            while self
                .timeline
                .get(next + 1)
                .is_some_and(|p| self.song_position >= p.time)
            {
                next += 1;
            }
            if next != index {
                self.set_current_point(Some(next));
                // Counters must describe the segment the cursor now sits in.
                self.update_beat_and_step();
            }
        }
    }

    fn update_beat_and_step(&mut self) {
        let Some(point) = self.current_point().copied() else {
            return;
        };
        let seconds_per_subdivision = point.seconds_per_subdivision();
        if !(seconds_per_subdivision.is_finite() && seconds_per_subdivision > 0.0) {
            return;
        }

        let time_elapsed = f64::from(self.song_position) - f64::from(point.time);
        self.current_step = (time_elapsed / seconds_per_subdivision).floor() as i32;
        if point.numerator > 0 {
            self.current_beat = self.current_step.div_euclid(point.numerator);
        }

        if self.current_step != self.last_step {
            self.push_event(ConductorEvent::Step(self.current_step));
            self.last_step = self.current_step;
        }
        if self.current_beat != self.last_beat {
            self.push_event(ConductorEvent::Beat(self.current_beat));
            self.last_beat = self.current_beat;
        }
    }

    fn set_current_point(&mut self, index: Option<usize>) {
        if index == self.current_point_index {
            return;
        }
        self.current_point_index = index;
        if let Some(i) = index
            && let Some(point) = self.timeline.get(i)
        {
            let bpm = point.bpm;
            trace!("Tempo segment {i} active: {bpm:.3} BPM");
            self.push_event(ConductorEvent::TempoChanged { index: i, bpm });
        }
    }

    fn push_event(&mut self, event: ConductorEvent) {
        if self.events.len() >= EVENT_BACKLOG_LIMIT {
            self.events.remove(0);
        }
        self.events.push(event);
    }

    /// Takes the events recorded since the last drain, oldest first.
    pub fn drain_events(&mut self) -> impl Iterator<Item = ConductorEvent> + '_ {
        self.events.drain(..)
    }

    /// BPM in effect at an arbitrary time, independent of the playback cursor.
    #[inline(always)]
    pub fn get_bpm_at_time(&self, time: f32) -> f64 {
        self.timeline.bpm_at(time)
    }

    /// Non-finite or non-positive rates fall back to 1.0.
    pub fn set_playback_rate(&mut self, rate: f32) {
        let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        self.playback_rate = rate;
        if let Some(audio) = self.audio.as_mut() {
            audio.set_playback_rate(rate);
        }
    }

    /// Current segment's BPM, or `-1.0` without a timeline.
    pub fn bpm(&self) -> f64 {
        self.current_point().map_or(-1.0, |p| p.bpm)
    }

    /// `(numerator, denominator)`, `4/4` without a timeline.
    pub fn time_signature(&self) -> IVec2 {
        self.current_point()
            .map_or(IVec2::new(4, 4), |p| IVec2::new(p.numerator, p.denominator))
    }

    #[inline(always)]
    pub fn current_point(&self) -> Option<&TimingPoint> {
        self.current_point_index.and_then(|i| self.timeline.get(i))
    }

    #[inline(always)]
    pub fn current_point_index(&self) -> Option<usize> {
        self.current_point_index
    }

    #[inline(always)]
    pub fn timeline(&self) -> &TempoTimeline {
        &self.timeline
    }

    #[inline(always)]
    pub fn song_position(&self) -> f32 {
        self.song_position
    }

    #[inline(always)]
    pub fn song_duration(&self) -> f32 {
        self.song_duration
    }

    #[inline(always)]
    pub fn playback_rate(&self) -> f32 {
        self.playback_rate
    }

    #[inline(always)]
    pub fn beat(&self) -> i32 {
        self.current_beat
    }

    #[inline(always)]
    pub fn step(&self) -> i32 {
        self.current_step
    }

    #[inline(always)]
    pub fn latency(&self) -> f32 {
        self.cached_latency
    }

    pub fn is_playing(&self) -> bool {
        self.audio.as_ref().is_some_and(|a| !a.is_paused())
    }

    #[inline(always)]
    pub fn audio(&self) -> Option<&A> {
        self.audio.as_ref()
    }

    #[inline(always)]
    pub fn audio_mut(&mut self) -> Option<&mut A> {
        self.audio.as_mut()
    }

    pub fn snapshot(&self) -> ConductorSnapshot {
        let signature = self.time_signature();
        ConductorSnapshot {
            song_position: self.song_position,
            song_duration: self.song_duration,
            bpm: self.bpm(),
            numerator: signature.x,
            denominator: signature.y,
            beat: self.current_beat,
            step: self.current_step,
            playback_rate: self.playback_rate,
        }
    }
}

impl<A: AudioHandle> Drop for Conductor<A> {
    fn drop(&mut self) {
        self.stop();
    }
}
