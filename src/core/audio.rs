//! Audio clock collaborators.
//!
//! The conductor only ever sees a track through [`AudioHandle`] and a device
//! through [`AudioDevice`]. [`SoftwareDevice`]/[`SoftwareTrack`] implement
//! both without touching real hardware: the track's cursor advances in whole
//! device periods, so its reported position moves in buffer-sized steps the
//! same way a real output stream does.

use log::{debug, trace};

/* ============================== Public API ============================== */

/// Output buffering as reported by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyInfo {
    pub period_size_in_frames: u32,
    pub period_size_in_milliseconds: u32,
    pub sample_rate: u32,
    pub valid: bool,
}

/// Error type for transport operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioError {
    /// The track never finished loading.
    NotInitialized,
    /// The request does not apply in the current transport state.
    InvalidOperation(&'static str),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::NotInitialized => write!(f, "Audio track is not initialized"),
            AudioError::InvalidOperation(msg) => write!(f, "Invalid audio operation: {}", msg),
        }
    }
}

impl std::error::Error for AudioError {}

/// A device that can report its output latency.
pub trait AudioDevice {
    fn latency_info(&self) -> LatencyInfo;
}

/// A playing (or pausable) music track.
///
/// Queries never fail: an unloaded track reports `0.0` positions and
/// durations, and a `0.0` duration means "not known yet".
pub trait AudioHandle {
    fn is_initialized(&self) -> bool;
    /// Hardware playback cursor, in seconds.
    fn position(&self) -> f32;
    fn duration(&self) -> f32;
    fn is_paused(&self) -> bool;
    fn set_position(&mut self, seconds: f32);
    fn set_playback_rate(&mut self, rate: f32);
    fn play(&mut self) -> Result<(), AudioError>;
    fn pause(&mut self) -> Result<(), AudioError>;
}

impl<T: AudioHandle + ?Sized> AudioHandle for &mut T {
    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }
    fn position(&self) -> f32 {
        (**self).position()
    }
    fn duration(&self) -> f32 {
        (**self).duration()
    }
    fn is_paused(&self) -> bool {
        (**self).is_paused()
    }
    fn set_position(&mut self, seconds: f32) {
        (**self).set_position(seconds);
    }
    fn set_playback_rate(&mut self, rate: f32) {
        (**self).set_playback_rate(rate);
    }
    fn play(&mut self) -> Result<(), AudioError> {
        (**self).play()
    }
    fn pause(&mut self) -> Result<(), AudioError> {
        (**self).pause()
    }
}

impl<T: AudioHandle + ?Sized> AudioHandle for Box<T> {
    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }
    fn position(&self) -> f32 {
        (**self).position()
    }
    fn duration(&self) -> f32 {
        (**self).duration()
    }
    fn is_paused(&self) -> bool {
        (**self).is_paused()
    }
    fn set_position(&mut self, seconds: f32) {
        (**self).set_position(seconds);
    }
    fn set_playback_rate(&mut self, rate: f32) {
        (**self).set_playback_rate(rate);
    }
    fn play(&mut self) -> Result<(), AudioError> {
        (**self).play()
    }
    fn pause(&mut self) -> Result<(), AudioError> {
        (**self).pause()
    }
}

/* ============================ Software clock ============================ */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftwareDevice {
    sample_rate: u32,
    period_frames: u32,
}

impl SoftwareDevice {
    pub const fn new(sample_rate: u32, period_frames: u32) -> Self {
        Self {
            sample_rate,
            period_frames,
        }
    }

    /// A track whose length is known up front.
    pub fn open_track(&self, duration_sec: f32) -> SoftwareTrack {
        SoftwareTrack::new(self.sample_rate, self.period_frames, duration_sec, true)
    }

    /// A streamed track: reports an unknown (`0.0`) duration until its first
    /// period has been rendered.
    pub fn open_stream(&self, duration_sec: f32) -> SoftwareTrack {
        SoftwareTrack::new(self.sample_rate, self.period_frames, duration_sec, false)
    }
}

impl AudioDevice for SoftwareDevice {
    fn latency_info(&self) -> LatencyInfo {
        if self.sample_rate == 0 {
            return LatencyInfo::default();
        }
        let period_ms = u64::from(self.period_frames) * 1000 / u64::from(self.sample_rate);
        LatencyInfo {
            period_size_in_frames: self.period_frames,
            period_size_in_milliseconds: u32::try_from(period_ms).unwrap_or(u32::MAX),
            sample_rate: self.sample_rate,
            valid: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SoftwareTrack {
    initialized: bool,
    paused: bool,
    rate: f32,
    sample_rate: u32,
    period_frames: u32,
    length_frames: u64,
    cursor_frames: u64,
    // Frames owed to the cursor that have not yet filled a whole period.
    pending_frames: f64,
    length_known: bool,
}

impl SoftwareTrack {
    fn new(sample_rate: u32, period_frames: u32, duration_sec: f32, length_known: bool) -> Self {
        let initialized = sample_rate > 0 && period_frames > 0;
        let length_frames = secs_to_frames(duration_sec, sample_rate);
        Self {
            initialized,
            paused: true,
            rate: 1.0,
            sample_rate,
            period_frames,
            length_frames,
            cursor_frames: 0,
            pending_frames: 0.0,
            length_known,
        }
    }

    /// A track that failed to load.
    pub fn uninitialized() -> Self {
        Self::new(0, 0, 0.0, false)
    }

    #[inline(always)]
    pub fn playback_rate(&self) -> f32 {
        self.rate
    }

    /// Renders `delta_time` seconds of wall-clock playback. The cursor only
    /// moves once a full period has accumulated.
    pub fn advance(&mut self, delta_time: f32) {
        if !self.initialized || self.paused || delta_time <= 0.0 {
            return;
        }
        self.pending_frames +=
            f64::from(delta_time) * f64::from(self.sample_rate) * f64::from(self.rate);
        let period = f64::from(self.period_frames);
        while self.pending_frames >= period {
            self.pending_frames -= period;
            self.cursor_frames =
                (self.cursor_frames + u64::from(self.period_frames)).min(self.length_frames);
            if !self.length_known {
                self.length_known = true;
                trace!("Software stream length resolved: {} frames", self.length_frames);
            }
        }
    }
}

impl AudioHandle for SoftwareTrack {
    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn position(&self) -> f32 {
        if !self.initialized {
            return 0.0;
        }
        (self.cursor_frames as f64 / f64::from(self.sample_rate)) as f32
    }

    fn duration(&self) -> f32 {
        if !self.initialized || !self.length_known {
            return 0.0;
        }
        (self.length_frames as f64 / f64::from(self.sample_rate)) as f32
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn set_position(&mut self, seconds: f32) {
        if !self.initialized {
            return;
        }
        self.cursor_frames = secs_to_frames(seconds, self.sample_rate).min(self.length_frames);
        self.pending_frames = 0.0;
    }

    fn set_playback_rate(&mut self, rate: f32) {
        self.rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
    }

    fn play(&mut self) -> Result<(), AudioError> {
        if !self.initialized {
            return Err(AudioError::NotInitialized);
        }
        if !self.paused {
            return Err(AudioError::InvalidOperation("track is already playing"));
        }
        self.paused = false;
        debug!("Software track started at frame {}", self.cursor_frames);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), AudioError> {
        if !self.initialized {
            return Err(AudioError::NotInitialized);
        }
        if self.paused {
            return Err(AudioError::InvalidOperation("track is already paused"));
        }
        self.paused = true;
        debug!("Software track paused at frame {}", self.cursor_frames);
        Ok(())
    }
}

#[inline(always)]
fn secs_to_frames(seconds: f32, sample_rate: u32) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (f64::from(seconds) * f64::from(sample_rate)) as u64
}
