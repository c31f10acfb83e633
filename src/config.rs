use crate::game::scroll::ScrollSpeedSetting;
use directories::ProjectDirs;
use ini::Ini;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

const CONFIG_PATH: &str = "vsrg.ini";
const SECTION: &str = "Options";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
            Self::Trace => "Trace",
        }
    }

    pub const fn as_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Off => log::LevelFilter::Off,
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub log_level: LogLevel,
    pub scroll_speed: ScrollSpeedSetting,
    pub music_rate: f32,
    pub screen_width: u32,
    pub screen_height: u32,
    /// Distance of the strum line above the bottom edge, pixels.
    pub strum_line_offset: f32,
    pub strum_width: f32,
    pub audio_period_frames: u32,
    pub audio_sample_rate_hz: u32,
    pub frame_rate: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            scroll_speed: ScrollSpeedSetting::CMod(1600.0),
            music_rate: 1.0,
            screen_width: 1280,
            screen_height: 720,
            strum_line_offset: 128.0,
            strum_width: 96.0,
            audio_period_frames: 480,
            audio_sample_rate_hz: 48_000,
            frame_rate: 240,
        }
    }
}

impl Config {
    /// Reads every known key, keeping the default for anything missing or
    /// malformed.
    pub fn from_ini(conf: &Ini) -> Self {
        let default = Self::default();
        let get = |key: &str| conf.get_from(Some(SECTION), key).map(str::trim);

        Self {
            log_level: get("LogLevel")
                .and_then(|v| LogLevel::from_str(v).ok())
                .unwrap_or(default.log_level),
            scroll_speed: get("ScrollSpeed")
                .and_then(|v| ScrollSpeedSetting::from_str(v).ok())
                .unwrap_or(default.scroll_speed),
            music_rate: get("MusicRate")
                .and_then(|v| v.parse::<f32>().ok())
                .filter(|r| r.is_finite() && *r > 0.0)
                .unwrap_or(default.music_rate),
            screen_width: get("ScreenWidth")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|w| *w > 0)
                .unwrap_or(default.screen_width),
            screen_height: get("ScreenHeight")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|h| *h > 0)
                .unwrap_or(default.screen_height),
            strum_line_offset: get("StrumLineOffset")
                .and_then(|v| v.parse::<f32>().ok())
                .filter(|o| o.is_finite())
                .unwrap_or(default.strum_line_offset),
            strum_width: get("StrumWidth")
                .and_then(|v| v.parse::<f32>().ok())
                .filter(|w| w.is_finite() && *w > 0.0)
                .unwrap_or(default.strum_width),
            audio_period_frames: get("AudioPeriodFrames")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|f| *f > 0)
                .unwrap_or(default.audio_period_frames),
            audio_sample_rate_hz: get("AudioSampleRateHz")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|hz| *hz > 0)
                .unwrap_or(default.audio_sample_rate_hz),
            frame_rate: get("FrameRate")
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|fps| *fps > 0)
                .unwrap_or(default.frame_rate),
        }
    }

    pub fn to_ini(&self) -> Ini {
        let mut conf = Ini::new();
        // Keys in alphabetical order.
        conf.with_section(Some(SECTION))
            .set("AudioPeriodFrames", self.audio_period_frames.to_string())
            .set("AudioSampleRateHz", self.audio_sample_rate_hz.to_string())
            .set("FrameRate", self.frame_rate.to_string())
            .set("LogLevel", self.log_level.as_str())
            .set("MusicRate", self.music_rate.to_string())
            .set("ScreenHeight", self.screen_height.to_string())
            .set("ScreenWidth", self.screen_width.to_string())
            .set("ScrollSpeed", self.scroll_speed.to_string())
            .set("StrumLineOffset", self.strum_line_offset.to_string())
            .set("StrumWidth", self.strum_width.to_string());
        conf
    }

    #[inline(always)]
    pub fn strum_line_y(&self) -> f32 {
        self.screen_height as f32 - self.strum_line_offset
    }

    #[inline(always)]
    pub fn frame_time(&self) -> f32 {
        1.0 / self.frame_rate as f32
    }
}

static CONFIG: std::sync::LazyLock<Mutex<Config>> =
    std::sync::LazyLock::new(|| Mutex::new(Config::default()));

// --- File I/O ---

/// `--config` wins, then `./vsrg.ini`, then an existing file in the
/// platform config directory. A fresh default is written to `./vsrg.ini`.
fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let local = PathBuf::from(CONFIG_PATH);
    if local.exists() {
        return local;
    }
    if let Some(dirs) = ProjectDirs::from("", "", "vsrg") {
        let candidate = dirs.config_dir().join(CONFIG_PATH);
        if candidate.exists() {
            return candidate;
        }
    }
    local
}

fn create_default_config_file(path: &Path) -> Result<(), std::io::Error> {
    info!("'{}' not found, creating with default values.", path.display());
    Config::default().to_ini().write_to_file(path)
}

pub fn load(explicit: Option<&Path>) {
    let path = resolve_config_path(explicit);
    if !path.exists()
        && let Err(e) = create_default_config_file(&path)
    {
        warn!("Failed to create default config file: {e}");
    }

    match Ini::load_from_file(&path) {
        Ok(conf) => {
            let loaded = Config::from_ini(&conf);
            *CONFIG.lock().unwrap() = loaded;
            info!("Configuration loaded from '{}'.", path.display());
        }
        Err(e) => {
            warn!("Failed to load '{}': {e}. Using default values.", path.display());
            *CONFIG.lock().unwrap() = Config::default();
        }
    }
}

pub fn get() -> Config {
    *CONFIG.lock().unwrap()
}

/// Applies command-line overrides on top of the loaded file.
pub fn update<F: FnOnce(&mut Config)>(f: F) {
    let mut cfg = CONFIG.lock().unwrap();
    f(&mut cfg);
}
