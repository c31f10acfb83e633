use crate::game::parsing::{json::JsonChartLoader, osu::OsuManiaLoader};
use crate::game::timing::{TempoTimeline, TimingPoint};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoteType {
    #[default]
    Tap,
    Hold,
    Mine,
    Roll,
}

const fn default_key_count() -> usize {
    4
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartMetadata {
    pub title: String,
    pub subtitle: String,
    pub artist: String,
    pub charter: String,
    pub difficulty: String,
    pub audio_file: String,
    pub background_file: String,
    #[serde(default = "default_key_count")]
    pub key_count: usize,
    /// Seconds.
    pub preview_time: f32,
    /// Audio lead-in, seconds.
    pub offset: f32,
}

impl Default for ChartMetadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            subtitle: String::new(),
            artist: String::new(),
            charter: String::new(),
            difficulty: String::new(),
            audio_file: String::new(),
            background_file: String::new(),
            key_count: default_key_count(),
            preview_time: 0.0,
            offset: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawChartNote")]
pub struct ChartNote {
    pub column: usize,
    pub time: f32,
    /// Equal to `time` for anything but holds and rolls.
    pub end_time: f32,
    #[serde(rename = "type")]
    pub note_type: NoteType,
}

// On-disk shape: `end_time` may be omitted for notes without a tail.
#[derive(Deserialize)]
struct RawChartNote {
    column: usize,
    time: f32,
    #[serde(default)]
    end_time: Option<f32>,
    #[serde(default, rename = "type")]
    note_type: NoteType,
}

impl From<RawChartNote> for ChartNote {
    fn from(raw: RawChartNote) -> Self {
        Self {
            column: raw.column,
            time: raw.time,
            end_time: raw.end_time.unwrap_or(raw.time),
            note_type: raw.note_type,
        }
    }
}

impl ChartNote {
    pub const fn tap(column: usize, time: f32) -> Self {
        Self {
            column,
            time,
            end_time: time,
            note_type: NoteType::Tap,
        }
    }

    pub const fn hold(column: usize, time: f32, end_time: f32) -> Self {
        Self {
            column,
            time,
            end_time,
            note_type: NoteType::Hold,
        }
    }
}

/// Normalized chart: what every loader produces and the playfield consumes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChartData {
    #[serde(default)]
    pub metadata: ChartMetadata,
    #[serde(default)]
    pub notes: Vec<ChartNote>,
    #[serde(default)]
    pub timing_points: Vec<TimingPoint>,
}

impl ChartData {
    pub fn sort_notes(&mut self) {
        self.notes.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    pub fn sort_timing_points(&mut self) {
        self.timing_points.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    pub fn notes_for_column(&self, column: usize) -> impl Iterator<Item = &ChartNote> {
        self.notes.iter().filter(move |n| n.column == column)
    }

    pub fn timeline(&self) -> TempoTimeline {
        TempoTimeline::new(self.timing_points.clone())
    }

    /// Time of the last note end, or 0 for an empty chart.
    pub fn last_note_time(&self) -> f32 {
        self.notes
            .iter()
            .map(|n| n.end_time.max(n.time))
            .fold(0.0, f32::max)
    }
}

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No chart loader accepts '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid JSON chart: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed {field} at line {line}: '{value}'")]
    MalformedField {
        line: usize,
        field: &'static str,
        value: String,
    },
}

pub trait ChartLoader: Send + Sync {
    fn name(&self) -> &'static str;
    fn can_load(&self, path: &Path) -> bool;
    fn load(&self, text: &str) -> Result<ChartData, ChartError>;
}

#[inline(always)]
pub(crate) fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Dispatches chart files to the first loader that claims them.
pub struct ChartLoaderRegistry {
    loaders: Vec<Box<dyn ChartLoader>>,
}

impl Default for ChartLoaderRegistry {
    fn default() -> Self {
        Self::with_default_loaders()
    }
}

impl ChartLoaderRegistry {
    pub fn empty() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    pub fn with_default_loaders() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(OsuManiaLoader));
        registry.register(Box::new(JsonChartLoader));
        registry
    }

    pub fn register(&mut self, loader: Box<dyn ChartLoader>) {
        self.loaders.push(loader);
    }

    pub fn loader_for(&self, path: &Path) -> Option<&dyn ChartLoader> {
        self.loaders
            .iter()
            .find(|l| l.can_load(path))
            .map(|l| l.as_ref())
    }

    pub fn load_chart(&self, path: &Path) -> Result<ChartData, ChartError> {
        let Some(loader) = self.loader_for(path) else {
            warn!("No chart loader for {:?}", path);
            return Err(ChartError::UnsupportedFormat(path.display().to_string()));
        };
        let text = fs::read_to_string(path)?;
        let chart = loader.load(&text)?;
        info!(
            "Loaded {} chart '{}' - '{}' [{}]: {} notes, {} timing points",
            loader.name(),
            chart.metadata.title,
            chart.metadata.artist,
            chart.metadata.difficulty,
            chart.notes.len(),
            chart.timing_points.len()
        );
        Ok(chart)
    }
}

#[cfg(test)]
mod tests {
    use super::{ChartData, ChartError, ChartLoaderRegistry, ChartNote, NoteType};
    use crate::game::timing::TimingPoint;
    use std::path::Path;

    #[test]
    fn sorting_and_column_queries() {
        let mut chart = ChartData {
            notes: vec![
                ChartNote::tap(1, 2.0),
                ChartNote::hold(0, 0.5, 4.0),
                ChartNote::tap(1, 1.0),
            ],
            timing_points: vec![
                TimingPoint::new(3.0, 180.0, 4, 4),
                TimingPoint::new(0.0, 120.0, 4, 4),
            ],
            ..Default::default()
        };
        chart.sort_notes();
        chart.sort_timing_points();
        let times: Vec<f32> = chart.notes.iter().map(|n| n.time).collect();
        assert_eq!(times, vec![0.5, 1.0, 2.0]);
        assert_eq!(chart.timing_points[0].time, 0.0);
        assert_eq!(chart.notes_for_column(1).count(), 2);
        assert_eq!(chart.last_note_time(), 4.0);
        assert_eq!(chart.metadata.key_count, 4);
    }

    #[test]
    fn registry_dispatches_on_extension() {
        let registry = ChartLoaderRegistry::with_default_loaders();
        let name = |path: &str| registry.loader_for(Path::new(path)).map(|l| l.name());
        assert_eq!(name("songs/a.osu"), Some("osu!mania"));
        assert_eq!(name("b.JSON"), Some("json"));
        assert!(registry.loader_for(Path::new("c.sm")).is_none());
        assert!(matches!(
            registry.load_chart(Path::new("c.sm")),
            Err(ChartError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let registry = ChartLoaderRegistry::default();
        let result = registry.load_chart(Path::new("definitely/not/here.osu"));
        assert!(matches!(result, Err(ChartError::Io(_))), "got {result:?}");
    }

    #[test]
    fn note_type_serializes_lowercase() {
        let json = serde_json::to_string(&NoteType::Mine).unwrap();
        assert_eq!(json, "\"mine\"");
    }

    #[test]
    fn missing_end_time_means_no_tail() {
        let note: ChartNote = serde_json::from_str(r#"{"column":0,"time":1.0}"#).unwrap();
        assert_eq!(note, ChartNote::tap(0, 1.0));

        let raw = r#"{"column":2,"time":1.0,"end_time":2.5,"type":"hold"}"#;
        let note: ChartNote = serde_json::from_str(raw).unwrap();
        assert_eq!(note, ChartNote::hold(2, 1.0, 2.5));

        let written = serde_json::to_string(&ChartNote::tap(3, 0.5)).unwrap();
        let read: ChartNote = serde_json::from_str(&written).unwrap();
        assert_eq!(read, ChartNote::tap(3, 0.5));
    }
}
