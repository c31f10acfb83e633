use crate::game::chart::{ChartData, ChartError, ChartLoader, ChartNote, has_extension};
use crate::game::parsing::split_key_value;
use crate::game::timing::TimingPoint;
use log::debug;
use std::path::Path;
use std::str::FromStr;

// osu! places mania columns across a 512-unit wide playfield.
const PLAYFIELD_WIDTH: f32 = 512.0;
const HOLD_TYPE_BIT: i32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    General,
    Metadata,
    Difficulty,
    Events,
    TimingPoints,
    HitObjects,
    Other,
}

impl Section {
    fn from_header(name: &str) -> Self {
        match name {
            "General" => Self::General,
            "Metadata" => Self::Metadata,
            "Difficulty" => Self::Difficulty,
            "Events" => Self::Events,
            "TimingPoints" => Self::TimingPoints,
            "HitObjects" => Self::HitObjects,
            _ => Self::Other,
        }
    }
}

/// Loader for osu!mania `.osu` beatmaps.
pub struct OsuManiaLoader;

impl ChartLoader for OsuManiaLoader {
    fn name(&self) -> &'static str {
        "osu!mania"
    }

    fn can_load(&self, path: &Path) -> bool {
        has_extension(path, "osu")
    }

    fn load(&self, text: &str) -> Result<ChartData, ChartError> {
        let mut chart = ChartData::default();
        let mut section = Section::Other;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            let line_no = idx + 1;
            if line.is_empty() || line.starts_with('/') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = Section::from_header(name);
                continue;
            }
            match section {
                Section::General => parse_general(line, line_no, &mut chart)?,
                Section::Metadata => parse_metadata(line, &mut chart),
                Section::Difficulty => parse_difficulty(line, line_no, &mut chart)?,
                Section::Events => parse_event(line, &mut chart),
                Section::TimingPoints => parse_timing_point(line, line_no, &mut chart)?,
                Section::HitObjects => parse_hit_object(line, line_no, &mut chart)?,
                Section::Other => {}
            }
        }

        chart.sort_notes();
        chart.sort_timing_points();
        debug!(
            "osu!mania chart parsed: {} keys, {} notes, {} timing points",
            chart.metadata.key_count,
            chart.notes.len(),
            chart.timing_points.len()
        );
        Ok(chart)
    }
}

fn parse_field<T: FromStr>(
    value: &str,
    line: usize,
    field: &'static str,
) -> Result<T, ChartError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ChartError::MalformedField {
            line,
            field,
            value: value.to_string(),
        })
}

#[inline(always)]
fn parse_ms(value: &str, line: usize, field: &'static str) -> Result<f32, ChartError> {
    parse_field(value, line, field).map(ms_to_secs)
}

#[inline(always)]
fn ms_to_secs(ms: f32) -> f32 {
    ms / 1000.0
}

fn parse_general(line: &str, line_no: usize, chart: &mut ChartData) -> Result<(), ChartError> {
    let Some((key, value)) = split_key_value(line) else {
        return Ok(());
    };
    match key {
        "AudioFilename" => chart.metadata.audio_file = value.to_string(),
        "PreviewTime" => chart.metadata.preview_time = parse_ms(value, line_no, "PreviewTime")?,
        "AudioLeadIn" => chart.metadata.offset = parse_ms(value, line_no, "AudioLeadIn")?,
        _ => {}
    }
    Ok(())
}

fn parse_metadata(line: &str, chart: &mut ChartData) {
    let Some((key, value)) = split_key_value(line) else {
        return;
    };
    let target = match key {
        "Title" => &mut chart.metadata.title,
        "Artist" => &mut chart.metadata.artist,
        "Creator" => &mut chart.metadata.charter,
        "Version" => &mut chart.metadata.difficulty,
        _ => return,
    };
    *target = value.to_string();
}

fn parse_difficulty(line: &str, line_no: usize, chart: &mut ChartData) -> Result<(), ChartError> {
    if let Some(("CircleSize", value)) = split_key_value(line) {
        let keys: f32 = parse_field(value, line_no, "CircleSize")?;
        if !(keys.is_finite() && keys >= 1.0) {
            return Err(ChartError::MalformedField {
                line: line_no,
                field: "CircleSize",
                value: value.to_string(),
            });
        }
        chart.metadata.key_count = keys as usize;
    }
    Ok(())
}

fn parse_event(line: &str, chart: &mut ChartData) {
    if !line.starts_with("0,") || !chart.metadata.background_file.is_empty() {
        return;
    }
    let mut quoted = line.split('"');
    if let (Some(_), Some(file), Some(_)) = (quoted.next(), quoted.next(), quoted.next()) {
        chart.metadata.background_file = file.to_string();
    }
}

fn parse_timing_point(line: &str, line_no: usize, chart: &mut ChartData) -> Result<(), ChartError> {
    let tokens: Vec<&str> = line.split(',').map(str::trim).collect();
    if tokens.len() < 2 {
        return Ok(());
    }
    let time = parse_ms(tokens[0], line_no, "timing point time")?;
    let beat_length: f64 = parse_field(tokens[1], line_no, "beat length")?;
    let meter: i32 = match tokens.get(2) {
        Some(m) => parse_field(m, line_no, "meter")?,
        None => 4,
    };
    let uninherited = match tokens.get(6) {
        Some(u) => parse_field::<i32>(u, line_no, "uninherited flag")? == 1,
        None => true,
    };

    // Inherited points only carry scroll velocity.
    if uninherited && beat_length > 0.0 {
        let bpm = 60000.0 / beat_length;
        chart
            .timing_points
            .push(TimingPoint::new(time, bpm, meter, 4));
    }
    Ok(())
}

#[inline(always)]
fn column_for_x(x: f32, key_count: usize) -> usize {
    let column_width = PLAYFIELD_WIDTH / key_count as f32;
    let column = (x / column_width).floor().max(0.0) as usize;
    column.min(key_count.saturating_sub(1))
}

fn parse_hit_object(line: &str, line_no: usize, chart: &mut ChartData) -> Result<(), ChartError> {
    let tokens: Vec<&str> = line.split(',').map(str::trim).collect();
    if tokens.len() < 4 {
        return Ok(());
    }
    let x: f32 = parse_field(tokens[0], line_no, "x position")?;
    let time = parse_ms(tokens[2], line_no, "hit object time")?;
    let kind: i32 = parse_field(tokens[3], line_no, "hit object type")?;
    let column = column_for_x(x, chart.metadata.key_count);

    if kind & HOLD_TYPE_BIT != 0 {
        // Hold end lives in the first `extras` field: `endTime:hitSample`.
        if let Some((end, _)) = tokens.get(5).and_then(|extras| extras.split_once(':')) {
            let end_time = parse_ms(end, line_no, "hold end time")?;
            chart.notes.push(ChartNote::hold(column, time, end_time));
        }
    } else {
        chart.notes.push(ChartNote::tap(column, time));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{OsuManiaLoader, column_for_x};
    use crate::game::chart::{ChartError, ChartLoader, NoteType};
    use test_case::test_case;

    const BEATMAP: &str = "osu file format v14

[General]
AudioFilename: audio.mp3
AudioLeadIn: 500
PreviewTime: 12000

[Metadata]
Title:Test Song
Artist:Someone
Creator:Mapper
Version:Hard

[Difficulty]
CircleSize:4

[Events]
//Background and Video events
0,0,\"bg.jpg\",0,0
0,0,\"other.jpg\",0,0

[TimingPoints]
2000,500,3,2,0,60,1,0
0,600,4,2,0,60,1,0
1000,-50,4,2,0,60,0,0

[HitObjects]
448,192,1500,1,0,0:0:0:0:
64,192,1000,128,0,1800:0:0:0:0:
192,192,1200,1,0,0:0:0:0:
";

    #[test]
    fn parses_full_beatmap() {
        let chart = OsuManiaLoader.load(BEATMAP).expect("valid beatmap");
        let meta = &chart.metadata;
        assert_eq!(meta.audio_file, "audio.mp3");
        assert!((meta.offset - 0.5).abs() < 1e-6);
        assert!((meta.preview_time - 12.0).abs() < 1e-6);
        assert_eq!(meta.title, "Test Song");
        assert_eq!(meta.charter, "Mapper");
        assert_eq!(meta.difficulty, "Hard");
        assert_eq!(meta.key_count, 4);
        assert_eq!(meta.background_file, "bg.jpg", "first background wins");

        assert_eq!(chart.timing_points.len(), 2, "inherited point is dropped");
        assert_eq!(chart.timing_points[0].time, 0.0);
        assert!((chart.timing_points[0].bpm - 100.0).abs() < 1e-9);
        assert!((chart.timing_points[1].bpm - 120.0).abs() < 1e-9);
        assert_eq!(chart.timing_points[1].numerator, 3);
        assert_eq!(chart.timing_points[1].denominator, 4);

        let columns: Vec<usize> = chart.notes.iter().map(|n| n.column).collect();
        assert_eq!(columns, vec![0, 1, 3], "notes sorted by time");
        assert_eq!(chart.notes[0].note_type, NoteType::Hold);
        assert!((chart.notes[0].end_time - 1.8).abs() < 1e-6);
        assert_eq!(chart.notes[1].end_time, chart.notes[1].time);
    }

    #[test_case(0.0, 4, 0; "left edge")]
    #[test_case(127.9, 4, 0; "inside first column")]
    #[test_case(128.0, 4, 1; "column boundary")]
    #[test_case(511.0, 7, 6; "last column of seven")]
    #[test_case(900.0, 4, 3; "clamped past the right edge")]
    #[test_case(-20.0, 4, 0; "clamped past the left edge")]
    fn column_mapping(x: f32, keys: usize, expected: usize) {
        assert_eq!(column_for_x(x, keys), expected);
    }

    #[test]
    fn hold_without_end_is_skipped() {
        let chart = OsuManiaLoader.load("[HitObjects]\n64,192,1000,128,0\n").unwrap();
        assert!(chart.notes.is_empty());
    }

    #[test]
    fn malformed_number_reports_line() {
        let err = OsuManiaLoader.load("[HitObjects]\n\n64,192,soon,1,0\n").unwrap_err();
        match err {
            ChartError::MalformedField { line, field, .. } => {
                assert_eq!(line, 3);
                assert_eq!(field, "hit object time");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
