use crate::game::chart::{ChartData, ChartError, ChartLoader, has_extension};
use std::path::Path;

/// Loads a [`ChartData`] stored directly as JSON.
pub struct JsonChartLoader;

impl ChartLoader for JsonChartLoader {
    fn name(&self) -> &'static str {
        "json"
    }

    fn can_load(&self, path: &Path) -> bool {
        has_extension(path, "json")
    }

    fn load(&self, text: &str) -> Result<ChartData, ChartError> {
        let mut chart: ChartData = serde_json::from_str(text)?;
        chart.sort_notes();
        chart.sort_timing_points();
        Ok(chart)
    }
}

#[cfg(test)]
mod tests {
    use super::JsonChartLoader;
    use crate::game::chart::{ChartError, ChartLoader, NoteType};

    #[test]
    fn loads_and_sorts_with_defaults() {
        let text = r#"{
            "metadata": { "title": "Test", "key_count": 7 },
            "notes": [
                { "column": 1, "time": 2.0 },
                { "column": 0, "time": 1.0, "end_time": 1.5, "type": "hold" }
            ],
            "timing_points": [ { "time": 0.0, "bpm": 150.0 } ]
        }"#;
        let chart = JsonChartLoader.load(text).expect("valid chart");
        assert_eq!(chart.metadata.title, "Test");
        assert_eq!(chart.metadata.key_count, 7);
        assert_eq!(chart.notes[0].note_type, NoteType::Hold);
        assert_eq!(chart.notes[1].note_type, NoteType::Tap);
        assert_eq!(chart.notes[1].end_time, 2.0, "tail defaults to the head");
        assert_eq!(chart.timing_points[0].numerator, 4);
        assert_eq!(chart.timing_points[0].denominator, 4);
    }

    #[test]
    fn missing_metadata_keeps_four_keys() {
        let chart = JsonChartLoader.load("{}").expect("empty object is a chart");
        assert_eq!(chart.metadata.key_count, 4);
        assert!(chart.notes.is_empty());
    }

    #[test]
    fn garbage_is_a_json_error() {
        assert!(matches!(JsonChartLoader.load("{ nope"), Err(ChartError::Json(_))));
    }
}
