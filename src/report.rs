//! Aggregation report rendering

use crate::aggregate::AggregateResult;
use std::fmt::Write;

/// Output format of the aggregation report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// One `<key>: <total> <late> <percent>%` line per group
    #[default]
    Text,
    /// Pretty-printed JSON object keyed by group
    Json,
}

/// Render a result in the requested format
pub fn render(result: &AggregateResult, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Text => Ok(render_text(result)),
        OutputFormat::Json => render_json(result),
    }
}

pub fn render_text(result: &AggregateResult) -> String {
    let mut out = String::new();
    for (key, stats) in result.iter() {
        // Writing to a String cannot fail
        let _ = writeln!(
            out,
            "{}: {:>6} {:>6} {:>3}%",
            key, stats.total, stats.late, stats.percent
        );
    }
    out
}

pub fn render_json(result: &AggregateResult) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::GroupStats;

    fn result() -> AggregateResult {
        [
            (
                "UA".to_string(),
                GroupStats {
                    total: 1200,
                    late: 300,
                    percent: 25,
                },
            ),
            (
                "AA".to_string(),
                GroupStats {
                    total: 2,
                    late: 1,
                    percent: 50,
                },
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_render_text_sorted_and_aligned() {
        assert_eq!(
            render_text(&result()),
            "AA:      2      1  50%\nUA:   1200    300  25%\n"
        );
    }

    #[test]
    fn test_render_json() {
        let json = render(&result(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["AA"]["total"], 2);
        assert_eq!(value["AA"]["late"], 1);
        assert_eq!(value["UA"]["percent"], 25);
    }

    #[test]
    fn test_render_empty() {
        let empty = AggregateResult::default();
        assert_eq!(render(&empty, OutputFormat::Text).unwrap(), "");
        assert_eq!(render(&empty, OutputFormat::Json).unwrap(), "{}");
    }
}
