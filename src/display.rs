use owo_colors::{OwoColorize, Stream, Style};

use crate::experiment::{Measurement, Report, Scenario, ScenarioReport, Summary};
use crate::types::{Outcome, ProbeResult};

/// Format seconds the way every report line does: four decimals.
pub fn format_seconds(seconds: f64) -> String {
    format!("{:.4} seconds", seconds)
}

// Style constants
fn style_title() -> Style {
    Style::new().cyan().bold()
}

fn style_label() -> Style {
    Style::new().bold()
}

fn outcome_text(result: &ProbeResult) -> String {
    match result.outcome {
        Outcome::Succeeded => format_seconds(result.duration)
            .if_supports_color(Stream::Stdout, |s| s.green())
            .to_string(),
        Outcome::CompletedWithFailures => {
            format!("{} (completed with failures)", format_seconds(result.duration))
                .if_supports_color(Stream::Stdout, |s| s.yellow())
                .to_string()
        }
        Outcome::Failed => {
            let reason = result.error.as_deref().unwrap_or("no measurement");
            format!("FAILED - {}", reason)
                .if_supports_color(Stream::Stdout, |s| s.red())
                .to_string()
        }
    }
}

fn format_measurements(measurements: &[Measurement], title: &str, out: &mut String) {
    let labels: Vec<String> = measurements
        .iter()
        .map(|m| format!("{} {}", m.label, title))
        .collect();
    let width = labels.iter().map(|l| l.len()).max().unwrap_or(0);
    let label_style = style_label();

    for (label, m) in labels.iter().zip(measurements) {
        let padded = format!("{:<width$}", label, width = width);
        out.push_str(&format!(
            "  {}  {}\n",
            padded.if_supports_color(Stream::Stdout, |s| s.style(label_style)),
            outcome_text(&m.result)
        ));
    }
}

fn format_summary(summary: &Summary, out: &mut String) {
    if summary.successes == 0 {
        out.push_str("  No successful runs to analyze.\n");
        return;
    }

    out.push_str(&format!(
        "  Total time for {} successful runs ({} attempted, {} failed): {}\n",
        summary.successes,
        summary.attempts,
        summary.failures,
        format_seconds(summary.total_seconds)
    ));
    if summary.completed_with_failures > 0 {
        out.push_str(&format!(
            "  Completed with failures (excluded): {}\n",
            summary.completed_with_failures
        ));
    }
    let stat = |name: &str, value: Option<f64>| {
        value
            .map(|v| format!("  {:<9} {}\n", name, format_seconds(v)))
            .unwrap_or_default()
    };
    out.push_str(&stat("Slowest:", summary.max));
    out.push_str(&stat("Fastest:", summary.min));
    out.push_str(&stat("Average:", summary.mean));
}

fn measurement_title(scenario: Scenario) -> &'static str {
    match scenario {
        Scenario::ColdStart => "cold start:",
        Scenario::TotalTime => "total time:",
        Scenario::RepeatedCalls => "",
    }
}

/// Human-readable summary of one scenario.
pub fn format_scenario(report: &ScenarioReport) -> String {
    let mut out = String::new();

    let header = format!("=== {} ===", report.scenario.title());
    out.push_str(
        &header
            .if_supports_color(Stream::Stdout, |s| s.style(style_title()))
            .to_string(),
    );
    out.push('\n');

    match &report.summary {
        // Per-run lines were already printed as progress; only aggregate here.
        Some(summary) => format_summary(summary, &mut out),
        None => format_measurements(
            &report.measurements,
            measurement_title(report.scenario),
            &mut out,
        ),
    }

    out
}

/// Human-readable report: one block per scenario.
pub fn format_human(report: &Report) -> String {
    let mut out = String::new();
    for (i, scenario) in report.scenarios.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format_scenario(scenario));
    }
    out
}

/// JSON output format.
pub fn format_json(report: &Report) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}
