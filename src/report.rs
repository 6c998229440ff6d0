use std::fmt::Write;

use chrono::NaiveDate;

use crate::aggregate::{self, sorted_by_training_date};
use crate::models::{DateRange, EvaluatorFilter, ExpertiseScores, SessionRecord, SummaryStats};

pub const NOT_AVAILABLE: &str = "not available";
pub const NO_COMMENTS: &str = "No comments.";
const UNDATED: &str = "undated";

pub const EXPERTISE_LABELS: [&str; 5] = [
    "Presentation",
    "Probing",
    "Argumentation",
    "Rebuttal",
    "Closing",
];

/// One advisor's filtered view of the session table.
#[derive(Debug, Clone)]
pub struct ReportSection {
    pub advisor: String,
    pub sessions: Vec<SessionRecord>,
}

pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{value:.2}"),
        None => NOT_AVAILABLE.to_string(),
    }
}

fn format_date(date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => date.to_string(),
        None => NOT_AVAILABLE.to_string(),
    }
}

fn expertise_cells(scores: &ExpertiseScores) -> [String; 5] {
    scores.values().map(format_value)
}

fn comment_text(session: &SessionRecord) -> &str {
    session.comments.as_deref().unwrap_or(NO_COMMENTS)
}

// Table cells must stay on one line and not split columns.
fn table_cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\r', '\n'], " ")
}

pub fn render_summary(stats: &SummaryStats) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "- Total sessions: {}", stats.session_count);
    let _ = writeln!(
        output,
        "- Total duration (min): {:.2}",
        stats.total_duration_minutes
    );
    let _ = writeln!(
        output,
        "- Mean duration (min): {}",
        format_value(stats.mean_duration_minutes)
    );
    let _ = writeln!(
        output,
        "- Mean average score: {}",
        format_value(stats.mean_average_score)
    );
    output
}

pub fn render_session_details(sessions: &[SessionRecord]) -> String {
    let mut output = String::new();

    for session in sessions {
        let _ = writeln!(output, "Session {}", session.id);
        let _ = writeln!(
            output,
            "  Evaluator: {}",
            session.evaluator.as_deref().unwrap_or(NOT_AVAILABLE)
        );
        let _ = writeln!(output, "  Training date: {}", format_date(session.training_date));
        let _ = writeln!(
            output,
            "  Duration (min): {}",
            format_value(session.duration_minutes)
        );
        for (label, value) in EXPERTISE_LABELS.iter().zip(expertise_cells(&session.expertise)) {
            let _ = writeln!(output, "  {label}: {value}");
        }
        let _ = writeln!(
            output,
            "  Average expertise score: {}",
            format_value(session.average_score)
        );
        let _ = writeln!(output, "  Comments: {}", comment_text(session));
        let _ = writeln!(output);
    }

    output
}

pub fn build_report(
    evaluator: &EvaluatorFilter,
    date_range: Option<&DateRange>,
    sections: &[ReportSection],
) -> String {
    let mut output = String::new();
    let evaluator_label = match evaluator {
        EvaluatorFilter::All => "all evaluators",
        EvaluatorFilter::Named(name) => name.as_str(),
    };
    let range_label = match date_range {
        Some(range) => format!("{} to {}", range.start, range.end),
        None => "all dates".to_string(),
    };

    let _ = writeln!(output, "# Training Session Report");
    let _ = writeln!(
        output,
        "Generated for {} ({})",
        evaluator_label, range_label
    );

    if sections.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "No advisors selected.");
    }

    for section in sections {
        let _ = writeln!(output);
        write_section(&mut output, section);
    }

    output
}

fn write_section(output: &mut String, section: &ReportSection) {
    let _ = writeln!(output, "## {}", section.advisor);

    let stats = match aggregate::summarize(&section.sessions) {
        Ok(stats) => stats,
        Err(empty) => {
            let _ = writeln!(output, "No sessions recorded for this selection ({empty}).");
            return;
        }
    };

    let _ = writeln!(output);
    let _ = writeln!(output, "### Summary");
    let _ = write!(output, "{}", render_summary(&stats));

    let _ = writeln!(output);
    let _ = writeln!(output, "### Sessions");
    let _ = writeln!(
        output,
        "| ID | Evaluator | Training date | Duration (min) | {} | Average score | Comments |",
        EXPERTISE_LABELS.join(" | ")
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|---|---|");
    for session in &section.sessions {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} | {} | {} |",
            table_cell(&session.id),
            table_cell(session.evaluator.as_deref().unwrap_or(NOT_AVAILABLE)),
            format_date(session.training_date),
            format_value(session.duration_minutes),
            expertise_cells(&session.expertise).join(" | "),
            format_value(session.average_score),
            table_cell(comment_text(session)),
        );
    }

    let chronological = sorted_by_training_date(&section.sessions);

    let _ = writeln!(output);
    let _ = writeln!(output, "### Duration Over Time");
    for session in &chronological {
        let _ = writeln!(
            output,
            "- {}: {}",
            series_label(session.training_date),
            format_value(session.duration_minutes)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Average Score per Session");
    for session in &chronological {
        let _ = writeln!(
            output,
            "- {}: {}",
            series_label(session.training_date),
            format_value(session.average_score)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Session Comments");
    for session in &section.sessions {
        let _ = writeln!(
            output,
            "- **Session {} ({}):** {}",
            session.id,
            format_date(session.training_date),
            comment_text(session)
        );
    }
}

fn series_label(date: Option<NaiveDate>) -> String {
    match date {
        Some(date) => date.to_string(),
        None => UNDATED.to_string(),
    }
}
