use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpertiseScores {
    pub presentation: Option<f64>,
    pub probing: Option<f64>,
    pub argumentation: Option<f64>,
    pub rebuttal: Option<f64>,
    pub closing: Option<f64>,
}

impl ExpertiseScores {
    pub fn values(&self) -> [Option<f64>; 5] {
        [
            self.presentation,
            self.probing,
            self.argumentation,
            self.rebuttal,
            self.closing,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub id: String,
    pub evaluated_advisor: Option<String>,
    pub evaluator: Option<String>,
    pub training_date: Option<NaiveDate>,
    pub session_start: Option<NaiveDateTime>,
    pub duration_minutes: Option<f64>,
    pub expertise: ExpertiseScores,
    pub comments: Option<String>,
    /// Mean of the present expertise scores, filled in at load.
    pub average_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub session_count: usize,
    pub total_duration_minutes: f64,
    pub mean_duration_minutes: Option<f64>,
    pub mean_average_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SessionField {
    Advisor,
    Evaluator,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EvaluatorFilter {
    #[default]
    All,
    Named(String),
}

impl EvaluatorFilter {
    /// Maps a selection control value to a filter. Exactly `all` or `Todos` selects every evaluator.
    pub fn from_selection(value: &str) -> Self {
        if value == "all" || value == "Todos" {
            EvaluatorFilter::All
        } else {
            EvaluatorFilter::Named(value.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exact_sentinels_select_every_evaluator() {
        assert_eq!(EvaluatorFilter::from_selection("all"), EvaluatorFilter::All);
        assert_eq!(EvaluatorFilter::from_selection("Todos"), EvaluatorFilter::All);
        assert_eq!(
            EvaluatorFilter::from_selection("All"),
            EvaluatorFilter::Named("All".to_string())
        );
        assert_eq!(
            EvaluatorFilter::from_selection("ALL"),
            EvaluatorFilter::Named("ALL".to_string())
        );
        assert_eq!(
            EvaluatorFilter::from_selection("todos"),
            EvaluatorFilter::Named("todos".to_string())
        );
    }
}
