use std::collections::BTreeSet;

use crate::error::EmptyResult;
use crate::models::{
    DateRange, EvaluatorFilter, ExpertiseScores, SessionField, SessionRecord, SummaryStats,
};

pub fn compute_average_score(scores: &ExpertiseScores) -> Option<f64> {
    mean(scores.values().into_iter().flatten())
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (count, total) = values.fold((0usize, 0.0), |(count, total), value| {
        (count + 1, total + value)
    });
    if count == 0 {
        None
    } else {
        Some(total / count as f64)
    }
}

pub fn advisor_matches(record: &SessionRecord, advisor: &str) -> bool {
    record.evaluated_advisor.as_deref() == Some(advisor)
}

pub fn evaluator_matches(record: &SessionRecord, evaluator: &EvaluatorFilter) -> bool {
    match evaluator {
        EvaluatorFilter::All => true,
        EvaluatorFilter::Named(name) => record.evaluator.as_deref() == Some(name.as_str()),
    }
}

/// Undated sessions never fall inside a range.
pub fn date_matches(record: &SessionRecord, range: &DateRange) -> bool {
    record.training_date.is_some_and(|date| range.contains(date))
}

pub fn filter_by_advisor(records: &[SessionRecord], advisor: &str) -> Vec<SessionRecord> {
    records
        .iter()
        .filter(|record| advisor_matches(record, advisor))
        .cloned()
        .collect()
}

pub fn filter_by_evaluator(
    records: &[SessionRecord],
    evaluator: &EvaluatorFilter,
) -> Vec<SessionRecord> {
    records
        .iter()
        .filter(|record| evaluator_matches(record, evaluator))
        .cloned()
        .collect()
}

pub fn filter_by_date_range(records: &[SessionRecord], range: &DateRange) -> Vec<SessionRecord> {
    records
        .iter()
        .filter(|record| date_matches(record, range))
        .cloned()
        .collect()
}

/// Conjunction of the optional advisor, evaluator and date predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    pub advisor: Option<String>,
    pub evaluator: EvaluatorFilter,
    pub date_range: Option<DateRange>,
}

impl SessionFilter {
    pub fn matches(&self, record: &SessionRecord) -> bool {
        self.advisor
            .as_deref()
            .map_or(true, |advisor| advisor_matches(record, advisor))
            && evaluator_matches(record, &self.evaluator)
            && self
                .date_range
                .as_ref()
                .map_or(true, |range| date_matches(record, range))
    }

    pub fn apply(&self, records: &[SessionRecord]) -> Vec<SessionRecord> {
        records
            .iter()
            .filter(|record| self.matches(record))
            .cloned()
            .collect()
    }
}

pub fn summarize(records: &[SessionRecord]) -> Result<SummaryStats, EmptyResult> {
    if records.is_empty() {
        return Err(EmptyResult);
    }

    let total_duration_minutes: f64 = records
        .iter()
        .filter_map(|record| record.duration_minutes)
        .sum();

    Ok(SummaryStats {
        session_count: records.len(),
        total_duration_minutes,
        mean_duration_minutes: mean(records.iter().filter_map(|record| record.duration_minutes)),
        mean_average_score: mean(records.iter().filter_map(|record| record.average_score)),
    })
}

pub fn list_distinct_values(records: &[SessionRecord], field: SessionField) -> BTreeSet<String> {
    records
        .iter()
        .filter_map(|record| match field {
            SessionField::Advisor => record.evaluated_advisor.clone(),
            SessionField::Evaluator => record.evaluator.clone(),
        })
        .collect()
}

pub fn date_bounds(records: &[SessionRecord]) -> Option<DateRange> {
    let mut dates = records.iter().filter_map(|record| record.training_date);
    let first = dates.next()?;
    let (start, end) = dates.fold((first, first), |(start, end), date| {
        (start.min(date), end.max(date))
    });
    Some(DateRange::new(start, end))
}

/// Chronological order with undated sessions last; ties keep source order.
pub fn sorted_by_training_date(records: &[SessionRecord]) -> Vec<SessionRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by_key(|record| (record.training_date.is_none(), record.training_date));
    sorted
}
