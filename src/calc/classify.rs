use super::types::{Classification, SubjectAverage, Trend};
use crate::model::{Grade, QUARTERS};
use std::collections::BTreeMap;

pub const PASSING_GRADE: f64 = 6.0;
pub const EXCELLENCE_GRADE: f64 = 8.0;
pub const CRITICAL_SUBJECT_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct GradeProfile {
    pub classification: Classification,
    pub average: f64,
    pub subject_averages: BTreeMap<String, f64>,
    /// Lowest average first.
    pub below_passing: Vec<SubjectAverage>,
}

/// ≥3 failing subjects => critico; 1-2 => atencao; none and average ≥ 8 => excelencia;
/// otherwise aprovado.
pub fn classify(failing_subjects: usize, average: f64) -> Classification {
    if failing_subjects >= CRITICAL_SUBJECT_COUNT {
        Classification::Critico
    } else if failing_subjects >= 1 {
        Classification::Atencao
    } else if average >= EXCELLENCE_GRADE {
        Classification::Excelencia
    } else {
        Classification::Aprovado
    }
}

/// `None` when the student has no grades: such students stay out of the buckets.
pub fn profile(grades: &[&Grade]) -> Option<GradeProfile> {
    if grades.is_empty() {
        return None;
    }
    let mut by_subject: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for g in grades {
        let entry = by_subject.entry(g.subject.clone()).or_insert((0.0, 0));
        entry.0 += g.grade;
        entry.1 += 1;
    }
    let subject_averages = by_subject
        .into_iter()
        .map(|(subject, (sum, n))| (subject, sum / n as f64))
        .collect::<BTreeMap<_, _>>();

    let mut below_passing = subject_averages
        .iter()
        .filter(|(_, avg)| **avg < PASSING_GRADE)
        .map(|(subject, avg)| SubjectAverage {
            subject: subject.clone(),
            average: *avg,
        })
        .collect::<Vec<_>>();
    below_passing.sort_by(|a, b| {
        a.average
            .partial_cmp(&b.average)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let average = mean(grades.iter().map(|g| g.grade));
    Some(GradeProfile {
        classification: classify(below_passing.len(), average),
        average,
        subject_averages,
        below_passing,
    })
}

pub fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Averages of the quarters that have data, in calendar order, up to `through` inclusive.
pub fn quarter_averages(grades: &[&Grade], through: usize) -> Vec<f64> {
    QUARTERS
        .iter()
        .take(through + 1)
        .filter_map(|q| {
            let values = grades
                .iter()
                .filter(|g| g.quarter == *q)
                .map(|g| g.grade)
                .collect::<Vec<_>>();
            if values.is_empty() {
                None
            } else {
                Some(mean(values.into_iter()))
            }
        })
        .collect()
}

/// Direction of the last step between quarter averages.
pub fn last_step_trend(averages: &[f64], threshold: f64) -> Trend {
    match averages {
        [.., prev, last] => {
            let diff = last - prev;
            if diff > threshold {
                Trend::Up
            } else if diff < -threshold {
                Trend::Down
            } else {
                Trend::Stable
            }
        }
        _ => Trend::Stable,
    }
}
