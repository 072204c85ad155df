use super::classify::{mean, quarter_averages};
use super::types::{PredictionTrend, RiskLevel};
use crate::model::Grade;

/// Quarters with data a student needs before any projection is made.
pub const MIN_QUARTERS_FOR_PREDICTION: usize = 2;

const CURRENT_AVERAGE_WEIGHT: f64 = 0.6;
const CONFIDENCE_PER_QUARTER: f64 = 25.0;
const TREND_SLOPE_THRESHOLD: f64 = 0.15;

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub current_average: f64,
    pub data_points: usize,
    pub quarters_observed: usize,
    pub trend: PredictionTrend,
    /// `None` when fewer than `MIN_QUARTERS_FOR_PREDICTION` quarters have data.
    pub outcome: Option<ProjectedOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedOutcome {
    pub predicted: f64,
    pub confidence: f64,
    pub risk: f64,
    pub level: RiskLevel,
}

/// Projects a student's year-end average from the quarters observed up to `through_quarter`.
///
/// The prediction blends the current average with the last quarter carried one step along the
/// least-squares slope, so a rising student is projected above their average and a falling one
/// below it.
pub fn project(grades: &[&Grade], through_quarter: Option<usize>) -> Projection {
    let Some(through) = through_quarter else {
        return insufficient(0, 0.0);
    };
    let window = grades
        .iter()
        .copied()
        .filter(|g| {
            crate::model::quarter_index(&g.quarter)
                .map(|i| i <= through)
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();
    let current_average = mean(window.iter().map(|g| g.grade));
    let averages = quarter_averages(&window, through);

    if averages.len() < MIN_QUARTERS_FOR_PREDICTION {
        let mut p = insufficient(window.len(), current_average);
        p.quarters_observed = averages.len();
        return p;
    }

    let slope = slope(&averages);
    let last = averages[averages.len() - 1];
    let predicted = (CURRENT_AVERAGE_WEIGHT * current_average
        + (1.0 - CURRENT_AVERAGE_WEIGHT) * (last + slope))
        .clamp(0.0, 10.0);
    let confidence = (averages.len() as f64 * CONFIDENCE_PER_QUARTER).min(100.0);
    let risk = risk_from_predicted(predicted);

    Projection {
        current_average,
        data_points: window.len(),
        quarters_observed: averages.len(),
        trend: trend_from_slope(slope),
        outcome: Some(ProjectedOutcome {
            predicted,
            confidence,
            risk,
            level: risk_level(risk),
        }),
    }
}

fn insufficient(data_points: usize, current_average: f64) -> Projection {
    Projection {
        current_average,
        data_points,
        quarters_observed: 0,
        trend: PredictionTrend::Insuficiente,
        outcome: None,
    }
}

/// Piecewise-linear complement of the predicted average, clamped to [0, 100]:
/// below 6 maps to [70, 100], [6, 7) to (40, 69], 7 and above to [0, 39].
pub fn risk_from_predicted(predicted: f64) -> f64 {
    let p = predicted.clamp(0.0, 10.0);
    let risk = if p < 6.0 {
        70.0 + (6.0 - p) * 5.0
    } else if p < 7.0 {
        69.0 - (p - 6.0) * 29.0
    } else {
        39.0 * (10.0 - p) / 3.0
    };
    risk.clamp(0.0, 100.0)
}

pub fn risk_level(risk: f64) -> RiskLevel {
    if risk >= 70.0 {
        RiskLevel::Alto
    } else if risk >= 40.0 {
        RiskLevel::Medio
    } else {
        RiskLevel::Baixo
    }
}

fn trend_from_slope(slope: f64) -> PredictionTrend {
    if slope > TREND_SLOPE_THRESHOLD {
        PredictionTrend::Melhoria
    } else if slope < -TREND_SLOPE_THRESHOLD {
        PredictionTrend::Declinio
    } else {
        PredictionTrend::Estavel
    }
}

/// Least-squares slope of `ys` against x = 1..=n.
fn slope(ys: &[f64]) -> f64 {
    let n = ys.len() as f64;
    if ys.len() < 2 {
        return 0.0;
    }
    let mean_x = (n + 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n;
    let (num, den) = ys
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = (i + 1) as f64 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
