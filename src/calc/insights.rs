use super::phrasebook;
use crate::model::Severity;
use super::types::{
    BehavioralAnalytics, CategorizedInsights, ClassAnalytics, Insight, InsightCategory,
    InsightType, PredictionSummary, SchoolOverview, SubjectAnalytics,
};

const CLASS_CRITICAL_SHARE: f64 = 0.3;
const WORST_SUBJECT_BELOW_PERCENT: f64 = 30.0;
const LOW_FREQUENCY: f64 = 80.0;
const BEST_CLASS_AVERAGE: f64 = 7.0;
const NOTABLE_GROWTH: f64 = 0.5;
const HIGH_INCIDENTS_PER_STUDENT: f64 = 0.5;
const SPIKE_MIN_SEVERE: usize = 2;
const PENDING_INCIDENTS: usize = 5;
const CLASS_MOST_INCIDENTS: usize = 5;
const IMPROVEMENT_RATIO: f64 = 0.7;

/// Something worth telling the user, with the numbers that back it.
#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    CriticalStudents { count: usize, percent: f64 },
    ClassCritical { class_id: String, class_name: String, percent: f64 },
    HighRiskPredictions { count: usize },
    InsufficientPredictionData { count: usize },
    WorstSubject { subject: String, below_percent: f64, average: f64 },
    ExcellenceStudents { count: usize, percent: f64 },
    LowFrequency { frequency: f64 },
    BestClass { class_name: String, average: f64, excellence: usize },
    BestGrowth { class_name: String, growth: f64 },
    WorstGrowth { class_name: String, growth: f64 },
    HighIncidents { per_student: f64 },
    SevereIncidents { grave: usize, gravissima: usize },
    SeveritySpike { month: String, current: usize, previous: usize },
    PendingIncidents { count: usize },
    ClassMostIncidents { class_name: String, count: usize, per_student: f64 },
    BehaviorImprovement { reduction_percent: f64 },
}

impl Finding {
    pub fn id(&self) -> &'static str {
        match self {
            Finding::CriticalStudents { .. } => "critical-students",
            Finding::ClassCritical { .. } => "class-critical",
            Finding::HighRiskPredictions { .. } => "high-risk-predictions",
            Finding::InsufficientPredictionData { .. } => "insufficient-prediction-data",
            Finding::WorstSubject { .. } => "worst-subject",
            Finding::ExcellenceStudents { .. } => "excellence-students",
            Finding::LowFrequency { .. } => "low-frequency",
            Finding::BestClass { .. } => "best-class",
            Finding::BestGrowth { .. } => "best-growth",
            Finding::WorstGrowth { .. } => "worst-growth",
            Finding::HighIncidents { .. } => "high-incidents",
            Finding::SevereIncidents { .. } => "severe-incidents",
            Finding::SeveritySpike { .. } => "severity-spike",
            Finding::PendingIncidents { .. } => "pending-incidents",
            Finding::ClassMostIncidents { .. } => "class-most-incidents",
            Finding::BehaviorImprovement { .. } => "behavior-improvement",
        }
    }

    pub fn kind(&self) -> InsightType {
        match self {
            Finding::CriticalStudents { .. }
            | Finding::LowFrequency { .. }
            | Finding::SevereIncidents { .. }
            | Finding::SeveritySpike { .. } => InsightType::Alert,
            Finding::ClassCritical { .. }
            | Finding::HighRiskPredictions { .. }
            | Finding::WorstSubject { .. }
            | Finding::WorstGrowth { .. }
            | Finding::HighIncidents { .. }
            | Finding::PendingIncidents { .. }
            | Finding::ClassMostIncidents { .. } => InsightType::Warning,
            Finding::InsufficientPredictionData { .. } => InsightType::Info,
            Finding::ExcellenceStudents { .. }
            | Finding::BestClass { .. }
            | Finding::BestGrowth { .. }
            | Finding::BehaviorImprovement { .. } => InsightType::Success,
        }
    }

    pub fn category(&self) -> InsightCategory {
        match self {
            Finding::CriticalStudents { .. }
            | Finding::ClassCritical { .. }
            | Finding::HighRiskPredictions { .. }
            | Finding::InsufficientPredictionData { .. } => InsightCategory::Risk,
            Finding::WorstSubject { .. }
            | Finding::ExcellenceStudents { .. }
            | Finding::LowFrequency { .. }
            | Finding::BestClass { .. }
            | Finding::BestGrowth { .. }
            | Finding::WorstGrowth { .. } => InsightCategory::Academic,
            Finding::HighIncidents { .. }
            | Finding::SevereIncidents { .. }
            | Finding::SeveritySpike { .. }
            | Finding::PendingIncidents { .. }
            | Finding::ClassMostIncidents { .. }
            | Finding::BehaviorImprovement { .. } => InsightCategory::Behavioral,
        }
    }

    pub fn into_insight(self) -> Insight {
        let phrase = phrasebook::describe(&self);
        Insight {
            id: self.id().to_string(),
            kind: self.kind(),
            category: self.category(),
            title: phrase.title,
            description: phrase.description,
            action_label: phrase.action_label,
        }
    }
}

/// What the rule battery looks at. `class_ranking` must be in the default (average) order.
pub struct InsightInputs<'r> {
    pub overview: &'r SchoolOverview,
    pub class_ranking: &'r [ClassAnalytics],
    pub worst_subjects: &'r [SubjectAnalytics],
    pub prediction_summary: &'r PredictionSummary,
    pub behavior: &'r BehavioralAnalytics,
}

pub fn findings(inputs: &InsightInputs<'_>) -> Vec<Finding> {
    let mut out = Vec::new();
    risk_findings(inputs, &mut out);
    academic_findings(inputs, &mut out);
    behavioral_findings(inputs.behavior, &mut out);
    out
}

fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn risk_findings(inputs: &InsightInputs<'_>, out: &mut Vec<Finding>) {
    let overview = inputs.overview;
    let critico = overview.classifications.critico;
    if critico > 0 {
        out.push(Finding::CriticalStudents {
            count: critico,
            percent: share(critico, overview.total_students),
        });
    }

    let flagged = inputs.class_ranking.iter().find(|c| {
        c.student_count > 0
            && c.classifications.critico as f64 / c.student_count as f64 > CLASS_CRITICAL_SHARE
    });
    if let Some(c) = flagged {
        out.push(Finding::ClassCritical {
            class_id: c.class_id.clone(),
            class_name: c.class_name.clone(),
            percent: share(c.classifications.critico, c.student_count),
        });
    }

    let summary = inputs.prediction_summary;
    if summary.high_risk > 0 {
        out.push(Finding::HighRiskPredictions {
            count: summary.high_risk,
        });
    }
    if summary.insufficient > 0 {
        out.push(Finding::InsufficientPredictionData {
            count: summary.insufficient,
        });
    }
}

fn academic_findings(inputs: &InsightInputs<'_>, out: &mut Vec<Finding>) {
    let overview = inputs.overview;
    if let Some(worst) = inputs.worst_subjects.first() {
        if worst.students_below6_percent > WORST_SUBJECT_BELOW_PERCENT {
            out.push(Finding::WorstSubject {
                subject: worst.subject.clone(),
                below_percent: worst.students_below6_percent,
                average: worst.average,
            });
        }
    }

    let excelencia = overview.classifications.excelencia;
    if excelencia > 0 {
        out.push(Finding::ExcellenceStudents {
            count: excelencia,
            percent: share(excelencia, overview.total_students),
        });
    }

    if overview.overall_frequency < LOW_FREQUENCY {
        out.push(Finding::LowFrequency {
            frequency: overview.overall_frequency,
        });
    }

    if let Some(best) = inputs.class_ranking.first() {
        if best.average >= BEST_CLASS_AVERAGE {
            out.push(Finding::BestClass {
                class_name: best.class_name.clone(),
                average: best.average,
                excellence: best.classifications.excelencia,
            });
        }
    }

    let with_growth = inputs
        .class_ranking
        .iter()
        .filter_map(|c| c.growth.map(|g| (c, g)))
        .collect::<Vec<_>>();
    // First class wins ties in both directions.
    let best = with_growth
        .iter()
        .fold(None::<(&ClassAnalytics, f64)>, |acc, &(c, g)| match acc {
            Some((_, best)) if best >= g => acc,
            _ => Some((c, g)),
        });
    if let Some((c, g)) = best {
        if g >= NOTABLE_GROWTH {
            out.push(Finding::BestGrowth {
                class_name: c.class_name.clone(),
                growth: g,
            });
        }
    }
    let worst = with_growth
        .iter()
        .fold(None::<(&ClassAnalytics, f64)>, |acc, &(c, g)| match acc {
            Some((_, worst)) if worst <= g => acc,
            _ => Some((c, g)),
        });
    if let Some((c, g)) = worst {
        if g <= -NOTABLE_GROWTH {
            out.push(Finding::WorstGrowth {
                class_name: c.class_name.clone(),
                growth: g,
            });
        }
    }
}

fn behavioral_findings(behavior: &BehavioralAnalytics, out: &mut Vec<Finding>) {
    if behavior.average_incidents_per_student > HIGH_INCIDENTS_PER_STUDENT {
        out.push(Finding::HighIncidents {
            per_student: behavior.average_incidents_per_student,
        });
    }

    let count_of = |severity: Severity| {
        behavior
            .incidents_by_severity
            .iter()
            .find(|s| s.severity == severity)
            .map(|s| s.count)
            .unwrap_or(0)
    };
    let grave = count_of(Severity::Grave);
    let gravissima = count_of(Severity::Gravissima);
    if grave + gravissima > 0 {
        out.push(Finding::SevereIncidents { grave, gravissima });
    }

    if let [.., previous, current] = behavior.monthly_trend.as_slice() {
        if current.severe_count > previous.severe_count && current.severe_count >= SPIKE_MIN_SEVERE
        {
            out.push(Finding::SeveritySpike {
                month: current.month.clone(),
                current: current.severe_count,
                previous: previous.severe_count,
            });
        }
    }

    if behavior.open_incidents_count > PENDING_INCIDENTS {
        out.push(Finding::PendingIncidents {
            count: behavior.open_incidents_count,
        });
    }

    if let Some(top) = behavior.class_incident_ranking.first() {
        if top.incident_count >= CLASS_MOST_INCIDENTS {
            out.push(Finding::ClassMostIncidents {
                class_name: top.class_name.clone(),
                count: top.incident_count,
                per_student: top.incidents_per_student,
            });
        }
    }

    if let [.., previous, current] = behavior.monthly_trend.as_slice() {
        if previous.count > 0 && (current.count as f64) < previous.count as f64 * IMPROVEMENT_RATIO
        {
            out.push(Finding::BehaviorImprovement {
                reduction_percent: share(previous.count - current.count, previous.count),
            });
        }
    }
}

/// Renders findings, ordered by priority with generation order kept among equals, and splits
/// them by category.
pub fn render(findings: Vec<Finding>) -> (Vec<Insight>, CategorizedInsights) {
    let mut insights = findings
        .into_iter()
        .map(Finding::into_insight)
        .collect::<Vec<_>>();
    insights.sort_by_key(|i| i.kind.priority());

    let mut categorized = CategorizedInsights::default();
    for insight in &insights {
        let bucket = match insight.category {
            InsightCategory::Academic => &mut categorized.academic,
            InsightCategory::Behavioral => &mut categorized.behavioral,
            InsightCategory::Risk => &mut categorized.risk,
        };
        bucket.push(insight.clone());
    }
    (insights, categorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::types::{ClassificationBuckets, MonthlyIncidentTrend, Trend};

    fn class(name: &str, average: f64, growth: Option<f64>) -> ClassAnalytics {
        ClassAnalytics {
            class_id: name.to_lowercase(),
            class_name: name.into(),
            series: "1º".into(),
            archived: false,
            calendar_year: None,
            student_count: 10,
            average,
            frequency: 95.0,
            growth,
            classifications: ClassificationBuckets::default(),
            incident_count: 0,
            trend: Trend::Stable,
        }
    }

    fn month(count: usize, severe_count: usize) -> MonthlyIncidentTrend {
        MonthlyIncidentTrend {
            month: "Mar".into(),
            year: 2025,
            count,
            severe_count,
        }
    }

    #[test]
    fn one_of_each_type_renders_by_priority() {
        let findings = vec![
            Finding::BehaviorImprovement {
                reduction_percent: 50.0,
            },
            Finding::InsufficientPredictionData { count: 2 },
            Finding::PendingIncidents { count: 7 },
            Finding::LowFrequency { frequency: 70.0 },
        ];
        let (insights, _) = render(findings);
        let kinds = insights.iter().map(|i| i.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                InsightType::Alert,
                InsightType::Warning,
                InsightType::Info,
                InsightType::Success
            ]
        );
    }

    #[test]
    fn equal_priority_keeps_generation_order() {
        let findings = vec![
            Finding::HighIncidents { per_student: 1.0 },
            Finding::SevereIncidents {
                grave: 1,
                gravissima: 0,
            },
            Finding::PendingIncidents { count: 6 },
        ];
        let (_, categorized) = render(findings);
        let ids = categorized
            .behavioral
            .iter()
            .map(|i| i.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["severe-incidents", "high-incidents", "pending-incidents"]);
        assert!(categorized.academic.is_empty());
    }

    #[test]
    fn growth_extremes_and_best_class() {
        let ranking = vec![
            class("1A", 7.5, Some(0.8)),
            class("1B", 6.0, Some(-0.6)),
            class("1C", 5.0, None),
        ];
        let overview = SchoolOverview {
            overall_frequency: 90.0,
            ..SchoolOverview::default()
        };
        let summary = PredictionSummary::default();
        let behavior = BehavioralAnalytics::default();
        let inputs = InsightInputs {
            overview: &overview,
            class_ranking: &ranking,
            worst_subjects: &[],
            prediction_summary: &summary,
            behavior: &behavior,
        };
        let ids = findings(&inputs)
            .iter()
            .map(|f| f.id())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["best-class", "best-growth", "worst-growth"]);
    }

    #[test]
    fn monthly_rules_compare_last_two_months() {
        let behavior = BehavioralAnalytics {
            monthly_trend: vec![month(10, 1), month(3, 2)],
            ..BehavioralAnalytics::default()
        };
        let mut out = Vec::new();
        behavioral_findings(&behavior, &mut out);
        let ids = out.iter().map(|f| f.id()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["severity-spike", "behavior-improvement"]);
        assert_eq!(
            out[1],
            Finding::BehaviorImprovement {
                reduction_percent: 70.0
            }
        );
    }
}
