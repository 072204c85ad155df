use super::types::{
    BehavioralAnalytics, ClassIncidentRanking, IncidentBySeverity, MonthlyIncidentTrend,
    SeverityCounts, StudentIncidentRanking,
};
use crate::model::{parse_date, Incident, SchoolClass, Severity, Student};
use chrono::{Datelike, Months, NaiveDate};
use std::collections::HashMap;

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Fev", "Mar", "Abr", "Mai", "Jun", "Jul", "Ago", "Set", "Out", "Nov", "Dez",
];
const TREND_MONTHS: u32 = 6;
const TOP_STUDENTS: usize = 10;

pub fn behavioral_analytics(
    classes: &[&SchoolClass],
    students: &[&Student],
    incidents: &[&Incident],
) -> BehavioralAnalytics {
    let total = incidents.len();
    let mut severities = SeverityCounts::default();
    for i in incidents {
        severities.add(i.final_severity);
    }
    let incidents_by_severity = Severity::ALL
        .iter()
        .map(|&severity| {
            let count = severities.get(severity);
            IncidentBySeverity {
                severity,
                count,
                percent: percent(count, total),
            }
        })
        .collect();

    let mut students_per_class: HashMap<&str, usize> = HashMap::new();
    for s in students {
        *students_per_class.entry(s.class_id.as_str()).or_default() += 1;
    }
    let mut class_incident_ranking = classes
        .iter()
        .map(|cls| {
            let of_class = incidents
                .iter()
                .filter(|i| i.class_id == cls.id)
                .collect::<Vec<_>>();
            let student_count = students_per_class
                .get(cls.id.as_str())
                .copied()
                .unwrap_or(0);
            ClassIncidentRanking {
                class_id: cls.id.clone(),
                class_name: cls.name.clone(),
                incident_count: of_class.len(),
                student_count,
                incidents_per_student: if student_count > 0 {
                    of_class.len() as f64 / student_count as f64
                } else {
                    0.0
                },
                open_incidents: of_class.iter().filter(|i| i.is_open()).count(),
            }
        })
        .collect::<Vec<_>>();
    // Stable: equal counts keep class order.
    class_incident_ranking.sort_by(|a, b| b.incident_count.cmp(&a.incident_count));

    let open_incidents_count = incidents.iter().filter(|i| i.is_open()).count();
    BehavioralAnalytics {
        incidents_by_severity,
        class_incident_ranking,
        top_students_by_incidents: top_students(classes, students, incidents),
        monthly_trend: monthly_trend(incidents),
        open_incidents_count,
        resolved_incidents_count: total - open_incidents_count,
        average_incidents_per_student: if students.is_empty() {
            0.0
        } else {
            total as f64 / students.len() as f64
        },
    }
}

fn top_students(
    classes: &[&SchoolClass],
    students: &[&Student],
    incidents: &[&Incident],
) -> Vec<StudentIncidentRanking> {
    #[derive(Default)]
    struct Tally<'a> {
        count: usize,
        last_date: Option<&'a str>,
        severities: SeverityCounts,
    }

    let mut tallies: HashMap<&str, Tally> = HashMap::new();
    for incident in incidents {
        for sid in &incident.student_ids {
            let t = tallies.entry(sid.as_str()).or_default();
            t.count += 1;
            t.severities.add(incident.final_severity);
            if t.last_date.map(|d| incident.date.as_str() > d).unwrap_or(true) {
                t.last_date = Some(incident.date.as_str());
            }
        }
    }

    let class_names: HashMap<&str, &str> = classes
        .iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect();
    let mut rows = students
        .iter()
        .filter_map(|s| {
            let t = tallies.get(s.id.as_str())?;
            Some(StudentIncidentRanking {
                student_id: s.id.clone(),
                student_name: s.name.clone(),
                class_name: class_names
                    .get(s.class_id.as_str())
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "Sem turma".to_string()),
                incident_count: t.count,
                last_incident_date: t.last_date.map(str::to_string),
                severities: t.severities,
            })
        })
        .collect::<Vec<_>>();
    rows.sort_by(|a, b| {
        b.incident_count
            .cmp(&a.incident_count)
            .then_with(|| a.student_name.cmp(&b.student_name))
    });
    rows.truncate(TOP_STUDENTS);
    rows
}

/// Six consecutive months ending at the month of the most recent incident. Empty when no
/// incident has a readable date.
pub fn monthly_trend(incidents: &[&Incident]) -> Vec<MonthlyIncidentTrend> {
    let dated = incidents
        .iter()
        .filter_map(|i| parse_date(&i.date).map(|d| (d, i.final_severity)))
        .collect::<Vec<_>>();
    let Some(latest) = dated.iter().map(|(d, _)| *d).max() else {
        return Vec::new();
    };
    let Some(anchor) = NaiveDate::from_ymd_opt(latest.year(), latest.month(), 1) else {
        return Vec::new();
    };

    (0..TREND_MONTHS)
        .rev()
        .filter_map(|back| anchor.checked_sub_months(Months::new(back)))
        .map(|month_start| {
            let in_month = dated
                .iter()
                .filter(|(d, _)| d.year() == month_start.year() && d.month() == month_start.month())
                .collect::<Vec<_>>();
            MonthlyIncidentTrend {
                month: MONTH_LABELS[month_start.month0() as usize].to_string(),
                year: month_start.year(),
                count: in_month.len(),
                severe_count: in_month.iter().filter(|(_, s)| s.is_severe()).count(),
            }
        })
        .collect()
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}
