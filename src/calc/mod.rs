//! The analytics computer: records plus a filter in, one aggregated result out.
//!
//! Everything here is pure. Nothing is cached or remembered between calls; malformed selections
//! resolve to empty rows rather than errors.

pub mod behavior;
pub mod classify;
pub mod insights;
pub mod phrasebook;
pub mod predict;
pub mod ranking;
pub mod scope;
pub mod subjects;
pub mod types;

pub use ranking::{sort_class_ranking, RankingSort, RankingSortKey, SortDir};
pub use types::*;

use crate::cache_key::filter_key;
use crate::model::{
    AnalyticsFilters, AttendanceRecord, ComparisonMode, Dataset, Grade, Incident, RecordCounts,
    SchoolClass, Student,
};
use crate::signature::data_signature;
use classify::{last_step_trend, mean, profile, quarter_averages};
use ranking::{attendance_rate, class_analytics, ClassInputs};
use scope::{class_calendar_year, Records, Scope};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

const TOP_STUDENTS: usize = 10;
const CRITICAL_STUDENTS: usize = 15;
const STUDENT_TREND_THRESHOLD: f64 = 0.3;
const COMPARISON_CLASSES: std::ops::RangeInclusive<usize> = 2..=4;

pub fn compute(
    students: &[Student],
    classes: &[SchoolClass],
    grades: &[Grade],
    attendance: &[AttendanceRecord],
    incidents: &[Incident],
    filters: &AnalyticsFilters,
) -> SchoolAnalyticsResult {
    let records = Records {
        students,
        classes,
        grades,
        attendance,
        incidents,
    };
    let scope = Scope::resolve(records, filters);
    let by_class = ByClass::group(&scope);
    let class_names: HashMap<&str, &str> = classes
        .iter()
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect();

    let student_rows = student_analytics(&scope, &class_names);
    let mut classifications = ClassificationBuckets::default();
    for s in &student_rows {
        classifications.add(s.classification);
    }

    let class_rows = scope
        .classes
        .iter()
        .map(|&cls| {
            let inputs = by_class.inputs(cls, scope.quarters.last());
            class_analytics(cls, scope.calendar_years.get(cls.id.as_str()).copied(), &inputs)
        })
        .collect::<Vec<_>>();
    let mut class_ranking = class_rows
        .iter()
        .filter(|c| !c.archived)
        .cloned()
        .collect::<Vec<_>>();
    sort_class_ranking(&mut class_ranking, RankingSort::default());

    let student_predictions = predictions(&scope, records, &class_names);
    let prediction_summary = summarize(&student_predictions);

    let overview = SchoolOverview {
        total_students: scope.students.len(),
        students_with_grades: classifications.total(),
        total_classes: scope.classes.len(),
        overall_average: mean(scope.grades.iter().map(|g| g.grade)),
        overall_frequency: attendance_rate(&scope.attendance),
        total_incidents: scope.incidents.len(),
        classifications,
    };

    let subject_analytics = subjects::subject_analytics(&scope.grades);
    let area_analytics = subjects::area_analytics(&subject_analytics);
    let (best_subjects, worst_subjects) = subjects::highlighted(&subject_analytics);
    let behavioral_analytics =
        behavior::behavioral_analytics(&scope.classes, &scope.students, &scope.incidents);

    let found = insights::findings(&insights::InsightInputs {
        overview: &overview,
        class_ranking: &class_ranking,
        worst_subjects: &worst_subjects,
        prediction_summary: &prediction_summary,
        behavior: &behavioral_analytics,
    });
    let (insights, categorized_insights) = insights::render(found);

    let cohort_analytics = cohorts(&scope, &by_class, &class_rows);
    let comparison_data = comparison(&scope, records);

    let (top_students, critical_students) = student_rankings(student_rows);

    SchoolAnalyticsResult {
        context: Some(AnalyticsContext {
            data_signature: data_signature(students, classes, grades, attendance, incidents),
            filter_key: filter_key(filters),
            record_counts: RecordCounts {
                students: students.len(),
                classes: classes.len(),
                grades: grades.len(),
                attendance: attendance.len(),
                incidents: incidents.len(),
            },
        }),
        overview,
        class_ranking,
        top_students,
        critical_students,
        student_predictions,
        prediction_summary,
        subject_analytics,
        area_analytics,
        best_subjects,
        worst_subjects,
        behavioral_analytics,
        insights,
        categorized_insights,
        comparison_data,
        cohort_analytics,
    }
}

pub fn compute_dataset(data: &Dataset, filters: &AnalyticsFilters) -> SchoolAnalyticsResult {
    compute(
        &data.students,
        &data.classes,
        &data.grades,
        &data.attendance,
        &data.incidents,
        filters,
    )
}

/// In-scope records grouped by class id.
#[derive(Default)]
struct ByClass<'a> {
    students: HashMap<&'a str, Vec<&'a Student>>,
    grades: HashMap<&'a str, Vec<&'a Grade>>,
    year_grades: HashMap<&'a str, Vec<&'a Grade>>,
    attendance: HashMap<&'a str, Vec<&'a AttendanceRecord>>,
    incidents: HashMap<&'a str, usize>,
}

impl<'a> ByClass<'a> {
    fn group(scope: &Scope<'a>) -> Self {
        let mut out = ByClass::default();
        for &s in &scope.students {
            out.students.entry(s.class_id.as_str()).or_default().push(s);
        }
        for &g in &scope.grades {
            out.grades.entry(g.class_id.as_str()).or_default().push(g);
        }
        for &g in &scope.year_grades {
            out.year_grades.entry(g.class_id.as_str()).or_default().push(g);
        }
        for &a in &scope.attendance {
            out.attendance.entry(a.class_id.as_str()).or_default().push(a);
        }
        for &i in &scope.incidents {
            *out.incidents.entry(i.class_id.as_str()).or_default() += 1;
        }
        out
    }

    fn inputs(&self, cls: &SchoolClass, last_quarter: Option<usize>) -> ClassInputs<'a> {
        let id = cls.id.as_str();
        ClassInputs {
            students: self.students.get(id).cloned().unwrap_or_default(),
            grades: self.grades.get(id).cloned().unwrap_or_default(),
            year_grades: self.year_grades.get(id).cloned().unwrap_or_default(),
            attendance: self.attendance.get(id).cloned().unwrap_or_default(),
            incident_count: self.incidents.get(id).copied().unwrap_or(0),
            last_quarter,
        }
    }
}

fn student_analytics(scope: &Scope<'_>, class_names: &HashMap<&str, &str>) -> Vec<StudentAnalytics> {
    let mut grades: HashMap<&str, Vec<&Grade>> = HashMap::new();
    for &g in &scope.grades {
        grades.entry(g.student_id.as_str()).or_default().push(g);
    }
    let mut year_grades: HashMap<&str, Vec<&Grade>> = HashMap::new();
    for &g in &scope.year_grades {
        year_grades.entry(g.student_id.as_str()).or_default().push(g);
    }
    let mut attendance: HashMap<&str, Vec<&AttendanceRecord>> = HashMap::new();
    for &a in &scope.attendance {
        attendance.entry(a.student_id.as_str()).or_default().push(a);
    }
    let mut incidents: HashMap<&str, usize> = HashMap::new();
    for i in &scope.incidents {
        for sid in &i.student_ids {
            *incidents.entry(sid.as_str()).or_default() += 1;
        }
    }

    scope
        .students
        .iter()
        .filter_map(|s| {
            let id = s.id.as_str();
            let p = profile(grades.get(id)?)?;
            let quarters = scope
                .quarters
                .last()
                .zip(year_grades.get(id))
                .map(|(last, g)| quarter_averages(g, last))
                .unwrap_or_default();
            Some(StudentAnalytics {
                student_id: s.id.clone(),
                student_name: s.name.clone(),
                class_id: s.class_id.clone(),
                class_name: class_name(class_names, &s.class_id),
                classification: p.classification,
                average: p.average,
                subjects_below6: p.below_passing,
                frequency: attendance_rate(attendance.get(id).map(Vec::as_slice).unwrap_or(&[])),
                incident_count: incidents.get(id).copied().unwrap_or(0),
                trend: last_step_trend(&quarters, STUDENT_TREND_THRESHOLD),
            })
        })
        .collect()
}

fn class_name(class_names: &HashMap<&str, &str>, class_id: &str) -> String {
    class_names
        .get(class_id)
        .map(|n| n.to_string())
        .unwrap_or_else(|| "Sem turma".to_string())
}

/// `(top, critical)`: best averages first; critico before atencao, lowest average first.
fn student_rankings(rows: Vec<StudentAnalytics>) -> (Vec<StudentAnalytics>, Vec<StudentAnalytics>) {
    let by_average = |a: &StudentAnalytics, b: &StudentAnalytics| {
        a.average.partial_cmp(&b.average).unwrap_or(Ordering::Equal)
    };

    let mut critical = rows
        .iter()
        .filter(|s| {
            matches!(
                s.classification,
                Classification::Critico | Classification::Atencao
            )
        })
        .cloned()
        .collect::<Vec<_>>();
    critical.sort_by(|a, b| {
        let rank = |s: &StudentAnalytics| (s.classification != Classification::Critico) as u8;
        rank(a)
            .cmp(&rank(b))
            .then_with(|| by_average(a, b))
            .then_with(|| a.student_name.cmp(&b.student_name))
    });
    critical.truncate(CRITICAL_STUDENTS);

    let mut top = rows;
    top.sort_by(|a, b| by_average(b, a).then_with(|| a.student_name.cmp(&b.student_name)));
    top.truncate(TOP_STUDENTS);
    (top, critical)
}

fn predictions(
    scope: &Scope<'_>,
    records: Records<'_>,
    class_names: &HashMap<&str, &str>,
) -> Vec<StudentPrediction> {
    let classes: HashMap<&str, &SchoolClass> = records
        .classes
        .iter()
        .map(|c| (c.id.as_str(), c))
        .collect();
    let mut by_student: HashMap<&str, Vec<&Grade>> = HashMap::new();
    for g in records.grades {
        if scope.grade_in_year(g, None) {
            by_student.entry(g.student_id.as_str()).or_default().push(g);
        }
    }
    let through = scope.quarters.last();

    scope
        .students
        .iter()
        .map(|s| {
            let own = by_student
                .get(s.id.as_str())
                .map(|g| {
                    g.iter()
                        .copied()
                        .filter(|g| g.class_id == s.class_id)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            let year = scope
                .target_year
                .or_else(|| {
                    classes
                        .get(s.class_id.as_str())
                        .and_then(|c| c.current_year)
                        .filter(|y| (1..=3).contains(y))
                })
                .or_else(|| own.iter().map(|g| g.school_year()).max())
                .unwrap_or(1);
            let current = own
                .into_iter()
                .filter(|g| g.school_year() == year)
                .collect::<Vec<_>>();
            let projection = predict::project(&current, through);
            let outcome = projection.outcome;

            StudentPrediction {
                student_id: s.id.clone(),
                student_name: s.name.clone(),
                class_id: s.class_id.clone(),
                class_name: class_name(class_names, &s.class_id),
                school_year: year,
                predicted: outcome.map(|o| o.predicted),
                confidence: outcome.map(|o| o.confidence),
                risk: outcome.map(|o| o.risk),
                risk_level: outcome.map(|o| o.level),
                trend: projection.trend,
                current_average: projection.current_average,
                data_points: projection.data_points,
                quarters_observed: projection.quarters_observed,
                has_sufficient_data: outcome.is_some(),
            }
        })
        .collect()
}

fn summarize(predictions: &[StudentPrediction]) -> PredictionSummary {
    let mut summary = PredictionSummary {
        total: predictions.len(),
        ..PredictionSummary::default()
    };
    for p in predictions {
        match p.risk {
            None => summary.insufficient += 1,
            Some(r) if r >= 70.0 => summary.high_risk += 1,
            Some(r) if r >= 40.0 => summary.medium_risk += 1,
            Some(_) => summary.low_risk += 1,
        }
    }
    summary
}

/// One row per calendar year; only meaningful when a single school year is selected.
fn cohorts(scope: &Scope<'_>, by_class: &ByClass<'_>, class_rows: &[ClassAnalytics]) -> Vec<CohortAnalytics> {
    if scope.target_year.is_none() {
        return Vec::new();
    }

    #[derive(Default)]
    struct Acc<'a> {
        classes: HashSet<&'a str>,
        students: HashSet<&'a str>,
        grade_sum: f64,
        grade_count: usize,
        present: usize,
        attendance: usize,
        incidents: usize,
        growth: Vec<f64>,
    }

    let growth: HashMap<&str, f64> = class_rows
        .iter()
        .filter_map(|c| c.growth.map(|g| (c.class_id.as_str(), g)))
        .collect();
    let mut by_year: BTreeMap<i32, Acc> = BTreeMap::new();
    for &cls in &scope.classes {
        let Some(&year) = scope.calendar_years.get(cls.id.as_str()) else {
            continue;
        };
        let inputs = by_class.inputs(cls, None);
        let acc = by_year.entry(year).or_default();
        acc.classes.insert(cls.id.as_str());
        acc.students.extend(inputs.students.iter().map(|&s| s.id.as_str()));
        acc.grade_sum += inputs.grades.iter().map(|g| g.grade).sum::<f64>();
        acc.grade_count += inputs.grades.len();
        acc.attendance += inputs.attendance.len();
        acc.present += inputs
            .attendance
            .iter()
            .filter(|a| a.status == crate::model::AttendanceStatus::Presente)
            .count();
        acc.incidents += inputs.incident_count;
        if let Some(&g) = growth.get(cls.id.as_str()) {
            acc.growth.push(g);
        }
    }

    by_year
        .into_iter()
        .map(|(calendar_year, acc)| CohortAnalytics {
            calendar_year,
            class_count: acc.classes.len(),
            student_count: acc.students.len(),
            average: if acc.grade_count > 0 {
                acc.grade_sum / acc.grade_count as f64
            } else {
                0.0
            },
            frequency: if acc.attendance > 0 {
                acc.present as f64 / acc.attendance as f64 * 100.0
            } else {
                100.0
            },
            incident_count: acc.incidents,
            growth_average: if acc.growth.is_empty() {
                None
            } else {
                Some(mean(acc.growth.iter().copied()))
            },
        })
        .collect()
}

/// Side-by-side metrics for an explicit list of 2 to 4 classes, in the order given. In
/// course-year mode each class is measured on the chosen course year instead of the selected
/// school year.
fn comparison(scope: &Scope<'_>, records: Records<'_>) -> Vec<ClassAnalytics> {
    let filters = scope.filters;
    if !COMPARISON_CLASSES.contains(&filters.comparison_class_ids.len()) {
        return Vec::new();
    }
    let year = match (filters.comparison_mode, filters.comparison_course_year) {
        (ComparisonMode::CourseYear, Some(y)) if (1..=3).contains(&y) => Some(y),
        _ => scope.target_year,
    };

    filters
        .comparison_class_ids
        .iter()
        .filter_map(|id| records.classes.iter().find(|c| &c.id == id))
        .filter(|cls| scope.class_eligible(cls))
        .map(|cls| {
            let window = scope.window_for(cls, year);
            let inputs = ClassInputs {
                students: records
                    .students
                    .iter()
                    .filter(|s| s.is_active() && s.class_id == cls.id)
                    .collect(),
                grades: records
                    .grades
                    .iter()
                    .filter(|g| g.class_id == cls.id && scope.grade_matches(g, year))
                    .collect(),
                year_grades: records
                    .grades
                    .iter()
                    .filter(|g| g.class_id == cls.id && scope.grade_in_year(g, year))
                    .collect(),
                attendance: records
                    .attendance
                    .iter()
                    .filter(|a| a.class_id == cls.id && window.contains(&a.date))
                    .collect(),
                incident_count: records
                    .incidents
                    .iter()
                    .filter(|i| i.class_id == cls.id && window.contains(&i.date))
                    .count(),
                last_quarter: scope.quarters.last(),
            };
            let calendar_year = year.and_then(|y| class_calendar_year(cls, y));
            class_analytics(cls, calendar_year, &inputs)
        })
        .collect()
}
