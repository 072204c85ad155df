use super::classify::{last_step_trend, mean, profile, quarter_averages};
use super::types::{ClassAnalytics, Classification, ClassificationBuckets};
use crate::model::{AttendanceRecord, AttendanceStatus, Grade, SchoolClass, Student};
use std::cmp::Ordering;
use std::collections::HashMap;

const CLASS_TREND_THRESHOLD: f64 = 0.2;

/// Records gathered for one class under a given selection.
#[derive(Debug, Default)]
pub struct ClassInputs<'a> {
    pub students: Vec<&'a Student>,
    pub grades: Vec<&'a Grade>,
    pub year_grades: Vec<&'a Grade>,
    pub attendance: Vec<&'a AttendanceRecord>,
    pub incident_count: usize,
    pub last_quarter: Option<usize>,
}

pub fn class_analytics(
    cls: &SchoolClass,
    calendar_year: Option<i32>,
    inputs: &ClassInputs<'_>,
) -> ClassAnalytics {
    let mut by_student: HashMap<&str, Vec<&Grade>> = HashMap::new();
    for g in &inputs.grades {
        by_student.entry(g.student_id.as_str()).or_default().push(g);
    }

    let mut classifications = ClassificationBuckets::default();
    let mut student_averages = Vec::new();
    for s in &inputs.students {
        let Some(grades) = by_student.get(s.id.as_str()) else {
            continue;
        };
        if let Some(p) = profile(grades) {
            classifications.add(p.classification);
            student_averages.push(p.average);
        }
    }

    let quarters = inputs
        .last_quarter
        .map(|q| quarter_averages(&inputs.year_grades, q))
        .unwrap_or_default();
    let growth = match quarters.as_slice() {
        [.., prev, last] => Some(last - prev),
        _ => None,
    };

    ClassAnalytics {
        class_id: cls.id.clone(),
        class_name: cls.name.clone(),
        series: cls.series.clone(),
        archived: cls.archived,
        calendar_year,
        student_count: inputs.students.len(),
        average: mean(student_averages.into_iter()),
        frequency: attendance_rate(&inputs.attendance),
        growth,
        classifications,
        incident_count: inputs.incident_count,
        trend: last_step_trend(&quarters, CLASS_TREND_THRESHOLD),
    }
}

/// Percent present; 100 when nothing was recorded.
pub fn attendance_rate(records: &[&AttendanceRecord]) -> f64 {
    if records.is_empty() {
        return 100.0;
    }
    let present = records
        .iter()
        .filter(|a| a.status == AttendanceStatus::Presente)
        .count();
    present as f64 / records.len() as f64 * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingSortKey {
    Average,
    Attendance,
    Classification(Classification),
    Growth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl RankingSortKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "average" => Some(Self::Average),
            "attendance" | "frequency" => Some(Self::Attendance),
            "critico" => Some(Self::Classification(Classification::Critico)),
            "atencao" => Some(Self::Classification(Classification::Atencao)),
            "aprovado" => Some(Self::Classification(Classification::Aprovado)),
            "excelencia" => Some(Self::Classification(Classification::Excelencia)),
            "growth" => Some(Self::Growth),
            _ => None,
        }
    }

    /// Fewer critical students ranks first; for everything else more is better.
    pub fn default_dir(self) -> SortDir {
        match self {
            Self::Classification(Classification::Critico) => SortDir::Asc,
            _ => SortDir::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingSort {
    pub key: RankingSortKey,
    pub dir: SortDir,
}

impl RankingSort {
    pub fn by(key: RankingSortKey) -> Self {
        Self {
            key,
            dir: key.default_dir(),
        }
    }
}

impl Default for RankingSort {
    fn default() -> Self {
        Self::by(RankingSortKey::Average)
    }
}

/// Sorts ranking rows; ties fall back to class name, ascending and case-insensitive. Rows
/// without growth data always trail a growth sort.
pub fn sort_class_ranking(rows: &mut [ClassAnalytics], sort: RankingSort) {
    rows.sort_by(|a, b| {
        let ord = match sort.key {
            RankingSortKey::Average => cmp_f64(a.average, b.average),
            RankingSortKey::Attendance => cmp_f64(a.frequency, b.frequency),
            RankingSortKey::Classification(c) => {
                a.classifications.get(c).cmp(&b.classifications.get(c))
            }
            RankingSortKey::Growth => match (a.growth, b.growth) {
                (Some(x), Some(y)) => cmp_f64(x, y),
                (Some(_), None) => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        let ord = match sort.dir {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        };
        ord.then_with(|| {
            a.class_name
                .to_lowercase()
                .cmp(&b.class_name.to_lowercase())
        })
        .then_with(|| a.class_id.cmp(&b.class_id))
    });
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::types::Trend;

    fn row(id: &str, name: &str, average: f64, critico: usize, growth: Option<f64>) -> ClassAnalytics {
        ClassAnalytics {
            class_id: id.into(),
            class_name: name.into(),
            series: "1º".into(),
            archived: false,
            calendar_year: None,
            student_count: 10,
            average,
            frequency: 90.0,
            growth,
            classifications: ClassificationBuckets {
                critico,
                ..ClassificationBuckets::default()
            },
            incident_count: 0,
            trend: Trend::Stable,
        }
    }

    fn ids(rows: &[ClassAnalytics]) -> Vec<&str> {
        rows.iter().map(|r| r.class_id.as_str()).collect()
    }

    #[test]
    fn average_sort_is_descending_with_name_ties() {
        let mut rows = vec![
            row("c", "beta", 7.0, 0, None),
            row("a", "Alpha", 7.0, 0, None),
            row("b", "gamma", 8.0, 0, None),
        ];
        sort_class_ranking(&mut rows, RankingSort::default());
        assert_eq!(ids(&rows), vec!["b", "a", "c"]);
    }

    #[test]
    fn critico_sort_defaults_to_ascending() {
        let mut rows = vec![
            row("a", "A", 7.0, 5, None),
            row("b", "B", 7.0, 1, None),
            row("c", "C", 7.0, 3, None),
        ];
        let sort = RankingSort::by(RankingSortKey::parse("critico").expect("key"));
        assert_eq!(sort.dir, SortDir::Asc);
        sort_class_ranking(&mut rows, sort);
        assert_eq!(ids(&rows), vec!["b", "c", "a"]);
    }

    #[test]
    fn growth_sort_puts_missing_last_in_both_directions() {
        let mut rows = vec![
            row("a", "A", 7.0, 0, None),
            row("b", "B", 7.0, 0, Some(-0.5)),
            row("c", "C", 7.0, 0, Some(1.0)),
        ];
        sort_class_ranking(&mut rows, RankingSort::by(RankingSortKey::Growth));
        assert_eq!(ids(&rows), vec!["c", "b", "a"]);
        sort_class_ranking(
            &mut rows,
            RankingSort {
                key: RankingSortKey::Growth,
                dir: SortDir::Asc,
            },
        );
        assert_eq!(ids(&rows), vec!["b", "c", "a"]);
    }

    #[test]
    fn attendance_rate_defaults_to_full() {
        assert_eq!(attendance_rate(&[]), 100.0);
    }
}
