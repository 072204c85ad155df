use super::classify::{mean, PASSING_GRADE};
use super::types::{AreaAnalytics, SubjectAnalytics};
use crate::model::Grade;
use std::collections::BTreeMap;

const SUBJECT_AREAS: [(&str, &[&str]); 3] = [
    (
        "Linguagens",
        &["Língua Portuguesa", "Inglês", "Espanhol", "Educação Física", "Arte"],
    ),
    (
        "Ciências Humanas",
        &["História", "Geografia", "Filosofia", "Sociologia"],
    ),
    (
        "Ciências da Natureza",
        &["Matemática", "Física", "Química", "Biologia"],
    ),
];
const OTHER_AREA: &str = "Outros";
const HIGHLIGHTED_SUBJECTS: usize = 5;

pub fn subject_area(subject: &str) -> &'static str {
    SUBJECT_AREAS
        .iter()
        .find(|(_, subjects)| subjects.contains(&subject))
        .map(|(area, _)| *area)
        .unwrap_or(OTHER_AREA)
}

/// Per subject, the mean of per-student subject averages. Sorted by subject name.
pub fn subject_analytics(grades: &[&Grade]) -> Vec<SubjectAnalytics> {
    let mut by_subject: BTreeMap<&str, BTreeMap<&str, Vec<f64>>> = BTreeMap::new();
    for g in grades {
        by_subject
            .entry(g.subject.as_str())
            .or_default()
            .entry(g.student_id.as_str())
            .or_default()
            .push(g.grade);
    }

    by_subject
        .into_iter()
        .map(|(subject, students)| {
            let finals = students
                .into_values()
                .map(|values| mean(values.into_iter()))
                .collect::<Vec<_>>();
            let below = finals.iter().filter(|avg| **avg < PASSING_GRADE).count();
            SubjectAnalytics {
                subject: subject.to_string(),
                area: subject_area(subject).to_string(),
                average: mean(finals.iter().copied()),
                students_below6: below,
                students_below6_percent: if finals.is_empty() {
                    0.0
                } else {
                    below as f64 / finals.len() as f64 * 100.0
                },
                total_students: finals.len(),
            }
        })
        .collect()
}

pub fn area_analytics(subjects: &[SubjectAnalytics]) -> Vec<AreaAnalytics> {
    let mut by_area: BTreeMap<&str, Vec<SubjectAnalytics>> = BTreeMap::new();
    for s in subjects {
        by_area.entry(s.area.as_str()).or_default().push(s.clone());
    }
    by_area
        .into_iter()
        .map(|(area, subjects)| AreaAnalytics {
            area: area.to_string(),
            average: mean(subjects.iter().map(|s| s.average)),
            subjects,
        })
        .collect()
}

/// `(best, worst)`: the five highest and five lowest subject averages.
pub fn highlighted(subjects: &[SubjectAnalytics]) -> (Vec<SubjectAnalytics>, Vec<SubjectAnalytics>) {
    let mut sorted = subjects.to_vec();
    sorted.sort_by(|a, b| {
        b.average
            .partial_cmp(&a.average)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let best = sorted.iter().take(HIGHLIGHTED_SUBJECTS).cloned().collect();
    let worst = sorted
        .iter()
        .rev()
        .take(HIGHLIGHTED_SUBJECTS)
        .cloned()
        .collect();
    (best, worst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grade(student: &str, subject: &str, value: f64) -> Grade {
        Grade {
            student_id: student.into(),
            class_id: "c1".into(),
            subject: subject.into(),
            quarter: "1º Bimestre".into(),
            grade: value,
            ..Grade::default()
        }
    }

    #[test]
    fn subject_average_is_mean_of_student_averages() {
        let owned = vec![
            grade("s1", "Matemática", 4.0),
            grade("s1", "Matemática", 6.0),
            grade("s1", "Matemática", 8.0),
            grade("s2", "Matemática", 9.0),
            grade("s1", "Xadrez", 7.0),
        ];
        let refs = owned.iter().collect::<Vec<_>>();
        let rows = subject_analytics(&refs);
        let math = rows.iter().find(|r| r.subject == "Matemática").expect("math");
        assert_eq!(math.average, 7.5);
        assert_eq!(math.students_below6, 0);
        assert_eq!(math.area, "Ciências da Natureza");
        let chess = rows.iter().find(|r| r.subject == "Xadrez").expect("chess");
        assert_eq!(chess.area, "Outros");

        let areas = area_analytics(&rows);
        assert_eq!(areas.len(), 2);
    }

    #[test]
    fn worst_subjects_start_from_lowest() {
        let owned = vec![
            grade("s1", "Arte", 9.0),
            grade("s1", "Física", 3.0),
            grade("s1", "História", 6.0),
        ];
        let refs = owned.iter().collect::<Vec<_>>();
        let (best, worst) = highlighted(&subject_analytics(&refs));
        assert_eq!(best[0].subject, "Arte");
        assert_eq!(worst[0].subject, "Física");
        assert_eq!(worst[0].students_below6_percent, 100.0);
    }
}
