use crate::model::{AttendanceRecord, Dataset, Grade, Incident, SchoolClass, Student};
use sha2::{Digest, Sha256};

/// Short fingerprint of the five record collections.
///
/// Classes and students are fingerprinted field by field (sorted, so input order never matters).
/// Grades, attendance and incidents only contribute their count and the greatest modification
/// timestamp: replacing a record with one of an older or equal timestamp without changing the
/// count goes unnoticed. Returns `""` when every collection is empty.
pub fn data_signature(
    students: &[Student],
    classes: &[SchoolClass],
    grades: &[Grade],
    attendance: &[AttendanceRecord],
    incidents: &[Incident],
) -> String {
    if students.is_empty()
        && classes.is_empty()
        && grades.is_empty()
        && attendance.is_empty()
        && incidents.is_empty()
    {
        return String::new();
    }

    let mut class_rows = classes
        .iter()
        .map(|c| {
            [
                c.id.clone(),
                if c.archived { "1" } else { "0" }.to_string(),
                c.series.clone(),
                opt_to_string(c.start_calendar_year),
                opt_to_string(c.end_calendar_year),
                c.start_year_date.clone().unwrap_or_default(),
                opt_to_string(c.current_year),
            ]
            .join(":")
        })
        .collect::<Vec<_>>();
    class_rows.sort();

    let mut student_rows = students
        .iter()
        .map(|s| {
            [
                s.id.as_str(),
                s.class_id.as_str(),
                s.status.as_str(),
                s.last_modified(),
            ]
            .join(":")
        })
        .collect::<Vec<_>>();
    student_rows.sort();

    let grades_max = max_timestamp(grades.iter().map(|g| g.recorded_at.as_str()));
    let attendance_max = max_timestamp(attendance.iter().map(|a| a.recorded_at.as_str()));
    let incidents_max = max_timestamp(incidents.iter().map(|i| i.last_modified()));

    [
        format!("c:{}:{}", classes.len(), short_hash(&class_rows.join("|"))),
        format!("s:{}:{}", students.len(), short_hash(&student_rows.join("|"))),
        format!("g:{}:{}", grades.len(), grades_max),
        format!("a:{}:{}", attendance.len(), attendance_max),
        format!("i:{}:{}", incidents.len(), incidents_max),
    ]
    .join("::")
}

pub fn dataset_signature(data: &Dataset) -> String {
    data_signature(
        &data.students,
        &data.classes,
        &data.grades,
        &data.attendance,
        &data.incidents,
    )
}

/// First 8 bytes of SHA-256, hex encoded.
fn short_hash(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

fn max_timestamp<'a>(values: impl Iterator<Item = &'a str>) -> &'a str {
    values.fold("", |acc, v| if v > acc { v } else { acc })
}

fn opt_to_string<T: ToString>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: &str, class_id: &str, updated: &str) -> Student {
        Student {
            id: id.into(),
            name: format!("Aluno {id}"),
            class_id: class_id.into(),
            status: "active".into(),
            created_at: None,
            updated_at: Some(updated.into()),
        }
    }

    fn class(id: &str) -> SchoolClass {
        SchoolClass {
            id: id.into(),
            name: format!("Turma {id}"),
            series: "1º".into(),
            start_calendar_year: Some(2024),
            ..SchoolClass::default()
        }
    }

    fn grade(student_id: &str, recorded_at: &str) -> Grade {
        Grade {
            id: format!("{student_id}-{recorded_at}"),
            student_id: student_id.into(),
            class_id: "c1".into(),
            subject: "Matemática".into(),
            quarter: "1º Bimestre".into(),
            school_year: Some(1),
            grade: 7.0,
            recorded_at: recorded_at.into(),
        }
    }

    #[test]
    fn empty_input_yields_empty_signature() {
        assert_eq!(data_signature(&[], &[], &[], &[], &[]), "");
    }

    #[test]
    fn permuting_collections_keeps_signature() {
        let students = vec![
            student("s1", "c1", "2025-03-01"),
            student("s2", "c1", "2025-03-02"),
            student("s3", "c2", "2025-03-03"),
        ];
        let classes = vec![class("c1"), class("c2")];
        let grades = vec![grade("s1", "2025-04-01"), grade("s2", "2025-04-09")];

        let a = data_signature(&students, &classes, &grades, &[], &[]);
        let mut students_rev = students.clone();
        students_rev.reverse();
        let mut classes_rev = classes.clone();
        classes_rev.reverse();
        let mut grades_rev = grades.clone();
        grades_rev.reverse();
        let b = data_signature(&students_rev, &classes_rev, &grades_rev, &[], &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn signature_layout_carries_counts_and_max_timestamp() {
        let sig = data_signature(
            &[student("s1", "c1", "2025-03-01")],
            &[class("c1")],
            &[grade("s1", "2025-04-01"), grade("s1", "2025-05-20")],
            &[],
            &[],
        );
        let parts = sig.split("::").collect::<Vec<_>>();
        assert_eq!(parts.len(), 5);
        assert!(parts[0].starts_with("c:1:"));
        assert!(parts[1].starts_with("s:1:"));
        assert_eq!(parts[2], "g:2:2025-05-20");
        assert_eq!(parts[3], "a:0:");
        assert_eq!(parts[4], "i:0:");
    }

    #[test]
    fn student_status_change_changes_signature() {
        let classes = vec![class("c1")];
        let mut s = student("s1", "c1", "2025-03-01");
        let before = data_signature(std::slice::from_ref(&s), &classes, &[], &[], &[]);
        s.status = "transferred".into();
        let after = data_signature(std::slice::from_ref(&s), &classes, &[], &[], &[]);
        assert_ne!(before, after);
    }
}
