use chrono::NaiveDate;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Academic periods, in calendar order.
pub const QUARTERS: [&str; 4] = ["1º Bimestre", "2º Bimestre", "3º Bimestre", "4º Bimestre"];

pub fn quarter_index(label: &str) -> Option<usize> {
    QUARTERS.iter().position(|q| *q == label)
}

/// Dates arrive as `YYYY-MM-DD`, sometimes with a time suffix.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let head = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub class_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Student {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    pub fn last_modified(&self) -> &str {
        self.updated_at
            .as_deref()
            .or(self.created_at.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolClass {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub series: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_year_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_calendar_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_calendar_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_year: Option<u8>,
}

impl SchoolClass {
    /// First day of the class's first school year, if known.
    pub fn start_date(&self) -> Option<NaiveDate> {
        if let Some(d) = self.start_year_date.as_deref().and_then(parse_date) {
            return Some(d);
        }
        self.start_calendar_year
            .and_then(|y| NaiveDate::from_ymd_opt(y, 2, 1))
    }

    pub fn start_calendar_year(&self) -> Option<i32> {
        use chrono::Datelike;
        self.start_calendar_year
            .or_else(|| self.start_date().map(|d| d.year()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    #[serde(default)]
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub subject: String,
    pub quarter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_year: Option<u8>,
    pub grade: f64,
    #[serde(default)]
    pub recorded_at: String,
}

impl Grade {
    pub fn school_year(&self) -> u8 {
        self.school_year.unwrap_or(1)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    #[default]
    Presente,
    Falta,
    FaltaJustificada,
    Atestado,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[serde(default)]
    pub id: String,
    pub student_id: String,
    pub class_id: String,
    pub date: String,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub recorded_at: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Leve,
    Intermediaria,
    Grave,
    Gravissima,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Leve,
        Severity::Intermediaria,
        Severity::Grave,
        Severity::Gravissima,
    ];

    pub fn is_severe(self) -> bool {
        matches!(self, Severity::Grave | Severity::Gravissima)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    #[default]
    Aberta,
    Acompanhamento,
    Resolvida,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    #[serde(default)]
    pub id: String,
    pub date: String,
    pub class_id: String,
    #[serde(default)]
    pub student_ids: Vec<String>,
    pub final_severity: Severity,
    pub status: IncidentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Incident {
    pub fn last_modified(&self) -> &str {
        self.updated_at
            .as_deref()
            .or(self.created_at.as_deref())
            .unwrap_or(&self.date)
    }

    pub fn is_open(&self) -> bool {
        self.status != IncidentStatus::Resolvida
    }
}

/// The five record collections the engine aggregates over.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dataset {
    pub students: Vec<Student>,
    pub classes: Vec<SchoolClass>,
    pub grades: Vec<Grade>,
    pub attendance: Vec<AttendanceRecord>,
    pub incidents: Vec<Incident>,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
            && self.classes.is_empty()
            && self.grades.is_empty()
            && self.attendance.is_empty()
            && self.incidents.is_empty()
    }

    pub fn counts(&self) -> RecordCounts {
        RecordCounts {
            students: self.students.len(),
            classes: self.classes.len(),
            grades: self.grades.len(),
            attendance: self.attendance.len(),
            incidents: self.incidents.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCounts {
    pub students: usize,
    pub classes: usize,
    pub grades: usize,
    pub attendance: usize,
    pub incidents: usize,
}

/// `"all"` or one specific year. Used for both school-year (1..=3) and calendar-year selectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum YearSelector {
    #[default]
    All,
    Only(i32),
}

impl YearSelector {
    pub fn year(self) -> Option<i32> {
        match self {
            YearSelector::All => None,
            YearSelector::Only(y) => Some(y),
        }
    }
}

impl fmt::Display for YearSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearSelector::All => f.write_str("all"),
            YearSelector::Only(y) => write!(f, "{y}"),
        }
    }
}

impl Serialize for YearSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            YearSelector::All => serializer.serialize_str("all"),
            YearSelector::Only(y) => serializer.serialize_i32(*y),
        }
    }
}

impl<'de> Deserialize<'de> for YearSelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(YearSelector::Only(n)),
            Raw::Text(t) => {
                let t = t.trim();
                if t.is_empty() || t.eq_ignore_ascii_case("all") {
                    return Ok(YearSelector::All);
                }
                t.parse::<i32>().map(YearSelector::Only).map_err(|_| {
                    de::Error::custom(format!("expected \"all\" or a year, got {t:?}"))
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparisonMode {
    #[default]
    Calendar,
    CourseYear,
}

impl ComparisonMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonMode::Calendar => "calendar",
            ComparisonMode::CourseYear => "courseYear",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsFilters {
    pub series: Vec<String>,
    pub class_ids: Vec<String>,
    pub subjects: Vec<String>,
    pub quarter: String,
    pub use_quarter_range: bool,
    pub quarter_range_start: Option<String>,
    pub quarter_range_end: Option<String>,
    pub school_year: YearSelector,
    pub calendar_year: YearSelector,
    pub include_archived: bool,
    pub comparison_class_ids: Vec<String>,
    pub comparison_mode: ComparisonMode,
    pub comparison_course_year: Option<u8>,
}

impl Default for AnalyticsFilters {
    fn default() -> Self {
        Self {
            series: Vec::new(),
            class_ids: Vec::new(),
            subjects: Vec::new(),
            quarter: "all".to_string(),
            use_quarter_range: false,
            quarter_range_start: None,
            quarter_range_end: None,
            school_year: YearSelector::All,
            calendar_year: YearSelector::All,
            include_archived: false,
            comparison_class_ids: Vec::new(),
            comparison_mode: ComparisonMode::Calendar,
            comparison_course_year: None,
        }
    }
}

impl AnalyticsFilters {
    /// Same selection with every list-valued field sorted.
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        out.series.sort();
        out.class_ids.sort();
        out.subjects.sort();
        out.comparison_class_ids.sort();
        out
    }
}
