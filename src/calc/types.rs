use crate::model::{RecordCounts, Severity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Critico,
    Atencao,
    Aprovado,
    Excelencia,
}

/// Four mutually exclusive counts over the students that have at least one grade in scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationBuckets {
    pub critico: usize,
    pub atencao: usize,
    pub aprovado: usize,
    pub excelencia: usize,
}

impl ClassificationBuckets {
    pub fn add(&mut self, c: Classification) {
        match c {
            Classification::Critico => self.critico += 1,
            Classification::Atencao => self.atencao += 1,
            Classification::Aprovado => self.aprovado += 1,
            Classification::Excelencia => self.excelencia += 1,
        }
    }

    pub fn get(&self, c: Classification) -> usize {
        match c {
            Classification::Critico => self.critico,
            Classification::Atencao => self.atencao,
            Classification::Aprovado => self.aprovado,
            Classification::Excelencia => self.excelencia,
        }
    }

    pub fn total(&self) -> usize {
        self.critico + self.atencao + self.aprovado + self.excelencia
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub subject: String,
    pub average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAnalytics {
    pub student_id: String,
    pub student_name: String,
    pub class_id: String,
    pub class_name: String,
    pub classification: Classification,
    pub average: f64,
    pub subjects_below6: Vec<SubjectAverage>,
    pub frequency: f64,
    pub incident_count: usize,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAnalytics {
    pub class_id: String,
    pub class_name: String,
    pub series: String,
    pub archived: bool,
    pub calendar_year: Option<i32>,
    pub student_count: usize,
    pub average: f64,
    /// Attendance rate, percent.
    pub frequency: f64,
    pub growth: Option<f64>,
    pub classifications: ClassificationBuckets,
    pub incident_count: usize,
    pub trend: Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Alto,
    #[serde(rename = "Médio")]
    Medio,
    Baixo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionTrend {
    Melhoria,
    #[serde(rename = "Declínio")]
    Declinio,
    #[serde(rename = "Estável")]
    Estavel,
    #[serde(rename = "Dados insuficientes")]
    Insuficiente,
}

/// `predicted`, `confidence`, `risk` and `risk_level` are `None` exactly when
/// `has_sufficient_data` is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPrediction {
    pub student_id: String,
    pub student_name: String,
    pub class_id: String,
    pub class_name: String,
    pub school_year: u8,
    pub predicted: Option<f64>,
    pub confidence: Option<f64>,
    pub risk: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub trend: PredictionTrend,
    pub current_average: f64,
    pub data_points: usize,
    pub quarters_observed: usize,
    pub has_sufficient_data: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionSummary {
    pub total: usize,
    pub high_risk: usize,
    pub medium_risk: usize,
    pub low_risk: usize,
    pub insufficient: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAnalytics {
    pub subject: String,
    pub area: String,
    pub average: f64,
    pub students_below6: usize,
    pub students_below6_percent: f64,
    pub total_students: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaAnalytics {
    pub area: String,
    pub average: f64,
    pub subjects: Vec<SubjectAnalytics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolOverview {
    pub total_students: usize,
    pub students_with_grades: usize,
    pub total_classes: usize,
    pub overall_average: f64,
    pub overall_frequency: f64,
    pub total_incidents: usize,
    pub classifications: ClassificationBuckets,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub leve: usize,
    pub intermediaria: usize,
    pub grave: usize,
    pub gravissima: usize,
}

impl SeverityCounts {
    pub fn add(&mut self, s: Severity) {
        match s {
            Severity::Leve => self.leve += 1,
            Severity::Intermediaria => self.intermediaria += 1,
            Severity::Grave => self.grave += 1,
            Severity::Gravissima => self.gravissima += 1,
        }
    }

    pub fn get(&self, s: Severity) -> usize {
        match s {
            Severity::Leve => self.leve,
            Severity::Intermediaria => self.intermediaria,
            Severity::Grave => self.grave,
            Severity::Gravissima => self.gravissima,
        }
    }

    pub fn severe(&self) -> usize {
        self.grave + self.gravissima
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentBySeverity {
    pub severity: Severity,
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassIncidentRanking {
    pub class_id: String,
    pub class_name: String,
    pub incident_count: usize,
    pub student_count: usize,
    pub incidents_per_student: f64,
    pub open_incidents: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentIncidentRanking {
    pub student_id: String,
    pub student_name: String,
    pub class_name: String,
    pub incident_count: usize,
    pub last_incident_date: Option<String>,
    pub severities: SeverityCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyIncidentTrend {
    pub month: String,
    pub year: i32,
    pub count: usize,
    pub severe_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehavioralAnalytics {
    pub incidents_by_severity: Vec<IncidentBySeverity>,
    pub class_incident_ranking: Vec<ClassIncidentRanking>,
    pub top_students_by_incidents: Vec<StudentIncidentRanking>,
    pub monthly_trend: Vec<MonthlyIncidentTrend>,
    pub open_incidents_count: usize,
    pub resolved_incidents_count: usize,
    pub average_incidents_per_student: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightType {
    Alert,
    Warning,
    Info,
    Success,
}

impl InsightType {
    /// Display priority, lowest first.
    pub fn priority(self) -> u8 {
        match self {
            InsightType::Alert => 0,
            InsightType::Warning => 1,
            InsightType::Info => 2,
            InsightType::Success => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightCategory {
    Academic,
    Behavioral,
    Risk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: InsightType,
    pub category: InsightCategory,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorizedInsights {
    pub academic: Vec<Insight>,
    pub behavioral: Vec<Insight>,
    pub risk: Vec<Insight>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortAnalytics {
    pub calendar_year: i32,
    pub class_count: usize,
    pub student_count: usize,
    pub average: f64,
    pub frequency: f64,
    pub incident_count: usize,
    pub growth_average: Option<f64>,
}

/// Identifies the data and selection a result was computed from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsContext {
    pub data_signature: String,
    pub filter_key: String,
    pub record_counts: RecordCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolAnalyticsResult {
    #[serde(default)]
    pub context: Option<AnalyticsContext>,
    pub overview: SchoolOverview,
    pub class_ranking: Vec<ClassAnalytics>,
    pub top_students: Vec<StudentAnalytics>,
    pub critical_students: Vec<StudentAnalytics>,
    pub student_predictions: Vec<StudentPrediction>,
    pub prediction_summary: PredictionSummary,
    pub subject_analytics: Vec<SubjectAnalytics>,
    pub area_analytics: Vec<AreaAnalytics>,
    pub best_subjects: Vec<SubjectAnalytics>,
    pub worst_subjects: Vec<SubjectAnalytics>,
    pub behavioral_analytics: BehavioralAnalytics,
    pub insights: Vec<Insight>,
    pub categorized_insights: CategorizedInsights,
    pub comparison_data: Vec<ClassAnalytics>,
    pub cohort_analytics: Vec<CohortAnalytics>,
}

impl SchoolAnalyticsResult {
    /// The designated result for "no data": no context, zero rows, zero counts.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A result read back from storage is only trusted when it carries a context.
    pub fn has_valid_context(&self) -> bool {
        self.context
            .as_ref()
            .map(|c| !c.filter_key.is_empty())
            .unwrap_or(false)
    }
}
