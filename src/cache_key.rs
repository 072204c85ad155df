use crate::model::AnalyticsFilters;

/// Bump whenever the shape of `SchoolAnalyticsResult` changes; every persisted entry written
/// under an older tag becomes unreachable and ages out.
pub const CACHE_FORMAT_VERSION: &str = "4";

/// `analytics::<version>::<signature>::<filter fields...>`
pub fn cache_key(signature: &str, filters: &AnalyticsFilters) -> String {
    format!(
        "analytics::{}::{}::{}",
        CACHE_FORMAT_VERSION,
        signature,
        filter_key(filters)
    )
}

/// Key used by the background worker for its in-memory results: the data version stands in for
/// the signature because the worker's cache is wiped whenever the data changes.
pub fn worker_key(data_version: u64, filters: &AnalyticsFilters) -> String {
    format!("{}::{}", data_version, filter_key(filters))
}

/// Filter fields in their fixed order, list-valued fields sorted.
pub fn filter_key(filters: &AnalyticsFilters) -> String {
    let filters = filters.normalized();
    [
        filters.series.join("|"),
        filters.class_ids.join("|"),
        filters.subjects.join("|"),
        filters.comparison_class_ids.join("|"),
        filters.comparison_mode.as_str().to_string(),
        filters
            .comparison_course_year
            .map(|y| y.to_string())
            .unwrap_or_default(),
        filters.quarter.clone(),
        if filters.use_quarter_range {
            "range"
        } else {
            "single"
        }
        .to_string(),
        filters.quarter_range_start.clone().unwrap_or_default(),
        filters.quarter_range_end.clone().unwrap_or_default(),
        filters.school_year.to_string(),
        filters.calendar_year.to_string(),
        if filters.include_archived { "1" } else { "0" }.to_string(),
    ]
    .join("::")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComparisonMode, YearSelector};

    #[test]
    fn list_order_does_not_change_key() {
        let a = AnalyticsFilters {
            series: vec!["3º".into(), "1º".into()],
            class_ids: vec!["c2".into(), "c1".into()],
            subjects: vec!["Física".into(), "Arte".into()],
            comparison_class_ids: vec!["c9".into(), "c3".into()],
            ..AnalyticsFilters::default()
        };
        let mut b = a.clone();
        b.series.reverse();
        b.class_ids.reverse();
        b.subjects.reverse();
        b.comparison_class_ids.reverse();
        assert_eq!(cache_key("sig", &a), cache_key("sig", &b));
    }

    #[test]
    fn key_layout_is_fixed() {
        let f = AnalyticsFilters {
            series: vec!["2º".into(), "1º".into()],
            quarter: "2º Bimestre".into(),
            school_year: YearSelector::Only(2),
            calendar_year: YearSelector::Only(2025),
            include_archived: true,
            comparison_mode: ComparisonMode::CourseYear,
            comparison_course_year: Some(1),
            ..AnalyticsFilters::default()
        };
        assert_eq!(
            cache_key("SIG", &f),
            "analytics::4::SIG::1º|2º::::::::courseYear::1::2º Bimestre::single::::::2::2025::1"
        );
    }

    #[test]
    fn distinct_selections_get_distinct_keys() {
        let a = AnalyticsFilters::default();
        let b = AnalyticsFilters {
            school_year: YearSelector::Only(1),
            ..AnalyticsFilters::default()
        };
        assert_ne!(cache_key("sig", &a), cache_key("sig", &b));
        assert_ne!(cache_key("sig-a", &a), cache_key("sig-b", &a));
        assert_ne!(worker_key(1, &a), worker_key(2, &a));
    }
}
