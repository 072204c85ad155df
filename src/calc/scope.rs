use crate::model::{
    parse_date, quarter_index, AnalyticsFilters, AttendanceRecord, Grade, Incident, SchoolClass,
    Student,
};
use chrono::{Months, NaiveDate};
use std::collections::{HashMap, HashSet};

/// Borrowed view over the five record collections.
#[derive(Debug, Clone, Copy)]
pub struct Records<'a> {
    pub students: &'a [Student],
    pub classes: &'a [SchoolClass],
    pub grades: &'a [Grade],
    pub attendance: &'a [AttendanceRecord],
    pub incidents: &'a [Incident],
}

/// Which quarters a selection admits, as inclusive indexes into `QUARTERS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuarterWindow {
    All,
    Range(usize, usize),
    Nothing,
}

impl QuarterWindow {
    pub fn from_filters(filters: &AnalyticsFilters) -> Self {
        if filters.use_quarter_range {
            let start = match filters.quarter_range_start.as_deref() {
                None | Some("") | Some("all") => Some(0),
                Some(q) => quarter_index(q),
            };
            let end = match filters.quarter_range_end.as_deref() {
                None | Some("") | Some("all") => Some(3),
                Some(q) => quarter_index(q),
            };
            return match (start, end) {
                (Some(s), Some(e)) if s <= e => QuarterWindow::Range(s, e),
                _ => QuarterWindow::Nothing,
            };
        }
        if filters.quarter == "all" {
            return QuarterWindow::All;
        }
        match quarter_index(&filters.quarter) {
            Some(i) => QuarterWindow::Range(i, i),
            None => QuarterWindow::Nothing,
        }
    }

    pub fn contains(self, quarter: &str) -> bool {
        match self {
            QuarterWindow::All => true,
            QuarterWindow::Nothing => false,
            QuarterWindow::Range(s, e) => quarter_index(quarter)
                .map(|i| i >= s && i <= e)
                .unwrap_or(false),
        }
    }

    /// Last quarter index the selection reaches.
    pub fn last(self) -> Option<usize> {
        match self {
            QuarterWindow::All => Some(3),
            QuarterWindow::Range(_, e) => Some(e),
            QuarterWindow::Nothing => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    Unbounded,
    /// `[start, end)`
    Between(NaiveDate, NaiveDate),
    Nothing,
}

impl DateWindow {
    pub fn contains(self, date: &str) -> bool {
        match self {
            DateWindow::Unbounded => true,
            DateWindow::Nothing => false,
            DateWindow::Between(start, end) => parse_date(date)
                .map(|d| d >= start && d < end)
                .unwrap_or(false),
        }
    }
}

/// Everything the active filter admits. Constraints are intersected; a selection nothing can
/// satisfy simply yields empty collections.
#[derive(Debug)]
pub struct Scope<'a> {
    pub filters: &'a AnalyticsFilters,
    pub target_year: Option<u8>,
    pub quarters: QuarterWindow,
    subjects: HashSet<&'a str>,
    /// Classes passing the archive, series, id and calendar-year constraints.
    pub classes: Vec<&'a SchoolClass>,
    pub class_ids: HashSet<&'a str>,
    /// Calendar year each class is in for the selected school year.
    pub calendar_years: HashMap<&'a str, i32>,
    /// Active students of the in-scope classes.
    pub students: Vec<&'a Student>,
    /// In-scope grades ignoring the quarter selection (trend and growth look across quarters).
    pub year_grades: Vec<&'a Grade>,
    pub grades: Vec<&'a Grade>,
    pub attendance: Vec<&'a AttendanceRecord>,
    pub incidents: Vec<&'a Incident>,
}

impl<'a> Scope<'a> {
    pub fn resolve(records: Records<'a>, filters: &'a AnalyticsFilters) -> Self {
        let (target_year, year_supported) = match filters.school_year.year() {
            None => (None, true),
            Some(y) if (1..=3).contains(&y) => (Some(y as u8), true),
            Some(_) => (None, false),
        };
        let quarters = QuarterWindow::from_filters(filters);
        let subjects = filters.subjects.iter().map(|s| s.as_str()).collect();

        let mut scope = Scope {
            filters,
            target_year,
            quarters,
            subjects,
            classes: Vec::new(),
            class_ids: HashSet::new(),
            calendar_years: HashMap::new(),
            students: Vec::new(),
            year_grades: Vec::new(),
            grades: Vec::new(),
            attendance: Vec::new(),
            incidents: Vec::new(),
        };
        if !year_supported {
            return scope;
        }

        for cls in records.classes {
            if !scope.class_eligible(cls) {
                continue;
            }
            if !filters.series.is_empty()
                && !filters.series.iter().any(|s| cls.series.contains(s.as_str()))
            {
                continue;
            }
            if !filters.class_ids.is_empty() && !filters.class_ids.contains(&cls.id) {
                continue;
            }
            let calendar_year = target_year.and_then(|y| class_calendar_year(cls, y));
            if let (Some(_), Some(wanted)) = (target_year, filters.calendar_year.year()) {
                if calendar_year != Some(wanted) {
                    continue;
                }
            }
            if let Some(cy) = calendar_year {
                scope.calendar_years.insert(cls.id.as_str(), cy);
            }
            scope.classes.push(cls);
            scope.class_ids.insert(cls.id.as_str());
        }

        scope.students = records
            .students
            .iter()
            .filter(|s| s.is_active() && scope.class_ids.contains(s.class_id.as_str()))
            .collect();

        for g in records.grades {
            if !scope.class_ids.contains(g.class_id.as_str())
                || !scope.grade_in_year(g, target_year)
            {
                continue;
            }
            scope.year_grades.push(g);
            if quarters.contains(&g.quarter) {
                scope.grades.push(g);
            }
        }

        let windows: HashMap<&'a str, DateWindow> = scope
            .classes
            .iter()
            .map(|&c| (c.id.as_str(), scope.window_for(c, target_year)))
            .collect();
        scope.attendance = records
            .attendance
            .iter()
            .filter(|a| {
                windows
                    .get(a.class_id.as_str())
                    .map(|w| w.contains(&a.date))
                    .unwrap_or(false)
            })
            .collect();
        scope.incidents = records
            .incidents
            .iter()
            .filter(|i| {
                windows
                    .get(i.class_id.as_str())
                    .map(|w| w.contains(&i.date))
                    .unwrap_or(false)
            })
            .collect();

        scope
    }

    pub fn class_eligible(&self, cls: &SchoolClass) -> bool {
        self.filters.include_archived || !cls.archived
    }

    /// Subject and school-year constraints; quarters are not considered.
    pub fn grade_in_year(&self, g: &Grade, year: Option<u8>) -> bool {
        if !self.subjects.is_empty() && !self.subjects.contains(g.subject.as_str()) {
            return false;
        }
        year.map(|y| g.school_year() == y).unwrap_or(true)
    }

    pub fn grade_matches(&self, g: &Grade, year: Option<u8>) -> bool {
        self.grade_in_year(g, year) && self.quarters.contains(&g.quarter)
    }

    /// Date window for attendance and incidents of `cls` during school year `year`.
    pub fn window_for(&self, cls: &SchoolClass, year: Option<u8>) -> DateWindow {
        let Some(year) = year else {
            return DateWindow::Unbounded;
        };
        let Some(start) = cls.start_date() else {
            return DateWindow::Unbounded;
        };
        let (from, to) = match self.quarters {
            QuarterWindow::Nothing => return DateWindow::Nothing,
            QuarterWindow::All => (0, 8),
            QuarterWindow::Range(s, e) => (s as u32 * 2, e as u32 * 2 + 2),
        };
        let year_start = start.checked_add_months(Months::new(12 * (year as u32 - 1)));
        let bounds = year_start.and_then(|ys| {
            Some((
                ys.checked_add_months(Months::new(from))?,
                ys.checked_add_months(Months::new(to))?,
            ))
        });
        match bounds {
            Some((a, b)) => DateWindow::Between(a, b),
            None => DateWindow::Nothing,
        }
    }
}

pub fn class_calendar_year(cls: &SchoolClass, school_year: u8) -> Option<i32> {
    cls.start_calendar_year()
        .map(|start| start + school_year as i32 - 1)
}
