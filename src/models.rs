use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One meeting time for a section. `is_arranged` implies both times are None.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingTime {
    pub days: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub is_arranged: bool,
}

impl MeetingTime {
    pub fn scheduled(days: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        MeetingTime {
            days: days.into(),
            start_time: Some(start.into()),
            end_time: Some(end.into()),
            is_arranged: false,
        }
    }

    /// Arranged entry ("ARR", "TBA", "ASYNC"): no fixed times.
    pub fn arranged(days: impl Into<String>) -> Self {
        MeetingTime {
            days: days.into(),
            start_time: None,
            end_time: None,
            is_arranged: true,
        }
    }
}

impl fmt::Display for MeetingTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.start_time, &self.end_time) {
            (Some(start), Some(end)) => write!(f, "{} {start}-{end}", self.days),
            _ => write!(f, "{}", self.days),
        }
    }
}

/// Seat counts as published. No cross-field invariant: overenrollment
/// (actual > capacity) is a legitimate, observable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub capacity: u32,
    pub actual: u32,
    pub remaining: u32,
}

/// One course section, built exactly once from one data row plus the header
/// context that preceded it. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub crn: String,
    pub subject: String,
    pub course_number: String,
    pub title: String,
    pub units: f64,
    pub instructor: String,
    pub instructor_email: Option<String>,
    pub meeting_times: Vec<MeetingTime>,
    pub location: String,
    pub enrollment: Enrollment,
    pub status: String,
    pub section_type: String,
    pub zero_textbook_cost: bool,
    pub delivery_method: String,
    pub weeks: u32,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Free text from a merged meeting-time cell ("arr in addition to ...").
    pub additional_hours: Option<String>,
    pub book_link: Option<String>,
}

/// Immutable snapshot of one parse pass over one schedule page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleData {
    pub term: String,
    pub term_code: String,
    pub collection_timestamp: DateTime<Utc>,
    pub source_url: String,
    pub courses: Vec<Course>,
    pub total_courses: usize,
    pub departments: Vec<String>,
}

impl ScheduleData {
    /// Build a snapshot, computing the derived fields from `courses`.
    pub fn new(
        term: impl Into<String>,
        term_code: impl Into<String>,
        collection_timestamp: DateTime<Utc>,
        source_url: impl Into<String>,
        courses: Vec<Course>,
    ) -> Self {
        let mut departments: Vec<String> = courses.iter().map(|c| c.subject.clone()).collect();
        departments.sort();
        departments.dedup();
        ScheduleData {
            term: term.into(),
            term_code: term_code.into(),
            collection_timestamp,
            source_url: source_url.into(),
            total_courses: courses.len(),
            departments,
            courses,
        }
    }
}

/// Metadata about one collection run, appended to a rolling log by storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub courses_collected: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub success: bool,
}

// ── Tests ──
