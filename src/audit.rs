use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::ScheduleData;

/// Data-quality findings for one snapshot. Issues point at records that are
/// structurally suspect; warnings flag states that are legitimate but worth
/// a look (overenrollment, placeholder instructors).
#[derive(Debug, Default, Serialize)]
pub struct AuditReport {
    pub issues: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

#[derive(Debug, Serialize)]
pub struct Finding {
    pub crn: String,
    pub message: String,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.warnings.is_empty()
    }

    fn issue(&mut self, crn: &str, message: impl Into<String>) {
        self.issues.push(Finding { crn: crn.to_string(), message: message.into() });
    }

    fn warn(&mut self, crn: &str, message: impl Into<String>) {
        self.warnings.push(Finding { crn: crn.to_string(), message: message.into() });
    }
}

pub fn audit(schedule: &ScheduleData) -> AuditReport {
    let mut report = AuditReport::default();

    let mut crn_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for course in &schedule.courses {
        *crn_counts.entry(course.crn.as_str()).or_default() += 1;
    }
    for (crn, count) in &crn_counts {
        if *count > 1 {
            report.issue(crn, format!("CRN appears {count} times"));
        }
    }

    for course in &schedule.courses {
        let crn = &course.crn;

        if course.crn.is_empty() {
            report.issue(crn, "missing CRN");
        }
        if course.subject == "UNKNOWN" {
            report.issue(crn, "no subject header preceded this section");
        }
        if course.title == "Unknown Course" || course.title.is_empty() {
            report.issue(crn, "missing course title");
        }
        if course.meeting_times.is_empty() {
            report.issue(crn, "no meeting times");
        }

        if course.enrollment.capacity == 0 {
            report.warn(crn, "zero capacity");
        }
        if course.enrollment.actual > course.enrollment.capacity {
            report.warn(
                crn,
                format!(
                    "overenrolled: {} of {}",
                    course.enrollment.actual, course.enrollment.capacity
                ),
            );
        }
        if course.instructor == "TBA" {
            report.warn(crn, "instructor TBA");
        }
        if !course.meeting_times.is_empty() && course.meeting_times.iter().all(|m| m.is_arranged) {
            report.warn(crn, "no fixed meeting times");
        }
        if course.units == 0.0 {
            report.warn(crn, "zero units");
        }
    }

    report
}

// ── Tests ──
