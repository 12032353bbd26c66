use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::ScheduleData;

/// Aggregates over a run of snapshots, newest first (the order
/// `Storage::list_schedules` returns them in).
#[derive(Debug, Serialize)]
pub struct TrendReport {
    pub snapshots: usize,
    pub avg_courses: f64,
    pub min_courses: usize,
    pub max_courses: usize,
    /// Department and the number of snapshots it appeared in, most first.
    pub department_appearances: Vec<(String, usize)>,
    /// Courses per instructor in the newest snapshot, "TBA" excluded.
    pub instructor_counts: Vec<(String, usize)>,
    /// Enrollment movement per CRN between its oldest and newest appearance,
    /// largest absolute change first. Unchanged CRNs are omitted.
    pub enrollment_trends: Vec<EnrollmentTrend>,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentTrend {
    pub crn: String,
    pub subject: String,
    pub course_number: String,
    pub first: u32,
    pub last: u32,
    pub change: i64,
}

/// Summarize a window of snapshots. `None` when the window is empty.
pub fn summarize(snapshots: &[ScheduleData]) -> Option<TrendReport> {
    let newest = snapshots.first()?;

    let counts: Vec<usize> = snapshots.iter().map(|s| s.total_courses).collect();
    let avg_courses = counts.iter().sum::<usize>() as f64 / counts.len() as f64;

    let mut departments: BTreeMap<&str, usize> = BTreeMap::new();
    for s in snapshots {
        for d in &s.departments {
            *departments.entry(d).or_default() += 1;
        }
    }
    let mut department_appearances: Vec<(String, usize)> =
        departments.into_iter().map(|(d, n)| (d.to_string(), n)).collect();
    department_appearances.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut instructors: BTreeMap<&str, usize> = BTreeMap::new();
    for c in &newest.courses {
        if c.instructor != "TBA" {
            *instructors.entry(&c.instructor).or_default() += 1;
        }
    }
    let mut instructor_counts: Vec<(String, usize)> =
        instructors.into_iter().map(|(i, n)| (i.to_string(), n)).collect();
    instructor_counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    // Input is newest first, so each CRN's series starts at its most recent
    // count and ends at its oldest.
    let mut series: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
    for s in snapshots {
        for c in &s.courses {
            series.entry(&c.crn).or_default().push(c.enrollment.actual);
        }
    }
    let mut enrollment_trends = Vec::new();
    for (crn, actuals) in series {
        if actuals.len() < 2 {
            continue;
        }
        let last = actuals[0];
        let first = actuals[actuals.len() - 1];
        let change = i64::from(last) - i64::from(first);
        if change == 0 {
            continue;
        }
        if let Some(course) = snapshots.iter().flat_map(|s| &s.courses).find(|c| c.crn == crn) {
            enrollment_trends.push(EnrollmentTrend {
                crn: crn.to_string(),
                subject: course.subject.clone(),
                course_number: course.course_number.clone(),
                first,
                last,
                change,
            });
        }
    }
    enrollment_trends.sort_by(|a, b| b.change.abs().cmp(&a.change.abs()).then(a.crn.cmp(&b.crn)));

    Some(TrendReport {
        snapshots: snapshots.len(),
        avg_courses,
        min_courses: counts.iter().copied().min().unwrap_or(0),
        max_courses: counts.iter().copied().max().unwrap_or(0),
        department_appearances,
        instructor_counts,
        enrollment_trends,
    })
}

// ── Tests ──
