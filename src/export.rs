use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::models::{Course, ScheduleData};

const CSV_HEADERS: &[&str] = &[
    "CRN",
    "Subject",
    "Course Number",
    "Title",
    "Units",
    "Instructor",
    "Email",
    "Meeting Times",
    "Location",
    "Capacity",
    "Enrolled",
    "Available",
    "Status",
    "Type",
    "ZTC",
    "Delivery Method",
    "Weeks",
    "Start Date",
    "End Date",
];

fn csv_record(course: &Course) -> Vec<String> {
    let meeting_times = course
        .meeting_times
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ");
    vec![
        course.crn.clone(),
        course.subject.clone(),
        course.course_number.clone(),
        course.title.clone(),
        format!("{:.2}", course.units),
        course.instructor.clone(),
        course.instructor_email.clone().unwrap_or_default(),
        meeting_times,
        course.location.clone(),
        course.enrollment.capacity.to_string(),
        course.enrollment.actual.to_string(),
        course.enrollment.remaining.to_string(),
        course.status.clone(),
        course.section_type.clone(),
        if course.zero_textbook_cost { "Yes" } else { "No" }.to_string(),
        course.delivery_method.clone(),
        course.weeks.to_string(),
        course.start_date.clone().unwrap_or_default(),
        course.end_date.clone().unwrap_or_default(),
    ]
}

pub fn write_csv<W: Write>(schedule: &ScheduleData, writer: W) -> Result<()> {
    let mut w = csv::Writer::from_writer(writer);
    w.write_record(CSV_HEADERS)?;
    for course in &schedule.courses {
        w.write_record(csv_record(course))?;
    }
    w.flush()?;
    Ok(())
}

pub fn export_csv(schedule: &ScheduleData, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_csv(schedule, file)?;
    info!("exported {} courses to {}", schedule.total_courses, path.display());
    Ok(())
}

/// Full snapshot as pretty JSON, same shape as the stored files.
pub fn export_json(schedule: &ScheduleData, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(schedule)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("exported {} courses to {}", schedule.total_courses, path.display());
    Ok(())
}

// ── Tests ──
