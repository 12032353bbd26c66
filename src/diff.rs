use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{Course, Enrollment, ScheduleData};

/// CRN-keyed comparison of two snapshots of the same term.
#[derive(Debug, Default, Serialize)]
pub struct ScheduleDiff {
    pub added: Vec<SectionRef>,
    pub removed: Vec<SectionRef>,
    pub enrollment_changes: Vec<EnrollmentChange>,
    pub instructor_changes: Vec<FieldChange>,
    pub location_changes: Vec<FieldChange>,
    pub time_changes: Vec<FieldChange>,
}

#[derive(Debug, Serialize)]
pub struct SectionRef {
    pub crn: String,
    pub subject: String,
    pub course_number: String,
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct FieldChange {
    pub crn: String,
    pub title: String,
    pub before: String,
    pub after: String,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentChange {
    pub crn: String,
    pub title: String,
    pub before: Enrollment,
    pub after: Enrollment,
}

impl ScheduleDiff {
    pub fn is_empty(&self) -> bool {
        self.total_changes() == 0
    }

    pub fn total_changes(&self) -> usize {
        self.added.len()
            + self.removed.len()
            + self.enrollment_changes.len()
            + self.instructor_changes.len()
            + self.location_changes.len()
            + self.time_changes.len()
    }
}

fn section_ref(c: &Course) -> SectionRef {
    SectionRef {
        crn: c.crn.clone(),
        subject: c.subject.clone(),
        course_number: c.course_number.clone(),
        title: c.title.clone(),
    }
}

fn meeting_summary(c: &Course) -> String {
    c.meeting_times
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Compare two snapshots by CRN. Output order is CRN order throughout, so
/// diffs of the same pair of snapshots are stable.
pub fn diff(old: &ScheduleData, new: &ScheduleData) -> ScheduleDiff {
    let old_by_crn: BTreeMap<&str, &Course> =
        old.courses.iter().map(|c| (c.crn.as_str(), c)).collect();
    let new_by_crn: BTreeMap<&str, &Course> =
        new.courses.iter().map(|c| (c.crn.as_str(), c)).collect();

    let mut out = ScheduleDiff::default();

    for (crn, &course) in &new_by_crn {
        if !old_by_crn.contains_key(crn) {
            out.added.push(section_ref(course));
        }
    }
    for (crn, &course) in &old_by_crn {
        if !new_by_crn.contains_key(crn) {
            out.removed.push(section_ref(course));
        }
    }

    for (crn, before) in &old_by_crn {
        let Some(&after) = new_by_crn.get(crn) else { continue };
        let before = *before;

        if before.enrollment != after.enrollment {
            out.enrollment_changes.push(EnrollmentChange {
                crn: before.crn.clone(),
                title: before.title.clone(),
                before: before.enrollment,
                after: after.enrollment,
            });
        }
        if before.instructor != after.instructor {
            out.instructor_changes.push(FieldChange {
                crn: before.crn.clone(),
                title: before.title.clone(),
                before: before.instructor.clone(),
                after: after.instructor.clone(),
            });
        }
        if before.location != after.location {
            out.location_changes.push(FieldChange {
                crn: before.crn.clone(),
                title: before.title.clone(),
                before: before.location.clone(),
                after: after.location.clone(),
            });
        }
        if before.meeting_times != after.meeting_times {
            out.time_changes.push(FieldChange {
                crn: before.crn.clone(),
                title: before.title.clone(),
                before: meeting_summary(before),
                after: meeting_summary(after),
            });
        }
    }

    out
}

// ── Tests ──
