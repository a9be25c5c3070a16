//! Cross-Reference Resolver: short-lived lookup maps built from one fetch
//! cycle's rows and passed by argument through the aggregation pipeline.
//! A foreign key with no match never aborts rendering; it resolves to a
//! sentinel label instead.

use std::collections::HashMap;

use log::warn;

use crate::fetch::{CourseRow, ProgramRow, StudentRow, TeacherAssignmentRow};

pub const UNKNOWN: &str = "Unknown";
pub const NOT_ASSIGNED: &str = "Not Assigned";

pub fn index_programs(programs: &[ProgramRow]) -> HashMap<&str, &ProgramRow> {
    programs.iter().map(|p| (p.id.as_str(), p)).collect()
}

pub fn index_courses(courses: &[CourseRow]) -> HashMap<&str, &CourseRow> {
    courses.iter().map(|c| (c.id.as_str(), c)).collect()
}

pub fn index_students(students: &[StudentRow]) -> HashMap<&str, &StudentRow> {
    students.iter().map(|s| (s.id.as_str(), s)).collect()
}

/// Chained lookup: student -> program_id -> program row. Either hop can
/// miss (null reference, deleted program, fetch race); both miss cases
/// yield the sentinel.
pub fn program_label(
    student: &StudentRow,
    programs: &HashMap<&str, &ProgramRow>,
) -> (String, String) {
    match student
        .program_id
        .as_deref()
        .and_then(|pid| programs.get(pid))
    {
        Some(p) => (p.code.clone(), p.name.clone()),
        None => (UNKNOWN.to_string(), UNKNOWN.to_string()),
    }
}

/// How a grade group's instructor label was obtained. Each tier is an
/// explicit case so callers can tell a composite-key hit from a
/// degraded match.
#[derive(Debug, Clone, Copy)]
pub enum TeacherResolution<'a> {
    /// Assignment matched on (subject, section, year level).
    Assigned(&'a TeacherAssignmentRow),
    /// No composite match; an assignment for the subject alone was used.
    SubjectFallback(&'a TeacherAssignmentRow),
    NotAssigned,
}

impl<'a> TeacherResolution<'a> {
    pub fn label(&self) -> &str {
        match self {
            TeacherResolution::Assigned(a) | TeacherResolution::SubjectFallback(a) => {
                a.teacher_name.as_str()
            }
            TeacherResolution::NotAssigned => NOT_ASSIGNED,
        }
    }

    pub fn tier(&self) -> &'static str {
        match self {
            TeacherResolution::Assigned(_) => "assigned",
            TeacherResolution::SubjectFallback(_) => "subjectFallback",
            TeacherResolution::NotAssigned => "notAssigned",
        }
    }
}

/// Composite and subject-only indexes over one fetch cycle's teacher
/// assignments. The first row wins on key collisions so resolution is
/// deterministic for a given fetch order.
pub struct AssignmentIndex<'a> {
    by_triple: HashMap<(&'a str, &'a str, &'a str), &'a TeacherAssignmentRow>,
    by_subject: HashMap<&'a str, &'a TeacherAssignmentRow>,
}

impl<'a> AssignmentIndex<'a> {
    pub fn build(assignments: &'a [TeacherAssignmentRow]) -> Self {
        let mut by_triple = HashMap::new();
        let mut by_subject = HashMap::new();
        for a in assignments {
            if let (Some(section), Some(year)) = (a.section.as_deref(), a.year_level.as_deref()) {
                by_triple
                    .entry((a.subject_id.as_str(), section, year))
                    .or_insert(a);
            }
            by_subject.entry(a.subject_id.as_str()).or_insert(a);
        }
        Self {
            by_triple,
            by_subject,
        }
    }

    pub fn resolve(
        &self,
        subject_id: &str,
        section: Option<&str>,
        year_level: Option<&str>,
    ) -> TeacherResolution<'a> {
        if let (Some(section), Some(year)) = (section, year_level) {
            if let Some(a) = self.by_triple.get(&(subject_id, section, year)) {
                return TeacherResolution::Assigned(a);
            }
        }
        if let Some(a) = self.by_subject.get(subject_id) {
            warn!(
                "teacher lookup fell back to subject-only match: subject={} section={:?} year={:?}",
                subject_id, section, year_level
            );
            return TeacherResolution::SubjectFallback(a);
        }
        warn!("no teacher assignment for subject={}", subject_id);
        TeacherResolution::NotAssigned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(id: &str, teacher: &str, subject: &str, section: Option<&str>, year: Option<&str>) -> TeacherAssignmentRow {
        TeacherAssignmentRow {
            id: id.to_string(),
            teacher_name: teacher.to_string(),
            subject_id: subject.to_string(),
            section: section.map(|s| s.to_string()),
            year_level: year.map(|s| s.to_string()),
            academic_period: None,
        }
    }

    #[test]
    fn composite_match_wins_over_subject_match() {
        let rows = vec![
            assignment("a1", "Cruz", "subj-1", Some("A"), Some("3")),
            assignment("a2", "Reyes", "subj-1", Some("B"), Some("3")),
        ];
        let idx = AssignmentIndex::build(&rows);
        let got = idx.resolve("subj-1", Some("B"), Some("3"));
        assert!(matches!(got, TeacherResolution::Assigned(a) if a.teacher_name == "Reyes"));
        assert_eq!(got.label(), "Reyes");
    }

    #[test]
    fn falls_back_to_subject_then_sentinel() {
        let rows = vec![assignment("a1", "Cruz", "subj-1", Some("A"), Some("3"))];
        let idx = AssignmentIndex::build(&rows);

        let degraded = idx.resolve("subj-1", Some("Z"), Some("4"));
        assert!(matches!(degraded, TeacherResolution::SubjectFallback(_)));
        assert_eq!(degraded.label(), "Cruz");

        let missing = idx.resolve("subj-9", Some("A"), Some("3"));
        assert!(matches!(missing, TeacherResolution::NotAssigned));
        assert_eq!(missing.label(), NOT_ASSIGNED);
    }

    #[test]
    fn program_lookup_misses_yield_sentinel() {
        let student = StudentRow {
            id: "s1".to_string(),
            student_no: "2024-0001".to_string(),
            full_name: "Ana Santos".to_string(),
            email: None,
            year_level: None,
            section: None,
            program_id: Some("gone".to_string()),
            status: "enrolled".to_string(),
            student_type: None,
        };
        let programs = HashMap::new();
        let (code, name) = program_label(&student, &programs);
        assert_eq!(code, UNKNOWN);
        assert_eq!(name, UNKNOWN);
    }
}
