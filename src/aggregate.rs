//! Aggregator/Grouper for grade sheets: groups enriched grade records by
//! (year level, course code, section) and derives the flags the release
//! screens key off. Pure; all rows and lookup maps come in by argument.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::fetch::{CourseRow, GradeRow, StudentRow};
use crate::resolve::{AssignmentIndex, UNKNOWN};

/// Normalized year level. Free-text inputs ("3rd Year", "2") are reduced
/// to their leading digit; anything else lands in the Unknown bucket,
/// which sorts after every numeric year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum YearLevel {
    Year(u8),
    Unknown,
}

impl YearLevel {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return YearLevel::Unknown;
        };
        match raw.trim().chars().next().and_then(|c| c.to_digit(10)) {
            Some(d) => YearLevel::Year(d as u8),
            None => YearLevel::Unknown,
        }
    }

    /// Digit form used for composite teacher-assignment keys.
    pub fn as_key(&self) -> Option<String> {
        match self {
            YearLevel::Year(n) => Some(n.to_string()),
            YearLevel::Unknown => None,
        }
    }
}

impl fmt::Display for YearLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearLevel::Year(n) => write!(f, "{}", n),
            YearLevel::Unknown => f.write_str(UNKNOWN),
        }
    }
}

/// Composite grouping key with structural equality. Field order drives
/// the derived sort: year level ascending (Unknown last), then course
/// code, then section.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub year_level: YearLevel,
    pub course_code: String,
    pub section: String,
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Mean of whichever components are present, rounded to two decimals.
/// All three absent means there is no average, never zero.
pub fn general_average(
    prelim: Option<f64>,
    midterm: Option<f64>,
    finals: Option<f64>,
) -> Option<f64> {
    let present: Vec<f64> = [prelim, midterm, finals].into_iter().flatten().collect();
    if present.is_empty() {
        return None;
    }
    Some(round2(present.iter().sum::<f64>() / present.len() as f64))
}

pub fn is_complete(g: &GradeRow) -> bool {
    g.prelim_grade.is_some() && g.midterm_grade.is_some() && g.final_grade.is_some()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetMember {
    pub grade_id: String,
    pub student_id: String,
    pub student_no: String,
    pub student_name: String,
    pub prelim_grade: Option<f64>,
    pub midterm_grade: Option<f64>,
    pub final_grade: Option<f64>,
    pub general_average: Option<f64>,
    pub is_released: bool,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSheet {
    pub year_level: String,
    pub course_code: String,
    pub course_name: String,
    pub section: String,
    pub teacher: String,
    pub teacher_tier: &'static str,
    pub member_count: usize,
    pub has_incomplete: bool,
    pub all_released: bool,
    pub members: Vec<SheetMember>,
}

/// Group one fetch cycle's grades into sheets. Deterministic: the same
/// input always yields the same membership and order. Empty input yields
/// an empty list.
pub fn group_grade_sheets(
    grades: &[GradeRow],
    students: &HashMap<&str, &StudentRow>,
    courses: &HashMap<&str, &CourseRow>,
    assignments: &AssignmentIndex<'_>,
) -> Vec<GradeSheet> {
    // BTreeMap over the value-typed key gives the required group order.
    let mut buckets: BTreeMap<GroupKey, (String, Vec<SheetMember>)> = BTreeMap::new();

    for g in grades {
        let student = students.get(g.student_id.as_str()).copied();

        let year_raw = g
            .year_level
            .as_deref()
            .or_else(|| student.and_then(|s| s.year_level.as_deref()));
        let section = g
            .section
            .as_deref()
            .or_else(|| student.and_then(|s| s.section.as_deref()))
            .unwrap_or(UNKNOWN)
            .to_string();

        let (course_code, course_name) = match courses.get(g.subject_id.as_str()) {
            Some(c) => (c.code.clone(), c.name.clone()),
            None => (UNKNOWN.to_string(), UNKNOWN.to_string()),
        };

        let key = GroupKey {
            year_level: YearLevel::parse(year_raw),
            course_code,
            section,
        };

        let member = SheetMember {
            grade_id: g.id.clone(),
            student_id: g.student_id.clone(),
            student_no: student
                .map(|s| s.student_no.clone())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            student_name: student
                .map(|s| s.full_name.clone())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            prelim_grade: g.prelim_grade,
            midterm_grade: g.midterm_grade,
            final_grade: g.final_grade,
            general_average: general_average(g.prelim_grade, g.midterm_grade, g.final_grade),
            is_released: g.is_released,
            is_complete: is_complete(g),
        };

        let bucket = buckets
            .entry(key)
            .or_insert_with(|| (g.subject_id.clone(), Vec::new()));
        // Distinct course rows can share a code/section/year; labelling
        // from the smallest subject id keeps the sheet independent of
        // input order.
        if g.subject_id < bucket.0 {
            bucket.0 = g.subject_id.clone();
        }
        bucket.1.push(member);
    }

    buckets
        .into_iter()
        .map(|(key, (subject_id, mut members))| {
            members.sort_by(|a, b| {
                a.student_name
                    .cmp(&b.student_name)
                    .then_with(|| a.grade_id.cmp(&b.grade_id))
            });

            let year_key = key.year_level.as_key();
            let teacher = assignments.resolve(
                &subject_id,
                Some(key.section.as_str()).filter(|s| *s != UNKNOWN),
                year_key.as_deref(),
            );

            let course_name = courses
                .get(subject_id.as_str())
                .map(|c| c.name.clone())
                .unwrap_or_else(|| UNKNOWN.to_string());

            GradeSheet {
                year_level: key.year_level.to_string(),
                course_code: key.course_code,
                course_name,
                section: key.section,
                teacher: teacher.label().to_string(),
                teacher_tier: teacher.tier(),
                member_count: members.len(),
                has_incomplete: members.iter().any(|m| !m.is_complete),
                all_released: members.iter().all(|m| m.is_released),
                members,
            }
        })
        .collect()
}
