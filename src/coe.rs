//! Certificate-of-enrollment composer. Builds the immutable document
//! value handed to the PDF exporter, persists it append-only, and serves
//! the latest issued copy per student.

use chrono::{DateTime, Datelike, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::round2;
use crate::fetch::{CourseRow, ProgramRow, StudentRow};
use crate::resolve::UNKNOWN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicPeriod {
    pub school_year: String,
    pub semester: String,
}

/// Fixed two-season calendar: June through October is the 1st semester of
/// school year Y-(Y+1); November/December the 2nd semester of the same
/// school year; January through May the 2nd semester of the school year
/// that started the previous June.
pub fn academic_period(date: DateTime<Utc>) -> AcademicPeriod {
    let year = date.year();
    let month = date.month();
    let (start_year, semester) = match month {
        6..=10 => (year, "1st Semester"),
        11 | 12 => (year, "2nd Semester"),
        _ => (year - 1, "2nd Semester"),
    };
    AcademicPeriod {
        school_year: format!("{}-{}", start_year, start_year + 1),
        semester: semester.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoeSubject {
    pub code: String,
    pub name: String,
    pub units: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoeDocument {
    pub student_id: String,
    pub student_number: String,
    pub full_name: String,
    pub email: Option<String>,
    pub department: String,
    pub program: String,
    pub school_year: String,
    pub semester: String,
    pub year_level: String,
    pub date_issued: String,
    pub subjects: Vec<CoeSubject>,
    pub total_units: f64,
}

/// Denormalized snapshot of the student's confirmed course load. The
/// document never changes after composition; re-enrollment produces a
/// new one.
pub fn compose(
    student: &StudentRow,
    program: Option<&ProgramRow>,
    courses: &[CourseRow],
    issued_at: DateTime<Utc>,
) -> CoeDocument {
    let period = academic_period(issued_at);
    let subjects: Vec<CoeSubject> = courses
        .iter()
        .map(|c| CoeSubject {
            code: c.code.clone(),
            name: c.name.clone(),
            units: c.units,
        })
        .collect();
    let total_units = round2(subjects.iter().map(|s| s.units).sum());

    CoeDocument {
        student_id: student.id.clone(),
        student_number: student.student_no.clone(),
        full_name: student.full_name.clone(),
        email: student.email.clone(),
        department: program
            .and_then(|p| p.department.clone())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        program: program
            .map(|p| p.name.clone())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        school_year: period.school_year,
        semester: period.semester,
        year_level: student
            .year_level
            .clone()
            .unwrap_or_else(|| UNKNOWN.to_string()),
        date_issued: issued_at.to_rfc3339(),
        subjects,
        total_units,
    }
}

pub fn insert(conn: &Connection, doc: &CoeDocument) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO coe_documents(id, student_id, document, date_issued) VALUES(?, ?, ?, ?)",
        (
            &id,
            &doc.student_id,
            serde_json::to_string(doc)?,
            &doc.date_issued,
        ),
    )?;
    Ok(id)
}

/// Latest issued document for a student, by issuance timestamp.
pub fn latest_for_student(
    conn: &Connection,
    student_id: &str,
) -> anyhow::Result<Option<CoeDocument>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT document FROM coe_documents
             WHERE student_id = ? ORDER BY date_issued DESC LIMIT 1",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn student() -> StudentRow {
        StudentRow {
            id: "s1".to_string(),
            student_no: "2024-0001".to_string(),
            full_name: "Ana Santos".to_string(),
            email: Some("ana@example.edu".to_string()),
            year_level: Some("2nd Year".to_string()),
            section: Some("A".to_string()),
            program_id: Some("p1".to_string()),
            status: "enrolled".to_string(),
            student_type: None,
        }
    }

    fn course(id: &str, code: &str, name: &str, units: f64) -> CourseRow {
        CourseRow {
            id: id.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            department: None,
            units,
        }
    }

    #[test]
    fn academic_period_two_season_rule() {
        let mid = Utc.with_ymd_and_hms(2026, 7, 15, 0, 0, 0).unwrap();
        assert_eq!(
            academic_period(mid),
            AcademicPeriod {
                school_year: "2026-2027".to_string(),
                semester: "1st Semester".to_string(),
            }
        );

        let december = Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap();
        assert_eq!(
            academic_period(december),
            AcademicPeriod {
                school_year: "2026-2027".to_string(),
                semester: "2nd Semester".to_string(),
            }
        );

        let march = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(
            academic_period(march),
            AcademicPeriod {
                school_year: "2025-2026".to_string(),
                semester: "2nd Semester".to_string(),
            }
        );
    }

    #[test]
    fn total_units_is_sum_of_member_courses() {
        let courses = vec![
            course("c1", "CS101", "Intro", 3.0),
            course("c2", "CS102", "Data", 3.0),
        ];
        let issued = Utc.with_ymd_and_hms(2026, 8, 29, 0, 0, 0).unwrap();
        let doc = compose(&student(), None, &courses, issued);
        assert_eq!(doc.total_units, 6.0);
        assert_eq!(doc.subjects.len(), 2);
        assert_eq!(doc.program, "Unknown");
        assert_eq!(doc.school_year, "2026-2027");
    }

    #[test]
    fn latest_wins_over_earlier_issues() {
        let ws = std::env::temp_dir().join(format!(
            "registrard-coe-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        let conn = crate::store::open_db(&ws).expect("open");
        conn.execute(
            "INSERT INTO students(id, student_no, full_name, status) VALUES('s1', '2024-0001', 'Ana Santos', 'enrolled')",
            [],
        )
        .expect("seed student");

        let first = compose(
            &student(),
            None,
            &[course("c1", "CS101", "Intro", 3.0)],
            Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
        );
        let second = compose(
            &student(),
            None,
            &[
                course("c1", "CS101", "Intro", 3.0),
                course("c2", "CS102", "Data", 3.0),
            ],
            Utc.with_ymd_and_hms(2026, 11, 5, 0, 0, 0).unwrap(),
        );
        insert(&conn, &first).expect("insert first");
        insert(&conn, &second).expect("insert second");

        let latest = latest_for_student(&conn, "s1")
            .expect("query")
            .expect("some");
        assert_eq!(latest.total_units, 6.0);
        assert_eq!(latest.semester, "2nd Semester");

        assert!(latest_for_student(&conn, "nobody").expect("query").is_none());
    }
}
