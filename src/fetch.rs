//! Record Fetcher: one single-table query per entity against the
//! materialized registrar tables. The remote store offers no join
//! guarantee, so every cross-entity join happens in memory (see
//! `resolve`). Fetches for one screen are independent queries with no
//! shared snapshot; a failure is propagated to the caller, which halts
//! that screen's dependent fetches.

use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub id: String,
    pub student_no: String,
    pub full_name: String,
    pub email: Option<String>,
    pub year_level: Option<String>,
    pub section: Option<String>,
    pub program_id: Option<String>,
    pub status: String,
    pub student_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProgramRow {
    pub id: String,
    pub code: String,
    pub name: String,
    pub department: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CourseRow {
    pub id: String,
    pub code: String,
    pub name: String,
    pub department: Option<String>,
    pub units: f64,
}

#[derive(Debug, Clone)]
pub struct EnrollmentRow {
    pub id: String,
    pub student_id: String,
    pub course_id: String,
    pub status: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GradeRow {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub prelim_grade: Option<f64>,
    pub midterm_grade: Option<f64>,
    pub final_grade: Option<f64>,
    pub is_released: bool,
    pub graded_by: Option<String>,
    pub section: Option<String>,
    pub year_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TeacherAssignmentRow {
    pub id: String,
    pub teacher_name: String,
    pub subject_id: String,
    pub section: Option<String>,
    pub year_level: Option<String>,
    pub academic_period: Option<String>,
}

fn map_student(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: r.get(0)?,
        student_no: r.get(1)?,
        full_name: r.get(2)?,
        email: r.get(3)?,
        year_level: r.get(4)?,
        section: r.get(5)?,
        program_id: r.get(6)?,
        status: r.get(7)?,
        student_type: r.get(8)?,
    })
}

const STUDENT_COLS: &str =
    "id, student_no, full_name, email, year_level, section, program_id, status, student_type";

pub fn fetch_students(conn: &Connection, status: Option<&str>) -> anyhow::Result<Vec<StudentRow>> {
    let rows = match status {
        Some(status) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {STUDENT_COLS} FROM students WHERE status = ? ORDER BY full_name"
            ))?;
            let rows = stmt
                .query_map([status], |r| map_student(r))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {STUDENT_COLS} FROM students ORDER BY full_name"
            ))?;
            let rows = stmt
                .query_map([], |r| map_student(r))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

pub fn fetch_student(conn: &Connection, id: &str) -> anyhow::Result<Option<StudentRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {STUDENT_COLS} FROM students WHERE id = ?"),
            [id],
            |r| map_student(r),
        )
        .optional()?;
    Ok(row)
}

pub fn fetch_programs(conn: &Connection) -> anyhow::Result<Vec<ProgramRow>> {
    let mut stmt = conn.prepare("SELECT id, code, name, department FROM programs ORDER BY code")?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ProgramRow {
                id: r.get(0)?,
                code: r.get(1)?,
                name: r.get(2)?,
                department: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_course(r: &rusqlite::Row<'_>) -> rusqlite::Result<CourseRow> {
    Ok(CourseRow {
        id: r.get(0)?,
        code: r.get(1)?,
        name: r.get(2)?,
        department: r.get(3)?,
        units: r.get(4)?,
    })
}

pub fn fetch_courses(conn: &Connection, department: Option<&str>) -> anyhow::Result<Vec<CourseRow>> {
    let rows = match department {
        Some(dept) => {
            let mut stmt = conn.prepare(
                "SELECT id, code, name, department, units FROM courses
                 WHERE department = ? ORDER BY code",
            )?;
            let rows = stmt
                .query_map([dept], |r| map_course(r))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn
                .prepare("SELECT id, code, name, department, units FROM courses ORDER BY code")?;
            let rows = stmt
                .query_map([], |r| map_course(r))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

pub fn fetch_courses_by_ids(conn: &Connection, ids: &[String]) -> anyhow::Result<Vec<CourseRow>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT id, code, name, department, units FROM courses WHERE id IN ({placeholders})"
    ))?;
    let params: Vec<Value> = ids.iter().map(|s| Value::from(s.clone())).collect();
    let rows = stmt
        .query_map(params_from_iter(params), |r| map_course(r))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn fetch_enrollments_for_student(
    conn: &Connection,
    student_id: &str,
    status: Option<&str>,
) -> anyhow::Result<Vec<EnrollmentRow>> {
    let map = |r: &rusqlite::Row<'_>| -> rusqlite::Result<EnrollmentRow> {
        Ok(EnrollmentRow {
            id: r.get(0)?,
            student_id: r.get(1)?,
            course_id: r.get(2)?,
            status: r.get(3)?,
            created_at: r.get(4)?,
            updated_at: r.get(5)?,
        })
    };
    let rows = match status {
        Some(status) => {
            let mut stmt = conn.prepare(
                "SELECT id, student_id, course_id, status, created_at, updated_at
                 FROM enrollments WHERE student_id = ? AND status = ?",
            )?;
            let rows = stmt
                .query_map([student_id, status], map)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, student_id, course_id, status, created_at, updated_at
                 FROM enrollments WHERE student_id = ?",
            )?;
            let rows = stmt
                .query_map([student_id], map)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

fn map_grade(r: &rusqlite::Row<'_>) -> rusqlite::Result<GradeRow> {
    let released: i64 = r.get(6)?;
    Ok(GradeRow {
        id: r.get(0)?,
        student_id: r.get(1)?,
        subject_id: r.get(2)?,
        prelim_grade: r.get(3)?,
        midterm_grade: r.get(4)?,
        final_grade: r.get(5)?,
        is_released: released != 0,
        graded_by: r.get(7)?,
        section: r.get(8)?,
        year_level: r.get(9)?,
    })
}

const GRADE_COLS: &str = "id, student_id, subject_id, prelim_grade, midterm_grade, final_grade,
     is_released, graded_by, section, year_level";

pub fn fetch_grades(conn: &Connection) -> anyhow::Result<Vec<GradeRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {GRADE_COLS} FROM grades"))?;
    let rows = stmt
        .query_map([], |r| map_grade(r))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn fetch_grades_by_ids(conn: &Connection, ids: &[String]) -> anyhow::Result<Vec<GradeRow>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {GRADE_COLS} FROM grades WHERE id IN ({placeholders})"
    ))?;
    let params: Vec<Value> = ids.iter().map(|s| Value::from(s.clone())).collect();
    let rows = stmt
        .query_map(params_from_iter(params), |r| map_grade(r))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Assignments are looked up for the subject ids a grade sheet actually
/// references, so the subject fetch inherently precedes this one.
pub fn fetch_teacher_assignments_by_subjects(
    conn: &Connection,
    subject_ids: &[String],
) -> anyhow::Result<Vec<TeacherAssignmentRow>> {
    if subject_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; subject_ids.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT id, teacher_name, subject_id, section, year_level, academic_period
         FROM teacher_assignments WHERE subject_id IN ({placeholders})"
    ))?;
    let params: Vec<Value> = subject_ids.iter().map(|s| Value::from(s.clone())).collect();
    let rows = stmt
        .query_map(params_from_iter(params), |r| {
            Ok(TeacherAssignmentRow {
                id: r.get(0)?,
                teacher_name: r.get(1)?,
                subject_id: r.get(2)?,
                section: r.get(3)?,
                year_level: r.get(4)?,
                academic_period: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
