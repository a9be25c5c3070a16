//! Snapshot sync from the remote registrar store. The portal (and the
//! test fixtures) push row arrays per table; rows are upserted by id so
//! repeated imports converge on the latest snapshot.

use rusqlite::Transaction;
use serde::Deserialize;
use serde_json::json;

use crate::aggregate::general_average;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgramIn {
    id: String,
    code: String,
    name: String,
    #[serde(default)]
    department: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentIn {
    id: String,
    student_no: String,
    full_name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    year_level: Option<String>,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    program_id: Option<String>,
    #[serde(default = "default_pending")]
    status: String,
    #[serde(default)]
    student_type: Option<String>,
}

fn default_pending() -> String {
    "pending".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CourseIn {
    id: String,
    code: String,
    name: String,
    #[serde(default)]
    department: Option<String>,
    #[serde(default)]
    units: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnrollmentIn {
    id: String,
    student_id: String,
    course_id: String,
    #[serde(default = "default_active")]
    status: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

fn default_active() -> String {
    "active".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeIn {
    id: String,
    student_id: String,
    subject_id: String,
    #[serde(default)]
    prelim_grade: Option<f64>,
    #[serde(default)]
    midterm_grade: Option<f64>,
    #[serde(default)]
    final_grade: Option<f64>,
    #[serde(default)]
    is_released: bool,
    #[serde(default)]
    graded_by: Option<String>,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    year_level: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeacherAssignmentIn {
    id: String,
    teacher_name: String,
    subject_id: String,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    year_level: Option<String>,
    #[serde(default)]
    academic_period: Option<String>,
}

fn parse_rows<T: serde::de::DeserializeOwned>(
    req: &Request,
    key: &str,
) -> Result<Vec<T>, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
            err(
                &req.id,
                "bad_params",
                format!("invalid {} rows: {}", key, e),
                None,
            )
        }),
    }
}

fn upsert_programs(tx: &Transaction<'_>, rows: &[ProgramIn]) -> anyhow::Result<()> {
    for p in rows {
        tx.execute(
            "INSERT INTO programs(id, code, name, department) VALUES(?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               code = excluded.code,
               name = excluded.name,
               department = excluded.department",
            (&p.id, &p.code, &p.name, &p.department),
        )?;
    }
    Ok(())
}

fn upsert_students(tx: &Transaction<'_>, rows: &[StudentIn]) -> anyhow::Result<()> {
    for s in rows {
        tx.execute(
            "INSERT INTO students(id, student_no, full_name, email, year_level, section,
                 program_id, status, student_type)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               student_no = excluded.student_no,
               full_name = excluded.full_name,
               email = excluded.email,
               year_level = excluded.year_level,
               section = excluded.section,
               program_id = excluded.program_id,
               status = excluded.status,
               student_type = excluded.student_type",
            (
                &s.id,
                &s.student_no,
                &s.full_name,
                &s.email,
                &s.year_level,
                &s.section,
                &s.program_id,
                &s.status,
                &s.student_type,
            ),
        )?;
    }
    Ok(())
}

fn upsert_courses(tx: &Transaction<'_>, rows: &[CourseIn]) -> anyhow::Result<()> {
    for c in rows {
        tx.execute(
            "INSERT INTO courses(id, code, name, department, units) VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               code = excluded.code,
               name = excluded.name,
               department = excluded.department,
               units = excluded.units",
            (&c.id, &c.code, &c.name, &c.department, c.units),
        )?;
    }
    Ok(())
}

fn upsert_enrollments(tx: &Transaction<'_>, rows: &[EnrollmentIn]) -> anyhow::Result<()> {
    for e in rows {
        tx.execute(
            "INSERT INTO enrollments(id, student_id, course_id, status, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               status = excluded.status,
               updated_at = excluded.updated_at",
            (
                &e.id,
                &e.student_id,
                &e.course_id,
                &e.status,
                &e.created_at,
                &e.updated_at,
            ),
        )?;
    }
    Ok(())
}

fn upsert_grades(tx: &Transaction<'_>, rows: &[GradeIn]) -> anyhow::Result<()> {
    for g in rows {
        // The stored average is derived from the component scores, not
        // trusted from the snapshot.
        let avg = general_average(g.prelim_grade, g.midterm_grade, g.final_grade);
        tx.execute(
            "INSERT INTO grades(id, student_id, subject_id, prelim_grade, midterm_grade,
                 final_grade, general_average, is_released, graded_by, section, year_level)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               prelim_grade = excluded.prelim_grade,
               midterm_grade = excluded.midterm_grade,
               final_grade = excluded.final_grade,
               general_average = excluded.general_average,
               is_released = excluded.is_released,
               graded_by = excluded.graded_by,
               section = excluded.section,
               year_level = excluded.year_level",
            (
                &g.id,
                &g.student_id,
                &g.subject_id,
                g.prelim_grade,
                g.midterm_grade,
                g.final_grade,
                avg,
                g.is_released as i64,
                &g.graded_by,
                &g.section,
                &g.year_level,
            ),
        )?;
    }
    Ok(())
}

fn upsert_teacher_assignments(
    tx: &Transaction<'_>,
    rows: &[TeacherAssignmentIn],
) -> anyhow::Result<()> {
    for a in rows {
        tx.execute(
            "INSERT INTO teacher_assignments(id, teacher_name, subject_id, section,
                 year_level, academic_period)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               teacher_name = excluded.teacher_name,
               subject_id = excluded.subject_id,
               section = excluded.section,
               year_level = excluded.year_level,
               academic_period = excluded.academic_period",
            (
                &a.id,
                &a.teacher_name,
                &a.subject_id,
                &a.section,
                &a.year_level,
                &a.academic_period,
            ),
        )?;
    }
    Ok(())
}

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let programs: Vec<ProgramIn> = match parse_rows(req, "programs") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let students: Vec<StudentIn> = match parse_rows(req, "students") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let courses: Vec<CourseIn> = match parse_rows(req, "courses") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let enrollments: Vec<EnrollmentIn> = match parse_rows(req, "enrollments") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let grades: Vec<GradeIn> = match parse_rows(req, "grades") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let assignments: Vec<TeacherAssignmentIn> = match parse_rows(req, "teacherAssignments") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };

    let result = upsert_programs(&tx, &programs)
        .and_then(|_| upsert_students(&tx, &students))
        .and_then(|_| upsert_courses(&tx, &courses))
        .and_then(|_| upsert_enrollments(&tx, &enrollments))
        .and_then(|_| upsert_grades(&tx, &grades))
        .and_then(|_| upsert_teacher_assignments(&tx, &assignments));

    if let Err(e) = result {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "programs": programs.len(),
            "students": students.len(),
            "courses": courses.len(),
            "enrollments": enrollments.len(),
            "grades": grades.len(),
            "teacherAssignments": assignments.len(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "registry.import" => Some(handle_import(state, req)),
        _ => None,
    }
}
