//! Enrollment approval flow: the pending queue, the confirm action
//! (pending -> enrolled plus COE issuance), course re-selection, and
//! retrieval of the latest issued COE. `dropped` is an externally set
//! terminal state; it is read here, never written.

use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

use crate::coe;
use crate::fetch;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str, required_str_array};
use crate::ipc::types::{AppState, Request};
use crate::resolve;

fn handle_pending(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let students = match fetch::fetch_students(conn, Some("pending")) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let programs = match fetch::fetch_programs(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let program_idx = resolve::index_programs(&programs);

    let rows: Vec<serde_json::Value> = students
        .iter()
        .map(|s| {
            let (program_code, program_name) = resolve::program_label(s, &program_idx);
            json!({
                "studentId": s.id,
                "studentNo": s.student_no,
                "fullName": s.full_name,
                "email": s.email,
                "yearLevel": s.year_level,
                "section": s.section,
                "programCode": program_code,
                "programName": program_name,
                "studentType": s.student_type,
            })
        })
        .collect();
    ok(&req.id, json!({ "students": rows }))
}

fn dedup_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

fn handle_confirm(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_ids = match required_str_array(req, "courseIds") {
        Ok(v) => dedup_ids(v),
        Err(resp) => return resp,
    };
    if course_ids.is_empty() {
        return err(&req.id, "bad_params", "courseIds must not be empty", None);
    }

    let student = match fetch::fetch_student(conn, &student_id) {
        Ok(Some(s)) => s,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "student not found",
                Some(json!({ "studentId": student_id })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    // The only transition this side performs is pending -> enrolled.
    if student.status != "pending" {
        return err(
            &req.id,
            "invalid_state",
            "only pending students can be confirmed",
            Some(json!({ "status": student.status })),
        );
    }

    let courses = match fetch::fetch_courses_by_ids(conn, &course_ids) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if courses.len() != course_ids.len() {
        let found: HashSet<&str> = courses.iter().map(|c| c.id.as_str()).collect();
        let missing: Vec<&String> =
            course_ids.iter().filter(|id| !found.contains(id.as_str())).collect();
        return err(
            &req.id,
            "not_found",
            "unknown course ids",
            Some(json!({ "courseIds": missing })),
        );
    }

    let programs = match fetch::fetch_programs(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let program_idx = resolve::index_programs(&programs);
    let program = student
        .program_id
        .as_deref()
        .and_then(|pid| program_idx.get(pid))
        .copied();

    let issued_at = Utc::now();
    let now = issued_at.to_rfc3339();
    let doc = coe::compose(&student, program, &courses, issued_at);

    // Enrollment rows, the status transition, and the COE land together
    // or not at all; a mid-sequence failure must not leave the student
    // half-confirmed.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    for course in &courses {
        let enrollment_id = Uuid::new_v4().to_string();
        if let Err(e) = tx.execute(
            "INSERT INTO enrollments(id, student_id, course_id, status, created_at, updated_at)
             VALUES(?, ?, ?, 'active', ?, ?)
             ON CONFLICT(student_id, course_id) DO UPDATE SET
               status = 'active',
               updated_at = excluded.updated_at",
            (&enrollment_id, &student_id, &course.id, &now, &now),
        ) {
            let _ = tx.rollback();
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    if let Err(e) = tx.execute(
        "UPDATE students SET status = 'enrolled', updated_at = ? WHERE id = ?",
        (&now, &student_id),
    ) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    let coe_id = match coe::insert(&tx, &doc) {
        Ok(id) => id,
        Err(e) => {
            let _ = tx.rollback();
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
    };

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    let doc_value = match serde_json::to_value(&doc) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "internal", e.to_string(), None),
    };
    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "status": "enrolled",
            "coeId": coe_id,
            "coe": doc_value,
        }),
    )
}

fn handle_update_courses(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let selected = match required_str_array(req, "courseIds") {
        Ok(v) => dedup_ids(v),
        Err(resp) => return resp,
    };

    let student = match fetch::fetch_student(conn, &student_id) {
        Ok(Some(s)) => s,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "student not found",
                Some(json!({ "studentId": student_id })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if student.status == "dropped" {
        return err(
            &req.id,
            "invalid_state",
            "dropped students cannot be re-enrolled here",
            None,
        );
    }

    let courses = match fetch::fetch_courses_by_ids(conn, &selected) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if courses.len() != selected.len() {
        let found: HashSet<&str> = courses.iter().map(|c| c.id.as_str()).collect();
        let missing: Vec<&String> =
            selected.iter().filter(|id| !found.contains(id.as_str())).collect();
        return err(
            &req.id,
            "not_found",
            "unknown course ids",
            Some(json!({ "courseIds": missing })),
        );
    }

    let existing = match fetch::fetch_enrollments_for_student(conn, &student_id, Some("active")) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let selected_set: HashSet<&str> = selected.iter().map(|s| s.as_str()).collect();
    let active_set: HashSet<&str> = existing.iter().map(|e| e.course_id.as_str()).collect();

    let now = Utc::now().to_rfc3339();

    // The new selection replaces the old one as a unit.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let mut removed = 0usize;
    for e in &existing {
        if !selected_set.contains(e.course_id.as_str()) {
            if let Err(db_err) = tx.execute(
                "UPDATE enrollments SET status = 'removed', updated_at = ? WHERE id = ?",
                (&now, &e.id),
            ) {
                let _ = tx.rollback();
                return err(&req.id, "db_update_failed", db_err.to_string(), None);
            }
            removed += 1;
        }
    }

    let mut added = 0usize;
    for course_id in &selected {
        if active_set.contains(course_id.as_str()) {
            continue;
        }
        let enrollment_id = Uuid::new_v4().to_string();
        if let Err(db_err) = tx.execute(
            "INSERT INTO enrollments(id, student_id, course_id, status, created_at, updated_at)
             VALUES(?, ?, ?, 'active', ?, ?)
             ON CONFLICT(student_id, course_id) DO UPDATE SET
               status = 'active',
               updated_at = excluded.updated_at",
            (&enrollment_id, &student_id, course_id, &now, &now),
        ) {
            let _ = tx.rollback();
            return err(&req.id, "db_update_failed", db_err.to_string(), None);
        }
        added += 1;
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "added": added,
            "removed": removed,
            "kept": selected.len() - added,
        }),
    )
}

fn handle_coe_latest(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match coe::latest_for_student(conn, &student_id) {
        Ok(Some(doc)) => match serde_json::to_value(&doc) {
            Ok(v) => ok(&req.id, json!({ "coe": v })),
            Err(e) => err(&req.id, "internal", e.to_string(), None),
        },
        Ok(None) => err(
            &req.id,
            "not_found",
            "no certificate issued for student",
            Some(json!({ "studentId": student_id })),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollment.pending" => Some(handle_pending(state, req)),
        "enrollment.confirm" => Some(handle_confirm(state, req)),
        "enrollment.updateCourses" => Some(handle_update_courses(state, req)),
        "enrollment.coeLatest" => Some(handle_coe_latest(state, req)),
        _ => None,
    }
}
