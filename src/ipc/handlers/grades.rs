//! Grade sheet screens: the fetch/resolve/group pipeline behind
//! `grades.sheets`, plus the single and bulk release toggles.

use serde_json::json;
use std::collections::HashSet;

use rusqlite::Connection;

use crate::aggregate::{group_grade_sheets, GradeSheet};
use crate::fetch;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_bool, required_str};
use crate::ipc::types::{AppState, Request};
use crate::release::{self, ReleaseOutcome};
use crate::resolve::{index_courses, index_students, AssignmentIndex};

/// One screen's fetch cycle: four independent single-table queries, then
/// in-memory resolution and grouping. The assignment query depends on the
/// subject ids seen in the grades, so it runs after that fetch.
fn build_sheets(conn: &Connection) -> anyhow::Result<Vec<GradeSheet>> {
    let grades = fetch::fetch_grades(conn)?;
    let students = fetch::fetch_students(conn, None)?;
    let courses = fetch::fetch_courses(conn, None)?;

    let subject_ids: Vec<String> = {
        let mut seen = HashSet::new();
        grades
            .iter()
            .filter(|g| seen.insert(g.subject_id.clone()))
            .map(|g| g.subject_id.clone())
            .collect()
    };
    let assignments = fetch::fetch_teacher_assignments_by_subjects(conn, &subject_ids)?;

    let student_idx = index_students(&students);
    let course_idx = index_courses(&courses);
    let assignment_idx = AssignmentIndex::build(&assignments);

    Ok(group_grade_sheets(
        &grades,
        &student_idx,
        &course_idx,
        &assignment_idx,
    ))
}

fn handle_sheets(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let sheets = match build_sheets(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match serde_json::to_value(&sheets) {
        Ok(v) => ok(&req.id, json!({ "sheets": v })),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

fn handle_set_released(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let grade_id = match required_str(req, "gradeId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let released = match required_bool(req, "released") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match release::set_released(conn, &grade_id, released) {
        Ok(true) => ok(&req.id, json!({ "gradeId": grade_id, "released": released })),
        Ok(false) => err(
            &req.id,
            "not_found",
            "grade not found",
            Some(json!({ "gradeId": grade_id })),
        ),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_set_released_for_group(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let year_level = match required_str(req, "yearLevel") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_code = match required_str(req, "courseCode") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let section = match required_str(req, "section") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let released = match required_bool(req, "released") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let sheets = match build_sheets(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(sheet) = sheets.iter().find(|s| {
        s.year_level == year_level && s.course_code == course_code && s.section == section
    }) else {
        return err(
            &req.id,
            "not_found",
            "no grade sheet for group",
            Some(json!({
                "yearLevel": year_level,
                "courseCode": course_code,
                "section": section,
            })),
        );
    };

    let member_ids: Vec<String> = sheet.members.iter().map(|m| m.grade_id.clone()).collect();
    let snapshot = match fetch::fetch_grades_by_ids(conn, &member_ids) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    match release::set_released_for_group(conn, &snapshot, released) {
        ReleaseOutcome::Applied { updated } => ok(
            &req.id,
            json!({ "updated": updated, "released": released }),
        ),
        ReleaseOutcome::PreconditionFailed { incomplete_ids } => err(
            &req.id,
            "precondition_failed",
            "group has incomplete grades",
            Some(json!({ "incompleteGradeIds": incomplete_ids })),
        ),
        ReleaseOutcome::PartialFailure {
            updated,
            failed_ids,
        } => err(
            &req.id,
            "partial_write_failure",
            "some grades could not be updated",
            Some(json!({ "updated": updated, "failedGradeIds": failed_ids })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.sheets" => Some(handle_sheets(state, req)),
        "grades.setReleased" => Some(handle_set_released(state, req)),
        "grades.setReleasedForGroup" => Some(handle_set_released_for_group(state, req)),
        _ => None,
    }
}
