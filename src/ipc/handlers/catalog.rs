use serde_json::json;

use crate::fetch;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str};
use crate::ipc::types::{AppState, Request};

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let department = optional_str(req, "department");

    let courses = match fetch::fetch_courses(conn, department.as_deref()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows: Vec<serde_json::Value> = courses
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "code": c.code,
                "name": c.name,
                "department": c.department,
                "units": c.units,
            })
        })
        .collect();
    ok(&req.id, json!({ "courses": rows }))
}

fn handle_programs_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let programs = match fetch::fetch_programs(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows: Vec<serde_json::Value> = programs
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "code": p.code,
                "name": p.name,
                "department": p.department,
            })
        })
        .collect();
    ok(&req.id, json!({ "programs": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(handle_courses_list(state, req)),
        "programs.list" => Some(handle_programs_list(state, req)),
        _ => None,
    }
}
