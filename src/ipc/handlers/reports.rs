use crate::ipc::helpers::{db_conn, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::report;
use rusqlite::Connection;
use serde_json::json;

fn reports_student(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let exam_id = required_str(params, "examId")?;

    let model = report::load_student_report(conn, &student_id, &exam_id)?;
    Ok(json!({ "report": model }))
}

fn reports_batch(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let exam_id = required_str(params, "examId")?;
    let filters = report::parse_batch_filters(params.get("filters"))?;

    let reports = report::load_batch_reports(conn, &exam_id, &filters)?;
    Ok(json!({
        "examId": exam_id,
        "filters": filters,
        "reports": reports
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "reports.student" => db_conn(state).and_then(|conn| reports_student(conn, &req.params)),
        "reports.batch" => db_conn(state).and_then(|conn| reports_batch(conn, &req.params)),
        _ => return None,
    };
    Some(respond(req, result))
}
