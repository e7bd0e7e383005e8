use super::academic_years::optional_year_id;
use crate::bs_date;
use crate::ipc::helpers::{db_conn, optional_str, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn exams_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let academic_year_id = optional_year_id(conn, params)?;
    let exam_date_bs = optional_str(params, "examDateBs")?;
    let exam_date_ad = match &exam_date_bs {
        Some(bs) => Some(bs_date::bs_to_ad(bs).ok_or_else(|| {
            HandlerErr::new("invalid_date", "examDateBs is not a valid BS date")
                .with_details(json!({ "examDateBs": bs }))
        })?),
        None => None,
    };

    let exam_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO exams(id, name, academic_year_id, exam_date_bs, exam_date_ad)
         VALUES(?, ?, ?, ?, ?)",
        (&exam_id, &name, &academic_year_id, &exam_date_bs, &exam_date_ad),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "exams" }))
    })?;

    Ok(json!({ "examId": exam_id, "examDateAd": exam_date_ad }))
}

fn exams_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, academic_year_id, exam_date_bs, exam_date_ad
             FROM exams
             ORDER BY exam_date_ad, name",
        )
        .map_err(HandlerErr::query)?;
    let exams = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let academic_year_id: Option<String> = r.get(2)?;
            let exam_date_bs: Option<String> = r.get(3)?;
            let exam_date_ad: Option<String> = r.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "academicYearId": academic_year_id,
                "examDateBs": exam_date_bs,
                "examDateAd": exam_date_ad
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "exams": exams }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "exams.create" => db_conn(state).and_then(|conn| exams_create(conn, &req.params)),
        "exams.list" => db_conn(state).and_then(exams_list),
        _ => return None,
    };
    Some(respond(req, result))
}
