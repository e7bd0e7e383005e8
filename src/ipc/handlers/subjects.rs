use crate::ipc::helpers::{
    db_conn, non_negative_f64, optional_str, required_str, respond, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params_from_iter, types::Value, Connection};
use serde_json::json;
use uuid::Uuid;

fn subjects_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let class_name = required_str(params, "className")?;
    let faculty = optional_str(params, "faculty")?;
    let theory_code = optional_str(params, "theoryCode")?;
    let practical_code = optional_str(params, "practicalCode")?;
    let theory_full_marks = non_negative_f64(params, "theoryFullMarks")?;
    let practical_full_marks = non_negative_f64(params, "practicalFullMarks")?;
    let theory_credit_hour = non_negative_f64(params, "theoryCreditHour")?;
    let practical_credit_hour = non_negative_f64(params, "practicalCreditHour")?;

    let sort_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM subjects WHERE class_name = ?",
            [&class_name],
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;

    let subject_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, name, theory_code, practical_code, class_name, faculty,
                              theory_full_marks, practical_full_marks,
                              theory_credit_hour, practical_credit_hour, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &subject_id,
            &name,
            &theory_code,
            &practical_code,
            &class_name,
            &faculty,
            theory_full_marks,
            practical_full_marks,
            theory_credit_hour,
            practical_credit_hour,
            sort_order,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "subjects" }))
    })?;

    Ok(json!({ "subjectId": subject_id, "sortOrder": sort_order }))
}

fn subjects_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();
    if let Some(class_name) = optional_str(params, "className")? {
        clauses.push("class_name = ?");
        bind_values.push(Value::Text(class_name));
    }
    if let Some(faculty) = optional_str(params, "faculty")? {
        clauses.push("faculty = ?");
        bind_values.push(Value::Text(faculty));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT id, name, theory_code, practical_code, class_name, faculty,
                theory_full_marks, practical_full_marks,
                theory_credit_hour, practical_credit_hour, sort_order
         FROM subjects
         {}
         ORDER BY class_name, sort_order",
        where_sql
    );

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let subjects = stmt
        .query_map(params_from_iter(bind_values), |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let theory_code: Option<String> = r.get(2)?;
            let practical_code: Option<String> = r.get(3)?;
            let class_name: String = r.get(4)?;
            let faculty: Option<String> = r.get(5)?;
            let theory_full_marks: f64 = r.get(6)?;
            let practical_full_marks: f64 = r.get(7)?;
            let theory_credit_hour: f64 = r.get(8)?;
            let practical_credit_hour: f64 = r.get(9)?;
            let sort_order: i64 = r.get(10)?;
            Ok(json!({
                "id": id,
                "name": name,
                "theoryCode": theory_code,
                "practicalCode": practical_code,
                "className": class_name,
                "faculty": faculty,
                "theoryFullMarks": theory_full_marks,
                "practicalFullMarks": practical_full_marks,
                "theoryCreditHour": theory_credit_hour,
                "practicalCreditHour": practical_credit_hour,
                "sortOrder": sort_order
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    Ok(json!({ "subjects": subjects }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "subjects.create" => db_conn(state).and_then(|conn| subjects_create(conn, &req.params)),
        "subjects.list" => db_conn(state).and_then(|conn| subjects_list(conn, &req.params)),
        _ => return None,
    };
    Some(respond(req, result))
}
