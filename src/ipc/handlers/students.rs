use super::academic_years::optional_year_id;
use crate::bs_date;
use crate::ipc::helpers::{db_conn, now_rfc3339, optional_str, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params_from_iter, types::Value, Connection};
use serde_json::json;
use uuid::Uuid;

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let first_name = required_str(params, "firstName")?;
    let last_name = required_str(params, "lastName")?;
    let class_name = required_str(params, "className")?;
    let roll_no = optional_str(params, "rollNo")?;
    let faculty = optional_str(params, "faculty")?;
    let academic_year_id = optional_year_id(conn, params)?;
    let active = params
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    let dob_bs = optional_str(params, "dobBs")?;
    let dob_ad = match &dob_bs {
        Some(bs) => Some(bs_date::bs_to_ad(bs).ok_or_else(|| {
            HandlerErr::new("invalid_date", "dobBs is not a valid BS date")
                .with_details(json!({ "dobBs": bs }))
        })?),
        None => None,
    };

    let sort_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE class_name = ?",
            [&class_name],
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;

    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, first_name, last_name, roll_no, class_name, faculty,
                              academic_year_id, dob_bs, dob_ad, active, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            &first_name,
            &last_name,
            &roll_no,
            &class_name,
            &faculty,
            &academic_year_id,
            &dob_bs,
            &dob_ad,
            active as i64,
            sort_order,
            now_rfc3339(),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "students" }))
    })?;

    Ok(json!({
        "studentId": student_id,
        "sortOrder": sort_order,
        "dobAd": dob_ad
    }))
}

fn students_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();
    for (key, column) in [
        ("className", "class_name = ?"),
        ("faculty", "faculty = ?"),
        ("academicYearId", "academic_year_id = ?"),
    ] {
        if let Some(v) = optional_str(params, key)? {
            clauses.push(column);
            bind_values.push(Value::Text(v));
        }
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT id, first_name, last_name, roll_no, class_name, faculty, academic_year_id,
                dob_bs, dob_ad, active, sort_order
         FROM students
         {}
         ORDER BY class_name, sort_order",
        where_sql
    );

    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let students = stmt
        .query_map(params_from_iter(bind_values), |r| {
            let id: String = r.get(0)?;
            let first: String = r.get(1)?;
            let last: String = r.get(2)?;
            let roll_no: Option<String> = r.get(3)?;
            let class_name: String = r.get(4)?;
            let faculty: Option<String> = r.get(5)?;
            let academic_year_id: Option<String> = r.get(6)?;
            let dob_bs: Option<String> = r.get(7)?;
            let dob_ad: Option<String> = r.get(8)?;
            let active: i64 = r.get(9)?;
            let sort_order: i64 = r.get(10)?;
            Ok(json!({
                "id": id,
                "displayName": format!("{}, {}", last, first),
                "firstName": first,
                "lastName": last,
                "rollNo": roll_no,
                "className": class_name,
                "faculty": faculty,
                "academicYearId": academic_year_id,
                "dobBs": dob_bs,
                "dobAd": dob_ad,
                "active": active != 0,
                "sortOrder": sort_order
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    Ok(json!({ "students": students }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.create" => db_conn(state).and_then(|conn| students_create(conn, &req.params)),
        "students.list" => db_conn(state).and_then(|conn| students_list(conn, &req.params)),
        _ => return None,
    };
    Some(respond(req, result))
}
