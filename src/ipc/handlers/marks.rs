use crate::ipc::helpers::{
    db_conn, now_rfc3339, require_row, required_str, respond, row_exists, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use log::{info, warn};
use rusqlite::{types::Value, Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

const MARKS_BULK_MAX_ENTRIES: usize = 5000;

#[derive(Debug, Clone, Copy)]
struct FullMarks {
    theory: f64,
    practical: f64,
}

#[derive(Debug)]
struct MarkEntry {
    student_id: String,
    subject_id: String,
    theory_obtained: f64,
    practical_obtained: f64,
}

struct EntryErr {
    code: &'static str,
    message: String,
}

fn entry_err(code: &'static str, message: impl Into<String>) -> EntryErr {
    EntryErr {
        code,
        message: message.into(),
    }
}

fn obtained_value(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<f64, EntryErr> {
    match obj.get(key) {
        None => Ok(0.0),
        Some(v) if v.is_null() => Ok(0.0),
        Some(v) => match v
            .as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        {
            Some(n) if n.is_finite() => Ok(n),
            _ => Err(entry_err("bad_params", format!("{} must be a number", key))),
        },
    }
}

fn subject_full_marks(
    conn: &Connection,
    cache: &mut HashMap<String, Option<FullMarks>>,
    subject_id: &str,
) -> Result<Option<FullMarks>, HandlerErr> {
    if let Some(v) = cache.get(subject_id) {
        return Ok(*v);
    }
    let fm = conn
        .query_row(
            "SELECT theory_full_marks, practical_full_marks FROM subjects WHERE id = ?",
            [subject_id],
            |r| {
                Ok(FullMarks {
                    theory: r.get(0)?,
                    practical: r.get(1)?,
                })
            },
        )
        .optional()
        .map_err(HandlerErr::query)?;
    cache.insert(subject_id.to_string(), fm);
    Ok(fm)
}

fn check_range(key: &str, obtained: f64, full_marks: f64) -> Result<(), EntryErr> {
    if obtained < 0.0 {
        return Err(entry_err(
            "marks_out_of_range",
            format!("{} must not be negative", key),
        ));
    }
    if obtained > full_marks {
        return Err(entry_err(
            "marks_out_of_range",
            format!("{} {} exceeds full marks {}", key, obtained, full_marks),
        ));
    }
    Ok(())
}

fn validate_entry(
    conn: &Connection,
    cache: &mut HashMap<String, Option<FullMarks>>,
    entry: &serde_json::Value,
) -> Result<Result<MarkEntry, EntryErr>, HandlerErr> {
    let Some(obj) = entry.as_object() else {
        return Ok(Err(entry_err("bad_params", "entry must be an object")));
    };
    let (Some(student_id), Some(subject_id)) = (
        obj.get("studentId").and_then(|v| v.as_str()),
        obj.get("subjectId").and_then(|v| v.as_str()),
    ) else {
        return Ok(Err(entry_err("bad_params", "missing studentId/subjectId")));
    };

    let theory_obtained = match obtained_value(obj, "theoryObtained") {
        Ok(v) => v,
        Err(e) => return Ok(Err(e)),
    };
    let practical_obtained = match obtained_value(obj, "practicalObtained") {
        Ok(v) => v,
        Err(e) => return Ok(Err(e)),
    };

    if !row_exists(conn, "students", student_id)? {
        return Ok(Err(entry_err("not_found", "student not found")));
    }
    let Some(full) = subject_full_marks(conn, cache, subject_id)? else {
        return Ok(Err(entry_err("not_found", "subject not found")));
    };
    if let Err(e) = check_range("theoryObtained", theory_obtained, full.theory)
        .and_then(|_| check_range("practicalObtained", practical_obtained, full.practical))
    {
        return Ok(Err(e));
    }

    Ok(Ok(MarkEntry {
        student_id: student_id.to_string(),
        subject_id: subject_id.to_string(),
        theory_obtained,
        practical_obtained,
    }))
}

/// Validates every entry against its subject's full marks, then writes all
/// of them in one transaction. Nothing is written if any entry is rejected.
fn marks_bulk_upsert(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let exam_id = required_str(params, "examId")?;
    let Some(entries) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::new("bad_params", "missing entries[]"));
    };
    if entries.len() > MARKS_BULK_MAX_ENTRIES {
        return Err(HandlerErr::new(
            "bad_params",
            format!(
                "bulk payload exceeds max entries: {} > {}",
                entries.len(),
                MARKS_BULK_MAX_ENTRIES
            ),
        )
        .with_details(json!({ "limitExceeded": true })));
    }
    require_row(conn, "exams", &exam_id, "exam")?;

    let mut cache: HashMap<String, Option<FullMarks>> = HashMap::new();
    let mut valid: Vec<MarkEntry> = Vec::with_capacity(entries.len());
    let mut errors: Vec<serde_json::Value> = Vec::new();
    let mut only_range_errors = true;

    for (i, entry) in entries.iter().enumerate() {
        match validate_entry(conn, &mut cache, entry)? {
            Ok(m) => valid.push(m),
            Err(e) => {
                if e.code != "marks_out_of_range" {
                    only_range_errors = false;
                }
                errors.push(json!({
                    "index": i,
                    "studentId": entry.get("studentId"),
                    "subjectId": entry.get("subjectId"),
                    "code": e.code,
                    "message": e.message,
                }));
            }
        }
    }

    if !errors.is_empty() {
        warn!(
            "event=marks_bulk_upsert module=ipc status=rejected rejected={}",
            errors.len()
        );
        let code = if only_range_errors {
            "marks_out_of_range"
        } else {
            "bad_params"
        };
        return Err(HandlerErr::new(
            code,
            format!("{} of {} entries rejected", errors.len(), entries.len()),
        )
        .with_details(json!({ "errors": errors })));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let updated_at = now_rfc3339();
    for (i, m) in valid.iter().enumerate() {
        let res = tx.execute(
            "INSERT INTO marks(id, student_id, exam_id, subject_id,
                               theory_obtained, practical_obtained, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, exam_id, subject_id) DO UPDATE SET
               theory_obtained = excluded.theory_obtained,
               practical_obtained = excluded.practical_obtained,
               updated_at = excluded.updated_at",
            (
                Uuid::new_v4().to_string(),
                &m.student_id,
                &exam_id,
                &m.subject_id,
                m.theory_obtained,
                m.practical_obtained,
                &updated_at,
            ),
        );
        if let Err(e) = res {
            let _ = tx.rollback();
            return Err(HandlerErr::new("db_insert_failed", e.to_string())
                .with_details(json!({ "table": "marks", "index": i })));
        }
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    info!(
        "event=marks_bulk_upsert module=ipc status=ok updated={}",
        valid.len()
    );
    Ok(json!({ "updated": valid.len() }))
}

fn sql_value_json(v: Value) -> serde_json::Value {
    match v {
        Value::Null | Value::Blob(_) => serde_json::Value::Null,
        Value::Integer(i) => json!(i),
        Value::Real(f) => json!(f),
        Value::Text(s) => json!(s),
    }
}

fn marks_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let exam_id = required_str(params, "examId")?;
    let student_id = required_str(params, "studentId")?;

    let mut stmt = conn
        .prepare(
            "SELECT m.subject_id, s.name, m.theory_obtained, m.practical_obtained, m.updated_at
             FROM marks m
             JOIN subjects s ON s.id = m.subject_id
             WHERE m.exam_id = ? AND m.student_id = ?
             ORDER BY s.sort_order, s.name",
        )
        .map_err(HandlerErr::query)?;
    let marks = stmt
        .query_map((&exam_id, &student_id), |r| {
            let subject_id: String = r.get(0)?;
            let subject_name: String = r.get(1)?;
            let theory: Value = r.get(2)?;
            let practical: Value = r.get(3)?;
            let updated_at: Option<String> = r.get(4)?;
            Ok(json!({
                "subjectId": subject_id,
                "subjectName": subject_name,
                "theoryObtained": sql_value_json(theory),
                "practicalObtained": sql_value_json(practical),
                "updatedAt": updated_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    Ok(json!({ "marks": marks }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "marks.bulkUpsert" => db_conn(state).and_then(|conn| marks_bulk_upsert(conn, &req.params)),
        "marks.list" => db_conn(state).and_then(|conn| marks_list(conn, &req.params)),
        _ => return None,
    };
    Some(respond(req, result))
}
