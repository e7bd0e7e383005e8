use crate::bs_date;
use crate::ipc::helpers::{db_conn, optional_str, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use log::info;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn convert_bs(key: &str, bs: &str) -> Result<String, HandlerErr> {
    bs_date::bs_to_ad(bs).ok_or_else(|| {
        HandlerErr::new("invalid_date", format!("{} is not a valid BS date", key))
            .with_details(json!({ key: bs }))
    })
}

fn year_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: String = r.get(0)?;
    let name: String = r.get(1)?;
    let start_bs: String = r.get(2)?;
    let end_bs: String = r.get(3)?;
    let start_ad: String = r.get(4)?;
    let end_ad: String = r.get(5)?;
    let is_current: i64 = r.get(6)?;
    Ok(json!({
        "id": id,
        "name": name,
        "startBs": start_bs,
        "endBs": end_bs,
        "startAd": start_ad,
        "endAd": end_ad,
        "isCurrent": is_current != 0
    }))
}

const YEAR_COLUMNS: &str = "id, name, start_bs, end_bs, start_ad, end_ad, is_current";

fn academic_years_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let start_bs = required_str(params, "startBs")?;
    let end_bs = required_str(params, "endBs")?;
    let is_current = params
        .get("isCurrent")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let start_ad = convert_bs("startBs", &start_bs)?;
    let end_ad = convert_bs("endBs", &end_bs)?;
    if start_ad > end_ad {
        return Err(HandlerErr::new("bad_params", "startBs must not be after endBs")
            .with_details(json!({ "startAd": start_ad, "endAd": end_ad })));
    }

    let year_id = Uuid::new_v4().to_string();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    if is_current {
        tx.execute("UPDATE academic_years SET is_current = 0", [])
            .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    }
    tx.execute(
        "INSERT INTO academic_years(id, name, start_bs, end_bs, start_ad, end_ad, is_current)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &year_id,
            &name,
            &start_bs,
            &end_bs,
            &start_ad,
            &end_ad,
            is_current as i64,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "academic_years" }))
    })?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    Ok(json!({
        "academicYearId": year_id,
        "startAd": start_ad,
        "endAd": end_ad,
        "isCurrent": is_current
    }))
}

fn academic_years_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM academic_years ORDER BY start_ad, name",
        YEAR_COLUMNS
    );
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let years = stmt
        .query_map([], year_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "academicYears": years }))
}

/// Clears every current flag and sets one, inside a single transaction, so
/// at most one year is ever current.
fn academic_years_set_current(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let year_id = required_str(params, "academicYearId")?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute("UPDATE academic_years SET is_current = 0", [])
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    let changed = tx
        .execute(
            "UPDATE academic_years SET is_current = 1 WHERE id = ?",
            [&year_id],
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    if changed == 0 {
        let _ = tx.rollback();
        return Err(HandlerErr::new("not_found", "academic year not found")
            .with_details(json!({ "academicYearId": year_id })));
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    info!("event=academic_year_set_current module=ipc status=ok");
    Ok(json!({ "academicYearId": year_id, "isCurrent": true }))
}

fn academic_years_current(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!(
        "SELECT {} FROM academic_years WHERE is_current = 1 ORDER BY start_ad LIMIT 1",
        YEAR_COLUMNS
    );
    let year = conn
        .query_row(&sql, [], year_json)
        .optional()
        .map_err(HandlerErr::query)?;
    Ok(json!({ "academicYear": year }))
}

/// Resolves an optional `academicYearId` param, checking it exists.
pub fn optional_year_id(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<Option<String>, HandlerErr> {
    let Some(year_id) = optional_str(params, "academicYearId")? else {
        return Ok(None);
    };
    crate::ipc::helpers::require_row(conn, "academic_years", &year_id, "academic year")?;
    Ok(Some(year_id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "academicYears.create" => {
            db_conn(state).and_then(|conn| academic_years_create(conn, &req.params))
        }
        "academicYears.list" => db_conn(state).and_then(academic_years_list),
        "academicYears.setCurrent" => {
            db_conn(state).and_then(|conn| academic_years_set_current(conn, &req.params))
        }
        "academicYears.current" => db_conn(state).and_then(academic_years_current),
        _ => return None,
    };
    Some(respond(req, result))
}
