use crate::bs_date;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_bs_to_ad(req: &Request) -> serde_json::Value {
    let Some(bs) = req.params.get("bs").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing bs", None);
    };
    match bs_date::bs_to_ad(bs) {
        Some(ad) => ok(&req.id, json!({ "bs": bs, "ad": ad })),
        None => err(
            &req.id,
            "invalid_date",
            "not a convertible BS date",
            Some(json!({
                "bs": bs,
                "supportedYears": [bs_date::BS_FIRST_YEAR, bs_date::BS_LAST_YEAR]
            })),
        ),
    }
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dates.bsToAd" => Some(handle_bs_to_ad(req)),
        _ => None,
    }
}
