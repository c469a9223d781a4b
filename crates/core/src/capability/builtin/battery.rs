use serde_json::{Value, json};

use super::ok;
use crate::capability::{CallError, StaticModule};
use crate::types::Args;

const CAPACITY_KWH: f64 = 75.0;
const KM_PER_KWH: f64 = 6.2;

pub fn module() -> StaticModule {
    StaticModule::new("battery_module").with_function("get_battery_status", get_battery_status)
}

async fn get_battery_status(_args: Args) -> Result<Value, CallError> {
    let level_percent = 82.0;
    let range_km = (CAPACITY_KWH * level_percent / 100.0 * KM_PER_KWH).round();
    Ok(ok(json!({
        "level_percent": level_percent,
        "range_km": range_km,
        "charging": false,
    })))
}
