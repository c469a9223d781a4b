use serde_json::{Value, json};

use super::ok;
use crate::capability::{CallError, StaticModule, arg, i64_arg, str_arg};
use crate::types::Args;

const STATIONS: [(&str, f64, &str); 4] = [
    ("City Center Supercharger", 2.4, "fast"),
    ("Riverside Mall", 5.1, "standard"),
    ("Airport Hub", 18.7, "fast"),
    ("Hillside Park", 27.3, "standard"),
];

pub fn module() -> StaticModule {
    StaticModule::new("navigation_module")
        .with_function("set_destination", set_destination)
        .with_function("find_charging_stations", find_charging_stations)
}

async fn set_destination(args: Args) -> Result<Value, CallError> {
    let location = str_arg(&args, "location")?;
    let waypoints = arg(&args, "waypoints")?
        .as_array()
        .ok_or_else(|| CallError::Mismatch("argument 'waypoints' should be list".into()))?;
    if location.trim().is_empty() {
        return Err(CallError::Failed("destination is empty".into()));
    }
    Ok(ok(json!({ "destination": location, "waypoints": waypoints })))
}

/// `filter_by` may carry `{"type": "fast" | "standard"}`.
async fn find_charging_stations(args: Args) -> Result<Value, CallError> {
    let radius = i64_arg(&args, "radius_km")?;
    let filter = arg(&args, "filter_by")?
        .as_object()
        .ok_or_else(|| CallError::Mismatch("argument 'filter_by' should be dict".into()))?;
    let kind = filter.get("type").and_then(Value::as_str);

    let stations: Vec<Value> = STATIONS
        .iter()
        .filter(|(_, km, _)| *km <= radius as f64)
        .filter(|(_, _, k)| kind.is_none_or(|want| want == *k))
        .map(|(name, km, k)| json!({ "name": name, "distance_km": km, "type": k }))
        .collect();
    Ok(ok(json!({ "radius_km": radius, "stations": stations })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stations_filtered_by_radius_and_type() {
        let a = json!({"radius_km": 20, "filter_by": {"type": "fast"}}).as_object().cloned().unwrap();
        let out = find_charging_stations(a).await.unwrap();
        let names: Vec<&str> = out["stations"].as_array().unwrap().iter().map(|s| s["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["City Center Supercharger", "Airport Hub"]);
    }

    #[tokio::test]
    async fn destination_requires_list_waypoints() {
        let a = json!({"location": "天安门", "waypoints": "none"}).as_object().cloned().unwrap();
        assert!(matches!(set_destination(a).await, Err(CallError::Mismatch(_))));
    }
}
