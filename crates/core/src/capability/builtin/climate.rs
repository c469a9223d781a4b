use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::ok;
use crate::capability::{CallError, StaticModule, bool_arg, f64_arg, str_arg};
use crate::types::Args;

const MIN_TEMP_C: f64 = 16.0;
const MAX_TEMP_C: f64 = 32.0;

#[derive(Debug, Default)]
struct ClimateState {
    zones: BTreeMap<String, f64>,
    preconditioning: Option<(f64, String)>,
}

pub fn module() -> StaticModule {
    let state = Arc::new(Mutex::new(ClimateState::default()));
    let for_temp = Arc::clone(&state);
    StaticModule::new("climate_module")
        .with_function("set_cabin_temperature", move |args| {
            let state = Arc::clone(&for_temp);
            async move { set_cabin_temperature(&state, &args) }
        })
        .with_function("activate_climate_preconditioning", move |args| {
            let state = Arc::clone(&state);
            async move { activate_preconditioning(&state, &args) }
        })
}

fn check_range(temperature: f64) -> Result<(), CallError> {
    if (MIN_TEMP_C..=MAX_TEMP_C).contains(&temperature) {
        Ok(())
    } else {
        Err(CallError::Failed(format!(
            "temperature {temperature} outside {MIN_TEMP_C}-{MAX_TEMP_C} °C"
        )))
    }
}

fn set_cabin_temperature(state: &Mutex<ClimateState>, args: &Args) -> Result<Value, CallError> {
    let temperature = f64_arg(args, "temperature")?;
    let zone = match str_arg(args, "zone")? {
        "" | "default_value" => "all",
        z => z,
    };
    check_range(temperature)?;

    let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
    state.zones.insert(zone.to_string(), temperature);
    Ok(ok(json!({ "zone": zone, "temperature": temperature, "zones": state.zones })))
}

fn activate_preconditioning(state: &Mutex<ClimateState>, args: &Args) -> Result<Value, CallError> {
    let enable = bool_arg(args, "enable")?;
    let target = f64_arg(args, "target_temp")?;
    let departure = str_arg(args, "departure_time")?;

    let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
    if !enable {
        state.preconditioning = None;
        return Ok(ok(json!({ "preconditioning": false })));
    }
    check_range(target)?;
    state.preconditioning = Some((target, departure.to_string()));
    Ok(ok(json!({
        "preconditioning": true,
        "target_temp": target,
        "departure_time": departure,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::resolve_callable;

    fn args(v: Value) -> Args {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn zones_accumulate() {
        let m = module();
        let set = resolve_callable(&m, "set_cabin_temperature").unwrap();
        set.call(args(json!({"temperature": 21.5, "zone": "driver"}))).await.unwrap();
        let out = set.call(args(json!({"temperature": 23.0, "zone": "passenger"}))).await.unwrap();
        assert_eq!(out["zones"], json!({"driver": 21.5, "passenger": 23.0}));
    }

    #[tokio::test]
    async fn out_of_range_fails() {
        let m = module();
        let set = resolve_callable(&m, "set_cabin_temperature").unwrap();
        let err = set.call(args(json!({"temperature": 40.0, "zone": "all"}))).await.unwrap_err();
        assert!(matches!(err, CallError::Failed(_)));
    }

    #[tokio::test]
    async fn wrong_type_is_mismatch() {
        let m = module();
        let pre = resolve_callable(&m, "activate_climate_preconditioning").unwrap();
        let err = pre
            .call(args(json!({"enable": "yes", "target_temp": 22.0, "departure_time": "07:30"})))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Mismatch(_)));
    }
}
