use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

use super::ok;
use crate::capability::{CallError, StaticModule, str_arg};
use crate::types::Args;

const MODES: [&str; 4] = ["comfort", "normal", "sport", "eco"];

pub fn module() -> StaticModule {
    let mode = Arc::new(Mutex::new(String::from("comfort")));
    StaticModule::new("driving_module")
        .with_function("get_driving_statistics", get_driving_statistics)
        .with_function("set_driving_mode", move |args| {
            let mode = Arc::clone(&mode);
            async move { set_driving_mode(&mode, &args) }
        })
}

async fn get_driving_statistics(args: Args) -> Result<Value, CallError> {
    let period = str_arg(&args, "time_period")?;
    let (distance_km, energy_kwh) = match period {
        "today" => (42.3, 6.8),
        "week" => (286.0, 44.1),
        "month" => (1204.5, 187.9),
        other => return Err(CallError::Failed(format!("unknown time period '{other}'"))),
    };
    Ok(ok(json!({
        "time_period": period,
        "distance_km": distance_km,
        "energy_kwh": energy_kwh,
    })))
}

fn set_driving_mode(current: &Mutex<String>, args: &Args) -> Result<Value, CallError> {
    let mode = str_arg(args, "mode")?.to_ascii_lowercase();
    if !MODES.contains(&mode.as_str()) {
        return Err(CallError::Failed(format!("unsupported driving mode '{mode}'")));
    }
    let mut current = current.lock().unwrap_or_else(|e| e.into_inner());
    let previous = std::mem::replace(&mut *current, mode.clone());
    Ok(ok(json!({ "mode": mode, "previous": previous })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::resolve_callable;

    fn mode_args(mode: &str) -> Args {
        let mut a = Args::new();
        a.insert("mode".into(), json!(mode));
        a
    }

    #[tokio::test]
    async fn mode_switch_reports_previous() {
        let m = module();
        let set = resolve_callable(&m, "set_driving_mode").unwrap();
        let out = set.call(mode_args("Sport")).await.unwrap();
        assert_eq!(out["previous"], "comfort");
        let out = set.call(mode_args("eco")).await.unwrap();
        assert_eq!(out["previous"], "sport");
        assert!(set.call(mode_args("warp")).await.is_err());
    }

    #[tokio::test]
    async fn unknown_period_fails() {
        let mut a = Args::new();
        a.insert("time_period".into(), json!("decade"));
        let err = get_driving_statistics(a).await.unwrap_err();
        assert_eq!(err, CallError::Failed("unknown time period 'decade'".into()));
    }
}
