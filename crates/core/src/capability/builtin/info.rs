use serde_json::{Value, json};

use super::ok;
use crate::capability::{CallError, StaticModule, str_arg};
use crate::types::Args;

/// Information services. Weather lives on a sub-object, so the catalogue
/// names it `weather.weather_search`.
pub fn module() -> StaticModule {
    StaticModule::new("info_module")
        .with_object("weather", StaticModule::new("weather").with_function("weather_search", weather_search))
}

async fn weather_search(args: Args) -> Result<Value, CallError> {
    let key_word = str_arg(&args, "key_word")?;
    let city = match key_word.trim() {
        "" | "default_value" => "本地",
        k => k,
    };
    Ok(ok(json!({
        "city": city,
        "condition": "晴",
        "temperature_c": 24,
        "humidity_percent": 41,
    })))
}
