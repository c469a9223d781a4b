//! Heuristic argument extraction from the utterance.
//!
//! Recognizes a few vehicle phrasings (numbers, destinations, media and
//! driving keywords) and fills every remaining required parameter with a
//! typed placeholder so the argument map always has the declared names.

use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;

use crate::types::{Args, FunctionDescriptor, ParamType};

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)").unwrap());
static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)").unwrap());
static RADIUS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*(?:公里|km)").unwrap());
static LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:导航到|前往|到|去)\s*([^，。！？,.!?\s]+)").unwrap());

const DEFAULT_RADIUS_KM: i64 = 10;

pub fn extract(descriptor: &FunctionDescriptor, text: &str) -> Args {
    let mut args = Args::new();
    let function = descriptor.function_name.to_lowercase();
    let lower = text.to_lowercase();
    let declared = |name: &str| descriptor.parameter(name).is_some();
    let set = |args: &mut Args, name: &str, value: Value| {
        if declared(name) {
            args.insert(name.to_string(), value);
        }
    };

    if function.contains("temperature") || function.contains("climate") {
        if let Some(t) = NUMBER.captures(text).and_then(|c| c[1].parse::<f64>().ok()) {
            set(&mut args, "temperature", json!(t));
            set(&mut args, "target_temp", json!(t));
            set(&mut args, "zone", json!("driver"));
            set(&mut args, "enable", json!(true));
            set(&mut args, "departure_time", json!("08:00"));
        }
    } else if function.contains("volume") {
        if let Some(level) = INTEGER.captures(text).and_then(|c| c[1].parse::<i64>().ok()) {
            set(&mut args, "level", json!(level));
        }
    } else if function.contains("destination") {
        let location = LOCATION.captures(text).map_or("目的地".to_string(), |c| c[1].to_string());
        set(&mut args, "location", json!(location));
        set(&mut args, "waypoints", json!([]));
    } else if function.contains("charging") {
        let radius = RADIUS
            .captures(&lower)
            .and_then(|c| c[1].parse::<i64>().ok())
            .unwrap_or(DEFAULT_RADIUS_KM);
        set(&mut args, "radius_km", json!(radius));
        set(&mut args, "filter_by", json!({ "type": "fast" }));
    } else if function.contains("media") || function.contains("play") {
        let media_type = if text.contains("音乐") || text.contains('歌') { "music" } else { "audio" };
        set(&mut args, "media_type", json!(media_type));
        set(&mut args, "source", json!("local"));
        set(&mut args, "content_id", json!("default_content"));
    } else if function.contains("driving") {
        let period = if text.contains("本周") { "week" } else { "today" };
        set(&mut args, "time_period", json!(period));
        let mode = if text.contains("运动") || lower.contains("sport") {
            "sport"
        } else if text.contains("经济") || lower.contains("eco") {
            "eco"
        } else {
            "normal"
        };
        set(&mut args, "mode", json!(mode));
    } else if function.contains("weather") {
        set(&mut args, "key_word", json!(text.trim()));
    }

    for p in descriptor.parameters.iter().filter(|p| p.required) {
        if !args.contains_key(&p.name) {
            if let Some(v) = placeholder(&p.param_type) {
                args.insert(p.name.clone(), v);
            }
        }
    }
    args
}

/// Typed stand-in for a parameter the utterance did not mention.
pub fn placeholder(ty: &ParamType) -> Option<Value> {
    Some(match ty {
        ParamType::Str => json!("default_value"),
        ParamType::Int => json!(0),
        ParamType::Float => json!(0.0),
        ParamType::Bool => json!(true),
        ParamType::List | ParamType::Tuple => json!([]),
        ParamType::Dict => json!({}),
        ParamType::None => Value::Null,
        ParamType::Other(_) => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParameterSpec;

    fn descriptor(function: &str, params: &[(&str, &str)]) -> FunctionDescriptor {
        FunctionDescriptor::new(
            "m",
            "p",
            function,
            params.iter().map(|(n, t)| ParameterSpec::new(*n, *t)).collect(),
        )
    }

    #[test]
    fn temperature_number() {
        let d = descriptor("set_cabin_temperature", &[("temperature", "float"), ("zone", "str")]);
        let args = extract(&d, "把温度调到22.5度");
        assert_eq!(args["temperature"], json!(22.5));
        assert_eq!(args["zone"], "driver");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn destination_after_marker() {
        let d = descriptor("set_destination", &[("location", "str"), ("waypoints", "list")]);
        assert_eq!(extract(&d, "导航到北京，走高速")["location"], "北京");
        assert_eq!(extract(&d, "带我回家")["location"], "目的地");
    }

    #[test]
    fn charging_radius_and_filter() {
        let d = descriptor("find_charging_stations", &[("radius_km", "int"), ("filter_by", "dict")]);
        let args = extract(&d, "找一下5公里内的充电桩");
        assert_eq!(args["radius_km"], 5);
        assert_eq!(args["filter_by"], json!({"type": "fast"}));
        assert_eq!(extract(&d, "附近充电站")["radius_km"], 10);
    }

    #[test]
    fn driving_keywords() {
        let mode = descriptor("set_driving_mode", &[("mode", "str")]);
        assert_eq!(extract(&mode, "切换到运动模式")["mode"], "sport");
        assert_eq!(extract(&mode, "switch to ECO")["mode"], "eco");
        let stats = descriptor("get_driving_statistics", &[("time_period", "str")]);
        assert_eq!(extract(&stats, "本周开了多少公里")["time_period"], "week");
    }

    #[test]
    fn media_type_from_music_words() {
        let d = descriptor("play_media", &[("media_type", "str"), ("source", "str"), ("content_id", "str")]);
        assert_eq!(extract(&d, "放首歌")["media_type"], "music");
        assert_eq!(extract(&d, "播放有声书")["media_type"], "audio");
    }

    #[test]
    fn placeholders_fill_the_rest() {
        let d = descriptor("lookup", &[
            ("key_word", "str"),
            ("days", "int"),
            ("detailed", "bool"),
            ("cb", "Callable"),
        ]);
        let args = extract(&d, "查一下");
        assert_eq!(args["key_word"], "default_value");
        assert_eq!(args["days"], 0);
        assert_eq!(args["detailed"], true);
        assert!(!args.contains_key("cb"));
    }

    #[test]
    fn weather_keyword_is_utterance() {
        let d = descriptor("weather.weather_search", &[("key_word", "str")]);
        assert_eq!(extract(&d, " 上海明天天气 ")["key_word"], "上海明天天气");
    }

    #[test]
    fn undeclared_names_never_added() {
        let d = descriptor("adjust_volume", &[("level", "int")]);
        let args = extract(&d, "音量调到12");
        assert_eq!(args.len(), 1);
        assert_eq!(args["level"], 12);
    }
}
