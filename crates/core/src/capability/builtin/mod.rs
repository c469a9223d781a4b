//! Bundled vehicle capabilities backing `config/catalogue.json`.
//!
//! Each module keeps its own in-memory state and answers with JSON objects.

pub mod battery;
pub mod climate;
pub mod driving;
pub mod info;
pub mod media;
pub mod navigation;

use serde_json::{Value, json};

use super::CapabilityHost;

/// Location prefix used by the shipped catalogue.
pub const BUILTIN_SCHEME: &str = "builtin://";

pub fn location(module: &str) -> String {
    format!("{BUILTIN_SCHEME}{module}")
}

/// Register every bundled module under its name and `builtin://<name>`.
pub fn register_all(host: &mut CapabilityHost) {
    host.register_at("battery_module", location("battery_module"), battery::module);
    host.register_at("climate_module", location("climate_module"), climate::module);
    host.register_at("driving_module", location("driving_module"), driving::module);
    host.register_at("info_module", location("info_module"), info::module);
    host.register_at("media_module", location("media_module"), media::module);
    host.register_at("navigation_module", location("navigation_module"), navigation::module);
}

fn ok(fields: Value) -> Value {
    let mut out = json!({ "status": "success" });
    if let (Some(out), Value::Object(fields)) = (out.as_object_mut(), fields) {
        out.extend(fields);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_modules_registered() {
        let host = CapabilityHost::with_builtins();
        assert_eq!(
            host.module_names(),
            ["battery_module", "climate_module", "driving_module", "info_module", "media_module", "navigation_module"]
        );
        assert!(host.load("whatever", "builtin://media_module").is_some());
    }

    #[test]
    fn ok_merges_fields() {
        assert_eq!(ok(json!({"level": 3})), json!({"status": "success", "level": 3}));
    }
}
