use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

use crate::capability::json_type_name;
use crate::types::{Args, FunctionDescriptor, ParamType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMismatch {
    pub name: String,
    pub expected: ParamType,
    pub found: &'static str,
}

/// Every problem with an argument map, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
    pub mismatched: Vec<TypeMismatch>,
}

impl ValidationError {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.mismatched.is_empty()
    }

    /// All offending parameter names, sorted and unique.
    pub fn offending(&self) -> BTreeSet<&str> {
        self.missing
            .iter()
            .chain(&self.unexpected)
            .map(String::as_str)
            .chain(self.mismatched.iter().map(|m| m.name.as_str()))
            .collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("Missing required parameters: {}", self.missing.join(", ")));
        }
        if !self.unexpected.is_empty() {
            parts.push(format!("Unexpected parameters: {}", self.unexpected.join(", ")));
        }
        for m in &self.mismatched {
            parts.push(format!("Parameter '{}' should be {}, got {}", m.name, m.expected, m.found));
        }
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Whether `value` fits `ty`. Integers are accepted for `float`; unknown tags always fit.
pub fn type_matches(ty: &ParamType, value: &Value) -> bool {
    match ty {
        ParamType::Str => value.is_string(),
        ParamType::Int => value.is_i64() || value.is_u64(),
        ParamType::Float => value.is_number(),
        ParamType::Bool => value.is_boolean(),
        ParamType::List | ParamType::Tuple => value.is_array(),
        ParamType::Dict => value.is_object(),
        ParamType::None => value.is_null(),
        ParamType::Other(_) => true,
    }
}

/// Check names and types of `args` against the descriptor.
pub fn validate(descriptor: &FunctionDescriptor, args: &Args) -> Result<(), ValidationError> {
    let mut err = ValidationError::default();

    for p in &descriptor.parameters {
        match args.get(&p.name) {
            // A `None` parameter is satisfied by absence as well as by null.
            None if p.required && p.param_type != ParamType::None => err.missing.push(p.name.clone()),
            None => {}
            Some(v) if !type_matches(&p.param_type, v) => err.mismatched.push(TypeMismatch {
                name: p.name.clone(),
                expected: p.param_type.clone(),
                found: json_type_name(v),
            }),
            Some(_) => {}
        }
    }
    err.unexpected = args
        .keys()
        .filter(|k| descriptor.parameter(k).is_none())
        .cloned()
        .collect();

    err.missing.sort();
    err.unexpected.sort();

    if err.is_empty() { Ok(()) } else { Err(err) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParameterSpec;
    use serde_json::json;

    fn descriptor() -> FunctionDescriptor {
        FunctionDescriptor::new(
            "climate_module",
            "builtin://climate_module",
            "set_cabin_temperature",
            vec![ParameterSpec::new("temperature", "float"), ParameterSpec::new("zone", "str")],
        )
    }

    fn args(v: Value) -> Args {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn accepts_exact_match() {
        assert!(validate(&descriptor(), &args(json!({"temperature": 22.5, "zone": "driver"}))).is_ok());
        assert!(validate(&descriptor(), &args(json!({"temperature": 22, "zone": "driver"}))).is_ok());
    }

    #[test]
    fn reports_everything_at_once() {
        let err = validate(&descriptor(), &args(json!({"temperature": "hot", "fan": 3, "mode": "auto"}))).unwrap_err();
        assert_eq!(err.missing, ["zone"]);
        assert_eq!(err.unexpected, ["fan", "mode"]);
        assert_eq!(err.mismatched.len(), 1);
        assert_eq!(err.offending().into_iter().collect::<Vec<_>>(), ["fan", "mode", "temperature", "zone"]);
        assert_eq!(
            err.to_string(),
            "Missing required parameters: zone; Unexpected parameters: fan, mode; \
             Parameter 'temperature' should be float, got str"
        );
    }

    #[test]
    fn names_checked_regardless_of_types() {
        let err = validate(&descriptor(), &args(json!({"zone": null}))).unwrap_err();
        assert_eq!(err.missing, ["temperature"]);
        assert!(err.unexpected.is_empty());
    }

    #[test]
    fn none_requires_null_and_unknown_skips() {
        let d = FunctionDescriptor::new(
            "m",
            "p",
            "f",
            vec![ParameterSpec::new("nothing", "None"), ParameterSpec::new("cb", "Callable")],
        );
        assert!(validate(&d, &args(json!({"nothing": null, "cb": 42}))).is_ok());
        let err = validate(&d, &args(json!({"nothing": 0, "cb": "anything"}))).unwrap_err();
        assert_eq!(err.mismatched[0].name, "nothing");
        assert_eq!(err.mismatched[0].found, "int");
    }

    #[test]
    fn optional_parameter_may_be_absent() {
        let d = FunctionDescriptor::new("m", "p", "f", vec![ParameterSpec::new("limit", "int").optional()]);
        assert!(validate(&d, &Args::new()).is_ok());
        assert!(validate(&d, &args(json!({"limit": 1.5}))).is_err());
    }

    #[test]
    fn none_type_absent_or_null() {
        let d = FunctionDescriptor::new("m", "p", "reset", vec![ParameterSpec::new("marker", "None")]);
        assert!(validate(&d, &Args::new()).is_ok());
        assert!(validate(&d, &args(json!({"marker": null}))).is_ok());
        let err = validate(&d, &args(json!({"marker": 0}))).unwrap_err();
        assert_eq!(err.to_string(), "Parameter 'marker' should be None, got int");
    }
}
