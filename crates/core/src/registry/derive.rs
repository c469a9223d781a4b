//! Catalogue authoring: build catalogue entries from Rust source with `syn`.
//!
//! Free functions and methods in `impl` blocks become functions. A `self`
//! receiver is not a parameter. `Option<T>` parameters are optional.

use std::path::Path;
use syn::{FnArg, GenericArgument, ImplItem, Item, Pat, PathArguments, Signature, Type};

use super::catalogue::{FunctionEntry, ModuleEntry};
use crate::types::{ParamType, ParameterSpec};

#[derive(Debug, thiserror::Error)]
pub enum DeriveError {
    #[error("cannot read {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("cannot parse {path}: {source}")]
    Parse { path: String, source: syn::Error },
}

/// Module entry for a source file, named after the file stem.
pub fn derive_module(path: impl AsRef<Path>) -> Result<ModuleEntry, DeriveError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let source =
        std::fs::read_to_string(path).map_err(|source| DeriveError::Io { path: display.clone(), source })?;
    let module_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| display.clone());
    derive_from_source(&module_name, &display, &source).map_err(|source| DeriveError::Parse { path: display, source })
}

pub fn derive_from_source(module_name: &str, module_path: &str, source: &str) -> Result<ModuleEntry, syn::Error> {
    let file = syn::parse_file(source)?;
    let mut functions = Vec::new();

    for item in &file.items {
        match item {
            Item::Fn(f) => push_entry(&mut functions, &f.sig, &f.attrs),
            Item::Impl(block) => {
                for inner in &block.items {
                    if let ImplItem::Fn(m) = inner {
                        push_entry(&mut functions, &m.sig, &m.attrs);
                    }
                }
            }
            _ => {}
        }
    }

    tracing::debug!(module = module_name, functions = functions.len(), "derived catalogue module");
    Ok(ModuleEntry { module_name: module_name.to_string(), module_path: module_path.to_string(), functions })
}

fn push_entry(out: &mut Vec<FunctionEntry>, sig: &Signature, attrs: &[syn::Attribute]) {
    let name = sig.ident.to_string();
    if name.starts_with('_') {
        return;
    }

    let parameters: Vec<ParameterSpec> = sig
        .inputs
        .iter()
        .enumerate()
        .filter_map(|(i, arg)| match arg {
            FnArg::Receiver(_) => None,
            FnArg::Typed(typed) => {
                let name = match typed.pat.as_ref() {
                    Pat::Ident(ident) => ident.ident.to_string(),
                    _ => format!("arg{i}"),
                };
                let (param_type, optional) = map_type(&typed.ty);
                let spec = ParameterSpec::new(name, param_type);
                Some(if optional { spec.optional() } else { spec })
            }
        })
        .collect();

    let required = parameters.iter().filter(|p| p.required).map(|p| p.name.clone()).collect();
    out.push(FunctionEntry { function_name: name, description: doc_summary(attrs), parameters, required: Some(required) });
}

/// First non-empty `///` line.
fn doc_summary(attrs: &[syn::Attribute]) -> Option<String> {
    attrs.iter().filter(|a| a.path().is_ident("doc")).find_map(|a| match &a.meta {
        syn::Meta::NameValue(nv) => match &nv.value {
            syn::Expr::Lit(syn::ExprLit { lit: syn::Lit::Str(s), .. }) => {
                let line = s.value().trim().to_string();
                (!line.is_empty()).then_some(line)
            }
            _ => None,
        },
        _ => None,
    })
}

/// Map a Rust type to the parameter vocabulary. The flag is true for `Option<T>`.
pub fn map_type(ty: &Type) -> (ParamType, bool) {
    match ty {
        Type::Reference(r) => map_type(&r.elem),
        Type::Paren(p) => map_type(&p.elem),
        Type::Group(g) => map_type(&g.elem),
        Type::Slice(_) | Type::Array(_) => (ParamType::List, false),
        Type::Tuple(t) if t.elems.is_empty() => (ParamType::None, false),
        Type::Tuple(_) => (ParamType::Tuple, false),
        Type::Path(p) => {
            let Some(last) = p.path.segments.last() else {
                return (ParamType::Str, false);
            };
            let ty = match last.ident.to_string().as_str() {
                "Option" => return (option_inner(&last.arguments).map_or(ParamType::Str, |t| map_type(t).0), true),
                "String" | "str" | "char" | "PathBuf" | "Path" => ParamType::Str,
                "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64" | "u128" | "usize" => {
                    ParamType::Int
                }
                "f32" | "f64" => ParamType::Float,
                "bool" => ParamType::Bool,
                "Vec" | "VecDeque" | "HashSet" | "BTreeSet" => ParamType::List,
                "HashMap" | "BTreeMap" | "Map" | "Value" => ParamType::Dict,
                _ => ParamType::Str,
            };
            (ty, false)
        }
        _ => (ParamType::Str, false),
    }
}

fn option_inner(args: &PathArguments) -> Option<&Type> {
    match args {
        PathArguments::AngleBracketed(ab) => ab.args.iter().find_map(|a| match a {
            GenericArgument::Type(t) => Some(t),
            _ => None,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
        /// Set the cabin temperature.
        pub fn set_cabin_temperature(temperature: f64, zone: &str) -> bool { true }

        fn _private_helper(x: i32) {}

        pub struct Media;

        impl Media {
            /// Start playback.
            pub fn play_media(&self, media_type: String, tags: Vec<String>, volume: Option<u8>) {}
            pub fn configure(&mut self, options: HashMap<String, Value>, point: (f64, f64), marker: (), cb: Box<dyn Fn()>) {}
        }
    "#;

    #[test]
    fn derives_functions_and_methods() {
        let module = derive_from_source("vehicle", "src/vehicle.rs", SOURCE).unwrap();
        let names: Vec<&str> = module.functions.iter().map(|f| f.function_name.as_str()).collect();
        assert_eq!(names, ["set_cabin_temperature", "play_media", "configure"]);

        let temp = &module.functions[0];
        assert_eq!(temp.description.as_deref(), Some("Set the cabin temperature."));
        assert_eq!(temp.parameters[0].param_type, ParamType::Float);
        assert_eq!(temp.parameters[1].param_type, ParamType::Str);
    }

    #[test]
    fn receiver_skipped_and_option_optional() {
        let module = derive_from_source("vehicle", "src/vehicle.rs", SOURCE).unwrap();
        let play = &module.functions[1];
        let params: Vec<(&str, &ParamType, bool)> =
            play.parameters.iter().map(|p| (p.name.as_str(), &p.param_type, p.required)).collect();
        assert_eq!(params, [
            ("media_type", &ParamType::Str, true),
            ("tags", &ParamType::List, true),
            ("volume", &ParamType::Int, false),
        ]);
        assert_eq!(play.required.as_deref(), Some(&["media_type".to_string(), "tags".to_string()][..]));
    }

    #[test]
    fn container_and_unknown_types() {
        let module = derive_from_source("vehicle", "src/vehicle.rs", SOURCE).unwrap();
        let types: Vec<&ParamType> = module.functions[2].parameters.iter().map(|p| &p.param_type).collect();
        assert_eq!(types, [&ParamType::Dict, &ParamType::Tuple, &ParamType::None, &ParamType::Str]);
    }

    #[test]
    fn syntax_error_reported() {
        assert!(derive_from_source("bad", "bad.rs", "fn broken(").is_err());
        let err = derive_module("/no/such/file.rs").unwrap_err();
        assert!(matches!(err, DeriveError::Io { .. }));
    }

    #[test]
    fn file_stem_names_module() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("climate_module.rs");
        std::fs::write(&path, "pub fn activate(enable: bool) {}").unwrap();
        let module = derive_module(&path).unwrap();
        assert_eq!(module.module_name, "climate_module");
        assert_eq!(module.functions[0].parameters[0].param_type, ParamType::Bool);
    }
}
