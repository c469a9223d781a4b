use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::types::{FunctionDescriptor, ParameterSpec};

/// Keyword → function fallback used when fuzzy search finds nothing.
/// The first keyword contained in the utterance wins.
pub const DEFAULT_KEYWORDS: [(&str, &str); 9] = [
    ("温度", "climate_module.set_cabin_temperature"),
    ("空调", "climate_module.activate_climate_preconditioning"),
    ("音量", "media_module.adjust_volume"),
    ("播放", "media_module.play_media"),
    ("导航", "navigation_module.set_destination"),
    ("充电", "navigation_module.find_charging_stations"),
    ("电池", "battery_module.get_battery_status"),
    ("驾驶", "driving_module.get_driving_statistics"),
    ("模式", "driving_module.set_driving_mode"),
];

#[derive(Debug, thiserror::Error)]
pub enum CatalogueError {
    #[error("cannot read catalogue {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("cannot write catalogue {path}: {source}")]
    Write { path: String, source: std::io::Error },
    #[error("malformed catalogue: {0}")]
    Parse(#[from] serde_json::Error),
}

// ── Document ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogueDocument {
    pub modules: Vec<ModuleEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_fallback: Option<Vec<(String, String)>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub module_name: String,
    pub module_path: String,
    #[serde(default)]
    pub functions: Vec<FunctionEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionEntry {
    pub function_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    /// Names of required parameters. When present, every other parameter is optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

// ── Catalogue ───────────────────────────────────────────────────

/// Loaded capability catalogue: unique descriptors in load order.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    descriptors: Vec<FunctionDescriptor>,
    keywords: Vec<(String, String)>,
}

impl Catalogue {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogueError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| CatalogueError::Read { path: path.display().to_string(), source })?;
        let catalogue = Self::from_json(&raw)?;
        tracing::info!(path = %path.display(), functions = catalogue.len(), "catalogue loaded");
        Ok(catalogue)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogueError> {
        let doc: CatalogueDocument = serde_json::from_str(raw)?;
        Ok(Self::from_document(doc))
    }

    pub fn from_document(doc: CatalogueDocument) -> Self {
        let descriptors = doc.modules.into_iter().flat_map(|module| {
            let ModuleEntry { module_name, module_path, functions } = module;
            functions.into_iter().map(move |f| {
                let mut parameters = f.parameters;
                if let Some(required) = &f.required {
                    for p in &mut parameters {
                        p.required = required.contains(&p.name);
                    }
                }
                let mut d = FunctionDescriptor::new(module_name.clone(), module_path.clone(), f.function_name, parameters);
                d.description = f.description;
                d
            })
        });
        let mut catalogue = Self::from_descriptors(descriptors);
        if let Some(keywords) = doc.keyword_fallback {
            catalogue.keywords = keywords;
        }
        catalogue
    }

    /// Build from descriptors. A repeated search key replaces the earlier entry in place.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = FunctionDescriptor>) -> Self {
        let mut out: Vec<FunctionDescriptor> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for d in descriptors {
            match index.get(&d.search_key) {
                Some(&i) => {
                    tracing::warn!(key = %d.search_key, "duplicate catalogue entry, keeping the later one");
                    out[i] = d;
                }
                None => {
                    index.insert(d.search_key.clone(), out.len());
                    out.push(d);
                }
            }
        }
        Self {
            descriptors: out,
            keywords: DEFAULT_KEYWORDS.iter().map(|(k, f)| (k.to_string(), f.to_string())).collect(),
        }
    }

    pub fn descriptors(&self) -> &[FunctionDescriptor] {
        &self.descriptors
    }

    pub fn keywords(&self) -> &[(String, String)] {
        &self.keywords
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn into_parts(self) -> (Vec<FunctionDescriptor>, Vec<(String, String)>) {
        (self.descriptors, self.keywords)
    }

    /// Regroup descriptors by module, preserving first-seen module order.
    pub fn to_document(&self) -> CatalogueDocument {
        let mut modules: Vec<ModuleEntry> = Vec::new();
        for d in &self.descriptors {
            let entry = FunctionEntry {
                function_name: d.function_name.clone(),
                description: d.description.clone(),
                parameters: d.parameters.clone(),
                required: d
                    .parameters
                    .iter()
                    .any(|p| !p.required)
                    .then(|| d.parameters.iter().filter(|p| p.required).map(|p| p.name.clone()).collect()),
            };
            match modules.iter_mut().find(|m| m.module_name == d.module_name) {
                Some(m) => m.functions.push(entry),
                None => modules.push(ModuleEntry {
                    module_name: d.module_name.clone(),
                    module_path: d.module_path.clone(),
                    functions: vec![entry],
                }),
            }
        }
        CatalogueDocument { modules, keyword_fallback: Some(self.keywords.clone()) }
    }

    /// Write the catalogue as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CatalogueError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.to_document())?;
        std::fs::write(path, json)
            .map_err(|source| CatalogueError::Write { path: path.display().to_string(), source })
    }
}
