//! Template System - Declarative Generation Recipes
//!
//! Templates are JSON records describing one image-generation workflow:
//! model requirements, tunable parameters, presets, and prompt modifiers.
//! The store loads them from an ordered list of candidate directories.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub type TemplateId = String;

/// Resolved parameter values used for one code-synthesis call.
pub type EffectiveParameters = BTreeMap<String, ParamValue>;

/// A preset's partial parameter overrides, keyed by parameter name.
/// The reserved `description` key documents the preset and is never applied.
pub type PresetOverrides = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub id: TemplateId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub requirements: Requirements,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterSpec>,
    #[serde(default)]
    pub pipeline: Vec<PipelineStep>,
    #[serde(default)]
    pub presets: BTreeMap<String, PresetOverrides>,
    #[serde(default)]
    pub style_templates: BTreeMap<String, String>,
    #[serde(default)]
    pub lighting_modifiers: BTreeMap<String, String>,
    #[serde(default)]
    pub atmosphere_modifiers: BTreeMap<String, String>,
    /// Per-target-surface configuration. Opaque to the compiler.
    #[serde(default)]
    pub app_adaptations: BTreeMap<String, serde_json::Value>,
}

fn default_difficulty() -> String {
    "beginner".to_string()
}

impl Template {
    /// Minimal validity: non-empty id, name, and parameter mapping.
    pub fn check_minimal(&self) -> Result<(), TemplateError> {
        if self.id.is_empty() {
            return Err(TemplateError::Invalid("missing id"));
        }
        if self.name.is_empty() {
            return Err(TemplateError::Invalid("missing name"));
        }
        if self.parameters.is_empty() {
            return Err(TemplateError::Invalid("empty parameter mapping"));
        }
        Ok(())
    }

    pub fn declares(&self, key: &str) -> bool {
        self.parameters.contains_key(key)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Txt2Img,
    Img2Img,
    Inpaint,
    Upscale,
    Animation,
    Video,
    #[default]
    #[serde(other)]
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Txt2Img => "txt2img",
            Category::Img2Img => "img2img",
            Category::Inpaint => "inpaint",
            Category::Upscale => "upscale",
            Category::Animation => "animation",
            Category::Video => "video",
            Category::General => "general",
        }
    }

    /// Categories whose generated scripts read an input image.
    pub fn takes_image_input(&self) -> bool {
        matches!(self, Category::Img2Img | Category::Inpaint)
    }

    /// Categories that produce a multi-frame artifact.
    pub fn is_video(&self) -> bool {
        matches!(self, Category::Animation | Category::Video)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Sd15,
    Sdxl,
    /// Unrecognized architectures take the SD 1.5 code paths.
    #[default]
    #[serde(other)]
    Other,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Sd15 => "sd15",
            Architecture::Sdxl => "sdxl",
            Architecture::Other => "other",
        }
    }

    /// Architecture prefix used when computing default auxiliary-model
    /// identifiers. Unrecognized architectures fall back to sd15.
    pub fn convention_prefix(&self) -> &'static str {
        match self {
            Architecture::Sdxl => "sdxl",
            _ => "sd15",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub base_model: BaseModel,
    #[serde(default)]
    pub min_vram_gb: Option<u32>,
    #[serde(default)]
    pub loras: Vec<LoraSpec>,
    #[serde(default)]
    pub controlnets: Vec<ControlNetSpec>,
    #[serde(default)]
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseModel {
    #[serde(default)]
    pub architecture: Architecture,
    #[serde(default)]
    pub recommended: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoraSpec {
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlNetSpec {
    #[serde(rename = "type")]
    pub control_type: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_weight")]
    pub strength: f64,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Select,
    Image,
    Video,
    Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub default: ParamValue,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    /// Required when `param_type` is `Select`.
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub group: Option<String>,
    /// UI-only visibility hint. Never evaluated by the compiler.
    #[serde(default)]
    pub visible_if: Option<serde_json::Value>,
}

/// A parameter value, tagged by its runtime shape.
///
/// Literal formatting in the synthesizer dispatches on this tag instead of
/// inspecting dynamic values at each emission site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Abstract pipeline step descriptor. Carried through untouched; the
/// synthesizer keys off template metadata, not individual steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub skip_if: Option<String>,
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse template JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("template rejected: {0}")]
    Invalid(&'static str),
}

/// Template store - loads definition files from candidate directories.
///
/// Two states: `Unloaded` and `Loaded`. A (re)load builds a fresh list and
/// swaps it in whole, so readers never observe a partially filled store.
pub struct TemplateStore {
    directories: Vec<PathBuf>,
    state: StoreState,
}

enum StoreState {
    Unloaded,
    Loaded(Vec<Template>),
}

impl TemplateStore {
    pub fn new(directories: Vec<PathBuf>) -> Self {
        Self {
            directories,
            state: StoreState::Unloaded,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, StoreState::Loaded(_))
    }

    /// Scan every configured directory and swap in the result.
    ///
    /// Files that fail to parse or fail the minimal-validity check are
    /// skipped and logged; a bad file never aborts the batch. Duplicate ids
    /// across directories are retained as separate entries. Returns the
    /// number of templates loaded.
    pub fn load(&mut self) -> usize {
        let mut list = Vec::new();
        for dir in &self.directories {
            scan_directory(dir, &mut list);
        }
        // Stable sort: category first, then name, case-sensitive.
        list.sort_by(|a, b| {
            (a.category.as_str(), a.name.as_str()).cmp(&(b.category.as_str(), b.name.as_str()))
        });
        let count = list.len();
        tracing::debug!(count, "template store loaded");
        self.state = StoreState::Loaded(list);
        count
    }

    /// Re-run the full load from scratch, replacing the backing list.
    pub fn refresh(&mut self) -> usize {
        self.load()
    }

    pub fn templates(&self) -> &[Template] {
        match &self.state {
            StoreState::Loaded(list) => list,
            StoreState::Unloaded => &[],
        }
    }

    /// First match in list order.
    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates().iter().find(|t| t.id == id)
    }

    pub fn by_category(&self, category: Category) -> Vec<&Template> {
        self.templates()
            .iter()
            .filter(|t| t.category == category)
            .collect()
    }

    pub fn by_tag(&self, tag: &str) -> Vec<&Template> {
        self.templates().iter().filter(|t| t.has_tag(tag)).collect()
    }

    /// Insert a template directly, bypassing the filesystem. Keeps the list
    /// in sorted order. Used by callers that assemble templates in memory.
    pub fn register(&mut self, template: Template) {
        if !self.is_loaded() {
            self.state = StoreState::Loaded(Vec::new());
        }
        if let StoreState::Loaded(list) = &mut self.state {
            list.push(template);
            list.sort_by(|a, b| {
                (a.category.as_str(), a.name.as_str())
                    .cmp(&(b.category.as_str(), b.name.as_str()))
            });
        }
    }
}

fn scan_directory(dir: &Path, out: &mut Vec<Template>) {
    if !dir.exists() {
        tracing::debug!(dir = %dir.display(), "template directory absent, skipping");
        return;
    }

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if path.extension().map_or(true, |e| e != "json") {
            continue;
        }
        if is_excluded(path) {
            continue;
        }

        match load_template_file(path) {
            Ok(template) => out.push(template),
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping template");
            }
        }
    }
}

/// Schema and vendor material lives alongside the definitions; skip it.
fn is_excluded(path: &Path) -> bool {
    path.to_string_lossy().contains("schema")
        || path
            .components()
            .any(|c| c.as_os_str() == "vendor" || c.as_os_str() == "previews")
}

fn load_template_file(path: &Path) -> Result<Template, TemplateError> {
    let content = fs::read_to_string(path)?;
    let template: Template = serde_json::from_str(&content)?;
    template.check_minimal()?;
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, body: &str) {
        fs::write(dir.join(name), body).unwrap();
    }

    fn minimal_json(id: &str, name: &str, category: &str) -> String {
        format!(
            r#"{{
                "id": "{id}",
                "name": "{name}",
                "category": "{category}",
                "parameters": {{
                    "prompt": {{"type": "string", "default": "a cat"}}
                }}
            }}"#
        )
    }

    #[test]
    fn load_skips_malformed_and_incomplete_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.json", &minimal_json("t1", "Good", "txt2img"));
        write(dir.path(), "broken.json", "{ not json");
        write(dir.path(), "no-params.json", r#"{"id": "t2", "name": "Empty"}"#);
        write(dir.path(), "notes.txt", "not a template");

        let mut store = TemplateStore::new(vec![dir.path().to_path_buf()]);
        assert_eq!(store.load(), 1);
        assert!(store.get("t1").is_some());
        assert!(store.get("t2").is_none());
    }

    #[test]
    fn load_excludes_schema_and_vendor_subfolders() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("schemas")).unwrap();
        fs::create_dir(dir.path().join("vendor")).unwrap();
        write(
            &dir.path().join("schemas"),
            "a.json",
            &minimal_json("s1", "Schema", "txt2img"),
        );
        write(
            &dir.path().join("vendor"),
            "b.json",
            &minimal_json("v1", "Vendor", "txt2img"),
        );
        write(dir.path(), "real.json", &minimal_json("t1", "Real", "txt2img"));

        let mut store = TemplateStore::new(vec![dir.path().to_path_buf()]);
        assert_eq!(store.load(), 1);
        assert_eq!(store.templates()[0].id, "t1");
    }

    #[test]
    fn list_is_sorted_by_category_then_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", &minimal_json("a", "Zebra", "img2img"));
        write(dir.path(), "b.json", &minimal_json("b", "Apple", "txt2img"));
        write(dir.path(), "c.json", &minimal_json("c", "Mango", "img2img"));

        let mut store = TemplateStore::new(vec![dir.path().to_path_buf()]);
        store.load();

        let names: Vec<_> = store.templates().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Mango", "Zebra", "Apple"]);
    }

    #[test]
    fn unloaded_store_is_empty() {
        let store = TemplateStore::new(vec![]);
        assert!(!store.is_loaded());
        assert!(store.templates().is_empty());
        assert!(store.get("anything").is_none());
    }

    #[test]
    fn refresh_picks_up_new_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", &minimal_json("t1", "First", "txt2img"));

        let mut store = TemplateStore::new(vec![dir.path().to_path_buf()]);
        assert_eq!(store.load(), 1);

        write(dir.path(), "b.json", &minimal_json("t2", "Second", "txt2img"));
        assert_eq!(store.refresh(), 2);
        assert!(store.get("t2").is_some());
    }

    #[test]
    fn query_by_tag_and_category() {
        let dir = tempfile::tempdir().unwrap();
        let mut json: serde_json::Value =
            serde_json::from_str(&minimal_json("t1", "Tagged", "img2img")).unwrap();
        json["tags"] = serde_json::json!(["portrait", "photo"]);
        write(dir.path(), "a.json", &json.to_string());
        write(dir.path(), "b.json", &minimal_json("t2", "Plain", "txt2img"));

        let mut store = TemplateStore::new(vec![dir.path().to_path_buf()]);
        store.load();

        assert_eq!(store.by_tag("portrait").len(), 1);
        assert_eq!(store.by_tag("nonexistent").len(), 0);
        assert_eq!(store.by_category(Category::Img2Img).len(), 1);
        assert_eq!(store.by_category(Category::Txt2Img).len(), 1);
    }

    #[test]
    fn unknown_category_and_architecture_parse_as_catchall() {
        let json = r#"{
            "id": "t1",
            "name": "Weird",
            "category": "mosaic",
            "requirements": {"base_model": {"architecture": "flux"}},
            "parameters": {"prompt": {"type": "string", "default": "x"}}
        }"#;
        let t: Template = serde_json::from_str(json).unwrap();
        assert_eq!(t.category, Category::General);
        assert_eq!(t.requirements.base_model.architecture, Architecture::Other);
    }

    #[test]
    fn param_values_deserialize_by_shape() {
        let v: ParamValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, ParamValue::Bool(true));
        let v: ParamValue = serde_json::from_str("30").unwrap();
        assert_eq!(v, ParamValue::Int(30));
        let v: ParamValue = serde_json::from_str("7.5").unwrap();
        assert_eq!(v, ParamValue::Number(7.5));
        let v: ParamValue = serde_json::from_str("\"hello\"").unwrap();
        assert_eq!(v, ParamValue::Text("hello".to_string()));
    }
}
