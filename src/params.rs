//! Parameter Resolution - Defaults, Overrides, Presets
//!
//! An effective parameter set comes from exactly one origin: either the
//! caller supplies a complete override set (returned unchanged, never
//! back-filled), or every declared default is copied. Presets overlay on
//! top of an already-resolved set.

use thiserror::Error;

use crate::config::Strictness;
use crate::templates::{EffectiveParameters, Template};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("Preset '{preset}' overrides undeclared parameter: {key}")]
    UndeclaredPresetKey { preset: String, key: String },

    #[error("Override set references undeclared parameter: {0}")]
    UndeclaredOverride(String),

    #[error("Override set is missing declared parameter: {0}")]
    MissingOverride(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterResolver {
    strictness: Strictness,
}

impl ParameterResolver {
    pub fn new(strictness: Strictness) -> Self {
        Self { strictness }
    }

    /// Copy every declared default, keyed identically to the template.
    pub fn resolve_defaults(&self, template: &Template) -> EffectiveParameters {
        template
            .parameters
            .iter()
            .map(|(key, spec)| (key.clone(), spec.default.clone()))
            .collect()
    }

    /// Caller-supplied overrides are returned unchanged; there is no merge
    /// with defaults. Absent overrides resolve to the declared defaults.
    ///
    /// Under `Strict`, the override set must cover exactly the declared
    /// parameter keys.
    pub fn resolve_effective(
        &self,
        template: &Template,
        overrides: Option<EffectiveParameters>,
    ) -> Result<EffectiveParameters, ResolveError> {
        match overrides {
            None => Ok(self.resolve_defaults(template)),
            Some(params) => {
                if self.strictness == Strictness::Strict {
                    for key in params.keys() {
                        if !template.declares(key) {
                            return Err(ResolveError::UndeclaredOverride(key.clone()));
                        }
                    }
                    for key in template.parameters.keys() {
                        if !params.contains_key(key) {
                            return Err(ResolveError::MissingOverride(key.clone()));
                        }
                    }
                }
                Ok(params)
            }
        }
    }

    /// Overwrite `params` with the named preset's values. The reserved
    /// `description` key is skipped; keys absent from the preset are left
    /// untouched. An unknown preset name is always a caller error.
    pub fn apply_preset(
        &self,
        params: &mut EffectiveParameters,
        template: &Template,
        preset_name: &str,
    ) -> Result<(), ResolveError> {
        let preset = template
            .presets
            .get(preset_name)
            .ok_or_else(|| ResolveError::UnknownPreset(preset_name.to_string()))?;

        for (key, value) in preset {
            if key == "description" {
                continue;
            }
            if self.strictness == Strictness::Strict && !template.declares(key) {
                return Err(ResolveError::UndeclaredPresetKey {
                    preset: preset_name.to_string(),
                    key: key.clone(),
                });
            }
            params.insert(key.clone(), value.clone());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::ParamValue;
    use std::collections::BTreeMap;

    fn template_with_presets() -> Template {
        serde_json::from_str(
            r#"{
                "id": "t1",
                "name": "Test",
                "category": "txt2img",
                "parameters": {
                    "prompt": {"type": "string", "default": "a cat"},
                    "steps": {"type": "integer", "default": 20},
                    "cfg": {"type": "number", "default": 7.5}
                },
                "presets": {
                    "fast": {
                        "description": "Fewer steps for drafts",
                        "steps": 8,
                        "cfg": 5.0
                    },
                    "sloppy": {
                        "bogus_key": 1
                    }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn defaults_copy_every_declared_parameter() {
        let t = template_with_presets();
        let resolver = ParameterResolver::default();
        let params = resolver.resolve_defaults(&t);

        assert_eq!(params.len(), 3);
        assert_eq!(params["prompt"], ParamValue::Text("a cat".to_string()));
        assert_eq!(params["steps"], ParamValue::Int(20));
        assert_eq!(params["cfg"], ParamValue::Number(7.5));
    }

    #[test]
    fn overrides_are_never_merged_with_defaults() {
        let t = template_with_presets();
        let resolver = ParameterResolver::default();

        let mut partial = BTreeMap::new();
        partial.insert("steps".to_string(), ParamValue::Int(50));

        let resolved = resolver.resolve_effective(&t, Some(partial.clone())).unwrap();
        assert_eq!(resolved, partial);
        assert!(!resolved.contains_key("prompt"));
    }

    #[test]
    fn absent_overrides_resolve_to_defaults() {
        let t = template_with_presets();
        let resolver = ParameterResolver::default();
        let resolved = resolver.resolve_effective(&t, None).unwrap();
        assert_eq!(resolved, resolver.resolve_defaults(&t));
    }

    #[test]
    fn preset_overwrites_named_keys_and_skips_description() {
        let t = template_with_presets();
        let resolver = ParameterResolver::default();
        let mut params = resolver.resolve_defaults(&t);

        resolver.apply_preset(&mut params, &t, "fast").unwrap();

        assert_eq!(params["steps"], ParamValue::Int(8));
        assert_eq!(params["cfg"], ParamValue::Number(5.0));
        assert_eq!(params["prompt"], ParamValue::Text("a cat".to_string()));
        assert!(!params.contains_key("description"));
    }

    #[test]
    fn unknown_preset_is_an_error() {
        let t = template_with_presets();
        let resolver = ParameterResolver::default();
        let mut params = resolver.resolve_defaults(&t);

        let err = resolver.apply_preset(&mut params, &t, "nope").unwrap_err();
        assert!(matches!(err, ResolveError::UnknownPreset(name) if name == "nope"));
    }

    #[test]
    fn permissive_mode_accepts_undeclared_preset_keys() {
        let t = template_with_presets();
        let resolver = ParameterResolver::new(Strictness::Permissive);
        let mut params = resolver.resolve_defaults(&t);

        resolver.apply_preset(&mut params, &t, "sloppy").unwrap();
        assert_eq!(params["bogus_key"], ParamValue::Int(1));
    }

    #[test]
    fn strict_mode_rejects_undeclared_preset_keys() {
        let t = template_with_presets();
        let resolver = ParameterResolver::new(Strictness::Strict);
        let mut params = resolver.resolve_defaults(&t);

        let err = resolver.apply_preset(&mut params, &t, "sloppy").unwrap_err();
        assert!(matches!(err, ResolveError::UndeclaredPresetKey { .. }));
    }

    #[test]
    fn strict_mode_requires_complete_override_sets() {
        let t = template_with_presets();
        let resolver = ParameterResolver::new(Strictness::Strict);

        let mut partial = BTreeMap::new();
        partial.insert("steps".to_string(), ParamValue::Int(50));
        let err = resolver.resolve_effective(&t, Some(partial)).unwrap_err();
        assert!(matches!(err, ResolveError::MissingOverride(_)));

        let mut extra = resolver.resolve_defaults(&t);
        extra.insert("mystery".to_string(), ParamValue::Bool(true));
        let err = resolver.resolve_effective(&t, Some(extra)).unwrap_err();
        assert!(matches!(err, ResolveError::UndeclaredOverride(key) if key == "mystery"));
    }
}
