//! Generation Pipeline - Single Entry Point
//!
//! Ties the stages together in one direction:
//! store -> resolver -> prompt composer -> synthesizer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codegen::ScriptGenerator;
use crate::config::{GeneratorConfig, Strictness};
use crate::params::{ParameterResolver, ResolveError};
use crate::prompt::{compose_prompt, ModifierSelection};
use crate::templates::{EffectiveParameters, ParamValue, TemplateStore};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Parameter resolution failed: {0}")]
    Resolution(#[from] ResolveError),
}

/// One generation request. Parameters, preset, and modifiers are optional;
/// omitted parameters resolve to the template's declared defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub template_id: String,
    #[serde(default)]
    pub parameters: Option<EffectiveParameters>,
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub modifiers: ModifierSelection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledScript {
    pub template_id: String,
    pub template_name: String,
    pub created_at: DateTime<Utc>,
    pub code: String,
}

/// The compiler facade. Holds the loaded store, the resolution policy, and
/// the generator configuration; `compile` is the one way to produce a script.
pub struct ScriptCompiler {
    store: TemplateStore,
    resolver: ParameterResolver,
    generator: ScriptGenerator,
}

impl ScriptCompiler {
    pub fn new(store: TemplateStore, config: GeneratorConfig, strictness: Strictness) -> Self {
        Self {
            store,
            resolver: ParameterResolver::new(strictness),
            generator: ScriptGenerator::new(config),
        }
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TemplateStore {
        &mut self.store
    }

    pub fn compile(&self, request: &GenerateRequest) -> Result<CompiledScript, CompileError> {
        self.compile_at(request, Utc::now())
    }

    /// `compile` with an explicit timestamp, for deterministic output.
    pub fn compile_at(
        &self,
        request: &GenerateRequest,
        timestamp: DateTime<Utc>,
    ) -> Result<CompiledScript, CompileError> {
        let template = self
            .store
            .get(&request.template_id)
            .ok_or_else(|| CompileError::TemplateNotFound(request.template_id.clone()))?;

        let mut params = self
            .resolver
            .resolve_effective(template, request.parameters.clone())?;

        if let Some(preset) = &request.preset {
            self.resolver.apply_preset(&mut params, template, preset)?;
        }

        if !request.modifiers.is_empty() {
            if let Some(raw) = params.get("prompt").and_then(ParamValue::as_str) {
                let composed = compose_prompt(template, raw, &request.modifiers);
                params.insert("prompt".to_string(), ParamValue::Text(composed));
            }
        }

        let code = self.generator.generate_at(template, &params, timestamp);

        Ok(CompiledScript {
            template_id: template.id.clone(),
            template_name: template.name.clone(),
            created_at: timestamp,
            code,
        })
    }
}
