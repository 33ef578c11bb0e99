//! RawDiffusion Core - Template-to-Script Compiler
//!
//! Turns a declarative generation template plus a set of parameter values
//! into a standalone Python script.
//!
//! # Ground Rules
//! 1. Templates Are Data - loaded, never executed
//! 2. Synthesis Is Total - any structurally valid template compiles
//! 3. Deterministic Output - same inputs, same script (timestamp aside)
//! 4. Load Failures Degrade - a bad file is skipped, never fatal
//! 5. The Compiler Never Runs Code - execution belongs to the runner

pub mod codegen;
pub mod config;
pub mod params;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod templates;

pub use codegen::{format_literal, ScriptGenerator, RANDOM_SEED_SENTINEL};
pub use config::{GeneratorConfig, Strictness};
pub use params::{ParameterResolver, ResolveError};
pub use pipeline::{CompileError, CompiledScript, GenerateRequest, ScriptCompiler};
pub use progress::{classify_stderr, classify_stdout, LineEvent};
pub use prompt::{compose_prompt, ModifierSelection};
pub use templates::{
    Architecture, Category, EffectiveParameters, ParamType, ParamValue, ParameterSpec, Template,
    TemplateId, TemplateStore,
};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
