//! External Configuration Surface
//!
//! Settings consumed by the compiler but owned by the host application
//! (editor extension, server, CLI). Read-only from the compiler's side.

use serde::{Deserialize, Serialize};

/// Host-supplied knobs that influence code synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Directory the generated script writes its artifact into.
    pub output_dir: String,
    /// Emit `pipe.enable_model_cpu_offload()` in the model-loading section.
    pub cpu_offload: bool,
    /// Value of the ENABLE_FREEU constant. The FreeU call itself is always
    /// emitted, gated by a runtime conditional in the script.
    pub enable_freeu: bool,
    pub freeu_s1: f64,
    pub freeu_s2: f64,
    pub freeu_b1: f64,
    pub freeu_b2: f64,
    /// Interpreter used by the external runner. Not consulted during
    /// synthesis; carried here so the whole surface lives in one record.
    pub interpreter_path: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            output_dir: "outputs".to_string(),
            cpu_offload: true,
            enable_freeu: false,
            freeu_s1: 0.9,
            freeu_s2: 0.2,
            freeu_b1: 1.2,
            freeu_b2: 1.4,
            interpreter_path: "python".to_string(),
        }
    }
}

/// How the resolver treats parameter keys outside a template's declarations.
///
/// `Permissive` mirrors the observed behavior of the original system;
/// `Strict` fails fast on undeclared or missing keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    #[default]
    Permissive,
    Strict,
}
