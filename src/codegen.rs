//! Code Synthesis - Script Assembly from Typed Sections
//!
//! The synthesizer builds an ordered sequence of typed sections (comments,
//! imports, constants, statements) and renders them with a single formatter.
//! Conditional-inclusion decisions live in the section builders; text
//! formatting lives in `render`. Synthesis is a pure function of the
//! template, the resolved parameters, and the generator configuration.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::config::GeneratorConfig;
use crate::templates::{
    Architecture, EffectiveParameters, ParamType, ParamValue, Template,
};

/// Sentinel seed value requesting a runtime-randomized seed.
pub const RANDOM_SEED_SENTINEL: i64 = -1;

const PLACEHOLDER_MODEL: &str = "model.safetensors";

/// One Python import. Plain imports order before from-imports; within each
/// group the derived ordering is lexicographic. Collected in a set, so
/// duplicates collapse.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Import {
    Plain(String),
    From(String, String),
}

impl Import {
    fn render(&self) -> String {
        match self {
            Import::Plain(module) => format!("import {module}"),
            Import::From(module, items) => format!("from {module} import {items}"),
        }
    }
}

enum ConstLine {
    Comment(String),
    Blank,
    Def(String, String),
}

enum Section {
    Comment(Vec<String>),
    Imports(BTreeSet<Import>),
    Constants(Vec<ConstLine>),
    Code(Vec<String>),
}

impl Section {
    fn render(&self) -> String {
        match self {
            Section::Comment(lines) => lines
                .iter()
                .map(|l| {
                    if l.is_empty() {
                        "#".to_string()
                    } else {
                        format!("# {l}")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Section::Imports(imports) => imports
                .iter()
                .map(Import::render)
                .collect::<Vec<_>>()
                .join("\n"),
            Section::Constants(lines) => lines
                .iter()
                .map(|c| match c {
                    ConstLine::Comment(text) => format!("# {text}"),
                    ConstLine::Blank => String::new(),
                    ConstLine::Def(name, literal) => format!("{name} = {literal}"),
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Section::Code(lines) => lines.join("\n"),
        }
    }
}

fn render_script(sections: &[Section]) -> String {
    let rendered: Vec<String> = sections
        .iter()
        .map(Section::render)
        .filter(|s| !s.is_empty())
        .collect();
    let mut script = rendered.join("\n\n");
    script.push('\n');
    script
}

/// Generates standalone Python scripts from a template and resolved
/// parameters.
pub struct ScriptGenerator {
    config: GeneratorConfig,
}

impl ScriptGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self, template: &Template, params: &EffectiveParameters) -> String {
        self.generate_at(template, params, Utc::now())
    }

    /// Same as [`generate`](Self::generate) with an explicit timestamp.
    /// Output is byte-identical for fixed inputs and timestamp.
    pub fn generate_at(
        &self,
        template: &Template,
        params: &EffectiveParameters,
        timestamp: DateTime<Utc>,
    ) -> String {
        let sections = [
            self.header(template, timestamp),
            self.imports(template, params),
            self.constants(template, params),
            self.model_loading(template),
            self.inference(template, params),
        ];
        render_script(&sections)
    }

    fn header(&self, template: &Template, timestamp: DateTime<Utc>) -> Section {
        let mut lines = vec![template.name.clone()];
        if !template.description.is_empty() {
            lines.push(template.description.clone());
        }
        lines.push(String::new());
        lines.push(format!(
            "Generated by RawDiffusion on {}",
            timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        Section::Comment(lines)
    }

    fn imports(&self, template: &Template, params: &EffectiveParameters) -> Section {
        let mut imports = BTreeSet::new();
        imports.insert(Import::Plain("os".to_string()));
        imports.insert(Import::Plain("torch".to_string()));

        // Base pipeline by architecture; anything unrecognized takes the
        // SD 1.5 import (default-fallback rule, not an error).
        let arch = template.requirements.base_model.architecture;
        let pipeline_class = base_pipeline_class(arch);
        imports.insert(Import::From("diffusers".to_string(), pipeline_class.to_string()));

        if !template.requirements.controlnets.is_empty() {
            imports.insert(Import::From(
                "diffusers".to_string(),
                "ControlNetModel".to_string(),
            ));
            for cn in &template.requirements.controlnets {
                match cn.control_type.as_str() {
                    "canny" => {
                        imports.insert(Import::Plain("cv2".to_string()));
                        imports.insert(Import::Plain("numpy as np".to_string()));
                    }
                    "depth" => {
                        imports.insert(Import::From(
                            "transformers".to_string(),
                            "DPTForDepthEstimation, DPTImageProcessor".to_string(),
                        ));
                    }
                    "openpose" => {
                        imports.insert(Import::From(
                            "controlnet_aux".to_string(),
                            "OpenposeDetector".to_string(),
                        ));
                    }
                    _ => {}
                }
            }
        }

        if template.category.takes_image_input() {
            imports.insert(Import::From("PIL".to_string(), "Image".to_string()));
        }

        if template.category.is_video() {
            imports.insert(Import::From(
                "diffusers".to_string(),
                "AnimateDiffPipeline".to_string(),
            ));
            imports.insert(Import::From(
                "diffusers.utils".to_string(),
                "export_to_video".to_string(),
            ));
        }

        if seed_is_sentinel(params) {
            imports.insert(Import::Plain("random".to_string()));
        }

        Section::Imports(imports)
    }

    fn constants(&self, template: &Template, params: &EffectiveParameters) -> Section {
        let mut lines = vec![ConstLine::Comment("Configuration".to_string())];

        let model_path = template
            .requirements
            .base_model
            .recommended
            .first()
            .cloned()
            .unwrap_or_else(|| PLACEHOLDER_MODEL.to_string());
        lines.push(ConstLine::Def(
            "MODEL_PATH".to_string(),
            format!("\"{model_path}\""),
        ));
        lines.push(ConstLine::Def(
            "OUTPUT_DIR".to_string(),
            format!("\"{}\"", self.config.output_dir),
        ));

        for (key, value) in params {
            lines.push(ConstLine::Def(
                key.to_uppercase(),
                format_literal(key, value),
            ));
        }

        lines.push(ConstLine::Blank);
        lines.push(ConstLine::Comment("Quality enhancement (FreeU)".to_string()));
        lines.push(ConstLine::Def(
            "ENABLE_FREEU".to_string(),
            py_bool(self.config.enable_freeu),
        ));
        lines.push(ConstLine::Def("FREEU_S1".to_string(), py_float(self.config.freeu_s1)));
        lines.push(ConstLine::Def("FREEU_S2".to_string(), py_float(self.config.freeu_s2)));
        lines.push(ConstLine::Def("FREEU_B1".to_string(), py_float(self.config.freeu_b1)));
        lines.push(ConstLine::Def("FREEU_B2".to_string(), py_float(self.config.freeu_b2)));

        Section::Constants(lines)
    }

    fn model_loading(&self, template: &Template) -> Section {
        let arch = template.requirements.base_model.architecture;
        let mut lines = vec![
            "# Setup".to_string(),
            r#"device = "cuda" if torch.cuda.is_available() else "cpu""#.to_string(),
            r#"dtype = torch.float16 if device == "cuda" else torch.float32"#.to_string(),
        ];

        if !template.requirements.controlnets.is_empty() {
            lines.push(String::new());
            lines.push("# Load ControlNet models".to_string());
            for (i, cn) in template.requirements.controlnets.iter().enumerate() {
                let model = cn.model.clone().unwrap_or_else(|| {
                    format!(
                        "lllyasviel/control_v11p_{}_{}",
                        arch.convention_prefix(),
                        cn.control_type
                    )
                });
                lines.push(format!(
                    r#"controlnet_{i} = ControlNetModel.from_pretrained("{model}", torch_dtype=dtype)"#
                ));
            }
        }

        let pipeline_class = if template.category.is_video() {
            "AnimateDiffPipeline"
        } else {
            base_pipeline_class(arch)
        };

        lines.push(String::new());
        lines.push("# Load base pipeline".to_string());
        lines.push(format!("pipe = {pipeline_class}.from_single_file("));
        lines.push("    MODEL_PATH,".to_string());
        lines.push("    torch_dtype=dtype,".to_string());
        lines.push(")".to_string());
        lines.push("pipe.to(device)".to_string());

        if !template.requirements.loras.is_empty() {
            lines.push(String::new());
            lines.push("# Load LoRA weights".to_string());
            for lora in &template.requirements.loras {
                let model = lora.model.clone().unwrap_or_else(|| {
                    format!("{}_{}.safetensors", arch.convention_prefix(), lora.name)
                });
                lines.push(format!(r#"pipe.load_lora_weights("{model}")"#));
                lines.push(format!("pipe.fuse_lora(lora_scale={})", py_float(lora.weight)));
            }
        }

        if self.config.cpu_offload {
            lines.push(String::new());
            lines.push("# Memory optimization".to_string());
            lines.push("pipe.enable_model_cpu_offload()".to_string());
        }

        // The FreeU call is gated in the script itself, not at compile time.
        lines.push(String::new());
        lines.push("# Quality enhancement".to_string());
        lines.push("if ENABLE_FREEU:".to_string());
        lines.push(
            "    pipe.enable_freeu(s1=FREEU_S1, s2=FREEU_S2, b1=FREEU_B1, b2=FREEU_B2)"
                .to_string(),
        );

        Section::Code(lines)
    }

    fn inference(&self, template: &Template, params: &EffectiveParameters) -> Section {
        let mut lines = vec!["# Generate".to_string()];

        if seed_is_sentinel(params) {
            lines.push("seed = random.randint(0, 2**32 - 1)".to_string());
        } else if params.contains_key("seed") {
            lines.push("seed = SEED".to_string());
        } else {
            lines.push("seed = 0".to_string());
        }
        lines.push("generator = torch.Generator(device).manual_seed(seed)".to_string());

        if template.category.takes_image_input() {
            lines.push(format!("init_image = Image.open({})", image_source(template)));
        }

        lines.push(String::new());
        lines.push("result = pipe(".to_string());
        for kwarg in self.call_kwargs(template, params) {
            lines.push(format!("    {kwarg},"));
        }
        lines.push(")".to_string());

        if template.category.is_video() {
            lines.push("frames = result.frames[0]".to_string());
        } else {
            lines.push("image = result.images[0]".to_string());
        }

        lines.push(String::new());
        lines.push("# Save output".to_string());
        lines.push("os.makedirs(OUTPUT_DIR, exist_ok=True)".to_string());
        if template.category.is_video() {
            lines.push(r#"output_path = os.path.join(OUTPUT_DIR, "output.mp4")"#.to_string());
            lines.push("export_to_video(frames, output_path)".to_string());
        } else {
            lines.push(r#"output_path = os.path.join(OUTPUT_DIR, f"{seed}.png")"#.to_string());
            lines.push("image.save(output_path)".to_string());
        }
        lines.push(r#"print(f"Saved to {output_path}")"#.to_string());

        Section::Code(lines)
    }

    fn call_kwargs(&self, template: &Template, params: &EffectiveParameters) -> Vec<String> {
        let mut kwargs = Vec::new();

        if params.contains_key("prompt") {
            kwargs.push("prompt=PROMPT".to_string());
        }
        if params.contains_key("negative_prompt") {
            kwargs.push("negative_prompt=NEGATIVE_PROMPT".to_string());
        }
        // Width and height only travel as a pair.
        if params.contains_key("width") && params.contains_key("height") {
            kwargs.push("width=WIDTH".to_string());
            kwargs.push("height=HEIGHT".to_string());
        }
        if params.contains_key("steps") {
            kwargs.push("num_inference_steps=STEPS".to_string());
        }
        if params.contains_key("cfg") {
            kwargs.push("guidance_scale=CFG".to_string());
        } else if params.contains_key("cfg_scale") {
            kwargs.push("guidance_scale=CFG_SCALE".to_string());
        }

        if template.category.takes_image_input() {
            kwargs.push("image=init_image".to_string());
            let strength = if params.contains_key("strength") {
                "STRENGTH"
            } else if params.contains_key("denoise") {
                "DENOISE"
            } else {
                "0.75"
            };
            kwargs.push(format!("strength={strength}"));
        }

        if template.category.is_video() {
            let frames = if params.contains_key("num_frames") {
                "NUM_FRAMES"
            } else {
                "16"
            };
            kwargs.push(format!("num_frames={frames}"));
        }

        kwargs.push("generator=generator".to_string());
        kwargs
    }
}

impl Default for ScriptGenerator {
    fn default() -> Self {
        Self::new(GeneratorConfig::default())
    }
}

fn base_pipeline_class(arch: Architecture) -> &'static str {
    match arch {
        Architecture::Sdxl => "StableDiffusionXLPipeline",
        Architecture::Sd15 | Architecture::Other => "StableDiffusionPipeline",
    }
}

fn seed_is_sentinel(params: &EffectiveParameters) -> bool {
    params
        .get("seed")
        .and_then(ParamValue::as_i64)
        .map_or(false, |s| s == RANDOM_SEED_SENTINEL)
}

/// Constant source for the init-image path: the first image-typed parameter
/// if the template declares one, else a literal placeholder.
fn image_source(template: &Template) -> String {
    template
        .parameters
        .iter()
        .find(|(_, spec)| spec.param_type == ParamType::Image)
        .map(|(key, _)| key.to_uppercase())
        .unwrap_or_else(|| "\"input.png\"".to_string())
}

/// Format one parameter value as a Python literal. Dispatch is driven by the
/// value's tag; string parameters whose key mentions "prompt" are emitted as
/// triple-quoted blocks to tolerate embedded quotes and newlines.
pub fn format_literal(key: &str, value: &ParamValue) -> String {
    match value {
        ParamValue::Bool(b) => py_bool(*b),
        ParamValue::Int(i) => i.to_string(),
        ParamValue::Number(n) => py_float(*n),
        ParamValue::Text(s) => {
            if key.contains("prompt") {
                format!("\"\"\"{s}\"\"\"")
            } else {
                format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
            }
        }
    }
}

fn py_bool(b: bool) -> String {
    if b { "True" } else { "False" }.to_string()
}

/// Floats always carry a decimal point so the emitted literal stays a float.
fn py_float(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}
