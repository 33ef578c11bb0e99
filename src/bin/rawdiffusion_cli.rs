//! RawDiffusion CLI - Bridge interface for host applications
//!
//! Commands: templates, show, generate
//! Outputs JSON (templates, show) or script text (generate)
//! Returns non-zero on compile failure

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use rawdiffusion_core::{
    EffectiveParameters, GenerateRequest, GeneratorConfig, ModifierSelection, ScriptCompiler,
    Strictness, TemplateStore,
};

#[derive(Parser)]
#[command(name = "rawdiffusion-cli")]
#[command(about = "RawDiffusion CLI - Template-to-Script Compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Template directory, scanned recursively. Repeat for multiple
    /// candidate directories; scan order follows argument order.
    #[arg(short, long = "templates-dir", default_value = "templates")]
    templates_dir: Vec<PathBuf>,

    /// Directory generated scripts write their artifacts into
    #[arg(long, default_value = "outputs")]
    output_dir: String,

    /// Compile the ENABLE_FREEU constant as True
    #[arg(long)]
    enable_freeu: bool,

    /// Fail on undeclared or missing parameter keys
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available templates
    Templates,

    /// Print one template definition as JSON
    Show {
        /// Template ID
        #[arg(short, long)]
        template: String,
    },

    /// Compile a template into a Python script
    Generate {
        /// Template ID
        #[arg(short, long)]
        template: String,

        /// JSON object of parameter values. Taken as the complete set;
        /// missing keys are not back-filled from defaults.
        #[arg(short, long)]
        params: Option<String>,

        /// Preset name to overlay
        #[arg(long)]
        preset: Option<String>,

        /// Style template name
        #[arg(long)]
        style: Option<String>,

        /// Lighting modifier name
        #[arg(long)]
        lighting: Option<String>,

        /// Atmosphere modifier name
        #[arg(long)]
        atmosphere: Option<String>,

        /// Write the script to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut store = TemplateStore::new(cli.templates_dir.clone());
    store.load();

    let config = GeneratorConfig {
        output_dir: cli.output_dir.clone(),
        enable_freeu: cli.enable_freeu,
        ..GeneratorConfig::default()
    };
    let strictness = if cli.strict {
        Strictness::Strict
    } else {
        Strictness::Permissive
    };
    let compiler = ScriptCompiler::new(store, config, strictness);

    match cli.command {
        Commands::Templates => {
            let templates: Vec<_> = compiler
                .store()
                .templates()
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "id": t.id,
                        "name": t.name,
                        "version": t.version,
                        "category": t.category,
                        "difficulty": t.difficulty,
                        "tags": t.tags,
                    })
                })
                .collect();

            println!("{}", serde_json::to_string_pretty(&templates).unwrap());
            ExitCode::SUCCESS
        }

        Commands::Show { template } => match compiler.store().get(&template) {
            Some(t) => {
                println!("{}", serde_json::to_string_pretty(t).unwrap());
                ExitCode::SUCCESS
            }
            None => {
                eprintln!(r#"{{"error": "Template not found: {template}"}}"#);
                ExitCode::FAILURE
            }
        },

        Commands::Generate {
            template,
            params,
            preset,
            style,
            lighting,
            atmosphere,
            output,
        } => {
            let parameters: Option<EffectiveParameters> = match params {
                Some(json) => match serde_json::from_str(&json) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        eprintln!(r#"{{"error": "Invalid params JSON: {e}"}}"#);
                        return ExitCode::FAILURE;
                    }
                },
                None => None,
            };

            let request = GenerateRequest {
                template_id: template,
                parameters,
                preset,
                modifiers: ModifierSelection {
                    style,
                    lighting,
                    atmosphere,
                },
            };

            match compiler.compile(&request) {
                Ok(script) => {
                    if let Some(path) = output {
                        if let Err(e) = std::fs::write(&path, &script.code) {
                            eprintln!(r#"{{"error": "Failed to write {}: {e}"}}"#, path.display());
                            return ExitCode::FAILURE;
                        }
                        println!(
                            "{}",
                            serde_json::json!({
                                "template_id": script.template_id,
                                "created_at": script.created_at,
                                "path": path,
                            })
                        );
                    } else {
                        println!("{}", script.code);
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!(r#"{{"error": "{e}"}}"#);
                    ExitCode::from(2) // Compile failure
                }
            }
        }
    }
}
