//! ARtifact CLI - Headless front end for the editor core
//!
//! Commands: validate, normalize, save-draft, drafts, publish
//! Outputs JSON to stdout, logs to stderr (RUST_LOG)
//! Returns 2 when the input has to change, 1 on any other failure

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use artifact_core::{
    AssetValidator, CandidateFile, Completion, EditorConfig, EditorError, EditorSession,
    HttpBackend, LayerSlot, ModelNormalizer,
    config::BACKEND_URL_ENV,
};

#[derive(Parser)]
#[command(name = "artifact-cli")]
#[command(about = "ARtifact CLI - compose, save and publish AR artifacts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the editor config file
    #[arg(short, long, default_value = "artifact.json")]
    config: PathBuf,

    /// Backend base URL, overrides the config file and ARTIFACT_BACKEND_URL
    #[arg(short, long)]
    backend: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SlotArg {
    #[value(name = "2d")]
    TwoD,
    #[value(name = "3d")]
    ThreeD,
}

impl From<SlotArg> for LayerSlot {
    fn from(slot: SlotArg) -> Self {
        match slot {
            SlotArg::TwoD => LayerSlot::TwoD,
            SlotArg::ThreeD => LayerSlot::ThreeD,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check a file against a layer slot
    Validate {
        #[arg(short, long, value_enum)]
        slot: SlotArg,

        file: PathBuf,
    },

    /// Load a model and print its canonical placement
    Normalize {
        model: PathBuf,
    },

    /// Save an image + model pair as a draft
    SaveDraft {
        #[arg(long)]
        image: PathBuf,

        #[arg(long)]
        model: PathBuf,
    },

    /// List saved drafts
    Drafts,

    /// Publish an image + model pair
    Publish {
        #[arg(long)]
        image: PathBuf,

        #[arg(long)]
        model: PathBuf,
    },
}

/// Media type the way a browser file picker would declare it.
fn media_type_for(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("glb") => "model/gltf-binary".to_string(),
        Some("gltf") => "model/gltf+json".to_string(),
        _ => image::ImageFormat::from_path(path)
            .map(|format| format.to_mime_type().to_string())
            .unwrap_or_default(),
    }
}

fn read_candidate(path: &Path) -> Result<CandidateFile, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(CandidateFile::new(name, media_type_for(path), bytes))
}

fn fail(error: &str, code: u8) -> ExitCode {
    let output = serde_json::json!({ "success": false, "error": error });
    println!("{}", output);
    ExitCode::from(code)
}

fn fail_editor(error: EditorError) -> ExitCode {
    let output = serde_json::json!({
        "success": false,
        "error": error.to_string(),
        "message": error.user_message(),
    });
    println!("{}", output);
    ExitCode::from(if error.is_user_input() { 2 } else { 1 })
}

fn print_json(value: &serde_json::Value) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e.to_string(), 1),
    }
}

/// Put both files into a fresh session, as the compose panel would.
fn compose(image: &Path, model: &Path) -> Result<EditorSession, ExitCode> {
    let image = read_candidate(image).map_err(|e| fail(&e, 1))?;
    let model = read_candidate(model).map_err(|e| fail(&e, 1))?;

    let mut session = EditorSession::new();
    session.upload_2d(Some(image)).map_err(fail_editor)?;
    session.upload_3d(Some(model)).map_err(fail_editor)?;
    Ok(session)
}

fn stale_notice(epoch: u64) -> ExitCode {
    fail(&format!("Result arrived after session {} was discarded", epoch), 1)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let config = match EditorConfig::load(&cli.config) {
        Ok(config) => config.with_env().with_backend_url_override(cli.backend.clone()),
        Err(e) => return fail(&e.to_string(), 1),
    };
    log::debug!("event=config_loaded backend={} env={}", config.backend_url, BACKEND_URL_ENV);

    match cli.command {
        Commands::Validate { slot, file } => {
            let candidate = match read_candidate(&file) {
                Ok(c) => c,
                Err(e) => return fail(&e, 1),
            };

            let validator = AssetValidator::default();
            let slot = LayerSlot::from(slot);
            let violations = validator.check(&candidate, slot);
            let output = serde_json::json!({
                "valid": violations.is_empty(),
                "slot": slot,
                "file": candidate.name,
                "mediaType": candidate.media_type,
                "pickerFilter": slot.picker_filter(),
                "violations": violations,
            });
            let code = print_json(&output);
            if violations.is_empty() { code } else { ExitCode::from(2) }
        }

        Commands::Normalize { model } => {
            let bytes = match std::fs::read(&model) {
                Ok(b) => b,
                Err(e) => return fail(&format!("Failed to read {}: {}", model.display(), e), 1),
            };

            match ModelNormalizer::new().load(&bytes) {
                Ok(scene) => {
                    let source = scene.source_bounds();
                    let bounds = scene.bounds();
                    print_json(&serde_json::json!({
                        "success": true,
                        "nodes": scene.graph().nodes.len(),
                        "sourceBounds": { "min": source.min, "max": source.max, "center": source.center() },
                        "placement": scene.placement(),
                        "bounds": { "min": bounds.min, "max": bounds.max, "center": bounds.center() },
                    }))
                }
                Err(e) => fail(&e.to_string(), 2),
            }
        }

        Commands::SaveDraft { image, model } => {
            let mut session = match compose(&image, &model) {
                Ok(s) => s,
                Err(code) => return code,
            };
            let backend = match HttpBackend::new(&config) {
                Ok(b) => b,
                Err(e) => return fail(&e.to_string(), 1),
            };

            match session.save_draft(&backend).await {
                Ok(Completion::Applied(())) => print_json(&serde_json::json!({
                    "success": true,
                    "message": "Draft saved",
                })),
                Ok(Completion::Stale { epoch, .. }) => stale_notice(epoch),
                Err(e) => fail_editor(e),
            }
        }

        Commands::Drafts => {
            let backend = match HttpBackend::new(&config) {
                Ok(b) => b,
                Err(e) => return fail(&e.to_string(), 1),
            };

            let mut session = EditorSession::new();
            match session.select_drafts(&backend).await {
                Ok(drafts) => print_json(&serde_json::json!(drafts)),
                Err(e) => fail_editor(e),
            }
        }

        Commands::Publish { image, model } => {
            let mut session = match compose(&image, &model) {
                Ok(s) => s,
                Err(code) => return code,
            };
            let backend = match HttpBackend::new(&config) {
                Ok(b) => b,
                Err(e) => return fail(&e.to_string(), 1),
            };

            match session.publish(&backend).await {
                Ok(Completion::Applied(receipt)) => print_json(&serde_json::json!({
                    "success": true,
                    "message": format!("Published!\n{}", receipt.json_url),
                    "jsonUrl": receipt.json_url,
                })),
                Ok(Completion::Stale { epoch, .. }) => stale_notice(epoch),
                Err(e) => fail_editor(e),
            }
        }
    }
}
