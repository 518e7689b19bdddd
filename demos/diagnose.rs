//! Chest X-ray Diagnosis Example
//!
//! This example runs the full diagnosis pipeline on one chest X-ray: it
//! classifies the image, explains the top-K candidate pathologies with the
//! chosen CAM method, saves one annotated overlay per candidate and appends
//! a feedback record to a JSONL store.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example diagnose -- [OPTIONS] <IMAGE>
//! ```
//!
//! # Arguments
//!
//! * `<IMAGE>` - Path to the X-ray image, or a catalogue filename when
//!   `--images-dir` is given
//! * `--source` - Model library to draw classifiers from ('synthetic' or 'xrv')
//! * `-m, --model` - Model identifier within the library
//! * `--models-dir` - Directory holding ONNX model bundles (xrv source only)
//! * `--method` - CAM method explaining the candidates
//! * `-k, --num-results` - Number of top candidates to explain
//! * `--alpha` - Blend weight of the heatmap over the X-ray
//! * `-c, --config` - TOML or JSON session configuration file
//! * `-o, --output-dir` - Directory to save annotated overlays
//! * `--images-dir` - Image catalogue directory with a metadata.csv
//! * `--confirm` - Comma-separated result slots to mark confirmed
//! * `--note` - Comment for one slot in 'slot:text' form; repeatable
//!
//! # Example
//!
//! ```bash
//! # Weight-free run against the synthetic library
//! cargo run --example diagnose -- chest.png
//!
//! # Exported torchxrayvision classifier with ScoreCAM
//! cargo run --example diagnose -- \
//!     --source xrv --models-dir models \
//!     -m densenet121-res224-all --method ScoreCAM -k 3 \
//!     chest.png
//!
//! # Catalogue image with reader feedback
//! cargo run --example diagnose -- \
//!     --images-dir data/images \
//!     --confirm 0,2 --note "1:possible effusion" \
//!     00012345_000.png
//! ```

use clap::Parser;
use cxr_cam::prelude::*;
use cxr_cam::utils::{AnnotationConfig, annotate_overlay};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};

/// Command-line arguments for the diagnosis example
#[derive(Parser)]
#[command(name = "diagnose")]
#[command(about = "Chest X-ray Diagnosis Example - classifies an X-ray and explains the top candidates")]
struct Args {
    /// Path to the X-ray image, or a catalogue filename with --images-dir
    image: PathBuf,

    /// Model library to draw classifiers from ('synthetic' or 'xrv')
    #[arg(long, default_value = "synthetic")]
    source: String,

    /// Model identifier within the library (defaults to the library's first choice)
    #[arg(short, long)]
    model: Option<String>,

    /// Directory holding ONNX model bundles (xrv source only)
    #[arg(long, default_value = "models")]
    models_dir: PathBuf,

    /// CAM method explaining the candidates
    #[arg(long, default_value = "GradCAM")]
    method: String,

    /// Number of top candidates to explain
    #[arg(short = 'k', long, default_value = "5")]
    num_results: usize,

    /// Blend weight of the heatmap over the X-ray
    #[arg(long, default_value = "0.7")]
    alpha: f32,

    /// Session configuration file (TOML or JSON); takes precedence over
    /// the tuning flags above
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to save annotated overlays
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Image catalogue directory with a metadata.csv; <IMAGE> is then a
    /// catalogue filename
    #[arg(long)]
    images_dir: Option<PathBuf>,

    /// Comma-separated result slots to mark confirmed, e.g. '0,2'
    #[arg(long)]
    confirm: Option<String>,

    /// Comment for one slot in 'slot:text' form; repeatable
    #[arg(long = "note")]
    notes: Vec<String>,

    /// Font file for burned-in annotations (falls back to a system font)
    #[arg(long)]
    font: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    cxr_cam::init_tracing();

    // Parse command-line arguments
    let args = Args::parse();

    info!("Chest X-ray Diagnosis Example");

    // Resolve the session configuration
    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration: {}", path.display());
            ConfigLoader::load_from_file(path)?
        }
        None => SessionConfig {
            num_results: args.num_results,
            cam_method: args.method.parse()?,
            blend_alpha: args.alpha,
            model_source: args.source.parse()?,
            model_identifier: args.model.clone(),
            models_dir: args.models_dir.clone(),
            ..SessionConfig::default()
        },
    };

    let method = config.cam_method;
    let feedback_path = config.feedback_path.clone();
    let identifier = config.model_identifier.clone().or_else(|| args.model.clone());

    let mut session = DiagnosisSession::new(config)?;

    if args.verbose {
        info!("Session Configuration:");
        info!("  Model source: {}", session.library().source());
        info!("  Results per diagnosis: {}", session.config().num_results);
        info!("  CAM method: {}", method);
        info!("  Blend alpha: {}", session.config().blend_alpha);
    }

    // Fall back to the first model the library offers
    let identifier = match identifier {
        Some(id) => id,
        None => session
            .library()
            .choices()
            .first()
            .cloned()
            .ok_or("model library offers no models")?,
    };

    // Select the image, either from a catalogue or straight from disk
    match &args.images_dir {
        Some(dir) => {
            let catalogue = DirectoryImageStore::open(dir)?;
            let labels = catalogue.labels()?;
            info!("Catalogue labels: {}", labels.join(", "));

            let filename = args
                .image
                .to_str()
                .ok_or("catalogue filename must be valid UTF-8")?;
            if args.verbose {
                info!("Catalogue label: {}", catalogue.label_for(filename)?);
            }
            session.select_image_from_store(&catalogue, filename)?;
        }
        None => {
            if !args.image.exists() {
                error!("Image file not found: {}", args.image.display());
                return Err("Image file not found".into());
            }
            let rgb = load_image(&args.image)?;
            let name = args
                .image
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("input.png");
            info!("Loaded image: {} ({}x{})", name, rgb.width(), rgb.height());
            session.select_image(name, rgb);
        }
    }

    // Select model and method, then run the diagnosis
    info!("Selecting model: {}", identifier);
    session.select_model(&identifier)?;
    session.select_method(method);

    info!("Running diagnosis...");
    let start = Instant::now();
    let diagnosis = session.diagnose()?.clone();
    let duration = start.elapsed();

    info!(
        "Diagnosis completed in {:.2}ms",
        duration.as_secs_f64() * 1000.0
    );

    // Display results for each slot
    info!("\n=== Diagnosis Results ===");
    info!("Model: {}  Method: {}", diagnosis.model, diagnosis.method);
    for slot in &diagnosis.slots {
        match slot {
            CandidateSlot::Completed(result) => {
                info!(
                    "  [{}] {} - {}",
                    result.slot + 1,
                    result.label,
                    result.probability_text()
                );
            }
            CandidateSlot::Failed {
                slot,
                label,
                message,
                ..
            } => {
                warn!("  [{}] {} - attribution failed: {}", slot + 1, label, message);
            }
        }
    }

    // Save one annotated overlay per completed candidate
    std::fs::create_dir_all(&args.output_dir)?;
    let annotation = match &args.font {
        Some(path) => AnnotationConfig::with_font_path(path)?,
        None => AnnotationConfig::with_system_font(),
    };

    info!("\nSaving overlays to: {}", args.output_dir.display());
    for result in diagnosis.completed() {
        let mut overlay = result.overlay.clone();
        let lines = vec![
            format!("Result {}: {}", result.slot + 1, result.label),
            format!("Probability: {}", result.probability_text()),
        ];
        annotate_overlay(&mut overlay, &lines, &annotation);

        let output_path = args
            .output_dir
            .join(format!("result_{}_{}.png", result.slot + 1, slug(&result.label)));
        overlay.save(&output_path)?;
        info!("  Saved: {}", output_path.display());
    }

    // Record the reader feedback given on the command line
    if let Some(confirm) = &args.confirm {
        for part in confirm.split(',').filter(|p| !p.trim().is_empty()) {
            let slot: usize = part
                .trim()
                .parse()
                .map_err(|_| format!("invalid slot index '{}' in --confirm", part.trim()))?;
            session.set_feedback_confirmed(slot, true)?;
        }
    }
    for note in &args.notes {
        let (slot, text) = note
            .split_once(':')
            .ok_or_else(|| format!("--note expects 'slot:text', got '{note}'"))?;
        let slot: usize = slot
            .trim()
            .parse()
            .map_err(|_| format!("invalid slot index '{slot}' in --note"))?;
        session.set_feedback_comment(slot, Some(text.trim().to_string()))?;
    }

    let mut store = JsonlFeedbackStore::new(feedback_path);
    let record = session.submit_feedback(&mut store)?;
    info!(
        "\nFeedback appended to {} ({} fields)",
        store.path().display(),
        record.len()
    );

    if args.verbose {
        let all = store.read_all()?;
        info!("Feedback store now holds {} record(s)", all.len());
        for (key, value) in record.fields() {
            info!("  {} = {:?}", key, value);
        }
    }

    Ok(())
}

/// Lowercases a pathology label into a filename fragment.
fn slug(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
