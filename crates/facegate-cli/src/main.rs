mod config;
mod engine;
mod prompt;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use facegate_core::{
    train, validate_identity, FrameReport, LbphClassifier, SampleStore, Status, TrainSummary,
};
use facegate_hw::Camera;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "facegate", about = "Face enrollment, training and camera login")]
struct Cli {
    /// TOML config file (defaults to $FACEGATE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture face samples of one person into the dataset
    Capture {
        /// Identity name (prompted for when omitted)
        name: Option<String>,
        /// Camera index, i.e. /dev/video<N> (prompted for when unset)
        #[arg(long)]
        camera: Option<u32>,
        /// Number of samples to capture
        #[arg(long)]
        count: Option<usize>,
    },
    /// Train the recognizer on every captured sample
    Train,
    /// Recognize faces from the live camera
    Login {
        /// Camera index, i.e. /dev/video<N> (prompted for when unset)
        #[arg(long)]
        camera: Option<u32>,
        /// Accept faces whose distance is below this value
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// List video capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Capture { name, camera, count } => {
            if let Some(camera) = camera {
                config.camera_index = Some(camera);
            }
            if let Some(count) = count {
                config.target_samples = count;
            }
            config.validate()?;
            capture(config, name).await
        }
        Commands::Train => {
            config.validate()?;
            run_train(config).await
        }
        Commands::Login { camera, threshold } => {
            if let Some(camera) = camera {
                config.camera_index = Some(camera);
            }
            if let Some(threshold) = threshold {
                config.threshold = threshold;
            }
            config.validate()?;
            login(config).await
        }
        Commands::Devices => {
            list_devices();
            Ok(())
        }
    }
}

fn camera_index(config: &Config) -> Result<u32> {
    if let Some(index) = config.camera_index {
        return Ok(index);
    }
    let index = prompt::ask_camera_index(&mut io::stdin().lock(), &mut io::stdout())
        .context("failed to read camera index")?;
    Ok(index)
}

/// Raise `cancel` on the first Ctrl-C.
fn cancel_on_ctrl_c(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; stopping");
            cancel.store(true, Ordering::Relaxed);
        }
    });
}

async fn capture(config: Config, name: Option<String>) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => prompt::ask(&mut io::stdin().lock(), &mut io::stdout(), "Enter your name: ")
            .context("failed to read name")?,
    };
    if name.is_empty() {
        bail!("Name cannot be empty.");
    }
    validate_identity(&name)?;

    if !config.detector_model.is_file() {
        bail!(
            "detector model not found: {}; download seeta_fd_frontal_v1.0.bin and point detector_model at it",
            config.detector_model.display()
        );
    }

    let index = camera_index(&config)?;
    println!("Opening camera at index {index}...");

    let partition = SampleStore::open(&config.dataset_dir).partition(&name);
    let cancel = Arc::new(AtomicBool::new(false));
    let mut worker = engine::spawn_capture(config, name, index, cancel.clone()).await?;
    cancel_on_ctrl_c(cancel);

    println!("Saving samples to {}", partition.display());
    println!("\nStarting face capture. Look at the camera and move your head slightly.");
    println!("Press Ctrl-C to stop early.");

    while let Some(progress) = worker.events.recv().await {
        println!("Capturing... {}/{}", progress.captured, progress.target);
    }

    let outcome = worker.join().await?;
    if outcome.cancelled {
        println!("Capture interrupted by user.");
    }
    println!("\nCaptured {} images successfully.", outcome.captured);
    Ok(())
}

async fn run_train(config: Config) -> Result<()> {
    let store = SampleStore::open(&config.dataset_dir);
    let artifacts = config.artifacts();
    println!("Training on samples under {}...", store.root().display());

    let summary = tokio::task::spawn_blocking(move || {
        train(&store, &LbphClassifier::default(), &artifacts)
    })
    .await
    .context("training task failed")??;

    print!("{}", train_report(&summary, &config));
    Ok(())
}

fn train_report(summary: &TrainSummary, config: &Config) -> String {
    let mut out = format!(
        "Trained on {} samples of {} people.\n",
        summary.samples,
        summary.registry.len()
    );
    if summary.skipped > 0 {
        out.push_str(&format!("Skipped {} unreadable files.\n", summary.skipped));
    }
    for (label, name) in summary.registry.reverse() {
        out.push_str(&format!("  {label}: {name}\n"));
    }
    out.push_str(&format!(
        "Model saved to {}\nName mapping saved to {}\n",
        config.model_path.display(),
        config.registry_path.display()
    ));
    out
}

async fn login(config: Config) -> Result<()> {
    let missing = config.missing_login_files();
    if !missing.is_empty() {
        eprintln!("Error: required files are missing.");
        for (path, hint) in &missing {
            eprintln!("  {} ({hint})", path.display());
        }
        bail!("run `facegate capture` and `facegate train` first");
    }

    let index = camera_index(&config)?;
    println!("Opening camera at index {index}...");

    let cancel = Arc::new(AtomicBool::new(false));
    let mut worker = engine::spawn_login(config, index, cancel.clone()).await?;
    cancel_on_ctrl_c(cancel);
    println!("Face Recognition Login (Ctrl-C to quit)");

    let mut last = None;
    while let Some(report) = worker.events.recv().await {
        if let Some(text) = describe_change(&report, last.as_ref()) {
            tracing::info!(status = %report.status, faces = report.verdicts.len(), "status changed");
            print!("{text}");
        }
        last = Some(report.status);
    }

    let summary = worker.join().await?;
    tracing::info!(frames = summary.frames, skipped = summary.skipped, "login closed");
    Ok(())
}

/// Text to print when the status differs from the previous frame's.
fn describe_change(report: &FrameReport, last: Option<&Status>) -> Option<String> {
    if last == Some(&report.status) {
        return None;
    }
    let mut out = format!("{}\n", report.status);
    for verdict in &report.verdicts {
        out.push_str(&format!(
            "  [{}] {} (distance {:.1})\n",
            verdict.region,
            verdict.caption(),
            verdict.distance
        ));
    }
    Some(out)
}

fn list_devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No video capture devices found.");
        return;
    }
    for device in devices {
        println!(
            "{}: {} ({}, driver {}, {})",
            device.index, device.path, device.name, device.driver, device.bus
        );
    }
}
