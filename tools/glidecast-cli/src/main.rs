//! Glidecast CLI: plan camera paths and export recordings.
//!
//! Usage:
//!   glidecast prepare <VIDEO> --mouse <FILE> -o <OUT>      Plan the camera path
//!   glidecast export <VIDEO> --mouse <FILE> -o <OUT>       Software export
//!   glidecast export-gpu <VIDEO> --mouse <FILE> -o <OUT>   Hardware-accelerated export
//!   glidecast path <VIDEO> --mouse <FILE> --dump <FILE>    Write the camera path as JSON
//!   glidecast check                                        Check encoder availability

use std::path::PathBuf;

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use glidecast_common::config::AppConfig;
use glidecast_project_model::export::ExportConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "glidecast",
    about = "Smooth zoom-and-pan exports of screen recordings",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Inputs shared by every command that works on a recording.
#[derive(Args)]
pub struct JobArgs {
    /// Source screen recording
    video: PathBuf,

    /// Mouse event log recorded alongside the video
    #[arg(short, long)]
    mouse: PathBuf,

    /// Output video file (defaults to a timestamped name)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output width in pixels
    #[arg(long, default_value = "1920")]
    width: u32,

    /// Output height in pixels
    #[arg(long, default_value = "1080")]
    height: u32,

    /// Output FPS (defaults to the configured rate)
    #[arg(long)]
    fps: Option<u32>,
}

impl JobArgs {
    pub fn export_config(&self, app: &AppConfig) -> ExportConfig {
        let output = self.output.clone().unwrap_or_else(|| {
            PathBuf::from(format!(
                "glidecast-{}.mp4",
                Local::now().format("%Y%m%d-%H%M%S")
            ))
        });
        ExportConfig::new(
            &self.video,
            &self.mouse,
            output,
            self.width,
            self.height,
        )
        .with_fps(self.fps.unwrap_or(app.export.fps))
        .with_cursor(app.export.show_cursor)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Plan the camera path and print a summary
    Prepare {
        #[command(flatten)]
        job: JobArgs,
    },

    /// Render every frame in software and stream it to the encoder
    Export {
        #[command(flatten)]
        job: JobArgs,

        /// Do not draw the cursor glyph
        #[arg(long)]
        no_cursor: bool,

        /// Stream PNG frames instead of raw RGBA
        #[arg(long)]
        png: bool,
    },

    /// Hand the camera path to a hardware-accelerated encoder
    ExportGpu {
        #[command(flatten)]
        job: JobArgs,

        /// Encode in independent segments and concatenate them
        #[arg(long)]
        segmented: bool,
    },

    /// Plan the camera path and write it as JSON
    Path {
        #[command(flatten)]
        job: JobArgs,

        /// Destination for the camera path JSON
        #[arg(long, default_value = "camera_path.json")]
        dump: PathBuf,
    },

    /// Check encoder availability
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    glidecast_common::logging::init_logging(&config.logging);
    tracing::debug!(?config, "Loaded configuration");

    match cli.command {
        Commands::Prepare { job } => commands::prepare::run(&config, &job).await,
        Commands::Export {
            job,
            no_cursor,
            png,
        } => {
            let options = commands::export::ExportOptions {
                gpu: false,
                segmented: false,
                no_cursor,
                png,
            };
            commands::export::run(&config, &job, options).await
        }
        Commands::ExportGpu { job, segmented } => {
            let options = commands::export::ExportOptions {
                gpu: true,
                segmented,
                no_cursor: false,
                png: false,
            };
            commands::export::run(&config, &job, options).await
        }
        Commands::Path { job, dump } => commands::path::run(&config, &job, &dump).await,
        Commands::Check => commands::check::run(&config).await,
    }
}
