//! Export a recording to video.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use glidecast_common::config::AppConfig;
use glidecast_render_engine::encoder::FrameFormat;
use glidecast_render_engine::orchestrator::ExportOrchestrator;
use glidecast_render_engine::progress::ExportProgress;

use crate::JobArgs;

pub struct ExportOptions {
    pub gpu: bool,
    pub segmented: bool,
    pub no_cursor: bool,
    pub png: bool,
}

pub async fn run(app: &AppConfig, job: &JobArgs, options: ExportOptions) -> anyhow::Result<()> {
    let mut config = job.export_config(app).with_segmented(options.segmented);
    if options.no_cursor {
        config = config.with_cursor(false);
    }
    let format = if options.png {
        FrameFormat::Png
    } else {
        FrameFormat::RawRgba
    };

    let orchestrator = Arc::new(ExportOrchestrator::with_ffmpeg(app).with_frame_format(format));
    if !orchestrator.is_encoder_available().await {
        anyhow::bail!("ffmpeg not found; run `glidecast check` for details");
    }

    println!("Exporting {}", config.video_path.display());
    println!("  Output: {}", config.output_path.display());
    println!(
        "  Resolution: {}x{} @ {} fps",
        config.screen_width, config.screen_height, config.fps
    );
    println!(
        "  Strategy: {}",
        match (options.gpu, options.segmented) {
            (false, _) => "software",
            (true, false) => "gpu (single-shot)",
            (true, true) => "gpu (segmented)",
        }
    );

    let interrupt = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling...");
                orchestrator.cancel().await;
            }
        })
    };

    let progress = |p: ExportProgress| {
        let frames = if p.total_frames > 0 {
            format!(" ({}/{} frames)", p.frames_written, p.total_frames)
        } else {
            String::new()
        };
        print!("\r  Progress: {:5.1}%{frames} {:<36}", p.percent, p.message);
        std::io::stdout().flush().ok();
    };

    let result = if options.gpu {
        orchestrator.export_gpu(&config, &progress).await
    } else {
        orchestrator.export(&config, &progress).await
    };
    interrupt.abort();
    println!();

    let result = result.context("Export failed")?;
    match result.total_frames {
        Some(frames) => println!(
            "Export complete: {} ({frames} frames)",
            result.output_path.display()
        ),
        None => println!("Export complete: {}", result.output_path.display()),
    }
    Ok(())
}
