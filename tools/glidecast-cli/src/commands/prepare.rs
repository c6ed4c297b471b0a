//! Plan a camera path without exporting.

use glidecast_common::config::AppConfig;
use glidecast_render_engine::orchestrator::ExportOrchestrator;

use crate::JobArgs;

pub async fn run(app: &AppConfig, job: &JobArgs) -> anyhow::Result<()> {
    let config = job.export_config(app);
    let orchestrator = ExportOrchestrator::with_ffmpeg(app);

    let info = orchestrator.prepare_export(&config).await?;

    println!("Camera path for {}", config.video_path.display());
    println!("  Mouse events:   {}", info.mouse_event_count);
    println!("  Camera frames:  {}", info.camera_frame_count);
    println!("  Duration:       {:.2}s @ {} fps", info.duration_secs(), info.fps);
    println!("  Encoder frames: {}", info.estimated_frames);
    println!();
    println!("{}", serde_json::to_string_pretty(&info)?);

    Ok(())
}
