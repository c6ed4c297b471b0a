//! Dump the planned camera path.

use std::path::Path;

use glidecast_common::config::AppConfig;
use glidecast_render_engine::orchestrator::ExportOrchestrator;

use crate::JobArgs;

pub async fn run(app: &AppConfig, job: &JobArgs, dump: &Path) -> anyhow::Result<()> {
    let config = job.export_config(app);
    let orchestrator = ExportOrchestrator::with_ffmpeg(app);

    let info = orchestrator.prepare_export(&config).await?;
    orchestrator.save_camera_path(dump).await?;

    println!(
        "Wrote {} camera frames to {}",
        info.camera_frame_count,
        dump.display()
    );
    Ok(())
}
