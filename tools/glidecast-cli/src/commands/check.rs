//! Check encoder availability.

use glidecast_common::config::{config_file_path, AppConfig};
use glidecast_render_engine::ffmpeg::{FfmpegEncoder, HardwareCodec};
use glidecast_render_engine::renderer::FfmpegVideoLoader;

pub async fn run(app: &AppConfig) -> anyhow::Result<()> {
    println!("Glidecast System Check");
    println!("{}", "=".repeat(50));

    let config_path = config_file_path();
    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[OK] Config: defaults ({} not found)", config_path.display());
    }

    let encoder = FfmpegEncoder::new(app.encoder.clone(), &app.timeouts);
    let Some(ffmpeg) = encoder.binary().await else {
        println!("[FAIL] ffmpeg: not found");
        println!("       Install ffmpeg or set encoder.ffmpeg_path in the config.");
        println!();
        println!("Exports are unavailable.");
        return Ok(());
    };
    println!("[OK] ffmpeg: {}", ffmpeg.display());

    let loader = FfmpegVideoLoader::new(&app.encoder);
    match loader.ffprobe() {
        Some(path) => println!("[OK] ffprobe: {}", path.display()),
        None => println!("[WARN] ffprobe: not found (video dimensions cannot be probed)"),
    }

    match encoder.codec().await {
        HardwareCodec::Nvenc => println!("[OK] GPU codec: {}", HardwareCodec::Nvenc.name()),
        codec if app.encoder.prefer_hardware => println!(
            "[WARN] GPU codec: {} (no hardware encoder found)",
            codec.name()
        ),
        codec => println!("[OK] GPU codec: {} (hardware disabled)", codec.name()),
    }

    println!();
    println!("Glidecast is ready to export.");
    Ok(())
}
