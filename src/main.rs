mod demo_scenes;

use std::path::PathBuf;

use demo_scenes::{default_scene, DemoScene};
use frame_pipeline::{FrameOrchestrator, RenderSettings, SoftwareDevice};
use glam::Vec4;

const FRAME_COUNT: u64 = 3;
const SETTINGS_PATH: &str = "render_settings.json";

/// Quantises the presented texels to 8-bit RGBA.
fn to_image(width: u32, height: u32, texels: &[Vec4]) -> Option<image::RgbaImage> {
    let bytes = texels
        .iter()
        .flat_map(|t| t.clamp(Vec4::ZERO, Vec4::ONE).to_array())
        .map(|c| (c * 255.0).round() as u8)
        .collect();
    image::RgbaImage::from_raw(width, height, bytes)
}

fn main() {
    frame_pipeline::init_logging();

    let mut args = std::env::args().skip(1);
    let output = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("frame.png"));
    let demo = match args.next() {
        Some(name) => match DemoScene::from_name(&name) {
            Some(demo) => demo,
            None => {
                eprintln!("Unknown scene '{name}'; expected simple, grid[:size] or shadows");
                return;
            }
        },
        None => default_scene(),
    };
    let settings = RenderSettings::load_from_path(SETTINGS_PATH);

    let orchestrator = FrameOrchestrator::new(SoftwareDevice::new(), demo.build(), settings);
    let mut orchestrator = match orchestrator {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            eprintln!("Failed to create render pipeline: {err}");
            return;
        }
    };

    for frame in 0..FRAME_COUNT {
        orchestrator.scene_mut().set_camera(demo.orbit_camera(frame));
        let report = orchestrator.render_frame();
        log::info!(
            "Frame {}: ran {:?}, skipped {:?}",
            report.frame_index,
            report.executed,
            report.skipped
        );
    }

    let Some((extent, texels)) = orchestrator.device().presented_image() else {
        eprintln!("No frame was presented");
        return;
    };
    match to_image(extent.width, extent.height, texels) {
        Some(image) => match image.save(&output) {
            Ok(()) => log::info!("Wrote {}", output.display()),
            Err(err) => eprintln!("Failed to write {}: {err}", output.display()),
        },
        None => eprintln!("Presented image has an unexpected size"),
    }
}
