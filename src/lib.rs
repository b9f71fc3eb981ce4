pub mod error;
pub mod renderer;
pub mod scene;
pub mod settings;

pub use error::RenderError;
pub use renderer::{FrameOrchestrator, FrameReport, PassKind, RenderDevice, SoftwareDevice};
pub use scene::Scene;
pub use settings::{PostProcessSettings, RenderPath, RenderSettings, SdrEffect};

/// Installs the process logger. `RUST_LOG` overrides the `Info` default.
pub fn init_logging() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
