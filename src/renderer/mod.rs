pub mod device;
pub mod orchestrator;
pub mod passes;
pub mod postprocess;
pub mod shadows;
pub mod software;
pub mod target;

pub use device::{FullscreenDraw, Program, RenderDevice, TextureDesc, TextureId, TextureInfo, UniformSlot};
pub use orchestrator::{FrameOrchestrator, FrameReport, PassKind};
pub use postprocess::PostProcessCompositor;
pub use shadows::{CasterState, ShadowCasterSelector};
pub use software::SoftwareDevice;
pub use target::{RenderTarget, RenderTargetDesc, TargetSize};
