//! Stage seams of the frame and the bundles handed between them.
//!
//! Every stage records into the device carried by [`FrameContext`]. Outputs
//! carry plain texture handles and live for one frame only.

pub mod deferred;
pub mod forward;
pub mod lighting;
pub mod passthrough;
pub(crate) mod raster;
pub mod shadow;

use crate::renderer::device::{RenderDevice, TextureId};
use crate::renderer::shadows::ShadowCasterSelector;
use crate::scene::{Camera, LightKind, Scene};
use crate::settings::RenderSettings;

pub use deferred::DeferredStrategy;
pub use forward::ForwardStrategy;
pub use passthrough::{PassthroughOverlay, PassthroughTransparent, PassthroughWater};
pub use shadow::RayCastShadowStage;

pub struct FrameContext<'a> {
    pub device: &'a mut dyn RenderDevice,
    pub scene: &'a Scene,
    pub settings: &'a RenderSettings,
    pub window: wgpu::Extent3d,
    pub frame_index: u64,
}

impl FrameContext<'_> {
    pub fn camera(&self) -> &Camera {
        self.scene.camera()
    }

    pub fn aspect(&self) -> f32 {
        self.window.width.max(1) as f32 / self.window.height.max(1) as f32
    }

    /// `None` for an absent handle. An invalid one is logged and also treated as
    /// absent.
    pub fn valid(&self, texture: Option<TextureId>, what: &str) -> Option<TextureId> {
        let texture = texture?;
        if self.device.is_valid(texture) {
            Some(texture)
        } else {
            log::warn!("{} handle {:?} is not a live texture", what, texture);
            None
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShadowmapPassOutput {
    pub directional: Option<TextureId>,
    pub point: Option<TextureId>,
    pub spot: Option<TextureId>,
}

impl ShadowmapPassOutput {
    pub fn get(&self, kind: LightKind) -> Option<TextureId> {
        match kind {
            LightKind::Directional => self.directional,
            LightKind::Point => self.point,
            LightKind::Spot => self.spot,
        }
    }

    pub fn set(&mut self, kind: LightKind, texture: Option<TextureId>) {
        match kind {
            LightKind::Directional => self.directional = texture,
            LightKind::Point => self.point = texture,
            LightKind::Spot => self.spot = texture,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GBuffer {
    pub albedo: TextureId,
    pub normal: TextureId,
    pub depth: TextureId,
}

impl GBuffer {
    pub fn textures(&self) -> [TextureId; 3] {
        [self.albedo, self.normal, self.depth]
    }
}

/// The deferred path fills `gbuffer`; the forward path shades directly and
/// reports its color target instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GeometryPassOutput {
    pub gbuffer: Option<GBuffer>,
    pub color: Option<TextureId>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PreLightingPassOutput {
    pub ao: Option<TextureId>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LightingPassOutput {
    pub framebuffer: Option<TextureId>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WaterPassOutput {
    pub framebuffer: Option<TextureId>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransparentPassOutput {
    pub framebuffer: Option<TextureId>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PostProcessPassOutput {
    pub framebuffer: Option<TextureId>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EditorPassOutput {
    pub framebuffer: Option<TextureId>,
}

pub trait ShadowStage {
    fn render(&mut self, ctx: &mut FrameContext<'_>, casters: &ShadowCasterSelector) -> ShadowmapPassOutput;
}

/// Opaque geometry and lighting for one render topology.
pub trait OpaqueStrategy {
    fn name(&self) -> &'static str;

    fn render_opaque(
        &mut self,
        ctx: &mut FrameContext<'_>,
        shadows: &ShadowmapPassOutput,
        casters: &ShadowCasterSelector,
    ) -> GeometryPassOutput;

    fn render_lighting(
        &mut self,
        ctx: &mut FrameContext<'_>,
        geometry: &GeometryPassOutput,
        ao: &PreLightingPassOutput,
        shadows: &ShadowmapPassOutput,
        casters: &ShadowCasterSelector,
    ) -> LightingPassOutput;

    fn resize(&mut self, _device: &mut dyn RenderDevice, _window: wgpu::Extent3d) {}

    fn release(&mut self, _device: &mut dyn RenderDevice) {}
}

pub trait WaterStage {
    fn render(
        &mut self,
        ctx: &mut FrameContext<'_>,
        lit: &LightingPassOutput,
        geometry: &GeometryPassOutput,
    ) -> WaterPassOutput;

    fn resize(&mut self, _device: &mut dyn RenderDevice, _window: wgpu::Extent3d) {}

    fn release(&mut self, _device: &mut dyn RenderDevice) {}
}

pub trait TransparentStage {
    fn render(&mut self, ctx: &mut FrameContext<'_>, water: &WaterPassOutput) -> TransparentPassOutput;

    fn resize(&mut self, _device: &mut dyn RenderDevice, _window: wgpu::Extent3d) {}

    fn release(&mut self, _device: &mut dyn RenderDevice) {}
}

pub trait OverlayStage {
    fn render(&mut self, ctx: &mut FrameContext<'_>, post: &PostProcessPassOutput) -> EditorPassOutput;

    fn resize(&mut self, _device: &mut dyn RenderDevice, _window: wgpu::Extent3d) {}

    fn release(&mut self, _device: &mut dyn RenderDevice) {}
}
