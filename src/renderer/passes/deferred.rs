use super::lighting::draw_lighting;
use super::raster;
use super::{
    FrameContext, GBuffer, GeometryPassOutput, LightingPassOutput, OpaqueStrategy,
    PreLightingPassOutput, ShadowmapPassOutput,
};
use crate::renderer::device::{create_solid_texture, RenderDevice, TextureId};
use crate::renderer::shadows::ShadowCasterSelector;
use crate::renderer::target::{
    allocate_or_log, release, resize_or_log, RenderTarget, RenderTargetDesc, TargetSize, FULL,
};

pub const GBUFFER_ALBEDO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const GBUFFER_NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// G-buffer fill followed by a fullscreen lighting pass.
///
/// Targets are created on first use and follow window resizes.
#[derive(Default)]
pub struct DeferredStrategy {
    albedo: Option<RenderTarget>,
    normal: Option<RenderTarget>,
    lit: Option<RenderTarget>,
    shadow_fallback: Option<TextureId>,
}

impl DeferredStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_targets(&mut self, device: &mut dyn RenderDevice, window: wgpu::Extent3d) {
        let size = TargetSize::WindowScaled(FULL);
        if self.albedo.is_none() {
            self.albedo = allocate_or_log(
                device,
                RenderTargetDesc::color("GBufferAlbedo", size, GBUFFER_ALBEDO_FORMAT).with_depth(),
                window,
            );
        }
        if self.normal.is_none() {
            self.normal = allocate_or_log(
                device,
                RenderTargetDesc::color("GBufferNormal", size, GBUFFER_NORMAL_FORMAT),
                window,
            );
        }
        if self.lit.is_none() {
            self.lit = allocate_or_log(
                device,
                RenderTargetDesc::color("LitColor", size, HDR_FORMAT),
                window,
            );
        }
        if self.shadow_fallback.is_none() {
            self.shadow_fallback = shadow_fallback(device);
        }
    }

    fn gbuffer(&self) -> Option<GBuffer> {
        let albedo = self.albedo.as_ref()?;
        Some(GBuffer {
            albedo: albedo.color_texture()?,
            normal: self.normal.as_ref()?.color_texture()?,
            depth: albedo.depth_texture()?,
        })
    }
}

/// 1x1 depth texture at the far plane: everything it is compared against is lit.
pub(crate) fn shadow_fallback(device: &mut dyn RenderDevice) -> Option<TextureId> {
    match create_solid_texture(
        device,
        "ShadowFallback",
        wgpu::TextureFormat::Depth32Float,
        [1.0, 0.0, 0.0, 1.0],
    ) {
        Ok(texture) => Some(texture),
        Err(err) => {
            log::error!("Failed to create shadow fallback texture: {}", err);
            None
        }
    }
}

impl OpaqueStrategy for DeferredStrategy {
    fn name(&self) -> &'static str {
        "Deferred"
    }

    fn render_opaque(
        &mut self,
        ctx: &mut FrameContext<'_>,
        _shadows: &ShadowmapPassOutput,
        _casters: &ShadowCasterSelector,
    ) -> GeometryPassOutput {
        self.ensure_targets(ctx.device, ctx.window);
        let (Some(gbuffer), Some(target)) = (self.gbuffer(), self.albedo.as_ref()) else {
            log::warn!("G-buffer unavailable; skipping geometry fill");
            return GeometryPassOutput::default();
        };

        let (width, height) = target.size();
        let surfaces = raster::collect_surfaces(ctx.scene);
        let texels = raster::attribute_texels(&surfaces, ctx.camera().view_proj(ctx.aspect()), width, height);
        if let Err(err) =
            raster::upload_attributes(ctx.device, &texels, gbuffer.albedo, gbuffer.normal, gbuffer.depth)
        {
            log::warn!("Failed to fill G-buffer: {}", err);
            return GeometryPassOutput::default();
        }

        GeometryPassOutput {
            gbuffer: Some(gbuffer),
            color: None,
        }
    }

    fn render_lighting(
        &mut self,
        ctx: &mut FrameContext<'_>,
        geometry: &GeometryPassOutput,
        ao: &PreLightingPassOutput,
        shadows: &ShadowmapPassOutput,
        casters: &ShadowCasterSelector,
    ) -> LightingPassOutput {
        let (Some(gbuffer), Some(ao)) = (geometry.gbuffer, ao.ao) else {
            log::warn!("Deferred lighting needs a G-buffer and an AO texture");
            return LightingPassOutput::default();
        };
        let (Some(target), Some(fallback)) = (
            self.lit.as_ref().and_then(RenderTarget::bind),
            self.shadow_fallback,
        ) else {
            log::warn!("Lighting target unavailable");
            return LightingPassOutput::default();
        };

        match draw_lighting(
            ctx,
            casters,
            shadows,
            [gbuffer.albedo, gbuffer.normal, gbuffer.depth, ao],
            fallback,
            target,
            "DeferredLighting",
        ) {
            Ok(()) => LightingPassOutput {
                framebuffer: Some(target),
            },
            Err(err) => {
                log::warn!("Deferred lighting failed: {}", err);
                LightingPassOutput::default()
            }
        }
    }

    fn resize(&mut self, device: &mut dyn RenderDevice, window: wgpu::Extent3d) {
        resize_or_log(&mut self.albedo, device, window);
        resize_or_log(&mut self.normal, device, window);
        resize_or_log(&mut self.lit, device, window);
    }

    fn release(&mut self, device: &mut dyn RenderDevice) {
        release(&mut self.albedo, device);
        release(&mut self.normal, device);
        release(&mut self.lit, device);
        if let Some(texture) = self.shadow_fallback.take() {
            device.destroy_texture(texture);
        }
    }
}
