use super::deferred::{shadow_fallback, GBUFFER_ALBEDO_FORMAT, GBUFFER_NORMAL_FORMAT, HDR_FORMAT};
use super::lighting::draw_lighting;
use super::raster;
use super::{
    FrameContext, GeometryPassOutput, LightingPassOutput, OpaqueStrategy, PreLightingPassOutput,
    ShadowmapPassOutput,
};
use crate::renderer::device::{create_solid_texture, RenderDevice, TextureId};
use crate::renderer::shadows::ShadowCasterSelector;
use crate::renderer::target::{
    allocate_or_log, release, resize_or_log, RenderTarget, RenderTargetDesc, TargetSize, FULL,
};

/// Shades opaque surfaces straight into a multisampled HDR target. There is no
/// G-buffer to share, so the lighting stage only forwards the color.
pub struct ForwardStrategy {
    sample_count: u32,
    color: Option<RenderTarget>,
    // Per-fragment inputs, rewritten every frame.
    albedo: Option<RenderTarget>,
    normal: Option<RenderTarget>,
    unoccluded: Option<TextureId>,
    shadow_fallback: Option<TextureId>,
}

impl ForwardStrategy {
    pub fn new(sample_count: u32) -> Self {
        Self {
            sample_count: sample_count.max(1),
            color: None,
            albedo: None,
            normal: None,
            unoccluded: None,
            shadow_fallback: None,
        }
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    fn ensure_targets(&mut self, device: &mut dyn RenderDevice, window: wgpu::Extent3d) {
        let size = TargetSize::WindowScaled(FULL);
        if self.color.is_none() {
            self.color = allocate_or_log(
                device,
                RenderTargetDesc::color("ForwardColor", size, HDR_FORMAT)
                    .with_depth()
                    .with_sample_count(self.sample_count),
                window,
            );
        }
        if self.albedo.is_none() {
            self.albedo = allocate_or_log(
                device,
                RenderTargetDesc::color("ForwardAlbedo", size, GBUFFER_ALBEDO_FORMAT).with_depth(),
                window,
            );
        }
        if self.normal.is_none() {
            self.normal = allocate_or_log(
                device,
                RenderTargetDesc::color("ForwardNormal", size, GBUFFER_NORMAL_FORMAT),
                window,
            );
        }
        if self.unoccluded.is_none() {
            self.unoccluded = create_solid_texture(
                device,
                "ForwardUnoccluded",
                wgpu::TextureFormat::R8Unorm,
                [1.0; 4],
            )
            .map_err(|err| log::error!("Failed to create forward AO texture: {}", err))
            .ok();
        }
        if self.shadow_fallback.is_none() {
            self.shadow_fallback = shadow_fallback(device);
        }
    }

    fn fragment_inputs(&self) -> Option<[TextureId; 4]> {
        let albedo = self.albedo.as_ref()?;
        Some([
            albedo.color_texture()?,
            self.normal.as_ref()?.color_texture()?,
            albedo.depth_texture()?,
            self.unoccluded?,
        ])
    }
}

impl OpaqueStrategy for ForwardStrategy {
    fn name(&self) -> &'static str {
        "Forward"
    }

    fn render_opaque(
        &mut self,
        ctx: &mut FrameContext<'_>,
        shadows: &ShadowmapPassOutput,
        casters: &ShadowCasterSelector,
    ) -> GeometryPassOutput {
        self.ensure_targets(ctx.device, ctx.window);
        let (Some(inputs), Some(target), Some(fallback)) = (
            self.fragment_inputs(),
            self.color.as_ref().and_then(RenderTarget::bind),
            self.shadow_fallback,
        ) else {
            log::warn!("Forward targets unavailable; skipping opaque pass");
            return GeometryPassOutput::default();
        };

        let Some((width, height)) = self.albedo.as_ref().map(RenderTarget::size) else {
            return GeometryPassOutput::default();
        };
        let surfaces = raster::collect_surfaces(ctx.scene);
        let texels = raster::attribute_texels(&surfaces, ctx.camera().view_proj(ctx.aspect()), width, height);
        let [albedo, normal, depth, _] = inputs;
        if let Err(err) = raster::upload_attributes(ctx.device, &texels, albedo, normal, depth) {
            log::warn!("Failed to upload forward fragments: {}", err);
            return GeometryPassOutput::default();
        }

        match draw_lighting(ctx, casters, shadows, inputs, fallback, target, "ForwardOpaque") {
            Ok(()) => GeometryPassOutput {
                gbuffer: None,
                color: Some(target),
            },
            Err(err) => {
                log::warn!("Forward shading failed: {}", err);
                GeometryPassOutput::default()
            }
        }
    }

    fn render_lighting(
        &mut self,
        _ctx: &mut FrameContext<'_>,
        geometry: &GeometryPassOutput,
        _ao: &PreLightingPassOutput,
        _shadows: &ShadowmapPassOutput,
        _casters: &ShadowCasterSelector,
    ) -> LightingPassOutput {
        LightingPassOutput {
            framebuffer: geometry.color,
        }
    }

    fn resize(&mut self, device: &mut dyn RenderDevice, window: wgpu::Extent3d) {
        resize_or_log(&mut self.color, device, window);
        resize_or_log(&mut self.albedo, device, window);
        resize_or_log(&mut self.normal, device, window);
    }

    fn release(&mut self, device: &mut dyn RenderDevice) {
        release(&mut self.color, device);
        release(&mut self.albedo, device);
        release(&mut self.normal, device);
        for texture in [self.unoccluded.take(), self.shadow_fallback.take()].into_iter().flatten() {
            device.destroy_texture(texture);
        }
    }
}
