//! HDR to display conversion.
//!
//! [`PostProcessCompositor`] owns every intermediate target of the chain:
//! multisample resolve, SSAO (run before lighting), bloom, tonemap and the two
//! scratch targets the optional SDR effects ping-pong between.

pub mod bloom;
pub mod ssao;
pub mod uniforms;

use crate::error::RenderError;
use crate::renderer::device::{create_solid_texture, FullscreenDraw, Program, RenderDevice, TextureId, UniformSlot};
use crate::renderer::passes::{GBuffer, PostProcessPassOutput, PreLightingPassOutput};
use crate::renderer::target::{
    allocate_or_log, release, resize_or_log, RenderTarget, RenderTargetDesc, TargetSize, FULL,
};
use crate::scene::Camera;
use crate::settings::{PostProcessSettings, SdrEffect};

use bloom::{BloomChain, BLOOM_FORMAT};
use ssao::SsaoPass;
use uniforms::{PostProcessUniform, SsaoKernelUniform};

pub const SDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Fallback bindings created once, so no step ever binds an absent texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FallbackTextures {
    /// Unoccluded AO and a neutral vignette mask.
    pub white: TextureId,
    /// No dirt.
    pub black: TextureId,
    /// Stands in for a missing or invalid input.
    pub grey: TextureId,
}

impl FallbackTextures {
    fn new(device: &mut dyn RenderDevice) -> Result<Self, RenderError> {
        let white = create_solid_texture(device, "FallbackWhite", SDR_FORMAT, [1.0; 4])?;
        let black = create_solid_texture(device, "FallbackBlack", SDR_FORMAT, [0.0, 0.0, 0.0, 1.0])?;
        let grey = create_solid_texture(device, "FallbackGrey", SDR_FORMAT, [0.5, 0.5, 0.5, 1.0])?;
        Ok(Self { white, black, grey })
    }

    fn destroy(self, device: &mut dyn RenderDevice) {
        device.destroy_texture(self.white);
        device.destroy_texture(self.black);
        device.destroy_texture(self.grey);
    }
}

pub struct PostProcessCompositor {
    window: wgpu::Extent3d,
    resolved: Option<RenderTarget>,
    ssao: SsaoPass,
    bloom: BloomChain,
    tonemapped: Option<RenderTarget>,
    scratch: [Option<RenderTarget>; 2],
    fallbacks: Option<FallbackTextures>,
    dirt_mask: Option<TextureId>,
    vignette_mask: Option<TextureId>,
}

impl PostProcessCompositor {
    /// Fails only when the 1x1 fallback textures cannot be created. Any other
    /// target that fails to allocate is logged and its step degrades at render
    /// time.
    pub fn new(
        device: &mut dyn RenderDevice,
        window: wgpu::Extent3d,
        settings: &PostProcessSettings,
    ) -> Result<Self, RenderError> {
        let fallbacks = FallbackTextures::new(device)?;
        let full = TargetSize::WindowScaled(FULL);

        let compositor = Self {
            window,
            resolved: allocate_or_log(device, RenderTargetDesc::color("PostResolve", full, BLOOM_FORMAT), window),
            ssao: SsaoPass::new(device, window),
            bloom: BloomChain::new(device, window),
            tonemapped: allocate_or_log(device, RenderTargetDesc::color("Tonemap", full, SDR_FORMAT), window),
            scratch: [
                allocate_or_log(device, RenderTargetDesc::color("PostFxPing", full, SDR_FORMAT), window),
                allocate_or_log(device, RenderTargetDesc::color("PostFxPong", full, SDR_FORMAT), window),
            ],
            fallbacks: Some(fallbacks),
            dirt_mask: None,
            vignette_mask: None,
        };

        log::info!(
            "Post-process compositor ready at {}x{} (ssao: {}, bloom: {}, effects: {:?})",
            window.width,
            window.height,
            settings.ssao_enabled,
            settings.bloom_enabled,
            settings.enabled_effects()
        );
        Ok(compositor)
    }

    pub fn window(&self) -> wgpu::Extent3d {
        self.window
    }

    pub fn fallbacks(&self) -> Option<FallbackTextures> {
        self.fallbacks
    }

    pub fn set_dirt_mask(&mut self, texture: Option<TextureId>) {
        self.dirt_mask = texture;
    }

    pub fn set_vignette_mask(&mut self, texture: Option<TextureId>) {
        self.vignette_mask = texture;
    }

    pub fn bloom_mip_extents(&self) -> Vec<(u32, u32)> {
        self.bloom.mip_extents()
    }

    pub fn ssao_kernel(&self) -> &SsaoKernelUniform {
        self.ssao.kernel()
    }

    pub fn ao_extent(&self) -> Option<(u32, u32)> {
        self.ssao.extent()
    }

    /// The two targets the SDR effects alternate between.
    pub fn scratch_textures(&self) -> [Option<TextureId>; 2] {
        [
            self.scratch[0].as_ref().and_then(RenderTarget::color_texture),
            self.scratch[1].as_ref().and_then(RenderTarget::color_texture),
        ]
    }

    pub fn tonemap_texture(&self) -> Option<TextureId> {
        self.tonemapped.as_ref().and_then(RenderTarget::color_texture)
    }

    fn white(&self) -> Option<TextureId> {
        self.fallbacks.map(|f| f.white)
    }

    fn write_uniforms(
        &self,
        device: &mut dyn RenderDevice,
        camera: &Camera,
        aspect: f32,
        settings: &PostProcessSettings,
        frame_index: u64,
    ) {
        let ao_extent = self.ssao.extent().unwrap_or((1, 1));
        let uniform = PostProcessUniform::new(camera, aspect, ao_extent, settings, frame_index);
        device.write_uniforms(UniformSlot::PostProcess, bytemuck::bytes_of(&uniform));
    }

    /// Runs before lighting. Disabled AO, a missing G-buffer or a missing AO
    /// target all yield the white texture so lighting never branches.
    pub fn render_ambient_occlusion(
        &mut self,
        device: &mut dyn RenderDevice,
        gbuffer: Option<&GBuffer>,
        camera: &Camera,
        aspect: f32,
        settings: &PostProcessSettings,
    ) -> PreLightingPassOutput {
        let unoccluded = PreLightingPassOutput { ao: self.white() };
        if !settings.ssao_enabled {
            return unoccluded;
        }
        let Some(gbuffer) = gbuffer else {
            log::debug!("No G-buffer this frame; AO stays unoccluded");
            return unoccluded;
        };
        if !(device.is_valid(gbuffer.depth) && device.is_valid(gbuffer.normal)) {
            log::warn!("G-buffer depth or normal is not a live texture; AO stays unoccluded");
            return unoccluded;
        }
        if self.ssao.extent().is_none() {
            log::warn!("SSAO targets unavailable; AO stays unoccluded");
            return unoccluded;
        }

        self.write_uniforms(device, camera, aspect, settings, 0);
        match self.ssao.render(device, gbuffer) {
            Ok(ao) => PreLightingPassOutput { ao: Some(ao) },
            Err(err) => {
                log::warn!("SSAO failed ({}); AO stays unoccluded", err);
                unoccluded
            }
        }
    }

    /// Resolve, bloom, tonemap and the enabled SDR effects, in that order.
    /// Always returns one framebuffer.
    pub fn render(
        &mut self,
        device: &mut dyn RenderDevice,
        input: Option<TextureId>,
        camera: &Camera,
        aspect: f32,
        settings: &PostProcessSettings,
        frame_index: u64,
    ) -> PostProcessPassOutput {
        self.write_uniforms(device, camera, aspect, settings, frame_index);

        let Some(source) = self.validated_input(device, input) else {
            log::error!("Post-process has neither an input nor a fallback texture");
            return PostProcessPassOutput { framebuffer: input };
        };

        let hdr = self.resolve(device, source);

        let hdr = if settings.bloom_enabled {
            let dirt = self
                .dirt_mask
                .filter(|mask| device.is_valid(*mask))
                .or(self.fallbacks.map(|f| f.black));
            match dirt.map(|dirt| self.bloom.render(device, hdr, dirt)) {
                Some(Ok(composited)) => composited,
                Some(Err(err)) => {
                    log::warn!("Bloom skipped: {}", err);
                    hdr
                }
                None => hdr,
            }
        } else {
            hdr
        };

        let Some(tonemapped) = self.tonemapped.as_ref().and_then(RenderTarget::bind) else {
            log::error!("Tonemap target unavailable; presenting HDR input");
            return PostProcessPassOutput { framebuffer: Some(hdr) };
        };
        if let Err(err) = device.draw_fullscreen(&FullscreenDraw::new("Tonemap", Program::Tonemap, &[hdr], tonemapped)) {
            log::error!("Tonemap failed: {}", err);
            return PostProcessPassOutput { framebuffer: Some(hdr) };
        }

        PostProcessPassOutput {
            framebuffer: Some(self.run_effects(device, tonemapped, settings)),
        }
    }

    fn validated_input(&self, device: &dyn RenderDevice, input: Option<TextureId>) -> Option<TextureId> {
        match input {
            Some(texture) if device.is_valid(texture) => Some(texture),
            Some(texture) => {
                log::warn!("Post-process input {:?} is not a live texture; using grey", texture);
                self.fallbacks.map(|f| f.grey)
            }
            None => {
                log::warn!("Post-process has no input; using grey");
                self.fallbacks.map(|f| f.grey)
            }
        }
    }

    fn resolve(&mut self, device: &mut dyn RenderDevice, source: TextureId) -> TextureId {
        let multisampled = device
            .texture_info(source)
            .is_some_and(|info| info.is_multisampled());
        if !multisampled {
            return source;
        }

        let grey = self.fallbacks.map(|f| f.grey).unwrap_or(source);
        let Some(resolved) = self.resolved.as_ref().and_then(RenderTarget::bind) else {
            log::warn!("Resolve target unavailable; using grey");
            return grey;
        };
        match device.resolve(source, resolved) {
            Ok(()) => resolved,
            Err(err) => {
                log::warn!("Resolve failed ({}); using grey", err);
                grey
            }
        }
    }

    /// Alternates between the two scratch targets: every draw reads the previous
    /// output and writes the other target.
    fn run_effects(&self, device: &mut dyn RenderDevice, tonemapped: TextureId, settings: &PostProcessSettings) -> TextureId {
        let mut current = tonemapped;
        let mut next = 0;

        for effect in settings.enabled_effects() {
            let Some(target) = self.scratch[next].as_ref().and_then(RenderTarget::bind) else {
                log::warn!("Scratch target {} unavailable; skipping {}", next, effect.label());
                continue;
            };
            if target == current {
                log::error!("{} would read and write {:?}; skipping", effect.label(), target);
                continue;
            }

            let mask = self
                .vignette_mask
                .filter(|mask| device.is_valid(*mask))
                .or(self.white());
            let inputs: Vec<TextureId> = match (effect, mask) {
                (SdrEffect::Vignette, Some(mask)) => vec![current, mask],
                (SdrEffect::Vignette, None) => {
                    log::warn!("No vignette mask available; skipping vignette");
                    continue;
                }
                _ => vec![current],
            };

            match device.draw_fullscreen(&FullscreenDraw::new(effect.label(), effect.program(), &inputs, target)) {
                Ok(()) => {
                    current = target;
                    next = 1 - next;
                }
                Err(err) => log::warn!("{} failed: {}", effect.label(), err),
            }
        }

        current
    }

    pub fn resize(&mut self, device: &mut dyn RenderDevice, window: wgpu::Extent3d) {
        self.window = window;
        resize_or_log(&mut self.resolved, device, window);
        self.ssao.resize(device, window);
        self.bloom.resize(device, window);
        resize_or_log(&mut self.tonemapped, device, window);
        for scratch in &mut self.scratch {
            resize_or_log(scratch, device, window);
        }
    }

    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        release(&mut self.resolved, device);
        self.ssao.release(device);
        self.bloom.release(device);
        release(&mut self.tonemapped, device);
        for scratch in &mut self.scratch {
            release(scratch, device);
        }
        if let Some(fallbacks) = self.fallbacks.take() {
            fallbacks.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::software::SoftwareDevice;

    fn window(width: u32, height: u32) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        }
    }

    #[test]
    fn disabled_ssao_returns_the_white_fallback() {
        let mut device = SoftwareDevice::new();
        let settings = PostProcessSettings {
            ssao_enabled: false,
            ..PostProcessSettings::default()
        };
        let mut compositor = PostProcessCompositor::new(&mut device, window(32, 32), &settings).unwrap();
        let out = compositor.render_ambient_occlusion(&mut device, None, &Camera::default(), 1.0, &settings);
        assert_eq!(out.ao, compositor.fallbacks().map(|f| f.white));
        assert!(device.draws().is_empty());
    }

    #[test]
    fn missing_input_still_yields_one_framebuffer() {
        let mut device = SoftwareDevice::new();
        let settings = PostProcessSettings::tonemap_only();
        let mut compositor = PostProcessCompositor::new(&mut device, window(16, 16), &settings).unwrap();
        let out = compositor.render(&mut device, None, &Camera::default(), 1.0, &settings, 0);
        assert_eq!(out.framebuffer, compositor.tonemap_texture());
        let grey = compositor.fallbacks().unwrap().grey;
        assert_eq!(device.draws()[0].inputs, vec![grey]);
    }

    #[test]
    fn release_destroys_everything_it_created() {
        let mut device = SoftwareDevice::new();
        let mut compositor =
            PostProcessCompositor::new(&mut device, window(64, 64), &PostProcessSettings::default()).unwrap();
        assert!(device.live_texture_count() > 0);
        compositor.release(&mut device);
        assert_eq!(device.live_texture_count(), 0);
    }
}
