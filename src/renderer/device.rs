//! The device seam every pass records its work against.
//!
//! Passes never talk to a graphics API directly. They allocate textures, upload
//! data, write uniform blocks and issue fullscreen program draws through
//! [`RenderDevice`]. Resource descriptors use the `wgpu` vocabulary types so a
//! hardware backend can forward them unchanged.

use crate::error::RenderError;

slotmap::new_key_type! {
    /// Generation-counted texture handle. A handle whose texture was destroyed
    /// never aliases a newer allocation.
    pub struct TextureId;
}

#[derive(Clone, Debug)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub size: wgpu::Extent3d,
    pub format: wgpu::TextureFormat,
    pub sample_count: u32,
    pub usage: wgpu::TextureUsages,
}

impl<'a> TextureDesc<'a> {
    pub fn new(label: &'a str, width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            label,
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            format,
            sample_count: 1,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        }
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.size.depth_or_array_layers = layers;
        self
    }

    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    pub fn with_usage(mut self, usage: wgpu::TextureUsages) -> Self {
        self.usage = usage;
        self
    }
}

/// What the device remembers about a live texture.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureInfo {
    pub label: String,
    pub size: wgpu::Extent3d,
    pub format: wgpu::TextureFormat,
    pub sample_count: u32,
    pub usage: wgpu::TextureUsages,
}

impl TextureInfo {
    pub fn is_multisampled(&self) -> bool {
        self.sample_count > 1
    }

    pub fn texel_count(&self) -> usize {
        self.size.width as usize * self.size.height as usize
    }
}

/// Named uniform blocks. Contents are `bytemuck::Pod` structs written whole.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformSlot {
    PostProcess,
    SsaoKernel,
    Lighting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Replace,
    Additive,
}

/// Every fullscreen program the pipeline can run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Program {
    Copy,
    DeferredLighting,
    SsaoRaw,
    SsaoBlur,
    BloomPrefilter,
    BloomDownsample,
    BloomUpsample,
    BloomComposite,
    Tonemap,
    ChromaticAberration,
    FilmGrain,
    Vignette,
    Fxaa,
}

impl Program {
    pub const ALL: [Program; 13] = [
        Program::Copy,
        Program::DeferredLighting,
        Program::SsaoRaw,
        Program::SsaoBlur,
        Program::BloomPrefilter,
        Program::BloomDownsample,
        Program::BloomUpsample,
        Program::BloomComposite,
        Program::Tonemap,
        Program::ChromaticAberration,
        Program::FilmGrain,
        Program::Vignette,
        Program::Fxaa,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Program::Copy => "Copy",
            Program::DeferredLighting => "DeferredLighting",
            Program::SsaoRaw => "SsaoRaw",
            Program::SsaoBlur => "SsaoBlur",
            Program::BloomPrefilter => "BloomPrefilter",
            Program::BloomDownsample => "BloomDownsample",
            Program::BloomUpsample => "BloomUpsample",
            Program::BloomComposite => "BloomComposite",
            Program::Tonemap => "Tonemap",
            Program::ChromaticAberration => "ChromaticAberration",
            Program::FilmGrain => "FilmGrain",
            Program::Vignette => "Vignette",
            Program::Fxaa => "Fxaa",
        }
    }

    /// Number of textures the program samples, in binding order.
    pub fn input_count(self) -> usize {
        match self {
            // albedo, normal, depth, ao, directional shadow map
            Program::DeferredLighting => 5,
            // depth, normal, rotation noise
            Program::SsaoRaw => 3,
            // scene, bloom, dirt mask
            Program::BloomComposite => 3,
            // color, mask
            Program::Vignette => 2,
            _ => 1,
        }
    }

    pub fn address_mode(self, input: usize) -> wgpu::AddressMode {
        match (self, input) {
            (Program::SsaoRaw, 2) => wgpu::AddressMode::Repeat,
            _ => wgpu::AddressMode::ClampToEdge,
        }
    }

    /// G-buffer reads and the SSAO rotation noise are point sampled.
    pub fn filter_mode(self, input: usize) -> wgpu::FilterMode {
        match (self, input) {
            (Program::SsaoRaw, _) | (Program::DeferredLighting, 0..=2) => wgpu::FilterMode::Nearest,
            _ => wgpu::FilterMode::Linear,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FullscreenDraw<'a> {
    pub label: &'a str,
    pub program: Program,
    pub inputs: &'a [TextureId],
    pub target: TextureId,
    pub blend: BlendMode,
}

impl<'a> FullscreenDraw<'a> {
    pub fn new(label: &'a str, program: Program, inputs: &'a [TextureId], target: TextureId) -> Self {
        Self {
            label,
            program,
            inputs,
            target,
            blend: BlendMode::Replace,
        }
    }

    pub fn additive(mut self) -> Self {
        self.blend = BlendMode::Additive;
        self
    }
}

pub trait RenderDevice {
    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, RenderError>;

    fn destroy_texture(&mut self, texture: TextureId);

    fn texture_info(&self, texture: TextureId) -> Option<&TextureInfo>;

    fn is_valid(&self, texture: TextureId) -> bool {
        self.texture_info(texture).is_some()
    }

    /// Uploads one array layer. `data` holds tightly packed `[f32; 4]` texels in
    /// row-major order; every sample of a multisampled texel receives the value.
    fn write_texture(&mut self, texture: TextureId, layer: u32, data: &[u8]) -> Result<(), RenderError>;

    fn write_uniforms(&mut self, slot: UniformSlot, data: &[u8]);

    /// Clears every layer and sample.
    fn clear(&mut self, texture: TextureId, value: [f32; 4]) -> Result<(), RenderError>;

    fn draw_fullscreen(&mut self, draw: &FullscreenDraw<'_>) -> Result<(), RenderError>;

    /// Averages the samples of `source` into the single-sampled `destination`.
    fn resolve(&mut self, source: TextureId, destination: TextureId) -> Result<(), RenderError>;

    /// Hands `texture` to the swapchain and swaps buffers.
    fn present(&mut self, texture: TextureId) -> Result<(), RenderError>;
}

/// A single-texel texture holding `value`; used for fallback bindings.
pub fn create_solid_texture(
    device: &mut dyn RenderDevice,
    label: &str,
    format: wgpu::TextureFormat,
    value: [f32; 4],
) -> Result<TextureId, RenderError> {
    let texture = device.create_texture(&TextureDesc::new(label, 1, 1, format))?;
    if let Err(err) = device.clear(texture, value) {
        device.destroy_texture(texture);
        return Err(err);
    }
    Ok(texture)
}

pub fn is_depth_format(format: wgpu::TextureFormat) -> bool {
    matches!(
        format,
        wgpu::TextureFormat::Depth16Unorm
            | wgpu::TextureFormat::Depth24Plus
            | wgpu::TextureFormat::Depth24PlusStencil8
            | wgpu::TextureFormat::Depth32Float
            | wgpu::TextureFormat::Depth32FloatStencil8
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_program_has_a_distinct_label() {
        let mut labels: Vec<_> = Program::ALL.iter().map(|p| p.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), Program::ALL.len());
    }

    #[test]
    fn only_the_noise_input_repeats() {
        assert_eq!(Program::SsaoRaw.address_mode(2), wgpu::AddressMode::Repeat);
        assert_eq!(
            Program::SsaoRaw.address_mode(0),
            wgpu::AddressMode::ClampToEdge
        );
        assert_eq!(
            Program::Tonemap.address_mode(0),
            wgpu::AddressMode::ClampToEdge
        );
    }

    #[test]
    fn ssao_noise_and_gbuffer_reads_are_point_sampled() {
        assert_eq!(Program::SsaoRaw.filter_mode(2), wgpu::FilterMode::Nearest);
        assert_eq!(Program::DeferredLighting.filter_mode(1), wgpu::FilterMode::Nearest);
        assert_eq!(Program::DeferredLighting.filter_mode(3), wgpu::FilterMode::Linear);
        assert_eq!(Program::BloomDownsample.filter_mode(0), wgpu::FilterMode::Linear);
    }

    #[test]
    fn depth_formats_are_recognised() {
        assert!(is_depth_format(wgpu::TextureFormat::Depth32Float));
        assert!(!is_depth_format(wgpu::TextureFormat::Rgba16Float));
    }
}
