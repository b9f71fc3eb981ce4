//! CPU reference implementation of [`RenderDevice`].
//!
//! Textures live in host memory as `Vec4` texels and every fullscreen program is
//! evaluated per texel, rows in parallel. The device also keeps a log of the
//! allocations, draws, resolves and presents it executed so callers can inspect
//! exactly what a frame submitted.

mod shading;
mod texture;

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use rayon::prelude::*;
use slotmap::SlotMap;

use crate::error::RenderError;
use crate::renderer::device::{
    BlendMode, FullscreenDraw, Program, RenderDevice, TextureDesc, TextureId, TextureInfo,
    UniformSlot,
};
use shading::Shader;
use texture::{store, SoftwareTexture};

#[derive(Clone, Debug, PartialEq)]
pub struct AllocationRecord {
    pub texture: TextureId,
    pub label: String,
    pub size: wgpu::Extent3d,
    pub format: wgpu::TextureFormat,
    pub sample_count: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub label: String,
    pub program: Program,
    pub inputs: Vec<TextureId>,
    pub target: TextureId,
    pub blend: BlendMode,
}

pub struct SoftwareDevice {
    textures: SlotMap<TextureId, SoftwareTexture>,
    uniforms: HashMap<UniformSlot, Vec<u8>>,
    limits: wgpu::Limits,
    allocations: Vec<AllocationRecord>,
    destroyed: Vec<TextureId>,
    draws: Vec<DrawRecord>,
    resolves: Vec<(TextureId, TextureId)>,
    presents: Vec<TextureId>,
    presented: Option<(wgpu::Extent3d, Vec<Vec4>)>,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self::with_limits(wgpu::Limits::default())
    }

    pub fn with_limits(limits: wgpu::Limits) -> Self {
        Self {
            textures: SlotMap::with_key(),
            uniforms: HashMap::new(),
            limits,
            allocations: Vec::new(),
            destroyed: Vec::new(),
            draws: Vec::new(),
            resolves: Vec::new(),
            presents: Vec::new(),
            presented: None,
        }
    }

    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn allocations(&self) -> &[AllocationRecord] {
        &self.allocations
    }

    pub fn allocations_labelled(&self, prefix: &str) -> Vec<&AllocationRecord> {
        self.allocations
            .iter()
            .filter(|record| record.label.starts_with(prefix))
            .collect()
    }

    pub fn destroyed(&self) -> &[TextureId] {
        &self.destroyed
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn resolves(&self) -> &[(TextureId, TextureId)] {
        &self.resolves
    }

    pub fn presents(&self) -> &[TextureId] {
        &self.presents
    }

    /// Layer 0, sample 0 of the last presented texture.
    pub fn presented_image(&self) -> Option<(wgpu::Extent3d, &[Vec4])> {
        self.presented
            .as_ref()
            .map(|(size, texels)| (*size, texels.as_slice()))
    }

    pub fn clear_logs(&mut self) {
        self.allocations.clear();
        self.destroyed.clear();
        self.draws.clear();
        self.resolves.clear();
        self.presents.clear();
    }

    /// Layer 0, sample 0 of `texture`, row-major.
    pub fn read_texture(&self, texture: TextureId) -> Option<Vec<Vec4>> {
        self.textures.get(texture).map(SoftwareTexture::first_samples)
    }

    fn texture(&self, texture: TextureId) -> Result<&SoftwareTexture, RenderError> {
        self.textures
            .get(texture)
            .ok_or(RenderError::InvalidTexture(texture))
    }

    fn uniform<T: Pod + Zeroable>(&self, slot: UniformSlot) -> T {
        match self.uniforms.get(&slot) {
            Some(bytes) if bytes.len() == std::mem::size_of::<T>() => {
                bytemuck::pod_read_unaligned(bytes)
            }
            Some(bytes) => {
                log::warn!(
                    "Uniform slot {:?} holds {} bytes, expected {}; using zeroed block",
                    slot,
                    bytes.len(),
                    std::mem::size_of::<T>()
                );
                T::zeroed()
            }
            None => T::zeroed(),
        }
    }

    fn validate_draw(&self, draw: &FullscreenDraw<'_>) -> Result<(), RenderError> {
        let expected = draw.program.input_count();
        if draw.inputs.len() != expected {
            return Err(RenderError::InputCountMismatch {
                label: draw.label.to_string(),
                expected,
                actual: draw.inputs.len(),
            });
        }
        self.texture(draw.target)?;
        for &input in draw.inputs {
            if input == draw.target {
                return Err(RenderError::FeedbackLoop {
                    label: draw.label.to_string(),
                    texture: input,
                });
            }
            if self.texture(input)?.info.is_multisampled() {
                return Err(RenderError::MultisampledInput {
                    label: draw.label.to_string(),
                    texture: input,
                });
            }
        }
        Ok(())
    }
}

impl RenderDevice for SoftwareDevice {
    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, RenderError> {
        let size = desc.size;
        if size.width == 0 || size.height == 0 || size.depth_or_array_layers == 0 {
            return Err(RenderError::ZeroSizedTexture {
                label: desc.label.to_string(),
            });
        }
        let max = self.limits.max_texture_dimension_2d;
        if size.width > max || size.height > max {
            return Err(RenderError::TextureTooLarge {
                label: desc.label.to_string(),
                width: size.width,
                height: size.height,
                max,
            });
        }

        let info = TextureInfo {
            label: desc.label.to_string(),
            size,
            format: desc.format,
            sample_count: desc.sample_count.max(1),
            usage: desc.usage,
        };
        let id = self.textures.insert(SoftwareTexture::new(info));
        self.allocations.push(AllocationRecord {
            texture: id,
            label: desc.label.to_string(),
            size,
            format: desc.format,
            sample_count: desc.sample_count.max(1),
        });
        Ok(id)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(texture).is_some() {
            self.destroyed.push(texture);
        } else {
            log::warn!("Ignoring destroy of unknown texture {:?}", texture);
        }
    }

    fn texture_info(&self, texture: TextureId) -> Option<&TextureInfo> {
        self.textures.get(texture).map(|tex| &tex.info)
    }

    fn write_texture(&mut self, texture: TextureId, layer: u32, data: &[u8]) -> Result<(), RenderError> {
        let tex = self
            .textures
            .get_mut(texture)
            .ok_or(RenderError::InvalidTexture(texture))?;
        let expected = tex.info.texel_count() * std::mem::size_of::<[f32; 4]>();
        if data.len() != expected || layer >= tex.info.size.depth_or_array_layers {
            return Err(RenderError::UploadSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        let values = data
            .chunks_exact(std::mem::size_of::<[f32; 4]>())
            .map(|chunk| Vec4::from(bytemuck::pod_read_unaligned::<[f32; 4]>(chunk)));
        tex.fill_layer(layer, values);
        Ok(())
    }

    fn write_uniforms(&mut self, slot: UniformSlot, data: &[u8]) {
        self.uniforms.insert(slot, data.to_vec());
    }

    fn clear(&mut self, texture: TextureId, value: [f32; 4]) -> Result<(), RenderError> {
        let tex = self
            .textures
            .get_mut(texture)
            .ok_or(RenderError::InvalidTexture(texture))?;
        let stored = store(tex.info.format, Vec4::from(value));
        tex.texels.fill(stored);
        Ok(())
    }

    fn draw_fullscreen(&mut self, draw: &FullscreenDraw<'_>) -> Result<(), RenderError> {
        self.validate_draw(draw)?;

        let post = self.uniform(UniformSlot::PostProcess);
        let kernel = self.uniform(UniformSlot::SsaoKernel);
        let lighting = self.uniform(UniformSlot::Lighting);

        let target_info = self.texture(draw.target)?.info.clone();
        let mut target_texels = std::mem::take(&mut self.textures[draw.target].texels);
        {
            let shader = Shader {
                program: draw.program,
                inputs: draw.inputs.iter().map(|id| &self.textures[*id]).collect(),
                post,
                kernel,
                lighting,
                width: target_info.size.width,
                height: target_info.size.height,
            };
            let width = target_info.size.width as usize;
            let samples = target_info.sample_count as usize;
            let layer_len = target_info.texel_count() * samples;
            let format = target_info.format;
            let blend = draw.blend;

            target_texels[..layer_len]
                .par_chunks_mut(width * samples)
                .enumerate()
                .for_each(|(y, row)| {
                    for (x, texel) in row.chunks_exact_mut(samples).enumerate() {
                        let color = store(format, shader.shade(x as u32, y as u32));
                        for sample in texel.iter_mut() {
                            *sample = match blend {
                                BlendMode::Replace => color,
                                BlendMode::Additive => store(format, *sample + color),
                            };
                        }
                    }
                });
        }
        self.textures[draw.target].texels = target_texels;

        self.draws.push(DrawRecord {
            label: draw.label.to_string(),
            program: draw.program,
            inputs: draw.inputs.to_vec(),
            target: draw.target,
            blend: draw.blend,
        });
        Ok(())
    }

    fn resolve(&mut self, source: TextureId, destination: TextureId) -> Result<(), RenderError> {
        if source == destination {
            return Err(RenderError::FeedbackLoop {
                label: "Resolve".to_string(),
                texture: source,
            });
        }
        let src = self.texture(source)?;
        let dst = self.texture(destination)?;
        if src.info.size.width != dst.info.size.width || src.info.size.height != dst.info.size.height {
            return Err(RenderError::SizeMismatch {
                label: dst.info.label.clone(),
                expected: src.info.size,
                actual: dst.info.size,
            });
        }
        if src.info.format != dst.info.format {
            return Err(RenderError::FormatMismatch {
                label: dst.info.label.clone(),
                expected: src.info.format,
                actual: dst.info.format,
            });
        }
        if dst.info.is_multisampled() {
            return Err(RenderError::MultisampledInput {
                label: dst.info.label.clone(),
                texture: destination,
            });
        }

        let samples = src.samples();
        let averaged: Vec<Vec4> = src.texels[..src.layer_len()]
            .chunks_exact(samples)
            .map(|texel| texel.iter().copied().sum::<Vec4>() / samples as f32)
            .collect();
        self.textures[destination].fill_layer(0, averaged.into_iter());
        self.resolves.push((source, destination));
        Ok(())
    }

    fn present(&mut self, texture: TextureId) -> Result<(), RenderError> {
        let tex = self.texture(texture)?;
        if tex.info.is_multisampled() {
            return Err(RenderError::MultisampledInput {
                label: "Present".to_string(),
                texture,
            });
        }
        let image = tex.first_samples();
        let size = tex.info.size;
        self.presented = Some((size, image));
        self.presents.push(texture);
        log::trace!("Presented {:?} ({}x{})", texture, size.width, size.height);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(device: &mut SoftwareDevice, texture: TextureId, values: &[[f32; 4]]) {
        device
            .write_texture(texture, 0, bytemuck::cast_slice(values))
            .unwrap();
    }

    #[test]
    fn rejects_draws_that_read_their_own_target() {
        let mut device = SoftwareDevice::new();
        let a = device
            .create_texture(&TextureDesc::new("A", 4, 4, wgpu::TextureFormat::Rgba8Unorm))
            .unwrap();
        let err = device
            .draw_fullscreen(&FullscreenDraw::new("Loop", Program::Copy, &[a], a))
            .unwrap_err();
        assert!(matches!(err, RenderError::FeedbackLoop { .. }));
        assert!(device.draws().is_empty());
    }

    #[test]
    fn rejects_wrong_input_count() {
        let mut device = SoftwareDevice::new();
        let a = device
            .create_texture(&TextureDesc::new("A", 4, 4, wgpu::TextureFormat::Rgba8Unorm))
            .unwrap();
        let b = device
            .create_texture(&TextureDesc::new("B", 4, 4, wgpu::TextureFormat::Rgba8Unorm))
            .unwrap();
        let err = device
            .draw_fullscreen(&FullscreenDraw::new("Vignette", Program::Vignette, &[a], b))
            .unwrap_err();
        assert!(matches!(err, RenderError::InputCountMismatch { expected: 2, .. }));
    }

    #[test]
    fn copy_reproduces_source_texels() {
        let mut device = SoftwareDevice::new();
        let a = device
            .create_texture(&TextureDesc::new("A", 2, 1, wgpu::TextureFormat::Rgba32Float))
            .unwrap();
        let b = device
            .create_texture(&TextureDesc::new("B", 2, 1, wgpu::TextureFormat::Rgba32Float))
            .unwrap();
        upload(&mut device, a, &[[1.0, 2.0, 3.0, 1.0], [4.0, 5.0, 6.0, 1.0]]);
        device
            .draw_fullscreen(&FullscreenDraw::new("Copy", Program::Copy, &[a], b))
            .unwrap();
        assert_eq!(device.read_texture(b), device.read_texture(a));
    }

    #[test]
    fn additive_blend_accumulates() {
        let mut device = SoftwareDevice::new();
        let a = device
            .create_texture(&TextureDesc::new("A", 1, 1, wgpu::TextureFormat::Rgba32Float))
            .unwrap();
        let b = device
            .create_texture(&TextureDesc::new("B", 1, 1, wgpu::TextureFormat::Rgba32Float))
            .unwrap();
        upload(&mut device, a, &[[0.25, 0.25, 0.25, 0.0]]);
        device.clear(b, [1.0, 1.0, 1.0, 1.0]).unwrap();
        device
            .draw_fullscreen(&FullscreenDraw::new("Add", Program::Copy, &[a], b).additive())
            .unwrap();
        let texel = device.read_texture(b).unwrap()[0];
        assert!(texel.abs_diff_eq(Vec4::new(1.25, 1.25, 1.25, 1.0), 1e-6));
    }

    #[test]
    fn kawase_downsample_taps_texel_corners() {
        let mut device = SoftwareDevice::new();
        let src = device
            .create_texture(&TextureDesc::new("Checker", 4, 4, wgpu::TextureFormat::Rgba32Float))
            .unwrap();
        let dst = device
            .create_texture(&TextureDesc::new("Down", 4, 4, wgpu::TextureFormat::Rgba32Float))
            .unwrap();
        let checker: Vec<[f32; 4]> = (0..16)
            .map(|i| {
                let v = ((i % 4 + i / 4) % 2 == 0) as u32 as f32;
                [v, v, v, 1.0]
            })
            .collect();
        upload(&mut device, src, &checker);
        device
            .draw_fullscreen(&FullscreenDraw::new("Down", Program::BloomDownsample, &[src], dst))
            .unwrap();

        // Corner taps average the checker to 0.5; full-texel taps would land on
        // same-coloured diagonals and return the centre unchanged.
        let texel = device.read_texture(dst).unwrap()[4 + 1];
        assert!((texel.x - 0.75).abs() < 1e-5, "{texel:?}");
    }

    #[test]
    fn resolve_averages_samples() {
        let mut device = SoftwareDevice::new();
        let msaa = device
            .create_texture(
                &TextureDesc::new("Msaa", 1, 1, wgpu::TextureFormat::Rgba32Float).with_sample_count(4),
            )
            .unwrap();
        let resolved = device
            .create_texture(&TextureDesc::new("Resolved", 1, 1, wgpu::TextureFormat::Rgba32Float))
            .unwrap();
        device.clear(msaa, [0.5, 0.5, 0.5, 1.0]).unwrap();
        device.resolve(msaa, resolved).unwrap();
        let texel = device.read_texture(resolved).unwrap()[0];
        assert!(texel.abs_diff_eq(Vec4::new(0.5, 0.5, 0.5, 1.0), 1e-6));
        assert_eq!(device.resolves(), &[(msaa, resolved)]);
    }

    #[test]
    fn resolve_refuses_a_different_format() {
        let mut device = SoftwareDevice::new();
        let msaa = device
            .create_texture(
                &TextureDesc::new("Msaa", 2, 2, wgpu::TextureFormat::Rgba16Float).with_sample_count(4),
            )
            .unwrap();
        let resolved = device
            .create_texture(&TextureDesc::new("Resolved", 2, 2, wgpu::TextureFormat::Rgba8Unorm))
            .unwrap();
        let err = device.resolve(msaa, resolved).unwrap_err();
        assert_eq!(
            err,
            RenderError::FormatMismatch {
                label: "Resolved".to_string(),
                expected: wgpu::TextureFormat::Rgba16Float,
                actual: wgpu::TextureFormat::Rgba8Unorm,
            }
        );
        assert!(device.resolves().is_empty());
    }

    #[test]
    fn refuses_textures_beyond_the_limits() {
        let mut device = SoftwareDevice::with_limits(wgpu::Limits {
            max_texture_dimension_2d: 64,
            ..wgpu::Limits::default()
        });
        let err = device
            .create_texture(&TextureDesc::new("Big", 128, 16, wgpu::TextureFormat::Rgba8Unorm))
            .unwrap_err();
        assert!(matches!(err, RenderError::TextureTooLarge { max: 64, .. }));
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.limits().max_texture_dimension_2d, 64);
    }

    #[test]
    fn stale_handles_stay_invalid_after_reuse() {
        let mut device = SoftwareDevice::new();
        let a = device
            .create_texture(&TextureDesc::new("A", 1, 1, wgpu::TextureFormat::Rgba8Unorm))
            .unwrap();
        device.destroy_texture(a);
        let b = device
            .create_texture(&TextureDesc::new("B", 1, 1, wgpu::TextureFormat::Rgba8Unorm))
            .unwrap();
        assert!(!device.is_valid(a));
        assert!(device.is_valid(b));
        assert_ne!(a, b);
    }
}
