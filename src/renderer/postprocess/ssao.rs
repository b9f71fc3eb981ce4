use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::uniforms::{SsaoKernelUniform, SSAO_KERNEL_SIZE};
use crate::error::RenderError;
use crate::renderer::device::{FullscreenDraw, Program, RenderDevice, TextureDesc, TextureId, UniformSlot};
use crate::renderer::passes::GBuffer;
use crate::renderer::target::{
    allocate_or_log, release, resize_or_log, RenderTarget, RenderTargetDesc, TargetSize, HALF,
};

pub const NOISE_TEXTURE_SIZE: u32 = 4;
pub const AO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;
const KERNEL_SEED: u64 = 0x55A0_2024;

/// Hemisphere samples in tangent space (+Z up), pulled towards the origin so
/// occluders close to the fragment weigh more.
pub fn generate_kernel(rng: &mut impl Rng) -> SsaoKernelUniform {
    let mut kernel = SsaoKernelUniform {
        samples: [[0.0; 4]; SSAO_KERNEL_SIZE],
    };
    for (i, sample) in kernel.samples.iter_mut().enumerate() {
        let direction = glam::Vec3::new(
            rng.gen::<f32>() * 2.0 - 1.0,
            rng.gen::<f32>() * 2.0 - 1.0,
            rng.gen::<f32>(),
        )
        .try_normalize()
        .unwrap_or(glam::Vec3::Z);
        let t = i as f32 / SSAO_KERNEL_SIZE as f32;
        let scale = 0.1 + (1.0 - 0.1) * t * t;
        let v = direction * rng.gen::<f32>() * scale;
        *sample = [v.x, v.y, v.z, 0.0];
    }
    kernel
}

/// Random rotations around the surface normal, tiled across the screen.
pub fn generate_noise(rng: &mut impl Rng) -> Vec<[f32; 4]> {
    (0..NOISE_TEXTURE_SIZE * NOISE_TEXTURE_SIZE)
        .map(|_| [rng.gen::<f32>() * 2.0 - 1.0, rng.gen::<f32>() * 2.0 - 1.0, 0.0, 0.0])
        .collect()
}

/// Half resolution raw occlusion followed by one blur.
pub struct SsaoPass {
    kernel: SsaoKernelUniform,
    noise: Option<TextureId>,
    raw: Option<RenderTarget>,
    blurred: Option<RenderTarget>,
}

impl SsaoPass {
    pub fn new(device: &mut dyn RenderDevice, window: wgpu::Extent3d) -> Self {
        let mut rng = SmallRng::seed_from_u64(KERNEL_SEED);
        let kernel = generate_kernel(&mut rng);
        let noise = match Self::create_noise_texture(device, &generate_noise(&mut rng)) {
            Ok(texture) => Some(texture),
            Err(err) => {
                log::error!("Failed to create SSAO noise texture: {}", err);
                None
            }
        };

        let size = TargetSize::WindowScaled(HALF);
        Self {
            kernel,
            noise,
            raw: allocate_or_log(device, RenderTargetDesc::color("SsaoRaw", size, AO_FORMAT), window),
            blurred: allocate_or_log(device, RenderTargetDesc::color("SsaoBlur", size, AO_FORMAT), window),
        }
    }

    fn create_noise_texture(device: &mut dyn RenderDevice, data: &[[f32; 4]]) -> Result<TextureId, RenderError> {
        let desc = TextureDesc::new(
            "SsaoNoiseTexture",
            NOISE_TEXTURE_SIZE,
            NOISE_TEXTURE_SIZE,
            wgpu::TextureFormat::Rgba32Float,
        )
        .with_usage(wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST);
        let texture = device.create_texture(&desc)?;
        if let Err(err) = device.write_texture(texture, 0, bytemuck::cast_slice(data)) {
            device.destroy_texture(texture);
            return Err(err);
        }
        Ok(texture)
    }

    pub fn kernel(&self) -> &SsaoKernelUniform {
        &self.kernel
    }

    /// Resolution of the AO target, once allocated.
    pub fn extent(&self) -> Option<(u32, u32)> {
        let raw = self.raw.as_ref()?;
        self.blurred.as_ref()?;
        self.noise?;
        Some(raw.size())
    }

    /// Expects the post-process uniform block to be current.
    pub fn render(&mut self, device: &mut dyn RenderDevice, gbuffer: &GBuffer) -> Result<TextureId, RenderError> {
        let (Some(raw), Some(blurred), Some(noise)) = (
            self.raw.as_ref().and_then(RenderTarget::bind),
            self.blurred.as_ref().and_then(RenderTarget::bind),
            self.noise,
        ) else {
            return Err(RenderError::ZeroSizedTexture {
                label: "SsaoRaw".to_string(),
            });
        };

        device.write_uniforms(UniformSlot::SsaoKernel, bytemuck::bytes_of(&self.kernel));
        device.draw_fullscreen(&FullscreenDraw::new(
            "SsaoPass",
            Program::SsaoRaw,
            &[gbuffer.depth, gbuffer.normal, noise],
            raw,
        ))?;
        device.draw_fullscreen(&FullscreenDraw::new("SsaoBlurPass", Program::SsaoBlur, &[raw], blurred))?;
        Ok(blurred)
    }

    pub fn resize(&mut self, device: &mut dyn RenderDevice, window: wgpu::Extent3d) {
        resize_or_log(&mut self.raw, device, window);
        resize_or_log(&mut self.blurred, device, window);
    }

    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        release(&mut self.raw, device);
        release(&mut self.blurred, device);
        if let Some(noise) = self.noise.take() {
            device.destroy_texture(noise);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_lies_in_the_upper_unit_hemisphere() {
        let kernel = generate_kernel(&mut SmallRng::seed_from_u64(7));
        for sample in &kernel.samples {
            let v = glam::Vec3::new(sample[0], sample[1], sample[2]);
            assert!(v.z >= 0.0);
            assert!(v.length() <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn kernel_scale_grows_towards_the_last_samples() {
        let kernel = generate_kernel(&mut SmallRng::seed_from_u64(7));
        // Sample i is bounded by lerp(0.1, 1, (i / n)^2).
        for (i, sample) in kernel.samples.iter().enumerate() {
            let t = i as f32 / SSAO_KERNEL_SIZE as f32;
            let bound = 0.1 + 0.9 * t * t;
            let length = glam::Vec3::new(sample[0], sample[1], sample[2]).length();
            assert!(length <= bound + 1e-5, "sample {i} length {length} > {bound}");
        }
    }

    #[test]
    fn same_seed_gives_the_same_kernel() {
        let a = generate_kernel(&mut SmallRng::seed_from_u64(42));
        let b = generate_kernel(&mut SmallRng::seed_from_u64(42));
        assert_eq!(a.samples, b.samples);
    }

    #[test]
    fn noise_vectors_lie_in_the_tangent_plane() {
        let noise = generate_noise(&mut SmallRng::seed_from_u64(3));
        assert_eq!(noise.len(), 16);
        assert!(noise.iter().all(|n| n[2] == 0.0 && n[0].abs() <= 1.0 && n[1].abs() <= 1.0));
    }
}
