use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::scene::Camera;
use crate::settings::PostProcessSettings;

pub const SSAO_KERNEL_SIZE: usize = 32;

// align(16) keeps the block size matching WGSL uniform padding rules.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PostProcessUniform {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub proj_inv: [[f32; 4]; 4],
    /// xy: AO target resolution, z: frame seed.
    pub screen: [f32; 4],
    /// x: gamma, y: exposure.
    pub tone: [f32; 4],
    /// threshold, knee, strength, dirt intensity.
    pub bloom: [f32; 4],
    /// radius, strength, bias, kernel size.
    pub ssao: [f32; 4],
    /// chromatic aberration, film grain, vignette intensity, vignette smoothness.
    pub effects: [f32; 4],
}

impl PostProcessUniform {
    pub fn new(
        camera: &Camera,
        aspect: f32,
        ao_extent: (u32, u32),
        settings: &PostProcessSettings,
        frame_index: u64,
    ) -> Self {
        let view = camera.view();
        let proj = camera.proj(aspect);
        Self {
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            proj_inv: proj.inverse().to_cols_array_2d(),
            screen: [
                ao_extent.0 as f32,
                ao_extent.1 as f32,
                (frame_index % 4096) as f32,
                0.0,
            ],
            tone: [settings.gamma, settings.exposure, 0.0, 0.0],
            bloom: [
                settings.bloom_threshold,
                settings.bloom_knee(),
                settings.bloom_strength,
                settings.dirt_mask_intensity,
            ],
            ssao: [
                settings.ssao_radius,
                settings.ssao_strength,
                settings.ssao_bias,
                SSAO_KERNEL_SIZE as f32,
            ],
            effects: [
                settings.chromatic_aberration_strength,
                settings.film_grain_strength,
                settings.vignette_intensity,
                settings.vignette_smoothness,
            ],
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view)
    }

    pub fn proj(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.proj)
    }

    pub fn proj_inv(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.proj_inv)
    }
}

#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SsaoKernelUniform {
    pub samples: [[f32; 4]; SSAO_KERNEL_SIZE],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_blocks_are_sixteen_byte_multiples() {
        assert_eq!(std::mem::size_of::<PostProcessUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<SsaoKernelUniform>(), SSAO_KERNEL_SIZE * 16);
    }

    #[test]
    fn knee_is_threshold_times_soft_threshold() {
        let settings = PostProcessSettings {
            bloom_threshold: 2.0,
            bloom_soft_threshold: 0.25,
            ..PostProcessSettings::default()
        };
        let uniform = PostProcessUniform::new(&Camera::default(), 1.0, (4, 4), &settings, 0);
        assert_eq!(uniform.bloom[0], 2.0);
        assert_eq!(uniform.bloom[1], 0.5);
    }
}
