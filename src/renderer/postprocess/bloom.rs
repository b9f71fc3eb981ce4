use crate::error::RenderError;
use crate::renderer::device::{FullscreenDraw, Program, RenderDevice, TextureId};
use crate::renderer::target::{
    allocate_or_log, release, resize_or_log, RenderTarget, RenderTargetDesc, TargetSize, FULL,
};

pub const BLOOM_MIP_COUNT: usize = 6;
pub const BLOOM_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Below this many pixels on the short side the smallest levels collapse to a
/// single texel.
pub const MIN_BLOOM_RESOLUTION: u32 = 1 << BLOOM_MIP_COUNT;

/// Window scale of mip `level`: 1/2 for level 0 down to 1/64 for level 5.
pub fn mip_scale(level: usize) -> f32 {
    1.0 / (1u32 << (level + 1)) as f32
}

/// Dual-filter bloom: bright pass, six Kawase downsamples, tent upsamples
/// accumulated back up the chain, then a composite over the scene.
pub struct BloomChain {
    bright: Option<RenderTarget>,
    mips: Vec<Option<RenderTarget>>,
    composite: Option<RenderTarget>,
}

impl BloomChain {
    pub fn new(device: &mut dyn RenderDevice, window: wgpu::Extent3d) -> Self {
        Self::warn_if_degenerate(window);
        let full = TargetSize::WindowScaled(FULL);
        let mips = (0..BLOOM_MIP_COUNT)
            .map(|level| {
                allocate_or_log(
                    device,
                    RenderTargetDesc::color(
                        format!("BloomMip{level}"),
                        TargetSize::WindowScaled(mip_scale(level)),
                        BLOOM_FORMAT,
                    ),
                    window,
                )
            })
            .collect();

        Self {
            bright: allocate_or_log(device, RenderTargetDesc::color("BloomPrefilter", full, BLOOM_FORMAT), window),
            mips,
            composite: allocate_or_log(device, RenderTargetDesc::color("BloomComposite", full, BLOOM_FORMAT), window),
        }
    }

    fn warn_if_degenerate(window: wgpu::Extent3d) {
        if window.width.min(window.height) < MIN_BLOOM_RESOLUTION {
            log::warn!(
                "Bloom chain at {}x{} has sub-texel levels; mips below {} pixels repeat at 1x1",
                window.width,
                window.height,
                MIN_BLOOM_RESOLUTION
            );
        }
    }

    pub fn mip_extents(&self) -> Vec<(u32, u32)> {
        self.mips
            .iter()
            .flatten()
            .map(RenderTarget::size)
            .collect()
    }

    fn mip_textures(&self) -> Option<Vec<TextureId>> {
        self.mips
            .iter()
            .map(|mip| mip.as_ref().and_then(RenderTarget::bind))
            .collect()
    }

    /// Composites bloom over `scene`, returning the full resolution result.
    /// Expects the post-process uniform block to be current.
    pub fn render(
        &mut self,
        device: &mut dyn RenderDevice,
        scene: TextureId,
        dirt: TextureId,
    ) -> Result<TextureId, RenderError> {
        let (Some(bright), Some(composite), Some(mips)) = (
            self.bright.as_ref().and_then(RenderTarget::bind),
            self.composite.as_ref().and_then(RenderTarget::bind),
            self.mip_textures(),
        ) else {
            return Err(RenderError::ZeroSizedTexture {
                label: "BloomChain".to_string(),
            });
        };

        device.draw_fullscreen(&FullscreenDraw::new(
            "BloomPrefilter",
            Program::BloomPrefilter,
            &[scene],
            bright,
        ))?;

        let mut source = bright;
        for &mip in &mips {
            device.draw_fullscreen(&FullscreenDraw::new(
                "BloomDownsample",
                Program::BloomDownsample,
                &[source],
                mip,
            ))?;
            source = mip;
        }

        for pair in mips.windows(2).rev() {
            let (larger, smaller) = (pair[0], pair[1]);
            device.draw_fullscreen(
                &FullscreenDraw::new("BloomUpsample", Program::BloomUpsample, &[smaller], larger).additive(),
            )?;
        }

        device.draw_fullscreen(&FullscreenDraw::new(
            "BloomComposite",
            Program::BloomComposite,
            &[scene, mips[0], dirt],
            composite,
        ))?;
        Ok(composite)
    }

    pub fn resize(&mut self, device: &mut dyn RenderDevice, window: wgpu::Extent3d) {
        Self::warn_if_degenerate(window);
        resize_or_log(&mut self.bright, device, window);
        for mip in &mut self.mips {
            resize_or_log(mip, device, window);
        }
        resize_or_log(&mut self.composite, device, window);
    }

    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        release(&mut self.bright, device);
        for mip in &mut self.mips {
            release(mip, device);
        }
        release(&mut self.composite, device);
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
    fn scales_run_from_half_to_one_sixty_fourth() {
        let scales: Vec<f32> = (0..BLOOM_MIP_COUNT).map(mip_scale).collect();
        assert_eq!(scales, vec![0.5, 0.25, 0.125, 0.0625, 0.03125, 0.015625]);
    }

    #[test]
    fn chain_halves_strictly_at_normal_resolutions() {
        let mut device = SoftwareDevice::new();
        let chain = BloomChain::new(&mut device, window(256, 192));
        let extents = chain.mip_extents();
        assert_eq!(extents.len(), BLOOM_MIP_COUNT);
        assert_eq!(extents[0], (128, 96));
        assert_eq!(extents[5], (4, 3));
        for pair in extents.windows(2) {
            assert!(pair[1].0 < pair[0].0 && pair[1].1 < pair[0].1);
        }
    }

    #[test]
    fn tiny_windows_keep_six_levels_of_at_least_one_texel() {
        let mut device = SoftwareDevice::new();
        let chain = BloomChain::new(&mut device, window(40, 20));
        let extents = chain.mip_extents();
        assert_eq!(extents.len(), BLOOM_MIP_COUNT);
        assert_eq!(extents[5], (1, 1));
    }
}
