use glam::{Vec2, Vec4};
use half::f16;

use crate::renderer::device::{is_depth_format, TextureInfo};

/// Texel storage for one texture: `layers * height * width * samples` values,
/// sample-major within a texel.
pub(crate) struct SoftwareTexture {
    pub(crate) info: TextureInfo,
    pub(crate) texels: Vec<Vec4>,
}

impl SoftwareTexture {
    pub(crate) fn new(info: TextureInfo) -> Self {
        let count = info.texel_count()
            * info.size.depth_or_array_layers as usize
            * info.sample_count as usize;
        let zero = store(info.format, Vec4::ZERO);
        Self {
            info,
            texels: vec![zero; count],
        }
    }

    pub(crate) fn width(&self) -> u32 {
        self.info.size.width
    }

    pub(crate) fn height(&self) -> u32 {
        self.info.size.height
    }

    pub(crate) fn samples(&self) -> usize {
        self.info.sample_count as usize
    }

    pub(crate) fn layer_len(&self) -> usize {
        self.info.texel_count() * self.samples()
    }

    pub(crate) fn texel_size(&self) -> Vec2 {
        Vec2::new(1.0 / self.width() as f32, 1.0 / self.height() as f32)
    }

    fn index(&self, x: u32, y: u32, layer: u32) -> usize {
        let row = (layer * self.height() + y) as usize * self.width() as usize;
        (row + x as usize) * self.samples()
    }

    /// Reads sample 0 of a texel, clamping coordinates to the edge.
    pub(crate) fn fetch(&self, x: i32, y: i32, layer: u32) -> Vec4 {
        let x = x.clamp(0, self.width() as i32 - 1) as u32;
        let y = y.clamp(0, self.height() as i32 - 1) as u32;
        self.texels[self.index(x, y, layer)]
    }

    fn fetch_addressed(&self, x: i32, y: i32, address: wgpu::AddressMode) -> Vec4 {
        match address {
            wgpu::AddressMode::Repeat => self.fetch(
                x.rem_euclid(self.width() as i32),
                y.rem_euclid(self.height() as i32),
                0,
            ),
            _ => self.fetch(x, y, 0),
        }
    }

    /// Bilinear sample of layer 0.
    pub(crate) fn sample(&self, uv: Vec2, address: wgpu::AddressMode) -> Vec4 {
        let x = uv.x * self.width() as f32 - 0.5;
        let y = uv.y * self.height() as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (ix, iy) = (x0 as i32, y0 as i32);

        let top = self
            .fetch_addressed(ix, iy, address)
            .lerp(self.fetch_addressed(ix + 1, iy, address), fx);
        let bottom = self
            .fetch_addressed(ix, iy + 1, address)
            .lerp(self.fetch_addressed(ix + 1, iy + 1, address), fx);
        top.lerp(bottom, fy)
    }

    /// Point sample of layer 0.
    pub(crate) fn sample_nearest(&self, uv: Vec2, address: wgpu::AddressMode) -> Vec4 {
        let x = (uv.x * self.width() as f32).floor() as i32;
        let y = (uv.y * self.height() as f32).floor() as i32;
        self.fetch_addressed(x, y, address)
    }

    pub(crate) fn fill_layer(&mut self, layer: u32, values: impl Iterator<Item = Vec4>) {
        let samples = self.samples();
        let format = self.info.format;
        let layer_len = self.layer_len();
        let start = layer as usize * layer_len;
        let layer_texels = &mut self.texels[start..start + layer_len];
        for (texel, value) in layer_texels.chunks_exact_mut(samples).zip(values) {
            texel.fill(store(format, value));
        }
    }

    /// Layer 0, sample 0, row-major.
    pub(crate) fn first_samples(&self) -> Vec<Vec4> {
        self.texels[..self.layer_len()]
            .chunks_exact(self.samples())
            .map(|texel| texel[0])
            .collect()
    }
}

/// Applies the precision and range limits of `format` to a shaded value.
pub(crate) fn store(format: wgpu::TextureFormat, value: Vec4) -> Vec4 {
    use wgpu::TextureFormat as F;
    match format {
        F::Rgba8Unorm | F::Rgba8UnormSrgb | F::Bgra8Unorm | F::Bgra8UnormSrgb => {
            value.clamp(Vec4::ZERO, Vec4::ONE)
        }
        F::R8Unorm => Vec4::new(value.x.clamp(0.0, 1.0), 0.0, 0.0, 1.0),
        F::Rgba16Float => Vec4::new(
            to_half(value.x),
            to_half(value.y),
            to_half(value.z),
            to_half(value.w),
        ),
        F::R16Float => Vec4::new(to_half(value.x), 0.0, 0.0, 1.0),
        F::R32Float => Vec4::new(value.x, 0.0, 0.0, 1.0),
        format if is_depth_format(format) => Vec4::new(value.x.clamp(0.0, 1.0), 0.0, 0.0, 1.0),
        _ => value,
    }
}

fn to_half(value: f32) -> f32 {
    f16::from_f32(value).to_f32()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(width: u32, height: u32, format: wgpu::TextureFormat) -> SoftwareTexture {
        SoftwareTexture::new(TextureInfo {
            label: "Test".to_string(),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            format,
            sample_count: 1,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
        })
    }

    #[test]
    fn unorm_formats_clamp_and_depth_keeps_one_channel() {
        let v = Vec4::new(2.0, -1.0, 0.5, 1.5);
        assert_eq!(store(wgpu::TextureFormat::Rgba8Unorm, v), Vec4::new(1.0, 0.0, 0.5, 1.0));
        assert_eq!(
            store(wgpu::TextureFormat::Depth32Float, v),
            Vec4::new(1.0, 0.0, 0.0, 1.0)
        );
        assert_eq!(
            store(wgpu::TextureFormat::R8Unorm, v),
            Vec4::new(1.0, 0.0, 0.0, 1.0)
        );
    }

    #[test]
    fn bilinear_sample_at_texel_centre_returns_the_texel() {
        let mut tex = texture(2, 1, wgpu::TextureFormat::Rgba32Float);
        tex.fill_layer(0, [Vec4::ZERO, Vec4::ONE].into_iter());
        let left = tex.sample(Vec2::new(0.25, 0.5), wgpu::AddressMode::ClampToEdge);
        let middle = tex.sample(Vec2::new(0.5, 0.5), wgpu::AddressMode::ClampToEdge);
        assert!(left.abs_diff_eq(Vec4::ZERO, 1e-6));
        assert!(middle.abs_diff_eq(Vec4::splat(0.5), 1e-6));
    }

    #[test]
    fn nearest_sample_never_blends_neighbours() {
        let mut tex = texture(4, 1, wgpu::TextureFormat::Rgba32Float);
        tex.fill_layer(0, (0..4).map(|i| Vec4::splat(i as f32)));
        let between = tex.sample_nearest(Vec2::new(0.5, 0.5), wgpu::AddressMode::ClampToEdge);
        assert_eq!(between, Vec4::splat(2.0));
        let wrapped = tex.sample_nearest(Vec2::new(1.3, 0.5), wgpu::AddressMode::Repeat);
        assert_eq!(wrapped, Vec4::splat(1.0));
    }

    #[test]
    fn repeat_addressing_wraps_around() {
        let mut tex = texture(4, 1, wgpu::TextureFormat::Rgba32Float);
        let values = (0..4).map(|i| Vec4::splat(i as f32));
        tex.fill_layer(0, values);
        let wrapped = tex.sample(Vec2::new(1.0 + 0.125, 0.5), wgpu::AddressMode::Repeat);
        assert!(wrapped.abs_diff_eq(Vec4::ZERO, 1e-6));
    }
}
