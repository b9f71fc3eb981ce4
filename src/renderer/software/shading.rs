//! CPU evaluation of the fullscreen programs.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4, Vec3Swizzles, Vec4Swizzles};

use super::texture::SoftwareTexture;
use crate::renderer::device::Program;
use crate::renderer::passes::lighting::LightingUniform;
use crate::renderer::postprocess::uniforms::{PostProcessUniform, SsaoKernelUniform};

const FXAA_REDUCE_MIN: f32 = 1.0 / 128.0;
const FXAA_REDUCE_MUL: f32 = 1.0 / 8.0;
const FXAA_SPAN_MAX: f32 = 8.0;
const LUMA: Vec3 = Vec3::new(0.299, 0.587, 0.114);

pub(crate) struct Shader<'a> {
    pub program: Program,
    pub inputs: Vec<&'a SoftwareTexture>,
    pub post: PostProcessUniform,
    pub kernel: SsaoKernelUniform,
    pub lighting: LightingUniform,
    pub width: u32,
    pub height: u32,
}

impl Shader<'_> {
    pub fn shade(&self, x: u32, y: u32) -> Vec4 {
        let uv = Vec2::new(
            (x as f32 + 0.5) / self.width as f32,
            (y as f32 + 0.5) / self.height as f32,
        );
        match self.program {
            Program::Copy => self.sample(0, uv),
            Program::DeferredLighting => self.deferred_lighting(uv),
            Program::SsaoRaw => self.ssao_raw(uv),
            Program::SsaoBlur => self.ssao_blur(uv),
            Program::BloomPrefilter => self.bloom_prefilter(uv),
            Program::BloomDownsample => self.bloom_downsample(uv),
            Program::BloomUpsample => self.bloom_upsample(uv),
            Program::BloomComposite => self.bloom_composite(uv),
            Program::Tonemap => self.tonemap(uv),
            Program::ChromaticAberration => self.chromatic_aberration(uv),
            Program::FilmGrain => self.film_grain(x, y, uv),
            Program::Vignette => self.vignette(uv),
            Program::Fxaa => self.fxaa(uv),
        }
    }

    fn sample(&self, input: usize, uv: Vec2) -> Vec4 {
        let texture = self.inputs[input];
        let address = self.program.address_mode(input);
        match self.program.filter_mode(input) {
            wgpu::FilterMode::Nearest => texture.sample_nearest(uv, address),
            wgpu::FilterMode::Linear => texture.sample(uv, address),
        }
    }

    fn tonemap(&self, uv: Vec2) -> Vec4 {
        let [gamma, exposure, ..] = self.post.tone;
        let hdr = self.sample(0, uv).xyz();
        let mapped = map3(hdr, |c| 1.0 - (-c.max(0.0) * exposure).exp());
        let corrected = map3(mapped, |c| c.powf(1.0 / gamma));
        corrected.extend(1.0)
    }

    fn bloom_prefilter(&self, uv: Vec2) -> Vec4 {
        let [threshold, knee, ..] = self.post.bloom;
        let color = self.sample(0, uv).xyz().max(Vec3::ZERO);
        (color * soft_knee_weight(color.max_element(), threshold, knee)).extend(1.0)
    }

    fn bloom_downsample(&self, uv: Vec2) -> Vec4 {
        let d = self.inputs[0].texel_size() * 0.5;
        let sum = self.sample(0, uv) * 4.0
            + self.sample(0, uv - d)
            + self.sample(0, uv + d)
            + self.sample(0, uv + Vec2::new(d.x, -d.y))
            + self.sample(0, uv - Vec2::new(d.x, -d.y));
        (sum.xyz() / 8.0).extend(1.0)
    }

    fn bloom_upsample(&self, uv: Vec2) -> Vec4 {
        let d = self.inputs[0].texel_size();
        let mut sum = Vec3::ZERO;
        for (dy, row) in [[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]]
            .iter()
            .enumerate()
        {
            for (dx, weight) in row.iter().enumerate() {
                let offset = Vec2::new(dx as f32 - 1.0, dy as f32 - 1.0) * d;
                sum += self.sample(0, uv + offset).xyz() * *weight;
            }
        }
        (sum / 16.0).extend(0.0)
    }

    fn bloom_composite(&self, uv: Vec2) -> Vec4 {
        let [_, _, strength, dirt_intensity] = self.post.bloom;
        let scene = self.sample(0, uv);
        let bloom = self.sample(1, uv).xyz();
        let dirt = self.sample(2, uv).xyz();
        let color = scene.xyz() + bloom * strength + bloom * dirt * dirt_intensity;
        color.extend(scene.w)
    }

    fn chromatic_aberration(&self, uv: Vec2) -> Vec4 {
        let strength = self.post.effects[0];
        let offset = (uv - Vec2::splat(0.5)) * strength;
        let r = self.sample(0, uv + offset).x;
        let center = self.sample(0, uv);
        let b = self.sample(0, uv - offset).z;
        Vec4::new(r, center.y, b, center.w)
    }

    fn film_grain(&self, x: u32, y: u32, uv: Vec2) -> Vec4 {
        let strength = self.post.effects[1];
        let seed = self.post.screen[2] as u32;
        let noise = hash_unit(x, y, seed) - 0.5;
        let color = self.sample(0, uv);
        (color.xyz() + Vec3::splat(noise * strength)).extend(color.w)
    }

    fn vignette(&self, uv: Vec2) -> Vec4 {
        let intensity = self.post.effects[2];
        let smoothness = self.post.effects[3].clamp(0.0, 1.0);
        let distance = (uv - Vec2::splat(0.5)).length() * std::f32::consts::SQRT_2;
        let falloff = 1.0 - intensity * smoothstep(1.0 - smoothness, 1.0, distance);
        let mask = self.sample(1, uv).xyz();
        let color = self.sample(0, uv);
        (color.xyz() * falloff * mask).extend(color.w)
    }

    fn fxaa(&self, uv: Vec2) -> Vec4 {
        let t = self.inputs[0].texel_size();
        let luma = |offset: Vec2| self.sample(0, uv + offset * t).xyz().dot(LUMA);
        let luma_nw = luma(Vec2::new(-1.0, -1.0));
        let luma_ne = luma(Vec2::new(1.0, -1.0));
        let luma_sw = luma(Vec2::new(-1.0, 1.0));
        let luma_se = luma(Vec2::new(1.0, 1.0));
        let center = self.sample(0, uv);
        let luma_m = center.xyz().dot(LUMA);

        let luma_min = luma_m.min(luma_nw.min(luma_ne).min(luma_sw.min(luma_se)));
        let luma_max = luma_m.max(luma_nw.max(luma_ne).max(luma_sw.max(luma_se)));

        let mut dir = Vec2::new(
            -((luma_nw + luma_ne) - (luma_sw + luma_se)),
            (luma_nw + luma_sw) - (luma_ne + luma_se),
        );
        let reduce = ((luma_nw + luma_ne + luma_sw + luma_se) * 0.25 * FXAA_REDUCE_MUL)
            .max(FXAA_REDUCE_MIN);
        let rcp_dir_min = 1.0 / (dir.x.abs().min(dir.y.abs()) + reduce);
        dir = (dir * rcp_dir_min).clamp(Vec2::splat(-FXAA_SPAN_MAX), Vec2::splat(FXAA_SPAN_MAX)) * t;

        let rgb_a = (self.sample(0, uv + dir * (1.0 / 3.0 - 0.5)).xyz()
            + self.sample(0, uv + dir * (2.0 / 3.0 - 0.5)).xyz())
            * 0.5;
        let rgb_b = rgb_a * 0.5
            + (self.sample(0, uv - dir * 0.5).xyz() + self.sample(0, uv + dir * 0.5).xyz()) * 0.25;
        let luma_b = rgb_b.dot(LUMA);

        if luma_b < luma_min || luma_b > luma_max {
            rgb_a.extend(center.w)
        } else {
            rgb_b.extend(center.w)
        }
    }

    fn ssao_raw(&self, uv: Vec2) -> Vec4 {
        let [radius, strength, bias, kernel_size] = self.post.ssao;
        let depth = self.sample(0, uv).x;
        if depth >= 1.0 {
            return Vec4::ONE;
        }

        let proj = self.post.proj();
        let proj_inv = self.post.proj_inv();
        let view = self.post.view();
        let position = reconstruct_view_position(uv, depth, proj_inv);
        let world_normal = self.sample(1, uv).xyz();
        let normal = safe_normalize(view.transform_vector3(world_normal), Vec3::Z);

        let noise_scale = Vec2::new(self.post.screen[0], self.post.screen[1]) / 4.0;
        let random = self.sample(2, uv * noise_scale).xyz();
        let tangent = safe_normalize(random - normal * random.dot(normal), any_orthogonal(normal));
        let bitangent = normal.cross(tangent);
        let tbn = Mat3::from_cols(tangent, bitangent, normal);

        let count = (kernel_size as usize).min(self.kernel.samples.len());
        let mut occlusion = 0.0;
        for sample in &self.kernel.samples[..count] {
            let sample_position = position + tbn * Vec4::from(*sample).xyz() * radius;
            let clip = proj * sample_position.extend(1.0);
            if clip.w <= 0.0 {
                continue;
            }
            let sample_uv = ndc_to_uv(clip.xy() / clip.w);
            if sample_uv.cmplt(Vec2::ZERO).any() || sample_uv.cmpgt(Vec2::ONE).any() {
                continue;
            }
            let scene_depth = self.sample(0, sample_uv).x;
            let scene_z = reconstruct_view_position(sample_uv, scene_depth, proj_inv).z;
            let range_check = smoothstep(0.0, 1.0, radius / (position.z - scene_z).abs().max(1e-4));
            if scene_z >= sample_position.z + bias {
                occlusion += range_check;
            }
        }

        let ao = (1.0 - occlusion / count.max(1) as f32).clamp(0.0, 1.0).powf(strength);
        Vec4::new(ao, ao, ao, 1.0)
    }

    fn ssao_blur(&self, uv: Vec2) -> Vec4 {
        let source = self.inputs[0];
        let x = (uv.x * source.width() as f32).floor() as i32;
        let y = (uv.y * source.height() as f32).floor() as i32;
        let mut sum = 0.0;
        for dy in -2..2 {
            for dx in -2..2 {
                sum += source.fetch(x + dx, y + dy, 0).x;
            }
        }
        let ao = sum / 16.0;
        Vec4::new(ao, ao, ao, 1.0)
    }

    fn deferred_lighting(&self, uv: Vec2) -> Vec4 {
        let lighting = &self.lighting;
        let depth = self.sample(2, uv).x;
        if depth >= 1.0 {
            return Vec4::from(lighting.clear_color);
        }

        let albedo = self.sample(0, uv).xyz();
        let normal = safe_normalize(self.sample(1, uv).xyz(), Vec3::Y);
        let ao = self.sample(3, uv).x;
        let world = lighting
            .view_proj_inv()
            .project_point3(Vec3::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, depth));

        let mut radiance = Vec4::from(lighting.ambient).xyz() * ao;
        let [has_directional, has_shadow_map, has_point, _] = lighting.flags;

        if has_directional > 0.5 {
            let direction = Vec4::from(lighting.direction_intensity);
            let color_bias = Vec4::from(lighting.color_bias);
            let to_light = safe_normalize(-direction.xyz(), Vec3::Y);
            let n_dot_l = normal.dot(to_light).max(0.0);
            let shadow = if has_shadow_map > 0.5 {
                self.shadow_factor(world, lighting.light_view_proj(), color_bias.w)
            } else {
                1.0
            };
            radiance += color_bias.xyz() * direction.w * n_dot_l * shadow;
        }

        if has_point > 0.5 {
            let position_range = Vec4::from(lighting.point_position_range);
            let color_intensity = Vec4::from(lighting.point_color_intensity);
            let to_light = position_range.xyz() - world;
            let distance = to_light.length();
            let falloff = (1.0 - distance / position_range.w.max(1e-4)).clamp(0.0, 1.0);
            let n_dot_l = normal.dot(safe_normalize(to_light, Vec3::Y)).max(0.0);
            radiance += color_intensity.xyz() * color_intensity.w * n_dot_l * falloff * falloff;
        }

        (albedo * radiance).extend(1.0)
    }

    fn shadow_factor(&self, world: Vec3, light_view_proj: Mat4, bias: f32) -> f32 {
        let clip = light_view_proj * world.extend(1.0);
        if clip.w <= 0.0 {
            return 1.0;
        }
        let ndc = clip.xyz() / clip.w;
        let shadow_uv = ndc_to_uv(ndc.xy());
        if shadow_uv.cmplt(Vec2::ZERO).any() || shadow_uv.cmpgt(Vec2::ONE).any() || ndc.z > 1.0 {
            return 1.0;
        }

        let shadow_map = self.inputs[4];
        let x = (shadow_uv.x * shadow_map.width() as f32).floor() as i32;
        let y = (shadow_uv.y * shadow_map.height() as f32).floor() as i32;
        let mut lit = 0.0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let stored = shadow_map.fetch(x + dx, y + dy, 0).x;
                if ndc.z - bias <= stored {
                    lit += 1.0;
                }
            }
        }
        lit / 9.0
    }
}

/// Soft-knee bright-pass weight: quadratic below the knee, linear above the
/// threshold.
pub(crate) fn soft_knee_weight(brightness: f32, threshold: f32, knee: f32) -> f32 {
    let soft = (brightness - threshold + knee).clamp(0.0, 2.0 * knee);
    let soft = soft * soft / (4.0 * knee + 1e-4);
    (soft.max(brightness - threshold) / brightness.max(1e-4)).max(0.0)
}

pub(crate) fn reconstruct_view_position(uv: Vec2, depth: f32, proj_inv: Mat4) -> Vec3 {
    let ndc = Vec3::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0, depth);
    proj_inv.project_point3(ndc)
}

pub(crate) fn ndc_to_uv(ndc: Vec2) -> Vec2 {
    Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5)
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn map3(v: Vec3, f: impl Fn(f32) -> f32) -> Vec3 {
    Vec3::new(f(v.x), f(v.y), f(v.z))
}

fn safe_normalize(v: Vec3, fallback: Vec3) -> Vec3 {
    v.try_normalize().unwrap_or(fallback)
}

fn any_orthogonal(n: Vec3) -> Vec3 {
    if n.x.abs() < 0.9 {
        Vec3::X.cross(n).normalize()
    } else {
        Vec3::Y.cross(n).normalize()
    }
}

/// Deterministic per-pixel noise in `[0, 1)`.
fn hash_unit(x: u32, y: u32, seed: u32) -> f32 {
    let mut h = x
        .wrapping_mul(0x8da6_b343)
        ^ y.wrapping_mul(0xd816_3841)
        ^ seed.wrapping_mul(0xcb1a_b31f);
    h ^= h >> 16;
    h = h.wrapping_mul(0x7feb_352d);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846c_a68b);
    h ^= h >> 16;
    (h >> 8) as f32 / (1u32 << 24) as f32
}
