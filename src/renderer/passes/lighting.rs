use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use super::{FrameContext, ShadowmapPassOutput};
use crate::error::RenderError;
use crate::renderer::device::{FullscreenDraw, Program, TextureId, UniformSlot};
use crate::renderer::shadows::ShadowCasterSelector;
use crate::scene::{LightInstance, LightKind, Scene};
use crate::settings::RenderSettings;

/// Per-frame block consumed by the deferred lighting program.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LightingUniform {
    pub view_proj_inv: [[f32; 4]; 4],
    pub light_view_proj: [[f32; 4]; 4],
    /// xyz: direction the light travels, w: intensity.
    pub direction_intensity: [f32; 4],
    /// rgb: directional color, w: shadow bias.
    pub color_bias: [f32; 4],
    pub point_position_range: [f32; 4],
    pub point_color_intensity: [f32; 4],
    pub ambient: [f32; 4],
    pub clear_color: [f32; 4],
    /// directional present, shadow map bound, point present.
    pub flags: [f32; 4],
}

impl LightingUniform {
    /// Prefers the selected shadow casters and falls back to the first light of
    /// each kind so unshadowed scenes are still lit.
    pub fn new(
        scene: &Scene,
        casters: &ShadowCasterSelector,
        settings: &RenderSettings,
        aspect: f32,
        shadow_map_bound: bool,
    ) -> Self {
        let camera = scene.camera();
        let [ar, ag, ab] = settings.ambient;
        let mut uniform = Self {
            view_proj_inv: camera.view_proj(aspect).inverse().to_cols_array_2d(),
            light_view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            ambient: [ar, ag, ab, 1.0],
            clear_color: settings.clear_color,
            ..Self::zeroed()
        };

        if let Some(sun) = Self::pick(scene, casters, LightKind::Directional) {
            let direction = sun.direction();
            uniform.direction_intensity = [direction.x, direction.y, direction.z, sun.light.intensity];
            uniform.color_bias = [
                sun.light.color.x,
                sun.light.color.y,
                sun.light.color.z,
                sun.light.bias,
            ];
            uniform.flags[0] = 1.0;
            if shadow_map_bound {
                uniform.light_view_proj = casters
                    .light_view_proj(LightKind::Directional, scene)
                    .to_cols_array_2d();
                uniform.flags[1] = 1.0;
            }
        }

        if let Some(point) = Self::pick(scene, casters, LightKind::Point) {
            let position = point.position();
            uniform.point_position_range = [position.x, position.y, position.z, point.light.range];
            uniform.point_color_intensity = [
                point.light.color.x,
                point.light.color.y,
                point.light.color.z,
                point.light.intensity,
            ];
            uniform.flags[2] = 1.0;
        }

        uniform
    }

    fn pick(scene: &Scene, casters: &ShadowCasterSelector, kind: LightKind) -> Option<LightInstance> {
        casters
            .caster_entity(kind)
            .and_then(|entity| scene.light(entity))
            .or_else(|| scene.first_light(kind))
    }

    pub fn view_proj_inv(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.view_proj_inv)
    }

    pub fn light_view_proj(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.light_view_proj)
    }
}

/// Writes the lighting block and shades `attributes` (albedo, normal, depth,
/// ao) into `target`. Without a directional shadow map `shadow_fallback` is
/// bound in its place.
pub(crate) fn draw_lighting(
    ctx: &mut FrameContext<'_>,
    casters: &ShadowCasterSelector,
    shadows: &ShadowmapPassOutput,
    attributes: [TextureId; 4],
    shadow_fallback: TextureId,
    target: TextureId,
    label: &str,
) -> Result<(), RenderError> {
    let shadow_map = ctx.valid(shadows.directional, "Directional shadow map");
    let uniform = LightingUniform::new(
        ctx.scene,
        casters,
        ctx.settings,
        ctx.aspect(),
        shadow_map.is_some(),
    );
    ctx.device
        .write_uniforms(UniformSlot::Lighting, bytemuck::bytes_of(&uniform));

    let [albedo, normal, depth, ao] = attributes;
    let inputs = [albedo, normal, depth, ao, shadow_map.unwrap_or(shadow_fallback)];
    ctx.device.draw_fullscreen(&FullscreenDraw::new(
        label,
        Program::DeferredLighting,
        &inputs,
        target,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{LightComponent, Transform};
    use glam::Vec3;

    #[test]
    fn unlit_scene_sets_no_light_flags() {
        let scene = Scene::new();
        let uniform = LightingUniform::new(
            &scene,
            &ShadowCasterSelector::new(),
            &RenderSettings::default(),
            1.0,
            false,
        );
        assert_eq!(uniform.flags, [0.0; 4]);
        assert_eq!(uniform.clear_color, RenderSettings::default().clear_color);
    }

    #[test]
    fn non_casting_sun_still_lights_the_scene() {
        let mut scene = Scene::new();
        scene.spawn_light(
            "Sun",
            Transform::looking_at(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO),
            LightComponent::directional().with_color(Vec3::ONE, 3.0),
        );
        let uniform = LightingUniform::new(
            &scene,
            &ShadowCasterSelector::new(),
            &RenderSettings::default(),
            1.0,
            false,
        );
        assert_eq!(uniform.flags[0], 1.0);
        assert_eq!(uniform.flags[1], 0.0);
        assert!((uniform.direction_intensity[1] + 1.0).abs() < 1e-5);
        assert_eq!(uniform.direction_intensity[3], 3.0);
    }
}
