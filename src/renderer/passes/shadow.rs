use glam::Mat4;

use super::raster;
use super::{FrameContext, ShadowStage, ShadowmapPassOutput};
use crate::renderer::shadows::ShadowCasterSelector;
use crate::scene::LightKind;

/// Fills each selected caster's depth target by casting one ray per texel
/// from the light.
#[derive(Debug, Default)]
pub struct RayCastShadowStage;

impl ShadowStage for RayCastShadowStage {
    fn render(&mut self, ctx: &mut FrameContext<'_>, casters: &ShadowCasterSelector) -> ShadowmapPassOutput {
        let mut output = ShadowmapPassOutput::default();
        let surfaces = raster::collect_surfaces(ctx.scene);

        for kind in LightKind::ALL {
            if !casters.has_caster(kind) {
                continue;
            }
            if casters
                .caster_entity(kind)
                .and_then(|entity| ctx.scene.light(entity))
                .is_none()
            {
                log::warn!("Skipping {} shadow map: caster no longer exists", kind.label());
                continue;
            }
            let (Some(target), Some((width, height))) = (casters.framebuffer(kind), casters.shadow_size(kind)) else {
                continue;
            };

            let faces: Vec<Mat4> = match kind {
                LightKind::Point => casters.point_face_view_projs(ctx.scene).to_vec(),
                _ => vec![casters.light_view_proj(kind, ctx.scene)],
            };

            let mut complete = true;
            for (layer, view_proj) in faces.iter().enumerate() {
                let texels = raster::depth_texels(&surfaces, *view_proj, width, height);
                if let Err(err) = ctx
                    .device
                    .write_texture(target, layer as u32, bytemuck::cast_slice(&texels))
                {
                    log::warn!("Failed to write {} shadow map: {}", kind.label(), err);
                    complete = false;
                    break;
                }
            }
            if complete {
                output.set(kind, Some(target));
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::software::SoftwareDevice;
    use crate::scene::{Camera, LightComponent, MeshComponent, Scene, ShadowResolution, Transform};
    use crate::settings::RenderSettings;
    use glam::Vec3;

    #[test]
    fn sun_above_a_ground_plane_writes_mid_range_depth() {
        let mut device = SoftwareDevice::new();
        let mut scene = Scene::new();
        scene.set_camera(Camera::looking_at(Vec3::new(0.0, 3.0, 6.0), Vec3::ZERO));
        scene.spawn_mesh("Ground", Transform::IDENTITY, MeshComponent::ground(Vec3::ONE));
        scene.spawn_light(
            "Sun",
            Transform::looking_at(Vec3::new(1.0, 10.0, 1.0), Vec3::ZERO),
            LightComponent::directional().with_shadows(ShadowResolution::Low),
        );

        let mut casters = ShadowCasterSelector::new();
        casters.start(&mut device, &scene);

        let settings = RenderSettings::default();
        let mut ctx = FrameContext {
            device: &mut device,
            scene: &scene,
            settings: &settings,
            window: settings.window_extent(),
            frame_index: 0,
        };
        let output = RayCastShadowStage.render(&mut ctx, &casters);

        let map = output.directional.unwrap();
        assert!(output.point.is_none() && output.spot.is_none());
        let texels = device.read_texture(map).unwrap();
        let centre = texels[128 * 256 + 128].x;
        assert!(centre > 0.0 && centre < 1.0, "depth {centre}");
    }
}
