//! Per-frame shadow caster selection.
//!
//! For every light kind the selector picks the shadow casting light closest to
//! the camera and keeps one depth render target sized to that light's
//! configured [`ShadowResolution`]. Records are rebuilt from scratch on every
//! scan; only the render targets persist between frames.
//!
//! Accessors never fail. When a kind has no caster, or its entity no longer
//! resolves in the scene, they log an error and return the documented sentinel.

use glam::{Mat4, Vec3};
use hecs::Entity;

use crate::renderer::device::{RenderDevice, TextureId};
use crate::renderer::target::{RenderTarget, RenderTargetDesc, TargetSize};
use crate::scene::{LightComponent, LightInstance, LightKind, Scene, ShadowResolution, TransformComponent};

pub const DEFAULT_SHADOW_NEAR: f32 = 0.1;
pub const DEFAULT_SHADOW_FAR: f32 = 100.0;
pub const DEFAULT_SHADOW_BIAS: f32 = 0.005;
pub const NO_CASTER_INDEX: u32 = u32::MAX;

/// Cube face order: +X, -X, +Y, -Y, +Z, -Z.
pub const POINT_SHADOW_FACES: u32 = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CasterState {
    NoCaster,
    HasCaster(ShadowResolution),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ShadowCasterRecord {
    entity: Entity,
    /// Ordinal among all lights of the kind seen during the scan.
    index: u32,
    resolution: ShadowResolution,
}

#[derive(Default)]
struct CasterSlot {
    record: Option<ShadowCasterRecord>,
    target: Option<RenderTarget>,
    allocations: u32,
}

pub struct ShadowCasterSelector {
    slots: [CasterSlot; 3],
    started: bool,
}

impl Default for ShadowCasterSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowCasterSelector {
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
            started: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn start(&mut self, device: &mut dyn RenderDevice, scene: &Scene) {
        self.scan(device, scene);
        self.started = true;
        for kind in LightKind::ALL {
            log::info!(
                "{} shadow caster at start: {:?}",
                kind.label(),
                self.caster_state(kind)
            );
        }
    }

    pub fn update(&mut self, device: &mut dyn RenderDevice, scene: &Scene) {
        self.scan(device, scene);
    }

    /// Destroys every shadow target. Records are dropped with them.
    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        for slot in &mut self.slots {
            slot.record = None;
            if let Some(target) = slot.target.take() {
                target.destroy(device);
            }
        }
        self.started = false;
    }

    fn scan(&mut self, device: &mut dyn RenderDevice, scene: &Scene) {
        for kind in LightKind::ALL {
            let record = select_caster(scene, kind);
            let slot = &mut self.slots[kind.index()];
            if slot.record.map(|r| r.entity) != record.map(|r| r.entity) {
                log::debug!("{} shadow caster changed to {:?}", kind.label(), record);
            }
            slot.record = record;
            if let Some(record) = record {
                ensure_target(device, kind, slot, record.resolution);
            }
        }
    }

    pub fn has_directional_shadow_caster(&self) -> bool {
        self.has_caster(LightKind::Directional)
    }

    pub fn has_point_shadow_caster(&self) -> bool {
        self.has_caster(LightKind::Point)
    }

    pub fn has_spot_shadow_caster(&self) -> bool {
        self.has_caster(LightKind::Spot)
    }

    pub fn has_caster(&self, kind: LightKind) -> bool {
        self.slots[kind.index()].record.is_some()
    }

    pub fn caster_state(&self, kind: LightKind) -> CasterState {
        match self.slots[kind.index()].record {
            Some(record) => CasterState::HasCaster(record.resolution),
            None => CasterState::NoCaster,
        }
    }

    pub fn caster_entity(&self, kind: LightKind) -> Option<Entity> {
        self.slots[kind.index()].record.map(|record| record.entity)
    }

    /// Number of times the kind's target was allocated, initial allocation included.
    pub fn reallocation_count(&self, kind: LightKind) -> u32 {
        self.slots[kind.index()].allocations
    }

    /// Size of the kind's retained target, whether or not a caster is selected.
    pub fn shadow_size(&self, kind: LightKind) -> Option<(u32, u32)> {
        self.slots[kind.index()].target.as_ref().map(RenderTarget::size)
    }

    pub fn caster_index(&self, kind: LightKind) -> u32 {
        match self.slots[kind.index()].record {
            Some(record) => record.index,
            None => {
                log::error!("caster_index: no {} shadow caster", kind.label());
                NO_CASTER_INDEX
            }
        }
    }

    /// Depth attachment of the kind's shadow target; a six-layer cube for point
    /// casters.
    pub fn framebuffer(&self, kind: LightKind) -> Option<TextureId> {
        let slot = &self.slots[kind.index()];
        if slot.record.is_none() {
            log::error!("framebuffer: no {} shadow caster", kind.label());
            return None;
        }
        match slot.target.as_ref().and_then(RenderTarget::depth_texture) {
            Some(texture) => Some(texture),
            None => {
                log::warn!("{} shadow caster has no allocated target", kind.label());
                None
            }
        }
    }

    pub fn direction(&self, kind: LightKind, scene: &Scene) -> Vec3 {
        self.resolve(kind, scene, "direction")
            .map(|caster| caster.direction())
            .unwrap_or(Vec3::ZERO)
    }

    pub fn position(&self, kind: LightKind, scene: &Scene) -> Vec3 {
        self.resolve(kind, scene, "position")
            .map(|caster| caster.position())
            .unwrap_or(Vec3::ZERO)
    }

    pub fn near_plane(&self, kind: LightKind, scene: &Scene) -> f32 {
        self.resolve(kind, scene, "near_plane")
            .map(|caster| caster.light.near_plane)
            .unwrap_or(DEFAULT_SHADOW_NEAR)
    }

    pub fn far_plane(&self, kind: LightKind, scene: &Scene) -> f32 {
        self.resolve(kind, scene, "far_plane")
            .map(|caster| caster.light.far_plane)
            .unwrap_or(DEFAULT_SHADOW_FAR)
    }

    pub fn bias(&self, kind: LightKind, scene: &Scene) -> f32 {
        self.resolve(kind, scene, "bias")
            .map(|caster| caster.light.bias)
            .unwrap_or(DEFAULT_SHADOW_BIAS)
    }

    /// Light-space view-projection with depth in [0, 1]. Directional casters get
    /// an orthographic volume centred on the camera focus, spot casters a
    /// perspective covering the cone, point casters their +X cube face.
    pub fn light_view_proj(&self, kind: LightKind, scene: &Scene) -> Mat4 {
        let Some(caster) = self.resolve(kind, scene, "light_view_proj") else {
            return Mat4::IDENTITY;
        };
        match kind {
            LightKind::Directional => directional_view_proj(&caster, scene.camera().focus()),
            LightKind::Spot => spot_view_proj(&caster),
            LightKind::Point => point_face_view_projs(&caster)[0],
        }
    }

    pub fn point_face_view_projs(&self, scene: &Scene) -> [Mat4; 6] {
        match self.resolve(LightKind::Point, scene, "point_face_view_projs") {
            Some(caster) => point_face_view_projs(&caster),
            None => [Mat4::IDENTITY; 6],
        }
    }

    fn resolve(&self, kind: LightKind, scene: &Scene, accessor: &str) -> Option<LightInstance> {
        let Some(record) = self.slots[kind.index()].record else {
            log::error!("{}: no {} shadow caster", accessor, kind.label());
            return None;
        };
        let caster = scene.light(record.entity);
        if caster.is_none() {
            log::error!(
                "{}: {} shadow caster {:?} no longer exists",
                accessor,
                kind.label(),
                record.entity
            );
        }
        caster
    }
}

/// Nearest shadow casting light of `kind`; ties keep the first one seen.
fn select_caster(scene: &Scene, kind: LightKind) -> Option<ShadowCasterRecord> {
    let camera_position = scene.camera().position();
    let mut ordinal = 0u32;
    let mut best: Option<(f32, ShadowCasterRecord)> = None;

    for (entity, (transform, light)) in scene
        .world
        .query::<(&TransformComponent, &LightComponent)>()
        .iter()
    {
        if light.kind != kind {
            continue;
        }
        let index = ordinal;
        ordinal += 1;
        if !light.cast_shadows {
            continue;
        }

        let distance = transform.0.translation.distance_squared(camera_position);
        if best.map_or(true, |(nearest, _)| distance < nearest) {
            best = Some((
                distance,
                ShadowCasterRecord {
                    entity,
                    index,
                    resolution: light.shadow_resolution,
                },
            ));
        }
    }

    best.map(|(_, record)| record)
}

fn ensure_target(
    device: &mut dyn RenderDevice,
    kind: LightKind,
    slot: &mut CasterSlot,
    resolution: ShadowResolution,
) {
    let size = resolution.size();
    if slot.target.as_ref().map(RenderTarget::size) == Some((size, size)) {
        return;
    }
    if let Some(target) = slot.target.as_mut() {
        log::info!(
            "Reallocating {} shadow map {:?} -> {}x{}",
            kind.label(),
            target.size(),
            size,
            size
        );
        match target.reallocate(device, size, size) {
            Ok(()) => slot.allocations += 1,
            Err(err) => {
                log::error!("Failed to reallocate {} shadow map: {}", kind.label(), err);
                slot.target = None;
            }
        }
        return;
    }

    let layers = match kind {
        LightKind::Point => POINT_SHADOW_FACES,
        _ => 1,
    };
    let desc = RenderTargetDesc::depth(
        format!("{}Shadow", kind.label()),
        TargetSize::Absolute {
            width: size,
            height: size,
        },
    )
    .with_layers(layers);
    let window = wgpu::Extent3d {
        width: size,
        height: size,
        depth_or_array_layers: 1,
    };

    match RenderTarget::new(device, desc, window) {
        Ok(target) => {
            log::info!("Allocated {} shadow map {}x{}", kind.label(), size, size);
            slot.target = Some(target);
            slot.allocations += 1;
        }
        Err(err) => log::error!("Failed to allocate {} shadow map: {}", kind.label(), err),
    }
}

fn directional_view_proj(caster: &LightInstance, focus: Vec3) -> Mat4 {
    let light = &caster.light;
    let direction = caster.direction();
    let distance = 0.5 * (light.far_plane - light.near_plane).max(0.2);
    let eye = focus - direction * distance;
    let view = Mat4::look_at_rh(eye, focus, shadow_up(direction));
    let extent = light.shadow_extent.max(0.1);
    let proj = Mat4::orthographic_rh(
        -extent,
        extent,
        -extent,
        extent,
        light.near_plane,
        light.far_plane.max(light.near_plane + 0.1),
    );
    proj * view
}

fn spot_view_proj(caster: &LightInstance) -> Mat4 {
    let light = &caster.light;
    let position = caster.position();
    let direction = caster.direction();
    let fov = (light.spot_angle * 2.0).clamp(0.1, std::f32::consts::PI - 0.1);
    let view = Mat4::look_at_rh(position, position + direction, shadow_up(direction));
    let proj = Mat4::perspective_rh(fov, 1.0, light.near_plane, light.far_plane.max(light.near_plane + 0.1));
    proj * view
}

fn point_face_view_projs(caster: &LightInstance) -> [Mat4; 6] {
    let light = &caster.light;
    let position = caster.position();
    let projection = Mat4::perspective_rh(
        std::f32::consts::FRAC_PI_2,
        1.0,
        light.near_plane,
        light.far_plane.max(light.near_plane + 0.1),
    );

    let dirs = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
    let ups = [Vec3::Y, Vec3::Y, Vec3::Z, Vec3::NEG_Z, Vec3::Y, Vec3::Y];

    let mut matrices = [Mat4::IDENTITY; 6];
    for ((matrix, dir), up) in matrices.iter_mut().zip(dirs.iter()).zip(ups.iter()) {
        *matrix = projection * Mat4::look_at_rh(position, position + *dir, *up);
    }
    matrices
}

fn shadow_up(direction: Vec3) -> Vec3 {
    if direction.abs().dot(Vec3::Y) > 0.95 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::software::SoftwareDevice;
    use crate::scene::{Camera, Transform};

    fn scene_with_camera_at_origin() -> Scene {
        let mut scene = Scene::new();
        scene.set_camera(Camera::looking_at(Vec3::ZERO, Vec3::NEG_Z));
        scene
    }

    fn spawn(scene: &mut Scene, name: &str, at: Vec3, light: LightComponent) -> Entity {
        scene.spawn_light(name, Transform::from_translation(at), light)
    }

    #[test]
    fn picks_nearest_casting_light_and_counts_every_light_of_the_kind() {
        let mut scene = scene_with_camera_at_origin();
        spawn(&mut scene, "Far", Vec3::new(0.0, 0.0, 9.0), LightComponent::point(5.0).with_shadows(ShadowResolution::Low));
        spawn(&mut scene, "NearNoShadow", Vec3::new(0.0, 0.0, 1.0), LightComponent::point(5.0));
        let near = spawn(&mut scene, "Near", Vec3::new(0.0, 3.0, 0.0), LightComponent::point(5.0).with_shadows(ShadowResolution::Low));

        let record = select_caster(&scene, LightKind::Point).unwrap();
        assert_eq!(record.entity, near);
        assert_eq!(record.index, 2);
        assert!(select_caster(&scene, LightKind::Directional).is_none());
    }

    #[test]
    fn ties_keep_the_first_light_seen() {
        let mut scene = scene_with_camera_at_origin();
        let first = spawn(&mut scene, "A", Vec3::new(2.0, 0.0, 0.0), LightComponent::spot(5.0, 0.5).with_shadows(ShadowResolution::Low));
        spawn(&mut scene, "B", Vec3::new(-2.0, 0.0, 0.0), LightComponent::spot(5.0, 0.5).with_shadows(ShadowResolution::Low));
        assert_eq!(select_caster(&scene, LightKind::Spot).unwrap().entity, first);
    }

    #[test]
    fn sentinels_without_caster() {
        let scene = Scene::new();
        let selector = ShadowCasterSelector::new();
        for kind in LightKind::ALL {
            assert_eq!(selector.direction(kind, &scene), Vec3::ZERO);
            assert_eq!(selector.position(kind, &scene), Vec3::ZERO);
            assert_eq!(selector.near_plane(kind, &scene), DEFAULT_SHADOW_NEAR);
            assert_eq!(selector.far_plane(kind, &scene), DEFAULT_SHADOW_FAR);
            assert_eq!(selector.bias(kind, &scene), DEFAULT_SHADOW_BIAS);
            assert_eq!(selector.caster_index(kind), NO_CASTER_INDEX);
            assert_eq!(selector.framebuffer(kind), None);
            assert_eq!(selector.light_view_proj(kind, &scene), Mat4::IDENTITY);
        }
        assert_eq!(selector.point_face_view_projs(&scene), [Mat4::IDENTITY; 6]);
    }

    #[test]
    fn point_target_is_a_six_layer_cube() {
        let mut device = SoftwareDevice::new();
        let mut scene = scene_with_camera_at_origin();
        spawn(&mut scene, "Lamp", Vec3::Y, LightComponent::point(5.0).with_shadows(ShadowResolution::Low));

        let mut selector = ShadowCasterSelector::new();
        selector.start(&mut device, &scene);

        let cube = selector.framebuffer(LightKind::Point).unwrap();
        let info = device.texture_info(cube).unwrap();
        assert_eq!(info.size.depth_or_array_layers, 6);
        assert_eq!((info.size.width, info.size.height), (256, 256));
        assert_eq!(info.format, wgpu::TextureFormat::Depth32Float);
    }

    #[test]
    fn losing_the_caster_retains_the_target() {
        let mut device = SoftwareDevice::new();
        let mut scene = scene_with_camera_at_origin();
        let sun = spawn(&mut scene, "Sun", Vec3::Y, LightComponent::directional().with_shadows(ShadowResolution::Low));

        let mut selector = ShadowCasterSelector::new();
        selector.start(&mut device, &scene);
        assert!(selector.has_directional_shadow_caster());

        scene.despawn(sun);
        selector.update(&mut device, &scene);
        assert_eq!(selector.caster_state(LightKind::Directional), CasterState::NoCaster);
        assert_eq!(selector.shadow_size(LightKind::Directional), Some((256, 256)));
        assert_eq!(device.live_texture_count(), 1);

        selector.release(&mut device);
        assert_eq!(device.live_texture_count(), 0);
    }

    #[test]
    fn directional_volume_contains_the_focus() {
        let mut scene = Scene::new();
        scene.set_camera(Camera::looking_at(Vec3::new(0.0, 2.0, 8.0), Vec3::new(1.0, 0.0, 0.0)));
        let light = LightComponent::directional().with_shadows(ShadowResolution::Low);
        let sun = scene.spawn_light(
            "Sun",
            Transform::looking_at(Vec3::new(5.0, 10.0, 5.0), Vec3::ZERO),
            light,
        );
        let caster = scene.light(sun).unwrap();
        let ndc = directional_view_proj(&caster, scene.camera().focus())
            .project_point3(scene.camera().focus());
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }
}
