use glam::Vec3;
use hecs::{Entity, World};

use crate::scene::components::{LightComponent, LightKind, MeshComponent, Name, TransformComponent};
use crate::scene::{Camera, Transform};

/// Entities plus the active camera. The render core only reads it during a
/// frame; game code mutates it between frames.
pub struct Scene {
    pub world: World,
    camera: Camera,
}

/// World-space view of one light.
#[derive(Debug, Clone, Copy)]
pub struct LightInstance {
    pub entity: Entity,
    pub transform: Transform,
    pub light: LightComponent,
}

impl LightInstance {
    pub fn position(&self) -> Vec3 {
        self.transform.translation
    }

    pub fn direction(&self) -> Vec3 {
        self.transform.forward()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            camera: Camera::default(),
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    pub fn spawn_light(&mut self, name: &str, transform: Transform, light: LightComponent) -> Entity {
        self.world
            .spawn((Name::new(name), TransformComponent(transform), light))
    }

    pub fn spawn_mesh(&mut self, name: &str, transform: Transform, mesh: MeshComponent) -> Entity {
        self.world
            .spawn((Name::new(name), TransformComponent(transform), mesh))
    }

    pub fn despawn(&mut self, entity: Entity) -> bool {
        self.world.despawn(entity).is_ok()
    }

    /// Resolves a light entity. `None` once the entity was despawned or lost
    /// either component.
    pub fn light(&self, entity: Entity) -> Option<LightInstance> {
        let transform = self.world.get::<&TransformComponent>(entity).ok()?.0;
        let light = *self.world.get::<&LightComponent>(entity).ok()?;
        Some(LightInstance {
            entity,
            transform,
            light,
        })
    }

    pub fn light_mut(&mut self, entity: Entity) -> Option<hecs::RefMut<'_, LightComponent>> {
        self.world.get::<&mut LightComponent>(entity).ok()
    }

    /// Every {Transform, Light} pair in world iteration order.
    pub fn lights(&self) -> Vec<LightInstance> {
        self.world
            .query::<(&TransformComponent, &LightComponent)>()
            .iter()
            .map(|(entity, (transform, light))| LightInstance {
                entity,
                transform: transform.0,
                light: *light,
            })
            .collect()
    }

    /// First light of `kind`, shadow casting or not.
    pub fn first_light(&self, kind: LightKind) -> Option<LightInstance> {
        self.lights().into_iter().find(|instance| instance.light.kind == kind)
    }

    pub fn meshes(&self) -> Vec<(Transform, MeshComponent)> {
        self.world
            .query::<(&TransformComponent, &MeshComponent)>()
            .iter()
            .map(|(_, (transform, mesh))| (transform.0, *mesh))
            .collect()
    }

    pub fn has_any_lights(&self) -> bool {
        self.world.query::<&LightComponent>().iter().next().is_some()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn despawned_light_no_longer_resolves() {
        let mut scene = Scene::new();
        let sun = scene.spawn_light("Sun", Transform::IDENTITY, LightComponent::directional());
        assert!(scene.light(sun).is_some());
        assert!(scene.despawn(sun));
        assert!(scene.light(sun).is_none());
        assert!(!scene.has_any_lights());
    }

    #[test]
    fn lights_without_transform_are_not_listed() {
        let mut scene = Scene::new();
        scene.world.spawn((LightComponent::point(3.0),));
        assert!(scene.lights().is_empty());
    }
}
