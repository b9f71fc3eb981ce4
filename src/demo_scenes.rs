use glam::{Quat, Vec3};
use log::info;
use frame_pipeline::scene::{
    Camera, LightComponent, MeshComponent, Scene, ShadowResolution, Transform,
};

#[derive(Clone, Copy, Debug)]
pub enum DemoScene {
    Simple,
    Grid { size: i32 },
    ShadowTest,
}

impl DemoScene {
    pub fn build(self) -> Scene {
        match self {
            DemoScene::Simple => setup_simple_scene(),
            DemoScene::Grid { size } => setup_grid_scene(size),
            DemoScene::ShadowTest => setup_shadow_test_scene(),
        }
    }

    /// Parses `simple`, `grid` (optionally `grid:<size>`) or `shadows`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.split_once(':') {
            Some(("grid", size)) => size.parse().ok().map(|size| DemoScene::Grid { size }),
            Some(_) => None,
            None => match name {
                "simple" => Some(DemoScene::Simple),
                "grid" => Some(DemoScene::Grid { size: 3 }),
                "shadows" => Some(DemoScene::ShadowTest),
                _ => None,
            },
        }
    }

    /// Camera for `frame` of an orbit around the origin.
    pub fn orbit_camera(self, frame: u64) -> Camera {
        let (radius, height) = match self {
            DemoScene::Simple => (8.0, 4.0),
            DemoScene::Grid { .. } => (15.0, 8.0),
            DemoScene::ShadowTest => (10.0, 5.0),
        };
        let angle = frame as f32 * 0.05;
        Camera::looking_at(
            Vec3::new(angle.cos() * radius, height, angle.sin() * radius),
            Vec3::ZERO,
        )
    }
}

pub fn default_scene() -> DemoScene {
    DemoScene::ShadowTest
}

fn sun(direction: Vec3) -> Transform {
    let direction = direction.normalize();
    Transform::from_trs(Vec3::ZERO, Quat::from_rotation_arc(Vec3::NEG_Z, direction), Vec3::ONE)
}

fn setup_simple_scene() -> Scene {
    info!("Creating simple scene...");
    let mut scene = Scene::new();

    let colors = [
        Vec3::new(0.9, 0.2, 0.2),
        Vec3::new(0.2, 0.9, 0.2),
        Vec3::new(0.2, 0.2, 0.9),
    ];
    for (i, color) in colors.into_iter().enumerate() {
        scene.spawn_mesh(
            &format!("Sphere {i}"),
            Transform::from_translation(Vec3::new(i as f32 * 2.5 - 2.5, 1.0, 0.0)),
            MeshComponent::sphere(1.0, color),
        );
    }
    scene.spawn_mesh("Ground", Transform::IDENTITY, MeshComponent::ground(Vec3::splat(0.6)));
    scene.spawn_light(
        "Sun",
        sun(Vec3::new(-0.5, -1.0, -0.3)),
        LightComponent::directional().with_shadows(ShadowResolution::Medium),
    );

    info!("Simple scene: {} entities", scene.world.len());
    scene
}

fn setup_grid_scene(size: i32) -> Scene {
    info!("Creating grid scene...");
    let mut scene = Scene::new();

    for x in -size..=size {
        for z in -size..=size {
            let tint = Vec3::new(
                (x + size) as f32 / (2 * size).max(1) as f32,
                0.5,
                (z + size) as f32 / (2 * size).max(1) as f32,
            );
            scene.spawn_mesh(
                &format!("Sphere {x},{z}"),
                Transform::from_translation(Vec3::new(x as f32 * 2.0, 0.5, z as f32 * 2.0)),
                MeshComponent::sphere(0.5, tint),
            );
        }
    }
    scene.spawn_mesh("Ground", Transform::IDENTITY, MeshComponent::ground(Vec3::splat(0.5)));
    scene.spawn_light(
        "Sun",
        sun(Vec3::new(-0.3, -1.0, -0.5)),
        LightComponent::directional().with_shadows(ShadowResolution::High),
    );
    scene.spawn_light(
        "Fill",
        Transform::from_translation(Vec3::new(0.0, 4.0, 0.0)),
        LightComponent::point(12.0).with_color(Vec3::new(1.0, 0.8, 0.6), 4.0),
    );

    info!("Grid scene: {} entities", scene.world.len());
    scene
}

fn setup_shadow_test_scene() -> Scene {
    info!("Creating shadow map test scene...");
    let mut scene = Scene::new();

    scene.spawn_mesh(
        "Shadow Test Floor",
        Transform::IDENTITY,
        MeshComponent::ground(Vec3::splat(0.8)),
    );
    scene.spawn_mesh(
        "Shadow Test Sphere",
        Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)),
        MeshComponent::sphere(1.0, Vec3::new(0.86, 0.86, 0.9)),
    );

    scene.spawn_light(
        "Sun",
        sun(Vec3::new(-0.6, -1.0, -0.4)),
        LightComponent::directional()
            .with_color(Vec3::new(1.0, 0.95, 0.9), 3.0)
            .with_shadows(ShadowResolution::High),
    );
    scene.spawn_light(
        "Spot",
        Transform::looking_at(Vec3::new(3.0, 4.0, 3.0), Vec3::ZERO),
        LightComponent::spot(15.0, 30f32.to_radians())
            .with_color(Vec3::new(0.6, 0.7, 1.0), 6.0)
            .with_shadows(ShadowResolution::Medium)
            .with_planes(0.5, 20.0)
            .with_bias(0.003),
    );
    scene.spawn_light(
        "Lamp",
        Transform::from_translation(Vec3::new(-3.0, 2.0, 1.0)),
        LightComponent::point(8.0)
            .with_color(Vec3::new(1.0, 0.5, 0.2), 4.0)
            .with_shadows(ShadowResolution::Low),
    );

    info!("Shadow test scene created: {} entities", scene.world.len());
    scene
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_names_parse() {
        assert!(matches!(DemoScene::from_name("simple"), Some(DemoScene::Simple)));
        assert!(matches!(DemoScene::from_name("grid"), Some(DemoScene::Grid { size: 3 })));
        assert!(matches!(DemoScene::from_name("grid:5"), Some(DemoScene::Grid { size: 5 })));
        assert!(matches!(DemoScene::from_name("shadows"), Some(DemoScene::ShadowTest)));
        assert!(DemoScene::from_name("grid:x").is_none());
        assert!(DemoScene::from_name("gltf").is_none());
    }
}
