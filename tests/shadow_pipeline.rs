use frame_pipeline::renderer::passes::{FrameContext, ShadowStage, ShadowmapPassOutput};
use frame_pipeline::renderer::shadows::{
    CasterState, ShadowCasterSelector, DEFAULT_SHADOW_BIAS, DEFAULT_SHADOW_FAR, DEFAULT_SHADOW_NEAR,
    NO_CASTER_INDEX,
};
use frame_pipeline::renderer::{FrameOrchestrator, PassKind, RenderDevice, SoftwareDevice};
use frame_pipeline::scene::{Camera, LightComponent, LightKind, MeshComponent, Scene, ShadowResolution, Transform};
use frame_pipeline::settings::RenderSettings;
use glam::{Mat4, Vec3};

const EPSILON: f32 = 1e-5;

/// Leaves every shadow map unrendered so frames stay cheap.
struct NoShadowMaps;

impl ShadowStage for NoShadowMaps {
    fn render(&mut self, _ctx: &mut FrameContext<'_>, _casters: &ShadowCasterSelector) -> ShadowmapPassOutput {
        ShadowmapPassOutput::default()
    }
}

fn small_settings() -> RenderSettings {
    let mut settings = RenderSettings::default();
    settings.resolution.width = 24;
    settings.resolution.height = 16;
    settings.post_process.ssao_enabled = false;
    settings.post_process.bloom_enabled = false;
    settings
}

fn sun_scene(resolution: ShadowResolution) -> (Scene, hecs::Entity) {
    let mut scene = Scene::new();
    scene.set_camera(Camera::looking_at(Vec3::new(0.0, 4.0, 8.0), Vec3::ZERO));
    scene.spawn_mesh("Ground", Transform::IDENTITY, MeshComponent::ground(Vec3::ONE));
    let sun = scene.spawn_light(
        "Sun",
        Transform::looking_at(Vec3::new(2.0, 10.0, 3.0), Vec3::ZERO),
        LightComponent::directional().with_shadows(resolution),
    );
    (scene, sun)
}

fn project_shadow_cpu(matrix: Mat4, world_pos: Vec3) -> Vec3 {
    let clip = matrix * world_pos.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    Vec3::new(ndc.x * 0.5 + 0.5, -ndc.y * 0.5 + 0.5, ndc.z)
}

#[test]
fn empty_scene_has_no_casters_and_allocates_no_shadow_targets() {
    let mut device = SoftwareDevice::new();
    let scene = Scene::new();
    let mut casters = ShadowCasterSelector::new();

    assert!(!casters.has_directional_shadow_caster());
    assert!(!casters.has_point_shadow_caster());
    assert!(!casters.has_spot_shadow_caster());
    assert!(device.allocations_labelled("").is_empty());

    casters.start(&mut device, &scene);
    casters.update(&mut device, &scene);
    assert!(LightKind::ALL.iter().all(|kind| !casters.has_caster(*kind)));
    assert!(device.allocations().is_empty());
}

#[test]
fn medium_directional_caster_gets_a_512_target_at_start() {
    let mut device = SoftwareDevice::new();
    let (scene, sun) = sun_scene(ShadowResolution::Medium);
    let mut casters = ShadowCasterSelector::new();
    casters.start(&mut device, &scene);

    assert!(casters.has_directional_shadow_caster());
    assert_eq!(casters.caster_entity(LightKind::Directional), Some(sun));
    assert_eq!(
        casters.caster_state(LightKind::Directional),
        CasterState::HasCaster(ShadowResolution::Medium)
    );
    assert_eq!(casters.shadow_size(LightKind::Directional), Some((512, 512)));

    let map = casters.framebuffer(LightKind::Directional).unwrap();
    let info = device.texture_info(map).unwrap();
    assert_eq!((info.size.width, info.size.height), (512, 512));
}

#[test]
fn resolution_change_reallocates_exactly_once_on_the_next_frame() {
    let mut device = SoftwareDevice::new();
    let (mut scene, sun) = sun_scene(ShadowResolution::Medium);
    let mut casters = ShadowCasterSelector::new();
    casters.start(&mut device, &scene);

    // Frames up to K: nothing changes.
    for _ in 0..3 {
        casters.update(&mut device, &scene);
    }
    assert_eq!(casters.reallocation_count(LightKind::Directional), 1);
    assert_eq!(device.allocations_labelled("DirectionalShadow").len(), 1);

    let old_map = casters.framebuffer(LightKind::Directional).unwrap();
    device.clear_logs();
    scene.light_mut(sun).unwrap().shadow_resolution = ShadowResolution::High;

    // Frame K + 1.
    casters.update(&mut device, &scene);
    assert_eq!(casters.reallocation_count(LightKind::Directional), 2);
    assert_eq!(casters.shadow_size(LightKind::Directional), Some((1024, 1024)));
    assert_eq!(device.allocations_labelled("DirectionalShadow").len(), 1);
    assert_eq!(device.destroyed(), &[old_map]);
    assert!(!device.is_valid(old_map));

    let new_map = casters.framebuffer(LightKind::Directional).unwrap();
    let info = device.texture_info(new_map).unwrap();
    assert_eq!((info.size.width, info.size.height), (1024, 1024));
    assert_eq!(info.format, wgpu::TextureFormat::Depth32Float);

    // Later frames reuse it.
    casters.update(&mut device, &scene);
    casters.update(&mut device, &scene);
    assert_eq!(casters.reallocation_count(LightKind::Directional), 2);
}

#[test]
fn orchestrated_frames_reuse_shadow_targets_until_quality_changes() {
    let (scene, sun) = sun_scene(ShadowResolution::Low);
    let mut orchestrator = FrameOrchestrator::new(SoftwareDevice::new(), scene, small_settings())
        .unwrap()
        .with_shadow_stage(NoShadowMaps);

    orchestrator.render_frame();
    orchestrator.render_frame();
    assert_eq!(orchestrator.casters().reallocation_count(LightKind::Directional), 1);
    assert_eq!(
        orchestrator.device().allocations_labelled("DirectionalShadow").len(),
        1
    );

    orchestrator.scene_mut().light_mut(sun).unwrap().shadow_resolution = ShadowResolution::Medium;
    let report = orchestrator.render_frame().clone();
    assert_eq!(report.executed, PassKind::ALL.to_vec());
    assert_eq!(orchestrator.casters().reallocation_count(LightKind::Directional), 2);
    assert_eq!(orchestrator.casters().shadow_size(LightKind::Directional), Some((512, 512)));
}

#[test]
fn selection_is_deterministic_for_a_fixed_camera() {
    let mut scene = Scene::new();
    scene.set_camera(Camera::looking_at(Vec3::ZERO, Vec3::NEG_Z));
    let far = scene.spawn_light(
        "Far",
        Transform::from_translation(Vec3::new(0.0, 0.0, 20.0)),
        LightComponent::spot(30.0, 0.5).with_shadows(ShadowResolution::Low),
    );
    let _unlit = scene.spawn_light(
        "Closest but not casting",
        Transform::from_translation(Vec3::new(0.0, 0.0, 1.0)),
        LightComponent::spot(30.0, 0.5),
    );
    let near = scene.spawn_light(
        "Near",
        Transform::from_translation(Vec3::new(3.0, 0.0, 0.0)),
        LightComponent::spot(30.0, 0.5).with_shadows(ShadowResolution::Low),
    );

    let mut device = SoftwareDevice::new();
    let mut casters = ShadowCasterSelector::new();
    casters.start(&mut device, &scene);
    for _ in 0..4 {
        casters.update(&mut device, &scene);
        assert_eq!(casters.caster_entity(LightKind::Spot), Some(near));
        assert_eq!(casters.caster_index(LightKind::Spot), 2);
    }

    scene.camera_mut().eye = Vec3::new(0.0, 0.0, 18.0);
    casters.update(&mut device, &scene);
    assert_eq!(casters.caster_entity(LightKind::Spot), Some(far));
    assert_eq!(casters.caster_index(LightKind::Spot), 0);
}

#[test]
fn despawned_caster_reports_sentinels() {
    let mut device = SoftwareDevice::new();
    let (mut scene, sun) = sun_scene(ShadowResolution::Low);
    let mut casters = ShadowCasterSelector::new();
    casters.start(&mut device, &scene);
    assert!(scene.despawn(sun));

    assert_eq!(casters.direction(LightKind::Directional, &scene), Vec3::ZERO);
    assert_eq!(casters.position(LightKind::Directional, &scene), Vec3::ZERO);
    assert_eq!(casters.near_plane(LightKind::Directional, &scene), DEFAULT_SHADOW_NEAR);
    assert_eq!(casters.far_plane(LightKind::Directional, &scene), DEFAULT_SHADOW_FAR);
    assert_eq!(casters.bias(LightKind::Directional, &scene), DEFAULT_SHADOW_BIAS);
    assert_eq!(casters.light_view_proj(LightKind::Directional, &scene), Mat4::IDENTITY);

    casters.update(&mut device, &scene);
    assert!(!casters.has_directional_shadow_caster());
    assert_eq!(casters.caster_index(LightKind::Directional), NO_CASTER_INDEX);
    assert!(casters.framebuffer(LightKind::Directional).is_none());
}

#[test]
fn spot_caster_uses_its_configured_planes_and_bias() {
    let mut device = SoftwareDevice::new();
    let mut scene = Scene::new();
    scene.spawn_light(
        "Torch",
        Transform::looking_at(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 1.0, -10.0)),
        LightComponent::spot(30.0, 25f32.to_radians())
            .with_shadows(ShadowResolution::Low)
            .with_planes(0.5, 20.0)
            .with_bias(0.01),
    );
    let mut casters = ShadowCasterSelector::new();
    casters.start(&mut device, &scene);

    assert_eq!(casters.near_plane(LightKind::Spot, &scene), 0.5);
    assert_eq!(casters.far_plane(LightKind::Spot, &scene), 20.0);
    assert_eq!(casters.bias(LightKind::Spot, &scene), 0.01);

    let matrix = casters.light_view_proj(LightKind::Spot, &scene);
    let inside = project_shadow_cpu(matrix, Vec3::new(0.0, 1.0, -5.0)).z;
    let too_near = project_shadow_cpu(matrix, Vec3::new(0.0, 1.0, -0.25)).z;
    let too_far = project_shadow_cpu(matrix, Vec3::new(0.0, 1.0, -25.0)).z;
    assert!(inside > 0.0 && inside < 1.0, "depth {inside}");
    assert!(too_near < 0.0, "depth {too_near}");
    assert!(too_far > 1.0, "depth {too_far}");
}

#[test]
fn directional_matrix_keeps_the_ground_inside_the_shadow_volume() {
    let mut device = SoftwareDevice::new();
    let (scene, _) = sun_scene(ShadowResolution::Low);
    let mut casters = ShadowCasterSelector::new();
    casters.start(&mut device, &scene);

    let matrix = casters.light_view_proj(LightKind::Directional, &scene);
    for point in [Vec3::ZERO, Vec3::new(3.0, 0.0, -2.0), Vec3::new(-4.0, 0.0, 4.0)] {
        let uvz = project_shadow_cpu(matrix, point);
        assert!(
            (-EPSILON..=1.0 + EPSILON).contains(&uvz.x) && (-EPSILON..=1.0 + EPSILON).contains(&uvz.y),
            "{point:?} projects outside the map: {uvz:?}"
        );
        assert!(uvz.z > 0.0 && uvz.z < 1.0, "{point:?} depth {}", uvz.z);
    }
}

#[test]
fn ray_cast_shadow_map_is_nearer_where_the_sphere_blocks_the_sun() {
    let mut scene = Scene::new();
    scene.set_camera(Camera::looking_at(Vec3::new(0.0, 4.0, 8.0), Vec3::ZERO));
    scene.spawn_mesh("Ground", Transform::IDENTITY, MeshComponent::ground(Vec3::ONE));
    scene.spawn_mesh(
        "Ball",
        Transform::from_translation(Vec3::new(0.0, 2.0, 0.0)),
        MeshComponent::sphere(1.0, Vec3::ONE),
    );
    scene.spawn_light(
        "Sun",
        Transform::looking_at(Vec3::new(0.0, 10.0, 0.001), Vec3::ZERO),
        LightComponent::directional().with_shadows(ShadowResolution::Low),
    );

    let mut orchestrator = FrameOrchestrator::new(SoftwareDevice::new(), scene, small_settings()).unwrap();
    orchestrator.render_frame();

    let casters = orchestrator.casters();
    let map = casters.framebuffer(LightKind::Directional).unwrap();
    let matrix = casters.light_view_proj(LightKind::Directional, orchestrator.scene());
    let texels = orchestrator.device().read_texture(map).unwrap();
    let size = 256usize;
    let depth_at = |world: Vec3| {
        let uvz = project_shadow_cpu(matrix, world);
        let x = ((uvz.x * size as f32) as usize).min(size - 1);
        let y = ((uvz.y * size as f32) as usize).min(size - 1);
        texels[y * size + x].x
    };

    let under_ball = depth_at(Vec3::ZERO);
    let open_ground = depth_at(Vec3::new(6.0, 0.0, 6.0));
    assert!(under_ball < open_ground, "{under_ball} >= {open_ground}");
}
