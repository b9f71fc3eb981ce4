//! CPU ray casting of the scene's analytic surfaces.
//!
//! The reference geometry and shadow stages produce their attachments here and
//! upload the texels, the same way a mesh pass would fill them by rasterising.

use glam::{Mat4, Vec2, Vec3};
use rayon::prelude::*;

use crate::error::RenderError;
use crate::renderer::device::{RenderDevice, TextureId};
use crate::scene::{Primitive, Scene};

const RAY_EPSILON: f32 = 1e-4;

#[derive(Clone, Copy, Debug)]
enum Shape {
    Sphere { center: Vec3, radius: f32 },
    Plane { point: Vec3, normal: Vec3 },
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Surface {
    shape: Shape,
    albedo: Vec3,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Hit {
    pub position: Vec3,
    pub normal: Vec3,
    pub albedo: Vec3,
}

pub(crate) fn collect_surfaces(scene: &Scene) -> Vec<Surface> {
    scene
        .meshes()
        .into_iter()
        .map(|(transform, mesh)| {
            let shape = match mesh.primitive {
                Primitive::Sphere { radius } => Shape::Sphere {
                    center: transform.translation,
                    radius: radius * transform.scale.max_element(),
                },
                Primitive::Ground => Shape::Plane {
                    point: transform.translation,
                    normal: (transform.rotation * Vec3::Y).try_normalize().unwrap_or(Vec3::Y),
                },
            };
            Surface {
                shape,
                albedo: mesh.albedo,
            }
        })
        .collect()
}

fn intersect(shape: &Shape, origin: Vec3, dir: Vec3) -> Option<(f32, Vec3)> {
    match *shape {
        Shape::Sphere { center, radius } => {
            let oc = origin - center;
            let b = oc.dot(dir);
            let c = oc.length_squared() - radius * radius;
            let disc = b * b - c;
            if disc < 0.0 {
                return None;
            }
            let sqrt = disc.sqrt();
            let t = if -b - sqrt > RAY_EPSILON { -b - sqrt } else { -b + sqrt };
            (t > RAY_EPSILON).then(|| (t, (origin + dir * t - center) / radius))
        }
        Shape::Plane { point, normal } => {
            let denom = normal.dot(dir);
            if denom.abs() < 1e-6 {
                return None;
            }
            let t = (point - origin).dot(normal) / denom;
            // Single-sided: the ground is only visible from above.
            (t > RAY_EPSILON && denom < 0.0).then_some((t, normal))
        }
    }
}

/// Nearest hit along a normalised ray.
pub(crate) fn trace(surfaces: &[Surface], origin: Vec3, dir: Vec3) -> Option<Hit> {
    surfaces
        .iter()
        .filter_map(|surface| {
            intersect(&surface.shape, origin, dir).map(|(t, normal)| (t, normal, surface.albedo))
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(t, normal, albedo)| Hit {
            position: origin + dir * t,
            normal,
            albedo,
        })
}

fn texel_ray(view_proj_inv: Mat4, uv: Vec2) -> Option<(Vec3, Vec3)> {
    let ndc = Vec2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0);
    let near = view_proj_inv.project_point3(ndc.extend(0.0));
    let far = view_proj_inv.project_point3(ndc.extend(1.0));
    (far - near).try_normalize().map(|dir| (near, dir))
}

fn cast_texels(surfaces: &[Surface], view_proj: Mat4, width: u32, height: u32) -> Vec<Option<Hit>> {
    let view_proj_inv = view_proj.inverse();
    (0..height)
        .into_par_iter()
        .flat_map_iter(|y| {
            (0..width).map(move |x| {
                let uv = Vec2::new(
                    (x as f32 + 0.5) / width as f32,
                    (y as f32 + 0.5) / height as f32,
                );
                texel_ray(view_proj_inv, uv)
                    .and_then(|(origin, dir)| trace(surfaces, origin, dir))
            })
        })
        .collect()
}

fn depth_of(hit: &Option<Hit>, view_proj: Mat4) -> f32 {
    hit.map(|hit| view_proj.project_point3(hit.position).z.clamp(0.0, 1.0))
        .unwrap_or(1.0)
}

/// Depth in [0, 1] as seen through `view_proj`; 1.0 where nothing is hit.
pub(crate) fn depth_texels(
    surfaces: &[Surface],
    view_proj: Mat4,
    width: u32,
    height: u32,
) -> Vec<[f32; 4]> {
    cast_texels(surfaces, view_proj, width, height)
        .iter()
        .map(|hit| [depth_of(hit, view_proj), 0.0, 0.0, 1.0])
        .collect()
}

pub(crate) struct AttributeTexels {
    pub albedo: Vec<[f32; 4]>,
    pub normal: Vec<[f32; 4]>,
    pub depth: Vec<[f32; 4]>,
}

/// Albedo, world-space normal and depth for a camera view.
pub(crate) fn attribute_texels(
    surfaces: &[Surface],
    view_proj: Mat4,
    width: u32,
    height: u32,
) -> AttributeTexels {
    let hits = cast_texels(surfaces, view_proj, width, height);
    let mut texels = AttributeTexels {
        albedo: Vec::with_capacity(hits.len()),
        normal: Vec::with_capacity(hits.len()),
        depth: Vec::with_capacity(hits.len()),
    };
    for hit in &hits {
        let (albedo, normal) = hit
            .map(|hit| (hit.albedo.extend(1.0), hit.normal.extend(0.0)))
            .unwrap_or((glam::Vec4::ZERO, glam::Vec4::ZERO));
        texels.albedo.push(albedo.to_array());
        texels.normal.push(normal.to_array());
        texels.depth.push([depth_of(hit, view_proj), 0.0, 0.0, 1.0]);
    }
    texels
}

/// Uploads one frame of attributes into the given single-layer textures.
pub(crate) fn upload_attributes(
    device: &mut dyn RenderDevice,
    texels: &AttributeTexels,
    albedo: TextureId,
    normal: TextureId,
    depth: TextureId,
) -> Result<(), RenderError> {
    device.write_texture(albedo, 0, bytemuck::cast_slice(&texels.albedo))?;
    device.write_texture(normal, 0, bytemuck::cast_slice(&texels.normal))?;
    device.write_texture(depth, 0, bytemuck::cast_slice(&texels.depth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Camera, MeshComponent, Transform};

    fn sphere_scene() -> Scene {
        let mut scene = Scene::new();
        scene.set_camera(Camera::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO));
        scene.spawn_mesh("Ball", Transform::IDENTITY, MeshComponent::sphere(1.0, Vec3::ONE));
        scene
    }

    #[test]
    fn ray_hits_front_of_sphere() {
        let surfaces = collect_surfaces(&sphere_scene());
        let hit = trace(&surfaces, Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z).unwrap();
        assert!(hit.position.abs_diff_eq(Vec3::Z, 1e-4));
        assert!(hit.normal.abs_diff_eq(Vec3::Z, 1e-4));
    }

    #[test]
    fn ground_is_invisible_from_below() {
        let mut scene = Scene::new();
        scene.spawn_mesh("Ground", Transform::IDENTITY, MeshComponent::ground(Vec3::ONE));
        let surfaces = collect_surfaces(&scene);
        assert!(trace(&surfaces, Vec3::new(0.0, 2.0, 0.0), Vec3::NEG_Y).is_some());
        assert!(trace(&surfaces, Vec3::new(0.0, -2.0, 0.0), Vec3::Y).is_none());
    }

    #[test]
    fn centre_texel_sees_the_sphere_and_corners_see_background() {
        let scene = sphere_scene();
        let view_proj = scene.camera().view_proj(1.0);
        let texels = attribute_texels(&collect_surfaces(&scene), view_proj, 9, 9);
        let centre = texels.depth[4 * 9 + 4][0];
        assert!(centre > 0.0 && centre < 1.0);
        assert_eq!(texels.depth[0][0], 1.0);
        assert_eq!(texels.albedo[4 * 9 + 4], [1.0, 1.0, 1.0, 1.0]);
    }
}
