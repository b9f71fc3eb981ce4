use glam::{Mat4, Quat, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn from_trs(t: Vec3, r: Quat, s: Vec3) -> Self {
        Self {
            translation: t,
            rotation: r,
            scale: s,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Places the transform at `position` with its -Z axis facing `target`.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let rotation = (target - position)
            .try_normalize()
            .map(|dir| Quat::from_rotation_arc(Vec3::NEG_Z, dir))
            .unwrap_or(Quat::IDENTITY);
        Self {
            translation: position,
            rotation,
            scale: Vec3::ONE,
        }
    }

    /// Unit -Z axis in world space; lights shine along it.
    pub fn forward(&self) -> Vec3 {
        (self.rotation * Vec3::NEG_Z)
            .try_normalize()
            .unwrap_or(Vec3::NEG_Y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn default_is_identity() {
        let m = Transform::default().matrix();
        assert!(m.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn translate_then_scale_ok() {
        let tr = Transform::from_trs(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY, Vec3::splat(2.0));
        let p = tr.matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        // (1,0,0) -> (2,0,0) -> (3,2,3)
        assert!(p.abs_diff_eq(Vec3::new(3.0, 2.0, 3.0), 1e-6));
    }

    #[test]
    fn looking_at_points_forward_at_target() {
        let tr = Transform::looking_at(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO);
        assert!(tr.forward().abs_diff_eq(Vec3::NEG_Y, 1e-5));
    }
}
