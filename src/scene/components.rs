// Pure hecs components

use crate::scene::Transform;
use glam::Vec3;

// ============================================================================
// Core Components
// ============================================================================

/// Transform component (position, rotation, scale)
#[derive(Debug, Clone, Copy)]
pub struct TransformComponent(pub Transform);

/// Name component for debugging
#[derive(Debug, Clone)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

// ============================================================================
// Geometry Components
// ============================================================================

/// Analytic surface the reference passes can ray cast. Sphere radii are scaled
/// by the largest transform scale axis; a ground plane passes through the
/// transform origin with its normal along the transform's +Y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Sphere { radius: f32 },
    Ground,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshComponent {
    pub primitive: Primitive,
    pub albedo: Vec3,
}

impl MeshComponent {
    pub fn sphere(radius: f32, albedo: Vec3) -> Self {
        Self {
            primitive: Primitive::Sphere { radius },
            albedo,
        }
    }

    pub fn ground(albedo: Vec3) -> Self {
        Self {
            primitive: Primitive::Ground,
            albedo,
        }
    }
}

// ============================================================================
// Lighting Components
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

impl LightKind {
    pub const ALL: [LightKind; 3] = [LightKind::Directional, LightKind::Point, LightKind::Spot];

    pub fn label(self) -> &'static str {
        match self {
            LightKind::Directional => "Directional",
            LightKind::Point => "Point",
            LightKind::Spot => "Spot",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            LightKind::Directional => 0,
            LightKind::Point => 1,
            LightKind::Spot => 2,
        }
    }
}

/// Shadow map quality. Each step doubles the square map size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowResolution {
    Low,
    #[default]
    Medium,
    High,
    Ultra,
    Nightmare,
}

impl ShadowResolution {
    pub const ALL: [ShadowResolution; 5] = [
        ShadowResolution::Low,
        ShadowResolution::Medium,
        ShadowResolution::High,
        ShadowResolution::Ultra,
        ShadowResolution::Nightmare,
    ];

    /// Edge length in texels of the square shadow map.
    pub fn size(self) -> u32 {
        match self {
            ShadowResolution::Low => 256,
            ShadowResolution::Medium => 512,
            ShadowResolution::High => 1024,
            ShadowResolution::Ultra => 2048,
            ShadowResolution::Nightmare => 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightComponent {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    /// Attenuation distance for point and spot lights.
    pub range: f32,
    /// Outer cone half-angle in radians (spot only).
    pub spot_angle: f32,
    pub cast_shadows: bool,
    pub shadow_resolution: ShadowResolution,
    pub near_plane: f32,
    pub far_plane: f32,
    pub bias: f32,
    /// Half-size of the directional orthographic shadow volume.
    pub shadow_extent: f32,
}

impl LightComponent {
    pub const DEFAULT_NEAR: f32 = 0.1;
    pub const DEFAULT_FAR: f32 = 100.0;
    pub const DEFAULT_BIAS: f32 = 0.005;
    pub const DEFAULT_SHADOW_EXTENT: f32 = 15.0;

    pub fn new(kind: LightKind) -> Self {
        Self {
            kind,
            color: Vec3::ONE,
            intensity: 1.0,
            range: 10.0,
            spot_angle: 30f32.to_radians(),
            cast_shadows: false,
            shadow_resolution: ShadowResolution::default(),
            near_plane: Self::DEFAULT_NEAR,
            far_plane: Self::DEFAULT_FAR,
            bias: Self::DEFAULT_BIAS,
            shadow_extent: Self::DEFAULT_SHADOW_EXTENT,
        }
    }

    pub fn directional() -> Self {
        Self::new(LightKind::Directional)
    }

    pub fn point(range: f32) -> Self {
        Self {
            range,
            ..Self::new(LightKind::Point)
        }
    }

    pub fn spot(range: f32, spot_angle: f32) -> Self {
        Self {
            range,
            spot_angle,
            ..Self::new(LightKind::Spot)
        }
    }

    pub fn with_shadows(mut self, resolution: ShadowResolution) -> Self {
        self.cast_shadows = true;
        self.shadow_resolution = resolution;
        self
    }

    pub fn with_color(mut self, color: Vec3, intensity: f32) -> Self {
        self.color = color;
        self.intensity = intensity;
        self
    }

    pub fn with_planes(mut self, near: f32, far: f32) -> Self {
        self.near_plane = near;
        self.far_plane = far;
        self
    }

    pub fn with_bias(mut self, bias: f32) -> Self {
        self.bias = bias;
        self
    }
}
