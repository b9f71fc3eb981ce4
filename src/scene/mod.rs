pub mod camera;
pub mod components;
pub mod scene;
pub mod transform;

// Re-export commonly used types
pub use camera::Camera;
pub use scene::{LightInstance, Scene};
pub use transform::Transform;

// Re-export all components
pub use components::{
    LightComponent, LightKind, MeshComponent, Name, Primitive, ShadowResolution,
    TransformComponent,
};
