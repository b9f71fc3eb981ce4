use crate::renderer::device::TextureId;

#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    InvalidTexture(TextureId),
    ZeroSizedTexture {
        label: String,
    },
    TextureTooLarge {
        label: String,
        width: u32,
        height: u32,
        max: u32,
    },
    FeedbackLoop {
        label: String,
        texture: TextureId,
    },
    InputCountMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },
    MultisampledInput {
        label: String,
        texture: TextureId,
    },
    FormatMismatch {
        label: String,
        expected: wgpu::TextureFormat,
        actual: wgpu::TextureFormat,
    },
    SizeMismatch {
        label: String,
        expected: wgpu::Extent3d,
        actual: wgpu::Extent3d,
    },
    UploadSizeMismatch {
        expected: usize,
        actual: usize,
    },
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::InvalidTexture(id) => write!(f, "Invalid texture handle {:?}", id),
            RenderError::ZeroSizedTexture { label } => {
                write!(f, "Texture '{}' has a zero-sized extent", label)
            }
            RenderError::TextureTooLarge {
                label,
                width,
                height,
                max,
            } => write!(
                f,
                "Texture '{}' ({}x{}) exceeds the maximum dimension {}",
                label, width, height, max
            ),
            RenderError::FeedbackLoop { label, texture } => write!(
                f,
                "Draw '{}' reads and writes texture {:?} in the same call",
                label, texture
            ),
            RenderError::InputCountMismatch {
                label,
                expected,
                actual,
            } => write!(
                f,
                "Draw '{}' expects {} inputs but {} were bound",
                label, expected, actual
            ),
            RenderError::MultisampledInput { label, texture } => write!(
                f,
                "Draw '{}' cannot sample multisampled texture {:?}; resolve it first",
                label, texture
            ),
            RenderError::FormatMismatch {
                label,
                expected,
                actual,
            } => write!(
                f,
                "'{}' expected format {:?} but found {:?}",
                label, expected, actual
            ),
            RenderError::SizeMismatch {
                label,
                expected,
                actual,
            } => write!(
                f,
                "'{}' expected size {}x{} but found {}x{}",
                label, expected.width, expected.height, actual.width, actual.height
            ),
            RenderError::UploadSizeMismatch { expected, actual } => write!(
                f,
                "Texture upload expected {} bytes but received {}",
                expected, actual
            ),
        }
    }
}

impl std::error::Error for RenderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_offending_draw() {
        let err = RenderError::InputCountMismatch {
            label: "Tonemap".to_string(),
            expected: 1,
            actual: 2,
        };
        let text = err.to_string();
        assert!(text.contains("Tonemap"));
        assert!(text.contains("expects 1 inputs"));
    }
}
