use bitflags::bitflags;

use crate::error::RenderError;
use crate::renderer::device::{RenderDevice, TextureDesc, TextureId};

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Attachments: u8 {
        const COLOR = 0b01;
        const DEPTH = 0b10;
    }
}

/// Scales used for window-relative targets.
pub const FULL: f32 = 1.0;
pub const HALF: f32 = 1.0 / 2.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TargetSize {
    Absolute { width: u32, height: u32 },
    /// `floor(window * scale)`, never smaller than one texel.
    WindowScaled(f32),
}

impl TargetSize {
    pub fn resolve(self, window: wgpu::Extent3d) -> (u32, u32) {
        match self {
            TargetSize::Absolute { width, height } => (width, height),
            TargetSize::WindowScaled(scale) => (
                ((window.width as f32 * scale).floor() as u32).max(1),
                ((window.height as f32 * scale).floor() as u32).max(1),
            ),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RenderTargetDesc {
    pub label: String,
    pub size: TargetSize,
    pub attachments: Attachments,
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
    pub sample_count: u32,
    pub layers: u32,
}

impl RenderTargetDesc {
    pub fn color(label: impl Into<String>, size: TargetSize, format: wgpu::TextureFormat) -> Self {
        Self {
            label: label.into(),
            size,
            attachments: Attachments::COLOR,
            color_format: format,
            depth_format: wgpu::TextureFormat::Depth32Float,
            sample_count: 1,
            layers: 1,
        }
    }

    pub fn depth(label: impl Into<String>, size: TargetSize) -> Self {
        Self {
            label: label.into(),
            size,
            attachments: Attachments::DEPTH,
            color_format: wgpu::TextureFormat::Rgba16Float,
            depth_format: wgpu::TextureFormat::Depth32Float,
            sample_count: 1,
            layers: 1,
        }
    }

    pub fn with_depth(mut self) -> Self {
        self.attachments |= Attachments::DEPTH;
        self
    }

    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count.max(1);
        self
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers.max(1);
        self
    }
}

/// A set of attachments owned by exactly one pass. Only the texture handles it
/// hands out ever cross a pass boundary.
#[derive(Debug)]
pub struct RenderTarget {
    desc: RenderTargetDesc,
    color: Option<TextureId>,
    depth: Option<TextureId>,
    extent: wgpu::Extent3d,
}

impl RenderTarget {
    pub fn new(
        device: &mut dyn RenderDevice,
        desc: RenderTargetDesc,
        window: wgpu::Extent3d,
    ) -> Result<Self, RenderError> {
        let (width, height) = desc.size.resolve(window);
        let mut target = Self {
            desc,
            color: None,
            depth: None,
            extent: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        };
        target.allocate(device, width, height)?;
        Ok(target)
    }

    fn allocate(
        &mut self,
        device: &mut dyn RenderDevice,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        let color = if self.desc.attachments.contains(Attachments::COLOR) {
            let label = format!("{}Color", self.desc.label);
            let desc = TextureDesc::new(&label, width, height, self.desc.color_format)
                .with_layers(self.desc.layers)
                .with_sample_count(self.desc.sample_count);
            Some(device.create_texture(&desc)?)
        } else {
            None
        };

        let depth = if self.desc.attachments.contains(Attachments::DEPTH) {
            let label = format!("{}Depth", self.desc.label);
            let desc = TextureDesc::new(&label, width, height, self.desc.depth_format)
                .with_layers(self.desc.layers)
                .with_sample_count(self.desc.sample_count);
            match device.create_texture(&desc) {
                Ok(id) => Some(id),
                Err(err) => {
                    if let Some(color) = color {
                        device.destroy_texture(color);
                    }
                    return Err(err);
                }
            }
        } else {
            None
        };

        self.color = color;
        self.depth = depth;
        self.extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: self.desc.layers,
        };
        log::debug!(
            "Allocated render target {} ({}x{}, {} layer(s), {}x MSAA)",
            self.desc.label,
            width,
            height,
            self.desc.layers,
            self.desc.sample_count
        );
        Ok(())
    }

    fn release_attachments(&mut self, device: &mut dyn RenderDevice) {
        if let Some(color) = self.color.take() {
            device.destroy_texture(color);
        }
        if let Some(depth) = self.depth.take() {
            device.destroy_texture(depth);
        }
    }

    pub fn label(&self) -> &str {
        &self.desc.label
    }

    /// The attachment draws write into: color when present, depth otherwise.
    pub fn bind(&self) -> Option<TextureId> {
        let attachment = self.color.or(self.depth);
        if attachment.is_none() {
            log::warn!("Render target {} has no attachment to bind", self.desc.label);
        }
        attachment
    }

    pub fn color_texture(&self) -> Option<TextureId> {
        self.color
    }

    pub fn depth_texture(&self) -> Option<TextureId> {
        self.depth
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        self.extent
    }

    pub fn size(&self) -> (u32, u32) {
        (self.extent.width, self.extent.height)
    }

    pub fn is_multisampled(&self) -> bool {
        self.desc.sample_count > 1
    }

    /// Follows a window resize. Absolute targets never change; scaled targets
    /// reallocate only when the resolved size differs. Returns whether the
    /// attachments were recreated.
    pub fn resize(
        &mut self,
        device: &mut dyn RenderDevice,
        window: wgpu::Extent3d,
    ) -> Result<bool, RenderError> {
        let (width, height) = self.desc.size.resolve(window);
        if (width, height) == self.size() {
            return Ok(false);
        }
        self.release_attachments(device);
        self.allocate(device, width, height)?;
        Ok(true)
    }

    /// Recreates the attachments at a new absolute size.
    pub fn reallocate(
        &mut self,
        device: &mut dyn RenderDevice,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        self.desc.size = TargetSize::Absolute { width, height };
        self.release_attachments(device);
        self.allocate(device, width, height)
    }

    pub fn destroy(mut self, device: &mut dyn RenderDevice) {
        self.release_attachments(device);
    }
}

/// Allocates a target, logging and returning `None` on failure so callers can
/// degrade instead of aborting the frame.
pub fn allocate_or_log(
    device: &mut dyn RenderDevice,
    desc: RenderTargetDesc,
    window: wgpu::Extent3d,
) -> Option<RenderTarget> {
    let label = desc.label.clone();
    match RenderTarget::new(device, desc, window) {
        Ok(target) => Some(target),
        Err(err) => {
            log::error!("Failed to allocate render target {}: {}", label, err);
            None
        }
    }
}

/// Follows a window resize; a target that fails to reallocate is dropped.
pub fn resize_or_log(
    target: &mut Option<RenderTarget>,
    device: &mut dyn RenderDevice,
    window: wgpu::Extent3d,
) {
    let Some(current) = target.as_mut() else {
        return;
    };
    if let Err(err) = current.resize(device, window) {
        log::error!("Failed to resize render target {}: {}", current.label(), err);
        *target = None;
    }
}

/// Destroys the target, if any.
pub fn release(target: &mut Option<RenderTarget>, device: &mut dyn RenderDevice) {
    if let Some(target) = target.take() {
        target.destroy(device);
    }
}
