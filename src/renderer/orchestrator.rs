//! Fixed per-frame pass sequence.
//!
//! Shadow, opaque, pre-lighting AO, lighting, water, transparent, post-process,
//! overlay and present always run in that order. A pass whose input is absent or
//! no longer a live texture is skipped and reports an absent output, so every
//! later pass depending on it is skipped too.

use crate::error::RenderError;
use crate::renderer::device::{RenderDevice, TextureId};
use crate::renderer::passes::{
    DeferredStrategy, ForwardStrategy, FrameContext, GBuffer, GeometryPassOutput, LightingPassOutput,
    OpaqueStrategy, OverlayStage, PassthroughOverlay, PassthroughTransparent, PassthroughWater,
    PostProcessPassOutput, PreLightingPassOutput, RayCastShadowStage, ShadowStage, ShadowmapPassOutput,
    TransparentPassOutput, TransparentStage, WaterPassOutput, WaterStage,
};
use crate::renderer::postprocess::PostProcessCompositor;
use crate::renderer::shadows::ShadowCasterSelector;
use crate::scene::{LightKind, Scene};
use crate::settings::{RenderPath, RenderSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    Shadow,
    Opaque,
    PreLighting,
    Lighting,
    Water,
    Transparent,
    PostProcess,
    Overlay,
    Present,
}

impl PassKind {
    pub const ALL: [PassKind; 9] = [
        PassKind::Shadow,
        PassKind::Opaque,
        PassKind::PreLighting,
        PassKind::Lighting,
        PassKind::Water,
        PassKind::Transparent,
        PassKind::PostProcess,
        PassKind::Overlay,
        PassKind::Present,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PassKind::Shadow => "Shadow",
            PassKind::Opaque => "Opaque",
            PassKind::PreLighting => "PreLighting",
            PassKind::Lighting => "Lighting",
            PassKind::Water => "Water",
            PassKind::Transparent => "Transparent",
            PassKind::PostProcess => "PostProcess",
            PassKind::Overlay => "Overlay",
            PassKind::Present => "Present",
        }
    }
}

/// Which passes ran during one frame, in execution order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub executed: Vec<PassKind>,
    pub skipped: Vec<PassKind>,
}

impl FrameReport {
    fn new(frame_index: u64) -> Self {
        Self {
            frame_index,
            ..Self::default()
        }
    }

    fn record(&mut self, pass: PassKind, ran: bool) {
        if ran {
            self.executed.push(pass);
        } else {
            self.skipped.push(pass);
        }
    }

    pub fn ran(&self, pass: PassKind) -> bool {
        self.executed.contains(&pass)
    }
}

pub struct FrameOrchestrator<D: RenderDevice> {
    device: D,
    scene: Scene,
    settings: RenderSettings,
    window: wgpu::Extent3d,
    casters: ShadowCasterSelector,
    shadow_stage: Box<dyn ShadowStage>,
    strategy: Box<dyn OpaqueStrategy>,
    water: Box<dyn WaterStage>,
    transparent: Box<dyn TransparentStage>,
    overlay: Box<dyn OverlayStage>,
    compositor: PostProcessCompositor,
    frame_index: u64,
    final_texture: Option<TextureId>,
    last_frame: Option<FrameReport>,
}

impl<D: RenderDevice> FrameOrchestrator<D> {
    /// Picks the opaque strategy from `settings.render_path`. Fails only if the
    /// compositor cannot create its fallback textures.
    pub fn new(mut device: D, scene: Scene, settings: RenderSettings) -> Result<Self, RenderError> {
        let settings = settings.validate();
        let window = settings.window_extent();
        let strategy: Box<dyn OpaqueStrategy> = match settings.render_path {
            RenderPath::Deferred => Box::new(DeferredStrategy::new()),
            RenderPath::Forward => Box::new(ForwardStrategy::new(settings.sample_count)),
        };
        let compositor = PostProcessCompositor::new(&mut device, window, &settings.post_process)?;

        log::info!(
            "Frame orchestrator using {} path at {}x{}",
            strategy.name(),
            window.width,
            window.height
        );

        Ok(Self {
            device,
            scene,
            settings,
            window,
            casters: ShadowCasterSelector::new(),
            shadow_stage: Box::new(RayCastShadowStage),
            strategy,
            water: Box::new(PassthroughWater),
            transparent: Box::new(PassthroughTransparent),
            overlay: Box::new(PassthroughOverlay),
            compositor,
            frame_index: 0,
            final_texture: None,
            last_frame: None,
        })
    }

    pub fn with_shadow_stage(mut self, stage: impl ShadowStage + 'static) -> Self {
        self.shadow_stage = Box::new(stage);
        self
    }

    /// Replaces the opaque strategy, releasing the previous one's targets.
    pub fn with_strategy(mut self, strategy: impl OpaqueStrategy + 'static) -> Self {
        self.strategy.release(&mut self.device);
        log::info!("Opaque strategy replaced by {}", strategy.name());
        self.strategy = Box::new(strategy);
        self
    }

    pub fn with_water_stage(mut self, stage: impl WaterStage + 'static) -> Self {
        self.water.release(&mut self.device);
        self.water = Box::new(stage);
        self
    }

    pub fn with_transparent_stage(mut self, stage: impl TransparentStage + 'static) -> Self {
        self.transparent.release(&mut self.device);
        self.transparent = Box::new(stage);
        self
    }

    pub fn with_overlay_stage(mut self, stage: impl OverlayStage + 'static) -> Self {
        self.overlay.release(&mut self.device);
        self.overlay = Box::new(stage);
        self
    }

    /// Initial shadow-caster scan. `render_frame` calls this if needed.
    pub fn start(&mut self) {
        self.casters.start(&mut self.device, &self.scene);
    }

    pub fn render_frame(&mut self) -> &FrameReport {
        if self.casters.is_started() {
            self.casters.update(&mut self.device, &self.scene);
        } else {
            self.start();
        }

        let frame_index = self.frame_index;
        let mut report = FrameReport::new(frame_index);
        log::debug!("Frame {} begins", frame_index);

        let mut ctx = FrameContext {
            device: &mut self.device,
            scene: &self.scene,
            settings: &self.settings,
            window: self.window,
            frame_index,
        };

        let shadows = self.shadow_stage.render(&mut ctx, &self.casters);
        let shadows = validated_shadows(&ctx, &self.casters, shadows);
        report.record(PassKind::Shadow, true);

        let geometry = self.strategy.render_opaque(&mut ctx, &shadows, &self.casters);
        let geometry = validated_geometry(&ctx, geometry);
        report.record(PassKind::Opaque, true);

        let ao = if geometry.gbuffer.is_none() && geometry.color.is_none() {
            log::warn!("Skipping pre-lighting: opaque pass produced nothing");
            report.record(PassKind::PreLighting, false);
            PreLightingPassOutput::default()
        } else {
            report.record(PassKind::PreLighting, true);
            let aspect = ctx.aspect();
            self.compositor.render_ambient_occlusion(
                ctx.device,
                geometry.gbuffer.as_ref(),
                self.scene.camera(),
                aspect,
                &self.settings.post_process,
            )
        };

        let lit = match ctx.valid(ao.ao, "AO") {
            Some(_) if geometry.gbuffer.is_some() || geometry.color.is_some() => {
                report.record(PassKind::Lighting, true);
                self.strategy.render_lighting(&mut ctx, &geometry, &ao, &shadows, &self.casters)
            }
            _ => {
                log::warn!("Skipping lighting: missing geometry or AO");
                report.record(PassKind::Lighting, false);
                LightingPassOutput::default()
            }
        };

        let water = match ctx.valid(lit.framebuffer, "Lit framebuffer") {
            Some(_) => {
                report.record(PassKind::Water, true);
                self.water.render(&mut ctx, &lit, &geometry)
            }
            None => {
                log::warn!("Skipping water: no lit framebuffer");
                report.record(PassKind::Water, false);
                WaterPassOutput::default()
            }
        };

        let transparent = match ctx.valid(water.framebuffer, "Water framebuffer") {
            Some(_) => {
                report.record(PassKind::Transparent, true);
                self.transparent.render(&mut ctx, &water)
            }
            None => {
                log::warn!("Skipping transparent: no water framebuffer");
                report.record(PassKind::Transparent, false);
                TransparentPassOutput::default()
            }
        };

        let post = match ctx.valid(transparent.framebuffer, "Transparent framebuffer") {
            Some(input) => {
                report.record(PassKind::PostProcess, true);
                let aspect = ctx.aspect();
                self.compositor.render(
                    ctx.device,
                    Some(input),
                    self.scene.camera(),
                    aspect,
                    &self.settings.post_process,
                    frame_index,
                )
            }
            None => {
                log::warn!("Skipping post-process: no transparent framebuffer");
                report.record(PassKind::PostProcess, false);
                PostProcessPassOutput::default()
            }
        };

        let overlay = match ctx.valid(post.framebuffer, "Post-process framebuffer") {
            Some(_) => {
                report.record(PassKind::Overlay, true);
                self.overlay.render(&mut ctx, &post)
            }
            None => {
                log::warn!("Skipping overlay: no post-process framebuffer");
                report.record(PassKind::Overlay, false);
                Default::default()
            }
        };

        let final_texture = ctx.valid(overlay.framebuffer, "Overlay framebuffer");
        let presented = match final_texture {
            Some(texture) if self.settings.render_to_swapchain => match ctx.device.present(texture) {
                Ok(()) => true,
                Err(err) => {
                    log::warn!("Present failed: {}", err);
                    false
                }
            },
            Some(_) => {
                log::debug!("Swapchain output disabled; keeping final texture");
                false
            }
            None => {
                log::warn!("Skipping present: no final framebuffer");
                false
            }
        };
        report.record(PassKind::Present, presented);

        self.final_texture = final_texture;
        self.frame_index += 1;
        log::debug!(
            "Frame {} done: {} passes ran, {} skipped",
            frame_index,
            report.executed.len(),
            report.skipped.len()
        );
        self.last_frame.insert(report)
    }

    /// Reallocates every window-scaled target of every stage.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.settings.resolution.width = width.max(1);
        self.settings.resolution.height = height.max(1);
        self.window = self.settings.window_extent();
        log::info!("Resizing frame targets to {}x{}", self.window.width, self.window.height);

        self.strategy.resize(&mut self.device, self.window);
        self.water.resize(&mut self.device, self.window);
        self.transparent.resize(&mut self.device, self.window);
        self.overlay.resize(&mut self.device, self.window);
        self.compositor.resize(&mut self.device, self.window);
        self.final_texture = None;
    }

    pub fn set_render_to_swapchain(&mut self, enabled: bool) {
        self.settings.render_to_swapchain = enabled;
    }

    pub fn render_to_swapchain(&self) -> bool {
        self.settings.render_to_swapchain
    }

    /// Final color texture of the last frame, presented or not.
    pub fn final_texture(&self) -> Option<TextureId> {
        self.final_texture
    }

    pub fn last_frame(&self) -> Option<&FrameReport> {
        self.last_frame.as_ref()
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn window(&self) -> wgpu::Extent3d {
        self.window
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut RenderSettings {
        &mut self.settings
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn casters(&self) -> &ShadowCasterSelector {
        &self.casters
    }

    pub fn compositor(&self) -> &PostProcessCompositor {
        &self.compositor
    }

    pub fn compositor_mut(&mut self) -> &mut PostProcessCompositor {
        &mut self.compositor
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Destroys every resource the pipeline owns and hands the device back.
    pub fn shutdown(mut self) -> D {
        self.casters.release(&mut self.device);
        self.strategy.release(&mut self.device);
        self.water.release(&mut self.device);
        self.transparent.release(&mut self.device);
        self.overlay.release(&mut self.device);
        self.compositor.release(&mut self.device);
        log::info!("Frame orchestrator shut down after {} frames", self.frame_index);
        self.device
    }
}

/// Drops shadow maps that are not live textures. Lighting falls back to unshadowed.
fn validated_shadows(
    ctx: &FrameContext<'_>,
    casters: &ShadowCasterSelector,
    mut shadows: ShadowmapPassOutput,
) -> ShadowmapPassOutput {
    for kind in LightKind::ALL {
        let map = shadows.get(kind);
        if map.is_none() && casters.has_caster(kind) {
            log::warn!("{} caster selected but no shadow map rendered", kind.label());
        }
        shadows.set(kind, ctx.valid(map, "Shadow map"));
    }
    shadows
}

fn validated_geometry(ctx: &FrameContext<'_>, geometry: GeometryPassOutput) -> GeometryPassOutput {
    let gbuffer = geometry.gbuffer.filter(|gbuffer: &GBuffer| {
        let live = gbuffer.textures().iter().all(|texture| ctx.device.is_valid(*texture));
        if !live {
            log::warn!("G-buffer holds textures that are no longer live; dropping it");
        }
        live
    });
    GeometryPassOutput {
        gbuffer,
        color: ctx.valid(geometry.color, "Opaque color"),
    }
}
