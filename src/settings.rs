use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::renderer::device::Program;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default)]
    pub resolution: Resolution,
    /// Multisample count of the forward path's HDR target.
    #[serde(default = "RenderSettings::default_sample_count")]
    pub sample_count: u32,
    #[serde(default)]
    pub render_path: RenderPath,
    #[serde(default = "RenderSettings::default_render_to_swapchain")]
    pub render_to_swapchain: bool,
    #[serde(default = "RenderSettings::default_ambient")]
    pub ambient: [f32; 3],
    #[serde(default = "RenderSettings::default_clear_color")]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub post_process: PostProcessSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            sample_count: Self::default_sample_count(),
            render_path: RenderPath::default(),
            render_to_swapchain: Self::default_render_to_swapchain(),
            ambient: Self::default_ambient(),
            clear_color: Self::default_clear_color(),
            post_process: PostProcessSettings::default(),
        }
    }
}

impl RenderSettings {
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RenderSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded render settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default render settings.",
                        path, err
                    );
                    RenderSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    pub fn save_to_path<P: AsRef<std::path::Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path.as_ref(), json)?;
        info!("Saved render settings to {:?}", path.as_ref());
        Ok(())
    }

    pub fn validate(mut self) -> Self {
        if !matches!(self.sample_count, 1 | 2 | 4 | 8) {
            warn!(
                "Sample count {} is not one of 1, 2, 4 or 8. Using {} instead.",
                self.sample_count,
                Self::default_sample_count()
            );
            self.sample_count = Self::default_sample_count();
        }

        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        self.post_process = self.post_process.validate();
        self
    }

    pub fn window_extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.resolution.width.max(1),
            height: self.resolution.height.max(1),
            depth_or_array_layers: 1,
        }
    }

    const fn default_sample_count() -> u32 {
        4
    }

    const fn default_render_to_swapchain() -> bool {
        true
    }

    const fn default_ambient() -> [f32; 3] {
        [0.03, 0.03, 0.035]
    }

    const fn default_clear_color() -> [f32; 4] {
        [0.02, 0.02, 0.03, 1.0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPath {
    #[default]
    Deferred,
    Forward,
}

/// Optional screen-space effects applied after tonemapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdrEffect {
    ChromaticAberration,
    FilmGrain,
    Vignette,
    Fxaa,
}

impl SdrEffect {
    pub const ALL: [SdrEffect; 4] = [
        SdrEffect::ChromaticAberration,
        SdrEffect::FilmGrain,
        SdrEffect::Vignette,
        SdrEffect::Fxaa,
    ];

    pub fn program(self) -> Program {
        match self {
            SdrEffect::ChromaticAberration => Program::ChromaticAberration,
            SdrEffect::FilmGrain => Program::FilmGrain,
            SdrEffect::Vignette => Program::Vignette,
            SdrEffect::Fxaa => Program::Fxaa,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SdrEffect::ChromaticAberration => "ChromaticAberration",
            SdrEffect::FilmGrain => "FilmGrain",
            SdrEffect::Vignette => "Vignette",
            SdrEffect::Fxaa => "Fxaa",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessSettings {
    pub gamma: f32,
    pub exposure: f32,
    pub ssao_enabled: bool,
    pub ssao_radius: f32,
    pub ssao_strength: f32,
    pub ssao_bias: f32,
    pub bloom_enabled: bool,
    pub bloom_threshold: f32,
    /// Knee width as a fraction of the threshold.
    pub bloom_soft_threshold: f32,
    pub bloom_strength: f32,
    pub dirt_mask_intensity: f32,
    pub chromatic_aberration_enabled: bool,
    pub chromatic_aberration_strength: f32,
    pub film_grain_enabled: bool,
    pub film_grain_strength: f32,
    pub vignette_enabled: bool,
    pub vignette_intensity: f32,
    pub vignette_smoothness: f32,
    pub fxaa_enabled: bool,
    pub effect_order: Vec<SdrEffect>,
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            gamma: 2.2,
            exposure: 1.0,
            ssao_enabled: true,
            ssao_radius: 0.5,
            ssao_strength: 1.0,
            ssao_bias: 0.025,
            bloom_enabled: true,
            bloom_threshold: 1.0,
            bloom_soft_threshold: 0.5,
            bloom_strength: 0.04,
            dirt_mask_intensity: 0.0,
            chromatic_aberration_enabled: false,
            chromatic_aberration_strength: 0.004,
            film_grain_enabled: false,
            film_grain_strength: 0.05,
            vignette_enabled: false,
            vignette_intensity: 0.4,
            vignette_smoothness: 0.5,
            fxaa_enabled: true,
            effect_order: SdrEffect::ALL.to_vec(),
        }
    }
}

impl PostProcessSettings {
    /// Every optional stage off: the compositor only resolves and tonemaps.
    pub fn tonemap_only() -> Self {
        let mut settings = Self::default();
        settings.ssao_enabled = false;
        settings.bloom_enabled = false;
        for effect in SdrEffect::ALL {
            settings.set_effect_enabled(effect, false);
        }
        settings
    }

    pub fn bloom_knee(&self) -> f32 {
        self.bloom_threshold * self.bloom_soft_threshold
    }

    pub fn is_effect_enabled(&self, effect: SdrEffect) -> bool {
        match effect {
            SdrEffect::ChromaticAberration => self.chromatic_aberration_enabled,
            SdrEffect::FilmGrain => self.film_grain_enabled,
            SdrEffect::Vignette => self.vignette_enabled,
            SdrEffect::Fxaa => self.fxaa_enabled,
        }
    }

    pub fn set_effect_enabled(&mut self, effect: SdrEffect, enabled: bool) {
        match effect {
            SdrEffect::ChromaticAberration => self.chromatic_aberration_enabled = enabled,
            SdrEffect::FilmGrain => self.film_grain_enabled = enabled,
            SdrEffect::Vignette => self.vignette_enabled = enabled,
            SdrEffect::Fxaa => self.fxaa_enabled = enabled,
        }
    }

    /// Enabled effects in execution order.
    pub fn enabled_effects(&self) -> Vec<SdrEffect> {
        self.effect_order
            .iter()
            .copied()
            .filter(|effect| self.is_effect_enabled(*effect))
            .collect()
    }

    pub fn validate(mut self) -> Self {
        let defaults = Self::default();

        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            warn!("Gamma must be positive. Using {} instead.", defaults.gamma);
            self.gamma = defaults.gamma;
        }
        if !(self.exposure.is_finite() && self.exposure > 0.0) {
            warn!("Exposure must be positive. Using {} instead.", defaults.exposure);
            self.exposure = defaults.exposure;
        }
        if !(self.bloom_threshold.is_finite() && self.bloom_threshold >= 0.0) {
            warn!("Bloom threshold must not be negative. Using default value.");
            self.bloom_threshold = defaults.bloom_threshold;
        }
        if !(0.0..=1.0).contains(&self.bloom_soft_threshold) {
            warn!("Bloom soft threshold must lie in [0, 1]. Using default value.");
            self.bloom_soft_threshold = defaults.bloom_soft_threshold;
        }
        if !(self.bloom_strength.is_finite() && self.bloom_strength >= 0.0) {
            warn!("Bloom strength must not be negative. Using default value.");
            self.bloom_strength = defaults.bloom_strength;
        }
        if !(self.ssao_radius.is_finite() && self.ssao_radius > 0.0) {
            warn!("SSAO radius must be positive. Using default value.");
            self.ssao_radius = defaults.ssao_radius;
        }
        if !(self.ssao_strength.is_finite() && self.ssao_strength >= 0.0) {
            warn!("SSAO strength must not be negative. Using default value.");
            self.ssao_strength = defaults.ssao_strength;
        }
        self.ssao_bias = non_negative("SSAO bias", self.ssao_bias, defaults.ssao_bias);
        self.dirt_mask_intensity = non_negative(
            "Dirt mask intensity",
            self.dirt_mask_intensity,
            defaults.dirt_mask_intensity,
        );
        self.chromatic_aberration_strength = non_negative(
            "Chromatic aberration strength",
            self.chromatic_aberration_strength,
            defaults.chromatic_aberration_strength,
        );
        self.film_grain_strength = non_negative(
            "Film grain strength",
            self.film_grain_strength,
            defaults.film_grain_strength,
        );
        self.vignette_intensity = non_negative(
            "Vignette intensity",
            self.vignette_intensity,
            defaults.vignette_intensity,
        );
        if !(0.0..=1.0).contains(&self.vignette_smoothness) {
            warn!("Vignette smoothness must lie in [0, 1]. Using default value.");
            self.vignette_smoothness = defaults.vignette_smoothness;
        }

        let mut order = Vec::with_capacity(SdrEffect::ALL.len());
        for effect in self.effect_order.iter().copied() {
            if order.contains(&effect) {
                warn!("Effect {} listed twice in effect_order; keeping the first.", effect.label());
            } else {
                order.push(effect);
            }
        }
        for effect in SdrEffect::ALL {
            if !order.contains(&effect) {
                warn!("Effect {} missing from effect_order; appending it.", effect.label());
                order.push(effect);
            }
        }
        self.effect_order = order;

        self
    }
}

fn non_negative(name: &str, value: f32, default: f32) -> f32 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        warn!("{} must be a non-negative number. Using {} instead.", name, default);
        default
    }
}
