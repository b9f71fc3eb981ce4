//! Stages that hand their input through unchanged, for scenes with no water,
//! no transparent geometry and no editor overlay.

use super::{
    EditorPassOutput, FrameContext, GeometryPassOutput, LightingPassOutput, OverlayStage,
    PostProcessPassOutput, TransparentPassOutput, TransparentStage, WaterPassOutput, WaterStage,
};

#[derive(Debug, Default)]
pub struct PassthroughWater;

impl WaterStage for PassthroughWater {
    fn render(
        &mut self,
        _ctx: &mut FrameContext<'_>,
        lit: &LightingPassOutput,
        _geometry: &GeometryPassOutput,
    ) -> WaterPassOutput {
        WaterPassOutput {
            framebuffer: lit.framebuffer,
        }
    }
}

#[derive(Debug, Default)]
pub struct PassthroughTransparent;

impl TransparentStage for PassthroughTransparent {
    fn render(&mut self, _ctx: &mut FrameContext<'_>, water: &WaterPassOutput) -> TransparentPassOutput {
        TransparentPassOutput {
            framebuffer: water.framebuffer,
        }
    }
}

#[derive(Debug, Default)]
pub struct PassthroughOverlay;

impl OverlayStage for PassthroughOverlay {
    fn render(&mut self, _ctx: &mut FrameContext<'_>, post: &PostProcessPassOutput) -> EditorPassOutput {
        EditorPassOutput {
            framebuffer: post.framebuffer,
        }
    }
}
