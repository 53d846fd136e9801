//! Textured quad mode: one texture on a fullscreen quad

use crate::backend::{DepthState, GraphicsBackend, RenderTarget};
use crate::error::RendererResult;
use crate::resources::Assets;

use super::{draw_mesh, Frame, PipelineResources, RenderSettings};

pub(super) fn render<B: GraphicsBackend>(
    frame: &mut Frame<'_, B>,
    resources: &mut PipelineResources,
    settings: &RenderSettings,
    assets: &Assets,
) -> RendererResult<()> {
    let program = assets.programs.get(resources.builtins.textured_quad);

    frame.set_target(RenderTarget::Default);
    frame.backend().set_depth_state(DepthState::DISABLED);
    frame.backend().clear(settings.clear_color);

    frame.backend().use_program(program.handle);
    frame.backend().bind_texture(0, resources.textures.quad);
    draw_mesh(frame, &mut resources.quad, program)
}
