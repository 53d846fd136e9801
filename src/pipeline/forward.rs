//! Forward mode: one lit pass into the G-buffer color slot, then a color
//! blit to the default target

use crate::backend::{BlitMask, DepthState, FilterMode, GraphicsBackend, RenderTarget};
use crate::error::RendererResult;
use crate::resources::Assets;
use crate::scene::Scene;

use super::uniforms::{push_entity_locals, push_forward_globals};
use super::{draw_model, Frame, PipelineResources, RenderSettings};

pub(super) fn render<B: GraphicsBackend>(
    frame: &mut Frame<'_, B>,
    resources: &mut PipelineResources,
    settings: &RenderSettings,
    scene: &mut Scene,
    assets: &mut Assets,
) -> RendererResult<()> {
    let lights = resources.packed_lights(&scene.lights);
    let camera = &scene.camera;
    let view_projection = camera.view_projection_matrix();
    let forward = assets.programs.get(resources.builtins.forward);

    resources.gbuffer.bind_for_forward_pass(frame);
    frame.backend().clear(settings.clear_color);
    frame.backend().set_depth_state(DepthState::LESS);
    frame.backend().use_program(forward.handle);

    let globals = push_forward_globals(
        frame.allocator(),
        camera.position,
        lights,
        forward.block_size(0),
    )?;

    for entity in scene.entities.iter_mut() {
        let locals = push_entity_locals(
            frame.allocator(),
            &entity.forward_transform(),
            &view_projection,
            forward.block_size(1),
        )?;
        entity.local_block = Some(locals);
        frame.bind_block(0, globals);
        frame.bind_block(1, locals);

        let Some(model) = assets.models.get_mut(entity.model.0) else {
            log::warn!("Entity references missing model {:?}", entity.model);
            continue;
        };
        draw_model(
            frame,
            model,
            forward,
            &assets.textures,
            resources.textures.relief[0],
        )?;
    }

    frame.backend().blit(
        resources.gbuffer.target(),
        RenderTarget::Default,
        BlitMask::Color,
        FilterMode::Linear,
    );
    Ok(())
}
