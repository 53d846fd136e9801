//! Deferred mode
//!
//! 1. Geometry pass: skybox, then every entity, into the four G-buffer slots
//! 2. Lighting pass: fullscreen quad on the default target sampling the
//!    position, normal and albedo attachments
//! 3. Depth blit from the G-buffer so gizmos depth-test against the scene
//! 4. Light gizmos

use crate::backend::{BlitMask, DepthState, FilterMode, GraphicsBackend, RenderTarget};
use crate::error::RendererResult;
use crate::resources::Assets;
use crate::scene::Scene;

use super::gbuffer::LIGHTING_UNITS;
use super::uniforms::{push_entity_locals, push_geometry_globals, push_lighting_globals};
use super::{draw_mesh, draw_model, Frame, PipelineResources, RenderSettings};

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
    let geometry = assets.programs.get(resources.builtins.geometry);

    resources.gbuffer.bind_for_geometry_pass(frame);
    frame.backend().clear(gbuffer_clear_color(settings.clear_color));
    let globals = push_geometry_globals(
        frame.allocator(),
        camera.position,
        lights.len() as u32,
        settings.show_relief,
        geometry.block_size(0),
    )?;

    // Relief inputs: diffuse, normal, height
    for (unit, texture) in resources.textures.relief.iter().enumerate() {
        frame.backend().bind_texture(unit as u32, *texture);
    }

    if settings.show_skybox {
        resources.skybox.draw(
            frame,
            assets.programs.get(resources.builtins.reflective_cube),
            assets.programs.get(resources.builtins.skybox),
            camera,
        )?;
    }

    frame.backend().use_program(geometry.handle);
    frame.backend().set_depth_state(DepthState::LESS);
    for entity in scene.entities.iter_mut() {
        let locals = push_entity_locals(
            frame.allocator(),
            &entity.transform,
            &view_projection,
            geometry.block_size(1),
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
            geometry,
            &assets.textures,
            resources.textures.relief[0],
        )?;
    }

    // Lighting
    frame.set_target(RenderTarget::Default);
    frame.backend().set_draw_buffers(1);
    frame.backend().clear(settings.clear_color);
    frame.backend().set_depth_state(DepthState::DISABLED);

    let lighting = assets.programs.get(resources.builtins.lighting);
    frame.backend().use_program(lighting.handle);
    resources
        .gbuffer
        .bind_attachments_as_textures(frame.backend(), &LIGHTING_UNITS);
    let globals = push_lighting_globals(
        frame.allocator(),
        camera.position,
        lights,
        lighting.block_size(0),
    )?;
    frame.bind_block(0, globals);
    draw_mesh(frame, &mut resources.quad, lighting)?;

    frame.backend().blit(
        resources.gbuffer.target(),
        RenderTarget::Default,
        BlitMask::Depth,
        FilterMode::Nearest,
    );

    if settings.show_gizmos {
        frame.backend().set_depth_state(DepthState::LESS);
        resources.gizmos.draw(
            frame,
            assets.programs.get(resources.builtins.gizmo),
            &scene.lights,
            &view_projection,
        )?;
    }
    Ok(())
}

/// The G-buffer is cleared with alpha 0 so pixels no draw reaches carry a
/// zero normal w and pass through the lighting shader unlit.
fn gbuffer_clear_color(clear_color: [f32; 4]) -> [f32; 4] {
    [clear_color[0], clear_color[1], clear_color[2], 0.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gbuffer_clear_keeps_background_unlit() {
        assert_eq!(gbuffer_clear_color([0.2, 0.3, 0.4, 1.0]), [0.2, 0.3, 0.4, 0.0]);
    }
}
