//! Whole-frame tests against the recording dummy backend
//!
//! The asset directory does not exist, so every frame draws the procedural
//! plane with white textures and a gray sky.

use glam::Mat4;
use rstest::rstest;

use deferred_renderer::backend::dummy::{Command, DrawRecord};
use deferred_renderer::backend::{BlitMask, FilterMode, ProgramHandle, RenderTarget};
use deferred_renderer::pipeline::{Attachment, BuiltinPrograms};
use deferred_renderer::resources::{ProgramId, UniformBlock};
use deferred_renderer::scene::ForwardDecoration;
use deferred_renderer::{DummyBackend, Engine, RenderMode, RendererConfig, RendererError};

fn engine_with(config: RendererConfig) -> Engine<DummyBackend> {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = RendererConfig {
        asset_dir: "missing-assets".into(),
        ..config
    };
    Engine::new(DummyBackend::new(640, 480), config).unwrap()
}

fn engine() -> Engine<DummyBackend> {
    engine_with(RendererConfig::default())
}

fn program(engine: &Engine<DummyBackend>, pick: impl Fn(&BuiltinPrograms) -> ProgramId) -> ProgramHandle {
    engine
        .assets()
        .programs
        .get(pick(engine.renderer().builtins()))
        .handle
}

fn draws_with(engine: &Engine<DummyBackend>, handle: ProgramHandle) -> Vec<DrawRecord> {
    engine
        .backend()
        .last_frame_draws()
        .into_iter()
        .filter(|d| d.program == Some(handle))
        .cloned()
        .collect()
}

fn read_u32(engine: &Engine<DummyBackend>, offset: u64) -> u32 {
    let data = engine
        .backend()
        .buffer_data(engine.renderer().allocator().buffer())
        .unwrap();
    let at = offset as usize;
    u32::from_le_bytes(data[at..at + 4].try_into().unwrap())
}

fn read_mat4(engine: &Engine<DummyBackend>, offset: u64) -> Mat4 {
    let data = engine
        .backend()
        .buffer_data(engine.renderer().allocator().buffer())
        .unwrap();
    let at = offset as usize;
    let floats: Vec<f32> = data[at..at + 64]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes(b.try_into().unwrap()))
        .collect();
    Mat4::from_cols_slice(&floats)
}

fn position_of(commands: &[Command], pred: impl Fn(&Command) -> bool) -> usize {
    commands.iter().position(pred).unwrap()
}

#[rstest]
#[case::quad(RenderMode::TexturedQuad, 1)]
// skybox (2) + plane + lighting quad + 7 gizmos
#[case::deferred(RenderMode::Deferred, 11)]
#[case::forward(RenderMode::Forward, 1)]
fn test_draw_count_per_mode(#[case] mode: RenderMode, #[case] expected: usize) {
    let mut engine = engine();
    engine.set_mode(mode);
    engine.render().unwrap();
    assert_eq!(engine.backend().last_frame_draws().len(), expected);
}

#[rstest]
#[case::all(true, true, 11)]
#[case::no_gizmos(true, false, 4)]
#[case::no_skybox(false, true, 9)]
#[case::bare(false, false, 2)]
fn test_deferred_toggles(#[case] skybox: bool, #[case] gizmos: bool, #[case] expected: usize) {
    let mut engine = engine();
    engine.settings_mut().show_skybox = skybox;
    engine.settings_mut().show_gizmos = gizmos;
    engine.render().unwrap();
    assert_eq!(engine.backend().last_frame_draws().len(), expected);
}

#[test]
fn test_deferred_geometry_pass_writes_gbuffer() {
    let mut engine = engine();
    engine.render().unwrap();

    let geometry = draws_with(&engine, program(&engine, |b| b.geometry));
    assert_eq!(geometry.len(), 1);
    let draw = &geometry[0];
    assert_eq!(draw.target, engine.renderer().gbuffer().target());
    assert_eq!(draw.draw_buffers, 4);
    assert_eq!(draw.index_count, Some(6));

    // Global and local blocks at bindings 0 and 1, each block aligned
    assert_eq!(draw.uniform_ranges.len(), 2);
    assert_eq!(draw.uniform_ranges[0].binding, 0);
    assert_eq!(draw.uniform_ranges[1].binding, 1);
    assert_eq!(draw.uniform_ranges[1].size, 128);
    for range in &draw.uniform_ranges {
        assert_eq!(range.offset % 256, 0);
    }

    // Light count follows the camera position in the global block
    assert_eq!(read_u32(&engine, draw.uniform_ranges[0].offset + 12), 7);
}

#[test]
fn test_deferred_lighting_pass_samples_attachments() {
    let mut engine = engine();
    engine.render().unwrap();

    let lighting = draws_with(&engine, program(&engine, |b| b.lighting));
    assert_eq!(lighting.len(), 1);
    let draw = &lighting[0];
    assert_eq!(draw.target, RenderTarget::Default);
    assert_eq!(draw.index_count, Some(6));

    let gbuffer = engine.renderer().gbuffer();
    let mut textures = draw.textures.clone();
    textures.sort_by_key(|(unit, _)| *unit);
    assert_eq!(
        textures,
        vec![
            (0, gbuffer.texture(Attachment::Position)),
            (1, gbuffer.texture(Attachment::Normals)),
            (2, gbuffer.texture(Attachment::Albedo)),
        ]
    );

    let globals = draw.uniform_ranges[0];
    assert_eq!(globals.size, 1040);
    assert_eq!(read_u32(&engine, globals.offset + 12), 7);
    // First record is the directional light, the second a point light
    assert_eq!(read_u32(&engine, globals.offset + 16), 0);
    assert_eq!(read_u32(&engine, globals.offset + 16 + 64), 1);
}

#[test]
fn test_depth_blit_between_lighting_and_gizmos() {
    let mut engine = engine();
    engine.render().unwrap();

    let gbuffer = engine.renderer().gbuffer().target();
    let commands = engine.backend().last_frame_commands();
    let blit = position_of(commands, |c| {
        *c == Command::Blit {
            src: gbuffer,
            dst: RenderTarget::Default,
            mask: BlitMask::Depth,
            filter: FilterMode::Nearest,
        }
    });
    let gizmo = program(&engine, |b| b.gizmo);
    let first_gizmo = position_of(commands, |c| *c == Command::UseProgram(gizmo));
    let lighting = program(&engine, |b| b.lighting);
    let lighting_at = position_of(commands, |c| *c == Command::UseProgram(lighting));
    assert!(lighting_at < blit);
    assert!(blit < first_gizmo);

    let gizmos = draws_with(&engine, gizmo);
    assert_eq!(gizmos.len(), 7);
    assert!(gizmos.iter().all(|d| d.uniform_ranges.len() == 1 && d.uniform_ranges[0].size == 144));
    // One directional light drawn as a cube, six point lights as spheres
    assert_eq!(gizmos.iter().filter(|d| d.index_count.is_none()).count(), 1);
}

#[test]
fn test_skybox_draws_before_geometry() {
    let mut engine = engine();
    engine.render().unwrap();

    let draws = engine.backend().last_frame_draws();
    let reflective = program(&engine, |b| b.reflective_cube);
    let sky = program(&engine, |b| b.skybox);
    let geometry = program(&engine, |b| b.geometry);
    assert_eq!(draws[0].program, Some(reflective));
    assert_eq!(draws[1].program, Some(sky));
    assert_eq!(draws[2].program, Some(geometry));
    assert!(draws[..2].iter().all(|d| d.target == engine.renderer().gbuffer().target()));
}

#[test]
fn test_forward_applies_decoration_and_blits_color() {
    let mut engine = engine();
    engine.set_mode(RenderMode::Forward);
    engine.render().unwrap();

    let forward = draws_with(&engine, program(&engine, |b| b.forward));
    assert_eq!(forward.len(), 1);
    let draw = &forward[0];
    assert_eq!(draw.draw_buffers, 1);
    assert_eq!(draw.uniform_ranges[0].size, 784);

    let local = engine.scene().entities[0].local_block.unwrap();
    assert_eq!(
        local,
        UniformBlock {
            offset: draw.uniform_ranges[1].offset,
            size: draw.uniform_ranges[1].size,
        }
    );
    let model = read_mat4(&engine, local.offset);
    let expected = ForwardDecoration::DEMO.apply(Mat4::IDENTITY);
    assert!(model.abs_diff_eq(expected, 1e-5));

    let gbuffer = engine.renderer().gbuffer().target();
    let commands = engine.backend().last_frame_commands();
    assert!(commands.contains(&Command::Blit {
        src: gbuffer,
        dst: RenderTarget::Default,
        mask: BlitMask::Color,
        filter: FilterMode::Linear,
    }));
    assert!(!commands
        .iter()
        .any(|c| matches!(c, Command::Blit { mask: BlitMask::Depth, .. })));
}

#[test]
fn test_textured_quad_binds_quad_texture() {
    let mut engine = engine();
    engine.set_mode(RenderMode::TexturedQuad);
    engine.render().unwrap();

    let draws = engine.backend().last_frame_draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].target, RenderTarget::Default);
    assert_eq!(draws[0].index_count, Some(6));
    assert_eq!(draws[0].textures, vec![(0, engine.assets().textures.white())]);
}

#[test]
fn test_mode_switch_rewinds_allocator() {
    let mut engine = engine();
    engine.render().unwrap();
    engine.set_mode(RenderMode::Forward);
    engine.render().unwrap();

    let commands = engine.backend().last_frame_commands();
    let first_range = commands.iter().find_map(|c| match c {
        Command::BindUniformRange { offset, .. } => Some(*offset),
        _ => None,
    });
    assert_eq!(first_range, Some(0));
}

#[test]
fn test_vertex_bindings_are_reused_across_frames() {
    let mut engine = engine();
    engine.render().unwrap();
    let after_first = engine.backend().binding_count();
    for _ in 0..3 {
        engine.render().unwrap();
    }
    assert_eq!(engine.backend().binding_count(), after_first);
}

#[test]
fn test_every_frame_uploads_before_ending() {
    let mut engine = engine();
    engine.render().unwrap();

    let commands = engine.backend().last_frame_commands();
    let buffer = engine.renderer().allocator().buffer();
    let n = commands.len();
    assert_eq!(commands[n - 1], Command::EndFrame);
    assert!(matches!(commands[n - 2], Command::WriteBuffer { buffer: b, offset: 0, .. } if b == buffer));
}

#[test]
fn test_uniform_overflow_is_an_error_and_frame_still_ends() {
    let mut engine = engine_with(RendererConfig {
        uniform_capacity: Some(64),
        ..Default::default()
    });
    let err = engine.render().unwrap_err();
    assert!(matches!(err, RendererError::UniformCapacity { .. }));
    assert_eq!(engine.backend().commands().last(), Some(&Command::EndFrame));
}

#[test]
fn test_extra_lights_are_truncated_for_lighting_only() {
    let mut engine = engine();
    let light = engine.scene().lights[1].clone();
    for _ in 0..12 {
        engine.scene_mut().add_light(light.clone());
    }
    engine.settings_mut().show_gizmos = true;
    engine.render().unwrap();

    let lighting = draws_with(&engine, program(&engine, |b| b.lighting));
    assert_eq!(read_u32(&engine, lighting[0].uniform_ranges[0].offset + 12), 16);
    // Gizmos have no light array to overflow
    assert_eq!(draws_with(&engine, program(&engine, |b| b.gizmo)).len(), 19);
}

#[test]
fn test_resize_rebuilds_gbuffer() {
    let mut engine = engine();
    let before = engine.renderer().gbuffer().handle();
    engine.resize(1024, 768).unwrap();
    engine.render().unwrap();

    assert_ne!(engine.renderer().gbuffer().handle(), before);
    assert!(engine.backend().render_target_descriptor(before).is_none());
    let geometry = draws_with(&engine, program(&engine, |b| b.geometry));
    assert_eq!(geometry[0].target, engine.renderer().gbuffer().target());
}
