//! Built-in WGSL programs
//!
//! Binding convention shared with the backends:
//! - `@group(0) @binding(0)`: per-frame globals, `@binding(1)`: per-draw locals
//! - `@group(1) @binding(N)`: texture unit N
//! - `@group(1) @binding(8)`: linear sampler, `@binding(9)`: nearest sampler

use std::path::Path;

use crate::backend::GraphicsBackend;
use crate::error::RendererResult;
use crate::resources::{ProgramId, ProgramRegistry};

/// Debug path: one texture on a clip-space quad
pub const TEXTURED_QUAD_SHADER: &str = r#"
@group(1) @binding(0) var quad_texture: texture_2d<f32>;
@group(1) @binding(8) var linear_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 1.0);
    out.uv = in.uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(quad_texture, linear_sampler, in.uv);
}
"#;

/// G-buffer write with relief (steep parallax) mapping
pub const GEOMETRY_SHADER: &str = r#"
struct Globals {
    camera_position: vec3<f32>,
    light_count: u32,
    show_relief: u32,
}

struct Locals {
    model: mat4x4<f32>,
    view_projection: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> globals: Globals;
@group(0) @binding(1) var<uniform> locals: Locals;
@group(1) @binding(0) var albedo_map: texture_2d<f32>;
@group(1) @binding(1) var normal_map: texture_2d<f32>;
@group(1) @binding(2) var height_map: texture_2d<f32>;
@group(1) @binding(8) var linear_sampler: sampler;

const HEIGHT_SCALE: f32 = 0.1;
const MIN_LAYERS: f32 = 8.0;
const MAX_LAYERS: f32 = 32.0;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tangent: vec3<f32>,
    @location(4) bitangent: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) normal: vec3<f32>,
    @location(3) tangent: vec3<f32>,
    @location(4) bitangent: vec3<f32>,
}

struct GBufferOutput {
    @location(0) color: vec4<f32>,
    @location(1) normal: vec4<f32>,
    @location(2) albedo: vec4<f32>,
    @location(3) position: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    let world = locals.model * vec4<f32>(in.position, 1.0);
    let basis = mat3x3<f32>(locals.model[0].xyz, locals.model[1].xyz, locals.model[2].xyz);

    var out: VertexOutput;
    out.clip_position = locals.view_projection * world;
    out.world_position = world.xyz;
    out.uv = in.uv;
    out.normal = basis * in.normal;
    out.tangent = basis * in.tangent;
    out.bitangent = basis * in.bitangent;
    return out;
}

fn safe_normalize(v: vec3<f32>, fallback: vec3<f32>) -> vec3<f32> {
    let len = length(v);
    if len < 1e-6 {
        return fallback;
    }
    return v / len;
}

fn sample_depth(uv: vec2<f32>) -> f32 {
    return textureSampleLevel(height_map, linear_sampler, uv, 0.0).r;
}

fn parallax_uv(uv: vec2<f32>, view_ts: vec3<f32>) -> vec2<f32> {
    let layers = mix(MAX_LAYERS, MIN_LAYERS, abs(view_ts.z));
    let layer_depth = 1.0 / layers;
    let uv_step = view_ts.xy / max(view_ts.z, 0.05) * HEIGHT_SCALE / layers;

    var current_uv = uv;
    var current_depth = 0.0;
    var depth = sample_depth(current_uv);
    for (var i = 0; i < 32; i += 1) {
        if current_depth >= depth {
            break;
        }
        current_uv -= uv_step;
        depth = sample_depth(current_uv);
        current_depth += layer_depth;
    }

    let previous_uv = current_uv + uv_step;
    let after = depth - current_depth;
    let before = sample_depth(previous_uv) - current_depth + layer_depth;
    let denom = after - before;
    var weight = 0.0;
    if abs(denom) > 1e-6 {
        weight = after / denom;
    }
    return mix(current_uv, previous_uv, weight);
}

@fragment
fn fs_main(in: VertexOutput) -> GBufferOutput {
    let n = safe_normalize(in.normal, vec3<f32>(0.0, 1.0, 0.0));
    let t = safe_normalize(in.tangent, vec3<f32>(1.0, 0.0, 0.0));
    let b = safe_normalize(in.bitangent, cross(n, t));
    let tbn = mat3x3<f32>(t, b, n);

    var uv = in.uv;
    var normal = n;
    if globals.show_relief != 0u {
        let view_ts = transpose(tbn) * normalize(globals.camera_position - in.world_position);
        uv = parallax_uv(in.uv, view_ts);
        let mapped = textureSampleLevel(normal_map, linear_sampler, uv, 0.0).xyz * 2.0 - 1.0;
        normal = safe_normalize(tbn * mapped, n);
    }
    let albedo = textureSampleLevel(albedo_map, linear_sampler, uv, 0.0);

    var out: GBufferOutput;
    out.color = albedo;
    out.normal = vec4<f32>(normal, 1.0);
    out.albedo = albedo;
    out.position = vec4<f32>(in.world_position, 1.0);
    return out;
}
"#;

/// Fullscreen deferred lighting over the G-buffer
pub const LIGHTING_SHADER: &str = r#"
struct Light {
    kind: u32,
    color: vec3<f32>,
    direction: vec3<f32>,
    position: vec3<f32>,
    intensity: f32,
}

struct Globals {
    camera_position: vec3<f32>,
    light_count: u32,
    lights: array<Light, 16>,
}

@group(0) @binding(0) var<uniform> globals: Globals;
@group(1) @binding(0) var position_map: texture_2d<f32>;
@group(1) @binding(1) var normal_map: texture_2d<f32>;
@group(1) @binding(2) var albedo_map: texture_2d<f32>;

const MAX_LIGHTS: u32 = 16u;
const AMBIENT: f32 = 0.1;

struct VertexInput {
    @location(0) position: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 1.0);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let texel = vec2<i32>(in.clip_position.xy);
    let position = textureLoad(position_map, texel, 0).xyz;
    let normal_sample = textureLoad(normal_map, texel, 0);
    let albedo = textureLoad(albedo_map, texel, 0);

    // Background and environment-mapped surfaces are stored unlit
    if normal_sample.w < 0.5 {
        return albedo;
    }

    let normal = normalize(normal_sample.xyz);
    let view_dir = normalize(globals.camera_position - position);
    var color = albedo.rgb * AMBIENT;

    let count = min(globals.light_count, MAX_LIGHTS);
    for (var i = 0u; i < count; i += 1u) {
        let light = globals.lights[i];
        var light_dir = normalize(-light.direction);
        var attenuation = 1.0;
        if light.kind == 1u {
            let to_light = light.position - position;
            let dist = length(to_light);
            light_dir = to_light / max(dist, 1e-4);
            attenuation = 1.0 / (1.0 + 0.09 * dist + 0.032 * dist * dist);
        }
        let diffuse = max(dot(normal, light_dir), 0.0);
        let half_dir = normalize(light_dir + view_dir);
        let specular = pow(max(dot(normal, half_dir), 0.0), 32.0) * 0.5;
        color += (albedo.rgb * diffuse + vec3<f32>(specular)) * light.color * light.intensity * attenuation;
    }
    return vec4<f32>(color, albedo.a);
}
"#;

/// Single-pass lighting with directional contributions only
pub const FORWARD_SHADER: &str = r#"
struct Light {
    kind: u32,
    color: vec3<f32>,
    direction: vec3<f32>,
}

struct Globals {
    camera_position: vec3<f32>,
    light_count: u32,
    lights: array<Light, 16>,
}

struct Locals {
    model: mat4x4<f32>,
    view_projection: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> globals: Globals;
@group(0) @binding(1) var<uniform> locals: Locals;
@group(1) @binding(0) var albedo_map: texture_2d<f32>;
@group(1) @binding(8) var linear_sampler: sampler;

const MAX_LIGHTS: u32 = 16u;
const AMBIENT: f32 = 0.1;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    let world = locals.model * vec4<f32>(in.position, 1.0);
    let basis = mat3x3<f32>(locals.model[0].xyz, locals.model[1].xyz, locals.model[2].xyz);

    var out: VertexOutput;
    out.clip_position = locals.view_projection * world;
    out.world_position = world.xyz;
    out.normal = basis * in.normal;
    out.uv = in.uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let albedo = textureSample(albedo_map, linear_sampler, in.uv);
    var normal = vec3<f32>(0.0, 1.0, 0.0);
    if length(in.normal) > 1e-6 {
        normal = normalize(in.normal);
    }
    let view_dir = normalize(globals.camera_position - in.world_position);
    var color = albedo.rgb * AMBIENT;

    let count = min(globals.light_count, MAX_LIGHTS);
    for (var i = 0u; i < count; i += 1u) {
        let light = globals.lights[i];
        let light_dir = normalize(-light.direction);
        let diffuse = max(dot(normal, light_dir), 0.0);
        let half_dir = normalize(light_dir + view_dir);
        let specular = pow(max(dot(normal, half_dir), 0.0), 32.0) * 0.5;
        color += (albedo.rgb * diffuse + vec3<f32>(specular)) * light.color;
    }
    return vec4<f32>(color, albedo.a);
}
"#;

/// Flat-colored light markers
pub const GIZMO_SHADER: &str = r#"
struct Locals {
    model: mat4x4<f32>,
    view_projection: mat4x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(1) var<uniform> locals: Locals;

struct VertexInput {
    @location(0) position: vec3<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> @builtin(position) vec4<f32> {
    return locals.view_projection * locals.model * vec4<f32>(in.position, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return locals.color;
}
"#;

/// Cube reflecting the sky, written unlit into the G-buffer
pub const REFLECTIVE_CUBE_SHADER: &str = r#"
struct Locals {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    camera_position: vec4<f32>,
}

@group(0) @binding(1) var<uniform> locals: Locals;
@group(1) @binding(3) var sky_map: texture_cube<f32>;
@group(1) @binding(8) var linear_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct GBufferOutput {
    @location(0) color: vec4<f32>,
    @location(1) normal: vec4<f32>,
    @location(2) albedo: vec4<f32>,
    @location(3) position: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    let world = locals.model * vec4<f32>(in.position, 1.0);
    let basis = mat3x3<f32>(locals.model[0].xyz, locals.model[1].xyz, locals.model[2].xyz);

    var out: VertexOutput;
    out.clip_position = locals.projection * locals.view * world;
    out.world_position = world.xyz;
    out.normal = basis * in.normal;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> GBufferOutput {
    let incident = normalize(in.world_position - locals.camera_position.xyz);
    let reflected = reflect(incident, normalize(in.normal));
    let color = textureSample(sky_map, linear_sampler, reflected);

    var out: GBufferOutput;
    out.color = color;
    out.normal = vec4<f32>(0.0);
    out.albedo = color;
    out.position = vec4<f32>(in.world_position, 0.0);
    return out;
}
"#;

/// Camera-centred sky cube drawn at the far plane
pub const SKYBOX_SHADER: &str = r#"
struct Locals {
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    camera_position: vec4<f32>,
}

@group(0) @binding(1) var<uniform> locals: Locals;
@group(1) @binding(3) var sky_map: texture_cube<f32>;
@group(1) @binding(8) var linear_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) direction: vec3<f32>,
}

struct GBufferOutput {
    @location(0) color: vec4<f32>,
    @location(1) normal: vec4<f32>,
    @location(2) albedo: vec4<f32>,
    @location(3) position: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    let clip = locals.projection * locals.view * vec4<f32>(in.position, 1.0);

    var out: VertexOutput;
    // z = w puts every fragment on the far plane
    out.clip_position = clip.xyww;
    out.direction = in.position;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> GBufferOutput {
    let color = textureSample(sky_map, linear_sampler, in.direction);

    var out: GBufferOutput;
    out.color = color;
    out.normal = vec4<f32>(0.0);
    out.albedo = color;
    out.position = vec4<f32>(0.0);
    return out;
}
"#;

/// Ids of the programs every render mode draws with
#[derive(Debug, Clone, Copy)]
pub struct BuiltinPrograms {
    pub textured_quad: ProgramId,
    pub geometry: ProgramId,
    pub lighting: ProgramId,
    pub forward: ProgramId,
    pub gizmo: ProgramId,
    pub reflective_cube: ProgramId,
    pub skybox: ProgramId,
}

impl BuiltinPrograms {
    /// Compile every built-in program.
    ///
    /// When `shader_dir` holds a `<name>.wgsl` override it is loaded from disk
    /// and watched for changes; an override that fails to compile falls back
    /// to the embedded source.
    pub fn load<B: GraphicsBackend>(
        backend: &mut B,
        registry: &mut ProgramRegistry,
        shader_dir: Option<&Path>,
    ) -> RendererResult<Self> {
        let mut load = |name: &str, source: &str| -> RendererResult<ProgramId> {
            if let Some(dir) = shader_dir {
                let path = dir.join(format!("{}.wgsl", name));
                if path.is_file() {
                    match registry.load_file(backend, &path, name) {
                        Ok(id) => return Ok(id),
                        Err(e) => log::warn!("Using built-in '{}' instead: {}", name, e),
                    }
                }
            }
            registry.load_source(backend, name, source)
        };

        Ok(Self {
            textured_quad: load("textured_quad", TEXTURED_QUAD_SHADER)?,
            geometry: load("geometry", GEOMETRY_SHADER)?,
            lighting: load("lighting", LIGHTING_SHADER)?,
            forward: load("forward", FORWARD_SHADER)?,
            gizmo: load("gizmo", GIZMO_SHADER)?,
            reflective_cube: load("reflective_cube", REFLECTIVE_CUBE_SHADER)?,
            skybox: load("skybox", SKYBOX_SHADER)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::backend::TextureDimension;

    fn builtins() -> (ProgramRegistry, BuiltinPrograms) {
        let mut backend = DummyBackend::default();
        let mut registry = ProgramRegistry::new();
        let builtins = BuiltinPrograms::load(&mut backend, &mut registry, None).unwrap();
        (registry, builtins)
    }

    #[test]
    fn test_builtins_compile() {
        let (registry, _) = builtins();
        assert_eq!(registry.len(), 7);
    }

    #[test]
    fn test_block_sizes_match_packing() {
        let (registry, b) = builtins();
        assert_eq!(registry.get(b.geometry).block_size(0), 32);
        assert_eq!(registry.get(b.geometry).block_size(1), 128);
        assert_eq!(registry.get(b.lighting).block_size(0), 1040);
        assert_eq!(registry.get(b.forward).block_size(0), 784);
        assert_eq!(registry.get(b.gizmo).block_size(1), 144);
        assert_eq!(registry.get(b.skybox).block_size(1), 208);
        assert_eq!(registry.get(b.reflective_cube).block_size(1), 208);
    }

    #[test]
    fn test_geometry_reads_every_lit_attribute() {
        let (registry, b) = builtins();
        let locations: Vec<u32> = registry
            .get(b.geometry)
            .reflection
            .vertex_inputs
            .iter()
            .map(|a| a.location)
            .collect();
        assert_eq!(locations, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_skybox_samples_a_cube_map() {
        let (registry, b) = builtins();
        let textures = &registry.get(b.skybox).reflection.textures;
        assert_eq!(textures.len(), 1);
        assert_eq!(textures[0].unit, 3);
        assert_eq!(textures[0].dimension, TextureDimension::Cube);
    }
}
