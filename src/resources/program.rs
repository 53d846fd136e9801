//! Shader programs: WGSL validation, interface reflection and hot reload
//!
//! Programs are WGSL modules with `vs_main`/`fs_main` entry points. naga
//! parses and validates every source before it reaches the backend, and the
//! module's interface (vertex inputs, uniform blocks, texture units and the
//! name of every resource) is resolved once here so the pipeline never has to
//! look anything up by string at draw time.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::backend::{
    GraphicsBackend, ProgramDescriptor, ProgramHandle, ShaderAttribute, ShaderReflection,
    TextureDimension, TextureSlotInfo, UniformBlockInfo,
};
use crate::error::{AssetError, RendererError, RendererResult};

/// Bind group holding uniform blocks
const UNIFORM_GROUP: u32 = 0;
/// Bind group holding textures and samplers
const TEXTURE_GROUP: u32 = 1;

/// A compiled program plus everything known about its interface
#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub handle: ProgramHandle,
    pub reflection: ShaderReflection,
    pub source_path: Option<PathBuf>,
    pub modified: Option<SystemTime>,
}

impl Program {
    pub fn new(name: &str, handle: ProgramHandle, reflection: ShaderReflection) -> Self {
        Self {
            name: name.to_string(),
            handle,
            reflection,
            source_path: None,
            modified: None,
        }
    }

    /// Binding or unit of a named resource
    pub fn location(&self, name: &str) -> Option<u32> {
        self.reflection.location(name)
    }

    /// Declared size of the uniform block at `binding`, 0 if absent
    pub fn block_size(&self, binding: u32) -> u64 {
        self.reflection
            .uniform_block(binding)
            .map(|b| b.size)
            .unwrap_or(0)
    }
}

fn component_count(module: &naga::Module, ty: naga::Handle<naga::Type>) -> Option<u32> {
    match module.types[ty].inner {
        naga::TypeInner::Scalar(_) => Some(1),
        naga::TypeInner::Vector { size, .. } => Some(size as u32),
        _ => None,
    }
}

fn collect_inputs(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    inputs: &mut Vec<ShaderAttribute>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            if let Some(components) = component_count(module, ty) {
                inputs.push(ShaderAttribute {
                    location: *location,
                    components,
                });
            }
        }
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_inputs(module, member.ty, member.binding.as_ref(), inputs);
                }
            }
        }
    }
}

fn count_outputs(module: &naga::Module, result: Option<&naga::FunctionResult>) -> u32 {
    let Some(result) = result else {
        return 0;
    };
    match &result.binding {
        Some(naga::Binding::Location { .. }) => 1,
        Some(naga::Binding::BuiltIn(_)) => 0,
        None => match &module.types[result.ty].inner {
            naga::TypeInner::Struct { members, .. } => members
                .iter()
                .filter(|m| matches!(m.binding, Some(naga::Binding::Location { .. })))
                .count() as u32,
            _ => 0,
        },
    }
}

/// Parse, validate and reflect a WGSL module.
///
/// On failure the error carries naga's full diagnostic rendered against the
/// source, ready to be logged.
pub fn reflect_wgsl(source: &str) -> Result<(ShaderReflection, u32), String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| e.emit_to_string(source))?;

    let mut reflection = ShaderReflection::default();
    let mut color_outputs = 0;

    for entry in &module.entry_points {
        match entry.stage {
            naga::ShaderStage::Vertex if entry.name == "vs_main" => {
                for arg in &entry.function.arguments {
                    collect_inputs(&module, arg.ty, arg.binding.as_ref(), &mut reflection.vertex_inputs);
                }
            }
            naga::ShaderStage::Fragment if entry.name == "fs_main" => {
                color_outputs = count_outputs(&module, entry.function.result.as_ref());
            }
            _ => {}
        }
    }
    if !module.entry_points.iter().any(|e| e.name == "vs_main")
        || !module.entry_points.iter().any(|e| e.name == "fs_main")
    {
        return Err("program must define both vs_main and fs_main".into());
    }
    reflection.vertex_inputs.sort_by_key(|a| a.location);

    for (_, var) in module.global_variables.iter() {
        let Some(binding) = &var.binding else {
            continue;
        };
        match (binding.group, &module.types[var.ty].inner) {
            (UNIFORM_GROUP, _) if var.space == naga::AddressSpace::Uniform => {
                let size = module.types[var.ty].inner.size(module.to_ctx()) as u64;
                reflection.uniform_blocks.push(UniformBlockInfo {
                    binding: binding.binding,
                    size,
                });
            }
            (TEXTURE_GROUP, naga::TypeInner::Image { dim, .. }) => {
                let dimension = match dim {
                    naga::ImageDimension::Cube => TextureDimension::Cube,
                    naga::ImageDimension::D2 => TextureDimension::D2,
                    other => {
                        return Err(format!(
                            "texture '{}' has unsupported dimension {:?}",
                            var.name.as_deref().unwrap_or("?"),
                            other
                        ))
                    }
                };
                reflection.textures.push(TextureSlotInfo {
                    unit: binding.binding,
                    dimension,
                });
            }
            (TEXTURE_GROUP, naga::TypeInner::Sampler { .. }) => {
                reflection.samplers.push(binding.binding);
            }
            (group, _) => {
                return Err(format!(
                    "resource '{}' at @group({}) @binding({}) is outside the supported layout",
                    var.name.as_deref().unwrap_or("?"),
                    group,
                    binding.binding
                ))
            }
        }
        if let Some(name) = &var.name {
            reflection.locations.insert(name.clone(), binding.binding);
        }
    }
    reflection.uniform_blocks.sort_by_key(|b| b.binding);
    reflection.textures.sort_by_key(|t| t.unit);
    reflection.samplers.sort_unstable();

    Ok((reflection, color_outputs))
}

/// Index of a program inside a [`ProgramRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(usize);

/// Owns every loaded program
#[derive(Debug, Default)]
pub struct ProgramRegistry {
    programs: Vec<Program>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile<B: GraphicsBackend>(
        backend: &mut B,
        name: &str,
        source: &str,
    ) -> RendererResult<Program> {
        let (reflection, color_outputs) = reflect_wgsl(source).map_err(|message| {
            log::error!("Program '{}' failed to compile:\n{}", name, message);
            RendererError::ShaderCompile {
                name: name.to_string(),
                message,
            }
        })?;

        let handle = backend.create_program(&ProgramDescriptor {
            label: Some(name.to_string()),
            source: source.to_string(),
            reflection: reflection.clone(),
            color_outputs,
        })?;

        log::debug!(
            "Program '{}': {} inputs, {} blocks, {} textures",
            name,
            reflection.vertex_inputs.len(),
            reflection.uniform_blocks.len(),
            reflection.textures.len()
        );
        Ok(Program::new(name, handle, reflection))
    }

    /// Compile a program from in-memory WGSL
    pub fn load_source<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        name: &str,
        source: &str,
    ) -> RendererResult<ProgramId> {
        let program = Self::compile(backend, name, source)?;
        self.programs.push(program);
        Ok(ProgramId(self.programs.len() - 1))
    }

    /// Compile a program from a WGSL file and watch it for changes
    pub fn load_file<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        path: &Path,
        name: &str,
    ) -> RendererResult<ProgramId> {
        let source = std::fs::read_to_string(path).map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut program = Self::compile(backend, name, &source)?;
        program.source_path = Some(path.to_path_buf());
        program.modified = modified_time(path);

        log::info!("Loaded program '{}' from {}", name, path.display());
        self.programs.push(program);
        Ok(ProgramId(self.programs.len() - 1))
    }

    pub fn get(&self, id: ProgramId) -> &Program {
        &self.programs[id.0]
    }

    pub fn find(&self, name: &str) -> Option<ProgramId> {
        self.programs
            .iter()
            .position(|p| p.name == name)
            .map(ProgramId)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Recompile file-backed programs whose timestamp changed.
    ///
    /// A failed reload keeps the previous program. Returns the handles that
    /// were replaced so cached vertex bindings built for them can be dropped.
    pub fn reload_modified<B: GraphicsBackend>(&mut self, backend: &mut B) -> Vec<ProgramHandle> {
        let mut replaced = Vec::new();
        for program in &mut self.programs {
            let Some(path) = program.source_path.clone() else {
                continue;
            };
            let modified = modified_time(&path);
            if modified.is_none() || modified == program.modified {
                continue;
            }
            program.modified = modified;

            let source = match std::fs::read_to_string(&path) {
                Ok(source) => source,
                Err(e) => {
                    log::warn!("Could not re-read {}: {}", path.display(), e);
                    continue;
                }
            };
            match Self::compile(backend, &program.name, &source) {
                Ok(mut fresh) => {
                    log::info!("Reloaded program '{}'", program.name);
                    fresh.source_path = Some(path);
                    fresh.modified = modified;
                    let old = std::mem::replace(program, fresh);
                    backend.destroy_program(old.handle);
                    replaced.push(old.handle);
                }
                Err(e) => log::error!("Keeping previous '{}': {}", program.name, e),
            }
        }
        replaced
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;

    const SIMPLE: &str = r#"
struct Globals { camera_position: vec3<f32>, light_count: u32, show_relief: u32 }
struct Locals { model: mat4x4<f32>, view_projection: mat4x4<f32> }

@group(0) @binding(0) var<uniform> globals: Globals;
@group(0) @binding(1) var<uniform> locals: Locals;
@group(1) @binding(0) var albedo_texture: texture_2d<f32>;
@group(1) @binding(8) var linear_sampler: sampler;

struct VertexInput {
    @location(2) uv: vec2<f32>,
    @location(0) position: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip = locals.view_projection * locals.model * vec4<f32>(in.position, 1.0);
    out.uv = in.uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let tint = f32(globals.light_count) * globals.camera_position.x;
    return textureSample(albedo_texture, linear_sampler, in.uv) * tint;
}
"#;

    #[test]
    fn test_reflection_resolves_interface() {
        let (reflection, outputs) = reflect_wgsl(SIMPLE).unwrap();

        assert_eq!(outputs, 1);
        assert_eq!(
            reflection.vertex_inputs,
            vec![
                ShaderAttribute { location: 0, components: 3 },
                ShaderAttribute { location: 2, components: 2 },
            ]
        );
        assert_eq!(reflection.uniform_block(0).unwrap().size, 32);
        assert_eq!(reflection.uniform_block(1).unwrap().size, 128);
        assert_eq!(reflection.textures.len(), 1);
        assert_eq!(reflection.samplers, vec![8]);
        assert_eq!(reflection.location("locals"), Some(1));
        assert_eq!(reflection.location("albedo_texture"), Some(0));
    }

    #[test]
    fn test_compile_error_carries_diagnostic() {
        let mut backend = DummyBackend::new(64, 64);
        let mut registry = ProgramRegistry::new();
        let err = registry
            .load_source(&mut backend, "broken", "fn vs_main( {")
            .unwrap_err();

        match err {
            RendererError::ShaderCompile { name, message } => {
                assert_eq!(name, "broken");
                assert!(!message.is_empty());
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_and_find() {
        let mut backend = DummyBackend::new(64, 64);
        let mut registry = ProgramRegistry::new();
        let id = registry.load_source(&mut backend, "simple", SIMPLE).unwrap();

        assert_eq!(registry.find("simple"), Some(id));
        assert_eq!(registry.get(id).block_size(0), 32);
        assert!(backend.program_descriptor(registry.get(id).handle).is_some());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let mut backend = DummyBackend::new(64, 64);
        let mut registry = ProgramRegistry::new();
        let err = registry
            .load_file(&mut backend, Path::new("does/not/exist.wgsl"), "ghost")
            .unwrap_err();
        assert!(matches!(err, RendererError::Asset(AssetError::Io { .. })));
    }

    #[test]
    fn test_reload_picks_up_changed_file() {
        let dir = std::env::temp_dir().join(format!("program_reload_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("simple.wgsl");
        std::fs::write(&path, SIMPLE).unwrap();

        let mut backend = DummyBackend::new(64, 64);
        let mut registry = ProgramRegistry::new();
        let id = registry.load_file(&mut backend, &path, "simple").unwrap();
        let before = registry.get(id).handle;

        // Nothing changed on disk yet
        assert!(registry.reload_modified(&mut backend).is_empty());

        registry.programs[id.0].modified = Some(SystemTime::UNIX_EPOCH);
        let replaced = registry.reload_modified(&mut backend);

        assert_eq!(replaced, vec![before]);
        assert_ne!(registry.get(id).handle, before);
        std::fs::remove_dir_all(&dir).ok();
    }
}
