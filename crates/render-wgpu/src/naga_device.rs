use glam::Mat4;
use hotshade_common::{ProgramId, ShaderId, ShaderStage, UniformLocation};
use hotshade_program::{DiagnosticLog, GraphicsDevice};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Handle, Module, Scalar, ScalarKind, Type, TypeInner, VectorSize};
use std::collections::{BTreeMap, HashMap};

/// A validated WGSL module for one stage.
#[derive(Debug, Clone)]
struct CompiledStage {
    source: String,
    module: Module,
    entry_point: String,
}

/// Everything the GPU backend needs to turn a linked program into a pipeline.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub vertex_source: String,
    pub vertex_entry: String,
    pub fragment_source: String,
    pub fragment_entry: String,
    /// Uniform name to `@binding` index in `@group(0)`.
    pub uniforms: BTreeMap<String, u32>,
}

/// Headless [`GraphicsDevice`] that compiles and links WGSL with naga.
///
/// Compiling parses and validates one module and requires an entry point for
/// the requested stage. Linking checks the interface between the two stages:
/// every fragment input location must be written by the vertex stage with the
/// same type, and every uniform must be a `mat4x4<f32>` in bind group 0 with
/// one name per binding across both stages. Uniform locations are binding
/// indices.
///
/// Handles come from a single counter starting at 1. Deleting the bound
/// program defers the release until another program is bound.
#[derive(Debug, Default)]
pub struct NagaDevice {
    next_id: u32,
    shaders: HashMap<ShaderId, CompiledStage>,
    programs: HashMap<ProgramId, LinkedProgram>,
    current: Option<ProgramId>,
    orphaned: Option<ProgramId>,
    values: HashMap<(ProgramId, UniformLocation), Mat4>,
}

impl NagaDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn program(&self, id: ProgramId) -> Option<&LinkedProgram> {
        self.programs.get(&id)
    }

    pub fn contains_program(&self, id: ProgramId) -> bool {
        self.programs.contains_key(&id)
    }

    /// Program most recently bound with `use_program`.
    pub fn current_program(&self) -> Option<ProgramId> {
        self.current
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    /// Last matrix uploaded to the uniform `name` of `program`.
    pub fn uniform_value(&self, program: ProgramId, name: &str) -> Option<Mat4> {
        let binding = *self.programs.get(&program)?.uniforms.get(name)?;
        self.values
            .get(&(program, UniformLocation(binding)))
            .copied()
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn free_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
        self.values.retain(|(program, _), _| *program != id);
    }
}

impl GraphicsDevice for NagaDevice {
    fn compile_shader(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<ShaderId, DiagnosticLog> {
        let module = naga::front::wgsl::parse_str(source)
            .map_err(|e| DiagnosticLog(e.emit_to_string(source)))?;
        Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|e| DiagnosticLog(e.emit_to_string(source)))?;

        let wanted = naga_stage(stage);
        let entry_point = module
            .entry_points
            .iter()
            .find(|ep| ep.stage == wanted)
            .map(|ep| ep.name.clone())
            .ok_or_else(|| DiagnosticLog(format!("no @{stage} entry point in module")))?;

        let id = ShaderId(self.allocate());
        tracing::debug!("compiled {stage} stage as {id} (entry `{entry_point}`)");
        self.shaders.insert(
            id,
            CompiledStage {
                source: source.to_owned(),
                module,
                entry_point,
            },
        );
        Ok(id)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        if self.shaders.remove(&shader).is_none() {
            tracing::warn!("delete of unknown {shader}");
        }
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
    ) -> Result<ProgramId, DiagnosticLog> {
        let (Some(vs), Some(fs)) = (self.shaders.get(&vertex), self.shaders.get(&fragment)) else {
            return Err(DiagnosticLog(format!("cannot link unknown {vertex} / {fragment}")));
        };

        let outputs = stage_outputs(&vs.module, &vs.entry_point);
        for (location, input) in stage_inputs(&fs.module, &fs.entry_point) {
            match outputs.get(&location) {
                None => {
                    return Err(DiagnosticLog(format!(
                        "fragment input @location({location}) is not written by the vertex stage"
                    )));
                }
                Some(output) if *output != input => {
                    return Err(DiagnosticLog(format!(
                        "@location({location}) is {} in the vertex stage but {} in the fragment stage",
                        type_name(output),
                        type_name(&input)
                    )));
                }
                Some(_) => {}
            }
        }

        let mut uniforms = BTreeMap::new();
        collect_uniforms(&vs.module, &mut uniforms)?;
        collect_uniforms(&fs.module, &mut uniforms)?;

        let linked = LinkedProgram {
            vertex_source: vs.source.clone(),
            vertex_entry: vs.entry_point.clone(),
            fragment_source: fs.source.clone(),
            fragment_entry: fs.entry_point.clone(),
            uniforms,
        };
        let id = ProgramId(self.allocate());
        tracing::debug!("linked {vertex} + {fragment} into {id}");
        self.programs.insert(id, linked);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.current == Some(program) {
            self.orphaned = Some(program);
        } else {
            self.free_program(program);
        }
    }

    fn use_program(&mut self, program: ProgramId) {
        if !self.programs.contains_key(&program) {
            tracing::warn!("use of unknown {program}");
            return;
        }
        self.current = Some(program);
        if let Some(orphan) = self.orphaned.take() {
            if orphan != program {
                self.free_program(orphan);
            }
        }
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.programs
            .get(&program)?
            .uniforms
            .get(name)
            .map(|binding| UniformLocation(*binding))
    }

    fn uniform_mat4(&mut self, program: ProgramId, location: UniformLocation, value: &Mat4) {
        let known = self
            .programs
            .get(&program)
            .is_some_and(|p| p.uniforms.values().any(|b| *b == location.0));
        if known {
            self.values.insert((program, location), *value);
        } else {
            tracing::debug!("ignoring upload to binding {} of {program}", location.0);
        }
    }
}

fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

fn entry_point<'m>(module: &'m Module, name: &str) -> Option<&'m naga::EntryPoint> {
    module.entry_points.iter().find(|ep| ep.name == name)
}

/// Location-bound values written by an entry point's result.
fn stage_outputs(module: &Module, entry: &str) -> BTreeMap<u32, TypeInner> {
    let mut out = BTreeMap::new();
    if let Some(result) = entry_point(module, entry).and_then(|ep| ep.function.result.as_ref()) {
        locations(module, result.ty, result.binding.as_ref(), &mut out);
    }
    out
}

/// Location-bound values read by an entry point's arguments.
fn stage_inputs(module: &Module, entry: &str) -> BTreeMap<u32, TypeInner> {
    let mut out = BTreeMap::new();
    if let Some(ep) = entry_point(module, entry) {
        for arg in &ep.function.arguments {
            locations(module, arg.ty, arg.binding.as_ref(), &mut out);
        }
    }
    out
}

fn locations(
    module: &Module,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    out: &mut BTreeMap<u32, TypeInner>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => {
            out.insert(*location, module.types[ty].inner.clone());
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

fn collect_uniforms(module: &Module, uniforms: &mut BTreeMap<String, u32>) -> Result<(), DiagnosticLog> {
    for (_, var) in module.global_variables.iter() {
        if var.space != AddressSpace::Uniform {
            continue;
        }
        let name = var.name.clone().unwrap_or_default();
        let Some(binding) = &var.binding else {
            return Err(DiagnosticLog(format!("uniform `{name}` has no binding")));
        };
        if binding.group != 0 {
            return Err(DiagnosticLog(format!(
                "uniform `{name}` uses @group({}); only @group(0) is supported",
                binding.group
            )));
        }
        let inner = &module.types[var.ty].inner;
        if !is_mat4_f32(inner) {
            return Err(DiagnosticLog(format!(
                "uniform `{name}` is {}; only mat4x4<f32> uniforms are supported",
                type_name(inner)
            )));
        }
        if let Some((other, _)) = uniforms
            .iter()
            .find(|(other, b)| **b == binding.binding && **other != name)
        {
            return Err(DiagnosticLog(format!(
                "@binding({}) is declared as both `{other}` and `{name}`",
                binding.binding
            )));
        }
        match uniforms.get(&name) {
            Some(existing) if *existing != binding.binding => {
                return Err(DiagnosticLog(format!(
                    "uniform `{name}` is bound to @binding({existing}) and @binding({})",
                    binding.binding
                )));
            }
            Some(_) => {}
            None => {
                uniforms.insert(name, binding.binding);
            }
        }
    }
    Ok(())
}

fn is_mat4_f32(inner: &TypeInner) -> bool {
    match inner {
        TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } => *columns == VectorSize::Quad && *rows == VectorSize::Quad && *scalar == Scalar::F32,
        _ => false,
    }
}

fn scalar_name(scalar: Scalar) -> String {
    match scalar.kind {
        ScalarKind::Float => format!("f{}", scalar.width * 8),
        ScalarKind::Sint => format!("i{}", scalar.width * 8),
        ScalarKind::Uint => format!("u{}", scalar.width * 8),
        ScalarKind::Bool => "bool".to_owned(),
        other => format!("{other:?}"),
    }
}

fn type_name(inner: &TypeInner) -> String {
    match inner {
        TypeInner::Scalar(scalar) => scalar_name(*scalar),
        TypeInner::Vector { size, scalar } => format!("vec{}<{}>", *size as u8, scalar_name(*scalar)),
        TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } => format!("mat{}x{}<{}>", *columns as u8, *rows as u8, scalar_name(*scalar)),
        other => format!("{other:?}"),
    }
}
