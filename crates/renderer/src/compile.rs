//! GLSL stage compilation and vertex/fragment interface linking.
//!
//! Both stages go through naga's GLSL front end and validator so that
//! compile and link diagnostics are available before any window or GPU
//! device exists. The resulting modules are handed to `wgpu` as naga IR.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use wgpu::naga::front::glsl::{Frontend, Options};
use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};
use wgpu::naga::{self, Binding, Handle, Module, ScalarKind, ShaderStage, Type, TypeInner};

use crate::legacy::{self, Declaration, Direction, NORMALIZED_VERSION_LINE};
use crate::shader::{ShaderKind, ShaderSource};

/// Upper bound on diagnostic text kept from the compiler or linker.
pub const MAX_DIAGNOSTIC_CHARS: usize = 511;

/// Compiler or linker output, capped at [`MAX_DIAGNOSTIC_CHARS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic(String);

impl Diagnostic {
    pub fn new(text: impl AsRef<str>) -> Self {
        let text = text.as_ref().trim_end();
        Self(text.chars().take(MAX_DIAGNOSTIC_CHARS).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("{kind} shader source {path} is empty")]
    EmptySource { kind: ShaderKind, path: PathBuf },
    #[error("{kind} shader compilation failed:\n{diagnostic}")]
    Failed {
        kind: ShaderKind,
        diagnostic: Diagnostic,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("expected a {expected} stage in the {expected} slot, got a {found} stage")]
    InvalidStage {
        expected: ShaderKind,
        found: ShaderKind,
    },
    #[error("{kind} stage has no {kind} entry point")]
    MissingEntryPoint { kind: ShaderKind },
    #[error("shader program linking failed:\n{diagnostic}")]
    Failed { diagnostic: Diagnostic },
}

/// A validated shader stage, exclusively owned until it is linked.
#[derive(Debug)]
pub struct CompiledStage {
    kind: ShaderKind,
    path: PathBuf,
    module: Module,
    /// Kept so a legacy fragment stage can be rebuilt at link time.
    source: ShaderSource,
    declarations: Vec<Declaration>,
    assigned_inputs: bool,
}

impl CompiledStage {
    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn module(&self) -> &Module {
        &self.module
    }
}

/// Compiles one stage. The source is consumed whatever the outcome.
pub fn compile(kind: ShaderKind, source: ShaderSource) -> Result<CompiledStage, CompileError> {
    if source.text().trim().is_empty() {
        let err = CompileError::EmptySource {
            kind,
            path: source.path().to_path_buf(),
        };
        tracing::error!(%kind, "{err}");
        return Err(err);
    }

    match translate(kind, &source, &HashMap::new()) {
        Ok(translated) => {
            tracing::info!(%kind, path = %source.path().display(), "{kind} shader compiled successfully");
            Ok(CompiledStage {
                kind,
                path: source.path().to_path_buf(),
                module: translated.module,
                source,
                declarations: translated.declarations,
                assigned_inputs: translated.assigned_inputs,
            })
        }
        Err(diagnostic) => {
            let err = CompileError::Failed { kind, diagnostic };
            tracing::error!(%kind, path = %source.path().display(), "{err}");
            Err(err)
        }
    }
}

struct Translated {
    module: Module,
    declarations: Vec<Declaration>,
    assigned_inputs: bool,
}

fn translate(
    kind: ShaderKind,
    source: &ShaderSource,
    input_locations: &HashMap<String, u32>,
) -> Result<Translated, Diagnostic> {
    let normalized = legacy::normalize(source.text(), input_locations);
    if normalized.legacy {
        tracing::debug!(
            path = %source.path().display(),
            version = NORMALIZED_VERSION_LINE,
            assigned_inputs = normalized.assigned(Direction::In),
            assigned_outputs = normalized.assigned(Direction::Out),
            "rewrote legacy GLSL for the front end"
        );
    }

    let text = &normalized.text;
    let mut frontend = Frontend::default();
    let module = frontend
        .parse(&Options::from(kind.naga_stage()), &text)
        .map_err(|errors| Diagnostic::new(errors.emit_to_string(&text)))?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|error| Diagnostic::new(error.emit_to_string(&text)))?;

    Ok(Translated {
        module,
        assigned_inputs: normalized.assigned(Direction::In) > 0,
        declarations: normalized.declarations,
    })
}

/// One location-bound input or output of an entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceVar {
    pub location: u32,
    pub name: Option<String>,
    pub ty: TypeInner,
}

impl InterfaceVar {
    fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("'{name}'"),
            None => "<unnamed>".to_string(),
        }
    }
}

/// The matched interface of a linked program, sorted by location.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramInterface {
    pub vertex_inputs: Vec<InterfaceVar>,
    pub varyings: Vec<InterfaceVar>,
    pub fragment_outputs: Vec<InterfaceVar>,
}

/// A linked vertex and fragment pair. Both stages were moved in by
/// [`link`]; the GPU backend consumes the program in turn.
#[derive(Debug)]
pub struct Program {
    vertex: Module,
    fragment: Module,
    interface: ProgramInterface,
}

impl Program {
    pub fn interface(&self) -> &ProgramInterface {
        &self.interface
    }

    pub(crate) fn into_parts(self) -> (Module, Module, ProgramInterface) {
        (self.vertex, self.fragment, self.interface)
    }
}

/// Links two compiled stages, checking that every location-bound fragment
/// input is fed by a vertex output of the same type.
pub fn link(vertex: CompiledStage, fragment: CompiledStage) -> Result<Program, LinkError> {
    let result = link_stages(vertex, fragment);
    match &result {
        Ok(program) => tracing::info!(
            varyings = program.interface.varyings.len(),
            "shader program linked successfully"
        ),
        Err(err) => tracing::error!("{err}"),
    }
    result
}

fn link_stages(vertex: CompiledStage, fragment: CompiledStage) -> Result<Program, LinkError> {
    for (stage, expected) in [(&vertex, ShaderKind::Vertex), (&fragment, ShaderKind::Fragment)] {
        if stage.kind != expected {
            return Err(LinkError::InvalidStage {
                expected,
                found: stage.kind,
            });
        }
    }

    let fragment = if fragment.assigned_inputs {
        match_inputs_by_name(&vertex, fragment)?
    } else {
        fragment
    };

    let vertex_entry = entry_point(&vertex.module, ShaderStage::Vertex).ok_or(
        LinkError::MissingEntryPoint {
            kind: ShaderKind::Vertex,
        },
    )?;
    let fragment_entry = entry_point(&fragment.module, ShaderStage::Fragment).ok_or(
        LinkError::MissingEntryPoint {
            kind: ShaderKind::Fragment,
        },
    )?;

    let mut vertex_inputs = entry_inputs(&vertex.module, vertex_entry);
    let mut vertex_outputs = entry_outputs(&vertex.module, vertex_entry);
    let mut fragment_inputs = entry_inputs(&fragment.module, fragment_entry);
    let mut fragment_outputs = entry_outputs(&fragment.module, fragment_entry);
    name_from_source(&mut vertex_inputs, &vertex.declarations, Direction::In);
    name_from_source(&mut vertex_outputs, &vertex.declarations, Direction::Out);
    name_from_source(&mut fragment_inputs, &fragment.declarations, Direction::In);
    name_from_source(&mut fragment_outputs, &fragment.declarations, Direction::Out);

    for input in &fragment_inputs {
        let Some(output) = vertex_outputs
            .iter()
            .find(|output| output.location == input.location)
        else {
            return Err(LinkError::Failed {
                diagnostic: Diagnostic::new(format!(
                    "fragment input {} at location {} is not written by the vertex shader",
                    input.label(),
                    input.location
                )),
            });
        };

        if output.ty != input.ty {
            return Err(LinkError::Failed {
                diagnostic: Diagnostic::new(format!(
                    "type mismatch at location {}: vertex output {} is {} but fragment input {} is {}",
                    input.location,
                    output.label(),
                    describe_type(&output.ty),
                    input.label(),
                    describe_type(&input.ty)
                )),
            });
        }
    }

    Ok(Program {
        vertex: vertex.module,
        fragment: fragment.module,
        interface: ProgramInterface {
            vertex_inputs,
            varyings: fragment_inputs,
            fragment_outputs,
        },
    })
}

/// Rebuilds a legacy fragment stage so each unlocated input takes the
/// location of the vertex output with the same name.
fn match_inputs_by_name(
    vertex: &CompiledStage,
    fragment: CompiledStage,
) -> Result<CompiledStage, LinkError> {
    let output_locations: HashMap<String, u32> = vertex
        .declarations
        .iter()
        .filter(|decl| decl.direction == Direction::Out)
        .filter_map(|decl| Some((decl.name.clone(), decl.location?)))
        .collect();

    let translated = translate(ShaderKind::Fragment, &fragment.source, &output_locations)
        .map_err(|diagnostic| LinkError::Failed { diagnostic })?;
    tracing::debug!(
        path = %fragment.path.display(),
        "matched fragment inputs to vertex outputs by name"
    );

    Ok(CompiledStage {
        module: translated.module,
        declarations: translated.declarations,
        ..fragment
    })
}

fn name_from_source(vars: &mut [InterfaceVar], declarations: &[Declaration], direction: Direction) {
    for var in vars.iter_mut().filter(|var| var.name.is_none()) {
        var.name = declarations
            .iter()
            .find(|decl| decl.direction == direction && decl.location == Some(var.location))
            .map(|decl| decl.name.clone());
    }
}

fn entry_point(module: &Module, stage: ShaderStage) -> Option<&naga::EntryPoint> {
    module
        .entry_points
        .iter()
        .find(|entry| entry.stage == stage)
}

fn entry_inputs(module: &Module, entry: &naga::EntryPoint) -> Vec<InterfaceVar> {
    let mut vars = Vec::new();
    for argument in &entry.function.arguments {
        collect_locations(
            module,
            argument.ty,
            argument.binding.as_ref(),
            argument.name.as_deref(),
            &mut vars,
        );
    }
    vars.sort_by_key(|var| var.location);
    vars
}

fn entry_outputs(module: &Module, entry: &naga::EntryPoint) -> Vec<InterfaceVar> {
    let mut vars = Vec::new();
    if let Some(result) = &entry.function.result {
        collect_locations(module, result.ty, result.binding.as_ref(), None, &mut vars);
    }
    vars.sort_by_key(|var| var.location);
    vars
}

fn collect_locations(
    module: &Module,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    name: Option<&str>,
    out: &mut Vec<InterfaceVar>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push(InterfaceVar {
            location: *location,
            name: name.map(str::to_owned),
            ty: module.types[ty].inner.clone(),
        }),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(
                        module,
                        member.ty,
                        member.binding.as_ref(),
                        member.name.as_deref(),
                        out,
                    );
                }
            }
        }
    }
}

fn describe_type(ty: &TypeInner) -> String {
    match ty {
        TypeInner::Scalar(scalar) => scalar_name(scalar.kind, scalar.width).to_string(),
        TypeInner::Vector { size, scalar } => {
            let prefix = match scalar.kind {
                ScalarKind::Float if scalar.width == 8 => "dvec",
                ScalarKind::Float => "vec",
                ScalarKind::Sint => "ivec",
                ScalarKind::Uint => "uvec",
                ScalarKind::Bool => "bvec",
                _ => return format!("{ty:?}"),
            };
            format!("{prefix}{}", *size as u8)
        }
        TypeInner::Matrix { columns, rows, .. } => {
            format!("mat{}x{}", *columns as u8, *rows as u8)
        }
        other => format!("{other:?}"),
    }
}

fn scalar_name(kind: ScalarKind, width: u8) -> &'static str {
    match kind {
        ScalarKind::Float if width == 8 => "double",
        ScalarKind::Float => "float",
        ScalarKind::Sint => "int",
        ScalarKind::Uint => "uint",
        ScalarKind::Bool => "bool",
        _ => "abstract",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r"#version 450 core
layout(location = 0) in vec2 aPos;
layout(location = 0) out vec2 vUv;

void main() {
    vUv = aPos * 0.5 + 0.5;
    gl_Position = vec4(aPos, 0.0, 1.0);
}
";

    const FRAGMENT: &str = r"#version 450 core
layout(location = 0) in vec2 vUv;
layout(location = 0) out vec4 FragColor;

void main() {
    FragColor = vec4(vUv, 0.5, 1.0);
}
";

    const FRAGMENT_VEC3_INPUT: &str = r"#version 450 core
layout(location = 0) in vec3 vUv;
layout(location = 0) out vec4 FragColor;

void main() {
    FragColor = vec4(vUv, 1.0);
}
";

    fn stage(kind: ShaderKind, text: &str) -> CompiledStage {
        compile(kind, ShaderSource::new(format!("{kind}.glsl"), text)).unwrap()
    }

    #[test]
    fn diagnostic_is_capped() {
        let long = "x".repeat(2000);
        let diagnostic = Diagnostic::new(&long);
        assert_eq!(diagnostic.as_str().chars().count(), MAX_DIAGNOSTIC_CHARS);

        let short = Diagnostic::new("error: oops\n");
        assert_eq!(short.as_str(), "error: oops");
    }

    #[test]
    fn compiles_valid_stages() {
        let vertex = stage(ShaderKind::Vertex, VERTEX);
        assert_eq!(vertex.kind(), ShaderKind::Vertex);
        assert!(entry_point(vertex.module(), ShaderStage::Vertex).is_some());

        let fragment = stage(ShaderKind::Fragment, FRAGMENT);
        assert!(entry_point(fragment.module(), ShaderStage::Fragment).is_some());
    }

    #[test]
    fn invalid_source_yields_diagnostic() {
        let source = ShaderSource::new("broken.glsl", "#version 450\nvoid main() { this is not glsl }\n");
        let err = compile(ShaderKind::Fragment, source).unwrap_err();
        match err {
            CompileError::Failed { kind, diagnostic } => {
                assert_eq!(kind, ShaderKind::Fragment);
                assert!(!diagnostic.is_empty());
                assert!(diagnostic.as_str().chars().count() <= MAX_DIAGNOSTIC_CHARS);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_source_is_rejected() {
        let err = compile(ShaderKind::Vertex, ShaderSource::new("empty.glsl", "  \n")).unwrap_err();
        assert!(matches!(
            err,
            CompileError::EmptySource {
                kind: ShaderKind::Vertex,
                ..
            }
        ));
    }

    #[test]
    fn legacy_version_is_accepted() {
        let legacy = VERTEX.replacen("#version 450 core", "#version 330 core", 1);
        let vertex = stage(ShaderKind::Vertex, &legacy);
        assert_eq!(vertex.kind(), ShaderKind::Vertex);
    }

    const LEGACY_VERTEX: &str = r"#version 330 core
layout (location = 0) in vec2 aPos;
out vec2 uv;
out float shade;

void main() {
    uv = aPos * 0.5 + 0.5;
    shade = 0.25;
    gl_Position = vec4(aPos, 0.0, 1.0);
}
";

    const LEGACY_FRAGMENT: &str = r"#version 330 core
in float shade;
in vec2 uv;
out vec4 FragColor;

void main() {
    FragColor = vec4(uv, shade, 1.0);
}
";

    #[test]
    fn legacy_varyings_link_by_name() {
        let program = link(
            stage(ShaderKind::Vertex, LEGACY_VERTEX),
            stage(ShaderKind::Fragment, LEGACY_FRAGMENT),
        )
        .unwrap();

        let varyings: Vec<_> = program
            .interface()
            .varyings
            .iter()
            .map(|var| (var.location, var.name.clone(), describe_type(&var.ty)))
            .collect();
        assert_eq!(
            varyings,
            vec![
                (0, Some("uv".to_string()), "vec2".to_string()),
                (1, Some("shade".to_string()), "float".to_string()),
            ]
        );
        assert_eq!(program.interface().fragment_outputs[0].location, 0);
    }

    #[test]
    fn legacy_input_without_vertex_output_fails_to_link() {
        let fragment = r"#version 330 core
in vec2 uv;
in vec4 tint;
out vec4 FragColor;

void main() {
    FragColor = vec4(uv, 0.0, 1.0) * tint;
}
";
        let err = link(
            stage(ShaderKind::Vertex, LEGACY_VERTEX),
            stage(ShaderKind::Fragment, fragment),
        )
        .unwrap_err();

        match err {
            LinkError::Failed { diagnostic } => {
                assert!(diagnostic.as_str().contains("'tint'"), "{diagnostic}");
                assert!(diagnostic.as_str().contains("location 2"), "{diagnostic}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn links_matching_interface() {
        let program = link(
            stage(ShaderKind::Vertex, VERTEX),
            stage(ShaderKind::Fragment, FRAGMENT),
        )
        .unwrap();

        let interface = program.interface();
        assert_eq!(interface.vertex_inputs.len(), 1);
        assert_eq!(interface.vertex_inputs[0].location, 0);
        assert_eq!(interface.varyings.len(), 1);
        assert_eq!(describe_type(&interface.varyings[0].ty), "vec2");
        assert_eq!(interface.fragment_outputs.len(), 1);
        assert_eq!(describe_type(&interface.fragment_outputs[0].ty), "vec4");
    }

    #[test]
    fn mismatched_varying_fails_to_link() {
        let err = link(
            stage(ShaderKind::Vertex, VERTEX),
            stage(ShaderKind::Fragment, FRAGMENT_VEC3_INPUT),
        )
        .unwrap_err();

        match err {
            LinkError::Failed { diagnostic } => {
                assert!(diagnostic.as_str().contains("location 0"));
                assert!(diagnostic.as_str().contains("vec2"));
                assert!(diagnostic.as_str().contains("vec3"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn swapped_stages_are_rejected() {
        let err = link(
            stage(ShaderKind::Fragment, FRAGMENT),
            stage(ShaderKind::Vertex, VERTEX),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LinkError::InvalidStage {
                expected: ShaderKind::Vertex,
                found: ShaderKind::Fragment,
            }
        ));
    }
}
