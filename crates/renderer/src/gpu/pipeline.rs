use std::borrow::Cow;

use anyhow::{bail, Result};
use bytemuck::{Pod, Zeroable};
use wgpu::naga::{ScalarKind, TypeInner};
use wgpu::util::DeviceExt;

use crate::compile::{InterfaceVar, Program, ProgramInterface};

/// Position attribute fed to vertex input location 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct Vertex {
    position: [f32; 2],
}

/// One triangle large enough to cover the whole viewport.
const FULLSCREEN_TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [-1.0, -1.0],
    },
    Vertex {
        position: [3.0, -1.0],
    },
    Vertex {
        position: [-1.0, 3.0],
    },
];

const POSITION_LOCATION: u32 = 0;
const COLOR_OUTPUT_LOCATION: u32 = 0;

/// Render pipelines built from a linked [`Program`]: one targeting the
/// swapchain and one targeting the RGBA capture texture.
pub(crate) struct ProgramPipelines {
    pub surface: wgpu::RenderPipeline,
    pub capture: wgpu::RenderPipeline,
    pub capture_format: wgpu::TextureFormat,
    pub vertex_buffer: wgpu::Buffer,
}

impl ProgramPipelines {
    pub fn new(
        device: &wgpu::Device,
        program: Program,
        surface_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let (vertex, fragment, interface) = program.into_parts();
        let attributes = vertex_attributes(&interface)?;
        check_fragment_outputs(&interface)?;

        let capture_format = if surface_format.is_srgb() {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("program vertex"),
            source: wgpu::ShaderSource::Naga(Cow::Owned(vertex)),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("program fragment"),
            source: wgpu::ShaderSource::Naga(Cow::Owned(fragment)),
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("program pipeline layout"),
            bind_group_layouts: &[],
            push_constant_ranges: &[],
        });

        let vertex_layout = wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        };

        let build = |label: &str, format: wgpu::TextureFormat| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: Some("main"),
                    buffers: &[vertex_layout.clone()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_module,
                    entry_point: Some("main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
                cache: None,
            })
        };

        let surface = build("program surface pipeline", surface_format);
        let capture = build("program capture pipeline", capture_format);

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            bail!("GPU backend rejected the shader program: {err}");
        }

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("fullscreen triangle"),
            contents: bytemuck::cast_slice(&FULLSCREEN_TRIANGLE),
            usage: wgpu::BufferUsages::VERTEX,
        });

        tracing::debug!(?surface_format, ?capture_format, "built render pipelines");

        Ok(Self {
            surface,
            capture,
            capture_format,
            vertex_buffer,
        })
    }

    pub fn vertex_count(&self) -> u32 {
        FULLSCREEN_TRIANGLE.len() as u32
    }
}

fn vertex_attributes(interface: &ProgramInterface) -> Result<Vec<wgpu::VertexAttribute>> {
    let mut attributes = Vec::with_capacity(1);
    for input in &interface.vertex_inputs {
        if input.location != POSITION_LOCATION {
            bail!(
                "vertex input {} at location {} has no data source; only location {POSITION_LOCATION} receives positions",
                describe(input),
                input.location
            );
        }
        if !is_float(&input.ty) {
            bail!(
                "vertex input {} at location {POSITION_LOCATION} must be a float vector",
                describe(input)
            );
        }
        attributes.push(wgpu::VertexAttribute {
            format: wgpu::VertexFormat::Float32x2,
            offset: 0,
            shader_location: POSITION_LOCATION,
        });
    }
    Ok(attributes)
}

fn check_fragment_outputs(interface: &ProgramInterface) -> Result<()> {
    if let Some(output) = interface
        .fragment_outputs
        .iter()
        .find(|output| output.location != COLOR_OUTPUT_LOCATION)
    {
        bail!(
            "fragment output {} at location {} has no color target; only location {COLOR_OUTPUT_LOCATION} is drawn",
            describe(output),
            output.location
        );
    }
    Ok(())
}

fn is_float(ty: &TypeInner) -> bool {
    match ty {
        TypeInner::Scalar(scalar) | TypeInner::Vector { scalar, .. } => {
            scalar.kind == ScalarKind::Float && scalar.width == 4
        }
        _ => false,
    }
}

fn describe(var: &InterfaceVar) -> String {
    var.name
        .as_deref()
        .map(|name| format!("'{name}'"))
        .unwrap_or_else(|| "<unnamed>".to_string())
}
