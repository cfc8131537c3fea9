use super::lut::WgpuShaderLut;
use super::texture::WgpuShaderTexture;
use super::{create_sampler, WgpuBackend};
use crate::frame::QuadVertex;
use crate::shader::geometry::{InputUniforms, PassGeometry, QUAD_INDICES};
use crate::shader::utils::{strip_parameter_pragmas, ProgramSource};
use crate::shader::{
    DestQuad, Float2, Rect, Shader, ShaderBackend, ShaderDesc, ShaderError, ShaderLut, ShaderParameterMap,
    ShaderTexture,
};
use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::ShaderStage;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use wgpu::util::DeviceExt;

const INPUT_BINDING: u32 = 0;
const SAMPLER_BINDING: u32 = 1;
const INPUTS_BINDING: u32 = 2;
const PARAMETERS_BINDING: u32 = 3;
const FIRST_LUT_BINDING: u32 = 4;

const ENTRY_POINT: &str = "main";

/// Member offsets of the `Parameters` uniform block.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParameterLayout {
    pub size: u32,
    pub offsets: Vec<(String, u32)>,
}

impl ParameterLayout {
    /// Block contents for the given values. Members without a value keep zero.
    pub fn pack(&self, parameters: &ShaderParameterMap) -> Vec<u8> {
        let mut data = vec![0u8; self.size as usize];
        for (name, offset) in &self.offsets {
            if let Some(value) = parameters.get(name) {
                let offset = *offset as usize;
                data[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
            }
        }
        data
    }
}

/// A pass translated to WGSL, with what reflection found in it.
#[derive(Debug)]
pub(crate) struct CompiledProgram {
    pub vertex: String,
    pub fragment: String,
    pub parameters: Option<ParameterLayout>,
    /// LUT id to texture binding.
    pub lut_bindings: HashMap<String, u32>,
}

pub(crate) fn compile_program(source: &str, path: &Path, uses_parameters: bool) -> Result<CompiledProgram, ShaderError> {
    let stripped = strip_parameter_pragmas(source);
    let program = ProgramSource::new(&stripped, path, uses_parameters)?;

    let vertex = parse_stage(&program.vertex, ShaderStage::Vertex, path)?;
    let fragment = parse_stage(&program.fragment, ShaderStage::Fragment, path)?;

    let parameters = parameter_layout(&fragment);
    let lut_bindings = lut_bindings(&fragment);

    Ok(CompiledProgram {
        vertex: to_wgsl(&vertex, path)?,
        fragment: to_wgsl(&fragment, path)?,
        parameters,
        lut_bindings,
    })
}

fn parse_stage(source: &str, stage: ShaderStage, path: &Path) -> Result<naga::Module, ShaderError> {
    let mut frontend = Frontend::default();
    frontend
        .parse(&Options::from(stage), source)
        .map_err(|e| ShaderError::Compile {
            path: path.to_path_buf(),
            message: format!("{:?} stage: {:?}", stage, e),
        })
}

fn to_wgsl(module: &naga::Module, path: &Path) -> Result<String, ShaderError> {
    let compile_error = |message: String| ShaderError::Compile {
        path: path.to_path_buf(),
        message,
    };
    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    let info = validator
        .validate(module)
        .map_err(|e| compile_error(format!("validation error: {:?}", e)))?;
    naga::back::wgsl::write_string(module, &info, naga::back::wgsl::WriterFlags::empty())
        .map_err(|e| compile_error(format!("WGSL generation error: {:?}", e)))
}

fn binding_of(var: &naga::GlobalVariable) -> Option<u32> {
    match var.binding {
        Some(naga::ResourceBinding { group: 0, binding }) => Some(binding),
        _ => None,
    }
}

fn parameter_layout(module: &naga::Module) -> Option<ParameterLayout> {
    let (_, var) = module
        .global_variables
        .iter()
        .find(|(_, var)| binding_of(var) == Some(PARAMETERS_BINDING))?;
    match &module.types[var.ty].inner {
        naga::TypeInner::Struct { members, span } => Some(ParameterLayout {
            size: span.next_multiple_of(16),
            offsets: members
                .iter()
                .filter_map(|member| Some((member.name.clone()?, member.offset)))
                .collect(),
        }),
        _ => None,
    }
}

fn lut_bindings(module: &naga::Module) -> HashMap<String, u32> {
    module
        .global_variables
        .iter()
        .filter(|(_, var)| matches!(module.types[var.ty].inner, naga::TypeInner::Image { .. }))
        .filter_map(|(_, var)| {
            let binding = binding_of(var)?;
            let name = var.name.clone()?;
            (binding >= FIRST_LUT_BINDING).then_some((name, binding))
        })
        .collect()
}

/// Fits `rect` inside a texture of `size`.
pub(crate) fn clamp_rect(rect: Rect, size: Float2) -> Rect {
    let x = rect.x.clamp(0.0, size.x);
    let y = rect.y.clamp(0.0, size.y);
    Rect::new(
        x,
        y,
        rect.width.clamp(0.0, size.x - x),
        rect.height.clamp(0.0, size.y - y),
    )
}

/// One GLSL pass running on wgpu.
pub struct WgpuShader {
    path: PathBuf,
    device: wgpu::Device,
    queue: wgpu::Queue,
    geometry: PassGeometry,

    vertex_module: wgpu::ShaderModule,
    fragment_module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    sampler: wgpu::Sampler,

    luts: Vec<(u32, WgpuShaderLut)>,
    parameter_data: Option<Vec<u8>>,

    input_buffer: Option<wgpu::Buffer>,
    parameter_buffer: Option<wgpu::Buffer>,
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
}

impl WgpuShader {
    pub(super) fn new(backend: &WgpuBackend, desc: ShaderDesc<'_, WgpuShaderLut>) -> Result<Self, ShaderError> {
        let device = backend.device().clone();
        let program = compile_program(desc.source, desc.path, !desc.parameters.is_empty())?;

        let parameter_data = program.parameters.as_ref().map(|layout| layout.pack(&desc.parameters));

        let mut luts = Vec::new();
        for lut in desc.luts {
            match program.lut_bindings.get(lut.id()) {
                Some(binding) => luts.push((*binding, lut)),
                None => debug!("{:?} does not sample LUT {}", desc.path, lut.id()),
            }
        }
        for (id, binding) in &program.lut_bindings {
            if !luts.iter().any(|(bound, _)| bound == binding) {
                warn!("{:?} samples LUT {} which isn't loaded, using a blank texture", desc.path, id);
                luts.push((*binding, WgpuShaderLut::placeholder(&device, backend.queue(), backend.caps(), id)));
            }
        }

        if desc.mipmap_input {
            debug!("{:?} requests a mipmapped input; pass targets have a single level", desc.path);
        }

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{} (vertex)", desc.path.display())),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(program.vertex)),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{} (fragment)", desc.path.display())),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(program.fragment)),
        });

        let mut entries = vec![
            texture_entry(INPUT_BINDING),
            sampler_entry(SAMPLER_BINDING),
            uniform_entry(INPUTS_BINDING, wgpu::ShaderStages::VERTEX_FRAGMENT),
        ];
        if parameter_data.is_some() {
            entries.push(uniform_entry(PARAMETERS_BINDING, wgpu::ShaderStages::FRAGMENT));
        }
        for (binding, _) in &luts {
            entries.push(texture_entry(*binding));
            entries.push(sampler_entry(*binding + 1));
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shader Pass Bind Group Layout"),
            entries: &entries,
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shader Pass Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        Ok(Self {
            path: desc.path.to_path_buf(),
            sampler: create_sampler(&device, backend.caps(), desc.filter, desc.wrap),
            queue: backend.queue().clone(),
            device,
            geometry: PassGeometry::new(desc.viewport_size, desc.frame_count_mod),
            vertex_module,
            fragment_module,
            bind_group_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
            luts,
            parameter_data,
            input_buffer: None,
            parameter_buffer: None,
            vertex_buffer: None,
            index_buffer: None,
        })
    }

    pub fn geometry(&self) -> &PassGeometry {
        &self.geometry
    }

    fn create_bind_group(&self, source: &WgpuShaderTexture, input_buffer: &wgpu::Buffer) -> wgpu::BindGroup {
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: INPUT_BINDING,
                resource: wgpu::BindingResource::TextureView(source.view()),
            },
            wgpu::BindGroupEntry {
                binding: SAMPLER_BINDING,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
            wgpu::BindGroupEntry {
                binding: INPUTS_BINDING,
                resource: input_buffer.as_entire_binding(),
            },
        ];
        if let Some(buffer) = &self.parameter_buffer {
            entries.push(wgpu::BindGroupEntry {
                binding: PARAMETERS_BINDING,
                resource: buffer.as_entire_binding(),
            });
        }
        for (binding, lut) in &self.luts {
            entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource: wgpu::BindingResource::TextureView(lut.texture().view()),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: *binding + 1,
                resource: wgpu::BindingResource::Sampler(lut.sampler()),
            });
        }

        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shader Pass Bind Group"),
            layout: &self.bind_group_layout,
            entries: &entries,
        })
    }
}

impl Shader<WgpuBackend> for WgpuShader {
    fn create_input_buffer(&mut self, _backend: &mut WgpuBackend) -> Result<(), ShaderError> {
        self.input_buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shader Inputs Buffer"),
            size: std::mem::size_of::<InputUniforms>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));

        self.parameter_buffer = self.parameter_data.as_ref().map(|data| {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Shader Parameters Buffer"),
                contents: data,
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });

        self.vertex_buffer = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shader Pass Vertex Buffer"),
            size: std::mem::size_of::<[QuadVertex; 4]>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }));

        self.index_buffer = Some(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Shader Pass Index Buffer"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        }));

        Ok(())
    }

    fn set_sizes(&mut self, prev_size: Float2, next_size: Float2) {
        self.geometry.set_sizes(prev_size, next_size);
    }

    fn prepare_parameters(&mut self, dest: &DestQuad, is_last_pass: bool, frame_count: u64) {
        self.geometry.prepare(dest, is_last_pass, frame_count);
    }

    fn update_mvp(&mut self) {
        self.geometry.update_mvp();
    }

    fn render(&mut self, backend: &mut WgpuBackend, source: &WgpuShaderTexture, target: &WgpuShaderTexture) -> Result<(), ShaderError> {
        let (Some(input_buffer), Some(vertex_buffer), Some(index_buffer)) =
            (&self.input_buffer, &self.vertex_buffer, &self.index_buffer)
        else {
            return Err(ShaderError::Render(format!("{:?}: input buffer was never created", self.path)));
        };

        let output = backend.bound_target().unwrap_or(target);
        let viewport = clamp_rect(backend.viewport(), output.size());
        let scissors = clamp_rect(backend.scissors(), output.size());
        if viewport.width < 1.0 || viewport.height < 1.0 {
            warn!("{:?}: empty viewport, skipping pass", self.path);
            return Ok(());
        }

        self.queue
            .write_buffer(input_buffer, 0, bytemuck::bytes_of(&self.geometry.current_input_data()));
        self.queue
            .write_buffer(vertex_buffer, 0, bytemuck::cast_slice(self.geometry.vertices()));

        let bind_group = self.create_bind_group(source, input_buffer);

        let format = output.format();
        let pipeline = self.pipelines.entry(format).or_insert_with(|| {
            debug!("Creating pipeline for {:?} targeting {:?}", self.path, format);
            create_pipeline(
                &self.device,
                &self.pipeline_layout,
                &self.vertex_module,
                &self.fragment_module,
                format,
            )
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Shader Pass Encoder"),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Shader Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: output.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            render_pass.set_viewport(viewport.x, viewport.y, viewport.width, viewport.height, 0.0, 1.0);
            render_pass.set_scissor_rect(
                scissors.x as u32,
                scissors.y as u32,
                scissors.width as u32,
                scissors.height as u32,
            );
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            render_pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            render_pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        Ok(())
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    vertex_module: &wgpu::ShaderModule,
    fragment_module: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Shader Pass Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex_module,
            entry_point: Some(ENTRY_POINT),
            buffers: &[QuadVertex::layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment_module,
            entry_point: Some(ENTRY_POINT),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
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
        multiview_mask: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASS: &str = r#"#version 450
#pragma parameter GAMMA "Gamma" 2.2 1.0 3.0 0.1
#pragma parameter BRIGHTNESS "Brightness" 1.0 0.0 2.0 0.05

layout(std140, binding = 2) uniform Inputs {
    mat4 MVPMatrix;
    vec2 OutputSize;
    vec2 TextureSize;
    vec2 InputSize;
    int FrameCount;
    float FrameDirection;
};

#ifdef VERTEX
layout(location = 0) in vec3 VertexCoord;
layout(location = 1) in vec2 TexCoord;
layout(location = 2) in vec3 COLOR;
layout(location = 0) out vec2 vTexCoord;

void main() {
    gl_Position = MVPMatrix * vec4(VertexCoord, 1.0);
    vTexCoord = TexCoord;
}
#endif

#ifdef FRAGMENT
#ifdef PARAMETER_UNIFORM
layout(std140, binding = 3) uniform Parameters {
    float GAMMA;
    float BRIGHTNESS;
};
#else
#define GAMMA 2.2
#define BRIGHTNESS 1.0
#endif

layout(binding = 0) uniform texture2D Texture;
layout(binding = 1) uniform sampler TextureSampler;
layout(binding = 4) uniform texture2D mask;
layout(binding = 5) uniform sampler maskSampler;

layout(location = 0) in vec2 vTexCoord;
layout(location = 0) out vec4 FragColor;

void main() {
    vec4 color = texture(sampler2D(Texture, TextureSampler), vTexCoord);
    vec4 m = texture(sampler2D(mask, maskSampler), vTexCoord);
    FragColor = vec4(pow(color.rgb * m.rgb, vec3(1.0 / GAMMA)) * BRIGHTNESS, 1.0);
}
#endif
"#;

    #[test]
    fn test_compiles_with_parameter_block() {
        let program = compile_program(PASS, Path::new("gamma.glsl"), true).unwrap();
        let layout = program.parameters.expect("parameter block");
        assert_eq!(layout.size, 16);
        assert_eq!(
            layout.offsets,
            vec![("GAMMA".to_string(), 0), ("BRIGHTNESS".to_string(), 4)]
        );
        assert_eq!(program.lut_bindings.get("mask"), Some(&4));
        assert!(program.vertex.contains("fn main"));
        assert!(program.fragment.contains("fn main"));
    }

    #[test]
    fn test_compiles_without_parameters() {
        let program = compile_program(PASS, Path::new("gamma.glsl"), false).unwrap();
        assert!(program.parameters.is_none());
    }

    #[test]
    fn test_compile_errors_name_the_file() {
        let err = compile_program("#version 450\nvoid main() { nope }\n", Path::new("broken.glsl"), false).unwrap_err();
        match err {
            ShaderError::Compile { path, .. } => assert_eq!(path, PathBuf::from("broken.glsl")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_parameter_packing() {
        let layout = ParameterLayout {
            size: 16,
            offsets: vec![("A".into(), 0), ("B".into(), 4)],
        };
        let mut values = ShaderParameterMap::new();
        values.insert("B".into(), 0.5);
        let data = layout.pack(&values);
        assert_eq!(data.len(), 16);
        assert_eq!(&data[0..4], &0.0f32.to_ne_bytes());
        assert_eq!(&data[4..8], &0.5f32.to_ne_bytes());
    }

    #[test]
    fn test_clamp_rect_to_target() {
        let size = Float2::new(320.0, 240.0);
        assert_eq!(clamp_rect(Rect::new(0.0, 0.0, 640.0, 480.0), size), Rect::new(0.0, 0.0, 320.0, 240.0));
        assert_eq!(clamp_rect(Rect::new(300.0, -5.0, 100.0, 100.0), size), Rect::new(300.0, 0.0, 20.0, 100.0));
    }
}
