use std::path::Path;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::OptionExt;
use glam::Vec4;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::resource_ctx::RenderResourceContext;
use crate::renderer::deletion_queue::{GpuResource, ResourceDestroyer};
use crate::renderer::registry::{Handle, Registry};
use crate::renderer::resources::material::{ComputePipelineBuilder, GraphicsPipelineBuilder, Material};
use crate::renderer::resources::shader::{ComputeShader, GraphicsShader};
use crate::renderer::resources::vertex::Vertex;
use crate::renderer::shader_data::{ComputePushConstants, MeshPushConstants};

pub const DEFAULT_MATERIAL: &str = "default_mesh";
pub const TEXTURED_MATERIAL: &str = "textured_mesh";

/// A background compute shader and the parameters pushed to it
#[derive(Debug, Clone)]
pub struct ComputeEffect {
    pub name: &'static str,
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub data: ComputePushConstants,
}

/// Responsibilities:
/// - Build the mesh material pipelines and the background effect pipelines
/// - Own the material registry and the selected effect
///
/// Pipelines and layouts are released through the resource context's deletion queue.
pub struct RenderPipelineContext {
    textured_layout: vk::PipelineLayout,
    textured_pipeline: vk::Pipeline,

    pub materials: Registry<Material>,
    pub effects: Vec<ComputeEffect>,
    current_effect: usize,
}

impl RenderPipelineContext {
    pub fn new(
        dev: &RenderDevice,
        res: &mut RenderResourceContext,
        shader_dir: &Path,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let push_constant_ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(size_of::<MeshPushConstants>() as u32)];

        let mesh_set_layouts = [res.layouts.global.handle, res.layouts.object.handle];
        let mesh_layout = create_pipeline_layout(dev, res, &mesh_set_layouts, &push_constant_ranges)?;

        let textured_set_layouts = [
            res.layouts.global.handle,
            res.layouts.object.handle,
            res.layouts.texture.handle,
        ];
        let textured_layout =
            create_pipeline_layout(dev, res, &textured_set_layouts, &push_constant_ranges)?;

        let base = GraphicsPipelineBuilder::new()
            .with_vertex_input(Vertex::input_description())
            .with_input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .with_polygon_mode(vk::PolygonMode::FILL)
            .with_cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE)
            .with_multisampling_disabled()
            .with_blending_disabled()
            .with_color_attachment_format(color_format)
            .with_depth_attachment_format(depth_format)
            .with_depth_test(true, Some(vk::CompareOp::LESS_OR_EQUAL));

        let default_pipeline = build_graphics(
            dev,
            res,
            base.clone().with_pipeline_layout(mesh_layout),
            shader_dir,
            "default_lit",
        )?;
        let textured_pipeline = build_graphics(
            dev,
            res,
            base.with_pipeline_layout(textured_layout)
                .with_alpha_blending_enabled(),
            shader_dir,
            "textured_lit",
        )?;

        let mut materials = Registry::new();
        materials.insert(DEFAULT_MATERIAL, Material::new(default_pipeline, mesh_layout));

        let compute_set_layouts = [res.layouts.draw_image.handle];
        let compute_push_ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(size_of::<ComputePushConstants>() as u32)];
        let compute_layout =
            create_pipeline_layout(dev, res, &compute_set_layouts, &compute_push_ranges)?;

        let gradient = ComputePushConstants {
            data1: Vec4::new(1.0, 0.0, 0.0, 1.0),
            data2: Vec4::new(0.0, 0.0, 1.0, 1.0),
            ..Default::default()
        };
        let sky = ComputePushConstants {
            data1: Vec4::new(0.1, 0.2, 0.4, 1.0),
            data2: Vec4::new(0.6, 0.7, 0.9, 1.0),
            data3: Vec4::new(0.8, 0.2, 0.05, 0.0),
            ..Default::default()
        };
        let effects = [("gradient", gradient), ("sky", sky)]
            .into_iter()
            .map(|(name, data)| {
                let pipeline = build_compute(dev, res, compute_layout, shader_dir, name)?;
                Ok(ComputeEffect {
                    name,
                    pipeline,
                    layout: compute_layout,
                    data,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        log::debug!("Built mesh pipelines and {} compute effects", effects.len());

        // The textured material is registered once its texture is loaded
        Ok(Self {
            textured_layout,
            textured_pipeline,
            materials,
            effects,
            current_effect: 0,
        })
    }

    /// Registers the textured material sampling `texture_set` at set 2
    pub fn add_textured_material(&mut self, texture_set: vk::DescriptorSet) -> Handle<Material> {
        let material = Material::new(self.textured_pipeline, self.textured_layout)
            .with_texture_set(texture_set);
        self.materials.insert(TEXTURED_MATERIAL, material)
    }

    pub fn current_effect(&self) -> Result<&ComputeEffect> {
        self.effects
            .get(self.current_effect)
            .ok_or_eyre("No compute effect selected")
    }

    /// Selects the next background effect, wrapping around
    pub fn next_effect(&mut self) -> &str {
        if !self.effects.is_empty() {
            self.current_effect = (self.current_effect + 1) % self.effects.len();
        }
        self.effects
            .get(self.current_effect)
            .map_or("none", |effect| effect.name)
    }
}

fn create_pipeline_layout(
    dev: &RenderDevice,
    res: &mut RenderResourceContext,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constant_ranges: &[vk::PushConstantRange],
) -> Result<vk::PipelineLayout> {
    let layout_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(set_layouts)
        .push_constant_ranges(push_constant_ranges);
    let layout = unsafe { dev.logical.create_pipeline_layout(&layout_info, None)? };
    res.deletion_queue.push(GpuResource::PipelineLayout(layout));
    Ok(layout)
}

/// Shader modules are destroyed as soon as the pipeline is built, whether or not it succeeded
fn build_graphics(
    dev: &RenderDevice,
    res: &mut RenderResourceContext,
    builder: GraphicsPipelineBuilder,
    shader_dir: &Path,
    fragment_name: &str,
) -> Result<vk::Pipeline> {
    let shader = GraphicsShader::new(shader_dir, "mesh", fragment_name, &dev.logical)?;
    let pipeline = builder
        .with_shaders(shader.vert_mod, shader.frag_mod)
        .build(&dev.logical);
    for module in shader.into_resources() {
        dev.destroy(module);
    }

    let pipeline = pipeline?;
    res.deletion_queue.push(GpuResource::Pipeline(pipeline));
    Ok(pipeline)
}

fn build_compute(
    dev: &RenderDevice,
    res: &mut RenderResourceContext,
    layout: vk::PipelineLayout,
    shader_dir: &Path,
    name: &str,
) -> Result<vk::Pipeline> {
    let shader = ComputeShader::new(shader_dir, name, &dev.logical)?;
    let pipeline = ComputePipelineBuilder::new()
        .with_shader(shader.comp_mod)
        .with_pipeline_layout(layout)
        .build(&dev.logical);
    dev.destroy(shader.into_resource());

    let pipeline = pipeline?;
    res.deletion_queue.push(GpuResource::Pipeline(pipeline));
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with_effects(names: &[&'static str]) -> RenderPipelineContext {
        RenderPipelineContext {
            textured_layout: vk::PipelineLayout::null(),
            textured_pipeline: vk::Pipeline::null(),
            materials: Registry::new(),
            effects: names
                .iter()
                .map(|&name| ComputeEffect {
                    name,
                    pipeline: vk::Pipeline::null(),
                    layout: vk::PipelineLayout::null(),
                    data: ComputePushConstants::default(),
                })
                .collect(),
            current_effect: 0,
        }
    }

    #[test]
    fn effects_cycle_and_wrap() {
        let mut pip = context_with_effects(&["gradient", "sky"]);
        assert_eq!(pip.current_effect().unwrap().name, "gradient");
        assert_eq!(pip.next_effect(), "sky");
        assert_eq!(pip.next_effect(), "gradient");
    }

    #[test]
    fn no_effects_is_an_error_not_a_panic() {
        let mut pip = context_with_effects(&[]);
        assert_eq!(pip.next_effect(), "none");
        assert!(pip.current_effect().is_err());
    }

    #[test]
    fn textured_material_keeps_its_handle_when_replaced() {
        let mut pip = context_with_effects(&[]);
        let first = pip.add_textured_material(vk::DescriptorSet::null());
        let second = pip.add_textured_material(vk::DescriptorSet::null());
        assert_eq!(first, second);
        assert_eq!(pip.materials.lookup(TEXTURED_MATERIAL), Some(first));
        assert!(pip.materials.get(first).unwrap().texture_set.is_some());
    }
}
