use std::ffi::CStr;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::resources::vertex::VertexInputDescription;

const SHADER_ENTRY_POINT: &CStr = c"main";

/// Pipeline state shared by every object drawn with it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Material {
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    // Bound at set 2 when present
    pub texture_set: Option<vk::DescriptorSet>,
}

impl Material {
    pub fn new(pipeline: vk::Pipeline, pipeline_layout: vk::PipelineLayout) -> Self {
        Self {
            pipeline,
            pipeline_layout,
            texture_set: None,
        }
    }

    pub fn with_texture_set(mut self, set: vk::DescriptorSet) -> Self {
        self.texture_set = Some(set);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    Disabled,
    Alpha,
}

/// Accumulates graphics pipeline state. Every `build` snapshots the current
/// configuration, so one builder can be cloned and tweaked into many variants.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineBuilder {
    vertex_shader: Option<vk::ShaderModule>,
    fragment_shader: Option<vk::ShaderModule>,
    pipeline_layout: Option<vk::PipelineLayout>,
    vertex_input: VertexInputDescription,
    topology: vk::PrimitiveTopology,
    polygon_mode: vk::PolygonMode,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    samples: vk::SampleCountFlags,
    blend_mode: BlendMode,
    color_attachment_format: vk::Format,
    depth_attachment_format: vk::Format,
    // None disables the depth test
    depth_compare: Option<vk::CompareOp>,
}

impl Default for GraphicsPipelineBuilder {
    fn default() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            pipeline_layout: None,
            vertex_input: VertexInputDescription::default(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            samples: vk::SampleCountFlags::TYPE_1,
            blend_mode: BlendMode::Disabled,
            color_attachment_format: vk::Format::UNDEFINED,
            depth_attachment_format: vk::Format::UNDEFINED,
            depth_compare: None,
        }
    }
}

impl GraphicsPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Back to a blank configuration
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn with_shaders(mut self, vertex: vk::ShaderModule, fragment: vk::ShaderModule) -> Self {
        self.vertex_shader = Some(vertex);
        self.fragment_shader = Some(fragment);
        self
    }

    pub fn with_pipeline_layout(mut self, layout: vk::PipelineLayout) -> Self {
        self.pipeline_layout = Some(layout);
        self
    }

    pub fn with_vertex_input(mut self, description: VertexInputDescription) -> Self {
        self.vertex_input = description;
        self
    }

    pub fn with_input_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    pub fn with_cull_mode(
        mut self,
        cull_mode: vk::CullModeFlags,
        front_face: vk::FrontFace,
    ) -> Self {
        self.cull_mode = cull_mode;
        self.front_face = front_face;
        self
    }

    pub fn with_multisampling_disabled(mut self) -> Self {
        // 1 sample per pixel means no multisampling
        self.samples = vk::SampleCountFlags::TYPE_1;
        self
    }

    pub fn with_blending_disabled(mut self) -> Self {
        self.blend_mode = BlendMode::Disabled;
        self
    }

    // Make sure the transparent object is rendered AFTER the opaque ones
    pub fn with_alpha_blending_enabled(mut self) -> Self {
        self.blend_mode = BlendMode::Alpha;
        self
    }

    pub fn with_color_attachment_format(mut self, format: vk::Format) -> Self {
        self.color_attachment_format = format;
        self
    }

    pub fn with_depth_attachment_format(mut self, format: vk::Format) -> Self {
        self.depth_attachment_format = format;
        self
    }

    /// Enabling also turns on depth writes; `None` compares with LESS_OR_EQUAL
    pub fn with_depth_test(
        mut self,
        enable: bool,
        compare: Option<vk::CompareOp>,
    ) -> Self {
        self.depth_compare = if enable {
            Some(compare.unwrap_or(vk::CompareOp::LESS_OR_EQUAL))
        } else {
            None
        };
        self
    }

    pub fn input_assembly_state(&self) -> vk::PipelineInputAssemblyStateCreateInfo<'static> {
        vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology)
            .primitive_restart_enable(false)
    }

    pub fn rasterization_state(&self) -> vk::PipelineRasterizationStateCreateInfo<'static> {
        vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            // Discards all primitives before rasterization stage if true
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            // No depth bias
            .depth_bias_enable(false)
    }

    pub fn multisample_state(&self) -> vk::PipelineMultisampleStateCreateInfo<'static> {
        vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(self.samples)
            .min_sample_shading(1.0)
            .alpha_to_coverage_enable(false)
            .alpha_to_one_enable(false)
    }

    pub fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        let attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        match self.blend_mode {
            BlendMode::Disabled => attachment.blend_enable(false),
            BlendMode::Alpha => attachment
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD),
        }
    }

    pub fn depth_stencil_state(&self) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        let state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);
        match self.depth_compare {
            Some(compare) => state
                .depth_test_enable(true)
                .depth_write_enable(true)
                .depth_compare_op(compare),
            None => state
                .depth_test_enable(false)
                .depth_write_enable(false)
                .depth_compare_op(vk::CompareOp::NEVER),
        }
    }

    /// Checks every required piece of state is present
    pub fn validate(&self) -> Result<(vk::ShaderModule, vk::ShaderModule, vk::PipelineLayout)> {
        let vertex = self
            .vertex_shader
            .ok_or_eyre("No vertex shader provided for GraphicsPipelineBuilder")?;
        let fragment = self
            .fragment_shader
            .ok_or_eyre("No fragment shader provided for GraphicsPipelineBuilder")?;
        let layout = self.pipeline_layout.ok_or_eyre(
            "No pipeline layout provided for GraphicsPipelineBuilder",
        )?;
        if self.color_attachment_format == vk::Format::UNDEFINED {
            return Err(eyre!("No color attachment format provided for GraphicsPipelineBuilder"));
        }
        if self.depth_compare.is_some() && self.depth_attachment_format == vk::Format::UNDEFINED {
            return Err(eyre!("Depth test enabled without a depth attachment format"));
        }
        Ok((vertex, fragment, layout))
    }

    pub fn build(&self, device: &ash::Device) -> Result<vk::Pipeline> {
        let (vertex, fragment, pipeline_layout) = self.validate()?;

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex)
                .name(SHADER_ENTRY_POINT),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment)
                .name(SHADER_ENTRY_POINT),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_attribute_descriptions(&self.vertex_input.attributes)
            .vertex_binding_descriptions(&self.vertex_input.bindings)
            .flags(self.vertex_input.flags);
        let input_assembly = self.input_assembly_state();
        let rasterization = self.rasterization_state();
        let multisample = self.multisample_state();
        let depth_stencil = self.depth_stencil_state();

        // Viewport and scissor are dynamic, only the counts are fixed here
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let color_blend_attachments = [self.color_blend_attachment()];
        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);

        let dynamic_states =
            [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_info = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&dynamic_states);

        // Dynamic rendering: attachment formats stand in for a render pass
        let color_formats = [self.color_attachment_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(self.depth_attachment_format);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .push_next(&mut rendering_info)
            .stages(&shader_stages)
            .layout(pipeline_layout)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&depth_stencil)
            .dynamic_state(&dynamic_info);

        let pipelines = unsafe {
            device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info],
                None,
            )
        }
        .map_err(|(_, err)| {
            log::error!("Failed to create graphics pipeline: {}", err);
            eyre!("Failed to create graphics pipeline: {}", err)
        })?;

        pipelines
            .into_iter()
            .next()
            .ok_or_eyre("Driver returned no graphics pipeline")
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComputePipelineBuilder {
    shader: Option<vk::ShaderModule>,
    pipeline_layout: Option<vk::PipelineLayout>,
}

impl ComputePipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shader(mut self, shader: vk::ShaderModule) -> Self {
        self.shader = Some(shader);
        self
    }

    pub fn with_pipeline_layout(mut self, layout: vk::PipelineLayout) -> Self {
        self.pipeline_layout = Some(layout);
        self
    }

    pub fn build(&self, device: &ash::Device) -> Result<vk::Pipeline> {
        let shader = self
            .shader
            .ok_or_eyre("No shader provided for ComputePipelineBuilder")?;
        let pipeline_layout = self.pipeline_layout.ok_or_eyre(
            "No pipeline layout provided for ComputePipelineBuilder",
        )?;

        let stage_info = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader)
            .name(SHADER_ENTRY_POINT);

        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .layout(pipeline_layout)
            .stage(stage_info);
        let pipelines = unsafe {
            device.create_compute_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info],
                None,
            )
        }
        .map_err(|(_, err)| {
            log::error!("Failed to create compute pipeline: {}", err);
            eyre!("Failed to create compute pipeline: {}", err)
        })?;

        pipelines
            .into_iter()
            .next()
            .ok_or_eyre("Driver returned no compute pipeline")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn complete_builder() -> GraphicsPipelineBuilder {
        GraphicsPipelineBuilder::new()
            .with_shaders(vk::ShaderModule::from_raw(1), vk::ShaderModule::from_raw(2))
            .with_pipeline_layout(vk::PipelineLayout::from_raw(3))
            .with_color_attachment_format(vk::Format::R16G16B16A16_SFLOAT)
            .with_depth_attachment_format(vk::Format::D32_SFLOAT)
    }

    #[test]
    fn depth_test_with_less_or_equal() {
        let builder = complete_builder()
            .with_depth_test(true, Some(vk::CompareOp::LESS_OR_EQUAL));
        let state = builder.depth_stencil_state();
        assert_eq!(state.depth_test_enable, vk::TRUE);
        assert_eq!(state.depth_write_enable, vk::TRUE);
        assert_eq!(state.depth_compare_op, vk::CompareOp::LESS_OR_EQUAL);
    }

    #[test]
    fn depth_test_disabled_turns_off_writes() {
        let state = complete_builder()
            .with_depth_test(false, Some(vk::CompareOp::LESS))
            .depth_stencil_state();
        assert_eq!(state.depth_test_enable, vk::FALSE);
        assert_eq!(state.depth_write_enable, vk::FALSE);
    }

    #[test]
    fn missing_shaders_fail_validation() {
        let builder = GraphicsPipelineBuilder::new()
            .with_pipeline_layout(vk::PipelineLayout::from_raw(3))
            .with_color_attachment_format(vk::Format::B8G8R8A8_SRGB);
        assert!(builder.validate().is_err());
        assert!(complete_builder().validate().is_ok());
    }

    #[test]
    fn depth_test_needs_a_depth_format() {
        let builder = complete_builder()
            .with_depth_attachment_format(vk::Format::UNDEFINED)
            .with_depth_test(true, None);
        assert!(builder.validate().is_err());
    }

    #[test]
    fn variants_do_not_leak_into_the_base() {
        let base = complete_builder().with_blending_disabled();
        let blended = base.clone().with_alpha_blending_enabled();
        assert_eq!(base.color_blend_attachment().blend_enable, vk::FALSE);
        assert_eq!(blended.color_blend_attachment().blend_enable, vk::TRUE);
    }

    #[test]
    fn clear_resets_everything() {
        let mut builder = complete_builder()
            .with_polygon_mode(vk::PolygonMode::LINE)
            .with_depth_test(true, None);
        builder.clear();
        assert!(builder.validate().is_err());
        assert_eq!(builder.rasterization_state().polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(builder.depth_stencil_state().depth_test_enable, vk::FALSE);
    }

    #[test]
    fn rasterization_reflects_cull_settings() {
        let state = complete_builder()
            .with_cull_mode(vk::CullModeFlags::BACK, vk::FrontFace::COUNTER_CLOCKWISE)
            .with_multisampling_disabled()
            .rasterization_state();
        assert_eq!(state.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(state.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
    }
}
