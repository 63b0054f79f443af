pub mod camera;
pub mod config;
pub mod overlay;
pub mod util;

mod contexts;
mod deletion_queue;
mod draw;
mod internals;
mod offscreen;
mod registry;
mod resources;
mod scene;
mod shader_data;

#[cfg(test)]
mod mock;

use std::mem::ManuallyDrop;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use glam::{Mat4, Vec3, Vec4};
use crate::renderer::camera::Camera;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::frame_ctx::{FrameRing, FRAME_FENCE_TIMEOUT_NS, FRAME_OVERLAP};
use crate::renderer::contexts::frame_ctx::frame::Frame;
use crate::renderer::contexts::pipeline_ctx::{RenderPipelineContext, DEFAULT_MATERIAL, TEXTURED_MATERIAL};
use crate::renderer::contexts::resource_ctx::RenderResourceContext;
use crate::renderer::contexts::resource_ctx::descriptor_allocator::{DescriptorAllocator, PoolSizeRatio};
use crate::renderer::draw::{plan_draws, DrawCommand};
use crate::renderer::internals::barrier::copy_image_to_image;
use crate::renderer::offscreen::{draw_extent, DrawTargets};
use crate::renderer::overlay::{NullOverlay, OverlayInitInfo, UiOverlay};
use crate::renderer::resources::image::ImageTransition;
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::scene::Scene;
use crate::renderer::shader_data::{GpuSceneData, MeshPushConstants};
use crate::renderer::util::dispatch_group_count;

const COMPUTE_GROUP_SIZE: u32 = 16;

const UI_POOL_MAX_SETS: u32 = 1000;

const UI_POOL_RATIOS: [PoolSizeRatio; 11] = [
    PoolSizeRatio::new(vk::DescriptorType::SAMPLER, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::SAMPLED_IMAGE, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::UNIFORM_TEXEL_BUFFER, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_TEXEL_BUFFER, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, 1.0),
    PoolSizeRatio::new(vk::DescriptorType::INPUT_ATTACHMENT, 1.0),
];

/// Copyable handles of the frame being recorded
struct FrameHandles {
    cmd: vk::CommandBuffer,
    global_set: vk::DescriptorSet,
    object_set: vk::DescriptorSet,
    present_semaphore: vk::Semaphore,
    render_semaphore: vk::Semaphore,
    render_fence: vk::Fence,
}

/// Composition root of the engine. Owns every context; dropping it shuts the GPU side down.
///
/// Fields wrapped in `ManuallyDrop` are released explicitly in `Drop`, before `dev`.
pub struct Renderer {
    frames: ManuallyDrop<FrameRing<Frame>>,
    targets: ManuallyDrop<DrawTargets>,
    ui_pool: ManuallyDrop<DescriptorAllocator>,
    pip: RenderPipelineContext,
    res: ManuallyDrop<RenderResourceContext>,
    overlay: Box<dyn UiOverlay>,
    scene: Scene,
    dev: RenderDeviceContext,

    resize_requested: bool,
}

impl Renderer {
    pub fn new(
        window: Arc<winit::window::Window>,
        config: &RenderConfig,
        mut overlay: Box<dyn UiOverlay>,
    ) -> Result<Self> {
        let dev = RenderDeviceContext::new(window, config)?;
        let mut res = RenderResourceContext::new(&dev.device)?;

        let parts = match Self::create_parts(&dev, &mut res, config) {
            Ok(parts) => parts,
            Err(err) => {
                res.destroy(&dev.device);
                return Err(err);
            }
        };
        let (pip, targets, frames, ui_pool) = parts;

        let mut renderer = Self {
            frames: ManuallyDrop::new(frames),
            targets: ManuallyDrop::new(targets),
            ui_pool: ManuallyDrop::new(ui_pool),
            pip,
            res: ManuallyDrop::new(res),
            overlay: Box::new(NullOverlay),
            scene: Scene::new(config.max_objects),
            dev,
            resize_requested: false,
        };

        // From here on `Drop` cleans up after any failure
        overlay.init(&OverlayInitInfo {
            descriptor_pool: renderer.ui_pool.pool(),
            color_format: renderer.dev.target.format(),
            image_count: renderer.dev.target.swapchain.images.len() as u32,
        })?;
        renderer.overlay = overlay;
        renderer.load_default_scene(config)?;
        log::info!("Renderer initialized with {} objects", renderer.scene.len());

        Ok(renderer)
    }

    fn create_parts(
        dev: &RenderDeviceContext,
        res: &mut RenderResourceContext,
        config: &RenderConfig,
    ) -> Result<(RenderPipelineContext, DrawTargets, FrameRing<Frame>, DescriptorAllocator)> {
        let draw_image_set = res.allocate_draw_image_set()?;
        let targets = DrawTargets::new(&dev.device, dev.target.extent(), draw_image_set)?;

        let rest = RenderPipelineContext::new(
            &dev.device,
            res,
            &config.shader_dir,
            targets.color_format(),
            targets.depth_format(),
        )
        .and_then(|pip| {
            let frames = Self::create_frames(dev, res, config.max_objects)?;
            let ui_pool = match DescriptorAllocator::init_pool(
                dev.device.logical.clone(),
                UI_POOL_MAX_SETS,
                &UI_POOL_RATIOS,
                vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
            ) {
                Ok(pool) => pool,
                Err(err) => {
                    for frame in frames.into_slots() {
                        frame.release(&dev.device);
                    }
                    return Err(err);
                }
            };
            Ok((pip, frames, ui_pool))
        });

        match rest {
            Ok((pip, frames, ui_pool)) => Ok((pip, targets, frames, ui_pool)),
            Err(err) => {
                targets.destroy(&dev.device);
                Err(err)
            }
        }
    }

    fn create_frames(
        dev: &RenderDeviceContext,
        res: &mut RenderResourceContext,
        max_objects: usize,
    ) -> Result<FrameRing<Frame>> {
        let mut frames = Vec::with_capacity(FRAME_OVERLAP);
        for _ in 0..FRAME_OVERLAP {
            match Frame::new(&dev.device, res, max_objects) {
                Ok(frame) => frames.push(frame),
                Err(err) => {
                    for frame in frames {
                        frame.release(&dev.device);
                    }
                    return Err(err);
                }
            }
        }
        FrameRing::new(frames)
    }

    /// Monkey, a floor of triangles and a textured quad. Missing asset files only drop their objects;
    /// upload failures are fatal.
    fn load_default_scene(&mut self, config: &RenderConfig) -> Result<()> {
        let dev = &self.dev.device;

        self.res.upload_mesh(dev, "triangle", Mesh::new_triangle())?;
        self.res.upload_mesh(dev, "quad", Mesh::new_quad())?;

        let monkey_path = config.asset_dir.join("monkey_smooth.obj");
        if self.res.load_mesh(dev, "monkey", &monkey_path)?.is_some() {
            self.scene.add_object(
                &self.res.meshes,
                &self.pip.materials,
                "monkey",
                DEFAULT_MATERIAL,
                Mat4::from_translation(Vec3::new(-5.0, 0.0, 0.0)),
            )?;
        }

        let texture_path = config.asset_dir.join("texture.png");
        if let Some(texture) = self.res.load_texture(dev, "texture", &texture_path)? {
            let texture_set = self.res.allocate_texture_set(&dev.logical, texture)?;
            self.pip.add_textured_material(texture_set);
            self.scene.add_object(
                &self.res.meshes,
                &self.pip.materials,
                "quad",
                TEXTURED_MATERIAL,
                Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)),
            )?;
        }

        for x in -20..=20 {
            for y in -20..=20 {
                let transform = Mat4::from_translation(Vec3::new(x as f32, -10.0, y as f32))
                    * Mat4::from_axis_angle(Vec3::X, 90f32.to_radians())
                    * Mat4::from_scale(Vec3::splat(0.4));
                self.scene.add_object(
                    &self.res.meshes,
                    &self.pip.materials,
                    "triangle",
                    DEFAULT_MATERIAL,
                    transform,
                )?;
            }
        }

        self.scene.sort_by_binding();
        Ok(())
    }

    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    pub fn begin_ui_frame(&mut self) {
        self.overlay.begin_frame();
    }

    /// Cycles the background compute effect and returns the new one's name
    pub fn next_effect(&mut self) -> &str {
        self.pip.next_effect()
    }

    pub fn frame_number(&self) -> u64 {
        self.frames.frame_number()
    }

    fn resize(&mut self) -> Result<()> {
        let size = self.dev.target.window.inner_size();
        if size.width == 0 || size.height == 0 {
            // Minimized, retry once the window has a size again
            return Ok(());
        }

        self.frames.wait_all(FRAME_FENCE_TIMEOUT_NS)?;
        self.dev.resize()?;
        self.targets.recreate(&self.dev.device, self.dev.target.extent())?;
        self.resize_requested = false;
        Ok(())
    }

    pub fn draw(&mut self, camera: &Camera) -> Result<()> {
        if self.resize_requested {
            self.resize()?;
            if self.resize_requested {
                return Ok(());
            }
        }

        let device = self.dev.device.logical.clone();
        let swapchain_extent = self.dev.target.extent();
        let aspect_ratio = swapchain_extent.width as f32 / swapchain_extent.height.max(1) as f32;

        // Waiting on the fence is what makes overwriting this frame's mapped buffers safe
        let dev = &self.dev.device;
        let frame_index = self.frames.wait_for_current(FRAME_FENCE_TIMEOUT_NS, |frame| {
            frame.deletion_queue.flush_with(dev);
            Ok(())
        })?;

        let present_semaphore = self.frames.current()?.present_semaphore;
        let Some(image_index) = self.dev.target.swapchain.acquire_next_image(present_semaphore)? else {
            // The fence is still signaled, so this frame slot can simply be retried
            self.resize_requested = true;
            return Ok(());
        };

        let frame_number = self.frames.frame_number();
        let frame = self.frames.begin_recording()?;
        frame.write_frame_data(dev, &camera.gpu_data(aspect_ratio), &self.scene.object_data())?;
        let handles = FrameHandles {
            cmd: frame.command_buffer,
            global_set: frame.global_descriptor,
            object_set: frame.object_descriptor,
            present_semaphore: frame.present_semaphore,
            render_semaphore: frame.render_semaphore,
            render_fence: frame.render_fence.handle,
        };
        self.res.write_scene_data(&self.dev.device, frame_index, &GpuSceneData::animated(frame_number))?;

        unsafe {
            device.reset_command_buffer(handles.cmd, vk::CommandBufferResetFlags::empty())?;
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(handles.cmd, &begin_info)?;
        }
        self.record_frame(&device, &handles, image_index, frame_index)?;
        unsafe {
            device.end_command_buffer(handles.cmd)?;
        }

        self.submit(&device, &handles)?;
        self.frames.mark_submitted()?;

        let needs_rebuild = self.dev.target.swapchain.present(
            self.dev.device.graphics_queue.handle,
            handles.render_semaphore,
            image_index,
        )?;
        if needs_rebuild {
            self.resize_requested = true;
        }

        self.frames.advance();
        Ok(())
    }

    fn submit(&self, device: &ash::Device, handles: &FrameHandles) -> Result<()> {
        let cmd_infos = [vk::CommandBufferSubmitInfo::default()
            .command_buffer(handles.cmd)];
        // The swapchain image is first written by the blit, but waiting at colour output covers it
        let wait_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(handles.present_semaphore)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags2::BLIT)
            .value(1)];
        let signal_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(handles.render_semaphore)
            .stage_mask(vk::PipelineStageFlags2::ALL_GRAPHICS)
            .value(1)];
        let submit_info = vk::SubmitInfo2::default()
            .command_buffer_infos(&cmd_infos)
            .wait_semaphore_infos(&wait_infos)
            .signal_semaphore_infos(&signal_infos);

        unsafe {
            device.queue_submit2(
                self.dev.device.graphics_queue.handle,
                &[submit_info],
                handles.render_fence,
            )?;
        }
        Ok(())
    }

    fn record_frame(
        &mut self,
        device: &ash::Device,
        handles: &FrameHandles,
        image_index: u32,
        frame_index: usize,
    ) -> Result<()> {
        let cmd = handles.cmd;
        let swapchain_extent = self.dev.target.extent();
        let render_extent = draw_extent(self.targets.color.extent_2d(), swapchain_extent);

        // Background: the previous frame's contents are overwritten entirely
        self.targets.color.discard_contents();
        self.targets.color.record_transition(device, cmd, vk::ImageLayout::GENERAL);
        self.record_background(device, cmd, render_extent)?;

        self.targets.color.record_transition(device, cmd, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        self.targets.depth.discard_contents();
        self.targets.depth.record_transition(device, cmd, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        self.record_geometry(device, handles, render_extent, frame_index)?;

        // Blit the draw image onto the swapchain image
        self.targets.color.record_transition(device, cmd, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        let swapchain_image = self.dev.target.swapchain.image_mut(image_index)?;
        swapchain_image.discard_contents();
        record(swapchain_image.transition(vk::ImageLayout::TRANSFER_DST_OPTIMAL), device, cmd);
        copy_image_to_image(
            cmd,
            self.targets.color.image,
            swapchain_image.image,
            render_extent,
            swapchain_extent,
            device,
        );

        // UI straight onto the swapchain image
        record(swapchain_image.transition(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL), device, cmd);
        let swapchain_view = swapchain_image.view;
        self.record_overlay(device, cmd, swapchain_view, swapchain_extent)?;

        let swapchain_image = self.dev.target.swapchain.image_mut(image_index)?;
        record(swapchain_image.transition(vk::ImageLayout::PRESENT_SRC_KHR), device, cmd);
        Ok(())
    }

    fn record_background(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        extent: vk::Extent2D,
    ) -> Result<()> {
        let effect = self.pip.current_effect()?;
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, effect.pipeline);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                effect.layout,
                0,
                &[self.targets.color_set],
                &[],
            );
            device.cmd_push_constants(
                cmd,
                effect.layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                bytemuck::bytes_of(&effect.data),
            );
            device.cmd_dispatch(
                cmd,
                dispatch_group_count(extent.width, COMPUTE_GROUP_SIZE),
                dispatch_group_count(extent.height, COMPUTE_GROUP_SIZE),
                1,
            );
        }
        Ok(())
    }

    fn record_geometry(
        &self,
        device: &ash::Device,
        handles: &FrameHandles,
        extent: vk::Extent2D,
        frame_index: usize,
    ) -> Result<()> {
        let cmd = handles.cmd;
        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(self.targets.color.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE)];
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.targets.depth.view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            });
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        let commands = plan_draws(self.scene.objects(), &self.res.meshes)?;
        let scene_offset = self.res.scene_offset(frame_index);
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };

        unsafe {
            device.cmd_begin_rendering(cmd, &rendering_info);
        }

        let mut bound_layout = None;
        for command in commands {
            match command {
                DrawCommand::BindMaterial(handle) => {
                    let material = self
                        .pip
                        .materials
                        .get(handle)
                        .ok_or_else(|| eyre!("Material {:?} is not registered", handle))?;
                    unsafe {
                        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, material.pipeline);
                        device.cmd_set_viewport(cmd, 0, &[viewport]);
                        device.cmd_set_scissor(cmd, 0, &[scissor]);
                        device.cmd_bind_descriptor_sets(
                            cmd,
                            vk::PipelineBindPoint::GRAPHICS,
                            material.pipeline_layout,
                            0,
                            &[handles.global_set, handles.object_set],
                            &[scene_offset],
                        );
                        if let Some(texture_set) = material.texture_set {
                            device.cmd_bind_descriptor_sets(
                                cmd,
                                vk::PipelineBindPoint::GRAPHICS,
                                material.pipeline_layout,
                                2,
                                &[texture_set],
                                &[],
                            );
                        }
                    }
                    bound_layout = Some(material.pipeline_layout);
                }
                DrawCommand::BindMesh { buffer, .. } => unsafe {
                    device.cmd_bind_vertex_buffers(cmd, 0, &[buffer.buffer], &[0]);
                },
                DrawCommand::PushConstants { model } => {
                    let layout = bound_layout
                        .ok_or_else(|| eyre!("Push constants recorded before any material was bound"))?;
                    let constants = MeshPushConstants {
                        data: Vec4::ZERO,
                        render_matrix: model,
                    };
                    unsafe {
                        device.cmd_push_constants(
                            cmd,
                            layout,
                            vk::ShaderStageFlags::VERTEX,
                            0,
                            bytemuck::bytes_of(&constants),
                        );
                    }
                }
                DrawCommand::Draw { vertex_count, first_instance } => unsafe {
                    device.cmd_draw(cmd, vertex_count, 1, 0, first_instance);
                },
            }
        }

        unsafe {
            device.cmd_end_rendering(cmd);
        }
        Ok(())
    }

    fn record_overlay(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        target_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> Result<()> {
        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(target_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE)];
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .layer_count(1)
            .color_attachments(&color_attachments);

        unsafe {
            device.cmd_begin_rendering(cmd, &rendering_info);
        }
        let recorded = self.overlay.record(device, cmd, target_view, extent);
        unsafe {
            device.cmd_end_rendering(cmd);
        }
        recorded
    }
}

fn record(transition: Option<ImageTransition>, device: &ash::Device, cmd: vk::CommandBuffer) {
    if let Some(transition) = transition {
        transition.record(device, cmd);
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(err) = self.frames.wait_all(FRAME_FENCE_TIMEOUT_NS) {
            log::error!("Failed to wait for in-flight frames: {}", err);
        }
        if let Err(err) = self.dev.device.wait_idle() {
            log::error!("Failed to wait for device idle: {}", err);
        }

        let dev = &self.dev.device;
        // SAFETY: each field is taken exactly once and never touched again
        let (frames, targets, ui_pool, res) = unsafe {
            (
                ManuallyDrop::take(&mut self.frames),
                ManuallyDrop::take(&mut self.targets),
                ManuallyDrop::take(&mut self.ui_pool),
                ManuallyDrop::take(&mut self.res),
            )
        };
        for frame in frames.into_slots() {
            frame.release(dev);
        }
        targets.destroy(dev);
        ui_pool.destroy_pool();
        res.destroy(dev);
        log::info!("Renderer shut down");
        // `dev` drops next: swapchain, surface, allocator, device, messenger, instance
    }
}
