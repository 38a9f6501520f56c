//! Frame orchestration.
//!
//! One renderer instance owns the whole Vulkan side of the demo. Per frame:
//! acquire a swapchain image, wait out that slot's fence, refresh constants
//! and descriptors, record the clear/skybox and window-pass command buffers
//! on the calling thread while the worker pool records the particle shards,
//! then push everything to the queue in a single batched submission.

use crate::config::DemoConfig;
use crate::foundation::time::FrameClock;
use crate::overlay::{
    self, append_text, FontAtlas, SampleRing, GRAPH_SAMPLES, MAX_TEXT_VERTICES,
};
use crate::overlay::graph::{GRAPH_VERTEX_COUNT, GRAPH_WIDTH};
use crate::render::frame::{create_slots, FrameConstants, FrameSlot, FRAME_BUFFERING};
use crate::render::vulkan::buffer::HostBuffer;
use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::descriptors::{DescriptorArena, FrameBindings, Samplers};
use crate::render::vulkan::pipeline::{
    CommonLayout, Framebuffer, PipelineSet, RenderPass, TARGET_FORMAT,
};
use crate::render::vulkan::swapchain::Swapchain;
use crate::render::vulkan::sync::Semaphore;
use crate::render::vulkan::texture::{FontTexture, RenderTargets, SceneBuffers, TextureSet};
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::render::{CpuLoadSource, FrameEvents};
use crate::sim::animation::AnimationState;
use crate::sim::camera::Camera;
use crate::sim::partition::PointPartition;
use crate::render::workers::{ShardContext, WorkerPool};
use ash::vk;
use std::path::Path;

/// Whether the frame loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Continue,
    Quit,
}

/// Fence wait budget per frame; blowing it means the GPU is wedged.
const FENCE_TIMEOUT_NS: u64 = 100_000_000;

const GRAPH_COLOR: [f32; 4] = [0.0, 0.85, 0.0, 1.0];
const GRAPH_VIEW_HEIGHT: u32 = 88;
const GRAPH_ROW_STRIDE: u32 = 92;

const FONT_FILE: &str = "Font_Mono.ttf";
const FONT_PX: f32 = 24.0;

/// The demo renderer. Field order doubles as reverse teardown order; the
/// context must stay declared last so the device outlives everything bound
/// to it.
pub struct StardustRenderer {
    config: DemoConfig,
    clock: FrameClock,
    animation: AnimationState,
    camera: Camera,
    graphs: Vec<SampleRing>,
    frame_index: u64,

    workers: WorkerPool,
    slots: Vec<FrameSlot>,
    /// graph_buffers[graph][slot].
    graph_buffers: Vec<Vec<HostBuffer>>,
    descriptors: DescriptorArena,
    pipelines: PipelineSet,
    window_framebuffers: Vec<Framebuffer>,
    accum_framebuffer: Framebuffer,
    window_pass: RenderPass,
    accum_pass: RenderPass,
    font_texture: FontTexture,
    font_atlas: FontAtlas,
    textures: TextureSet,
    targets: RenderTargets,
    scene: SceneBuffers,
    samplers: Samplers,
    layout: CommonLayout,
    cmds: CommandPool,
    swapchain: Swapchain,
    ctx: VulkanContext,
}

impl StardustRenderer {
    pub fn new(ctx: VulkanContext, config: DemoConfig) -> VulkanResult<Self> {
        config
            .validate()
            .map_err(|reason| VulkanError::InvalidOperation { reason })?;

        let swapchain = Swapchain::new(&ctx, FRAME_BUFFERING as u32, config.width, config.height)?;
        // The surface may grant a different depth than requested; every
        // per-slot resource below is sized from the granted count.
        let slot_count = swapchain.image_count();
        let extent = swapchain.extent();

        let cmds = CommandPool::new(ctx.device().clone(), ctx.queue_family_index())?;
        let samplers = Samplers::new(&ctx)?;
        let layout = CommonLayout::new(&ctx)?;

        let accum_pass = RenderPass::new(&ctx, TARGET_FORMAT)?;
        let window_pass = RenderPass::new(&ctx, swapchain.format())?;

        let targets = RenderTargets::new(&ctx, extent.width, extent.height)?;
        let accum_framebuffer = Framebuffer::new(
            &ctx,
            &accum_pass,
            targets.accum_view,
            targets.depth_view,
            extent.width,
            extent.height,
        )?;
        let mut window_framebuffers = Vec::with_capacity(slot_count);
        for i in 0..slot_count {
            window_framebuffers.push(Framebuffer::new(
                &ctx,
                &window_pass,
                swapchain.view(i),
                targets.depth_view,
                extent.width,
                extent.height,
            )?);
        }

        let pipelines = PipelineSet::new(
            &ctx,
            &layout,
            &accum_pass,
            &window_pass,
            extent,
            Path::new(&config.shader_dir),
        )?;

        let asset_dir = Path::new(&config.asset_dir);
        let textures = TextureSet::new(&ctx, &cmds, asset_dir)?;
        let font_atlas = FontAtlas::from_file(asset_dir.join(FONT_FILE), FONT_PX)
            .map_err(|e| VulkanError::InitializationFailed(format!("font atlas: {e}")))?;
        let font_texture = FontTexture::new(&ctx, &cmds, &font_atlas)?;

        let scene = SceneBuffers::new(&ctx, config.point_count, config.seed)?;

        let descriptors = DescriptorArena::new(&ctx, &layout, slot_count as u32)?;
        let slots = create_slots(&ctx, &cmds, slot_count)?;

        let available = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        let cores = config.core_count(available) as u32;
        let partition = PointPartition::new(config.point_count, config.batch_size, cores);

        let graphs = vec![SampleRing::new(); cores as usize];
        let mut graph_buffers = Vec::with_capacity(cores as usize);
        for _ in 0..cores {
            let mut per_slot = Vec::with_capacity(slot_count);
            for _ in 0..slot_count {
                per_slot.push(HostBuffer::new(
                    &ctx,
                    (GRAPH_VERTEX_COUNT * std::mem::size_of::<overlay::GraphVertex>())
                        as vk::DeviceSize,
                    vk::BufferUsageFlags::VERTEX_BUFFER,
                )?);
            }
            graph_buffers.push(per_slot);
        }

        let shard_ctx = ShardContext {
            device: ctx.device().clone(),
            render_pass: accum_pass.handle(),
            framebuffer: accum_framebuffer.handle(),
            pipeline: pipelines.particle,
            pipeline_layout: layout.pipeline_layout(),
            descriptor_sets: (0..slot_count).map(|i| descriptors.set(i)).collect(),
            seed_buffer: scene.seed_buffer,
            extent,
            partition,
        };
        let workers = WorkerPool::new(&ctx, shard_ctx, slot_count)?;

        log::info!(
            "Renderer up: {} points, {} batch, {} cores, {}x{} on {}",
            config.point_count,
            config.batch_size,
            cores,
            extent.width,
            extent.height,
            ctx.device_name()
        );

        let animation = AnimationState::new(config.seed);
        Ok(Self {
            config,
            clock: FrameClock::new(),
            animation,
            camera: Camera::new(),
            graphs,
            frame_index: 0,
            workers,
            slots,
            graph_buffers,
            descriptors,
            pipelines,
            window_framebuffers,
            accum_framebuffer,
            window_pass,
            accum_pass,
            font_texture,
            font_atlas,
            textures,
            targets,
            scene,
            samplers,
            layout,
            cmds,
            swapchain,
            ctx,
        })
    }

    pub fn device_name(&self) -> &str {
        self.ctx.device_name()
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    /// Run one frame. Returns [`RunState::Quit`] when the host asked to
    /// stop; any Vulkan failure aborts the loop through the error path.
    pub fn render_frame(
        &mut self,
        events: FrameEvents,
        cpu: &mut dyn CpuLoadSource,
    ) -> VulkanResult<RunState> {
        if events.quit {
            return Ok(RunState::Quit);
        }
        if events.toggle_animation {
            self.animation.toggle_animation();
        }

        // One fresh semaphore per frame chains the acquire into the frame's
        // submission; it is parked in the slot below until the slot cycles.
        let acquire = Semaphore::new(self.ctx.device().clone())?;
        let win_idx = self.swapchain.acquire(acquire.handle())? as usize;
        // Resource slots ride the image index, so image acquisition is the
        // only place frames can pile up.
        let res_idx = win_idx;

        self.slots[res_idx].fence.wait(FENCE_TIMEOUT_NS)?;
        self.slots[res_idx].fence.reset()?;
        // The fence also proves the submission holding the slot's previous
        // acquire semaphore retired, so this swap is the safe place to
        // destroy it.
        let acquire_handle = acquire.handle();
        self.slots[res_idx].acquire = Some(acquire);

        let window_rolled = self.clock.tick();
        self.animation.update(self.clock.delta_time());

        self.update_frame_data(res_idx)?;
        let glyph_count = self.update_overlay_data(res_idx)?;

        self.record_clear_and_skybox(res_idx)?;
        let particle_cmds = self.workers.record_frame(res_idx)?;
        self.record_window_pass(res_idx, win_idx, glyph_count)?;

        let mut command_buffers = Vec::with_capacity(particle_cmds.len() + 2);
        command_buffers.push(self.slots[res_idx].clear_cmd);
        command_buffers.extend(particle_cmds);
        command_buffers.push(self.slots[res_idx].display_cmd);

        let wait_semaphores = [acquire_handle];
        let wait_stages = [vk::PipelineStageFlags::TOP_OF_PIPE];
        let submit = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .build();
        unsafe {
            self.ctx
                .device()
                .queue_submit(
                    self.ctx.queue(),
                    &[submit],
                    self.slots[res_idx].fence.handle(),
                )
                .map_err(VulkanError::Api)?;
        }

        self.swapchain.present(self.ctx.queue(), win_idx as u32)?;
        self.frame_index += 1;

        if window_rolled {
            let stats = self.clock.stats();
            log::debug!("{:.1} fps ({:.3} ms)", stats.fps(), stats.frame_ms());
            self.sample_cpu_loads(cpu);
        }

        Ok(RunState::Continue)
    }

    /// Refresh the slot's constants buffer and rewrite its descriptor set.
    fn update_frame_data(&mut self, res_idx: usize) -> VulkanResult<()> {
        let extent = self.swapchain.extent();
        let view_proj =
            self.camera
                .view_proj(self.clock.total_time(), extent.width, extent.height);
        let constants = FrameConstants::new(
            &view_proj,
            self.animation.seed(),
            self.animation.eased_transform_time(),
            self.animation.eased_palette_factor(),
        );
        self.slots[res_idx].constants.write_pod(&constants)?;

        let (palette_a, palette_b) = self.animation.palette_pair();
        self.descriptors.write_frame(
            res_idx,
            &FrameBindings {
                constants: self.slots[res_idx].constants.handle(),
                accum_view: self.targets.accum_view,
                skybox_view: self.textures.skybox_view,
                palette_views: (
                    self.textures.palette_views[palette_a],
                    self.textures.palette_views[palette_b],
                ),
                font_view: self.font_texture.view,
                skybox_geometry: self.scene.skybox_geometry,
                samplers: &self.samplers,
            },
        );
        Ok(())
    }

    /// Rewrite the overlay vertex buffers for this slot. Returns the glyph
    /// count for the text draw.
    fn update_overlay_data(&mut self, res_idx: usize) -> VulkanResult<usize> {
        let extent = self.swapchain.extent();
        let cursor = self.graphs.first().map_or(0, SampleRing::cursor);
        self.slots[res_idx]
            .graph_common
            .write_slice(&overlay::graph::common_vertices(cursor))?;
        for (graph, buffers) in self.graphs.iter().zip(&self.graph_buffers) {
            buffers[res_idx].write_slice(&graph.vertices(GRAPH_COLOR))?;
        }

        let stats = self.clock.stats();
        let fps_line = format!("FPS {:.1} ({:.3} ms)", stats.fps(), stats.frame_ms());
        let metrics = self.font_atlas.metrics();
        let mut verts = Vec::with_capacity(MAX_TEXT_VERTICES);
        let w = extent.width;
        let h = extent.height;
        append_text(
            &mut verts,
            metrics,
            "CPU Load",
            w as i32 - 210,
            10,
            w,
            h,
        );
        append_text(&mut verts, metrics, &fps_line, 10, h as i32 - 90, w, h);
        append_text(&mut verts, metrics, "Stardust", 10, h as i32 - 60, w, h);
        let device_name = self.ctx.device_name().to_string();
        append_text(&mut verts, metrics, &device_name, 10, h as i32 - 30, w, h);

        self.slots[res_idx].text_vertices.write_slice(&verts)?;
        Ok(verts.len() / 4)
    }

    /// Record the frame's first command buffer: first-use layout moves,
    /// target clears, skybox generation, and the skybox draw.
    fn record_clear_and_skybox(&mut self, res_idx: usize) -> VulkanResult<()> {
        let device = self.ctx.device().clone();
        let cmd = self.slots[res_idx].clear_cmd;
        let extent = self.swapchain.extent();
        self.cmds.begin(cmd)?;

        unsafe {
            // Everything renders in GENERAL; move the freshly created images
            // there once, on the first frame.
            if self.frame_index == 0 {
                for i in 0..self.swapchain.image_count() {
                    barrier_to_general(
                        &device,
                        cmd,
                        self.swapchain.image(i),
                        vk::ImageAspectFlags::COLOR,
                    );
                }
                barrier_to_general(
                    &device,
                    cmd,
                    self.targets.accum_image,
                    vk::ImageAspectFlags::COLOR,
                );
                barrier_to_general(
                    &device,
                    cmd,
                    self.targets.depth_image,
                    vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
                );
            }

            let color_range = [vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            }];
            let black = vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            };
            device.cmd_clear_color_image(
                cmd,
                self.swapchain.image(res_idx),
                vk::ImageLayout::GENERAL,
                &black,
                &color_range,
            );
            device.cmd_clear_color_image(
                cmd,
                self.targets.accum_image,
                vk::ImageLayout::GENERAL,
                &black,
                &color_range,
            );

            let ds_ranges = [
                vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::DEPTH,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::STENCIL,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
            ];
            device.cmd_clear_depth_stencil_image(
                cmd,
                self.targets.depth_image,
                vk::ImageLayout::GENERAL,
                &vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
                &ds_ranges,
            );

            // Regenerate the skybox geometry, then draw it into the cleared
            // accumulation target before the particle shards land on top.
            let dset = [self.descriptors.set(res_idx)];
            device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                self.pipelines.skybox_generate,
            );
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                self.layout.pipeline_layout(),
                0,
                &dset,
                &[],
            );
            device.cmd_dispatch(cmd, 1, 1, 1);
            let geometry_ready = vk::MemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                .dst_access_mask(vk::AccessFlags::VERTEX_ATTRIBUTE_READ)
                .build();
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::PipelineStageFlags::VERTEX_INPUT,
                vk::DependencyFlags::empty(),
                &[geometry_ready],
                &[],
                &[],
            );

            let clear_values = [vk::ClearValue::default(), vk::ClearValue::default()];
            let pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.accum_pass.handle())
                .framebuffer(self.accum_framebuffer.handle())
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);
            device.cmd_begin_render_pass(cmd, &pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipelines.skybox);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.layout.pipeline_layout(),
                0,
                &dset,
                &[],
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.scene.skybox_geometry], &[0]);
            device.cmd_draw(cmd, 14, 1, 0, 0);
            device.cmd_end_render_pass(cmd);
        }

        self.cmds.end(cmd)
    }

    /// Record the window pass: display quad, per-core graphs, text.
    fn record_window_pass(
        &mut self,
        res_idx: usize,
        win_idx: usize,
        glyph_count: usize,
    ) -> VulkanResult<()> {
        let device = self.ctx.device().clone();
        let cmd = self.slots[res_idx].display_cmd;
        let extent = self.swapchain.extent();
        self.cmds.begin(cmd)?;

        unsafe {
            let clear_values = [vk::ClearValue::default(), vk::ClearValue::default()];
            let pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.window_pass.handle())
                .framebuffer(self.window_framebuffers[win_idx].handle())
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);
            device.cmd_begin_render_pass(cmd, &pass_info, vk::SubpassContents::INLINE);

            let dset = [self.descriptors.set(res_idx)];
            let layout = self.layout.pipeline_layout();

            // Accumulated particle image onto the window.
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipelines.display);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &dset,
                &[],
            );
            device.cmd_draw(cmd, 4, 1, 0, 0);

            // One graph per core, stacked down the right edge.
            let full_scissor = [vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            }];
            let common = self.slots[res_idx].graph_common.handle();
            for (i, buffers) in self.graph_buffers.iter().enumerate() {
                let viewport = [vk::Viewport {
                    x: (extent.width - 10 - GRAPH_WIDTH) as f32,
                    y: (36 + i as u32 * GRAPH_ROW_STRIDE) as f32,
                    width: GRAPH_WIDTH as f32,
                    height: GRAPH_VIEW_HEIGHT as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                }];
                let per_graph = buffers[res_idx].handle();

                device.cmd_bind_pipeline(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipelines.graph_tri_strip,
                );
                device.cmd_set_viewport(cmd, 0, &viewport);
                device.cmd_set_scissor(cmd, 0, &full_scissor);
                device.cmd_bind_vertex_buffers(cmd, 0, &[common], &[0]);
                device.cmd_bind_vertex_buffers(cmd, 1, &[common], &[0]);
                device.cmd_draw(cmd, 4, 1, 0, 0);

                device.cmd_bind_pipeline(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipelines.graph_line_list,
                );
                device.cmd_draw(cmd, 38, 1, 4, 0);

                device.cmd_bind_pipeline(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipelines.graph_tri_strip,
                );
                device.cmd_bind_vertex_buffers(cmd, 0, &[per_graph], &[0]);
                device.cmd_bind_vertex_buffers(cmd, 1, &[per_graph], &[0]);
                device.cmd_draw(cmd, (GRAPH_SAMPLES * 2) as u32, 1, 0, 0);

                device.cmd_bind_pipeline(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipelines.graph_line_strip,
                );
                device.cmd_draw(cmd, GRAPH_SAMPLES as u32, 1, (GRAPH_SAMPLES * 2) as u32, 0);
            }

            // Text goes out one quad per glyph from the shared buffer.
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipelines.font);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &dset,
                &[],
            );
            let text = self.slots[res_idx].text_vertices.handle();
            device.cmd_bind_vertex_buffers(cmd, 0, &[text], &[0]);
            device.cmd_bind_vertex_buffers(cmd, 1, &[text], &[0]);
            for i in 0..glyph_count {
                device.cmd_draw(cmd, 4, 1, (i * 4) as u32, 0);
            }

            device.cmd_end_render_pass(cmd);
        }

        self.cmds.end(cmd)
    }

    /// Push the latest per-core loads into the graphs; called once per
    /// completed stats window.
    fn sample_cpu_loads(&mut self, cpu: &mut dyn CpuLoadSource) {
        let loads = cpu.sample();
        for (graph, load) in self.graphs.iter_mut().zip(loads) {
            graph.prime();
            graph.set_scale(1.0);
            graph.push(load / 100.0);
        }
    }
}

impl Drop for StardustRenderer {
    fn drop(&mut self) {
        self.ctx.wait_idle();
        log::info!("Renderer shut down after {} frames", self.frame_index);
    }
}

fn barrier_to_general(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
) {
    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::GENERAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .build();
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}
