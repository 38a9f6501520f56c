//! Render passes, the shared pipeline layout, and the fixed pipeline set.
//!
//! Every pass in the demo renders into images that live in the `GENERAL`
//! layout for their whole lifetime, so both render passes skip layout
//! transitions entirely and load with `DONT_CARE` (the clear pass wipes the
//! targets explicitly each frame). All pipelines share one descriptor set
//! layout and one pipeline layout.

use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::shader::ShaderModule;
use crate::render::vulkan::{VulkanError, VulkanResult};
use ash::{vk, Device};
use std::ffi::CStr;
use std::path::{Path, PathBuf};

/// Off-screen accumulation target format.
pub const TARGET_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
/// Depth-stencil format shared by both passes.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D24_UNORM_S8_UINT;

/// Descriptor bindings shared by every pipeline, all visible to all stages.
pub mod binding {
    /// Per-frame constants (view-projection, generator word, palette factor).
    pub const CONSTANTS: u32 = 0;
    /// Off-screen accumulation image.
    pub const ACCUM_IMAGE: u32 = 1;
    /// Procedural skybox cube map.
    pub const SKYBOX: u32 = 2;
    /// Current palette.
    pub const PALETTE_A: u32 = 3;
    /// Next palette, blended in by the eased cross-fade factor.
    pub const PALETTE_B: u32 = 4;
    /// Font atlas.
    pub const FONT: u32 = 5;
    /// Skybox geometry, written by the generator compute shader.
    pub const SKYBOX_GEOMETRY: u32 = 6;
}

/// Byte range of the constants storage buffer visible to shaders.
pub const CONSTANTS_RANGE: vk::DeviceSize = 260;
/// Byte range of the skybox geometry buffer (14 vec4 strip vertices).
pub const SKYBOX_GEOMETRY_RANGE: vk::DeviceSize = 14 * 16;

/// One render pass over a color target plus the shared depth-stencil.
pub struct RenderPass {
    device: Device,
    pass: vk::RenderPass,
}

impl RenderPass {
    pub fn new(ctx: &VulkanContext, color_format: vk::Format) -> VulkanResult<Self> {
        let attachments = [
            vk::AttachmentDescription::builder()
                .format(color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::DONT_CARE)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::GENERAL)
                .final_layout(vk::ImageLayout::GENERAL)
                .build(),
            vk::AttachmentDescription::builder()
                .format(DEPTH_FORMAT)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::DONT_CARE)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::STORE)
                .initial_layout(vk::ImageLayout::GENERAL)
                .final_layout(vk::ImageLayout::GENERAL)
                .build(),
        ];

        let color_ref = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::GENERAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::GENERAL,
        };
        let subpass = [vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_ref)
            .depth_stencil_attachment(&depth_ref)
            .build()];

        let create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(&subpass);
        let pass = unsafe {
            ctx.device()
                .create_render_pass(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self {
            device: ctx.device().clone(),
            pass,
        })
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.pass
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.pass, None);
        }
    }
}

/// RAII framebuffer over a color view plus the shared depth view.
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    pub fn new(
        ctx: &VulkanContext,
        pass: &RenderPass,
        color: vk::ImageView,
        depth: vk::ImageView,
        width: u32,
        height: u32,
    ) -> VulkanResult<Self> {
        let attachments = [color, depth];
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(pass.handle())
            .attachments(&attachments)
            .width(width)
            .height(height)
            .layers(1);
        let framebuffer = unsafe {
            ctx.device()
                .create_framebuffer(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self {
            device: ctx.device().clone(),
            framebuffer,
        })
    }

    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// The single descriptor set layout and pipeline layout every pipeline binds.
pub struct CommonLayout {
    device: Device,
    set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
}

impl CommonLayout {
    pub fn new(ctx: &VulkanContext) -> VulkanResult<Self> {
        let device = ctx.device().clone();

        let mut bindings = Vec::with_capacity(7);
        for index in [binding::CONSTANTS, binding::SKYBOX_GEOMETRY] {
            bindings.push(
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(index)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::ALL)
                    .build(),
            );
        }
        for index in [
            binding::ACCUM_IMAGE,
            binding::SKYBOX,
            binding::PALETTE_A,
            binding::PALETTE_B,
            binding::FONT,
        ] {
            bindings.push(
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(index)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::ALL)
                    .build(),
            );
        }

        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let set_layout = unsafe {
            device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let set_layouts = [set_layout];
        let pipeline_layout_info =
            vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let pipeline_layout = match unsafe {
            device.create_pipeline_layout(&pipeline_layout_info, None)
        } {
            Ok(layout) => layout,
            Err(e) => {
                unsafe { device.destroy_descriptor_set_layout(set_layout, None) };
                return Err(VulkanError::Api(e));
            }
        };

        Ok(Self {
            device,
            set_layout,
            pipeline_layout,
        })
    }

    pub fn set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }
}

impl Drop for CommonLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_pipeline_layout(self.pipeline_layout, None);
            self.device
                .destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}

/// Blend mode of a graphics pipeline.
#[derive(Clone, Copy)]
enum Blend {
    Opaque,
    /// src * ONE + dst * ONE.
    Additive,
    /// src * ONE + dst * (1 - src.a).
    PremultipliedAlpha,
}

/// Everything that varies between the demo's graphics pipelines.
struct GraphicsDesc<'a> {
    vertex_shader: &'a str,
    fragment_shader: &'a str,
    topology: vk::PrimitiveTopology,
    bindings: &'a [vk::VertexInputBindingDescription],
    attributes: &'a [vk::VertexInputAttributeDescription],
    blend: Blend,
    dynamic_viewport: bool,
    pass: vk::RenderPass,
}

/// All pipelines used by the demo, built once at startup.
pub struct PipelineSet {
    device: Device,
    pub particle: vk::Pipeline,
    pub skybox: vk::Pipeline,
    pub skybox_generate: vk::Pipeline,
    pub display: vk::Pipeline,
    pub graph_tri_strip: vk::Pipeline,
    pub graph_line_strip: vk::Pipeline,
    pub graph_line_list: vk::Pipeline,
    pub font: vk::Pipeline,
}

impl PipelineSet {
    pub fn new(
        ctx: &VulkanContext,
        layout: &CommonLayout,
        accum_pass: &RenderPass,
        window_pass: &RenderPass,
        extent: vk::Extent2D,
        shader_dir: &Path,
    ) -> VulkanResult<Self> {
        let mut builder = Builder {
            device: ctx.device().clone(),
            layout: layout.pipeline_layout(),
            extent,
            shader_dir: shader_dir.to_path_buf(),
            built: Vec::new(),
        };

        // One u32 generator seed per particle.
        let particle_bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: 4,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let particle_attributes = [vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32_UINT,
            offset: 0,
        }];
        let particle = builder.graphics(&GraphicsDesc {
            vertex_shader: "particle.vert.spv",
            fragment_shader: "particle.frag.spv",
            topology: vk::PrimitiveTopology::POINT_LIST,
            bindings: &particle_bindings,
            attributes: &particle_attributes,
            blend: Blend::Additive,
            dynamic_viewport: false,
            pass: accum_pass.handle(),
        })?;

        let skybox_bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: 16,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let skybox_attributes = [vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: 0,
        }];
        let skybox = builder.graphics(&GraphicsDesc {
            vertex_shader: "skybox.vert.spv",
            fragment_shader: "skybox.frag.spv",
            topology: vk::PrimitiveTopology::TRIANGLE_STRIP,
            bindings: &skybox_bindings,
            attributes: &skybox_attributes,
            blend: Blend::Opaque,
            dynamic_viewport: false,
            pass: accum_pass.handle(),
        })?;

        // Full-screen quad generated in the vertex shader.
        let display = builder.graphics(&GraphicsDesc {
            vertex_shader: "display.vert.spv",
            fragment_shader: "display.frag.spv",
            topology: vk::PrimitiveTopology::TRIANGLE_STRIP,
            bindings: &[],
            attributes: &[],
            blend: Blend::Opaque,
            dynamic_viewport: false,
            pass: window_pass.handle(),
        })?;

        // Position and color are read from the same interleaved buffer bound
        // twice, matching how the overlay binds it.
        let graph_bindings = [
            vk::VertexInputBindingDescription {
                binding: 0,
                stride: 24,
                input_rate: vk::VertexInputRate::VERTEX,
            },
            vk::VertexInputBindingDescription {
                binding: 1,
                stride: 24,
                input_rate: vk::VertexInputRate::VERTEX,
            },
        ];
        let graph_attributes = [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 1,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 8,
            },
        ];
        let mut graph_pipe = |topology| {
            builder.graphics(&GraphicsDesc {
                vertex_shader: "graph.vert.spv",
                fragment_shader: "graph.frag.spv",
                topology,
                bindings: &graph_bindings,
                attributes: &graph_attributes,
                blend: Blend::PremultipliedAlpha,
                dynamic_viewport: true,
                pass: window_pass.handle(),
            })
        };
        let graph_tri_strip = graph_pipe(vk::PrimitiveTopology::TRIANGLE_STRIP)?;
        let graph_line_strip = graph_pipe(vk::PrimitiveTopology::LINE_STRIP)?;
        let graph_line_list = graph_pipe(vk::PrimitiveTopology::LINE_LIST)?;

        let font_bindings = [
            vk::VertexInputBindingDescription {
                binding: 0,
                stride: 16,
                input_rate: vk::VertexInputRate::VERTEX,
            },
            vk::VertexInputBindingDescription {
                binding: 1,
                stride: 16,
                input_rate: vk::VertexInputRate::VERTEX,
            },
        ];
        let font_attributes = [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 1,
                format: vk::Format::R32G32_SFLOAT,
                offset: 8,
            },
        ];
        let font = builder.graphics(&GraphicsDesc {
            vertex_shader: "font.vert.spv",
            fragment_shader: "font.frag.spv",
            topology: vk::PrimitiveTopology::TRIANGLE_STRIP,
            bindings: &font_bindings,
            attributes: &font_attributes,
            blend: Blend::Additive,
            dynamic_viewport: false,
            pass: window_pass.handle(),
        })?;

        let skybox_generate = builder.compute("skybox_generate.comp.spv")?;

        // Success: the builder must not destroy what we now own.
        builder.built.clear();

        Ok(Self {
            device: ctx.device().clone(),
            particle,
            skybox,
            skybox_generate,
            display,
            graph_tri_strip,
            graph_line_strip,
            graph_line_list,
            font,
        })
    }
}

impl Drop for PipelineSet {
    fn drop(&mut self) {
        unsafe {
            for pipe in [
                self.particle,
                self.skybox,
                self.skybox_generate,
                self.display,
                self.graph_tri_strip,
                self.graph_line_strip,
                self.graph_line_list,
                self.font,
            ] {
                self.device.destroy_pipeline(pipe, None);
            }
        }
    }
}

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// Builds pipelines one by one and destroys the already-built ones if a
/// later build fails.
struct Builder {
    device: Device,
    layout: vk::PipelineLayout,
    extent: vk::Extent2D,
    shader_dir: PathBuf,
    built: Vec<vk::Pipeline>,
}

impl Builder {
    fn load(&self, name: &str) -> VulkanResult<ShaderModule> {
        ShaderModule::from_file(self.device.clone(), self.shader_dir.join(name))
    }

    fn graphics(&mut self, desc: &GraphicsDesc<'_>) -> VulkanResult<vk::Pipeline> {
        let vs = self.load(desc.vertex_shader)?;
        let fs = self.load(desc.fragment_shader)?;

        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vs.handle())
                .name(ENTRY_POINT)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fs.handle())
                .name(ENTRY_POINT)
                .build(),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(desc.bindings)
            .vertex_attribute_descriptions(desc.attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(desc.topology);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        // The depth attachment is cleared and carried through the passes but
        // no pipeline tests against it.
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let attachment = match desc.blend {
            Blend::Opaque => vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .build(),
            Blend::Additive => vk::PipelineColorBlendAttachmentState::builder()
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::ONE)
                .dst_color_blend_factor(vk::BlendFactor::ONE)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE)
                .alpha_blend_op(vk::BlendOp::ADD)
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .build(),
            Blend::PremultipliedAlpha => vk::PipelineColorBlendAttachmentState::builder()
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::ONE)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .alpha_blend_op(vk::BlendOp::ADD)
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .build(),
        };
        let attachments = [attachment];
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::builder().attachments(&attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = if desc.dynamic_viewport {
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states)
        } else {
            vk::PipelineDynamicStateCreateInfo::builder()
        };

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(self.layout)
            .render_pass(desc.pass)
            .subpass(0)
            .build();

        let pipeline = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| VulkanError::Api(e))?[0]
        };
        self.built.push(pipeline);
        Ok(pipeline)
    }

    fn compute(&mut self, shader: &str) -> VulkanResult<vk::Pipeline> {
        let cs = self.load(shader)?;
        let stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(cs.handle())
            .name(ENTRY_POINT)
            .build();
        let create_info = vk::ComputePipelineCreateInfo::builder()
            .stage(stage)
            .layout(self.layout)
            .build();
        let pipeline = unsafe {
            self.device
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| VulkanError::Api(e))?[0]
        };
        self.built.push(pipeline);
        Ok(pipeline)
    }
}

impl Drop for Builder {
    fn drop(&mut self) {
        unsafe {
            for pipe in self.built.drain(..) {
                self.device.destroy_pipeline(pipe, None);
            }
        }
    }
}
