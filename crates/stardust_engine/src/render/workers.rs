//! Per-core particle command recording.
//!
//! Every core records its shard of the particle draws into a private
//! command buffer each frame. The calling thread doubles as worker zero;
//! the remaining shards run on dedicated threads that park on a channel
//! between frames. The orchestrator keeps copies of all command buffer
//! handles so the whole frame goes out in one submission.

use crate::render::vulkan::commands::CommandPool;
use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::{VulkanError, VulkanResult};
use crate::sim::partition::{PointPartition, Shard};
use ash::{vk, Device};
use crossbeam::channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Handles shared by every recorder; all plain Vulkan handles, safe to copy
/// across threads as long as each command buffer stays with its recorder.
pub struct ShardContext {
    pub device: Device,
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    /// One set per frame slot, indexed by `res_idx`.
    pub descriptor_sets: Vec<vk::DescriptorSet>,
    pub seed_buffer: vk::Buffer,
    pub extent: vk::Extent2D,
    pub partition: PointPartition,
}

/// Record one shard of particle draws into `cmdbuf` for frame slot
/// `res_idx`. The render pass loads the accumulation target as-is, so
/// shards compose regardless of execution order.
pub fn record_shard(
    ctx: &ShardContext,
    cmdbuf: vk::CommandBuffer,
    res_idx: usize,
    shard: Shard,
) -> VulkanResult<()> {
    let device = &ctx.device;
    let begin_info = vk::CommandBufferBeginInfo::builder();
    unsafe {
        device
            .begin_command_buffer(cmdbuf, &begin_info)
            .map_err(VulkanError::Api)?;
    }

    let clear_values = [vk::ClearValue::default(), vk::ClearValue::default()];
    let pass_info = vk::RenderPassBeginInfo::builder()
        .render_pass(ctx.render_pass)
        .framebuffer(ctx.framebuffer)
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: ctx.extent,
        })
        .clear_values(&clear_values);

    unsafe {
        device.cmd_begin_render_pass(cmdbuf, &pass_info, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(cmdbuf, vk::PipelineBindPoint::GRAPHICS, ctx.pipeline);
        device.cmd_bind_descriptor_sets(
            cmdbuf,
            vk::PipelineBindPoint::GRAPHICS,
            ctx.pipeline_layout,
            0,
            &[ctx.descriptor_sets[res_idx]],
            &[],
        );
        device.cmd_bind_vertex_buffers(cmdbuf, 0, &[ctx.seed_buffer], &[0]);
        for i in 0..shard.draw_count {
            let first_vertex = ctx.partition.first_vertex(shard, i);
            device.cmd_draw(cmdbuf, ctx.partition.batch_size(), 1, first_vertex, 0);
        }
        device.cmd_end_render_pass(cmdbuf);
        device
            .end_command_buffer(cmdbuf)
            .map_err(VulkanError::Api)?;
    }
    Ok(())
}

struct WorkerHandle {
    go: Sender<usize>,
    done: Receiver<VulkanResult<()>>,
    thread: JoinHandle<()>,
}

/// One recorder per core. Worker zero runs inline on the caller; workers
/// 1..n are threads fanned out with a channel send per frame.
pub struct WorkerPool {
    shard_ctx: Arc<ShardContext>,
    /// Worker zero's pool; kept so its command buffers stay valid.
    _local_pool: CommandPool,
    local_cmdbufs: Vec<vk::CommandBuffer>,
    workers: Vec<WorkerHandle>,
    /// cmdbufs[tid][res_idx]; index 0 aliases the local recorder's buffers.
    cmdbufs: Vec<Vec<vk::CommandBuffer>>,
}

impl WorkerPool {
    /// `slot_count` is the granted swapchain image count; each recorder
    /// keeps one command buffer per slot.
    pub fn new(
        ctx: &VulkanContext,
        shard_ctx: ShardContext,
        slot_count: usize,
    ) -> VulkanResult<Self> {
        let shard_ctx = Arc::new(shard_ctx);
        let core_count = shard_ctx.partition.core_count();

        let local_pool = CommandPool::new(ctx.device().clone(), ctx.queue_family_index())?;
        let local_cmdbufs = local_pool.allocate(slot_count as u32)?;

        let mut cmdbufs = vec![local_cmdbufs.clone()];
        let mut workers = Vec::with_capacity(core_count.saturating_sub(1) as usize);
        for tid in 1..core_count {
            let pool = CommandPool::new(ctx.device().clone(), ctx.queue_family_index())?;
            let bufs = pool.allocate(slot_count as u32)?;
            cmdbufs.push(bufs.clone());

            let (go_tx, go_rx) = bounded::<usize>(1);
            let (done_tx, done_rx) = bounded::<VulkanResult<()>>(1);
            let shard = shard_ctx.partition.shard(tid);
            let thread_ctx = Arc::clone(&shard_ctx);
            let thread = std::thread::Builder::new()
                .name(format!("particle-{tid}"))
                .spawn(move || {
                    // The pool moves in with the thread and drops with it.
                    let _pool = pool;
                    while let Ok(res_idx) = go_rx.recv() {
                        let result = record_shard(&thread_ctx, bufs[res_idx], res_idx, shard);
                        if done_tx.send(result).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|e| VulkanError::InitializationFailed(format!(
                    "failed to spawn recorder thread {tid}: {e}"
                )))?;

            workers.push(WorkerHandle {
                go: go_tx,
                done: done_rx,
                thread,
            });
        }

        log::info!(
            "Particle recording across {} cores, {} draws each (last takes the remainder)",
            core_count,
            shard_ctx.partition.shard(0).draw_count
        );

        Ok(Self {
            shard_ctx,
            _local_pool: local_pool,
            local_cmdbufs,
            workers,
            cmdbufs,
        })
    }

    /// Record every shard for slot `res_idx` and return the command buffers
    /// in core order. The caller's thread records shard zero while the
    /// others run; the call returns once all shards are recorded.
    pub fn record_frame(&self, res_idx: usize) -> VulkanResult<Vec<vk::CommandBuffer>> {
        for worker in &self.workers {
            worker
                .go
                .send(res_idx)
                .map_err(|_| VulkanError::InvalidOperation {
                    reason: "recorder thread exited early".into(),
                })?;
        }

        record_shard(
            &self.shard_ctx,
            self.local_cmdbufs[res_idx],
            res_idx,
            self.shard_ctx.partition.shard(0),
        )?;

        for worker in &self.workers {
            worker
                .done
                .recv()
                .map_err(|_| VulkanError::InvalidOperation {
                    reason: "recorder thread exited early".into(),
                })??;
        }

        Ok(self
            .cmdbufs
            .iter()
            .map(|bufs| bufs[res_idx])
            .collect())
    }

    pub fn core_count(&self) -> u32 {
        self.shard_ctx.partition.core_count()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing each channel ends that thread's recv loop.
        for worker in self.workers.drain(..) {
            drop(worker.go);
            drop(worker.done);
            if let Err(e) = worker.thread.join() {
                log::error!("Recorder thread panicked: {e:?}");
            }
        }
    }
}
