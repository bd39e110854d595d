//! [`GraphicsBackend`] over Vulkan.

use std::sync::Arc;

use ash::vk;
use vksandbox_core::{
    AcquireStatus, Extent2D, FrameError, GraphicsBackend, PresentStatus, PresentableImage,
    RecordingScope, RenderTarget, Submission, SwapchainInfo, SwapchainRequest,
};

use crate::command::{
    begin_command_buffer, end_command_buffer, submit_command_buffers, CommandPool,
};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::render_target::{create_color_view, create_framebuffer, create_present_render_pass};
use crate::surface::SurfaceContext;
use crate::swapchain::create_swapchain;
use crate::sync::{create_fence, create_semaphore, reset_fence, wait_for_fence};

type FrameResult<T> = vksandbox_core::Result<T>;

fn to_vk_extent(extent: Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: extent.width,
        height: extent.height,
    }
}

/// Drives one window's frames on a [`GpuContext`].
///
/// Graphics and presentation share the context's graphics queue.
pub struct VulkanBackend {
    gpu: Arc<GpuContext>,
    swapchain_loader: ash::khr::swapchain::Device,
    command_pool: CommandPool,
    queue: vk::Queue,
}

impl VulkanBackend {
    /// Create a backend presenting to `surface`.
    ///
    /// Fails if the graphics queue cannot present to the surface.
    pub fn new(gpu: Arc<GpuContext>, surface: &SurfaceContext) -> Result<Self> {
        let family = gpu.graphics_queue_family();
        if !surface.supports_present(&gpu, family)? {
            return Err(GpuError::SurfaceCreation(format!(
                "Graphics queue family {family} cannot present to the surface"
            )));
        }

        let swapchain_loader = ash::khr::swapchain::Device::new(gpu.instance(), gpu.device());
        let command_pool = unsafe {
            CommandPool::new(
                gpu.device(),
                family,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?
        };
        let queue = gpu.graphics_queue();

        Ok(Self {
            gpu,
            swapchain_loader,
            command_pool,
            queue,
        })
    }

    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    pub fn device(&self) -> &ash::Device {
        self.gpu.device()
    }

    fn destroy_framebuffers(&self, framebuffers: &[vk::Framebuffer]) {
        for &framebuffer in framebuffers.iter().rev() {
            unsafe { self.device().destroy_framebuffer(framebuffer, None) };
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = self.gpu.device().device_wait_idle();
            self.command_pool.destroy(self.gpu.device());
        }
    }
}

impl GraphicsBackend for VulkanBackend {
    type Surface = SurfaceContext;
    type Swapchain = vk::SwapchainKHR;
    type Image = vk::Image;
    type ImageView = vk::ImageView;
    type Format = vk::Format;
    type RenderPass = vk::RenderPass;
    type Framebuffer = vk::Framebuffer;
    type Semaphore = vk::Semaphore;
    type Fence = vk::Fence;
    type CommandBuffer = vk::CommandBuffer;

    fn create_swapchain(
        &self,
        surface: &SurfaceContext,
        request: &SwapchainRequest,
    ) -> FrameResult<SwapchainInfo<Self>> {
        let caps = surface.capabilities(&self.gpu)?;
        let created = unsafe {
            create_swapchain(
                &self.swapchain_loader,
                surface.surface,
                &caps,
                to_vk_extent(request.extent),
                request.present_mode.is_vsync(),
            )?
        };

        Ok(SwapchainInfo {
            swapchain: created.swapchain,
            format: created.format,
            extent: Extent2D::new(created.extent.width, created.extent.height),
            images: created.images,
        })
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> FrameResult<vk::ImageView> {
        Ok(unsafe { create_color_view(self.device(), image, format)? })
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device().destroy_image_view(view, None) };
    }

    fn build_render_target(
        &self,
        images: &[PresentableImage<Self>],
        extent: Extent2D,
    ) -> FrameResult<RenderTarget<Self>> {
        let Some(first) = images.first() else {
            return Err(FrameError::InvalidState(
                "render target needs at least one image".to_string(),
            ));
        };

        let device = self.device();
        let render_pass = unsafe { create_present_render_pass(device, first.format)? };

        let mut framebuffers = Vec::with_capacity(images.len());
        for image in images {
            match unsafe { create_framebuffer(device, render_pass, image.view, to_vk_extent(extent)) } {
                Ok(framebuffer) => framebuffers.push(framebuffer),
                Err(e) => {
                    self.destroy_framebuffers(&framebuffers);
                    unsafe { device.destroy_render_pass(render_pass, None) };
                    return Err(e.into());
                }
            }
        }

        Ok(RenderTarget {
            render_pass,
            framebuffers,
        })
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.destroy_framebuffers(&[framebuffer]);
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device().destroy_render_pass(render_pass, None) };
    }

    fn create_semaphore(&self) -> FrameResult<vk::Semaphore> {
        Ok(unsafe { create_semaphore(self.device())? })
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device().destroy_semaphore(semaphore, None) };
    }

    fn create_fence(&self, signaled: bool) -> FrameResult<vk::Fence> {
        Ok(unsafe { create_fence(self.device(), signaled)? })
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device().destroy_fence(fence, None) };
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> FrameResult<()> {
        Ok(unsafe { wait_for_fence(self.device(), fence, timeout_ns)? })
    }

    fn reset_fence(&self, fence: vk::Fence) -> FrameResult<()> {
        Ok(unsafe { reset_fence(self.device(), fence)? })
    }

    fn allocate_command_buffer(&self) -> FrameResult<vk::CommandBuffer> {
        Ok(unsafe { self.command_pool.allocate_command_buffer(self.device())? })
    }

    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.command_pool
                .free_command_buffer(self.device(), command_buffer);
        }
    }

    fn begin_recording(&self, scope: &RecordingScope<Self>) -> FrameResult<()> {
        let device = self.device();
        let cmd = scope.command_buffer;
        let extent = to_vk_extent(scope.extent);

        unsafe {
            begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: scope.clear_color.0,
                },
            }];
            let begin_info = vk::RenderPassBeginInfo::default()
                .render_pass(scope.render_pass)
                .framebuffer(scope.framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);
            device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);

            let viewport = vk::Viewport {
                x: scope.viewport.x,
                y: scope.viewport.y,
                width: scope.viewport.width,
                height: scope.viewport.height,
                min_depth: scope.viewport.min_depth,
                max_depth: scope.viewport.max_depth,
            };
            device.cmd_set_viewport(cmd, 0, &[viewport]);

            let scissor = vk::Rect2D {
                offset: vk::Offset2D {
                    x: scope.scissor.x,
                    y: scope.scissor.y,
                },
                extent: vk::Extent2D {
                    width: scope.scissor.width,
                    height: scope.scissor.height,
                },
            };
            device.cmd_set_scissor(cmd, 0, &[scissor]);
        }

        Ok(())
    }

    fn end_recording(&self, command_buffer: vk::CommandBuffer) -> FrameResult<()> {
        unsafe {
            self.device().cmd_end_render_pass(command_buffer);
            end_command_buffer(self.device(), command_buffer)?;
        }
        Ok(())
    }

    fn acquire_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
        timeout_ns: u64,
    ) -> FrameResult<AcquireStatus> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, signal, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquireStatus::Acquired { index, suboptimal }),
            // No image was acquired and the semaphore stays unsignaled.
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::Outdated),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => {
                Err(FrameError::AcquireTimeout { timeout_ns })
            }
            Err(e) => Err(GpuError::from(e).into()),
        }
    }

    fn submit(&self, submission: &Submission<Self>) -> FrameResult<()> {
        unsafe {
            submit_command_buffers(
                self.device(),
                self.queue,
                &[submission.command_buffer],
                &[submission.wait_semaphore],
                &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
                &[submission.signal_semaphore],
                submission.fence,
            )?;
        }
        Ok(())
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        wait: vk::Semaphore,
        image_index: u32,
    ) -> FrameResult<PresentStatus> {
        let wait_semaphores = [wait];
        let swapchains = [swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(self.queue, &present_info) } {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::Outdated),
            Err(e) => Err(GpuError::from(e).into()),
        }
    }

    fn wait_idle(&self) -> FrameResult<()> {
        Ok(self.gpu.wait_idle()?)
    }
}
