//! Recording backend for exercising the frame protocol without a GPU.
//!
//! Every handle is a `u64`. The mock records each call, tracks live
//! resources per kind and models fences: a submitted fence stays pending
//! until someone waits on it (or on the whole device), at which point the
//! "GPU" completes it. A wait on a fence with no pending work would never
//! return on real hardware, so the mock reports it as an error instead.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::backend::{
    AcquireStatus, GraphicsBackend, PresentStatus, RecordingScope, RenderTarget, Submission,
    SwapchainInfo, SwapchainRequest,
};
use crate::error::{FrameError, Result};
use crate::swapchain::PresentableImage;
use crate::types::{ClearColor, Extent2D, Viewport};

/// Resource categories tracked for leak checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Swapchain,
    ImageView,
    RenderPass,
    Framebuffer,
    Semaphore,
    Fence,
    CommandBuffer,
}

/// Image formats the mock can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockFormat {
    Bgra8Srgb,
    Rgba8Unorm,
}

/// A recorded backend call.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    CreateSwapchain {
        swapchain: u64,
        request: SwapchainRequest,
    },
    DestroySwapchain(u64),
    CreateImageView(u64),
    DestroyImageView(u64),
    BuildRenderTarget {
        render_pass: u64,
        framebuffers: usize,
    },
    DestroyFramebuffer(u64),
    DestroyRenderPass(u64),
    CreateSemaphore(u64),
    DestroySemaphore(u64),
    CreateFence {
        fence: u64,
        signaled: bool,
    },
    DestroyFence(u64),
    WaitFence(u64),
    ResetFence(u64),
    AllocateCommandBuffer(u64),
    FreeCommandBuffer(u64),
    BeginRecording {
        command_buffer: u64,
        framebuffer: u64,
        extent: Extent2D,
        viewport: Viewport,
        clear_color: ClearColor,
    },
    EndRecording(u64),
    Acquire {
        signal: u64,
    },
    Submit {
        command_buffer: u64,
        wait: u64,
        signal: u64,
        fence: u64,
    },
    Present {
        wait: u64,
        image_index: u32,
    },
    WaitIdle,
}

/// Scripted result for the next `acquire_image` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptedAcquire {
    Image(u32),
    Suboptimal(u32),
    Outdated,
    Timeout,
    Fail,
}

#[derive(Clone, Copy, Debug)]
struct FenceState {
    signaled: bool,
    pending: bool,
}

struct MockState {
    next_handle: u64,
    image_count: u32,
    format: MockFormat,
    live: HashMap<u64, ResourceKind>,
    fences: HashMap<u64, FenceState>,
    calls: Vec<Call>,
    violations: Vec<String>,
    acquire_script: VecDeque<ScriptedAcquire>,
    present_script: VecDeque<PresentStatus>,
    next_image: u32,
    surface_lost: bool,
    fail_view_at: Option<usize>,
    views_this_build: usize,
    fail_render_target: bool,
    fail_semaphore_in: Option<usize>,
    fail_fence_in: Option<usize>,
    fail_next_submit: bool,
    fail_next_present: bool,
    gpu_stalled: bool,
    max_in_flight: usize,
}

impl MockState {
    fn alloc(&mut self, kind: ResourceKind) -> u64 {
        self.next_handle += 1;
        self.live.insert(self.next_handle, kind);
        self.next_handle
    }

    fn release(&mut self, handle: u64, kind: ResourceKind) {
        if self.live.remove(&handle) != Some(kind) {
            self.violations
                .push(format!("destroyed unknown {kind:?} handle {handle}"));
        }
    }

    fn pending_fences(&self) -> usize {
        self.fences.values().filter(|f| f.pending).count()
    }
}

// Counts down one creation; true when this creation should fail.
fn tick_failure(countdown: &mut Option<usize>) -> bool {
    match countdown {
        Some(0) => {
            *countdown = None;
            true
        }
        Some(n) => {
            *n -= 1;
            false
        }
        None => false,
    }
}

/// A [`GraphicsBackend`] that records calls and simulates fence completion.
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    /// Create a mock whose swapchains report `image_count` images.
    pub fn new(image_count: u32) -> Self {
        Self {
            state: Mutex::new(MockState {
                next_handle: 0,
                image_count,
                format: MockFormat::Bgra8Srgb,
                live: HashMap::new(),
                fences: HashMap::new(),
                calls: Vec::new(),
                violations: Vec::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                next_image: 0,
                surface_lost: false,
                fail_view_at: None,
                views_this_build: 0,
                fail_render_target: false,
                fail_semaphore_in: None,
                fail_fence_in: None,
                fail_next_submit: false,
                fail_next_present: false,
                gpu_stalled: false,
                max_in_flight: 0,
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Change the image count reported by subsequent swapchain builds.
    pub fn set_image_count(&self, image_count: u32) {
        self.with(|s| s.image_count = image_count);
    }

    pub fn set_format(&self, format: MockFormat) {
        self.with(|s| s.format = format);
    }

    /// Queue results for upcoming acquisitions. Unscripted acquisitions
    /// hand out images round-robin.
    pub fn script_acquire(&self, results: impl IntoIterator<Item = ScriptedAcquire>) {
        self.with(|s| s.acquire_script.extend(results));
    }

    /// Queue statuses for upcoming presentations. Unscripted presentations
    /// report [`PresentStatus::Optimal`].
    pub fn script_present(&self, results: impl IntoIterator<Item = PresentStatus>) {
        self.with(|s| s.present_script.extend(results));
    }

    /// Make swapchain creation fail as if the surface were lost.
    pub fn set_surface_lost(&self, lost: bool) {
        self.with(|s| s.surface_lost = lost);
    }

    /// Fail the `index`-th image view created by the next swapchain build.
    pub fn fail_image_view_at(&self, index: usize) {
        self.with(|s| s.fail_view_at = Some(index));
    }

    pub fn set_render_target_failure(&self, fail: bool) {
        self.with(|s| s.fail_render_target = fail);
    }

    /// Let `successes` more semaphores be created, then fail the next one.
    pub fn fail_semaphore_after(&self, successes: usize) {
        self.with(|s| s.fail_semaphore_in = Some(successes));
    }

    /// Let `successes` more fences be created, then fail the next one.
    pub fn fail_fence_after(&self, successes: usize) {
        self.with(|s| s.fail_fence_in = Some(successes));
    }

    pub fn fail_next_submit(&self) {
        self.with(|s| s.fail_next_submit = true);
    }

    pub fn fail_next_present(&self) {
        self.with(|s| s.fail_next_present = true);
    }

    /// While stalled, pending fences never complete.
    pub fn set_gpu_stalled(&self, stalled: bool) {
        self.with(|s| s.gpu_stalled = stalled);
    }

    /// All calls recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    /// Number of live resources of `kind`.
    pub fn live(&self, kind: ResourceKind) -> usize {
        self.with(|s| s.live.values().filter(|&&k| k == kind).count())
    }

    /// Number of live resources of any kind.
    pub fn live_total(&self) -> usize {
        self.with(|s| s.live.len())
    }

    /// Protocol violations observed (bad destroys, resets of busy fences, ...).
    pub fn violations(&self) -> Vec<String> {
        self.with(|s| s.violations.clone())
    }

    /// Highest number of simultaneously pending submissions observed.
    pub fn max_in_flight(&self) -> usize {
        self.with(|s| s.max_in_flight)
    }

    /// Number of submissions the "GPU" has not completed yet.
    pub fn in_flight(&self) -> usize {
        self.with(|s| s.pending_fences())
    }

    /// Signal state of a fence, or `None` if it does not exist.
    pub fn fence_signaled(&self, fence: u64) -> Option<bool> {
        self.with(|s| s.fences.get(&fence).map(|f| f.signaled))
    }
}

impl GraphicsBackend for MockBackend {
    type Surface = u64;
    type Swapchain = u64;
    type Image = u64;
    type ImageView = u64;
    type Format = MockFormat;
    type RenderPass = u64;
    type Framebuffer = u64;
    type Semaphore = u64;
    type Fence = u64;
    type CommandBuffer = u64;

    fn create_swapchain(
        &self,
        _surface: &u64,
        request: &SwapchainRequest,
    ) -> Result<SwapchainInfo<Self>> {
        self.with(|s| {
            if s.surface_lost {
                return Err(FrameError::BackendUnavailable("surface lost".to_string()));
            }
            let swapchain = s.alloc(ResourceKind::Swapchain);
            s.calls.push(Call::CreateSwapchain {
                swapchain,
                request: *request,
            });
            s.next_image = 0;
            s.views_this_build = 0;
            let images = (0..u64::from(s.image_count))
                .map(|i| swapchain * 100 + i)
                .collect();
            Ok(SwapchainInfo {
                swapchain,
                format: s.format,
                extent: request.extent,
                images,
            })
        })
    }

    fn destroy_swapchain(&self, swapchain: u64) {
        self.with(|s| {
            s.calls.push(Call::DestroySwapchain(swapchain));
            s.release(swapchain, ResourceKind::Swapchain);
        });
    }

    fn create_image_view(&self, _image: u64, _format: MockFormat) -> Result<u64> {
        self.with(|s| {
            if s.fail_view_at == Some(s.views_this_build) {
                s.fail_view_at = None;
                return Err(FrameError::Backend("out of device memory".to_string()));
            }
            s.views_this_build += 1;
            let view = s.alloc(ResourceKind::ImageView);
            s.calls.push(Call::CreateImageView(view));
            Ok(view)
        })
    }

    fn destroy_image_view(&self, view: u64) {
        self.with(|s| {
            s.calls.push(Call::DestroyImageView(view));
            s.release(view, ResourceKind::ImageView);
        });
    }

    fn build_render_target(
        &self,
        images: &[PresentableImage<Self>],
        _extent: Extent2D,
    ) -> Result<RenderTarget<Self>> {
        self.with(|s| {
            if s.fail_render_target {
                return Err(FrameError::Backend("render pass creation failed".to_string()));
            }
            let render_pass = s.alloc(ResourceKind::RenderPass);
            let framebuffers: Vec<u64> = images
                .iter()
                .map(|_| s.alloc(ResourceKind::Framebuffer))
                .collect();
            s.calls.push(Call::BuildRenderTarget {
                render_pass,
                framebuffers: framebuffers.len(),
            });
            Ok(RenderTarget {
                render_pass,
                framebuffers,
            })
        })
    }

    fn destroy_framebuffer(&self, framebuffer: u64) {
        self.with(|s| {
            s.calls.push(Call::DestroyFramebuffer(framebuffer));
            s.release(framebuffer, ResourceKind::Framebuffer);
        });
    }

    fn destroy_render_pass(&self, render_pass: u64) {
        self.with(|s| {
            s.calls.push(Call::DestroyRenderPass(render_pass));
            s.release(render_pass, ResourceKind::RenderPass);
        });
    }

    fn create_semaphore(&self) -> Result<u64> {
        self.with(|s| {
            if tick_failure(&mut s.fail_semaphore_in) {
                return Err(FrameError::Backend("semaphore creation failed".to_string()));
            }
            let semaphore = s.alloc(ResourceKind::Semaphore);
            s.calls.push(Call::CreateSemaphore(semaphore));
            Ok(semaphore)
        })
    }

    fn destroy_semaphore(&self, semaphore: u64) {
        self.with(|s| {
            s.calls.push(Call::DestroySemaphore(semaphore));
            s.release(semaphore, ResourceKind::Semaphore);
        });
    }

    fn create_fence(&self, signaled: bool) -> Result<u64> {
        self.with(|s| {
            if tick_failure(&mut s.fail_fence_in) {
                return Err(FrameError::Backend("fence creation failed".to_string()));
            }
            let fence = s.alloc(ResourceKind::Fence);
            s.fences.insert(
                fence,
                FenceState {
                    signaled,
                    pending: false,
                },
            );
            s.calls.push(Call::CreateFence { fence, signaled });
            Ok(fence)
        })
    }

    fn destroy_fence(&self, fence: u64) {
        self.with(|s| {
            s.calls.push(Call::DestroyFence(fence));
            if s.fences.remove(&fence).is_some_and(|f| f.pending) {
                s.violations
                    .push(format!("destroyed fence {fence} with pending work"));
            }
            s.release(fence, ResourceKind::Fence);
        });
    }

    fn wait_for_fence(&self, fence: u64, timeout_ns: u64) -> Result<()> {
        self.with(|s| {
            s.calls.push(Call::WaitFence(fence));
            let stalled = s.gpu_stalled;
            let Some(state) = s.fences.get_mut(&fence) else {
                s.violations.push(format!("waited on unknown fence {fence}"));
                return Err(FrameError::Backend(format!("unknown fence {fence}")));
            };
            if state.signaled {
                return Ok(());
            }
            if state.pending && !stalled {
                state.pending = false;
                state.signaled = true;
                return Ok(());
            }
            if timeout_ns == u64::MAX {
                Err(FrameError::Backend(format!(
                    "fence {fence} has no pending work and would never signal"
                )))
            } else {
                Err(FrameError::WaitTimeout { timeout_ns })
            }
        })
    }

    fn reset_fence(&self, fence: u64) -> Result<()> {
        self.with(|s| {
            s.calls.push(Call::ResetFence(fence));
            let Some(state) = s.fences.get_mut(&fence) else {
                s.violations.push(format!("reset unknown fence {fence}"));
                return Err(FrameError::Backend(format!("unknown fence {fence}")));
            };
            if state.pending {
                s.violations
                    .push(format!("reset fence {fence} while its submission was pending"));
                return Err(FrameError::Backend(format!("fence {fence} is in use")));
            }
            state.signaled = false;
            Ok(())
        })
    }

    fn allocate_command_buffer(&self) -> Result<u64> {
        self.with(|s| {
            let command_buffer = s.alloc(ResourceKind::CommandBuffer);
            s.calls.push(Call::AllocateCommandBuffer(command_buffer));
            Ok(command_buffer)
        })
    }

    fn free_command_buffer(&self, command_buffer: u64) {
        self.with(|s| {
            s.calls.push(Call::FreeCommandBuffer(command_buffer));
            s.release(command_buffer, ResourceKind::CommandBuffer);
        });
    }

    fn begin_recording(&self, scope: &RecordingScope<Self>) -> Result<()> {
        self.with(|s| {
            s.calls.push(Call::BeginRecording {
                command_buffer: scope.command_buffer,
                framebuffer: scope.framebuffer,
                extent: scope.extent,
                viewport: scope.viewport,
                clear_color: scope.clear_color,
            });
            Ok(())
        })
    }

    fn end_recording(&self, command_buffer: u64) -> Result<()> {
        self.with(|s| {
            s.calls.push(Call::EndRecording(command_buffer));
            Ok(())
        })
    }

    fn acquire_image(&self, _swapchain: u64, signal: u64, timeout_ns: u64) -> Result<AcquireStatus> {
        self.with(|s| {
            s.calls.push(Call::Acquire { signal });
            let scripted = s.acquire_script.pop_front().unwrap_or_else(|| {
                let index = s.next_image;
                s.next_image = (s.next_image + 1) % s.image_count.max(1);
                ScriptedAcquire::Image(index)
            });
            match scripted {
                ScriptedAcquire::Image(index) => Ok(AcquireStatus::Acquired {
                    index,
                    suboptimal: false,
                }),
                ScriptedAcquire::Suboptimal(index) => Ok(AcquireStatus::Acquired {
                    index,
                    suboptimal: true,
                }),
                ScriptedAcquire::Outdated => Ok(AcquireStatus::Outdated),
                ScriptedAcquire::Timeout => Err(FrameError::AcquireTimeout { timeout_ns }),
                ScriptedAcquire::Fail => Err(FrameError::Backend("device lost".to_string())),
            }
        })
    }

    fn submit(&self, submission: &Submission<Self>) -> Result<()> {
        self.with(|s| {
            s.calls.push(Call::Submit {
                command_buffer: submission.command_buffer,
                wait: submission.wait_semaphore,
                signal: submission.signal_semaphore,
                fence: submission.fence,
            });
            if s.fail_next_submit {
                s.fail_next_submit = false;
                return Err(FrameError::Backend("device lost during submit".to_string()));
            }
            let fence = submission.fence;
            let Some(state) = s.fences.get_mut(&fence) else {
                s.violations.push(format!("submitted with unknown fence {fence}"));
                return Err(FrameError::Backend(format!("unknown fence {fence}")));
            };
            if state.signaled || state.pending {
                s.violations
                    .push(format!("submitted with fence {fence} not reset"));
                return Err(FrameError::Backend(format!("fence {fence} is not unsignaled")));
            }
            state.pending = true;
            let in_flight = s.pending_fences();
            s.max_in_flight = s.max_in_flight.max(in_flight);
            Ok(())
        })
    }

    fn present(&self, _swapchain: u64, wait: u64, image_index: u32) -> Result<PresentStatus> {
        self.with(|s| {
            s.calls.push(Call::Present { wait, image_index });
            if s.fail_next_present {
                s.fail_next_present = false;
                return Err(FrameError::Backend("device lost during present".to_string()));
            }
            Ok(s.present_script.pop_front().unwrap_or(PresentStatus::Optimal))
        })
    }

    fn wait_idle(&self) -> Result<()> {
        self.with(|s| {
            s.calls.push(Call::WaitIdle);
            if s.gpu_stalled {
                return Err(FrameError::Backend("device did not go idle".to_string()));
            }
            for fence in s.fences.values_mut().filter(|f| f.pending) {
                fence.pending = false;
                fence.signaled = true;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_completes_when_waited() {
        let backend = MockBackend::new(2);
        let fence = backend.create_fence(false).unwrap();
        let cmd = backend.allocate_command_buffer().unwrap();
        let sem = backend.create_semaphore().unwrap();

        backend
            .submit(&Submission {
                command_buffer: cmd,
                wait_semaphore: sem,
                signal_semaphore: sem,
                fence,
            })
            .unwrap();
        assert_eq!(backend.in_flight(), 1);
        assert_eq!(backend.fence_signaled(fence), Some(false));

        backend.wait_for_fence(fence, u64::MAX).unwrap();
        assert_eq!(backend.in_flight(), 0);
        assert_eq!(backend.fence_signaled(fence), Some(true));
    }

    #[test]
    fn idle_fence_wait_is_reported() {
        let backend = MockBackend::new(2);
        let fence = backend.create_fence(false).unwrap();

        assert!(matches!(
            backend.wait_for_fence(fence, 1_000),
            Err(FrameError::WaitTimeout { timeout_ns: 1_000 })
        ));
        assert!(matches!(
            backend.wait_for_fence(fence, u64::MAX),
            Err(FrameError::Backend(_))
        ));
    }

    #[test]
    fn unscripted_acquire_is_round_robin() {
        let backend = MockBackend::new(3);
        let indices: Vec<AcquireStatus> = (0..4)
            .map(|_| backend.acquire_image(1, 2, u64::MAX).unwrap())
            .collect();
        let expected: Vec<AcquireStatus> = [0, 1, 2, 0]
            .into_iter()
            .map(|index| AcquireStatus::Acquired {
                index,
                suboptimal: false,
            })
            .collect();
        assert_eq!(indices, expected);
    }

    #[test]
    fn double_destroy_is_a_violation() {
        let backend = MockBackend::new(2);
        let semaphore = backend.create_semaphore().unwrap();
        backend.destroy_semaphore(semaphore);
        backend.destroy_semaphore(semaphore);
        assert_eq!(backend.violations().len(), 1);
    }
}
