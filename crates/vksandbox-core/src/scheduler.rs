//! Frame scheduling and host/device synchronization.
//!
//! The scheduler owns [`MAX_FRAMES_IN_FLIGHT`] frame slots, each with an
//! image-available semaphore, a render-finished semaphore, an in-flight fence
//! and a command buffer. Every cycle runs:
//!
//! ```text
//! begin_frame: wait slot fence -> acquire image (signals image_available)
//!              -> open recording scope on the image's framebuffer
//! end_frame:   close scope -> wait fence still bound to the image (other slot)
//!              -> bind image to slot fence -> reset fence -> submit
//!              (wait image_available, signal render_finished + fence)
//!              -> present (wait render_finished) -> advance cursor
//! ```
//!
//! Slots and swapchain images are counted independently; the per-image fence
//! binding is the only link between them.

use tracing::{debug, error, trace, warn};

use crate::backend::{AcquireStatus, GraphicsBackend, PresentStatus, RecordingScope, Submission};
use crate::error::{FrameError, Result};
use crate::swapchain::SwapchainManager;
use crate::types::{ClearColor, Extent2D, ScissorRect, Viewport};

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Scheduler configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameConfig {
    /// Color the render pass clears to.
    pub clear_color: ClearColor,
    /// Flip the viewport so Y points up.
    pub flip_viewport_y: bool,
    /// Fence wait timeout in nanoseconds; `u64::MAX` waits indefinitely.
    pub fence_timeout_ns: u64,
    /// Image acquisition timeout in nanoseconds; `u64::MAX` waits indefinitely.
    pub acquire_timeout_ns: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            clear_color: ClearColor::BLACK,
            flip_viewport_y: true,
            fence_timeout_ns: u64::MAX,
            acquire_timeout_ns: u64::MAX,
        }
    }
}

impl FrameConfig {
    pub fn with_clear_color(mut self, clear_color: ClearColor) -> Self {
        self.clear_color = clear_color;
        self
    }

    pub fn with_flip_viewport_y(mut self, flip: bool) -> Self {
        self.flip_viewport_y = flip;
        self
    }

    /// Bound fence waits; expired waits surface as [`FrameError::WaitTimeout`].
    pub fn with_fence_timeout_ns(mut self, timeout_ns: u64) -> Self {
        self.fence_timeout_ns = timeout_ns;
        self
    }

    /// Bound acquisitions; expired ones surface as [`FrameError::AcquireTimeout`].
    pub fn with_acquire_timeout_ns(mut self, timeout_ns: u64) -> Self {
        self.acquire_timeout_ns = timeout_ns;
        self
    }
}

/// Where the scheduler is in the current frame cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    Acquired,
    Recording,
    Submitted,
    Presented,
    /// A failure left slot/fence pairing unknown; see [`FrameScheduler::resynchronize`].
    Faulted,
}

/// Result of [`FrameScheduler::begin_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireResult {
    /// An image was acquired and a recording scope is open.
    Ready(u32),
    /// The surface is outdated; rebuild the swapchain before the next frame.
    NeedsRecreate,
}

/// Result of [`FrameScheduler::end_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// The frame went out, but the swapchain should be rebuilt.
    NeedsRecreate,
}

/// Selects the active frame slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCursor {
    index: usize,
}

impl FrameCursor {
    #[inline]
    pub fn index(self) -> usize {
        self.index
    }

    #[inline]
    pub fn advance(&mut self) {
        self.index = (self.index + 1) % MAX_FRAMES_IN_FLIGHT;
    }
}

/// Synchronization primitives and command buffer for one frame in flight.
pub struct FrameSlot<B: GraphicsBackend> {
    pub image_available: B::Semaphore,
    pub render_finished: B::Semaphore,
    pub in_flight: B::Fence,
    pub command_buffer: B::CommandBuffer,
}

impl<B: GraphicsBackend> Clone for FrameSlot<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: GraphicsBackend> Copy for FrameSlot<B> {}

impl<B: GraphicsBackend> FrameSlot<B> {
    fn new(backend: &B) -> Result<Self> {
        let command_buffer = backend.allocate_command_buffer()?;
        Self::with_command_buffer(backend, command_buffer)
            .inspect_err(|_| backend.free_command_buffer(command_buffer))
    }

    // Fence starts signaled so the first wait on a fresh slot returns at once.
    // On failure nothing created here outlives the call; the command buffer
    // stays with the caller.
    fn with_command_buffer(backend: &B, command_buffer: B::CommandBuffer) -> Result<Self> {
        let image_available = backend.create_semaphore()?;
        let render_finished = match backend.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(e) => {
                backend.destroy_semaphore(image_available);
                return Err(e);
            }
        };
        let in_flight = match backend.create_fence(true) {
            Ok(fence) => fence,
            Err(e) => {
                backend.destroy_semaphore(render_finished);
                backend.destroy_semaphore(image_available);
                return Err(e);
            }
        };

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
            command_buffer,
        })
    }

    fn destroy_sync(&self, backend: &B) {
        backend.destroy_semaphore(self.image_available);
        backend.destroy_semaphore(self.render_finished);
        backend.destroy_fence(self.in_flight);
    }

    fn destroy(&self, backend: &B) {
        self.destroy_sync(backend);
        backend.free_command_buffer(self.command_buffer);
    }
}

/// Handles of the frame currently being recorded.
pub struct ActiveFrame<B: GraphicsBackend> {
    pub command_buffer: B::CommandBuffer,
    pub image_index: u32,
    pub extent: Extent2D,
    pub slot: usize,
    pub frame_number: u64,
}

impl<B: GraphicsBackend> Clone for ActiveFrame<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: GraphicsBackend> Copy for ActiveFrame<B> {}

#[derive(Clone, Copy, Debug)]
struct OpenFrame {
    image_index: u32,
    extent: Extent2D,
    suboptimal: bool,
}

/// Drives the acquire → record → submit → present cycle.
pub struct FrameScheduler<B: GraphicsBackend> {
    slots: Vec<FrameSlot<B>>,
    /// Fence of the slot that last submitted work for each swapchain image.
    image_fences: Vec<Option<B::Fence>>,
    bound_generation: Option<u64>,
    cursor: FrameCursor,
    phase: FramePhase,
    open: Option<OpenFrame>,
    frame_number: u64,
    config: FrameConfig,
}

impl<B: GraphicsBackend> FrameScheduler<B> {
    /// Create the frame slots.
    pub fn new(backend: &B, config: FrameConfig) -> Result<Self> {
        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            match FrameSlot::new(backend) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    for slot in slots.iter().rev() {
                        slot.destroy(backend);
                    }
                    return Err(e);
                }
            }
        }

        debug!("Frame scheduler created with {} slots", slots.len());

        Ok(Self {
            slots,
            image_fences: Vec::new(),
            bound_generation: None,
            cursor: FrameCursor::default(),
            phase: FramePhase::Idle,
            open: None,
            frame_number: 0,
            config,
        })
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn cursor(&self) -> FrameCursor {
        self.cursor
    }

    /// Number of completed frame cycles.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn slots(&self) -> &[FrameSlot<B>] {
        &self.slots
    }

    /// Fence currently bound to a swapchain image.
    pub fn image_fence(&self, image_index: u32) -> Option<B::Fence> {
        self.image_fences
            .get(image_index as usize)
            .copied()
            .flatten()
    }

    /// Handles of the open recording scope, if any.
    pub fn active_frame(&self) -> Option<ActiveFrame<B>> {
        if self.phase != FramePhase::Recording {
            return None;
        }
        self.open.map(|open| ActiveFrame {
            command_buffer: self.slots[self.cursor.index()].command_buffer,
            image_index: open.image_index,
            extent: open.extent,
            slot: self.cursor.index(),
            frame_number: self.frame_number,
        })
    }

    /// Fails with [`FrameError::InvalidState`] unless the scheduler is
    /// [`FramePhase::Idle`], the only phase a new frame may start from.
    pub fn ensure_idle(&self) -> Result<()> {
        match self.phase {
            FramePhase::Idle => Ok(()),
            FramePhase::Faulted => Err(FrameError::InvalidState(
                "scheduler is faulted; resynchronize before the next frame".to_string(),
            )),
            _ => Err(FrameError::InvalidState(
                "a frame is already in progress".to_string(),
            )),
        }
    }

    /// Wait for the current slot, acquire an image and open a recording scope.
    ///
    /// Returns [`AcquireResult::NeedsRecreate`] without opening a scope when
    /// the surface is outdated. Only one frame may be open at a time.
    pub fn begin_frame(
        &mut self,
        backend: &B,
        swapchain: &SwapchainManager<B>,
        target: Extent2D,
    ) -> Result<AcquireResult> {
        self.ensure_idle()?;

        let (Some(generation), Some(handle), Some(render_pass)) = (
            swapchain.generation(),
            swapchain.swapchain(),
            swapchain.render_pass(),
        ) else {
            return Err(FrameError::InvalidState(
                "swapchain is not built".to_string(),
            ));
        };
        self.bind_generation(generation, swapchain.image_count());

        let slot_index = self.cursor.index();
        let slot = self.slots[slot_index];

        trace!("frame {}: waiting on slot {slot_index}", self.frame_number);
        backend.wait_for_fence(slot.in_flight, self.config.fence_timeout_ns)?;

        let status = backend.acquire_image(
            handle,
            slot.image_available,
            self.config.acquire_timeout_ns,
        )?;
        let (image_index, suboptimal) = match status {
            AcquireStatus::Acquired { index, suboptimal } => (index, suboptimal),
            AcquireStatus::Outdated => {
                debug!("Swapchain outdated at acquire; recreation required");
                return Ok(AcquireResult::NeedsRecreate);
            }
        };
        self.phase = FramePhase::Acquired;

        let Some(framebuffer) = swapchain.framebuffer(image_index) else {
            self.phase = FramePhase::Faulted;
            return Err(FrameError::Backend(format!(
                "acquired image index {image_index} is outside the swapchain"
            )));
        };

        let scope = RecordingScope {
            command_buffer: slot.command_buffer,
            render_pass,
            framebuffer,
            extent: target,
            clear_color: self.config.clear_color,
            viewport: Viewport::full(target, self.config.flip_viewport_y),
            scissor: ScissorRect::full(target),
        };
        if let Err(e) = backend.begin_recording(&scope) {
            self.phase = FramePhase::Faulted;
            return Err(e);
        }

        self.open = Some(OpenFrame {
            image_index,
            extent: target,
            suboptimal,
        });
        self.phase = FramePhase::Recording;
        trace!(
            "frame {}: recording image {image_index} in slot {slot_index}",
            self.frame_number
        );

        Ok(AcquireResult::Ready(image_index))
    }

    /// Close the recording scope, submit it and present the image.
    ///
    /// A submission failure returns [`FrameError::SubmissionFailed`], leaves
    /// the cursor where it was and puts the scheduler in
    /// [`FramePhase::Faulted`]. An outdated or suboptimal surface is reported
    /// as [`PresentOutcome::NeedsRecreate`].
    pub fn end_frame(
        &mut self,
        backend: &B,
        swapchain: &SwapchainManager<B>,
    ) -> Result<PresentOutcome> {
        if self.phase != FramePhase::Recording {
            return Err(FrameError::InvalidState(
                "end_frame called without an open frame".to_string(),
            ));
        }
        let Some(open) = self.open.take() else {
            return Err(FrameError::InvalidState(
                "end_frame called without an open frame".to_string(),
            ));
        };
        let Some(handle) = swapchain.swapchain() else {
            self.phase = FramePhase::Faulted;
            return Err(FrameError::InvalidState(
                "swapchain was torn down during a frame".to_string(),
            ));
        };

        let slot_index = self.cursor.index();
        let slot = self.slots[slot_index];

        if let Err(e) = backend.end_recording(slot.command_buffer) {
            self.phase = FramePhase::Faulted;
            return Err(e);
        }

        // With more images than slots an image can come back while the other
        // slot's submission that used it is still running.
        let image = open.image_index as usize;
        if let Some(previous) = self.image_fences[image] {
            if previous != slot.in_flight {
                trace!("image {image} still owned by another slot; waiting on its fence");
                if let Err(e) = backend.wait_for_fence(previous, self.config.fence_timeout_ns) {
                    self.phase = FramePhase::Faulted;
                    return Err(e);
                }
            }
        }
        self.image_fences[image] = Some(slot.in_flight);

        if let Err(e) = backend.reset_fence(slot.in_flight) {
            self.phase = FramePhase::Faulted;
            return Err(e.into_submission_failure());
        }

        let submission = Submission {
            command_buffer: slot.command_buffer,
            wait_semaphore: slot.image_available,
            signal_semaphore: slot.render_finished,
            fence: slot.in_flight,
        };
        if let Err(e) = backend.submit(&submission) {
            self.phase = FramePhase::Faulted;
            let e = e.into_submission_failure();
            error!("frame {}: {e}", self.frame_number);
            return Err(e);
        }
        self.phase = FramePhase::Submitted;

        let presented = backend.present(handle, slot.render_finished, open.image_index);

        // The submission is out; the slot is consumed whatever present says.
        self.cursor.advance();
        self.frame_number += 1;

        let status = match presented {
            Ok(status) => status,
            Err(e) => {
                self.phase = FramePhase::Idle;
                return Err(e);
            }
        };
        self.phase = FramePhase::Presented;

        let outcome = if open.suboptimal || status != PresentStatus::Optimal {
            debug!("Swapchain {status:?} at present; recreation required");
            PresentOutcome::NeedsRecreate
        } else {
            PresentOutcome::Presented
        };

        self.phase = FramePhase::Idle;
        Ok(outcome)
    }

    /// Wait until every slot's last submission has completed.
    pub fn wait_all_in_flight(&self, backend: &B) -> Result<()> {
        if self.phase == FramePhase::Faulted {
            return Err(FrameError::InvalidState(
                "scheduler is faulted; resynchronize before waiting on slots".to_string(),
            ));
        }
        for slot in &self.slots {
            backend.wait_for_fence(slot.in_flight, self.config.fence_timeout_ns)?;
        }
        Ok(())
    }

    /// Recover after a failure left slot/fence pairing unknown.
    ///
    /// Waits for the device to go idle, replaces the current slot's
    /// semaphores and fence, forgets every image binding and returns to
    /// [`FramePhase::Idle`]. The cursor does not move. If the replacements
    /// cannot be created the slot keeps its old primitives and the scheduler
    /// stays faulted.
    pub fn resynchronize(&mut self, backend: &B) -> Result<()> {
        backend.wait_idle()?;

        let slot_index = self.cursor.index();
        let old = self.slots[slot_index];
        let fresh = FrameSlot::with_command_buffer(backend, old.command_buffer)?;
        old.destroy_sync(backend);
        self.slots[slot_index] = fresh;

        self.image_fences.iter_mut().for_each(|fence| *fence = None);
        self.open = None;
        self.phase = FramePhase::Idle;

        warn!("Frame scheduler resynchronized at slot {slot_index}");
        Ok(())
    }

    /// Release every slot. Waits for outstanding work first.
    pub fn destroy(self, backend: &B) {
        let waited = if self.phase == FramePhase::Faulted {
            backend.wait_idle()
        } else {
            self.wait_all_in_flight(backend)
        };
        if let Err(e) = waited {
            error!("Failed to wait for in-flight frames: {e}");
        }

        for slot in &self.slots {
            slot.destroy(backend);
        }
        debug!("Frame scheduler destroyed after {} frames", self.frame_number);
    }

    fn bind_generation(&mut self, generation: u64, image_count: usize) {
        if self.bound_generation != Some(generation) {
            self.image_fences = vec![None; image_count];
            self.bound_generation = Some(generation);
            debug!("Frame scheduler bound to swapchain generation {generation} ({image_count} images)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, MockBackend, ResourceKind, ScriptedAcquire};

    const SIZE: Extent2D = Extent2D::new(800, 600);

    fn setup(image_count: u32) -> (MockBackend, SwapchainManager<MockBackend>, FrameScheduler<MockBackend>) {
        let backend = MockBackend::new(image_count);
        let mut swapchain = SwapchainManager::new();
        swapchain.build(&backend, &0, SIZE, true).unwrap();
        let scheduler = FrameScheduler::new(&backend, FrameConfig::default()).unwrap();
        backend.clear_calls();
        (backend, swapchain, scheduler)
    }

    fn run_frame(
        backend: &MockBackend,
        swapchain: &SwapchainManager<MockBackend>,
        scheduler: &mut FrameScheduler<MockBackend>,
    ) -> PresentOutcome {
        let acquired = scheduler.begin_frame(backend, swapchain, SIZE).unwrap();
        assert!(matches!(acquired, AcquireResult::Ready(_)));
        scheduler.end_frame(backend, swapchain).unwrap()
    }

    fn position(calls: &[Call], target: &Call) -> usize {
        calls
            .iter()
            .position(|c| c == target)
            .unwrap_or_else(|| panic!("{target:?} not found"))
    }

    #[test]
    fn slots_are_created_with_signaled_fences() {
        let (backend, _swapchain, scheduler) = setup(3);
        assert_eq!(scheduler.slots().len(), MAX_FRAMES_IN_FLIGHT);
        for slot in scheduler.slots() {
            assert_eq!(backend.fence_signaled(slot.in_flight), Some(true));
        }
        assert_eq!(scheduler.phase(), FramePhase::Idle);
    }

    #[test]
    fn cursor_tracks_completed_frames() {
        let (backend, swapchain, mut scheduler) = setup(3);
        for n in 1..=7 {
            run_frame(&backend, &swapchain, &mut scheduler);
            assert_eq!(scheduler.cursor().index(), n % MAX_FRAMES_IN_FLIGHT);
            assert_eq!(scheduler.frame_number(), n as u64);
        }
    }

    #[test]
    fn never_more_than_max_frames_in_flight() {
        let (backend, swapchain, mut scheduler) = setup(3);
        for _ in 0..20 {
            run_frame(&backend, &swapchain, &mut scheduler);
            assert!(backend.in_flight() <= MAX_FRAMES_IN_FLIGHT);
        }
        assert_eq!(backend.max_in_flight(), MAX_FRAMES_IN_FLIGHT);
        assert!(backend.violations().is_empty(), "{:?}", backend.violations());
    }

    #[test]
    fn three_images_two_slots_reuse_pattern() {
        let (backend, swapchain, mut scheduler) = setup(3);
        let fences: Vec<u64> = scheduler.slots().iter().map(|s| s.in_flight).collect();

        let mut used_slots = Vec::new();
        for _ in 0..5 {
            let fence = scheduler.slots()[scheduler.cursor().index()].in_flight;
            used_slots.push(fences.iter().position(|&f| f == fence).unwrap());
            run_frame(&backend, &swapchain, &mut scheduler);
        }
        assert_eq!(used_slots, vec![0, 1, 0, 1, 0]);

        // Every submission of a fence after its first is preceded by a wait on
        // it that comes after the previous submission, and the reset follows
        // that wait.
        let calls = backend.calls();
        for &fence in &fences {
            let submits: Vec<usize> = calls
                .iter()
                .enumerate()
                .filter(|(_, c)| matches!(c, Call::Submit { fence: f, .. } if *f == fence))
                .map(|(i, _)| i)
                .collect();
            for pair in submits.windows(2) {
                let (prev, next) = (pair[0], pair[1]);
                let wait = calls[prev..next]
                    .iter()
                    .position(|c| *c == Call::WaitFence(fence))
                    .map(|i| i + prev)
                    .expect("slot reused without waiting on its fence");
                let reset = calls[wait..next]
                    .iter()
                    .position(|c| *c == Call::ResetFence(fence));
                assert!(reset.is_some(), "fence reset must follow the wait");
            }
        }
        assert!(backend.violations().is_empty(), "{:?}", backend.violations());
    }

    #[test]
    fn submit_waits_and_signals_slot_primitives() {
        let (backend, swapchain, mut scheduler) = setup(2);
        let slot = scheduler.slots()[0];
        run_frame(&backend, &swapchain, &mut scheduler);

        let calls = backend.calls();
        assert!(calls.contains(&Call::Acquire {
            signal: slot.image_available
        }));
        assert!(calls.contains(&Call::Submit {
            command_buffer: slot.command_buffer,
            wait: slot.image_available,
            signal: slot.render_finished,
            fence: slot.in_flight,
        }));
        assert!(calls.contains(&Call::Present {
            wait: slot.render_finished,
            image_index: 0
        }));

        let reset = position(&calls, &Call::ResetFence(slot.in_flight));
        let submit = calls
            .iter()
            .position(|c| matches!(c, Call::Submit { .. }))
            .unwrap();
        let present = calls
            .iter()
            .position(|c| matches!(c, Call::Present { .. }))
            .unwrap();
        assert!(reset < submit && submit < present);
    }

    #[test]
    fn recording_scope_uses_image_framebuffer_and_flipped_viewport() {
        let (backend, swapchain, mut scheduler) = setup(3);
        backend.script_acquire([ScriptedAcquire::Image(2)]);

        let result = scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap();
        assert_eq!(result, AcquireResult::Ready(2));

        let frame = scheduler.active_frame().unwrap();
        assert_eq!(frame.image_index, 2);
        assert_eq!(frame.extent, SIZE);
        assert_eq!(frame.slot, 0);

        let expected = Call::BeginRecording {
            command_buffer: frame.command_buffer,
            framebuffer: swapchain.framebuffer(2).unwrap(),
            extent: SIZE,
            viewport: Viewport::full(SIZE, true),
            clear_color: ClearColor::BLACK,
        };
        assert!(backend.calls().contains(&expected));
    }

    #[test]
    fn viewport_flip_is_configurable() {
        let backend = MockBackend::new(2);
        let mut swapchain = SwapchainManager::new();
        swapchain.build(&backend, &0, SIZE, true).unwrap();
        let config = FrameConfig::default()
            .with_flip_viewport_y(false)
            .with_clear_color(ClearColor::rgba(0.1, 0.2, 0.3, 1.0));
        let mut scheduler = FrameScheduler::new(&backend, config).unwrap();

        scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap();
        let recorded = backend.calls().into_iter().find_map(|c| match c {
            Call::BeginRecording {
                viewport,
                clear_color,
                ..
            } => Some((viewport, clear_color)),
            _ => None,
        });
        let (viewport, clear_color) = recorded.unwrap();
        assert_eq!(viewport, Viewport::full(SIZE, false));
        assert_eq!(clear_color, ClearColor::rgba(0.1, 0.2, 0.3, 1.0));
    }

    #[test]
    fn outdated_acquire_opens_no_scope_and_submits_nothing() {
        let (backend, swapchain, mut scheduler) = setup(3);
        backend.script_acquire([ScriptedAcquire::Outdated]);

        let result = scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap();
        assert_eq!(result, AcquireResult::NeedsRecreate);
        assert_eq!(scheduler.phase(), FramePhase::Idle);
        assert!(scheduler.active_frame().is_none());

        let calls = backend.calls();
        assert!(!calls
            .iter()
            .any(|c| matches!(c, Call::BeginRecording { .. } | Call::Submit { .. } | Call::ResetFence(_))));
        assert_eq!(scheduler.cursor().index(), 0);

        // The slot fence was not reset, so the next attempt does not hang.
        run_frame(&backend, &swapchain, &mut scheduler);
    }

    #[test]
    fn submission_failure_propagates_and_holds_cursor() {
        let (backend, swapchain, mut scheduler) = setup(3);
        run_frame(&backend, &swapchain, &mut scheduler);
        assert_eq!(scheduler.cursor().index(), 1);

        backend.fail_next_submit();
        scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap();
        let err = scheduler.end_frame(&backend, &swapchain).unwrap_err();

        assert!(matches!(err, FrameError::SubmissionFailed(_)));
        assert_eq!(scheduler.cursor().index(), 1);
        assert_eq!(scheduler.frame_number(), 1);
        assert_eq!(scheduler.phase(), FramePhase::Faulted);
        assert!(!backend
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Present { image_index: 1, .. })));
    }

    #[test]
    fn faulted_scheduler_refuses_frames_until_resynchronized() {
        let (backend, swapchain, mut scheduler) = setup(3);
        backend.fail_next_submit();
        scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap();
        assert!(scheduler.end_frame(&backend, &swapchain).is_err());

        let err = scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap_err();
        assert!(matches!(err, FrameError::InvalidState(_)));

        let stale = scheduler.slots()[0].in_flight;
        scheduler.resynchronize(&backend).unwrap();
        assert_eq!(scheduler.phase(), FramePhase::Idle);
        assert_ne!(scheduler.slots()[0].in_flight, stale);
        assert_eq!(scheduler.image_fence(0), None);

        for _ in 0..4 {
            run_frame(&backend, &swapchain, &mut scheduler);
        }
        assert!(backend.violations().is_empty(), "{:?}", backend.violations());
    }

    #[test]
    fn image_held_by_other_slot_is_waited_before_submit() {
        let (backend, swapchain, mut scheduler) = setup(3);
        let slot0 = scheduler.slots()[0].in_flight;

        // Slot 0 renders image 0, slot 1 renders image 1, then slot 0 (now
        // reused) gets image 1 again while slot 1's submission is pending.
        backend.script_acquire([
            ScriptedAcquire::Image(0),
            ScriptedAcquire::Image(1),
            ScriptedAcquire::Image(1),
        ]);
        run_frame(&backend, &swapchain, &mut scheduler);
        run_frame(&backend, &swapchain, &mut scheduler);
        let slot1 = scheduler.slots()[1].in_flight;
        assert_eq!(scheduler.image_fence(1), Some(slot1));
        assert_eq!(backend.fence_signaled(slot1), Some(false));

        backend.clear_calls();
        scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap();
        scheduler.end_frame(&backend, &swapchain).unwrap();

        let calls = backend.calls();
        let cross_wait = position(&calls, &Call::WaitFence(slot1));
        let end = position(&calls, &Call::EndRecording(scheduler.slots()[0].command_buffer));
        let reset = position(&calls, &Call::ResetFence(slot0));
        assert!(end < cross_wait && cross_wait < reset);
        assert_eq!(scheduler.image_fence(1), Some(slot0));
        assert_eq!(backend.fence_signaled(slot1), Some(true));
        assert!(backend.violations().is_empty(), "{:?}", backend.violations());
    }

    #[test]
    fn image_bound_to_own_slot_needs_no_extra_wait() {
        let (backend, swapchain, mut scheduler) = setup(2);
        let slot0 = scheduler.slots()[0].in_flight;
        backend.script_acquire([ScriptedAcquire::Image(0), ScriptedAcquire::Image(1), ScriptedAcquire::Image(0)]);
        run_frame(&backend, &swapchain, &mut scheduler);
        run_frame(&backend, &swapchain, &mut scheduler);

        backend.clear_calls();
        run_frame(&backend, &swapchain, &mut scheduler);
        let waits = backend
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::WaitFence(_)))
            .count();
        // Only the begin_frame wait on the slot's own fence.
        assert_eq!(waits, 1);
        assert_eq!(scheduler.image_fence(0), Some(slot0));
    }

    #[test]
    fn present_outdated_requests_recreation_but_completes_frame() {
        let (backend, swapchain, mut scheduler) = setup(3);
        backend.script_present([PresentStatus::Outdated]);
        let outcome = run_frame(&backend, &swapchain, &mut scheduler);
        assert_eq!(outcome, PresentOutcome::NeedsRecreate);
        assert_eq!(scheduler.cursor().index(), 1);
        assert_eq!(scheduler.phase(), FramePhase::Idle);

        backend.script_present([PresentStatus::Suboptimal]);
        assert_eq!(
            run_frame(&backend, &swapchain, &mut scheduler),
            PresentOutcome::NeedsRecreate
        );
        assert_eq!(
            run_frame(&backend, &swapchain, &mut scheduler),
            PresentOutcome::Presented
        );
    }

    #[test]
    fn suboptimal_acquire_renders_then_requests_recreation() {
        let (backend, swapchain, mut scheduler) = setup(3);
        backend.script_acquire([ScriptedAcquire::Suboptimal(0)]);
        assert_eq!(
            scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap(),
            AcquireResult::Ready(0)
        );
        assert_eq!(
            scheduler.end_frame(&backend, &swapchain).unwrap(),
            PresentOutcome::NeedsRecreate
        );
    }

    #[test]
    fn present_failure_still_advances_cursor() {
        let (backend, swapchain, mut scheduler) = setup(3);
        backend.fail_next_present();
        scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap();
        assert!(matches!(
            scheduler.end_frame(&backend, &swapchain),
            Err(FrameError::Backend(_))
        ));
        assert_eq!(scheduler.cursor().index(), 1);
        assert_eq!(scheduler.phase(), FramePhase::Idle);
        run_frame(&backend, &swapchain, &mut scheduler);
    }

    #[test]
    fn only_one_frame_open_at_a_time() {
        let (backend, swapchain, mut scheduler) = setup(3);
        scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap();
        let err = scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap_err();
        assert!(matches!(err, FrameError::InvalidState(_)));
        assert_eq!(scheduler.phase(), FramePhase::Recording);
    }

    #[test]
    fn end_without_begin_is_invalid() {
        let (backend, swapchain, mut scheduler) = setup(3);
        let err = scheduler.end_frame(&backend, &swapchain).unwrap_err();
        assert!(matches!(err, FrameError::InvalidState(_)));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn unbuilt_swapchain_is_invalid() {
        let backend = MockBackend::new(3);
        let swapchain = SwapchainManager::new();
        let mut scheduler = FrameScheduler::new(&backend, FrameConfig::default()).unwrap();
        let err = scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap_err();
        assert!(matches!(err, FrameError::InvalidState(_)));
    }

    #[test]
    fn bounded_wait_on_stalled_gpu_times_out() {
        let backend = MockBackend::new(3);
        let mut swapchain = SwapchainManager::new();
        swapchain.build(&backend, &0, SIZE, true).unwrap();
        let config = FrameConfig::default().with_fence_timeout_ns(5_000_000);
        let mut scheduler = FrameScheduler::new(&backend, config).unwrap();

        run_frame(&backend, &swapchain, &mut scheduler);
        run_frame(&backend, &swapchain, &mut scheduler);
        backend.set_gpu_stalled(true);

        let err = scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap_err();
        assert!(matches!(err, FrameError::WaitTimeout { timeout_ns: 5_000_000 }));
        assert_eq!(scheduler.phase(), FramePhase::Idle);

        backend.set_gpu_stalled(false);
        run_frame(&backend, &swapchain, &mut scheduler);
    }

    #[test]
    fn acquire_timeout_is_reported() {
        let (backend, swapchain, mut scheduler) = setup(3);
        backend.script_acquire([ScriptedAcquire::Timeout]);
        let err = scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap_err();
        assert!(matches!(err, FrameError::AcquireTimeout { .. }));
        assert_eq!(scheduler.phase(), FramePhase::Idle);
    }

    #[test]
    fn rebuilt_swapchain_drops_stale_image_bindings() {
        let (backend, mut swapchain, mut scheduler) = setup(3);
        for _ in 0..3 {
            run_frame(&backend, &swapchain, &mut scheduler);
        }
        assert!(scheduler.image_fence(2).is_some());

        scheduler.wait_all_in_flight(&backend).unwrap();
        backend.set_image_count(4);
        swapchain.rebuild(&backend, &0, SIZE, true).unwrap();

        backend.script_acquire([ScriptedAcquire::Image(3)]);
        scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap();
        assert_eq!(scheduler.image_fence(2), None);
        scheduler.end_frame(&backend, &swapchain).unwrap();
        assert!(scheduler.image_fence(3).is_some());
    }

    #[test]
    fn destroy_releases_every_slot() {
        let (backend, mut swapchain, mut scheduler) = setup(3);
        for _ in 0..5 {
            run_frame(&backend, &swapchain, &mut scheduler);
        }
        scheduler.destroy(&backend);
        swapchain.teardown(&backend);

        assert_eq!(backend.live(ResourceKind::Fence), 0);
        assert_eq!(backend.live(ResourceKind::Semaphore), 0);
        assert_eq!(backend.live(ResourceKind::CommandBuffer), 0);
        assert_eq!(backend.live_total(), 0);
        assert!(backend.violations().is_empty(), "{:?}", backend.violations());
    }

    #[test]
    fn failed_slot_creation_releases_what_was_built() {
        // Each slot creates two semaphores and one fence; cover a failure at
        // every step of both slots.
        for successes in 0..4 {
            let backend = MockBackend::new(3);
            backend.fail_semaphore_after(successes);
            assert!(FrameScheduler::new(&backend, FrameConfig::default()).is_err());
            assert_eq!(backend.live_total(), 0, "semaphore failure after {successes}");
            assert!(backend.violations().is_empty(), "{:?}", backend.violations());
        }
        for successes in 0..2 {
            let backend = MockBackend::new(3);
            backend.fail_fence_after(successes);
            assert!(FrameScheduler::new(&backend, FrameConfig::default()).is_err());
            assert_eq!(backend.live_total(), 0, "fence failure after {successes}");
            assert!(backend.violations().is_empty(), "{:?}", backend.violations());
        }
    }

    #[test]
    fn failed_resynchronize_keeps_slot_and_stays_faulted() {
        let (backend, mut swapchain, mut scheduler) = setup(3);
        backend.fail_next_submit();
        scheduler.begin_frame(&backend, &swapchain, SIZE).unwrap();
        assert!(scheduler.end_frame(&backend, &swapchain).is_err());

        let before = scheduler.slots()[0].in_flight;
        let live_before = backend.live_total();
        backend.fail_fence_after(0);
        assert!(scheduler.resynchronize(&backend).is_err());
        assert_eq!(scheduler.phase(), FramePhase::Faulted);
        assert_eq!(scheduler.slots()[0].in_flight, before);
        assert_eq!(backend.live_total(), live_before);

        scheduler.resynchronize(&backend).unwrap();
        run_frame(&backend, &swapchain, &mut scheduler);

        scheduler.destroy(&backend);
        swapchain.teardown(&backend);
        assert_eq!(backend.live_total(), 0);
        assert!(backend.violations().is_empty(), "{:?}", backend.violations());
    }
}
