// SPDX-License-Identifier: CEPL-1.0
//! Frame lifecycle: the steady-state acquire/submit/present loop and the
//! swapchain invalidation/rebuild protocol.
//!
//! The scheduler owns no GPU objects. It sequences calls into a
//! [`FrameBackend`], which owns the swapchain resource set and the per-slot
//! semaphores and fences, and it keeps the bookkeeping that decides when the
//! backend has to wait:
//!
//! ```text
//! wait slot fence -> acquire -> wait image fence -> write uniforms
//!   -> reset slot fence -> submit -> present -> advance slot
//! ```
//!
//! Images can come back from acquire in any order, so the scheduler records
//! which frame slot last submitted work for each image (the image fence map)
//! and waits on that slot before the image's uniform buffer or command
//! buffer is touched again.

use anyhow::{bail, Context, Result};
use tracing::{debug, info, trace};

/// Number of frame slots the CPU may have queued ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceState {
    Absent,
    Building,
    Ready,
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// `suboptimal` images are still rendered; the present that follows
    /// reports the condition again and triggers the rebuild.
    Acquired { image_index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildOutcome {
    Ready { image_count: usize },
    /// The host window is zero-sized; nothing was touched, try again later.
    Deferred,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidationCause {
    AcquireOutOfDate,
    PresentOutOfDate,
    PresentSuboptimal,
    Resize,
    External,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Acquire reported out-of-date; the set was rebuilt instead of drawing.
    Rebuilt,
    /// The set could not be built yet (zero-sized surface).
    Stalled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented { slot: usize, image_index: u32 },
    /// Work was submitted but the present was rejected as out-of-date.
    Dropped { slot: usize, image_index: u32 },
    Skipped(SkipReason),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub frames_presented: u64,
    pub frames_dropped: u64,
    pub frames_skipped: u64,
    /// Rebuilds of a stale set; the initial build is not counted.
    pub rebuilds: u64,
}

/// GPU-facing half of the frame loop.
///
/// Slots are `0..MAX_FRAMES_IN_FLIGHT`; each owns an image-available
/// semaphore, a render-finished semaphore and an in-flight fence that is
/// created signaled. Every method except `rebuild` must leave the resource
/// set untouched. Recoverable presentation conditions are reported through
/// the outcome enums; an `Err` is always fatal.
pub trait FrameBackend {
    /// Tears down the live resource set (if any) after the device is idle and
    /// builds a new one for the current surface extent.
    fn rebuild(&mut self) -> Result<RebuildOutcome>;

    /// Blocks until the slot's in-flight fence is signaled.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome>;

    fn write_uniforms(&mut self, image_index: u32) -> Result<()>;

    fn reset_slot(&mut self, slot: usize) -> Result<()>;

    /// Submits the image's command buffer: waits on the slot's
    /// image-available semaphore, signals its render-finished semaphore and
    /// its in-flight fence.
    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()>;

    /// Presents after the slot's render-finished semaphore.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome>;
}

pub struct FrameScheduler<B: FrameBackend> {
    backend: B,
    state: ResourceState,
    stale_cause: Option<InvalidationCause>,
    slot: usize,
    // image index -> slot whose fence guards the last submission for it
    image_fences: Vec<Option<usize>>,
    resize_pending: bool,
    stats: SchedulerStats,
}

impl<B: FrameBackend> FrameScheduler<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: ResourceState::Absent,
            stale_cause: None,
            slot: 0,
            image_fences: Vec::new(),
            resize_pending: false,
            stats: SchedulerStats::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn image_fences(&self) -> &[Option<usize>] {
        &self.image_fences
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn resize_pending(&self) -> bool {
        self.resize_pending
    }

    /// Host window notification; consumed by the next rebuild.
    pub fn notify_resized(&mut self) {
        self.resize_pending = true;
    }

    /// Marks a ready set stale. Repeated calls before the rebuild collapse
    /// into a single rebuild.
    pub fn invalidate(&mut self, cause: InvalidationCause) {
        match self.state {
            ResourceState::Ready => {
                info!("swapchain stale ({cause:?})");
                self.state = ResourceState::Stale;
                self.stale_cause = Some(cause);
            }
            ResourceState::Stale => {
                debug!("swapchain already stale, ignoring {cause:?}");
            }
            ResourceState::Absent | ResourceState::Building => {}
        }
    }

    /// Builds or rebuilds the resource set if needed. Returns `false` when the
    /// backend deferred the build.
    pub fn ensure_ready(&mut self) -> Result<bool> {
        let previous = self.state;
        match previous {
            ResourceState::Ready => return Ok(true),
            ResourceState::Building => bail!("resource set rebuild re-entered"),
            ResourceState::Absent | ResourceState::Stale => {}
        }

        self.state = ResourceState::Building;
        match self.backend.rebuild() {
            Ok(RebuildOutcome::Ready { image_count }) => {
                if previous == ResourceState::Stale {
                    self.stats.rebuilds += 1;
                    info!(
                        "swapchain rebuilt ({:?}), {image_count} images",
                        self.stale_cause.unwrap_or(InvalidationCause::External)
                    );
                } else {
                    info!("swapchain built, {image_count} images");
                }
                self.image_fences = vec![None; image_count];
                self.state = ResourceState::Ready;
                self.stale_cause = None;
                self.resize_pending = false;
                Ok(true)
            }
            Ok(RebuildOutcome::Deferred) => {
                trace!("swapchain build deferred (zero extent)");
                self.state = previous;
                Ok(false)
            }
            Err(e) => {
                self.state = ResourceState::Absent;
                Err(e.context("swapchain resource set build"))
            }
        }
    }

    /// Runs one iteration of the frame loop.
    pub fn draw_frame(&mut self) -> Result<FrameStatus> {
        // a resize reported between frames rebuilds before this acquire
        if self.resize_pending && self.state == ResourceState::Ready {
            self.invalidate(InvalidationCause::Resize);
        }
        if !self.ensure_ready()? {
            self.stats.frames_skipped += 1;
            return Ok(FrameStatus::Skipped(SkipReason::Stalled));
        }

        let slot = self.slot;
        self.backend
            .wait_for_slot(slot)
            .context("wait for in-flight fence")?;

        let image_index = match self.backend.acquire_image(slot)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    trace!("acquired suboptimal image {image_index}");
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                self.invalidate(InvalidationCause::AcquireOutOfDate);
                self.stats.frames_skipped += 1;
                let reason = if self.ensure_ready()? {
                    SkipReason::Rebuilt
                } else {
                    SkipReason::Stalled
                };
                return Ok(FrameStatus::Skipped(reason));
            }
        };

        let image = image_index as usize;
        let Some(&owner) = self.image_fences.get(image) else {
            bail!(
                "acquired image {image_index} but the set holds {} images",
                self.image_fences.len()
            );
        };
        if let Some(owner) = owner.filter(|&s| s != slot) {
            trace!("image {image_index} still guarded by slot {owner}");
            self.backend
                .wait_for_slot(owner)
                .context("wait for image fence")?;
        }
        self.image_fences[image] = Some(slot);

        self.backend.write_uniforms(image_index)?;
        self.backend.reset_slot(slot)?;
        self.backend.submit(slot, image_index)?;
        let outcome = self.backend.present(slot, image_index)?;

        let resized = std::mem::take(&mut self.resize_pending);
        match outcome {
            PresentOutcome::OutOfDate => self.invalidate(InvalidationCause::PresentOutOfDate),
            PresentOutcome::Suboptimal => self.invalidate(InvalidationCause::PresentSuboptimal),
            PresentOutcome::Presented if resized => self.invalidate(InvalidationCause::Resize),
            PresentOutcome::Presented => {}
        }

        self.slot = (slot + 1) % MAX_FRAMES_IN_FLIGHT;

        if outcome == PresentOutcome::OutOfDate {
            self.stats.frames_dropped += 1;
            Ok(FrameStatus::Dropped { slot, image_index })
        } else {
            self.stats.frames_presented += 1;
            trace!("presented image {image_index} from slot {slot}");
            Ok(FrameStatus::Presented { slot, image_index })
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Event {
        Rebuild,
        Wait(usize),
        Acquire(usize),
        Write(u32),
        Reset(usize),
        Submit(usize, u32),
        Present(usize, u32),
    }

    /// Simulated GPU. Submitted work completes only when the CPU waits on its
    /// fence, which keeps as much work in flight as the scheduler allows.
    struct SimGpu {
        image_count: usize,
        next_image_count: Option<usize>,
        acquire_order: Vec<u32>,
        acquire_cursor: usize,
        acquires: usize,
        presents: usize,
        out_of_date_acquires: HashSet<usize>,
        suboptimal_presents: HashSet<usize>,
        fail_submit_at: Option<usize>,
        submits: usize,

        window: (u32, u32),
        extent: (u32, u32),

        fence_signaled: [bool; MAX_FRAMES_IN_FLIGHT],
        in_flight: [bool; MAX_FRAMES_IN_FLIGHT],
        fence_gen: [u64; MAX_FRAMES_IN_FLIGHT],
        completed_gen: [u64; MAX_FRAMES_IN_FLIGHT],
        gen: u64,
        image_last: Vec<Option<(usize, u64)>>,
        uniforms: Vec<u64>,

        builds: usize,
        live_sets: usize,
        max_in_flight: usize,
        violations: Vec<String>,
        events: Vec<Event>,
    }

    impl SimGpu {
        fn new(image_count: usize) -> Self {
            Self {
                image_count,
                next_image_count: None,
                acquire_order: (0..image_count as u32).collect(),
                acquire_cursor: 0,
                acquires: 0,
                presents: 0,
                out_of_date_acquires: HashSet::new(),
                suboptimal_presents: HashSet::new(),
                fail_submit_at: None,
                submits: 0,
                window: (800, 600),
                extent: (0, 0),
                fence_signaled: [true; MAX_FRAMES_IN_FLIGHT],
                in_flight: [false; MAX_FRAMES_IN_FLIGHT],
                fence_gen: [0; MAX_FRAMES_IN_FLIGHT],
                completed_gen: [0; MAX_FRAMES_IN_FLIGHT],
                gen: 0,
                image_last: Vec::new(),
                uniforms: Vec::new(),
                builds: 0,
                live_sets: 0,
                max_in_flight: 0,
                violations: Vec::new(),
                events: Vec::new(),
            }
        }

        fn with_acquire_order(mut self, order: &[u32]) -> Self {
            self.acquire_order = order.to_vec();
            self
        }

        fn complete(&mut self, slot: usize) {
            self.fence_signaled[slot] = true;
            self.in_flight[slot] = false;
            self.completed_gen[slot] = self.fence_gen[slot];
        }

        fn image_busy(&self, image: u32) -> Option<(usize, u64)> {
            self.image_last[image as usize].filter(|&(slot, gen)| self.completed_gen[slot] < gen)
        }
    }

    impl FrameBackend for SimGpu {
        fn rebuild(&mut self) -> Result<RebuildOutcome> {
            if self.window.0 == 0 || self.window.1 == 0 {
                return Ok(RebuildOutcome::Deferred);
            }
            self.events.push(Event::Rebuild);
            // device idle
            for slot in 0..MAX_FRAMES_IN_FLIGHT {
                if self.in_flight[slot] {
                    self.complete(slot);
                }
            }
            if self.live_sets > 0 {
                self.live_sets -= 1;
            }
            if let Some(count) = self.next_image_count.take() {
                self.image_count = count;
                self.acquire_order = (0..count as u32).collect();
                self.acquire_cursor = 0;
            }
            self.extent = self.window;
            self.image_last = vec![None; self.image_count];
            self.uniforms = vec![0; self.image_count];
            self.live_sets += 1;
            self.builds += 1;
            Ok(RebuildOutcome::Ready {
                image_count: self.image_count,
            })
        }

        fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
            self.events.push(Event::Wait(slot));
            if !self.fence_signaled[slot] {
                self.complete(slot);
            }
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
            self.events.push(Event::Acquire(slot));
            let n = self.acquires;
            self.acquires += 1;
            if self.out_of_date_acquires.contains(&n) {
                return Ok(AcquireOutcome::OutOfDate);
            }
            let image_index = self.acquire_order[self.acquire_cursor % self.acquire_order.len()];
            self.acquire_cursor += 1;
            Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal: false,
            })
        }

        fn write_uniforms(&mut self, image_index: u32) -> Result<()> {
            self.events.push(Event::Write(image_index));
            if let Some((slot, gen)) = self.image_busy(image_index) {
                self.violations.push(format!(
                    "uniform write to image {image_index} while submission {gen} \
                     on slot {slot} runs"
                ));
            }
            self.uniforms[image_index as usize] += 1;
            Ok(())
        }

        fn reset_slot(&mut self, slot: usize) -> Result<()> {
            self.events.push(Event::Reset(slot));
            if !self.fence_signaled[slot] {
                self.violations
                    .push(format!("reset of unsignaled fence on slot {slot}"));
            }
            self.fence_signaled[slot] = false;
            Ok(())
        }

        fn submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
            self.events.push(Event::Submit(slot, image_index));
            let n = self.submits;
            self.submits += 1;
            if self.fail_submit_at == Some(n) {
                bail!("queue_submit: ERROR_DEVICE_LOST");
            }
            if self.in_flight[slot] {
                self.violations
                    .push(format!("slot {slot} resubmitted while in flight"));
            }
            if let Some((other, gen)) = self.image_busy(image_index) {
                self.violations.push(format!(
                    "image {image_index} resubmitted while submission {gen} on slot {other} runs"
                ));
            }
            self.gen += 1;
            self.fence_gen[slot] = self.gen;
            self.in_flight[slot] = true;
            self.image_last[image_index as usize] = Some((slot, self.gen));
            let in_flight = self.in_flight.iter().filter(|&&f| f).count();
            self.max_in_flight = self.max_in_flight.max(in_flight);
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
            self.events.push(Event::Present(slot, image_index));
            let n = self.presents;
            self.presents += 1;
            if self.suboptimal_presents.contains(&n) {
                return Ok(PresentOutcome::Suboptimal);
            }
            if self.extent != self.window {
                return Ok(PresentOutcome::OutOfDate);
            }
            Ok(PresentOutcome::Presented)
        }
    }

    fn run(sched: &mut FrameScheduler<SimGpu>, frames: usize) -> Vec<FrameStatus> {
        (0..frames)
            .map(|_| sched.draw_frame().expect("frame"))
            .collect()
    }

    #[test]
    fn starts_absent_and_builds_on_first_frame() {
        let mut sched = FrameScheduler::new(SimGpu::new(3));
        assert_eq!(sched.state(), ResourceState::Absent);
        sched.draw_frame().unwrap();
        assert_eq!(sched.state(), ResourceState::Ready);
        assert_eq!(sched.backend().builds, 1);
        assert_eq!(sched.stats().rebuilds, 0);
        assert_eq!(sched.image_fences().len(), 3);
    }

    #[test]
    fn ten_frames_cycle_both_slots() {
        let mut sched = FrameScheduler::new(SimGpu::new(3));
        let statuses = run(&mut sched, 10);

        let slots: Vec<usize> = statuses
            .iter()
            .map(|s| match s {
                FrameStatus::Presented { slot, .. } => *slot,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0, 1, 0, 1, 0, 1]);

        let gpu = sched.backend();
        assert_eq!(gpu.presents, 10);
        assert_eq!(gpu.builds, 1);
        assert_eq!(sched.stats().frames_presented, 10);
        assert!(gpu.violations.is_empty(), "{:?}", gpu.violations);
        assert_eq!(gpu.max_in_flight, MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn never_more_than_two_slots_unsettled() {
        let mut sched = FrameScheduler::new(SimGpu::new(5));
        run(&mut sched, 50);
        assert!(sched.backend().max_in_flight <= MAX_FRAMES_IN_FLIGHT);
        assert!(sched.backend().violations.is_empty());
    }

    #[test]
    fn out_of_order_images_wait_on_their_previous_fence() {
        let order = [0, 1, 2, 2, 0, 1, 1, 0, 2, 0, 0, 2];
        let gpu = SimGpu::new(3).with_acquire_order(&order);
        let mut sched = FrameScheduler::new(gpu);
        run(&mut sched, 36);

        let gpu = sched.backend();
        assert!(gpu.violations.is_empty(), "{:?}", gpu.violations);

        // Each frame waits on its own slot and at most one other fence.
        let frames: Vec<&[Event]> = gpu
            .events
            .split(|e| matches!(e, Event::Present(..)))
            .filter(|f| !f.is_empty())
            .collect();
        for frame in frames {
            let waits = frame.iter().filter(|e| matches!(e, Event::Wait(_))).count();
            assert!(waits <= 2, "frame waited {waits} times: {frame:?}");
        }

        // Image 2 is drawn by slot 0 on frame 2 and again by slot 1 on
        // frame 3; the second use must wait on slot 0 before its uniforms
        // are written.
        let first = gpu
            .events
            .iter()
            .position(|e| *e == Event::Write(2))
            .unwrap();
        let second = first
            + 1
            + gpu.events[first + 1..]
                .iter()
                .position(|e| *e == Event::Write(2))
                .unwrap();
        assert_eq!(gpu.events[first + 1..second].first(), Some(&Event::Reset(0)));
        assert_eq!(gpu.events[second - 2], Event::Acquire(1));
        assert_eq!(gpu.events[second - 1], Event::Wait(0));
    }

    #[test]
    fn image_fence_recorded_before_uniform_write() {
        let mut sched = FrameScheduler::new(SimGpu::new(2));
        sched.draw_frame().unwrap();
        assert_eq!(sched.image_fences(), &[Some(0), None]);
        sched.draw_frame().unwrap();
        assert_eq!(sched.image_fences(), &[Some(0), Some(1)]);
    }

    #[test]
    fn resize_between_frames_three_and_four_rebuilds_once() {
        let mut sched = FrameScheduler::new(SimGpu::new(3));
        let before = run(&mut sched, 3);
        assert!(before
            .iter()
            .all(|s| matches!(s, FrameStatus::Presented { .. })));

        sched.backend_mut().window = (1024, 768);
        sched.notify_resized();
        let acquires_before = sched.backend().acquires;

        let after = run(&mut sched, 7);
        assert!(
            after
                .iter()
                .all(|s| matches!(s, FrameStatus::Presented { .. })),
            "{after:?}"
        );

        let gpu = sched.backend();
        assert_eq!(sched.stats().rebuilds, 1);
        assert_eq!(gpu.builds, 2);
        assert_eq!(gpu.live_sets, 1);
        assert_eq!(gpu.extent, (1024, 768));
        assert_eq!(gpu.presents, 10);
        assert_eq!(gpu.acquires, acquires_before + 7);
        let rebuild = gpu.events.iter().rposition(|e| *e == Event::Rebuild).unwrap();
        let frame_four = gpu
            .events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, Event::Acquire(_)))
            .nth(3)
            .map(|(i, _)| i)
            .unwrap();
        assert!(rebuild < frame_four);
        assert!(!sched.resize_pending());
        assert!(gpu.violations.is_empty(), "{:?}", gpu.violations);
    }

    #[test]
    fn repeated_invalidations_collapse_into_one_rebuild() {
        let mut sched = FrameScheduler::new(SimGpu::new(3));
        run(&mut sched, 2);

        sched.backend_mut().next_image_count = Some(4);
        for _ in 0..5 {
            sched.invalidate(InvalidationCause::External);
            sched.notify_resized();
        }
        assert_eq!(sched.state(), ResourceState::Stale);

        sched.draw_frame().unwrap();
        let gpu = sched.backend();
        assert_eq!(gpu.builds, 2);
        assert_eq!(gpu.live_sets, 1);
        assert_eq!(sched.stats().rebuilds, 1);
        assert_eq!(sched.image_fences().len(), 4);
        assert_eq!(gpu.uniforms.len(), 4);
        assert_eq!(sched.state(), ResourceState::Ready);
    }

    #[test]
    fn rebuild_happens_before_the_next_acquire() {
        let mut gpu = SimGpu::new(3);
        gpu.suboptimal_presents.insert(1);
        let mut sched = FrameScheduler::new(gpu);

        run(&mut sched, 2);
        assert_eq!(sched.state(), ResourceState::Stale);

        sched.draw_frame().unwrap();
        let events = &sched.backend().events;
        let rebuild = events.iter().rposition(|e| *e == Event::Rebuild).unwrap();
        let acquire = events
            .iter()
            .rposition(|e| matches!(e, Event::Acquire(_)))
            .unwrap();
        assert!(rebuild < acquire);
        assert_eq!(sched.stats().rebuilds, 1);
    }

    #[test]
    fn out_of_date_acquire_rebuilds_and_skips_the_frame() {
        let mut gpu = SimGpu::new(3);
        gpu.out_of_date_acquires.insert(2);
        let mut sched = FrameScheduler::new(gpu);

        let statuses = run(&mut sched, 4);
        assert_eq!(statuses[2], FrameStatus::Skipped(SkipReason::Rebuilt));
        assert!(matches!(statuses[3], FrameStatus::Presented { .. }));

        let gpu = sched.backend();
        assert_eq!(gpu.presents, 3);
        assert_eq!(sched.stats().rebuilds, 1);
        assert_eq!(sched.stats().frames_skipped, 1);
        assert!(gpu.violations.is_empty(), "{:?}", gpu.violations);
    }

    #[test]
    fn out_of_date_present_drops_the_frame_and_rebuilds() {
        let mut sched = FrameScheduler::new(SimGpu::new(3));
        run(&mut sched, 1);

        // surface changed without a resize notification
        sched.backend_mut().window = (640, 480);
        let status = sched.draw_frame().unwrap();
        assert!(matches!(status, FrameStatus::Dropped { .. }));
        assert_eq!(sched.state(), ResourceState::Stale);

        let status = sched.draw_frame().unwrap();
        assert!(matches!(status, FrameStatus::Presented { .. }));
        assert_eq!(sched.backend().extent, (640, 480));
        assert_eq!(sched.stats().frames_dropped, 1);
    }

    #[test]
    fn zero_extent_defers_until_the_window_returns() {
        let mut sched = FrameScheduler::new(SimGpu::new(3));
        run(&mut sched, 2);

        sched.backend_mut().window = (0, 0);
        sched.invalidate(InvalidationCause::Resize);
        let acquires = sched.backend().acquires;
        for _ in 0..3 {
            assert_eq!(
                sched.draw_frame().unwrap(),
                FrameStatus::Skipped(SkipReason::Stalled)
            );
        }
        assert_eq!(sched.state(), ResourceState::Stale);
        assert_eq!(sched.backend().acquires, acquires);
        assert_eq!(sched.backend().live_sets, 1);

        sched.backend_mut().window = (300, 200);
        assert!(matches!(
            sched.draw_frame().unwrap(),
            FrameStatus::Presented { .. }
        ));
        assert_eq!(sched.backend().extent, (300, 200));
        assert_eq!(sched.stats().rebuilds, 1);
    }

    #[test]
    fn option_change_rebuilds_once_and_keeps_presenting() {
        let mut sched = FrameScheduler::new(SimGpu::new(3));
        run(&mut sched, 3);

        sched.invalidate(InvalidationCause::External);
        sched.invalidate(InvalidationCause::External);
        let statuses = run(&mut sched, 4);
        assert!(statuses
            .iter()
            .all(|s| matches!(s, FrameStatus::Presented { .. })));
        assert_eq!(sched.stats().rebuilds, 1);
        assert_eq!(sched.backend().builds, 2);
        assert!(sched.backend().violations.is_empty());
    }

    #[test]
    fn invalidating_an_absent_set_is_a_no_op() {
        let mut sched = FrameScheduler::new(SimGpu::new(2));
        sched.invalidate(InvalidationCause::External);
        assert_eq!(sched.state(), ResourceState::Absent);
    }

    #[test]
    fn fatal_backend_errors_propagate() {
        let mut gpu = SimGpu::new(3);
        gpu.fail_submit_at = Some(1);
        let mut sched = FrameScheduler::new(gpu);

        sched.draw_frame().unwrap();
        let err = sched.draw_frame().unwrap_err();
        assert!(format!("{err:#}").contains("ERROR_DEVICE_LOST"));
    }
}
