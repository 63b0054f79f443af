pub mod frame;

use color_eyre::Result;
use color_eyre::eyre::{eyre, OptionExt};

pub const FRAME_OVERLAP: usize = 2;

/// How long a frame fence may stay unsignaled before the GPU is considered hung
pub const FRAME_FENCE_TIMEOUT_NS: u64 = 1_000_000_000;

pub fn active_index(frame_number: u64) -> usize {
    (frame_number % FRAME_OVERLAP as u64) as usize
}

/// The fence a frame's submission signals on completion
pub trait FrameFence {
    fn wait(&self, timeout_ns: u64) -> Result<()>;
    fn reset(&self) -> Result<()>;
}

pub trait FrameSlot {
    type Fence: FrameFence;

    fn render_fence(&self) -> &Self::Fence;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Fence signaled, safe to record
    Idle,
    Recording,
    /// Handed to the GPU; the fence is unsignaled until it finishes
    Submitted,
}

/// Responsibilities:
/// - Cycle through `FRAME_OVERLAP` slots by frame number
/// - Gate every reuse of a slot on its render fence
/// - Track which slot is being recorded or is in flight
pub struct FrameRing<S> {
    slots: Vec<S>,
    states: Vec<FrameState>,
    frame_number: u64,
}

impl<S: FrameSlot> FrameRing<S> {
    pub fn new(slots: Vec<S>) -> Result<Self> {
        if slots.len() != FRAME_OVERLAP {
            return Err(eyre!(
                "Expected {} frame slots, got {}",
                FRAME_OVERLAP,
                slots.len(),
            ));
        }
        let states = vec![FrameState::Idle; slots.len()];
        Ok(Self {
            slots,
            states,
            frame_number: 0,
        })
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn current_index(&self) -> usize {
        active_index(self.frame_number)
    }

    #[cfg(test)]
    pub fn state(&self, index: usize) -> Option<FrameState> {
        self.states.get(index).copied()
    }

    pub fn current(&self) -> Result<&S> {
        self.slots
            .get(self.current_index())
            .ok_or_eyre("Frame slot out of range")
    }

    /// Blocks until the GPU is done with the current slot, then lets `on_reuse`
    /// release whatever that slot's previous submission kept alive.
    ///
    /// The fence is left signaled; it is only reset by [`begin_recording`](Self::begin_recording).
    pub fn wait_for_current(
        &mut self,
        timeout_ns: u64,
        on_reuse: impl FnOnce(&mut S) -> Result<()>,
    ) -> Result<usize> {
        let index = self.current_index();
        if self.states[index] == FrameState::Recording {
            return Err(eyre!("Frame slot {} is still being recorded", index));
        }

        self.slots[index].render_fence().wait(timeout_ns)?;
        self.states[index] = FrameState::Idle;
        on_reuse(&mut self.slots[index])?;
        Ok(index)
    }

    /// Idle -> Recording. Resets the fence, so a submission must follow.
    pub fn begin_recording(&mut self) -> Result<&mut S> {
        let index = self.current_index();
        if self.states[index] != FrameState::Idle {
            return Err(eyre!(
                "Frame slot {} cannot start recording from {:?}",
                index,
                self.states[index],
            ));
        }
        self.slots[index].render_fence().reset()?;
        self.states[index] = FrameState::Recording;
        Ok(&mut self.slots[index])
    }

    /// Recording -> Submitted
    pub fn mark_submitted(&mut self) -> Result<()> {
        let index = self.current_index();
        if self.states[index] != FrameState::Recording {
            return Err(eyre!(
                "Frame slot {} was submitted from {:?}",
                index,
                self.states[index],
            ));
        }
        self.states[index] = FrameState::Submitted;
        Ok(())
    }

    pub fn advance(&mut self) {
        self.frame_number += 1;
    }

    /// Waits on every in-flight slot
    pub fn wait_all(&mut self, timeout_ns: u64) -> Result<()> {
        for (slot, state) in self.slots.iter().zip(self.states.iter_mut()) {
            if *state == FrameState::Submitted {
                slot.render_fence().wait(timeout_ns)?;
                *state = FrameState::Idle;
            }
        }
        Ok(())
    }

    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut S> {
        self.slots.iter_mut()
    }

    pub fn into_slots(self) -> Vec<S> {
        self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use crate::renderer::deletion_queue::DeletionQueue;

    /// Signals on `release`, or on every reset when `auto_signal` is set
    struct MockFence {
        signaled: Cell<bool>,
        auto_signal: bool,
    }

    impl MockFence {
        fn new(auto_signal: bool) -> Self {
            Self {
                signaled: Cell::new(true),
                auto_signal,
            }
        }

        fn release(&self) {
            self.signaled.set(true);
        }
    }

    impl FrameFence for MockFence {
        fn wait(&self, _timeout_ns: u64) -> Result<()> {
            if self.signaled.get() {
                Ok(())
            } else {
                Err(eyre!("Timed out waiting for render fence"))
            }
        }

        fn reset(&self) -> Result<()> {
            self.signaled.set(self.auto_signal);
            Ok(())
        }
    }

    struct TestSlot {
        fence: MockFence,
        deletion_queue: DeletionQueue<u64>,
        flushed: Vec<u64>,
        flush_count: u32,
    }

    impl TestSlot {
        fn new(auto_signal: bool) -> Self {
            Self {
                fence: MockFence::new(auto_signal),
                deletion_queue: DeletionQueue::new(),
                flushed: Vec::new(),
                flush_count: 0,
            }
        }
    }

    impl FrameSlot for TestSlot {
        type Fence = MockFence;

        fn render_fence(&self) -> &MockFence {
            &self.fence
        }
    }

    fn ring(auto_signal: bool) -> FrameRing<TestSlot> {
        FrameRing::new((0..FRAME_OVERLAP).map(|_| TestSlot::new(auto_signal)).collect()).unwrap()
    }

    fn flush_slot(slot: &mut TestSlot) -> Result<()> {
        slot.flush_count += 1;
        let flushed = &mut slot.flushed;
        slot.deletion_queue.flush(|frame| flushed.push(frame));
        Ok(())
    }

    /// One pass through Idle -> Recording -> Submitted, registering a per-frame resource
    fn run_frame(ring: &mut FrameRing<TestSlot>) -> Result<usize> {
        let index = ring.wait_for_current(FRAME_FENCE_TIMEOUT_NS, flush_slot)?;
        let frame_number = ring.frame_number();
        let slot = ring.begin_recording()?;
        slot.deletion_queue.push(frame_number);
        ring.mark_submitted()?;
        ring.advance();
        Ok(index)
    }

    #[test]
    fn index_cycles_modulo_overlap() {
        for n in 0..(2 * FRAME_OVERLAP as u64) {
            assert_eq!(active_index(n), (n % FRAME_OVERLAP as u64) as usize);
        }
    }

    #[test]
    fn five_frames_alternate_slots_and_flush_once_per_reuse() {
        let mut ring = ring(true);
        let indices: Vec<usize> = (0..5).map(|_| run_frame(&mut ring).unwrap()).collect();
        assert_eq!(indices, vec![0, 1, 0, 1, 0]);

        let slots = ring.into_slots();
        // Slot 0 ran frames 0, 2, 4; slot 1 ran frames 1, 3
        assert_eq!(slots[0].flush_count, 3);
        assert_eq!(slots[1].flush_count, 2);
        // Each reuse released exactly what the previous submission on that slot registered
        assert_eq!(slots[0].flushed, vec![0, 2]);
        assert_eq!(slots[1].flushed, vec![1]);

        for mut slot in slots {
            slot.deletion_queue.flush(|_| {});
        }
    }

    #[test]
    fn slot_is_not_reused_before_its_fence_signals() {
        let mut ring = ring(false);
        assert_eq!(run_frame(&mut ring).unwrap(), 0);
        assert_eq!(run_frame(&mut ring).unwrap(), 1);
        assert_eq!(ring.state(0), Some(FrameState::Submitted));
        assert_eq!(ring.state(1), Some(FrameState::Submitted));

        // Frame 2 maps onto slot 0, whose previous submission has not completed
        let flushes_before = ring.current().unwrap().flush_count;
        assert!(ring.wait_for_current(FRAME_FENCE_TIMEOUT_NS, flush_slot).is_err());
        assert_eq!(ring.state(0), Some(FrameState::Submitted));
        assert_eq!(ring.current().unwrap().flush_count, flushes_before);

        ring.current().unwrap().fence.release();
        assert_eq!(run_frame(&mut ring).unwrap(), 0);
        assert_eq!(ring.state(0), Some(FrameState::Submitted));

        let mut slots = ring.into_slots();
        assert_eq!(slots[0].flushed, vec![0]);
        for slot in &mut slots {
            slot.deletion_queue.flush(|_| {});
        }
    }

    #[test]
    fn recording_twice_is_rejected() {
        let mut ring = ring(true);
        ring.wait_for_current(FRAME_FENCE_TIMEOUT_NS, flush_slot).unwrap();
        ring.begin_recording().unwrap();
        assert!(ring.begin_recording().is_err());
        assert!(ring.wait_for_current(FRAME_FENCE_TIMEOUT_NS, flush_slot).is_err());
        ring.mark_submitted().unwrap();
        assert!(ring.mark_submitted().is_err());
    }

    #[test]
    fn skipped_frame_keeps_the_fence_signaled() {
        let mut ring = ring(false);
        // Waiting without recording, as when acquiring a swapchain image fails
        ring.wait_for_current(FRAME_FENCE_TIMEOUT_NS, flush_slot).unwrap();
        assert!(ring.current().unwrap().fence.signaled.get());
        assert_eq!(ring.state(0), Some(FrameState::Idle));
        // The retry can wait again without blocking
        assert!(ring.wait_for_current(FRAME_FENCE_TIMEOUT_NS, flush_slot).is_ok());
    }

    #[test]
    fn wait_all_drains_in_flight_slots() {
        let mut ring = ring(false);
        run_frame(&mut ring).unwrap();
        run_frame(&mut ring).unwrap();
        assert!(ring.wait_all(FRAME_FENCE_TIMEOUT_NS).is_err());

        for slot in ring.slots_mut() {
            slot.fence.release();
        }
        ring.wait_all(FRAME_FENCE_TIMEOUT_NS).unwrap();
        assert_eq!(ring.state(0), Some(FrameState::Idle));
        assert_eq!(ring.state(1), Some(FrameState::Idle));

        for mut slot in ring.into_slots() {
            slot.deletion_queue.flush(|_| {});
        }
    }

    #[test]
    fn ring_size_must_match_overlap() {
        assert!(FrameRing::new(vec![TestSlot::new(true)]).is_err());
    }
}
