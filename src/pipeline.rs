//! Double-buffered frame hand-off
//!
//! The physics thread publishes snapshots and a consumer displays them at its
//! own rate. Two frame slots trade roles every time a display finishes:
//! - `next`: holds the frame to display once `Ready`
//! - `current` (the other one): the last frame displayed
//!
//! While `next` is being displayed the producer writes `current` instead, and
//! the slots swap when the display ends. A frame written during a display is
//! therefore `Ready` as soon as the guard drops.
//!
//! State cycle: `Computing -> Ready -> Displaying -> Swapping -> Computing`,
//! or straight back to `Ready` when the producer published mid-display. The
//! producer never waits on the consumer, and a `Ready` frame not yet taken is
//! replaced by the fresher one.
//!
//! Slots may be locked while control is held. The producer only ever locks
//! the slot not being displayed, so the consumer can take control to finish
//! the display without deadlocking.

use std::ops::Deref;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;

use crate::metrics::TickMetrics;
use crate::snapshot::BodyInstance;

/// Where the hand-off currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameState {
    /// Producer owns `next`; nothing to display
    Computing,
    /// `next` holds a complete frame
    Ready,
    /// Consumer is reading `next`; producer writes `current`
    Displaying,
    /// Slots are exchanging roles
    Swapping,
}

/// What `Pipeline::publish` did with a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PublishOutcome {
    Published,
    /// Replaced a frame the consumer never took
    Superseded,
    /// Pipeline shut down; nothing written
    Shutdown,
}

/// One complete snapshot of the world
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub tick: u64,
    /// Simulated seconds at `tick`
    pub sim_time: f64,
    pub bodies: Vec<BodyInstance>,
    /// Counters from the tick that produced this frame
    pub metrics: TickMetrics,
}

#[derive(Debug)]
struct Control {
    state: FrameState,
    /// Index of the slot holding the frame to display
    next: usize,
    /// `current` was written during the display in progress
    written_behind: bool,
    shutdown: bool,
    swaps: u64,
}

impl Control {
    /// Slot the producer may write right now
    fn back(&self) -> usize {
        match self.state {
            FrameState::Displaying => 1 - self.next,
            _ => self.next,
        }
    }
}

/// Double buffer shared by one producer and one consumer
#[derive(Debug)]
pub struct Pipeline {
    control: Mutex<Control>,
    changed: Condvar,
    slots: [Mutex<Frame>; 2],
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            control: Mutex::new(Control {
                state: FrameState::Computing,
                next: 0,
                written_behind: false,
                shutdown: false,
                swaps: 0,
            }),
            changed: Condvar::new(),
            slots: [Mutex::new(Frame::default()), Mutex::new(Frame::default())],
        }
    }

    /// Write a frame into whichever slot is not being displayed.
    ///
    /// Never blocks on the consumer: the swap at the end of a display happens
    /// inside one critical section. `write` runs with the slot locked and
    /// should only copy data in.
    pub fn publish(&self, write: impl FnOnce(&mut Frame)) -> PublishOutcome {
        let mut control = self.control.lock();
        if control.shutdown {
            return PublishOutcome::Shutdown;
        }

        let slot = control.back();
        let outcome = match control.state {
            FrameState::Ready => PublishOutcome::Superseded,
            FrameState::Displaying if control.written_behind => PublishOutcome::Superseded,
            FrameState::Displaying | FrameState::Computing | FrameState::Swapping => {
                PublishOutcome::Published
            }
        };

        write(&mut *self.slots[slot].lock());
        if control.state == FrameState::Displaying {
            control.written_behind = true;
        } else {
            control.state = FrameState::Ready;
        }
        drop(control);

        self.changed.notify_all();
        outcome
    }

    /// Wait up to `timeout` for a `Ready` frame and start displaying it.
    ///
    /// Returns `None` on timeout or shutdown. Dropping the returned guard
    /// swaps the slots.
    pub fn begin_display(&self, timeout: Duration) -> Option<DisplayFrame<'_>> {
        let mut control = self.control.lock();
        let wait = self.changed.wait_while_for(
            &mut control,
            |c| c.state != FrameState::Ready && !c.shutdown,
            timeout,
        );

        if control.shutdown {
            return None;
        }
        if wait.timed_out() && control.state != FrameState::Ready {
            log::trace!("No frame ready within {:?}", timeout);
            return None;
        }

        control.state = FrameState::Displaying;
        control.written_behind = false;
        let slot = control.next;
        drop(control);

        Some(DisplayFrame {
            pipeline: self,
            frame: self.slots[slot].lock(),
        })
    }

    fn finish_display(&self) {
        let mut control = self.control.lock();
        control.state = FrameState::Swapping;
        control.next = 1 - control.next;
        control.swaps += 1;
        control.state = if std::mem::take(&mut control.written_behind) {
            FrameState::Ready
        } else {
            FrameState::Computing
        };
        drop(control);

        self.changed.notify_all();
    }

    /// Copy of the most recently displayed frame.
    ///
    /// Waits for a display in progress to finish, so it must not be called
    /// while holding a `DisplayFrame` from the same pipeline.
    pub fn latest_displayed(&self) -> Frame {
        let mut control = self.control.lock();
        self.changed
            .wait_while(&mut control, |c| c.state == FrameState::Displaying);
        self.slots[1 - control.next].lock().clone()
    }

    /// Wake every waiter; later publishes and displays return immediately
    pub fn shutdown(&self) {
        self.control.lock().shutdown = true;
        self.changed.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.control.lock().shutdown
    }

    pub fn state(&self) -> FrameState {
        self.control.lock().state
    }

    /// Completed displays so far
    pub fn swaps(&self) -> u64 {
        self.control.lock().swaps
    }
}

/// Read access to a frame being displayed
///
/// Dropping it finishes the display.
pub struct DisplayFrame<'a> {
    pipeline: &'a Pipeline,
    frame: MutexGuard<'a, Frame>,
}

impl Deref for DisplayFrame<'_> {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.frame
    }
}

impl Drop for DisplayFrame<'_> {
    fn drop(&mut self) {
        self.pipeline.finish_display();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    fn frame_at(tick: u64) -> impl FnOnce(&mut Frame) {
        move |frame: &mut Frame| {
            frame.tick = tick;
            frame.bodies.clear();
            frame
                .bodies
                .resize(64, BodyInstance::new(tick as f32, tick as f32, 1.0, 0));
        }
    }

    #[test]
    fn test_publish_then_display() {
        let pipeline = Pipeline::new();
        assert_eq!(pipeline.state(), FrameState::Computing);

        assert_eq!(pipeline.publish(frame_at(1)), PublishOutcome::Published);
        assert_eq!(pipeline.state(), FrameState::Ready);

        let frame = pipeline.begin_display(Duration::ZERO).unwrap();
        assert_eq!(frame.tick, 1);
        assert_eq!(pipeline.state(), FrameState::Displaying);

        drop(frame);

        assert_eq!(pipeline.state(), FrameState::Computing);
        assert_eq!(pipeline.swaps(), 1);
        assert_eq!(pipeline.latest_displayed().tick, 1);
        assert!(pipeline.begin_display(Duration::ZERO).is_none());
    }

    #[test]
    fn test_frame_written_during_display_is_ready_after() {
        let pipeline = Pipeline::new();
        pipeline.publish(frame_at(1));

        let frame = pipeline.begin_display(Duration::ZERO).unwrap();
        // Producer keeps going into the other slot
        assert_eq!(pipeline.publish(frame_at(2)), PublishOutcome::Published);
        assert_eq!(frame.tick, 1);
        assert_eq!(frame.bodies[0].position, [1.0; 2]);
        assert_eq!(pipeline.state(), FrameState::Displaying);
        drop(frame);

        assert_eq!(pipeline.state(), FrameState::Ready);
        assert_eq!(pipeline.latest_displayed().tick, 1);

        let frame = pipeline.begin_display(Duration::ZERO).unwrap();
        assert_eq!(frame.tick, 2);
        drop(frame);
        assert_eq!(pipeline.latest_displayed().tick, 2);
        assert_eq!(pipeline.swaps(), 2);
    }

    #[test]
    fn test_newest_frame_written_during_display_wins() {
        let pipeline = Pipeline::new();
        pipeline.publish(frame_at(1));

        let frame = pipeline.begin_display(Duration::ZERO).unwrap();
        assert_eq!(pipeline.publish(frame_at(2)), PublishOutcome::Published);
        assert_eq!(pipeline.publish(frame_at(3)), PublishOutcome::Superseded);
        drop(frame);

        // Superseding a Ready frame reuses the same slot
        assert_eq!(pipeline.publish(frame_at(4)), PublishOutcome::Superseded);
        let frame = pipeline.begin_display(Duration::ZERO).unwrap();
        assert_eq!(frame.tick, 4);
        drop(frame);
        assert_eq!(pipeline.latest_displayed().tick, 4);
    }

    #[test]
    fn test_latest_displayed_waits_for_display_to_finish() {
        let pipeline = Pipeline::new();
        pipeline.publish(frame_at(1));

        thread::scope(|s| {
            let frame = pipeline.begin_display(Duration::ZERO).unwrap();
            let reader = s.spawn(|| pipeline.latest_displayed().tick);
            thread::sleep(Duration::from_millis(20));
            assert!(!reader.is_finished());
            drop(frame);
            assert_eq!(reader.join().unwrap(), 1);
        });
    }

    #[test]
    fn test_ready_frame_is_superseded() {
        let pipeline = Pipeline::new();
        assert_eq!(pipeline.publish(frame_at(1)), PublishOutcome::Published);
        assert_eq!(pipeline.publish(frame_at(2)), PublishOutcome::Superseded);

        let frame = pipeline.begin_display(Duration::ZERO).unwrap();
        assert_eq!(frame.tick, 2);
    }

    #[test]
    fn test_slots_alternate() {
        let pipeline = Pipeline::new();
        for tick in 1..=4 {
            pipeline.publish(frame_at(tick));
            let frame = pipeline.begin_display(Duration::ZERO).unwrap();
            assert_eq!(frame.tick, tick);
        }
        assert_eq!(pipeline.swaps(), 4);
        assert_eq!(pipeline.latest_displayed().tick, 4);
    }

    #[test]
    fn test_display_times_out_without_frame() {
        let pipeline = Pipeline::new();
        let start = Instant::now();
        assert!(pipeline.begin_display(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(10));
        assert_eq!(pipeline.latest_displayed(), Frame::default());
    }

    #[test]
    fn test_shutdown_wakes_consumer() {
        let pipeline = Pipeline::new();

        thread::scope(|s| {
            let waiter = s.spawn(|| pipeline.begin_display(Duration::from_secs(10)).is_none());
            thread::sleep(Duration::from_millis(20));
            pipeline.shutdown();
            assert!(waiter.join().unwrap());
        });

        assert!(pipeline.is_shutdown());
        assert_eq!(pipeline.publish(frame_at(1)), PublishOutcome::Shutdown);
    }

    #[test]
    fn test_frames_never_tear_across_threads() {
        let pipeline = Pipeline::new();
        const LAST: u64 = 2000;

        let seen = thread::scope(|s| {
            s.spawn(|| {
                for tick in 1..=LAST {
                    pipeline.publish(frame_at(tick));
                    thread::sleep(Duration::from_micros(50));
                }
                pipeline.shutdown();
            });

            let mut seen = Vec::new();
            while let Some(frame) = pipeline.begin_display(Duration::from_secs(5)) {
                let tick = frame.tick;
                assert!(
                    frame.bodies.iter().all(|b| b.position == [tick as f32; 2]),
                    "frame {tick} mixes ticks"
                );
                assert_eq!(frame.bodies.len(), 64);
                seen.push(tick);
            }
            seen
        });

        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "ticks went backwards");
        assert!(seen.iter().all(|&t| (1..=LAST).contains(&t)));
    }
}
