//! Deferred calls from interrupt context into the main task.

use core::sync::atomic::{AtomicU32, Ordering};

use heapless::mpmc::MpMcQueue;
use log::warn;

use crate::ticks::Ticks;

/// Pending calls the queue holds before new ones are dropped.
pub const SCHEDULER_DEPTH: usize = 8;

/// A callback run by the main task with a captured timestamp.
pub type Callback = &'static (dyn Fn(Ticks) + Sync);

/// Wakes the main task from interrupt context.
pub trait Wake: Sync {
    fn wake_from_isr(&self);
}

impl Wake for std::thread::Thread {
    fn wake_from_isr(&self) {
        self.unpark();
    }
}

/// The two primitives an ISR may use to hand work to the main task. Neither may
/// block or allocate.
pub trait Schedule: Sync {
    /// Queues `callback(arg)`. Returns `false` if the queue is full.
    fn schedule(&self, callback: Callback, arg: Ticks) -> bool;

    fn wake_main_from_isr(&self);
}

struct Pending {
    callback: Callback,
    arg: Ticks,
}

/// Bounded lock-free queue of callbacks, drained by the main task.
pub struct Scheduler<W, const N: usize = SCHEDULER_DEPTH> {
    queue: MpMcQueue<Pending, N>,
    waker: W,
    dropped: AtomicU32,
}

impl<W: Wake, const N: usize> Scheduler<W, N> {
    pub const fn new(waker: W) -> Self {
        Self {
            queue: MpMcQueue::new(),
            waker,
            dropped: AtomicU32::new(0),
        }
    }

    /// Runs the callbacks queued so far, in order. Calls queued while this runs
    /// wait for the next round. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let dropped = self.dropped.swap(0, Ordering::AcqRel);
        if dropped > 0 {
            warn!("Scheduler queue full, {} calls dropped", dropped);
        }

        let mut ran = 0;
        while ran < N {
            let Some(pending) = self.queue.dequeue() else {
                break;
            };
            (pending.callback)(pending.arg);
            ran += 1;
        }
        ran
    }

    /// Calls rejected since the last [`Self::run_pending`].
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Acquire)
    }

    pub fn waker(&self) -> &W {
        &self.waker
    }
}

impl<W: Wake, const N: usize> Schedule for Scheduler<W, N> {
    fn schedule(&self, callback: Callback, arg: Ticks) -> bool {
        match self.queue.enqueue(Pending { callback, arg }) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::AcqRel);
                false
            }
        }
    }

    fn wake_main_from_isr(&self) {
        self.waker.wake_from_isr();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CountingWake(AtomicUsize);

    impl Wake for CountingWake {
        fn wake_from_isr(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn recorder() -> (Callback, Arc<Mutex<Vec<Ticks>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: Callback = Box::leak(Box::new(move |t: Ticks| sink.lock().unwrap().push(t)));
        (callback, seen)
    }

    #[test]
    fn runs_in_fifo_order() {
        let scheduler: Scheduler<_, 4> = Scheduler::new(CountingWake::default());
        let (callback, seen) = recorder();

        for us in [10, 20, 30] {
            assert!(scheduler.schedule(callback, Ticks::from_micros(us)));
        }
        assert_eq!(scheduler.run_pending(), 3);

        let seen: Vec<u32> = seen.lock().unwrap().iter().map(|t| t.as_u32()).collect();
        assert_eq!(seen, [10, 20, 30]);
        assert_eq!(scheduler.run_pending(), 0);
    }

    #[test]
    fn full_queue_rejects_without_blocking() {
        let scheduler: Scheduler<_, 4> = Scheduler::new(CountingWake::default());
        let (callback, seen) = recorder();

        let mut accepted = 0;
        while scheduler.schedule(callback, Ticks::from_micros(accepted)) {
            accepted += 1;
            assert!(accepted <= 4, "queue grew past its capacity");
        }
        assert!(accepted > 0);
        assert_eq!(scheduler.dropped(), 1);
        assert!(!scheduler.schedule(callback, Ticks::default()));
        assert_eq!(scheduler.dropped(), 2);

        assert_eq!(scheduler.run_pending(), accepted as usize);
        assert_eq!(scheduler.dropped(), 0);
        assert_eq!(seen.lock().unwrap().len(), accepted as usize);
    }

    #[test]
    fn wake_reaches_the_waker() {
        let scheduler: Scheduler<_> = Scheduler::new(CountingWake::default());
        scheduler.wake_main_from_isr();
        scheduler.wake_main_from_isr();
        assert_eq!(scheduler.waker().0.load(Ordering::Relaxed), 2);
    }
}
