//! Diagnostic recording of heap-walk steps.
//!
//! Walking a corrupt heap tends to fail far away from the corruption that caused it. When
//! enabled via [`log_heap_walk_steps`], every sizing decision the object scanner makes is
//! recorded into a per-thread circular buffer, so the steps leading up to a bad advance can
//! be recovered after the fact with [`heap_walk_steps`].
//!
//! The buffer is thread-local: concurrent walks never contend, and each thread sees only
//! its own window. Enablement is process-wide and costs a single relaxed atomic load per
//! step when disabled.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One recorded sizing step of the object scanner.
///
/// A `base_size` of -1 marks a corruption sentinel: the scanner detected a non-progressing
/// or overshooting advance and abandoned the segment at `object`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapWalkStep {
    /// Address of the object being sized.
    pub object: u64,
    /// The method table read at the object, 0 for sentinel records.
    pub method_table: u64,
    /// The type's static size, or -1 for corruption sentinels.
    pub base_size: i32,
    /// The type's component size.
    pub component_size: u32,
    /// The array element count read from the object, 0 for non-arrays.
    pub count: u32,
}

/// Requested buffer capacity; 0 disables recording.
static STEP_BUFFER_SIZE: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static STEPS: RefCell<Option<StepRing>> = const { RefCell::new(None) };
}

struct StepRing {
    steps: Vec<HeapWalkStep>,
    capacity: usize,
    next: usize,
}

impl StepRing {
    fn new(capacity: usize) -> Self {
        StepRing {
            steps: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        }
    }

    fn push(&mut self, step: HeapWalkStep) {
        if self.steps.len() < self.capacity {
            self.steps.push(step);
        } else {
            self.steps[self.next] = step;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    /// The retained window, oldest first.
    fn window(&self) -> Vec<HeapWalkStep> {
        if self.steps.len() < self.capacity {
            self.steps.clone()
        } else {
            let mut out = Vec::with_capacity(self.capacity);
            out.extend_from_slice(&self.steps[self.next..]);
            out.extend_from_slice(&self.steps[..self.next]);
            out
        }
    }
}

/// Enables process-wide recording of heap-walk steps into per-thread circular buffers of
/// `buffer_size` entries. A size of 0 disables recording.
///
/// Threads pick up the new size the next time they record a step; an existing buffer of a
/// different size is replaced, dropping its contents.
pub fn log_heap_walk_steps(buffer_size: usize) {
    STEP_BUFFER_SIZE.store(buffer_size, Ordering::Relaxed);
}

/// Returns the current thread's retained walk steps, oldest first.
///
/// Empty when recording is disabled or this thread has not walked a heap since it was
/// enabled.
#[must_use]
pub fn heap_walk_steps() -> Vec<HeapWalkStep> {
    STEPS.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(StepRing::window)
            .unwrap_or_default()
    })
}

/// Records one step into the current thread's buffer, if recording is enabled.
pub(crate) fn record_step(step: HeapWalkStep) {
    let capacity = STEP_BUFFER_SIZE.load(Ordering::Relaxed);
    if capacity == 0 {
        return;
    }

    STEPS.with(|slot| {
        let mut ring = slot.borrow_mut();
        match ring.as_mut() {
            Some(existing) if existing.capacity == capacity => existing.push(step),
            _ => {
                let mut fresh = StepRing::new(capacity);
                fresh.push(step);
                *ring = Some(fresh);
            }
        }
    });
}
