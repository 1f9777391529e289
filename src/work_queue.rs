//! Dynamically-growing parallel work queue.
//!
//! Used recursively by the scan phases: classpath-element opening (which
//! enqueues manifest `Class-Path` children from inside processors), path
//! scanning (one unit per element, no in-flight enqueues), and classfile
//! parsing (which enqueues external superclasses/interfaces/annotations when
//! upward closure is enabled).
//!
//! # Architecture
//!
//! - N worker threads, each with a Chase-Lev deque (LIFO local, FIFO steal).
//! - A global injector receives the initial units and every in-flight
//!   enqueue; workers batch-steal from it to reduce contention.
//! - A single atomic in-flight counter tracks unprocessed units: it is
//!   incremented *before* a unit is pushed and decremented *after* the unit
//!   finishes (or is discarded). The queue is drained exactly when the
//!   counter reaches zero, which is the `pending == 0 && active == 0`
//!   termination condition checked in one atomic.
//! - Tiered idle strategy: retry, yield, then park with a timeout. The
//!   timeout bounds the window of a missed wakeup, and all workers are
//!   unparked when the counter reaches zero.
//!
//! # Correctness invariants
//!
//! - **Work-conserving**: every enqueued unit is either processed or, after
//!   the interruption monitor trips, explicitly discarded.
//! - **Termination**: the in-flight counter only reaches zero when no unit
//!   is pending and no processor is running.
//! - **First failure wins**: a processor error or panic trips the monitor;
//!   later failures attach as suppressed context.
//! - **Cancellation promptness**: no unit starts processing after the
//!   monitor trips; running processors finish at their next cooperative
//!   check.
//!
//! A single-threaded queue (`parallelism == 1`) is legal and observable only
//! by processing order, never by outcomes.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use crossbeam_utils::sync::{Parker, Unparker};

use crate::errors::ScanError;
use crate::interrupt::InterruptionMonitor;
use crate::log::ScanLog;

/// Retry rounds before yielding, and yields before parking.
const IDLE_RETRIES: u32 = 16;
const IDLE_YIELDS: u32 = 4;
const PARK_TIMEOUT: Duration = Duration::from_micros(200);

struct Shared<W> {
    injector: Injector<W>,
    stealers: Vec<Stealer<W>>,

    /// Unprocessed units: pending in a queue plus actively processing.
    in_flight: AtomicUsize,

    unparkers: Vec<Unparker>,
    next_unpark: AtomicUsize,
}

impl<W> Shared<W> {
    fn unpark_one(&self) {
        let n = self.unparkers.len();
        if n == 0 {
            return;
        }
        let idx = self.next_unpark.fetch_add(1, Ordering::Relaxed) % n;
        self.unparkers[idx].unpark();
    }

    fn unpark_all(&self) {
        for unparker in &self.unparkers {
            unparker.unpark();
        }
    }

    /// Marks one unit complete; wakes everyone when the queue drains.
    fn finish_unit(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.unpark_all();
        }
    }
}

/// Handle passed to processors for in-flight enqueueing.
///
/// Adding work from within a processor is safe; the new units are visible to
/// any idle worker.
pub struct WorkQueue<'a, W: Send> {
    shared: &'a Shared<W>,
}

impl<W: Send> WorkQueue<'_, W> {
    /// Enqueues one additional unit.
    pub fn add_work_unit(&self, unit: W) {
        // Increment before the push so the counter never under-reports.
        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
        self.shared.injector.push(unit);
        self.shared.unpark_one();
    }

    /// Enqueues additional units.
    pub fn add_work_units(&self, units: impl IntoIterator<Item = W>) {
        for unit in units {
            self.add_work_unit(unit);
        }
    }
}

/// Runs `processor` over `initial` and every unit added in flight, on
/// `parallelism` worker threads, until the queue drains or the monitor trips.
///
/// A processor error or panic becomes the scan-terminal failure (first one
/// wins); remaining pending units are then discarded. Returns the monitor's
/// verdict, so a tripped monitor surfaces here even when the trip came from
/// outside the queue.
pub fn run_work_queue<W, F>(
    initial: Vec<W>,
    parallelism: usize,
    monitor: &InterruptionMonitor,
    log: &ScanLog,
    processor: F,
) -> Result<(), ScanError>
where
    W: Send,
    F: Fn(W, &WorkQueue<'_, W>, &ScanLog) -> Result<(), ScanError> + Sync,
{
    if initial.is_empty() {
        return monitor.check();
    }
    let workers = parallelism.max(1);

    let locals: Vec<Worker<W>> = (0..workers).map(|_| Worker::new_lifo()).collect();
    let stealers = locals.iter().map(Worker::stealer).collect();
    let parkers: Vec<Parker> = (0..workers).map(|_| Parker::new()).collect();
    let unparkers = parkers.iter().map(Parker::unparker).cloned().collect();

    let shared = Shared {
        injector: Injector::new(),
        stealers,
        in_flight: AtomicUsize::new(initial.len()),
        unparkers,
        next_unpark: AtomicUsize::new(0),
    };
    for unit in initial {
        shared.injector.push(unit);
    }

    thread::scope(|scope| {
        for (local, parker) in locals.into_iter().zip(parkers) {
            let shared = &shared;
            let processor = &processor;
            scope.spawn(move || worker_loop(local, parker, shared, monitor, log, processor));
        }
    });

    monitor.check()
}

fn worker_loop<W, F>(
    local: Worker<W>,
    parker: Parker,
    shared: &Shared<W>,
    monitor: &InterruptionMonitor,
    log: &ScanLog,
    processor: &F,
) where
    W: Send,
    F: Fn(W, &WorkQueue<'_, W>, &ScanLog) -> Result<(), ScanError> + Sync,
{
    let handle = WorkQueue { shared };
    let mut idle_rounds: u32 = 0;

    loop {
        if shared.in_flight.load(Ordering::Acquire) == 0 {
            return;
        }

        let Some(unit) = find_task(&local, shared) else {
            // Nothing visible but units are still in flight elsewhere: another
            // worker may enqueue more. Retry, yield, then park briefly.
            idle_rounds += 1;
            if idle_rounds <= IDLE_RETRIES {
                std::hint::spin_loop();
            } else if idle_rounds <= IDLE_RETRIES + IDLE_YIELDS {
                thread::yield_now();
            } else {
                parker.park_timeout(PARK_TIMEOUT);
            }
            continue;
        };
        idle_rounds = 0;

        if monitor.is_tripped() {
            // Cooperative checkpoint between units: discard without processing.
            drop(unit);
            shared.finish_unit();
            continue;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| processor(unit, &handle, log)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => monitor.trip(err),
            Err(payload) => monitor.trip(ScanError::worker_panic(panic_detail(payload.as_ref()))),
        }
        shared.finish_unit();
    }
}

fn find_task<W: Send>(local: &Worker<W>, shared: &Shared<W>) -> Option<W> {
    if let Some(unit) = local.pop() {
        return Some(unit);
    }
    loop {
        match shared.injector.steal_batch_and_pop(local) {
            Steal::Success(unit) => return Some(unit),
            Steal::Empty => break,
            Steal::Retry => {}
        }
    }
    for stealer in &shared.stealers {
        loop {
            match stealer.steal() {
                Steal::Success(unit) => return Some(unit),
                Steal::Empty => break,
                Steal::Retry => {}
            }
        }
    }
    None
}

fn panic_detail(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
