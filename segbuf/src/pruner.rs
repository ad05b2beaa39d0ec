//! Background pruning of fully released segments.
//!
//! The pruner engine runs on its own thread and periodically sweeps the
//! segment list. A segment is reclaimed once its roster is empty and no
//! operation is in flight on it. The sweep is split into contiguous
//! regions scanned by short-lived workers; the worker count follows the
//! list length between sweeps, growing as the buffer grows and shrinking
//! back as it drains.

use crate::dispatcher::Shared;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;

/// Interruptible sleep shared between the engine thread and `stop`.
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Handle to the pruner thread. Stopping joins the thread; the current
/// sweep, if one is running, completes first.
pub(crate) struct PrunerEngine {
    handle: Option<JoinHandle<()>>,
    signal: Arc<StopSignal>,
}

impl PrunerEngine {
    /// Spawn the engine thread for the given dispatcher state.
    pub(crate) fn start<T: Send + Sync + 'static>(shared: Arc<Shared<T>>) -> Self {
        let signal = Arc::new(StopSignal {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });
        let thread_signal = Arc::clone(&signal);
        let handle = std::thread::spawn(move || run(shared, thread_signal));
        Self {
            handle: Some(handle),
            signal,
        }
    }

    /// Signal the engine and wait for it to finish.
    pub(crate) fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        *self.signal.stopped.lock() = true;
        self.signal.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("pruner thread panicked during shutdown");
            }
        }
    }
}

impl Drop for PrunerEngine {
    fn drop(&mut self) {
        self.halt();
    }
}

fn run<T: Send + Sync>(shared: Arc<Shared<T>>, signal: Arc<StopSignal>) {
    let interval = shared.config.prune_interval();
    let mut workers = 1usize;
    loop {
        {
            let mut stopped = signal.stopped.lock();
            if !*stopped {
                let _ = signal.wake.wait_for(&mut stopped, interval);
            }
            if *stopped {
                break;
            }
        }

        let len = shared.segments.read().len();
        let target = worker_count(
            len,
            shared.config.prune_region,
            shared.config.max_prune_workers,
        );
        if target != workers {
            tracing::trace!(
                from = workers,
                to = target,
                segments = len,
                "resized pruner worker pool"
            );
            workers = target;
        }

        let reclaimed = sweep(&shared, workers);
        shared.stats.prune_passes.fetch_add(1, Ordering::Relaxed);
        if reclaimed > 0 {
            tracing::debug!(reclaimed, live = len - reclaimed, "pruned released segments");
        }
    }
}

/// Workers for a sweep over `len` segments: one per region, bounded.
fn worker_count(len: usize, region: usize, max_workers: usize) -> usize {
    len.div_ceil(region).clamp(1, max_workers)
}

/// One sweep: scan regions in parallel for segments with an empty roster
/// and nothing in flight, then unlink the survivors of a recheck under
/// the list latch. A panicking worker costs only its own region; the
/// sweep itself always completes.
pub(crate) fn sweep<T: Send + Sync>(shared: &Shared<T>, workers: usize) -> usize {
    let snapshot = shared.segments.read().clone();
    if snapshot.is_empty() {
        return 0;
    }

    let region = snapshot.len().div_ceil(workers);
    let mut eligible: Vec<u64> = Vec::new();
    std::thread::scope(|scope| {
        let scans: Vec<_> = snapshot
            .chunks(region)
            .map(|slice| {
                scope.spawn(move || {
                    slice
                        .iter()
                        .filter(|seg| seg.roster_len() == 0 && !seg.in_use())
                        .map(|seg| seg.seq())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for scan in scans {
            match scan.join() {
                Ok(mut seqs) => eligible.append(&mut seqs),
                Err(_) => tracing::warn!("pruner worker panicked; region skipped this pass"),
            }
        }
    });
    if eligible.is_empty() {
        return 0;
    }

    let mut list = shared.segments.write();
    let before = list.len();
    // A claim may have landed between the scan and this latch; recheck
    // before unlinking.
    list.retain(|seg| !(eligible.contains(&seg.seq()) && seg.roster_len() == 0 && !seg.in_use()));
    let reclaimed = before - list.len();
    shared
        .stats
        .segments_pruned
        .fetch_add(reclaimed as u64, Ordering::Relaxed);
    reclaimed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessLevel;
    use crate::config::BufferConfig;
    use crate::dispatcher::Dispatcher;
    use crate::participant::Participant;
    use std::time::{Duration, Instant};

    #[test]
    fn worker_count_follows_list_length() {
        assert_eq!(worker_count(0, 64, 8), 1);
        assert_eq!(worker_count(1, 64, 8), 1);
        assert_eq!(worker_count(64, 64, 8), 1);
        assert_eq!(worker_count(65, 64, 8), 2);
        assert_eq!(worker_count(640, 64, 8), 8);
        assert_eq!(worker_count(10_000, 64, 8), 8);
    }

    #[test]
    fn sweep_reclaims_only_released_segments() {
        let config = BufferConfig {
            segment_capacity: 4,
            prune_interval_ms: 3_600_000,
            ..BufferConfig::default()
        };
        let dispatcher = Dispatcher::with_config(config).unwrap();
        let writer = Participant::make(Some("source"), AccessLevel::WRITE);
        for value in 0..12u32 {
            dispatcher.write(value, &writer).unwrap();
        }
        assert_eq!(dispatcher.segment_count(), 3);

        // Everything still claimed: nothing to reclaim.
        assert_eq!(sweep(&dispatcher.shared, 2), 0);
        assert_eq!(dispatcher.segment_count(), 3);

        dispatcher.release(&writer).unwrap();
        assert_eq!(sweep(&dispatcher.shared, 2), 3);
        assert_eq!(dispatcher.segment_count(), 0);
        assert_eq!(dispatcher.stats().segments_pruned, 3);
    }

    #[test]
    fn sweep_spares_segments_claimed_by_readers() {
        let config = BufferConfig {
            segment_capacity: 4,
            prune_interval_ms: 3_600_000,
            ..BufferConfig::default()
        };
        let dispatcher = Dispatcher::with_config(config).unwrap();
        let (reader, writer) = Participant::make_pair("sink", "source");
        for value in 0..8u32 {
            dispatcher.write(value, &writer).unwrap();
        }
        // The reader enters the first segment only.
        dispatcher.read(&reader).unwrap();
        dispatcher.release(&writer).unwrap();

        assert_eq!(sweep(&dispatcher.shared, 1), 1);
        let remaining = dispatcher.segments();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].roster_contains(reader.id()));
    }

    #[test]
    fn write_after_release_survives_the_sweep() {
        let config = BufferConfig {
            segment_capacity: 4,
            prune_interval_ms: 3_600_000,
            ..BufferConfig::default()
        };
        let dispatcher = Dispatcher::with_config(config).unwrap();
        let writer = Participant::make(Some("source"), AccessLevel::WRITE);

        dispatcher.write(1u32, &writer).unwrap();
        dispatcher.release(&writer).unwrap();
        dispatcher.write(2u32, &writer).unwrap();

        // Only the revoked segment is reclaimable; the one holding the
        // fresh item stays claimed by the writer.
        assert_eq!(sweep(&dispatcher.shared, 1), 1);
        assert_eq!(dispatcher.segment_count(), 1);

        let reader = Participant::make(Some("sink"), AccessLevel::READ);
        assert_eq!(dispatcher.read(&reader).unwrap(), 2);
    }

    #[test]
    fn engine_drains_the_list_within_two_intervals() {
        let config = BufferConfig {
            segment_capacity: 8,
            prune_interval_ms: 50,
            ..BufferConfig::default()
        };
        let dispatcher = Dispatcher::with_config(config).unwrap();
        let writer = Participant::make(Some("source"), AccessLevel::WRITE);
        for value in 0..32u32 {
            dispatcher.write(value, &writer).unwrap();
        }
        dispatcher.release(&writer).unwrap();

        let deadline = Instant::now() + Duration::from_millis(2 * 50 + 200);
        while dispatcher.segment_count() > 0 {
            assert!(Instant::now() < deadline, "pruner did not drain the list");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}
