//! Order-relaxing parallel map over a worker thread pool.

use crate::flow::{DataFlow, Lifecycle};
use pageflow_core::{PageflowError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Channel capacity per worker for both the feed and output sides.
const CHANNEL_SLACK: usize = 2;

/// Fan work out across `num_workers` threads and merge results in
/// completion order.
///
/// Output order is relaxed: elements arrive as workers finish, not in
/// upstream order. Callers that need strict order tag elements upstream
/// (see [`EnumerateData`](crate::transform::EnumerateData)) and re-sort
/// downstream. Elements the mapper fails on are dropped from the output
/// after a `log::warn!`; the run keeps going.
///
/// A dedicated feeder thread owns the upstream flow for the duration of a
/// pass and hands it back when the pass finishes, so the upstream's own
/// lifecycle guard still observes every reset.
pub struct MultiThreadMapData<T, U> {
    source: Option<Box<dyn DataFlow<Item = T> + Send>>,
    func: Arc<dyn Fn(T) -> Result<U> + Send + Sync>,
    num_workers: usize,
    run: Option<RunHandles<T, U>>,
    dropped: Arc<AtomicUsize>,
    lifecycle: Lifecycle,
}

struct RunHandles<T, U> {
    feeder: JoinHandle<Box<dyn DataFlow<Item = T> + Send>>,
    workers: Vec<JoinHandle<()>>,
    output_rx: Receiver<U>,
}

impl<T, U> MultiThreadMapData<T, U> {
    /// Number of elements dropped by mapper errors during the current pass.
    #[inline]
    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Tear the current run down and recover the upstream flow.
    ///
    /// Dropping `output_rx` first disconnects the workers' send side, so
    /// in-flight sends fail and every thread unwinds its loop promptly.
    fn finish_run(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        drop(run.output_rx);
        for worker in run.workers {
            if worker.join().is_err() {
                log::warn!("MultiThreadMapData: worker thread panicked");
            }
        }
        match run.feeder.join() {
            Ok(source) => self.source = Some(source),
            Err(_) => log::error!("MultiThreadMapData: feeder thread panicked, source lost"),
        }
    }
}

impl<T, U> MultiThreadMapData<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    /// Wrap `source` with a pool of `num_workers` mapper threads.
    ///
    /// # Args
    ///
    /// * `source` - upstream flow, moved onto the feeder thread per pass
    /// * `num_workers` - pool size, clamped to at least one
    /// * `func` - mapper applied on worker threads
    #[must_use = "returns the new flow"]
    pub fn new<S, F>(source: S, num_workers: usize, func: F) -> Self
    where
        S: DataFlow<Item = T> + Send + 'static,
        F: Fn(T) -> Result<U> + Send + Sync + 'static,
    {
        Self {
            source: Some(Box::new(source)),
            func: Arc::new(func),
            num_workers: num_workers.max(1),
            run: None,
            dropped: Arc::new(AtomicUsize::new(0)),
            lifecycle: Lifecycle::default(),
        }
    }

    fn spawn_run(&mut self) -> Result<()> {
        let mut source = self
            .source
            .take()
            .ok_or_else(|| PageflowError::worker("MultiThreadMapData", "source lost to a previous panic"))?;
        source.reset()?;
        self.dropped.store(0, Ordering::Relaxed);

        let capacity = self.num_workers * CHANNEL_SLACK;
        let (feed_tx, feed_rx) = std::sync::mpsc::sync_channel::<T>(capacity);
        let (out_tx, out_rx) = std::sync::mpsc::sync_channel::<U>(capacity);
        let feed_rx = Arc::new(Mutex::new(feed_rx));

        let feeder = std::thread::spawn(move || {
            loop {
                match source.try_next() {
                    Ok(Some(item)) => {
                        if feed_tx.send(item).is_err() {
                            // consumer went away mid-pass
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        log::warn!("MultiThreadMapData: upstream error ended the pass: {err}");
                        break;
                    }
                }
            }
            // dropping feed_tx closes the pool's input
            source
        });

        let mut workers = Vec::with_capacity(self.num_workers);
        for worker_id in 0..self.num_workers {
            let feed_rx = Arc::clone(&feed_rx);
            let out_tx = out_tx.clone();
            let func = Arc::clone(&self.func);
            let dropped = Arc::clone(&self.dropped);
            workers.push(std::thread::spawn(move || loop {
                let item = match feed_rx.lock() {
                    Ok(guard) => guard.recv(),
                    Err(_) => break,
                };
                let Ok(item) = item else { break };
                match func(item) {
                    Ok(mapped) => {
                        if out_tx.send(mapped).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        dropped.fetch_add(1, Ordering::Relaxed);
                        log::warn!(
                            "MultiThreadMapData: worker {worker_id} dropped an element: {err}"
                        );
                    }
                }
            }));
        }
        drop(out_tx);

        log::debug!(
            "MultiThreadMapData: pass started with {} workers",
            self.num_workers
        );
        self.run = Some(RunHandles {
            feeder,
            workers,
            output_rx: out_rx,
        });
        Ok(())
    }
}

impl<T, U> DataFlow for MultiThreadMapData<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    type Item = U;

    fn reset(&mut self) -> Result<()> {
        self.lifecycle.begin_reset("MultiThreadMapData")?;
        self.finish_run();
        self.spawn_run()
    }

    fn try_next(&mut self) -> Result<Option<U>> {
        self.lifecycle.ensure_consumable("MultiThreadMapData")?;
        let Some(run) = self.run.as_ref() else {
            return Ok(None);
        };
        match run.output_rx.recv() {
            Ok(item) => Ok(Some(item)),
            Err(_) => {
                // all workers finished and dropped their senders
                self.lifecycle.mark_exhausted();
                self.finish_run();
                Ok(None)
            }
        }
    }

    fn teardown(&mut self) {
        self.finish_run();
        // an abandoned pass leaves the upstream mid-pass; return it to
        // its pre-reset state so the next pass may start cleanly
        if let Some(source) = self.source.as_mut() {
            source.teardown();
        }
        self.lifecycle.teardown();
    }
}

impl<T, U> Drop for MultiThreadMapData<T, U> {
    fn drop(&mut self) {
        self.finish_run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::DataFlowExt;
    use crate::source::DataFromList;

    #[test]
    fn test_parallel_map_yields_all_elements() {
        let source = DataFromList::new((0u32..100).collect::<Vec<_>>());
        let mut flow = MultiThreadMapData::new(source, 4, |n| Ok(n * 2));
        let mut out = flow.collect_all().unwrap();
        out.sort_unstable();
        let expected: Vec<u32> = (0..100).map(|n| n * 2).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_parallel_map_second_pass() {
        let source = DataFromList::new(vec![1u32, 2, 3]);
        let mut flow = MultiThreadMapData::new(source, 2, |n| Ok(n + 1));
        let mut first = flow.collect_all().unwrap();
        first.sort_unstable();
        assert_eq!(first, vec![2, 3, 4]);
        let mut second = flow.collect_all().unwrap();
        second.sort_unstable();
        assert_eq!(second, vec![2, 3, 4]);
    }

    #[test]
    fn test_parallel_map_drops_failed_elements() {
        let source = DataFromList::new(vec![1u32, 2, 3, 4]);
        let mut flow = MultiThreadMapData::new(source, 2, |n| {
            if n % 2 == 0 {
                Err(PageflowError::worker("test", "even"))
            } else {
                Ok(n)
            }
        });
        let mut out = flow.collect_all().unwrap();
        out.sort_unstable();
        assert_eq!(out, vec![1, 3]);
        assert_eq!(flow.dropped_count(), 2);
    }

    #[test]
    fn test_parallel_map_reset_mid_pass_is_reentrancy_error() {
        let source = DataFromList::new(vec![1u32, 2, 3]);
        let mut flow = MultiThreadMapData::new(source, 2, |n| Ok(n));
        flow.reset().unwrap();
        assert!(flow.try_next().unwrap().is_some());
        let err = flow.reset().unwrap_err();
        assert!(err.is_reentrancy());
    }

    #[test]
    fn test_parallel_map_teardown_abandons_pass() {
        let source = DataFromList::new((0u32..50).collect::<Vec<_>>());
        let mut flow = MultiThreadMapData::new(source, 2, |n| Ok(n));
        flow.reset().unwrap();
        assert!(flow.try_next().unwrap().is_some());
        flow.teardown();
        // fresh pass after teardown
        let mut out = flow.collect_all().unwrap();
        out.sort_unstable();
        assert_eq!(out, (0..50).collect::<Vec<_>>());
    }
}
