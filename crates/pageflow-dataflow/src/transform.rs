//! Stateless and stateful transform flows.
//!
//! Wrapping flows delegate the lifecycle contract to their upstream: a
//! `MapData` consumed before reset fails because its source does. Flows
//! that own terminal state (`CacheData`, `CachedFlow`) carry their own
//! guard.

use crate::flow::{DataFlow, Lifecycle};
use pageflow_core::{PageflowError, Result};
use std::sync::Arc;

/// Lazily apply `f` to each element, dropping those where `f` returns
/// `None`. Order preserving.
#[derive(Debug)]
pub struct MapData<S, F> {
    flow: S,
    func: F,
}

impl<S, F> MapData<S, F> {
    /// Wrap `flow` with the mapper `f`.
    #[must_use = "returns the new flow"]
    pub fn new(flow: S, func: F) -> Self {
        Self { flow, func }
    }
}

impl<S, U, F> DataFlow for MapData<S, F>
where
    S: DataFlow,
    F: FnMut(S::Item) -> Option<U>,
{
    type Item = U;

    fn reset(&mut self) -> Result<()> {
        self.flow.reset()
    }

    fn try_next(&mut self) -> Result<Option<U>> {
        while let Some(item) = self.flow.try_next()? {
            if let Some(mapped) = (self.func)(item) {
                return Ok(Some(mapped));
            }
        }
        Ok(None)
    }

    fn teardown(&mut self) {
        self.flow.teardown();
    }
}

/// Apply `f` to the payload of `(seq, payload)` pairs, keeping the carried
/// sequence number.
///
/// The sequence number is how callers restore strict order after an
/// order-relaxing fan-out: tag upstream, map the payload here, re-sort
/// downstream.
#[derive(Debug)]
pub struct MapComponent<S, F> {
    flow: S,
    func: F,
}

impl<S, F> MapComponent<S, F> {
    /// Wrap `flow` with the payload mapper `f`.
    #[must_use = "returns the new flow"]
    pub fn new(flow: S, func: F) -> Self {
        Self { flow, func }
    }
}

impl<S, T, U, F> DataFlow for MapComponent<S, F>
where
    S: DataFlow<Item = (u64, T)>,
    F: FnMut(T) -> Option<U>,
{
    type Item = (u64, U);

    fn reset(&mut self) -> Result<()> {
        self.flow.reset()
    }

    fn try_next(&mut self) -> Result<Option<(u64, U)>> {
        while let Some((seq, item)) = self.flow.try_next()? {
            if let Some(mapped) = (self.func)(item) {
                return Ok(Some((seq, mapped)));
            }
        }
        Ok(None)
    }

    fn teardown(&mut self) {
        self.flow.teardown();
    }
}

/// Keep only elements matching the predicate.
#[derive(Debug)]
pub struct FilterData<S, P> {
    flow: S,
    predicate: P,
}

impl<S, P> FilterData<S, P> {
    /// Wrap `flow` with the predicate.
    #[must_use = "returns the new flow"]
    pub fn new(flow: S, predicate: P) -> Self {
        Self { flow, predicate }
    }
}

impl<S, P> DataFlow for FilterData<S, P>
where
    S: DataFlow,
    P: FnMut(&S::Item) -> bool,
{
    type Item = S::Item;

    fn reset(&mut self) -> Result<()> {
        self.flow.reset()
    }

    fn try_next(&mut self) -> Result<Option<S::Item>> {
        while let Some(item) = self.flow.try_next()? {
            if (self.predicate)(&item) {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    fn teardown(&mut self) {
        self.flow.teardown();
    }
}

/// Flatten a flow of iterables into a flow of their elements, in order.
pub struct FlattenData<S: DataFlow>
where
    S::Item: IntoIterator,
{
    flow: S,
    current: Option<<S::Item as IntoIterator>::IntoIter>,
}

impl<S: DataFlow> FlattenData<S>
where
    S::Item: IntoIterator,
{
    /// Wrap `flow`.
    #[must_use = "returns the new flow"]
    pub fn new(flow: S) -> Self {
        Self {
            flow,
            current: None,
        }
    }
}

impl<S: DataFlow> DataFlow for FlattenData<S>
where
    S::Item: IntoIterator,
{
    type Item = <S::Item as IntoIterator>::Item;

    fn reset(&mut self) -> Result<()> {
        self.current = None;
        self.flow.reset()
    }

    fn try_next(&mut self) -> Result<Option<Self::Item>> {
        loop {
            if let Some(iter) = self.current.as_mut() {
                if let Some(item) = iter.next() {
                    return Ok(Some(item));
                }
                self.current = None;
            }
            match self.flow.try_next()? {
                Some(group) => self.current = Some(group.into_iter()),
                None => return Ok(None),
            }
        }
    }

    fn teardown(&mut self) {
        self.current = None;
        self.flow.teardown();
    }
}

/// Replay a finite source a fixed number of times, or indefinitely.
///
/// An empty source ends the flow even in unbounded mode, so a drained
/// upstream cannot spin the consumer forever.
#[derive(Debug)]
pub struct RepeatedData<S> {
    flow: S,
    /// `None` replays indefinitely
    passes: Option<usize>,
    done_passes: usize,
    yielded_this_pass: bool,
}

impl<S: DataFlow> RepeatedData<S> {
    /// Replay `flow` `passes` times (`None` = indefinitely).
    ///
    /// Zero passes is a programmer error, rejected at construction.
    pub fn new(flow: S, passes: Option<usize>) -> Result<Self> {
        if passes == Some(0) {
            return Err(PageflowError::reentrancy(
                "RepeatedData: zero passes requested",
            ));
        }
        Ok(Self {
            flow,
            passes,
            done_passes: 0,
            yielded_this_pass: false,
        })
    }
}

impl<S: DataFlow> DataFlow for RepeatedData<S> {
    type Item = S::Item;

    fn reset(&mut self) -> Result<()> {
        self.done_passes = 0;
        self.yielded_this_pass = false;
        self.flow.reset()
    }

    fn try_next(&mut self) -> Result<Option<S::Item>> {
        loop {
            match self.flow.try_next()? {
                Some(item) => {
                    self.yielded_this_pass = true;
                    return Ok(Some(item));
                }
                None => {
                    self.done_passes += 1;
                    let more = self.passes.map_or(true, |n| self.done_passes < n);
                    if !more || !self.yielded_this_pass {
                        return Ok(None);
                    }
                    self.yielded_this_pass = false;
                    self.flow.reset()?;
                }
            }
        }
    }

    fn size_hint(&self) -> Option<usize> {
        match self.passes {
            Some(n) => self.flow.size_hint().map(|s| s * n),
            None => None,
        }
    }

    fn teardown(&mut self) {
        self.done_passes = 0;
        self.yielded_this_pass = false;
        self.flow.teardown();
    }
}

/// Sequential concatenation of same-typed flows, order preserving.
pub struct ConcatData<T> {
    flows: Vec<Box<dyn DataFlow<Item = T>>>,
    current: usize,
}

impl<T> ConcatData<T> {
    /// Concatenate the given flows in order.
    #[must_use = "returns the new flow"]
    pub fn new(flows: Vec<Box<dyn DataFlow<Item = T>>>) -> Self {
        Self { flows, current: 0 }
    }
}

impl<T> DataFlow for ConcatData<T> {
    type Item = T;

    fn reset(&mut self) -> Result<()> {
        for flow in &mut self.flows {
            flow.reset()?;
        }
        self.current = 0;
        Ok(())
    }

    fn try_next(&mut self) -> Result<Option<T>> {
        while self.current < self.flows.len() {
            if let Some(item) = self.flows[self.current].try_next()? {
                return Ok(Some(item));
            }
            self.current += 1;
        }
        Ok(None)
    }

    fn size_hint(&self) -> Option<usize> {
        self.flows.iter().map(|f| f.size_hint()).sum()
    }

    fn teardown(&mut self) {
        for flow in &mut self.flows {
            flow.teardown();
        }
        self.current = 0;
    }
}

/// Positional join: one element from each source per step, stopping at
/// the shortest source.
pub struct JoinData<T> {
    flows: Vec<Box<dyn DataFlow<Item = T>>>,
    exhausted: bool,
}

impl<T> JoinData<T> {
    /// Join the given flows positionally.
    #[must_use = "returns the new flow"]
    pub fn new(flows: Vec<Box<dyn DataFlow<Item = T>>>) -> Self {
        Self {
            flows,
            exhausted: false,
        }
    }
}

impl<T> DataFlow for JoinData<T> {
    type Item = Vec<T>;

    fn reset(&mut self) -> Result<()> {
        for flow in &mut self.flows {
            flow.reset()?;
        }
        self.exhausted = false;
        Ok(())
    }

    fn try_next(&mut self) -> Result<Option<Vec<T>>> {
        if self.exhausted || self.flows.is_empty() {
            return Ok(None);
        }
        let mut group = Vec::with_capacity(self.flows.len());
        for flow in &mut self.flows {
            match flow.try_next()? {
                Some(item) => group.push(item),
                None => {
                    self.exhausted = true;
                    return Ok(None);
                }
            }
        }
        Ok(Some(group))
    }

    fn size_hint(&self) -> Option<usize> {
        self.flows.iter().map(|f| f.size_hint()).min().flatten()
    }

    fn teardown(&mut self) {
        for flow in &mut self.flows {
            flow.teardown();
        }
        self.exhausted = false;
    }
}

/// Buffer the fully realized upstream sequence once, then serve every
/// later pass from memory.
///
/// Population runs to completion during the first [`DataFlow::reset`] —
/// single-writer-then-many-readers: [`CacheData::snapshot`] hands out
/// read-only [`CachedFlow`]s that independent consumers may iterate
/// concurrently once population finished.
pub struct CacheData<S: DataFlow> {
    flow: S,
    buffer: Option<Arc<Vec<S::Item>>>,
    cursor: usize,
    lifecycle: Lifecycle,
}

impl<S: DataFlow> CacheData<S>
where
    S::Item: Clone,
{
    /// Wrap `flow` with a full-sequence cache.
    #[must_use = "returns the new flow"]
    pub fn new(flow: S) -> Self {
        Self {
            flow,
            buffer: None,
            cursor: 0,
            lifecycle: Lifecycle::default(),
        }
    }

    /// Read-only view over the populated cache; `None` before the first
    /// complete population pass.
    #[must_use = "returns the snapshot without modifying the cache"]
    pub fn snapshot(&self) -> Option<CachedFlow<S::Item>> {
        self.buffer.as_ref().map(|buf| CachedFlow {
            buffer: Arc::clone(buf),
            cursor: 0,
            lifecycle: Lifecycle::default(),
        })
    }
}

impl<S: DataFlow> DataFlow for CacheData<S>
where
    S::Item: Clone,
{
    type Item = S::Item;

    fn reset(&mut self) -> Result<()> {
        self.lifecycle.begin_reset("CacheData")?;
        if self.buffer.is_none() {
            self.flow.reset()?;
            let mut buf = match self.flow.size_hint() {
                Some(n) => Vec::with_capacity(n),
                None => Vec::new(),
            };
            while let Some(item) = self.flow.try_next()? {
                buf.push(item);
            }
            log::debug!("CacheData: buffered {} elements", buf.len());
            self.buffer = Some(Arc::new(buf));
        }
        self.cursor = 0;
        Ok(())
    }

    fn try_next(&mut self) -> Result<Option<S::Item>> {
        self.lifecycle.ensure_consumable("CacheData")?;
        let Some(buf) = self.buffer.as_ref() else {
            return Ok(None);
        };
        if self.cursor < buf.len() {
            let item = buf[self.cursor].clone();
            self.cursor += 1;
            Ok(Some(item))
        } else {
            self.lifecycle.mark_exhausted();
            Ok(None)
        }
    }

    fn size_hint(&self) -> Option<usize> {
        self.buffer
            .as_ref()
            .map(|b| b.len())
            .or_else(|| self.flow.size_hint())
    }

    fn teardown(&mut self) {
        self.cursor = 0;
        self.lifecycle.teardown();
        self.flow.teardown();
    }
}

/// Read-only consumer over a populated cache; cheap to clone, safe to
/// iterate from multiple threads (the buffer is never written again).
#[derive(Debug, Clone)]
pub struct CachedFlow<T> {
    buffer: Arc<Vec<T>>,
    cursor: usize,
    lifecycle: Lifecycle,
}

impl<T: Clone> DataFlow for CachedFlow<T> {
    type Item = T;

    fn reset(&mut self) -> Result<()> {
        self.lifecycle.begin_reset("CachedFlow")?;
        self.cursor = 0;
        Ok(())
    }

    fn try_next(&mut self) -> Result<Option<T>> {
        self.lifecycle.ensure_consumable("CachedFlow")?;
        if self.cursor < self.buffer.len() {
            let item = self.buffer[self.cursor].clone();
            self.cursor += 1;
            Ok(Some(item))
        } else {
            self.lifecycle.mark_exhausted();
            Ok(None)
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.buffer.len())
    }

    fn teardown(&mut self) {
        self.cursor = 0;
        self.lifecycle.teardown();
    }
}

/// Tag each element with a monotonic sequence number.
///
/// Pairs with [`MapComponent`] and a downstream re-sort to restore strict
/// order after an order-relaxing fan-out.
#[derive(Debug)]
pub struct EnumerateData<S> {
    flow: S,
    next_seq: u64,
}

impl<S: DataFlow> EnumerateData<S> {
    /// Wrap `flow`, numbering from zero at every reset.
    #[must_use = "returns the new flow"]
    pub fn new(flow: S) -> Self {
        Self { flow, next_seq: 0 }
    }
}

impl<S: DataFlow> DataFlow for EnumerateData<S> {
    type Item = (u64, S::Item);

    fn reset(&mut self) -> Result<()> {
        self.next_seq = 0;
        self.flow.reset()
    }

    fn try_next(&mut self) -> Result<Option<(u64, S::Item)>> {
        match self.flow.try_next()? {
            Some(item) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                Ok(Some((seq, item)))
            }
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        self.flow.size_hint()
    }

    fn teardown(&mut self) {
        self.next_seq = 0;
        self.flow.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::DataFlowExt;
    use crate::source::DataFromList;

    #[test]
    fn test_map_drops_none() {
        let mut flow = MapData::new(DataFromList::new(vec![1, 2, 3, 4]), |n| {
            (n % 2 == 0).then_some(n * 10)
        });
        assert_eq!(flow.collect_all().unwrap(), vec![20, 40]);
    }

    #[test]
    fn test_map_component_keeps_sequence() {
        let tagged = EnumerateData::new(DataFromList::new(vec!["a", "b", "c"]));
        let mut flow = MapComponent::new(tagged, |s: &str| Some(s.to_uppercase()));
        let out = flow.collect_all().unwrap();
        assert_eq!(
            out,
            vec![
                (0, "A".to_string()),
                (1, "B".to_string()),
                (2, "C".to_string())
            ]
        );
    }

    #[test]
    fn test_filter() {
        let mut flow = FilterData::new(DataFromList::new(vec![1, 2, 3, 4, 5]), |n: &i32| *n > 2);
        assert_eq!(flow.collect_all().unwrap(), vec![3, 4, 5]);
    }

    #[test]
    fn test_flatten() {
        let mut flow = FlattenData::new(DataFromList::new(vec![vec![1, 2], vec![], vec![3]]));
        assert_eq!(flow.collect_all().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_repeated_finite() {
        let mut flow = RepeatedData::new(DataFromList::new(vec![1, 2]), Some(3)).unwrap();
        assert_eq!(flow.collect_all().unwrap(), vec![1, 2, 1, 2, 1, 2]);
        assert_eq!(flow.size_hint(), Some(6));
    }

    #[test]
    fn test_repeated_empty_source_terminates() {
        let mut flow = RepeatedData::new(DataFromList::new(Vec::<i32>::new()), None).unwrap();
        assert!(flow.collect_all().unwrap().is_empty());
    }

    #[test]
    fn test_repeated_zero_passes_rejected() {
        let err = RepeatedData::new(DataFromList::new(vec![1, 2]), Some(0)).unwrap_err();
        assert!(err.is_reentrancy());
    }

    #[test]
    fn test_concat_preserves_order() {
        let mut flow = ConcatData::new(vec![
            Box::new(DataFromList::new(vec![1, 2])) as Box<dyn DataFlow<Item = i32>>,
            Box::new(DataFromList::new(vec![3])),
        ]);
        assert_eq!(flow.collect_all().unwrap(), vec![1, 2, 3]);
        assert_eq!(flow.size_hint(), Some(3));
    }

    #[test]
    fn test_join_stops_at_shortest() {
        let mut flow = JoinData::new(vec![
            Box::new(DataFromList::new(vec![1, 2, 3])) as Box<dyn DataFlow<Item = i32>>,
            Box::new(DataFromList::new(vec![10, 20])),
        ]);
        assert_eq!(flow.collect_all().unwrap(), vec![vec![1, 10], vec![2, 20]]);
    }

    #[test]
    fn test_cache_populates_once() {
        use std::cell::Cell;
        use std::rc::Rc;

        let pulls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&pulls);
        let source = MapData::new(DataFromList::new(vec![1, 2, 3]), move |n| {
            counter.set(counter.get() + 1);
            Some(n)
        });
        let mut cache = CacheData::new(source);
        assert_eq!(cache.collect_all().unwrap(), vec![1, 2, 3]);
        assert_eq!(cache.collect_all().unwrap(), vec![1, 2, 3]);
        // upstream ran exactly once
        assert_eq!(pulls.get(), 3);
    }

    #[test]
    fn test_cache_snapshot_independent_consumers() {
        let mut cache = CacheData::new(DataFromList::new(vec![1, 2, 3]));
        assert!(cache.snapshot().is_none());
        cache.reset().unwrap();
        let mut a = cache.snapshot().unwrap();
        let mut b = cache.snapshot().unwrap();
        assert_eq!(a.collect_all().unwrap(), vec![1, 2, 3]);
        assert_eq!(b.collect_all().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_snapshot_is_send_for_concurrent_reads() {
        let mut cache = CacheData::new(DataFromList::new(vec![1, 2, 3, 4]));
        cache.reset().unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mut snap = cache.snapshot().unwrap();
                std::thread::spawn(move || snap.collect_all().unwrap())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![1, 2, 3, 4]);
        }
    }
}
