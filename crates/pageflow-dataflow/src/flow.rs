//! The dataflow trait and its lifecycle contract.
//!
//! A flow is a resumable producer of elements (usually [`Image`] graphs).
//! Every flow must be explicitly reset before its first consumption;
//! consuming before reset, or resetting twice without an intermediate
//! teardown, fails with a [`PageflowError::Reentrancy`] — programmer
//! error, always fatal to the flow instance, never retried.
//!
//! [`Image`]: pageflow_core::Image
//! [`PageflowError::Reentrancy`]: pageflow_core::PageflowError

use pageflow_core::{PageflowError, Result};

/// A lazy, resumable producer of elements.
///
/// Flows are not safely restartable mid-sequence: restarting requires a
/// fresh [`DataFlow::reset`], which every implementation must honor
/// explicitly. `try_next` returning `Ok(None)` marks exhaustion; further
/// calls keep returning `Ok(None)` until the flow is reset again.
pub trait DataFlow {
    /// Element type produced by this flow.
    type Item;

    /// Initialize for (re)consumption: open handles, seed generators,
    /// rewind cursors.
    fn reset(&mut self) -> Result<()>;

    /// Produce the next element, `Ok(None)` on exhaustion.
    fn try_next(&mut self) -> Result<Option<Self::Item>>;

    /// Number of elements this flow will produce, when known up front.
    fn size_hint(&self) -> Option<usize> {
        None
    }

    /// Release held resources and return to the pre-reset state.
    fn teardown(&mut self) {}
}

impl<F: DataFlow + ?Sized> DataFlow for Box<F> {
    type Item = F::Item;

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn try_next(&mut self) -> Result<Option<Self::Item>> {
        (**self).try_next()
    }

    fn size_hint(&self) -> Option<usize> {
        (**self).size_hint()
    }

    fn teardown(&mut self) {
        (**self).teardown();
    }
}

/// Lifecycle position of a flow instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlowState {
    /// Constructed or torn down, not yet reset
    #[default]
    Created,
    /// Reset and consumable
    Ready,
    /// Fully consumed; reset required before another pass
    Exhausted,
}

/// Shared reentrancy guard used by flows that own terminal state.
///
/// Wrapping flows (maps, filters) delegate to their upstream's guard
/// instead of carrying their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lifecycle {
    state: FlowState,
}

impl Lifecycle {
    /// Transition into `Ready`; fails when the flow is already mid-pass.
    pub fn begin_reset(&mut self, flow: &'static str) -> Result<()> {
        match self.state {
            FlowState::Created | FlowState::Exhausted => {
                self.state = FlowState::Ready;
                Ok(())
            }
            FlowState::Ready => Err(PageflowError::reentrancy(format!(
                "{flow}: reset called twice without an intermediate teardown"
            ))),
        }
    }

    /// Check the flow may produce elements; fails before the first reset.
    pub fn ensure_consumable(&self, flow: &'static str) -> Result<()> {
        match self.state {
            FlowState::Created => Err(PageflowError::reentrancy(format!(
                "{flow}: consumed before reset"
            ))),
            FlowState::Ready | FlowState::Exhausted => Ok(()),
        }
    }

    /// True once the current pass has ended.
    #[inline]
    #[must_use = "returns the state without modifying the lifecycle"]
    pub fn is_exhausted(&self) -> bool {
        self.state == FlowState::Exhausted
    }

    /// Record exhaustion of the current pass.
    #[inline]
    pub fn mark_exhausted(&mut self) {
        self.state = FlowState::Exhausted;
    }

    /// Return to the pre-reset state.
    #[inline]
    pub fn teardown(&mut self) {
        self.state = FlowState::Created;
    }
}

/// Iterator bridge over a mutably borrowed flow.
///
/// Fuses after the first error or exhaustion.
#[derive(Debug)]
pub struct FlowIter<'a, F: DataFlow + ?Sized> {
    flow: &'a mut F,
    done: bool,
}

impl<F: DataFlow + ?Sized> Iterator for FlowIter<'_, F> {
    type Item = Result<F::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.flow.try_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Convenience combinators available on every flow.
pub trait DataFlowExt: DataFlow {
    /// Iterate the already-reset flow; fuses on error or exhaustion.
    fn iter(&mut self) -> FlowIter<'_, Self> {
        FlowIter {
            flow: self,
            done: false,
        }
    }

    /// Reset, then eagerly drain the whole flow into a vec.
    fn collect_all(&mut self) -> Result<Vec<Self::Item>> {
        self.reset()?;
        let mut out = match self.size_hint() {
            Some(n) => Vec::with_capacity(n),
            None => Vec::new(),
        };
        while let Some(item) = self.try_next()? {
            out.push(item);
        }
        Ok(out)
    }
}

impl<F: DataFlow + ?Sized> DataFlowExt for F {}
