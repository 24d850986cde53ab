//! Lazy, resettable dataflow engine for streaming document graphs.
//!
//! A [`DataFlow`] is a pull-based pipeline stage: nothing upstream runs
//! until the consumer calls [`DataFlow::try_next`], and a whole pipeline
//! replays from the top on [`DataFlow::reset`]. The lifecycle contract
//! is strict, and violations surface as
//! [`PageflowError::Reentrancy`](pageflow_core::PageflowError) instead
//! of silently corrupted passes:
//!
//! - a flow must be reset before its first element is pulled
//! - a flow mid-pass must not be reset again
//! - an exhausted flow may be reset for another full pass
//!
//! ```text
//!  DataFromFiles ─▶ MapData ─▶ MultiThreadMapData ─▶ SerializerJsonlines
//!    (listing)      (decode)     (n worker threads)      (persist)
//! ```
//!
//! Sources ([`DataFromList`], [`DataFromFn`], [`DataFromFiles`],
//! [`DataFromJsonlines`]) own terminal state; wrapping transforms
//! ([`MapData`], [`FilterData`], [`FlattenData`], ...) stay stateless and
//! inherit the contract from their upstream. [`MultiThreadMapData`] is
//! the one order-relaxing stage: it fans elements across a thread pool
//! and merges results in completion order.

pub mod flow;
pub mod parallel;
pub mod serialize;
pub mod source;
pub mod transform;

pub use flow::{DataFlow, DataFlowExt, FlowIter, FlowState, Lifecycle};
pub use parallel::MultiThreadMapData;
pub use serialize::{
    collect_corpus, DataFromJsonlines, SerializerFiles, SerializerJsonlines,
};
pub use source::{DataFromFiles, DataFromFn, DataFromList};
pub use transform::{
    CacheData, CachedFlow, ConcatData, EnumerateData, FilterData, FlattenData, JoinData, MapData,
    MapComponent, RepeatedData,
};
