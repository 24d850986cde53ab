//! Pipeline orchestration over annotation graphs.
//!
//! A pipeline is an ordered stack of [`PipelineComponent`]s applied to
//! one datapoint at a time. Every graph mutation goes through the
//! [`DatapointManager`], which tracks the datapoint state machine and
//! seals the graph once the terminal [`PageParsingService`] has built
//! its read-only projection.
//!
//! ```text
//!  Image ─▶ ImageLayoutService ─▶ SubImageLayoutService ─▶ Matching
//!        ─▶ TableSegmentation ─▶ TextExtraction ─▶ TextOrder
//!        ─▶ PageParsing ─▶ Page
//! ```
//!
//! Model-backed stages take their detectors and recognizers by injection
//! (see [`extern_model`]); the pipeline itself never loads weights.
//! Stacks run lazily over a [`DataFlow`](pageflow_dataflow::DataFlow) via
//! [`Pipeline::analyze`], or eagerly in parallel via
//! [`Pipeline::analyze_batch`].

pub mod component;
pub mod extern_model;
pub mod layout;
pub mod manager;
pub mod matching;
pub mod order;
pub mod parsing;
pub mod pipeline;
pub mod registry;
pub mod subimage;
pub mod table;
pub mod text;

pub use component::PipelineComponent;
pub use extern_model::{
    ClassLabel, DetectResultGenerator, DetectionResult, ObjectDetector, SequenceClassifier,
    TextRecognizer, TextResult, Token,
};
pub use layout::ImageLayoutService;
pub use manager::{DatapointManager, DatapointState};
pub use matching::{MatchMetric, MatchingService};
pub use order::TextOrderService;
pub use parsing::PageParsingService;
pub use pipeline::{FailureReport, Pipeline, PipelineFlow, PipelineOutput};
pub use registry::{
    create, register, register_builtin_components, ComponentConfig, ComponentFactory,
};
pub use subimage::SubImageLayoutService;
pub use table::{TableSegmentationService, TiePolicy};
pub use text::TextExtractionService;
