//! # pageflow-core — Annotation graphs for document-image understanding
//!
//! The data model shared by all pageflow crates: a typed annotation graph
//! representing a page image, its sub-images (crops) and nested annotations
//! with geometric and categorical attributes, plus the pure geometry kernel
//! the pipeline stages compare boxes with.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ Image (aggregate root)                                     │
//! │   id, size, pixels?, embedding?                            │
//! │   annotations: arena of Annotation (referenced by id only) │
//! │     ├─ Box { bbox, image? ──► nested Image (crop) }        │
//! │     ├─ Container { value }                                 │
//! │     ├─ Category                                            │
//! │     └─ Summary                                             │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Invariants maintained at all times:
//! - every active box lies within its owning image's bounds (unless the
//!   image admits external coordinates pending a clip),
//! - every relationship target resolves within the image or an
//!   embedding-reachable sub-image,
//! - annotations are soft-deleted only, so issued ids stay resolvable,
//! - ids are content-derived and reproducible across runs.

pub mod annotation;
pub mod category;
pub mod error;
pub mod geometry;
pub mod image;
pub mod page;

pub use annotation::{
    Annotation, AnnotationId, AnnotationKind, ContainerValue, ImageId, SubCategory,
};
pub use category::{relations, slots, Category};
pub use error::{PageflowError, Result};
pub use geometry::{
    area, clip, global_to_local, intersection_area, intersection_box, intersection_over_first,
    interval_iou, iou, local_to_global, merge_boxes, rescale, BoundingBox,
};
pub use image::{CoordinateContext, Embedding, Image, MAX_EMBEDDING_DEPTH};
pub use page::{Page, PageCell, PageItem, PageTable};
