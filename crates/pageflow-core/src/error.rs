//! Error types for the pageflow crates.
//!
//! All public APIs use the [`Result`] alias which wraps [`PageflowError`].
//! The taxonomy separates data errors (geometry, reference, cycle), which
//! fail a single datapoint, from programmer errors (reentrancy), which are
//! fatal to the flow instance that raised them.

use thiserror::Error;

/// Errors that can occur while building or processing an annotation graph.
#[derive(Debug, Error)]
pub enum PageflowError {
    /// A bounding box is degenerate or outside its owning image's bounds.
    #[error("geometry error: {reason}")]
    Geometry {
        /// Description of the invalid geometry
        reason: String,
    },

    /// A relationship or lookup refers to an id that cannot be resolved.
    #[error("unresolvable reference: {reason}")]
    Reference {
        /// Description of the unresolvable reference
        reason: String,
    },

    /// An embedding would make an image its own ancestor.
    #[error("embedding cycle: {reason}")]
    Cycle {
        /// Description of the offending embedding chain
        reason: String,
    },

    /// A dataflow was consumed before reset, or reset twice without teardown.
    ///
    /// Always fatal to the flow instance: this is a programmer error, not a
    /// data error, and is never retried.
    #[error("flow lifecycle misuse: {reason}")]
    Reentrancy {
        /// Description of the lifecycle misuse
        reason: String,
    },

    /// A fan-out worker failed while mapping one element.
    ///
    /// Caught per element: the element is dropped and counted, the pool
    /// keeps running.
    #[error("worker failed in {component}: {reason}")]
    Worker {
        /// Name of the component or mapper that failed
        component: String,
        /// Description of the failure
        reason: String,
    },

    /// Serializing or deserializing an annotation graph failed.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File system error while reading or writing persisted flows.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PageflowError {
    /// Build a [`PageflowError::Geometry`] from any displayable reason.
    #[inline]
    pub fn geometry(reason: impl Into<String>) -> Self {
        Self::Geometry {
            reason: reason.into(),
        }
    }

    /// Build a [`PageflowError::Reference`] from any displayable reason.
    #[inline]
    pub fn reference(reason: impl Into<String>) -> Self {
        Self::Reference {
            reason: reason.into(),
        }
    }

    /// Build a [`PageflowError::Cycle`] from any displayable reason.
    #[inline]
    pub fn cycle(reason: impl Into<String>) -> Self {
        Self::Cycle {
            reason: reason.into(),
        }
    }

    /// Build a [`PageflowError::Reentrancy`] from any displayable reason.
    #[inline]
    pub fn reentrancy(reason: impl Into<String>) -> Self {
        Self::Reentrancy {
            reason: reason.into(),
        }
    }

    /// Build a [`PageflowError::Worker`] wrapping a failed mapper.
    #[inline]
    pub fn worker(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Worker {
            component: component.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this error fails a single datapoint rather than the run.
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_datapoint_error(&self) -> bool {
        matches!(
            self,
            Self::Geometry { .. } | Self::Reference { .. } | Self::Cycle { .. }
        )
    }

    /// Returns true if this error is a flow lifecycle misuse.
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_reentrancy(&self) -> bool {
        matches!(self, Self::Reentrancy { .. })
    }

    /// Returns true if this error wraps a fan-out worker failure.
    #[inline]
    #[must_use = "this method returns a boolean, not modifying the error"]
    pub const fn is_worker_error(&self) -> bool {
        matches!(self, Self::Worker { .. })
    }
}

/// Type alias for Result with [`PageflowError`].
pub type Result<T> = std::result::Result<T, PageflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_error_display() {
        let err = PageflowError::geometry("box outside image bounds");
        assert_eq!(err.to_string(), "geometry error: box outside image bounds");
        assert!(err.is_datapoint_error());
    }

    #[test]
    fn test_reentrancy_is_not_datapoint_error() {
        let err = PageflowError::reentrancy("reset called twice");
        assert!(err.is_reentrancy());
        assert!(!err.is_datapoint_error());
    }

    #[test]
    fn test_worker_error_display() {
        let err = PageflowError::worker("layout", "detector panicked");
        assert!(err.is_worker_error());
        assert!(err.to_string().contains("layout"));
        assert!(err.to_string().contains("detector panicked"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.jsonl");
        let err: PageflowError = io_err.into();
        assert!(err.to_string().contains("missing.jsonl"));
    }
}
