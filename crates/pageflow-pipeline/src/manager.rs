//! Mediated mutation of one datapoint's annotation graph.
//!
//! Components never touch an [`Image`] directly; every write goes through
//! the [`DatapointManager`], which tracks the datapoint's position in the
//! processing state machine and refuses mutation once the terminal
//! projection exists.
//!
//! ```text
//!   Created ──▶ Processing ──▶ Mutated ──▶ Parsed
//!                   │                        (terminal, read-only)
//!                   └──────────▶ Failed
//! ```

use crate::extern_model::DetectionResult;
use pageflow_core::{
    relations, Annotation, AnnotationId, Category, ContainerValue, Image, ImageId, Page,
    PageflowError, Result, SubCategory,
};

/// Processing position of one datapoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatapointState {
    /// Fresh datapoint; no component has run yet
    Created,
    /// A component currently holds the datapoint
    Processing {
        /// Name of the active component
        component: String,
    },
    /// At least one component completed and mutated the graph
    Mutated,
    /// Terminal projection built; graph is read-only from here
    Parsed,
    /// A non-best-effort component failed the datapoint
    Failed {
        /// Name of the failing component
        component: String,
        /// Rendered failure cause
        reason: String,
    },
}

/// Write mediator over one image graph for the duration of a pipeline run.
#[derive(Debug)]
pub struct DatapointManager {
    image: Image,
    state: DatapointState,
    page: Option<Page>,
}

impl DatapointManager {
    /// Take ownership of a fresh datapoint.
    #[must_use = "returns the new manager"]
    pub fn new(image: Image) -> Self {
        Self {
            image,
            state: DatapointState::Created,
            page: None,
        }
    }

    /// Id of the managed image graph.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub fn image_id(&self) -> ImageId {
        self.image.id()
    }

    /// Current state machine position.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn state(&self) -> &DatapointState {
        &self.state
    }

    /// Read access to the managed graph.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn image(&self) -> &Image {
        &self.image
    }

    /// Terminal page projection, once built.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    /// Mark the datapoint as held by `component`.
    pub fn begin_component(&mut self, component: &str) -> Result<()> {
        self.ensure_mutable()?;
        log::trace!(
            "datapoint {}: entering component {component}",
            self.image.id()
        );
        self.state = DatapointState::Processing {
            component: component.to_string(),
        };
        Ok(())
    }

    /// Record that the active component completed.
    pub fn finish_component(&mut self) {
        if matches!(self.state, DatapointState::Processing { .. }) {
            self.state = DatapointState::Mutated;
        }
    }

    /// Record a terminal failure attributed to `component`.
    pub fn fail(&mut self, component: &str, reason: impl Into<String>) {
        let reason = reason.into();
        log::debug!(
            "datapoint {}: failed in {component}: {reason}",
            self.image.id()
        );
        self.state = DatapointState::Failed {
            component: component.to_string(),
            reason,
        };
    }

    fn ensure_mutable(&self) -> Result<()> {
        match &self.state {
            DatapointState::Parsed => Err(PageflowError::reentrancy(format!(
                "datapoint {} already parsed, graph is read-only",
                self.image.id()
            ))),
            DatapointState::Failed { component, .. } => Err(PageflowError::reentrancy(format!(
                "datapoint {} already failed in {component}",
                self.image.id()
            ))),
            _ => Ok(()),
        }
    }

    /// Turn a detection into a box annotation, optionally materializing
    /// the crop as an embedded sub-image.
    ///
    /// # Returns
    ///
    /// Id of the new annotation.
    pub fn set_image_annotation(
        &mut self,
        detection: &DetectionResult,
        crop: bool,
    ) -> Result<AnnotationId> {
        self.ensure_mutable()?;
        let category = detection
            .class_name
            .clone()
            .unwrap_or_else(|| Category::Custom(format!("class_{}", detection.class_id)));
        let ann_id =
            self.image
                .add_box_annotation(category, Some(detection.score), detection.bbox)?;
        if crop {
            self.image.crop_annotation(ann_id)?;
        }
        Ok(ann_id)
    }

    /// Store a fact on the named sub-annotation slot of `target`.
    pub fn set_category_annotation(
        &mut self,
        slot: &str,
        sub: SubCategory,
        target: AnnotationId,
    ) -> Result<()> {
        self.ensure_mutable()?;
        let ann = self
            .image
            .get_annotation_mut(target)
            .ok_or_else(|| PageflowError::reference(format!("no annotation {target}")))?;
        ann.set_sub_category(slot, sub);
        Ok(())
    }

    /// Append a container annotation holding recognized content,
    /// optionally linked as a child of an owning annotation.
    pub fn set_container_annotation(
        &mut self,
        category: Category,
        score: Option<f64>,
        value: ContainerValue,
        target: Option<AnnotationId>,
    ) -> Result<AnnotationId> {
        self.ensure_mutable()?;
        let container = self.image.add_container_annotation(category, score, value)?;
        if let Some(owner) = target {
            let mut children = self
                .image
                .get_annotation(owner)
                .ok_or_else(|| PageflowError::reference(format!("no annotation {owner}")))?
                .relationship(relations::CHILD)
                .to_vec();
            children.push(container);
            self.image
                .set_relationship(owner, relations::CHILD, children)?;
        }
        Ok(container)
    }

    /// Point the named relationship slot of `ann_id` at `targets`.
    pub fn set_relationship(
        &mut self,
        ann_id: AnnotationId,
        slot: &str,
        targets: Vec<AnnotationId>,
    ) -> Result<()> {
        self.ensure_mutable()?;
        self.image.set_relationship(ann_id, slot, targets)
    }

    /// Mutable page summary annotation, creating it on first use.
    pub fn set_summary(&mut self) -> Result<&mut Annotation> {
        self.ensure_mutable()?;
        Ok(self.image.summary_mut())
    }

    /// Soft-delete an annotation.
    pub fn deactivate(&mut self, ann_id: AnnotationId) -> Result<()> {
        self.ensure_mutable()?;
        self.image.deactivate(ann_id)
    }

    /// Direct mutable access for services that operate on crops.
    ///
    /// Callers stay inside the state machine: this fails exactly where the
    /// named mutators would.
    pub fn image_mut(&mut self) -> Result<&mut Image> {
        self.ensure_mutable()?;
        Ok(&mut self.image)
    }

    /// Attach the terminal projection and seal the graph.
    pub fn attach_page(&mut self, page: Page) -> Result<()> {
        self.ensure_mutable()?;
        self.page = Some(page);
        self.state = DatapointState::Parsed;
        Ok(())
    }

    /// Dissolve the manager, handing back the graph and projection.
    #[must_use = "returns the managed graph"]
    pub fn into_parts(self) -> (Image, DatapointState, Option<Page>) {
        (self.image, self.state, self.page)
    }
}
