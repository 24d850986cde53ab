//! Component orchestration over single datapoints, lazy flows and
//! eager batches.

use crate::component::PipelineComponent;
use crate::manager::{DatapointManager, DatapointState};
use pageflow_core::{Image, ImageId, Page, Result};
use pageflow_dataflow::DataFlow;
use rayon::prelude::*;

/// Why one datapoint fell out of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    /// Id of the failed image graph
    pub image_id: ImageId,
    /// Component the failure is attributed to
    pub component: String,
    /// Rendered failure cause
    pub reason: String,
}

/// Final state of one datapoint after a pipeline run.
#[derive(Debug)]
pub struct PipelineOutput {
    /// The (possibly mutated) graph
    pub image: Image,
    /// Terminal state machine position
    pub state: DatapointState,
    /// Page projection, when a parsing stage ran
    pub page: Option<Page>,
}

impl PipelineOutput {
    /// Whether the datapoint survived the run.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub fn is_failed(&self) -> bool {
        matches!(self.state, DatapointState::Failed { .. })
    }
}

/// An ordered stack of components applied datapoint by datapoint.
///
/// A non-best-effort component error fails the datapoint and skips the
/// remaining stack; a best-effort error logs and moves on with the graph
/// unchanged by that stage.
pub struct Pipeline {
    components: Vec<Box<dyn PipelineComponent>>,
}

impl Clone for Pipeline {
    fn clone(&self) -> Self {
        Self {
            components: self.components.clone(),
        }
    }
}

impl Pipeline {
    /// Assemble a pipeline from an ordered component stack.
    #[must_use = "returns the new pipeline"]
    pub fn new(components: Vec<Box<dyn PipelineComponent>>) -> Self {
        Self { components }
    }

    /// Component names in run order.
    #[must_use = "accessor has no side effects"]
    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Run the whole stack over one datapoint.
    pub fn process_one(&mut self, image: Image) -> PipelineOutput {
        let mut manager = DatapointManager::new(image);
        for component in &mut self.components {
            let name = component.name().to_string();
            if let Err(err) = manager.begin_component(&name) {
                log::error!("pipeline: cannot enter {name}: {err}");
                break;
            }
            match component.process(&mut manager) {
                Ok(()) => manager.finish_component(),
                Err(err) if component.is_best_effort() => {
                    log::warn!("pipeline: best-effort component {name} degraded: {err}");
                    manager.finish_component();
                }
                Err(err) => {
                    manager.fail(&name, err.to_string());
                    break;
                }
            }
        }
        let (image, state, page) = manager.into_parts();
        PipelineOutput { image, state, page }
    }

    /// Lazy run over a flow of images; failed datapoints leave the output
    /// sequence and surface as [`FailureReport`]s on the returned flow.
    #[must_use = "returns the new flow"]
    pub fn analyze<F>(self, flow: F) -> PipelineFlow<F>
    where
        F: DataFlow<Item = Image>,
    {
        PipelineFlow {
            pipeline: self,
            flow,
            failures: Vec::new(),
        }
    }

    /// Eager parallel run preserving input order in the output.
    #[must_use = "returns the processed outputs"]
    pub fn analyze_batch(&self, images: Vec<Image>) -> Vec<PipelineOutput> {
        images
            .into_par_iter()
            .map_init(|| self.clone(), |pipeline, image| pipeline.process_one(image))
            .collect()
    }
}

/// Lazy pipeline application over an upstream image flow.
pub struct PipelineFlow<F> {
    pipeline: Pipeline,
    flow: F,
    failures: Vec<FailureReport>,
}

impl<F> PipelineFlow<F> {
    /// Failures recorded since the last reset.
    #[must_use = "accessor has no side effects"]
    pub fn failures(&self) -> &[FailureReport] {
        &self.failures
    }
}

impl<F> DataFlow for PipelineFlow<F>
where
    F: DataFlow<Item = Image>,
{
    type Item = PipelineOutput;

    fn reset(&mut self) -> Result<()> {
        self.failures.clear();
        self.flow.reset()
    }

    fn try_next(&mut self) -> Result<Option<PipelineOutput>> {
        while let Some(image) = self.flow.try_next()? {
            let output = self.pipeline.process_one(image);
            if let DatapointState::Failed { component, reason } = &output.state {
                self.failures.push(FailureReport {
                    image_id: output.image.id(),
                    component: component.clone(),
                    reason: reason.clone(),
                });
                continue;
            }
            return Ok(Some(output));
        }
        Ok(None)
    }

    fn size_hint(&self) -> Option<usize> {
        self.flow.size_hint()
    }

    fn teardown(&mut self) {
        self.failures.clear();
        self.flow.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageflow_core::{BoundingBox, Category, PageflowError};
    use pageflow_dataflow::{DataFlowExt, DataFromList};

    /// Adds one text annotation per run.
    #[derive(Clone)]
    struct StampComponent;

    impl PipelineComponent for StampComponent {
        fn name(&self) -> &str {
            "stamp"
        }
        fn process(&mut self, manager: &mut DatapointManager) -> Result<()> {
            manager.image_mut()?.add_box_annotation(
                Category::Text,
                None,
                BoundingBox::new(0.0, 0.0, 10.0, 10.0).unwrap(),
            )?;
            Ok(())
        }
        fn clone_box(&self) -> Box<dyn PipelineComponent> {
            Box::new(self.clone())
        }
    }

    /// Fails pages narrower than 100 units.
    #[derive(Clone)]
    struct RejectNarrow {
        best_effort: bool,
    }

    impl PipelineComponent for RejectNarrow {
        fn name(&self) -> &str {
            "reject_narrow"
        }
        fn process(&mut self, manager: &mut DatapointManager) -> Result<()> {
            if manager.image().width() < 100.0 {
                return Err(PageflowError::worker("reject_narrow", "page too narrow"));
            }
            Ok(())
        }
        fn is_best_effort(&self) -> bool {
            self.best_effort
        }
        fn clone_box(&self) -> Box<dyn PipelineComponent> {
            Box::new(self.clone())
        }
    }

    fn pages() -> Vec<Image> {
        vec![
            Image::new("wide_a.png", 200.0, 100.0),
            Image::new("narrow.png", 50.0, 100.0),
            Image::new("wide_b.png", 300.0, 100.0),
        ]
    }

    #[test]
    fn test_failed_datapoint_leaves_flow_and_is_reported() {
        let pipeline = Pipeline::new(vec![
            Box::new(RejectNarrow { best_effort: false }) as Box<dyn PipelineComponent>,
            Box::new(StampComponent),
        ]);
        let mut flow = pipeline.analyze(DataFromList::new(pages()));
        let outputs = flow.collect_all().unwrap();
        assert_eq!(outputs.len(), 2);
        assert!(outputs.iter().all(|o| !o.is_failed()));
        assert_eq!(flow.failures().len(), 1);
        assert_eq!(flow.failures()[0].component, "reject_narrow");
        assert_eq!(
            flow.failures()[0].image_id,
            Image::new("narrow.png", 50.0, 100.0).id()
        );
    }

    #[test]
    fn test_best_effort_failure_passes_datapoint_through() {
        let pipeline = Pipeline::new(vec![
            Box::new(RejectNarrow { best_effort: true }) as Box<dyn PipelineComponent>,
            Box::new(StampComponent),
        ]);
        let mut flow = pipeline.analyze(DataFromList::new(pages()));
        let outputs = flow.collect_all().unwrap();
        assert_eq!(outputs.len(), 3);
        assert!(flow.failures().is_empty());
        // the later component still ran on the degraded datapoint
        assert!(outputs
            .iter()
            .all(|o| o.image.active_annotations(None).count() == 1));
    }

    #[test]
    fn test_batch_preserves_input_order() {
        let pipeline = Pipeline::new(vec![Box::new(StampComponent) as Box<dyn PipelineComponent>]);
        let inputs = pages();
        let expected: Vec<_> = inputs.iter().map(Image::id).collect();
        let outputs = pipeline.analyze_batch(inputs);
        let got: Vec<_> = outputs.iter().map(|o| o.image.id()).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_failure_skips_remaining_components() {
        let mut pipeline = Pipeline::new(vec![
            Box::new(RejectNarrow { best_effort: false }) as Box<dyn PipelineComponent>,
            Box::new(StampComponent),
        ]);
        let output = pipeline.process_one(Image::new("narrow.png", 50.0, 100.0));
        assert!(output.is_failed());
        assert_eq!(output.image.active_annotations(None).count(), 0);
    }
}
