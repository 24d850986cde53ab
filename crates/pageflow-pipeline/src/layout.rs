//! Page-level layout detection stage.

use crate::component::PipelineComponent;
use crate::extern_model::{DetectionResult, ObjectDetector};
use crate::manager::DatapointManager;
use pageflow_core::{clip, Result};
use std::sync::Arc;

/// Runs an injected detector over the page and writes one box annotation
/// per prediction.
#[derive(Clone)]
pub struct ImageLayoutService {
    detector: Arc<dyn ObjectDetector + Send + Sync>,
    /// Clip predictions to the page bounds instead of rejecting them
    clip_to_page: bool,
}

impl ImageLayoutService {
    /// Wrap the given detector; predictions are written as-is.
    #[must_use = "returns the new service"]
    pub fn new(detector: Arc<dyn ObjectDetector + Send + Sync>) -> Self {
        Self {
            detector,
            clip_to_page: false,
        }
    }

    /// Clip out-of-frame predictions to the page bounds before writing.
    #[must_use = "returns the modified service"]
    pub fn with_clipping(mut self) -> Self {
        self.clip_to_page = true;
        self
    }
}

impl PipelineComponent for ImageLayoutService {
    fn name(&self) -> &str {
        "image_layout"
    }

    fn process(&mut self, manager: &mut DatapointManager) -> Result<()> {
        let detections = self.detector.detect(manager.image())?;
        log::debug!(
            "image_layout: {} detections on {}",
            detections.len(),
            manager.image_id()
        );
        let bounds = manager.image().bounds();
        for det in detections {
            let det = if self.clip_to_page {
                match clip(&det.bbox, &bounds) {
                    Some(bbox) => DetectionResult { bbox, ..det },
                    None => {
                        log::trace!("image_layout: prediction fully out of frame, dropped");
                        continue;
                    }
                }
            } else {
                det
            };
            manager.set_image_annotation(&det, false)?;
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn PipelineComponent> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extern_model::DetectResultGenerator;
    use pageflow_core::{BoundingBox, Category, Image};

    #[test]
    fn test_detections_become_annotations() {
        let detector = Arc::new(DetectResultGenerator::from_triples(vec![
            (
                BoundingBox::new(10.0, 10.0, 90.0, 40.0).unwrap(),
                0.9,
                Category::Title,
            ),
            (
                BoundingBox::new(10.0, 50.0, 90.0, 90.0).unwrap(),
                0.8,
                Category::Text,
            ),
        ]));
        let mut service = ImageLayoutService::new(detector);
        let mut manager = DatapointManager::new(Image::new("p.png", 100.0, 100.0));
        service.process(&mut manager).unwrap();
        assert_eq!(manager.image().active_annotations(None).count(), 2);
        assert_eq!(
            manager
                .image()
                .active_annotations(Some(&[Category::Title]))
                .count(),
            1
        );
    }
}
