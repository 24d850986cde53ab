//! Text recognition stage over word and line regions.

use crate::component::PipelineComponent;
use crate::extern_model::TextRecognizer;
use crate::manager::DatapointManager;
use pageflow_core::{slots, AnnotationId, Category, Result, SubCategory};
use std::sync::Arc;

/// Runs an injected recognizer over the crops of configured categories
/// and stores the recognized text as `characters` sub-annotations.
///
/// Regions without a materialized crop are cropped on the fly; the crop
/// stays on the annotation afterwards, so a later pass is free.
#[derive(Clone)]
pub struct TextExtractionService {
    recognizer: Arc<dyn TextRecognizer + Send + Sync>,
    categories: Vec<Category>,
}

impl TextExtractionService {
    /// Recognize text on regions of the given categories.
    #[must_use = "returns the new service"]
    pub fn new(
        recognizer: Arc<dyn TextRecognizer + Send + Sync>,
        categories: Vec<Category>,
    ) -> Self {
        Self {
            recognizer,
            categories,
        }
    }
}

impl PipelineComponent for TextExtractionService {
    fn name(&self) -> &str {
        "text_extraction"
    }

    fn process(&mut self, manager: &mut DatapointManager) -> Result<()> {
        let targets: Vec<AnnotationId> = manager
            .image()
            .active_annotations(Some(&self.categories))
            .map(|a| a.id())
            .collect();
        log::debug!(
            "text_extraction: {} regions on {}",
            targets.len(),
            manager.image_id()
        );
        for ann_id in targets {
            manager.image_mut()?.crop_annotation(ann_id)?;
            let crop = manager.image_mut()?.take_embedded_image(ann_id)?;
            let recognized = self.recognizer.recognize(&crop);
            manager.image_mut()?.put_embedded_image(ann_id, crop)?;
            let result = recognized?;
            manager.set_category_annotation(
                slots::CHARACTERS,
                SubCategory::with_value(Category::Word, result.text).scored(result.score),
                ann_id,
            )?;
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn PipelineComponent> {
        Box::new(self.clone())
    }
}
