//! Nested analysis of cropped regions.

use crate::component::PipelineComponent;
use crate::manager::DatapointManager;
use pageflow_core::{
    local_to_global, relations, AnnotationId, Category, Image, Result,
};

/// Runs a nested component stack over the crop of each region in the
/// configured categories and lifts the results back into page
/// coordinates.
///
/// The crop becomes an embedded sub-image with its own id namespace;
/// annotations the nested stack produces there are copied up to the
/// parent graph via `local_to_global` and linked to the region through a
/// `child` relationship. A nested failure degrades: the region stays
/// childless and the page run continues.
pub struct SubImageLayoutService {
    categories: Vec<Category>,
    components: Vec<Box<dyn PipelineComponent>>,
}

impl SubImageLayoutService {
    /// Run `components` inside each region of the given categories.
    #[must_use = "returns the new service"]
    pub fn new(categories: Vec<Category>, components: Vec<Box<dyn PipelineComponent>>) -> Self {
        Self {
            categories,
            components,
        }
    }

    /// Run the nested stack over one detached crop.
    fn process_crop(&mut self, crop: Image) -> (Image, Option<String>) {
        let mut nested = DatapointManager::new(crop);
        for component in &mut self.components {
            if let Err(err) = nested.begin_component(component.name()) {
                let (image, _, _) = nested.into_parts();
                return (image, Some(err.to_string()));
            }
            if let Err(err) = component.process(&mut nested) {
                let name = component.name().to_string();
                let (image, _, _) = nested.into_parts();
                return (image, Some(format!("{name}: {err}")));
            }
            nested.finish_component();
        }
        let (image, _, _) = nested.into_parts();
        (image, None)
    }

    /// Copy the crop's active box annotations into the parent graph.
    fn lift_annotations(
        manager: &mut DatapointManager,
        region_id: AnnotationId,
        crop: &Image,
    ) -> Result<Vec<AnnotationId>> {
        let (offset_x, offset_y) = crop
            .embedding()
            .map_or((0.0, 0.0), |e| (e.offset_x, e.offset_y));
        let mut lifted = Vec::new();
        for ann in crop.active_annotations(None) {
            let Some(bbox) = ann.bounding_box() else {
                continue;
            };
            let global = local_to_global(bbox, offset_x, offset_y);
            let new_id = manager.image_mut()?.add_box_annotation(
                ann.category.clone(),
                ann.score,
                global,
            )?;
            lifted.push(new_id);
        }
        if !lifted.is_empty() {
            manager.set_relationship(region_id, relations::CHILD, lifted.clone())?;
        }
        Ok(lifted)
    }
}

impl PipelineComponent for SubImageLayoutService {
    fn name(&self) -> &str {
        "sub_image_layout"
    }

    fn process(&mut self, manager: &mut DatapointManager) -> Result<()> {
        let regions: Vec<AnnotationId> = manager
            .image()
            .active_annotations(Some(&self.categories))
            .map(|a| a.id())
            .collect();
        log::debug!(
            "sub_image_layout: {} regions on {}",
            regions.len(),
            manager.image_id()
        );
        for region_id in regions {
            manager.image_mut()?.crop_annotation(region_id)?;
            let crop = manager.image_mut()?.take_embedded_image(region_id)?;
            let (crop, failure) = self.process_crop(crop);
            match failure {
                None => {
                    Self::lift_annotations(manager, region_id, &crop)?;
                    manager.image_mut()?.put_embedded_image(region_id, crop)?;
                }
                Some(reason) => {
                    log::warn!(
                        "sub_image_layout: nested run failed on region {region_id}: {reason}"
                    );
                    manager.image_mut()?.put_embedded_image(region_id, crop)?;
                }
            }
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn PipelineComponent> {
        Box::new(Self {
            categories: self.categories.clone(),
            components: self.components.clone(),
        })
    }
}
