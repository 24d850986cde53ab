//! Parent/child assignment by box overlap.

use crate::component::PipelineComponent;
use crate::manager::DatapointManager;
use pageflow_core::{
    intersection_over_first, iou, relations, AnnotationId, BoundingBox, Category, Result,
};
use rustc_hash::FxHashMap;

/// Overlap metric used for assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMetric {
    /// Intersection over union
    #[default]
    Iou,
    /// Intersection over the child's own area; favors full containment
    IoChild,
}

impl MatchMetric {
    fn score(self, child: &BoundingBox, parent: &BoundingBox) -> f64 {
        match self {
            Self::Iou => iou(child, parent),
            Self::IoChild => intersection_over_first(child, parent),
        }
    }
}

/// Assigns child annotations to the best-overlapping parent annotation.
///
/// Each child goes to the argmax parent whose overlap clears the
/// threshold; ties resolve to the larger parent area, then the lower
/// parent id, so assignment is deterministic across runs. Matched
/// children land in the parent's `child` relationship; children no
/// parent claims are recorded on the page summary instead of being
/// silently dropped.
#[derive(Debug, Clone)]
pub struct MatchingService {
    parent_categories: Vec<Category>,
    child_categories: Vec<Category>,
    threshold: f64,
    metric: MatchMetric,
}

impl MatchingService {
    /// Assign `child_categories` to `parent_categories` at the given
    /// overlap threshold.
    #[must_use = "returns the new service"]
    pub fn new(
        parent_categories: Vec<Category>,
        child_categories: Vec<Category>,
        threshold: f64,
        metric: MatchMetric,
    ) -> Self {
        Self {
            parent_categories,
            child_categories,
            threshold,
            metric,
        }
    }

    fn best_parent(
        &self,
        child_bbox: &BoundingBox,
        parents: &[(AnnotationId, BoundingBox)],
    ) -> Option<AnnotationId> {
        let mut best: Option<(f64, f64, AnnotationId)> = None;
        for (parent_id, parent_bbox) in parents {
            let score = self.metric.score(child_bbox, parent_bbox);
            if score < self.threshold {
                continue;
            }
            let area = parent_bbox.area();
            let candidate = (score, area, *parent_id);
            best = Some(match best {
                None => candidate,
                Some(current) => {
                    // higher score wins, then larger area, then lower id
                    let (cur_score, cur_area, cur_id) = current;
                    if score > cur_score
                        || (score == cur_score && area > cur_area)
                        || (score == cur_score && area == cur_area && *parent_id < cur_id)
                    {
                        candidate
                    } else {
                        current
                    }
                }
            });
        }
        best.map(|(_, _, id)| id)
    }
}

impl PipelineComponent for MatchingService {
    fn name(&self) -> &str {
        "matching"
    }

    fn process(&mut self, manager: &mut DatapointManager) -> Result<()> {
        let parents: Vec<(AnnotationId, BoundingBox)> = manager
            .image()
            .active_annotations(Some(&self.parent_categories))
            .filter_map(|a| a.bounding_box().map(|b| (a.id(), *b)))
            .collect();
        let children: Vec<(AnnotationId, BoundingBox)> = manager
            .image()
            .active_annotations(Some(&self.child_categories))
            .filter_map(|a| a.bounding_box().map(|b| (a.id(), *b)))
            .collect();

        let mut assigned: FxHashMap<AnnotationId, Vec<AnnotationId>> = FxHashMap::default();
        let mut unmatched: Vec<AnnotationId> = Vec::new();
        for (child_id, child_bbox) in &children {
            match self.best_parent(child_bbox, &parents) {
                Some(parent_id) => assigned.entry(parent_id).or_default().push(*child_id),
                None => unmatched.push(*child_id),
            }
        }
        log::debug!(
            "matching: {} children over {} parents, {} unmatched on {}",
            children.len(),
            parents.len(),
            unmatched.len(),
            manager.image_id()
        );

        for (parent_id, child_ids) in assigned {
            manager.set_relationship(parent_id, relations::CHILD, child_ids)?;
        }
        if !unmatched.is_empty() {
            let summary_id = manager.set_summary()?.id();
            manager.set_relationship(summary_id, relations::UNMATCHED, unmatched)?;
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
    use pageflow_core::Image;

    fn bbox(ulx: f64, uly: f64, lrx: f64, lry: f64) -> BoundingBox {
        BoundingBox::new(ulx, uly, lrx, lry).unwrap()
    }

    fn service(threshold: f64, metric: MatchMetric) -> MatchingService {
        MatchingService::new(
            vec![Category::Text],
            vec![Category::Word],
            threshold,
            metric,
        )
    }

    #[test]
    fn test_child_goes_to_argmax_parent() {
        let mut manager = DatapointManager::new(Image::new("p.png", 200.0, 200.0));
        let image = manager.image_mut().unwrap();
        let far = image
            .add_box_annotation(Category::Text, None, bbox(100.0, 100.0, 180.0, 180.0))
            .unwrap();
        let near = image
            .add_box_annotation(Category::Text, None, bbox(10.0, 10.0, 90.0, 90.0))
            .unwrap();
        let word = image
            .add_box_annotation(Category::Word, None, bbox(20.0, 20.0, 40.0, 30.0))
            .unwrap();

        service(0.01, MatchMetric::Iou)
            .process(&mut manager)
            .unwrap();
        let parent = manager.image().get_annotation(near).unwrap();
        assert_eq!(parent.relationship(relations::CHILD), &[word]);
        assert!(manager
            .image()
            .get_annotation(far)
            .unwrap()
            .relationship(relations::CHILD)
            .is_empty());
    }

    #[test]
    fn test_contained_child_matches_fully_under_io_child() {
        let mut manager = DatapointManager::new(Image::new("p.png", 200.0, 200.0));
        let image = manager.image_mut().unwrap();
        let block = image
            .add_box_annotation(Category::Text, None, bbox(0.0, 0.0, 200.0, 200.0))
            .unwrap();
        let word = image
            .add_box_annotation(Category::Word, None, bbox(5.0, 5.0, 15.0, 10.0))
            .unwrap();

        // IoU of a tiny word against the page-sized block is ~0, but the
        // word is fully contained
        service(0.99, MatchMetric::IoChild)
            .process(&mut manager)
            .unwrap();
        assert_eq!(
            manager
                .image()
                .get_annotation(block)
                .unwrap()
                .relationship(relations::CHILD),
            &[word]
        );
    }

    #[test]
    fn test_unmatched_child_recorded_on_summary() {
        let mut manager = DatapointManager::new(Image::new("p.png", 200.0, 200.0));
        let image = manager.image_mut().unwrap();
        image
            .add_box_annotation(Category::Text, None, bbox(0.0, 0.0, 50.0, 50.0))
            .unwrap();
        let stray = image
            .add_box_annotation(Category::Word, None, bbox(150.0, 150.0, 180.0, 180.0))
            .unwrap();

        service(0.5, MatchMetric::Iou).process(&mut manager).unwrap();
        let summary = manager.image().summary().unwrap();
        assert_eq!(summary.relationship(relations::UNMATCHED), &[stray]);
    }

    #[test]
    fn test_equal_overlap_tie_breaks_to_larger_parent() {
        let mut manager = DatapointManager::new(Image::new("p.png", 400.0, 200.0));
        let image = manager.image_mut().unwrap();
        // word sits exactly on the shared edge region of both parents with
        // identical intersection; the right parent is larger
        let small = image
            .add_box_annotation(Category::Text, None, bbox(0.0, 0.0, 100.0, 100.0))
            .unwrap();
        let large = image
            .add_box_annotation(Category::Text, None, bbox(0.0, 0.0, 100.0, 200.0))
            .unwrap();
        let word = image
            .add_box_annotation(Category::Word, None, bbox(10.0, 10.0, 20.0, 20.0))
            .unwrap();

        // under IoChild both parents fully contain the word (score 1.0)
        service(0.5, MatchMetric::IoChild)
            .process(&mut manager)
            .unwrap();
        assert_eq!(
            manager
                .image()
                .get_annotation(large)
                .unwrap()
                .relationship(relations::CHILD),
            &[word]
        );
        assert!(manager
            .image()
            .get_annotation(small)
            .unwrap()
            .relationship(relations::CHILD)
            .is_empty());
    }
}
