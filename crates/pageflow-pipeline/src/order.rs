//! Column-aware reading order over text blocks and their words.

use crate::component::PipelineComponent;
use crate::manager::DatapointManager;
use pageflow_core::{
    interval_iou, relations, slots, AnnotationId, BoundingBox, Category, Result, SubCategory,
};

/// Minimum x-interval IoU for two blocks to share a column.
const COLUMN_X_OVERLAP: f64 = 0.3;

/// Orders layout blocks into a reading sequence and numbers the words
/// inside each block.
///
/// Blocks are clustered into columns by x-interval overlap; columns read
/// left to right, blocks inside a column top to bottom, ties by insertion
/// order. Floating categories (figures, captions) do not join columns;
/// they slot into the sequence by vertical center. Within a block, the
/// child words are grouped into lines by y-center and read line by line,
/// left to right.
#[derive(Debug, Clone)]
pub struct TextOrderService {
    text_categories: Vec<Category>,
    floating_categories: Vec<Category>,
}

impl TextOrderService {
    /// Order `text_categories` in columns, interleaving
    /// `floating_categories` by vertical position.
    #[must_use = "returns the new service"]
    pub fn new(text_categories: Vec<Category>, floating_categories: Vec<Category>) -> Self {
        Self {
            text_categories,
            floating_categories,
        }
    }

    /// Greedy column clustering over blocks sorted left to right.
    fn columns(blocks: &[(AnnotationId, BoundingBox)]) -> Vec<Vec<usize>> {
        let mut by_x: Vec<usize> = (0..blocks.len()).collect();
        by_x.sort_by(|&a, &b| {
            blocks[a]
                .1
                .ulx()
                .partial_cmp(&blocks[b].1.ulx())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // each column carries its members and a running x-interval
        let mut columns: Vec<(Vec<usize>, (f64, f64))> = Vec::new();
        for idx in by_x {
            let interval = (blocks[idx].1.ulx(), blocks[idx].1.lrx());
            match columns
                .iter_mut()
                .find(|(_, col_iv)| interval_iou(*col_iv, interval) > COLUMN_X_OVERLAP)
            {
                Some((members, col_iv)) => {
                    members.push(idx);
                    col_iv.0 = col_iv.0.min(interval.0);
                    col_iv.1 = col_iv.1.max(interval.1);
                }
                None => columns.push((vec![idx], interval)),
            }
        }
        columns.sort_by(|(_, a), (_, b)| {
            a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal)
        });
        columns
            .into_iter()
            .map(|(mut members, _)| {
                // top to bottom; stable sort keeps insertion order on ties
                members.sort_by(|&a, &b| {
                    blocks[a]
                        .1
                        .uly()
                        .partial_cmp(&blocks[b].1.uly())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                members
            })
            .collect()
    }

    /// Group a block's words into lines and number them reading-wise.
    fn order_words(
        manager: &mut DatapointManager,
        block_id: AnnotationId,
    ) -> Result<()> {
        let word_ids: Vec<AnnotationId> = manager
            .image()
            .get_annotation(block_id)
            .map(|a| a.relationship(relations::CHILD).to_vec())
            .unwrap_or_default();
        let mut words: Vec<(AnnotationId, BoundingBox)> = word_ids
            .into_iter()
            .filter_map(|id| {
                let ann = manager.image().get_annotation(id)?;
                if !ann.is_active() {
                    return None;
                }
                ann.bounding_box().map(|b| (id, *b))
            })
            .collect();
        if words.is_empty() {
            return Ok(());
        }

        words.sort_by(|a, b| {
            a.1.center()
                .1
                .partial_cmp(&b.1.center().1)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        // a word starts a new line when its center falls below the current
        // line's vertical extent midpoint
        let mut lines: Vec<Vec<(AnnotationId, BoundingBox)>> = Vec::new();
        for (id, bbox) in words {
            let new_line = match lines.last() {
                Some(line) => {
                    let line_bottom = line
                        .iter()
                        .map(|(_, b)| b.lry())
                        .fold(f64::NEG_INFINITY, f64::max);
                    bbox.center().1 > line_bottom
                }
                None => true,
            };
            match lines.last_mut() {
                Some(line) if !new_line => line.push((id, bbox)),
                _ => lines.push(vec![(id, bbox)]),
            }
        }

        let mut position = 0usize;
        for line in &mut lines {
            line.sort_by(|a, b| {
                a.1.ulx()
                    .partial_cmp(&b.1.ulx())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for (word_id, _) in line.iter() {
                position += 1;
                manager.set_category_annotation(
                    slots::READING_ORDER,
                    SubCategory::with_value(Category::Word, position.to_string()),
                    *word_id,
                )?;
            }
        }
        Ok(())
    }
}

impl PipelineComponent for TextOrderService {
    fn name(&self) -> &str {
        "text_order"
    }

    fn process(&mut self, manager: &mut DatapointManager) -> Result<()> {
        let blocks: Vec<(AnnotationId, BoundingBox)> = manager
            .image()
            .active_annotations(Some(&self.text_categories))
            .filter_map(|a| a.bounding_box().map(|b| (a.id(), *b)))
            .collect();
        let floats: Vec<(AnnotationId, BoundingBox)> = manager
            .image()
            .active_annotations(Some(&self.floating_categories))
            .filter_map(|a| a.bounding_box().map(|b| (a.id(), *b)))
            .collect();

        let mut sequence: Vec<AnnotationId> = Self::columns(&blocks)
            .into_iter()
            .flatten()
            .map(|idx| blocks[idx].0)
            .collect();

        // floats slot in before the first block whose center is lower
        for (float_id, float_bbox) in &floats {
            let float_cy = float_bbox.center().1;
            let at = sequence
                .iter()
                .position(|id| {
                    blocks
                        .iter()
                        .find(|(bid, _)| bid == id)
                        .is_some_and(|(_, b)| b.center().1 > float_cy)
                })
                .unwrap_or(sequence.len());
            sequence.insert(at, *float_id);
        }
        log::debug!(
            "text_order: {} blocks, {} floating on {}",
            blocks.len(),
            floats.len(),
            manager.image_id()
        );

        for (position, ann_id) in sequence.iter().enumerate() {
            manager.set_category_annotation(
                slots::READING_ORDER,
                SubCategory::with_value(Category::Text, (position + 1).to_string()),
                *ann_id,
            )?;
        }
        for (block_id, _) in &blocks {
            Self::order_words(manager, *block_id)?;
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn PipelineComponent> {
        Box::new(self.clone())
    }
}
