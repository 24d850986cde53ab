//! Table structure recognition: boundary deduplication, tiling and cell
//! grid assignment.

use crate::component::PipelineComponent;
use crate::manager::DatapointManager;
use pageflow_core::{
    interval_iou, slots, AnnotationId, BoundingBox, Category, Result, SubCategory,
};
use ordered_float::OrderedFloat;

/// Deterministic resolution of equal-confidence duplicate boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// Keep the boundary with the lower annotation id (the default)
    #[default]
    KeepLowerId,
    /// Keep the boundary with the higher annotation id
    KeepHigherId,
}

/// One row or column candidate during segmentation.
#[derive(Debug, Clone, Copy)]
struct Boundary {
    id: AnnotationId,
    bbox: BoundingBox,
    score: f64,
}

impl Boundary {
    /// Projection onto the axis the boundary segments.
    fn interval(&self, vertical_axis: bool) -> (f64, f64) {
        if vertical_axis {
            (self.bbox.uly(), self.bbox.lry())
        } else {
            (self.bbox.ulx(), self.bbox.lrx())
        }
    }
}

/// Recovers the grid structure inside each table region.
///
/// Stages per table: drop duplicate row/column boundaries by single-axis
/// IoU, stretch the survivors to tile the table exactly, number them,
/// assign every cell its grid position and spans by maximal overlap, and
/// write the row/column counts onto the table annotation.
#[derive(Debug, Clone)]
pub struct TableSegmentationService {
    removal_iou_threshold: f64,
    tie_policy: TiePolicy,
}

impl TableSegmentationService {
    /// Segment with the given duplicate threshold and tie policy.
    #[must_use = "returns the new service"]
    pub fn new(removal_iou_threshold: f64, tie_policy: TiePolicy) -> Self {
        Self {
            removal_iou_threshold,
            tie_policy,
        }
    }

    /// Drop duplicate boundaries, returning the ids to deactivate.
    ///
    /// Candidates are visited lowest-confidence first, so of a duplicate
    /// pair the weaker one always goes; equal confidence falls back to
    /// the tie policy.
    fn duplicates(&self, boundaries: &[Boundary], vertical_axis: bool) -> Vec<AnnotationId> {
        let mut order: Vec<usize> = (0..boundaries.len()).collect();
        // weakest first; the preferred side of an equal-confidence pair
        // sorts later and thereby survives
        order.sort_by(|&x, &y| {
            OrderedFloat(boundaries[x].score)
                .cmp(&OrderedFloat(boundaries[y].score))
                .then_with(|| match self.tie_policy {
                    TiePolicy::KeepLowerId => boundaries[y].id.cmp(&boundaries[x].id),
                    TiePolicy::KeepHigherId => boundaries[x].id.cmp(&boundaries[y].id),
                })
        });

        let mut removed = vec![false; boundaries.len()];
        let mut dropped = Vec::new();
        for (pos, &i) in order.iter().enumerate() {
            if removed[i] {
                continue;
            }
            // only later (stronger) candidates can displace this one
            for &j in &order[pos + 1..] {
                if removed[j] {
                    continue;
                }
                let overlap = interval_iou(
                    boundaries[i].interval(vertical_axis),
                    boundaries[j].interval(vertical_axis),
                );
                if overlap > self.removal_iou_threshold {
                    removed[i] = true;
                    dropped.push(boundaries[i].id);
                    break;
                }
            }
        }
        dropped
    }

    /// Stretch survivors to tile `table` along their axis: boundaries move
    /// to the midpoints between neighbors and the outermost edges snap to
    /// the table frame; the cross axis spans the full table.
    fn tile(
        table: &BoundingBox,
        boundaries: &mut [Boundary],
        vertical_axis: bool,
    ) -> Result<()> {
        if boundaries.is_empty() {
            return Ok(());
        }
        boundaries.sort_by_key(|b| {
            let (lo, hi) = b.interval(vertical_axis);
            OrderedFloat(lo + hi)
        });
        let (frame_lo, frame_hi) = if vertical_axis {
            (table.uly(), table.lry())
        } else {
            (table.ulx(), table.lrx())
        };
        let n = boundaries.len();
        let mut edges = Vec::with_capacity(n + 1);
        edges.push(frame_lo);
        for w in boundaries.windows(2) {
            let (_, hi_a) = w[0].interval(vertical_axis);
            let (lo_b, _) = w[1].interval(vertical_axis);
            edges.push((hi_a + lo_b) / 2.0);
        }
        edges.push(frame_hi);

        for (i, boundary) in boundaries.iter_mut().enumerate() {
            boundary.bbox = if vertical_axis {
                BoundingBox::new(table.ulx(), edges[i], table.lrx(), edges[i + 1])?
            } else {
                BoundingBox::new(edges[i], table.uly(), edges[i + 1], table.lry())?
            };
        }
        Ok(())
    }

    /// 1-based index of the boundary overlapping `cell` most, plus the
    /// span of boundaries the cell covers by at least half their extent.
    fn position_and_span(
        cell: (f64, f64),
        boundaries: &[Boundary],
        vertical_axis: bool,
    ) -> Option<(usize, usize)> {
        let overlap_len = |a: (f64, f64), b: (f64, f64)| (a.1.min(b.1) - a.0.max(b.0)).max(0.0);
        let position = boundaries
            .iter()
            .enumerate()
            .max_by_key(|(_, b)| OrderedFloat(overlap_len(cell, b.interval(vertical_axis))))
            .map(|(i, _)| i + 1)?;
        let span = boundaries
            .iter()
            .filter(|b| {
                let iv = b.interval(vertical_axis);
                let extent = (iv.1 - iv.0).max(f64::EPSILON);
                overlap_len(cell, iv) / extent >= 0.5
            })
            .count()
            .max(1);
        Some((position, span))
    }

    fn segment_table(
        &self,
        manager: &mut DatapointManager,
        table_id: AnnotationId,
        table_bbox: BoundingBox,
    ) -> Result<()> {
        let collect = |manager: &DatapointManager, category: Category| -> Vec<Boundary> {
            manager
                .image()
                .active_annotations(Some(&[category]))
                .filter_map(|a| {
                    let bbox = *a.bounding_box()?;
                    let (cx, cy) = bbox.center();
                    let inside = cx >= table_bbox.ulx()
                        && cx <= table_bbox.lrx()
                        && cy >= table_bbox.uly()
                        && cy <= table_bbox.lry();
                    inside.then_some(Boundary {
                        id: a.id(),
                        bbox,
                        score: a.score.unwrap_or(0.0),
                    })
                })
                .collect()
        };

        let mut rows = collect(manager, Category::Row);
        let mut cols = collect(manager, Category::Column);

        for dropped in self.duplicates(&rows, true) {
            manager.deactivate(dropped)?;
            rows.retain(|b| b.id != dropped);
        }
        for dropped in self.duplicates(&cols, false) {
            manager.deactivate(dropped)?;
            cols.retain(|b| b.id != dropped);
        }
        log::debug!(
            "table_segmentation: table {table_id} has {} rows, {} columns after dedup",
            rows.len(),
            cols.len()
        );

        Self::tile(&table_bbox, &mut rows, true)?;
        Self::tile(&table_bbox, &mut cols, false)?;
        for (i, row) in rows.iter().enumerate() {
            manager.image_mut()?.update_bounding_box(row.id, row.bbox)?;
            manager.set_category_annotation(
                slots::ROW_NUMBER,
                SubCategory::with_value(Category::Row, (i + 1).to_string()),
                row.id,
            )?;
        }
        for (i, col) in cols.iter().enumerate() {
            manager.image_mut()?.update_bounding_box(col.id, col.bbox)?;
            manager.set_category_annotation(
                slots::COLUMN_NUMBER,
                SubCategory::with_value(Category::Column, (i + 1).to_string()),
                col.id,
            )?;
        }

        let cells: Vec<(AnnotationId, BoundingBox)> = manager
            .image()
            .active_annotations(Some(&[Category::Cell]))
            .filter_map(|a| {
                let bbox = *a.bounding_box()?;
                let (cx, cy) = bbox.center();
                (cx >= table_bbox.ulx()
                    && cx <= table_bbox.lrx()
                    && cy >= table_bbox.uly()
                    && cy <= table_bbox.lry())
                .then_some((a.id(), bbox))
            })
            .collect();
        for (cell_id, bbox) in cells {
            let y_interval = (bbox.uly(), bbox.lry());
            let x_interval = (bbox.ulx(), bbox.lrx());
            if let Some((row, row_span)) = Self::position_and_span(y_interval, &rows, true) {
                manager.set_category_annotation(
                    slots::ROW_NUMBER,
                    SubCategory::with_value(Category::Cell, row.to_string()),
                    cell_id,
                )?;
                manager.set_category_annotation(
                    slots::ROW_SPAN,
                    SubCategory::with_value(Category::Cell, row_span.to_string()),
                    cell_id,
                )?;
            }
            if let Some((col, col_span)) = Self::position_and_span(x_interval, &cols, false) {
                manager.set_category_annotation(
                    slots::COLUMN_NUMBER,
                    SubCategory::with_value(Category::Cell, col.to_string()),
                    cell_id,
                )?;
                manager.set_category_annotation(
                    slots::COLUMN_SPAN,
                    SubCategory::with_value(Category::Cell, col_span.to_string()),
                    cell_id,
                )?;
            }
        }

        manager.set_category_annotation(
            slots::NUMBER_OF_ROWS,
            SubCategory::with_value(Category::Table, rows.len().to_string()),
            table_id,
        )?;
        manager.set_category_annotation(
            slots::NUMBER_OF_COLUMNS,
            SubCategory::with_value(Category::Table, cols.len().to_string()),
            table_id,
        )?;
        Ok(())
    }
}

impl PipelineComponent for TableSegmentationService {
    fn name(&self) -> &str {
        "table_segmentation"
    }

    fn process(&mut self, manager: &mut DatapointManager) -> Result<()> {
        let tables: Vec<(AnnotationId, BoundingBox)> = manager
            .image()
            .active_annotations(Some(&[Category::Table]))
            .filter_map(|a| a.bounding_box().map(|b| (a.id(), *b)))
            .collect();
        for (table_id, table_bbox) in tables {
            self.segment_table(manager, table_id, table_bbox)?;
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

    fn sub_value(manager: &DatapointManager, id: AnnotationId, slot: &str) -> Option<usize> {
        manager
            .image()
            .get_annotation(id)?
            .sub_category(slot)?
            .value_as_usize()
    }

    /// A 100x100 table at (0,0) with two rows and two columns.
    fn grid_fixture() -> (DatapointManager, AnnotationId) {
        let mut manager = DatapointManager::new(Image::new("t.png", 100.0, 100.0));
        let image = manager.image_mut().unwrap();
        let table = image
            .add_box_annotation(Category::Table, Some(0.9), bbox(0.0, 0.0, 100.0, 100.0))
            .unwrap();
        image
            .add_box_annotation(Category::Row, Some(0.9), bbox(2.0, 3.0, 98.0, 48.0))
            .unwrap();
        image
            .add_box_annotation(Category::Row, Some(0.9), bbox(2.0, 52.0, 98.0, 97.0))
            .unwrap();
        image
            .add_box_annotation(Category::Column, Some(0.9), bbox(3.0, 2.0, 49.0, 98.0))
            .unwrap();
        image
            .add_box_annotation(Category::Column, Some(0.9), bbox(51.0, 2.0, 97.0, 98.0))
            .unwrap();
        (manager, table)
    }

    #[test]
    fn test_boundaries_stretch_to_tile_the_table() {
        let (mut manager, table) = grid_fixture();
        TableSegmentationService::new(0.8, TiePolicy::default())
            .process(&mut manager)
            .unwrap();

        let rows: Vec<_> = manager
            .image()
            .active_annotations(Some(&[Category::Row]))
            .collect();
        assert_eq!(rows.len(), 2);
        let top = rows
            .iter()
            .find(|r| r.sub_category(slots::ROW_NUMBER).unwrap().value_as_usize() == Some(1))
            .unwrap();
        let b = top.bounding_box().unwrap();
        // snapped to the table frame and the inter-row midpoint
        assert_eq!((b.ulx(), b.uly()), (0.0, 0.0));
        assert_eq!((b.lrx(), b.lry()), (100.0, 50.0));

        assert_eq!(sub_value(&manager, table, slots::NUMBER_OF_ROWS), Some(2));
        assert_eq!(
            sub_value(&manager, table, slots::NUMBER_OF_COLUMNS),
            Some(2)
        );
    }

    #[test]
    fn test_duplicate_row_lower_confidence_removed() {
        let (mut manager, table) = grid_fixture();
        let weak = manager
            .image_mut()
            .unwrap()
            .add_box_annotation(Category::Row, Some(0.3), bbox(2.0, 4.0, 98.0, 47.0))
            .unwrap();
        TableSegmentationService::new(0.8, TiePolicy::default())
            .process(&mut manager)
            .unwrap();
        assert!(!manager.image().get_annotation(weak).unwrap().is_active());
        assert_eq!(sub_value(&manager, table, slots::NUMBER_OF_ROWS), Some(2));
    }

    #[test]
    fn test_equal_confidence_duplicate_keeps_lower_id() {
        let mut manager = DatapointManager::new(Image::new("t.png", 100.0, 100.0));
        let image = manager.image_mut().unwrap();
        image
            .add_box_annotation(Category::Table, None, bbox(0.0, 0.0, 100.0, 100.0))
            .unwrap();
        let a = image
            .add_box_annotation(Category::Row, Some(0.5), bbox(2.0, 10.0, 98.0, 40.0))
            .unwrap();
        let b = image
            .add_box_annotation(Category::Row, Some(0.5), bbox(2.0, 11.0, 98.0, 41.0))
            .unwrap();
        TableSegmentationService::new(0.5, TiePolicy::default())
            .process(&mut manager)
            .unwrap();
        let survivor = a.min(b);
        let dropped = a.max(b);
        assert!(manager.image().get_annotation(survivor).unwrap().is_active());
        assert!(!manager.image().get_annotation(dropped).unwrap().is_active());
    }

    #[test]
    fn test_cell_assignment_with_column_span() {
        let (mut manager, _) = grid_fixture();
        // cell spanning both columns in the top row
        let wide = manager
            .image_mut()
            .unwrap()
            .add_box_annotation(Category::Cell, None, bbox(2.0, 5.0, 96.0, 45.0))
            .unwrap();
        let single = manager
            .image_mut()
            .unwrap()
            .add_box_annotation(Category::Cell, None, bbox(55.0, 55.0, 95.0, 95.0))
            .unwrap();
        TableSegmentationService::new(0.8, TiePolicy::default())
            .process(&mut manager)
            .unwrap();

        assert_eq!(sub_value(&manager, wide, slots::ROW_NUMBER), Some(1));
        assert_eq!(sub_value(&manager, wide, slots::COLUMN_SPAN), Some(2));
        assert_eq!(sub_value(&manager, wide, slots::ROW_SPAN), Some(1));
        assert_eq!(sub_value(&manager, single, slots::ROW_NUMBER), Some(2));
        assert_eq!(sub_value(&manager, single, slots::COLUMN_NUMBER), Some(2));
        assert_eq!(sub_value(&manager, single, slots::COLUMN_SPAN), Some(1));
    }
}
