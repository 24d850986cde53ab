//! Terminal projection of an annotation graph into a read-only page.

use crate::component::PipelineComponent;
use crate::manager::DatapointManager;
use pageflow_core::{
    relations, slots, Annotation, Category, Image, Page, PageCell, PageItem, PageTable, Result,
};

/// Builds the [`Page`] projection and seals the datapoint.
///
/// Must run last: once the page is attached the graph rejects every
/// further mutation. Parsing itself never writes to the graph.
#[derive(Debug, Clone)]
pub struct PageParsingService {
    item_categories: Vec<Category>,
}

impl Default for PageParsingService {
    fn default() -> Self {
        Self {
            item_categories: vec![
                Category::Text,
                Category::Title,
                Category::List,
                Category::Caption,
                Category::PageHeader,
                Category::PageFooter,
                Category::PageNumber,
            ],
        }
    }
}

impl PageParsingService {
    /// Project the given categories as page items.
    #[must_use = "returns the new service"]
    pub fn new(item_categories: Vec<Category>) -> Self {
        Self { item_categories }
    }

    fn reading_order(ann: &Annotation) -> usize {
        Self::sub_usize(ann, slots::READING_ORDER).unwrap_or(usize::MAX)
    }

    /// Text of a block: its own recognized text, else the texts of its
    /// child words in word reading order.
    fn assemble_text(image: &Image, ann: &Annotation) -> String {
        if let Some(own) = ann.text() {
            return own.to_string();
        }
        let mut words: Vec<(usize, &str)> = ann
            .relationship(relations::CHILD)
            .iter()
            .filter_map(|&id| {
                let child = image.get_annotation(id)?;
                if !child.is_active() {
                    return None;
                }
                Some((Self::reading_order(child), child.text()?))
            })
            .collect();
        words.sort_by_key(|(order, _)| *order);
        words
            .iter()
            .map(|(_, text)| *text)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn sub_usize(ann: &Annotation, slot: &str) -> Option<usize> {
        ann.sub_category(slot).and_then(|s| s.value_as_usize())
    }

    fn project_tables(image: &Image) -> Vec<PageTable> {
        image
            .active_annotations(Some(&[Category::Table]))
            .filter_map(|table| {
                let table_bbox = *table.bounding_box()?;
                let rows = Self::sub_usize(table, slots::NUMBER_OF_ROWS).unwrap_or(0);
                let cols = Self::sub_usize(table, slots::NUMBER_OF_COLUMNS).unwrap_or(0);
                let mut cells: Vec<PageCell> = image
                    .active_annotations(Some(&[Category::Cell]))
                    .filter_map(|cell| {
                        let bbox = *cell.bounding_box()?;
                        let (cx, cy) = bbox.center();
                        let inside = cx >= table_bbox.ulx()
                            && cx <= table_bbox.lrx()
                            && cy >= table_bbox.uly()
                            && cy <= table_bbox.lry();
                        if !inside {
                            return None;
                        }
                        Some(PageCell::new(
                            cell.id(),
                            bbox,
                            Self::assemble_text(image, cell),
                            Self::sub_usize(cell, slots::ROW_NUMBER).unwrap_or(0),
                            Self::sub_usize(cell, slots::COLUMN_NUMBER).unwrap_or(0),
                            Self::sub_usize(cell, slots::ROW_SPAN).unwrap_or(1),
                            Self::sub_usize(cell, slots::COLUMN_SPAN).unwrap_or(1),
                        ))
                    })
                    .collect();
                cells.sort_by_key(|c| (c.row(), c.col()));
                Some(PageTable::new(
                    table.id(),
                    table_bbox,
                    rows,
                    cols,
                    cells,
                    table.score,
                ))
            })
            .collect()
    }

    /// Project the graph into its read-only page view.
    #[must_use = "returns the projection without modifying the graph"]
    pub fn parse(&self, image: &Image) -> Page {
        let items: Vec<PageItem> = image
            .active_annotations(Some(&self.item_categories))
            .filter_map(|ann| {
                let bbox = *ann.bounding_box()?;
                Some(PageItem::new(
                    ann.id(),
                    ann.category.clone(),
                    bbox,
                    Self::assemble_text(image, ann),
                    ann.score,
                    Self::reading_order(ann),
                ))
            })
            .collect();
        let tables = Self::project_tables(image);
        log::debug!(
            "page_parsing: {} items, {} tables on {}",
            items.len(),
            tables.len(),
            image.id()
        );
        Page::new(
            image.id(),
            image.location.clone(),
            image.width(),
            image.height(),
            items,
            tables,
        )
    }
}

impl PipelineComponent for PageParsingService {
    fn name(&self) -> &str {
        "page_parsing"
    }

    fn process(&mut self, manager: &mut DatapointManager) -> Result<()> {
        let page = self.parse(manager.image());
        manager.attach_page(page)
    }

    fn clone_box(&self) -> Box<dyn PipelineComponent> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::DatapointState;
    use pageflow_core::{BoundingBox, SubCategory};

    fn bbox(ulx: f64, uly: f64, lrx: f64, lry: f64) -> BoundingBox {
        BoundingBox::new(ulx, uly, lrx, lry).unwrap()
    }

    fn set_slot(image: &mut Image, id: pageflow_core::AnnotationId, slot: &str, value: usize) {
        image
            .get_annotation_mut(id)
            .unwrap()
            .set_sub_category(slot, SubCategory::with_value(Category::Text, value.to_string()));
    }

    #[test]
    fn test_block_text_assembled_from_child_words() {
        let mut image = Image::new("p.png", 200.0, 100.0);
        let block = image
            .add_box_annotation(Category::Text, None, bbox(0.0, 0.0, 200.0, 100.0))
            .unwrap();
        let w1 = image
            .add_box_annotation(Category::Word, None, bbox(10.0, 10.0, 40.0, 30.0))
            .unwrap();
        let w2 = image
            .add_box_annotation(Category::Word, None, bbox(50.0, 10.0, 80.0, 30.0))
            .unwrap();
        for (id, (text, order)) in [(w1, ("hello", 1)), (w2, ("world", 2))] {
            image.get_annotation_mut(id).unwrap().set_sub_category(
                slots::CHARACTERS,
                SubCategory::with_value(Category::Word, text),
            );
            set_slot(&mut image, id, slots::READING_ORDER, order);
        }
        image
            .set_relationship(block, relations::CHILD, vec![w2, w1])
            .unwrap();
        set_slot(&mut image, block, slots::READING_ORDER, 1);

        let page = PageParsingService::default().parse(&image);
        assert_eq!(page.items().len(), 1);
        assert_eq!(page.items()[0].text(), "hello world");
        assert_eq!(page.text(), "hello world");
    }

    #[test]
    fn test_table_projected_with_grid_structure() {
        let mut image = Image::new("p.png", 200.0, 200.0);
        let table = image
            .add_box_annotation(Category::Table, Some(0.8), bbox(0.0, 0.0, 100.0, 100.0))
            .unwrap();
        set_slot(&mut image, table, slots::NUMBER_OF_ROWS, 1);
        set_slot(&mut image, table, slots::NUMBER_OF_COLUMNS, 2);
        let cell = image
            .add_box_annotation(Category::Cell, None, bbox(0.0, 0.0, 50.0, 100.0))
            .unwrap();
        set_slot(&mut image, cell, slots::ROW_NUMBER, 1);
        set_slot(&mut image, cell, slots::COLUMN_NUMBER, 1);
        set_slot(&mut image, cell, slots::ROW_SPAN, 1);
        set_slot(&mut image, cell, slots::COLUMN_SPAN, 1);

        let page = PageParsingService::default().parse(&image);
        assert_eq!(page.tables().len(), 1);
        let projected = &page.tables()[0];
        assert_eq!((projected.rows(), projected.cols()), (1, 2));
        assert_eq!(projected.cells().len(), 1);
        assert_eq!((projected.cells()[0].row(), projected.cells()[0].col()), (1, 1));
    }

    #[test]
    fn test_component_seals_the_datapoint() {
        let mut manager = DatapointManager::new(Image::new("p.png", 100.0, 100.0));
        PageParsingService::default()
            .process(&mut manager)
            .unwrap();
        assert_eq!(manager.state(), &DatapointState::Parsed);
        assert!(manager.page().is_some());
        assert!(manager.image_mut().unwrap_err().is_reentrancy());
    }
}
