//! Read-only page projection.
//!
//! A `Page` is built exactly once per image by the terminal parsing stage
//! and never mutated afterward: all fields are private and reachable only
//! through accessors, so downstream consumers can query words, layout
//! blocks and tables without touching the annotation graph.

use crate::annotation::AnnotationId;
use crate::annotation::ImageId;
use crate::category::Category;
use crate::geometry::BoundingBox;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One layout element of a parsed page, in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageItem {
    id: AnnotationId,
    category: Category,
    bbox: BoundingBox,
    text: String,
    score: Option<f64>,
    reading_order: usize,
}

impl PageItem {
    /// Assemble an item; used by the terminal parsing stage only.
    #[must_use = "returns the new page item"]
    pub const fn new(
        id: AnnotationId,
        category: Category,
        bbox: BoundingBox,
        text: String,
        score: Option<f64>,
        reading_order: usize,
    ) -> Self {
        Self {
            id,
            category,
            bbox,
            text,
            score,
            reading_order,
        }
    }

    /// Id of the annotation this item projects.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn id(&self) -> AnnotationId {
        self.id
    }

    /// Layout category.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn category(&self) -> &Category {
        &self.category
    }

    /// Region geometry in page coordinates.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Assembled text of the element (may be empty for figures).
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Detection confidence, if any.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn score(&self) -> Option<f64> {
        self.score
    }

    /// Position in the page's reading order.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn reading_order(&self) -> usize {
        self.reading_order
    }
}

/// One cell of a parsed table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCell {
    id: AnnotationId,
    bbox: BoundingBox,
    text: String,
    row: usize,
    col: usize,
    row_span: usize,
    col_span: usize,
}

impl PageCell {
    /// Assemble a cell; used by the terminal parsing stage only.
    #[must_use = "returns the new page cell"]
    pub const fn new(
        id: AnnotationId,
        bbox: BoundingBox,
        text: String,
        row: usize,
        col: usize,
        row_span: usize,
        col_span: usize,
    ) -> Self {
        Self {
            id,
            bbox,
            text,
            row,
            col,
            row_span,
            col_span,
        }
    }

    /// Id of the projected cell annotation.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn id(&self) -> AnnotationId {
        self.id
    }

    /// Cell geometry in page coordinates.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Recognized cell text.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// 1-based row index.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn row(&self) -> usize {
        self.row
    }

    /// 1-based column index.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn col(&self) -> usize {
        self.col
    }

    /// Number of rows spanned.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn row_span(&self) -> usize {
        self.row_span
    }

    /// Number of columns spanned.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn col_span(&self) -> usize {
        self.col_span
    }
}

/// A parsed table with its grid structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageTable {
    id: AnnotationId,
    bbox: BoundingBox,
    rows: usize,
    cols: usize,
    cells: Vec<PageCell>,
    score: Option<f64>,
}

impl PageTable {
    /// Assemble a table; used by the terminal parsing stage only.
    #[must_use = "returns the new page table"]
    pub const fn new(
        id: AnnotationId,
        bbox: BoundingBox,
        rows: usize,
        cols: usize,
        cells: Vec<PageCell>,
        score: Option<f64>,
    ) -> Self {
        Self {
            id,
            bbox,
            rows,
            cols,
            cells,
            score,
        }
    }

    /// Id of the projected table annotation.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn id(&self) -> AnnotationId {
        self.id
    }

    /// Table geometry in page coordinates.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Number of grid rows.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of grid columns.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Cells in row-major order.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub fn cells(&self) -> &[PageCell] {
        &self.cells
    }

    /// Detection confidence of the table region, if any.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn score(&self) -> Option<f64> {
        self.score
    }
}

/// Immutable, query-optimized projection of one image's annotation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    image_id: ImageId,
    location: Option<PathBuf>,
    width: f64,
    height: f64,
    items: Vec<PageItem>,
    tables: Vec<PageTable>,
}

impl Page {
    /// Assemble a page; used by the terminal parsing stage only.
    #[must_use = "returns the new page"]
    pub fn new(
        image_id: ImageId,
        location: Option<PathBuf>,
        width: f64,
        height: f64,
        mut items: Vec<PageItem>,
        tables: Vec<PageTable>,
    ) -> Self {
        items.sort_by_key(PageItem::reading_order);
        Self {
            image_id,
            location,
            width,
            height,
            items,
            tables,
        }
    }

    /// Id of the source image graph.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn image_id(&self) -> ImageId {
        self.image_id
    }

    /// Source location of the image, when known.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn location(&self) -> Option<&PathBuf> {
        self.location.as_ref()
    }

    /// Page width.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn width(&self) -> f64 {
        self.width
    }

    /// Page height.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub const fn height(&self) -> f64 {
        self.height
    }

    /// Layout elements in reading order.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub fn items(&self) -> &[PageItem] {
        &self.items
    }

    /// Parsed tables.
    #[inline]
    #[must_use = "accessor has no side effects"]
    pub fn tables(&self) -> &[PageTable] {
        &self.tables
    }

    /// Elements of one category, reading order preserved.
    pub fn items_of<'a>(&'a self, category: &'a Category) -> impl Iterator<Item = &'a PageItem> + 'a {
        self.items.iter().filter(move |i| i.category() == category)
    }

    /// Generated page text: item texts joined by newlines, reading order.
    #[must_use = "returns the generated text"]
    pub fn text(&self) -> String {
        self.items
            .iter()
            .map(PageItem::text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(ulx: f64, uly: f64, lrx: f64, lry: f64) -> BoundingBox {
        BoundingBox::new(ulx, uly, lrx, lry).unwrap()
    }

    fn item(seq: usize, text: &str) -> PageItem {
        PageItem::new(
            AnnotationId::derive(
                ImageId::derive_from_key("p"),
                &Category::Text,
                None,
                seq,
            ),
            Category::Text,
            bbox(0.0, seq as f64 * 10.0, 10.0, seq as f64 * 10.0 + 5.0),
            text.to_string(),
            None,
            seq,
        )
    }

    #[test]
    fn test_items_sorted_by_reading_order() {
        let page = Page::new(
            ImageId::derive_from_key("p"),
            None,
            100.0,
            100.0,
            vec![item(2, "third"), item(0, "first"), item(1, "second")],
            vec![],
        );
        let texts: Vec<_> = page.items().iter().map(PageItem::text).collect();
        assert_eq!(texts, ["first", "second", "third"]);
        assert_eq!(page.text(), "first\nsecond\nthird");
    }

    #[test]
    fn test_empty_texts_skipped_in_generation() {
        let page = Page::new(
            ImageId::derive_from_key("p"),
            None,
            100.0,
            100.0,
            vec![item(0, "a"), item(1, ""), item(2, "b")],
            vec![],
        );
        assert_eq!(page.text(), "a\nb");
    }
}
