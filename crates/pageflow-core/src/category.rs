//! Category vocabulary for annotations, plus the named relationship and
//! sub-category slots the pipeline services agree on.
//!
//! The enumeration is closed but extensible: everything the built-in
//! services reason about has a variant, and [`Category::Custom`] carries
//! anything else through serialization unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic label of an annotation.
///
/// Wire format is the stable snake_case name (`"page_header"`), so graphs
/// persisted by older builds keep deserializing as the vocabulary grows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    /// Plain body text block
    Text,
    /// Title or section heading
    Title,
    /// List block
    List,
    /// Table region
    Table,
    /// Figure / picture region
    Figure,
    /// Caption attached to a figure or table
    Caption,
    /// Running page header
    PageHeader,
    /// Running page footer
    PageFooter,
    /// Page number element
    PageNumber,
    /// Single recognized word
    Word,
    /// Text line
    Line,
    /// Table row boundary
    Row,
    /// Table column boundary
    Column,
    /// Table cell
    Cell,
    /// Whole-page aggregate (summary annotations)
    Page,
    /// Any label outside the closed vocabulary
    Custom(String),
}

impl Category {
    /// Stable wire name for this category.
    #[must_use = "returns the wire name without modifying the category"]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Title => "title",
            Self::List => "list",
            Self::Table => "table",
            Self::Figure => "figure",
            Self::Caption => "caption",
            Self::PageHeader => "page_header",
            Self::PageFooter => "page_footer",
            Self::PageNumber => "page_number",
            Self::Word => "word",
            Self::Line => "line",
            Self::Row => "row",
            Self::Column => "column",
            Self::Cell => "cell",
            Self::Page => "page",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for Category {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        match s.as_str() {
            "text" => Self::Text,
            "title" => Self::Title,
            "list" => Self::List,
            "table" => Self::Table,
            "figure" => Self::Figure,
            "caption" => Self::Caption,
            "page_header" => Self::PageHeader,
            "page_footer" => Self::PageFooter,
            "page_number" => Self::PageNumber,
            "word" => Self::Word,
            "line" => Self::Line,
            "row" => Self::Row,
            "column" => Self::Column,
            "cell" => Self::Cell,
            "page" => Self::Page,
            _ => Self::Custom(s),
        }
    }
}

impl From<&str> for Category {
    #[inline]
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Category> for String {
    #[inline]
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

/// Named relationship slots.
pub mod relations {
    /// Parent region to contained element ("this word belongs to this block")
    pub const CHILD: &str = "child";
    /// Page summary to children the matcher could not place
    pub const UNMATCHED: &str = "unmatched_child";
}

/// Named sub-category slots.
pub mod slots {
    /// Recognized text of a word/line annotation
    pub const CHARACTERS: &str = "characters";
    /// Position in reading order (value is a decimal index)
    pub const READING_ORDER: &str = "reading_order";
    /// Row index of a table row or cell (1-based)
    pub const ROW_NUMBER: &str = "row_number";
    /// Column index of a table column or cell (1-based)
    pub const COLUMN_NUMBER: &str = "column_number";
    /// Number of rows spanned by a cell
    pub const ROW_SPAN: &str = "row_span";
    /// Number of columns spanned by a cell
    pub const COLUMN_SPAN: &str = "column_span";
    /// Total row count, written to the table's structural summary
    pub const NUMBER_OF_ROWS: &str = "number_of_rows";
    /// Total column count, written to the table's structural summary
    pub const NUMBER_OF_COLUMNS: &str = "number_of_columns";
}
