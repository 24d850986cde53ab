//! Annotation model: content-derived ids, the closed tagged variant of
//! annotation kinds, and the open sub-annotation slots.
//!
//! Ids are the first 8 bytes of a SHA-256 over the annotation's defining
//! content plus an explicit sequence counter, so re-running the same stage
//! over the same input reproduces the same ids. Annotations are never
//! physically removed once created, only deactivated, which keeps every
//! already-issued id resolvable.

use crate::category::Category;
use crate::geometry::BoundingBox;
use crate::image::Image;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

fn truncate_digest(hasher: Sha256) -> u64 {
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Stable identity of an image graph.
///
/// Derived from an external key (file path, dataset key) or from pixel
/// content; rendered and persisted as 16 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ImageId(pub(crate) u64);

impl ImageId {
    /// Derive an id from an externally supplied key.
    #[must_use = "returns the derived id"]
    pub fn derive_from_key(key: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"image:");
        hasher.update(key.as_bytes());
        Self(truncate_digest(hasher))
    }

    /// Derive an id from raw pixel content.
    #[must_use = "returns the derived id"]
    pub fn derive_from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"pixels:");
        hasher.update(bytes);
        Self(truncate_digest(hasher))
    }

    /// Namespace a sub-image id off the annotation that owns the crop.
    #[must_use = "returns the derived id"]
    pub fn derive_sub_image(parent: ImageId, region: AnnotationId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"sub_image:");
        hasher.update(parent.0.to_be_bytes());
        hasher.update(region.0.to_be_bytes());
        Self(truncate_digest(hasher))
    }
}

impl fmt::Display for ImageId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<ImageId> for String {
    #[inline]
    fn from(id: ImageId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ImageId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        u64::from_str_radix(&s, 16)
            .map(Self)
            .map_err(|e| format!("invalid image id {s:?}: {e}"))
    }
}

/// Stable identity of one annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AnnotationId(pub(crate) u64);

impl AnnotationId {
    /// Derive an id from the annotation's defining content.
    ///
    /// `seq` is the disambiguating sequence counter (the owning arena's
    /// length at insertion time); two otherwise identical annotations in
    /// the same image therefore get distinct, still-reproducible ids.
    #[must_use = "returns the derived id"]
    pub fn derive(
        image_id: ImageId,
        category: &Category,
        bbox: Option<&BoundingBox>,
        seq: usize,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"annotation:");
        hasher.update(image_id.0.to_be_bytes());
        hasher.update(category.as_str().as_bytes());
        if let Some(b) = bbox {
            for v in [b.ulx(), b.uly(), b.lrx(), b.lry()] {
                hasher.update(v.to_bits().to_be_bytes());
            }
        }
        hasher.update((seq as u64).to_be_bytes());
        Self(truncate_digest(hasher))
    }
}

impl fmt::Display for AnnotationId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<AnnotationId> for String {
    #[inline]
    fn from(id: AnnotationId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for AnnotationId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        u64::from_str_radix(&s, 16)
            .map(Self)
            .map_err(|e| format!("invalid annotation id {s:?}: {e}"))
    }
}

/// A category-, text- or numeric-valued fact attached to an annotation's
/// sub-annotation slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubCategory {
    /// Semantic label of the fact
    pub category: Category,
    /// Confidence score, if the producing stage had one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Text or numeric-as-text value, if the slot is value-bearing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl SubCategory {
    /// Purely categorical sub-annotation.
    #[must_use = "returns the new sub-category"]
    pub const fn new(category: Category) -> Self {
        Self {
            category,
            score: None,
            value: None,
        }
    }

    /// Value-bearing sub-annotation (recognized text, an index, a count).
    #[must_use = "returns the new sub-category"]
    pub fn with_value(category: Category, value: impl Into<String>) -> Self {
        Self {
            category,
            score: None,
            value: Some(value.into()),
        }
    }

    /// Attach a confidence score.
    #[must_use = "returns the modified sub-category"]
    pub const fn scored(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Parse the value as an index/count, if present and numeric.
    #[must_use = "returns the parsed value without modifying the sub-category"]
    pub fn value_as_usize(&self) -> Option<usize> {
        self.value.as_deref().and_then(|v| v.parse().ok())
    }
}

/// Typed payload carried by a container annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContainerValue {
    /// A single text value (recognized line, language tag, ...)
    Text(String),
    /// An ordered list of text values
    List(Vec<String>),
}

/// Kind-specific payload of an annotation: the closed tagged variant the
/// rest of the system pattern-matches on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnnotationKind {
    /// Pure category fact, no geometry
    Category,
    /// Region with geometry and an optional owned crop graph
    Box {
        /// Region geometry in the owning image's frame
        bbox: BoundingBox,
        /// The crop materialized as its own graph, enabling recursive analysis
        #[serde(skip_serializing_if = "Option::is_none")]
        image: Option<std::boxed::Box<Image>>,
    },
    /// Category plus an arbitrary typed payload (e.g. recognized text)
    Container {
        /// The carried payload
        value: ContainerValue,
    },
    /// Page-level aggregate, no geometry
    Summary,
}

/// A typed, identified fact about a region or aggregate of an image.
///
/// Shared base payload (identity, category, score, active flag, open
/// sub-annotation slots) plus the kind-specific [`AnnotationKind`].
/// Relationships hold ids only, never owning pointers, so the graph stays
/// acyclic and serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    id: AnnotationId,
    /// Semantic label
    pub category: Category,
    /// Detector/recognizer confidence, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    active: bool,
    /// Open mapping of auxiliary facts keyed by semantic slot name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_categories: BTreeMap<String, SubCategory>,
    /// Named, directed, many-to-many id references
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Vec<AnnotationId>>,
    #[serde(flatten)]
    kind: AnnotationKind,
}

impl Annotation {
    pub(crate) fn new(
        id: AnnotationId,
        category: Category,
        score: Option<f64>,
        kind: AnnotationKind,
    ) -> Self {
        Self {
            id,
            category,
            score,
            active: true,
            sub_categories: BTreeMap::new(),
            relationships: BTreeMap::new(),
            kind,
        }
    }

    /// Stable id of this annotation.
    #[inline]
    #[must_use = "returns the id without modifying the annotation"]
    pub const fn id(&self) -> AnnotationId {
        self.id
    }

    /// False once the annotation has been soft-deleted.
    #[inline]
    #[must_use = "returns the flag without modifying the annotation"]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Kind-specific payload.
    #[inline]
    #[must_use = "returns the kind without modifying the annotation"]
    pub const fn kind(&self) -> &AnnotationKind {
        &self.kind
    }

    /// Region geometry, for box annotations.
    #[must_use = "returns the box without modifying the annotation"]
    pub fn bounding_box(&self) -> Option<&BoundingBox> {
        match &self.kind {
            AnnotationKind::Box { bbox, .. } => Some(bbox),
            _ => None,
        }
    }

    pub(crate) fn set_bounding_box(&mut self, new_bbox: BoundingBox) -> bool {
        match &mut self.kind {
            AnnotationKind::Box { bbox, .. } => {
                *bbox = new_bbox;
                true
            }
            _ => false,
        }
    }

    /// The owned crop graph, for box annotations that were materialized.
    #[must_use = "returns the embedded image without modifying the annotation"]
    pub fn embedded_image(&self) -> Option<&Image> {
        match &self.kind {
            AnnotationKind::Box { image, .. } => image.as_deref(),
            _ => None,
        }
    }

    /// Mutable access to the owned crop graph.
    pub fn embedded_image_mut(&mut self) -> Option<&mut Image> {
        match &mut self.kind {
            AnnotationKind::Box { image, .. } => image.as_deref_mut(),
            _ => None,
        }
    }

    pub(crate) fn take_embedded_image(&mut self) -> Option<Image> {
        match &mut self.kind {
            AnnotationKind::Box { image, .. } => image.take().map(|b| *b),
            _ => None,
        }
    }

    pub(crate) fn put_embedded_image(&mut self, sub: Image) {
        if let AnnotationKind::Box { image, .. } = &mut self.kind {
            *image = Some(std::boxed::Box::new(sub));
        }
    }

    /// Container payload, for container annotations.
    #[must_use = "returns the value without modifying the annotation"]
    pub fn container_value(&self) -> Option<&ContainerValue> {
        match &self.kind {
            AnnotationKind::Container { value } => Some(value),
            _ => None,
        }
    }

    /// Fact stored in the named sub-annotation slot, if any.
    #[inline]
    #[must_use = "returns the slot content without modifying the annotation"]
    pub fn sub_category(&self, slot: &str) -> Option<&SubCategory> {
        self.sub_categories.get(slot)
    }

    /// Store a fact in the named sub-annotation slot, replacing any
    /// previous occupant.
    pub fn set_sub_category(&mut self, slot: impl Into<String>, sub: SubCategory) {
        self.sub_categories.insert(slot.into(), sub);
    }

    /// Target ids of the named relationship slot (empty when unset).
    #[must_use = "returns the targets without modifying the annotation"]
    pub fn relationship(&self, slot: &str) -> &[AnnotationId] {
        self.relationships.get(slot).map_or(&[], Vec::as_slice)
    }

    /// Recognized text, if a `characters` sub-annotation is present.
    #[must_use = "returns the text without modifying the annotation"]
    pub fn text(&self) -> Option<&str> {
        self.sub_categories
            .get(crate::category::slots::CHARACTERS)
            .and_then(|s| s.value.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation_id_reproducible() {
        let image_id = ImageId::derive_from_key("doc/page_1");
        let bbox = BoundingBox::new(10.0, 10.0, 50.0, 50.0).unwrap();
        let a = AnnotationId::derive(image_id, &Category::Text, Some(&bbox), 3);
        let b = AnnotationId::derive(image_id, &Category::Text, Some(&bbox), 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_annotation_id_sequence_disambiguates() {
        let image_id = ImageId::derive_from_key("doc/page_1");
        let bbox = BoundingBox::new(10.0, 10.0, 50.0, 50.0).unwrap();
        let a = AnnotationId::derive(image_id, &Category::Text, Some(&bbox), 0);
        let b = AnnotationId::derive(image_id, &Category::Text, Some(&bbox), 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_id_hex_round_trip() {
        let id = AnnotationId::derive(
            ImageId::derive_from_key("k"),
            &Category::Word,
            None,
            7,
        );
        let s = String::from(id);
        assert_eq!(s.len(), 16);
        assert_eq!(AnnotationId::try_from(s).unwrap(), id);
    }

    #[test]
    fn test_sub_category_value_parse() {
        let sub = SubCategory::with_value(Category::Row, "4");
        assert_eq!(sub.value_as_usize(), Some(4));
        assert_eq!(SubCategory::new(Category::Row).value_as_usize(), None);
    }

    #[test]
    fn test_kind_serde_tagging() {
        let ann = Annotation::new(
            AnnotationId(0x1234),
            Category::Text,
            Some(0.8),
            AnnotationKind::Container {
                value: ContainerValue::Text("hello".to_string()),
            },
        );
        let json = serde_json::to_value(&ann).unwrap();
        assert_eq!(json["kind"], "container");
        assert_eq!(json["value"], "hello");
        let back: Annotation = serde_json::from_value(json).unwrap();
        assert_eq!(back, ann);
    }
}
