//! The `Image` aggregate root: one page's pixel data plus its full
//! annotation graph.
//!
//! Annotations live by value in an arena (`Vec`) and are referenced
//! everywhere else purely by id, never by pointer, which keeps the
//! parent/child/relationship web acyclic and serializable. Sub-images
//! (crops) are owned by the box annotation that produced them and carry an
//! embedding record mapping their local frame back to parent coordinates.

use crate::annotation::{Annotation, AnnotationId, AnnotationKind, ContainerValue, ImageId};
use crate::category::Category;
use crate::error::{PageflowError, Result};
use crate::geometry::BoundingBox;
use ndarray::{s, Array3};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Maximum embedding chain length accepted by [`Image::set_embedding`].
pub const MAX_EMBEDDING_DEPTH: usize = 32;

/// Tolerance for bounds checks, so boxes produced by float remapping are
/// not rejected for sub-epsilon overshoot.
const BOUNDS_EPS: f64 = 1e-6;

/// How strictly box annotations are checked against image bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateContext {
    /// Boxes must lie within `[0,width]×[0,height]` (the default)
    #[default]
    Strict,
    /// Out-of-range boxes are admitted pending a later clip
    External,
}

/// Crop/parent linkage of an embedded sub-image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    /// Id of the direct parent image
    pub parent_id: ImageId,
    /// Ids of all ancestors, outermost first (cycle guard)
    #[serde(default)]
    pub ancestors: Vec<ImageId>,
    /// X of this crop's upper-left corner in parent coordinates
    pub offset_x: f64,
    /// Y of this crop's upper-left corner in parent coordinates
    pub offset_y: f64,
}

/// One page's pixel data plus its full annotation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ImageRecord")]
pub struct Image {
    id: ImageId,
    /// Source location, when the graph was read from disk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<PathBuf>,
    width: f64,
    height: f64,
    /// Raw HWC pixel buffer; not persisted, reloadable via `location`
    #[serde(skip)]
    pixels: Option<Array3<u8>>,
    annotations: Vec<Annotation>,
    #[serde(skip)]
    index: FxHashMap<AnnotationId, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    embedding: Option<Embedding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<Annotation>,
    #[serde(default)]
    coordinate_context: CoordinateContext,
}

/// Serialized shape of [`Image`]; deserialization rebuilds the id index.
#[derive(Deserialize)]
struct ImageRecord {
    id: ImageId,
    #[serde(default)]
    location: Option<PathBuf>,
    width: f64,
    height: f64,
    #[serde(default)]
    annotations: Vec<Annotation>,
    #[serde(default)]
    embedding: Option<Embedding>,
    #[serde(default)]
    summary: Option<Annotation>,
    #[serde(default)]
    coordinate_context: CoordinateContext,
}

impl From<ImageRecord> for Image {
    fn from(rec: ImageRecord) -> Self {
        let index = rec
            .annotations
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id(), i))
            .collect();
        Self {
            id: rec.id,
            location: rec.location,
            width: rec.width,
            height: rec.height,
            pixels: None,
            annotations: rec.annotations,
            index,
            embedding: rec.embedding,
            summary: rec.summary,
            coordinate_context: rec.coordinate_context,
        }
    }
}

impl Image {
    /// Create an empty graph for an image of known size, with the id
    /// derived from an external key.
    #[must_use = "returns the new image graph"]
    pub fn new(key: &str, width: f64, height: f64) -> Self {
        Self::with_id(ImageId::derive_from_key(key), width, height)
    }

    /// Create an empty graph with an explicit id.
    #[must_use = "returns the new image graph"]
    pub fn with_id(id: ImageId, width: f64, height: f64) -> Self {
        Self {
            id,
            location: None,
            width,
            height,
            pixels: None,
            annotations: Vec::new(),
            index: FxHashMap::default(),
            embedding: None,
            summary: None,
            coordinate_context: CoordinateContext::default(),
        }
    }

    /// Create a graph from an HWC pixel buffer; the id is derived from the
    /// key when given, otherwise from pixel content.
    #[must_use = "returns the new image graph"]
    pub fn from_pixels(key: Option<&str>, pixels: Array3<u8>) -> Self {
        let (h, w, _) = pixels.dim();
        let id = match key {
            Some(k) => ImageId::derive_from_key(k),
            None => match pixels.as_slice() {
                Some(bytes) => ImageId::derive_from_bytes(bytes),
                None => {
                    let bytes: Vec<u8> = pixels.iter().copied().collect();
                    ImageId::derive_from_bytes(&bytes)
                }
            },
        };
        let mut image = Self::with_id(id, w as f64, h as f64);
        image.pixels = Some(pixels);
        image
    }

    /// Attach a source location.
    #[must_use = "returns the modified image graph"]
    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Switch the bounds-check mode for subsequently added annotations.
    #[must_use = "returns the modified image graph"]
    pub fn with_coordinate_context(mut self, ctx: CoordinateContext) -> Self {
        self.coordinate_context = ctx;
        self
    }

    /// Stable id of this image.
    #[inline]
    #[must_use = "returns the id without modifying the image"]
    pub const fn id(&self) -> ImageId {
        self.id
    }

    /// Image width in continuous pixel units.
    #[inline]
    #[must_use = "returns the width without modifying the image"]
    pub const fn width(&self) -> f64 {
        self.width
    }

    /// Image height in continuous pixel units.
    #[inline]
    #[must_use = "returns the height without modifying the image"]
    pub const fn height(&self) -> f64 {
        self.height
    }

    /// Raw pixel buffer, when loaded.
    #[inline]
    #[must_use = "returns the pixels without modifying the image"]
    pub const fn pixels(&self) -> Option<&Array3<u8>> {
        self.pixels.as_ref()
    }

    /// Attach or replace the pixel buffer.
    pub fn set_pixels(&mut self, pixels: Array3<u8>) {
        self.pixels = Some(pixels);
    }

    /// Drop the pixel buffer, keeping the graph (streaming release).
    pub fn clear_pixels(&mut self) {
        self.pixels = None;
    }

    /// Embedding record, when this image is a crop of a parent.
    #[inline]
    #[must_use = "returns the embedding without modifying the image"]
    pub const fn embedding(&self) -> Option<&Embedding> {
        self.embedding.as_ref()
    }

    /// Full-page bounds as a box.
    #[must_use = "returns the bounds without modifying the image"]
    pub fn bounds(&self) -> BoundingBox {
        // Width and height are validated > 0 at construction sites; a
        // zero-sized image would fail here, which is the right outcome.
        BoundingBox::new(0.0, 0.0, self.width, self.height)
            .unwrap_or_else(|_| BoundingBox::new(0.0, 0.0, 1.0, 1.0).expect("unit box is valid"))
    }

    fn check_bounds(&self, bbox: &BoundingBox) -> Result<()> {
        if self.coordinate_context == CoordinateContext::External {
            return Ok(());
        }
        if bbox.ulx() < -BOUNDS_EPS
            || bbox.uly() < -BOUNDS_EPS
            || bbox.lrx() > self.width + BOUNDS_EPS
            || bbox.lry() > self.height + BOUNDS_EPS
        {
            return Err(PageflowError::geometry(format!(
                "box ({},{})->({},{}) outside image {} bounds {}x{}",
                bbox.ulx(),
                bbox.uly(),
                bbox.lrx(),
                bbox.lry(),
                self.id,
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    /// Append an annotation, deriving its id from category, box, owning
    /// image id and the arena length as sequence counter.
    ///
    /// Relative boxes are converted to absolute against this image's size.
    /// Fails with [`PageflowError::Geometry`] when a box falls outside the
    /// image bounds (unless the context is [`CoordinateContext::External`])
    /// and with [`PageflowError::Reference`] on an id collision.
    pub fn add_annotation(
        &mut self,
        category: Category,
        score: Option<f64>,
        kind: AnnotationKind,
    ) -> Result<AnnotationId> {
        let kind = match kind {
            AnnotationKind::Box { bbox, image } => {
                let bbox = bbox.to_absolute(self.width, self.height);
                self.check_bounds(&bbox)?;
                AnnotationKind::Box { bbox, image }
            }
            other => other,
        };
        let seq = self.annotations.len();
        let id = AnnotationId::derive(
            self.id,
            &category,
            match &kind {
                AnnotationKind::Box { bbox, .. } => Some(bbox),
                _ => None,
            },
            seq,
        );
        if self.index.contains_key(&id) {
            return Err(PageflowError::reference(format!(
                "annotation id {id} already present in image {}",
                self.id
            )));
        }
        log::trace!(
            "image {}: add annotation {} category={} seq={}",
            self.id,
            id,
            category,
            seq
        );
        self.annotations
            .push(Annotation::new(id, category, score, kind));
        self.index.insert(id, seq);
        Ok(id)
    }

    /// Append a box annotation.
    pub fn add_box_annotation(
        &mut self,
        category: Category,
        score: Option<f64>,
        bbox: BoundingBox,
    ) -> Result<AnnotationId> {
        self.add_annotation(category, score, AnnotationKind::Box { bbox, image: None })
    }

    /// Append a container annotation carrying a typed payload.
    pub fn add_container_annotation(
        &mut self,
        category: Category,
        score: Option<f64>,
        value: ContainerValue,
    ) -> Result<AnnotationId> {
        self.add_annotation(category, score, AnnotationKind::Container { value })
    }

    /// Look up an annotation by id, including soft-deleted ones.
    #[must_use = "returns the annotation without modifying the image"]
    pub fn get_annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.index.get(&id).map(|&i| &self.annotations[i])
    }

    /// Mutable lookup by id. Pipelines should mutate through their
    /// `DatapointManager`; this is the escape hatch it is built on.
    pub fn get_annotation_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.index.get(&id).map(|&i| &mut self.annotations[i])
    }

    /// All annotations in insertion order, including inactive ones.
    #[inline]
    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter()
    }

    /// Active annotations, optionally filtered to a category set.
    pub fn active_annotations<'a>(
        &'a self,
        categories: Option<&'a [Category]>,
    ) -> impl Iterator<Item = &'a Annotation> + 'a {
        self.annotations.iter().filter(move |a| {
            a.is_active() && categories.map_or(true, |cats| cats.contains(&a.category))
        })
    }

    /// Soft-delete an annotation. Subsequent queries exclude it by default
    /// but relationship resolution over its id still succeeds.
    pub fn deactivate(&mut self, id: AnnotationId) -> Result<()> {
        let ann = self
            .get_annotation_mut(id)
            .ok_or_else(|| PageflowError::reference(format!("no annotation {id} to deactivate")))?;
        ann.set_active(false);
        Ok(())
    }

    /// Replace a box annotation's geometry, re-checking bounds.
    pub fn update_bounding_box(&mut self, id: AnnotationId, bbox: BoundingBox) -> Result<()> {
        let bbox = bbox.to_absolute(self.width, self.height);
        self.check_bounds(&bbox)?;
        let ann = self
            .get_annotation_mut(id)
            .ok_or_else(|| PageflowError::reference(format!("no annotation {id} to update")))?;
        if !ann.set_bounding_box(bbox) {
            return Err(PageflowError::geometry(format!(
                "annotation {id} carries no bounding box"
            )));
        }
        Ok(())
    }

    /// True when `id` resolves in this image or any embedding-reachable
    /// sub-image graph.
    #[must_use = "returns the resolution result without modifying the image"]
    pub fn resolves(&self, id: AnnotationId) -> bool {
        if self.index.contains_key(&id) {
            return true;
        }
        if self.summary.as_ref().is_some_and(|s| s.id() == id) {
            return true;
        }
        self.annotations
            .iter()
            .filter_map(Annotation::embedded_image)
            .any(|sub| sub.resolves(id))
    }

    /// Replace the named relationship slot on an annotation.
    ///
    /// Fails with [`PageflowError::Reference`] when any target id is
    /// unresolvable in this image or its embedded sub-image graphs.
    pub fn set_relationship(
        &mut self,
        ann_id: AnnotationId,
        slot: impl Into<String>,
        targets: Vec<AnnotationId>,
    ) -> Result<()> {
        for target in &targets {
            if !self.resolves(*target) {
                return Err(PageflowError::reference(format!(
                    "relationship target {target} not reachable from image {}",
                    self.id
                )));
            }
        }
        let slot = slot.into();
        if let Some(summary) = self.summary.as_mut() {
            if summary.id() == ann_id {
                summary.relationships.insert(slot, targets);
                return Ok(());
            }
        }
        let ann = self
            .get_annotation_mut(ann_id)
            .ok_or_else(|| PageflowError::reference(format!("no annotation {ann_id}")))?;
        ann.relationships.insert(slot, targets);
        Ok(())
    }

    /// Establish the crop/parent linkage.
    ///
    /// Fails with [`PageflowError::Cycle`] when the parent chain already
    /// contains this image, or when the chain would exceed
    /// [`MAX_EMBEDDING_DEPTH`].
    pub fn set_embedding(&mut self, parent: &Image, offset_x: f64, offset_y: f64) -> Result<()> {
        if parent.id == self.id {
            return Err(PageflowError::cycle(format!(
                "image {} cannot embed into itself",
                self.id
            )));
        }
        let mut ancestors = parent
            .embedding
            .as_ref()
            .map(|e| e.ancestors.clone())
            .unwrap_or_default();
        ancestors.push(parent.id);
        if ancestors.contains(&self.id) {
            return Err(PageflowError::cycle(format!(
                "image {} is already an ancestor of image {}",
                self.id, parent.id
            )));
        }
        if ancestors.len() > MAX_EMBEDDING_DEPTH {
            return Err(PageflowError::cycle(format!(
                "embedding chain exceeds depth {MAX_EMBEDDING_DEPTH}"
            )));
        }
        self.embedding = Some(Embedding {
            parent_id: parent.id,
            ancestors,
            offset_x,
            offset_y,
        });
        Ok(())
    }

    /// Materialize the crop of a box annotation as its own embedded graph.
    ///
    /// Idempotent: an already materialized crop keeps its graph and id.
    /// Pixels are sliced from the parent buffer when present; a graph
    /// without pixels still gets a crop with correct size and embedding.
    pub fn crop_annotation(&mut self, ann_id: AnnotationId) -> Result<ImageId> {
        let ann = self
            .get_annotation(ann_id)
            .ok_or_else(|| PageflowError::reference(format!("no annotation {ann_id} to crop")))?;
        if let Some(existing) = ann.embedded_image() {
            return Ok(existing.id());
        }
        let bbox = *ann.bounding_box().ok_or_else(|| {
            PageflowError::geometry(format!("annotation {ann_id} carries no box to crop"))
        })?;

        let sub_pixels = self.pixels.as_ref().map(|px| {
            let (h, w, _) = px.dim();
            let x0 = bbox.ulx().floor().clamp(0.0, w as f64) as usize;
            let y0 = bbox.uly().floor().clamp(0.0, h as f64) as usize;
            let x1 = bbox.lrx().ceil().clamp(x0 as f64, w as f64) as usize;
            let y1 = bbox.lry().ceil().clamp(y0 as f64, h as f64) as usize;
            px.slice(s![y0..y1, x0..x1, ..]).to_owned()
        });

        let sub_id = ImageId::derive_sub_image(self.id, ann_id);
        let mut sub = Image::with_id(sub_id, bbox.width(), bbox.height());
        if let Some(px) = sub_pixels {
            sub.pixels = Some(px);
        }
        sub.set_embedding(self, bbox.ulx(), bbox.uly())?;

        let ann = self
            .get_annotation_mut(ann_id)
            .ok_or_else(|| PageflowError::reference(format!("no annotation {ann_id} to crop")))?;
        ann.put_embedded_image(sub);
        Ok(sub_id)
    }

    /// Remove the embedded sub-image of a box annotation for independent
    /// processing; pair with [`Image::put_embedded_image`].
    pub fn take_embedded_image(&mut self, ann_id: AnnotationId) -> Result<Image> {
        let ann = self
            .get_annotation_mut(ann_id)
            .ok_or_else(|| PageflowError::reference(format!("no annotation {ann_id}")))?;
        ann.take_embedded_image().ok_or_else(|| {
            PageflowError::reference(format!("annotation {ann_id} owns no embedded image"))
        })
    }

    /// Return a previously taken sub-image to its owning annotation.
    pub fn put_embedded_image(&mut self, ann_id: AnnotationId, sub: Image) -> Result<()> {
        let ann = self
            .get_annotation_mut(ann_id)
            .ok_or_else(|| PageflowError::reference(format!("no annotation {ann_id}")))?;
        ann.put_embedded_image(sub);
        Ok(())
    }

    /// The page-level summary annotation, created on first access.
    pub fn summary_mut(&mut self) -> &mut Annotation {
        let image_id = self.id;
        self.summary.get_or_insert_with(|| {
            let id = AnnotationId::derive(image_id, &Category::Page, None, usize::MAX);
            Annotation::new(id, Category::Page, None, AnnotationKind::Summary)
        })
    }

    /// The page-level summary annotation, if one was created.
    #[inline]
    #[must_use = "returns the summary without modifying the image"]
    pub const fn summary(&self) -> Option<&Annotation> {
        self.summary.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::relations;
    use ndarray::Array3;

    fn bbox(ulx: f64, uly: f64, lrx: f64, lry: f64) -> BoundingBox {
        BoundingBox::new(ulx, uly, lrx, lry).unwrap()
    }

    fn page() -> Image {
        Image::new("test/page_0", 100.0, 100.0)
    }

    #[test]
    fn test_add_and_get_annotation() {
        let mut img = page();
        let id = img
            .add_box_annotation(Category::Text, Some(0.9), bbox(10.0, 10.0, 50.0, 50.0))
            .unwrap();
        let ann = img.get_annotation(id).unwrap();
        assert_eq!(ann.category, Category::Text);
        assert_eq!(ann.bounding_box().unwrap(), &bbox(10.0, 10.0, 50.0, 50.0));
    }

    #[test]
    fn test_out_of_bounds_box_rejected() {
        let mut img = page();
        let err = img
            .add_box_annotation(Category::Text, None, bbox(50.0, 50.0, 150.0, 80.0))
            .unwrap_err();
        assert!(matches!(err, PageflowError::Geometry { .. }));
    }

    #[test]
    fn test_external_context_admits_out_of_bounds() {
        let mut img = page().with_coordinate_context(CoordinateContext::External);
        assert!(img
            .add_box_annotation(Category::Text, None, bbox(50.0, 50.0, 150.0, 80.0))
            .is_ok());
    }

    #[test]
    fn test_relative_box_converted_to_absolute() {
        let mut img = page();
        let rel = BoundingBox::new_relative(0.1, 0.1, 0.5, 0.5).unwrap();
        let id = img.add_box_annotation(Category::Text, None, rel).unwrap();
        let stored = img.get_annotation(id).unwrap().bounding_box().unwrap();
        assert!(!stored.is_relative());
        assert_eq!(stored, &bbox(10.0, 10.0, 50.0, 50.0));
    }

    #[test]
    fn test_ids_reproducible_across_runs() {
        let build = || {
            let mut img = page();
            let a = img
                .add_box_annotation(Category::Text, None, bbox(10.0, 10.0, 50.0, 50.0))
                .unwrap();
            let b = img
                .add_box_annotation(Category::Text, None, bbox(10.0, 10.0, 50.0, 50.0))
                .unwrap();
            (a, b)
        };
        let first = build();
        let second = build();
        assert_eq!(first, second);
        assert_ne!(first.0, first.1);
    }

    #[test]
    fn test_deactivate_is_soft() {
        let mut img = page();
        let block = img
            .add_box_annotation(Category::Text, None, bbox(10.0, 10.0, 50.0, 50.0))
            .unwrap();
        let word = img
            .add_box_annotation(Category::Word, None, bbox(12.0, 12.0, 20.0, 18.0))
            .unwrap();
        img.set_relationship(block, relations::CHILD, vec![word])
            .unwrap();
        img.deactivate(word).unwrap();

        assert_eq!(img.active_annotations(None).count(), 1);
        // historical resolution still succeeds
        assert!(img.resolves(word));
        assert_eq!(img.get_annotation(block).unwrap().relationship(relations::CHILD), &[word]);
    }

    #[test]
    fn test_relationship_to_missing_id_fails() {
        let mut img = page();
        let block = img
            .add_box_annotation(Category::Text, None, bbox(10.0, 10.0, 50.0, 50.0))
            .unwrap();
        let ghost = AnnotationId::derive(img.id(), &Category::Word, None, 999);
        let err = img
            .set_relationship(block, relations::CHILD, vec![ghost])
            .unwrap_err();
        assert!(matches!(err, PageflowError::Reference { .. }));
    }

    #[test]
    fn test_self_embedding_fails_with_cycle() {
        let mut img = page();
        let parent = img.clone();
        let err = img.set_embedding(&parent, 0.0, 0.0).unwrap_err();
        assert!(matches!(err, PageflowError::Cycle { .. }));
    }

    #[test]
    fn test_ancestor_embedding_fails_with_cycle() {
        let grandparent = page();
        let mut parent = Image::new("test/crop_a", 50.0, 50.0);
        parent.set_embedding(&grandparent, 10.0, 10.0).unwrap();
        // re-embedding the root under its own descendant must fail
        let mut root = grandparent.clone();
        let err = root.set_embedding(&parent, 0.0, 0.0).unwrap_err();
        assert!(matches!(err, PageflowError::Cycle { .. }));
    }

    #[test]
    fn test_crop_annotation_materializes_sub_image() {
        let pixels = Array3::<u8>::from_elem((100, 100, 3), 7);
        let mut img = Image::from_pixels(Some("test/page_0"), pixels);
        let region = img
            .add_box_annotation(Category::Table, None, bbox(10.0, 10.0, 50.0, 50.0))
            .unwrap();
        let sub_id = img.crop_annotation(region).unwrap();

        let sub = img.get_annotation(region).unwrap().embedded_image().unwrap();
        assert_eq!(sub.id(), sub_id);
        assert_eq!(sub.width(), 40.0);
        assert_eq!(sub.height(), 40.0);
        assert_eq!(sub.pixels().unwrap().dim(), (40, 40, 3));
        let emb = sub.embedding().unwrap();
        assert_eq!(emb.parent_id, img.id());
        assert_eq!((emb.offset_x, emb.offset_y), (10.0, 10.0));

        // idempotent
        assert_eq!(img.crop_annotation(region).unwrap(), sub_id);
    }

    #[test]
    fn test_cross_level_relationship_resolves() {
        let mut img = page();
        let region = img
            .add_box_annotation(Category::Table, None, bbox(10.0, 10.0, 50.0, 50.0))
            .unwrap();
        img.crop_annotation(region).unwrap();
        let nested = {
            let sub = img.take_embedded_image(region).unwrap();
            let mut sub = sub;
            let nested = sub
                .add_box_annotation(Category::Cell, None, bbox(0.0, 0.0, 5.0, 5.0))
                .unwrap();
            img.put_embedded_image(region, sub).unwrap();
            nested
        };
        img.set_relationship(region, relations::CHILD, vec![nested])
            .unwrap();
        assert_eq!(img.get_annotation(region).unwrap().relationship(relations::CHILD), &[nested]);
    }

    #[test]
    fn test_serde_round_trip_preserves_graph() {
        let mut img = page().with_location("pages/0.png");
        let block = img
            .add_box_annotation(Category::Text, Some(0.95), bbox(10.0, 10.0, 50.0, 50.0))
            .unwrap();
        let word = img
            .add_box_annotation(Category::Word, Some(0.8), bbox(12.0, 12.0, 20.0, 18.0))
            .unwrap();
        img.get_annotation_mut(word).unwrap().set_sub_category(
            crate::category::slots::CHARACTERS,
            crate::annotation::SubCategory::with_value(Category::Word, "hello").scored(0.99),
        );
        img.set_relationship(block, relations::CHILD, vec![word])
            .unwrap();
        img.deactivate(word).unwrap();
        let region = img
            .add_box_annotation(Category::Table, None, bbox(60.0, 60.0, 90.0, 90.0))
            .unwrap();
        img.crop_annotation(region).unwrap();

        let json = serde_json::to_string(&img).unwrap();
        let back: Image = serde_json::from_str(&json).unwrap();

        assert_eq!(back, img);
        // the rebuilt index keeps lookups working
        assert!(!back.get_annotation(word).unwrap().is_active());
        assert_eq!(
            back.get_annotation(word).unwrap().text(),
            Some("hello")
        );
        assert_eq!(
            back.get_annotation(region)
                .unwrap()
                .embedded_image()
                .unwrap()
                .embedding()
                .unwrap()
                .offset_x,
            60.0
        );
    }

    #[test]
    fn test_summary_relationship() {
        let mut img = page();
        let word = img
            .add_box_annotation(Category::Word, None, bbox(1.0, 1.0, 5.0, 5.0))
            .unwrap();
        let summary_id = img.summary_mut().id();
        img.set_relationship(summary_id, relations::UNMATCHED, vec![word])
            .unwrap();
        assert_eq!(
            img.summary().unwrap().relationship(relations::UNMATCHED),
            &[word]
        );
    }
}
