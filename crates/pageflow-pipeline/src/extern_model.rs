//! Contracts for externally supplied models.
//!
//! The pipeline never loads weights or talks to an inference runtime; it
//! consumes these object-safe traits and stays pure with respect to how
//! predictions were produced. A deterministic generator double ships here
//! for tests and offline runs.

use pageflow_core::{BoundingBox, Category, Image, Result};

/// One raw prediction of an object detector, in page coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    /// Predicted region
    pub bbox: BoundingBox,
    /// Confidence in `[0,1]`
    pub score: f64,
    /// Raw class index of the producing model
    pub class_id: usize,
    /// Mapped category, when the model's class map covers the index
    pub class_name: Option<Category>,
}

/// Recognized text of one region.
#[derive(Debug, Clone, PartialEq)]
pub struct TextResult {
    /// Recognized characters
    pub text: String,
    /// Confidence in `[0,1]`
    pub score: f64,
}

/// A token handed to a sequence classifier: text plus layout position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token text
    pub text: String,
    /// Token region in page coordinates
    pub bbox: BoundingBox,
}

/// One predicted label of a sequence classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassLabel {
    /// Predicted category
    pub category: Category,
    /// Confidence in `[0,1]`
    pub score: f64,
}

/// Region proposal model over a page image.
pub trait ObjectDetector: Send + Sync {
    /// Predict regions on the given page.
    fn detect(&self, image: &Image) -> Result<Vec<DetectionResult>>;

    /// Categories this detector can emit, for service wiring.
    fn categories(&self) -> Vec<Category>;
}

/// Text recognition model over a (cropped) image.
pub trait TextRecognizer: Send + Sync {
    /// Recognize the text content of the given image.
    fn recognize(&self, image: &Image) -> Result<TextResult>;
}

/// Token sequence labeling model.
pub trait SequenceClassifier: Send + Sync {
    /// Label each token of the sequence; output is positional.
    fn classify(&self, tokens: &[Token]) -> Result<Vec<ClassLabel>>;
}

/// Deterministic detector double: replays a fixed list of results,
/// clipped to each page's bounds so out-of-frame fixtures never trip
/// strict-mode images.
#[derive(Debug, Clone, Default)]
pub struct DetectResultGenerator {
    results: Vec<DetectionResult>,
}

impl DetectResultGenerator {
    /// Replay the given results on every page.
    #[must_use = "returns the new generator"]
    pub fn new(results: Vec<DetectionResult>) -> Self {
        Self { results }
    }

    /// Convenience: build results from `(bbox, score, category)` triples,
    /// numbering class ids positionally.
    #[must_use = "returns the new generator"]
    pub fn from_triples(triples: Vec<(BoundingBox, f64, Category)>) -> Self {
        let results = triples
            .into_iter()
            .enumerate()
            .map(|(class_id, (bbox, score, category))| DetectionResult {
                bbox,
                score,
                class_id,
                class_name: Some(category),
            })
            .collect();
        Self { results }
    }
}

impl ObjectDetector for DetectResultGenerator {
    fn detect(&self, image: &Image) -> Result<Vec<DetectionResult>> {
        let bounds = image.bounds();
        Ok(self
            .results
            .iter()
            .filter_map(|r| {
                pageflow_core::clip(&r.bbox, &bounds).map(|bbox| DetectionResult {
                    bbox,
                    ..r.clone()
                })
            })
            .collect())
    }

    fn categories(&self) -> Vec<Category> {
        let mut cats: Vec<Category> = self
            .results
            .iter()
            .filter_map(|r| r.class_name.clone())
            .collect();
        cats.sort();
        cats.dedup();
        cats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_clips_to_page_bounds() {
        let gen = DetectResultGenerator::from_triples(vec![(
            BoundingBox::new(50.0, 50.0, 300.0, 80.0).unwrap(),
            0.8,
            Category::Text,
        )]);
        let image = Image::new("p.png", 200.0, 100.0);
        let dets = gen.detect(&image).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox.lrx(), 200.0);
        assert_eq!(dets[0].class_name, Some(Category::Text));
    }

    #[test]
    fn test_generator_drops_fully_out_of_frame() {
        let gen = DetectResultGenerator::from_triples(vec![(
            BoundingBox::new(300.0, 300.0, 400.0, 400.0).unwrap(),
            0.8,
            Category::Text,
        )]);
        let image = Image::new("p.png", 200.0, 100.0);
        assert!(gen.detect(&image).unwrap().is_empty());
    }
}
