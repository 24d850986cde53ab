//! Persisting flows of document graphs and reading them back lazily.
//!
//! Two on-disk layouts: a single JSON Lines file (one graph per line)
//! and a directory of one-file-per-graph JSON documents. Both loaders
//! are themselves flows, so a saved corpus streams back through the
//! same machinery that produced it.

use crate::flow::{DataFlow, DataFlowExt, Lifecycle};
use crate::source::DataFromFiles;
use pageflow_core::{Image, PageflowError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Write and read flows as a JSON Lines file, one element per line.
pub struct SerializerJsonlines;

impl SerializerJsonlines {
    /// Drain `flow` into `path`, one JSON document per line.
    ///
    /// # Returns
    ///
    /// The number of elements written.
    pub fn save<S>(flow: &mut S, path: impl AsRef<Path>) -> Result<usize>
    where
        S: DataFlow + ?Sized,
        S::Item: Serialize,
    {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        flow.reset()?;
        let mut written = 0usize;
        while let Some(item) = flow.try_next()? {
            serde_json::to_writer(&mut writer, &item)?;
            writer.write_all(b"\n")?;
            written += 1;
        }
        writer.flush()?;
        log::debug!(
            "SerializerJsonlines: wrote {written} elements to {}",
            path.display()
        );
        Ok(written)
    }

    /// Lazy flow over the lines of `path`, deserializing one element per
    /// pull. `max_datapoints` truncates the stream when set.
    #[must_use = "returns the new flow"]
    pub fn load<T: DeserializeOwned>(
        path: impl AsRef<Path>,
        max_datapoints: Option<usize>,
    ) -> DataFromJsonlines<T> {
        DataFromJsonlines::new(path, max_datapoints)
    }
}

/// Lazy JSON Lines reader; the file is reopened at each reset and read
/// line by line, so corpora larger than memory stream fine.
pub struct DataFromJsonlines<T> {
    path: PathBuf,
    max_datapoints: Option<usize>,
    reader: Option<BufReader<File>>,
    yielded: usize,
    lifecycle: Lifecycle,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> DataFromJsonlines<T> {
    /// Read `path`, yielding at most `max_datapoints` elements when set.
    #[must_use = "returns the new flow"]
    pub fn new(path: impl AsRef<Path>, max_datapoints: Option<usize>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_datapoints,
            reader: None,
            yielded: 0,
            lifecycle: Lifecycle::default(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: DeserializeOwned> DataFlow for DataFromJsonlines<T> {
    type Item = T;

    fn reset(&mut self) -> Result<()> {
        self.lifecycle.begin_reset("DataFromJsonlines")?;
        self.reader = Some(BufReader::new(File::open(&self.path)?));
        self.yielded = 0;
        Ok(())
    }

    fn try_next(&mut self) -> Result<Option<T>> {
        self.lifecycle.ensure_consumable("DataFromJsonlines")?;
        if self.max_datapoints.is_some_and(|max| self.yielded >= max) {
            self.lifecycle.mark_exhausted();
            self.reader = None;
            return Ok(None);
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                self.lifecycle.mark_exhausted();
                self.reader = None;
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let item: T = serde_json::from_str(trimmed)?;
            self.yielded += 1;
            return Ok(Some(item));
        }
    }

    fn size_hint(&self) -> Option<usize> {
        self.max_datapoints
    }

    fn teardown(&mut self) {
        self.reader = None;
        self.yielded = 0;
        self.lifecycle.teardown();
    }
}

/// Write and read document graphs as one JSON file per graph.
///
/// File names come from the graph's own id, so re-saving the same corpus
/// overwrites in place instead of duplicating.
pub struct SerializerFiles;

impl SerializerFiles {
    /// Drain `flow` into `dir`, one `<image-id>.json` file per graph.
    ///
    /// # Returns
    ///
    /// The number of files written.
    pub fn save<S>(flow: &mut S, dir: impl AsRef<Path>) -> Result<usize>
    where
        S: DataFlow<Item = Image> + ?Sized,
    {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        flow.reset()?;
        let mut written = 0usize;
        while let Some(image) = flow.try_next()? {
            let path = dir.join(format!("{}.json", image.id()));
            let file = BufWriter::new(File::create(&path)?);
            serde_json::to_writer(file, &image)?;
            written += 1;
        }
        log::debug!(
            "SerializerFiles: wrote {written} graphs to {}",
            dir.display()
        );
        Ok(written)
    }

    /// Lazy flow over the `.json` files of `dir`, in lexicographic file
    /// name order.
    #[must_use = "returns the new flow"]
    pub fn load(dir: impl AsRef<Path>) -> impl DataFlow<Item = Image> {
        DataFromGraphFiles {
            files: DataFromFiles::new(dir, "json"),
        }
    }
}

/// Deserializing wrapper over a [`DataFromFiles`] listing.
struct DataFromGraphFiles {
    files: DataFromFiles,
}

impl DataFlow for DataFromGraphFiles {
    type Item = Image;

    fn reset(&mut self) -> Result<()> {
        self.files.reset()
    }

    fn try_next(&mut self) -> Result<Option<Image>> {
        let Some(path) = self.files.try_next()? else {
            return Ok(None);
        };
        let file = BufReader::new(File::open(&path)?);
        let image: Image = serde_json::from_reader(file).map_err(|err| {
            log::warn!("SerializerFiles: {} failed to deserialize", path.display());
            PageflowError::Serialization(err)
        })?;
        Ok(Some(image))
    }

    fn size_hint(&self) -> Option<usize> {
        self.files.size_hint()
    }

    fn teardown(&mut self) {
        self.files.teardown();
    }
}

/// Convenience: drain `flow` and hand back the realized vec alongside a
/// count, logging the corpus size once.
pub fn collect_corpus<S: DataFlow + ?Sized>(flow: &mut S) -> Result<Vec<S::Item>> {
    let items = flow.collect_all()?;
    log::debug!("collect_corpus: realized {} elements", items.len());
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DataFromList;
    use pageflow_core::{BoundingBox, Category};

    fn sample_image(key: &str) -> Image {
        let mut image = Image::new(key, 200.0, 100.0);
        image
            .add_box_annotation(
                Category::Title,
                Some(0.9),
                BoundingBox::new(10.0, 10.0, 90.0, 30.0).unwrap(),
            )
            .unwrap();
        image
    }

    #[test]
    fn test_jsonlines_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        let originals = vec![sample_image("a.png"), sample_image("b.png")];
        let mut source = DataFromList::new(originals.clone());
        assert_eq!(SerializerJsonlines::save(&mut source, &path).unwrap(), 2);

        let mut loaded = SerializerJsonlines::load::<Image>(&path, None);
        let images = loaded.collect_all().unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].id(), originals[0].id());
        assert_eq!(images[1].id(), originals[1].id());
        assert_eq!(images[0].active_annotations(None).count(), 1);
    }

    #[test]
    fn test_jsonlines_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        let mut source = DataFromList::new(vec![1u32, 2, 3, 4, 5]);
        SerializerJsonlines::save(&mut source, &path).unwrap();

        let mut loaded = SerializerJsonlines::load::<u32>(&path, Some(2));
        assert_eq!(loaded.collect_all().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_jsonlines_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        std::fs::write(&path, "1\n\n2\n").unwrap();
        let mut loaded = SerializerJsonlines::load::<u32>(&path, None);
        assert_eq!(loaded.collect_all().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_jsonlines_second_pass() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        let mut source = DataFromList::new(vec![7u32, 8]);
        SerializerJsonlines::save(&mut source, &path).unwrap();
        let mut loaded = SerializerJsonlines::load::<u32>(&path, None);
        assert_eq!(loaded.collect_all().unwrap(), vec![7, 8]);
        assert_eq!(loaded.collect_all().unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let originals = vec![sample_image("a.png"), sample_image("b.png")];
        let mut source = DataFromList::new(originals.clone());
        assert_eq!(SerializerFiles::save(&mut source, dir.path()).unwrap(), 2);

        let mut loaded = SerializerFiles::load(dir.path());
        let images = loaded.collect_all().unwrap();
        assert_eq!(images.len(), 2);
        let mut want: Vec<String> = originals.iter().map(|i| i.id().to_string()).collect();
        want.sort();
        let got: Vec<String> = images.iter().map(|i| i.id().to_string()).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_files_load_corrupt_graph_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        let mut loaded = SerializerFiles::load(dir.path());
        loaded.reset().unwrap();
        let err = loaded.try_next().unwrap_err();
        assert!(matches!(err, PageflowError::Serialization(_)));
    }
}
