//! Source flows: from collections, from generator closures, and from
//! directory listings.

use crate::flow::{DataFlow, Lifecycle};
use pageflow_core::Result;
use std::path::{Path, PathBuf};

/// Flow over an owned collection, yielding clones in order.
#[derive(Debug, Clone)]
pub struct DataFromList<T> {
    items: Vec<T>,
    cursor: usize,
    lifecycle: Lifecycle,
}

impl<T> DataFromList<T> {
    /// Wrap a collection as a flow.
    #[must_use = "returns the new flow"]
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: 0,
            lifecycle: Lifecycle::default(),
        }
    }
}

impl<T: Clone> DataFlow for DataFromList<T> {
    type Item = T;

    fn reset(&mut self) -> Result<()> {
        self.lifecycle.begin_reset("DataFromList")?;
        self.cursor = 0;
        Ok(())
    }

    fn try_next(&mut self) -> Result<Option<T>> {
        self.lifecycle.ensure_consumable("DataFromList")?;
        if self.cursor < self.items.len() {
            let item = self.items[self.cursor].clone();
            self.cursor += 1;
            Ok(Some(item))
        } else {
            self.lifecycle.mark_exhausted();
            Ok(None)
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }

    fn teardown(&mut self) {
        self.cursor = 0;
        self.lifecycle.teardown();
    }
}

/// Flow over a generator closure, possibly unbounded.
///
/// `factory` builds a fresh generator at every reset, so stateful
/// generators (counters, seeded randomness) start over cleanly.
pub struct DataFromFn<F, G> {
    factory: F,
    generator: Option<G>,
    lifecycle: Lifecycle,
}

impl<T, G, F> DataFromFn<F, G>
where
    G: FnMut() -> Option<T>,
    F: FnMut() -> G,
{
    /// Wrap a generator factory as a flow.
    #[must_use = "returns the new flow"]
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            generator: None,
            lifecycle: Lifecycle::default(),
        }
    }
}

impl<T, G, F> DataFlow for DataFromFn<F, G>
where
    G: FnMut() -> Option<T>,
    F: FnMut() -> G,
{
    type Item = T;

    fn reset(&mut self) -> Result<()> {
        self.lifecycle.begin_reset("DataFromFn")?;
        self.generator = Some((self.factory)());
        Ok(())
    }

    fn try_next(&mut self) -> Result<Option<T>> {
        self.lifecycle.ensure_consumable("DataFromFn")?;
        match self.generator.as_mut().and_then(|g| g()) {
            Some(item) => Ok(Some(item)),
            None => {
                self.lifecycle.mark_exhausted();
                Ok(None)
            }
        }
    }

    fn teardown(&mut self) {
        self.generator = None;
        self.lifecycle.teardown();
    }
}

/// Flow over a directory listing, yielding paths in name order.
///
/// Listing happens at reset time, so files added between passes are seen
/// by the next pass.
#[derive(Debug, Clone)]
pub struct DataFromFiles {
    dir: PathBuf,
    extension: String,
    paths: Vec<PathBuf>,
    cursor: usize,
    lifecycle: Lifecycle,
}

impl DataFromFiles {
    /// List `dir` for files with the given extension (no leading dot).
    #[must_use = "returns the new flow"]
    pub fn new(dir: impl AsRef<Path>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            extension: extension.into(),
            paths: Vec::new(),
            cursor: 0,
            lifecycle: Lifecycle::default(),
        }
    }
}

impl DataFlow for DataFromFiles {
    type Item = PathBuf;

    fn reset(&mut self) -> Result<()> {
        self.lifecycle.begin_reset("DataFromFiles")?;
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .is_some_and(|ext| ext == self.extension.as_str())
            })
            .collect();
        paths.sort();
        log::debug!(
            "DataFromFiles: {} .{} files under {}",
            paths.len(),
            self.extension,
            self.dir.display()
        );
        self.paths = paths;
        self.cursor = 0;
        Ok(())
    }

    fn try_next(&mut self) -> Result<Option<PathBuf>> {
        self.lifecycle.ensure_consumable("DataFromFiles")?;
        if self.cursor < self.paths.len() {
            let path = self.paths[self.cursor].clone();
            self.cursor += 1;
            Ok(Some(path))
        } else {
            self.lifecycle.mark_exhausted();
            Ok(None)
        }
    }

    fn size_hint(&self) -> Option<usize> {
        if self.lifecycle.is_exhausted() || !self.paths.is_empty() {
            Some(self.paths.len())
        } else {
            None
        }
    }

    fn teardown(&mut self) {
        self.paths.clear();
        self.cursor = 0;
        self.lifecycle.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::DataFlowExt;

    #[test]
    fn test_list_flow_yields_in_order() {
        let mut flow = DataFromList::new(vec![1, 2, 3]);
        assert_eq!(flow.collect_all().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_list_flow_consume_before_reset_fails() {
        let mut flow = DataFromList::new(vec![1]);
        assert!(flow.try_next().unwrap_err().is_reentrancy());
    }

    #[test]
    fn test_list_flow_double_reset_fails() {
        let mut flow = DataFromList::new(vec![1]);
        flow.reset().unwrap();
        assert!(flow.reset().unwrap_err().is_reentrancy());
    }

    #[test]
    fn test_list_flow_second_pass_after_exhaustion() {
        let mut flow = DataFromList::new(vec![1, 2]);
        assert_eq!(flow.collect_all().unwrap(), vec![1, 2]);
        assert_eq!(flow.collect_all().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_fn_flow_restarts_generator_on_reset() {
        let mut flow = DataFromFn::new(|| {
            let mut n = 0;
            move || {
                n += 1;
                (n <= 3).then_some(n)
            }
        });
        assert_eq!(flow.collect_all().unwrap(), vec![1, 2, 3]);
        assert_eq!(flow.collect_all().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_files_flow_sorted_listing() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.json", "a.json", "c.txt"] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }
        let mut flow = DataFromFiles::new(dir.path(), "json");
        let names: Vec<String> = flow
            .collect_all()
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.json", "b.json"]);
    }
}
