// query/database.rs
//
// The variable catalog a `QueryEngine` opens: one `DataVariable` per named
// variable, each with optional paths to its dataset metadata and its index
// file, resolved relative to the catalog file's own directory. Grounded on
// original_source/include/pique/io/database.hpp; `DataVariable`'s metadata
// caching fixes the inverted `get_datatype` check spec §9 flags (the
// source returns `None` when the cached datatype *is* defined and no error
// when caching failed — backwards both ways).

use crate::dataset::{self, Dataset, DatasetMetaDescriptor, Grid, IndexableDatatypeId};
use crate::error::PiqueError;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

struct CachedMetadata {
    descriptor: DatasetMetaDescriptor,
    datatype: Option<IndexableDatatypeId>,
    grid: Grid,
}

pub struct DataVariable {
    name: String,
    base_dir: PathBuf,
    dataset_meta_path: Option<PathBuf>,
    index_path: Option<PathBuf>,
    cached_metadata: RefCell<Option<CachedMetadata>>,
}

impl DataVariable {
    pub fn new(
        name: impl Into<String>,
        base_dir: impl Into<PathBuf>,
        dataset_meta_path: Option<PathBuf>,
        index_path: Option<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            base_dir: base_dir.into(),
            dataset_meta_path,
            index_path,
            cached_metadata: RefCell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dataset_meta_path(&self) -> Option<&Path> {
        self.dataset_meta_path.as_deref()
    }

    pub fn index_path(&self) -> Option<&Path> {
        self.index_path.as_deref()
    }

    /// Reads and parses the dataset metadata file once, caching the
    /// result. Distinct from `datatype()`'s own error: a failure here is
    /// "couldn't read/parse the metadata file," never conflated with "the
    /// metadata parsed fine but names an unrecognized datatype."
    fn cache_metadata(&self) -> Result<(), PiqueError> {
        if self.cached_metadata.borrow().is_some() {
            return Ok(());
        }
        let meta_path = self
            .dataset_meta_path
            .as_ref()
            .ok_or_else(|| PiqueError::FailedToCacheMetadata(self.name.clone()))?;
        let resolved = self.base_dir.join(meta_path);
        let contents = fs::read_to_string(&resolved).map_err(|_| PiqueError::FailedToCacheMetadata(self.name.clone()))?;
        let descriptor =
            dataset::parse_dataset_metadata(&contents).map_err(|_| PiqueError::FailedToCacheMetadata(self.name.clone()))?;
        let (datatype, grid) = match &descriptor.format {
            dataset::DatasetFormatDescriptor::Raw { datatype, order, dims } => (
                Some(*datatype),
                Grid {
                    dims: dims.clone(),
                    order: *order,
                },
            ),
            dataset::DatasetFormatDescriptor::Hdf5 { .. } => (
                None,
                Grid {
                    dims: Vec::new(),
                    order: dataset::ElementOrder::RowMajor,
                },
            ),
        };
        *self.cached_metadata.borrow_mut() = Some(CachedMetadata { descriptor, datatype, grid });
        Ok(())
    }

    /// The variable's datatype, or a distinct error depending on *why* it's
    /// unavailable: `FailedToCacheMetadata` if the metadata file couldn't
    /// be read/parsed at all, `UndefinedDatatype` if it parsed but names a
    /// format (e.g. HDF5) this core doesn't resolve to a concrete type.
    pub fn datatype(&self) -> Result<IndexableDatatypeId, PiqueError> {
        self.cache_metadata()?;
        let cached = self.cached_metadata.borrow();
        cached
            .as_ref()
            .expect("cache_metadata populates on success")
            .datatype
            .ok_or_else(|| PiqueError::UndefinedDatatype(self.name.clone()))
    }

    pub fn grid(&self) -> Result<Grid, PiqueError> {
        self.cache_metadata()?;
        Ok(self.cached_metadata.borrow().as_ref().unwrap().grid.clone())
    }

    pub fn open_dataset(&self) -> Result<Box<dyn Dataset>, PiqueError> {
        self.cache_metadata()?;
        let cached = self.cached_metadata.borrow();
        let cached = cached.as_ref().unwrap();
        dataset::open_described_dataset(&cached.descriptor, &self.base_dir)
    }

    pub fn resolved_index_path(&self) -> Option<PathBuf> {
        self.index_path.as_ref().map(|p| self.base_dir.join(p))
    }
}

pub struct Database {
    variables: Vec<DataVariable>,
}

impl Database {
    pub fn new() -> Self {
        Self { variables: Vec::new() }
    }

    pub fn add_variable(&mut self, variable: DataVariable) -> usize {
        let id = self.variables.len();
        self.variables.push(variable);
        id
    }

    pub fn variable(&self, name: &str) -> Option<&DataVariable> {
        self.variables.iter().find(|v| v.name() == name)
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name().to_string()).collect()
    }

    pub fn variables(&self) -> &[DataVariable] {
        &self.variables
    }

    /// Parses spec §6's catalog file: one line per variable,
    /// whitespace-separated `name [dataset-meta-path|-] [index-path|-]`,
    /// paths resolved relative to the catalog file's own directory. `-`
    /// marks an absent optional path.
    pub fn open_catalog(path: impl AsRef<Path>) -> Result<Self, PiqueError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let mut db = Self::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let name = fields
                .next()
                .ok_or_else(|| PiqueError::MalformedQuery(format!("empty catalog line: {line:?}")))?;
            let dataset_meta_path = fields.next().filter(|s| *s != "-").map(PathBuf::from);
            let index_path = fields.next().filter(|s| *s != "-").map(PathBuf::from);
            db.add_variable(DataVariable::new(name, base_dir.clone(), dataset_meta_path, index_path));
        }
        Ok(db)
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_catalog_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("catalog.db"), "temperature temp.meta temp.idx\npressure - pressure.idx\n").unwrap();
        let db = Database::open_catalog(dir.path().join("catalog.db")).unwrap();
        assert_eq!(db.variable_names(), vec!["temperature", "pressure"]);
        let temp = db.variable("temperature").unwrap();
        assert_eq!(temp.resolved_index_path().unwrap(), dir.path().join("temp.idx"));
        let pressure = db.variable("pressure").unwrap();
        assert!(pressure.dataset_meta_path().is_none());
    }

    #[test]
    fn test_unknown_variable_is_none() {
        let db = Database::new();
        assert!(db.variable("nope").is_none());
    }

    #[test]
    fn test_datatype_distinguishes_cache_failure_from_undefined() {
        let dir = tempfile::tempdir().unwrap();
        // No dataset_meta_path at all -> cache_metadata fails outright.
        let no_meta = DataVariable::new("v", dir.path(), None, None);
        assert!(matches!(no_meta.datatype(), Err(PiqueError::FailedToCacheMetadata(_))));

        // Metadata names HDF5, which parses but yields no concrete datatype.
        fs::write(dir.path().join("v.meta"), "HDF5 data.h5 /group/v").unwrap();
        let hdf5_var = DataVariable::new("v", dir.path(), Some(PathBuf::from("v.meta")), None);
        assert!(matches!(hdf5_var.datatype(), Err(PiqueError::UndefinedDatatype(_))));
    }

    #[test]
    fn test_datatype_succeeds_for_raw() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("v.meta"), "RAW data.raw f32 c 10\n").unwrap();
        let var = DataVariable::new("v", dir.path(), Some(PathBuf::from("v.meta")), None);
        assert_eq!(var.datatype().unwrap(), IndexableDatatypeId::F32);
    }
}
