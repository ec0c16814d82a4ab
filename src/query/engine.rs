// query/engine.rs
//
// Opens a `Database` against an `IndexIoCache` and lowers a `Query` into a
// `QueryCursor` that streams per-partition results. Grounded on
// original_source/include/pique/query/simple-query-engine.hpp's
// `SimpleQueryEngine::open_impl`/`evaluate_impl`.

use super::cursor::QueryCursor;
use super::database::Database;
use super::Query;
use crate::config::EngineConfig;
use crate::error::PiqueError;
use crate::io::cache::IndexIoCache;
use crate::io::file::FileIndexIo;
use crate::io::GlobalMetadata;
use std::rc::Rc;
use tracing::debug;

/// Owns the `Database` and the `IndexIoCache` opened against it. One
/// `QueryEngine` can evaluate any number of queries; each `evaluate` call
/// produces an independent `QueryCursor` sharing the same cache.
pub struct QueryEngine {
    db: Rc<Database>,
    cache: Rc<IndexIoCache>,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn open(db: Database, config: EngineConfig) -> Result<Self, PiqueError> {
        let db = Rc::new(db);
        let db_for_opener = db.clone();
        let cache = IndexIoCache::new(Box::new(move |variable: &str| {
            let var = db_for_opener
                .variable(variable)
                .ok_or_else(|| PiqueError::UnknownVariable(variable.to_string()))?;
            let path = var
                .resolved_index_path()
                .ok_or_else(|| PiqueError::MissingIndexFile(std::path::PathBuf::from(variable)))?;
            let io = FileIndexIo::open(&path)?;
            Ok(Box::new(io) as Box<dyn crate::io::IndexIo>)
        }));
        Ok(Self {
            db,
            cache: Rc::new(cache),
            config,
        })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clear_cache(&self) {
        self.cache.release_all();
    }

    /// Opens every variable referenced by `query`, verifies they all agree
    /// on partition extents (the same partitioning scheme), and returns a
    /// cursor that streams results partition by partition.
    pub fn evaluate(&self, query: Query) -> Result<QueryCursor, PiqueError> {
        let variables = super::referenced_variables(&query);
        if variables.is_empty() {
            return Err(PiqueError::MalformedQuery("query references no variables".into()));
        }

        let mut reference: Option<GlobalMetadata> = None;
        for name in &variables {
            let metadata = self.cache.global_metadata(name)?;
            match &reference {
                None => reference = Some(metadata),
                Some(r) => {
                    if r.extents != metadata.extents {
                        return Err(PiqueError::IncompatiblePartitioning(name.clone()));
                    }
                }
            }
        }
        let extents = reference.expect("variables is non-empty").extents;
        debug!(variables = ?variables, partitions = extents.len(), "evaluating query");

        Ok(QueryCursor::new(query, variables, extents, self.cache.clone(), self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::database::DataVariable;

    #[test]
    fn test_evaluate_rejects_query_with_no_constraints() {
        let db = Database::new();
        let engine = QueryEngine::open(db, EngineConfig::default()).unwrap();
        let err = engine.evaluate(vec![super::super::QueryTerm::UnaryNot]).unwrap_err();
        assert!(matches!(err, PiqueError::MalformedQuery(_)));
    }

    #[test]
    fn test_evaluate_rejects_unknown_variable() {
        let mut db = Database::new();
        db.add_variable(DataVariable::new("known", ".", None, None));
        let engine = QueryEngine::open(db, EngineConfig::default()).unwrap();
        let query = super::super::constraint("missing", Some(0.0), Some(1.0));
        let err = engine.evaluate(query).unwrap_err();
        assert!(matches!(err, PiqueError::UnknownVariable(_)));
    }
}
