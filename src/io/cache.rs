// io/cache.rs
//
// Strong/weak reference-counted cache over `IndexIo`/`IndexPartitionIo`.
// Single-threaded cooperative core (see spec's concurrency model), so plain
// `Rc`/`Weak` rather than `Arc`/atomic refcounts.

use super::{GlobalMetadata, IndexIo, IndexPartitionIo};
use crate::error::PiqueError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// A hybrid reference: `Strong` keeps the resource alive on the cache's own
/// behalf, `Weak` only observes whether some other holder still does.
enum CacheHandle<T: ?Sized> {
    Strong(Rc<T>),
    Weak(Weak<T>),
}

impl<T: ?Sized> CacheHandle<T> {
    fn upgrade(&self) -> Option<Rc<T>> {
        match self {
            CacheHandle::Strong(r) => Some(r.clone()),
            CacheHandle::Weak(w) => w.upgrade(),
        }
    }

    fn weaken(&mut self) {
        if let CacheHandle::Strong(r) = self {
            *self = CacheHandle::Weak(Rc::downgrade(r));
        }
    }

    /// Re-acquires a strong handle if something else still holds the
    /// resource alive. Returns whether the handle is strong afterwards.
    fn restrengthen(&mut self) -> bool {
        match self {
            CacheHandle::Strong(_) => true,
            CacheHandle::Weak(w) => match w.upgrade() {
                Some(r) => {
                    *self = CacheHandle::Strong(r);
                    true
                }
                None => false,
            },
        }
    }

    fn is_strong(&self) -> bool {
        matches!(self, CacheHandle::Strong(_))
    }
}

/// Bundles a cached partition IO with a strong reference to its parent, so
/// that holding a `CachedPartition` alive transitively holds its parent
/// `IndexIo` alive regardless of the cache's own bookkeeping for the parent.
pub struct CachedPartition {
    parent: Rc<dyn IndexIo>,
    partition: Rc<dyn IndexPartitionIo>,
}

impl std::ops::Deref for CachedPartition {
    type Target = dyn IndexPartitionIo;
    fn deref(&self) -> &Self::Target {
        self.partition.as_ref()
    }
}

struct VariableEntry {
    indexio: CacheHandle<dyn IndexIo>,
    partitions: HashMap<u32, CacheHandle<CachedPartition>>,
}

pub type Opener = Box<dyn Fn(&str) -> Result<Box<dyn IndexIo>, PiqueError>>;

/// `variable_name -> { indexio, partition_id -> partition }`, per spec's
/// `IndexIOCache` layout.
pub struct IndexIoCache {
    entries: RefCell<HashMap<String, VariableEntry>>,
    opener: Opener,
}

impl IndexIoCache {
    pub fn new(opener: Opener) -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            opener,
        }
    }

    pub fn open_index_io(&self, variable: &str) -> Result<Rc<dyn IndexIo>, PiqueError> {
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.get_mut(variable) {
            if let Some(rc) = entry.indexio.upgrade() {
                entry.indexio = CacheHandle::Strong(rc.clone());
                return Ok(rc);
            }
        }
        let fresh: Rc<dyn IndexIo> = Rc::from((self.opener)(variable)?);
        entries.insert(
            variable.to_string(),
            VariableEntry {
                indexio: CacheHandle::Strong(fresh.clone()),
                partitions: HashMap::new(),
            },
        );
        Ok(fresh)
    }

    pub fn open_index_partition_io(
        &self,
        variable: &str,
        partition_id: u32,
    ) -> Result<Rc<CachedPartition>, PiqueError> {
        let parent = self.open_index_io(variable)?;
        let mut entries = self.entries.borrow_mut();
        let entry = entries
            .get_mut(variable)
            .expect("open_index_io just inserted this entry");
        if let Some(handle) = entry.partitions.get_mut(&partition_id) {
            if let Some(rc) = handle.upgrade() {
                *handle = CacheHandle::Strong(rc.clone());
                return Ok(rc);
            }
        }
        let partition = parent.get_partition(partition_id)?;
        let cached = Rc::new(CachedPartition {
            parent: parent.clone(),
            partition: Rc::from(partition),
        });
        entry
            .partitions
            .insert(partition_id, CacheHandle::Strong(cached.clone()));
        Ok(cached)
    }

    /// Weakens every entry, then re-strengthens those still externally held.
    /// Net effect: unreferenced handles are dropped, in-use handles remain
    /// strong.
    pub fn release_unused(&self) -> Result<(), PiqueError> {
        let mut entries = self.entries.borrow_mut();
        for entry in entries.values_mut() {
            entry.indexio.weaken();
            for handle in entry.partitions.values_mut() {
                handle.weaken();
            }
        }
        for entry in entries.values_mut() {
            entry.indexio.restrengthen();
            for handle in entry.partitions.values_mut() {
                handle.restrengthen();
            }
            let any_child_strong = entry.partitions.values().any(|h| h.is_strong());
            if any_child_strong && !entry.indexio.is_strong() {
                return Err(PiqueError::CacheInvariantViolation(
                    "partition handle outlived its parent IndexIo entry".into(),
                ));
            }
        }
        entries.retain(|_, entry| {
            entry.partitions.retain(|_, h| h.upgrade().is_some());
            entry.indexio.upgrade().is_some() || !entry.partitions.is_empty()
        });
        Ok(())
    }

    pub fn release_all(&self) {
        self.entries.borrow_mut().clear();
    }

    pub fn global_metadata(&self, variable: &str) -> Result<GlobalMetadata, PiqueError> {
        self.open_index_io(variable)?.global_metadata()
    }
}
