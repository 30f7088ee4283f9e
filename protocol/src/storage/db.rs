//! # OfftakeDB: Record Store
//!
//! The persistence layer for an offtake deployment, built on sled's
//! embedded key-value store. Every on-disk byte flows through this module.
//!
//! ## Tree Layout
//!
//! | Tree         | Key                   | Value                        |
//! |--------------|-----------------------|------------------------------|
//! | `projects`   | project id (8B BE)    | `bincode(ProjectRecord)`     |
//! | `tokens`     | project id (8B BE)    | `bincode(TokenRecord)`       |
//! | `vaults`     | project id (8B BE)    | `bincode(VaultRecord)`       |
//! | `settlement` | asset address (UTF-8) | `bincode(SettlementLedger)`  |
//! | `metadata`   | key (UTF-8)           | `bincode(..)`                |
//!
//! Project ids are big-endian so sled's lexicographic order is numeric
//! order, and a scan of `projects` yields proposals oldest first.
//!
//! The store is schema-agnostic: it moves serde values in and out of named
//! trees. What a record looks like, and how old versions of it migrate, is
//! the business of the crate that owns the record.
//!
//! ## Atomicity
//!
//! A [`RecordBatch`] collects writes against any number of trees and
//! [`OfftakeDB::commit`] applies them in a single sled transaction. Either
//! every write lands or none does.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Batch, Db, Tree};
use std::path::Path;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("transaction aborted: {0}")]
    Transaction(String),

    #[error("corrupt key in tree {tree}: {reason}")]
    CorruptKey { tree: &'static str, reason: String },
}

pub type DbResult<T> = Result<T, DbError>;

fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

/// Encodes a project id as a big-endian key.
pub fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

/// Decodes a big-endian project id key.
pub fn parse_id_key(tree: &'static str, key: &[u8]) -> DbResult<u64> {
    let bytes: [u8; 8] = key.try_into().map_err(|_| DbError::CorruptKey {
        tree,
        reason: format!("expected 8 bytes, found {}", key.len()),
    })?;
    Ok(u64::from_be_bytes(bytes))
}

// ---------------------------------------------------------------------------
// Buckets
// ---------------------------------------------------------------------------

/// The named trees of an offtake database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Projects,
    Tokens,
    Vaults,
    Settlement,
    Metadata,
}

impl Bucket {
    /// The sled tree name.
    pub fn tree_name(&self) -> &'static str {
        match self {
            Bucket::Projects => "projects",
            Bucket::Tokens => "tokens",
            Bucket::Vaults => "vaults",
            Bucket::Settlement => "settlement",
            Bucket::Metadata => "metadata",
        }
    }

    const ALL: [Bucket; 5] = [
        Bucket::Projects,
        Bucket::Tokens,
        Bucket::Vaults,
        Bucket::Settlement,
        Bucket::Metadata,
    ];

    fn index(&self) -> usize {
        match self {
            Bucket::Projects => 0,
            Bucket::Tokens => 1,
            Bucket::Vaults => 2,
            Bucket::Settlement => 3,
            Bucket::Metadata => 4,
        }
    }
}

// ---------------------------------------------------------------------------
// RecordBatch
// ---------------------------------------------------------------------------

/// A set of pending writes spanning several trees.
#[derive(Debug, Default)]
pub struct RecordBatch {
    batches: [Batch; 5],
    len: usize,
}

impl RecordBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `value` (bincode-encoded) under `key` in `bucket`.
    pub fn put<T: Serialize>(
        &mut self,
        bucket: Bucket,
        key: impl AsRef<[u8]>,
        value: &T,
    ) -> DbResult<()> {
        let bytes = encode(value)?;
        self.batches[bucket.index()].insert(key.as_ref(), bytes);
        self.len += 1;
        Ok(())
    }

    /// Queues removal of `key` from `bucket`.
    pub fn remove(&mut self, bucket: Bucket, key: impl AsRef<[u8]>) {
        self.batches[bucket.index()].remove(key.as_ref());
        self.len += 1;
    }

    /// Number of queued writes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// ---------------------------------------------------------------------------
// OfftakeDB
// ---------------------------------------------------------------------------

/// Persistent record store for an offtake deployment.
///
/// Cloning is cheap: sled handles are reference counted, and all trees
/// support lock-free concurrent reads, so an `OfftakeDB` can be shared
/// across tasks without external synchronization.
#[derive(Debug, Clone)]
pub struct OfftakeDB {
    db: Db,
    projects: Tree,
    tokens: Tree,
    vaults: Tree,
    settlement: Tree,
    metadata: Tree,
}

impl OfftakeDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let projects = db.open_tree(Bucket::Projects.tree_name())?;
        let tokens = db.open_tree(Bucket::Tokens.tree_name())?;
        let vaults = db.open_tree(Bucket::Vaults.tree_name())?;
        let settlement = db.open_tree(Bucket::Settlement.tree_name())?;
        let metadata = db.open_tree(Bucket::Metadata.tree_name())?;

        Ok(Self {
            db,
            projects,
            tokens,
            vaults,
            settlement,
            metadata,
        })
    }

    fn tree(&self, bucket: Bucket) -> &Tree {
        match bucket {
            Bucket::Projects => &self.projects,
            Bucket::Tokens => &self.tokens,
            Bucket::Vaults => &self.vaults,
            Bucket::Settlement => &self.settlement,
            Bucket::Metadata => &self.metadata,
        }
    }

    // -- Single-record operations -------------------------------------------

    /// Writes one record outside of any batch.
    pub fn put<T: Serialize>(&self, bucket: Bucket, key: impl AsRef<[u8]>, value: &T) -> DbResult<()> {
        self.tree(bucket).insert(key.as_ref(), encode(value)?)?;
        Ok(())
    }

    /// Reads one record. Returns `None` if the key is absent.
    pub fn get<T: DeserializeOwned>(&self, bucket: Bucket, key: impl AsRef<[u8]>) -> DbResult<Option<T>> {
        match self.tree(bucket).get(key.as_ref())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads every record of a tree in key order.
    pub fn scan<T: DeserializeOwned>(&self, bucket: Bucket) -> DbResult<Vec<(Vec<u8>, T)>> {
        let mut out = Vec::new();
        for entry in self.tree(bucket).iter() {
            let (key, value) = entry?;
            out.push((key.to_vec(), decode(&value)?));
        }
        Ok(out)
    }

    /// Number of records in a tree.
    pub fn count(&self, bucket: Bucket) -> usize {
        self.tree(bucket).len()
    }

    /// Returns `true` if no tree holds any record.
    pub fn is_empty(&self) -> bool {
        Bucket::ALL.iter().all(|b| self.tree(*b).is_empty())
    }

    // -- Batched operations -------------------------------------------------

    /// Applies every write of `batch` atomically across trees, then flushes.
    pub fn commit(&self, batch: RecordBatch) -> DbResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let [projects, tokens, vaults, settlement, metadata] = &batch.batches;

        (
            &self.projects,
            &self.tokens,
            &self.vaults,
            &self.settlement,
            &self.metadata,
        )
            .transaction(|(p, t, v, s, m)| {
                p.apply_batch(projects)?;
                t.apply_batch(tokens)?;
                v.apply_batch(vaults)?;
                s.apply_batch(settlement)?;
                m.apply_batch(metadata)?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e: TransactionError<()>| DbError::Transaction(format!("{e:?}")))?;

        self.flush()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
