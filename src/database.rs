//! Database context - one catalog and one buffer pool built from a config.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::buffer::BufferPool;
use crate::catalog::Catalog;
use crate::common::{Config, Result, TableId, TransactionId};
use crate::storage::{HeapFile, TupleDesc};

/// Everything a transaction needs, constructed explicitly and passed around.
///
/// Independent `Database` values share nothing, so tests can run isolated
/// instances side by side.
///
/// # Example
/// ```no_run
/// use tupledb::{Config, Database, Field, Tuple, TupleDesc, Type};
///
/// # fn main() -> tupledb::Result<()> {
/// let db = Database::new(Config::default())?;
/// let table = db.create_table("/tmp/users.dat", "users", TupleDesc::new(&[Type::Int]), None)?;
///
/// let tid = db.begin();
/// let schema = db.catalog().schema(table)?;
/// db.buffer_pool().insert_tuple(tid, table, Tuple::new(schema, vec![Field::Int(1)])?)?;
/// db.commit(tid)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Database {
    config: Config,
    catalog: Arc<Catalog>,
    buffer_pool: BufferPool,
}

impl Database {
    /// # Errors
    /// `Error::Config` if `config` does not validate.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let catalog = Arc::new(Catalog::new(config.page_size));
        let buffer_pool = BufferPool::new(config.pool_pages, Arc::clone(&catalog))?;
        debug!(page_size = config.page_size, pool_pages = config.pool_pages, "database ready");

        Ok(Self {
            config,
            catalog,
            buffer_pool,
        })
    }

    /// Build a database and load the tables listed in a schema file.
    /// See [`Catalog::load_schema`] for the format.
    pub fn open<P: AsRef<Path>>(config: Config, schema_path: P) -> Result<Self> {
        let db = Self::new(config)?;
        db.catalog.load_schema(schema_path)?;
        Ok(db)
    }

    /// Open (or create) the heap file at `path` and register it as `name`.
    pub fn create_table<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
        schema: TupleDesc,
        primary_key: Option<&str>,
    ) -> Result<TableId> {
        let file = HeapFile::open_or_create(path, schema, self.config.page_size)?;
        self.catalog.add_table(file, name, primary_key)
    }

    /// Hand out a fresh transaction id.
    pub fn begin(&self) -> TransactionId {
        TransactionId::new()
    }

    /// Commit `tid`: flush its pages, then release its locks.
    ///
    /// # Errors
    /// A failed write leaves the locks held; abort `tid` afterwards.
    pub fn commit(&self, tid: TransactionId) -> Result<()> {
        self.buffer_pool.transaction_complete(tid, true)
    }

    /// Abort `tid`: drop its pages, restore any written early, release its
    /// locks.
    pub fn abort(&self, tid: TransactionId) -> Result<()> {
        self.buffer_pool.transaction_complete(tid, false)
    }

    /// Get the configuration this database was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the table catalog.
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Get the buffer pool.
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }
}
