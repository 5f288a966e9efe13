//! Table catalog - table ids to heap files and schemas.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::common::{Error, Result, TableId};
use crate::storage::{HeapFile, TupleDesc, Type};

#[derive(Debug)]
struct TableEntry {
    name: String,
    primary_key: Option<String>,
    file: Arc<HeapFile>,
}

#[derive(Debug, Default)]
struct CatalogInner {
    tables: HashMap<TableId, TableEntry>,
    names: HashMap<String, TableId>,
}

/// Registry of the tables a [`BufferPool`](crate::BufferPool) can reach.
///
/// Every heap file in a catalog shares the catalog's page size.
///
/// # Thread Safety
/// Lookups take a shared lock; registration takes an exclusive one.
/// Heap file handles are handed out as `Arc`s, so a lookup never holds
/// the catalog lock while the caller does I/O.
#[derive(Debug)]
pub struct Catalog {
    page_size: usize,
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            inner: RwLock::new(CatalogInner::default()),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Register `file` under `name`.
    ///
    /// A table already registered under the same name or the same id is
    /// replaced. An empty name is replaced by one derived from the id.
    ///
    /// # Errors
    /// `Error::Config` if the file's page size differs from the catalog's.
    pub fn add_table(
        &self,
        file: HeapFile,
        name: &str,
        primary_key: Option<&str>,
    ) -> Result<TableId> {
        if file.page_size() != self.page_size {
            return Err(Error::Config(format!(
                "table {:?} uses {}-byte pages, catalog uses {}",
                name,
                file.page_size(),
                self.page_size
            )));
        }

        let table_id = file.table_id();
        let name = if name.is_empty() {
            format!("table_{}", table_id.0)
        } else {
            name.to_string()
        };

        let mut inner = self.inner.write();
        if let Some(old_id) = inner.names.remove(&name) {
            inner.tables.remove(&old_id);
        }
        if let Some(old) = inner.tables.remove(&table_id) {
            inner.names.remove(&old.name);
        }

        debug!(table = %table_id, %name, path = %file.path().display(), "registered table");
        inner.names.insert(name.clone(), table_id);
        inner.tables.insert(
            table_id,
            TableEntry {
                name,
                primary_key: primary_key.map(str::to_string),
                file: Arc::new(file),
            },
        );
        Ok(table_id)
    }

    pub fn table_id(&self, name: &str) -> Result<TableId> {
        self.inner
            .read()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    pub fn heap_file(&self, table_id: TableId) -> Result<Arc<HeapFile>> {
        self.with_entry(table_id, |entry| Arc::clone(&entry.file))
    }

    pub fn schema(&self, table_id: TableId) -> Result<Arc<TupleDesc>> {
        self.with_entry(table_id, |entry| Arc::clone(entry.file.schema()))
    }

    pub fn table_name(&self, table_id: TableId) -> Result<String> {
        self.with_entry(table_id, |entry| entry.name.clone())
    }

    pub fn primary_key(&self, table_id: TableId) -> Result<Option<String>> {
        self.with_entry(table_id, |entry| entry.primary_key.clone())
    }

    fn with_entry<T>(&self, table_id: TableId, f: impl FnOnce(&TableEntry) -> T) -> Result<T> {
        self.inner
            .read()
            .tables
            .get(&table_id)
            .map(f)
            .ok_or_else(|| Error::TableNotFound(table_id.to_string()))
    }

    /// Registered table ids, in ascending order.
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.inner.read().tables.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.read().tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().tables.is_empty()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.tables.clear();
        inner.names.clear();
    }

    // ========================================================================
    // Schema files
    // ========================================================================

    /// Load table definitions from a schema file.
    ///
    /// One table per line:
    /// ```text
    /// users (id int pk, name string)
    /// orders (id int, user_id int)
    /// ```
    /// Each table is stored in `<name>.dat` next to the schema file, which
    /// is created empty if missing. Blank lines and lines starting with `#`
    /// are skipped. Returns the ids of the loaded tables in file order.
    ///
    /// # Errors
    /// - `Error::SchemaParse` with the 1-based line number of a bad entry
    /// - `Error::Io` if the schema or a table file cannot be opened
    pub fn load_schema<P: AsRef<Path>>(&self, path: P) -> Result<Vec<TableId>> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut loaded = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let definition = parse_table_line(line).map_err(|reason| Error::SchemaParse {
                line: index + 1,
                reason,
            })?;
            let names: Vec<&str> = definition.fields.iter().map(|(n, _)| n.as_str()).collect();
            let types: Vec<Type> = definition.fields.iter().map(|&(_, t)| t).collect();

            let file = HeapFile::open_or_create(
                dir.join(format!("{}.dat", definition.name)),
                TupleDesc::with_names(&types, &names),
                self.page_size,
            )?;
            let table_id = self.add_table(
                file,
                &definition.name,
                definition.primary_key.as_deref(),
            )?;
            loaded.push(table_id);
        }

        debug!(path = %path.display(), tables = loaded.len(), "loaded schema");
        Ok(loaded)
    }
}

struct TableDefinition {
    name: String,
    fields: Vec<(String, Type)>,
    primary_key: Option<String>,
}

fn parse_table_line(line: &str) -> std::result::Result<TableDefinition, String> {
    let open = line.find('(').ok_or("missing '('")?;
    let close = line.rfind(')').ok_or("missing ')'")?;
    if close < open {
        return Err("')' before '('".to_string());
    }

    let name = line[..open].trim();
    if name.is_empty() {
        return Err("missing table name".to_string());
    }

    let mut fields = Vec::new();
    let mut primary_key = None;
    for column in line[open + 1..close].split(',') {
        let parts: Vec<&str> = column.split_whitespace().collect();
        let (field, type_name, annotation) = match parts.as_slice() {
            [field, type_name] => (*field, *type_name, None),
            [field, type_name, annotation] => (*field, *type_name, Some(*annotation)),
            _ => return Err(format!("bad column {:?}", column.trim())),
        };

        let field_type = match type_name.to_ascii_lowercase().as_str() {
            "int" => Type::Int,
            "string" => Type::Str,
            other => return Err(format!("unknown type {other:?}")),
        };
        match annotation {
            None => {}
            Some("pk") => primary_key = Some(field.to_string()),
            Some(other) => return Err(format!("unknown annotation {other:?}")),
        }
        fields.push((field.to_string(), field_type));
    }

    Ok(TableDefinition {
        name: name.to_string(),
        fields,
        primary_key,
    })
}
