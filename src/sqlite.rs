use crate::cursor::Cursor;
use crate::dynamic::{read_dynamic_rows, DynamicRow};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::mapper::{MapOptions, RowMapper, SkipFields};
use crate::metadata::MetadataCache;
use crate::value::{FromValue, Value};
use rusqlite::types::ToSql;
use rusqlite::{Connection, Rows, Statement, Transaction};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc, time::Duration};

const IN_MEMORY: &str = ":memory:";

/// SQLite connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file, or `:memory:`
    pub db_path: String,
    /// How long to wait on a locked database before failing
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
    /// Enforce foreign key constraints on the connection
    #[serde(default)]
    pub foreign_keys: bool,
}

impl SqliteConfig {
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout_ms: None,
            foreign_keys: false,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(IN_MEMORY)
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path == IN_MEMORY
    }
}

/// Named parameter bindings for SQL statements
///
/// Names are stored in SQLite form. A name without a `:`, `@` or `$` prefix
/// gets a `:` prefix, so `with_value("id", 1)` binds `:id`. Entries the
/// statement does not name are not bound, so one parameter object can serve
/// several statements.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Params {
    pub values: HashMap<String, Value>,
}

impl Params {
    /// Create a new Params object
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.values.insert(parameter_name(name), value.into());
        self
    }

    /// Build bindings from the fields of a value that serializes to a flat
    /// map, such as a plain struct.
    pub fn from_serialize<S: Serialize + ?Sized>(object: &S) -> Result<Self> {
        use serde_json::Value as Json;

        let fields = match serde_json::to_value(object) {
            Ok(Json::Object(fields)) => fields,
            Ok(other) => {
                return Err(Error::InvalidParameter(format!(
                    "parameter object must serialize to a map, got {other}"
                )))
            }
            Err(err) => return Err(Error::InvalidParameter(err.to_string())),
        };

        let mut params = Self::new();
        for (name, field) in fields {
            let value = match field {
                Json::Null => Value::Null,
                Json::Bool(v) => Value::Boolean(v),
                Json::Number(n) => match n.as_i64() {
                    Some(v) => Value::Integer(v),
                    None => Value::Real(n.as_f64().unwrap_or(f64::NAN)),
                },
                Json::String(v) => Value::Text(v),
                Json::Array(_) | Json::Object(_) => {
                    return Err(Error::InvalidParameter(format!(
                        "parameter {name} is not a scalar"
                    )))
                }
            };
            params.values.insert(parameter_name(&name), value);
        }
        Ok(params)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(&parameter_name(name))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn bindings<'p>(&'p self, statement: &Statement<'_>) -> Vec<(&'p str, &'p dyn ToSql)> {
        self.values
            .iter()
            .filter(|(name, _)| matches!(statement.parameter_index(name), Ok(Some(_))))
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect()
    }
}

fn parameter_name(name: &str) -> String {
    if name.starts_with([':', '@', '$']) {
        name.to_string()
    } else {
        format!(":{name}")
    }
}

/// [`Cursor`] over the rows of an executed SQLite statement.
///
/// The current row is copied out on every [`Cursor::read`].
pub struct SqliteCursor<'stmt> {
    columns: Vec<String>,
    rows: Rows<'stmt>,
    current: Vec<Value>,
    closed: bool,
}

impl<'stmt> SqliteCursor<'stmt> {
    pub fn open(statement: &'stmt mut Statement<'_>, params: &Params) -> Result<Self> {
        let columns = statement
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let bindings = params.bindings(statement);
        let rows = statement.query(bindings.as_slice())?;
        Ok(Self {
            columns,
            rows,
            current: Vec::new(),
            closed: false,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.current.clear();
    }
}

impl Cursor for SqliteCursor<'_> {
    fn field_count(&self) -> usize {
        self.columns.len()
    }

    fn name(&self, index: usize) -> &str {
        &self.columns[index]
    }

    fn value(&self, index: usize) -> Value {
        self.current.get(index).cloned().unwrap_or(Value::Null)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn read(&mut self) -> Result<bool> {
        if self.closed {
            return Err(Error::CursorClosed);
        }
        self.current.clear();
        match self.rows.next()? {
            Some(row) => {
                for index in 0..self.columns.len() {
                    self.current.push(Value::from(row.get_ref(index)?));
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Command execution and row mapping over a SQLite connection.
///
/// Every failure is logged before it is returned.
pub trait Executor {
    fn connection(&self) -> &Connection;

    fn cache(&self) -> &MetadataCache;

    /// Execute a statement and return the number of changed rows.
    fn execute_non_query(&self, sql: &str, params: &Params) -> Result<usize> {
        logged(sql, || {
            let mut statement = self.connection().prepare_cached(sql)?;
            let bindings = params.bindings(&statement);
            Ok(statement.execute(bindings.as_slice())?)
        })
    }

    /// First column of the first row. An empty result reads as NULL.
    fn execute_scalar<T: FromValue>(&self, sql: &str, params: &Params) -> Result<T> {
        self.execute_reader(sql, params, |cursor| {
            let value = if cursor.read()? && cursor.field_count() > 0 {
                cursor.value(0)
            } else {
                Value::Null
            };
            Ok(T::from_value(value)?)
        })
    }

    /// Run a query and hand its cursor to `read`.
    fn execute_reader<R, F>(&self, sql: &str, params: &Params, read: F) -> Result<R>
    where
        F: FnOnce(&mut SqliteCursor<'_>) -> Result<R>,
    {
        logged(sql, || {
            let mut statement = self.connection().prepare_cached(sql)?;
            let mut cursor = SqliteCursor::open(&mut statement, params)?;
            read(&mut cursor)
        })
    }

    fn execute_entities<T: Entity>(
        &self,
        sql: &str,
        params: &Params,
        skip_fields: Option<&str>,
    ) -> Result<Vec<T>> {
        let mapper = RowMapper::new(self.cache());
        let options = map_options(skip_fields);
        self.execute_reader(sql, params, |cursor| mapper.map_all_rows(cursor, &options))
    }

    fn execute_entity<T: Entity>(
        &self,
        sql: &str,
        params: &Params,
        skip_fields: Option<&str>,
    ) -> Result<Option<T>> {
        let mapper = RowMapper::new(self.cache());
        let options = map_options(skip_fields);
        self.execute_reader(sql, params, |cursor| mapper.map_one_row(cursor, &options))
    }

    fn execute_dynamics(
        &self,
        sql: &str,
        params: &Params,
        skip_fields: Option<&str>,
    ) -> Result<Vec<DynamicRow>> {
        let skip = SkipFields::parse(skip_fields);
        self.execute_reader(sql, params, |cursor| read_dynamic_rows(cursor, &skip))
    }

    fn execute_dynamic(
        &self,
        sql: &str,
        params: &Params,
        skip_fields: Option<&str>,
    ) -> Result<Option<DynamicRow>> {
        let skip = SkipFields::parse(skip_fields);
        self.execute_reader(sql, params, |cursor| {
            if cursor.read()? {
                DynamicRow::from_cursor(&*cursor, &skip).map(Some)
            } else {
                Ok(None)
            }
        })
    }
}

fn map_options<T>(skip_fields: Option<&str>) -> MapOptions<'_, T> {
    match skip_fields {
        Some(csv) => MapOptions::new().skip_fields(csv),
        None => MapOptions::new(),
    }
}

fn logged<R>(sql: &str, run: impl FnOnce() -> Result<R>) -> Result<R> {
    run().map_err(|err| {
        tracing::error!(sql, error = %err, "sqlite command failed");
        err
    })
}

/// Data access over one SQLite connection.
///
/// Owns the [`MetadataCache`] used for every entity mapped through it. The
/// cache can be shared between instances with [`SimpleAccess::with_cache`].
pub struct SimpleAccess {
    connection: Connection,
    cache: Arc<MetadataCache>,
}

impl SimpleAccess {
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        tracing::debug!(path = %config.db_path, "opening sqlite connection");
        let connection = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.db_path)?
        };
        if let Some(timeout) = config.busy_timeout_ms {
            connection.busy_timeout(Duration::from_millis(timeout))?;
        }
        if config.foreign_keys {
            connection.pragma_update(None, "foreign_keys", true)?;
        }
        Ok(Self::from_connection(connection))
    }

    pub fn from_connection(connection: Connection) -> Self {
        Self {
            connection,
            cache: Arc::new(MetadataCache::new()),
        }
    }

    pub fn with_cache(mut self, cache: Arc<MetadataCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn shared_cache(&self) -> Arc<MetadataCache> {
        Arc::clone(&self.cache)
    }

    /// Start a transaction. Statements run through the returned handle are
    /// part of it until [`SimpleTransaction::end`] is called; dropping the
    /// handle rolls back.
    pub fn begin_transaction(&mut self) -> Result<SimpleTransaction<'_>> {
        let transaction = self.connection.transaction()?;
        Ok(SimpleTransaction {
            transaction,
            cache: &self.cache,
        })
    }

    pub fn close(self) -> Result<()> {
        self.connection.close().map_err(|(_, err)| Error::from(err))
    }
}

impl Executor for SimpleAccess {
    fn connection(&self) -> &Connection {
        &self.connection
    }

    fn cache(&self) -> &MetadataCache {
        &self.cache
    }
}

impl std::fmt::Debug for SimpleAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleAccess")
            .field("path", &self.connection.path())
            .field("cache", &self.cache)
            .finish()
    }
}

/// An open transaction on a [`SimpleAccess`] connection.
pub struct SimpleTransaction<'a> {
    transaction: Transaction<'a>,
    cache: &'a MetadataCache,
}

impl SimpleTransaction<'_> {
    /// Commit when `succeeded`, roll back otherwise.
    pub fn end(self, succeeded: bool) -> Result<()> {
        if succeeded {
            self.transaction.commit()?;
        } else {
            self.transaction.rollback()?;
        }
        Ok(())
    }
}

impl Executor for SimpleTransaction<'_> {
    fn connection(&self) -> &Connection {
        &self.transaction
    }

    fn cache(&self) -> &MetadataCache {
        self.cache
    }
}
