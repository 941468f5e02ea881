//! Per-type property metadata and its cache.
//!
//! Both tables are keyed by lowercase strings so that column names match
//! property names regardless of case. Tables are immutable once built and are
//! handed out as `Arc`s.

use crate::entity::{Entity, Property};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Lowercased property name to property.
pub struct PropertyTable<T> {
    properties: Arc<[Property<T>]>,
    by_name: HashMap<String, usize>,
}

impl<T: Entity> PropertyTable<T> {
    /// Run the registration step of `T` and index the result.
    pub fn build() -> Self {
        Self::from_properties(T::properties())
    }
}

impl<T> PropertyTable<T> {
    pub fn from_properties(properties: Vec<Property<T>>) -> Self {
        let mut by_name = HashMap::with_capacity(properties.len());
        for (index, property) in properties.iter().enumerate() {
            let key = property.name().to_lowercase();
            if by_name.contains_key(&key) {
                tracing::warn!(
                    property = property.name(),
                    "duplicate property name ignored"
                );
                continue;
            }
            by_name.insert(key, index);
        }
        Self {
            properties: properties.into(),
            by_name,
        }
    }

    /// Look up by an already lowercased name.
    pub fn get(&self, name: &str) -> Option<&Property<T>> {
        self.by_name.get(name).map(|&index| &self.properties[index])
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn properties(&self) -> &[Property<T>] {
        &self.properties
    }
}

impl<T> fmt::Debug for PropertyTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyTable")
            .field("properties", &self.properties)
            .finish()
    }
}

/// Lowercased column alias to property. Only properties that declare a
/// column alias are present.
pub struct ColumnAliasTable<T> {
    properties: Arc<[Property<T>]>,
    by_column: HashMap<String, usize>,
}

impl<T> ColumnAliasTable<T> {
    pub fn from_property_table(table: &PropertyTable<T>) -> Self {
        let mut by_column = HashMap::new();
        for (index, property) in table.properties.iter().enumerate() {
            if let Some(column) = property.column_alias() {
                by_column.entry(column.to_lowercase()).or_insert(index);
            }
        }
        Self {
            properties: Arc::clone(&table.properties),
            by_column,
        }
    }

    /// Look up by an already lowercased column name.
    pub fn get(&self, column: &str) -> Option<&Property<T>> {
        self.by_column.get(column).map(|&index| &self.properties[index])
    }

    pub fn len(&self) -> usize {
        self.by_column.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_column.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_column.keys().map(String::as_str)
    }
}

impl<T> fmt::Debug for ColumnAliasTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.by_column
                    .iter()
                    .map(|(column, &index)| (column, self.properties[index].name())),
            )
            .finish()
    }
}

type Entry = Arc<dyn Any + Send + Sync>;

/// Cache of property and column alias tables, one pair per entity type.
///
/// Entries are built lazily and never evicted. Concurrent first requests for
/// the same type may both build a table; the first insert is kept and every
/// caller receives that instance.
#[derive(Default)]
pub struct MetadataCache {
    properties: RwLock<HashMap<TypeId, Entry>>,
    column_aliases: RwLock<HashMap<TypeId, Entry>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property_table<T: Entity>(&self) -> Arc<PropertyTable<T>> {
        let key = TypeId::of::<T>();
        if let Some(table) = lookup(&self.properties, key) {
            return table;
        }

        let table = Arc::new(PropertyTable::<T>::build());
        tracing::debug!(
            entity = type_name::<T>(),
            properties = table.len(),
            "built property table"
        );
        insert(&self.properties, key, table)
    }

    pub fn column_alias_table<T: Entity>(
        &self,
        properties: &PropertyTable<T>,
    ) -> Arc<ColumnAliasTable<T>> {
        let key = TypeId::of::<T>();
        if let Some(table) = lookup(&self.column_aliases, key) {
            return table;
        }

        let table = Arc::new(ColumnAliasTable::from_property_table(properties));
        tracing::debug!(
            entity = type_name::<T>(),
            aliases = table.len(),
            "built column alias table"
        );
        insert(&self.column_aliases, key, table)
    }

    /// Number of entity types with a cached property table.
    pub fn len(&self) -> usize {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataCache")
            .field("entities", &self.len())
            .finish()
    }
}

// Entries are immutable after insertion, so a poisoned lock still guards a
// consistent map.
fn lookup<V: Any + Send + Sync>(
    map: &RwLock<HashMap<TypeId, Entry>>,
    key: TypeId,
) -> Option<Arc<V>> {
    let guard = map.read().unwrap_or_else(PoisonError::into_inner);
    guard.get(&key).cloned()?.downcast::<V>().ok()
}

fn insert<V: Any + Send + Sync>(
    map: &RwLock<HashMap<TypeId, Entry>>,
    key: TypeId,
    value: Arc<V>,
) -> Arc<V> {
    let erased: Entry = value.clone();
    let mut guard = map.write().unwrap_or_else(PoisonError::into_inner);
    let entry = guard.entry(key).or_insert(erased).clone();
    entry.downcast::<V>().unwrap_or(value)
}
