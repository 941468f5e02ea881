//! Row to entity mapping.
//!
//! Columns are matched to properties by lowercased name, then by declared
//! column alias. The alias pass runs after the name pass has covered the whole
//! row, so an alias match is written last. Columns without a match are ignored.

use crate::cursor::Cursor;
use crate::entity::{Entity, Property};
use crate::error::{Error, Result};
use crate::metadata::{ColumnAliasTable, MetadataCache, PropertyTable};
use std::sync::Arc;

/// Properties to leave untouched for one mapping call.
///
/// Parsed from a comma separated, case-insensitive list and stored as
/// `",a,b,"` so that membership is a whole-token test.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipFields(String);

impl SkipFields {
    pub fn parse(csv: Option<&str>) -> Self {
        let tokens: Vec<String> = csv
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase)
            .collect();
        if tokens.is_empty() {
            Self::default()
        } else {
            Self(format!(",{},", tokens.join(",")))
        }
    }

    /// `name` must already be lowercase.
    pub fn contains(&self, name: &str) -> bool {
        !self.0.is_empty() && self.0.contains(&format!(",{name},"))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

enum AliasLookup<T> {
    Cached,
    Supplied(Arc<ColumnAliasTable<T>>),
    Disabled,
}

/// Per-call mapping options.
///
/// Tables that are not supplied come from the mapper's [`MetadataCache`].
pub struct MapOptions<'a, T> {
    skip_fields: Option<&'a str>,
    properties: Option<Arc<PropertyTable<T>>>,
    column_aliases: AliasLookup<T>,
}

impl<T> Default for MapOptions<'_, T> {
    fn default() -> Self {
        Self {
            skip_fields: None,
            properties: None,
            column_aliases: AliasLookup::Cached,
        }
    }
}

impl<'a, T> MapOptions<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Comma separated property names to leave untouched.
    pub fn skip_fields(mut self, csv: &'a str) -> Self {
        self.skip_fields = Some(csv);
        self
    }

    pub fn with_properties(mut self, table: Arc<PropertyTable<T>>) -> Self {
        self.properties = Some(table);
        self
    }

    pub fn with_column_aliases(mut self, table: Arc<ColumnAliasTable<T>>) -> Self {
        self.column_aliases = AliasLookup::Supplied(table);
        self
    }

    /// Match columns by property name only.
    pub fn without_column_aliases(mut self) -> Self {
        self.column_aliases = AliasLookup::Disabled;
        self
    }
}

/// Maps cursor rows into entities using a shared [`MetadataCache`].
#[derive(Debug, Clone, Copy)]
pub struct RowMapper<'c> {
    cache: &'c MetadataCache,
}

impl<'c> RowMapper<'c> {
    pub fn new(cache: &'c MetadataCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &'c MetadataCache {
        self.cache
    }

    /// Fill `target` from the row the cursor is positioned on.
    ///
    /// Fails with [`Error::CursorClosed`] without touching `target` when the
    /// cursor is closed. A failed property write aborts the call; properties
    /// written before it keep their new values.
    pub fn map_row<T, C>(
        &self,
        cursor: &C,
        target: &mut T,
        options: &MapOptions<'_, T>,
    ) -> Result<()>
    where
        T: Entity,
        C: Cursor + ?Sized,
    {
        if cursor.is_closed() {
            return Err(Error::CursorClosed);
        }
        let (properties, column_aliases) = self.resolve(options);
        map_row_with(
            cursor,
            target,
            &SkipFields::parse(options.skip_fields),
            &properties,
            column_aliases.as_deref(),
        )
    }

    /// Advance the cursor once and map that row into a new `T`.
    ///
    /// Returns `None` when the cursor has no further row.
    pub fn map_one_row<T, C>(
        &self,
        cursor: &mut C,
        options: &MapOptions<'_, T>,
    ) -> Result<Option<T>>
    where
        T: Entity,
        C: Cursor + ?Sized,
    {
        let (properties, column_aliases) = self.resolve(options);
        let skip = SkipFields::parse(options.skip_fields);

        if !cursor.read()? {
            return Ok(None);
        }
        let mut item = T::default();
        map_row_with(
            &*cursor,
            &mut item,
            &skip,
            &properties,
            column_aliases.as_deref(),
        )?;
        Ok(Some(item))
    }

    /// Map every remaining row into a new `T`, in row order.
    pub fn map_all_rows<T, C>(
        &self,
        cursor: &mut C,
        options: &MapOptions<'_, T>,
    ) -> Result<Vec<T>>
    where
        T: Entity,
        C: Cursor + ?Sized,
    {
        let (properties, column_aliases) = self.resolve(options);
        let skip = SkipFields::parse(options.skip_fields);

        let mut items = Vec::new();
        while cursor.read()? {
            let mut item = T::default();
            map_row_with(
                &*cursor,
                &mut item,
                &skip,
                &properties,
                column_aliases.as_deref(),
            )?;
            items.push(item);
        }
        Ok(items)
    }

    fn resolve<T: Entity>(
        &self,
        options: &MapOptions<'_, T>,
    ) -> (Arc<PropertyTable<T>>, Option<Arc<ColumnAliasTable<T>>>) {
        let properties = match &options.properties {
            Some(table) => Arc::clone(table),
            None => self.cache.property_table::<T>(),
        };
        let column_aliases = match (&options.column_aliases, &options.properties) {
            (AliasLookup::Supplied(table), _) => Some(Arc::clone(table)),
            (AliasLookup::Disabled, _) => None,
            // Aliases derived from a caller's table must not land in the cache
            (AliasLookup::Cached, Some(_)) => {
                Some(Arc::new(ColumnAliasTable::from_property_table(&properties)))
            }
            (AliasLookup::Cached, None) => Some(self.cache.column_alias_table(&properties)),
        };
        (properties, column_aliases)
    }
}

/// Fill `target` from the current row using explicit tables.
///
/// Name matches are written for every column before any alias match.
/// Alias matching is skipped when `column_aliases` is `None`.
pub fn map_row_with<T, C>(
    cursor: &C,
    target: &mut T,
    skip: &SkipFields,
    properties: &PropertyTable<T>,
    column_aliases: Option<&ColumnAliasTable<T>>,
) -> Result<()>
where
    C: Cursor + ?Sized,
{
    if cursor.is_closed() {
        return Err(Error::CursorClosed);
    }

    let columns: Vec<(usize, String)> = (0..cursor.field_count())
        .map(|index| (index, cursor.name(index).to_lowercase()))
        .filter(|(_, name)| !skip.contains(name))
        .collect();

    for (index, name) in &columns {
        if let Some(property) = properties.get(name) {
            assign(cursor, *index, target, property)?;
        }
    }

    if let Some(column_aliases) = column_aliases {
        for (index, name) in &columns {
            if let Some(property) = column_aliases.get(name) {
                assign(cursor, *index, target, property)?;
            }
        }
    }

    Ok(())
}

fn assign<T, C>(cursor: &C, index: usize, target: &mut T, property: &Property<T>) -> Result<()>
where
    C: Cursor + ?Sized,
{
    if !property.is_writable() {
        return Ok(());
    }
    tracing::trace!(
        column = cursor.name(index),
        property = property.name(),
        "loading value"
    );
    property.write(target, cursor.value(index))
}
