use crate::error::{BoxError, Error, Result};
use crate::value::Value;
use std::fmt;
use std::str::FromStr;

/// Setter receiving the raw column value.
pub type ValueSetter<T> = fn(&mut T, Value) -> Result<(), BoxError>;

/// Setter for an optional enum, receiving the column's string form or `None`
/// for NULL.
pub type EnumSetter<T> = fn(&mut T, Option<&str>) -> Result<(), BoxError>;

/// A type that rows can be mapped into.
///
/// `properties` is the registration step: it lists every public property of
/// the shape once. The [`MetadataCache`](crate::metadata::MetadataCache) calls
/// it at most once per cache and type.
///
/// ```
/// use rust_simple_access::{Entity, Property};
///
/// #[derive(Default)]
/// struct User {
///     id: i64,
///     name: Option<String>,
/// }
///
/// impl Entity for User {
///     fn properties() -> Vec<Property<Self>> {
///         vec![
///             Property::new("Id", |user: &mut User, value| {
///                 user.id = value.decode()?;
///                 Ok(())
///             }),
///             Property::new("Name", |user: &mut User, value| {
///                 user.name = value.decode()?;
///                 Ok(())
///             })
///             .column("user_name"),
///         ]
///     }
/// }
/// ```
pub trait Entity: Default + 'static {
    fn properties() -> Vec<Property<Self>>;
}

pub enum Binding<T> {
    Value(ValueSetter<T>),
    NullableEnum(EnumSetter<T>),
    ReadOnly,
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Binding<T> {}

/// One mappable property of an entity shape.
pub struct Property<T> {
    name: &'static str,
    column: Option<&'static str>,
    binding: Binding<T>,
}

impl<T> Property<T> {
    pub fn new(name: &'static str, setter: ValueSetter<T>) -> Self {
        Self {
            name,
            column: None,
            binding: Binding::Value(setter),
        }
    }

    /// Property typed as an optional enum. Non-null column values are handed
    /// to the setter in string form for name-based parsing.
    pub fn nullable_enum(name: &'static str, setter: EnumSetter<T>) -> Self {
        Self {
            name,
            column: None,
            binding: Binding::NullableEnum(setter),
        }
    }

    /// Property that is listed but never written.
    pub fn read_only(name: &'static str) -> Self {
        Self {
            name,
            column: None,
            binding: Binding::ReadOnly,
        }
    }

    /// Declare the database column that supplies this property.
    pub fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn column_alias(&self) -> Option<&'static str> {
        self.column
    }

    pub fn binding(&self) -> &Binding<T> {
        &self.binding
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self.binding, Binding::ReadOnly)
    }

    /// Assign `value` to this property on `target`.
    pub(crate) fn write(&self, target: &mut T, value: Value) -> Result<()> {
        let outcome = match self.binding {
            Binding::Value(set) => set(target, value),
            Binding::NullableEnum(set) => match value {
                Value::Null => set(target, None),
                other => set(target, Some(other.to_string().as_str())),
            },
            Binding::ReadOnly => return Ok(()),
        };
        outcome.map_err(|source| Error::property_write(self.name, source))
    }
}

impl<T> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let binding = match self.binding {
            Binding::Value(_) => "value",
            Binding::NullableEnum(_) => "nullable_enum",
            Binding::ReadOnly => "read_only",
        };
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("column", &self.column)
            .field("binding", &binding)
            .finish()
    }
}

/// Parse an optional enum from its string form, for use in [`EnumSetter`]s.
pub fn parse_enum<E>(value: Option<&str>) -> Result<Option<E>, BoxError>
where
    E: FromStr,
    E::Err: Into<BoxError>,
{
    value.map(str::parse).transpose().map_err(Into::into)
}
