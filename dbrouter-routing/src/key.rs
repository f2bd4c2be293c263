//! Routing-key extraction from an operation's arguments.
//!
//! Arguments that are records expose their fields through [`FieldSource`],
//! an explicit accessor implemented per record type. A record may name a
//! parent record whose fields are searched when its own lookup misses.

use std::collections::HashMap;

use crate::error::{RoutingError, RoutingResult};
use crate::value::RoutingValue;

/// Named-field access for a record passed to a routed operation.
pub trait FieldSource {
    /// Returns the value of `name`, or `None` if absent or unset.
    fn field(&self, name: &str) -> Option<RoutingValue>;

    /// Returns the record whose fields this one extends, if any.
    fn parent(&self) -> Option<&dyn FieldSource> {
        None
    }
}

/// One argument of a routed operation.
#[derive(Clone, Copy)]
pub enum Argument<'a> {
    /// A record searched by field name.
    Record(&'a dyn FieldSource),
    /// A parameter marked as the routing key. `None` when the caller passed
    /// no value.
    Key(Option<&'a RoutingValue>),
    /// Any other parameter; never consulted.
    Other,
}

impl std::fmt::Debug for Argument<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Record(_) => f.write_str("Record(..)"),
            Self::Key(value) => f.debug_tuple("Key").field(value).finish(),
            Self::Other => f.write_str("Other"),
        }
    }
}

/// Finds the routing key for an operation keyed by `field`.
///
/// Records are searched first, each up its parent chain. Failing that, the
/// first marked key argument with a value is used.
///
/// # Errors
/// Returns [`RoutingError::MissingRoutingKey`] if neither yields a value.
pub fn extract_routing_key(field: &str, args: &[Argument<'_>]) -> RoutingResult<RoutingValue> {
    if !field.is_empty() {
        let from_record = args.iter().find_map(|arg| match arg {
            Argument::Record(record) => lookup_field(*record, field),
            _ => None,
        });
        if let Some(value) = from_record {
            return Ok(value);
        }
    }

    args.iter()
        .find_map(|arg| match arg {
            Argument::Key(Some(value)) => Some((*value).clone()),
            _ => None,
        })
        .ok_or_else(|| RoutingError::MissingRoutingKey {
            field: field.to_string(),
        })
}

fn lookup_field(record: &dyn FieldSource, name: &str) -> Option<RoutingValue> {
    let mut current = Some(record);
    while let Some(source) = current {
        if let Some(value) = source.field(name) {
            return Some(value);
        }
        current = source.parent();
    }
    None
}

/// A map-backed record, for callers without a dedicated record type.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    values: HashMap<String, RoutingValue>,
    parent: Option<Box<Fields>>,
}

impl Fields {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RoutingValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Sets the parent record.
    #[must_use]
    pub fn extending(mut self, parent: Self) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }
}

impl FieldSource for Fields {
    fn field(&self, name: &str) -> Option<RoutingValue> {
        self.values.get(name).cloned()
    }

    fn parent(&self) -> Option<&dyn FieldSource> {
        self.parent.as_deref().map(|p| p as &dyn FieldSource)
    }
}
