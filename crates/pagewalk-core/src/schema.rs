//! Binding raw values to typed records.
//!
//! Pages produce loosely-typed [`serde_json::Value`]s. [`bind`] turns one into a
//! concrete record type through serde and then runs the type's own
//! [`Record::validate`] check. Every failure surfaces as [`Error::Validation`].

use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A structured record a page can produce or consume.
///
/// Primitive and collection types get a no-op validation through the blanket
/// set of impls below; domain records override [`Record::validate`].
pub trait Record: DeserializeOwned + Serialize {
    /// Reject values that deserialize but are not acceptable.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

macro_rules! plain_records {
    ($($ty:ty),* $(,)?) => {
        $(impl Record for $ty {})*
    };
}

plain_records!(
    bool,
    i32,
    i64,
    u16,
    u32,
    u64,
    usize,
    f64,
    String,
    Value,
);

impl<T: Record> Record for Vec<T> {
    fn validate(&self) -> Result<()> {
        self.iter().try_for_each(Record::validate)
    }
}

impl<T: Record> Record for Option<T> {
    fn validate(&self) -> Result<()> {
        self.as_ref().map_or(Ok(()), Record::validate)
    }
}

/// Deserialize and validate `value` as a `T`.
///
/// ```rust
/// use pagewalk_core::schema::{Record, bind};
/// use serde::{Deserialize, Serialize};
/// use serde_json::json;
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Legislator {
///     name: String,
///     district: u32,
/// }
///
/// impl Record for Legislator {}
///
/// let record: Legislator = bind(json!({"name": "Ada", "district": 4}))?;
/// assert_eq!(record.district, 4);
/// assert!(bind::<Legislator>(json!({"name": "Ada"})).is_err());
/// # Ok::<(), pagewalk_core::Error>(())
/// ```
pub fn bind<T: Record>(value: Value) -> Result<T> {
    let record: T = serde_json::from_value(value)
        .map_err(|e| Error::Validation(format!("cannot bind {}: {e}", short_type::<T>())))?;
    record.validate()?;
    Ok(record)
}

/// Serialize a record back into a raw value.
pub fn to_value<T: Record>(record: &T) -> Result<Value> {
    Ok(serde_json::to_value(record)?)
}

fn short_type<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
