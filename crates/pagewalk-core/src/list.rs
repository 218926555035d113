//! Helpers for list pages.

use crate::Result;
use serde_json::Value;
use tracing::debug;

/// Convert every raw element of a list into a record.
///
/// Elements whose conversion signals a skip are dropped with a debug log;
/// any other error aborts the whole list.
///
/// ```rust
/// use pagewalk_core::{Error, list::collect_items};
/// use serde_json::json;
///
/// let rows = vec!["Ada", "", "Grace"];
/// let items = collect_items(rows, |name| {
///     if name.is_empty() {
///         return Err(Error::skip("row without a name"));
///     }
///     Ok(json!({ "name": name }))
/// })?;
/// assert_eq!(items.len(), 2);
/// # Ok::<(), Error>(())
/// ```
pub fn collect_items<T, F>(elements: impl IntoIterator<Item = T>, mut convert: F) -> Result<Vec<Value>>
where
    F: FnMut(T) -> Result<Value>,
{
    let mut items = Vec::new();
    for (index, element) in elements.into_iter().enumerate() {
        match convert(element) {
            Ok(item) => items.push(item),
            Err(err) if err.is_skip() => debug!(index, reason = %err, "skipping list element"),
            Err(err) => return Err(err),
        }
    }
    Ok(items)
}
