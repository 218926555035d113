//! Generic pages for common document shapes.
//!
//! These cover simple sites without writing a [`Page`](crate::Page)
//! implementation: HTML listings ([`HtmlListPage`]), HTML detail pages
//! ([`HtmlDetailPage`]), JSON APIs returning arrays ([`JsonListPage`]), CSV
//! tables ([`CsvListPage`]) and XML feeds ([`XmlListPage`]). The CLI builds
//! its workflows out of them.

mod csv;
mod html;
mod json;
mod xml;

pub use self::csv::{CSV_LIST, CsvListPage};
pub use html::{HTML_DETAIL, HTML_LIST, HtmlDetailPage, HtmlListPage};
pub use json::{JSON_LIST, JsonListPage};
pub use xml::{XML_LIST, XmlListPage};

use crate::{Error, Result};
use url::Url;

/// Resolve `link` against `base`, leaving it untouched when that is impossible.
pub(crate) fn absolutize(link: &str, base: Option<&Url>) -> String {
    base.and_then(|base| base.join(link).ok())
        .map_or_else(|| link.to_string(), String::from)
}

/// Resolve a pagination link into an absolute URL.
pub(crate) fn next_url(link: &str, base: Option<&Url>) -> Result<String> {
    if let Ok(url) = Url::parse(link) {
        return Ok(url.into());
    }
    let base = base.ok_or_else(|| {
        Error::Parse(format!(
            "next link '{link}' is relative and the page has no base URL"
        ))
    })?;
    base.join(link)
        .map(String::from)
        .map_err(|e| Error::Parse(format!("invalid next link '{link}': {e}")))
}

/// Collapse runs of whitespace into single spaces.
pub(crate) fn normalize_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
