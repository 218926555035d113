use super::next_url;
use crate::list::collect_items;
use crate::page::{Page, PageResult, ParseContext};
use crate::{Error, Result, Source};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Kind of [`JsonListPage`].
pub const JSON_LIST: &str = "json_list";

/// A JSON document holding an array of records.
///
/// `pointer` (RFC 6901) locates the array inside the document; the document
/// itself must be the array when it is unset. `null` entries are skipped.
/// `next_pointer` locates a string with the URL of the next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonListPage {
    /// Where the document lives.
    pub source: Source,
    /// JSON pointer to the record array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    /// JSON pointer to the next page URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_pointer: Option<String>,
    /// Saved copy of the document for offline tests.
    #[serde(skip)]
    pub example: Option<Source>,
}

impl JsonListPage {
    /// Document at `source` that is itself the record array.
    pub const fn new(source: Source) -> Self {
        Self {
            source,
            pointer: None,
            next_pointer: None,
            example: None,
        }
    }

    /// Read records from the array at `pointer`.
    #[must_use]
    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.pointer = Some(pointer.into());
        self
    }

    /// Continue at the URL found at `pointer`.
    #[must_use]
    pub fn with_next_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.next_pointer = Some(pointer.into());
        self
    }

    /// Use `source` when testing offline.
    #[must_use]
    pub fn with_example(mut self, source: Source) -> Self {
        self.example = Some(source);
        self
    }

    fn records(&self, document: &Value, locator: &str) -> Result<Vec<Value>> {
        let list = match &self.pointer {
            Some(pointer) => document.pointer(pointer).ok_or_else(|| {
                Error::Parse(format!("{locator} has nothing at pointer '{pointer}'"))
            })?,
            None => document,
        };
        let entries = list.as_array().ok_or_else(|| {
            Error::Parse(format!(
                "{locator}: expected an array at '{}'",
                self.pointer.as_deref().unwrap_or("")
            ))
        })?;
        collect_items(entries, |entry| match entry {
            Value::Null => Err(Error::skip("null entry")),
            entry => Ok(entry.clone()),
        })
    }

    fn next_link(&self, document: &Value, base: Option<&Url>) -> Result<Option<String>> {
        let Some(pointer) = &self.next_pointer else {
            return Ok(None);
        };
        match document.pointer(pointer) {
            Some(Value::String(link)) if !link.is_empty() => next_url(link, base).map(Some),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl Page for JsonListPage {
    fn kind(&self) -> &'static str {
        JSON_LIST
    }

    fn input(&self) -> Value {
        let mut input = Map::new();
        input.insert("source".into(), self.source.to_value());
        if let Some(pointer) = &self.pointer {
            input.insert("pointer".into(), Value::from(pointer.as_str()));
        }
        if let Some(next_pointer) = &self.next_pointer {
            input.insert("next_pointer".into(), Value::from(next_pointer.as_str()));
        }
        Value::Object(input)
    }

    fn source(&self) -> Result<Source> {
        Ok(self.source.clone())
    }

    fn example_source(&self) -> Option<Source> {
        self.example.clone()
    }

    async fn parse(&self, ctx: &ParseContext<'_>) -> Result<PageResult> {
        let document: Value = ctx.response.json()?;
        let items = self.records(&document, &ctx.response.locator)?;
        let base = ctx.base_url().and_then(|url| Url::parse(url).ok());

        Ok(match self.next_link(&document, base.as_ref())? {
            Some(url) => PageResult::next_page(
                items,
                Self {
                    source: Source::url(url),
                    example: None,
                    ..self.clone()
                },
            ),
            None => PageResult::Items(items),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::testing::test_page;
    use serde_json::json;

    #[tokio::test]
    async fn test_pointer_and_next_link() {
        let body = json!({
            "data": {"results": [{"id": 1}, null, {"id": 2}]},
            "links": {"next": "https://api.test/bills?page=2"}
        });
        let page = JsonListPage::new(Source::url("https://api.test/bills"))
            .with_pointer("/data/results")
            .with_next_pointer("/links/next")
            .with_example(Source::inline(body.to_string()));

        let PageResult::NextPage { items, next } = test_page(&page).await.unwrap() else {
            panic!("expected a next page");
        };
        assert_eq!(items, vec![json!({"id": 1}), json!({"id": 2})]);
        assert_eq!(next.source().unwrap(), Source::url("https://api.test/bills?page=2"));
        assert_eq!(next.kind(), JSON_LIST);
    }

    #[tokio::test]
    async fn test_last_page_has_no_next() {
        let body = json!({"results": [1, 2, 3], "next": null});
        let page = JsonListPage::new(Source::inline(body.to_string()))
            .with_pointer("/results")
            .with_next_pointer("/next");
        let result = test_page(&page).await.unwrap();
        assert!(matches!(result, PageResult::Items(items) if items.len() == 3));
    }

    #[tokio::test]
    async fn test_non_array_is_parse_error() {
        let page = JsonListPage::new(Source::inline(r#"{"results": 3}"#)).with_pointer("/results");
        let err = test_page(&page).await.unwrap_err();
        assert_eq!(err.category(), "parse");

        let page = JsonListPage::new(Source::inline("{}")).with_pointer("/missing");
        let err = test_page(&page).await.unwrap_err();
        assert!(err.to_string().contains("/missing"));
    }

    #[test]
    fn test_post_bodies_give_distinct_inputs() {
        use crate::UrlRequest;
        use crate::page::PageKey;

        let search = |body: &str| {
            JsonListPage::new(Source::Url(UrlRequest::post("https://api.test/search", body)))
                .with_pointer("/results")
        };
        let first = search("session=2023");
        let second = search("session=2024");

        assert_eq!(first.input()["source"]["url"]["data"], "session=2023");
        assert_eq!(first.input()["pointer"], "/results");
        assert_ne!(PageKey::of(&first), PageKey::of(&second));
        assert_eq!(PageKey::of(&first), PageKey::of(&search("session=2023")));
    }
}
