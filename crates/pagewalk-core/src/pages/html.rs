use super::{absolutize, next_url, normalize_text};
use crate::list::collect_items;
use crate::page::{Page, PageFactory, PageResult, ParseContext};
use crate::{Error, Result, Source};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use url::Url;

/// Kind of [`HtmlListPage`].
pub const HTML_LIST: &str = "html_list";
/// Kind of [`HtmlDetailPage`].
pub const HTML_DETAIL: &str = "html_detail";

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| Error::Config(format!("invalid CSS selector '{selector}': {e:?}")))
}

fn base_of(ctx: &ParseContext<'_>) -> Option<Url> {
    ctx.base_url().and_then(|url| Url::parse(url).ok())
}

/// A listing: every element matching `selector` becomes one record.
///
/// Records look like `{"text": .., "href": .., "attrs": {..}}`; `href` is only
/// present on links and is made absolute against the page URL. When `next`
/// is set and matches a link, the listing continues on that page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlListPage {
    /// Where the listing lives.
    pub source: Source,
    /// CSS selector of the list entries.
    pub selector: String,
    /// CSS selector of the link to the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    /// Saved copy of the listing for offline tests.
    #[serde(skip)]
    pub example: Option<Source>,
}

impl HtmlListPage {
    /// Listing at `source` with entries matching `selector`.
    pub fn new(source: Source, selector: impl Into<String>) -> Self {
        Self {
            source,
            selector: selector.into(),
            next: None,
            example: None,
        }
    }

    /// Follow the link matching `selector` to the next page.
    #[must_use]
    pub fn with_next(mut self, selector: impl Into<String>) -> Self {
        self.next = Some(selector.into());
        self
    }

    /// Use `source` when testing offline.
    #[must_use]
    pub fn with_example(mut self, source: Source) -> Self {
        self.example = Some(source);
        self
    }

    /// Check that the entry and next-link selectors compile.
    pub fn validate(&self) -> Result<()> {
        compile(&self.selector)?;
        if let Some(next) = &self.next {
            compile(next)?;
        }
        Ok(())
    }

    fn extract(&self, document: &Html, base: Option<&Url>) -> Result<(Vec<Value>, Option<String>)> {
        let entries = compile(&self.selector)?;
        let items = collect_items(document.select(&entries), |element| {
            entry_record(element, base)
        })?;

        let next = match &self.next {
            Some(selector) => {
                let selector = compile(selector)?;
                document
                    .select(&selector)
                    .find_map(|element| element.value().attr("href"))
                    .map(|href| next_url(href, base))
                    .transpose()?
            },
            None => None,
        };
        Ok((items, next))
    }
}

fn entry_record(element: ElementRef<'_>, base: Option<&Url>) -> Result<Value> {
    let text = normalize_text(element.text());
    let href = element.value().attr("href").map(|href| absolutize(href, base));
    if text.is_empty() && href.is_none() {
        return Err(Error::skip(format!("empty <{}> entry", element.value().name())));
    }

    let attrs: Map<String, Value> = element
        .value()
        .attrs()
        .filter(|(name, _)| *name != "href")
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect();

    let mut record = json!({ "text": text, "attrs": attrs });
    if let Some(href) = href {
        record["href"] = Value::String(href);
    }
    Ok(record)
}

#[async_trait]
impl Page for HtmlListPage {
    fn kind(&self) -> &'static str {
        HTML_LIST
    }

    fn input(&self) -> Value {
        let mut input = Map::new();
        input.insert("source".into(), self.source.to_value());
        input.insert("selector".into(), Value::from(self.selector.as_str()));
        if let Some(next) = &self.next {
            input.insert("next".into(), Value::from(next.as_str()));
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
        let base = base_of(ctx);
        let document = ctx.response.html()?;
        let (items, next) = self.extract(&document, base.as_ref())?;

        Ok(match next {
            Some(url) => PageResult::next_page(
                items,
                Self {
                    source: Source::url(url),
                    selector: self.selector.clone(),
                    next: self.next.clone(),
                    example: None,
                },
            ),
            None => PageResult::Items(items),
        })
    }
}

/// A detail page: one record per input.
///
/// The page URL is read from the `url_field` of its input (or the input itself
/// when it is a string). Each entry of `fields` maps a record field to a CSS
/// selector; `selector@attr` extracts an attribute instead of the text. The
/// record is the input object with the extracted fields added. A page missing
/// one of its `required` fields is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlDetailPage {
    /// Input this page was built from.
    #[serde(default)]
    pub input: Value,
    /// Input field holding the page URL.
    #[serde(default = "default_url_field")]
    pub url_field: String,
    /// Record field name to selector.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Fields that must be found.
    #[serde(default)]
    pub required: Vec<String>,
    /// Saved copy of a detail page for offline tests.
    #[serde(skip)]
    pub example: Option<Source>,
}

fn default_url_field() -> String {
    "href".to_string()
}

impl Default for HtmlDetailPage {
    fn default() -> Self {
        Self {
            input: Value::Null,
            url_field: default_url_field(),
            fields: BTreeMap::new(),
            required: Vec::new(),
            example: None,
        }
    }
}

impl HtmlDetailPage {
    /// Extract `name` from the first element matching `selector`.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, selector: impl Into<String>) -> Self {
        self.fields.insert(name.into(), selector.into());
        self
    }

    /// Skip pages where `name` is not found.
    #[must_use]
    pub fn require(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Read the page URL from `field` of the input.
    #[must_use]
    pub fn with_url_field(mut self, field: impl Into<String>) -> Self {
        self.url_field = field.into();
        self
    }

    /// Use `source` when testing offline.
    #[must_use]
    pub fn with_example(mut self, source: Source) -> Self {
        self.example = Some(source);
        self
    }

    /// Copy of this page bound to `input`.
    #[must_use]
    pub fn with_input(&self, input: Value) -> Self {
        Self {
            input,
            ..self.clone()
        }
    }

    /// Factory building copies of this page from item inputs.
    pub fn factory(self) -> PageFactory {
        PageFactory::new(HTML_DETAIL, move |input| self.with_input(input))
    }

    /// Check that every field selector compiles.
    pub fn validate(&self) -> Result<()> {
        for spec in self.fields.values() {
            compile(field_selector(spec).0)?;
        }
        Ok(())
    }

    fn extract(&self, document: &Html, base: Option<&Url>) -> Result<Map<String, Value>> {
        let mut found = Map::new();
        for (name, spec) in &self.fields {
            let (selector, attr) = field_selector(spec);
            let selector = compile(selector)?;
            let value = document.select(&selector).find_map(|element| match attr {
                Some(attr) => element
                    .value()
                    .attr(attr)
                    .map(|value| absolutize_attr(attr, value, base)),
                None => Some(normalize_text(element.text())).filter(|text| !text.is_empty()),
            });
            if let Some(value) = value {
                found.insert(name.clone(), Value::String(value));
            }
        }
        Ok(found)
    }
}

/// Split `selector@attr` into its selector and attribute.
fn field_selector(spec: &str) -> (&str, Option<&str>) {
    match spec.rsplit_once('@') {
        Some((selector, attr)) => (selector, Some(attr)),
        None => (spec, None),
    }
}

fn absolutize_attr(attr: &str, value: &str, base: Option<&Url>) -> String {
    if matches!(attr, "href" | "src") {
        absolutize(value, base)
    } else {
        value.to_string()
    }
}

#[async_trait]
impl Page for HtmlDetailPage {
    fn kind(&self) -> &'static str {
        HTML_DETAIL
    }

    fn input(&self) -> Value {
        self.input.clone()
    }

    fn source(&self) -> Result<Source> {
        let url = match &self.input {
            Value::String(url) => Some(url.as_str()),
            input => input.get(&self.url_field).and_then(Value::as_str),
        };
        url.map(Source::url).ok_or_else(|| {
            Error::MissingSource(format!(
                "{HTML_DETAIL} input has no '{}' field",
                self.url_field
            ))
        })
    }

    fn example_source(&self) -> Option<Source> {
        self.example.clone()
    }

    async fn parse(&self, ctx: &ParseContext<'_>) -> Result<PageResult> {
        let base = base_of(ctx);
        let document = ctx.response.html()?;
        let fields = self.extract(&document, base.as_ref())?;

        if let Some(missing) = self.required.iter().find(|name| !fields.contains_key(*name)) {
            return Err(Error::skip(format!("required field '{missing}' not found")));
        }

        let mut record = match &self.input {
            Value::Object(input) => input.clone(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert(self.url_field.clone(), other.clone());
                map
            },
        };
        record.extend(fields);
        Ok(PageResult::Item(Value::Object(record)))
    }
}
