use super::normalize_text;
use crate::list::collect_items;
use crate::page::{Page, PageResult, ParseContext};
use crate::{Error, Result, Source};
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Page kind of [`XmlListPage`].
pub const XML_LIST: &str = "xml_list";

/// An XML feed: every element named `element` becomes one record.
///
/// A record holds the element's attributes, the text of each direct child
/// element under the child's name (first occurrence wins) and, when the
/// element has text of its own, a `text` field. Names are compared without
/// their namespace prefix. Elements that yield nothing are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlListPage {
    /// Where the document lives.
    pub source: Source,
    /// Local name of the list entries, e.g. `item` in an RSS feed.
    pub element: String,
    /// Saved copy of the document for offline tests.
    #[serde(skip)]
    pub example: Option<Source>,
}

impl XmlListPage {
    /// Document at `source` with entries named `element`.
    pub fn new(source: Source, element: impl Into<String>) -> Self {
        Self {
            source,
            element: element.into(),
            example: None,
        }
    }

    /// Use `source` when testing offline.
    #[must_use]
    pub fn with_example(mut self, source: Source) -> Self {
        self.example = Some(source);
        self
    }

    fn entries(&self, xml: &str, locator: &str) -> Result<Vec<Entry>> {
        let invalid = |e: quick_xml::Error| Error::Parse(format!("invalid XML in {locator}: {e}"));
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut entries = Vec::new();
        let mut current: Option<Entry> = None;
        let mut depth = 0usize;
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf).map_err(invalid)? {
                Event::Start(e) => {
                    depth += 1;
                    let name = local_name(&e);
                    match current.as_mut() {
                        None if name == self.element => {
                            current = Some(Entry::open(&e, depth, locator)?);
                        },
                        Some(entry) if depth == entry.depth + 1 => {
                            entry.child = Some((name, Vec::new()));
                        },
                        _ => {},
                    }
                },
                Event::Empty(e) => {
                    let name = local_name(&e);
                    match current.as_mut() {
                        None if name == self.element => {
                            entries.push(Entry::open(&e, depth + 1, locator)?);
                        },
                        Some(entry) if depth == entry.depth => {
                            entry.fields.entry(name).or_insert_with(|| Value::from(""));
                        },
                        _ => {},
                    }
                },
                Event::Text(e) => {
                    if let Some(entry) = current.as_mut() {
                        let text = e.unescape().map_err(invalid)?;
                        entry.push_text(depth, &text);
                    }
                },
                Event::CData(e) => {
                    if let Some(entry) = current.as_mut() {
                        let bytes = e.into_inner();
                        entry.push_text(depth, &String::from_utf8_lossy(&bytes));
                    }
                },
                Event::End(_) => {
                    if let Some(entry) = current.as_mut() {
                        if depth == entry.depth + 1 {
                            entry.close_child();
                        }
                    }
                    if current.as_ref().is_some_and(|entry| entry.depth == depth) {
                        entries.extend(current.take());
                    }
                    depth = depth.saturating_sub(1);
                },
                Event::Eof => break,
                _ => {},
            }
            buf.clear();
        }
        Ok(entries)
    }
}

/// One matched element while it is being read.
#[derive(Debug)]
struct Entry {
    name: String,
    depth: usize,
    fields: Map<String, Value>,
    text: Vec<String>,
    child: Option<(String, Vec<String>)>,
}

impl Entry {
    fn open(start: &BytesStart<'_>, depth: usize, locator: &str) -> Result<Self> {
        let mut fields = Map::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| Error::Parse(format!("invalid XML in {locator}: {e}")))?;
            let value = attr
                .unescape_value()
                .map_err(|e| Error::Parse(format!("invalid XML in {locator}: {e}")))?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            fields.insert(key, Value::from(value.into_owned()));
        }
        Ok(Self {
            name: local_name(start),
            depth,
            fields,
            text: Vec::new(),
            child: None,
        })
    }

    fn push_text(&mut self, depth: usize, text: &str) {
        if depth == self.depth {
            self.text.push(text.to_string());
        } else if let Some((_, parts)) = self.child.as_mut().filter(|_| depth == self.depth + 1) {
            parts.push(text.to_string());
        }
    }

    fn close_child(&mut self) {
        if let Some((name, parts)) = self.child.take() {
            let text = normalize_text(parts.iter().map(String::as_str));
            self.fields.entry(name).or_insert_with(|| Value::from(text));
        }
    }

    fn into_record(self) -> Result<Value> {
        let Self {
            name,
            mut fields,
            text,
            ..
        } = self;
        let text = normalize_text(text.iter().map(String::as_str));
        if !text.is_empty() {
            fields.insert("text".into(), Value::from(text));
        }
        if fields.is_empty() {
            return Err(Error::skip(format!("empty <{name}> element")));
        }
        Ok(Value::Object(fields))
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

#[async_trait]
impl Page for XmlListPage {
    fn kind(&self) -> &'static str {
        XML_LIST
    }

    fn input(&self) -> Value {
        let mut input = Map::new();
        input.insert("source".into(), self.source.to_value());
        input.insert("element".into(), Value::from(self.element.as_str()));
        Value::Object(input)
    }

    fn source(&self) -> Result<Source> {
        Ok(self.source.clone())
    }

    fn example_source(&self) -> Option<Source> {
        self.example.clone()
    }

    async fn parse(&self, ctx: &ParseContext<'_>) -> Result<PageResult> {
        let entries = self.entries(ctx.response.text()?, &ctx.response.locator)?;
        Ok(PageResult::Items(collect_items(entries, Entry::into_record)?))
    }
}
