//! Workflow files.
//!
//! A workflow file declares the seed pages of a scrape and, optionally, the
//! detail page every listed item is scraped with. Relative file paths are
//! resolved against the directory of the workflow file.
//!
//! ```toml
//! [[seed]]
//! type = "html_list"
//! url = "https://example.com/bills"
//! selector = "ul.bills a"
//! next = "a.next"
//! example_file = "fixtures/bills.html"
//!
//! [[seed]]
//! type = "json_list"
//! url = "https://example.com/api/votes"
//! pointer = "/results"
//! next_pointer = "/links/next"
//!
//! [[seed]]
//! type = "csv_list"
//! file = "fixtures/members.csv"
//!
//! [[seed]]
//! type = "xml_list"
//! url = "https://example.com/hearings.rss"
//! element = "item"
//!
//! [item]
//! type = "html_detail"
//! url_field = "href"
//! required = ["title"]
//! example_file = "fixtures/bill.html"
//! example_input = { href = "https://example.com/bills/hb1" }
//!
//! [item.fields]
//! title = "h1"
//! pdf = "a.pdf@href"
//! ```

use anyhow::{Context, Result, bail};
use pagewalk_core::pages::{CsvListPage, HtmlDetailPage, HtmlListPage, JsonListPage, XmlListPage};
use pagewalk_core::{Page, PageFactory, Source, UrlRequest, Workflow};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::CliError;

/// Parsed workflow file plus the directory relative paths resolve against.
#[derive(Debug, Clone)]
pub struct WorkflowFile {
    spec: WorkflowSpec,
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
struct WorkflowSpec {
    #[serde(default, rename = "seed")]
    seeds: Vec<SeedSpec>,
    #[serde(default)]
    item: Option<ItemSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SeedKind {
    HtmlList,
    JsonList,
    CsvList,
    XmlList,
}

#[derive(Debug, Clone, Deserialize)]
struct SeedSpec {
    #[serde(rename = "type")]
    kind: SeedKind,
    #[serde(flatten)]
    location: Location,
    /// `html_list` entry selector.
    #[serde(default)]
    selector: Option<String>,
    /// `html_list` next-link selector.
    #[serde(default)]
    next: Option<String>,
    /// `json_list` array pointer.
    #[serde(default)]
    pointer: Option<String>,
    /// `json_list` next-URL pointer.
    #[serde(default)]
    next_pointer: Option<String>,
    /// `xml_list` entry element name.
    #[serde(default)]
    element: Option<String>,
    #[serde(flatten)]
    example: Example,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ItemKind {
    HtmlDetail,
}

#[derive(Debug, Clone, Deserialize)]
struct ItemSpec {
    #[serde(rename = "type")]
    kind: ItemKind,
    #[serde(default)]
    url_field: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, String>,
    #[serde(default)]
    required: Vec<String>,
    #[serde(default)]
    example_input: Option<Value>,
    #[serde(flatten)]
    example: Example,
}

/// Where a seed's content comes from; exactly one of `url`, `file`, `inline`.
#[derive(Debug, Clone, Default, Deserialize)]
struct Location {
    url: Option<String>,
    file: Option<PathBuf>,
    inline: Option<String>,
    method: Option<String>,
    data: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Example {
    example_file: Option<PathBuf>,
    example_inline: Option<String>,
}

impl WorkflowFile {
    /// Read and validate a workflow file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::not_found(anyhow::Error::new(e).context(format!(
                "Failed to read workflow {}",
                path.display()
            )))
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::parse(&content, base_dir).map_err(|e| CliError::usage(e).into())
    }

    /// Parse workflow TOML; relative paths resolve against `base_dir`.
    pub fn parse(content: &str, base_dir: PathBuf) -> Result<Self> {
        let spec: WorkflowSpec = toml::from_str(content).context("Invalid workflow file")?;
        if spec.seeds.is_empty() {
            bail!("Invalid workflow: at least one [[seed]] is required");
        }
        let file = Self { spec, base_dir };
        // Builds every page once so bad locations and selectors fail at load.
        for index in 0..file.spec.seeds.len() {
            file.seed(index)?;
        }
        file.item_page()?;
        Ok(file)
    }

    /// Number of seeds.
    pub fn seed_count(&self) -> usize {
        self.spec.seeds.len()
    }

    /// Build seed `index`.
    pub fn seed(&self, index: usize) -> Result<Box<dyn Page>> {
        let Some(spec) = self.spec.seeds.get(index) else {
            bail!(
                "Invalid value: workflow has {} seed(s), no seed {index}",
                self.seed_count()
            );
        };
        let source = self.source(&spec.location)?;
        let example = self.example(&spec.example)?;
        let page: Box<dyn Page> = match spec.kind {
            SeedKind::HtmlList => {
                let Some(selector) = &spec.selector else {
                    bail!("Invalid workflow: html_list seed {index} needs a selector");
                };
                let mut page = HtmlListPage::new(source, selector.clone());
                page.next.clone_from(&spec.next);
                page.example = example;
                if let Err(err) = page.validate() {
                    bail!("Invalid workflow: html_list seed {index}: {err}");
                }
                Box::new(page)
            },
            SeedKind::JsonList => {
                let mut page = JsonListPage::new(source);
                page.pointer.clone_from(&spec.pointer);
                page.next_pointer.clone_from(&spec.next_pointer);
                page.example = example;
                Box::new(page)
            },
            SeedKind::CsvList => {
                let mut page = CsvListPage::new(source);
                page.example = example;
                Box::new(page)
            },
            SeedKind::XmlList => {
                let Some(element) = spec.element.as_deref().filter(|e| !e.is_empty()) else {
                    bail!("Invalid workflow: xml_list seed {index} needs an element");
                };
                let mut page = XmlListPage::new(source, element);
                page.example = example;
                Box::new(page)
            },
        };
        Ok(page)
    }

    /// Factory for the item page, when the workflow has one.
    pub fn item_page(&self) -> Result<Option<PageFactory>> {
        let Some(spec) = &self.spec.item else {
            return Ok(None);
        };
        let ItemSpec {
            kind: ItemKind::HtmlDetail,
            url_field,
            fields,
            required,
            example_input,
            example,
        } = spec;

        if let Some(missing) = required.iter().find(|name| !fields.contains_key(*name)) {
            bail!("Invalid workflow: required field '{missing}' has no selector in [item.fields]");
        }

        let mut template = HtmlDetailPage {
            fields: fields.clone(),
            required: required.clone(),
            example: self.example(example)?,
            ..HtmlDetailPage::default()
        };
        if let Some(url_field) = url_field {
            template = template.with_url_field(url_field.clone());
        }
        if let Err(err) = template.validate() {
            bail!("Invalid workflow: [item.fields]: {err}");
        }

        let factory = template.factory();
        Ok(Some(match example_input {
            Some(input) => factory.with_example_input(input.clone()),
            None => factory,
        }))
    }

    /// Build the engine workflow.
    pub fn workflow(&self) -> Result<Workflow> {
        let seeds = (0..self.seed_count())
            .map(|index| self.seed(index))
            .collect::<Result<Vec<_>>>()?;
        let workflow = Workflow::new().with_seeds(seeds);
        Ok(match self.item_page()? {
            Some(factory) => workflow.with_item_page(factory),
            None => workflow,
        })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn source(&self, location: &Location) -> Result<Source> {
        let source = match (&location.url, &location.file, &location.inline) {
            (Some(url), None, None) => {
                let mut request = UrlRequest::get(url.clone());
                if let Some(method) = &location.method {
                    request.method = method.to_ascii_uppercase();
                }
                request.data.clone_from(&location.data);
                request.headers.clone_from(&location.headers);
                Source::Url(request)
            },
            (None, Some(file), None) => Source::file(self.resolve(file)),
            (None, None, Some(inline)) => Source::inline(inline.clone()),
            _ => bail!("Invalid workflow: each seed needs exactly one of url, file or inline"),
        };
        if !matches!(source, Source::Url(_))
            && (location.method.is_some() || location.data.is_some() || !location.headers.is_empty())
        {
            bail!("Invalid workflow: method, data and headers only apply to url seeds");
        }
        Ok(source)
    }

    fn example(&self, example: &Example) -> Result<Option<Source>> {
        Ok(match (&example.example_file, &example.example_inline) {
            (Some(file), None) => Some(Source::file(self.resolve(file))),
            (None, Some(inline)) => Some(Source::inline(inline.clone())),
            (None, None) => None,
            (Some(_), Some(_)) => {
                bail!("Invalid workflow: use either example_file or example_inline, not both")
            },
        })
    }
}
