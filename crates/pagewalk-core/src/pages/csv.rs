use crate::list::collect_items;
use crate::page::{Page, PageResult, ParseContext};
use crate::{Error, Result, Source};
use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Page kind of [`CsvListPage`].
pub const CSV_LIST: &str = "csv_list";

/// A CSV table: the first row names the columns, every later row becomes one
/// record keyed by those names.
///
/// Cells are trimmed. Rows shorter than the header get `null` for the missing
/// columns, rows with only empty cells are skipped and rows longer than the
/// header fail the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvListPage {
    /// Where the table lives.
    pub source: Source,
    /// Saved copy of the table for offline tests.
    #[serde(skip)]
    pub example: Option<Source>,
}

impl CsvListPage {
    /// Table at `source`.
    pub const fn new(source: Source) -> Self {
        Self {
            source,
            example: None,
        }
    }

    /// Use `source` when testing offline.
    #[must_use]
    pub fn with_example(mut self, source: Source) -> Self {
        self.example = Some(source);
        self
    }
}

fn row_record(headers: &StringRecord, row: &StringRecord, line: u64) -> Result<Value> {
    if row.len() > headers.len() {
        return Err(Error::Parse(format!(
            "CSV line {line} has {} fields, the header has {}",
            row.len(),
            headers.len()
        )));
    }
    if row.iter().all(str::is_empty) {
        return Err(Error::skip(format!("CSV line {line} is empty")));
    }
    let record: Map<String, Value> = headers
        .iter()
        .enumerate()
        .map(|(index, name)| (name.to_string(), row.get(index).map_or(Value::Null, Value::from)))
        .collect();
    Ok(Value::Object(record))
}

#[async_trait]
impl Page for CsvListPage {
    fn kind(&self) -> &'static str {
        CSV_LIST
    }

    fn input(&self) -> Value {
        let mut input = Map::new();
        input.insert("source".into(), self.source.to_value());
        Value::Object(input)
    }

    fn source(&self) -> Result<Source> {
        Ok(self.source.clone())
    }

    fn example_source(&self) -> Option<Source> {
        self.example.clone()
    }

    async fn parse(&self, ctx: &ParseContext<'_>) -> Result<PageResult> {
        let locator = &ctx.response.locator;
        let invalid = |e: csv::Error| Error::Parse(format!("invalid CSV in {locator}: {e}"));

        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(ctx.response.text()?.as_bytes());
        let headers = reader.headers().map_err(invalid)?.clone();
        if headers.is_empty() {
            return Err(Error::Parse(format!("CSV in {locator} has no header row")));
        }

        let items = collect_items(reader.records(), |row| {
            let row = row.map_err(invalid)?;
            let line = row.position().map_or(0, csv::Position::line);
            row_record(&headers, &row, line)
        })?;
        Ok(PageResult::Items(items))
    }
}
