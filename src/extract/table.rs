//! Positional tabular values
//!
//! Tables are read without inferring column names. Callers bind names by
//! position afterwards; extra cells are dropped and missing cells become null.

use scraper::{ElementRef, Selector};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::{Map, Value};

use super::selector::clean_text;

/// A JSON object row
pub type Record = Map<String, Value>;

/// Raw rows of cell text, in page order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Widest row length
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Appends another table's rows below this one
    pub fn append(&mut self, other: Table) {
        self.rows.extend(other.rows);
    }

    /// Reads the first `<table>` at or below `element`
    ///
    /// Rows made only of `<th>` cells are header rows and are skipped.
    /// Returns `None` when there is no table in the fragment.
    pub fn from_element(element: ElementRef<'_>) -> Option<Table> {
        let table = if element.value().name() == "table" {
            element
        } else {
            let selector = Selector::parse("table").ok()?;
            element.select(&selector).next()?
        };

        let row_selector = Selector::parse("tr").ok()?;
        let mut rows = Vec::new();

        for row in table.select(&row_selector) {
            let cells: Vec<ElementRef<'_>> = row
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .collect();

            if cells.is_empty() || cells.iter().all(|c| c.value().name() == "th") {
                continue;
            }

            rows.push(
                cells
                    .iter()
                    .map(|c| clean_text(&c.text().collect::<String>(), false))
                    .collect(),
            );
        }

        Some(Table { rows })
    }

    /// Assigns column names by position
    ///
    /// Cells beyond `columns.len()` are dropped; rows shorter than the column
    /// list are padded with nulls.
    pub fn bind_columns(&self, columns: &[&str]) -> NamedTable {
        if self.width() != columns.len() && !self.is_empty() {
            tracing::debug!(
                "Binding {} column names to table of width {}",
                columns.len(),
                self.width()
            );
        }

        let rows = self
            .rows
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|i| row.get(i).cloned())
                    .collect::<Vec<Option<String>>>()
            })
            .collect();

        NamedTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }
}

/// Table with caller-assigned column names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedTable {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl NamedTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Rewrites every non-null cell of a column
    pub fn map_column<F>(&mut self, column: &str, f: F)
    where
        F: Fn(&str) -> String,
    {
        let Some(idx) = self.columns.iter().position(|c| c == column) else {
            return;
        };
        for row in &mut self.rows {
            if let Some(Some(cell)) = row.get_mut(idx) {
                *cell = f(cell);
            }
        }
    }

    /// Rows as JSON objects keyed by column name
    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(name, cell)| {
                        let value = match cell {
                            Some(text) => Value::String(text.clone()),
                            None => Value::Null,
                        };
                        (name.clone(), value)
                    })
                    .collect()
            })
            .collect()
    }
}

impl Serialize for NamedTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let records = self.to_records();
        let mut seq = serializer.serialize_seq(Some(records.len()))?;
        for record in &records {
            seq.serialize_element(record)?;
        }
        seq.end()
    }
}
