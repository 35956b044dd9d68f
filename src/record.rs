//! In-memory tabular record set shared by every normalization stage.
//!
//! A [`RecordSet`] is a header row plus equally wide rows of [`Cell`]s. Raw
//! source tables, mapped tables, and normalized batches all use it; only the
//! header set and the value variants differ between stages.

use std::collections::HashSet;

use crate::{
    data::{Cell, render_cell},
    error::{IngestError, IngestResult},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl RecordSet {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> IngestResult<Self> {
        let mut set = Self::new(headers);
        for row in rows {
            set.push_row(row)?;
        }
        Ok(set)
    }

    /// Builds a record set with `rows` rows and no columns; columns are added
    /// afterwards through [`RecordSet::set_column`].
    pub fn with_row_count(rows: usize) -> Self {
        Self {
            headers: Vec::new(),
            rows: vec![Vec::new(); rows],
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> IngestResult<()> {
        if row.len() != self.headers.len() {
            return Err(IngestError::Schema(format!(
                "row {} has {} field(s) but the header declares {}",
                self.rows.len() + 1,
                row.len(),
                self.headers.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    pub fn cell(&self, row: usize, name: &str) -> Option<&Cell> {
        let idx = self.column_index(name)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// True when the column is missing or holds only nulls.
    pub fn column_is_null(&self, name: &str) -> bool {
        match self.column_index(name) {
            Some(idx) => self.rows.iter().all(|row| row[idx].is_none()),
            None => true,
        }
    }

    /// Replaces the column if it exists, otherwise appends it.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) -> IngestResult<()> {
        if values.len() != self.rows.len() {
            return Err(IngestError::Schema(format!(
                "column '{name}' has {} value(s) for {} row(s)",
                values.len(),
                self.rows.len()
            )));
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.headers.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    pub fn fill_column(&mut self, name: &str, value: Cell) -> IngestResult<()> {
        let values = vec![value; self.rows.len()];
        self.set_column(name, values)
    }

    pub fn column_values_mut(&mut self, name: &str) -> Option<impl Iterator<Item = &mut Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter_mut().map(move |row| &mut row[idx]))
    }

    /// Projects onto `columns` in the given order. Every column must exist.
    pub fn select(&self, columns: &[String]) -> IngestResult<RecordSet> {
        let indices = columns
            .iter()
            .map(|name| {
                self.column_index(name).ok_or_else(|| {
                    IngestError::Schema(format!("column '{name}' is missing from the record set"))
                })
            })
            .collect::<IngestResult<Vec<_>>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|idx| row[*idx].clone()).collect())
            .collect();
        Ok(RecordSet {
            headers: columns.to_vec(),
            rows,
        })
    }

    /// Removes rows that repeat an earlier row field for field, keeping the
    /// first occurrence. Returns the number of rows removed.
    pub fn drop_duplicate_rows(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen = HashSet::with_capacity(before);
        self.rows
            .retain(|row| seen.insert(row.iter().map(render_cell).collect::<Vec<_>>()));
        before - self.rows.len()
    }

    /// Text form of every row, nulls rendered as empty fields.
    pub fn rendered_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(render_cell).collect())
            .collect()
    }
}
