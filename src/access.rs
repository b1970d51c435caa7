use std::collections::HashMap;

use crate::coerce;
use crate::models::{RawValue, Row, Table};

#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    pub fn new(headers: &[String]) -> Self {
        let mut positions = HashMap::with_capacity(headers.len());
        for (position, header) in headers.iter().enumerate() {
            // First occurrence wins for duplicated headers.
            positions.entry(header.clone()).or_insert(position);
        }
        Self { positions }
    }

    pub fn for_table(table: &Table) -> Self {
        Self::new(&table.headers)
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    pub fn row<'a>(&'a self, row: &'a Row) -> RowRef<'a> {
        RowRef { row, index: self }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnAccessor {
    column: String,
    position: Option<usize>,
}

impl ColumnAccessor {
    pub fn resolve(index: &HeaderIndex, column: &str) -> Self {
        Self {
            column: column.to_string(),
            position: index.position(column),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn get<'r>(&self, row: &'r Row) -> Option<&'r RawValue> {
        match row {
            Row::Named(fields) => fields.get(&self.column),
            Row::Positional(values) => self.position.and_then(|position| values.get(position)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    row: &'a Row,
    index: &'a HeaderIndex,
}

impl<'a> RowRef<'a> {
    pub fn get(&self, column: &str) -> Option<&'a RawValue> {
        match self.row {
            Row::Named(fields) => fields.get(column),
            Row::Positional(values) => self
                .index
                .position(column)
                .and_then(|position| values.get(position)),
        }
    }

    pub fn num(&self, column: &str) -> f64 {
        coerce::to_number(self.get(column))
    }

    pub fn text(&self, column: &str) -> String {
        self.get(column).map(RawValue::to_string).unwrap_or_default()
    }
}
