use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum RawValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => Ok(()),
            RawValue::Bool(value) => write!(f, "{value}"),
            RawValue::Number(value) => write!(f, "{value}"),
            RawValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

/// A row is either keyed by header name or positional in header order.
/// A table never mixes the two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Row {
    Positional(Vec<RawValue>),
    Named(HashMap<String, RawValue>),
}

impl Row {
    pub fn named<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RawValue>,
    {
        Row::Named(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub id: Uuid,
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub notes: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Table {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            headers,
            rows,
            notes: String::new(),
            uploaded_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn summary(&self) -> TableSummary {
        TableSummary {
            id: self.id,
            name: self.name.clone(),
            row_count: self.rows.len(),
            column_count: self.headers.len(),
            notes: self.notes.clone(),
            uploaded_at: self.uploaded_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableSummary {
    pub id: Uuid,
    pub name: String,
    pub row_count: usize,
    pub column_count: usize,
    pub notes: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub active_table_id: Option<Uuid>,
    pub active_table_name: Option<String>,
    #[serde(default)]
    pub hidden_columns: HashMap<Uuid, Vec<String>>,
}

impl Settings {
    pub fn select(&mut self, table: &TableSummary) {
        self.active_table_id = Some(table.id);
        self.active_table_name = Some(table.name.clone());
    }

    pub fn clear_active(&mut self) {
        self.active_table_id = None;
        self.active_table_name = None;
    }

    pub fn hidden_for(&self, table_id: Uuid) -> &[String] {
        self.hidden_columns
            .get(&table_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn hide_column(&mut self, table_id: Uuid, column: &str) {
        let hidden = self.hidden_columns.entry(table_id).or_default();
        if !hidden.iter().any(|existing| existing == column) {
            hidden.push(column.to_string());
        }
    }

    pub fn show_column(&mut self, table_id: Uuid, column: &str) {
        if let Some(hidden) = self.hidden_columns.get_mut(&table_id) {
            hidden.retain(|existing| existing != column);
            if hidden.is_empty() {
                self.hidden_columns.remove(&table_id);
            }
        }
    }

    pub fn forget_table(&mut self, table_id: Uuid) {
        self.hidden_columns.remove(&table_id);
        if self.active_table_id == Some(table_id) {
            self.clear_active();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_deserialize_in_both_shapes() {
        let named: Row = serde_json::from_str(r#"{"Sync Status": "false", "J: Ad Spend": 5}"#)
            .unwrap();
        let positional: Row = serde_json::from_str(r#"["false", 5, null, true]"#).unwrap();

        match named {
            Row::Named(fields) => {
                assert_eq!(fields["Sync Status"], RawValue::Text("false".into()));
                assert_eq!(fields["J: Ad Spend"], RawValue::Number(5.0));
            }
            Row::Positional(_) => panic!("expected named row"),
        }
        assert_eq!(
            positional,
            Row::Positional(vec![
                RawValue::Text("false".into()),
                RawValue::Number(5.0),
                RawValue::Null,
                RawValue::Bool(true),
            ])
        );
    }

    #[test]
    fn raw_values_render_like_cell_text() {
        assert_eq!(RawValue::Number(1.0).to_string(), "1");
        assert_eq!(RawValue::Number(0.25).to_string(), "0.25");
        assert_eq!(RawValue::Bool(false).to_string(), "false");
        assert_eq!(RawValue::Null.to_string(), "");
    }

    #[test]
    fn forgetting_active_table_clears_selection() {
        let table = Table::new("march", vec!["A".into()], vec![]);
        let mut settings = Settings::default();
        settings.select(&table.summary());
        settings.hide_column(table.id, "A");

        settings.forget_table(table.id);

        assert_eq!(settings.active_table_id, None);
        assert_eq!(settings.active_table_name, None);
        assert!(settings.hidden_for(table.id).is_empty());
    }

    #[test]
    fn hiding_a_column_twice_keeps_one_entry() {
        let id = Uuid::new_v4();
        let mut settings = Settings::default();
        settings.hide_column(id, "G: Price");
        settings.hide_column(id, "G: Price");
        assert_eq!(settings.hidden_for(id), ["G: Price".to_string()]);

        settings.show_column(id, "G: Price");
        assert!(settings.hidden_columns.is_empty());
    }
}
