use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row as _};
use uuid::Uuid;

use crate::models::{RawValue, Row, Settings, Table, TableSummary};

const SETTINGS_KEY: &str = "settings";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("table is too large to store ({bytes} bytes, limit {limit})")]
    TooLarge { bytes: usize, limit: usize },
    #[error("table {0} not found")]
    NotFound(Uuid),
    #[error("could not encode table: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("storage failure: {0}")]
    Backend(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait TableStore: Send + Sync {
    async fn get_table(&self, id: Uuid) -> Result<Option<Table>, StoreError>;
    async fn list_tables(&self) -> Result<Vec<TableSummary>, StoreError>;
    async fn put_table(&self, table: &Table) -> Result<Uuid, StoreError>;
    async fn delete_table(&self, id: Uuid) -> Result<(), StoreError>;
    async fn update_notes(&self, id: Uuid, notes: &str) -> Result<(), StoreError>;
    async fn load_settings(&self) -> Result<Settings, StoreError>;
    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError>;

    async fn get_active_table_id(&self) -> Result<Option<Uuid>, StoreError> {
        Ok(self.load_settings().await?.active_table_id)
    }

    async fn set_active_table_id(&self, id: Option<Uuid>) -> Result<(), StoreError> {
        let mut settings = self.load_settings().await?;
        match id {
            Some(id) => {
                let name = self.get_table(id).await?.ok_or(StoreError::NotFound(id))?.name;
                settings.active_table_id = Some(id);
                settings.active_table_name = Some(name);
            }
            None => settings.clear_active(),
        }
        self.save_settings(&settings).await
    }
}

pub fn check_capacity(table: &Table, limit: usize) -> Result<usize, StoreError> {
    let bytes = serde_json::to_vec(&table.rows)?.len() + serde_json::to_vec(&table.headers)?.len();
    if bytes > limit {
        return Err(StoreError::TooLarge { bytes, limit });
    }
    Ok(bytes)
}

pub struct PgStore {
    pool: PgPool,
    max_table_bytes: usize,
}

impl PgStore {
    pub fn new(pool: PgPool, max_table_bytes: usize) -> Self {
        Self {
            pool,
            max_table_bytes,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[async_trait]
impl TableStore for PgStore {
    async fn get_table(&self, id: Uuid) -> Result<Option<Table>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, headers, rows, notes, uploaded_at
            FROM bid_rca.tables
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let headers: Json<Vec<String>> = row.get("headers");
            let rows: Json<Vec<Row>> = row.get("rows");
            Table {
                id: row.get("id"),
                name: row.get("name"),
                headers: headers.0,
                rows: rows.0,
                notes: row.get("notes"),
                uploaded_at: row.get("uploaded_at"),
            }
        }))
    }

    async fn list_tables(&self) -> Result<Vec<TableSummary>, StoreError> {
        let records = sqlx::query(
            r#"
            SELECT id, name, row_count, jsonb_array_length(headers) AS column_count,
                   notes, uploaded_at
            FROM bid_rca.tables
            ORDER BY uploaded_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tables = Vec::with_capacity(records.len());
        for row in records {
            let row_count: i64 = row.get("row_count");
            let column_count: i32 = row.get("column_count");
            let uploaded_at: DateTime<Utc> = row.get("uploaded_at");
            tables.push(TableSummary {
                id: row.get("id"),
                name: row.get("name"),
                row_count: row_count.max(0) as usize,
                column_count: column_count.max(0) as usize,
                notes: row.get("notes"),
                uploaded_at,
            });
        }

        Ok(tables)
    }

    async fn put_table(&self, table: &Table) -> Result<Uuid, StoreError> {
        let bytes = check_capacity(table, self.max_table_bytes)?;
        log::debug!("storing table {} ({bytes} bytes)", table.id);

        sqlx::query(
            r#"
            INSERT INTO bid_rca.tables (id, name, headers, rows, row_count, notes, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, headers = EXCLUDED.headers, rows = EXCLUDED.rows,
                row_count = EXCLUDED.row_count, notes = EXCLUDED.notes
            "#,
        )
        .bind(table.id)
        .bind(&table.name)
        .bind(Json(&table.headers))
        .bind(Json(&table.rows))
        .bind(table.rows.len() as i64)
        .bind(&table.notes)
        .bind(table.uploaded_at)
        .execute(&self.pool)
        .await?;

        Ok(table.id)
    }

    async fn delete_table(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM bid_rca.tables WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }

        let mut settings = self.load_settings().await?;
        settings.forget_table(id);
        self.save_settings(&settings).await
    }

    async fn update_notes(&self, id: Uuid, notes: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE bid_rca.tables SET notes = $2 WHERE id = $1")
            .bind(id)
            .bind(notes)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn load_settings(&self) -> Result<Settings, StoreError> {
        let row = sqlx::query("SELECT value FROM bid_rca.settings WHERE key = $1")
            .bind(SETTINGS_KEY)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => {
                let value: Json<Settings> = row.get("value");
                value.0
            }
            None => Settings::default(),
        })
    }

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bid_rca.settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(SETTINGS_KEY)
        .bind(Json(settings))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<Uuid, Table>>,
    settings: Mutex<Settings>,
    max_table_bytes: usize,
}

impl MemoryStore {
    pub fn with_limit(max_table_bytes: usize) -> Self {
        Self {
            max_table_bytes,
            ..Self::default()
        }
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".to_string())
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn get_table(&self, id: Uuid) -> Result<Option<Table>, StoreError> {
        Ok(self.tables.lock().map_err(poisoned)?.get(&id).cloned())
    }

    async fn list_tables(&self) -> Result<Vec<TableSummary>, StoreError> {
        let tables = self.tables.lock().map_err(poisoned)?;
        let mut summaries: Vec<TableSummary> = tables.values().map(Table::summary).collect();
        summaries.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(summaries)
    }

    async fn put_table(&self, table: &Table) -> Result<Uuid, StoreError> {
        check_capacity(table, self.max_table_bytes)?;
        self.tables
            .lock()
            .map_err(poisoned)?
            .insert(table.id, table.clone());
        Ok(table.id)
    }

    async fn delete_table(&self, id: Uuid) -> Result<(), StoreError> {
        if self.tables.lock().map_err(poisoned)?.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        self.settings.lock().map_err(poisoned)?.forget_table(id);
        Ok(())
    }

    async fn update_notes(&self, id: Uuid, notes: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().map_err(poisoned)?;
        let table = tables.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        table.notes = notes.to_string();
        Ok(())
    }

    async fn load_settings(&self) -> Result<Settings, StoreError> {
        Ok(self.settings.lock().map_err(poisoned)?.clone())
    }

    async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        *self.settings.lock().map_err(poisoned)? = settings.clone();
        Ok(())
    }
}

/// Reads a report export into a positional table. Empty cells become `Null`.
pub fn import_csv(csv_path: &Path, name: &str) -> anyhow::Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .context("failed to read CSV header")?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("bad CSV record {}", line + 1))?;
        let mut values: Vec<RawValue> = record
            .iter()
            .map(|cell| {
                if cell.trim().is_empty() {
                    RawValue::Null
                } else {
                    RawValue::Text(cell.to_string())
                }
            })
            .collect();
        values.resize(headers.len(), RawValue::Null);
        rows.push(Row::Positional(values));
    }

    Ok(Table::new(name, headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample(name: &str) -> Table {
        Table::new(
            name,
            vec!["Sync Status".into(), "J: Ad Spend".into()],
            vec![Row::Positional(vec!["false".into(), "$3.00".into()])],
        )
    }

    #[tokio::test]
    async fn put_get_and_list() {
        let store = MemoryStore::with_limit(1 << 20);
        let table = sample("march");
        let id = store.put_table(&table).await.unwrap();

        let loaded = store.get_table(id).await.unwrap().unwrap();
        assert_eq!(loaded.rows, table.rows);
        let listed = store.list_tables().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].row_count, 1);
        assert!(store.get_table(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_tables_are_rejected_before_storing() {
        let store = MemoryStore::with_limit(16);
        let err = store.put_table(&sample("huge")).await.unwrap_err();
        assert!(matches!(err, StoreError::TooLarge { limit: 16, .. }));
        assert!(store.list_tables().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_active_table_clears_selection() {
        let store = MemoryStore::with_limit(1 << 20);
        let keep = sample("keep");
        let drop = sample("drop");
        store.put_table(&keep).await.unwrap();
        store.put_table(&drop).await.unwrap();

        store.set_active_table_id(Some(drop.id)).await.unwrap();
        assert_eq!(store.get_active_table_id().await.unwrap(), Some(drop.id));
        assert_eq!(
            store.load_settings().await.unwrap().active_table_name.as_deref(),
            Some("drop")
        );

        store.delete_table(drop.id).await.unwrap();
        assert_eq!(store.get_active_table_id().await.unwrap(), None);

        store.set_active_table_id(Some(keep.id)).await.unwrap();
        assert!(matches!(
            store.set_active_table_id(Some(drop.id)).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.get_active_table_id().await.unwrap(), Some(keep.id));
    }

    #[tokio::test]
    async fn notes_are_the_only_edit() {
        let store = MemoryStore::with_limit(1 << 20);
        let table = sample("notes");
        store.put_table(&table).await.unwrap();
        store.update_notes(table.id, "paused brand terms").await.unwrap();
        assert_eq!(
            store.get_table(table.id).await.unwrap().unwrap().notes,
            "paused brand terms"
        );
        assert!(store.update_notes(Uuid::new_v4(), "x").await.is_err());
    }

    #[test]
    fn imports_csv_as_positional_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Sync Status, J: Ad Spend ,G: Price").unwrap();
        writeln!(file, "false,\"$1,200.00\",19.99").unwrap();
        writeln!(file, "true,,").unwrap();
        writeln!(file, "true").unwrap();

        let table = import_csv(file.path(), "upload").unwrap();
        assert_eq!(table.headers, vec!["Sync Status", "J: Ad Spend", "G: Price"]);
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.rows[0],
            Row::Positional(vec!["false".into(), "$1,200.00".into(), "19.99".into()])
        );
        assert_eq!(
            table.rows[1],
            Row::Positional(vec!["true".into(), RawValue::Null, RawValue::Null])
        );
        assert_eq!(table.rows[2], table.rows[1]);
    }
}
