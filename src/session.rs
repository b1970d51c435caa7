use uuid::Uuid;

use crate::aggregate::{self, GroupStatus};
use crate::db::{StoreError, TableStore};
use crate::models::Table;

#[derive(Debug, Clone)]
pub enum LoadState {
    NoSelection,
    Loading(Uuid),
    Ready(Table),
    Missing(Uuid),
    Failed { id: Uuid, message: String },
}

/// Issued by [`ActiveSession::begin_load`]; a result is only accepted while
/// its ticket is still the latest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    id: Uuid,
    generation: u64,
}

impl LoadTicket {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    Discarded,
}

#[derive(Debug)]
pub struct ActiveSession {
    active_id: Option<Uuid>,
    generation: u64,
    state: LoadState,
}

impl Default for ActiveSession {
    fn default() -> Self {
        Self {
            active_id: None,
            generation: 0,
            state: LoadState::NoSelection,
        }
    }
}

impl ActiveSession {
    pub fn new(active_id: Option<Uuid>) -> Self {
        Self {
            active_id,
            ..Self::default()
        }
    }

    pub fn active_id(&self) -> Option<Uuid> {
        self.active_id
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn table(&self) -> Option<&Table> {
        match &self.state {
            LoadState::Ready(table) => Some(table),
            _ => None,
        }
    }

    pub fn into_table(self) -> Option<Table> {
        match self.state {
            LoadState::Ready(table) => Some(table),
            _ => None,
        }
    }

    pub fn group_statuses(&self) -> Vec<(&'static str, GroupStatus)> {
        aggregate::group_statuses(self.table())
    }

    pub fn select(&mut self, id: Option<Uuid>) {
        self.active_id = id;
        self.generation += 1;
        self.state = LoadState::NoSelection;
    }

    pub fn begin_load(&mut self) -> Option<LoadTicket> {
        let id = self.active_id?;
        self.generation += 1;
        self.state = LoadState::Loading(id);
        Some(LoadTicket {
            id,
            generation: self.generation,
        })
    }

    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<Option<Table>, StoreError>,
    ) -> LoadOutcome {
        if ticket.generation != self.generation || Some(ticket.id) != self.active_id {
            log::debug!("discarding stale load of table {}", ticket.id);
            return LoadOutcome::Discarded;
        }

        self.state = match result {
            Ok(Some(table)) => {
                log::info!("loaded table {} ({} rows)", table.name, table.len());
                LoadState::Ready(table)
            }
            Ok(None) => LoadState::Missing(ticket.id),
            Err(err) => {
                log::warn!("loading table {} failed: {err}", ticket.id);
                LoadState::Failed {
                    id: ticket.id,
                    message: err.to_string(),
                }
            }
        };
        LoadOutcome::Applied
    }

    pub async fn load(&mut self, store: &dyn TableStore) -> &LoadState {
        if let Some(ticket) = self.begin_load() {
            let result = store.get_table(ticket.id()).await;
            self.finish_load(ticket, result);
        }
        &self.state
    }
}
