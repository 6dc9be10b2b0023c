use crate::core::{Result, Row, TrackError};
use crate::store::database::{Database, SaveUnit};
use crate::tracking::key::KeyValue;
use crate::tracking::state::EntityState;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;

/// Reference `Database` implementation: tables of rows keyed by primary key
/// value, one table per entity type.
///
/// Exists so the save protocol can be exercised end-to-end; it applies each
/// prepared unit as an insert, update or delete and counts affected rows.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, HashMap<KeyValue, Row>>>,
}

#[derive(Serialize)]
struct TableDump {
    name: String,
    rows: Vec<Row>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self, entity_type: &str) -> usize {
        self.tables
            .read()
            .map(|tables| tables.get(entity_type).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    pub fn get(&self, entity_type: &str, key: &KeyValue) -> Result<Option<Row>> {
        let tables = self.tables.read()?;
        Ok(tables
            .get(entity_type)
            .and_then(|table| table.get(key))
            .cloned())
    }

    /// Debug dump of the full store contents as JSON
    pub fn dump_json(&self) -> Result<String> {
        let tables = self.tables.read()?;
        let mut dump: Vec<TableDump> = tables
            .iter()
            .map(|(name, rows)| TableDump {
                name: name.clone(),
                rows: rows.values().cloned().collect(),
            })
            .collect();
        dump.sort_by(|a, b| a.name.cmp(&b.name));
        serde_json::to_string_pretty(&dump)
            .map_err(|e| TrackError::Store(anyhow::Error::new(e)))
    }

    fn apply(&self, entries: &[SaveUnit]) -> Result<usize> {
        let mut tables = self.tables.write()?;
        let mut affected = 0;

        for unit in entries {
            if unit.key.is_invalid() {
                return Err(TrackError::Store(anyhow::anyhow!(
                    "Save unit for '{}' carries an invalid key",
                    unit.entity_type
                )));
            }
            let table = tables.entry(unit.entity_type.clone()).or_default();
            match unit.state {
                EntityState::Added => {
                    if table.contains_key(&unit.key) {
                        return Err(TrackError::Store(anyhow::anyhow!(
                            "Duplicate row for '{}' key {}",
                            unit.entity_type,
                            unit.key
                        )));
                    }
                    table.insert(unit.key.clone(), unit.row.clone());
                    affected += 1;
                }
                EntityState::Modified => {
                    match table.get_mut(&unit.key) {
                        Some(row) => *row = unit.row.clone(),
                        None => {
                            return Err(TrackError::Store(anyhow::anyhow!(
                                "No row for '{}' key {}",
                                unit.entity_type,
                                unit.key
                            )));
                        }
                    }
                    affected += 1;
                }
                EntityState::Deleted => {
                    if table.remove(&unit.key).is_none() {
                        return Err(TrackError::Store(anyhow::anyhow!(
                            "No row for '{}' key {}",
                            unit.entity_type,
                            unit.key
                        )));
                    }
                    affected += 1;
                }
                other => {
                    return Err(TrackError::Store(anyhow::anyhow!(
                        "Save unit for '{}' is in state {}",
                        unit.entity_type,
                        other
                    )));
                }
            }
        }

        Ok(affected)
    }
}

#[async_trait]
impl Database for MemoryStore {
    fn save_changes(&self, entries: &[SaveUnit]) -> Result<usize> {
        self.apply(entries)
    }

    async fn save_changes_async(&self, entries: &[SaveUnit]) -> Result<usize> {
        self.apply(entries)
    }
}
