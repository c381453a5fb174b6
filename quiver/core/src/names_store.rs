use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use quiver_common::names::NameTables;
use quiver_common::types::{EdgeTypeId, LabelId, PropertyId};

use crate::error::DatabaseResult;

/// Durable name interning. WAL deltas reference labels, edge types and
/// properties by interned id, so the name → id assignment must be
/// reproduced exactly across restarts: every first-time interning is
/// appended (and synced) here before the id can reach any delta.
///
/// Line format: `<kind> <id> <name>`, append-only.
pub struct NameStore {
    tables: Arc<NameTables>,
    log: Option<Mutex<File>>,
}

const KIND_LABEL: &str = "L";
const KIND_EDGE_TYPE: &str = "E";
const KIND_PROPERTY: &str = "P";

impl NameStore {
    /// In-memory only (durability disabled).
    pub fn ephemeral() -> Self {
        Self {
            tables: Arc::new(NameTables::new()),
            log: None,
        }
    }

    pub fn open(directory: &Path) -> DatabaseResult<Self> {
        std::fs::create_dir_all(directory)?;
        let path = directory.join("names.log");
        let tables = NameTables::new();
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let mut entries: Vec<(String, u32, String)> = Vec::new();
            for line in reader.lines() {
                let line = line?;
                let mut parts = line.splitn(3, ' ');
                let (Some(kind), Some(id), Some(name)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    continue;
                };
                let Ok(id) = id.parse::<u32>() else { continue };
                entries.push((kind.to_string(), id, name.to_string()));
            }
            // Ids are assigned sequentially per kind; replay in id order
            // reproduces the original assignment.
            entries.sort_by_key(|(_, id, _)| *id);
            for (kind, id, name) in entries {
                let interned = match kind.as_str() {
                    KIND_LABEL => tables.labels.get_or_intern(&name),
                    KIND_EDGE_TYPE => tables.edge_types.get_or_intern(&name),
                    KIND_PROPERTY => tables.properties.get_or_intern(&name),
                    _ => continue,
                };
                debug_assert_eq!(interned, id, "name log replay out of order");
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            tables: Arc::new(tables),
            log: Some(Mutex::new(file)),
        })
    }

    pub fn tables(&self) -> &Arc<NameTables> {
        &self.tables
    }

    fn persist(&self, kind: &str, id: u32, name: &str) {
        if let Some(log) = &self.log {
            let mut file = log.lock();
            // Synced before the id can appear in any WAL delta.
            let _ = writeln!(file, "{kind} {id} {name}");
            let _ = file.sync_data();
        }
    }

    pub fn label_id(&self, name: &str) -> LabelId {
        let known = self.tables.labels.get(name).is_some();
        let id = self.tables.label_id(name);
        if !known {
            self.persist(KIND_LABEL, id.get(), name);
        }
        id
    }

    pub fn edge_type_id(&self, name: &str) -> EdgeTypeId {
        let known = self.tables.edge_types.get(name).is_some();
        let id = self.tables.edge_type_id(name);
        if !known {
            self.persist(KIND_EDGE_TYPE, id.get(), name);
        }
        id
    }

    pub fn property_id(&self, name: &str) -> PropertyId {
        let known = self.tables.properties.get(name).is_some();
        let id = self.tables.property_id(name);
        if !known {
            self.persist(KIND_PROPERTY, id, name);
        }
        id
    }
}
