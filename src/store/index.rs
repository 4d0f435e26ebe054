//! Secondary indexes - SQLite-backed numeric bin indexes
//!
//! An index maps one numeric bin of every record in a (namespace, set) to
//! the record key. Entries live in `index_entries`, keyed so that a record
//! has at most one entry per index, and are ordered by
//! (partition, value, key) for range scans.
//!
//! New indexes start in [`IndexState::Building`] and are backfilled from the
//! existing records in pages before flipping to [`IndexState::Ready`].

use crate::store::error::{StoreError, StoreResult};
use crate::store::types::FlightRecord;
use crate::store::RecordStore;
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt;
use std::time::{Duration, Instant};

/// Definition of a numeric secondary index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub namespace: String,
    pub set_name: String,
    pub name: String,
    pub bin: String,
}

impl IndexSpec {
    pub fn numeric(
        namespace: impl Into<String>,
        set_name: impl Into<String>,
        name: impl Into<String>,
        bin: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            set_name: set_name.into(),
            name: name.into(),
            bin: bin.into(),
        }
    }
}

/// Build state of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Building,
    Ready,
}

impl IndexState {
    fn as_str(&self) -> &'static str {
        match self {
            IndexState::Building => "building",
            IndexState::Ready => "ready",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "building" => Some(IndexState::Building),
            "ready" => Some(IndexState::Ready),
            _ => None,
        }
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An index as recorded in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    pub spec: IndexSpec,
    pub state: IndexState,
}

/// Handle on an index build
#[derive(Debug, Clone)]
pub struct IndexTask {
    pub namespace: String,
    pub name: String,
}

impl IndexTask {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Block until the index is ready, polling every `poll_interval`
    pub async fn wait_till_complete(
        &self,
        store: &dyn RecordStore,
        timeout: Duration,
        poll_interval: Duration,
    ) -> StoreResult<()> {
        let started = Instant::now();

        loop {
            if store.index_state(&self.namespace, &self.name).await? == IndexState::Ready {
                tracing::debug!(
                    "Index {} ready after {}ms",
                    self.name,
                    started.elapsed().as_millis()
                );
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(StoreError::IndexTimeout {
                    name: self.name.clone(),
                    waited_ms: waited.as_millis() as u64,
                });
            }

            tokio::time::sleep(poll_interval.min(timeout - waited)).await;
        }
    }
}

/// Create catalog and entry tables
pub(crate) fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS indexes (
            namespace TEXT NOT NULL,
            name TEXT NOT NULL,
            set_name TEXT NOT NULL,
            bin TEXT NOT NULL,
            state TEXT NOT NULL,
            PRIMARY KEY (namespace, name)
        );

        CREATE TABLE IF NOT EXISTS index_entries (
            namespace TEXT NOT NULL,
            index_name TEXT NOT NULL,
            set_name TEXT NOT NULL,
            key TEXT NOT NULL,
            partition INTEGER NOT NULL,
            value INTEGER NOT NULL,
            PRIMARY KEY (namespace, index_name, set_name, key)
        );

        CREATE INDEX IF NOT EXISTS idx_entries_range
            ON index_entries(namespace, index_name, partition, value, key);
        ",
    )?;
    Ok(())
}

/// Look up an index by name
pub(crate) fn lookup(
    conn: &Connection,
    namespace: &str,
    name: &str,
) -> StoreResult<Option<IndexDefinition>> {
    let row = conn
        .query_row(
            "SELECT set_name, bin, state FROM indexes WHERE namespace = ? AND name = ?",
            params![namespace, name],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    row.map(|(set_name, bin, state)| {
        let state = IndexState::parse(&state).ok_or_else(|| {
            StoreError::Database(format!("index {} has unknown state {}", name, state))
        })?;
        Ok(IndexDefinition {
            spec: IndexSpec::numeric(namespace, set_name, name, bin),
            state,
        })
    })
    .transpose()
}

/// All indexes covering a set, in any state
pub(crate) fn indexes_for_set(
    conn: &Connection,
    namespace: &str,
    set_name: &str,
) -> StoreResult<Vec<IndexSpec>> {
    let mut stmt = conn.prepare_cached(
        "SELECT name, bin FROM indexes WHERE namespace = ? AND set_name = ? ORDER BY name",
    )?;
    let rows = stmt.query_map(params![namespace, set_name], |row| {
        Ok(IndexSpec::numeric(
            namespace,
            set_name,
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
        ))
    })?;

    let mut specs = Vec::new();
    for spec in rows {
        specs.push(spec?);
    }
    Ok(specs)
}

/// Add an index to the catalog in `Building` state
///
/// Returns the existing definition if an identical index is already present.
pub(crate) fn register(conn: &Connection, spec: &IndexSpec) -> StoreResult<Option<IndexDefinition>> {
    if let Some(existing) = lookup(conn, &spec.namespace, &spec.name)? {
        if existing.spec != *spec {
            return Err(StoreError::IndexMismatch(format!(
                "index {} already exists on {}.{}",
                spec.name, existing.spec.set_name, existing.spec.bin
            )));
        }
        return Ok(Some(existing));
    }

    conn.execute(
        "INSERT INTO indexes (namespace, name, set_name, bin, state) VALUES (?, ?, ?, ?, ?)",
        params![
            spec.namespace,
            spec.name,
            spec.set_name,
            spec.bin,
            IndexState::Building.as_str()
        ],
    )?;
    Ok(None)
}

pub(crate) fn mark_ready(conn: &Connection, namespace: &str, name: &str) -> StoreResult<()> {
    conn.execute(
        "UPDATE indexes SET state = ? WHERE namespace = ? AND name = ?",
        params![IndexState::Ready.as_str(), namespace, name],
    )?;
    Ok(())
}

/// Insert, replace or drop the entry of one record
///
/// Records without a value for the bin have no entry.
pub(crate) fn update_entry(
    conn: &Connection,
    spec: &IndexSpec,
    key: &str,
    partition: u32,
    record: &FlightRecord,
) -> StoreResult<()> {
    match record.numeric_bin(&spec.bin) {
        Some(value) => {
            let mut stmt = conn.prepare_cached(
                "INSERT OR REPLACE INTO index_entries
                 (namespace, index_name, set_name, key, partition, value)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?;
            stmt.execute(params![
                spec.namespace,
                spec.name,
                spec.set_name,
                key,
                partition,
                value
            ])?;
        }
        None => {
            let mut stmt = conn.prepare_cached(
                "DELETE FROM index_entries
                 WHERE namespace = ? AND index_name = ? AND set_name = ? AND key = ?",
            )?;
            stmt.execute(params![spec.namespace, spec.name, spec.set_name, key])?;
        }
    }
    Ok(())
}

/// Index one page of existing records with keys after `after_key`
///
/// Returns the last key indexed, or `None` when the set is exhausted.
pub(crate) fn backfill_page(
    conn: &Connection,
    spec: &IndexSpec,
    after_key: &str,
    page_size: usize,
) -> StoreResult<Option<String>> {
    let page: Vec<(String, u32, Vec<u8>)> = {
        let mut stmt = conn.prepare_cached(
            "SELECT key, partition, payload FROM records
             WHERE namespace = ? AND set_name = ? AND key > ?
             ORDER BY key LIMIT ?",
        )?;
        let rows = stmt.query_map(
            params![spec.namespace, spec.set_name, after_key, page_size as i64],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        rows.collect::<Result<_, _>>()?
    };

    let mut last = None;
    for (key, partition, payload) in page {
        let record: FlightRecord = bincode::deserialize(&payload)?;
        update_entry(conn, spec, &key, partition, &record)?;
        last = Some(key);
    }
    Ok(last)
}
