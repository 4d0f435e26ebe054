//! SQLite-backed record store
//!
//! - Write path: Key → partition → `records` upsert + index entries (one transaction)
//! - Read path: Statement → index range per partition → decode → map/reduce or stream
//!
//! The connection lives behind a `std::sync::Mutex`; scan workers run on the
//! blocking pool and hold the lock for one page at a time.

use crate::aggregate::{AggregateFunction, Contribution, GroupKey};
use crate::config::StoreConfig;
use crate::store::error::{StoreError, StoreResult};
use crate::store::index::{self, IndexSpec, IndexState, IndexTask};
use crate::store::stream::{PartialAggregate, QueryHandle, ScanItem, ScanSender};
use crate::store::types::{FunctionCall, Key, Statement};
use crate::store::{FlightRecord, RecordStore};
use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Name of the database file inside the data directory
pub const DB_FILE: &str = "flights.db";

fn lock(conn: &Mutex<Connection>) -> StoreResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| StoreError::Lock(format!("Failed to acquire store lock: {}", e)))
}

/// Local implementation of [`RecordStore`]
pub struct SqliteStore {
    /// Shared connection (std Mutex: used from blocking scan workers)
    conn: Arc<Mutex<Connection>>,
    /// Configuration
    config: StoreConfig,
    /// Partition count fixed when the database was created
    partitions: u32,
    /// Registered aggregate functions
    functions: RwLock<HashMap<FunctionCall, AggregateFunction>>,
    /// Indexes with a backfill running in this process
    builds: Arc<Mutex<HashSet<(String, String)>>>,
}

impl SqliteStore {
    /// Open or create the store under `config.data_dir`
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let dir = config.data_path();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(DB_FILE);

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = 10000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        Self::init_schema(&conn)?;
        let partitions = Self::stored_partitions(&conn, config.partitions.max(1))?;
        tracing::info!("Opened record store at {:?} ({} partitions)", path, partitions);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config: config.clone(),
            partitions,
            functions: RwLock::new(HashMap::new()),
            builds: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                namespace TEXT NOT NULL,
                set_name TEXT NOT NULL,
                key TEXT NOT NULL,
                partition INTEGER NOT NULL,
                payload BLOB NOT NULL,
                PRIMARY KEY (namespace, set_name, key)
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS meta (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        index::init_schema(conn)
    }

    /// Partition count of the database, recording `configured` on first open
    ///
    /// Records keep the partition they were written to, so the count cannot
    /// change once the database exists.
    fn stored_partitions(conn: &Connection, configured: u32) -> StoreResult<u32> {
        let stored: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE name = 'partitions'", [], |row| {
                row.get(0)
            })
            .optional()?;

        match stored {
            Some(value) => {
                let partitions: u32 = value.parse().map_err(|_| {
                    StoreError::Database(format!("invalid stored partition count '{}'", value))
                })?;
                if partitions != configured {
                    tracing::warn!(
                        "Store was created with {} partitions, ignoring configured {}",
                        partitions,
                        configured
                    );
                }
                Ok(partitions)
            }
            None => {
                conn.execute(
                    "INSERT INTO meta (name, value) VALUES ('partitions', ?)",
                    params![configured.to_string()],
                )?;
                Ok(configured)
            }
        }
    }

    /// Partition count in use
    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    /// Record, index and entry counts
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let conn = lock(&self.conn)?;
        let count = |sql: &str| -> StoreResult<u64> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };

        Ok(StoreStats {
            records: count("SELECT COUNT(*) FROM records")?,
            indexes: count("SELECT COUNT(*) FROM indexes")?,
            index_entries: count("SELECT COUNT(*) FROM index_entries")?,
        })
    }

    /// Start a backfill unless one is already running for this index
    fn spawn_build(&self, spec: IndexSpec) -> StoreResult<()> {
        let id = (spec.namespace.clone(), spec.name.clone());
        {
            let mut builds = self
                .builds
                .lock()
                .map_err(|e| StoreError::Lock(format!("Failed to acquire build lock: {}", e)))?;
            if !builds.insert(id.clone()) {
                return Ok(());
            }
        }

        let conn = Arc::clone(&self.conn);
        let guard = BuildGuard {
            builds: Arc::clone(&self.builds),
            id,
        };
        let page_size = self.config.page_size;

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            match build_index(&conn, &spec, page_size) {
                Ok(pages) => tracing::info!("Built index {} ({} pages)", spec.name, pages),
                Err(e) => tracing::error!("Index build for {} failed: {}", spec.name, e),
            }
        });

        Ok(())
    }
}

/// Releases a running-build slot when the build ends, even by panic
struct BuildGuard {
    builds: Arc<Mutex<HashSet<(String, String)>>>,
    id: (String, String),
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        // A poisoned set still holds the slot
        let mut builds = match self.builds.lock() {
            Ok(builds) => builds,
            Err(poisoned) => poisoned.into_inner(),
        };
        builds.remove(&self.id);
    }
}

/// Backfill every existing record of the set, then mark the index ready
fn build_index(conn: &Mutex<Connection>, spec: &IndexSpec, page_size: usize) -> StoreResult<usize> {
    let mut after = String::new();
    let mut pages = 0;

    loop {
        let mut guard = lock(conn)?;
        let tx = guard.transaction()?;
        let last = index::backfill_page(&tx, spec, &after, page_size)?;
        if last.is_none() {
            index::mark_ready(&tx, &spec.namespace, &spec.name)?;
        }
        tx.commit()?;

        match last {
            Some(key) => {
                after = key;
                pages += 1;
            }
            None => return Ok(pages),
        }
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn put(&self, key: &Key, record: &FlightRecord) -> StoreResult<()> {
        validate_key(key)?;
        let payload = bincode::serialize(record)?;
        let partition = key.partition(self.partitions);

        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO records (namespace, set_name, key, partition, payload)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            stmt.execute(params![
                key.namespace,
                key.set_name,
                key.user_key,
                partition,
                payload
            ])?;
        }
        for spec in index::indexes_for_set(&tx, &key.namespace, &key.set_name)? {
            index::update_entry(&tx, &spec, &key.user_key, partition, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn get(&self, key: &Key) -> StoreResult<Option<FlightRecord>> {
        let conn = lock(&self.conn)?;
        let payload: Option<Vec<u8>> = conn
            .query_row(
                "SELECT payload FROM records WHERE namespace = ? AND set_name = ? AND key = ?",
                params![key.namespace, key.set_name, key.user_key],
                |row| row.get(0),
            )
            .optional()?;

        payload
            .map(|bytes| bincode::deserialize(&bytes).map_err(StoreError::from))
            .transpose()
    }

    async fn create_index(&self, spec: IndexSpec) -> StoreResult<IndexTask> {
        let existing = {
            let conn = lock(&self.conn)?;
            index::register(&conn, &spec)?
        };
        let task = IndexTask::new(&spec.namespace, &spec.name);

        match existing {
            Some(def) if def.state == IndexState::Ready => {
                tracing::debug!("Index {} already exists", spec.name);
            }
            _ => {
                tracing::info!(
                    "Building index {} on {}.{}.{}",
                    spec.name,
                    spec.namespace,
                    spec.set_name,
                    spec.bin
                );
                self.spawn_build(spec)?;
            }
        }

        Ok(task)
    }

    async fn index_state(&self, namespace: &str, name: &str) -> StoreResult<IndexState> {
        let conn = lock(&self.conn)?;
        index::lookup(&conn, namespace, name)?
            .map(|def| def.state)
            .ok_or_else(|| StoreError::IndexNotFound(name.to_string()))
    }

    fn register_function(&self, function: AggregateFunction) -> StoreResult<()> {
        let call = FunctionCall::new(&function.module, &function.name);
        let mut functions = self
            .functions
            .write()
            .map_err(|e| StoreError::Lock(format!("Failed to acquire function lock: {}", e)))?;
        tracing::debug!("Registered aggregate function {}", call);
        functions.insert(call, function);
        Ok(())
    }

    async fn query(&self, statement: Statement) -> StoreResult<QueryHandle> {
        let def = {
            let conn = lock(&self.conn)?;
            index::lookup(&conn, &statement.namespace, &statement.index_name)?
        }
        .ok_or_else(|| StoreError::IndexNotFound(statement.index_name.clone()))?;

        if def.state != IndexState::Ready {
            return Err(StoreError::IndexNotReady(statement.index_name.clone()));
        }
        if def.spec.set_name != statement.set_name || def.spec.bin != statement.filter.bin {
            return Err(StoreError::IndexMismatch(format!(
                "index {} covers {}.{}, query asked for {}.{}",
                def.spec.name,
                def.spec.set_name,
                def.spec.bin,
                statement.set_name,
                statement.filter.bin
            )));
        }

        let function = match &statement.aggregate {
            Some(call) => {
                let functions = self.functions.read().map_err(|e| {
                    StoreError::Lock(format!("Failed to acquire function lock: {}", e))
                })?;
                let function = functions
                    .get(call)
                    .cloned()
                    .ok_or_else(|| StoreError::FunctionNotFound(call.to_string()))?;
                Some(function)
            }
            None => None,
        };

        let partitions = self.partitions;
        let workers = (self.config.scan_workers.max(1) as u32).min(partitions);
        let (tx, handle) = QueryHandle::channel(self.config.channel_capacity);
        let statement = Arc::new(statement);

        tracing::debug!(
            "Scanning {} partitions with {} workers on index {}",
            partitions,
            workers,
            statement.index_name
        );

        let mut scans = Vec::with_capacity(workers as usize);
        for worker in 0..workers {
            let scan = PartitionScan {
                conn: Arc::clone(&self.conn),
                statement: Arc::clone(&statement),
                function: function.clone(),
                page_size: self.config.page_size.max(1),
                tx: tx.clone(),
            };
            let owned: Vec<u32> = (0..partitions).filter(|p| p % workers == worker).collect();
            scans.push(tokio::task::spawn_blocking(move || scan.run(owned)));
        }

        // The channel only closes once every worker has been joined, and a
        // worker that died is reported as an error before it does.
        tokio::spawn(async move {
            for scan in scans {
                if let Err(e) = scan.await {
                    tracing::error!("Scan worker failed: {}", e);
                    let _ = tx.send(Err(StoreError::ScanAborted(e.to_string()))).await;
                }
            }
        });

        Ok(handle)
    }
}

fn validate_key(key: &Key) -> StoreResult<()> {
    if key.namespace.is_empty() || key.set_name.is_empty() || key.user_key.is_empty() {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// One scan worker
struct PartitionScan {
    conn: Arc<Mutex<Connection>>,
    statement: Arc<Statement>,
    function: Option<AggregateFunction>,
    page_size: usize,
    tx: ScanSender,
}

impl PartitionScan {
    fn run(self, partitions: Vec<u32>) {
        for partition in partitions {
            match self.scan_partition(partition) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("Query abandoned, worker stopping at partition {}", partition);
                    return;
                }
                Err(e) => {
                    let _ = self.tx.blocking_send(Err(e));
                    return;
                }
            }
        }
    }

    /// Returns `false` once the consumer has gone away
    fn scan_partition(&self, partition: u32) -> StoreResult<bool> {
        let mut cursor = (self.statement.filter.start, String::new());
        let mut groups: HashMap<GroupKey, Contribution> = HashMap::new();

        loop {
            if self.tx.is_closed() {
                return Ok(false);
            }

            let page = self.fetch_page(partition, &cursor)?;
            let exhausted = page.len() < self.page_size;

            for (value, key, payload) in page {
                let record: FlightRecord = bincode::deserialize(&payload)?;

                match &self.function {
                    Some(function) => {
                        if let Some((group, contribution)) = function.map(&record) {
                            groups
                                .entry(group)
                                .and_modify(|acc| *acc = function.reduce(*acc, contribution))
                                .or_insert(contribution);
                        }
                    }
                    None => {
                        if self
                            .tx
                            .blocking_send(Ok(ScanItem::Record(Box::new(record))))
                            .is_err()
                        {
                            return Ok(false);
                        }
                    }
                }

                cursor = (value, key);
            }

            if exhausted {
                break;
            }
        }

        if !groups.is_empty() {
            let partial = PartialAggregate { partition, groups };
            if self.tx.blocking_send(Ok(ScanItem::Partial(partial))).is_err() {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Next page of (value, key, payload) after the cursor, keyset-paginated
    fn fetch_page(
        &self,
        partition: u32,
        cursor: &(i64, String),
    ) -> StoreResult<Vec<(i64, String, Vec<u8>)>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare_cached(
            "SELECT e.value, e.key, r.payload FROM index_entries e
             JOIN records r
               ON r.namespace = e.namespace AND r.set_name = e.set_name AND r.key = e.key
             WHERE e.namespace = ?1 AND e.index_name = ?2 AND e.set_name = ?3
               AND e.partition = ?4
               AND e.value >= ?5 AND e.value <= ?6
               AND (e.value > ?7 OR (e.value = ?7 AND e.key > ?8))
             ORDER BY e.value, e.key
             LIMIT ?9",
        )?;

        let statement = &self.statement;
        let rows = stmt.query_map(
            params![
                statement.namespace,
                statement.index_name,
                statement.set_name,
                partition,
                statement.filter.start,
                statement.filter.end,
                cursor.0,
                cursor.1,
                self.page_size as i64
            ],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let page = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(page)
    }
}

/// Store statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub records: u64,
    pub indexes: u64,
    pub index_entries: u64,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Records: {}, Indexes: {}, Index entries: {}",
            self.records, self.indexes, self.index_entries
        )
    }
}
