//! SQLite-backed bitemporal memory store
//!
//! Every public operation runs its SQL on a blocking thread against one
//! shared connection, and every write is a single transaction. Bulk variants
//! wrap all member writes in one transaction, so a failing member leaves no
//! partial state.
//!
//! Each create and update appends a JSON snapshot to `memory_history`.
//! A store returned by [`MemoryStore::as_of`] shows memories recorded at or
//! before the timestamp in the state they had at that time; one returned by
//! [`MemoryStore::valid_at`] shows memories whose valid-time window contains
//! the timestamp. Scoped views share the connection and never bump access
//! tracking.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{LoreError, Result};
use crate::memory::content::MemoryContent;
use crate::memory::links::{
    Citation, EntityLink, FileLink, LinkKind, MemoryLinks, RelatedMemory, Relationship,
    RelationshipKind,
};
use crate::memory::types::{Importance, Memory, TransactionTime, ValidTime};
use crate::storage::filter::{MemoryQuery, SearchOrder};
use crate::storage::patch::MemoryUpdate;
use crate::storage::schema::{configure_connection, initialize_schema};
use crate::storage::vector::{SqliteVectorIndex, VectorBackend};

/// Upper bound on relationship traversal depth
pub const MAX_TRAVERSAL_DEPTH: usize = 5;

/// Archive reason recorded by a plain soft delete
pub const DELETED_REASON: &str = "deleted";

const MEMORY_COLUMNS: &str = "m.id, m.type, m.content, m.summary, m.confidence, m.importance, \
     m.recorded_at, m.valid_from, m.valid_until, m.created_at, m.updated_at, m.access_count, \
     m.last_accessed, m.last_validated, m.archived, m.archive_reason, m.superseded_by, m.supersedes";

/// Attach an operation name to rusqlite errors
pub(crate) trait SqlContext<T> {
    fn ctx(self, op: &str) -> Result<T>;
}

impl<T> SqlContext<T> for rusqlite::Result<T> {
    fn ctx(self, op: &str) -> Result<T> {
        self.map_err(|e| LoreError::storage(op, e))
    }
}

/// RFC 3339, microsecond precision, `Z` suffix: sorts lexicographically in time order
pub fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(idx, &s)).transpose()
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

/// Run `f` against the shared connection on a blocking thread
pub(crate) async fn run_blocking<F, T>(
    conn: &Arc<Mutex<Connection>>,
    op: &'static str,
    f: F,
) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let mut guard = conn
            .lock()
            .map_err(|e| LoreError::Task(format!("{op}: connection lock poisoned: {e}")))?;
        f(&mut guard)
    })
    .await
    .map_err(|e| LoreError::Task(format!("{op}: {e}")))?
}

/// Temporal predicate attached to a store view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemporalScope {
    /// Latest state of every memory
    #[default]
    Current,
    /// Transaction time: what the store knew at this instant
    AsOf(DateTime<Utc>),
    /// Valid time: facts true in the world at this instant
    ValidAt(DateTime<Utc>),
}

impl TemporalScope {
    fn clause(&self) -> Option<(String, Vec<Value>)> {
        match self {
            TemporalScope::Current => None,
            TemporalScope::AsOf(at) => Some((
                "m.recorded_at <= ?".to_string(),
                vec![Value::Text(format_ts(at))],
            )),
            TemporalScope::ValidAt(at) => {
                let at = format_ts(at);
                Some((
                    "COALESCE(m.valid_from, m.recorded_at) <= ? \
                     AND (m.valid_until IS NULL OR m.valid_until > ?)"
                        .to_string(),
                    vec![Value::Text(at.clone()), Value::Text(at)],
                ))
            }
        }
    }
}

/// Connection and vector settings for opening a store
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub busy_timeout: Duration,
    pub vector_enabled: bool,
    pub vector_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
            vector_enabled: true,
            vector_timeout: Duration::from_millis(2000),
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            busy_timeout: Duration::from_millis(config.storage.busy_timeout_ms),
            vector_enabled: config.vector.enabled,
            vector_timeout: Duration::from_millis(config.vector.timeout_ms),
        }
    }
}

/// Where a similarity hit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilaritySource {
    Vector,
    /// No usable vector backend; ordered by recent activity, similarity is 0
    RecencyFallback,
}

#[derive(Debug, Clone)]
pub struct SimilarityHit {
    pub memory: Memory,
    pub similarity: f32,
    pub source: SimilaritySource,
}

/// One transaction-time version of a memory
#[derive(Debug, Clone)]
pub struct MemoryVersion {
    pub version: i64,
    pub recorded_at: DateTime<Utc>,
    pub memory: Memory,
}

/// Audit row written for each applied piece of feedback
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRecord {
    pub memory_id: String,
    pub action: String,
    pub previous_confidence: f64,
    pub new_confidence: f64,
    pub archived: bool,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Bitemporal memory store over SQLite
#[derive(Clone)]
pub struct MemoryStore {
    conn: Arc<Mutex<Connection>>,
    scope: TemporalScope,
    vector: Option<Arc<dyn VectorBackend>>,
    vector_timeout: Duration,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("scope", &self.scope)
            .field("vector", &self.vector.as_ref().map(|v| v.name().to_string()))
            .field("vector_timeout", &self.vector_timeout)
            .finish()
    }
}

impl MemoryStore {
    /// Open or create a store at `path` with default options
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).ctx("open database")?;
        configure_connection(&conn, options.busy_timeout.as_millis() as u64, true)
            .ctx("configure connection")?;
        initialize_schema(&conn).ctx("initialize schema")?;
        debug!(path = %path.display(), "Opened memory store");
        Ok(Self::from_connection(conn, &options))
    }

    /// Open the database configured in `[storage]`
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open_with(config.storage.database_path(), StoreOptions::from_config(config))
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let options = StoreOptions::default();
        let conn = Connection::open_in_memory().ctx("open in-memory database")?;
        configure_connection(&conn, options.busy_timeout.as_millis() as u64, false)
            .ctx("configure connection")?;
        initialize_schema(&conn).ctx("initialize schema")?;
        Ok(Self::from_connection(conn, &options))
    }

    fn from_connection(conn: Connection, options: &StoreOptions) -> Self {
        let conn = Arc::new(Mutex::new(conn));
        let vector = options.vector_enabled.then(|| {
            Arc::new(SqliteVectorIndex::new(Arc::clone(&conn))) as Arc<dyn VectorBackend>
        });
        Self {
            conn,
            scope: TemporalScope::Current,
            vector,
            vector_timeout: options.vector_timeout,
        }
    }

    /// Replace the similarity backend
    pub fn with_vector_backend(mut self, backend: Arc<dyn VectorBackend>) -> Self {
        self.vector = Some(backend);
        self
    }

    /// Run without a similarity backend; similarity search degrades to a recency scan
    pub fn without_vector_backend(mut self) -> Self {
        self.vector = None;
        self
    }

    pub fn with_vector_timeout(mut self, timeout: Duration) -> Self {
        self.vector_timeout = timeout;
        self
    }

    pub fn scope(&self) -> TemporalScope {
        self.scope
    }

    /// View of what the store knew at `at`
    pub fn as_of(&self, at: DateTime<Utc>) -> Self {
        self.scoped(TemporalScope::AsOf(at))
    }

    /// View of the facts that held in the world at `at`
    pub fn valid_at(&self, at: DateTime<Utc>) -> Self {
        self.scoped(TemporalScope::ValidAt(at))
    }

    /// Unscoped view over the same connection
    pub fn current(&self) -> Self {
        self.scoped(TemporalScope::Current)
    }

    fn scoped(&self, scope: TemporalScope) -> Self {
        Self {
            scope,
            ..self.clone()
        }
    }

    async fn run<F, T>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        run_blocking(&self.conn, op, f).await
    }

    // ==================== Memory CRUD ====================

    /// Persist a new memory. Generates an id and summary when blank.
    ///
    /// Confidence outside [0, 1], a duplicate id or an inverted validity
    /// window fail with `LoreError::Validation`.
    pub async fn create(&self, memory: Memory) -> Result<Memory> {
        let memory = prepare_new(memory);
        self.run("create memory", move |conn| {
            let tx = conn.transaction().ctx("begin create")?;
            insert_memory(&tx, &memory)?;
            tx.commit().ctx("commit create")?;
            debug!(id = %memory.id, memory_type = memory.type_name(), "Created memory");
            Ok(memory)
        })
        .await
    }

    /// Read a memory, bumping its access count and last access time.
    ///
    /// On a scoped view this behaves like [`MemoryStore::peek`].
    pub async fn read(&self, id: &str) -> Result<Option<Memory>> {
        if self.scope != TemporalScope::Current {
            return self.peek(id).await;
        }
        let id = id.to_string();
        self.run("read memory", move |conn| {
            let tx = conn.transaction().ctx("begin read")?;
            let changed = tx
                .execute(
                    "UPDATE memories SET access_count = access_count + 1, last_accessed = ?1
                     WHERE id = ?2",
                    params![format_ts(&Utc::now()), id],
                )
                .ctx("bump access")?;
            if changed == 0 {
                return Ok(None);
            }
            let memory = load_current(&tx, &id)?;
            tx.commit().ctx("commit read")?;
            Ok(memory)
        })
        .await
    }

    /// Read a memory through this view without touching access tracking
    pub async fn peek(&self, id: &str) -> Result<Option<Memory>> {
        let id = id.to_string();
        let scope = self.scope;
        self.run("peek memory", move |conn| load_scoped(conn, &id, scope))
            .await
    }

    /// Merge `patch` into a stored memory; bumps `updated_at`
    pub async fn update(&self, id: &str, patch: MemoryUpdate) -> Result<Memory> {
        self.update_with(id, move |memory| patch.apply(memory)).await
    }

    /// Read-modify-write a memory in one transaction.
    ///
    /// The id, variant tag, `created_at` and `recorded_at` survive whatever
    /// `f` does; a changed variant tag is a validation error.
    pub async fn update_with<F>(&self, id: &str, f: F) -> Result<Memory>
    where
        F: FnOnce(&mut Memory) -> Result<()> + Send + 'static,
    {
        Ok(self.update_returning(id, f).await?.0)
    }

    /// Like [`MemoryStore::update_with`], also handing back whatever `f` returns
    pub async fn update_returning<F, R>(&self, id: &str, f: F) -> Result<(Memory, R)>
    where
        F: FnOnce(&mut Memory) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let id = id.to_string();
        self.run("update memory", move |conn| {
            let tx = conn.transaction().ctx("begin update")?;
            let updated = modify_memory(&tx, &id, f)?;
            tx.commit().ctx("commit update")?;
            Ok(updated)
        })
        .await
    }

    /// Soft delete. Unknown or already archived ids are a no-op returning `false`.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.run("delete memory", move |conn| {
            let tx = conn.transaction().ctx("begin delete")?;
            let deleted = soft_delete(&tx, &id)?;
            tx.commit().ctx("commit delete")?;
            Ok(deleted)
        })
        .await
    }

    /// Physically remove a memory with its links, edges, embedding and history
    pub async fn hard_delete(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.run("hard delete memory", move |conn| {
            let tx = conn.transaction().ctx("begin hard delete")?;
            tx.execute(
                "DELETE FROM memory_embeddings WHERE id IN
                    (SELECT embedding_id FROM memory_embedding_link WHERE memory_id = ?1)",
                params![id],
            )
            .ctx("delete embedding")?;
            let removed = tx
                .execute("DELETE FROM memories WHERE id = ?1", params![id])
                .ctx("delete memory row")?;
            tx.commit().ctx("commit hard delete")?;
            if removed > 0 {
                info!(id = %id, "Hard deleted memory");
            }
            Ok(removed > 0)
        })
        .await
    }

    // ==================== Bulk ====================

    /// Create all memories or none
    pub async fn create_many(&self, memories: Vec<Memory>) -> Result<Vec<Memory>> {
        let memories: Vec<Memory> = memories.into_iter().map(prepare_new).collect();
        self.run("create memories", move |conn| {
            let tx = conn.transaction().ctx("begin bulk create")?;
            for memory in &memories {
                insert_memory(&tx, memory)?;
            }
            tx.commit().ctx("commit bulk create")?;
            debug!(count = memories.len(), "Created memories");
            Ok(memories)
        })
        .await
    }

    /// Apply all patches or none; any unknown id aborts the batch with `NotFound`
    pub async fn update_many(&self, updates: Vec<(String, MemoryUpdate)>) -> Result<Vec<Memory>> {
        self.run("update memories", move |conn| {
            let tx = conn.transaction().ctx("begin bulk update")?;
            let mut updated = Vec::with_capacity(updates.len());
            for (id, patch) in updates {
                updated.push(modify_memory(&tx, &id, move |m| patch.apply(m))?.0);
            }
            tx.commit().ctx("commit bulk update")?;
            Ok(updated)
        })
        .await
    }

    /// Soft delete all ids in one transaction; returns how many were archived
    pub async fn delete_many(&self, ids: Vec<String>) -> Result<usize> {
        self.run("delete memories", move |conn| {
            let tx = conn.transaction().ctx("begin bulk delete")?;
            let mut deleted = 0;
            for id in &ids {
                if soft_delete(&tx, id)? {
                    deleted += 1;
                }
            }
            tx.commit().ctx("commit bulk delete")?;
            Ok(deleted)
        })
        .await
    }

    // ==================== Search ====================

    pub async fn search(&self, query: &MemoryQuery) -> Result<Vec<Memory>> {
        let query = query.clone();
        let scope = self.scope;
        self.run("search memories", move |conn| search_memories(conn, &query, scope))
            .await
    }

    pub async fn find_by_pattern(&self, pattern_id: &str) -> Result<Vec<Memory>> {
        self.find_linked(LinkKind::Pattern, pattern_id).await
    }

    pub async fn find_by_constraint(&self, constraint_id: &str) -> Result<Vec<Memory>> {
        self.find_linked(LinkKind::Constraint, constraint_id).await
    }

    pub async fn find_by_file(&self, file_path: &str) -> Result<Vec<Memory>> {
        self.find_linked(LinkKind::File, file_path).await
    }

    pub async fn find_by_function(&self, function_id: &str) -> Result<Vec<Memory>> {
        self.find_linked(LinkKind::Function, function_id).await
    }

    async fn find_linked(&self, kind: LinkKind, entity_id: &str) -> Result<Vec<Memory>> {
        let entity_id = entity_id.to_string();
        let scope = self.scope;
        self.run("find linked memories", move |conn| {
            // Junction tables only hold current links; a historical view has
            // to check each snapshot's own links instead.
            let ids = match scope {
                TemporalScope::AsOf(at) => select_strings(
                    conn,
                    "SELECT m.id FROM memories m WHERE m.recorded_at <= ?1",
                    vec![Value::Text(format_ts(&at))],
                )?,
                _ => {
                    let sql = format!(
                        "SELECT DISTINCT memory_id FROM {} WHERE {} = ?1",
                        kind.table(),
                        kind.key_column()
                    );
                    select_strings(conn, &sql, vec![Value::Text(entity_id.clone())])?
                }
            };
            let mut memories = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(memory) = load_scoped(conn, &id, scope)? {
                    if memory.is_active() && memory.links.contains(kind, &entity_id) {
                        memories.push(memory);
                    }
                }
            }
            SearchOrder::RecordedDesc.sort(&mut memories);
            Ok(memories)
        })
        .await
    }

    // ==================== Links ====================

    pub async fn link_to_pattern(&self, memory_id: &str, link: EntityLink) -> Result<Memory> {
        self.update_with(memory_id, move |m| {
            upsert_entity_link(&mut m.links.patterns, link);
            Ok(())
        })
        .await
    }

    pub async fn link_to_constraint(&self, memory_id: &str, link: EntityLink) -> Result<Memory> {
        self.update_with(memory_id, move |m| {
            upsert_entity_link(&mut m.links.constraints, link);
            Ok(())
        })
        .await
    }

    pub async fn link_to_function(&self, memory_id: &str, link: EntityLink) -> Result<Memory> {
        self.update_with(memory_id, move |m| {
            upsert_entity_link(&mut m.links.functions, link);
            Ok(())
        })
        .await
    }

    pub async fn link_to_file(&self, memory_id: &str, link: FileLink) -> Result<Memory> {
        self.update_with(memory_id, move |m| {
            match m.links.files.iter_mut().find(|f| f.file_path == link.file_path) {
                Some(existing) => *existing = link,
                None => m.links.files.push(link),
            }
            Ok(())
        })
        .await
    }

    /// Remove a link; returns the memory unchanged when no such link exists
    pub async fn unlink(&self, memory_id: &str, kind: LinkKind, entity_id: &str) -> Result<Memory> {
        let entity_id = entity_id.to_string();
        self.update_with(memory_id, move |m| {
            match kind {
                LinkKind::Pattern => m.links.patterns.retain(|l| l.entity_id != entity_id),
                LinkKind::Constraint => m.links.constraints.retain(|l| l.entity_id != entity_id),
                LinkKind::Function => m.links.functions.retain(|l| l.entity_id != entity_id),
                LinkKind::File => m.links.files.retain(|l| l.file_path != entity_id),
            }
            Ok(())
        })
        .await
    }

    /// Record drift-detection results for a file citation
    pub async fn mark_citation(
        &self,
        memory_id: &str,
        file_path: &str,
        valid: Option<bool>,
    ) -> Result<Memory> {
        let file_path = file_path.to_string();
        let owner = memory_id.to_string();
        self.update_with(memory_id, move |m| {
            let link = m
                .links
                .files
                .iter_mut()
                .find(|f| f.file_path == file_path)
                .ok_or_else(|| LoreError::NotFound(format!("file link {file_path} on {owner}")))?;
            let citation = link.citation.as_mut().ok_or_else(|| {
                LoreError::Validation(format!("file link {file_path} carries no citation"))
            })?;
            citation.valid = valid;
            Ok(())
        })
        .await
    }

    // ==================== Relationships ====================

    /// Insert or overwrite the edge `(source, target, kind)`
    pub async fn add_relationship(&self, relationship: Relationship) -> Result<()> {
        self.run("add relationship", move |conn| {
            let tx = conn.transaction().ctx("begin add relationship")?;
            for id in [&relationship.source_id, &relationship.target_id] {
                if !memory_exists(&tx, id)? {
                    return Err(LoreError::NotFound(id.clone()));
                }
            }
            tx.execute(
                "INSERT INTO memory_relationships
                    (source_id, target_id, relationship_type, strength, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (source_id, target_id, relationship_type)
                 DO UPDATE SET strength = excluded.strength",
                params![
                    relationship.source_id,
                    relationship.target_id,
                    relationship.kind.as_str(),
                    relationship.strength,
                    format_ts(&relationship.created_at),
                ],
            )
            .ctx("upsert relationship")?;
            tx.commit().ctx("commit add relationship")
        })
        .await
    }

    pub async fn remove_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        kind: RelationshipKind,
    ) -> Result<bool> {
        let (source_id, target_id) = (source_id.to_string(), target_id.to_string());
        self.run("remove relationship", move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM memory_relationships
                     WHERE source_id = ?1 AND target_id = ?2 AND relationship_type = ?3",
                    params![source_id, target_id, kind.as_str()],
                )
                .ctx("delete relationship")?;
            Ok(removed > 0)
        })
        .await
    }

    /// Direct edges touching `id` in either direction
    pub async fn relationships(&self, id: &str) -> Result<Vec<Relationship>> {
        let id = id.to_string();
        let scope = self.scope;
        self.run("list relationships", move |conn| edges_of(conn, &id, &[], scope))
            .await
    }

    /// Memories reachable from `id` within `depth` hops, following edges in
    /// both directions. Each memory appears once, at its shallowest depth.
    /// `kinds` empty means every kind; archived memories are skipped.
    pub async fn get_related(
        &self,
        id: &str,
        kinds: &[RelationshipKind],
        depth: usize,
    ) -> Result<Vec<RelatedMemory>> {
        let id = id.to_string();
        let kinds = kinds.to_vec();
        let depth = depth.min(MAX_TRAVERSAL_DEPTH);
        let scope = self.scope;
        self.run("get related memories", move |conn| {
            if load_scoped(conn, &id, scope)?.is_none() {
                return Err(LoreError::NotFound(id));
            }
            let mut visited = HashSet::from([id.clone()]);
            let mut queue = VecDeque::from([(id, 0usize)]);
            let mut related = Vec::new();

            while let Some((current, hops)) = queue.pop_front() {
                if hops >= depth {
                    continue;
                }
                for edge in edges_of(conn, &current, &kinds, scope)? {
                    let next = edge.other_end(&current).to_string();
                    if !visited.insert(next.clone()) {
                        continue;
                    }
                    let Some(memory) = load_scoped(conn, &next, scope)? else {
                        continue;
                    };
                    if memory.archived {
                        continue;
                    }
                    queue.push_back((next, hops + 1));
                    related.push(RelatedMemory {
                        memory,
                        relationship: edge,
                        depth: hops + 1,
                    });
                }
            }
            Ok(related)
        })
        .await
    }

    // ==================== Embeddings ====================

    /// Hand an embedding to the vector backend.
    ///
    /// Returns `false` when no backend accepted it (degraded mode).
    pub async fn upsert_embedding(&self, memory_id: &str, embedding: &[f32]) -> Result<bool> {
        if embedding.is_empty() {
            return Err(LoreError::Validation("embedding must not be empty".to_string()));
        }
        let id = memory_id.to_string();
        let exists = self
            .run("check memory", move |conn| memory_exists(conn, &id))
            .await?;
        if !exists {
            return Err(LoreError::NotFound(memory_id.to_string()));
        }

        let Some(backend) = &self.vector else {
            warn!(memory_id, "No vector backend configured; embedding not indexed");
            return Ok(false);
        };
        match tokio::time::timeout(self.vector_timeout, backend.upsert(memory_id, embedding)).await
        {
            Ok(Ok(())) => Ok(true),
            Ok(Err(e)) => {
                warn!(memory_id, backend = backend.name(), error = %e, "Embedding upsert failed; continuing without index entry");
                Ok(false)
            }
            Err(_) => {
                warn!(memory_id, backend = backend.name(), "Embedding upsert timed out; continuing without index entry");
                Ok(false)
            }
        }
    }

    /// Most similar active memories at or above `threshold`.
    ///
    /// Without a working backend this degrades to the `limit` most recently
    /// active memories with similarity 0.
    pub async fn similarity_search(
        &self,
        embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SimilarityHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        match &self.vector {
            Some(backend) => {
                let search = backend.search(embedding, limit.saturating_mul(2), threshold);
                match tokio::time::timeout(self.vector_timeout, search).await {
                    Ok(Ok(hits)) => {
                        let scope = self.scope;
                        return self
                            .run("load similarity hits", move |conn| {
                                let mut out = Vec::with_capacity(limit);
                                for hit in hits {
                                    if out.len() == limit {
                                        break;
                                    }
                                    if let Some(memory) = load_scoped(conn, &hit.memory_id, scope)? {
                                        if memory.is_active() {
                                            out.push(SimilarityHit {
                                                memory,
                                                similarity: hit.similarity,
                                                source: SimilaritySource::Vector,
                                            });
                                        }
                                    }
                                }
                                Ok(out)
                            })
                            .await;
                    }
                    Ok(Err(e)) => {
                        warn!(backend = backend.name(), error = %e, "Vector search failed; falling back to recency scan")
                    }
                    Err(_) => {
                        warn!(backend = backend.name(), timeout_ms = self.vector_timeout.as_millis() as u64, "Vector search timed out; falling back to recency scan")
                    }
                }
            }
            None => warn!("No vector backend configured; falling back to recency scan"),
        }

        let query = MemoryQuery::new()
            .ordered_by(SearchOrder::RecentActivityDesc)
            .with_limit(limit);
        Ok(self
            .search(&query)
            .await?
            .into_iter()
            .map(|memory| SimilarityHit {
                memory,
                similarity: 0.0,
                source: SimilaritySource::RecencyFallback,
            })
            .collect())
    }

    // ==================== Counts ====================

    /// Number of active memories visible through this view
    pub async fn count(&self) -> Result<u64> {
        Ok(self.count_by_type().await?.values().sum())
    }

    /// Active memories per type tag, unknown tags included verbatim
    pub async fn count_by_type(&self) -> Result<BTreeMap<String, u64>> {
        let scope = self.scope;
        self.run("count memories", move |conn| {
            let mut counts = BTreeMap::new();
            if let TemporalScope::AsOf(_) = scope {
                for memory in search_memories(conn, &MemoryQuery::new(), scope)? {
                    *counts.entry(memory.type_name().to_string()).or_insert(0) += 1;
                }
                return Ok(counts);
            }

            let (where_sql, params) = where_clause([MemoryQuery::new().to_sql_clause(), scope.clause()]);
            let sql = format!("SELECT m.type, COUNT(*) FROM memories m{where_sql} GROUP BY m.type");
            let mut stmt = conn.prepare(&sql).ctx("prepare count")?;
            let rows = stmt
                .query_map(params_from_iter(params.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .ctx("count by type")?;
            for row in rows {
                let (type_name, n) = row.ctx("read count row")?;
                counts.insert(type_name, n.max(0) as u64);
            }
            Ok(counts)
        })
        .await
    }

    // ==================== Audit ====================

    /// All recorded versions of a memory, oldest first
    pub async fn history(&self, id: &str) -> Result<Vec<MemoryVersion>> {
        let id = id.to_string();
        self.run("load history", move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT version, recorded_at, snapshot FROM memory_history
                     WHERE memory_id = ?1 ORDER BY version ASC",
                )
                .ctx("prepare history")?;
            let rows = stmt
                .query_map(params![id], |row| {
                    let recorded_at: String = row.get(1)?;
                    let snapshot: String = row.get(2)?;
                    Ok(MemoryVersion {
                        version: row.get(0)?,
                        recorded_at: parse_ts(1, &recorded_at)?,
                        memory: serde_json::from_str(&snapshot)
                            .map_err(|e| conversion_error(2, e))?,
                    })
                })
                .ctx("load history")?;
            rows.collect::<rusqlite::Result<Vec<_>>>().ctx("read history row")
        })
        .await
    }

    pub async fn record_validation(&self, record: ValidationRecord) -> Result<()> {
        self.run("record validation", move |conn| {
            conn.execute(
                "INSERT INTO memory_validations
                    (memory_id, action, previous_confidence, new_confidence, archived, note, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.memory_id,
                    record.action,
                    record.previous_confidence,
                    record.new_confidence,
                    record.archived,
                    record.note,
                    format_ts(&record.recorded_at),
                ],
            )
            .ctx("insert validation record")?;
            Ok(())
        })
        .await
    }

    /// Feedback applied to a memory, oldest first
    pub async fn validations(&self, memory_id: &str) -> Result<Vec<ValidationRecord>> {
        let memory_id = memory_id.to_string();
        self.run("list validations", move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT memory_id, action, previous_confidence, new_confidence, archived, note,
                            recorded_at
                     FROM memory_validations WHERE memory_id = ?1 ORDER BY id ASC",
                )
                .ctx("prepare validations")?;
            let rows = stmt
                .query_map(params![memory_id], |row| {
                    let recorded_at: String = row.get(6)?;
                    Ok(ValidationRecord {
                        memory_id: row.get(0)?,
                        action: row.get(1)?,
                        previous_confidence: row.get(2)?,
                        new_confidence: row.get(3)?,
                        archived: row.get(4)?,
                        note: row.get(5)?,
                        recorded_at: parse_ts(6, &recorded_at)?,
                    })
                })
                .ctx("list validations")?;
            rows.collect::<rusqlite::Result<Vec<_>>>().ctx("read validation row")
        })
        .await
    }
}

// ==================== Row codec ====================

fn row_to_memory(row: &Row) -> rusqlite::Result<Memory> {
    let type_name: String = row.get(1)?;
    let content_json: String = row.get(2)?;
    let payload: serde_json::Value =
        serde_json::from_str(&content_json).map_err(|e| conversion_error(2, e))?;
    let content =
        MemoryContent::from_parts(&type_name, payload).map_err(|e| conversion_error(2, e))?;
    let importance: String = row.get(5)?;
    let importance = importance
        .parse::<Importance>()
        .map_err(|e| conversion_error(5, e))?;

    Ok(Memory {
        id: row.get(0)?,
        content,
        summary: row.get(3)?,
        confidence: row.get(4)?,
        importance,
        transaction_time: TransactionTime {
            recorded_at: parse_ts(6, &row.get::<_, String>(6)?)?,
        },
        valid_time: ValidTime {
            valid_from: parse_opt_ts(7, row.get(7)?)?,
            valid_until: parse_opt_ts(8, row.get(8)?)?,
        },
        created_at: parse_ts(9, &row.get::<_, String>(9)?)?,
        updated_at: parse_ts(10, &row.get::<_, String>(10)?)?,
        access_count: row.get(11)?,
        last_accessed: parse_opt_ts(12, row.get(12)?)?,
        last_validated: parse_opt_ts(13, row.get(13)?)?,
        archived: row.get(14)?,
        archive_reason: row.get(15)?,
        superseded_by: row.get(16)?,
        supersedes: row.get(17)?,
        tags: BTreeSet::new(),
        links: MemoryLinks::default(),
    })
}

fn attach_extras(conn: &Connection, memory: &mut Memory) -> Result<()> {
    memory.tags = select_strings(
        conn,
        "SELECT tag FROM memory_tags WHERE memory_id = ?1 ORDER BY tag",
        vec![Value::Text(memory.id.clone())],
    )?
    .into_iter()
    .collect();
    memory.links = load_links(conn, &memory.id)?;
    Ok(())
}

fn load_links(conn: &Connection, id: &str) -> Result<MemoryLinks> {
    let entity_links = |kind: LinkKind| -> Result<Vec<EntityLink>> {
        let sql = format!(
            "SELECT {}, name FROM {} WHERE memory_id = ?1 ORDER BY {}",
            kind.key_column(),
            kind.table(),
            kind.key_column()
        );
        let mut stmt = conn.prepare(&sql).ctx("prepare link query")?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok(EntityLink {
                    entity_id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .ctx("load links")?;
        rows.collect::<rusqlite::Result<Vec<_>>>().ctx("read link row")
    };

    let mut stmt = conn
        .prepare(
            "SELECT file_path, line_start, line_end, content_hash, citation_valid
             FROM memory_files WHERE memory_id = ?1 ORDER BY file_path",
        )
        .ctx("prepare file links")?;
    let files = stmt
        .query_map(params![id], |row| {
            let line_start: Option<u32> = row.get(1)?;
            let line_end: Option<u32> = row.get(2)?;
            let content_hash: Option<String> = row.get(3)?;
            let citation = match (line_start, line_end, content_hash) {
                (Some(line_start), Some(line_end), Some(content_hash)) => Some(Citation {
                    line_start,
                    line_end,
                    content_hash,
                    valid: row.get(4)?,
                }),
                _ => None,
            };
            Ok(FileLink {
                file_path: row.get(0)?,
                citation,
            })
        })
        .ctx("load file links")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .ctx("read file link row")?;

    Ok(MemoryLinks {
        patterns: entity_links(LinkKind::Pattern)?,
        constraints: entity_links(LinkKind::Constraint)?,
        files,
        functions: entity_links(LinkKind::Function)?,
    })
}

fn load_current(conn: &Connection, id: &str) -> Result<Option<Memory>> {
    let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories m WHERE m.id = ?1");
    let memory = conn
        .query_row(&sql, params![id], row_to_memory)
        .optional()
        .ctx("load memory")?;
    match memory {
        Some(mut memory) => {
            attach_extras(conn, &mut memory)?;
            Ok(Some(memory))
        }
        None => Ok(None),
    }
}

/// Load `id` as seen through `scope`
fn load_scoped(conn: &Connection, id: &str, scope: TemporalScope) -> Result<Option<Memory>> {
    let (where_sql, mut params) = where_clause([scope.clause()]);
    let sql = if where_sql.is_empty() {
        format!("SELECT {MEMORY_COLUMNS} FROM memories m WHERE m.id = ?")
    } else {
        format!("SELECT {MEMORY_COLUMNS} FROM memories m{where_sql} AND m.id = ?")
    };
    params.push(Value::Text(id.to_string()));
    let memory = conn
        .query_row(&sql, params_from_iter(params.iter()), row_to_memory)
        .optional()
        .ctx("load memory")?;
    let Some(mut memory) = memory else {
        return Ok(None);
    };

    if let TemporalScope::AsOf(at) = scope {
        if let Some(snapshot) = snapshot_at(conn, id, at)? {
            return Ok(Some(snapshot));
        }
    }
    attach_extras(conn, &mut memory)?;
    Ok(Some(memory))
}

fn snapshot_at(conn: &Connection, id: &str, at: DateTime<Utc>) -> Result<Option<Memory>> {
    let snapshot: Option<String> = conn
        .query_row(
            "SELECT snapshot FROM memory_history
             WHERE memory_id = ?1 AND recorded_at <= ?2
             ORDER BY version DESC LIMIT 1",
            params![id, format_ts(&at)],
            |row| row.get(0),
        )
        .optional()
        .ctx("load snapshot")?;
    snapshot
        .map(|s| serde_json::from_str(&s).map_err(LoreError::from))
        .transpose()
}

fn memory_exists(conn: &Connection, id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM memories WHERE id = ?1)",
        params![id],
        |row| row.get(0),
    )
    .ctx("check memory exists")
}

fn select_strings(conn: &Connection, sql: &str, params: Vec<Value>) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql).ctx("prepare query")?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| row.get(0))
        .ctx("run query")?;
    rows.collect::<rusqlite::Result<Vec<String>>>()
        .ctx("read row")
}

/// `" WHERE a AND b"` from optional fragments, or `""`
fn where_clause<const N: usize>(parts: [Option<(String, Vec<Value>)>; N]) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut params = Vec::new();
    for (sql, values) in parts.into_iter().flatten() {
        conditions.push(sql);
        params.extend(values);
    }
    if conditions.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), params)
    }
}

fn search_memories(
    conn: &Connection,
    query: &MemoryQuery,
    scope: TemporalScope,
) -> Result<Vec<Memory>> {
    if let TemporalScope::AsOf(_) = scope {
        // Filters must see the historical state, so they run after reconstruction
        let (where_sql, params) = where_clause([scope.clause()]);
        let sql = format!("SELECT m.id FROM memories m{where_sql}");
        let mut memories = Vec::new();
        for id in select_strings(conn, &sql, params)? {
            if let Some(memory) = load_scoped(conn, &id, scope)? {
                if query.matches(&memory) {
                    memories.push(memory);
                }
            }
        }
        query.order.sort(&mut memories);
        let limit = query.limit.unwrap_or(usize::MAX);
        return Ok(memories.into_iter().skip(query.offset).take(limit).collect());
    }

    let (where_sql, mut params) = where_clause([query.to_sql_clause(), scope.clause()]);
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories m{where_sql} ORDER BY {} LIMIT ? OFFSET ?",
        query.order.sql()
    );
    params.push(Value::Integer(
        query.limit.map(|l| l.min(i64::MAX as usize) as i64).unwrap_or(-1),
    ));
    params.push(Value::Integer(query.offset.min(i64::MAX as usize) as i64));

    let mut stmt = conn.prepare(&sql).ctx("prepare search")?;
    let mut memories = stmt
        .query_map(params_from_iter(params.iter()), row_to_memory)
        .ctx("search memories")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .ctx("read memory row")?;
    for memory in &mut memories {
        attach_extras(conn, memory)?;
    }
    Ok(memories)
}

/// Edges touching `id`; under `AsOf(t)` only edges created at or before `t`
fn edges_of(
    conn: &Connection,
    id: &str,
    kinds: &[RelationshipKind],
    scope: TemporalScope,
) -> Result<Vec<Relationship>> {
    let mut sql = String::from(
        "SELECT source_id, target_id, relationship_type, strength, created_at
         FROM memory_relationships WHERE (source_id = ? OR target_id = ?)",
    );
    let mut params = vec![Value::Text(id.to_string()), Value::Text(id.to_string())];
    if !kinds.is_empty() {
        sql.push_str(&format!(
            " AND relationship_type IN ({})",
            vec!["?"; kinds.len()].join(", ")
        ));
        params.extend(kinds.iter().map(|k| Value::Text(k.as_str().to_string())));
    }
    if let TemporalScope::AsOf(at) = scope {
        sql.push_str(" AND created_at <= ?");
        params.push(Value::Text(format_ts(&at)));
    }
    sql.push_str(" ORDER BY strength DESC, created_at ASC, source_id ASC, target_id ASC");

    let mut stmt = conn.prepare(&sql).ctx("prepare relationships")?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            let kind: String = row.get(2)?;
            let created_at: String = row.get(4)?;
            Ok(Relationship {
                source_id: row.get(0)?,
                target_id: row.get(1)?,
                kind: kind
                    .parse::<RelationshipKind>()
                    .map_err(|e| conversion_error(2, e))?,
                strength: row.get(3)?,
                created_at: parse_ts(4, &created_at)?,
            })
        })
        .ctx("load relationships")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .ctx("read relationship row")
}

// ==================== Writes ====================

fn prepare_new(mut memory: Memory) -> Memory {
    if memory.id.trim().is_empty() {
        memory.id = Uuid::new_v4().to_string();
    }
    memory.ensure_summary();
    memory
}

fn insert_memory(conn: &Connection, memory: &Memory) -> Result<()> {
    let payload = serde_json::to_string(&memory.content.payload()?)?;
    conn.execute(
        &format!(
            "INSERT INTO memories ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, \
             ?13, ?14, ?15, ?16, ?17, ?18)",
            MEMORY_COLUMNS.replace("m.", "")
        ),
        params![
            memory.id,
            memory.type_name(),
            payload,
            memory.summary,
            memory.confidence,
            memory.importance.as_str(),
            format_ts(&memory.recorded_at()),
            memory.valid_time.valid_from.as_ref().map(format_ts),
            memory.valid_time.valid_until.as_ref().map(format_ts),
            format_ts(&memory.created_at),
            format_ts(&memory.updated_at),
            memory.access_count,
            memory.last_accessed.as_ref().map(format_ts),
            memory.last_validated.as_ref().map(format_ts),
            memory.archived,
            memory.archive_reason,
            memory.superseded_by,
            memory.supersedes,
        ],
    )
    .ctx("insert memory")?;
    write_tags(conn, memory)?;
    write_links(conn, memory)?;
    append_history(conn, memory, memory.recorded_at())?;
    Ok(())
}

fn update_row(conn: &Connection, memory: &Memory) -> Result<()> {
    let payload = serde_json::to_string(&memory.content.payload()?)?;
    conn.execute(
        "UPDATE memories SET content = ?2, summary = ?3, confidence = ?4, importance = ?5,
            valid_from = ?6, valid_until = ?7, updated_at = ?8, access_count = ?9,
            last_accessed = ?10, last_validated = ?11, archived = ?12, archive_reason = ?13,
            superseded_by = ?14, supersedes = ?15
         WHERE id = ?1",
        params![
            memory.id,
            payload,
            memory.summary,
            memory.confidence,
            memory.importance.as_str(),
            memory.valid_time.valid_from.as_ref().map(format_ts),
            memory.valid_time.valid_until.as_ref().map(format_ts),
            format_ts(&memory.updated_at),
            memory.access_count,
            memory.last_accessed.as_ref().map(format_ts),
            memory.last_validated.as_ref().map(format_ts),
            memory.archived,
            memory.archive_reason,
            memory.superseded_by,
            memory.supersedes,
        ],
    )
    .ctx("update memory")?;
    write_tags(conn, memory)?;
    write_links(conn, memory)?;
    Ok(())
}

fn write_tags(conn: &Connection, memory: &Memory) -> Result<()> {
    conn.execute("DELETE FROM memory_tags WHERE memory_id = ?1", params![memory.id])
        .ctx("clear tags")?;
    let mut stmt = conn
        .prepare("INSERT INTO memory_tags (memory_id, tag) VALUES (?1, ?2)")
        .ctx("prepare tag insert")?;
    for tag in &memory.tags {
        stmt.execute(params![memory.id, tag]).ctx("insert tag")?;
    }
    Ok(())
}

fn write_links(conn: &Connection, memory: &Memory) -> Result<()> {
    for (kind, links) in [
        (LinkKind::Pattern, &memory.links.patterns),
        (LinkKind::Constraint, &memory.links.constraints),
        (LinkKind::Function, &memory.links.functions),
    ] {
        conn.execute(
            &format!("DELETE FROM {} WHERE memory_id = ?1", kind.table()),
            params![memory.id],
        )
        .ctx("clear links")?;
        let sql = format!(
            "INSERT OR REPLACE INTO {} (memory_id, {}, name) VALUES (?1, ?2, ?3)",
            kind.table(),
            kind.key_column()
        );
        for link in links {
            conn.execute(&sql, params![memory.id, link.entity_id, link.name])
                .ctx("insert link")?;
        }
    }

    conn.execute("DELETE FROM memory_files WHERE memory_id = ?1", params![memory.id])
        .ctx("clear file links")?;
    for link in &memory.links.files {
        let citation = link.citation.as_ref();
        conn.execute(
            "INSERT OR REPLACE INTO memory_files
                (memory_id, file_path, line_start, line_end, content_hash, citation_valid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                memory.id,
                link.file_path,
                citation.map(|c| c.line_start),
                citation.map(|c| c.line_end),
                citation.map(|c| c.content_hash.as_str()),
                citation.and_then(|c| c.valid),
            ],
        )
        .ctx("insert file link")?;
    }
    Ok(())
}

fn append_history(conn: &Connection, memory: &Memory, recorded_at: DateTime<Utc>) -> Result<i64> {
    let version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM memory_history WHERE memory_id = ?1",
            params![memory.id],
            |row| row.get(0),
        )
        .ctx("next history version")?;
    conn.execute(
        "INSERT INTO memory_history (memory_id, version, recorded_at, snapshot)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            memory.id,
            version,
            format_ts(&recorded_at),
            serde_json::to_string(memory)?,
        ],
    )
    .ctx("append history")?;
    Ok(version)
}

fn modify_memory<F, R>(conn: &Connection, id: &str, f: F) -> Result<(Memory, R)>
where
    F: FnOnce(&mut Memory) -> Result<R>,
{
    let mut memory = load_current(conn, id)?.ok_or_else(|| LoreError::NotFound(id.to_string()))?;
    let type_name = memory.type_name().to_string();
    let created_at = memory.created_at;
    let transaction_time = memory.transaction_time;

    let output = f(&mut memory)?;

    if memory.type_name() != type_name {
        return Err(LoreError::Validation(format!(
            "memory type is immutable: {type_name} cannot become {}",
            memory.type_name()
        )));
    }
    memory.id = id.to_string();
    memory.created_at = created_at;
    memory.transaction_time = transaction_time;
    memory.ensure_summary();
    let now = Utc::now();
    memory.updated_at = now;

    update_row(conn, &memory)?;
    append_history(conn, &memory, now)?;
    debug!(id = %memory.id, "Updated memory");
    Ok((memory, output))
}

fn soft_delete(conn: &Connection, id: &str) -> Result<bool> {
    match load_current(conn, id)? {
        Some(memory) if !memory.archived => {
            modify_memory(conn, id, |m| {
                m.archived = true;
                if m.archive_reason.is_none() {
                    m.archive_reason = Some(DELETED_REASON.to_string());
                }
                Ok(())
            })?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn upsert_entity_link(links: &mut Vec<EntityLink>, link: EntityLink) {
    match links.iter_mut().find(|l| l.entity_id == link.entity_id) {
        Some(existing) => *existing = link,
        None => links.push(link),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::content::{MemoryContent, TribalContent};

    fn tribal(confidence: f64) -> Memory {
        Memory::new(MemoryContent::Tribal(TribalContent {
            topic: "deploys".into(),
            knowledge: "staging mirrors prod config".into(),
            ..Default::default()
        }))
        .with_confidence(confidence)
    }

    #[test]
    fn test_format_ts_sorts_chronologically() {
        let a = Utc::now();
        let b = a + chrono::Duration::microseconds(1500);
        assert!(format_ts(&a) < format_ts(&b));
        assert!(format_ts(&a).ends_with('Z'));
        assert_eq!(parse_ts(0, &format_ts(&a)).unwrap().timestamp_micros(), a.timestamp_micros());
    }

    #[test]
    fn test_where_clause_joins_fragments() {
        let (sql, params) = where_clause([
            Some(("a = ?".to_string(), vec![Value::Integer(1)])),
            None,
            Some(("b = ?".to_string(), vec![Value::Integer(2)])),
        ]);
        assert_eq!(sql, " WHERE a = ? AND b = ?");
        assert_eq!(params.len(), 2);

        let (sql, params) = where_clause::<1>([None]);
        assert!(sql.is_empty());
        assert!(params.is_empty());
    }

    #[tokio::test]
    async fn test_create_and_read_roundtrip() {
        let store = MemoryStore::in_memory().unwrap();
        let created = store.create(tribal(0.8)).await.unwrap();

        let read = store.read(&created.id).await.unwrap().unwrap();
        assert_eq!(read.confidence, 0.8);
        assert_eq!(read.access_count, 1);
        assert!(read.last_accessed.is_some());
        assert_eq!(read.content, created.content);
    }

    #[tokio::test]
    async fn test_create_rejects_out_of_range_confidence() {
        let store = MemoryStore::in_memory().unwrap();
        for confidence in [-0.5, 1.5, f64::NAN] {
            let err = store.create(tribal(confidence)).await.unwrap_err();
            assert!(err.is_validation(), "{confidence}: {err}");
        }
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_blank_id_is_generated() {
        let store = MemoryStore::in_memory().unwrap();
        let created = store.create(tribal(0.5).with_id("")).await.unwrap();
        assert!(!created.id.is_empty());
    }
}
