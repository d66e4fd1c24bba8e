//! SQLite schema and migrations for the memory store.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Connection pragmas applied to every connection.
pub fn configure_connection(conn: &Connection, busy_timeout_ms: u64, file_backed: bool) -> SqliteResult<()> {
    if file_backed {
        // WAL lets readers proceed while a write transaction is open
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))?;
    Ok(())
}

/// Initialize the database schema, applying any pending migrations.
pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )",
        [],
    )?;

    let current = current_version(conn)?;
    if current < 1 {
        apply_v1_schema(conn)?;
        tracing::info!(version = 1, "Applied memory store schema migration");
    }

    Ok(())
}

/// Highest applied schema version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> SqliteResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

fn apply_v1_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "BEGIN;

        CREATE TABLE IF NOT EXISTS memories (
            id TEXT PRIMARY KEY,
            type TEXT NOT NULL,
            content TEXT NOT NULL,
            summary TEXT NOT NULL,
            confidence REAL NOT NULL CHECK (confidence BETWEEN 0.0 AND 1.0),
            importance TEXT NOT NULL DEFAULT 'normal'
                CHECK (importance IN ('low', 'normal', 'high', 'critical')),
            recorded_at TEXT NOT NULL,
            valid_from TEXT,
            valid_until TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            access_count INTEGER NOT NULL DEFAULT 0 CHECK (access_count >= 0),
            last_accessed TEXT,
            last_validated TEXT,
            archived INTEGER NOT NULL DEFAULT 0 CHECK (archived IN (0, 1)),
            archive_reason TEXT,
            superseded_by TEXT,
            supersedes TEXT,
            CHECK (id <> ''),
            CHECK (valid_from IS NULL OR valid_until IS NULL OR valid_until > valid_from)
        );

        CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(type);
        CREATE INDEX IF NOT EXISTS idx_memories_confidence ON memories(confidence);
        CREATE INDEX IF NOT EXISTS idx_memories_importance ON memories(importance);
        CREATE INDEX IF NOT EXISTS idx_memories_recorded ON memories(recorded_at);
        CREATE INDEX IF NOT EXISTS idx_memories_valid ON memories(valid_from, valid_until);
        CREATE INDEX IF NOT EXISTS idx_memories_archived ON memories(archived);

        CREATE TABLE IF NOT EXISTS memory_tags (
            memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            tag TEXT NOT NULL,
            PRIMARY KEY (memory_id, tag)
        );
        CREATE INDEX IF NOT EXISTS idx_memory_tags_tag ON memory_tags(tag);

        CREATE TABLE IF NOT EXISTS memory_relationships (
            source_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            target_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            relationship_type TEXT NOT NULL CHECK (relationship_type IN
                ('supersedes', 'supports', 'contradicts', 'related', 'derived_from')),
            strength REAL NOT NULL DEFAULT 1.0 CHECK (strength BETWEEN 0.0 AND 1.0),
            created_at TEXT NOT NULL,
            PRIMARY KEY (source_id, target_id, relationship_type),
            CHECK (source_id <> target_id)
        );
        CREATE INDEX IF NOT EXISTS idx_relationships_target ON memory_relationships(target_id);

        CREATE TABLE IF NOT EXISTS memory_patterns (
            memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            pattern_id TEXT NOT NULL,
            name TEXT,
            PRIMARY KEY (memory_id, pattern_id)
        );
        CREATE INDEX IF NOT EXISTS idx_memory_patterns_entity ON memory_patterns(pattern_id);

        CREATE TABLE IF NOT EXISTS memory_constraints (
            memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            constraint_id TEXT NOT NULL,
            name TEXT,
            PRIMARY KEY (memory_id, constraint_id)
        );
        CREATE INDEX IF NOT EXISTS idx_memory_constraints_entity ON memory_constraints(constraint_id);

        CREATE TABLE IF NOT EXISTS memory_files (
            memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            file_path TEXT NOT NULL,
            line_start INTEGER,
            line_end INTEGER,
            content_hash TEXT,
            citation_valid INTEGER CHECK (citation_valid IS NULL OR citation_valid IN (0, 1)),
            PRIMARY KEY (memory_id, file_path)
        );
        CREATE INDEX IF NOT EXISTS idx_memory_files_entity ON memory_files(file_path);

        CREATE TABLE IF NOT EXISTS memory_functions (
            memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            function_id TEXT NOT NULL,
            name TEXT,
            PRIMARY KEY (memory_id, function_id)
        );
        CREATE INDEX IF NOT EXISTS idx_memory_functions_entity ON memory_functions(function_id);

        CREATE TABLE IF NOT EXISTS memory_embeddings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            embedding BLOB NOT NULL,
            dimensions INTEGER NOT NULL CHECK (dimensions > 0),
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS memory_embedding_link (
            memory_id TEXT PRIMARY KEY REFERENCES memories(id) ON DELETE CASCADE,
            embedding_id INTEGER NOT NULL REFERENCES memory_embeddings(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS memory_history (
            memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            version INTEGER NOT NULL,
            recorded_at TEXT NOT NULL,
            snapshot TEXT NOT NULL,
            PRIMARY KEY (memory_id, version)
        );
        CREATE INDEX IF NOT EXISTS idx_memory_history_recorded
            ON memory_history(memory_id, recorded_at);

        CREATE TABLE IF NOT EXISTS memory_validations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
            action TEXT NOT NULL,
            previous_confidence REAL NOT NULL,
            new_confidence REAL NOT NULL,
            archived INTEGER NOT NULL DEFAULT 0,
            note TEXT,
            recorded_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memory_validations_memory
            ON memory_validations(memory_id);

        INSERT INTO schema_version (version) VALUES (1);

        COMMIT;",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<SqliteResult<Vec<String>>>()
            .unwrap()
    }

    #[test]
    fn test_initialize_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        configure_connection(&conn, 1000, false).unwrap();
        initialize_schema(&conn).unwrap();

        let tables = table_names(&conn);
        for expected in [
            "memories",
            "memory_relationships",
            "memory_patterns",
            "memory_constraints",
            "memory_files",
            "memory_functions",
            "memory_embeddings",
            "memory_embedding_link",
            "memory_history",
            "memory_validations",
            "memory_tags",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing {expected}");
        }
        assert_eq!(current_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_confidence_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        let insert = |confidence: f64| {
            conn.execute(
                "INSERT INTO memories (id, type, content, summary, confidence, recorded_at,
                    created_at, updated_at)
                 VALUES (?1, 'tribal', '{}', 's', ?2, 't', 't', 't')",
                rusqlite::params![format!("m-{confidence}"), confidence],
            )
        };
        assert!(insert(0.5).is_ok());
        assert!(insert(1.0).is_ok());
        assert!(insert(1.5).is_err());
        assert!(insert(-0.5).is_err());
    }
}
