//! SQLite store: schema and CRUD for nodes, edges, observations, and indexed files.

use crate::model::{Edge, EdgeKind, IndexedFile, Node, NodeKind, Observation};
use crate::ArborError;
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    name        TEXT NOT NULL,
    file_path   TEXT NOT NULL,
    line_start  INTEGER NOT NULL,
    line_end    INTEGER NOT NULL,
    parent_id   TEXT,
    signature   TEXT,
    docstring   TEXT,
    decorators  TEXT,
    is_external INTEGER DEFAULT 0,
    file_hash   TEXT NOT NULL,
    indexed_at  REAL NOT NULL,
    FOREIGN KEY (parent_id) REFERENCES nodes(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS edges (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id   TEXT NOT NULL,
    target_id   TEXT NOT NULL,
    kind        TEXT NOT NULL,
    file_path   TEXT NOT NULL,
    line        INTEGER,
    resolved    INTEGER DEFAULT 0
);

CREATE TABLE IF NOT EXISTS observations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    content     TEXT NOT NULL,
    node_id     TEXT,
    tags        TEXT,
    created_at  REAL NOT NULL,
    source      TEXT DEFAULT 'user',
    FOREIGN KEY (node_id) REFERENCES nodes(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS indexed_files (
    file_path   TEXT PRIMARY KEY,
    file_hash   TEXT NOT NULL,
    indexed_at  REAL NOT NULL,
    node_count  INTEGER DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_nodes_file     ON nodes(file_path);
CREATE INDEX IF NOT EXISTS idx_nodes_name     ON nodes(name);
CREATE INDEX IF NOT EXISTS idx_nodes_parent   ON nodes(parent_id);
CREATE INDEX IF NOT EXISTS idx_nodes_kind     ON nodes(kind);
CREATE INDEX IF NOT EXISTS idx_nodes_external ON nodes(is_external);
CREATE INDEX IF NOT EXISTS idx_edges_source   ON edges(source_id);
CREATE INDEX IF NOT EXISTS idx_edges_target   ON edges(target_id);
CREATE INDEX IF NOT EXISTS idx_edges_kind     ON edges(kind);
CREATE UNIQUE INDEX IF NOT EXISTS idx_edges_unique ON edges(source_id, target_id, kind);
CREATE INDEX IF NOT EXISTS idx_edges_file     ON edges(file_path);
CREATE INDEX IF NOT EXISTS idx_obs_node       ON observations(node_id);
CREATE INDEX IF NOT EXISTS idx_obs_created    ON observations(created_at);
CREATE INDEX IF NOT EXISTS idx_obs_source     ON observations(source);
CREATE INDEX IF NOT EXISTS idx_files_indexed  ON indexed_files(indexed_at);
";

/// Row counts across the four tables
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub nodes: usize,
    pub edges: usize,
    pub observations: usize,
    pub indexed_files: usize,
}

/// SQLite store for a single project.
///
/// The connection sits behind a mutex so a `Store` can be shared
/// (`Arc<Store>`) between the watcher worker and HTTP handlers; WAL mode
/// plus a busy timeout let readers proceed while a write is in flight.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `db_path`, creating parent directories.
    pub fn open(db_path: &Path) -> crate::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests and ephemeral workflows
    pub fn open_in_memory() -> crate::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Per-project database location:
    /// `~/.arbor/projects/<sha256(root)[..16]>/context.db`
    pub fn project_db_path(root: &Path) -> crate::Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| ArborError::InvalidInput("home directory not found".to_string()))?;
        let digest = hex::encode(Sha256::digest(root.to_string_lossy().as_bytes()));
        Ok(home
            .join(".arbor")
            .join("projects")
            .join(&digest[..16])
            .join("context.db"))
    }

    fn init_schema(conn: &Connection) -> crate::Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Nodes ──────────────────────────────────────────────

    pub fn upsert_node(&self, node: &Node) -> crate::Result<()> {
        let conn = self.conn();
        insert_node(&conn, node)?;
        Ok(())
    }

    /// Insert-or-replace a batch of nodes in one transaction
    pub fn upsert_nodes(&self, nodes: &[Node]) -> crate::Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for node in nodes {
            insert_node(&tx, node)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_node(&self, node_id: &str) -> crate::Result<Option<Node>> {
        let conn = self.conn();
        let node = conn
            .query_row(
                "SELECT id, kind, name, file_path, line_start, line_end, parent_id,
                        signature, docstring, decorators, is_external, file_hash, indexed_at
                 FROM nodes WHERE id = ?",
                params![node_id],
                node_from_row,
            )
            .optional()?;
        Ok(node)
    }

    pub fn list_nodes(
        &self,
        file_path: Option<&str>,
        kind: Option<NodeKind>,
        name: Option<&str>,
        external: Option<bool>,
    ) -> crate::Result<Vec<Node>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(fp) = file_path {
            clauses.push("file_path = ?");
            values.push(Box::new(fp.to_string()));
        }
        if let Some(k) = kind {
            clauses.push("kind = ?");
            values.push(Box::new(k.as_str()));
        }
        if let Some(n) = name {
            clauses.push("name = ?");
            values.push(Box::new(n.to_string()));
        }
        if let Some(ext) = external {
            clauses.push("is_external = ?");
            values.push(Box::new(ext as i64));
        }
        let sql = format!(
            "SELECT id, kind, name, file_path, line_start, line_end, parent_id,
                    signature, docstring, decorators, is_external, file_hash, indexed_at
             FROM nodes{}",
            where_clause(&clauses)
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(&*params, node_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Bulk delete by file; descendants follow via the parent_id cascade.
    pub fn delete_nodes_for_file(&self, file_path: &str) -> crate::Result<usize> {
        let conn = self.conn();
        let count = conn.execute("DELETE FROM nodes WHERE file_path = ?", params![file_path])?;
        Ok(count)
    }

    // ── Edges ──────────────────────────────────────────────

    pub fn upsert_edge(&self, edge: &Edge) -> crate::Result<()> {
        let conn = self.conn();
        insert_edge(&conn, edge)?;
        Ok(())
    }

    pub fn upsert_edges(&self, edges: &[Edge]) -> crate::Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for edge in edges {
            insert_edge(&tx, edge)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_edges(
        &self,
        source_id: Option<&str>,
        target_id: Option<&str>,
        kind: Option<EdgeKind>,
    ) -> crate::Result<Vec<Edge>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(s) = source_id {
            clauses.push("source_id = ?");
            values.push(Box::new(s.to_string()));
        }
        if let Some(t) = target_id {
            clauses.push("target_id = ?");
            values.push(Box::new(t.to_string()));
        }
        if let Some(k) = kind {
            clauses.push("kind = ?");
            values.push(Box::new(k.as_str()));
        }
        let sql = format!(
            "SELECT id, source_id, target_id, kind, file_path, line, resolved FROM edges{}",
            where_clause(&clauses)
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(&*params, edge_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn delete_edges_for_file(&self, file_path: &str) -> crate::Result<usize> {
        let conn = self.conn();
        let count = conn.execute("DELETE FROM edges WHERE file_path = ?", params![file_path])?;
        Ok(count)
    }

    // ── Observations ───────────────────────────────────────

    pub fn add_observation(&self, obs: &Observation) -> crate::Result<i64> {
        let tags = serde_json::to_string(&obs.tags)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO observations (content, node_id, tags, created_at, source)
             VALUES (?, ?, ?, ?, ?)",
            params![obs.content, obs.node_id, tags, obs.created_at, obs.source],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_observation(&self, obs_id: i64) -> crate::Result<Option<Observation>> {
        let conn = self.conn();
        let obs = conn
            .query_row(
                "SELECT id, content, node_id, tags, created_at, source
                 FROM observations WHERE id = ?",
                params![obs_id],
                observation_from_row,
            )
            .optional()?;
        Ok(obs)
    }

    /// Newest-first. Tag filtering matches the literal `\"TAG\"` substring of
    /// the JSON-encoded tag array.
    pub fn list_observations(
        &self,
        node_id: Option<&str>,
        tag: Option<&str>,
    ) -> crate::Result<Vec<Observation>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(n) = node_id {
            clauses.push("node_id = ?");
            values.push(Box::new(n.to_string()));
        }
        if let Some(t) = tag {
            clauses.push("tags LIKE ?");
            values.push(Box::new(format!("%\"{t}\"%")));
        }
        let sql = format!(
            "SELECT id, content, node_id, tags, created_at, source
             FROM observations{} ORDER BY created_at DESC",
            where_clause(&clauses)
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(&*params, observation_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Observations created strictly after `since` (epoch seconds), newest first.
    pub fn list_observations_since(
        &self,
        since: f64,
        source: Option<&str>,
        limit: Option<usize>,
    ) -> crate::Result<Vec<Observation>> {
        let mut sql = String::from(
            "SELECT id, content, node_id, tags, created_at, source
             FROM observations WHERE created_at > ?",
        );
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(since)];
        if let Some(s) = source {
            sql.push_str(" AND source = ?");
            values.push(Box::new(s.to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC");
        if let Some(n) = limit {
            sql.push_str(" LIMIT ?");
            values.push(Box::new(n as i64));
        }
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(&*params, observation_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn delete_observation(&self, obs_id: i64) -> crate::Result<bool> {
        let conn = self.conn();
        let count = conn.execute("DELETE FROM observations WHERE id = ?", params![obs_id])?;
        Ok(count > 0)
    }

    // ── Indexed files ──────────────────────────────────────

    pub fn upsert_indexed_file(&self, file: &IndexedFile) -> crate::Result<()> {
        let conn = self.conn();
        insert_indexed_file(&conn, file)?;
        Ok(())
    }

    pub fn get_indexed_file(&self, file_path: &str) -> crate::Result<Option<IndexedFile>> {
        let conn = self.conn();
        let file = conn
            .query_row(
                "SELECT file_path, file_hash, indexed_at, node_count
                 FROM indexed_files WHERE file_path = ?",
                params![file_path],
                indexed_file_from_row,
            )
            .optional()?;
        Ok(file)
    }

    pub fn delete_indexed_file(&self, file_path: &str) -> crate::Result<bool> {
        let conn = self.conn();
        let count = conn.execute(
            "DELETE FROM indexed_files WHERE file_path = ?",
            params![file_path],
        )?;
        Ok(count > 0)
    }

    /// All ingested files, lexicographic by path
    pub fn list_indexed_files(&self) -> crate::Result<Vec<IndexedFile>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT file_path, file_hash, indexed_at, node_count
             FROM indexed_files ORDER BY file_path",
        )?;
        let rows = stmt.query_map([], indexed_file_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Files indexed strictly after `since`, most recent first
    pub fn list_recently_indexed_files(
        &self,
        since: f64,
        limit: Option<usize>,
    ) -> crate::Result<Vec<IndexedFile>> {
        let mut sql = String::from(
            "SELECT file_path, file_hash, indexed_at, node_count
             FROM indexed_files WHERE indexed_at > ? ORDER BY indexed_at DESC",
        );
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(since)];
        if let Some(n) = limit {
            sql.push_str(" LIMIT ?");
            values.push(Box::new(n as i64));
        }
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(&*params, indexed_file_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ── Batch write ────────────────────────────────────────

    /// Replace a file's derived rows in one transaction: purge nodes and
    /// edges for the file, write the new batch, stamp the indexed-file row.
    /// Readers observe the pre-state or the post-state, never a mixture.
    pub fn apply_index_batch(
        &self,
        file_path: &str,
        nodes: &[Node],
        edges: &[Edge],
        file: &IndexedFile,
    ) -> crate::Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM nodes WHERE file_path = ?", params![file_path])?;
        tx.execute("DELETE FROM edges WHERE file_path = ?", params![file_path])?;
        for node in nodes {
            insert_node(&tx, node)?;
        }
        for edge in edges {
            insert_edge(&tx, edge)?;
        }
        insert_indexed_file(&tx, file)?;
        tx.commit()?;
        Ok(())
    }

    // ── Stats ──────────────────────────────────────────────

    pub fn stats(&self) -> crate::Result<StoreStats> {
        let conn = self.conn();
        let count = |table: &str| -> rusqlite::Result<usize> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, i64>(0).map(|n| n as usize)
            })
        };
        Ok(StoreStats {
            nodes: count("nodes")?,
            edges: count("edges")?,
            observations: count("observations")?,
            indexed_files: count("indexed_files")?,
        })
    }
}

fn where_clause(clauses: &[&str]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn insert_node(conn: &Connection, node: &Node) -> crate::Result<()> {
    let decorators = serde_json::to_string(&node.decorators)?;
    conn.execute(
        "INSERT INTO nodes (id, kind, name, file_path, line_start, line_end,
                            parent_id, signature, docstring, decorators,
                            is_external, file_hash, indexed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           kind=excluded.kind, name=excluded.name, file_path=excluded.file_path,
           line_start=excluded.line_start, line_end=excluded.line_end,
           parent_id=excluded.parent_id, signature=excluded.signature,
           docstring=excluded.docstring, decorators=excluded.decorators,
           is_external=excluded.is_external, file_hash=excluded.file_hash,
           indexed_at=excluded.indexed_at",
        params![
            node.id,
            node.kind.as_str(),
            node.name,
            node.file_path,
            node.line_start as i64,
            node.line_end as i64,
            node.parent_id,
            node.signature,
            node.docstring,
            decorators,
            node.is_external as i64,
            node.file_hash,
            node.indexed_at,
        ],
    )?;
    Ok(())
}

fn insert_edge(conn: &Connection, edge: &Edge) -> crate::Result<()> {
    conn.execute(
        "INSERT INTO edges (source_id, target_id, kind, file_path, line, resolved)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(source_id, target_id, kind) DO UPDATE SET
           file_path=excluded.file_path, line=excluded.line, resolved=excluded.resolved",
        params![
            edge.source_id,
            edge.target_id,
            edge.kind.as_str(),
            edge.file_path,
            edge.line.map(|l| l as i64),
            edge.resolved as i64,
        ],
    )?;
    Ok(())
}

fn insert_indexed_file(conn: &Connection, file: &IndexedFile) -> crate::Result<()> {
    conn.execute(
        "INSERT INTO indexed_files (file_path, file_hash, indexed_at, node_count)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(file_path) DO UPDATE SET
           file_hash=excluded.file_hash, indexed_at=excluded.indexed_at,
           node_count=excluded.node_count",
        params![
            file.file_path,
            file.file_hash,
            file.indexed_at,
            file.node_count as i64,
        ],
    )?;
    Ok(())
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<Node> {
    let kind: String = row.get(1)?;
    let decorators: Option<String> = row.get(9)?;
    Ok(Node {
        id: row.get(0)?,
        kind: NodeKind::parse(&kind).unwrap_or(NodeKind::Module),
        name: row.get(2)?,
        file_path: row.get(3)?,
        line_start: row.get::<_, i64>(4)? as usize,
        line_end: row.get::<_, i64>(5)? as usize,
        parent_id: row.get(6)?,
        signature: row.get(7)?,
        docstring: row.get(8)?,
        decorators: decorators
            .and_then(|d| serde_json::from_str(&d).ok())
            .unwrap_or_default(),
        is_external: row.get::<_, i64>(10)? != 0,
        file_hash: row.get(11)?,
        indexed_at: row.get(12)?,
    })
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<Edge> {
    let kind: String = row.get(3)?;
    Ok(Edge {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        kind: EdgeKind::parse(&kind).unwrap_or(EdgeKind::Calls),
        file_path: row.get(4)?,
        line: row.get::<_, Option<i64>>(5)?.map(|l| l as usize),
        resolved: row.get::<_, i64>(6)? != 0,
    })
}

fn observation_from_row(row: &Row<'_>) -> rusqlite::Result<Observation> {
    let tags: Option<String> = row.get(3)?;
    Ok(Observation {
        id: row.get(0)?,
        content: row.get(1)?,
        node_id: row.get(2)?,
        tags: tags
            .and_then(|t| serde_json::from_str(&t).ok())
            .unwrap_or_default(),
        created_at: row.get(4)?,
        source: row.get(5)?,
    })
}

fn indexed_file_from_row(row: &Row<'_>) -> rusqlite::Result<IndexedFile> {
    Ok(IndexedFile {
        file_path: row.get(0)?,
        file_hash: row.get(1)?,
        indexed_at: row.get(2)?,
        node_count: row.get::<_, i64>(3)? as usize,
    })
}
