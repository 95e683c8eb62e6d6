//! SQLite graph store.
//!
//! Nodes and edges live in two tables. Traversal is undirected and
//! breadth-first, done in Rust one hop at a time:
//!
//! ```text
//!   owner:acme ──HAS_FACT──► fact:acme:match_formula
//!       │
//!       └──HAS_EPISODE──► episode:… ──MENTIONS──► entity:Plan:401k ──HAS_FORMULA──► …
//! ```
//!
//! A walk never enters owner, fact or episode nodes belonging to another
//! owner. Entity nodes are global and may be shared between owners.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value};

use super::{Database, cutoff_millis, from_millis, to_millis};
use crate::error::Result;
use crate::store::{GraphCounts, GraphStore, Removal, RemovalCount};
use crate::types::{
    Entity, EntityRef, EntityType, Fact, GraphEdge, GraphNode, GraphPath, NodeKind, Predicate,
    Triple, node_id,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS graph_nodes (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    label       TEXT NOT NULL,
    owner_id    TEXT,
    entity_type TEXT,
    properties  TEXT NOT NULL DEFAULT '{}',
    aliases     TEXT NOT NULL DEFAULT '[]',
    observed_at INTEGER,
    redacted    INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_graph_nodes_label ON graph_nodes (kind, label);

CREATE TABLE IF NOT EXISTS graph_edges (
    source_id   TEXT NOT NULL,
    target_id   TEXT NOT NULL,
    label       TEXT NOT NULL,
    is_triple   INTEGER NOT NULL DEFAULT 0,
    properties  TEXT NOT NULL DEFAULT '{}',
    observed_at INTEGER,
    redacted    INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL,
    PRIMARY KEY (source_id, label, target_id)
);
CREATE INDEX IF NOT EXISTS idx_graph_edges_target ON graph_edges (target_id);
";

/// Hop limit for shortest-path and reachability walks.
const MAX_PATH_DEPTH: usize = 6;
/// Hop limit for path enumeration.
const MAX_LISTED_PATH_DEPTH: usize = 5;
/// Hop limit and node cap for `subgraph`.
const SUBGRAPH_DEPTH: usize = 3;
const SUBGRAPH_NODE_LIMIT: usize = 100;
/// Partial paths expanded before `find_paths` gives up.
const MAX_PATH_EXPANSIONS: usize = 5_000;

const HAS_FACT: &str = "HAS_FACT";
const HAS_EPISODE: &str = "HAS_EPISODE";
const MENTIONS: &str = "MENTIONS";

/// One hop out of a node.
struct Hop {
    edge: GraphEdge,
    node_id: String,
    kind: String,
    label: String,
}

/// Graph store over `graph_nodes` and `graph_edges`.
pub struct SqliteGraphStore {
    db: Database,
}

impl SqliteGraphStore {
    pub fn new(db: Database) -> Result<Self> {
        db.migrate(SCHEMA)?;
        Ok(Self { db })
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(Database::open_in_memory()?)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Load a node by id, redacted or not.
    pub fn node(&self, id: &str) -> Result<Option<(GraphNode, bool)>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, label, entity_type, properties, observed_at, redacted, aliases
             FROM graph_nodes WHERE id = ?1",
        )?;
        Ok(stmt
            .query_row(params![id], |row| Ok((Self::map_node(row)?, row.get(6)?)))
            .optional()?)
    }

    /// Aliases of an entity node.
    pub fn aliases(&self, id: &str) -> Result<Vec<String>> {
        let conn = self.db.lock()?;
        let raw: Option<String> = conn
            .query_row("SELECT aliases FROM graph_nodes WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(raw
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default())
    }

    /// Stored properties of an edge, redacted or not.
    pub fn edge_properties(
        &self,
        source_id: &str,
        label: &str,
        target_id: &str,
    ) -> Result<Option<(Map<String, Value>, bool)>> {
        let conn = self.db.lock()?;
        let row: Option<(String, bool)> = conn
            .query_row(
                "SELECT properties, redacted FROM graph_edges
                 WHERE source_id = ?1 AND label = ?2 AND target_id = ?3",
                params![source_id, label, target_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(props, redacted)| (parse_map(&props), redacted)))
    }

    fn map_node(row: &rusqlite::Row) -> rusqlite::Result<GraphNode> {
        let kind: String = row.get(1)?;
        let kind = kind.parse::<NodeKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
        })?;
        let entity_type: Option<String> = row.get(3)?;
        let properties: String = row.get(4)?;
        let observed_at: Option<i64> = row.get(5)?;
        Ok(GraphNode {
            id: row.get(0)?,
            kind,
            label: row.get(2)?,
            entity_type: entity_type.and_then(|t| t.parse::<EntityType>().ok()),
            properties: parse_map(&properties),
            observed_at: observed_at.map(from_millis),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Write helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn ensure_owner(conn: &Connection, owner_id: &str, now: i64) -> Result<String> {
        let id = node_id::owner(owner_id);
        conn.execute(
            "INSERT INTO graph_nodes (id, kind, label, owner_id, created_at, updated_at)
             VALUES (?1, 'owner', ?2, ?2, ?3, ?3)
             ON CONFLICT (id) DO UPDATE SET updated_at = excluded.updated_at",
            params![id, owner_id, now],
        )?;
        Ok(id)
    }

    fn upsert_node(
        conn: &Connection,
        id: &str,
        kind: NodeKind,
        label: &str,
        owner_id: Option<&str>,
        properties: &Map<String, Value>,
        observed_at: Option<i64>,
        now: i64,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO graph_nodes
             (id, kind, label, owner_id, properties, observed_at, redacted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)
             ON CONFLICT (id) DO UPDATE SET
                properties = excluded.properties,
                observed_at = excluded.observed_at,
                redacted = 0,
                updated_at = excluded.updated_at",
            params![
                id,
                kind.as_str(),
                label,
                owner_id,
                Value::Object(properties.clone()).to_string(),
                observed_at,
                now,
            ],
        )?;
        Ok(())
    }

    fn upsert_edge(
        conn: &Connection,
        source_id: &str,
        label: &str,
        target_id: &str,
        is_triple: bool,
        properties: &Map<String, Value>,
        observed_at: Option<i64>,
        now: i64,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO graph_edges
             (source_id, target_id, label, is_triple, properties, observed_at, redacted,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)
             ON CONFLICT (source_id, label, target_id) DO UPDATE SET
                properties = excluded.properties,
                observed_at = excluded.observed_at,
                redacted = 0,
                updated_at = excluded.updated_at",
            params![
                source_id,
                target_id,
                label,
                is_triple,
                Value::Object(properties.clone()).to_string(),
                observed_at,
                now,
            ],
        )?;
        Ok(())
    }

    /// Resolve an entity reference to a node id, creating the node if needed.
    ///
    /// Untyped references prefer an existing typed entity of the same name.
    fn resolve_entity(conn: &Connection, entity: &EntityRef, now: i64) -> Result<String> {
        let id = match entity.entity_type {
            Some(t) => node_id::entity(&entity.name, Some(t)),
            None => {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT id FROM graph_nodes
                         WHERE kind = 'entity' AND label = ?1 AND redacted = 0
                         ORDER BY entity_type IS NULL, created_at
                         LIMIT 1",
                        params![entity.name],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(id) = existing {
                    return Ok(id);
                }
                node_id::entity(&entity.name, None)
            }
        };

        conn.execute(
            "INSERT INTO graph_nodes (id, kind, label, entity_type, created_at, updated_at)
             VALUES (?1, 'entity', ?2, ?3, ?4, ?4)
             ON CONFLICT (id) DO NOTHING",
            params![id, entity.name, entity.entity_type.map(|t| t.as_str()), now],
        )?;
        Ok(id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Traversal
    // ─────────────────────────────────────────────────────────────────────────

    /// Live hops out of `node`, staying inside `owner_id`'s partition.
    fn hops(conn: &Connection, node: &str, owner_id: &str, cutoff: Option<i64>) -> Result<Vec<Hop>> {
        let mut stmt = conn.prepare_cached(
            "SELECT e.source_id, e.target_id, e.label, n.id, n.kind, n.label
             FROM graph_edges e
             JOIN graph_nodes n
               ON n.id = CASE WHEN e.source_id = ?1 THEN e.target_id ELSE e.source_id END
             WHERE (e.source_id = ?1 OR e.target_id = ?1)
               AND e.redacted = 0
               AND n.redacted = 0
               AND (n.owner_id IS NULL OR n.owner_id = ?2)
               AND (?3 IS NULL OR e.observed_at IS NULL OR e.observed_at >= ?3)
             ORDER BY n.id",
        )?;
        let hops = stmt
            .query_map(params![node, owner_id, cutoff], |row| {
                Ok(Hop {
                    edge: GraphEdge {
                        source_id: row.get(0)?,
                        target_id: row.get(1)?,
                        label: row.get(2)?,
                    },
                    node_id: row.get(3)?,
                    kind: row.get(4)?,
                    label: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hops)
    }

    fn owner_exists(conn: &Connection, owner_id: &str) -> Result<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM graph_nodes WHERE id = ?1",
                params![node_id::owner(owner_id)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Nodes reached breadth-first from the owner node within `max_depth`
    /// hops, nearest first.
    fn reachable(
        conn: &Connection,
        owner_id: &str,
        max_depth: usize,
        cutoff: Option<i64>,
    ) -> Result<Vec<Hop>> {
        let start = node_id::owner(owner_id);
        let mut seen: HashSet<String> = HashSet::from([start.clone()]);
        let mut order = Vec::new();
        let mut queue = VecDeque::from([(start, 0usize)]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for hop in Self::hops(conn, &node, owner_id, cutoff)? {
                if seen.insert(hop.node_id.clone()) {
                    queue.push_back((hop.node_id.clone(), depth + 1));
                    order.push(hop);
                }
            }
        }
        Ok(order)
    }

    fn load_nodes(conn: &Connection, ids: &[String]) -> Result<Vec<GraphNode>> {
        let mut stmt = conn.prepare_cached(
            "SELECT id, kind, label, entity_type, properties, observed_at FROM graph_nodes
             WHERE id = ?1",
        )?;
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(node) = stmt.query_row(params![id], Self::map_node).optional()? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Removal helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn remove_node(conn: &Connection, id: &str, mode: Removal) -> Result<RemovalCount> {
        let now = to_millis(Utc::now());
        let count = match mode {
            Removal::Redact => RemovalCount {
                edges: conn.execute(
                    "UPDATE graph_edges SET redacted = 1, updated_at = ?2
                     WHERE (source_id = ?1 OR target_id = ?1) AND redacted = 0",
                    params![id, now],
                )?,
                nodes: conn.execute(
                    "UPDATE graph_nodes SET redacted = 1, updated_at = ?2
                     WHERE id = ?1 AND redacted = 0",
                    params![id, now],
                )?,
            },
            Removal::Delete => RemovalCount {
                edges: conn.execute(
                    "DELETE FROM graph_edges WHERE source_id = ?1 OR target_id = ?1",
                    params![id],
                )?,
                nodes: conn.execute("DELETE FROM graph_nodes WHERE id = ?1", params![id])?,
            },
        };
        Ok(count)
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn upsert_owner(&self, owner_id: &str) -> Result<()> {
        let conn = self.db.lock()?;
        Self::ensure_owner(&conn, owner_id, to_millis(Utc::now()))?;
        Ok(())
    }

    async fn upsert_entity(&self, entity: &Entity) -> Result<()> {
        let conn = self.db.lock()?;
        let id = node_id::entity(&entity.name, Some(entity.entity_type));
        let now = to_millis(Utc::now());

        let existing: Option<String> = conn
            .query_row("SELECT aliases FROM graph_nodes WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        let mut aliases: Vec<String> = existing
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        for alias in &entity.aliases {
            if !aliases.contains(alias) {
                aliases.push(alias.clone());
            }
        }

        conn.execute(
            "INSERT INTO graph_nodes
             (id, kind, label, entity_type, aliases, redacted, created_at, updated_at)
             VALUES (?1, 'entity', ?2, ?3, ?4, 0, ?5, ?5)
             ON CONFLICT (id) DO UPDATE SET
                aliases = excluded.aliases,
                redacted = 0,
                updated_at = excluded.updated_at",
            params![
                id,
                entity.name,
                entity.entity_type.as_str(),
                serde_json::to_string(&aliases)?,
                now,
            ],
        )?;
        Ok(())
    }

    async fn upsert_fact_node(&self, fact: &Fact) -> Result<()> {
        let conn = self.db.lock()?;
        let now = to_millis(Utc::now());
        let owner = Self::ensure_owner(&conn, &fact.owner_id, now)?;
        let id = node_id::fact(&fact.owner_id, &fact.key);
        let observed_at = to_millis(fact.observed_at);

        let mut properties = Map::new();
        properties.insert("value".into(), Value::from(fact.value.clone()));
        properties.insert("confidence".into(), Value::from(fact.confidence));
        properties.insert("source".into(), Value::from(fact.source.clone()));

        Self::upsert_node(
            &conn,
            &id,
            NodeKind::Fact,
            &fact.key,
            Some(&fact.owner_id),
            &properties,
            Some(observed_at),
            now,
        )?;
        Self::upsert_edge(&conn, &owner, HAS_FACT, &id, false, &Map::new(), Some(observed_at), now)
    }

    async fn upsert_episode_node(
        &self,
        owner_id: &str,
        episode_id: &str,
        observed_at: DateTime<Utc>,
        entities: &[EntityRef],
    ) -> Result<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        let now = to_millis(Utc::now());
        let observed_at = to_millis(observed_at);

        let owner = Self::ensure_owner(&tx, owner_id, now)?;
        let id = node_id::episode(episode_id);
        Self::upsert_node(
            &tx,
            &id,
            NodeKind::Episode,
            episode_id,
            Some(owner_id),
            &Map::new(),
            Some(observed_at),
            now,
        )?;
        Self::upsert_edge(&tx, &owner, HAS_EPISODE, &id, false, &Map::new(), Some(observed_at), now)?;

        for entity in entities {
            let entity_id = Self::resolve_entity(&tx, entity, now)?;
            Self::upsert_edge(&tx, &id, MENTIONS, &entity_id, false, &Map::new(), Some(observed_at), now)?;
        }

        tx.commit()?;
        Ok(())
    }

    async fn upsert_triple(
        &self,
        triple: &Triple,
        properties: &Map<String, Value>,
        observed_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        let now = to_millis(Utc::now());
        let observed_at = to_millis(observed_at);

        let subject = Self::resolve_entity(&tx, &triple.subject, now)?;
        let object = Self::resolve_entity(&tx, &triple.object, now)?;
        let label = triple.predicate.as_str();

        let existing: Option<String> = tx
            .query_row(
                "SELECT properties FROM graph_edges
                 WHERE source_id = ?1 AND label = ?2 AND target_id = ?3",
                params![subject, label, object],
                |row| row.get(0),
            )
            .optional()?;

        let mut merged = existing.map(|s| parse_map(&s)).unwrap_or_default();
        merged.extend(triple.properties.clone());
        merged.extend(properties.clone());
        merged.insert("confidence".into(), Value::from(triple.confidence));

        Self::upsert_edge(&tx, &subject, label, &object, true, &merged, Some(observed_at), now)?;
        tx.commit()?;
        Ok(())
    }

    async fn shortest_path_length(&self, owner_id: &str, entity_name: &str) -> Result<Option<u32>> {
        let conn = self.db.lock()?;
        if !Self::owner_exists(&conn, owner_id)? {
            return Ok(None);
        }

        let start = node_id::owner(owner_id);
        let mut seen: HashSet<String> = HashSet::from([start.clone()]);
        let mut queue = VecDeque::from([(start, 0usize)]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= MAX_PATH_DEPTH {
                continue;
            }
            for hop in Self::hops(&conn, &node, owner_id, None)? {
                if hop.kind == NodeKind::Entity.as_str() && hop.label == entity_name {
                    return Ok(Some((depth + 1) as u32));
                }
                if seen.insert(hop.node_id.clone()) {
                    queue.push_back((hop.node_id, depth + 1));
                }
            }
        }
        Ok(None)
    }

    async fn subgraph(&self, owner_id: &str, since_days: Option<u32>) -> Result<Vec<GraphNode>> {
        let cutoff = since_days.and_then(cutoff_millis);
        let conn = self.db.lock()?;
        if !Self::owner_exists(&conn, owner_id)? {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = Self::reachable(&conn, owner_id, SUBGRAPH_DEPTH, cutoff)?
            .into_iter()
            .take(SUBGRAPH_NODE_LIMIT)
            .map(|hop| hop.node_id)
            .collect();
        Self::load_nodes(&conn, &ids)
    }

    async fn entity_names(&self, owner_id: &str) -> Result<Vec<String>> {
        let conn = self.db.lock()?;
        if !Self::owner_exists(&conn, owner_id)? {
            return Ok(Vec::new());
        }

        let mut names: Vec<String> = Vec::new();
        for hop in Self::reachable(&conn, owner_id, MAX_PATH_DEPTH, None)? {
            if hop.kind == NodeKind::Entity.as_str() && !names.contains(&hop.label) {
                names.push(hop.label);
            }
        }
        Ok(names)
    }

    async fn counts(&self, owner_id: &str) -> Result<GraphCounts> {
        let conn = self.db.lock()?;
        if !Self::owner_exists(&conn, owner_id)? {
            return Ok(GraphCounts::default());
        }

        let mut nodes = vec![node_id::owner(owner_id)];
        nodes.extend(
            Self::reachable(&conn, owner_id, MAX_PATH_DEPTH, None)?
                .into_iter()
                .map(|hop| hop.node_id),
        );

        let mut edges: HashSet<(String, String, String)> = HashSet::new();
        for node in &nodes {
            for hop in Self::hops(&conn, node, owner_id, None)? {
                edges.insert((hop.edge.source_id, hop.edge.label, hop.edge.target_id));
            }
        }
        Ok(GraphCounts {
            nodes: nodes.len(),
            edges: edges.len(),
        })
    }

    async fn find_paths(&self, owner_id: &str, entity_name: &str, k: usize) -> Result<Vec<GraphPath>> {
        let conn = self.db.lock()?;
        if k == 0 || !Self::owner_exists(&conn, owner_id)? {
            return Ok(Vec::new());
        }

        let start = node_id::owner(owner_id);
        let mut found: Vec<(Vec<String>, Vec<GraphEdge>)> = Vec::new();
        let mut queue: VecDeque<(Vec<String>, Vec<GraphEdge>)> =
            VecDeque::from([(vec![start], Vec::new())]);
        let mut expansions = 0;

        'search: while let Some((path, edges)) = queue.pop_front() {
            if edges.len() >= MAX_LISTED_PATH_DEPTH {
                continue;
            }
            expansions += 1;
            if expansions > MAX_PATH_EXPANSIONS {
                break;
            }

            let Some(last) = path.last() else { continue };
            for hop in Self::hops(&conn, last, owner_id, None)? {
                if path.contains(&hop.node_id) {
                    continue;
                }
                let mut next_path = path.clone();
                next_path.push(hop.node_id.clone());
                let mut next_edges = edges.clone();
                next_edges.push(hop.edge);

                if hop.kind == NodeKind::Entity.as_str() && hop.label == entity_name {
                    found.push((next_path, next_edges));
                    if found.len() >= k {
                        break 'search;
                    }
                } else {
                    queue.push_back((next_path, next_edges));
                }
            }
        }

        let mut cache: HashMap<String, GraphNode> = HashMap::new();
        let mut paths = Vec::with_capacity(found.len());
        for (ids, edges) in found {
            let missing: Vec<String> = ids.iter().filter(|id| !cache.contains_key(*id)).cloned().collect();
            for node in Self::load_nodes(&conn, &missing)? {
                cache.insert(node.id.clone(), node);
            }
            let nodes = ids.iter().filter_map(|id| cache.get(id).cloned()).collect();
            paths.push(GraphPath { nodes, edges });
        }
        Ok(paths)
    }

    async fn remove_fact_node(&self, owner_id: &str, key: &str, mode: Removal) -> Result<RemovalCount> {
        let conn = self.db.lock()?;
        Self::remove_node(&conn, &node_id::fact(owner_id, key), mode)
    }

    async fn remove_episode_node(&self, episode_id: &str, mode: Removal) -> Result<RemovalCount> {
        let conn = self.db.lock()?;
        Self::remove_node(&conn, &node_id::episode(episode_id), mode)
    }

    async fn remove_entity(&self, name: &str, mode: Removal) -> Result<RemovalCount> {
        let conn = self.db.lock()?;
        let ids: Vec<String> = {
            let mut stmt =
                conn.prepare("SELECT id FROM graph_nodes WHERE kind = 'entity' AND label = ?1")?;
            let ids = stmt
                .query_map(params![name], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ids
        };

        let mut total = RemovalCount::default();
        for id in ids {
            let count = Self::remove_node(&conn, &id, mode)?;
            total.nodes += count.nodes;
            total.edges += count.edges;
        }
        Ok(total)
    }

    async fn remove_predicate_edges(
        &self,
        owner_id: &str,
        predicate: Predicate,
        mode: Removal,
    ) -> Result<RemovalCount> {
        let conn = self.db.lock()?;
        if !Self::owner_exists(&conn, owner_id)? {
            return Ok(RemovalCount::default());
        }

        let now = to_millis(Utc::now());
        let mut edges = 0;
        for hop in Self::reachable(&conn, owner_id, MAX_PATH_DEPTH, None)? {
            let id = hop.node_id;
            edges += match mode {
                Removal::Redact => conn.execute(
                    "UPDATE graph_edges SET redacted = 1, updated_at = ?3
                     WHERE is_triple = 1 AND label = ?1 AND redacted = 0
                       AND (source_id = ?2 OR target_id = ?2)",
                    params![predicate.as_str(), id, now],
                )?,
                Removal::Delete => conn.execute(
                    "DELETE FROM graph_edges
                     WHERE is_triple = 1 AND label = ?1 AND (source_id = ?2 OR target_id = ?2)",
                    params![predicate.as_str(), id],
                )?,
            };
        }
        Ok(RemovalCount { nodes: 0, edges })
    }
}

fn parse_map(raw: &str) -> Map<String, Value> {
    serde_json::from_str(raw).unwrap_or_default()
}
