//! SQLite episode store.
//!
//! Embeddings are stored as little-endian f32 blobs and ranked by exhaustive
//! cosine distance over the owner's candidate rows.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::{Database, cutoff_millis, from_millis, to_millis};
use crate::error::Result;
use crate::store::{EpisodeCount, EpisodeStore, Removal};
use crate::types::{Episode, EpisodeMatch};
use crate::vector::{cosine_similarity, decode_embedding, encode_embedding};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS episodes (
    id           TEXT PRIMARY KEY,
    owner_id     TEXT NOT NULL,
    text         TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    embedding    BLOB NOT NULL,
    importance   REAL NOT NULL,
    tags         TEXT NOT NULL DEFAULT '[]',
    channel      TEXT NOT NULL DEFAULT '',
    thread_id    TEXT,
    entities     TEXT NOT NULL DEFAULT '[]',
    observed_at  INTEGER NOT NULL,
    redacted     INTEGER NOT NULL DEFAULT 0,
    created_at   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_episodes_owner_time ON episodes (owner_id, observed_at DESC);

CREATE TABLE IF NOT EXISTS episode_fact_keys (
    episode_id TEXT NOT NULL,
    owner_id   TEXT NOT NULL,
    fact_key   TEXT NOT NULL,
    PRIMARY KEY (episode_id, fact_key)
);
CREATE INDEX IF NOT EXISTS idx_episode_fact_keys_key ON episode_fact_keys (owner_id, fact_key);
";

const COLUMNS: &str = "id, owner_id, text, content_hash, embedding, importance, tags, channel,
    thread_id, entities, observed_at, redacted";

/// Episode store over `episodes` plus a fact-key link table.
pub struct SqliteEpisodeStore {
    db: Database,
}

impl SqliteEpisodeStore {
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

    /// Physical row count for an owner, redacted rows included.
    pub fn count_rows(&self, owner_id: &str) -> Result<usize> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM episodes WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Fact keys are filled in separately from the link table.
    fn map_episode(row: &rusqlite::Row) -> rusqlite::Result<Episode> {
        let blob: Vec<u8> = row.get(4)?;
        let tags: String = row.get(6)?;
        let entities: String = row.get(9)?;
        Ok(Episode {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            text: row.get(2)?,
            content_hash: row.get(3)?,
            embedding: decode_embedding(&blob),
            importance: row.get(5)?,
            tags: serde_json::from_str::<BTreeSet<String>>(&tags).unwrap_or_default(),
            channel: row.get(7)?,
            thread_id: row.get(8)?,
            fact_keys: Vec::new(),
            entities: serde_json::from_str(&entities).unwrap_or_default(),
            observed_at: from_millis(row.get(10)?),
            redacted: row.get(11)?,
        })
    }

    fn attach_fact_keys(conn: &rusqlite::Connection, episode: &mut Episode) -> Result<()> {
        let mut stmt = conn.prepare_cached(
            "SELECT fact_key FROM episode_fact_keys WHERE episode_id = ?1 ORDER BY fact_key",
        )?;
        episode.fact_keys = stmt
            .query_map(params![episode.id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(())
    }
}

#[async_trait]
impl EpisodeStore for SqliteEpisodeStore {
    async fn upsert(&self, episode: &Episode) -> Result<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR REPLACE INTO episodes
             (id, owner_id, text, content_hash, embedding, importance, tags, channel,
              thread_id, entities, observed_at, redacted, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                episode.id,
                episode.owner_id,
                episode.text,
                episode.content_hash,
                encode_embedding(&episode.embedding),
                episode.importance,
                serde_json::to_string(&episode.tags)?,
                episode.channel,
                episode.thread_id,
                serde_json::to_string(&episode.entities)?,
                to_millis(episode.observed_at),
                episode.redacted,
                to_millis(Utc::now()),
            ],
        )?;

        tx.execute(
            "DELETE FROM episode_fact_keys WHERE episode_id = ?1",
            params![episode.id],
        )?;
        for key in &episode.fact_keys {
            tx.execute(
                "INSERT OR IGNORE INTO episode_fact_keys (episode_id, owner_id, fact_key)
                 VALUES (?1, ?2, ?3)",
                params![episode.id, episode.owner_id, key],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    async fn query_similar(
        &self,
        owner_id: &str,
        embedding: &[f32],
        k: usize,
        since_days: Option<u32>,
    ) -> Result<Vec<EpisodeMatch>> {
        let cutoff = since_days.and_then(cutoff_millis).unwrap_or(i64::MIN);
        let conn = self.db.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM episodes
             WHERE owner_id = ?1 AND redacted = 0 AND observed_at >= ?2",
            COLUMNS
        ))?;
        let candidates = stmt
            .query_map(params![owner_id, cutoff], Self::map_episode)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut matches: Vec<EpisodeMatch> = candidates
            .into_iter()
            .map(|episode| {
                let similarity = cosine_similarity(&episode.embedding, embedding);
                EpisodeMatch {
                    distance: 1.0 - f64::from(similarity),
                    episode,
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.episode.observed_at.cmp(&a.episode.observed_at))
        });
        matches.truncate(k);

        for m in &mut matches {
            Self::attach_fact_keys(&conn, &mut m.episode)?;
        }
        Ok(matches)
    }

    async fn list_recent(
        &self,
        owner_id: &str,
        since_days: u32,
        limit: usize,
    ) -> Result<Vec<Episode>> {
        let cutoff = cutoff_millis(since_days).unwrap_or(i64::MIN);
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM episodes
             WHERE owner_id = ?1 AND redacted = 0 AND observed_at >= ?2
             ORDER BY observed_at DESC
             LIMIT ?3",
            COLUMNS
        ))?;
        let mut episodes = stmt
            .query_map(
                params![owner_id, cutoff, limit as i64],
                Self::map_episode,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for episode in &mut episodes {
            Self::attach_fact_keys(&conn, episode)?;
        }
        Ok(episodes)
    }

    async fn find(&self, id: &str) -> Result<Option<Episode>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM episodes WHERE id = ?1", COLUMNS))?;
        let episode = stmt.query_row(params![id], Self::map_episode).optional()?;

        match episode {
            Some(mut episode) => {
                Self::attach_fact_keys(&conn, &mut episode)?;
                Ok(Some(episode))
            }
            None => Ok(None),
        }
    }

    async fn ids_for_fact_key(&self, owner_id: &str, key: &str) -> Result<Vec<String>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT episode_id FROM episode_fact_keys
             WHERE owner_id = ?1 AND fact_key = ?2
             ORDER BY episode_id",
        )?;
        let ids = stmt
            .query_map(params![owner_id, key], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    async fn remove(&self, id: &str, mode: Removal) -> Result<bool> {
        let mut conn = self.db.lock()?;
        let changed = match mode {
            Removal::Redact => conn.execute(
                "UPDATE episodes SET redacted = 1 WHERE id = ?1 AND redacted = 0",
                params![id],
            )?,
            Removal::Delete => {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM episode_fact_keys WHERE episode_id = ?1", params![id])?;
                let changed = tx.execute("DELETE FROM episodes WHERE id = ?1", params![id])?;
                tx.commit()?;
                changed
            }
        };
        Ok(changed > 0)
    }

    async fn count(&self, owner_id: &str) -> Result<EpisodeCount> {
        let conn = self.db.lock()?;
        let (total, distinct): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT content_hash) FROM episodes
             WHERE owner_id = ?1 AND redacted = 0",
            params![owner_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(EpisodeCount {
            total: total as usize,
            distinct_texts: distinct as usize,
        })
    }
}
