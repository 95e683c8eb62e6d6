//! SQLite fact store.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::{Database, from_millis, to_millis};
use crate::error::Result;
use crate::store::{FactStore, Removal};
use crate::types::Fact;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS facts (
    owner_id    TEXT NOT NULL,
    key         TEXT NOT NULL,
    value       TEXT NOT NULL,
    confidence  REAL NOT NULL,
    source      TEXT NOT NULL DEFAULT '',
    observed_at INTEGER NOT NULL,
    redacted    INTEGER NOT NULL DEFAULT 0,
    updated_at  INTEGER NOT NULL,
    PRIMARY KEY (owner_id, key)
);
CREATE INDEX IF NOT EXISTS idx_facts_owner_rank
    ON facts (owner_id, confidence DESC, observed_at DESC);
";

const COLUMNS: &str = "owner_id, key, value, confidence, source, observed_at, redacted";

/// Fact store over a single `facts` table.
pub struct SqliteFactStore {
    db: Database,
}

impl SqliteFactStore {
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
            "SELECT COUNT(*) FROM facts WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn map_fact(row: &rusqlite::Row) -> rusqlite::Result<Fact> {
        Ok(Fact {
            owner_id: row.get(0)?,
            key: row.get(1)?,
            value: row.get(2)?,
            confidence: row.get(3)?,
            source: row.get(4)?,
            observed_at: from_millis(row.get(5)?),
            redacted: row.get(6)?,
        })
    }
}

#[async_trait]
impl FactStore for SqliteFactStore {
    async fn upsert(&self, fact: &Fact) -> Result<()> {
        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO facts
             (owner_id, key, value, confidence, source, observed_at, redacted, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
             ON CONFLICT (owner_id, key) DO UPDATE SET
                value = excluded.value,
                confidence = excluded.confidence,
                source = excluded.source,
                observed_at = excluded.observed_at,
                redacted = 0,
                updated_at = excluded.updated_at",
            params![
                fact.owner_id,
                fact.key,
                fact.value,
                fact.confidence,
                fact.source,
                to_millis(fact.observed_at),
                to_millis(Utc::now()),
            ],
        )?;
        Ok(())
    }

    async fn get(&self, owner_id: &str, min_confidence: f64) -> Result<Vec<Fact>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM facts
             WHERE owner_id = ?1 AND redacted = 0 AND confidence >= ?2
             ORDER BY confidence DESC, observed_at DESC",
            COLUMNS
        ))?;
        let facts = stmt
            .query_map(params![owner_id, min_confidence], Self::map_fact)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(facts)
    }

    async fn find(&self, owner_id: &str, key: &str) -> Result<Option<Fact>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM facts WHERE owner_id = ?1 AND key = ?2",
            COLUMNS
        ))?;
        Ok(stmt.query_row(params![owner_id, key], Self::map_fact).optional()?)
    }

    async fn remove(&self, owner_id: &str, key: &str, mode: Removal) -> Result<bool> {
        let conn = self.db.lock()?;
        let changed = match mode {
            Removal::Redact => conn.execute(
                "UPDATE facts SET redacted = 1, updated_at = ?3
                 WHERE owner_id = ?1 AND key = ?2 AND redacted = 0",
                params![owner_id, key, to_millis(Utc::now())],
            )?,
            Removal::Delete => conn.execute(
                "DELETE FROM facts WHERE owner_id = ?1 AND key = ?2",
                params![owner_id, key],
            )?,
        };
        Ok(changed > 0)
    }

    async fn count(&self, owner_id: &str) -> Result<usize> {
        let conn = self.db.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM facts WHERE owner_id = ?1 AND redacted = 0",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn store() -> SqliteFactStore {
        SqliteFactStore::in_memory().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = store();
        let fact = Fact::new("acme", "match_formula", "100% of first 3%", 0.9);

        store.upsert(&fact).await.unwrap();
        store.upsert(&fact).await.unwrap();

        assert_eq!(store.count_rows("acme").unwrap(), 1);
        let facts = store.get("acme", 0.6).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].value, "100% of first 3%");
    }

    #[tokio::test]
    async fn test_last_write_wins_by_arrival() {
        let store = store();
        let now = Utc::now();
        store
            .upsert(&Fact::new("acme", "plan_size", "120", 0.8).with_observed_at(now))
            .await
            .unwrap();
        // Older timestamp, but arrives later.
        store
            .upsert(
                &Fact::new("acme", "plan_size", "150", 0.7)
                    .with_observed_at(now - Duration::days(3)),
            )
            .await
            .unwrap();

        let fact = store.find("acme", "plan_size").await.unwrap().unwrap();
        assert_eq!(fact.value, "150");
        assert_eq!(fact.confidence, 0.7);
    }

    #[tokio::test]
    async fn test_get_filters_and_orders() {
        let store = store();
        let now = Utc::now();
        store
            .upsert(&Fact::new("acme", "a", "1", 0.7).with_observed_at(now))
            .await
            .unwrap();
        store
            .upsert(&Fact::new("acme", "b", "2", 0.9).with_observed_at(now - Duration::days(1)))
            .await
            .unwrap();
        store
            .upsert(&Fact::new("acme", "c", "3", 0.9).with_observed_at(now))
            .await
            .unwrap();
        store.upsert(&Fact::new("acme", "d", "4", 0.5)).await.unwrap();
        store.upsert(&Fact::new("other", "a", "x", 0.99)).await.unwrap();

        let keys: Vec<String> = store
            .get("acme", 0.6)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.key)
            .collect();
        assert_eq!(keys, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_redact_hides_but_keeps_row() {
        let store = store();
        store.upsert(&Fact::new("acme", "k", "v", 0.9)).await.unwrap();

        assert!(store.remove("acme", "k", Removal::Redact).await.unwrap());
        assert!(!store.remove("acme", "k", Removal::Redact).await.unwrap());

        assert!(store.get("acme", 0.0).await.unwrap().is_empty());
        let row = store.find("acme", "k").await.unwrap().unwrap();
        assert!(row.redacted);
        assert_eq!(store.count_rows("acme").unwrap(), 1);
        assert_eq!(store.count("acme").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_removes_row() {
        let store = store();
        store.upsert(&Fact::new("acme", "k", "v", 0.9)).await.unwrap();

        assert!(store.remove("acme", "k", Removal::Delete).await.unwrap());
        assert!(store.find("acme", "k").await.unwrap().is_none());
        assert_eq!(store.count_rows("acme").unwrap(), 0);
        assert!(!store.remove("acme", "k", Removal::Delete).await.unwrap());
    }

    #[tokio::test]
    async fn test_rewrite_after_redaction_is_visible() {
        let store = store();
        store.upsert(&Fact::new("acme", "k", "old", 0.9)).await.unwrap();
        store.remove("acme", "k", Removal::Redact).await.unwrap();
        store.upsert(&Fact::new("acme", "k", "new", 0.9)).await.unwrap();

        let facts = store.get("acme", 0.6).await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].value, "new");
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("facts.db");

        {
            let store = SqliteFactStore::new(Database::open_path(&path).unwrap()).unwrap();
            store.upsert(&Fact::new("acme", "k", "v", 0.9)).await.unwrap();
        }

        let store = SqliteFactStore::new(Database::open_path(&path).unwrap()).unwrap();
        assert_eq!(store.get("acme", 0.6).await.unwrap().len(), 1);
    }
}
