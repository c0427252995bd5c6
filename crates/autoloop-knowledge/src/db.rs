use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, Connection};
use tokio::sync::Mutex;

use crate::types::{DynamicTool, KnowledgeEntry};

const SCHEMA_VERSION: i64 = 1;

/// Thin async wrapper over a single `rusqlite::Connection`, matching the
/// reference memory crate's choice of an embedded, bundled SQLite
/// database over a server-backed store. Knowledge entries and dynamic
/// tools are each a one-row-per-record table storing a JSON blob;
/// there is no vector index, since similarity here is the rule-based
/// weighted-Jaccard scorer, not nearest-neighbor search.
pub struct KnowledgeDb {
    conn: Arc<Mutex<Connection>>,
}

impl KnowledgeDb {
    pub async fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(10))?;

        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().await;
        let stored_version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS knowledge_entries (
                id TEXT PRIMARY KEY,
                record TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS dynamic_tools (
                id TEXT PRIMARY KEY,
                record TEXT NOT NULL
            );",
        )?;

        if stored_version == 0 {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        } else if stored_version != SCHEMA_VERSION {
            anyhow::bail!("unsupported knowledge db schema version {stored_version}");
        }
        Ok(())
    }

    pub async fn upsert_entry(&self, entry: &KnowledgeEntry) -> anyhow::Result<()> {
        let record = serde_json::to_string(entry)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO knowledge_entries (id, record) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET record = excluded.record",
            params![entry.id, record],
        )?;
        Ok(())
    }

    pub async fn all_entries(&self) -> anyhow::Result<Vec<KnowledgeEntry>> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare("SELECT record FROM knowledge_entries")?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(serde_json::from_str(&row?)?);
        }
        Ok(entries)
    }

    pub async fn upsert_tool(&self, tool: &DynamicTool) -> anyhow::Result<()> {
        let record = serde_json::to_string(tool)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO dynamic_tools (id, record) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET record = excluded.record",
            params![tool.id, record],
        )?;
        Ok(())
    }

    pub async fn all_tools(&self) -> anyhow::Result<Vec<DynamicTool>> {
        let conn = self.conn.lock().await;
        let mut statement = conn.prepare("SELECT record FROM dynamic_tools")?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        let mut tools = Vec::new();
        for row in rows {
            tools.push(serde_json::from_str(&row?)?);
        }
        Ok(tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KnowledgeEntry;
    use chrono::Utc;

    #[tokio::test]
    async fn roundtrips_an_entry() {
        let dir = tempfile::tempdir().unwrap();
        let db = KnowledgeDb::open(&dir.path().join("knowledge.sqlite")).await.unwrap();
        let entry = KnowledgeEntry {
            id: "e1".to_string(),
            title: "t".to_string(),
            tags: vec!["python".to_string()],
            content: "c".to_string(),
            code_examples: vec![],
            success_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        db.upsert_entry(&entry).await.unwrap();
        let all = db.all_entries().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "e1");
    }
}
