//! On-disk offline snapshot
//!
//! The agent's caches outlive the agent. Every cache write goes through to
//! a SQLite database that only the agent touches, separate from the
//! reader's own store, and a new agent starts from whatever the last one
//! left behind.

use reqwest::Url;
use rusqlite::{params, Connection};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::CacheStorage;
use crate::http::{Request, Response};
use crate::AgentError;

/// Agent-owned cache database
pub struct SnapshotStore {
    conn: Mutex<Connection>,
}

impl SnapshotStore {
    /// Open or create the snapshot database
    pub fn open(path: PathBuf) -> Result<Self, AgentError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        debug!(path = %path.display(), "Opened offline snapshot");
        Self::init(conn)
    }

    /// Open using the default path (~/.kintsugi/offline.db)
    pub fn open_default() -> Result<Self, AgentError> {
        Self::open(default_path()?)
    }

    pub fn open_in_memory() -> Result<Self, AgentError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AgentError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS caches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS cache_entries (
                cache_name TEXT NOT NULL,
                url TEXT NOT NULL,
                response_url TEXT NOT NULL,
                status INTEGER NOT NULL,
                content_type TEXT,
                body BLOB NOT NULL,
                PRIMARY KEY (cache_name, url)
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, AgentError> {
        self.conn
            .lock()
            .map_err(|e| AgentError::SnapshotUnavailable(e.to_string()))
    }

    /// Every cache in creation order, with its entries.
    pub fn load(&self) -> Result<CacheStorage, AgentError> {
        let conn = self.conn()?;
        let mut storage = CacheStorage::new();

        let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for name in &names {
            storage.open(name);
        }

        let mut stmt = conn.prepare(
            "SELECT cache_name, url, response_url, status, content_type, body FROM cache_entries",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u16>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Vec<u8>>(5)?,
            ))
        })?;

        for row in rows {
            let (cache_name, url, response_url, status, content_type, body) = row?;
            let (Ok(url), Ok(response_url)) = (Url::parse(&url), Url::parse(&response_url)) else {
                warn!(cache = %cache_name, url = %url, "Skipping snapshot entry with a bad URL");
                continue;
            };
            let response = Response {
                url: response_url,
                status,
                content_type,
                body,
            };
            storage.open(&cache_name).put(&Request::get(url), response);
        }

        debug!(caches = names.len(), "Loaded offline snapshot");
        Ok(storage)
    }

    /// Write `entries` into the cache called `cache_name`, creating it if
    /// needed. All or nothing.
    pub fn write(&self, cache_name: &str, entries: &[(Request, Response)]) -> Result<(), AgentError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO caches (name) VALUES (?1)",
            params![cache_name],
        )?;
        for (request, response) in entries.iter().filter(|(r, _)| r.is_get()) {
            tx.execute(
                "INSERT INTO cache_entries (cache_name, url, response_url, status, content_type, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(cache_name, url) DO UPDATE SET
                    response_url = excluded.response_url,
                    status = excluded.status,
                    content_type = excluded.content_type,
                    body = excluded.body",
                params![
                    cache_name,
                    request.cache_key(),
                    response.url.as_str(),
                    response.status,
                    response.content_type,
                    response.body
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Remove the cache called `cache_name` and all its entries.
    pub fn delete(&self, cache_name: &str) -> Result<(), AgentError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM cache_entries WHERE cache_name = ?1",
            params![cache_name],
        )?;
        tx.execute("DELETE FROM caches WHERE name = ?1", params![cache_name])?;
        tx.commit()?;
        Ok(())
    }
}

/// Default snapshot location
pub fn default_path() -> Result<PathBuf, AgentError> {
    Ok(dirs::home_dir()
        .ok_or_else(|| AgentError::SnapshotUnavailable("No home directory".to_string()))?
        .join(".kintsugi")
        .join("offline.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use tempfile::TempDir;

    fn url(path: &str) -> Url {
        Url::parse("https://reader.example/").unwrap().join(path).unwrap()
    }

    fn entry(path: &str, body: &str) -> (Request, Response) {
        (
            Request::get(url(path)),
            Response::new(url(path), 200, body).with_content_type("text/plain"),
        )
    }

    #[test]
    fn test_write_and_load() {
        let snapshot = SnapshotStore::open_in_memory().unwrap();
        snapshot.write("v1", &[entry("index.html", "shell")]).unwrap();
        snapshot.write("v2", &[entry("a.css", "a")]).unwrap();

        let storage = snapshot.load().unwrap();

        assert_eq!(storage.keys(), vec!["v1".to_string(), "v2".to_string()]);
        let shell = storage.match_request(&Request::get(url("index.html"))).unwrap();
        assert_eq!(shell.body, b"shell");
        assert_eq!(shell.status, 200);
        assert_eq!(shell.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn test_write_overwrites_entry() {
        let snapshot = SnapshotStore::open_in_memory().unwrap();
        snapshot.write("v1", &[entry("index.html", "old")]).unwrap();
        snapshot.write("v1", &[entry("index.html", "new")]).unwrap();

        let storage = snapshot.load().unwrap();

        assert_eq!(storage.get("v1").unwrap().len(), 1);
        assert_eq!(
            storage.match_request(&Request::get(url("index.html"))).unwrap().body,
            b"new"
        );
    }

    #[test]
    fn test_non_get_not_written() {
        let snapshot = SnapshotStore::open_in_memory().unwrap();
        let post = (
            Request::new(Method::POST, url("save")),
            Response::new(url("save"), 200, "x"),
        );

        snapshot.write("v1", &[post]).unwrap();

        assert!(snapshot.load().unwrap().get("v1").unwrap().is_empty());
    }

    #[test]
    fn test_delete() {
        let snapshot = SnapshotStore::open_in_memory().unwrap();
        snapshot.write("v1", &[entry("index.html", "shell")]).unwrap();
        snapshot.write("v2", &[]).unwrap();

        snapshot.delete("v1").unwrap();

        let storage = snapshot.load().unwrap();
        assert_eq!(storage.keys(), vec!["v2".to_string()]);
        assert!(storage.match_request(&Request::get(url("index.html"))).is_none());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("offline.db");

        {
            let snapshot = SnapshotStore::open(path.clone()).unwrap();
            snapshot.write("v1", &[entry("index.html", "shell")]).unwrap();
        }

        let reopened = SnapshotStore::open(path).unwrap();
        assert!(reopened.load().unwrap().has("v1"));
    }
}
