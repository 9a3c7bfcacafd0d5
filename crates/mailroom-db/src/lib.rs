pub mod models;
pub mod queries;
pub mod schema;
pub mod settings;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub use queries::NewMessage;
pub use settings::{UnreadableSettings, UserSettings};

/// Handle on the host system's database.
///
/// One connection shared by every request; statements are executed one at a
/// time behind the mutex.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open an existing host database. The schema is expected to be present
    /// unless `bootstrap` is set.
    pub fn open(path: &Path, bootstrap: bool) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        if bootstrap {
            schema::bootstrap(&conn)?;
        }

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fresh in-memory database with the host schema in place.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::bootstrap(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }
}
