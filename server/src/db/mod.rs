//! SQLite store shared with the chat backend.
//!
//! The relay only reads `users`, `friends` and `conversation_participants`
//! (owned by the backend) and writes the `calls` log.

pub mod migrations;
pub mod models;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Single connection behind a mutex; every query runs on the blocking pool
/// through `SqliteStore::with_conn`.
pub type DbPool = Arc<Mutex<Connection>>;

pub const DB_FILE: &str = "relay.db";

/// Open `<data_dir>/relay.db`, creating the directory and the file if needed,
/// and bring the schema up to date.
pub fn init_db(data_dir: &str) -> Result<DbPool, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;

    let db_path = Path::new(data_dir).join(DB_FILE);
    let mut conn = Connection::open(&db_path)?;

    // The backend writes the same file; WAL keeps our reads off its writes
    // and the busy timeout rides out its short write locks.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(Duration::from_secs(5))?;

    migrations::migrations().to_latest(&mut conn)?;

    tracing::info!(path = %db_path.display(), "Relay store ready");

    Ok(Arc::new(Mutex::new(conn)))
}
