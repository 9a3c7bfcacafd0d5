use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Create the host tables this service reads and writes, if missing.
///
/// Production databases are owned by the host system; this only exists for
/// development setups and tests.
pub fn bootstrap(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS auth_user_md5 (
            user_id     TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            perms       TEXT NOT NULL DEFAULT 'autor',
            Vorname     TEXT,
            Nachname    TEXT,
            Email       TEXT
        );

        CREATE TABLE IF NOT EXISTS message (
            message_id  TEXT PRIMARY KEY,
            autor_id    TEXT NOT NULL,
            subject     TEXT NOT NULL DEFAULT '',
            message     TEXT NOT NULL DEFAULT '',
            mkdate      INTEGER NOT NULL DEFAULT 0,
            priority    TEXT NOT NULL DEFAULT 'normal'
        );

        CREATE TABLE IF NOT EXISTS message_user (
            user_id     TEXT NOT NULL,
            message_id  TEXT NOT NULL,
            snd_rec     TEXT NOT NULL,
            folder      INTEGER NOT NULL DEFAULT 0,
            readed      INTEGER NOT NULL DEFAULT 0,
            deleted     INTEGER NOT NULL DEFAULT 0,
            dont_delete INTEGER NOT NULL DEFAULT 0,
            mkdate      INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, message_id, snd_rec)
        );

        CREATE INDEX IF NOT EXISTS idx_message_user_folder
            ON message_user(user_id, snd_rec, folder);

        CREATE TABLE IF NOT EXISTS user_data (
            sid         TEXT PRIMARY KEY,
            val         TEXT NOT NULL,
            changed     INTEGER NOT NULL DEFAULT 0
        );
        ",
    )?;

    info!("Host schema bootstrap complete");
    Ok(())
}
