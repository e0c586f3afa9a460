//! Local schema migrations.
//!
//! The schema version lives in `PRAGMA user_version`.

use rusqlite::Connection;

use nivelver_common::{Error, Result};

use super::storage_error;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations.
pub(crate) fn migrate(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(storage_error)?;

    if version > CURRENT_VERSION {
        return Err(Error::LocalStorage(format!(
            "Database schema version {} is newer than supported version {}",
            version, CURRENT_VERSION
        )));
    }

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Migration to version 1: accounts and the content catalog.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        BEGIN;

        CREATE TABLE IF NOT EXISTS users (
            username TEXT PRIMARY KEY,
            password TEXT NOT NULL,
            nivel TEXT NOT NULL DEFAULT 'A0',
            last_modified INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS words (
            id TEXT PRIMARY KEY,
            spanish TEXT NOT NULL,
            russian TEXT NOT NULL,
            nivel TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS lecturas (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            question TEXT NOT NULL,
            answers TEXT NOT NULL,
            correct_answer_index INTEGER NOT NULL,
            nivel TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audios (
            id TEXT PRIMARY KEY,
            audio_path TEXT NOT NULL,
            question TEXT NOT NULL,
            answers TEXT NOT NULL,
            correct_answer_index INTEGER NOT NULL,
            nivel TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_words_nivel ON words(nivel);
        CREATE INDEX IF NOT EXISTS idx_lecturas_nivel ON lecturas(nivel);
        CREATE INDEX IF NOT EXISTS idx_audios_nivel ON audios(nivel);

        PRAGMA user_version = 1;

        COMMIT;
        "#,
    )
    .map_err(storage_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_sets_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
    }

    #[test]
    fn test_newer_schema_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA user_version = 99;").unwrap();
        assert!(matches!(migrate(&conn), Err(Error::LocalStorage(_))));
    }
}
