//! SQLite-backed local store.
//!
//! The local store is the single source of truth for every read the
//! application performs. Writes are committed here first; the cloud copy is
//! only ever reconciled against it.

mod content;
mod live;
mod schema;

use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use nivelver_common::{now_millis, Error, Nivel, Password, Result, User, Username};
use nivelver_crypto::CredentialHasher;

pub use live::{LiveQuery, Table};
pub use schema::CURRENT_VERSION;

use live::{live_query, ChangeFeed};

/// Record counts per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub users: u64,
    pub words: u64,
    pub lecturas: u64,
    pub audios: u64,
}

/// Outcome of merging a remote record into the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMerge {
    /// The record did not exist locally and was inserted.
    Created,
    /// The local record was overwritten.
    Updated { local_modified: i64 },
    /// The local record was kept.
    Unchanged { local_modified: i64 },
}

impl RemoteMerge {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, RemoteMerge::Unchanged { .. })
    }
}

/// Local persistent store for accounts and the content catalog.
///
/// All SQLite work runs on the blocking thread pool; the connection mutex
/// serializes writes so every single-record write is atomic.
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
    hasher: Arc<dyn CredentialHasher>,
    feed: ChangeFeed,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Create or open a local store database.
    ///
    /// # Arguments
    /// - `db_path`: Path to the SQLite database file
    /// - `hasher`: Credential hasher used for new accounts and logins
    ///
    /// # Errors
    /// - Database creation or migration failure
    pub fn open(db_path: impl AsRef<Path>, hasher: Arc<dyn CredentialHasher>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path).map_err(storage_error)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
            .map_err(storage_error)?;
        Self::init(conn, hasher, Some(path))
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory(hasher: Arc<dyn CredentialHasher>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        Self::init(conn, hasher, None)
    }

    fn init(
        conn: Connection,
        hasher: Arc<dyn CredentialHasher>,
        path: Option<PathBuf>,
    ) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(storage_error)?;
        schema::migrate(&conn)?;

        let stats = count_all(&conn)?;
        info!(
            "Local store opened at {}: {} users, {} words, {} lecturas, {} audios",
            path.as_ref()
                .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string()),
            stats.users,
            stats.words,
            stats.lecturas,
            stats.audios
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            hasher,
            feed: ChangeFeed::new(),
            path,
        })
    }

    /// Path of the database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create a new account.
    ///
    /// The password is hashed before it reaches the database and
    /// `last_modified` is set to now.
    ///
    /// # Errors
    /// - `AlreadyExists` if the username is taken
    /// - `LocalStorage` if the write fails
    pub async fn create_user(
        &self,
        username: &Username,
        password: &Password,
        nivel: &Nivel,
    ) -> Result<User> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.clone();
        let digest = run_blocking(move || hasher.hash(&password)).await?;

        let user = User {
            username: username.as_str().to_string(),
            password: digest,
            nivel: nivel.as_str().to_string(),
            last_modified: now_millis(),
        };

        let record = user.clone();
        let total = self
            .with_conn(move |conn| {
                insert_user(conn, &record)?;
                count_rows(conn, "users")
            })
            .await?;
        self.feed.notify(Table::Users);

        debug!("User created: {}. Total users: {}", user.username, total);
        Ok(user)
    }

    /// Point lookup by username. Absence is not an error.
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let name = username.to_string();
        let user = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT username, password, nivel, last_modified FROM users WHERE username = ?1",
                    [&name],
                    user_from_row,
                )
                .optional()
                .map_err(storage_error)
            })
            .await?;

        debug!(
            "get_user_by_username({}): {}",
            username,
            if user.is_some() { "found" } else { "not found" }
        );
        Ok(user)
    }

    /// Fetch a user and check the password against the stored digest.
    ///
    /// Returns `None` both when the user is unknown and when the password
    /// does not match; callers cannot tell the two apart.
    pub async fn verify_user_password(
        &self,
        username: &Username,
        password: &Password,
    ) -> Result<Option<User>> {
        let Some(user) = self.get_user_by_username(username.as_str()).await? else {
            return Ok(None);
        };

        let hasher = Arc::clone(&self.hasher);
        let password = password.clone();
        let digest = user.password.clone();
        let matches = run_blocking(move || hasher.verify(&password, &digest)).await?;

        Ok(matches.then_some(user))
    }

    /// Set a user's nivel and bump `last_modified` to now.
    ///
    /// Unknown users are a no-op; returns whether a record changed.
    pub async fn update_user_nivel(&self, username: &Username, nivel: &Nivel) -> Result<bool> {
        let name = username.as_str().to_string();
        let level = nivel.as_str().to_string();
        let changed = self
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE users SET nivel = ?1, last_modified = ?2 WHERE username = ?3",
                    params![level, now_millis(), name],
                )
                .map_err(storage_error)
            })
            .await?;

        if changed > 0 {
            self.feed.notify(Table::Users);
            debug!("Nivel updated: {} -> {}", username, nivel);
        } else {
            debug!("Nivel update skipped, no such user: {}", username);
        }
        Ok(changed > 0)
    }

    /// One-shot snapshot of all users, ordered by username.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(query_users).await
    }

    /// Live sequence of user snapshots.
    ///
    /// Yields the current users first and then a fresh snapshot after every
    /// committed change to the users table. The stream never ends while the
    /// store is alive; calling this again starts a new, independent stream.
    pub fn get_all_users(&self) -> LiveQuery<User> {
        live_query(
            Arc::clone(&self.conn),
            self.feed.subscribe(Table::Users),
            query_users,
        )
    }

    /// Store a user record verbatim.
    ///
    /// Used by reconciliation to materialize a record that only exists
    /// remotely: the digest and timestamp are kept as received.
    pub async fn insert_user_record(&self, user: &User) -> Result<()> {
        let record = user.clone();
        self.with_conn(move |conn| insert_user(conn, &record))
            .await?;
        self.feed.notify(Table::Users);
        Ok(())
    }

    /// Merge one remote user record into the local store.
    ///
    /// The lookup, the decision and the write happen in one immediate
    /// transaction while the connection is held, so a concurrent local write
    /// lands either before the lookup or after the merge, never in between.
    /// A missing local record is created verbatim. An existing one has its
    /// nivel and timestamp overwritten only if `remote_wins(local, remote)`
    /// returns true for the two timestamps.
    pub async fn merge_remote_user<F>(&self, remote: &User, remote_wins: F) -> Result<RemoteMerge>
    where
        F: FnOnce(i64, i64) -> bool + Send + 'static,
    {
        let record = remote.clone();
        let merge = self
            .with_conn(move |conn| {
                let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
                    .map_err(storage_error)?;
                let local = select_last_modified(&tx, &record.username)?;

                let merge = match local {
                    None => {
                        insert_user(&tx, &record)?;
                        RemoteMerge::Created
                    }
                    Some(local) if remote_wins(local, record.last_modified) => {
                        tx.execute(
                            "UPDATE users SET nivel = ?1, last_modified = ?2
                             WHERE username = ?3 AND last_modified = ?4",
                            params![record.nivel, record.last_modified, record.username, local],
                        )
                        .map_err(storage_error)?;
                        RemoteMerge::Updated {
                            local_modified: local,
                        }
                    }
                    Some(local) => RemoteMerge::Unchanged {
                        local_modified: local,
                    },
                };

                tx.commit().map_err(storage_error)?;
                Ok(merge)
            })
            .await?;

        if merge.is_mutation() {
            self.feed.notify(Table::Users);
        }
        Ok(merge)
    }

    /// Record counts for every table.
    pub async fn stats(&self) -> Result<StoreStats> {
        self.with_conn(count_all).await
    }

    /// Flush the write-ahead log back into the database file.
    pub async fn close(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                .map_err(storage_error)
        })
        .await?;
        info!("Local store closed");
        Ok(())
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        with_connection(Arc::clone(&self.conn), op).await
    }
}

/// Run a closure against a shared connection on the blocking pool.
pub(crate) async fn with_connection<T, F>(conn: Arc<Mutex<Connection>>, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
{
    run_blocking(move || {
        let guard = conn
            .lock()
            .map_err(|_| Error::LocalStorage("Connection lock poisoned".to_string()))?;
        op(&*guard)
    })
    .await
}

/// Run CPU- or disk-bound work on the blocking pool.
async fn run_blocking<T, F>(op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| Error::Internal(format!("Task error: {}", e)))?
}

/// Map a SQLite error onto the local error taxonomy.
pub(crate) fn storage_error(err: rusqlite::Error) -> Error {
    if is_unique_violation(&err) {
        Error::AlreadyExists(err.to_string())
    } else {
        Error::LocalStorage(err.to_string())
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (username, password, nivel, last_modified) VALUES (?1, ?2, ?3, ?4)",
        params![user.username, user.password, user.nivel, user.last_modified],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            Error::AlreadyExists(format!("User '{}' already exists", user.username))
        } else {
            storage_error(e)
        }
    })?;
    Ok(())
}

fn select_last_modified(conn: &Connection, username: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT last_modified FROM users WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )
    .optional()
    .map_err(storage_error)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        username: row.get(0)?,
        password: row.get(1)?,
        nivel: row.get(2)?,
        last_modified: row.get(3)?,
    })
}

fn query_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn
        .prepare(
            "SELECT username, password, nivel, last_modified FROM users ORDER BY username",
        )
        .map_err(storage_error)?;
    let users = stmt
        .query_map([], user_from_row)
        .map_err(storage_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage_error)?;
    Ok(users)
}

fn count_rows(conn: &Connection, table: &str) -> Result<u64> {
    let count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .map_err(storage_error)?;
    Ok(count as u64)
}

fn count_all(conn: &Connection) -> Result<StoreStats> {
    Ok(StoreStats {
        users: count_rows(conn, "users")?,
        words: count_rows(conn, "words")?,
        lecturas: count_rows(conn, "lecturas")?,
        audios: count_rows(conn, "audios")?,
    })
}
