//! Live queries over the local store.
//!
//! Every committed mutation bumps a per-table version on a watch channel.
//! A live query re-runs its SQL whenever the version of its table moves and
//! yields the full snapshot, so subscribers always see the latest state
//! even if they fall behind several changes.

use futures::stream::{self, Stream};
use rusqlite::Connection;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use nivelver_common::Result;

use super::with_connection;

/// Indefinite stream of full snapshots.
pub type LiveQuery<T> = Pin<Box<dyn Stream<Item = Result<Vec<T>>> + Send>>;

/// Tables that can be observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Users,
    Words,
    Lecturas,
    Audios,
}

impl Table {
    const COUNT: usize = 4;

    fn index(self) -> usize {
        match self {
            Table::Users => 0,
            Table::Words => 1,
            Table::Lecturas => 2,
            Table::Audios => 3,
        }
    }
}

/// Per-table change versions.
pub(crate) struct ChangeFeed {
    versions: [watch::Sender<u64>; Table::COUNT],
}

impl ChangeFeed {
    pub(crate) fn new() -> Self {
        Self {
            versions: std::array::from_fn(|_| watch::channel(0).0),
        }
    }

    /// Signal that a table changed.
    pub(crate) fn notify(&self, table: Table) {
        self.versions[table.index()].send_modify(|version| *version += 1);
    }

    pub(crate) fn subscribe(&self, table: Table) -> watch::Receiver<u64> {
        self.versions[table.index()].subscribe()
    }
}

struct LiveState<F> {
    conn: Arc<Mutex<Connection>>,
    changes: watch::Receiver<u64>,
    query: Arc<F>,
    primed: bool,
}

/// Build a live query from a snapshot function.
///
/// The stream ends only when the owning store is dropped.
pub(crate) fn live_query<T, F>(
    conn: Arc<Mutex<Connection>>,
    changes: watch::Receiver<u64>,
    query: F,
) -> LiveQuery<T>
where
    T: Send + 'static,
    F: Fn(&Connection) -> Result<Vec<T>> + Send + Sync + 'static,
{
    let state = LiveState {
        conn,
        changes,
        query: Arc::new(query),
        primed: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        if state.primed {
            if state.changes.changed().await.is_err() {
                return None;
            }
        } else {
            state.primed = true;
        }
        // Mark the current version seen before querying so a write that
        // lands during the query triggers another snapshot.
        state.changes.borrow_and_update();

        let query = Arc::clone(&state.query);
        let snapshot = with_connection(Arc::clone(&state.conn), move |conn| query(conn)).await;
        Some((snapshot, state))
    }))
}
