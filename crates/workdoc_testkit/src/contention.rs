//! Lock contention scenarios.
//!
//! These helpers run one work unit holding a row lock on a background thread
//! while another tries to open the same document.

use crate::fixtures::TestStore;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use workdoc_core::WorkDocResult;

/// Outcome of a contended open.
#[derive(Debug)]
pub struct ContentionOutcome {
    /// Result of the second open.
    pub result: WorkDocResult<()>,
    /// Time the second open took.
    pub elapsed: Duration,
}

/// Opens `key` on a background thread and holds it for `hold`, then tries
/// to open it again from this thread in a separate session.
///
/// Returns after both work units are closed.
pub fn open_while_held(store: &TestStore, key: &str, hold: Duration) -> ContentionOutcome {
    let (locked_tx, locked_rx) = mpsc::channel();
    let holder = {
        let db = store.db.clone();
        let mut work = store.work_unit(key);
        thread::spawn(move || {
            let session = db.session();
            work.open(&session).expect("Holder failed to open");
            locked_tx.send(()).expect("Waiter went away");
            thread::sleep(hold);
            work.close(&session).expect("Holder failed to close");
        })
    };
    locked_rx.recv().expect("Holder thread died");

    let session = store.db.session();
    let mut work = store.work_unit(key);
    let start = Instant::now();
    let result = work.open(&session);
    let elapsed = start.elapsed();
    if result.is_ok() {
        work.close(&session).expect("Waiter failed to close");
    }

    holder.join().expect("Holder thread panicked");
    ContentionOutcome { result, elapsed }
}

/// Opens and closes distinct keys from parallel threads, returning how many
/// checkouts succeeded.
pub fn parallel_checkouts(store: &TestStore, keys: &[String]) -> usize {
    let handles: Vec<_> = keys
        .iter()
        .map(|key| {
            let db = store.db.clone();
            let mut work = store.work_unit(key);
            thread::spawn(move || {
                let session = db.session();
                work.open(&session)
                    .and_then(|()| work.close(&session))
                    .is_ok()
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|handle| handle.join().unwrap_or(false))
        .filter(|ok| *ok)
        .count()
}
