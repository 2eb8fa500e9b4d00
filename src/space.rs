/*!
 * The Shared Tuple Space
 *
 * `TupleSpace` is the single exclusivity domain of the server: the tuple map
 * and the statistics counters sit behind one mutex, and every operation
 * below takes it exactly once. Check-then-act sequences (exists? insert,
 * exists? remove) therefore happen inside one critical section and can
 * never interleave with another connection's operation on the same key.
 */

use crate::error::SpaceError;
use crate::protocol::{OpKind, Request, Response};
use crate::stats::{Snapshot, Stats};
use crate::storage::Dict;
use parking_lot::Mutex;
use smol_str::SmolStr;

#[derive(Default)]
struct State {
    dict: Dict,
    stats: Stats,
}

/// Concurrency-safe tuple space shared by every connection
///
/// Owned by the server and handed to handlers as `Arc<TupleSpace>`; there
/// is no global state.
#[derive(Default)]
pub struct TupleSpace {
    state: Mutex<State>,
}

impl TupleSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-destructive read
    pub fn read(&self, key: &str) -> Result<String, SpaceError> {
        let mut st = self.state.lock();
        st.stats.record_operation(OpKind::Read);
        let out = st.dict.read(key).map(str::to_owned);
        if out.is_err() {
            st.stats.record_error();
        }
        out
    }

    /// Destructive read; lookup and delete are one step
    pub fn remove(&self, key: &str) -> Result<String, SpaceError> {
        let mut st = self.state.lock();
        st.stats.record_operation(OpKind::Remove);
        let out = st.dict.remove(key);
        if out.is_err() {
            st.stats.record_error();
        }
        out
    }

    /// Insert-if-absent; of several racing inserts on one key exactly one wins
    pub fn insert(&self, key: SmolStr, value: String) -> Result<(), SpaceError> {
        let mut st = self.state.lock();
        st.stats.record_operation(OpKind::Insert);
        let out = st.dict.insert(key, value);
        if out.is_err() {
            st.stats.record_error();
        }
        out
    }

    /// Execute a decoded request and build its response
    ///
    /// Response text is formatted outside the guard.
    pub fn exec(&self, req: Request) -> Response {
        let kind = req.kind();
        let outcome = match req {
            Request::Read(k) => self.read(&k).map(|v| Response::success(kind, &k, &v)),
            Request::Remove(k) => self.remove(&k).map(|v| Response::success(kind, &k, &v)),
            Request::Insert(k, v) => {
                let resp = Response::success(kind, &k, &v);
                self.insert(k, v).map(|()| resp)
            }
        };
        outcome.unwrap_or_else(|e| Response::failure(e))
    }

    /// Count an accepted connection
    pub fn record_client(&self) {
        self.state.lock().stats.record_client();
    }

    /// Count a request that failed before reaching the map
    pub fn record_error(&self) {
        self.state.lock().stats.record_error();
    }

    /// Counters plus a walk of the map, all from the same instant
    pub fn snapshot(&self) -> Snapshot {
        let st = self.state.lock();
        Snapshot {
            stats: st.stats,
            sizes: st.dict.summary(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().dict.is_empty()
    }
}
