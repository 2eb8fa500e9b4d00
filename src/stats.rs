/*!
 * Statistics Aggregation and Reporting
 *
 * Counters are plain integers living next to the tuple map inside the
 * space's guard, so a snapshot never shows an operation without its effect
 * on the map. The reporter thread takes a snapshot on every tick and hands
 * it to a sink after the guard is released.
 */

use crate::error::ServerError;
use crate::protocol::OpKind;
use crate::space::TupleSpace;
use crate::storage::SizeSummary;
use crossbeam::channel::{bounded, select, tick, Sender};
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Default reporting period
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Process-lifetime counters; they only ever grow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub clients_accepted: u64,
    /// Recognized commands, whether they succeeded or not
    pub operations_total: u64,
    pub reads_total: u64,
    pub removes_total: u64,
    pub inserts_total: u64,
    /// Failed operations plus undecodable requests
    pub errors_total: u64,
}

impl Stats {
    pub fn record_client(&mut self) {
        self.clients_accepted += 1;
    }

    /// Count a command as soon as its kind is known
    pub fn record_operation(&mut self, kind: OpKind) {
        self.operations_total += 1;
        match kind {
            OpKind::Read => self.reads_total += 1,
            OpKind::Remove => self.removes_total += 1,
            OpKind::Insert => self.inserts_total += 1,
        }
    }

    pub fn record_error(&mut self) {
        self.errors_total += 1;
    }
}

/// Counters and tuple sizes taken under one acquisition of the guard
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Snapshot {
    pub stats: Stats,
    pub sizes: SizeSummary,
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.sizes;
        if s.is_empty() {
            writeln!(f, "Tuple space is empty.")?;
        } else {
            writeln!(f, "Tuple Space Summary:")?;
            writeln!(f, "Number of tuples: {}", s.tuples)?;
            writeln!(f, "Average tuple size: {:.2}", s.avg_tuple_size())?;
            writeln!(f, "Average key size: {:.2}", s.avg_key_size())?;
            writeln!(f, "Average value size: {:.2}", s.avg_value_size())?;
        }
        let c = &self.stats;
        writeln!(f, "Total number of clients: {}", c.clients_accepted)?;
        writeln!(f, "Total number of operations: {}", c.operations_total)?;
        writeln!(f, "Total READs: {}", c.reads_total)?;
        writeln!(f, "Total GETs: {}", c.removes_total)?;
        writeln!(f, "Total PUTs: {}", c.inserts_total)?;
        write!(f, "Total errors: {}", c.errors_total)
    }
}

/// Handle to the background reporter
///
/// Dropping the handle stops the thread at its next wakeup.
pub struct ReporterHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ReporterHandle {
    /// Stop the reporter and wait for it to exit
    pub fn stop(mut self) {
        self.stop.take();
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

/// Spawn the periodic reporter
///
/// Every `interval` a snapshot is taken from `space` and passed to `sink`.
/// The space's guard is held only while the snapshot is copied.
pub fn spawn_reporter<F>(
    space: Arc<TupleSpace>,
    interval: Duration,
    mut sink: F,
) -> Result<ReporterHandle, ServerError>
where
    F: FnMut(&Snapshot) + Send + 'static,
{
    let (stop_tx, stop_rx) = bounded::<()>(0);
    let ticker = tick(interval);

    let thread = std::thread::Builder::new()
        .name("stats-reporter".into())
        .spawn(move || loop {
            select! {
                recv(ticker) -> _ => {
                    let snap = space.snapshot();
                    sink(&snap);
                }
                // Only ever fires on disconnect
                recv(stop_rx) -> _ => break,
            }
        })
        .map_err(|e| ServerError::Spawn("stats-reporter", e))?;

    Ok(ReporterHandle {
        stop: Some(stop_tx),
        thread: Some(thread),
    })
}

/// Sink that writes each report through the `log` facade
pub fn log_report(snap: &Snapshot) {
    for line in snap.to_string().lines() {
        log::info!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_equal_sum_of_kinds() {
        let mut s = Stats::default();
        s.record_operation(OpKind::Read);
        s.record_operation(OpKind::Remove);
        s.record_operation(OpKind::Remove);
        s.record_operation(OpKind::Insert);
        s.record_error();
        assert_eq!(s.operations_total, 4);
        assert_eq!(s.reads_total + s.removes_total + s.inserts_total, 4);
        assert_eq!(s.removes_total, 2);
        assert_eq!(s.errors_total, 1);
    }

    #[test]
    fn empty_report_skips_sizes() {
        let snap = Snapshot::default();
        let text = snap.to_string();
        assert!(text.starts_with("Tuple space is empty.\n"));
        assert!(!text.contains("Average"));
        assert!(text.ends_with("Total errors: 0"));
    }

    #[test]
    fn report_lists_sizes_and_counters() {
        let snap = Snapshot {
            stats: Stats {
                clients_accepted: 2,
                operations_total: 3,
                reads_total: 1,
                removes_total: 1,
                inserts_total: 1,
                errors_total: 1,
            },
            sizes: SizeSummary {
                tuples: 2,
                key_bytes: 3,
                value_bytes: 5,
            },
        };
        let text = snap.to_string();
        assert!(text.contains("Number of tuples: 2"));
        assert!(text.contains("Average tuple size: 4.00"));
        assert!(text.contains("Average key size: 1.50"));
        assert!(text.contains("Average value size: 2.50"));
        assert!(text.contains("Total number of clients: 2"));
        assert!(text.contains("Total GETs: 1"));
    }

    #[test]
    fn reporter_ticks_and_stops() {
        let space = Arc::new(TupleSpace::default());
        let (tx, rx) = crossbeam::channel::unbounded();
        let handle = spawn_reporter(space.clone(), Duration::from_millis(10), move |s| {
            let _ = tx.send(*s);
        })
        .unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(first.sizes.is_empty());

        space.insert("k".into(), "v".into()).unwrap();
        let later = (0..100)
            .filter_map(|_| rx.recv_timeout(Duration::from_secs(5)).ok())
            .find(|s| !s.sizes.is_empty())
            .unwrap();
        assert_eq!(later.sizes.tuples, 1);
        assert_eq!(later.stats.inserts_total, 1);

        handle.stop();
    }
}
