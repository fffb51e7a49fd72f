use std::collections::VecDeque;
use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    PoisonError,
};

struct EventLog {
    entries: VecDeque<String>,
    limit: usize,
}

// The event log is written by exactly one watch loop and read by the status endpoint.  Splitting it
// into a (non-Clone) writer and a cloneable reader keeps that ownership visible in the types.
pub struct EventLogWriter(Arc<Mutex<EventLog>>);

#[derive(Clone)]
pub struct EventLogReader(Arc<Mutex<EventLog>>);

pub fn event_log(limit: usize) -> (EventLogWriter, EventLogReader) {
    let log = Arc::new(Mutex::new(EventLog { entries: VecDeque::new(), limit: limit.max(1) }));
    (EventLogWriter(log.clone()), EventLogReader(log))
}

// A panic while holding the lock can at worst leave a half-appended entry behind, which is fine
// for a debugging aid
fn lock(log: &Mutex<EventLog>) -> MutexGuard<'_, EventLog> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EventLogWriter {
    pub fn append(&self, entry: String) {
        let mut log = lock(&self.0);
        if log.entries.len() >= log.limit {
            log.entries.pop_front();
        }
        log.entries.push_back(entry);
    }
}

impl EventLogReader {
    pub fn render(&self) -> String {
        let log = lock(&self.0);
        log.entries.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }

    pub fn latest(&self) -> Option<String> {
        lock(&self.0).entries.back().cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.0).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
