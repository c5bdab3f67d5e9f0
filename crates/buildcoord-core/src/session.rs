use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

/// A session's reservation of worker slots and its private filesystem footprint.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    /// Slots reserved for this session at creation.
    pub max_builders: u32,
    /// Slots currently in use. Reserved for future scheduling; always 0 in this version.
    pub using_builders: u32,
}

/// The in-memory table of live sessions plus the server's free-slot counter.
///
/// `total - free_slots` always equals the sum of `max_builders` over every live session: Start
/// and Close are the only two mutators, and both run under the same lock, so the invariant never
/// observes a torn intermediate state from another task.
pub struct SessionTable {
    total: u32,
    inner: Mutex<Inner>,
}

struct Inner {
    free_slots: u32,
    sessions: HashMap<String, Session>,
}

/// Whether `sid` is a canonical 128-bit identifier, i.e. safe to splice into a filesystem path.
///
/// Every entry point that accepts a sid from the wire (`SetupBase`, `CheckPackages`,
/// `DeployPackage`) must run it through this check before using it as a path component — a
/// session id is client-supplied on every call after `StartSession`, and `../../etc` is a
/// syntactically valid string otherwise.
pub fn is_canonical_sid(sid: &str) -> bool {
    Uuid::parse_str(sid).is_ok()
}

impl SessionTable {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            inner: Mutex::new(Inner {
                free_slots: total,
                sessions: HashMap::new(),
            }),
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Grant `min(requested, free_slots)` slots, mint a new session id, and record it.
    ///
    /// Never fails: a request for more slots than are free is silently capped, including down
    /// to zero, but a session (and an id) is still created.
    pub fn start(&self, requested: u32) -> (u32, String) {
        let mut inner = self.inner.lock().unwrap();
        let granted = requested.min(inner.free_slots);
        inner.free_slots -= granted;

        let sid = Uuid::new_v4().to_string();
        inner.sessions.insert(
            sid.clone(),
            Session {
                id: sid.clone(),
                max_builders: granted,
                using_builders: 0,
            },
        );
        (granted, sid)
    }

    /// Remove `sid` from the table and restore its slots to the free pool.
    ///
    /// Returns `false` if `sid` was not present (already closed, or never existed).
    pub fn close(&self, sid: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.sessions.remove(sid) {
            Some(session) => {
                inner.free_slots += session.max_builders;
                true
            }
            None => false,
        }
    }

    /// Whether `sid` names a currently live session.
    pub fn contains(&self, sid: &str) -> bool {
        self.inner.lock().unwrap().sessions.contains_key(sid)
    }

    /// The number of unreserved slots right now.
    pub fn free_slots(&self) -> u32 {
        self.inner.lock().unwrap().free_slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_close_round_trip() {
        let table = SessionTable::new(1);
        let (granted, sid) = table.start(1);
        assert_eq!(granted, 1);
        assert!(table.close(&sid));
        assert!(!table.close("not-a-real-sid"));
    }

    #[test]
    fn over_allocation_grants_zero_but_still_mints_a_sid() {
        let table = SessionTable::new(1);
        let (first, sid1) = table.start(1);
        assert_eq!(first, 1);

        let (second, sid2) = table.start(1);
        assert_eq!(second, 0);
        assert_ne!(sid1, sid2);
    }

    #[test]
    fn close_restores_slots_for_a_later_start() {
        let table = SessionTable::new(1);
        let (_, sid1) = table.start(1);
        assert!(table.close(&sid1));

        let (granted, _) = table.start(1);
        assert_eq!(granted, 1, "closing a session must give its slots back");
    }

    #[test]
    fn sid_validation_rejects_path_traversal() {
        assert!(!is_canonical_sid("../../etc/passwd"));
        assert!(!is_canonical_sid("dummy"));
    }

    #[test]
    fn sid_validation_accepts_minted_sids() {
        let table = SessionTable::new(1);
        let (_, sid) = table.start(1);
        assert!(is_canonical_sid(&sid));
    }

    #[test]
    fn grants_never_exceed_configured_total() {
        let table = SessionTable::new(3);
        let mut total_granted = 0;
        for requested in [2, 2, 2] {
            let (granted, _) = table.start(requested);
            total_granted += granted;
        }
        assert!(total_granted <= 3);
    }
}
