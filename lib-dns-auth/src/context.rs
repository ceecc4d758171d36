//! Everything a transaction needs to answer queries, gathered into
//! one value instead of process-wide globals: the published zones,
//! the key set, per-zone policy, the EDNS template, the chaos-class
//! identity, rate limiting, and the journal.
//!
//! Reloading configuration builds a fresh `ServerContext` and swaps
//! the shared handle; transactions begun before the swap finish on
//! the context they started with.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};

use dns_types::protocol::types::*;
use dns_types::zones::types::*;

use crate::acl::Acl;
use crate::journal::Journal;
use crate::rrl::RateLimiter;
use crate::tsig::TsigKeyring;

const LOCK_POISON_MESSAGE: &str =
    "[INTERNAL ERROR] zone database lock poisoned, cannot recover from this - aborting";

/// Per-zone operational policy: who may do what, where NOTIFYs go,
/// and how TTL disagreements are treated on load.
#[derive(Debug, Clone, Default)]
pub struct ZonePolicy {
    /// `None` means queries are open to everyone; an ACL, even an
    /// empty one, means it is consulted.
    pub query_acl: Option<Acl>,
    pub transfer_acl: Acl,
    pub update_acl: Acl,
    pub notify_acl: Acl,
    pub notify_targets: Vec<SocketAddr>,
}

/// The server's EDNS template: what we advertise and whether we have
/// an NSID to disclose.
#[derive(Debug, Clone)]
pub struct OptTemplate {
    pub max_payload: u16,
    pub nsid: Option<Vec<u8>>,
}

impl Default for OptTemplate {
    fn default() -> Self {
        Self {
            max_payload: 1232,
            nsid: None,
        }
    }
}

/// What the chaos-class built-ins answer with.
#[derive(Debug, Clone, Default)]
pub struct ChaosIdentity {
    pub version: Option<String>,
    pub server_id: Option<String>,
}

pub struct ServerContext {
    zones: RwLock<Arc<ZoneSet>>,
    zone_writers: Mutex<HashMap<DomainName, Arc<Mutex<()>>>>,
    pub keyring: TsigKeyring,
    pub policies: HashMap<DomainName, ZonePolicy>,
    pub opt: OptTemplate,
    pub chaos: ChaosIdentity,
    pub rrl: Option<RateLimiter>,
    pub journal: Journal,
}

impl ServerContext {
    pub fn new(
        zones: ZoneSet,
        keyring: TsigKeyring,
        policies: HashMap<DomainName, ZonePolicy>,
        opt: OptTemplate,
        chaos: ChaosIdentity,
        rrl: Option<RateLimiter>,
        journal_capacity: usize,
    ) -> Self {
        Self {
            zones: RwLock::new(Arc::new(zones)),
            zone_writers: Mutex::new(HashMap::new()),
            keyring,
            policies,
            opt,
            chaos,
            rrl,
            journal: Journal::new(journal_capacity),
        }
    }

    /// Pin the currently-published zone database.  Everything
    /// reachable from the returned handle stays stable for as long as
    /// the handle is held, no matter how many updates land meanwhile.
    pub fn snapshot(&self) -> Arc<ZoneSet> {
        self.zones.read().expect(LOCK_POISON_MESSAGE).clone()
    }

    /// Publish a new version of one zone.  The write lock covers only
    /// the construction and swap of the index, not any zone content
    /// work.
    pub fn publish_zone(&self, zone: Arc<Zone>) {
        let mut guard = self.zones.write().expect(LOCK_POISON_MESSAGE);
        let mut updated = (**guard).clone();
        updated.insert(zone);
        *guard = Arc::new(updated);
    }

    /// The per-zone writer lock: updates to one zone are serialised,
    /// updates to different zones proceed in parallel, readers are
    /// never involved.
    pub fn zone_writer(&self, apex: &DomainName) -> Arc<Mutex<()>> {
        let mut writers = self.zone_writers.lock().expect(LOCK_POISON_MESSAGE);
        writers.entry(apex.clone()).or_default().clone()
    }

    pub fn policy(&self, apex: &DomainName) -> Option<&ZonePolicy> {
        self.policies.get(apex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_types::protocol::types::test_util::*;

    #[test]
    fn snapshot_is_stable_across_publish() {
        let ctx = ServerContext::new(
            ZoneSet::new(),
            TsigKeyring::new(),
            HashMap::new(),
            OptTemplate::default(),
            ChaosIdentity::default(),
            None,
            8,
        );

        let before = ctx.snapshot();
        assert!(before.is_empty());

        let mut builder = Zone::builder(domain("example.com."), TtlPolicy::Primary);
        builder.insert_rr(&soa_record("example.com.", 1)).unwrap();
        builder
            .insert_rr(&ns_record("example.com.", "ns1.example.com."))
            .unwrap();
        ctx.publish_zone(Arc::new(builder.build().unwrap()));

        // the pinned snapshot still sees the old world
        assert!(before.is_empty());
        assert!(ctx.snapshot().get(&domain("example.com.")).is_some());
    }

    #[test]
    fn zone_writer_is_shared_per_apex() {
        let ctx = ServerContext::new(
            ZoneSet::new(),
            TsigKeyring::new(),
            HashMap::new(),
            OptTemplate::default(),
            ChaosIdentity::default(),
            None,
            8,
        );

        let a = ctx.zone_writer(&domain("example.com."));
        let b = ctx.zone_writer(&domain("example.com."));
        let c = ctx.zone_writer(&domain("example.net."));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
