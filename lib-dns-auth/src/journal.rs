//! The in-memory changeset history backing IXFR.  Each zone keeps a
//! bounded run of recent changesets; a client whose serial falls off
//! the end gets a full transfer instead.  Durable journal storage is
//! the host's business, not ours.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use dns_types::protocol::types::DomainName;
use dns_types::zones::types::{serial_gt, Changeset};

pub struct Journal {
    capacity: usize,
    zones: Mutex<HashMap<DomainName, VecDeque<Changeset>>>,
}

impl Journal {
    /// A journal holding up to `capacity` changesets per zone.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            zones: Mutex::new(HashMap::new()),
        }
    }

    pub fn push(&self, apex: &DomainName, changeset: Changeset) {
        let mut zones = self.zones.lock().expect("journal lock poisoned");
        let history = zones.entry(apex.clone()).or_default();

        history.push_back(changeset);
        while history.len() > self.capacity {
            history.pop_front();
        }
    }

    /// The contiguous chain of changesets taking `from_serial` to
    /// `to_serial`, or `None` if the history cannot bridge the gap -
    /// the IXFR-to-AXFR fallback condition.
    pub fn changesets_between(
        &self,
        apex: &DomainName,
        from_serial: u32,
        to_serial: u32,
    ) -> Option<Vec<Changeset>> {
        if from_serial == to_serial {
            return Some(Vec::new());
        }
        if !serial_gt(to_serial, from_serial) {
            return None;
        }

        let zones = self.zones.lock().expect("journal lock poisoned");
        let history = zones.get(apex)?;

        let mut chain = Vec::new();
        let mut serial = from_serial;

        // each step must link exactly; the history is bounded so so
        // is this walk
        for _ in 0..history.len() {
            let next = history
                .iter()
                .find(|changeset| changeset.soa_from.serial == serial)?;
            chain.push(next.clone());
            serial = next.soa_to.serial;

            if serial == to_serial {
                return Some(chain);
            }
        }

        None
    }
}
