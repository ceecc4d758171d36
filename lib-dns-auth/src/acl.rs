//! Access control: who may query, transfer, update, or notify.  A
//! rule is an address prefix plus, optionally, the name of a TSIG key
//! the request must be signed with.

use std::net::IpAddr;

use dns_types::protocol::types::DomainName;

/// One rule: an address prefix and an optional key requirement.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AclEntry {
    pub network: IpAddr,
    pub prefix_len: u8,
    pub key: Option<DomainName>,
}

impl AclEntry {
    /// Accept any source address, signed with the given key.
    pub fn any_address_with_key(key: DomainName) -> Self {
        Self {
            network: IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
            prefix_len: 0,
            key: Some(key),
        }
    }

    fn matches_address(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(network), IpAddr::V4(addr)) => {
                let bits = u32::from(self.prefix_len.min(32));
                let mask = if bits == 0 {
                    0
                } else {
                    u32::MAX << (32 - bits)
                };
                u32::from(network) & mask == u32::from(addr) & mask
            }
            (IpAddr::V6(network), IpAddr::V6(addr)) => {
                let bits = u32::from(self.prefix_len.min(128));
                let mask = if bits == 0 {
                    0
                } else {
                    u128::MAX << (128 - bits)
                };
                u128::from(network) & mask == u128::from(addr) & mask
            }
            _ => false,
        }
    }
}

/// The answer an ACL gives for one transaction.  `NeedsKey` is the
/// in-between state: the address is acceptable, but only with a
/// signature the request did not carry (or carried under the wrong
/// key) - for updates that maps to NOTAUTH with TSIG BADKEY rather
/// than a flat denial.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AclVerdict {
    Allow,
    Deny,
    NeedsKey,
}

/// An ordered list of rules; the first fully-matching rule wins.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Acl {
    entries: Vec<AclEntry>,
}

impl Acl {
    pub fn new(entries: Vec<AclEntry>) -> Self {
        Self { entries }
    }

    /// The empty ACL: denies everything.
    pub fn deny_all() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evaluate(&self, addr: IpAddr, key: Option<&DomainName>) -> AclVerdict {
        let mut needs_key = false;

        for entry in &self.entries {
            if !entry.matches_address(addr) {
                continue;
            }

            match (&entry.key, key) {
                (None, _) => return AclVerdict::Allow,
                (Some(required), Some(presented)) if required == presented => {
                    return AclVerdict::Allow
                }
                (Some(_), _) => needs_key = true,
            }
        }

        if needs_key {
            AclVerdict::NeedsKey
        } else {
            AclVerdict::Deny
        }
    }
}
