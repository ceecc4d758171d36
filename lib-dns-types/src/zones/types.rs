use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use crate::protocol::types::*;
use crate::zones::nsec3::{Nsec3Params, Nsec3Tree};

/// A collection of published zones, keyed by apex.  Zones are held
/// behind `Arc` so that publishing a new version of one is a pointer
/// swap and readers holding the old version keep a stable snapshot
/// until they drop it.
#[derive(Debug, Clone, Default)]
pub struct ZoneSet {
    zones: HashMap<DomainName, Arc<Zone>>,
}

impl ZoneSet {
    pub fn new() -> Self {
        Self {
            zones: HashMap::new(),
        }
    }

    /// Find the zone whose apex is the longest suffix of the name, if
    /// there is one.
    pub fn find(&self, name: &DomainName) -> Option<&Arc<Zone>> {
        let mut candidate = Some(name.clone());
        while let Some(n) = candidate {
            if let Some(zone) = self.zones.get(&n) {
                return Some(zone);
            }
            candidate = n.parent();
        }

        None
    }

    /// Look up a zone by its exact apex.
    pub fn get(&self, apex: &DomainName) -> Option<&Arc<Zone>> {
        self.zones.get(apex)
    }

    /// Create or replace a zone.
    pub fn insert(&mut self, zone: Arc<Zone>) {
        self.zones.insert(zone.apex().clone(), zone);
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// What to do when records of one RRset disagree about their TTL.
/// A primary zone's contents are its own configuration, so a mismatch
/// is an error; a secondary learned its contents from someone else's
/// wire stream, so the first TTL seen wins.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum TtlPolicy {
    #[default]
    Primary,
    Secondary,
}

/// All the records of one zone: an apex, a tree of nodes in canonical
/// order, and (for an NSEC3-signed zone) the hashed-name sidecar.
///
/// A `Zone` is immutable once built.  Updates go through `apply`,
/// which produces a new `Zone` sharing every untouched node with this
/// one.
#[derive(Debug, Clone)]
pub struct Zone {
    apex: DomainName,
    soa: SOA,
    nodes: BTreeMap<DomainName, Arc<Node>>,
    nsec3: Option<Nsec3Tree>,
    ttl_policy: TtlPolicy,
}

/// The result of looking up a name in a zone: either the node itself,
/// or everything needed to answer for a name which is not there - the
/// closest encloser drives wildcard synthesis and referral decisions,
/// and the predecessor drives NSEC proofs.
#[derive(Debug, Clone)]
pub enum Lookup<'a> {
    Match {
        node: &'a Node,
    },
    Miss {
        encloser: &'a Node,
        previous: &'a Node,
        wildcard: Option<&'a Node>,
    },
}

impl Zone {
    pub fn builder(apex: DomainName, ttl_policy: TtlPolicy) -> ZoneBuilder {
        ZoneBuilder {
            apex,
            ttl_policy,
            nodes: BTreeMap::new(),
        }
    }

    pub fn apex(&self) -> &DomainName {
        &self.apex
    }

    pub fn soa(&self) -> &SOA {
        &self.soa
    }

    pub fn serial(&self) -> u32 {
        self.soa.serial
    }

    pub fn soa_rr(&self) -> ResourceRecord {
        self.soa.to_rr(&self.apex)
    }

    pub fn nsec3(&self) -> Option<&Nsec3Tree> {
        self.nsec3.as_ref()
    }

    /// A zone is treated as signed if its apex carries signatures or
    /// it maintains an NSEC3 chain.  Signed zones include denial
    /// proofs when the client sets DO.
    pub fn is_signed(&self) -> bool {
        self.nsec3.is_some()
            || self.apex_node().get(RecordType::RRSIG).is_some()
            || self.apex_node().get(RecordType::NSEC).is_some()
    }

    /// The apex node.
    ///
    /// # Panics
    ///
    /// Cannot panic: a `Zone` cannot be built without its apex.
    pub fn apex_node(&self) -> &Node {
        self.nodes.get(&self.apex).expect("zone lost its apex")
    }

    pub fn node(&self, name: &DomainName) -> Option<&Node> {
        self.nodes.get(name).map(Arc::as_ref)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The single lookup primitive: an exact node, or (closest
    /// encloser, canonical predecessor, wildcard child of the
    /// encloser).  Returns `None` if the name is not below this
    /// zone's apex at all.
    pub fn lookup(&self, name: &DomainName) -> Option<Lookup<'_>> {
        if !name.is_subdomain_of(&self.apex) {
            return None;
        }

        if let Some(node) = self.nodes.get(name) {
            return Some(Lookup::Match { node });
        }

        // the apex is present, so walking up must terminate
        let mut encloser_name = name.parent()?;
        let encloser = loop {
            if let Some(node) = self.nodes.get(&encloser_name) {
                break node;
            }
            encloser_name = encloser_name.parent()?;
        };

        // subdomains sort after their parent, and the apex is a
        // suffix of the name, so there is always a predecessor
        let previous = self
            .nodes
            .range::<DomainName, _>((Bound::Unbounded, Bound::Excluded(name)))
            .next_back()
            .map(|(_, node)| node)?;

        let wildcard = if encloser.has_wildcard_child {
            encloser
                .name
                .wildcard_child()
                .and_then(|w| self.nodes.get(&w))
        } else {
            None
        };

        Some(Lookup::Miss {
            encloser,
            previous,
            wildcard: wildcard.map(Arc::as_ref),
        })
    }

    /// Nodes in canonical order.
    pub fn entries(&self) -> impl Iterator<Item = &Arc<Node>> {
        self.nodes.values()
    }

    /// Nodes in canonical order, starting strictly after `name`.
    /// This is the transfer cursor: a stream can stop at any node and
    /// resume from its name.
    pub fn entries_after<'a>(
        &'a self,
        name: &DomainName,
    ) -> impl Iterator<Item = &'a Arc<Node>> + 'a {
        self.nodes
            .range::<DomainName, _>((Bound::Excluded(name), Bound::Unbounded))
            .map(|(_, node)| node)
    }

    /// The canonically greatest node strictly before `name`, wrapping
    /// to the last node of the zone.  This is the NSEC "previous"
    /// relation.
    pub fn predecessor(&self, name: &DomainName) -> Option<&Node> {
        self.nodes
            .range::<DomainName, _>((Bound::Unbounded, Bound::Excluded(name)))
            .next_back()
            .or_else(|| self.nodes.iter().next_back())
            .map(|(_, node)| node.as_ref())
    }

    /// Produce a new zone with the changeset applied, leaving this
    /// one untouched.  Unchanged nodes are shared between the two
    /// zones.
    ///
    /// This enforces the structural rules: the apex SOA cannot be
    /// removed, the apex NS set cannot be emptied, CNAME cannot
    /// coexist with other data, NSEC3PARAM lives only at the apex,
    /// TTLs within an RRset stay uniform, and the serial must advance
    /// (in RFC 1982 terms) whenever anything other than the SOA
    /// changed.
    pub fn apply(&self, changeset: &Changeset) -> Result<Zone, ZoneError> {
        let mut builder = ZoneBuilder {
            apex: self.apex.clone(),
            ttl_policy: self.ttl_policy,
            nodes: self.nodes.clone(),
        };

        for rr in &changeset.removes {
            if rr.rtype_with_data.rtype() == RecordType::SOA {
                return Err(ZoneError::WouldRemoveApexSoa);
            }
            builder.remove_rr(&rr.name, &rr.rtype_with_data);
        }
        for rr in &changeset.adds {
            if rr.rtype_with_data.rtype() == RecordType::SOA {
                return Err(ZoneError::SoaNotAtApex {
                    name: rr.name.clone(),
                });
            }
            builder.insert_rr(rr)?;
        }

        builder.insert_rr(&changeset.soa_to.to_rr(&self.apex))?;

        let new = builder.build()?;

        if !changeset.is_empty() && !serial_gt(new.serial(), self.serial()) {
            return Err(ZoneError::SerialNotAdvanced {
                old: self.serial(),
                new: new.serial(),
            });
        }

        if self.apex_node().get(RecordType::NS).is_some()
            && new.apex_node().get(RecordType::NS).is_none()
        {
            return Err(ZoneError::WouldEmptyApexNs);
        }

        Ok(new)
    }
}

/// Accumulates records into a consistent `Zone`.  `build` is where
/// the structure is derived: empty non-terminals are materialised,
/// nodes which lost all their records and descendants are pruned,
/// the apex/delegation/glue flags are recomputed, and the NSEC3
/// sidecar is rebuilt.
///
/// Nodes are held behind `Arc` and mutated copy-on-write, so a
/// builder seeded from an existing zone only copies the nodes it
/// actually touches.
#[derive(Debug, Clone)]
pub struct ZoneBuilder {
    apex: DomainName,
    ttl_policy: TtlPolicy,
    nodes: BTreeMap<DomainName, Arc<Node>>,
}

impl ZoneBuilder {
    /// Add one record.
    ///
    /// Singleton types (CNAME, SOA, NSEC3PARAM) replace any existing
    /// record of that type.  A TTL disagreeing with the rest of the
    /// RRset is an error or is coerced, per the zone's TTL policy.
    pub fn insert_rr(&mut self, rr: &ResourceRecord) -> Result<(), ZoneError> {
        if !rr.name.is_subdomain_of(&self.apex) {
            return Err(ZoneError::NotSubdomain {
                apex: self.apex.clone(),
                name: rr.name.clone(),
            });
        }

        let rtype = rr.rtype_with_data.rtype();

        if rtype == RecordType::SOA && rr.name != self.apex {
            return Err(ZoneError::SoaNotAtApex {
                name: rr.name.clone(),
            });
        }
        if rtype == RecordType::NSEC3PARAM && rr.name != self.apex {
            return Err(ZoneError::Nsec3ParamNotAtApex {
                name: rr.name.clone(),
            });
        }

        let node = Arc::make_mut(
            self.nodes
                .entry(rr.name.clone())
                .or_insert_with(|| Arc::new(Node::empty(rr.name.clone()))),
        );

        // CNAME and other data cannot share a name (RFC 2181 section
        // 10.1), with the denial-of-existence types excepted
        if rtype == RecordType::CNAME {
            if node
                .rrsets
                .keys()
                .any(|other| !other.can_coexist_with_cname())
            {
                return Err(ZoneError::CnameConflict {
                    name: rr.name.clone(),
                });
            }
        } else if !rtype.can_coexist_with_cname() && node.rrsets.contains_key(&RecordType::CNAME) {
            return Err(ZoneError::CnameConflict {
                name: rr.name.clone(),
            });
        }

        match node.rrsets.entry(rtype) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let rrset = entry.get_mut();
                if rtype.is_singleton() {
                    rrset.ttl = rr.ttl;
                    rrset.rdatas = vec![rr.rtype_with_data.clone()];
                    return Ok(());
                }

                // under the secondary policy the first TTL seen
                // stands; the set's TTL is never rewritten
                if rrset.ttl != rr.ttl && self.ttl_policy == TtlPolicy::Primary {
                    return Err(ZoneError::TtlMismatch {
                        name: rr.name.clone(),
                        rtype,
                    });
                }

                if !rrset.rdatas.contains(&rr.rtype_with_data) {
                    rrset.rdatas.push(rr.rtype_with_data.clone());
                    rrset.rdatas.sort();
                }
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(RRSet {
                    rtype,
                    ttl: rr.ttl,
                    rdatas: vec![rr.rtype_with_data.clone()],
                });
            }
        }

        Ok(())
    }

    /// Remove one record, by exact RDATA match.  Removing the last
    /// record of an RRset removes the RRset; pruning of emptied nodes
    /// happens in `build`.
    pub fn remove_rr(&mut self, name: &DomainName, rdata: &RecordTypeWithData) {
        let rtype = rdata.rtype();
        if let Some(node) = self.nodes.get_mut(name) {
            let node = Arc::make_mut(node);
            if let Some(rrset) = node.rrsets.get_mut(&rtype) {
                rrset.rdatas.retain(|r| r != rdata);
                if rrset.rdatas.is_empty() {
                    node.rrsets.remove(&rtype);
                }
            }
        }
    }

    /// Derive the zone structure and check its invariants.
    pub fn build(mut self) -> Result<Zone, ZoneError> {
        let soa = match self.nodes.get(&self.apex).and_then(|node| node.get(RecordType::SOA)) {
            Some(rrset) => match rrset.rdatas.as_slice() {
                [rdata] => SOA::from_rdata(rdata).ok_or(ZoneError::MissingSoa)?,
                _ => return Err(ZoneError::MultipleSoa),
            },
            None => return Err(ZoneError::MissingSoa),
        };

        self.materialise_empty_nonterminals();
        self.prune_empty_leaves();
        self.adjust_flags();

        let nsec3 = self.build_nsec3_tree();

        Ok(Zone {
            apex: self.apex,
            soa,
            nodes: self.nodes,
            nsec3,
            ttl_policy: self.ttl_policy,
        })
    }

    /// Every node's parent chain up to the apex must exist, even if
    /// it holds no records, so that closest-encloser walks stop at
    /// real nodes.
    fn materialise_empty_nonterminals(&mut self) {
        let names: Vec<DomainName> = self.nodes.keys().cloned().collect();
        for name in names {
            let mut parent = name.parent();
            while let Some(p) = parent {
                if !p.is_subdomain_of(&self.apex) || self.nodes.contains_key(&p) {
                    break;
                }
                self.nodes
                    .insert(p.clone(), Arc::new(Node::empty(p.clone())));
                parent = p.parent();
            }
        }
    }

    /// Drop nodes with no records and no surviving descendants.  In
    /// canonical order a name's descendants immediately follow it, so
    /// one reverse sweep with a "nearest kept name" cursor suffices.
    fn prune_empty_leaves(&mut self) {
        let names: Vec<DomainName> = self.nodes.keys().cloned().collect();
        let mut kept: Option<DomainName> = None;

        for name in names.into_iter().rev() {
            let empty = self
                .nodes
                .get(&name)
                .is_some_and(|node| node.rrsets.is_empty());
            let has_descendant = kept
                .as_ref()
                .is_some_and(|k| k.is_subdomain_of(&name) && *k != name);

            if empty && !has_descendant && name != self.apex {
                self.nodes.remove(&name);
            } else {
                kept = Some(name);
            }
        }
    }

    /// Recompute the apex / delegation / glue flags and wildcard
    /// markers.  Nodes whose flags did not change are left shared.
    fn adjust_flags(&mut self) {
        let mut wildcard_parents = Vec::new();
        for name in self.nodes.keys() {
            if name.is_wildcard() {
                if let Some(parent) = name.parent() {
                    wildcard_parents.push(parent);
                }
            }
        }

        let mut current_cut: Option<DomainName> = None;
        let names: Vec<DomainName> = self.nodes.keys().cloned().collect();

        for name in names {
            let under_cut = match &current_cut {
                Some(cut) => {
                    if name.is_subdomain_of(cut) && name != *cut {
                        true
                    } else {
                        current_cut = None;
                        false
                    }
                }
                None => false,
            };

            let node = self.nodes.get(&name).expect("node vanished during adjust");
            let is_apex = name == self.apex;
            let is_delegation =
                !is_apex && !under_cut && node.rrsets.contains_key(&RecordType::NS);
            let has_wildcard_child = wildcard_parents.contains(&name);

            if is_delegation {
                current_cut = Some(name.clone());
            }

            if node.is_apex != is_apex
                || node.is_delegation != is_delegation
                || node.is_non_auth != under_cut
                || node.has_wildcard_child != has_wildcard_child
            {
                let node = Arc::make_mut(self.nodes.get_mut(&name).expect("node vanished"));
                node.is_apex = is_apex;
                node.is_delegation = is_delegation;
                node.is_non_auth = under_cut;
                node.has_wildcard_child = has_wildcard_child;
            }
        }
    }

    fn build_nsec3_tree(&self) -> Option<Nsec3Tree> {
        let params = self
            .nodes
            .get(&self.apex)?
            .get(RecordType::NSEC3PARAM)
            .and_then(|rrset| rrset.rdatas.first())
            .and_then(Nsec3Params::from_rdata)?;

        let mut tree = Nsec3Tree::new(params);
        for (name, node) in &self.nodes {
            if node.rrsets.contains_key(&RecordType::NSEC3) {
                tree.insert(name);
            }
        }

        Some(tree)
    }
}

/// All the records sharing one owner name.  The flags are derived by
/// `ZoneBuilder::build`, never set by hand: `is_delegation` marks a
/// zone cut, `is_non_auth` marks glue below a cut, and
/// `has_wildcard_child` makes the wildcard probe O(1) during lookup.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Node {
    pub name: DomainName,
    rrsets: HashMap<RecordType, RRSet>,
    pub is_apex: bool,
    pub is_delegation: bool,
    pub is_non_auth: bool,
    pub has_wildcard_child: bool,
}

impl Node {
    fn empty(name: DomainName) -> Self {
        Self {
            name,
            rrsets: HashMap::new(),
            is_apex: false,
            is_delegation: false,
            is_non_auth: false,
            has_wildcard_child: false,
        }
    }

    pub fn get(&self, rtype: RecordType) -> Option<&RRSet> {
        self.rrsets.get(&rtype)
    }

    pub fn rrsets(&self) -> impl Iterator<Item = &RRSet> {
        self.rrsets.values()
    }

    pub fn is_empty(&self) -> bool {
        self.rrsets.is_empty()
    }

    /// The CNAME target, if this node is an alias.
    pub fn cname(&self) -> Option<&DomainName> {
        if let Some(rrset) = self.rrsets.get(&RecordType::CNAME) {
            if let Some(RecordTypeWithData::CNAME { cname }) = rrset.rdatas.first() {
                return Some(cname);
            }
        }
        None
    }

    /// All records at this node, owner filled in.
    pub fn to_rrs(&self) -> Vec<ResourceRecord> {
        let mut rrs = Vec::new();
        let mut rtypes: Vec<RecordType> = self.rrsets.keys().copied().collect();
        rtypes.sort_by_key(|rtype| u16::from(*rtype));
        for rtype in rtypes {
            rrs.extend(self.rrsets[&rtype].to_rrs(&self.name));
        }
        rrs
    }
}

/// All the records sharing (owner, type, class); the class is always
/// IN for zone data.  The TTL is a property of the set, not of each
/// record (RFC 2181 section 5.2).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RRSet {
    pub rtype: RecordType,
    pub ttl: u32,
    pub rdatas: Vec<RecordTypeWithData>,
}

impl RRSet {
    pub fn is_empty(&self) -> bool {
        self.rdatas.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rdatas.len()
    }

    /// Expand into wire records with the given owner.  Passing a name
    /// other than the node's own is how wildcard answers are
    /// synthesised.
    pub fn to_rrs(&self, owner: &DomainName) -> Vec<ResourceRecord> {
        self.rdatas
            .iter()
            .map(|rdata| ResourceRecord {
                name: owner.clone(),
                rtype_with_data: rdata.clone(),
                rclass: RecordClass::IN,
                ttl: self.ttl,
            })
            .collect()
    }
}

/// A SOA record.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(any(feature = "test-util", test), derive(arbitrary::Arbitrary))]
pub struct SOA {
    pub mname: DomainName,
    pub rname: DomainName,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl SOA {
    /// Convert it into a SOA RR
    pub fn to_rr(&self, name: &DomainName) -> ResourceRecord {
        ResourceRecord {
            name: name.clone(),
            rtype_with_data: self.to_rdata(),
            rclass: RecordClass::IN,
            ttl: self.minimum,
        }
    }

    /// Convert it into a SOA RDATA
    pub fn to_rdata(&self) -> RecordTypeWithData {
        RecordTypeWithData::SOA {
            mname: self.mname.clone(),
            rname: self.rname.clone(),
            serial: self.serial,
            refresh: self.refresh,
            retry: self.retry,
            expire: self.expire,
            minimum: self.minimum,
        }
    }

    pub fn from_rdata(rdata: &RecordTypeWithData) -> Option<Self> {
        if let RecordTypeWithData::SOA {
            mname,
            rname,
            serial,
            refresh,
            retry,
            expire,
            minimum,
        } = rdata
        {
            Some(Self {
                mname: mname.clone(),
                rname: rname.clone(),
                serial: *serial,
                refresh: *refresh,
                retry: *retry,
                expire: *expire,
                minimum: *minimum,
            })
        } else {
            None
        }
    }

    /// The TTL for negative answers: the SOA is served with this in
    /// the authority section (RFC 2308).
    pub fn negative_ttl(&self) -> u32 {
        self.minimum
    }
}

/// An ordered pair of zone versions and the records which separate
/// them.  Dynamic updates produce one of these, the journal stores
/// them, and IXFR replays them.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Changeset {
    pub soa_from: SOA,
    pub soa_to: SOA,
    pub removes: Vec<ResourceRecord>,
    pub adds: Vec<ResourceRecord>,
}

impl Changeset {
    /// True if nothing besides the SOA itself changes.
    pub fn is_empty(&self) -> bool {
        self.removes.is_empty() && self.adds.is_empty()
    }
}

/// Serial number comparison in RFC 1982 sequence space: `a` is
/// greater than `b` if it is ahead of it by less than half the number
/// space.
pub fn serial_gt(a: u32, b: u32) -> bool {
    let diff = a.wrapping_sub(b);
    diff != 0 && diff < 0x8000_0000
}

/// Ways building or updating a zone can fail.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ZoneError {
    NotSubdomain { apex: DomainName, name: DomainName },
    MissingSoa,
    MultipleSoa,
    SoaNotAtApex { name: DomainName },
    Nsec3ParamNotAtApex { name: DomainName },
    TtlMismatch { name: DomainName, rtype: RecordType },
    CnameConflict { name: DomainName },
    WouldRemoveApexSoa,
    WouldEmptyApexNs,
    SerialNotAdvanced { old: u32, new: u32 },
}

impl fmt::Display for ZoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneError::NotSubdomain { apex, name } => write!(
                f,
                "'{}' is not within zone '{}'",
                name.to_dotted_string(),
                apex.to_dotted_string()
            ),
            ZoneError::MissingSoa => write!(f, "zone has no SOA at its apex"),
            ZoneError::MultipleSoa => write!(f, "zone has more than one SOA record"),
            ZoneError::SoaNotAtApex { name } => {
                write!(f, "SOA at non-apex name '{}'", name.to_dotted_string())
            }
            ZoneError::Nsec3ParamNotAtApex { name } => write!(
                f,
                "NSEC3PARAM at non-apex name '{}'",
                name.to_dotted_string()
            ),
            ZoneError::TtlMismatch { name, rtype } => write!(
                f,
                "TTL mismatch in {} RRset at '{}'",
                rtype,
                name.to_dotted_string()
            ),
            ZoneError::CnameConflict { name } => write!(
                f,
                "CNAME and other data at '{}'",
                name.to_dotted_string()
            ),
            ZoneError::WouldRemoveApexSoa => write!(f, "update would remove the apex SOA"),
            ZoneError::WouldEmptyApexNs => write!(f, "update would empty the apex NS set"),
            ZoneError::SerialNotAdvanced { old, new } => {
                write!(f, "serial {new} does not advance {old}")
            }
        }
    }
}

impl std::error::Error for ZoneError {}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::protocol::types::test_util::*;

    #[test]
    fn serial_gt_sequence_space() {
        assert!(serial_gt(2, 1));
        assert!(!serial_gt(1, 2));
        assert!(!serial_gt(1, 1));
        // wrap-around: 0 is "greater than" a serial just below the
        // wrap point
        assert!(serial_gt(0, 0xffff_ffff));
        assert!(!serial_gt(0xffff_ffff, 0));
        // half the space away is not comparable; neither is greater
        assert!(!serial_gt(0x8000_0000, 0));
    }

    #[test]
    fn build_requires_soa() {
        let builder = Zone::builder(domain("example.com."), TtlPolicy::Primary);
        assert_eq!(Err(ZoneError::MissingSoa), builder.build().map(|_| ()));
    }

    #[test]
    fn build_rejects_soa_off_apex() {
        let mut builder = Zone::builder(domain("example.com."), TtlPolicy::Primary);
        assert_eq!(
            Err(ZoneError::SoaNotAtApex {
                name: domain("sub.example.com.")
            }),
            builder.insert_rr(&soa_record("sub.example.com.", 1))
        );
    }

    #[test]
    fn build_rejects_record_outside_zone() {
        let mut builder = Zone::builder(domain("example.com."), TtlPolicy::Primary);
        assert_eq!(
            Err(ZoneError::NotSubdomain {
                apex: domain("example.com."),
                name: domain("example.net.")
            }),
            builder.insert_rr(&a_record("example.net.", Ipv4Addr::new(1, 1, 1, 1)))
        );
    }

    #[test]
    fn lookup_exact_match() {
        let zone = example_zone();

        if let Some(Lookup::Match { node }) = zone.lookup(&domain("www.example.com.")) {
            assert!(node.get(RecordType::A).is_some());
            assert!(!node.is_delegation);
            assert!(!node.is_non_auth);
        } else {
            panic!("expected exact match");
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let zone = example_zone();
        let name = DomainName::from_dotted_string("WWW.EXAMPLE.COM.").unwrap();

        assert!(matches!(zone.lookup(&name), Some(Lookup::Match { .. })));
    }

    #[test]
    fn lookup_miss_gives_encloser_and_previous() {
        let zone = example_zone();

        if let Some(Lookup::Miss {
            encloser,
            previous,
            wildcard,
        }) = zone.lookup(&domain("absent.example.com."))
        {
            assert_eq!(domain("example.com."), encloser.name);
            assert!(wildcard.is_none());
            // canonical predecessor of "absent.example.com." among
            // the zone's names
            assert_eq!(domain("example.com."), previous.name);
        } else {
            panic!("expected miss");
        }
    }

    #[test]
    fn lookup_miss_below_leaf() {
        let zone = example_zone();

        if let Some(Lookup::Miss { encloser, .. }) =
            zone.lookup(&domain("deep.under.www.example.com."))
        {
            assert_eq!(domain("www.example.com."), encloser.name);
        } else {
            panic!("expected miss");
        }
    }

    #[test]
    fn lookup_outside_zone() {
        let zone = example_zone();
        assert!(zone.lookup(&domain("example.net.")).is_none());
    }

    #[test]
    fn lookup_finds_wildcard_child() {
        let zone = example_zone();

        if let Some(Lookup::Miss { wildcard, .. }) =
            zone.lookup(&domain("anything.wild.example.com."))
        {
            let wildcard = wildcard.expect("expected a wildcard child");
            assert_eq!(domain("*.wild.example.com."), wildcard.name);
        } else {
            panic!("expected miss");
        }
    }

    #[test]
    fn empty_nonterminals_are_materialised() {
        let zone = example_zone();

        // "wild.example.com." exists only as the parent of the
        // wildcard; "under.www" style names do not
        let node = zone.node(&domain("wild.example.com.")).unwrap();
        assert!(node.is_empty());
        assert!(node.has_wildcard_child);
    }

    #[test]
    fn delegation_flags() {
        let zone = example_zone();

        let cut = zone.node(&domain("sub.example.com.")).unwrap();
        assert!(cut.is_delegation);
        assert!(!cut.is_non_auth);

        let glue = zone.node(&domain("ns1.sub.example.com.")).unwrap();
        assert!(!glue.is_delegation);
        assert!(glue.is_non_auth);

        assert!(!zone.apex_node().is_delegation);
    }

    #[test]
    fn entries_iterate_in_canonical_order() {
        let zone = example_zone();

        let names: Vec<DomainName> = zone.entries().map(|node| node.name.clone()).collect();
        let mut sorted = names.clone();
        sorted.sort();

        assert_eq!(sorted, names);
        assert_eq!(domain("example.com."), names[0]);
    }

    #[test]
    fn entries_after_resumes_mid_zone() {
        let zone = example_zone();

        let all: Vec<DomainName> = zone.entries().map(|node| node.name.clone()).collect();
        let after: Vec<DomainName> = zone
            .entries_after(&all[1])
            .map(|node| node.name.clone())
            .collect();

        assert_eq!(all[2..].to_vec(), after);
    }

    #[test]
    fn apply_adds_and_removes() {
        let zone = example_zone();
        let mut soa_to = zone.soa().clone();
        soa_to.serial += 1;

        let changeset = Changeset {
            soa_from: zone.soa().clone(),
            soa_to,
            removes: vec![a_record("www.example.com.", Ipv4Addr::new(192, 0, 2, 1))],
            adds: vec![a_record("new.example.com.", Ipv4Addr::new(192, 0, 2, 99))],
        };

        let new = zone.apply(&changeset).unwrap();

        assert_eq!(zone.serial() + 1, new.serial());
        assert!(new.node(&domain("new.example.com.")).is_some());
        // www had only one A record, so the whole node went away
        assert!(new.node(&domain("www.example.com.")).is_none());
        // the old zone is untouched
        assert!(zone.node(&domain("www.example.com.")).is_some());
        assert!(zone.node(&domain("new.example.com.")).is_none());
    }

    #[test]
    fn apply_shares_untouched_nodes() {
        let zone = example_zone();
        let mut soa_to = zone.soa().clone();
        soa_to.serial += 1;

        let changeset = Changeset {
            soa_from: zone.soa().clone(),
            soa_to,
            removes: Vec::new(),
            adds: vec![a_record("new.example.com.", Ipv4Addr::new(192, 0, 2, 99))],
        };

        let new = zone.apply(&changeset).unwrap();

        let old_www = zone.nodes.get(&domain("www.example.com.")).unwrap();
        let new_www = new.nodes.get(&domain("www.example.com.")).unwrap();
        assert!(Arc::ptr_eq(old_www, new_www));
    }

    #[test]
    fn apply_requires_serial_advance() {
        let zone = example_zone();

        let changeset = Changeset {
            soa_from: zone.soa().clone(),
            soa_to: zone.soa().clone(),
            removes: Vec::new(),
            adds: vec![a_record("new.example.com.", Ipv4Addr::new(192, 0, 2, 99))],
        };

        assert_eq!(
            Err(ZoneError::SerialNotAdvanced {
                old: zone.serial(),
                new: zone.serial()
            }),
            zone.apply(&changeset).map(|_| ())
        );
    }

    #[test]
    fn apply_rejects_soa_removal() {
        let zone = example_zone();
        let mut soa_to = zone.soa().clone();
        soa_to.serial += 1;

        let changeset = Changeset {
            soa_from: zone.soa().clone(),
            soa_to,
            removes: vec![zone.soa_rr()],
            adds: Vec::new(),
        };

        assert_eq!(
            Err(ZoneError::WouldRemoveApexSoa),
            zone.apply(&changeset).map(|_| ())
        );
    }

    #[test]
    fn apply_rejects_emptying_apex_ns() {
        let zone = example_zone();
        let mut soa_to = zone.soa().clone();
        soa_to.serial += 1;

        let changeset = Changeset {
            soa_from: zone.soa().clone(),
            soa_to,
            removes: vec![ns_record("example.com.", "ns1.example.com.")],
            adds: Vec::new(),
        };

        assert_eq!(
            Err(ZoneError::WouldEmptyApexNs),
            zone.apply(&changeset).map(|_| ())
        );
    }

    #[test]
    fn apply_add_then_remove_is_identity() {
        let zone = example_zone();
        let rr = a_record("tmp.example.com.", Ipv4Addr::new(192, 0, 2, 50));

        let mut soa_mid = zone.soa().clone();
        soa_mid.serial += 1;
        let mut soa_end = zone.soa().clone();
        soa_end.serial += 2;

        let added = zone
            .apply(&Changeset {
                soa_from: zone.soa().clone(),
                soa_to: soa_mid.clone(),
                removes: Vec::new(),
                adds: vec![rr.clone()],
            })
            .unwrap();
        let removed = added
            .apply(&Changeset {
                soa_from: soa_mid,
                soa_to: soa_end,
                removes: vec![rr],
                adds: Vec::new(),
            })
            .unwrap();

        let before: Vec<DomainName> = zone.entries().map(|node| node.name.clone()).collect();
        let after: Vec<DomainName> = removed.entries().map(|node| node.name.clone()).collect();
        assert_eq!(before, after);
        for (b, a) in zone.entries().zip(removed.entries()) {
            assert_eq!(b.to_rrs(), a.to_rrs());
        }
    }

    #[test]
    fn cname_conflict_rejected() {
        let mut builder = Zone::builder(domain("example.com."), TtlPolicy::Primary);
        builder.insert_rr(&soa_record("example.com.", 1)).unwrap();
        builder
            .insert_rr(&cname_record("alias.example.com.", "www.example.com."))
            .unwrap();

        assert_eq!(
            Err(ZoneError::CnameConflict {
                name: domain("alias.example.com.")
            }),
            builder.insert_rr(&a_record("alias.example.com.", Ipv4Addr::new(1, 1, 1, 1)))
        );
    }

    #[test]
    fn ttl_mismatch_policy() {
        let mut primary = Zone::builder(domain("example.com."), TtlPolicy::Primary);
        primary.insert_rr(&soa_record("example.com.", 1)).unwrap();
        let mut rr1 = a_record("www.example.com.", Ipv4Addr::new(1, 1, 1, 1));
        let mut rr2 = a_record("www.example.com.", Ipv4Addr::new(2, 2, 2, 2));
        rr1.ttl = 300;
        rr2.ttl = 600;
        primary.insert_rr(&rr1).unwrap();
        assert_eq!(
            Err(ZoneError::TtlMismatch {
                name: domain("www.example.com."),
                rtype: RecordType::A
            }),
            primary.insert_rr(&rr2)
        );

        let mut secondary = Zone::builder(domain("example.com."), TtlPolicy::Secondary);
        secondary.insert_rr(&soa_record("example.com.", 1)).unwrap();
        secondary.insert_rr(&ns_record("example.com.", "ns1.example.com.")).unwrap();
        secondary.insert_rr(&rr1).unwrap();
        secondary.insert_rr(&rr2).unwrap();
        let zone = secondary.build().unwrap();

        // first TTL seen wins
        let node = zone.node(&domain("www.example.com.")).unwrap();
        assert_eq!(300, node.get(RecordType::A).unwrap().ttl);
        assert_eq!(2, node.get(RecordType::A).unwrap().len());
    }

    #[test]
    fn singleton_types_replace() {
        let mut builder = Zone::builder(domain("example.com."), TtlPolicy::Primary);
        builder.insert_rr(&soa_record("example.com.", 1)).unwrap();
        builder.insert_rr(&ns_record("example.com.", "ns1.example.com.")).unwrap();
        builder.insert_rr(&soa_record("example.com.", 7)).unwrap();

        let zone = builder.build().unwrap();
        assert_eq!(7, zone.serial());
    }

    #[test]
    fn zoneset_longest_suffix() {
        let mut zones = ZoneSet::new();
        zones.insert(Arc::new(example_zone()));

        let mut sub = Zone::builder(domain("sub.example.com."), TtlPolicy::Primary);
        sub.insert_rr(&soa_record("sub.example.com.", 1)).unwrap();
        sub.insert_rr(&ns_record("sub.example.com.", "ns1.sub.example.com."))
            .unwrap();
        zones.insert(Arc::new(sub.build().unwrap()));

        assert_eq!(
            domain("example.com."),
            *zones.find(&domain("www.example.com.")).unwrap().apex()
        );
        assert_eq!(
            domain("sub.example.com."),
            *zones.find(&domain("host.sub.example.com.")).unwrap().apex()
        );
        assert_eq!(
            domain("sub.example.com."),
            *zones.find(&domain("sub.example.com.")).unwrap().apex()
        );
        assert!(zones.find(&domain("example.net.")).is_none());
    }

    #[test]
    fn nsec3_tree_built_from_apex_params() {
        let mut builder = Zone::builder(domain("example.com."), TtlPolicy::Primary);
        builder.insert_rr(&soa_record("example.com.", 1)).unwrap();
        builder.insert_rr(&ns_record("example.com.", "ns1.example.com.")).unwrap();
        builder
            .insert_rr(&ResourceRecord {
                name: domain("example.com."),
                rtype_with_data: RecordTypeWithData::NSEC3PARAM {
                    hash_algorithm: 1,
                    flags: 0,
                    iterations: 0,
                    salt: Vec::new(),
                },
                rclass: RecordClass::IN,
                ttl: 0,
            })
            .unwrap();

        let zone = builder.build().unwrap();
        assert!(zone.nsec3().is_some());
        assert!(zone.is_signed());
    }

    pub fn example_zone() -> Zone {
        let mut builder = Zone::builder(domain("example.com."), TtlPolicy::Primary);
        builder.insert_rr(&soa_record("example.com.", 1)).unwrap();
        builder
            .insert_rr(&ns_record("example.com.", "ns1.example.com."))
            .unwrap();
        builder
            .insert_rr(&a_record("ns1.example.com.", Ipv4Addr::new(192, 0, 2, 53)))
            .unwrap();
        builder
            .insert_rr(&a_record("www.example.com.", Ipv4Addr::new(192, 0, 2, 1)))
            .unwrap();
        builder
            .insert_rr(&a_record(
                "*.wild.example.com.",
                Ipv4Addr::new(192, 0, 2, 99),
            ))
            .unwrap();
        builder
            .insert_rr(&ns_record("sub.example.com.", "ns1.sub.example.com."))
            .unwrap();
        builder
            .insert_rr(&a_record(
                "ns1.sub.example.com.",
                Ipv4Addr::new(192, 0, 2, 54),
            ))
            .unwrap();
        builder.build().unwrap()
    }
}
