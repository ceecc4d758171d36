//! Dynamic updates (RFC 2136): check the prerequisites against the
//! current zone, then turn the update section into a changeset.  The
//! zone itself is never touched here - the caller applies the
//! changeset through the zone store's copy-on-write primitive, so a
//! failure at any stage leaves the published zone exactly as it was.

use std::collections::HashMap;

use dns_types::protocol::types::*;
use dns_types::zones::types::*;

/// The TYPE code for ANY, which has no `RecordType` of its own: in
/// update packets it appears as a record type.
const TYPE_ANY: u16 = 255;

/// Process an UPDATE message against the zone it names.  Returns the
/// changeset to apply, `None` if the update is a no-op, or the RCODE
/// to answer with.
pub fn process(zone: &Zone, query: &Message) -> Result<Option<Changeset>, Rcode> {
    check_prerequisites(zone, &query.answers)?;
    build_changeset(zone, &query.authority)
}

/// Walk the prerequisite section (RFC 2136 section 3.2).  All checks
/// run against the zone as it was before any update record is
/// considered.
fn check_prerequisites(zone: &Zone, prereqs: &[ResourceRecord]) -> Result<(), Rcode> {
    let mut exact: HashMap<(DomainName, RecordType), Vec<RecordTypeWithData>> = HashMap::new();

    for rr in prereqs {
        if rr.ttl != 0 {
            return Err(Rcode::FormatError);
        }
        if !rr.name.is_subdomain_of(zone.apex()) {
            return Err(Rcode::NotZone);
        }

        let rtype = rr.rtype_with_data.rtype();
        let tcode = u16::from(rtype);
        let empty_rdata = rr.rtype_with_data.rdata_len_uncompressed() == 0;

        match rr.rclass {
            RecordClass::Any if tcode == TYPE_ANY => {
                if !empty_rdata {
                    return Err(Rcode::FormatError);
                }
                if !name_in_use(zone, &rr.name) {
                    return Err(Rcode::NameError);
                }
            }
            RecordClass::Any => {
                if !empty_rdata || is_meta_type(tcode) {
                    return Err(Rcode::FormatError);
                }
                if !rrset_exists(zone, &rr.name, rtype) {
                    return Err(Rcode::NXRRSet);
                }
            }
            RecordClass::None if tcode == TYPE_ANY => {
                if !empty_rdata {
                    return Err(Rcode::FormatError);
                }
                if name_in_use(zone, &rr.name) {
                    return Err(Rcode::YXDomain);
                }
            }
            RecordClass::None => {
                if !empty_rdata || is_meta_type(tcode) {
                    return Err(Rcode::FormatError);
                }
                if rrset_exists(zone, &rr.name, rtype) {
                    return Err(Rcode::YXRRSet);
                }
            }
            RecordClass::IN => {
                if empty_rdata || is_meta_type(tcode) || tcode == TYPE_ANY {
                    return Err(Rcode::FormatError);
                }
                exact
                    .entry((rr.name.clone(), rtype))
                    .or_default()
                    .push(rr.rtype_with_data.clone());
            }
            _ => return Err(Rcode::FormatError),
        }
    }

    // the value-dependent form: each named RRset must match exactly,
    // TTLs aside
    for ((name, rtype), mut wanted) in exact {
        let Some(rrset) = zone.node(&name).and_then(|node| node.get(rtype)) else {
            return Err(Rcode::NXRRSet);
        };

        let mut existing = rrset.rdatas.clone();
        existing.sort();
        existing.dedup();
        wanted.sort();
        wanted.dedup();

        if existing != wanted {
            return Err(Rcode::NXRRSet);
        }
    }

    Ok(())
}

/// Walk the update section (RFC 2136 sections 3.4.1 and 3.4.2):
/// validate every record first, then simulate the operations against
/// an overlay of the zone, and emit the difference as a changeset.
fn build_changeset(zone: &Zone, updates: &[ResourceRecord]) -> Result<Option<Changeset>, Rcode> {
    // 3.4.1: the whole section is vetted before anything is applied
    for rr in updates {
        if !rr.name.is_subdomain_of(zone.apex()) {
            return Err(Rcode::NotZone);
        }

        let rtype = rr.rtype_with_data.rtype();
        let tcode = u16::from(rtype);
        let empty_rdata = rr.rtype_with_data.rdata_len_uncompressed() == 0;

        if rtype.is_update_forbidden() {
            return Err(Rcode::Refused);
        }

        match rr.rclass {
            RecordClass::IN => {
                if is_meta_type(tcode) || tcode == TYPE_ANY || rr.rtype_with_data.is_empty_rdata()
                {
                    return Err(Rcode::FormatError);
                }
            }
            RecordClass::Any => {
                if rr.ttl != 0 || !empty_rdata || is_meta_type(tcode) {
                    return Err(Rcode::FormatError);
                }
            }
            RecordClass::None => {
                if rr.ttl != 0 || is_meta_type(tcode) || tcode == TYPE_ANY || empty_rdata {
                    return Err(Rcode::FormatError);
                }
            }
            _ => return Err(Rcode::FormatError),
        }
    }

    // 3.4.2: simulate
    let mut overlay = Overlay {
        zone,
        sets: HashMap::new(),
    };
    let mut new_soa: Option<SOA> = None;

    for rr in updates {
        let rtype = rr.rtype_with_data.rtype();
        let tcode = u16::from(rtype);
        let at_apex = rr.name == *zone.apex();

        match rr.rclass {
            RecordClass::IN => match rtype {
                RecordType::SOA => {
                    // only the apex SOA, and only a newer one,
                    // replaces; anything else is silently dropped
                    if at_apex {
                        if let Some(soa) = SOA::from_rdata(&rr.rtype_with_data) {
                            if serial_gt(soa.serial, zone.serial()) {
                                new_soa = Some(soa);
                            }
                        }
                    }
                }
                RecordType::CNAME => {
                    if overlay.has_data_other_than_cname(&rr.name) {
                        continue;
                    }
                    let state = overlay.state(&rr.name, rtype);
                    state.ttl = rr.ttl;
                    state.rdatas = vec![rr.rtype_with_data.clone()];
                }
                _ => {
                    if overlay.has_cname(&rr.name) {
                        continue;
                    }
                    let state = overlay.state(&rr.name, rtype);
                    if rtype.is_singleton() {
                        state.ttl = rr.ttl;
                        state.rdatas = vec![rr.rtype_with_data.clone()];
                    } else {
                        state.ttl = rr.ttl;
                        if !state.rdatas.contains(&rr.rtype_with_data) {
                            state.rdatas.push(rr.rtype_with_data.clone());
                        }
                    }
                }
            },
            RecordClass::Any if tcode == TYPE_ANY => {
                for rtype in overlay.types_at(&rr.name) {
                    if at_apex && matches!(rtype, RecordType::SOA | RecordType::NS) {
                        continue;
                    }
                    overlay.state(&rr.name, rtype).rdatas.clear();
                }
            }
            RecordClass::Any => {
                if at_apex && matches!(rtype, RecordType::SOA | RecordType::NS) {
                    continue;
                }
                overlay.state(&rr.name, rtype).rdatas.clear();
            }
            RecordClass::None => {
                if rtype == RecordType::SOA {
                    continue;
                }
                let state = overlay.state(&rr.name, rtype);
                // deleting the last apex NS would orphan the zone, so
                // that particular removal is ignored
                if at_apex
                    && rtype == RecordType::NS
                    && state.rdatas.len() <= 1
                    && state.rdatas.contains(&rr.rtype_with_data)
                {
                    continue;
                }
                state.rdatas.retain(|rdata| *rdata != rr.rtype_with_data);
            }
            _ => unreachable!("rejected by the validation pass"),
        }
    }

    // emit the difference between the overlay and the zone
    let mut removes = Vec::new();
    let mut adds = Vec::new();

    for ((name, rtype), state) in overlay.sets {
        let (original_ttl, original_rdatas) = match zone.node(&name).and_then(|n| n.get(rtype)) {
            Some(rrset) => (rrset.ttl, rrset.rdatas.clone()),
            None => (0, Vec::new()),
        };

        for rdata in &original_rdatas {
            if !state.rdatas.contains(rdata) || state.ttl != original_ttl {
                removes.push(record(&name, rdata, original_ttl));
            }
        }
        for rdata in &state.rdatas {
            if !original_rdatas.contains(rdata) || state.ttl != original_ttl {
                adds.push(record(&name, rdata, state.ttl));
            }
        }
    }

    if removes.is_empty() && adds.is_empty() && new_soa.is_none() {
        return Ok(None);
    }

    let soa_to = new_soa.unwrap_or_else(|| {
        let mut soa = zone.soa().clone();
        soa.serial = soa.serial.wrapping_add(1);
        soa
    });

    Ok(Some(Changeset {
        soa_from: zone.soa().clone(),
        soa_to,
        removes,
        adds,
    }))
}

/// The simulated state of every RRset an update touches, lazily
/// seeded from the zone.
struct Overlay<'a> {
    zone: &'a Zone,
    sets: HashMap<(DomainName, RecordType), RrsetState>,
}

struct RrsetState {
    ttl: u32,
    rdatas: Vec<RecordTypeWithData>,
}

impl Overlay<'_> {
    fn state(&mut self, name: &DomainName, rtype: RecordType) -> &mut RrsetState {
        let zone = self.zone;
        self.sets
            .entry((name.clone(), rtype))
            .or_insert_with(|| match zone.node(name).and_then(|n| n.get(rtype)) {
                Some(rrset) => RrsetState {
                    ttl: rrset.ttl,
                    rdatas: rrset.rdatas.clone(),
                },
                None => RrsetState {
                    ttl: 0,
                    rdatas: Vec::new(),
                },
            })
    }

    /// The types with at least one record at a name, overlay applied.
    fn types_at(&self, name: &DomainName) -> Vec<RecordType> {
        let mut types: Vec<RecordType> = self
            .zone
            .node(name)
            .map(|node| node.rrsets().map(|rrset| rrset.rtype).collect())
            .unwrap_or_default();

        for ((n, rtype), state) in &self.sets {
            if n != name {
                continue;
            }
            if state.rdatas.is_empty() {
                types.retain(|t| t != rtype);
            } else if !types.contains(rtype) {
                types.push(*rtype);
            }
        }

        types
    }

    fn has_cname(&self, name: &DomainName) -> bool {
        self.types_at(name).contains(&RecordType::CNAME)
    }

    fn has_data_other_than_cname(&self, name: &DomainName) -> bool {
        self.types_at(name)
            .iter()
            .any(|rtype| !rtype.can_coexist_with_cname())
    }
}

/// A name is "in use" if it owns at least one record; an empty
/// non-terminal does not count.
fn name_in_use(zone: &Zone, name: &DomainName) -> bool {
    zone.node(name).is_some_and(|node| !node.is_empty())
}

fn rrset_exists(zone: &Zone, name: &DomainName, rtype: RecordType) -> bool {
    zone.node(name).and_then(|node| node.get(rtype)).is_some()
}

/// QTYPEs and META-TYPEs other than ANY may not appear in update
/// packets at all (RFC 2136 section 3.4.1.2).
fn is_meta_type(tcode: u16) -> bool {
    (128..=254).contains(&tcode) || tcode == u16::from(RecordType::Opt)
}

fn record(name: &DomainName, rdata: &RecordTypeWithData, ttl: u32) -> ResourceRecord {
    ResourceRecord {
        name: name.clone(),
        rtype_with_data: rdata.clone(),
        rclass: RecordClass::IN,
        ttl,
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use dns_types::protocol::types::test_util::*;

    fn zone() -> Zone {
        let mut builder = Zone::builder(domain("example.com."), TtlPolicy::Primary);
        builder.insert_rr(&soa_record("example.com.", 10)).unwrap();
        builder
            .insert_rr(&ns_record("example.com.", "ns1.example.com."))
            .unwrap();
        builder
            .insert_rr(&a_record("a.example.com.", Ipv4Addr::new(192, 0, 2, 10)))
            .unwrap();
        builder.build().unwrap()
    }

    fn update_query(prereqs: Vec<ResourceRecord>, updates: Vec<ResourceRecord>) -> Message {
        let mut message = Message::from_question(
            1,
            Question {
                name: domain("example.com."),
                qtype: QueryType::Record(RecordType::SOA),
                qclass: RecordClass::IN,
            },
        );
        message.header.opcode = Opcode::Update;
        message.answers = prereqs;
        message.authority = updates;
        message
    }

    fn prereq(name: &str, rtype: RecordType, rclass: RecordClass) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::Empty { rtype },
            rclass,
            ttl: 0,
        }
    }

    fn prereq_any_type(name: &str, rclass: RecordClass) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::Unknown {
                tag: match RecordType::from(TYPE_ANY) {
                    RecordType::Unknown(tag) => tag,
                    _ => unreachable!(),
                },
                octets: Vec::new(),
            },
            rclass,
            ttl: 0,
        }
    }

    #[test]
    fn add_record_produces_changeset() {
        let zone = zone();
        let new_rr = a_record("b.example.com.", Ipv4Addr::new(192, 0, 2, 20));
        let query = update_query(Vec::new(), vec![new_rr.clone()]);

        let changeset = process(&zone, &query).unwrap().unwrap();
        assert_eq!(vec![new_rr], changeset.adds);
        assert!(changeset.removes.is_empty());
        assert_eq!(11, changeset.soa_to.serial);

        let updated = zone.apply(&changeset).unwrap();
        assert!(updated.node(&domain("b.example.com.")).is_some());
    }

    #[test]
    fn add_existing_record_is_noop() {
        let zone = zone();
        let query = update_query(
            Vec::new(),
            vec![a_record("a.example.com.", Ipv4Addr::new(192, 0, 2, 10))],
        );

        assert_eq!(Ok(None), process(&zone, &query));
    }

    #[test]
    fn delete_rrset() {
        let zone = zone();
        let mut delete = prereq("a.example.com.", RecordType::A, RecordClass::Any);
        delete.ttl = 0;
        let query = update_query(Vec::new(), vec![delete]);

        let changeset = process(&zone, &query).unwrap().unwrap();
        assert!(changeset.adds.is_empty());
        assert_eq!(
            vec![a_record("a.example.com.", Ipv4Addr::new(192, 0, 2, 10))],
            changeset.removes
        );
    }

    #[test]
    fn delete_exact_record() {
        let zone = zone();
        let mut target = a_record("a.example.com.", Ipv4Addr::new(192, 0, 2, 10));
        target.rclass = RecordClass::None;
        target.ttl = 0;
        let query = update_query(Vec::new(), vec![target]);

        let changeset = process(&zone, &query).unwrap().unwrap();
        assert_eq!(1, changeset.removes.len());
    }

    #[test]
    fn delete_all_at_apex_keeps_soa_and_ns() {
        let zone = zone();
        let query = update_query(
            Vec::new(),
            vec![prereq_any_type("example.com.", RecordClass::Any)],
        );

        // SOA and NS survive, so there is nothing to do
        assert_eq!(Ok(None), process(&zone, &query));
    }

    #[test]
    fn delete_last_apex_ns_is_ignored() {
        let zone = zone();
        let mut target = ns_record("example.com.", "ns1.example.com.");
        target.rclass = RecordClass::None;
        target.ttl = 0;
        let query = update_query(Vec::new(), vec![target]);

        assert_eq!(Ok(None), process(&zone, &query));
    }

    #[test]
    fn stale_soa_is_dropped() {
        let zone = zone();
        let mut soa = soa_record("example.com.", 5);
        soa.ttl = 300;
        let query = update_query(Vec::new(), vec![soa]);

        assert_eq!(Ok(None), process(&zone, &query));
    }

    #[test]
    fn newer_soa_replaces() {
        let zone = zone();
        let query = update_query(Vec::new(), vec![soa_record("example.com.", 42)]);

        let changeset = process(&zone, &query).unwrap().unwrap();
        assert_eq!(42, changeset.soa_to.serial);
        assert!(changeset.adds.is_empty());
        assert!(changeset.removes.is_empty());
    }

    #[test]
    fn rrsig_update_is_refused() {
        let zone = zone();
        let rr = ResourceRecord {
            name: domain("a.example.com."),
            rtype_with_data: RecordTypeWithData::RRSIG {
                type_covered: RecordType::A,
                algorithm: 8,
                labels: 3,
                original_ttl: 300,
                expiration: 2,
                inception: 1,
                key_tag: 7,
                signer: domain("example.com."),
                signature: vec![1, 2, 3],
            },
            rclass: RecordClass::IN,
            ttl: 300,
        };
        let query = update_query(Vec::new(), vec![rr]);

        assert_eq!(Err(Rcode::Refused), process(&zone, &query));
    }

    #[test]
    fn out_of_zone_update_is_notzone() {
        let zone = zone();
        let query = update_query(
            Vec::new(),
            vec![a_record("other.example.net.", Ipv4Addr::new(1, 2, 3, 4))],
        );

        assert_eq!(Err(Rcode::NotZone), process(&zone, &query));
    }

    #[test]
    fn cname_add_over_existing_data_is_ignored() {
        let zone = zone();
        let query = update_query(
            Vec::new(),
            vec![cname_record("a.example.com.", "target.example.com.")],
        );

        assert_eq!(Ok(None), process(&zone, &query));
    }

    #[test]
    fn data_add_over_cname_is_ignored() {
        let mut builder = Zone::builder(domain("example.com."), TtlPolicy::Primary);
        builder.insert_rr(&soa_record("example.com.", 10)).unwrap();
        builder
            .insert_rr(&ns_record("example.com.", "ns1.example.com."))
            .unwrap();
        builder
            .insert_rr(&cname_record("alias.example.com.", "a.example.com."))
            .unwrap();
        let zone = builder.build().unwrap();

        let query = update_query(
            Vec::new(),
            vec![a_record("alias.example.com.", Ipv4Addr::new(1, 1, 1, 1))],
        );

        assert_eq!(Ok(None), process(&zone, &query));
    }

    #[test]
    fn prereq_name_in_use_passes_and_fails() {
        let zone = zone();

        let passing = update_query(
            vec![prereq_any_type("a.example.com.", RecordClass::Any)],
            Vec::new(),
        );
        assert_eq!(Ok(None), process(&zone, &passing));

        let failing = update_query(
            vec![prereq_any_type("missing.example.com.", RecordClass::Any)],
            Vec::new(),
        );
        assert_eq!(Err(Rcode::NameError), process(&zone, &failing));
    }

    #[test]
    fn prereq_rrset_exists_fails_with_nxrrset() {
        let zone = zone();

        // "RRset b.example.com/A exists" when it does not
        let failing = update_query(
            vec![prereq("b.example.com.", RecordType::A, RecordClass::Any)],
            Vec::new(),
        );
        assert_eq!(Err(Rcode::NXRRSet), process(&zone, &failing));
    }

    #[test]
    fn prereq_name_not_in_use_fails_with_yxdomain() {
        let zone = zone();

        let failing = update_query(
            vec![prereq_any_type("a.example.com.", RecordClass::None)],
            Vec::new(),
        );
        assert_eq!(Err(Rcode::YXDomain), process(&zone, &failing));
    }

    #[test]
    fn prereq_rrset_not_exists_fails_with_yxrrset() {
        let zone = zone();

        let failing = update_query(
            vec![prereq("a.example.com.", RecordType::A, RecordClass::None)],
            Vec::new(),
        );
        assert_eq!(Err(Rcode::YXRRSet), process(&zone, &failing));
    }

    #[test]
    fn prereq_exact_match() {
        let zone = zone();

        let mut matching = a_record("a.example.com.", Ipv4Addr::new(192, 0, 2, 10));
        matching.ttl = 0;
        let passing = update_query(vec![matching], Vec::new());
        assert_eq!(Ok(None), process(&zone, &passing));

        let mut wrong = a_record("a.example.com.", Ipv4Addr::new(192, 0, 2, 11));
        wrong.ttl = 0;
        let failing = update_query(vec![wrong], Vec::new());
        assert_eq!(Err(Rcode::NXRRSet), process(&zone, &failing));
    }

    #[test]
    fn prereq_nonzero_ttl_is_formerr() {
        let zone = zone();
        let mut bad = prereq("a.example.com.", RecordType::A, RecordClass::Any);
        bad.ttl = 300;
        let query = update_query(vec![bad], Vec::new());

        assert_eq!(Err(Rcode::FormatError), process(&zone, &query));
    }

    #[test]
    fn add_then_delete_round_trips_through_apply() {
        let zone = zone();
        let rr = a_record("tmp.example.com.", Ipv4Addr::new(192, 0, 2, 77));

        let add = process(&zone, &update_query(Vec::new(), vec![rr.clone()]))
            .unwrap()
            .unwrap();
        let zone2 = zone.apply(&add).unwrap();

        let mut delete = rr;
        delete.rclass = RecordClass::None;
        delete.ttl = 0;
        let remove = process(&zone2, &update_query(Vec::new(), vec![delete]))
            .unwrap()
            .unwrap();
        let zone3 = zone2.apply(&remove).unwrap();

        assert!(zone3.node(&domain("tmp.example.com.")).is_none());
        assert_eq!(12, zone3.serial());
    }
}
