//! The normal-query answering algorithm: exact answers, CNAME
//! chasing, referrals at zone cuts, wildcard synthesis, negative
//! answers, and - when the client asks for DNSSEC - the NSEC/NSEC3
//! proofs that go with them.  See section 4.3.2 of RFC 1034 for the
//! skeleton; RFC 4035 and RFC 5155 for the proofs.

use dns_types::protocol::types::*;
use dns_types::zones::types::*;

/// In-zone CNAME chains longer than this are returned as far as they
/// got, without an error.
const MAX_CNAME_CHAIN: usize = 8;

/// Facts about the produced answer the caller needs afterwards: rate
/// limiting treats wildcard answers specially, and a referral clears
/// the AA bit.
#[derive(Debug, Copy, Clone, Default)]
pub struct AnswerOutcome {
    pub used_wildcard: bool,
    pub referral: bool,
}

enum Step {
    Done,
    Follow(DomainName),
}

/// Answer a question from one zone, filling in the response's answer,
/// authority, and additional sections and its RCODE and AA bit.
pub fn answer(
    zone: &Zone,
    qname: &DomainName,
    qtype: QueryType,
    dnssec_ok: bool,
    response: &mut Message,
) -> AnswerOutcome {
    let mut outcome = AnswerOutcome::default();
    let mut current = qname.clone();

    for _ in 0..MAX_CNAME_CHAIN {
        match answer_step(zone, &current, qtype, dnssec_ok, response, &mut outcome) {
            Step::Done => break,
            Step::Follow(target) => {
                // chase aliases only within this zone; anything else
                // is the client's problem to resolve
                if zone.lookup(&target).is_none() {
                    break;
                }
                current = target;
            }
        }
    }

    complete_additional_section(zone, response);
    response.header.is_authoritative = !outcome.referral;
    outcome
}

fn answer_step(
    zone: &Zone,
    name: &DomainName,
    qtype: QueryType,
    dnssec_ok: bool,
    response: &mut Message,
    outcome: &mut AnswerOutcome,
) -> Step {
    let Some(lookup) = zone.lookup(name) else {
        return Step::Done;
    };

    match lookup {
        Lookup::Match { node } => {
            if let Some(cut) = delegation_node(zone, node) {
                // the delegation's DS RRset is the one thing the
                // parent side still answers for authoritatively
                let ds_at_cut =
                    cut.name == *name && qtype == QueryType::Record(RecordType::DS);
                if !ds_at_cut {
                    referral(zone, cut, dnssec_ok, response);
                    outcome.referral = true;
                    return Step::Done;
                }
            }

            answer_from_node(zone, node, name, qtype, dnssec_ok, response)
        }
        Lookup::Miss {
            encloser,
            previous,
            wildcard,
        } => {
            if let Some(cut) = delegation_node(zone, encloser) {
                referral(zone, cut, dnssec_ok, response);
                outcome.referral = true;
                return Step::Done;
            }

            if let Some(wildcard_node) = wildcard {
                outcome.used_wildcard = true;
                if dnssec_ok {
                    // prove the concrete name does not exist, so the
                    // synthesis is verifiable
                    wildcard_existence_proof(zone, name, encloser, previous, response);
                }
                return answer_from_node(zone, wildcard_node, name, qtype, dnssec_ok, response);
            }

            response.header.rcode = Rcode::NameError;
            add_negative_soa(zone, response);
            if dnssec_ok {
                name_error_proof(zone, name, encloser, previous, response);
            }
            Step::Done
        }
    }
}

/// Answer from a node's own records, with `owner` as the owner name
/// written into the response - for a wildcard match that is the query
/// name, not the wildcard.
fn answer_from_node(
    zone: &Zone,
    node: &Node,
    owner: &DomainName,
    qtype: QueryType,
    dnssec_ok: bool,
    response: &mut Message,
) -> Step {
    if qtype != QueryType::Record(RecordType::CNAME) && qtype != QueryType::Any {
        if let Some(target) = node.cname() {
            if let Some(rrset) = node.get(RecordType::CNAME) {
                response.answers.extend(rrset.to_rrs(owner));
                if dnssec_ok {
                    add_rrsigs(node, RecordType::CNAME, owner, &mut response.answers);
                }
            }
            return Step::Follow(target.clone());
        }
    }

    match qtype {
        QueryType::Any => {
            let mut rtypes: Vec<RecordType> = node.rrsets().map(|rrset| rrset.rtype).collect();
            rtypes.sort_by_key(|rtype| u16::from(*rtype));

            if rtypes.is_empty() {
                no_data(zone, node, dnssec_ok, response);
            } else {
                for rtype in rtypes {
                    if let Some(rrset) = node.get(rtype) {
                        response.answers.extend(rrset.to_rrs(owner));
                    }
                }
            }
        }
        QueryType::Record(rtype) => {
            if let Some(rrset) = node.get(rtype) {
                response.answers.extend(rrset.to_rrs(owner));
                if dnssec_ok {
                    add_rrsigs(node, rtype, owner, &mut response.answers);
                }
            } else {
                no_data(zone, node, dnssec_ok, response);
            }
        }
        // transfers are dispatched before this algorithm runs
        QueryType::Axfr | QueryType::Ixfr => no_data(zone, node, dnssec_ok, response),
    }

    Step::Done
}

/// The zone cut governing a node, if any: the node itself when it is
/// a delegation, or the delegation above it when it is glue.
fn delegation_node<'a>(zone: &'a Zone, node: &'a Node) -> Option<&'a Node> {
    if node.is_delegation {
        return Some(node);
    }
    if !node.is_non_auth {
        return None;
    }

    let mut name = node.name.parent();
    while let Some(n) = name {
        if let Some(candidate) = zone.node(&n) {
            if candidate.is_delegation {
                return Some(candidate);
            }
            if !candidate.is_non_auth {
                break;
            }
        }
        name = n.parent();
    }

    None
}

/// Answer with a referral: the delegation's NS set in authority, and
/// for DNSSEC clients either the DS set or the proof there is none.
fn referral(zone: &Zone, cut: &Node, dnssec_ok: bool, response: &mut Message) {
    if let Some(ns) = cut.get(RecordType::NS) {
        response.authority.extend(ns.to_rrs(&cut.name));
    }

    if dnssec_ok {
        if let Some(ds) = cut.get(RecordType::DS) {
            response.authority.extend(ds.to_rrs(&cut.name));
            add_rrsigs(cut, RecordType::DS, &cut.name, &mut response.authority);
        } else if let Some(tree) = zone.nsec3() {
            push_nsec3(zone, tree.covering(&tree.hash(&cut.name)), response);
        } else {
            push_nsec(cut, response);
        }
    }
}

/// NODATA: the name exists but not with this type.  SOA in authority,
/// plus the NSEC/NSEC3 record for the name when proofs are wanted.
fn no_data(zone: &Zone, node: &Node, dnssec_ok: bool, response: &mut Message) {
    add_negative_soa(zone, response);

    if dnssec_ok {
        if let Some(tree) = zone.nsec3() {
            push_nsec3(zone, tree.find(&tree.hash(&node.name)), response);
        } else {
            push_nsec(node, response);
        }
    }
}

fn add_negative_soa(zone: &Zone, response: &mut Message) {
    let soa_rr = zone.soa_rr();
    if !response.authority.contains(&soa_rr) {
        if zone.is_signed() {
            add_rrsigs(
                zone.apex_node(),
                RecordType::SOA,
                zone.apex(),
                &mut response.authority,
            );
        }
        response.authority.push(soa_rr);
    }
}

/// The name-error proof: the record covering the query name, the
/// closest encloser (NSEC3 only - with NSEC the covering record shows
/// it), and the record covering the wildcard that could otherwise
/// have matched.
fn name_error_proof(
    zone: &Zone,
    qname: &DomainName,
    encloser: &Node,
    previous: &Node,
    response: &mut Message,
) {
    if let Some(tree) = zone.nsec3() {
        push_nsec3(zone, tree.find(&tree.hash(&encloser.name)), response);
        push_nsec3(
            zone,
            tree.covering(&tree.hash(&next_closer(qname, &encloser.name))),
            response,
        );
        if let Some(wildcard) = encloser.name.wildcard_child() {
            push_nsec3(zone, tree.covering(&tree.hash(&wildcard)), response);
        }
    } else {
        push_nsec(previous, response);
        if let Some(wildcard) = encloser.name.wildcard_child() {
            if let Some(wildcard_previous) = zone.predecessor(&wildcard) {
                push_nsec(wildcard_previous, response);
            }
        }
    }
}

/// For a wildcard-synthesised answer: prove the concrete name does
/// not exist, so a validator can tell synthesis from forgery.
fn wildcard_existence_proof(
    zone: &Zone,
    qname: &DomainName,
    encloser: &Node,
    previous: &Node,
    response: &mut Message,
) {
    if let Some(tree) = zone.nsec3() {
        push_nsec3(
            zone,
            tree.covering(&tree.hash(&next_closer(qname, &encloser.name))),
            response,
        );
    } else {
        push_nsec(previous, response);
    }
}

/// The direct child of `ancestor` on the path down to `name`.
fn next_closer(name: &DomainName, ancestor: &DomainName) -> DomainName {
    let mut n = name.clone();
    while n.label_count() > ancestor.label_count() + 1 {
        match n.parent() {
            Some(parent) => n = parent,
            None => break,
        }
    }
    n
}

fn push_nsec(node: &Node, response: &mut Message) {
    if let Some(nsec) = node.get(RecordType::NSEC) {
        for rr in nsec.to_rrs(&node.name) {
            if !response.authority.contains(&rr) {
                response.authority.push(rr);
            }
        }
        add_rrsigs(node, RecordType::NSEC, &node.name, &mut response.authority);
    }
}

fn push_nsec3(zone: &Zone, owner: Option<&DomainName>, response: &mut Message) {
    let Some(owner) = owner else { return };
    let Some(node) = zone.node(owner) else { return };

    if let Some(nsec3) = node.get(RecordType::NSEC3) {
        for rr in nsec3.to_rrs(owner) {
            if !response.authority.contains(&rr) {
                response.authority.push(rr);
            }
        }
        add_rrsigs(node, RecordType::NSEC3, owner, &mut response.authority);
    }
}

/// Copy the signatures covering one type at a node into a section.
fn add_rrsigs(
    node: &Node,
    covered: RecordType,
    owner: &DomainName,
    section: &mut Vec<ResourceRecord>,
) {
    if let Some(rrsigs) = node.get(RecordType::RRSIG) {
        for rr in rrsigs.to_rrs(owner) {
            if let RecordTypeWithData::RRSIG { type_covered, .. } = &rr.rtype_with_data {
                if *type_covered == covered && !section.contains(&rr) {
                    section.push(rr);
                }
            }
        }
    }
}

/// Pull in-zone addresses for names the answer mentions: NS, MX, SRV,
/// and PTR targets.
fn complete_additional_section(zone: &Zone, response: &mut Message) {
    let mut targets = Vec::new();
    for rr in response.answers.iter().chain(response.authority.iter()) {
        if let Some(name) = rr.rtype_with_data.additional_section_name() {
            if !targets.contains(name) {
                targets.push(name.clone());
            }
        }
    }

    for target in targets {
        if let Some(Lookup::Match { node }) = zone.lookup(&target) {
            for rtype in [RecordType::A, RecordType::AAAA] {
                if let Some(rrset) = node.get(rtype) {
                    for rr in rrset.to_rrs(&target) {
                        if !response.answers.contains(&rr) && !response.additional.contains(&rr) {
                            response.additional.push(rr);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use dns_types::protocol::types::test_util::*;

    fn zone() -> Zone {
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
            .insert_rr(&cname_record("alias.example.com.", "target.example.com."))
            .unwrap();
        builder
            .insert_rr(&a_record("target.example.com.", Ipv4Addr::new(192, 0, 2, 7)))
            .unwrap();
        builder
            .insert_rr(&cname_record("external.example.com.", "www.example.net."))
            .unwrap();
        builder
            .insert_rr(&a_record(
                "*.wild.example.com.",
                Ipv4Addr::new(192, 0, 2, 99),
            ))
            .unwrap();
        builder
            .insert_rr(&mx_record("example.com.", 10, "mail.example.com."))
            .unwrap();
        builder
            .insert_rr(&a_record("mail.example.com.", Ipv4Addr::new(192, 0, 2, 25)))
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

    fn ask(zone: &Zone, name: &str, qtype: QueryType) -> (Message, AnswerOutcome) {
        let mut response = Message::from_question(
            1,
            Question {
                name: domain(name),
                qtype,
                qclass: RecordClass::IN,
            },
        )
        .make_response();

        let outcome = answer(zone, &domain(name), qtype, false, &mut response);
        (response, outcome)
    }

    #[test]
    fn positive_answer() {
        let zone = zone();
        let (response, outcome) = ask(&zone, "www.example.com.", QueryType::Record(RecordType::A));

        assert_eq!(Rcode::NoError, response.header.rcode);
        assert!(response.header.is_authoritative);
        assert_eq!(
            vec![a_record("www.example.com.", Ipv4Addr::new(192, 0, 2, 1))],
            response.answers
        );
        assert!(response.authority.is_empty());
        assert!(response.additional.is_empty());
        assert!(!outcome.used_wildcard);
        assert!(!outcome.referral);
    }

    #[test]
    fn nxdomain_has_soa_in_authority() {
        let zone = zone();
        let (response, _) = ask(&zone, "absent.example.com.", QueryType::Record(RecordType::A));

        assert_eq!(Rcode::NameError, response.header.rcode);
        assert!(response.header.is_authoritative);
        assert!(response.answers.is_empty());
        assert_eq!(vec![zone.soa_rr()], response.authority);
        assert!(response.additional.is_empty());
    }

    #[test]
    fn nodata_has_soa_in_authority() {
        let zone = zone();
        let (response, _) = ask(&zone, "www.example.com.", QueryType::Record(RecordType::TXT));

        assert_eq!(Rcode::NoError, response.header.rcode);
        assert!(response.answers.is_empty());
        assert_eq!(vec![zone.soa_rr()], response.authority);
    }

    #[test]
    fn wildcard_synthesis_rewrites_owner() {
        let zone = zone();
        let (response, outcome) = ask(
            &zone,
            "foo.wild.example.com.",
            QueryType::Record(RecordType::A),
        );

        assert_eq!(Rcode::NoError, response.header.rcode);
        assert!(response.header.is_authoritative);
        assert_eq!(
            vec![a_record("foo.wild.example.com.", Ipv4Addr::new(192, 0, 2, 99))],
            response.answers
        );
        assert!(outcome.used_wildcard);
    }

    #[test]
    fn wildcard_does_not_match_empty_nonterminal() {
        let zone = zone();
        // "wild.example.com." itself exists (as an empty
        // non-terminal), so it is not synthesised
        let (response, outcome) =
            ask(&zone, "wild.example.com.", QueryType::Record(RecordType::A));

        assert_eq!(Rcode::NoError, response.header.rcode);
        assert!(response.answers.is_empty());
        assert!(!outcome.used_wildcard);
    }

    #[test]
    fn referral_below_delegation() {
        let zone = zone();
        let (response, outcome) = ask(
            &zone,
            "host.sub.example.com.",
            QueryType::Record(RecordType::A),
        );

        assert_eq!(Rcode::NoError, response.header.rcode);
        assert!(!response.header.is_authoritative);
        assert!(response.answers.is_empty());
        assert_eq!(
            vec![ns_record("sub.example.com.", "ns1.sub.example.com.")],
            response.authority
        );
        assert_eq!(
            vec![a_record("ns1.sub.example.com.", Ipv4Addr::new(192, 0, 2, 54))],
            response.additional
        );
        assert!(outcome.referral);
    }

    #[test]
    fn referral_at_delegation_itself() {
        let zone = zone();
        let (response, outcome) =
            ask(&zone, "sub.example.com.", QueryType::Record(RecordType::A));

        assert!(!response.header.is_authoritative);
        assert!(response.answers.is_empty());
        assert!(!response.authority.is_empty());
        assert!(outcome.referral);
    }

    #[test]
    fn glue_query_gets_referral_not_answer() {
        let zone = zone();
        let (response, outcome) = ask(
            &zone,
            "ns1.sub.example.com.",
            QueryType::Record(RecordType::A),
        );

        assert!(outcome.referral);
        assert!(response.answers.is_empty());
    }

    #[test]
    fn cname_chain_is_followed() {
        let zone = zone();
        let (response, _) = ask(&zone, "alias.example.com.", QueryType::Record(RecordType::A));

        assert_eq!(Rcode::NoError, response.header.rcode);
        assert!(response.header.is_authoritative);
        assert_eq!(
            vec![
                cname_record("alias.example.com.", "target.example.com."),
                a_record("target.example.com.", Ipv4Addr::new(192, 0, 2, 7)),
            ],
            response.answers
        );
    }

    #[test]
    fn cname_to_external_target_stops_cleanly() {
        let zone = zone();
        let (response, _) = ask(
            &zone,
            "external.example.com.",
            QueryType::Record(RecordType::A),
        );

        assert_eq!(Rcode::NoError, response.header.rcode);
        assert_eq!(
            vec![cname_record("external.example.com.", "www.example.net.")],
            response.answers
        );
    }

    #[test]
    fn cname_qtype_answers_the_cname_itself() {
        let zone = zone();
        let (response, _) = ask(
            &zone,
            "alias.example.com.",
            QueryType::Record(RecordType::CNAME),
        );

        assert_eq!(
            vec![cname_record("alias.example.com.", "target.example.com.")],
            response.answers
        );
    }

    #[test]
    fn mx_answer_pulls_exchange_address() {
        let zone = zone();
        let (response, _) = ask(&zone, "example.com.", QueryType::Record(RecordType::MX));

        assert_eq!(
            vec![mx_record("example.com.", 10, "mail.example.com.")],
            response.answers
        );
        assert_eq!(
            vec![a_record("mail.example.com.", Ipv4Addr::new(192, 0, 2, 25))],
            response.additional
        );
    }

    #[test]
    fn any_query_returns_all_rrsets() {
        let zone = zone();
        let (response, _) = ask(&zone, "example.com.", QueryType::Any);

        let rtypes: Vec<RecordType> = response
            .answers
            .iter()
            .map(|rr| rr.rtype_with_data.rtype())
            .collect();
        assert!(rtypes.contains(&RecordType::SOA));
        assert!(rtypes.contains(&RecordType::NS));
        assert!(rtypes.contains(&RecordType::MX));
    }

    #[test]
    fn nxdomain_with_do_carries_nsec_proof() {
        let mut builder = Zone::builder(domain("example.com."), TtlPolicy::Primary);
        builder.insert_rr(&soa_record("example.com.", 1)).unwrap();
        builder
            .insert_rr(&ns_record("example.com.", "ns1.example.com."))
            .unwrap();
        builder
            .insert_rr(&a_record("alpha.example.com.", Ipv4Addr::new(192, 0, 2, 1)))
            .unwrap();
        builder
            .insert_rr(&ResourceRecord {
                name: domain("alpha.example.com."),
                rtype_with_data: RecordTypeWithData::NSEC {
                    next: domain("example.com."),
                    type_bitmap: vec![0, 1, 0x40],
                },
                rclass: RecordClass::IN,
                ttl: 300,
            })
            .unwrap();
        let zone = builder.build().unwrap();

        let qname = domain("beta.example.com.");
        let mut response = Message::from_question(
            1,
            Question {
                name: qname.clone(),
                qtype: QueryType::Record(RecordType::A),
                qclass: RecordClass::IN,
            },
        )
        .make_response();
        answer(&zone, &qname, QueryType::Record(RecordType::A), true, &mut response);

        assert_eq!(Rcode::NameError, response.header.rcode);
        // SOA plus the covering NSEC (alpha covers beta)
        assert!(response
            .authority
            .iter()
            .any(|rr| rr.rtype_with_data.rtype() == RecordType::NSEC
                && rr.name == domain("alpha.example.com.")));
    }
}
