//! Zone transfer streams.  AXFR walks the zone in canonical order
//! between two copies of the SOA; IXFR replays journal changesets,
//! each bracketed by the serials it connects.  Either way the stream
//! hands out one message at a time, packing as many records as fit
//! under the size cap, and remembers its place so the transport can
//! send each chunk before asking for the next.

use std::collections::VecDeque;
use std::sync::Arc;

use dns_types::protocol::types::*;
use dns_types::zones::types::{Changeset, Zone};

/// A transfer in progress.  Created by the query processor, driven by
/// repeated `next_message` calls until `is_finished`.
pub struct TransferStream {
    base: Message,
    zone: Arc<Zone>,
    kind: StreamKind,
    stashed: Option<ResourceRecord>,
    finished: bool,
}

enum StreamKind {
    Axfr {
        phase: AxfrPhase,
        cursor: Option<DomainName>,
        pending: VecDeque<ResourceRecord>,
    },
    Ixfr {
        rrs: VecDeque<ResourceRecord>,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum AxfrPhase {
    LeadingSoa,
    Body,
    TrailingSoa,
    Done,
}

impl TransferStream {
    /// A full zone transfer: SOA, every record in canonical order,
    /// SOA again.
    pub fn axfr(zone: Arc<Zone>, base: Message) -> Self {
        Self {
            base,
            zone,
            kind: StreamKind::Axfr {
                phase: AxfrPhase::LeadingSoa,
                cursor: None,
                pending: VecDeque::new(),
            },
            stashed: None,
            finished: false,
        }
    }

    /// An incremental transfer from a journal chain.
    pub fn ixfr(zone: Arc<Zone>, chain: &[Changeset], base: Message) -> Self {
        let rrs = ixfr_sequence(&zone, chain);
        Self {
            base,
            zone,
            kind: StreamKind::Ixfr { rrs: rrs.into() },
            stashed: None,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The next chunk of the stream, or `None` once everything has
    /// been handed out.  Each chunk holds at least one record, so a
    /// record bigger than the cap still makes progress (and is the
    /// serialiser's truncation problem).
    pub fn next_message(&mut self, max_size: usize) -> Option<Message> {
        if self.finished {
            return None;
        }

        let mut message = self.base.clone();
        let mut size = base_cost(&message);

        loop {
            let Some(rr) = self.pull() else {
                self.finished = true;
                break;
            };

            let len = rr.wire_len_uncompressed();
            if !message.answers.is_empty() && size + len > max_size {
                self.stashed = Some(rr);
                break;
            }

            size += len;
            message.answers.push(rr);
        }

        Some(message)
    }

    fn pull(&mut self) -> Option<ResourceRecord> {
        if let Some(rr) = self.stashed.take() {
            return Some(rr);
        }

        match &mut self.kind {
            StreamKind::Axfr {
                phase,
                cursor,
                pending,
            } => loop {
                match phase {
                    AxfrPhase::LeadingSoa => {
                        *phase = AxfrPhase::Body;
                        return Some(self.zone.soa_rr());
                    }
                    AxfrPhase::Body => {
                        if let Some(rr) = pending.pop_front() {
                            return Some(rr);
                        }

                        let next = match cursor {
                            None => self.zone.entries().next(),
                            Some(c) => self.zone.entries_after(c).next(),
                        };
                        match next {
                            Some(node) => {
                                *cursor = Some(node.name.clone());
                                // the apex SOA frames the stream; it
                                // is not part of the body
                                pending.extend(
                                    node.to_rrs()
                                        .into_iter()
                                        .filter(|rr| {
                                            rr.rtype_with_data.rtype() != RecordType::SOA
                                        }),
                                );
                            }
                            None => *phase = AxfrPhase::TrailingSoa,
                        }
                    }
                    AxfrPhase::TrailingSoa => {
                        *phase = AxfrPhase::Done;
                        return Some(self.zone.soa_rr());
                    }
                    AxfrPhase::Done => return None,
                }
            },
            StreamKind::Ixfr { rrs } => rrs.pop_front(),
        }
    }
}

/// The record sequence of an incremental transfer: the new SOA, then
/// per step the old SOA, the removed records, the stepped-to SOA, the
/// added records, and the new SOA once more to close (RFC 1995).
pub fn ixfr_sequence(zone: &Zone, chain: &[Changeset]) -> Vec<ResourceRecord> {
    let apex = zone.apex();
    let mut rrs = vec![zone.soa_rr()];

    for changeset in chain {
        rrs.push(changeset.soa_from.to_rr(apex));
        rrs.extend(changeset.removes.iter().cloned());
        rrs.push(changeset.soa_to.to_rr(apex));
        rrs.extend(changeset.adds.iter().cloned());
    }

    rrs.push(zone.soa_rr());
    rrs
}

/// Header plus question plus OPT: what every chunk pays before any
/// answer fits.
fn base_cost(message: &Message) -> usize {
    12 + message
        .questions
        .iter()
        .map(|q| q.name.octets.len() + 4)
        .sum::<usize>()
        + message.edns.as_ref().map_or(0, Edns::wire_len)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use dns_types::protocol::types::test_util::*;
    use dns_types::zones::types::{TtlPolicy, SOA};

    fn zone() -> Arc<Zone> {
        let mut builder = Zone::builder(domain("example.com."), TtlPolicy::Primary);
        builder.insert_rr(&soa_record("example.com.", 5)).unwrap();
        builder
            .insert_rr(&ns_record("example.com.", "ns1.example.com."))
            .unwrap();
        builder
            .insert_rr(&a_record("ns1.example.com.", Ipv4Addr::new(192, 0, 2, 53)))
            .unwrap();
        for i in 1..=20 {
            builder
                .insert_rr(&a_record(
                    &format!("host{i}.example.com."),
                    Ipv4Addr::new(192, 0, 2, i),
                ))
                .unwrap();
        }
        Arc::new(builder.build().unwrap())
    }

    fn base(qtype: QueryType) -> Message {
        let mut message = Message::from_question(
            7,
            Question {
                name: domain("example.com."),
                qtype,
                qclass: RecordClass::IN,
            },
        )
        .make_response();
        message.header.is_authoritative = true;
        message
    }

    fn collect(mut stream: TransferStream, max_size: usize) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(message) = stream.next_message(max_size) {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn axfr_starts_and_ends_with_soa() {
        let zone = zone();
        let messages = collect(
            TransferStream::axfr(zone.clone(), base(QueryType::Axfr)),
            MESSAGE_MAX_LEN,
        );

        assert_eq!(1, messages.len());
        let answers = &messages[0].answers;

        assert_eq!(zone.soa_rr(), answers[0]);
        assert_eq!(zone.soa_rr(), *answers.last().unwrap());

        // every zone record appears exactly once between the SOAs:
        // apex NS, the ns1 address, and the 20 hosts
        assert_eq!(2 + 22, answers.len());
    }

    #[test]
    fn axfr_body_is_in_canonical_order() {
        let zone = zone();
        let messages = collect(
            TransferStream::axfr(zone, base(QueryType::Axfr)),
            MESSAGE_MAX_LEN,
        );

        let owners: Vec<DomainName> = messages[0].answers[1..messages[0].answers.len() - 1]
            .iter()
            .map(|rr| rr.name.clone())
            .collect();
        let mut sorted = owners.clone();
        sorted.sort();

        assert_eq!(sorted, owners);
    }

    #[test]
    fn axfr_chunks_under_size_cap() {
        let zone = zone();
        let chunks = collect(TransferStream::axfr(zone.clone(), base(QueryType::Axfr)), 200);

        assert!(chunks.len() > 1);

        // concatenating the chunks gives the same stream as one big
        // message
        let single = collect(
            TransferStream::axfr(zone, base(QueryType::Axfr)),
            MESSAGE_MAX_LEN,
        );
        let rejoined: Vec<ResourceRecord> = chunks
            .iter()
            .flat_map(|message| message.answers.iter().cloned())
            .collect();
        assert_eq!(single[0].answers, rejoined);

        // and each chunk really serialises under the cap
        for chunk in &chunks {
            assert!(chunk.serialise(200, 0).unwrap().octets.len() <= 200);
            assert!(!chunk.answers.is_empty());
        }
    }

    #[test]
    fn ixfr_sequence_brackets_each_step() {
        let zone = zone();
        let old_soa = SOA {
            serial: 4,
            ..zone.soa().clone()
        };

        let chain = vec![Changeset {
            soa_from: old_soa.clone(),
            soa_to: zone.soa().clone(),
            removes: vec![a_record("gone.example.com.", Ipv4Addr::new(192, 0, 2, 200))],
            adds: vec![a_record("host1.example.com.", Ipv4Addr::new(192, 0, 2, 1))],
        }];

        let rrs = ixfr_sequence(&zone, &chain);

        assert_eq!(zone.soa_rr(), rrs[0]);
        assert_eq!(old_soa.to_rr(zone.apex()), rrs[1]);
        assert_eq!(domain("gone.example.com."), rrs[2].name);
        assert_eq!(zone.soa_rr(), rrs[3]);
        assert_eq!(domain("host1.example.com."), rrs[4].name);
        assert_eq!(zone.soa_rr(), *rrs.last().unwrap());
    }

    #[test]
    fn ixfr_stream_yields_all_records() {
        let zone = zone();
        let old_soa = SOA {
            serial: 4,
            ..zone.soa().clone()
        };
        let chain = vec![Changeset {
            soa_from: old_soa,
            soa_to: zone.soa().clone(),
            removes: Vec::new(),
            adds: vec![a_record("host1.example.com.", Ipv4Addr::new(192, 0, 2, 1))],
        }];

        let expected = ixfr_sequence(&zone, &chain);
        let messages = collect(
            TransferStream::ixfr(zone, &chain, base(QueryType::Ixfr)),
            MESSAGE_MAX_LEN,
        );

        let rejoined: Vec<ResourceRecord> = messages
            .iter()
            .flat_map(|message| message.answers.iter().cloned())
            .collect();
        assert_eq!(expected, rejoined);
    }
}
