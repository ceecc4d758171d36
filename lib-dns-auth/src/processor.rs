//! The query processor: one `Transaction` drives one client exchange
//! from received octets to emitted octets.  The transport calls
//! `consume` with a complete message, then `produce` until it stops
//! returning `Full` - most responses take one `produce`, zone
//! transfers take many.  The transaction pins the zone database it
//! started with, so concurrent updates never change an answer
//! mid-flight.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing;

use dns_types::protocol::deserialise::Error as WireError;
use dns_types::protocol::serialise::append_tsig;
use dns_types::protocol::types::*;
use dns_types::zones::types::*;

use crate::acl::AclVerdict;
use crate::answer::{answer, AnswerOutcome};
use crate::context::ServerContext;
use crate::rrl::{ResponseClass, RrlVerdict};
use crate::tsig::{self, TsigError, TsigKey};
use crate::update;
use crate::xfr::TransferStream;

/// Fudge window on signatures this server generates.
const SIGNING_FUDGE: u16 = 300;

/// What `consume` tells the transport.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConsumeOutcome {
    /// Not a whole query yet; feed more octets.
    More,
    /// Query accepted; call `produce`.
    Full,
    /// Drop silently and do not respond.
    NoOp,
}

/// What `produce` tells the transport.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProduceOutcome {
    /// A chunk is ready and more will follow; send it and call
    /// again.
    Full,
    /// The response (possibly empty, for a dropped reply) is
    /// complete.
    Done,
    /// Something went wrong beyond what an error response can say;
    /// close the transport.
    Fail,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Protocol {
    Udp,
    Tcp,
}

#[derive(Debug, Copy, Clone)]
pub struct TransactionParams {
    pub protocol: Protocol,
    pub source: SocketAddr,
}

/// Things the host should act on after a transaction: NOTIFY fan-out
/// after an accepted update, refresh scheduling after an accepted
/// NOTIFY.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ServerEvent {
    ZoneUpdated { apex: DomainName },
    RefreshRequested { apex: DomainName },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum State {
    AwaitQuery,
    Producing,
    Done,
    Failed,
}

/// Where a classified query is routed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum QueryKind {
    Normal,
    Chaos,
    AxfrOut,
    IxfrOut,
    Notify,
    Update,
}

/// How the outgoing message gets its TSIG, if any.
#[derive(Debug, Clone)]
enum TsigAction {
    None,
    Sign,
    UnsignedError(TsigRcode),
    SignedBadTime,
}

/// A failure that still produces a response.
enum Failure {
    Rcode(Rcode),
    Tsig(Rcode, TsigRcode),
    /// Rate limited: say nothing at all.
    Drop,
}

pub struct Transaction {
    ctx: Arc<ServerContext>,
    params: TransactionParams,
    state: State,
    snapshot: Option<Arc<ZoneSet>>,
    query: Option<Message>,
    kind: Option<QueryKind>,
    verified_key: Option<Arc<TsigKey>>,
    request_mac: Option<Vec<u8>>,
    request_tsig: Option<Tsig>,
    pending: Option<(Message, TsigAction)>,
    stream: Option<TransferStream>,
    stream_mac: Option<Vec<u8>>,
    stream_packets: usize,
    events: Vec<ServerEvent>,
}

impl Transaction {
    /// Set up for one transaction.  Cheap: everything heavy is shared
    /// through the context.
    pub fn begin(ctx: Arc<ServerContext>, params: TransactionParams) -> Self {
        Self {
            ctx,
            params,
            state: State::AwaitQuery,
            snapshot: None,
            query: None,
            kind: None,
            verified_key: None,
            request_mac: None,
            request_tsig: None,
            pending: None,
            stream: None,
            stream_mac: None,
            stream_packets: 0,
            events: Vec::new(),
        }
    }

    /// Accept a complete query message.
    pub fn consume(&mut self, wire: &[u8]) -> ConsumeOutcome {
        if self.state != State::AwaitQuery {
            return ConsumeOutcome::NoOp;
        }
        if wire.is_empty() {
            return ConsumeOutcome::More;
        }

        self.snapshot = Some(self.ctx.snapshot());

        let parsed = match Message::parse(wire) {
            Ok(parsed) => parsed,
            Err(WireError::CompletelyBusted) => return ConsumeOutcome::NoOp,
            Err(error) => {
                tracing::debug!(?error, "malformed query");
                return match error.id() {
                    Some(id) => self.queue(
                        Message::make_format_error_response(id),
                        TsigAction::None,
                    ),
                    None => ConsumeOutcome::NoOp,
                };
            }
        };

        let message = parsed.message;

        // responses are never answered, to break reflection loops
        if message.header.is_response {
            return ConsumeOutcome::NoOp;
        }

        // transaction security comes before everything else: nothing
        // downstream may trust an unverified signer
        if let Some(tsig) = message.tsig.clone() {
            self.request_tsig = Some(tsig.clone());
            let offset = parsed.tsig_offset.unwrap_or(wire.len());
            match tsig::verify_request(&self.ctx.keyring, wire, offset, &tsig, unix_now()) {
                Ok(key) => {
                    self.request_mac = Some(tsig.mac.clone());
                    self.verified_key = Some(key);
                }
                Err(error) => {
                    tracing::debug!(key = %tsig.key_name.to_dotted_string(), ?error, "TSIG verification failed");
                    let mut response = message.make_response();
                    response.header.rcode = Rcode::NotAuth;
                    let action = match &error {
                        TsigError::BadKey => TsigAction::UnsignedError(TsigRcode::BadKey),
                        TsigError::BadSig => TsigAction::UnsignedError(TsigRcode::BadSig),
                        TsigError::BadTime { .. } => {
                            // the MAC itself checked out, so the
                            // BADTIME answer is signed and chains it
                            self.request_mac = Some(tsig.mac.clone());
                            TsigAction::SignedBadTime
                        }
                    };
                    return self.queue(response, action);
                }
            }
        }

        if let Some(edns) = &message.edns {
            if edns.version > 0 {
                let mut response = message.make_response();
                response.header.rcode = Rcode::BadVers;
                return self.queue(response, self.default_tsig_action());
            }
        }

        // one question, no more: zero only ever appears in error
        // responses, several is always a mistake
        if message.questions.len() != 1 {
            let mut response = message.make_response();
            response.header.rcode = Rcode::FormatError;
            return self.queue(response, self.default_tsig_action());
        }

        let kind = match message.header.opcode {
            Opcode::Query => {
                let question = &message.questions[0];
                match question.qclass {
                    RecordClass::CH => QueryKind::Chaos,
                    RecordClass::IN | RecordClass::Any => match question.qtype {
                        QueryType::Axfr => QueryKind::AxfrOut,
                        QueryType::Ixfr => QueryKind::IxfrOut,
                        _ => QueryKind::Normal,
                    },
                    _ => {
                        let mut response = message.make_response();
                        response.header.rcode = Rcode::Refused;
                        return self.queue(response, self.default_tsig_action());
                    }
                }
            }
            Opcode::Notify => QueryKind::Notify,
            Opcode::Update => QueryKind::Update,
            Opcode::Reserved(_) => {
                let mut response = message.make_response();
                response.header.rcode = Rcode::NotImplemented;
                return self.queue(response, self.default_tsig_action());
            }
        };

        self.query = Some(message);
        self.kind = Some(kind);
        self.state = State::Producing;
        ConsumeOutcome::Full
    }

    /// Write the next response chunk into `out`.
    pub fn produce(&mut self, out: &mut Vec<u8>, max_size: usize) -> ProduceOutcome {
        out.clear();

        match self.state {
            State::Producing => (),
            State::Done => return ProduceOutcome::Done,
            State::AwaitQuery | State::Failed => return ProduceOutcome::Fail,
        }

        if let Some((message, action)) = self.pending.take() {
            return self.emit(out, message, &action, max_size);
        }

        if self.stream.is_some() {
            return self.emit_stream_chunk(out, max_size);
        }

        let result = match self.kind {
            Some(QueryKind::Normal) => self.handle_normal(),
            Some(QueryKind::Chaos) => self.handle_chaos(),
            Some(QueryKind::Notify) => self.handle_notify(),
            Some(QueryKind::Update) => self.handle_update(),
            Some(QueryKind::AxfrOut) => match self.start_axfr() {
                Ok(()) => return self.emit_stream_chunk(out, max_size),
                Err(failure) => Err(failure),
            },
            Some(QueryKind::IxfrOut) => match self.start_ixfr(max_size) {
                Ok(None) => return self.emit_stream_chunk(out, max_size),
                Ok(Some(response)) => Ok(response),
                Err(failure) => Err(failure),
            },
            None => {
                self.state = State::Failed;
                return ProduceOutcome::Fail;
            }
        };

        match result {
            Ok(response) => {
                let action = self.default_tsig_action();
                self.emit(out, response, &action, max_size)
            }
            Err(Failure::Drop) => {
                self.state = State::Done;
                ProduceOutcome::Done
            }
            Err(failure) => {
                let (rcode, tsig_rcode) = match failure {
                    Failure::Rcode(rcode) => (rcode, None),
                    Failure::Tsig(rcode, tsig_rcode) => (rcode, Some(tsig_rcode)),
                    Failure::Drop => unreachable!(),
                };

                let mut response = self
                    .query
                    .as_ref()
                    .map_or_else(|| Message::make_format_error_response(0), Message::make_response);
                response.header.rcode = rcode;

                let action = match tsig_rcode {
                    Some(code) if self.request_tsig.is_some() => TsigAction::UnsignedError(code),
                    _ => self.default_tsig_action(),
                };
                self.emit(out, response, &action, max_size)
            }
        }
    }

    /// Return to `AwaitQuery` for the next query on the same
    /// transport, keeping the context and accumulated events.
    pub fn reset(&mut self) {
        self.state = State::AwaitQuery;
        self.snapshot = None;
        self.query = None;
        self.kind = None;
        self.verified_key = None;
        self.request_mac = None;
        self.request_tsig = None;
        self.pending = None;
        self.stream = None;
        self.stream_mac = None;
        self.stream_packets = 0;
    }

    /// Tear down; safe in any state.  Returns the events the host
    /// should act on.
    pub fn finish(self) -> Vec<ServerEvent> {
        self.events
    }

    pub fn take_events(&mut self) -> Vec<ServerEvent> {
        std::mem::take(&mut self.events)
    }

    fn queue(&mut self, message: Message, action: TsigAction) -> ConsumeOutcome {
        self.pending = Some((message, action));
        self.state = State::Producing;
        ConsumeOutcome::Full
    }

    fn default_tsig_action(&self) -> TsigAction {
        if self.verified_key.is_some() {
            TsigAction::Sign
        } else {
            TsigAction::None
        }
    }

    fn key_name(&self) -> Option<&DomainName> {
        self.verified_key.as_ref().map(|key| &key.name)
    }

    fn handle_normal(&mut self) -> Result<Message, Failure> {
        let query = self.query.as_ref().expect("producing without a query");
        let question = &query.questions[0];
        let snapshot = self.snapshot.as_ref().expect("producing without a snapshot");

        let Some(zone) = snapshot.find(&question.name) else {
            return Err(Failure::Rcode(Rcode::Refused));
        };

        if let Some(policy) = self.ctx.policy(zone.apex()) {
            if let Some(acl) = &policy.query_acl {
                if acl.evaluate(self.params.source.ip(), self.key_name()) != AclVerdict::Allow {
                    return Err(Failure::Rcode(Rcode::Refused));
                }
            }
        }

        if zone.node_count() == 0 {
            return Err(Failure::Rcode(Rcode::ServerFailure));
        }

        let mut response = query.make_response();
        response.header.is_authoritative = true;

        let dnssec_ok =
            query.edns.as_ref().is_some_and(|edns| edns.dnssec_ok) && zone.is_signed();
        let outcome = answer(
            zone,
            &question.name,
            question.qtype,
            dnssec_ok,
            &mut response,
        );

        if self.params.protocol == Protocol::Udp {
            if let Some(rrl) = &self.ctx.rrl {
                let class = rrl_class(&response, outcome);
                match rrl.check(self.params.source.ip(), class, unix_now()) {
                    RrlVerdict::Pass => (),
                    RrlVerdict::Slip => {
                        // a bare truncated header: enough for a real
                        // client to retry over TCP, useless as an
                        // amplification payload
                        response.answers.clear();
                        response.authority.clear();
                        response.additional.clear();
                        response.header.is_truncated = true;
                    }
                    RrlVerdict::Drop => return Err(Failure::Drop),
                }
            }
        }

        Ok(response)
    }

    fn handle_chaos(&mut self) -> Result<Message, Failure> {
        let query = self.query.as_ref().expect("producing without a query");
        let question = &query.questions[0];

        let value = match question.name.to_dotted_string().as_str() {
            "version.server." | "version.bind." => self.ctx.chaos.version.clone(),
            "id.server." | "hostname.bind." => self.ctx.chaos.server_id.clone(),
            _ => None,
        };

        let Some(value) = value else {
            return Err(Failure::Rcode(Rcode::Refused));
        };

        // TXT RDATA is a length-prefixed character string
        let mut octets = Vec::with_capacity(value.len() + 1);
        #[allow(clippy::cast_possible_truncation)]
        octets.push(value.len().min(255) as u8);
        octets.extend_from_slice(&value.as_bytes()[..value.len().min(255)]);

        let mut response = query.make_response();
        response.header.is_authoritative = true;
        response.answers.push(ResourceRecord {
            name: question.name.clone(),
            rtype_with_data: RecordTypeWithData::TXT { octets },
            rclass: RecordClass::CH,
            ttl: 0,
        });
        Ok(response)
    }

    fn handle_notify(&mut self) -> Result<Message, Failure> {
        let query = self.query.clone().expect("producing without a query");
        let question = &query.questions[0];
        let snapshot = self.snapshot.as_ref().expect("producing without a snapshot");

        let Some(zone) = snapshot.get(&question.name) else {
            return Err(Failure::Rcode(Rcode::NotAuth));
        };
        let Some(policy) = self.ctx.policy(zone.apex()) else {
            return Err(Failure::Rcode(Rcode::NotAuth));
        };

        match policy
            .notify_acl
            .evaluate(self.params.source.ip(), self.key_name())
        {
            AclVerdict::Allow => (),
            AclVerdict::NeedsKey | AclVerdict::Deny => {
                return Err(Failure::Rcode(Rcode::NotAuth))
            }
        }

        tracing::info!(zone = %question.name.to_dotted_string(), source = %self.params.source, "notify accepted");
        self.events.push(ServerEvent::RefreshRequested {
            apex: question.name.clone(),
        });

        let mut response = query.make_response();
        response.header.is_authoritative = true;
        Ok(response)
    }

    fn handle_update(&mut self) -> Result<Message, Failure> {
        let query = self.query.clone().expect("producing without a query");
        let question = &query.questions[0];

        if question.qtype != QueryType::Record(RecordType::SOA) {
            return Err(Failure::Rcode(Rcode::FormatError));
        }

        let apex = question.name.clone();
        let Some(policy) = self.ctx.policy(&apex) else {
            return Err(Failure::Rcode(Rcode::NotAuth));
        };

        match policy
            .update_acl
            .evaluate(self.params.source.ip(), self.key_name())
        {
            AclVerdict::Allow => (),
            AclVerdict::NeedsKey => {
                return Err(Failure::Tsig(Rcode::NotAuth, TsigRcode::BadKey))
            }
            AclVerdict::Deny => return Err(Failure::Rcode(Rcode::NotAuth)),
        }

        // one writer per zone; the fresh snapshot under the lock sees
        // every previously-accepted update
        let writer = self.ctx.zone_writer(&apex);
        let _guard = writer.lock().map_err(|_| Failure::Rcode(Rcode::ServerFailure))?;

        let Some(zone) = self.ctx.snapshot().get(&apex).cloned() else {
            return Err(Failure::Rcode(Rcode::NotAuth));
        };

        let changeset = match update::process(&zone, &query) {
            Ok(Some(changeset)) => changeset,
            Ok(None) => {
                tracing::info!(zone = %apex.to_dotted_string(), "update with no effect");
                return Ok(query.make_response());
            }
            Err(rcode) => return Err(Failure::Rcode(rcode)),
        };

        match zone.apply(&changeset) {
            Ok(updated) => {
                let serial = updated.serial();
                self.ctx.publish_zone(Arc::new(updated));
                self.ctx.journal.push(&apex, changeset);
                self.events.push(ServerEvent::ZoneUpdated { apex: apex.clone() });
                tracing::info!(zone = %apex.to_dotted_string(), %serial, "update applied");
                Ok(query.make_response())
            }
            Err(error) => {
                // the changeset is discarded whole; the old zone
                // stays published
                tracing::error!(zone = %apex.to_dotted_string(), %error, "update could not be applied");
                Err(Failure::Rcode(Rcode::ServerFailure))
            }
        }
    }

    fn transfer_zone(&self) -> Result<Arc<Zone>, Failure> {
        let query = self.query.as_ref().expect("producing without a query");
        let question = &query.questions[0];
        let snapshot = self.snapshot.as_ref().expect("producing without a snapshot");

        let Some(zone) = snapshot.get(&question.name) else {
            return Err(Failure::Rcode(Rcode::Refused));
        };
        let Some(policy) = self.ctx.policy(zone.apex()) else {
            return Err(Failure::Rcode(Rcode::Refused));
        };

        match policy
            .transfer_acl
            .evaluate(self.params.source.ip(), self.key_name())
        {
            AclVerdict::Allow => Ok(zone.clone()),
            AclVerdict::NeedsKey | AclVerdict::Deny => Err(Failure::Rcode(Rcode::Refused)),
        }
    }

    fn transfer_base(&self) -> Message {
        let query = self.query.as_ref().expect("producing without a query");
        let mut base = query.make_response();
        base.header.is_authoritative = true;
        base
    }

    fn start_axfr(&mut self) -> Result<(), Failure> {
        if self.params.protocol == Protocol::Udp {
            return Err(Failure::Rcode(Rcode::FormatError));
        }

        let zone = self.transfer_zone()?;
        tracing::info!(zone = %zone.apex().to_dotted_string(), source = %self.params.source, "outgoing AXFR");
        self.stream = Some(TransferStream::axfr(zone, self.transfer_base()));
        Ok(())
    }

    /// Set up an IXFR answer: an incremental stream when the journal
    /// covers the client's serial, a full transfer when it does not,
    /// and a bare SOA when the client is already current (or the
    /// stream will not fit the UDP cap).
    fn start_ixfr(&mut self, max_size: usize) -> Result<Option<Message>, Failure> {
        let zone = self.transfer_zone()?;

        let query = self.query.as_ref().expect("producing without a query");
        let client_serial = query
            .authority
            .iter()
            .find_map(|rr| match &rr.rtype_with_data {
                RecordTypeWithData::SOA { serial, .. } => Some(*serial),
                _ => None,
            })
            .ok_or(Failure::Rcode(Rcode::FormatError))?;

        let soa_only = |zone: &Zone, mut base: Message| {
            base.answers.push(zone.soa_rr());
            base
        };

        if !serial_gt(zone.serial(), client_serial) {
            return Ok(Some(soa_only(&zone, self.transfer_base())));
        }

        let chain =
            self.ctx
                .journal
                .changesets_between(zone.apex(), client_serial, zone.serial());

        let mut stream = match chain {
            Some(chain) if !chain.is_empty() => {
                tracing::info!(zone = %zone.apex().to_dotted_string(), %client_serial, "outgoing IXFR");
                TransferStream::ixfr(zone.clone(), &chain, self.transfer_base())
            }
            _ => {
                // no contiguous history: fall back to full zone
                // content, which the client detects by the second
                // record not being a SOA
                tracing::info!(zone = %zone.apex().to_dotted_string(), %client_serial, "IXFR falling back to AXFR");
                TransferStream::axfr(zone.clone(), self.transfer_base())
            }
        };

        if self.params.protocol == Protocol::Udp {
            // over UDP the whole thing must fit one datagram, else
            // answer with the SOA and let the client come back over
            // TCP
            let cap = self.size_cap(max_size) - self.tsig_reserve();
            if let Some(message) = stream.next_message(cap) {
                if stream.is_finished() {
                    return Ok(Some(message));
                }
            }
            return Ok(Some(soa_only(&zone, self.transfer_base())));
        }

        self.stream = Some(stream);
        Ok(None)
    }

    fn emit_stream_chunk(&mut self, out: &mut Vec<u8>, max_size: usize) -> ProduceOutcome {
        let cap = self.size_cap(max_size);
        let reserve = self.tsig_reserve();

        let Some(stream) = &mut self.stream else {
            self.state = State::Failed;
            return ProduceOutcome::Fail;
        };

        let Some(mut message) = stream.next_message(cap.saturating_sub(reserve)) else {
            self.stream = None;
            self.state = State::Done;
            return ProduceOutcome::Done;
        };
        let finished = stream.is_finished();

        self.attach_edns(&mut message);
        let serialised = match message.serialise(cap.saturating_sub(reserve), 0) {
            Ok(serialised) => serialised,
            Err(error) => {
                tracing::error!(?error, "could not serialise transfer chunk");
                self.state = State::Failed;
                return ProduceOutcome::Fail;
            }
        };
        let mut wire = serialised.octets;

        if let Some(key) = self.verified_key.clone() {
            let now = unix_now();
            let tsig = if self.stream_packets == 0 {
                tsig::sign_response(
                    &key,
                    self.request_mac.as_deref(),
                    &wire,
                    now,
                    SIGNING_FUDGE,
                )
            } else {
                let prior = self
                    .stream_mac
                    .as_deref()
                    .or(self.request_mac.as_deref())
                    .unwrap_or(&[]);
                tsig::sign_stream_continuation(&key, prior, &wire, now, SIGNING_FUDGE)
            };
            self.stream_mac = Some(tsig.mac.clone());
            if append_tsig(&mut wire, &tsig).is_err() {
                self.state = State::Failed;
                return ProduceOutcome::Fail;
            }
        }

        self.stream_packets += 1;
        *out = wire;

        if finished {
            self.stream = None;
            self.state = State::Done;
            ProduceOutcome::Done
        } else {
            ProduceOutcome::Full
        }
    }

    /// Finalise and serialise one response: EDNS attached, size cap
    /// applied, TSIG appended.
    fn emit(
        &mut self,
        out: &mut Vec<u8>,
        mut message: Message,
        action: &TsigAction,
        max_size: usize,
    ) -> ProduceOutcome {
        self.attach_edns(&mut message);

        let cap = self.size_cap(max_size);
        let reserve = match action {
            TsigAction::None => 0,
            _ => self.tsig_reserve(),
        };

        let serialised = match message.serialise(cap, reserve) {
            Ok(serialised) => serialised,
            Err(error) => {
                tracing::error!(?error, "could not serialise response");
                self.state = State::Failed;
                return ProduceOutcome::Fail;
            }
        };
        let mut wire = serialised.octets;

        let tsig = match action {
            TsigAction::None => None,
            TsigAction::Sign => self.verified_key.clone().map(|key| {
                tsig::sign_response(
                    &key,
                    self.request_mac.as_deref(),
                    &wire,
                    unix_now(),
                    SIGNING_FUDGE,
                )
            }),
            TsigAction::UnsignedError(code) => self
                .request_tsig
                .as_ref()
                .map(|request| tsig::unsigned_error(request, *code)),
            TsigAction::SignedBadTime => match (&self.request_tsig, &self.request_mac) {
                (Some(request), Some(mac)) => self
                    .ctx
                    .keyring
                    .get(&request.key_name)
                    .map(|key| tsig::signed_badtime(key, request, mac, &wire, unix_now())),
                _ => None,
            },
        };

        if let Some(tsig) = tsig {
            if append_tsig(&mut wire, &tsig).is_err() {
                self.state = State::Failed;
                return ProduceOutcome::Fail;
            }
        }

        *out = wire;
        self.state = State::Done;
        ProduceOutcome::Done
    }

    /// A response gets an OPT exactly when the query had one (or the
    /// RCODE cannot be expressed without one).  The DO bit is echoed;
    /// NSID is disclosed when asked for and configured.
    fn attach_edns(&self, message: &mut Message) {
        let query_edns = self.query.as_ref().and_then(|query| query.edns.as_ref());

        if query_edns.is_none() && message.header.rcode.extended_bits() == 0 {
            return;
        }

        let mut edns = Edns::response(
            self.ctx.opt.max_payload,
            query_edns.is_some_and(|edns| edns.dnssec_ok),
        );

        if let (Some(query_edns), Some(nsid)) = (query_edns, &self.ctx.opt.nsid) {
            if query_edns
                .options
                .iter()
                .any(|option| matches!(option, EdnsOption::Nsid { .. }))
            {
                edns.options.push(EdnsOption::Nsid {
                    octets: nsid.clone(),
                });
            }
        }

        message.edns = Some(edns);
    }

    /// The outgoing size cap: the TCP limit, or over UDP the smaller
    /// of what the client advertised and what we are configured to
    /// send (512 for clients without EDNS).
    fn size_cap(&self, max_size: usize) -> usize {
        let cap = match self.params.protocol {
            Protocol::Tcp => MESSAGE_MAX_LEN,
            Protocol::Udp => {
                let client = self
                    .query
                    .as_ref()
                    .and_then(|query| query.edns.as_ref())
                    .map_or(usize::from(UDP_PAYLOAD_DEFAULT), |edns| {
                        usize::from(edns.payload_size.max(UDP_PAYLOAD_DEFAULT))
                    });
                client.min(usize::from(self.ctx.opt.max_payload.max(UDP_PAYLOAD_DEFAULT)))
            }
        };
        cap.min(max_size)
    }

    fn tsig_reserve(&self) -> usize {
        match (&self.verified_key, &self.request_tsig) {
            (Some(key), _) => {
                key.name.octets.len() + 10 + key.algorithm.to_name().octets.len() + 16
                    + key.algorithm.mac_len()
                    + 6
            }
            (None, Some(request)) => {
                request.key_name.octets.len()
                    + 10
                    + request.algorithm.octets.len()
                    + 16
                    + request.mac.len()
                    + 6
            }
            (None, None) => 0,
        }
    }
}

fn rrl_class(response: &Message, outcome: AnswerOutcome) -> ResponseClass {
    if outcome.used_wildcard {
        ResponseClass::Wildcard
    } else {
        match response.header.rcode {
            Rcode::NoError => ResponseClass::Normal,
            Rcode::NameError => ResponseClass::NxDomain,
            _ => ResponseClass::Error,
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}
