//! Transaction signatures (RFC 2845).  A TSIG is an HMAC over the
//! message plus a block of "variables" from the TSIG record itself;
//! requests, responses, and the packets of a zone transfer stream are
//! each signed slightly differently.

use std::collections::HashMap;
use std::sync::Arc;

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use dns_types::protocol::types::*;

/// The HMAC algorithms this server speaks.  Names are exchanged in
/// domain-name form.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TsigAlgorithm {
    HmacSha1,
    HmacSha256,
    HmacSha512,
}

impl TsigAlgorithm {
    pub fn from_name(name: &DomainName) -> Option<Self> {
        match name.to_dotted_string().as_str() {
            "hmac-sha1." => Some(TsigAlgorithm::HmacSha1),
            "hmac-sha256." => Some(TsigAlgorithm::HmacSha256),
            "hmac-sha512." => Some(TsigAlgorithm::HmacSha512),
            _ => None,
        }
    }

    /// # Panics
    ///
    /// Cannot panic: algorithm names are valid domain names.
    pub fn to_name(self) -> DomainName {
        let name = match self {
            TsigAlgorithm::HmacSha1 => "hmac-sha1.",
            TsigAlgorithm::HmacSha256 => "hmac-sha256.",
            TsigAlgorithm::HmacSha512 => "hmac-sha512.",
        };
        DomainName::from_dotted_string(name).unwrap()
    }

    pub fn mac_len(self) -> usize {
        match self {
            TsigAlgorithm::HmacSha1 => 20,
            TsigAlgorithm::HmacSha256 => 32,
            TsigAlgorithm::HmacSha512 => 64,
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "hmac-sha1" => Some(TsigAlgorithm::HmacSha1),
            "hmac-sha256" => Some(TsigAlgorithm::HmacSha256),
            "hmac-sha512" => Some(TsigAlgorithm::HmacSha512),
            _ => None,
        }
    }
}

/// A shared secret.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TsigKey {
    pub name: DomainName,
    pub algorithm: TsigAlgorithm,
    pub secret: Vec<u8>,
}

/// The configured key set, looked up by key name.  Replaced
/// wholesale on reload, never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct TsigKeyring {
    keys: HashMap<DomainName, Arc<TsigKey>>,
}

impl TsigKeyring {
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: TsigKey) {
        self.keys.insert(key.name.clone(), Arc::new(key));
    }

    pub fn get(&self, name: &DomainName) -> Option<&Arc<TsigKey>> {
        self.keys.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Verification failures, in the order they are checked: unknown or
/// mismatched key, then the MAC itself, then the clock window.  Each
/// carries what the NOTAUTH response needs.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TsigError {
    BadKey,
    BadSig,
    BadTime { client_time: u64, fudge: u16 },
}

impl TsigError {
    pub fn tsig_rcode(&self) -> TsigRcode {
        match self {
            TsigError::BadKey => TsigRcode::BadKey,
            TsigError::BadSig => TsigRcode::BadSig,
            TsigError::BadTime { .. } => TsigRcode::BadTime,
        }
    }
}

/// How much of the TSIG variables go into the digest.  The first
/// message of an exchange digests them all; later messages of a
/// transfer stream digest only the timers (RFC 2845 section 4.4).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum DigestVariables {
    Full {
        error: TsigRcode,
        other_len_and_data: bool,
    },
    TimersOnly,
}

/// Verify the TSIG on a request.
///
/// `wire` is the request exactly as received and `tsig_offset` is
/// where its TSIG record starts.  The digest covers the message as it
/// was before signing: the TSIG stripped, ARCOUNT decremented, and
/// the original message ID restored.
pub fn verify_request(
    keyring: &TsigKeyring,
    wire: &[u8],
    tsig_offset: usize,
    tsig: &Tsig,
    now: u64,
) -> Result<Arc<TsigKey>, TsigError> {
    let key = keyring.get(&tsig.key_name).ok_or(TsigError::BadKey)?;

    let algorithm = TsigAlgorithm::from_name(&tsig.algorithm).ok_or(TsigError::BadKey)?;
    if algorithm != key.algorithm {
        return Err(TsigError::BadKey);
    }

    let message = unsigned_form(wire, tsig_offset, tsig.original_id);
    let expected = compute_mac(
        key,
        None,
        &message,
        tsig,
        DigestVariables::Full {
            error: tsig.error,
            other_len_and_data: true,
        },
    );

    if !constant_time_eq(&expected, &tsig.mac) {
        return Err(TsigError::BadSig);
    }

    let skew = now.abs_diff(tsig.time_signed);
    if skew > u64::from(tsig.fudge) {
        return Err(TsigError::BadTime {
            client_time: tsig.time_signed,
            fudge: tsig.fudge,
        });
    }

    Ok(key.clone())
}

/// Sign a response: computes the MAC over the request's MAC, the
/// serialised response, and the TSIG variables, and returns the
/// record to append.
pub fn sign_response(
    key: &TsigKey,
    request_mac: Option<&[u8]>,
    response_wire: &[u8],
    time_signed: u64,
    fudge: u16,
) -> Tsig {
    let mut tsig = Tsig {
        key_name: key.name.clone(),
        algorithm: key.algorithm.to_name(),
        time_signed,
        fudge,
        mac: Vec::new(),
        original_id: u16::from_be_bytes([response_wire[0], response_wire[1]]),
        error: TsigRcode::NoError,
        other: Vec::new(),
    };

    tsig.mac = compute_mac(
        key,
        request_mac,
        response_wire,
        &tsig,
        DigestVariables::Full {
            error: TsigRcode::NoError,
            other_len_and_data: true,
        },
    );
    tsig
}

/// Sign a non-first packet of a transfer stream: the digest chains
/// from the previous packet's MAC and covers only the timers.
pub fn sign_stream_continuation(
    key: &TsigKey,
    prior_mac: &[u8],
    response_wire: &[u8],
    time_signed: u64,
    fudge: u16,
) -> Tsig {
    let mut tsig = Tsig {
        key_name: key.name.clone(),
        algorithm: key.algorithm.to_name(),
        time_signed,
        fudge,
        mac: Vec::new(),
        original_id: u16::from_be_bytes([response_wire[0], response_wire[1]]),
        error: TsigRcode::NoError,
        other: Vec::new(),
    };

    tsig.mac = compute_mac(
        key,
        Some(prior_mac),
        response_wire,
        &tsig,
        DigestVariables::TimersOnly,
    );
    tsig
}

/// The TSIG record for a response the server cannot or will not MAC:
/// BADKEY and BADSIG responses are unsigned, carrying only the error
/// (RFC 2845 section 4.5).
pub fn unsigned_error(request_tsig: &Tsig, error: TsigRcode) -> Tsig {
    Tsig {
        key_name: request_tsig.key_name.clone(),
        algorithm: request_tsig.algorithm.clone(),
        time_signed: request_tsig.time_signed,
        fudge: request_tsig.fudge,
        mac: Vec::new(),
        original_id: request_tsig.original_id,
        error,
        other: Vec::new(),
    }
}

/// The TSIG record for a BADTIME response: signed, echoing the
/// client's time so it can resynchronise, with the server's clock in
/// the other-data field.
pub fn signed_badtime(
    key: &TsigKey,
    request_tsig: &Tsig,
    request_mac: &[u8],
    response_wire: &[u8],
    now: u64,
) -> Tsig {
    let mut tsig = Tsig {
        key_name: key.name.clone(),
        algorithm: key.algorithm.to_name(),
        time_signed: request_tsig.time_signed,
        fudge: request_tsig.fudge,
        mac: Vec::new(),
        original_id: u16::from_be_bytes([response_wire[0], response_wire[1]]),
        error: TsigRcode::BadTime,
        other: now.to_be_bytes()[2..].to_vec(),
    };

    tsig.mac = compute_mac(
        key,
        Some(request_mac),
        response_wire,
        &tsig,
        DigestVariables::Full {
            error: TsigRcode::BadTime,
            other_len_and_data: true,
        },
    );
    tsig
}

/// Reconstruct the message the signer saw: TSIG stripped, ARCOUNT one
/// lower, message ID replaced with the original (a forwarder may have
/// rewritten it).
fn unsigned_form(wire: &[u8], tsig_offset: usize, original_id: u16) -> Vec<u8> {
    let mut message = wire[..tsig_offset].to_vec();

    let [id_hi, id_lo] = original_id.to_be_bytes();
    message[0] = id_hi;
    message[1] = id_lo;

    let arcount = u16::from_be_bytes([message[10], message[11]]).saturating_sub(1);
    let [ar_hi, ar_lo] = arcount.to_be_bytes();
    message[10] = ar_hi;
    message[11] = ar_lo;

    message
}

/// The digest input, per RFC 2845 sections 3.4 and 4.4: optional
/// prior MAC (length-prefixed), the message, then the TSIG variables
/// in canonical form.
fn digest_input(
    prior_mac: Option<&[u8]>,
    message: &[u8],
    tsig: &Tsig,
    variables: DigestVariables,
) -> Vec<u8> {
    let mut input = Vec::with_capacity(message.len() + 128);

    if let Some(mac) = prior_mac {
        #[allow(clippy::cast_possible_truncation)]
        input.extend_from_slice(&(mac.len() as u16).to_be_bytes());
        input.extend_from_slice(mac);
    }

    input.extend_from_slice(message);

    match variables {
        DigestVariables::Full {
            error,
            other_len_and_data,
        } => {
            input.extend_from_slice(&tsig.key_name.canonical_octets());
            input.extend_from_slice(&u16::from(RecordClass::Any).to_be_bytes());
            input.extend_from_slice(&0u32.to_be_bytes());
            input.extend_from_slice(&tsig.algorithm.canonical_octets());
            input.extend_from_slice(&tsig.time_signed.to_be_bytes()[2..]);
            input.extend_from_slice(&tsig.fudge.to_be_bytes());
            input.extend_from_slice(&u16::from(error).to_be_bytes());
            if other_len_and_data {
                #[allow(clippy::cast_possible_truncation)]
                input.extend_from_slice(&(tsig.other.len() as u16).to_be_bytes());
                input.extend_from_slice(&tsig.other);
            }
        }
        DigestVariables::TimersOnly => {
            input.extend_from_slice(&tsig.time_signed.to_be_bytes()[2..]);
            input.extend_from_slice(&tsig.fudge.to_be_bytes());
        }
    }

    input
}

fn compute_mac(
    key: &TsigKey,
    prior_mac: Option<&[u8]>,
    message: &[u8],
    tsig: &Tsig,
    variables: DigestVariables,
) -> Vec<u8> {
    let input = digest_input(prior_mac, message, tsig, variables);

    match key.algorithm {
        TsigAlgorithm::HmacSha1 => hmac_digest::<Hmac<Sha1>>(&key.secret, &input),
        TsigAlgorithm::HmacSha256 => hmac_digest::<Hmac<Sha256>>(&key.secret, &input),
        TsigAlgorithm::HmacSha512 => hmac_digest::<Hmac<Sha512>>(&key.secret, &input),
    }
}

fn hmac_digest<M: Mac + KeyInit>(secret: &[u8], input: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = <M as Mac>::new_from_slice(secret).expect("hmac key length");
    mac.update(input);
    mac.finalize().into_bytes().to_vec()
}

/// Compare MACs without leaking where they diverge.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_types::protocol::serialise::append_tsig;
    use dns_types::protocol::types::test_util::*;

    fn keyring_with(algorithm: TsigAlgorithm) -> (TsigKeyring, Arc<TsigKey>) {
        let key = TsigKey {
            name: domain("update-key."),
            algorithm,
            secret: b"0123456789abcdef0123456789abcdef".to_vec(),
        };
        let mut keyring = TsigKeyring::new();
        keyring.insert(key.clone());
        let key = keyring.get(&key.name).unwrap().clone();
        (keyring, key)
    }

    fn signed_query(key: &TsigKey, time_signed: u64, fudge: u16) -> Vec<u8> {
        let message = Message::from_question(
            42,
            Question {
                name: domain("www.example.com."),
                qtype: QueryType::Record(RecordType::A),
                qclass: RecordClass::IN,
            },
        );

        let mut wire = message.to_octets().unwrap();
        let mut tsig = Tsig {
            key_name: key.name.clone(),
            algorithm: key.algorithm.to_name(),
            time_signed,
            fudge,
            mac: Vec::new(),
            original_id: 42,
            error: TsigRcode::NoError,
            other: Vec::new(),
        };
        tsig.mac = compute_mac(
            key,
            None,
            &wire,
            &tsig,
            DigestVariables::Full {
                error: TsigRcode::NoError,
                other_len_and_data: true,
            },
        );
        append_tsig(&mut wire, &tsig).unwrap();
        wire
    }

    #[test]
    fn sign_verify_roundtrip() {
        for algorithm in [
            TsigAlgorithm::HmacSha1,
            TsigAlgorithm::HmacSha256,
            TsigAlgorithm::HmacSha512,
        ] {
            let (keyring, key) = keyring_with(algorithm);
            let wire = signed_query(&key, 1000, 300);

            let parsed = Message::parse(&wire).unwrap();
            let tsig = parsed.message.tsig.as_ref().unwrap();
            assert_eq!(algorithm.mac_len(), tsig.mac.len());

            let verified = verify_request(
                &keyring,
                &wire,
                parsed.tsig_offset.unwrap(),
                tsig,
                1000,
            );
            assert_eq!(Ok(key), verified);
        }
    }

    #[test]
    fn verify_unknown_key_is_badkey() {
        let (_, key) = keyring_with(TsigAlgorithm::HmacSha256);
        let wire = signed_query(&key, 1000, 300);
        let parsed = Message::parse(&wire).unwrap();

        let empty = TsigKeyring::new();
        assert_eq!(
            Err(TsigError::BadKey),
            verify_request(
                &empty,
                &wire,
                parsed.tsig_offset.unwrap(),
                parsed.message.tsig.as_ref().unwrap(),
                1000,
            )
        );
    }

    #[test]
    fn verify_tampered_message_is_badsig() {
        let (keyring, key) = keyring_with(TsigAlgorithm::HmacSha256);
        let mut wire = signed_query(&key, 1000, 300);
        // flip a bit in the question name
        wire[13] ^= 0x20;
        let parsed = Message::parse(&wire).unwrap();

        assert_eq!(
            Err(TsigError::BadSig),
            verify_request(
                &keyring,
                &wire,
                parsed.tsig_offset.unwrap(),
                parsed.message.tsig.as_ref().unwrap(),
                1000,
            )
        );
    }

    #[test]
    fn verify_stale_time_is_badtime() {
        let (keyring, key) = keyring_with(TsigAlgorithm::HmacSha256);
        let wire = signed_query(&key, 1000, 300);
        let parsed = Message::parse(&wire).unwrap();

        assert_eq!(
            Err(TsigError::BadTime {
                client_time: 1000,
                fudge: 300
            }),
            verify_request(
                &keyring,
                &wire,
                parsed.tsig_offset.unwrap(),
                parsed.message.tsig.as_ref().unwrap(),
                5000,
            )
        );
    }

    #[test]
    fn verify_accepts_skew_within_fudge() {
        let (keyring, key) = keyring_with(TsigAlgorithm::HmacSha256);
        let wire = signed_query(&key, 1000, 300);
        let parsed = Message::parse(&wire).unwrap();

        for now in [700, 1000, 1300] {
            assert!(verify_request(
                &keyring,
                &wire,
                parsed.tsig_offset.unwrap(),
                parsed.message.tsig.as_ref().unwrap(),
                now,
            )
            .is_ok());
        }
    }

    #[test]
    fn response_signature_chains_request_mac() {
        let (_, key) = keyring_with(TsigAlgorithm::HmacSha256);
        let request_mac = vec![0xab; 32];
        let response = Message::make_format_error_response(9).to_octets().unwrap();

        let with_chain = sign_response(&key, Some(&request_mac), &response, 1000, 300);
        let without_chain = sign_response(&key, None, &response, 1000, 300);

        assert_ne!(with_chain.mac, without_chain.mac);
    }

    #[test]
    fn stream_continuation_differs_from_first_packet() {
        let (_, key) = keyring_with(TsigAlgorithm::HmacSha256);
        let wire = Message::make_format_error_response(9).to_octets().unwrap();
        let prior = vec![0xcd; 32];

        let first = sign_response(&key, Some(&prior), &wire, 1000, 300);
        let continuation = sign_stream_continuation(&key, &prior, &wire, 1000, 300);

        assert_ne!(first.mac, continuation.mac);
    }

    #[test]
    fn badtime_response_echoes_client_time() {
        let (_, key) = keyring_with(TsigAlgorithm::HmacSha256);
        let request = Tsig {
            key_name: key.name.clone(),
            algorithm: key.algorithm.to_name(),
            time_signed: 1000,
            fudge: 300,
            mac: vec![0xee; 32],
            original_id: 7,
            error: TsigRcode::NoError,
            other: Vec::new(),
        };
        let response = Message::make_format_error_response(7).to_octets().unwrap();

        let tsig = signed_badtime(&key, &request, &request.mac, &response, 99_999);

        assert_eq!(1000, tsig.time_signed);
        assert_eq!(TsigRcode::BadTime, tsig.error);
        assert_eq!(99_999u64.to_be_bytes()[2..].to_vec(), tsig.other);
        assert!(!tsig.mac.is_empty());
    }
}
