use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Maximum encoded size of a domain name, including all length octets.
pub const DOMAINNAME_MAX_LEN: usize = 255;

/// Maximum size of a single label.
pub const LABEL_MAX_LEN: usize = 63;

/// Maximum number of labels in a name (including the root label).
pub const DOMAINNAME_MAX_LABELS: usize = 127;

/// Maximum size of a whole message, from the TCP length prefix.
pub const MESSAGE_MAX_LEN: usize = 65535;

/// Responses to clients which did not advertise a payload size are
/// capped at this many octets.
pub const UDP_PAYLOAD_DEFAULT: u16 = 512;

pub const HEADER_MASK_QR: u8 = 0b1000_0000;
pub const HEADER_MASK_OPCODE: u8 = 0b0111_1000;
pub const HEADER_OFFSET_OPCODE: usize = 3;
pub const HEADER_MASK_AA: u8 = 0b0000_0100;
pub const HEADER_MASK_TC: u8 = 0b0000_0010;
pub const HEADER_MASK_RD: u8 = 0b0000_0001;
pub const HEADER_MASK_RA: u8 = 0b1000_0000;
pub const HEADER_MASK_AD: u8 = 0b0010_0000;
pub const HEADER_MASK_CD: u8 = 0b0001_0000;
pub const HEADER_MASK_RCODE: u8 = 0b0000_1111;
pub const HEADER_OFFSET_RCODE: usize = 0;

/// Basic DNS message format, used for both queries and responses.
///
/// ```text
///     +---------------------+
///     |        Header       |
///     +---------------------+
///     |       Question      | the question for the name server
///     +---------------------+
///     |        Answer       | RRs answering the question
///     +---------------------+
///     |      Authority      | RRs pointing toward an authority
///     +---------------------+
///     |      Additional     | RRs holding additional information
///     +---------------------+
/// ```
///
/// The EDNS OPT pseudo-RR and the TSIG pseudo-RR both live in the
/// additional section on the wire, but are carried out-of-band here:
/// they are not real records, and mixing them into `additional` makes
/// every consumer re-discover them.
///
/// See section 4.1 of RFC 1035, RFC 6891, and RFC 2845.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
    pub edns: Option<Edns>,
    pub tsig: Option<Tsig>,
}

impl Message {
    /// Skeleton response to a query: same ID, same opcode, question
    /// echoed (original case and all), flags reset for an
    /// authoritative server which does not recurse.
    pub fn make_response(&self) -> Self {
        Self {
            header: Header {
                id: self.header.id,
                is_response: true,
                opcode: self.header.opcode,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: self.header.recursion_desired,
                recursion_available: false,
                authentic_data: false,
                checking_disabled: false,
                rcode: Rcode::NoError,
            },
            questions: self.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns: None,
            tsig: None,
        }
    }

    pub fn make_format_error_response(id: u16) -> Self {
        Self {
            header: Header {
                id,
                is_response: true,
                opcode: Opcode::Query,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: false,
                recursion_available: false,
                authentic_data: false,
                checking_disabled: false,
                rcode: Rcode::FormatError,
            },
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns: None,
            tsig: None,
        }
    }

    pub fn from_question(id: u16, question: Question) -> Self {
        Self {
            header: Header {
                id,
                is_response: false,
                opcode: Opcode::Query,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: false,
                recursion_available: false,
                authentic_data: false,
                checking_disabled: false,
                rcode: Rcode::NoError,
            },
            questions: vec![question],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            edns: None,
            tsig: None,
        }
    }
}

/// Common header type for all messages.
///
/// ```text
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      ID                       |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |QR|   Opcode  |AA|TC|RD|RA| Z|AD|CD|   RCODE   |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    QDCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ANCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    NSCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ARCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
///
/// See section 4.1.1 of RFC 1035 (AD and CD bits: RFC 4035).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Header {
    /// A 16 bit identifier assigned by the program that generates any
    /// kind of query.  This identifier is copied to the corresponding
    /// reply and can be used by the requester to match up replies to
    /// outstanding queries.
    pub id: u16,

    /// A one bit field that specifies whether this message is a query
    /// (0), or a response (1).
    pub is_response: bool,

    /// A four bit field that specifies kind of query in this message.
    /// This value is set by the originator of a query and copied into
    /// the response.
    pub opcode: Opcode,

    /// Authoritative Answer - this bit is valid in responses, and
    /// specifies that the responding name server is an authority for
    /// the domain name in question section.
    pub is_authoritative: bool,

    /// TrunCation - specifies that this message was truncated due to
    /// length greater than that permitted on the transmission
    /// channel.
    pub is_truncated: bool,

    /// Recursion Desired - this bit may be set in a query and is
    /// copied into the response.  This server never recurses, so it
    /// is echoed but otherwise ignored.
    pub recursion_desired: bool,

    /// Recursion Available - always cleared in responses from this
    /// server.
    pub recursion_available: bool,

    /// Authentic Data (RFC 4035).  Echoed as zero.
    pub authentic_data: bool,

    /// Checking Disabled (RFC 4035).  Accepted and ignored.
    pub checking_disabled: bool,

    /// Response code.  Only the low four bits appear in the header;
    /// values above 15 need an EDNS OPT record to carry the upper
    /// bits.
    pub rcode: Rcode,
}

/// A `Header` as it appears on the network.  This type is used for
/// serialisation and deserialisation only: including the count fields
/// in the normal `Header` type would require ensuring those values
/// are correct.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct WireHeader {
    /// The header that will be persisted to / is taken from the
    /// `Message`.
    pub header: Header,

    /// an unsigned 16 bit integer specifying the number of entries in
    /// the question section.
    pub qdcount: u16,

    /// an unsigned 16 bit integer specifying the number of resource
    /// records in the answer section.
    pub ancount: u16,

    /// an unsigned 16 bit integer specifying the number of name
    /// server resource records in the authority records section.
    pub nscount: u16,

    /// an unsigned 16 bit integer specifying the number of
    /// resource records in the additional records section.
    pub arcount: u16,
}

/// A single entry in the question section.  In a dynamic update
/// (RFC 2136) this same structure names the zone being updated.
///
/// See section 4.1.2 of RFC 1035.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Question {
    pub name: DomainName,
    pub qtype: QueryType,
    pub qclass: RecordClass,
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.name.to_dotted_string(),
            self.qclass,
            self.qtype
        )
    }
}

/// The answer, authority, and additional sections are all the same
/// format: a variable number of resource records.  This is the
/// structure for a single resource record.
///
/// ```text
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                                               |
///     /                                               /
///     /                      NAME                     /
///     |                                               |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      TYPE                     |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                     CLASS                     |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      TTL                      |
///     |                                               |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                   RDLENGTH                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--|
///     /                     RDATA                     /
///     /                                               /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
///
/// See section 4.1.3 of RFC 1035.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ResourceRecord {
    /// a domain name to which this resource record pertains.
    pub name: DomainName,

    /// A combination of the RTYPE and RDATA fields.
    pub rtype_with_data: RecordTypeWithData,

    /// two octets which specify the class of the data in the RDATA
    /// field.  Dynamic updates overload this with NONE and ANY.
    pub rclass: RecordClass,

    /// a 32 bit unsigned integer that specifies the time interval (in
    /// seconds) that the resource record may be cached before it
    /// should be discarded.
    pub ttl: u32,
}

impl ResourceRecord {
    /// Size of this record on the wire with no compression applied.
    /// Used to pack transfer messages without serialising twice.
    pub fn wire_len_uncompressed(&self) -> usize {
        self.name.octets.len() + 10 + self.rtype_with_data.rdata_len_uncompressed()
    }
}

/// A record type with its associated, deserialised, data.
///
/// Only the types this server can hold in a zone are given structure;
/// anything else round-trips as opaque octets per RFC 3597.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordTypeWithData {
    /// ```text
    ///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    ///     |                    ADDRESS                    |
    ///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    /// ```
    ///
    /// Where `ADDRESS` is a 32 bit Internet address.
    A { address: Ipv4Addr },

    /// Where `NSDNAME` is a domain name which specifies a host which
    /// should be authoritative for the specified class and domain.
    NS { nsdname: DomainName },

    /// Where `CNAME` is a domain name which specifies the canonical
    /// or primary name for the owner.  The owner name is an alias.
    CNAME { cname: DomainName },

    /// Start of a zone of authority.  `SERIAL` wraps and is compared
    /// using sequence space arithmetic (RFC 1982).
    SOA {
        mname: DomainName,
        rname: DomainName,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },

    /// Where `PTRDNAME` is a domain name which points to some
    /// location in the domain name space.
    PTR { ptrdname: DomainName },

    /// ```text
    ///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    ///     |                  PREFERENCE                   |
    ///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    ///     /                   EXCHANGE                    /
    ///     /                                               /
    ///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    /// ```
    ///
    /// Where `PREFERENCE` is a 16 bit integer which specifies the
    /// preference given to this RR among others at the same owner and
    /// `EXCHANGE` is a domain name which specifies a host willing to
    /// act as a mail exchange for the owner name.
    MX {
        preference: u16,
        exchange: DomainName,
    },

    /// Where `TXT-DATA` is one or more character strings, kept
    /// unparsed.
    TXT { octets: Vec<u8> },

    /// Where `ADDRESS` is a 128 bit Internet address.
    AAAA { address: Ipv6Addr },

    /// Service location, RFC 2782.  The target is never compressed.
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: DomainName,
    },

    /// Delegation signer, RFC 4034 section 5.
    DS {
        key_tag: u16,
        algorithm: u8,
        digest_type: u8,
        digest: Vec<u8>,
    },

    /// Signature over an RRset, RFC 4034 section 3.  The signer name
    /// is never compressed.
    RRSIG {
        type_covered: RecordType,
        algorithm: u8,
        labels: u8,
        original_ttl: u32,
        expiration: u32,
        inception: u32,
        key_tag: u16,
        signer: DomainName,
        signature: Vec<u8>,
    },

    /// Authenticated denial of existence, RFC 4034 section 4.
    NSEC {
        next: DomainName,
        type_bitmap: Vec<u8>,
    },

    /// Hashed authenticated denial of existence, RFC 5155 section 3.
    /// `next_hashed` is the raw hash, not its base32hex form.
    NSEC3 {
        hash_algorithm: u8,
        flags: u8,
        iterations: u16,
        salt: Vec<u8>,
        next_hashed: Vec<u8>,
        type_bitmap: Vec<u8>,
    },

    /// NSEC3 parameters, RFC 5155 section 4.  Only valid at a zone
    /// apex.
    NSEC3PARAM {
        hash_algorithm: u8,
        flags: u8,
        iterations: u16,
        salt: Vec<u8>,
    },

    /// A record with no RDATA at all.  Never zone data: dynamic
    /// update packets use empty-RDATA records to name an RRset
    /// without giving values (RFC 2136 sections 2.4 and 2.5).
    Empty { rtype: RecordType },

    /// Any other record.
    Unknown {
        tag: RecordTypeUnknown,
        octets: Vec<u8>,
    },
}

impl RecordTypeWithData {
    pub fn rtype(&self) -> RecordType {
        match self {
            RecordTypeWithData::A { .. } => RecordType::A,
            RecordTypeWithData::NS { .. } => RecordType::NS,
            RecordTypeWithData::CNAME { .. } => RecordType::CNAME,
            RecordTypeWithData::SOA { .. } => RecordType::SOA,
            RecordTypeWithData::PTR { .. } => RecordType::PTR,
            RecordTypeWithData::MX { .. } => RecordType::MX,
            RecordTypeWithData::TXT { .. } => RecordType::TXT,
            RecordTypeWithData::AAAA { .. } => RecordType::AAAA,
            RecordTypeWithData::SRV { .. } => RecordType::SRV,
            RecordTypeWithData::DS { .. } => RecordType::DS,
            RecordTypeWithData::RRSIG { .. } => RecordType::RRSIG,
            RecordTypeWithData::NSEC { .. } => RecordType::NSEC,
            RecordTypeWithData::NSEC3 { .. } => RecordType::NSEC3,
            RecordTypeWithData::NSEC3PARAM { .. } => RecordType::NSEC3PARAM,
            RecordTypeWithData::Empty { rtype } => *rtype,
            RecordTypeWithData::Unknown { tag, .. } => RecordType::Unknown(*tag),
        }
    }

    pub fn is_empty_rdata(&self) -> bool {
        matches!(self, RecordTypeWithData::Empty { .. })
    }

    /// The name in the RDATA which should pull address records into
    /// the additional section, if there is one.
    pub fn additional_section_name(&self) -> Option<&DomainName> {
        match self {
            RecordTypeWithData::NS { nsdname } => Some(nsdname),
            RecordTypeWithData::MX { exchange, .. } => Some(exchange),
            RecordTypeWithData::SRV { target, .. } => Some(target),
            RecordTypeWithData::PTR { ptrdname } => Some(ptrdname),
            _ => None,
        }
    }

    /// Uncompressed RDATA size on the wire.
    pub fn rdata_len_uncompressed(&self) -> usize {
        match self {
            RecordTypeWithData::A { .. } => 4,
            RecordTypeWithData::NS { nsdname } => nsdname.octets.len(),
            RecordTypeWithData::CNAME { cname } => cname.octets.len(),
            RecordTypeWithData::SOA { mname, rname, .. } => {
                mname.octets.len() + rname.octets.len() + 20
            }
            RecordTypeWithData::PTR { ptrdname } => ptrdname.octets.len(),
            RecordTypeWithData::MX { exchange, .. } => 2 + exchange.octets.len(),
            RecordTypeWithData::TXT { octets } => octets.len(),
            RecordTypeWithData::AAAA { .. } => 16,
            RecordTypeWithData::SRV { target, .. } => 6 + target.octets.len(),
            RecordTypeWithData::DS { digest, .. } => 4 + digest.len(),
            RecordTypeWithData::RRSIG {
                signer, signature, ..
            } => 18 + signer.octets.len() + signature.len(),
            RecordTypeWithData::NSEC { next, type_bitmap } => next.octets.len() + type_bitmap.len(),
            RecordTypeWithData::NSEC3 {
                salt,
                next_hashed,
                type_bitmap,
                ..
            } => 6 + salt.len() + next_hashed.len() + type_bitmap.len(),
            RecordTypeWithData::NSEC3PARAM { salt, .. } => 5 + salt.len(),
            RecordTypeWithData::Empty { .. } => 0,
            RecordTypeWithData::Unknown { octets, .. } => octets.len(),
        }
    }
}

/// What sort of query this is.  Opcodes this server does not
/// implement are preserved so the NOTIMPL response can echo them.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Opcode {
    Query,
    Notify,
    Update,
    Reserved(OpcodeReserved),
}

/// A struct with a private constructor, to ensure invalid `Opcode`s
/// cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct OpcodeReserved(u8);

impl From<u8> for Opcode {
    fn from(octet: u8) -> Self {
        match octet & 0b0000_1111 {
            0 => Opcode::Query,
            4 => Opcode::Notify,
            5 => Opcode::Update,
            other => Opcode::Reserved(OpcodeReserved(other)),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Query => 0,
            Opcode::Notify => 4,
            Opcode::Update => 5,
            Opcode::Reserved(OpcodeReserved(octet)) => octet,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Query => write!(f, "QUERY"),
            Opcode::Notify => write!(f, "NOTIFY"),
            Opcode::Update => write!(f, "UPDATE"),
            Opcode::Reserved(OpcodeReserved(n)) => write!(f, "{n}"),
        }
    }
}

/// What sort of response this is.  Values above 15 do not fit the
/// 4-bit header field: BADVERS needs the extended-RCODE octet in an
/// OPT record, and the TSIG error codes travel in the TSIG RR itself.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Rcode {
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    YXDomain,
    YXRRSet,
    NXRRSet,
    NotAuth,
    NotZone,
    BadVers,
    Reserved(RcodeReserved),
}

/// A struct with a private constructor, to ensure invalid `Rcode`s
/// cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RcodeReserved(u16);

impl Rcode {
    /// Reassemble an RCODE from the 4-bit header field and the
    /// extended-RCODE octet of an OPT record (which holds the high 8
    /// of 12 bits).
    pub fn from_parts(header_bits: u8, extended: u8) -> Self {
        Self::from(u16::from(extended) << 4 | u16::from(header_bits & 0b0000_1111))
    }

    /// The low four bits, as they appear in the message header.
    pub fn header_bits(self) -> u8 {
        (u16::from(self) & 0b0000_1111) as u8
    }

    /// The high eight bits, as they appear in an OPT record.  Zero
    /// for all the RFC 1035 codes.
    pub fn extended_bits(self) -> u8 {
        (u16::from(self) >> 4) as u8
    }
}

impl From<u16> for Rcode {
    fn from(value: u16) -> Self {
        match value {
            0 => Rcode::NoError,
            1 => Rcode::FormatError,
            2 => Rcode::ServerFailure,
            3 => Rcode::NameError,
            4 => Rcode::NotImplemented,
            5 => Rcode::Refused,
            6 => Rcode::YXDomain,
            7 => Rcode::YXRRSet,
            8 => Rcode::NXRRSet,
            9 => Rcode::NotAuth,
            10 => Rcode::NotZone,
            16 => Rcode::BadVers,
            other => Rcode::Reserved(RcodeReserved(other)),
        }
    }
}

impl From<Rcode> for u16 {
    fn from(value: Rcode) -> Self {
        match value {
            Rcode::NoError => 0,
            Rcode::FormatError => 1,
            Rcode::ServerFailure => 2,
            Rcode::NameError => 3,
            Rcode::NotImplemented => 4,
            Rcode::Refused => 5,
            Rcode::YXDomain => 6,
            Rcode::YXRRSet => 7,
            Rcode::NXRRSet => 8,
            Rcode::NotAuth => 9,
            Rcode::NotZone => 10,
            Rcode::BadVers => 16,
            Rcode::Reserved(RcodeReserved(octet)) => octet,
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rcode::NoError => write!(f, "NOERROR"),
            Rcode::FormatError => write!(f, "FORMERR"),
            Rcode::ServerFailure => write!(f, "SERVFAIL"),
            Rcode::NameError => write!(f, "NXDOMAIN"),
            Rcode::NotImplemented => write!(f, "NOTIMPL"),
            Rcode::Refused => write!(f, "REFUSED"),
            Rcode::YXDomain => write!(f, "YXDOMAIN"),
            Rcode::YXRRSet => write!(f, "YXRRSET"),
            Rcode::NXRRSet => write!(f, "NXRRSET"),
            Rcode::NotAuth => write!(f, "NOTAUTH"),
            Rcode::NotZone => write!(f, "NOTZONE"),
            Rcode::BadVers => write!(f, "BADVERS"),
            Rcode::Reserved(RcodeReserved(n)) => write!(f, "{n}"),
        }
    }
}

/// TSIG-level error codes, carried in the error field of the TSIG RR
/// (RFC 2845 section 1.7).  These share number space with RCODEs but
/// are 16 bits wide.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TsigRcode {
    NoError,
    BadSig,
    BadKey,
    BadTime,
    Other(u16),
}

impl From<u16> for TsigRcode {
    fn from(value: u16) -> Self {
        match value {
            0 => TsigRcode::NoError,
            16 => TsigRcode::BadSig,
            17 => TsigRcode::BadKey,
            18 => TsigRcode::BadTime,
            other => TsigRcode::Other(other),
        }
    }
}

impl From<TsigRcode> for u16 {
    fn from(value: TsigRcode) -> Self {
        match value {
            TsigRcode::NoError => 0,
            TsigRcode::BadSig => 16,
            TsigRcode::BadKey => 17,
            TsigRcode::BadTime => 18,
            TsigRcode::Other(value) => value,
        }
    }
}

impl fmt::Display for TsigRcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TsigRcode::NoError => write!(f, "NOERROR"),
            TsigRcode::BadSig => write!(f, "BADSIG"),
            TsigRcode::BadKey => write!(f, "BADKEY"),
            TsigRcode::BadTime => write!(f, "BADTIME"),
            TsigRcode::Other(n) => write!(f, "{n}"),
        }
    }
}

/// A label is up to 63 octets.  Labels are lowercased on
/// construction, since all name comparison in the DNS is
/// case-insensitive: the original case of a name, where it matters,
/// lives in the `DomainName` octets.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Label(Vec<u8>);

impl Label {
    pub fn new() -> Self {
        Label(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, u8> {
        self.0.iter()
    }
}

impl std::ops::Deref for Label {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Error for labels over 63 octets.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct LabelTooLong;

impl TryFrom<&[u8]> for Label {
    type Error = LabelTooLong;

    fn try_from(octets: &[u8]) -> Result<Self, Self::Error> {
        if octets.len() > LABEL_MAX_LEN {
            return Err(LabelTooLong);
        }

        Ok(Label(octets.iter().map(u8::to_ascii_lowercase).collect()))
    }
}

/// A domain name is a sequence of labels, where each label is a
/// length octet followed by that number of octets.
///
/// `octets` is the name as it appeared on the wire (or was
/// constructed), case and all, so a response can echo the case the
/// client sent.  `labels` is the lowercased form used for every
/// comparison.  Equality, ordering, and hashing all go through
/// `labels`: two names differing only in case are the same name.
///
/// The `Ord` instance is the DNSSEC canonical ordering (RFC 4034
/// section 6.1): names compare label by label from the rightmost,
/// which makes an ordered map of names iterate a zone in canonical
/// order and makes predecessor queries answer "which name covers
/// this" directly.
///
/// A label must be 63 octets or shorter.  A name must be 255 octets
/// or shorter in total, including both length and label octets.
#[derive(Clone)]
pub struct DomainName {
    pub octets: Vec<u8>,
    pub labels: Vec<Label>,
}

impl PartialEq for DomainName {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl Eq for DomainName {}

impl Hash for DomainName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.labels.hash(state);
    }
}

impl Ord for DomainName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.labels.iter().rev().cmp(other.labels.iter().rev())
    }
}

impl PartialOrd for DomainName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl DomainName {
    pub fn root_domain() -> Self {
        DomainName {
            octets: vec![0],
            labels: vec![Label::new()],
        }
    }

    pub fn is_root(&self) -> bool {
        self.octets.len() == 1 && self.labels.len() == 1
    }

    /// True if the leftmost label is the single octet `*`.
    pub fn is_wildcard(&self) -> bool {
        self.labels.len() > 1 && self.labels[0][..] == b"*"[..]
    }

    pub fn is_subdomain_of(&self, other: &DomainName) -> bool {
        self.labels.ends_with(&other.labels)
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// The name with the leftmost label removed, or `None` for the
    /// root.
    pub fn parent(&self) -> Option<DomainName> {
        if self.is_root() {
            None
        } else {
            Some(Self::from_label_slice(&self.labels[1..]))
        }
    }

    /// The name `*.self`.  Fails only if the result would be too
    /// long.
    pub fn wildcard_child(&self) -> Option<DomainName> {
        if self.octets.len() + 2 > DOMAINNAME_MAX_LEN {
            return None;
        }

        let mut labels = Vec::with_capacity(self.labels.len() + 1);
        labels.push(Label::try_from(b"*".as_slice()).ok()?);
        labels.extend(self.labels.iter().cloned());
        Some(Self::from_label_slice(&labels))
    }

    /// Wire form rebuilt from the lowercased labels.  TSIG and NSEC3
    /// digest the canonical form, not the case the client sent.
    pub fn canonical_octets(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.octets.len());
        for label in &self.labels {
            // lengths were checked at construction
            #[allow(clippy::cast_possible_truncation)]
            out.push(label.len() as u8);
            out.extend_from_slice(label);
        }
        out
    }

    pub fn to_dotted_string(&self) -> String {
        if self.is_root() {
            return ".".to_string();
        }

        let mut out = String::with_capacity(self.octets.len());
        for label in &self.labels {
            for octet in label.iter() {
                out.push(*octet as char);
            }
            if !label.is_empty() {
                out.push('.');
            }
        }

        out
    }

    pub fn from_relative_dotted_string(origin: &Self, s: &str) -> Option<Self> {
        if s.is_empty() || s == "@" {
            Some(origin.clone())
        } else if s.ends_with('.') {
            Self::from_dotted_string(s)
        } else {
            let suffix = origin.to_dotted_string();
            if suffix.starts_with('.') {
                Self::from_dotted_string(&format!("{s}{suffix}"))
            } else {
                Self::from_dotted_string(&format!("{s}.{suffix}"))
            }
        }
    }

    pub fn from_dotted_string(s: &str) -> Option<Self> {
        if s == "." {
            return Some(Self::root_domain());
        }

        let chunks = s.split('.').collect::<Vec<_>>();
        let mut labels = Vec::with_capacity(chunks.len());

        for (i, label) in chunks.iter().enumerate() {
            if label.is_empty() && i != chunks.len() - 1 {
                return None;
            }

            labels.push(label.as_bytes().into());
        }

        if !s.ends_with('.') {
            labels.push(Vec::new());
        }

        Self::from_labels(labels)
    }

    pub fn from_labels(mixed_case_labels: Vec<Vec<u8>>) -> Option<Self> {
        if mixed_case_labels.is_empty() || mixed_case_labels.len() > DOMAINNAME_MAX_LABELS {
            return None;
        }

        let mut labels = Vec::<Label>::with_capacity(mixed_case_labels.len());
        let mut octets = Vec::<u8>::with_capacity(DOMAINNAME_MAX_LEN);
        let mut blank_label = false;

        for mc_label in &mixed_case_labels {
            if blank_label {
                return None;
            }

            blank_label = mc_label.is_empty();

            if mc_label.iter().any(|o| !o.is_ascii()) {
                return None;
            }

            match Label::try_from(mc_label.as_slice()) {
                Ok(label) => {
                    #[allow(clippy::cast_possible_truncation)]
                    octets.push(mc_label.len() as u8);
                    octets.extend_from_slice(&label);
                    labels.push(label);
                }
                Err(LabelTooLong) => return None,
            }
        }

        if blank_label && octets.len() <= DOMAINNAME_MAX_LEN {
            Some(Self { octets, labels })
        } else {
            None
        }
    }

    /// Build from already-validated labels.  Internal: every caller
    /// starts from labels which came out of an existing name.
    fn from_label_slice(labels: &[Label]) -> Self {
        let mut octets = Vec::with_capacity(DOMAINNAME_MAX_LEN);
        for label in labels {
            #[allow(clippy::cast_possible_truncation)]
            octets.push(label.len() as u8);
            octets.extend_from_slice(label);
        }

        Self {
            octets,
            labels: labels.to_vec(),
        }
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainName")
            .field("to_dotted_string()", &self.to_dotted_string())
            .finish()
    }
}

/// Query types are a superset of record types.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum QueryType {
    Record(RecordType),
    Ixfr,
    Axfr,
    Any,
}

impl From<u16> for QueryType {
    fn from(value: u16) -> Self {
        match value {
            251 => QueryType::Ixfr,
            252 => QueryType::Axfr,
            255 => QueryType::Any,
            _ => QueryType::Record(RecordType::from(value)),
        }
    }
}

impl From<QueryType> for u16 {
    fn from(value: QueryType) -> Self {
        match value {
            QueryType::Ixfr => 251,
            QueryType::Axfr => 252,
            QueryType::Any => 255,
            QueryType::Record(rtype) => rtype.into(),
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryType::Ixfr => write!(f, "IXFR"),
            QueryType::Axfr => write!(f, "AXFR"),
            QueryType::Any => write!(f, "ANY"),
            QueryType::Record(rtype) => rtype.fmt(f),
        }
    }
}

/// Record classes.  Dynamic updates (RFC 2136) give NONE and ANY
/// meaning inside resource records, so they are first-class here
/// rather than hidden behind a separate query-class type.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordClass {
    IN,
    CH,
    None,
    Any,
    Unknown(RecordClassUnknown),
}

/// A struct with a private constructor, to ensure invalid
/// `RecordClass`es cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordClassUnknown(u16);

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordClass::IN,
            3 => RecordClass::CH,
            254 => RecordClass::None,
            255 => RecordClass::Any,
            _ => RecordClass::Unknown(RecordClassUnknown(value)),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(value: RecordClass) -> Self {
        match value {
            RecordClass::IN => 1,
            RecordClass::CH => 3,
            RecordClass::None => 254,
            RecordClass::Any => 255,
            RecordClass::Unknown(RecordClassUnknown(value)) => value,
        }
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordClass::IN => write!(f, "IN"),
            RecordClass::CH => write!(f, "CH"),
            RecordClass::None => write!(f, "NONE"),
            RecordClass::Any => write!(f, "ANY"),
            RecordClass::Unknown(RecordClassUnknown(n)) => write!(f, "{n}"),
        }
    }
}

/// Record types are used by resource records and by queries.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    DS,
    RRSIG,
    NSEC,
    NSEC3,
    NSEC3PARAM,
    Opt,
    Tsig,
    Unknown(RecordTypeUnknown),
}

/// A struct with a private constructor, to ensure invalid `RecordType`s
/// cannot be created.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordTypeUnknown(u16);

impl RecordType {
    /// Types of which a node holds at most one record: adding another
    /// replaces the existing one.
    pub fn is_singleton(&self) -> bool {
        matches!(
            self,
            RecordType::CNAME | RecordType::SOA | RecordType::NSEC3PARAM
        )
    }

    /// Types which may share a node with a CNAME.
    pub fn can_coexist_with_cname(&self) -> bool {
        matches!(
            self,
            RecordType::CNAME | RecordType::RRSIG | RecordType::NSEC | RecordType::NSEC3
        )
    }

    /// Types a dynamic update may not touch: the denial chain and its
    /// signatures are the server's own business.
    pub fn is_update_forbidden(&self) -> bool {
        matches!(
            self,
            RecordType::RRSIG
                | RecordType::NSEC
                | RecordType::NSEC3
                | RecordType::Opt
                | RecordType::Tsig
        )
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::PTR => write!(f, "PTR"),
            RecordType::MX => write!(f, "MX"),
            RecordType::TXT => write!(f, "TXT"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::SRV => write!(f, "SRV"),
            RecordType::DS => write!(f, "DS"),
            RecordType::RRSIG => write!(f, "RRSIG"),
            RecordType::NSEC => write!(f, "NSEC"),
            RecordType::NSEC3 => write!(f, "NSEC3"),
            RecordType::NSEC3PARAM => write!(f, "NSEC3PARAM"),
            RecordType::Opt => write!(f, "OPT"),
            RecordType::Tsig => write!(f, "TSIG"),
            RecordType::Unknown(RecordTypeUnknown(n)) => write!(f, "{n}"),
        }
    }
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            33 => RecordType::SRV,
            41 => RecordType::Opt,
            43 => RecordType::DS,
            46 => RecordType::RRSIG,
            47 => RecordType::NSEC,
            50 => RecordType::NSEC3,
            51 => RecordType::NSEC3PARAM,
            250 => RecordType::Tsig,
            _ => RecordType::Unknown(RecordTypeUnknown(value)),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::Opt => 41,
            RecordType::DS => 43,
            RecordType::RRSIG => 46,
            RecordType::NSEC => 47,
            RecordType::NSEC3 => 50,
            RecordType::NSEC3PARAM => 51,
            RecordType::Tsig => 250,
            RecordType::Unknown(RecordTypeUnknown(value)) => value,
        }
    }
}

/// The EDNS(0) negotiation carried by an OPT pseudo-record (RFC
/// 6891).  The OPT owner must be the root and at most one may appear,
/// in the additional section only.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Edns {
    /// The requestor's maximum payload size, from the CLASS field.
    pub payload_size: u16,

    /// High bits of a 12-bit RCODE, from the top octet of the TTL
    /// field.
    pub extended_rcode: u8,

    /// EDNS version.  Only version 0 is understood; anything else
    /// gets BADVERS.
    pub version: u8,

    /// The DO bit: the client wants DNSSEC records.
    pub dnssec_ok: bool,

    /// Variable part of the RDATA.
    pub options: Vec<EdnsOption>,
}

impl Edns {
    /// An OPT to attach to a response: payload size from
    /// configuration, everything else zero.
    pub fn response(payload_size: u16, dnssec_ok: bool) -> Self {
        Self {
            payload_size,
            extended_rcode: 0,
            version: 0,
            dnssec_ok,
            options: Vec::new(),
        }
    }
}

/// A single EDNS option: (code, length, data) on the wire.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum EdnsOption {
    /// Name server identifier, RFC 5001.
    Nsid { octets: Vec<u8> },

    /// Anything else, preserved as-is.
    Unknown { code: u16, octets: Vec<u8> },
}

impl EdnsOption {
    pub fn code(&self) -> u16 {
        match self {
            EdnsOption::Nsid { .. } => 3,
            EdnsOption::Unknown { code, .. } => *code,
        }
    }
}

/// The RDATA of a TSIG pseudo-record (RFC 2845).  A TSIG is always
/// the last record of the additional section and at most one may
/// appear.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Tsig {
    /// The owner of the TSIG RR: the name of the shared key.
    pub key_name: DomainName,

    /// Algorithm identifier in domain-name form, e.g.
    /// `hmac-sha256.`.
    pub algorithm: DomainName,

    /// Seconds since the epoch, 48 bits on the wire.
    pub time_signed: u64,

    /// Permitted clock skew either side of `time_signed`, in seconds.
    pub fudge: u16,

    /// The MAC itself.
    pub mac: Vec<u8>,

    /// The message ID before any forwarder rewrote it.
    pub original_id: u16,

    /// TSIG-level error code.
    pub error: TsigRcode,

    /// On BADTIME, the server's clock; otherwise empty.
    pub other: Vec<u8>,
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for DomainName {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let num_labels = u.int_in_range::<usize>(0..=10)?;
        let mut octets = Vec::new();
        let mut labels = Vec::new();
        for _ in 0..num_labels {
            let label_len = u.int_in_range::<u8>(1..=20)?;
            let mut label = Vec::new();
            octets.push(label_len);
            let bs = u.bytes(label_len.into())?;
            for b in bs {
                let ascii_byte = if b.is_ascii() { *b } else { *b % 128 };
                let octet = if ascii_byte == b'.'
                    || ascii_byte == b'*'
                    || ascii_byte == b'@'
                    || ascii_byte == b'#'
                    || (ascii_byte as char).is_whitespace()
                {
                    b'x'
                } else {
                    ascii_byte.to_ascii_lowercase()
                };
                label.push(octet);
                octets.push(octet);
            }
            labels.push(Label(label));
        }
        octets.push(0);
        labels.push(Label::new());
        Ok(Self { octets, labels })
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Opcode {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u8>()?))
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for QueryType {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u16>()?))
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for RecordType {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u16>()?))
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for RecordClass {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u16>()?))
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for RecordTypeWithData {
    // this is pretty verbose but it feels like a better way to
    // guarantee the max size of the `Vec<u8>`s than adding a wrapper
    // type
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let len = u.int_in_range(0..=128)?;
        let octets = Vec::from(u.bytes(len)?);

        let rtype_with_data = match u.arbitrary::<RecordType>()? {
            RecordType::A => RecordTypeWithData::A {
                address: u.arbitrary()?,
            },
            RecordType::NS => RecordTypeWithData::NS {
                nsdname: u.arbitrary()?,
            },
            RecordType::CNAME => RecordTypeWithData::CNAME {
                cname: u.arbitrary()?,
            },
            RecordType::SOA => RecordTypeWithData::SOA {
                mname: u.arbitrary()?,
                rname: u.arbitrary()?,
                serial: u.arbitrary()?,
                refresh: u.arbitrary()?,
                retry: u.arbitrary()?,
                expire: u.arbitrary()?,
                minimum: u.arbitrary()?,
            },
            RecordType::PTR => RecordTypeWithData::PTR {
                ptrdname: u.arbitrary()?,
            },
            RecordType::MX => RecordTypeWithData::MX {
                preference: u.arbitrary()?,
                exchange: u.arbitrary()?,
            },
            RecordType::TXT => RecordTypeWithData::TXT { octets },
            RecordType::AAAA => RecordTypeWithData::AAAA {
                address: u.arbitrary()?,
            },
            RecordType::SRV => RecordTypeWithData::SRV {
                priority: u.arbitrary()?,
                weight: u.arbitrary()?,
                port: u.arbitrary()?,
                target: u.arbitrary()?,
            },
            RecordType::DS => RecordTypeWithData::DS {
                key_tag: u.arbitrary()?,
                algorithm: u.arbitrary()?,
                digest_type: u.arbitrary()?,
                digest: octets,
            },
            RecordType::RRSIG => RecordTypeWithData::RRSIG {
                type_covered: u.arbitrary()?,
                algorithm: u.arbitrary()?,
                labels: u.arbitrary()?,
                original_ttl: u.arbitrary()?,
                expiration: u.arbitrary()?,
                inception: u.arbitrary()?,
                key_tag: u.arbitrary()?,
                signer: u.arbitrary()?,
                signature: octets,
            },
            RecordType::NSEC => RecordTypeWithData::NSEC {
                next: u.arbitrary()?,
                type_bitmap: octets,
            },
            RecordType::NSEC3 => {
                let hash_algorithm = u.arbitrary()?;
                let flags = u.arbitrary()?;
                let iterations = u.arbitrary()?;
                let salt_len = u.int_in_range(0..=8)?;
                let salt = Vec::from(u.bytes(salt_len)?);
                let next_hashed_len = u.int_in_range(1..=20)?;
                let next_hashed = Vec::from(u.bytes(next_hashed_len)?);
                RecordTypeWithData::NSEC3 {
                    hash_algorithm,
                    flags,
                    iterations,
                    salt,
                    next_hashed,
                    type_bitmap: octets,
                }
            }
            RecordType::NSEC3PARAM => {
                let hash_algorithm = u.arbitrary()?;
                let flags = u.arbitrary()?;
                let iterations = u.arbitrary()?;
                let salt_len = u.int_in_range(0..=8)?;
                let salt = Vec::from(u.bytes(salt_len)?);
                RecordTypeWithData::NSEC3PARAM {
                    hash_algorithm,
                    flags,
                    iterations,
                    salt,
                }
            }
            RecordType::Opt | RecordType::Tsig => RecordTypeWithData::A {
                address: u.arbitrary()?,
            },
            RecordType::Unknown(tag) => RecordTypeWithData::Unknown { tag, octets },
        };
        Ok(rtype_with_data)
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for ResourceRecord {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self {
            name: u.arbitrary()?,
            rtype_with_data: u.arbitrary()?,
            rclass: RecordClass::IN,
            ttl: u.arbitrary()?,
        })
    }
}


#[cfg(any(feature = "test-util", test))]
pub mod test_util {
    use super::*;

    use arbitrary::{Arbitrary, Unstructured};
    use rand::RngCore;

    pub fn arbitrary_resourcerecord() -> ResourceRecord {
        let mut rng = rand::thread_rng();
        for size in [128, 256, 512, 1024, 2048, 4096] {
            let mut buf = vec![0u8; size];
            rng.fill_bytes(&mut buf);

            if let Ok(rr) = ResourceRecord::arbitrary(&mut Unstructured::new(&buf)) {
                return rr;
            }
        }

        panic!("could not generate arbitrary value!");
    }

    pub fn domain(name: &str) -> DomainName {
        DomainName::from_dotted_string(name).unwrap()
    }

    pub fn a_record(name: &str, address: Ipv4Addr) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::A { address },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn aaaa_record(name: &str, address: Ipv6Addr) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::AAAA { address },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn cname_record(name: &str, target_name: &str) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::CNAME {
                cname: domain(target_name),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn ns_record(superdomain_name: &str, nameserver_name: &str) -> ResourceRecord {
        ResourceRecord {
            name: domain(superdomain_name),
            rtype_with_data: RecordTypeWithData::NS {
                nsdname: domain(nameserver_name),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn mx_record(name: &str, preference: u16, exchange_name: &str) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::MX {
                preference,
                exchange: domain(exchange_name),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn txt_record(name: &str, octets: &[u8]) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::TXT {
                octets: octets.into(),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn soa_record(name: &str, serial: u32) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::SOA {
                mname: domain("ns1.example.com."),
                rname: domain("hostmaster.example.com."),
                serial,
                refresh: 10800,
                retry: 3600,
                expire: 604_800,
                minimum: 300,
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }

    pub fn unknown_record(name: &str, octets: &[u8]) -> ResourceRecord {
        ResourceRecord {
            name: domain(name),
            rtype_with_data: RecordTypeWithData::Unknown {
                tag: RecordTypeUnknown(100),
                octets: octets.into(),
            },
            rclass: RecordClass::IN,
            ttl: 300,
        }
    }
}
