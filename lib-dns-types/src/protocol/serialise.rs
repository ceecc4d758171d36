//! Serialisation of DNS messages to the wire format.  See the `types`
//! module for details of the format.

use std::collections::HashMap;

use crate::protocol::types::*;

/// Offsets above this cannot be the target of a compression pointer:
/// the pointer format only has 14 bits.
const COMPRESSION_LIMIT: usize = 0x4000;

/// The result of serialising a message under a size cap.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Serialised {
    pub octets: Vec<u8>,
    /// True if the answer section (or the question) did not fit and
    /// TC was set.  Dropped authority and additional records do not
    /// set this.
    pub truncated: bool,
}

impl Message {
    /// Serialise with no meaningful size limit (the 64KiB cap of the
    /// TCP length prefix still applies).
    ///
    /// # Errors
    ///
    /// If the message is invalid (the `Message` type permits more
    /// states than strictly allowed).
    pub fn to_octets(&self) -> Result<Vec<u8>, Error> {
        Ok(self.serialise(MESSAGE_MAX_LEN, 0)?.octets)
    }

    /// Serialise under a size cap.
    ///
    /// The header goes first, then the sections in order, with the
    /// section counts patched in as each section closes.  `reserve`
    /// octets are held back for a TSIG record to be appended by the
    /// caller (see `append_tsig`), and room for the OPT record is
    /// held back automatically.
    ///
    /// A record which does not fit is rolled back to the previous
    /// record boundary.  An overflowing answer (or question) sets TC
    /// and abandons the rest of the message; overflowing authority or
    /// additional records are silently dropped, trailing records
    /// first, which is how a response sheds optional data under a
    /// small UDP cap.
    ///
    /// # Errors
    ///
    /// If the message is invalid (the `Message` type permits more
    /// states than strictly allowed).
    pub fn serialise(&self, max_size: usize, reserve: usize) -> Result<Serialised, Error> {
        let opt_len = self.edns.as_ref().map_or(0, Edns::wire_len);
        let mut buffer = WritableBuffer::new(max_size, reserve + opt_len);

        let mut header = self.header;
        header.is_truncated = false;

        header.serialise(&mut buffer);
        // counts are patched below, once known
        for _ in 0..4 {
            buffer.write_u16(0);
        }

        let mut qdcount: u16 = 0;
        for question in &self.questions {
            let checkpoint = buffer.checkpoint();
            question.serialise(&mut buffer);
            if buffer.over_limit() {
                buffer.rollback(checkpoint);
                header.is_truncated = true;
                break;
            }
            qdcount += 1;
        }
        buffer.patch_u16(4, qdcount);

        let mut ancount: u16 = 0;
        if !header.is_truncated {
            for rr in &self.answers {
                let checkpoint = buffer.checkpoint();
                rr.serialise(&mut buffer)?;
                if buffer.over_limit() {
                    buffer.rollback(checkpoint);
                    header.is_truncated = true;
                    break;
                }
                ancount += 1;
            }
        }
        buffer.patch_u16(6, ancount);

        let mut nscount: u16 = 0;
        if !header.is_truncated {
            for rr in &self.authority {
                let checkpoint = buffer.checkpoint();
                rr.serialise(&mut buffer)?;
                if buffer.over_limit() {
                    buffer.rollback(checkpoint);
                    break;
                }
                nscount += 1;
            }
        }
        buffer.patch_u16(8, nscount);

        let mut arcount: u16 = 0;
        if !header.is_truncated {
            for rr in &self.additional {
                let checkpoint = buffer.checkpoint();
                rr.serialise(&mut buffer)?;
                if buffer.over_limit() {
                    buffer.rollback(checkpoint);
                    break;
                }
                arcount += 1;
            }
        }

        if let Some(edns) = &self.edns {
            buffer.release(opt_len);
            edns.serialise(header.rcode, &mut buffer);
            arcount += 1;
        }
        buffer.patch_u16(10, arcount);

        // the header went out with TC clear; rewrite it if anything
        // was cut
        if header.is_truncated {
            buffer.octets[2] |= HEADER_MASK_TC;
        }

        Ok(Serialised {
            octets: buffer.octets,
            truncated: header.is_truncated,
        })
    }
}

/// Append a TSIG record to an already-serialised message, bumping
/// ARCOUNT.  The MAC is computed by the caller over the octets as
/// they stand.
///
/// # Errors
///
/// If the RDATA is too long.
pub fn append_tsig(octets: &mut Vec<u8>, tsig: &Tsig) -> Result<(), Error> {
    let mut buffer = WritableBuffer::new(MESSAGE_MAX_LEN, 0);
    std::mem::swap(&mut buffer.octets, octets);

    let arcount = u16::from_be_bytes([buffer.octets[10], buffer.octets[11]]);

    // the key name and algorithm are never compressed (RFC 2845
    // section 2.3)
    buffer.write_octets(&tsig.key_name.octets);
    buffer.write_u16(RecordType::Tsig.into());
    buffer.write_u16(RecordClass::Any.into());
    buffer.write_u32(0);

    let rdlength_index = buffer.index();
    buffer.write_u16(0);

    buffer.write_octets(&tsig.algorithm.octets);
    buffer.write_u48(tsig.time_signed);
    buffer.write_u16(tsig.fudge);
    buffer.write_u16(usize_to_u16(tsig.mac.len())?);
    buffer.write_octets(&tsig.mac);
    buffer.write_u16(tsig.original_id);
    buffer.write_u16(tsig.error.into());
    buffer.write_u16(usize_to_u16(tsig.other.len())?);
    buffer.write_octets(&tsig.other);

    let rdlength = usize_to_u16(buffer.index() - rdlength_index - 2)?;
    buffer.patch_u16(rdlength_index, rdlength);
    buffer.patch_u16(10, arcount + 1);

    std::mem::swap(&mut buffer.octets, octets);
    Ok(())
}

impl Header {
    pub fn serialise(self, buffer: &mut WritableBuffer) {
        // octet 1
        let flag_qr = if self.is_response { HEADER_MASK_QR } else { 0 };
        let field_opcode = HEADER_MASK_OPCODE & (u8::from(self.opcode) << HEADER_OFFSET_OPCODE);
        let flag_aa = if self.is_authoritative {
            HEADER_MASK_AA
        } else {
            0
        };
        let flag_tc = if self.is_truncated { HEADER_MASK_TC } else { 0 };
        let flag_rd = if self.recursion_desired {
            HEADER_MASK_RD
        } else {
            0
        };
        // octet 2
        let flag_ra = if self.recursion_available {
            HEADER_MASK_RA
        } else {
            0
        };
        let flag_ad = if self.authentic_data {
            HEADER_MASK_AD
        } else {
            0
        };
        let flag_cd = if self.checking_disabled {
            HEADER_MASK_CD
        } else {
            0
        };
        let field_rcode = HEADER_MASK_RCODE & self.rcode.header_bits();

        buffer.write_u16(self.id);
        buffer.write_u8(flag_qr | field_opcode | flag_aa | flag_tc | flag_rd);
        buffer.write_u8(flag_ra | flag_ad | flag_cd | field_rcode);
    }
}

impl Question {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        self.name.serialise(buffer);
        buffer.write_u16(u16::from(self.qtype));
        buffer.write_u16(u16::from(self.qclass));
    }
}

impl ResourceRecord {
    /// # Errors
    ///
    /// If the RDATA is too long.
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), Error> {
        self.name.serialise(buffer);
        buffer.write_u16(u16::from(self.rtype_with_data.rtype()));
        buffer.write_u16(u16::from(self.rclass));
        buffer.write_u32(self.ttl);

        // filled in below
        let rdlength_index = buffer.index();
        buffer.write_u16(0);

        // Names in RDATA are compressed only where the type's
        // original definition allows it: the RFC 1035 types.  Later
        // types (SRV, the DNSSEC family) transmit their names
        // verbatim, per RFC 3597 section 4.
        match &self.rtype_with_data {
            RecordTypeWithData::A { address } => buffer.write_octets(&address.octets()),
            RecordTypeWithData::NS { nsdname } => nsdname.serialise(buffer),
            RecordTypeWithData::CNAME { cname } => cname.serialise(buffer),
            RecordTypeWithData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                mname.serialise(buffer);
                rname.serialise(buffer);
                buffer.write_u32(*serial);
                buffer.write_u32(*refresh);
                buffer.write_u32(*retry);
                buffer.write_u32(*expire);
                buffer.write_u32(*minimum);
            }
            RecordTypeWithData::PTR { ptrdname } => ptrdname.serialise(buffer),
            RecordTypeWithData::MX {
                preference,
                exchange,
            } => {
                buffer.write_u16(*preference);
                exchange.serialise(buffer);
            }
            RecordTypeWithData::TXT { octets } => buffer.write_octets(octets),
            RecordTypeWithData::AAAA { address } => buffer.write_octets(&address.octets()),
            RecordTypeWithData::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                buffer.write_u16(*priority);
                buffer.write_u16(*weight);
                buffer.write_u16(*port);
                buffer.write_octets(&target.octets);
            }
            RecordTypeWithData::DS {
                key_tag,
                algorithm,
                digest_type,
                digest,
            } => {
                buffer.write_u16(*key_tag);
                buffer.write_u8(*algorithm);
                buffer.write_u8(*digest_type);
                buffer.write_octets(digest);
            }
            RecordTypeWithData::RRSIG {
                type_covered,
                algorithm,
                labels,
                original_ttl,
                expiration,
                inception,
                key_tag,
                signer,
                signature,
            } => {
                buffer.write_u16(u16::from(*type_covered));
                buffer.write_u8(*algorithm);
                buffer.write_u8(*labels);
                buffer.write_u32(*original_ttl);
                buffer.write_u32(*expiration);
                buffer.write_u32(*inception);
                buffer.write_u16(*key_tag);
                buffer.write_octets(&signer.octets);
                buffer.write_octets(signature);
            }
            RecordTypeWithData::NSEC { next, type_bitmap } => {
                buffer.write_octets(&next.octets);
                buffer.write_octets(type_bitmap);
            }
            RecordTypeWithData::NSEC3 {
                hash_algorithm,
                flags,
                iterations,
                salt,
                next_hashed,
                type_bitmap,
            } => {
                buffer.write_u8(*hash_algorithm);
                buffer.write_u8(*flags);
                buffer.write_u16(*iterations);
                buffer.write_u8(usize_to_u8(salt.len())?);
                buffer.write_octets(salt);
                buffer.write_u8(usize_to_u8(next_hashed.len())?);
                buffer.write_octets(next_hashed);
                buffer.write_octets(type_bitmap);
            }
            RecordTypeWithData::NSEC3PARAM {
                hash_algorithm,
                flags,
                iterations,
                salt,
            } => {
                buffer.write_u8(*hash_algorithm);
                buffer.write_u8(*flags);
                buffer.write_u16(*iterations);
                buffer.write_u8(usize_to_u8(salt.len())?);
                buffer.write_octets(salt);
            }
            RecordTypeWithData::Empty { .. } => (),
            RecordTypeWithData::Unknown { octets, .. } => buffer.write_octets(octets),
        };

        // -2 so we don't also include the 2 octets for the rdlength
        let rdlength = usize_to_u16(buffer.index() - rdlength_index - 2)?;
        buffer.patch_u16(rdlength_index, rdlength);

        Ok(())
    }
}

impl Edns {
    /// OPT on the wire: root owner, type 41, the payload size in the
    /// class field, extended RCODE + version + flags in the TTL
    /// field.
    pub fn serialise(&self, rcode: Rcode, buffer: &mut WritableBuffer) {
        buffer.write_u8(0);
        buffer.write_u16(RecordType::Opt.into());
        buffer.write_u16(self.payload_size);
        buffer.write_u8(rcode.extended_bits());
        buffer.write_u8(self.version);
        buffer.write_u16(if self.dnssec_ok { 0x8000 } else { 0 });

        let mut rdlength = 0;
        for option in &self.options {
            rdlength += 4 + option_octets(option).len();
        }
        #[allow(clippy::cast_possible_truncation)]
        buffer.write_u16(rdlength as u16);

        for option in &self.options {
            let octets = option_octets(option);
            buffer.write_u16(option.code());
            #[allow(clippy::cast_possible_truncation)]
            buffer.write_u16(octets.len() as u16);
            buffer.write_octets(octets);
        }
    }

    /// Size of the serialised OPT record.
    pub fn wire_len(&self) -> usize {
        11 + self
            .options
            .iter()
            .map(|o| 4 + option_octets(o).len())
            .sum::<usize>()
    }
}

fn option_octets(option: &EdnsOption) -> &[u8] {
    match option {
        EdnsOption::Nsid { octets } | EdnsOption::Unknown { octets, .. } => octets,
    }
}

impl DomainName {
    /// Write a name, compressing against earlier occurrences.  The
    /// longest already-written suffix is replaced with a pointer;
    /// every suffix which starts below the 14-bit pointer range is
    /// remembered for later names.  Matching is case-insensitive but
    /// the octets written keep this name's case.
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        let mut boundaries = Vec::with_capacity(self.labels.len());
        let mut start = 0;
        for label in &self.labels {
            boundaries.push(start);
            start += 1 + label.len();
        }

        let name_start = buffer.index();

        for i in 0..self.labels.len() {
            if self.labels[i].is_empty() {
                break;
            }

            let key = suffix_key(&self.labels[i..]);
            if let Some(&offset) = buffer.names.get(&key) {
                buffer.write_octets(&self.octets[..boundaries[i]]);
                buffer.write_u16(0b1100_0000_0000_0000 | offset);
                // a name starting at any of the written labels is
                // itself a complete encoding, so those suffixes are
                // fair pointer targets too
                self.record_suffixes(buffer, &boundaries[..i], name_start);
                return;
            }
        }

        buffer.write_octets(&self.octets);
        self.record_suffixes(buffer, &boundaries[..self.labels.len() - 1], name_start);
    }

    /// Remember where each just-written suffix landed.  `boundaries`
    /// holds the offset of each recordable label relative to
    /// `name_start`.
    fn record_suffixes(&self, buffer: &mut WritableBuffer, boundaries: &[usize], name_start: usize) {
        for (i, boundary) in boundaries.iter().enumerate() {
            let offset = name_start + boundary;
            if offset >= COMPRESSION_LIMIT {
                break;
            }

            let key = suffix_key(&self.labels[i..]);
            #[allow(clippy::cast_possible_truncation)]
            buffer.names.entry(key).or_insert(offset as u16);
        }
    }
}

/// Case-insensitive key for the compression table.
fn suffix_key(labels: &[Label]) -> Vec<u8> {
    let mut key = Vec::with_capacity(DOMAINNAME_MAX_LEN);
    for label in labels {
        #[allow(clippy::cast_possible_truncation)]
        key.push(label.len() as u8);
        key.extend_from_slice(label);
    }
    key
}

/// Errors encountered when serialising a message.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// A counter does not fit in the desired width.
    CounterTooLarge { counter: usize, bits: u32 },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CounterTooLarge { counter, bits } => {
                write!(f, "'{counter}' cannot be converted to a u{bits}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// A buffer which can be written to, for serialisation purposes.
/// Tracks a size limit, a reservation for records which must fit no
/// matter what, and the compression table.
pub struct WritableBuffer {
    pub octets: Vec<u8>,
    limit: usize,
    reserved: usize,
    names: HashMap<Vec<u8>, u16>,
}

impl Default for WritableBuffer {
    fn default() -> Self {
        Self::new(MESSAGE_MAX_LEN, 0)
    }
}

impl WritableBuffer {
    pub fn new(limit: usize, reserved: usize) -> Self {
        Self {
            octets: Vec::with_capacity(512),
            limit,
            reserved,
            names: HashMap::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.octets.len()
    }

    /// True once more has been written than the limit (minus any
    /// reservation) allows.
    pub fn over_limit(&self) -> bool {
        self.octets.len() + self.reserved > self.limit
    }

    /// Give back reserved room, making it writable again.
    pub fn release(&mut self, count: usize) {
        self.reserved = self.reserved.saturating_sub(count);
    }

    pub fn checkpoint(&self) -> usize {
        self.octets.len()
    }

    /// Undo every write (and compression table entry) since the
    /// checkpoint.
    pub fn rollback(&mut self, checkpoint: usize) {
        self.octets.truncate(checkpoint);
        let limit = u16::try_from(checkpoint).unwrap_or(u16::MAX);
        self.names.retain(|_, offset| *offset < limit);
    }

    pub fn write_u8(&mut self, octet: u8) {
        self.octets.push(octet);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.octets.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.octets.extend_from_slice(&value.to_be_bytes());
    }

    /// Write the low 48 bits, big-endian: the width of the TSIG
    /// time-signed field.
    pub fn write_u48(&mut self, value: u64) {
        self.octets.extend_from_slice(&value.to_be_bytes()[2..]);
    }

    pub fn write_octets(&mut self, octets: &[u8]) {
        self.octets.extend_from_slice(octets);
    }

    pub fn patch_u16(&mut self, index: usize, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.octets[index] = hi;
        self.octets[index + 1] = lo;
    }
}

/// Helper function to convert a `usize` into a `u16` (or return an error).
fn usize_to_u16(counter: usize) -> Result<u16, Error> {
    if let Ok(t) = u16::try_from(counter) {
        Ok(t)
    } else {
        Err(Error::CounterTooLarge {
            counter,
            bits: u16::BITS,
        })
    }
}

/// Helper function to convert a `usize` into a `u8` (or return an error).
fn usize_to_u8(counter: usize) -> Result<u8, Error> {
    if let Ok(t) = u8::try_from(counter) {
        Ok(t)
    } else {
        Err(Error::CounterTooLarge {
            counter,
            bits: u8::BITS,
        })
    }
}
