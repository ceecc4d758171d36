//! Deserialisation of DNS messages from the network.  See the `types`
//! module for details of the format.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::protocol::types::*;

/// A message plus the wire-level facts which do not survive into the
/// `Message` structure but which transaction signing needs: where the
/// TSIG record began, so the signed prefix of the original octets can
/// be reconstructed exactly.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParsedMessage {
    pub message: Message,
    pub tsig_offset: Option<usize>,
}

impl Message {
    /// # Errors
    ///
    /// If the message cannot be parsed.
    pub fn from_octets(octets: &[u8]) -> Result<Self, Error> {
        Ok(Self::parse(octets)?.message)
    }

    /// Like `from_octets`, but also reports the offset of the TSIG
    /// record in the original octets.
    ///
    /// # Errors
    ///
    /// If the message cannot be parsed.
    pub fn parse(octets: &[u8]) -> Result<ParsedMessage, Error> {
        let mut buffer = ConsumableBuffer::new(octets);

        let wire_header = WireHeader::deserialise(&mut buffer)?;
        let id = wire_header.header.id;
        let mut questions = Vec::with_capacity(wire_header.qdcount.into());
        let mut answers = Vec::with_capacity(wire_header.ancount.into());
        let mut authority = Vec::with_capacity(wire_header.nscount.into());
        let mut additional = Vec::new();
        let mut edns = None;
        let mut tsig = None;
        let mut tsig_offset = None;

        for _ in 0..wire_header.qdcount {
            questions.push(Question::deserialise(id, &mut buffer)?);
        }
        for _ in 0..wire_header.ancount {
            answers.push(ResourceRecord::deserialise(id, &mut buffer)?);
        }
        for _ in 0..wire_header.nscount {
            authority.push(ResourceRecord::deserialise(id, &mut buffer)?);
        }

        // The additional section is special: it is where the OPT and
        // TSIG pseudo-records live.  Only one of each is allowed, the
        // OPT must be owned by the root, and the TSIG must be the
        // very last record of the message.
        for _ in 0..wire_header.arcount {
            if tsig.is_some() {
                return Err(Error::TsigNotLast(id));
            }

            let rr_offset = buffer.position;
            let name = DomainName::deserialise(id, &mut buffer)?;
            let rtype = RecordType::deserialise(id, &mut buffer)?;
            match rtype {
                RecordType::Opt => {
                    if edns.is_some() {
                        return Err(Error::MultipleOpt(id));
                    }
                    if !name.is_root() {
                        return Err(Error::OptNotRoot(id));
                    }
                    edns = Some(Edns::deserialise_fields(id, &mut buffer)?);
                }
                RecordType::Tsig => {
                    tsig = Some(Tsig::deserialise_fields(id, name, &mut buffer)?);
                    tsig_offset = Some(rr_offset);
                }
                _ => additional.push(ResourceRecord::deserialise_body(
                    id,
                    name,
                    rtype,
                    &mut buffer,
                )?),
            }
        }

        let mut header = wire_header.header;
        if let Some(edns) = &edns {
            header.rcode = Rcode::from_parts(header.rcode.header_bits(), edns.extended_rcode);
        }

        Ok(ParsedMessage {
            message: Self {
                header,
                questions,
                answers,
                authority,
                additional,
                edns,
                tsig,
            },
            tsig_offset,
        })
    }
}

impl WireHeader {
    /// # Errors
    ///
    /// If the header is too short.
    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let id = buffer.next_u16().ok_or(Error::CompletelyBusted)?;
        let flags1 = buffer.next_u8().ok_or(Error::HeaderTooShort(id))?;
        let flags2 = buffer.next_u8().ok_or(Error::HeaderTooShort(id))?;
        let qdcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let ancount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let nscount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;
        let arcount = buffer.next_u16().ok_or(Error::HeaderTooShort(id))?;

        Ok(Self {
            header: Header {
                id,
                is_response: flags1 & HEADER_MASK_QR != 0,
                opcode: Opcode::from((flags1 & HEADER_MASK_OPCODE) >> HEADER_OFFSET_OPCODE),
                is_authoritative: flags1 & HEADER_MASK_AA != 0,
                is_truncated: flags1 & HEADER_MASK_TC != 0,
                recursion_desired: flags1 & HEADER_MASK_RD != 0,
                recursion_available: flags2 & HEADER_MASK_RA != 0,
                authentic_data: flags2 & HEADER_MASK_AD != 0,
                checking_disabled: flags2 & HEADER_MASK_CD != 0,
                rcode: Rcode::from(u16::from(flags2 & HEADER_MASK_RCODE)),
            },
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

impl Question {
    /// # Errors
    ///
    /// If the question cannot be parsed.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = DomainName::deserialise(id, buffer)?;
        let qtype = QueryType::deserialise(id, buffer)?;
        let qclass = RecordClass::deserialise(id, buffer)?;

        Ok(Self {
            name,
            qtype,
            qclass,
        })
    }
}

impl ResourceRecord {
    /// # Errors
    ///
    /// If the record cannot be parsed.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let name = DomainName::deserialise(id, buffer)?;
        let rtype = RecordType::deserialise(id, buffer)?;
        Self::deserialise_body(id, name, rtype, buffer)
    }

    /// Parse everything after the owner and type.  Embedded domain
    /// names are expanded here, so the record owns all its data and
    /// outlives the source buffer.
    pub fn deserialise_body(
        id: u16,
        name: DomainName,
        rtype: RecordType,
        buffer: &mut ConsumableBuffer,
    ) -> Result<Self, Error> {
        let rclass = RecordClass::deserialise(id, buffer)?;
        let ttl = buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?;
        let rdlength = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;

        let rdata_start = buffer.position;
        let rdata_end = rdata_start + rdlength as usize;

        let raw_rdata = |buffer: &mut ConsumableBuffer| {
            if let Some(octets) = buffer.take(rdlength as usize) {
                Ok(octets.to_vec())
            } else {
                Err(Error::ResourceRecordTooShort(id))
            }
        };

        // the tail of a record whose leading fields have already been
        // consumed
        let remaining_rdata = |buffer: &mut ConsumableBuffer| {
            if buffer.position > rdata_end {
                return Err(Error::ResourceRecordInvalid(id));
            }
            let len = rdata_end - buffer.position;
            if let Some(octets) = buffer.take(len) {
                Ok(octets.to_vec())
            } else {
                Err(Error::ResourceRecordTooShort(id))
            }
        };

        // Empty RDATA on a type which normally has fields is how
        // dynamic updates name an RRset without giving values.  The
        // types which legitimately allow zero-length values keep
        // their own representation.
        if rdlength == 0
            && !matches!(
                rtype,
                RecordType::TXT | RecordType::Unknown(_) | RecordType::Opt | RecordType::Tsig
            )
        {
            return Ok(Self {
                name,
                rtype_with_data: RecordTypeWithData::Empty { rtype },
                rclass,
                ttl,
            });
        }

        // for records which include domain names, deserialise them to
        // expand pointers.
        let rtype_with_data = match rtype {
            RecordType::A => RecordTypeWithData::A {
                address: Ipv4Addr::from(
                    buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?,
                ),
            },
            RecordType::NS => RecordTypeWithData::NS {
                nsdname: DomainName::deserialise(id, buffer)?,
            },
            RecordType::CNAME => RecordTypeWithData::CNAME {
                cname: DomainName::deserialise(id, buffer)?,
            },
            RecordType::SOA => RecordTypeWithData::SOA {
                mname: DomainName::deserialise(id, buffer)?,
                rname: DomainName::deserialise(id, buffer)?,
                serial: buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?,
                refresh: buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?,
                retry: buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?,
                expire: buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?,
                minimum: buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?,
            },
            RecordType::PTR => RecordTypeWithData::PTR {
                ptrdname: DomainName::deserialise(id, buffer)?,
            },
            RecordType::MX => RecordTypeWithData::MX {
                preference: buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?,
                exchange: DomainName::deserialise(id, buffer)?,
            },
            RecordType::TXT => RecordTypeWithData::TXT {
                octets: raw_rdata(buffer)?,
            },
            RecordType::AAAA => {
                let Some(octets) = buffer.take(16) else {
                    return Err(Error::ResourceRecordTooShort(id));
                };
                // safe because take returned exactly 16 octets
                let array: [u8; 16] = octets.try_into().unwrap();
                RecordTypeWithData::AAAA {
                    address: Ipv6Addr::from(array),
                }
            }
            RecordType::SRV => RecordTypeWithData::SRV {
                priority: buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?,
                weight: buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?,
                port: buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?,
                target: DomainName::deserialise(id, buffer)?,
            },
            RecordType::DS => RecordTypeWithData::DS {
                key_tag: buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?,
                algorithm: buffer.next_u8().ok_or(Error::ResourceRecordTooShort(id))?,
                digest_type: buffer.next_u8().ok_or(Error::ResourceRecordTooShort(id))?,
                digest: remaining_rdata(buffer)?,
            },
            RecordType::RRSIG => RecordTypeWithData::RRSIG {
                type_covered: RecordType::deserialise(id, buffer)?,
                algorithm: buffer.next_u8().ok_or(Error::ResourceRecordTooShort(id))?,
                labels: buffer.next_u8().ok_or(Error::ResourceRecordTooShort(id))?,
                original_ttl: buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?,
                expiration: buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?,
                inception: buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?,
                key_tag: buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?,
                signer: DomainName::deserialise(id, buffer)?,
                signature: remaining_rdata(buffer)?,
            },
            RecordType::NSEC => RecordTypeWithData::NSEC {
                next: DomainName::deserialise(id, buffer)?,
                type_bitmap: remaining_rdata(buffer)?,
            },
            RecordType::NSEC3 => {
                let hash_algorithm = buffer.next_u8().ok_or(Error::ResourceRecordTooShort(id))?;
                let flags = buffer.next_u8().ok_or(Error::ResourceRecordTooShort(id))?;
                let iterations = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
                let salt_len = buffer.next_u8().ok_or(Error::ResourceRecordTooShort(id))?;
                let salt = buffer
                    .take(salt_len as usize)
                    .ok_or(Error::ResourceRecordTooShort(id))?
                    .to_vec();
                let hash_len = buffer.next_u8().ok_or(Error::ResourceRecordTooShort(id))?;
                let next_hashed = buffer
                    .take(hash_len as usize)
                    .ok_or(Error::ResourceRecordTooShort(id))?
                    .to_vec();
                RecordTypeWithData::NSEC3 {
                    hash_algorithm,
                    flags,
                    iterations,
                    salt,
                    next_hashed,
                    type_bitmap: remaining_rdata(buffer)?,
                }
            }
            RecordType::NSEC3PARAM => {
                let hash_algorithm = buffer.next_u8().ok_or(Error::ResourceRecordTooShort(id))?;
                let flags = buffer.next_u8().ok_or(Error::ResourceRecordTooShort(id))?;
                let iterations = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
                let salt_len = buffer.next_u8().ok_or(Error::ResourceRecordTooShort(id))?;
                let salt = buffer
                    .take(salt_len as usize)
                    .ok_or(Error::ResourceRecordTooShort(id))?
                    .to_vec();
                RecordTypeWithData::NSEC3PARAM {
                    hash_algorithm,
                    flags,
                    iterations,
                    salt,
                }
            }
            // pseudo-records are handled before this point; seeing
            // one in a data section is a formatting error
            RecordType::Opt | RecordType::Tsig => return Err(Error::ResourceRecordInvalid(id)),
            RecordType::Unknown(tag) => RecordTypeWithData::Unknown {
                tag,
                octets: raw_rdata(buffer)?,
            },
        };

        if buffer.position == rdata_end {
            Ok(Self {
                name,
                rtype_with_data,
                rclass,
                ttl,
            })
        } else {
            Err(Error::ResourceRecordInvalid(id))
        }
    }
}

impl Edns {
    /// Parse the remainder of an OPT record, the owner and type
    /// having been consumed already.  See RFC 6891 section 6.1.2: the
    /// class is the payload size and the TTL is carved into extended
    /// RCODE, version, and flags.
    fn deserialise_fields(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let payload_size = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        let ttl = buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?;
        let rdlength = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        let rdata_end = buffer.position + rdlength as usize;

        let mut options = Vec::new();
        while buffer.position < rdata_end {
            let code = buffer.next_u16().ok_or(Error::OptionTooShort(id))?;
            let length = buffer.next_u16().ok_or(Error::OptionTooShort(id))?;
            let octets = buffer
                .take(length as usize)
                .ok_or(Error::OptionTooShort(id))?
                .to_vec();
            options.push(match code {
                3 => EdnsOption::Nsid { octets },
                _ => EdnsOption::Unknown { code, octets },
            });
        }

        if buffer.position != rdata_end {
            return Err(Error::ResourceRecordInvalid(id));
        }

        #[allow(clippy::cast_possible_truncation)]
        Ok(Self {
            payload_size,
            extended_rcode: (ttl >> 24) as u8,
            version: (ttl >> 16) as u8,
            dnssec_ok: ttl & 0x8000 != 0,
            options,
        })
    }
}

impl Tsig {
    /// Parse the remainder of a TSIG record, the owner (the key name)
    /// and type having been consumed already.  See RFC 2845 section
    /// 2.3.
    fn deserialise_fields(
        id: u16,
        key_name: DomainName,
        buffer: &mut ConsumableBuffer,
    ) -> Result<Self, Error> {
        // class (ANY) and TTL (0) carry no information
        let _class = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        let _ttl = buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?;
        let rdlength = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        let rdata_end = buffer.position + rdlength as usize;

        let algorithm = DomainName::deserialise(id, buffer)?;
        let time_high = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        let time_low = buffer.next_u32().ok_or(Error::ResourceRecordTooShort(id))?;
        let fudge = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        let mac_size = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        let mac = buffer
            .take(mac_size as usize)
            .ok_or(Error::ResourceRecordTooShort(id))?
            .to_vec();
        let original_id = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        let error = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        let other_len = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        let other = buffer
            .take(other_len as usize)
            .ok_or(Error::ResourceRecordTooShort(id))?
            .to_vec();

        if buffer.position != rdata_end {
            return Err(Error::ResourceRecordInvalid(id));
        }

        Ok(Self {
            key_name,
            algorithm,
            time_signed: u64::from(time_high) << 32 | u64::from(time_low),
            fudge,
            mac,
            original_id,
            error: TsigRcode::from(error),
            other,
        })
    }
}

impl DomainName {
    /// Parse a name, following compression pointers.
    ///
    /// Pointers may only point backwards, and each pointer in a chain
    /// must point strictly before the segment it was found in - which
    /// both matches RFC 1035 section 4.1.4 and guarantees
    /// termination.  The total name is capped at 255 octets however
    /// it was assembled.
    ///
    /// On success the buffer is left at the first octet past the name
    /// at the original parse position, not past any pointer target.
    ///
    /// # Errors
    ///
    /// If the domain cannot be parsed.
    #[allow(clippy::missing_panics_doc)]
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let mut octets = Vec::<u8>::with_capacity(DOMAINNAME_MAX_LEN);
        let mut labels = Vec::<Label>::with_capacity(5);

        let mut position = buffer.position;
        let mut segment_start = buffer.position;
        let mut resume_at = None;

        loop {
            let Some(&size) = buffer.octets.get(position) else {
                return Err(Error::DomainTooShort(id));
            };
            position += 1;

            if usize::from(size) <= LABEL_MAX_LEN {
                octets.push(size);

                if size == 0 {
                    labels.push(Label::new());
                    break;
                }

                let Some(os) = buffer.octets.get(position..position + size as usize) else {
                    return Err(Error::DomainTooShort(id));
                };
                position += size as usize;

                // safe because of the bounds check above
                let label = Label::try_from(os).unwrap();
                octets.extend_from_slice(os);
                labels.push(label);

                if octets.len() > DOMAINNAME_MAX_LEN || labels.len() > DOMAINNAME_MAX_LABELS {
                    return Err(Error::DomainTooLong(id));
                }
            } else if size >= 192 {
                let hi = size & 0b0011_1111;
                let Some(&lo) = buffer.octets.get(position) else {
                    return Err(Error::DomainTooShort(id));
                };
                position += 1;

                // pointer must be to an earlier offset (not merely a
                // different one: an earlier one: RFC 1035 section
                // 4.1.4)
                let ptr = usize::from(u16::from_be_bytes([hi, lo]));
                if ptr >= segment_start {
                    return Err(Error::DomainPointerInvalid(id));
                }

                if resume_at.is_none() {
                    resume_at = Some(position);
                }
                segment_start = ptr;
                position = ptr;
            } else {
                return Err(Error::DomainLabelInvalid(id));
            }
        }

        buffer.position = resume_at.unwrap_or(position);

        if octets.len() <= DOMAINNAME_MAX_LEN {
            Ok(DomainName { octets, labels })
        } else {
            Err(Error::DomainTooLong(id))
        }
    }
}

impl QueryType {
    /// # Errors
    ///
    /// If the query type is too short.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let value = buffer.next_u16().ok_or(Error::QuestionTooShort(id))?;
        Ok(Self::from(value))
    }
}

impl RecordType {
    /// # Errors
    ///
    /// If the record type is too short.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let value = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        Ok(Self::from(value))
    }
}

impl RecordClass {
    /// # Errors
    ///
    /// If the record class is too short.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, Error> {
        let value = buffer.next_u16().ok_or(Error::ResourceRecordTooShort(id))?;
        Ok(Self::from(value))
    }
}

/// Errors encountered when parsing a datagram.  In all the errors
/// which have a `u16` parameter, that is the ID from the header - so
/// that an error response can be sent.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Error {
    /// The datagram is not even 2 octets long, so it doesn't even
    /// contain a valid ID.  An error cannot even be sent back to the
    /// client in this case as, without an ID, it cannot be linked
    /// with the correct query.
    CompletelyBusted,

    /// The header is missing one or more required fields.
    HeaderTooShort(u16),

    /// A question ends with an incomplete field.
    QuestionTooShort(u16),

    /// A resource record ends with an incomplete field.
    ResourceRecordTooShort(u16),

    /// A resource record is the wrong format.
    ResourceRecordInvalid(u16),

    /// An EDNS option ends with an incomplete field.
    OptionTooShort(u16),

    /// A message has more than one OPT record.
    MultipleOpt(u16),

    /// An OPT record is owned by a name other than the root.
    OptNotRoot(u16),

    /// A TSIG record is not the last record of the message.
    TsigNotLast(u16),

    /// A domain is incomplete.
    DomainTooShort(u16),

    /// A domain is over 255 octets in size.
    DomainTooLong(u16),

    /// A domain pointer points to or after the current record.
    DomainPointerInvalid(u16),

    /// A domain label is longer than 63 octets, but not a pointer.
    DomainLabelInvalid(u16),
}

impl Error {
    pub fn id(self) -> Option<u16> {
        match self {
            Error::CompletelyBusted => None,
            Error::HeaderTooShort(id)
            | Error::QuestionTooShort(id)
            | Error::ResourceRecordTooShort(id)
            | Error::ResourceRecordInvalid(id)
            | Error::OptionTooShort(id)
            | Error::MultipleOpt(id)
            | Error::OptNotRoot(id)
            | Error::TsigNotLast(id)
            | Error::DomainTooShort(id)
            | Error::DomainTooLong(id)
            | Error::DomainPointerInvalid(id)
            | Error::DomainLabelInvalid(id) => Some(id),
        }
    }
}

/// A buffer which will be consumed by the parsing process.
pub struct ConsumableBuffer<'a> {
    pub(crate) octets: &'a [u8],
    pub(crate) position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        Self {
            octets,
            position: 0,
        }
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        if self.octets.len() > self.position {
            let a = self.octets[self.position];
            self.position += 1;
            Some(a)
        } else {
            None
        }
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        if self.octets.len() > self.position + 1 {
            let a = self.octets[self.position];
            let b = self.octets[self.position + 1];
            self.position += 2;
            Some(u16::from_be_bytes([a, b]))
        } else {
            None
        }
    }

    pub fn next_u32(&mut self) -> Option<u32> {
        if self.octets.len() > self.position + 3 {
            let a = self.octets[self.position];
            let b = self.octets[self.position + 1];
            let c = self.octets[self.position + 2];
            let d = self.octets[self.position + 3];
            self.position += 4;
            Some(u32::from_be_bytes([a, b, c, d]))
        } else {
            None
        }
    }

    pub fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        if self.octets.len() >= self.position + size {
            let slice = &self.octets[self.position..self.position + size];
            self.position += size;
            Some(slice)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::test_util::*;

    #[test]
    fn parse_simple_query() {
        #[rustfmt::skip]
        let wire = [
            0x12, 0x34, // ID
            0x01, 0x20, // RD set, AD set
            0, 1, 0, 0, 0, 0, 0, 0, // counts
            3, b'w', b'w', b'w',
            7, b'e', b'x', b'a', b'm', b'p', b'l', b'e',
            3, b'c', b'o', b'm', 0,
            0, 1, // A
            0, 1, // IN
        ];

        let message = Message::from_octets(&wire).unwrap();
        assert_eq!(0x1234, message.header.id);
        assert_eq!(Opcode::Query, message.header.opcode);
        assert!(message.header.recursion_desired);
        assert!(message.header.authentic_data);
        assert_eq!(1, message.questions.len());
        assert_eq!(
            Question {
                name: domain("www.example.com."),
                qtype: QueryType::Record(RecordType::A),
                qclass: RecordClass::IN,
            },
            message.questions[0]
        );
    }

    #[test]
    fn parse_preserves_qname_case() {
        #[rustfmt::skip]
        let wire = [
            0x12, 0x34,
            0x00, 0x00,
            0, 1, 0, 0, 0, 0, 0, 0,
            3, b'W', b'w', b'W',
            7, b'E', b'x', b'a', b'm', b'p', b'l', b'e',
            3, b'c', b'o', b'M', 0,
            0, 1,
            0, 1,
        ];

        let message = Message::from_octets(&wire).unwrap();
        let name = &message.questions[0].name;

        // comparison is case-insensitive but the original octets
        // survive
        assert_eq!(domain("www.example.com."), *name);
        assert_eq!(
            vec![
                3, b'W', b'w', b'W', 7, b'E', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o',
                b'M', 0
            ],
            name.octets
        );
    }

    #[test]
    fn parse_compressed_rdata_name() {
        // an NS record whose NSDNAME is a pointer to the question
        // name
        #[rustfmt::skip]
        let wire = [
            0, 1,
            0x80, 0x00, // response
            0, 1, 0, 1, 0, 0, 0, 0,
            // question at offset 12
            7, b'e', b'x', b'a', b'm', b'p', b'l', b'e',
            3, b'c', b'o', b'm', 0,
            0, 2, // NS
            0, 1, // IN
            // answer
            0xc0, 12, // pointer to question name
            0, 2, // NS
            0, 1, // IN
            0, 0, 1, 44, // TTL 300
            0, 6, // RDLENGTH
            2, b'n', b's',
            0xc0, 12, // "ns" + pointer
        ];

        let message = Message::from_octets(&wire).unwrap();
        assert_eq!(1, message.answers.len());
        assert_eq!(domain("example.com."), message.answers[0].name);
        assert_eq!(
            RecordTypeWithData::NS {
                nsdname: domain("ns.example.com.")
            },
            message.answers[0].rtype_with_data
        );
    }

    #[test]
    fn parse_rejects_forward_pointer() {
        #[rustfmt::skip]
        let wire = [
            0, 1,
            0x00, 0x00,
            0, 1, 0, 0, 0, 0, 0, 0,
            0xc0, 14, // points past itself
            0, 1,
            0, 1,
            0, 0,
        ];

        assert_eq!(
            Err(Error::DomainPointerInvalid(1)),
            Message::from_octets(&wire)
        );
    }

    #[test]
    fn parse_rejects_pointer_to_self() {
        #[rustfmt::skip]
        let wire = [
            0, 1,
            0x00, 0x00,
            0, 1, 0, 0, 0, 0, 0, 0,
            0xc0, 12, // points at itself
            0, 1,
            0, 1,
        ];

        assert_eq!(
            Err(Error::DomainPointerInvalid(1)),
            Message::from_octets(&wire)
        );
    }

    #[test]
    fn parse_rejects_overlong_label() {
        let mut wire = vec![0, 1, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];
        wire.push(65); // not a pointer, not a valid length
        wire.extend(std::iter::repeat(b'x').take(70));

        assert_eq!(
            Err(Error::DomainLabelInvalid(1)),
            Message::from_octets(&wire)
        );
    }

    #[test]
    fn parse_rejects_truncated_rdata() {
        #[rustfmt::skip]
        let wire = [
            0, 1,
            0x80, 0x00,
            0, 0, 0, 1, 0, 0, 0, 0,
            1, b'a', 0,
            0, 1, // A
            0, 1, // IN
            0, 0, 1, 44,
            0, 4, // RDLENGTH says 4
            1, 2, // but only 2 octets follow
        ];

        assert_eq!(
            Err(Error::ResourceRecordTooShort(1)),
            Message::from_octets(&wire)
        );
    }

    #[test]
    fn parse_rejects_bad_rdlength() {
        #[rustfmt::skip]
        let wire = [
            0, 1,
            0x80, 0x00,
            0, 0, 0, 1, 0, 0, 0, 0,
            1, b'a', 0,
            0, 1, // A
            0, 1, // IN
            0, 0, 1, 44,
            0, 6, // RDLENGTH does not match A's 4 octets
            1, 2, 3, 4, 5, 6,
        ];

        assert_eq!(
            Err(Error::ResourceRecordInvalid(1)),
            Message::from_octets(&wire)
        );
    }

    #[test]
    fn parse_edns_opt() {
        #[rustfmt::skip]
        let wire = [
            0, 1,
            0x00, 0x00,
            0, 0, 0, 0, 0, 0, 0, 1,
            0, // root owner
            0, 41, // OPT
            0x10, 0x00, // payload 4096
            0, 0, 0x80, 0, // DO bit
            0, 4, // RDLENGTH
            0, 3, 0, 0, // NSID request
        ];

        let message = Message::from_octets(&wire).unwrap();
        let edns = message.edns.unwrap();
        assert_eq!(4096, edns.payload_size);
        assert_eq!(0, edns.version);
        assert!(edns.dnssec_ok);
        assert_eq!(vec![EdnsOption::Nsid { octets: Vec::new() }], edns.options);
    }

    #[test]
    fn parse_rejects_multiple_opt() {
        #[rustfmt::skip]
        let wire = [
            0, 1,
            0x00, 0x00,
            0, 0, 0, 0, 0, 0, 0, 2,
            0, 0, 41, 0x10, 0x00, 0, 0, 0, 0, 0, 0,
            0, 0, 41, 0x10, 0x00, 0, 0, 0, 0, 0, 0,
        ];

        assert_eq!(Err(Error::MultipleOpt(1)), Message::from_octets(&wire));
    }

    #[test]
    fn parse_rejects_opt_not_root() {
        #[rustfmt::skip]
        let wire = [
            0, 1,
            0x00, 0x00,
            0, 0, 0, 0, 0, 0, 0, 1,
            1, b'a', 0,
            0, 41, 0x10, 0x00, 0, 0, 0, 0, 0, 0,
        ];

        assert_eq!(Err(Error::OptNotRoot(1)), Message::from_octets(&wire));
    }

    #[test]
    fn parse_tsig() {
        #[rustfmt::skip]
        let wire = [
            0, 1,
            0x00, 0x00,
            0, 0, 0, 0, 0, 0, 0, 1,
            // TSIG RR owned by "key."
            3, b'k', b'e', b'y', 0,
            0, 250, // TSIG
            0, 255, // ANY
            0, 0, 0, 0, // TTL
            0, 31, // RDLENGTH
            // algorithm "hmac-sha256."
            11, b'h', b'm', b'a', b'c', b'-', b's', b'h', b'a', b'2', b'5', b'6', 0,
            0, 0, 0, 0, 0, 10, // time signed
            0, 30, // fudge
            0, 2, 0xab, 0xcd, // MAC
            0, 1, // original ID
            0, 18, // BADTIME
            0, 0, // other
        ];

        let parsed = Message::parse(&wire).unwrap();
        assert_eq!(Some(12), parsed.tsig_offset);

        let tsig = parsed.message.tsig.unwrap();
        assert_eq!(domain("key."), tsig.key_name);
        assert_eq!(domain("hmac-sha256."), tsig.algorithm);
        assert_eq!(10, tsig.time_signed);
        assert_eq!(30, tsig.fudge);
        assert_eq!(vec![0xab, 0xcd], tsig.mac);
        assert_eq!(TsigRcode::BadTime, tsig.error);
    }

    #[test]
    fn parse_rejects_tsig_not_last() {
        #[rustfmt::skip]
        let wire = [
            0, 1,
            0x00, 0x00,
            0, 0, 0, 0, 0, 0, 0, 2,
            // TSIG first
            3, b'k', b'e', b'y', 0,
            0, 250,
            0, 255,
            0, 0, 0, 0,
            0, 19,
            1, b'x', 0,
            0, 0, 0, 0, 0, 10,
            0, 30,
            0, 0,
            0, 1,
            0, 0,
            0, 0,
            // then an A record
            1, b'a', 0,
            0, 1,
            0, 1,
            0, 0, 1, 44,
            0, 4,
            1, 2, 3, 4,
        ];

        assert_eq!(Err(Error::TsigNotLast(1)), Message::from_octets(&wire));
    }

    #[test]
    fn parser_never_reads_past_input() {
        // truncate a valid message at every possible length: the
        // parser must return cleanly each time
        let mut wire = vec![
            0, 1, 0x80, 0x00, 0, 1, 0, 1, 0, 0, 0, 0, 7, b'e', b'x', b'a', b'm', b'p', b'l', b'e',
            3, b'c', b'o', b'm', 0, 0, 1, 0, 1,
        ];
        wire.extend([
            0xc0, 12, 0, 1, 0, 1, 0, 0, 1, 44, 0, 4, 192, 0, 2, 1,
        ]);

        assert!(Message::from_octets(&wire).is_ok());
        for len in 0..wire.len() {
            assert!(Message::from_octets(&wire[..len]).is_err());
        }
    }
}
