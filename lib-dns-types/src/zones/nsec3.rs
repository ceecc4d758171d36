//! The NSEC3 side of a signed zone: a second tree, keyed by hashed
//! owner name, which answers "which NSEC3 record proves this name
//! does not exist".  See RFC 5155.

use std::collections::BTreeMap;

use sha1::{Digest, Sha1};

use crate::protocol::types::*;

/// The hash parameters of a zone, from its apex NSEC3PARAM record.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Nsec3Params {
    pub hash_algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Vec<u8>,
}

impl Nsec3Params {
    /// Extract parameters from an NSEC3PARAM RDATA.  Returns `None`
    /// for any other record data.
    pub fn from_rdata(rdata: &RecordTypeWithData) -> Option<Self> {
        if let RecordTypeWithData::NSEC3PARAM {
            hash_algorithm,
            flags,
            iterations,
            salt,
        } = rdata
        {
            Some(Self {
                hash_algorithm: *hash_algorithm,
                flags: *flags,
                iterations: *iterations,
                salt: salt.clone(),
            })
        } else {
            None
        }
    }
}

/// Iterated, salted hash of a name: `H(x) = SHA-1(x || salt)`,
/// applied `iterations + 1` times to the canonical (lowercased) wire
/// form.  See RFC 5155 section 5.
pub fn hash_name(name: &DomainName, params: &Nsec3Params) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(name.canonical_octets());
    hasher.update(&params.salt);
    let mut digest = hasher.finalize();

    for _ in 0..params.iterations {
        let mut hasher = Sha1::new();
        hasher.update(digest);
        hasher.update(&params.salt);
        digest = hasher.finalize();
    }

    digest.to_vec()
}

const BASE32HEX_ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Base32 with extended hex alphabet, unpadded, lowercase: the form
/// NSEC3 owner labels take.  See RFC 4648 section 7.
pub fn base32hex_encode(octets: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity((octets.len() * 8 + 4) / 5);
    let mut bits: u32 = 0;
    let mut bit_count = 0;

    for octet in octets {
        bits = bits << 8 | u32::from(*octet);
        bit_count += 8;
        while bit_count >= 5 {
            bit_count -= 5;
            out.push(BASE32HEX_ALPHABET[(bits >> bit_count) as usize & 0b11111]);
        }
    }

    if bit_count > 0 {
        out.push(BASE32HEX_ALPHABET[(bits << (5 - bit_count)) as usize & 0b11111]);
    }

    out
}

/// Inverse of `base32hex_encode`, case-insensitive.  Returns `None`
/// on any octet outside the alphabet.
pub fn base32hex_decode(encoded: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(encoded.len() * 5 / 8);
    let mut bits: u32 = 0;
    let mut bit_count = 0;

    for octet in encoded {
        let value = match octet.to_ascii_lowercase() {
            o @ b'0'..=b'9' => o - b'0',
            o @ b'a'..=b'v' => o - b'a' + 10,
            _ => return None,
        };
        bits = bits << 5 | u32::from(value);
        bit_count += 5;
        if bit_count >= 8 {
            bit_count -= 8;
            #[allow(clippy::cast_possible_truncation)]
            out.push((bits >> bit_count) as u8);
        }
    }

    Some(out)
}

/// The hashed-name tree of a signed zone: every NSEC3 record's owner,
/// indexed by the hash its first label encodes.  Kept alongside the
/// node tree and rebuilt with it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Nsec3Tree {
    pub params: Nsec3Params,
    owners: BTreeMap<Vec<u8>, DomainName>,
}

impl Nsec3Tree {
    pub fn new(params: Nsec3Params) -> Self {
        Self {
            params,
            owners: BTreeMap::new(),
        }
    }

    /// Index an NSEC3 record's owner.  The first label must be a
    /// base32hex hash; anything else is not an NSEC3 owner and is
    /// skipped.
    pub fn insert(&mut self, owner: &DomainName) {
        if let Some(first) = owner.labels.first() {
            if let Some(hash) = base32hex_decode(first) {
                if !hash.is_empty() {
                    self.owners.insert(hash, owner.clone());
                }
            }
        }
    }

    /// The owner of the NSEC3 record matching this hash exactly, if
    /// there is one.
    pub fn find(&self, hash: &[u8]) -> Option<&DomainName> {
        self.owners.get(hash)
    }

    /// The owner of the NSEC3 record covering this hash: the record
    /// with the greatest hash at or below the target, wrapping to the
    /// last record for a target below the whole chain.
    pub fn covering(&self, hash: &[u8]) -> Option<&DomainName> {
        self.owners
            .range(..=hash.to_vec())
            .next_back()
            .or_else(|| self.owners.iter().next_back())
            .map(|(_, owner)| owner)
    }

    /// Hash a name with this tree's parameters.
    pub fn hash(&self, name: &DomainName) -> Vec<u8> {
        hash_name(name, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::test_util::*;

    fn params(iterations: u16, salt: &[u8]) -> Nsec3Params {
        Nsec3Params {
            hash_algorithm: 1,
            flags: 0,
            iterations,
            salt: salt.to_vec(),
        }
    }

    #[test]
    fn base32hex_roundtrip() {
        for input in [&b""[..], b"f", b"fo", b"foo", b"foob", b"fooba", b"foobar"] {
            assert_eq!(
                Some(input.to_vec()),
                base32hex_decode(&base32hex_encode(input))
            );
        }
    }

    #[test]
    fn base32hex_rfc4648_vectors() {
        // RFC 4648 section 10, lowercased and unpadded
        assert_eq!(b"co".to_vec(), base32hex_encode(b"f"));
        assert_eq!(b"cpng".to_vec(), base32hex_encode(b"fo"));
        assert_eq!(b"cpnmu".to_vec(), base32hex_encode(b"foo"));
        assert_eq!(b"cpnmuog".to_vec(), base32hex_encode(b"foob"));
        assert_eq!(b"cpnmuoj1".to_vec(), base32hex_encode(b"fooba"));
        assert_eq!(b"cpnmuoj1e8".to_vec(), base32hex_encode(b"foobar"));
    }

    #[test]
    fn base32hex_decode_rejects_garbage() {
        assert_eq!(None, base32hex_decode(b"not base32hex!"));
        assert_eq!(None, base32hex_decode(b"w"));
    }

    #[test]
    fn hash_name_rfc5155_vector() {
        // RFC 5155 appendix A: "example" with salt aabbccdd and 12
        // extra iterations hashes to 0p9mhaveqvm6t7vbl5lop2u3t2rp3tom
        let hash = hash_name(
            &domain("example."),
            &params(12, &[0xaa, 0xbb, 0xcc, 0xdd]),
        );

        assert_eq!(b"0p9mhaveqvm6t7vbl5lop2u3t2rp3tom".to_vec(), base32hex_encode(&hash));
    }

    #[test]
    fn hash_name_is_case_insensitive() {
        let p = params(5, b"salt");
        assert_eq!(
            hash_name(&domain("www.example.com."), &p),
            hash_name(
                &DomainName::from_dotted_string("WWW.EXAMPLE.COM.").unwrap(),
                &p
            )
        );
    }

    #[test]
    fn tree_find_and_covering() {
        let p = params(0, b"");
        let mut tree = Nsec3Tree::new(p);

        // owners with hand-picked hashes: 0x20..., 0x60..., 0xa0...
        let low = hashed_owner(&[0x20; 20]);
        let mid = hashed_owner(&[0x60; 20]);
        let high = hashed_owner(&[0xa0; 20]);
        tree.insert(&low);
        tree.insert(&mid);
        tree.insert(&high);

        assert_eq!(Some(&mid), tree.find(&[0x60; 20]));
        assert_eq!(None, tree.find(&[0x61; 20]));

        // between mid and high: covered by mid
        assert_eq!(Some(&mid), tree.covering(&[0x61; 20]));
        // above the top: covered by high
        assert_eq!(Some(&high), tree.covering(&[0xf0; 20]));
        // below the bottom: wraps to the last record
        assert_eq!(Some(&high), tree.covering(&[0x01; 20]));
    }

    fn hashed_owner(hash: &[u8]) -> DomainName {
        let mut label = base32hex_encode(hash);
        label.truncate(32);
        DomainName::from_labels(vec![label, b"example".to_vec(), b"com".to_vec(), Vec::new()])
            .unwrap()
    }
}
