#![no_main]
use libfuzzer_sys::fuzz_target;

use dns_types::protocol::deserialise::ConsumableBuffer;
use dns_types::protocol::types::{DomainName, DOMAINNAME_MAX_LEN};

fuzz_target!(|data: &[u8]| {
    if let Ok(name) = DomainName::deserialise(0, &mut ConsumableBuffer::new(data)) {
        assert!(name.octets.len() <= DOMAINNAME_MAX_LEN);
        assert!(name.labels.last().is_some_and(|label| label.is_empty()));
    }
});
