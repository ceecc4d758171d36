#![no_main]
use libfuzzer_sys::fuzz_target;

use dns_types::protocol::deserialise::ConsumableBuffer;
use dns_types::protocol::serialise::WritableBuffer;
use dns_types::protocol::types::ResourceRecord;

fuzz_target!(|rr: ResourceRecord| {
    let mut buffer = WritableBuffer::default();
    rr.serialise(&mut buffer).unwrap();

    let deserialised = ResourceRecord::deserialise(0, &mut ConsumableBuffer::new(&buffer.octets));
    assert_eq!(Ok(rr), deserialised);
});
