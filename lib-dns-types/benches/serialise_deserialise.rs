use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::net::Ipv4Addr;

use dns_types::protocol::types::test_util::*;
use dns_types::protocol::types::*;

#[allow(non_snake_case)]
fn bench__question(c: &mut Criterion) {
    let message = Message::from_question(
        1234,
        Question {
            name: domain("www.example.com."),
            qtype: QueryType::Record(RecordType::A),
            qclass: RecordClass::IN,
        },
    );

    c.bench_function("serialise/question", |b| {
        b.iter_batched(
            || message.clone(),
            |message| message.to_octets(),
            BatchSize::SmallInput,
        )
    });

    let serialised = message.to_octets().unwrap();
    c.bench_function("deserialise/question", |b| {
        b.iter(|| Message::from_octets(black_box(&serialised)))
    });
}

#[allow(non_snake_case)]
fn bench__answer__small(c: &mut Criterion) {
    let mut message = Message::from_question(
        1234,
        Question {
            name: domain("www.example.com."),
            qtype: QueryType::Record(RecordType::A),
            qclass: RecordClass::IN,
        },
    )
    .make_response();

    message.answers = vec![a_record("www.example.com.", Ipv4Addr::new(1, 1, 1, 1))];

    c.bench_function("serialise/answer/small", |b| {
        b.iter_batched(
            || message.clone(),
            |message| message.to_octets(),
            BatchSize::SmallInput,
        )
    });

    let serialised = message.to_octets().unwrap();
    c.bench_function("deserialise/answer/small", |b| {
        b.iter(|| Message::from_octets(black_box(&serialised)))
    });
}

#[allow(non_snake_case)]
fn bench__answer__big(c: &mut Criterion) {
    let mut message = Message::from_question(
        1234,
        Question {
            name: domain("www.example.com."),
            qtype: QueryType::Any,
            qclass: RecordClass::IN,
        },
    )
    .make_response();

    for _ in 0..100 {
        message.answers.push(arbitrary_resourcerecord());
    }

    c.bench_function("serialise/answer/big", |b| {
        b.iter_batched(
            || message.clone(),
            |message| message.to_octets(),
            BatchSize::SmallInput,
        )
    });

    let serialised = message.to_octets().unwrap();
    c.bench_function("deserialise/answer/big", |b| {
        b.iter(|| Message::from_octets(black_box(&serialised)))
    });
}

criterion_group!(
    benches,
    bench__question,
    bench__answer__small,
    bench__answer__big
);
criterion_main!(benches);
