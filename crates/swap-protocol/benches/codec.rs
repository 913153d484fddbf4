//! Codec benchmarks for skillswap-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use skillswap_protocol::{codec, ClientEvent, MessageRecord, SenderInfo, ServerEvent};

fn receive_message() -> ServerEvent {
    ServerEvent::ReceiveMessage {
        message: MessageRecord {
            id: "msg_18c2f".into(),
            match_id: "match_18c2a".into(),
            sender: SenderInfo {
                id: "alice".into(),
                name: "Alice".into(),
                profile_picture: Some("/uploads/alice.png".into()),
            },
            recipient_id: "bob".into(),
            content: "x".repeat(256),
            is_read: false,
            created_at: 1_700_000_000_000,
        },
        timestamp: 1_700_000_000_001,
    }
}

fn bench_encode(c: &mut Criterion) {
    let event = receive_message();

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));
    group.bench_function("json", |b| b.iter(|| codec::encode_json(black_box(&event))));
    group.bench_function("msgpack", |b| b.iter(|| codec::encode(black_box(&event))));
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let event = ClientEvent::SendMessage {
        sender_id: "alice".into(),
        recipient_id: None,
        match_id: "match_18c2a".into(),
        content: "x".repeat(256),
    };
    let text = codec::encode_json(&event).unwrap();
    let binary = codec::encode(&event).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));
    group.bench_function("json", |b| {
        b.iter(|| codec::decode_json::<ClientEvent>(black_box(&text)))
    });
    group.bench_function("msgpack", |b| {
        b.iter(|| codec::decode::<ClientEvent>(black_box(&binary)))
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
