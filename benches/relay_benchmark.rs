use criterion::{black_box, criterion_group, criterion_main, Criterion};
use delta_relay::protocol::{ClientEvent, ConnectionId, DocumentId, ServerEvent};
use delta_relay::queue::SendQueue;
use delta_relay::registry::ConnectionRegistry;
use delta_relay::rooms::RoomManager;
use delta_relay::router::EventRouter;
use delta_relay::server::RelayStats;
use std::sync::Arc;

fn bench_event_encode(c: &mut Criterion) {
    let event = ClientEvent::EditDelta {
        document_id: "doc-1".to_string(),
        delta: vec![0u8; 64], // typical small delta
    };

    c.bench_function("client_event_encode_64B", |b| {
        b.iter(|| black_box(black_box(&event).encode().unwrap()))
    });
}

fn bench_event_decode(c: &mut Criterion) {
    let event = ClientEvent::EditDelta {
        document_id: "doc-1".to_string(),
        delta: vec![0u8; 64],
    };
    let encoded = event.encode().unwrap();

    c.bench_function("client_event_decode_64B", |b| {
        b.iter(|| black_box(ClientEvent::decode(black_box(&encoded)).unwrap()))
    });
}

fn bench_queue_push_pop(c: &mut Criterion) {
    let queue = SendQueue::new(1024);
    let doc = DocumentId::parse("doc-1").unwrap();
    let event = ServerEvent::CursorMove {
        document_id: doc,
        sender: ConnectionId::new(),
        range: vec![0u8; 16],
    };
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    c.bench_function("queue_push_pop", |b| {
        b.iter(|| {
            queue.push(black_box(event.clone()));
            black_box(rt.block_on(queue.pop()));
        })
    });
}

fn bench_fan_out_100_members(c: &mut Criterion) {
    let registry = Arc::new(ConnectionRegistry::new());
    let rooms = Arc::new(RoomManager::new());
    let router = EventRouter::new(
        registry.clone(),
        rooms.clone(),
        Arc::new(RelayStats::new()),
    );

    let mut members = Vec::new();
    for _ in 0..100 {
        let id = registry.register(Arc::new(SendQueue::new(2048)));
        router.handle_join(id, "doc-bench").unwrap();
        members.push(id);
    }
    let sender = members[0];

    c.bench_function("fan_out_edit_100_members", |b| {
        b.iter(|| {
            black_box(
                router
                    .handle_edit(sender, "doc-bench", vec![0u8; 64])
                    .unwrap(),
            )
        })
    });
}

criterion_group!(
    benches,
    bench_event_encode,
    bench_event_decode,
    bench_queue_push_pop,
    bench_fan_out_100_members
);
criterion_main!(benches);
