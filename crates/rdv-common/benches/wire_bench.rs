use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rdv_common::crypto::derive_secret;
use rdv_common::types::Identity;
use rdv_common::wire::{Request, Response};

fn bench_request_encode(c: &mut Criterion) {
    let secret = derive_secret(b"bench-passphrase");
    let request = Request {
        identity: Identity::new(vec![0x42u8; 32]).unwrap(),
        peer_key: [0xABu8; 32],
    };

    c.bench_function("request_encode", |b| {
        b.iter(|| black_box(request.encode(&secret)));
    });
}

fn bench_request_decode(c: &mut Criterion) {
    let secret = derive_secret(b"bench-passphrase");
    let request = Request {
        identity: Identity::new(vec![0x42u8; 32]).unwrap(),
        peer_key: [0xABu8; 32],
    };
    let encoded = request.encode(&secret);

    c.bench_function("request_decode", |b| {
        b.iter(|| black_box(Request::decode(&secret, &encoded).unwrap()));
    });
}

fn bench_response_encode(c: &mut Criterion) {
    let secret = derive_secret(b"bench-passphrase");
    let response = Response {
        identity: Identity::new(vec![0x42u8; 32]).unwrap(),
        address: "10.11.12.13".parse().unwrap(),
        prefix_len: 16,
        port: 51820,
    };

    c.bench_function("response_encode", |b| {
        b.iter(|| black_box(response.encode(&secret)));
    });
}

fn bench_response_decode(c: &mut Criterion) {
    let secret = derive_secret(b"bench-passphrase");
    let response = Response {
        identity: Identity::new(vec![0x42u8; 32]).unwrap(),
        address: "10.11.12.13".parse().unwrap(),
        prefix_len: 16,
        port: 51820,
    };
    let encoded = response.encode(&secret);

    c.bench_function("response_decode", |b| {
        b.iter(|| black_box(Response::decode(&secret, &encoded).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_request_encode,
    bench_request_decode,
    bench_response_encode,
    bench_response_decode
);
criterion_main!(benches);
