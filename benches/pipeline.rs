use criterion::{criterion_group, criterion_main, Criterion};
use mockserve::decoder::default_decoders;
use mockserve::{DecoderChain, IncomingRequest, RequestSnapshot, ResponseDraft, ResponseTemplate};
use serde_json::json;
use std::hint::black_box;

fn request(content_type: &str, body: &[u8]) -> IncomingRequest {
    IncomingRequest::new(
        "1.1",
        "POST",
        "/zoo/animals?limit=10&offset=20",
        vec![
            ("Host".to_string(), "localhost".to_string()),
            ("Content-Type".to_string(), content_type.to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ],
        body.to_vec(),
    )
}

fn bench_decode_chain(c: &mut Criterion) {
    let chain = DecoderChain::new(default_decoders());
    let json_body = br#"{"name":"rex","species":"dog","tags":["good","boy"],"age":4}"#;
    let form_body = b"user[name]=ann&user[langs][]=rust&user[langs][]=go&page=2";

    c.bench_function("chain_json_body", |b| {
        b.iter(|| {
            let mut req = request("application/json", json_body);
            let mut draft = ResponseDraft::default();
            let res = chain.execute(&mut req, &mut draft);
            black_box((&req.body, res));
        })
    });

    c.bench_function("chain_urlencoded_body", |b| {
        b.iter(|| {
            let mut req = request("application/x-www-form-urlencoded", form_body);
            let mut draft = ResponseDraft::default();
            let res = chain.execute(&mut req, &mut draft);
            black_box((&req.body, res));
        })
    });
}

fn bench_snapshot_and_resolve(c: &mut Criterion) {
    let chain = DecoderChain::new(default_decoders());
    let mut req = request("application/json", br#"{"n":21}"#);
    let parse_error = chain.execute(&mut req, &mut ResponseDraft::default()).err();
    let template = ResponseTemplate::new()
        .with_status(201)
        .with_header("x-foo", "bar")
        .with_body(json!({"ok": true}))
        .with_pre_response(|snapshot, _| {
            snapshot
                .url
                .starts_with("/zoo")
                .then(|| mockserve::ResponsePatch::status(202))
        });

    c.bench_function("snapshot_and_resolve", |b| {
        b.iter(|| {
            let snapshot = RequestSnapshot::capture(&req, parse_error.clone());
            let resolved = template.resolve(&snapshot);
            black_box(resolved.encode_body().ok());
        })
    });
}

criterion_group!(benches, bench_decode_chain, bench_snapshot_and_resolve);
criterion_main!(benches);
