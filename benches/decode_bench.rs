use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use vmc_bridge::capture::{PoseStore, receiver::ingest};
use vmc_bridge::utils::metrics::ReceiverDiagnostics;
use vmc_bridge::wire::osc::{self, OscArg};

const BONES: &[&str] = &[
    "Hips", "Spine", "Chest", "Neck", "Head",
    "LeftUpperArm", "LeftLowerArm", "LeftHand",
    "RightUpperArm", "RightLowerArm", "RightHand",
];

/// One frame as a performer app sends it: a bundle of bone messages.
fn frame_bundle() -> Vec<u8> {
    let messages: Vec<Vec<u8>> = BONES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let f = i as f32 * 0.01;
            osc::encode_message(
                "/VMC/Ext/Bone/Pos",
                &[
                    OscArg::Str(name.to_string()),
                    OscArg::Float(f),
                    OscArg::Float(1.0 + f),
                    OscArg::Float(-f),
                    OscArg::Float(0.0),
                    OscArg::Float(0.0),
                    OscArg::Float(0.0),
                    OscArg::Float(1.0),
                ],
            )
        })
        .collect();
    osc::encode_bundle(&messages)
}

fn decode_frame_bench(c: &mut Criterion) {
    let bundle = frame_bundle();
    c.bench_function("osc_decode_frame_bundle", |b| {
        b.iter(|| black_box(osc::decode(black_box(&bundle))))
    });
}

fn ingest_frame_bench(c: &mut Criterion) {
    let bundle = frame_bundle();
    let store = PoseStore::new();
    let diag = ReceiverDiagnostics::new();
    c.bench_function("ingest_frame_into_store", |b| {
        b.iter(|| black_box(ingest(black_box(&bundle), &store, &diag)))
    });
}

criterion_group!(benches, decode_frame_bench, ingest_frame_bench);
criterion_main!(benches);
