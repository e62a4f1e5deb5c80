use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use dccnet_protocol::checksum::checksum;
use dccnet_protocol::frame::{Flags, FrameCodec};
use dccnet_protocol::reassembler::StreamReassembler;
use dccnet_protocol::sequence::FrameId;

fn bench_checksum(c: &mut Criterion) {
    let data = vec![0xA5u8; 4096 + 15];

    let mut group = c.benchmark_group("checksum");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("full_frame", |b| {
        b.iter(|| {
            let csum = checksum(black_box(&data));
            black_box(csum);
        });
    });
    group.finish();
}

fn bench_frame_encode(c: &mut Criterion) {
    let codec = FrameCodec::default();
    let payload = vec![0u8; 4096];

    c.bench_function("frame_encode", |b| {
        b.iter(|| {
            let bytes = codec
                .encode(black_box(&payload), FrameId::ZERO, Flags::empty())
                .unwrap();
            black_box(bytes);
        });
    });
}

fn bench_frame_decode(c: &mut Criterion) {
    let codec = FrameCodec::default();
    let bytes = codec
        .encode(&vec![0u8; 4096], FrameId::ONE, Flags::FINAL)
        .unwrap();

    c.bench_function("frame_decode", |b| {
        b.iter(|| {
            let frame = codec.decode(black_box(&bytes)).unwrap();
            black_box(frame);
        });
    });
}

fn bench_reassembly(c: &mut Criterion) {
    let codec = FrameCodec::default();
    let mut stream = Vec::new();
    let mut id = FrameId::ZERO;
    for _ in 0..64 {
        stream.extend_from_slice(&codec.encode(&[7u8; 1000], id, Flags::empty()).unwrap());
        id.toggle();
    }

    let mut group = c.benchmark_group("reassembler");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("64_frames_1500b_reads", |b| {
        b.iter(|| {
            let mut reassembler = StreamReassembler::new(codec.clone());
            let mut count = 0;
            for chunk in stream.chunks(1500) {
                count += reassembler.push(black_box(chunk)).len();
            }
            black_box(count);
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_checksum,
    bench_frame_encode,
    bench_frame_decode,
    bench_reassembly
);
criterion_main!(benches);
