//! Benchmarks for header decoding, append-offset scanning and parsing.
//!
//! Run with: `cargo bench`
//! Compare with baseline: `cargo bench -- --save-baseline main`
//! Compare against baseline: `cargo bench -- --baseline main`

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::io::Cursor;
use tar_stream::parsing::block_align;
use tar_stream::{
    locate_sync, LocalFileMedia, Parser, ParserOptions, RawHeader, ReadEntry, Result, TypeFlag,
};

/// Build an in-memory archive of `count` entries of `size` bytes each.
fn build_archive(count: usize, size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let body = vec![b'x'; size];
    for i in 0..count {
        let header = RawHeader {
            path: Some(format!("dir/file-{:05}.bin", i)),
            mode: Some(0o644),
            size: Some(size as u64),
            mtime: Some(1_700_000_000),
            typeflag: TypeFlag::File,
            ..Default::default()
        };
        out.extend_from_slice(&header.encode().block);
        out.extend_from_slice(&body);
        out.resize(out.len() + block_align(size as u64) as usize - size, 0);
    }
    out.extend_from_slice(&[0u8; 1024]);
    out
}

fn bench_header_decode(c: &mut Criterion) {
    let data = build_archive(1, 0);
    let mut block = [0u8; 512];
    block.copy_from_slice(&data[..512]);

    c.bench_function("header_decode", |b| {
        b.iter(|| black_box(RawHeader::decode(black_box(&block))));
    });
}

fn bench_locate(c: &mut Criterion) {
    let data = build_archive(1000, 3000);

    let mut group = c.benchmark_group("locate");
    group.throughput(Throughput::Elements(1000));
    group.bench_function("sync_1000_entries", |b| {
        b.iter(|| {
            let mut media = LocalFileMedia::new(Cursor::new(&data), data.len() as u64);
            black_box(locate_sync(&mut media, None).expect("scan"))
        });
    });
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let data = build_archive(200, 64 * 1024);

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Bytes(data.len() as u64));
    for chunk in [4096usize, 64 * 1024] {
        group.bench_function(format!("chunk_{}", chunk), |b| {
            b.iter(|| {
                let mut count = 0usize;
                let counter = |_: &mut ReadEntry| -> Result<()> {
                    count += 1;
                    Ok(())
                };
                let mut parser = Parser::new(ParserOptions::default(), counter);
                for piece in data.chunks(chunk) {
                    parser.write(black_box(piece)).expect("parse");
                }
                parser.end().expect("end");
                drop(parser);
                black_box(count)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_header_decode, bench_locate, bench_parse);
criterion_main!(benches);
