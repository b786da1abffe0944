use acdat::{DatReader, MemoryBlockSource, ReaderOptions};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

#[path = "../tests/common/mod.rs"]
mod common;

const FILES: u32 = 5_000;

fn image() -> Vec<u8> {
    let ids: Vec<u32> = (0..FILES).map(|i| 0x0600_0000 + i * 3).collect();
    common::build_image(&ids, 1024, 61).0
}

fn bench_find(c: &mut Criterion) {
    let image = image();
    let strategies = [
        ("find_preloaded", ReaderOptions::preloaded()),
        ("find_node_cache", ReaderOptions::default()),
        ("find_uncached", ReaderOptions::uncached()),
    ];

    for (name, options) in strategies {
        let dat = DatReader::open(MemoryBlockSource::new(image.clone()), options).unwrap();
        let mut id = 0u32;
        c.bench_function(name, |b| {
            b.iter(|| {
                id = (id + 7) % FILES;
                dat.find(black_box(0x0600_0000 + id * 3)).unwrap()
            })
        });
    }
}

fn bench_open_and_read(c: &mut Criterion) {
    let image = image();

    c.bench_function("open_preloaded_5k", |b| {
        b.iter(|| {
            DatReader::open(MemoryBlockSource::new(black_box(image.clone())), ReaderOptions::preloaded())
                .unwrap()
        })
    });

    let dat = DatReader::open(MemoryBlockSource::new(image), ReaderOptions::preloaded()).unwrap();
    c.bench_function("read_file_multi_block", |b| {
        b.iter(|| dat.read_file(black_box(0x0600_0000 + 4_000 * 3)).unwrap())
    });
}

criterion_group!(benches, bench_find, bench_open_and_read);
criterion_main!(benches);
