use criterion::{Criterion, black_box, criterion_group, criterion_main};
use facemodes_multimodal::{ModeStore, MultiModal};

fn pseudo_vec(dim: usize, seed: u64) -> Vec<f32> {
    let mut v = Vec::with_capacity(dim);
    let mut state = seed;
    for _ in 0..dim {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        v.push(((state >> 33) as f32) / (u32::MAX as f32) - 0.5);
    }
    v
}

/// Vectors scattered around `centers` fixed centroids.
fn clustered(dim: usize, centers: usize, n: usize) -> Vec<Vec<f32>> {
    let cs: Vec<Vec<f32>> = (0..centers).map(|c| pseudo_vec(dim, 1 + c as u64)).collect();
    (0..n)
        .map(|i| {
            let noise = pseudo_vec(dim, 10_000 + i as u64);
            cs[i % centers]
                .iter()
                .zip(&noise)
                .map(|(c, e)| c * 8.0 + e * 0.2)
                .collect()
        })
        .collect()
}

fn bench_insert(c: &mut Criterion) {
    let vectors = clustered(128, 8, 512);

    c.bench_function("insert_512x128_cap256", |b| {
        b.iter(|| {
            let mut mm = MultiModal::new(128, 256);
            for v in &vectors {
                mm.insert(black_box(v)).unwrap();
            }
            mm
        });
    });
}

fn bench_peaks(c: &mut Criterion) {
    let mut mm = MultiModal::new(128, 1024);
    for v in clustered(128, 8, 1024) {
        mm.insert(&v).unwrap();
    }

    c.bench_function("peaks_1024x128", |b| {
        b.iter(|| black_box(mm.peaks()));
    });
}

fn bench_write_read(c: &mut Criterion) {
    let mut mm = MultiModal::new(128, 1024);
    for v in clustered(128, 8, 1024) {
        mm.insert(&v).unwrap();
    }
    let mut buf: Vec<u8> = Vec::new();
    mm.write_to(&mut buf).unwrap();

    c.bench_function("read_from_1024x128", |b| {
        b.iter(|| {
            let mut restored = MultiModal::new(128, 1024);
            restored.read_from(&mut black_box(buf.as_slice())).unwrap();
            restored
        });
    });
}

criterion_group!(benches, bench_insert, bench_peaks, bench_write_read);
criterion_main!(benches);
