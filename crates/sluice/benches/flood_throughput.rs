// crates/sluice/benches/flood_throughput.rs
//
// Two Criterion benchmark groups:
//   floodgate_scaling — a single Floodgate's flood() cost as worker count grows
//   torrent_dispatch  — Torrent::flood() fan-out across several floodgates

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use sluice::{Floodgate, Marshal, TorrentBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn floodgate_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("floodgate_scaling");
    group.sample_size(20);
    group.warm_up_time(Duration::from_millis(200));
    group.measurement_time(Duration::from_secs(5));

    for threads in [1usize, 4, 16] {
        group.throughput(Throughput::Elements((threads * 50) as u64));
        group.bench_function(format!("threads_{threads}"), |b| {
            b.iter(|| {
                let counter = Arc::new(AtomicUsize::new(0));
                let counter_clone = Arc::clone(&counter);
                let gate = Floodgate::new(
                    "BenchResource",
                    threads,
                    50,
                    move || {
                        counter_clone.fetch_add(1, Ordering::Relaxed);
                    },
                    Marshal::internal(),
                )
                .expect("valid thread/iteration counts");
                gate.open().expect("freshly constructed gate opens");
                black_box(gate.flood(Duration::from_secs(30)).expect("flood completes"));
            })
        });
    }
    group.finish();
}

fn torrent_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("torrent_dispatch");
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(200));
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("four_floodgates", |b| {
        b.iter(|| {
            let torrent = TorrentBuilder::new("TorrentBenchResource", 4, 10)
                .expect("valid thread/iteration counts")
                .with_floodgate(|| 1)
                .with_floodgate(|| 2)
                .with_floodgate(|| 3)
                .with_floodgate(|| 4)
                .build()
                .expect("non-empty builder");
            torrent.open().expect("freshly built torrent opens");
            black_box(torrent.flood(Duration::from_secs(30)).expect("flood completes"));
        })
    });
    group.finish();
}

criterion_group!(benches_floodgate_scaling, floodgate_scaling);
criterion_group!(benches_torrent_dispatch, torrent_dispatch);
criterion_main!(benches_floodgate_scaling, benches_torrent_dispatch);
