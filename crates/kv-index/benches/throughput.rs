use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kv_index::{Config, Hashtable};
use std::sync::Arc;
use std::thread;

const OPS_PER_THREAD: u64 = 200_000;

fn bench_single_thread_set_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread");
    group.throughput(Throughput::Elements(OPS_PER_THREAD));

    group.bench_function("set_then_get", |b| {
        b.iter(|| {
            let table = Hashtable::new(Config::default());
            let handle = table.thread_init();
            for i in 0..OPS_PER_THREAD {
                let key = i.to_le_bytes();
                table.set(&handle, &key, i as usize).unwrap();
            }
            for i in 0..OPS_PER_THREAD {
                let key = i.to_le_bytes();
                black_box(table.get(&handle, &key));
            }
            table.thread_free(handle);
        });
    });

    group.finish();
}

fn bench_concurrent_sets(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_sets");

    for num_threads in [2, 4, 8].iter() {
        let total_ops = OPS_PER_THREAD * (*num_threads as u64);
        group.throughput(Throughput::Elements(total_ops));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{num_threads}T")),
            num_threads,
            |b, &n| {
                b.iter(|| {
                    let table = Arc::new(Hashtable::new(Config::default()));
                    let handles: Vec<_> = (0..n)
                        .map(|t| {
                            let table = Arc::clone(&table);
                            thread::spawn(move || {
                                let handle = table.thread_init();
                                for i in 0..OPS_PER_THREAD {
                                    let key = (t as u64 * OPS_PER_THREAD + i).to_le_bytes();
                                    table.set(&handle, &key, i as usize).unwrap();
                                }
                                table.thread_free(handle);
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_mixed_read_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_read_write");

    for num_threads in [4, 8].iter() {
        let total_ops = OPS_PER_THREAD * (*num_threads as u64);
        group.throughput(Throughput::Elements(total_ops));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{num_threads}T_90r_10w")),
            num_threads,
            |b, &n| {
                b.iter(|| {
                    let table = Arc::new(Hashtable::new(Config::default()));
                    let seed_handle = table.thread_init();
                    for i in 0..1024u64 {
                        table.set(&seed_handle, &i.to_le_bytes(), i as usize).unwrap();
                    }
                    table.thread_free(seed_handle);

                    let handles: Vec<_> = (0..n)
                        .map(|t| {
                            let table = Arc::clone(&table);
                            thread::spawn(move || {
                                let handle = table.thread_init();
                                for i in 0..OPS_PER_THREAD {
                                    let key = (i % 1024) as u64;
                                    if i % 10 == 0 {
                                        let value = (t as u64 * OPS_PER_THREAD + i) as usize;
                                        table.set(&handle, &key.to_le_bytes(), value).unwrap();
                                    } else {
                                        black_box(table.get(&handle, &key.to_le_bytes()));
                                    }
                                }
                                table.thread_free(handle);
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_growth_under_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("growth");
    group.throughput(Throughput::Elements(OPS_PER_THREAD));

    group.bench_function("small_initial_table", |b| {
        b.iter(|| {
            let table = Hashtable::new(Config::new(16, 1 << 20, 256));
            let handle = table.thread_init();
            for i in 0..OPS_PER_THREAD {
                let key = i.to_le_bytes();
                table.set(&handle, &key, i as usize).unwrap();
            }
            table.thread_free(handle);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread_set_get,
    bench_concurrent_sets,
    bench_mixed_read_write,
    bench_growth_under_load
);
criterion_main!(benches);
