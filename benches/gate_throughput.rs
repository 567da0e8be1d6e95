//! Round/gate throughput of the numeric builder surface over the Mersenne
//! field backend
//!
//! Generalizes the teacher's curve-point `gate_throughput` benchmark (a
//! long chain of free `&res + &res` gates over a single fabric) to this
//! engine's round-based model: a chain of free additions measures local
//! gate throughput with zero network rounds, while a chain of secret
//! multiplications measures round-trip throughput against an in-memory
//! network and dealt preprocessing, mirroring
//! `examples/TaceoLabs-worldcoin-experiments/iris-mpc/benches/iris_spdzwise.rs`'s
//! `tokio::runtime` + `bench.to_async(&rt)` pattern for async criterion
//! benchmarks.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime;

use fresco::builder::Builder;
use fresco::evaluator::Evaluator;
use fresco::field::{Field, Fp};
use fresco::network::InMemoryDuplexNetwork;
use fresco::numeric::Numeric;
use fresco::preprocessing::InMemorySource;

/// Chain `count` free additions on a single party's graph and drive it to
/// completion; since additions are zero-round local gates this measures
/// the builder/evaluator's per-gate overhead in isolation from the network
fn bench_local_addition_chain(c: &mut Criterion) {
    let rt = runtime::Builder::new_current_thread().enable_time().build().expect("tokio runtime");

    let mut group = c.benchmark_group("local_addition_chain");
    for count in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.to_async(&rt).iter(|| async move {
                let mut networks = InMemoryDuplexNetwork::new_n_party(2, Duration::from_secs(5));
                let mut sources = InMemorySource::deal(2, 4, 7);
                let mut network = networks.remove(0);
                let source = sources.remove(0);

                let builder = Builder::new(network.party_id(), network.peers(), Box::new(source));
                let mut acc = builder.input(0, Some(Fp::one())).unwrap();
                for _ in 0..count {
                    acc = builder.add(acc, acc);
                }

                let mac_key_share = builder.with_preprocessing(|p| p.mac_key_share());
                let mut evaluator = Evaluator::new(&mut network, None);
                evaluator.run(&builder, mac_key_share).await.unwrap();
            });
        });
    }
    group.finish();
}

/// Chain `count` secret-secret multiplications, each costing one Beaver
/// round, across a two-party in-memory network; measures end-to-end round
/// throughput rather than just local bookkeeping
fn bench_multiply_chain(c: &mut Criterion) {
    let rt = runtime::Builder::new_multi_thread().worker_threads(2).enable_time().build().expect("tokio runtime");

    let mut group = c.benchmark_group("multiply_chain");
    group.sample_size(10);
    for count in [8usize, 32, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.to_async(&rt).iter(|| async move {
                let mut networks = InMemoryDuplexNetwork::new_n_party(2, Duration::from_secs(5));
                let mut sources = InMemorySource::deal(2, count + 4, 11);

                let tasks = (0..2).map(|_| {
                    let mut network = networks.remove(0);
                    let source = sources.remove(0);
                    async move {
                        let builder = Builder::new(network.party_id(), network.peers(), Box::new(source));
                        let mut acc = builder.input(0, Some(Fp::from_u64(2))).unwrap();
                        for _ in 0..count {
                            let next = builder.input(1, Some(Fp::from_u64(2))).unwrap();
                            acc = builder.multiply(acc, next).unwrap();
                        }

                        let mac_key_share = builder.with_preprocessing(|p| p.mac_key_share());
                        let mut evaluator = Evaluator::new(&mut network, None);
                        evaluator.run(&builder, mac_key_share).await.unwrap();
                    }
                });

                futures::future::join_all(tasks).await;
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_local_addition_chain, bench_multiply_chain);
criterion_main!(benches);
