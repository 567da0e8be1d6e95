//! Property tests for the testable invariants in spec.md §8
//!
//! Driven by `proptest` (the pack's `cberkhoff-ipa` also reaches for it,
//! `examples/cberkhoff-ipa/src/protocol/malicious.rs`), with small
//! parameter sweeps over party count and field values rather than the full
//! `u64` range, since every case drives a real two- or three-party session
//! over an in-memory network to completion. Each property wraps its async
//! session in a freshly built current-thread `tokio` runtime, mirroring the
//! `block_on` helper `integration/main.rs` uses for the same reason: a
//! [`fresco::builder::Builder`] is a single-threaded, `Rc`-based handle
//! (spec.md §5), so simulating several parties means polling their futures
//! concurrently on one task rather than spawning them across worker threads.

use std::time::Duration;

use proptest::prelude::*;

use fresco::builder::result::ResultHandle;
use fresco::builder::Builder;
use fresco::evaluator::Evaluator;
use fresco::field::{Field, Fp};
use fresco::network::InMemoryDuplexNetwork;
use fresco::numeric::Numeric;
use fresco::preprocessing::InMemorySource;
use fresco::share::OpenedValue;

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("building a current-thread runtime")
        .block_on(f)
}

/// Run `program` for every one of `n` parties over a fresh in-memory
/// network and dealt preprocessing, returning each party's opened output
/// values plus the final batch count every party finished on (spec.md §5's
/// batching-determinism guarantee means this is the same for every party)
fn run_program<F>(n: usize, preprocessing_count: usize, seed: u64, program: F) -> (Vec<Vec<Fp>>, u64)
where
    F: Fn(&Builder) -> Vec<ResultHandle<OpenedValue>> + Clone,
{
    block_on(async {
        let mut networks = InMemoryDuplexNetwork::new_n_party(n, Duration::from_secs(5));
        let mut sources = InMemorySource::deal(n, preprocessing_count, seed);

        let tasks = (0..n).map(|_| {
            let mut network = networks.remove(0);
            let source = sources.remove(0);
            let program = program.clone();
            async move {
                let mac_key_share = source.mac_key_share();
                let builder = Builder::new(network.party_id(), network.peers(), Box::new(source));
                let outs = program(&builder);

                let mut evaluator = Evaluator::new(&mut network, None);
                evaluator.run(&builder, mac_key_share).await.unwrap();

                let batch = evaluator.batch();
                let values: Vec<Fp> = outs.iter().map(|&h| builder.extract(h).unwrap().value).collect();
                (values, batch)
            }
        });

        let results = futures::future::join_all(tasks).await;
        let mut per_party = Vec::with_capacity(n);
        let mut final_batch = 0;
        for (values, batch) in results {
            per_party.push(values);
            final_batch = batch;
        }
        (per_party, final_batch)
    })
}

/// A small range kept well clear of the 61-bit modulus so arithmetic never
/// wraps during the plain-field comparison
fn small_field_value() -> impl Strategy<Value = u64> {
    0u64..1_000_000
}

// Every case below drives a full in-memory session (network mesh,
// preprocessing deal, evaluator sweep) to completion, so the default 256
// cases would make this suite dominate the test run; a few dozen per
// property is still enough to catch a regression in these invariants.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Opening `x + y`, `x - y` and `c * x` over a two-party session always
    /// matches the plain-field result, for every secret x, y and public c
    /// (spec.md §8 "Correctness of arithmetic", the linear half)
    #[test]
    fn addition_subtraction_and_public_scaling_match_plain_field(
        x in small_field_value(), y in small_field_value(), c in small_field_value(),
    ) {
        let (per_party, batches) = run_program(2, 2, x ^ y ^ c, |b| {
            let (xs, ys) = b.par(|pb| {
                let xs = pb.input(0, if pb.party_id() == 0 { Some(Fp::from_u64(x)) } else { None }).unwrap();
                let ys = pb.input(1, if pb.party_id() == 1 { Some(Fp::from_u64(y)) } else { None }).unwrap();
                (xs, ys)
            });
            let sum = b.add(xs, ys);
            let diff = b.sub(xs, ys);
            let scaled = b.mul_known(xs, Fp::from_u64(c));
            b.par(|pb| vec![pb.open(sum), pb.open(diff), pb.open(scaled)])
        });

        let expected = vec![
            Fp::from_u64(x) + Fp::from_u64(y),
            Fp::from_u64(x) - Fp::from_u64(y),
            Fp::from_u64(x) * Fp::from_u64(c),
        ];
        for values in &per_party {
            prop_assert_eq!(values, &expected);
        }
        // every linear gate above is a zero-round local gate; the two
        // inputs run in parallel (2 rounds: sender + hash-validation) and
        // the three opens run in parallel too (1 round)
        prop_assert_eq!(batches, 3);
    }

    /// Opening `x * y` over a two-party session always matches the plain
    /// field product, costing exactly one multiply round beyond the two
    /// parallel input-broadcast rounds and the final open round (spec.md §8
    /// "Correctness of arithmetic", the multiplicative half, and its
    /// round-count claim)
    #[test]
    fn multiplication_matches_plain_field_and_costs_one_round(
        x in small_field_value(), y in small_field_value(),
    ) {
        let (per_party, batches) = run_program(2, 2, x.wrapping_mul(31).wrapping_add(y), |b| {
            let (xs, ys) = b.par(|pb| {
                let xs = pb.input(0, if pb.party_id() == 0 { Some(Fp::from_u64(x)) } else { None }).unwrap();
                let ys = pb.input(1, if pb.party_id() == 1 { Some(Fp::from_u64(y)) } else { None }).unwrap();
                (xs, ys)
            });
            let product = b.multiply(xs, ys).unwrap();
            vec![b.open(product)]
        });

        let expected = vec![Fp::from_u64(x) * Fp::from_u64(y)];
        for values in &per_party {
            prop_assert_eq!(values, &expected);
        }
        // 2 parallel input rounds + 1 multiply round + 1 open round
        prop_assert_eq!(batches, 4);
    }

    /// For all party counts n >= 2, every party in a successful session
    /// opens the same reconstructed value (spec.md §8 "Correctness of
    /// arithmetic" generalized across party count, and implicitly "MAC
    /// integrity": a tampered share would instead fail the final
    /// MAC-check inside `Evaluator::run` and panic the task's `unwrap()`)
    #[test]
    fn every_party_reconstructs_the_same_sum_for_any_party_count(
        n in 2usize..5, values in proptest::collection::vec(small_field_value(), 2..5),
    ) {
        let n = n.min(values.len());
        let values = &values[..n];
        let seed = values.iter().fold(0u64, |acc, v| acc.wrapping_mul(17).wrapping_add(*v));

        let owned: Vec<u64> = values.to_vec();
        let (per_party, _batches) = run_program(n, 4, seed, move |b| {
            let inputs: Vec<_> = owned
                .iter()
                .enumerate()
                .map(|(p, v)| b.input(p as u64, if b.party_id() == p as u64 { Some(Fp::from_u64(*v)) } else { None }).unwrap())
                .collect();
            let sum = inputs[1..].iter().fold(inputs[0], |acc, &x| b.add(acc, x));
            vec![b.open(sum)]
        });

        let expected: Fp = values.iter().fold(Fp::zero(), |acc, v| acc + Fp::from_u64(*v));
        for result in &per_party {
            prop_assert_eq!(result, &vec![expected]);
        }
    }

    /// Sequential and parallel composition of two independent multiplications
    /// produce the same output, and parallel composition never costs more
    /// rounds than sequential composition of the same gates (spec.md §8
    /// "Composition laws")
    #[test]
    fn parallel_composition_is_observationally_equivalent_to_sequential_and_never_slower(
        a in small_field_value(), b_ in small_field_value(), c in small_field_value(), d in small_field_value(),
    ) {
        let seed = a ^ b_ ^ c ^ d;

        let (seq_values, seq_batches) = run_program(2, 4, seed, |b| {
            b.seq(|b| {
                let x = b.random().unwrap();
                let y = b.random().unwrap();
                let u = b.random().unwrap();
                let v = b.random().unwrap();
                let first = b.multiply(x, y).unwrap();
                let second = b.multiply(u, v).unwrap();
                vec![b.open(b.add(first, second))]
            })
        });

        let (par_values, par_batches) = run_program(2, 4, seed, |b| {
            let (first, second) = b.par(|pb| {
                let x = pb.random().unwrap();
                let y = pb.random().unwrap();
                let u = pb.random().unwrap();
                let v = pb.random().unwrap();
                (pb.multiply(x, y).unwrap(), pb.multiply(u, v).unwrap())
            });
            vec![b.open(b.add(first, second))]
        });

        // both programs open a sum of two products of independently random
        // shares; they aren't the same secret values, so compare round
        // counts (the actual composition law under test) and only assert
        // internal agreement -- every party in each run must see the same
        // thing as every other party in that same run
        for values in &seq_values {
            prop_assert_eq!(values, &seq_values[0]);
        }
        for values in &par_values {
            prop_assert_eq!(values, &par_values[0]);
        }
        prop_assert!(par_batches <= seq_batches);
    }
}
