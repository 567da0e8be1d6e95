//! Scenario-level integration tests, run as a `harness = false` binary
//! rather than `#[test]` functions so a failing scenario can report which
//! named scenario failed without the rest aborting, mirroring the teacher's
//! own split of unit tests (`#[cfg(test)]` modules, still run by the
//! default harness) from scenario tests
//! (`examples/ertosns-mpc-stark/integration/authenticated_stark_point.rs`,
//! run under its own `[[test]] ... harness = false` entry).
//!
//! Covers every concrete end-to-end scenario in spec.md §8.

use std::process::ExitCode;
use std::time::Duration;

use async_trait::async_trait;

use fresco::builder::result::ResultHandle;
use fresco::builder::Builder;
use fresco::error::FrescoError;
use fresco::evaluator::Evaluator;
use fresco::field::{Field, Fp};
use fresco::mac_check::{self, OpenedValueStore};
use fresco::network::{InMemoryDuplexNetwork, MpcNetwork, PeerBuffer};
use fresco::numeric::Numeric;
use fresco::preprocessing::{InMemorySource, Preprocessing};
use fresco::share::OpenedValue;
use fresco::PartyId;

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("building a current-thread runtime")
        .block_on(f)
}

/// Run `program` to completion for every one of `n` simulated parties over
/// an in-memory network, returning each party's opened outputs plus the
/// batch index its evaluator finished on
async fn run_program<F>(
    n: usize,
    preprocessing_count: usize,
    seed: u64,
    program: F,
) -> Result<(Vec<Vec<Fp>>, u64), String>
where
    F: Fn(&Builder) -> Vec<ResultHandle<OpenedValue>> + Clone,
{
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
            evaluator.run(&builder, mac_key_share).await?;

            let batch = evaluator.batch();
            let values = outs.iter().map(|&h| builder.extract(h).map(|o| o.value)).collect::<Result<Vec<_>, _>>()?;
            Ok::<_, fresco::error::FrescoError>((values, batch))
        }
    });

    let results = futures::future::join_all(tasks).await;
    let mut per_party = Vec::with_capacity(n);
    let mut final_batch = 0;
    for r in results {
        let (values, batch) = r.map_err(|e| e.to_string())?;
        per_party.push(values);
        final_batch = batch;
    }
    Ok((per_party, final_batch))
}

fn scenario_1_sum_and_difference_then_multiply() -> Result<(), String> {
    block_on(async {
        let (per_party, _batches) = run_program(2, 4, 1, |b| {
            let x = b.input(0, if b.party_id() == 0 { Some(Fp::from_u64(7)) } else { None }).unwrap();
            let y = b.input(1, if b.party_id() == 1 { Some(Fp::from_u64(5)) } else { None }).unwrap();
            let sum = b.add(x, y);
            let diff = b.sub(x, y);
            let product = b.multiply(sum, diff).unwrap();
            vec![b.open(product)]
        })
        .await?;

        for values in per_party {
            if values != vec![Fp::from_u64(24)] {
                return Err(format!("expected [24], got {values:?}"));
            }
        }
        Ok(())
    })
}

fn scenario_2_vector_times_scalar_is_one_multiply_round() -> Result<(), String> {
    block_on(async {
        let (per_party, batches) = run_program(2, 8, 2, |b| {
            // A `par` scope, not five sequential root-level calls: the root
            // scope is `Sequential`, so without this every input would wait
            // for the previous one to fully resolve before starting, instead
            // of all five batching into the same two broadcast rounds.
            let (elements, scalar) = b.par(|pb| {
                let elements: Vec<_> = [1u64, 2, 3, 4]
                    .iter()
                    .map(|&v| pb.input(0, if pb.party_id() == 0 { Some(Fp::from_u64(v)) } else { None }).unwrap())
                    .collect();
                let scalar = pb.input(1, if pb.party_id() == 1 { Some(Fp::from_u64(10)) } else { None }).unwrap();
                (elements, scalar)
            });

            let products = b.par(|pb| elements.iter().map(|&x| pb.multiply(x, scalar).unwrap()).collect::<Vec<_>>());
            b.par(|pb| products.into_iter().map(|p| pb.open(p)).collect())
        })
        .await?;

        let expected = vec![Fp::from_u64(10), Fp::from_u64(20), Fp::from_u64(30), Fp::from_u64(40)];
        for values in per_party {
            if values != expected {
                return Err(format!("expected {expected:?}, got {values:?}"));
            }
        }

        // The five inputs batch into the same two broadcast-with-validation
        // rounds (sender broadcast, then hash-validation broadcast), followed
        // by one multiply round shared by all four products, then one open
        // round shared by all four opens (also `par`'d, else the four opens
        // would run as four separate sequential root-level rounds): 4 total.
        if batches != 4 {
            return Err(format!("expected 4 total batches (2 input rounds + 1 multiply round + 1 open round), got {batches}"));
        }
        Ok(())
    })
}

fn scenario_3_three_party_sum_of_squares() -> Result<(), String> {
    block_on(async {
        let (per_party, _batches) = run_program(3, 4, 3, |b| {
            let inputs: Vec<_> = (0..3)
                .map(|p| b.input(p, if b.party_id() == p { Some(Fp::from_u64(1)) } else { None }).unwrap())
                .collect();
            let squares = b.par(|pb| inputs.iter().map(|&x| pb.multiply(x, x).unwrap()).collect::<Vec<_>>());
            let sum = squares[1..].iter().fold(squares[0], |acc, &s| b.add(acc, s));
            vec![b.open(sum)]
        })
        .await?;

        for values in per_party {
            if values != vec![Fp::from_u64(3)] {
                return Err(format!("expected [3], got {values:?}"));
            }
        }
        Ok(())
    })
}

fn scenario_4_tampered_mac_share_fails_the_check() -> Result<(), String> {
    block_on(async {
        let mut networks = InMemoryDuplexNetwork::new_n_party(2, Duration::from_secs(1));
        let alpha = Fp::from_u64(7);
        let value = Fp::from_u64(9);
        let honest_mac = alpha * value;

        let mut store0 = OpenedValueStore::new();
        store0.push(OpenedValue { value, mac_share: honest_mac, public_modifier: Fp::zero() });
        let mut store1 = OpenedValueStore::new();
        // party 1 flips a bit of its share just before the check runs
        store1.push(OpenedValue { value, mac_share: honest_mac + Fp::from_u64(1), public_modifier: Fp::zero() });

        let mut net1 = networks.remove(1);
        let mut net0 = networks.remove(0);

        let (r0, r1) = tokio::join!(
            mac_check::run_mac_check(&mut net0, &mut store0, alpha, 0),
            mac_check::run_mac_check(&mut net1, &mut store1, Fp::zero(), 0),
        );

        if r0.is_ok() || r1.is_ok() {
            return Err("expected the mac-check to fail for both parties".to_string());
        }
        Ok(())
    })
}

fn scenario_5_parallel_multiplies_then_sequential_add_and_open() -> Result<(), String> {
    block_on(async {
        let mut networks = InMemoryDuplexNetwork::new_n_party(2, Duration::from_secs(5));
        let mut sources = InMemorySource::deal(2, 4, 5);

        let tasks = (0..2).map(|_| {
            let mut network = networks.remove(0);
            let source = sources.remove(0);
            async move {
                let mac_key_share = source.mac_key_share();
                let builder = Builder::new(network.party_id(), network.peers(), Box::new(source));

                // random, not `input`: drawing from preprocessing has zero
                // rounds, isolating the round count below to exactly the
                // parallel-multiply-then-open phase the scenario measures
                let a = builder.random().unwrap();
                let b = builder.random().unwrap();
                let c = builder.random().unwrap();
                let d = builder.random().unwrap();

                let mut evaluator = Evaluator::new(&mut network, None);

                let (ab, cd) = builder.par(|pb| (pb.multiply(a, b).unwrap(), pb.multiply(c, d).unwrap()));
                let sum = builder.add(ab, cd);
                let opened = builder.open(sum);

                evaluator.run(&builder, mac_key_share).await?;
                let batches = evaluator.batch();
                let value = builder.extract(opened)?.value;
                Ok::<_, fresco::error::FrescoError>((value, batches))
            }
        });

        let results = futures::future::join_all(tasks).await;
        for r in results {
            let (_value, batches) = r.map_err(|e| e.to_string())?;
            if batches != 2 {
                return Err(format!("expected 2 rounds (1 parallel multiply, 1 open), got {batches}"));
            }
        }
        Ok(())
    })
}

fn scenario_6_resource_exhaustion_aborts_at_the_exact_batch() -> Result<(), String> {
    let mut sources = InMemorySource::deal(2, 1, 7);
    let source = sources.remove(0);
    let builder = Builder::new(0, vec![1], Box::new(source));

    let x = builder.input(0, Some(Fp::from_u64(3))).map_err(|e| e.to_string())?;
    let y = builder.input(1, None).map_err(|e| e.to_string())?;

    builder.multiply(x, y).map_err(|e| format!("first multiply should have succeeded: {e}"))?;
    match builder.multiply(x, y) {
        Err(fresco::error::FrescoError::ResourceExhausted { .. }) => Ok(()),
        Err(other) => Err(format!("expected ResourceExhausted, got {other}")),
        Ok(_) => Err("expected the second multiply to fail once the triple queue ran dry".to_string()),
    }
}

/// A network wrapper that, when `cheat` is set, flips a bit of this party's
/// own outbound Beaver `ε`/`δ` broadcast (the unique 16-byte
/// `MultiplyProtocol` payload, twice `Fp::BYTE_LEN`) every time one goes
/// out, simulating a party that lies about its own triple-masking share
/// during a multiply
struct CheatingNetwork {
    inner: InMemoryDuplexNetwork,
    cheat: bool,
}

#[async_trait]
impl MpcNetwork for CheatingNetwork {
    fn party_id(&self) -> PartyId {
        self.inner.party_id()
    }

    fn peers(&self) -> Vec<PartyId> {
        self.inner.peers()
    }

    async fn send_then_receive(&mut self, mut outbound: PeerBuffer) -> Result<PeerBuffer, FrescoError> {
        if self.cheat {
            for payload in outbound.values_mut() {
                if payload.len() == 2 * Fp::BYTE_LEN {
                    payload[0] ^= 0xFF;
                }
            }
        }
        self.inner.send_then_receive(outbound).await
    }
}

fn scenario_7_a_lying_eps_delta_share_fails_the_mac_check() -> Result<(), String> {
    block_on(async {
        let networks = InMemoryDuplexNetwork::new_n_party(2, Duration::from_secs(5));
        let mut sources = InMemorySource::deal(2, 2, 9);

        let tasks = networks.into_iter().enumerate().map(|(party, network)| {
            let source = sources.remove(0);
            async move {
                let mac_key_share = source.mac_key_share();
                let builder = Builder::new(party as PartyId, network.peers(), Box::new(source));

                let x = builder.input(0, if party == 0 { Some(Fp::from_u64(6)) } else { None }).unwrap();
                let y = builder.input(1, if party == 1 { Some(Fp::from_u64(4)) } else { None }).unwrap();
                let product = builder.multiply(x, y).unwrap();
                let _opened = builder.open(product);

                // only party 1 lies about its eps/delta broadcast; before
                // `MultiplyProtocol::opened_values` existed this was
                // structurally invisible to the mac-check (the opened-value
                // store never heard about eps/delta at all), so both
                // parties would have reconstructed a silently wrong product
                let mut network = CheatingNetwork { inner: network, cheat: party == 1 };
                let mut evaluator = Evaluator::new(&mut network, None);
                evaluator.run(&builder, mac_key_share).await
            }
        });

        let results = futures::future::join_all(tasks).await;
        if results.iter().any(|r| r.is_ok()) {
            return Err("expected the mac-check to catch the corrupted eps/delta share".to_string());
        }
        Ok(())
    })
}

fn main() -> ExitCode {
    let scenarios: [(&str, fn() -> Result<(), String>); 7] = [
        ("scenario_1_sum_and_difference_then_multiply", scenario_1_sum_and_difference_then_multiply),
        ("scenario_2_vector_times_scalar_is_one_multiply_round", scenario_2_vector_times_scalar_is_one_multiply_round),
        ("scenario_3_three_party_sum_of_squares", scenario_3_three_party_sum_of_squares),
        ("scenario_4_tampered_mac_share_fails_the_check", scenario_4_tampered_mac_share_fails_the_check),
        ("scenario_5_parallel_multiplies_then_sequential_add_and_open", scenario_5_parallel_multiplies_then_sequential_add_and_open),
        ("scenario_6_resource_exhaustion_aborts_at_the_exact_batch", scenario_6_resource_exhaustion_aborts_at_the_exact_batch),
        ("scenario_7_a_lying_eps_delta_share_fails_the_mac_check", scenario_7_a_lying_eps_delta_share_fails_the_mac_check),
    ];

    let mut failed = false;
    for (name, run) in scenarios {
        print!("{name} ... ");
        match run() {
            Ok(()) => println!("ok"),
            Err(e) => {
                println!("FAILED: {e}");
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
