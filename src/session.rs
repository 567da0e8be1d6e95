//! Program interface: wires a [`Builder`], an [`Evaluator`] and a final
//! [`crate::mac_check`] behind one entry point (spec.md §6 "Program
//! interface")
//!
//! `run_mpc` is the crate's `run(program) -> outputs`: it builds the graph
//! by calling `program` once against a fresh [`Builder`], drives it to
//! completion with an [`Evaluator`], and only returns the root's output
//! after a final MAC-check over everything opened during the run succeeds
//! (spec.md §4.5 "at every program boundary that would leak a secret").
//! Per spec.md §9 open question (c), there is no implicit, unchecked
//! delivery path: a program whose evaluator loop somehow returned without
//! that final check would be a bug in this module, not a supported mode.

use crate::builder::result::{FromResultValue, ResultHandle};
use crate::builder::Builder;
use crate::error::FrescoResult;
use crate::evaluator::Evaluator;
use crate::network::MpcNetwork;
use crate::preprocessing::Preprocessing;

/// Build and run a program to completion over `network`, returning its
/// root output once a final MAC-check over every value it opened succeeds
///
/// `program` is called exactly once, synchronously, before any network
/// I/O happens: building a graph never blocks (spec.md §4.1 "lazy
/// execution" -- a leaf's protocol is registered immediately but does not
/// run until the evaluator collects it). `mac_check_interval` additionally
/// runs a check every that many batches, bounding how long a cheating
/// party's lie can go undetected during a long-running program (spec.md
/// §4.5); pass `None` to only check once, at the end.
pub async fn run_mpc<T, N, F>(
    mut network: N,
    mut preprocessing: Box<dyn Preprocessing>,
    mac_check_interval: Option<u64>,
    program: F,
) -> FrescoResult<T>
where
    T: FromResultValue,
    N: MpcNetwork,
    F: FnOnce(&Builder) -> ResultHandle<T>,
{
    let party_id = network.party_id();
    let peers = network.peers();
    let mac_key_share = preprocessing.mac_key_share();

    let builder = Builder::new(party_id, peers, preprocessing);
    let out = program(&builder);

    let mut evaluator = Evaluator::new(&mut network, mac_check_interval);
    evaluator.run(&builder, mac_key_share).await?;

    builder.extract(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Field, Fp};
    use crate::numeric::Numeric;
    use crate::share::OpenedValue;
    use crate::test_helpers::mock_session;

    #[tokio::test]
    async fn end_to_end_program_matches_plain_arithmetic() {
        // Scenario 1 from spec.md §8: party 0 inputs 7, party 1 inputs 5,
        // compute (x+y)*(x-y), open. Expect 24.
        let (mut networks, mut sources) = mock_session(2, 8, 99);

        let tasks = (0..2).map(|party_id| {
            let network = networks.remove(0);
            let source = sources.remove(0);
            async move {
                run_mpc::<OpenedValue, _, _>(network, Box::new(source), None, move |b| {
                    let x = b.input(0, Some(Fp::from_u64(7))).unwrap();
                    let y = b.input(1, Some(Fp::from_u64(5))).unwrap();
                    let sum = b.add(x, y);
                    let diff = b.sub(x, y);
                    let product = b.multiply(sum, diff).unwrap();
                    b.open(product)
                })
                .await
                .unwrap()
                .value
            }
        });

        let results = futures::future::join_all(tasks).await;
        assert_eq!(results, vec![Fp::from_u64(24), Fp::from_u64(24)]);
    }

    #[tokio::test]
    async fn resource_exhaustion_aborts_with_diagnostic() {
        // Scenario 6 from spec.md §8: the preprocessing supplier runs dry
        // exactly one triple short of what the program needs. A deal of
        // one triple lets a first `multiply` succeed; a second must fail
        // the instant it is constructed, since `MultiplyProtocol::new`
        // draws its triple eagerly rather than waiting for the evaluator.
        let (_networks, mut sources) = mock_session(2, 1, 7);
        let source = sources.remove(0);
        let builder = Builder::new(0, vec![1], Box::new(source));

        let x = builder.input(0, Some(Fp::from_u64(3))).unwrap();
        let y = builder.input(1, None).unwrap();

        assert!(builder.multiply(x, y).is_ok());
        let err = builder.multiply(x, y).unwrap_err();
        assert!(matches!(err, crate::error::FrescoError::ResourceExhausted { .. }));
    }
}
