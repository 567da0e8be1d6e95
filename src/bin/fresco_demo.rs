//! A small CLI that runs one fixed two-party program end to end over an
//! in-memory network and prints the result, so the engine can be exercised
//! without wiring up real transport or an offline phase.
//!
//! `clap` for argument parsing and `tracing`/`tracing-subscriber` for
//! logging mirror the teacher's own demo/sample-data binaries
//! (`examples/TaceoLabs-worldcoin-experiments/iris-mpc/src/bin/create_sample_data.rs`),
//! generalized from a database-seeding tool to a session runner.

use clap::Parser;
use tracing::info;

use fresco::builder::result::ResultHandle;
use fresco::builder::Builder;
use fresco::field::{Field, Fp};
use fresco::network::InMemoryDuplexNetwork;
use fresco::numeric::Numeric;
use fresco::preprocessing::InMemorySource;
use fresco::session::run_mpc;
use fresco::share::OpenedValue;

/// Run `(x + y) * (x - y)` as a two-party computation and print the result
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Opts {
    /// Party 0's secret input
    #[arg(short = 'x', long, default_value_t = 7)]
    x: u64,

    /// Party 1's secret input
    #[arg(short = 'y', long, default_value_t = 5)]
    y: u64,

    /// Seed for the dealt preprocessing material
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// How many triples/masks/random shares/bits to pre-deal per party
    #[arg(long, default_value_t = 16)]
    preprocessing_count: usize,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let opts = Opts::parse();

    info!(x = opts.x, y = opts.y, "running (x + y) * (x - y) as a two-party computation");

    let mut networks = InMemoryDuplexNetwork::new_n_party(2, std::time::Duration::from_secs(5));
    let mut sources = InMemorySource::deal(2, opts.preprocessing_count, opts.seed);

    let network1 = networks.remove(1);
    let network0 = networks.remove(0);
    let source1 = sources.remove(1);
    let source0 = sources.remove(0);

    let x_input = opts.x;
    let y_input = opts.y;
    let program = move |b: &Builder| -> ResultHandle<OpenedValue> {
        let x = b.input(0, Some(Fp::from_u64(x_input))).expect("input masks were dealt above");
        let y = b.input(1, Some(Fp::from_u64(y_input))).expect("input masks were dealt above");
        let sum = b.add(x, y);
        let diff = b.sub(x, y);
        let product = b.multiply(sum, diff).expect("triples were dealt above");
        b.open(product)
    };

    let party0 = run_mpc::<OpenedValue, _, _>(network0, Box::new(source0), None, program.clone());
    let party1 = run_mpc::<OpenedValue, _, _>(network1, Box::new(source1), None, program);

    let (result0, result1) = futures::future::join(party0, party1).await;
    let opened = result0.expect("party 0's run");
    result1.expect("party 1's run");

    println!("(x + y) * (x - y) = {:?}", opened.value);
}
