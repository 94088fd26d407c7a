mod interactive;

use std::{fs::File, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use core_sim::{
    cache::Counters,
    config::{CacheConfig, PartialConfig},
    sim::Simulator,
    trace::TraceReader,
};

#[cfg(feature = "stat")]
use terminal_size::terminal_size;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Replays a memory trace against a set-associative LRU cache",
    long_about = None,
    after_help = "Examples:\n  csim -s 4 -E 1 -b 4 -t traces/yi.trace\n  csim -v -s 8 -E 2 -b 4 -t traces/yi.trace"
)]
struct Cli {
    /// Number of set index bits
    #[arg(short = 's', value_name = "num")]
    set_bits: Option<u32>,
    /// Number of lines per set (associativity)
    #[arg(short = 'E', value_name = "num")]
    associativity: Option<usize>,
    /// Number of block offset bits
    #[arg(short = 'b', value_name = "num")]
    block_bits: Option<u32>,
    /// Trace file
    #[arg(short = 't', value_name = "file")]
    trace: PathBuf,
    /// Display the outcome of every record
    #[arg(short, long)]
    verbose: bool,
    /// JSON file holding `s`, `E` and `b` (command line values take precedence)
    #[arg(long, value_name = "file")]
    config: Option<PathBuf>,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
    /// Enable interactive mode
    #[arg(long)]
    interactive: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::init();
    }
    let config = read_config(&args)?;
    let mut sim = Simulator::new(config)?;
    let records = TraceReader::open(&args.trace)
        .with_context(|| format!("cannot open trace {}", args.trace.display()))?;
    if args.interactive {
        interactive::execute_interactive(&mut sim, records)?;
    } else {
        let verbose = args.verbose;
        sim.replay(records, |_, record, outcome| {
            if verbose && !outcome.is_empty() {
                println!("{record} {outcome}");
            }
        })?;
    }
    output_stat(&sim);
    print_summary(sim.counters(), args.json)
}

fn read_config(args: &Cli) -> Result<CacheConfig> {
    let from_args = PartialConfig {
        set_bits: args.set_bits,
        associativity: args.associativity,
        block_bits: args.block_bits,
    };
    let from_file = match &args.config {
        Some(p) => {
            let file = File::open(p)
                .with_context(|| format!("cannot open config {}", p.display()))?;
            CacheConfig::deser(file)?
        }
        None => Default::default(),
    };
    let config = from_args
        .or(from_file)
        .build()
        .context("invalid cache configuration (see `csim --help`)")?;
    Ok(config)
}

fn print_summary(counters: Counters, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&counters)?);
    } else {
        println!("{counters}");
    }
    Ok(())
}

#[cfg(not(feature = "stat"))]
fn output_stat(_: &Simulator) {}

#[cfg(feature = "stat")]
fn output_stat(sim: &Simulator) {
    let max_width = get_terminal_width().unwrap_or(120) as usize;
    log::info!("statistics:\n{}", sim.collect_stat().view(max_width));
}

#[cfg(feature = "stat")]
fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0.saturating_sub(20))
}
