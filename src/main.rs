use std::path::Path;
use std::process::ExitCode;

use approx_srpt::config::{self, SimConfig};
use approx_srpt::output::{ArrivalLedger, LoadLedger, LogSink};
use approx_srpt::{RunResult, SimError};
use tracing::error;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: {} <config.toml>", args[0]);
        return ExitCode::from(2);
    }

    if let Err(e) = approx_srpt::init_tracing() {
        eprintln!("{e}");
    }

    match run(Path::new(&args[1])) {
        Ok(result) => {
            print_summary(&result);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(path: &Path) -> Result<RunResult, SimError> {
    let config: SimConfig = config::load_from_file(path)?;
    let handle = approx_srpt::configure(&config)?;
    let params = handle.params();
    println!(
        "Service: {}, Arrival rate: {}, Classes: {}, Length: {}, Policy: {:?}, Seed: {}",
        params.service,
        params.arrival_rate,
        params.num_classes,
        params.simulation_length,
        params.policy,
        params.seed
    );

    let arrivals = match &config.output.arrivals {
        Some(path) => Some(ArrivalLedger::create(path)?),
        None => None,
    };
    let loads = match &config.output.load_per_class {
        Some(path) => Some(LoadLedger::create(path, params.num_classes)?),
        None => None,
    };

    let mut sinks = (LogSink, (arrivals, loads));
    let result = handle.run_with(&mut sinks)?;

    let (_, (arrivals, loads)) = sinks;
    if let Some(ledger) = arrivals {
        ledger.finish()?;
    }
    if let Some(ledger) = loads {
        ledger.finish()?;
    }
    Ok(result)
}

fn print_summary(result: &RunResult) {
    if result.stopped {
        println!("Stopped early at t = {}", result.end_time);
    }
    println!("Seed: {}", result.seed);
    println!("Arrivals: {}, Completions: {}", result.arrivals, result.completions);
    println!(
        "Average number of jobs in system: {}",
        result.average_number_in_system
    );
    for (i, (avg, load)) in result
        .average_number_per_class
        .iter()
        .zip(&result.per_class_load)
        .enumerate()
    {
        println!("Class {}: average number {}, load {}", i + 1, avg, load);
    }
    println!(
        "Mean response time: {}, Mean |percent error|: {}",
        result.mean_response_time, result.mean_abs_percent_error
    );
}
