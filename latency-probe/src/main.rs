mod commands;
mod console;
mod upload;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use commands::{EngineArgs, LoopbackArgs, ProbeArgs};

/// Command-line arguments for latency-probe
#[derive(Parser, Debug)]
#[command(name = "latency-probe")]
#[command(about = "Measure audio buffer size, clock drift and scheduling jitter")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Calibrate, run the experiment sweep and submit the report
    Probe(ProbeArgs),
    /// Find the sample rate and buffer size with the lowest jitter
    Calibrate(EngineArgs),
    /// Measure thread hand-off latency of the engine
    SelfTest(EngineArgs),
    /// Play the microphone back through the speaker with a delay
    Loopback(LoopbackArgs),
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => log::error!("failed to encode output: {}", e),
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    log::debug!("{:?}", cli);

    let result = match cli.command {
        Command::Probe(ref args) => commands::probe(args).map(|summary| {
            if args.engine.json {
                print_json(&summary);
            }
        }),
        Command::Calibrate(ref args) => commands::calibrate(args).map(|result| {
            if args.json {
                print_json(&result);
            } else {
                println!(
                    "buffer size {} at {} (jitter {:.3} ms)",
                    result.buffer_size,
                    result.sample_rate_label(),
                    result.jitter * 1000.0
                );
            }
        }),
        Command::SelfTest(ref args) => commands::self_test(args).map(|_| ()),
        Command::Loopback(ref args) => commands::loopback(args).map(|diagnostics| {
            if args.json {
                print_json(&diagnostics);
            } else {
                println!(
                    "captured {} bytes, played {} ({} dropped, {} underrun polls)",
                    diagnostics.bytes_captured,
                    diagnostics.bytes_played,
                    diagnostics.bytes_dropped,
                    diagnostics.underrun_polls
                );
            }
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
