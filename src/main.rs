//! `evwrite` — minimal write-test binary.
//!
//! Writes a configurable volume of fixed-size synthetic events through either
//! the pipeline writer (default) or the single-threaded writer (`--sync`),
//! and reports throughput. Exit codes: 0 success, 1 argument error, 2 I/O
//! error.

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use log::{debug, info, LevelFilter};

use evio::supply::open_writer;
use evio::{CompressionType, Endian, EvioError, WriterOptions};

#[derive(Debug, Parser)]
#[command(name = "evwrite", about = "evio write-throughput test")]
struct Args {
    /// Output file name (a template; may hold %d and $(VAR) specifiers).
    #[arg(short = 'o', long = "output")]
    output: String,

    /// Total bytes of event payload to write per repeat.
    #[arg(short = 's', long = "size", default_value_t = 100_000_000)]
    total_bytes: u64,

    /// Bytes per event (rounded up to whole words).
    #[arg(short = 'b', long = "event-bytes", default_value_t = 400)]
    event_bytes: usize,

    /// Number of times to repeat the write loop.
    #[arg(short = 'n', long = "repeat", default_value_t = 1)]
    repeat: u32,

    /// Use the single-threaded synchronous writer instead of the pipeline.
    #[arg(long)]
    sync: bool,

    /// Verbose (debug-level) logging.
    #[arg(long)]
    debug: bool,

    /// Record compression: none, lz4, lz4hc, gzip.
    #[arg(long, default_value = "lz4")]
    compression: String,
}

fn parse_compression(name: &str) -> Result<CompressionType, String> {
    match name {
        "none" => Ok(CompressionType::None),
        "lz4" => Ok(CompressionType::Lz4),
        "lz4hc" => Ok(CompressionType::Lz4Hc),
        "gzip" => Ok(CompressionType::Gzip),
        other => Err(format!("unknown compression {other:?}")),
    }
}

fn run(args: &Args) -> evio::Result<()> {
    let compression =
        parse_compression(&args.compression).map_err(EvioError::InvalidState)?;
    let workers = if args.sync {
        1
    } else {
        num_cpus::get().clamp(1, 4)
    };
    let event_bytes = (args.event_bytes.max(4) + 3) & !3;
    let events_per_pass = (args.total_bytes / event_bytes as u64).max(1);

    // Patterned payload: compressible, nonzero, stable across runs.
    let event: Vec<u8> = (0..event_bytes).map(|i| ((i * 31) % 253) as u8).collect();

    info!(
        "writing {} x {} events of {} bytes ({} workers) to {}",
        args.repeat, events_per_pass, event_bytes, workers, args.output
    );

    let opts = WriterOptions::new(&args.output)
        .byte_order(Endian::Big)
        .compression(compression)
        .workers(workers);

    let start = Instant::now();
    let mut written = 0u64;
    let mut writer = open_writer(opts)?;
    for pass in 0..args.repeat {
        debug!("pass {}", pass + 1);
        for _ in 0..events_per_pass {
            writer.add_event(&event)?;
            written += event_bytes as u64;
        }
    }
    writer.close()?;

    let elapsed = start.elapsed().as_secs_f64();
    info!(
        "wrote {} MiB in {:.2} s ({:.1} MiB/s)",
        written >> 20,
        elapsed,
        (written >> 20) as f64 / elapsed.max(1e-9)
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(a) => a,
        Err(e) => {
            // Help and version requests are not argument errors.
            if e.use_stderr() {
                eprintln!("{e}");
                return ExitCode::from(1);
            }
            print!("{e}");
            return ExitCode::SUCCESS;
        }
    };

    env_logger::Builder::new()
        .filter_level(if args.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(EvioError::Io(e)) => {
            eprintln!("evwrite: i/o error: {e}");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("evwrite: {e}");
            ExitCode::from(1)
        }
    }
}
