use clap::{Parser, Subcommand};
use log::info;
use std::error::Error;
use std::path::PathBuf;

use sglx_extrema::{find_bin_files, Recording, ScanRequest, TimeWindow, DEFAULT_CHUNK_SIZE};

#[derive(Parser)]
#[command(name = "sglx-extrema")]
#[command(about = "Per-chunk min/max scanning of SpikeGLX binary recordings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan one .bin file and print per-chunk extrema
    Scan {
        /// Path to the .bin file (its .meta must sit beside it)
        bin: PathBuf,

        /// First sample to scan (negative values clamp to 0)
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        samp0: i64,

        /// Number of samples to scan (default: to end of file)
        #[arg(long)]
        nsamp: Option<i64>,

        /// Samples per chunk
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Spread chunks across all cores
        #[arg(long)]
        parallel: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Describe every .bin under a directory and its value range in a window
    Summary {
        /// Recording directory to search recursively
        dir: PathBuf,

        /// Window start in seconds
        #[arg(long, default_value_t = 0.0)]
        start: f64,

        /// Window length in seconds (default: to end of file)
        #[arg(long)]
        duration: Option<f64>,

        /// Samples per chunk
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Scan {
            bin,
            samp0,
            nsamp,
            chunk_size,
            parallel,
            json,
        } => {
            let request = ScanRequest {
                samp_0: samp0,
                n_samp: nsamp.unwrap_or(i64::MAX),
                chunk_size,
            };
            run_scan(bin, request, parallel, json)
        }
        Commands::Summary {
            dir,
            start,
            duration,
            chunk_size,
        } => {
            let window = TimeWindow {
                start_secs: start,
                duration_secs: duration,
            };
            run_summary(dir, window, chunk_size)
        }
    }
}

fn run_scan(
    bin: PathBuf,
    request: ScanRequest,
    parallel: bool,
    json: bool,
) -> Result<(), Box<dyn Error>> {
    let mut recording = Recording::open(&bin)?;
    let extrema = if parallel {
        recording.scan_parallel(&request)?
    } else {
        recording.scan(&request)?
    };

    if json {
        println!("{}", serde_json::to_string(&extrema)?);
        return Ok(());
    }

    println!(
        "{} chunks x {} channels",
        extrema.n_chunks(),
        extrema.n_chan()
    );
    for chunk in 0..extrema.n_chunks() {
        let (min_col, max_col) = (2 * chunk, 2 * chunk + 1);
        for chan in 0..extrema.n_chan() {
            println!(
                "chunk {} chan {}: min {} @ {}, max {} @ {}",
                chunk,
                chan,
                extrema.values[[chan, min_col]],
                extrema.indices[[chan, min_col]],
                extrema.values[[chan, max_col]],
                extrema.indices[[chan, max_col]]
            );
        }
    }
    Ok(())
}

fn run_summary(dir: PathBuf, window: TimeWindow, chunk_size: usize) -> Result<(), Box<dyn Error>> {
    let bin_files = find_bin_files(&dir)?;
    if bin_files.is_empty() {
        return Ok(());
    }

    match window.duration_secs {
        Some(d) => info!(
            "Summarizing {} seconds starting at {}, for each file.",
            d, window.start_secs
        ),
        None => info!(
            "Summarizing from {} seconds to the end, for each file.",
            window.start_secs
        ),
    }

    let mut end_time = window.start_secs;
    for bin_file in bin_files {
        let mut recording = Recording::open(&bin_file)?;
        println!("\n{}", recording.describe());

        let scanned = recording.scan_window(&window, chunk_size)?;
        for chan in 0..scanned.extrema.n_chan() {
            if let Some(((min, min_idx), (max, max_idx))) = scanned.extrema.channel_range(chan) {
                println!(
                    "  chan {}: min {} @ sample {}, max {} @ sample {}",
                    chan, min, min_idx, max, max_idx
                );
            }
        }
        if let Some(last) = scanned.last_time() {
            end_time = end_time.max(last);
        }
    }

    println!("\nLatest extremum time: {:.3} seconds", end_time);
    Ok(())
}
