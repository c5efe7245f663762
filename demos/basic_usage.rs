use sglx_extrema::{open, ScanRequest, TimeWindow};
use std::env;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <path_to_bin_file>", args[0]);
        std::process::exit(1);
    }

    // Open the .bin and its .meta sidecar
    let mut recording = open(&args[1])?;
    println!("{}", recording.describe());

    let geometry = *recording.geometry();
    println!(
        "\nGeometry: {} channels x {} samples",
        geometry.n_chan(),
        geometry.n_file_samp()
    );

    // First 10,000 samples in chunks of 1,000
    let extrema = recording.scan(&ScanRequest::new(0, 10_000).with_chunk_size(1_000))?;
    println!("\nFirst {} chunks, channel 0:", extrema.n_chunks());
    let mins = extrema.mins(0);
    let maxes = extrema.maxes(0);
    for (chunk, (min, max)) in mins.iter().zip(&maxes).enumerate() {
        println!("  chunk {}: [{}, {}]", chunk, min, max);
    }

    // The first second, if the sample rate is known
    if recording.meta.sample_rate.is_some() {
        let scanned = recording.scan_window(&TimeWindow::new(0.0, 1.0), 100)?;
        if let Some(((min, _), (max, max_idx))) = scanned.extrema.channel_range(0) {
            println!("\nFirst second, channel 0: min {}, max {} (sample {})", min, max, max_idx);
        }
    }

    Ok(())
}
