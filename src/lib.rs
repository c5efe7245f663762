//! Bounded-memory min/max scanning of interleaved int16 recordings.
//!
//! SpikeGLX and the tools built around it (CatGT, TPrime) store each stream
//! as a `.bin` of little-endian int16 values, one frame of `nSavedChans`
//! values per sample, plus a `.meta` text sidecar. This crate reads such
//! files chunk by chunk and keeps, for every chunk and channel, the minimum
//! and maximum raw value and the sample where each occurred.
//!
//! Extrema are always real sample values, never averages, so they stay
//! meaningful for digital words and sync lines.

pub mod meta;
mod reader;
pub mod recording;
pub mod types;

use std::path::Path;

// Re-export types
pub use meta::{RecordingMeta, StreamType, SyncSource};
pub use reader::{
    chunk_extrema, scan, scan_cancellable, scan_parallel, ChannelExtrema, MappedSource,
    SampleSource, StreamSource,
};
pub use recording::{find_bin_files, Recording, TimeWindow, WindowScan};
pub use types::*;

/// Opens a `.bin` recording and its `.meta` sidecar.
///
/// # Examples
///
/// ```no_run
/// use sglx_extrema::{open, ScanRequest};
///
/// let mut recording = open("rec_g0/rec_g0_t0.nidq.bin").unwrap();
/// let extrema = recording.scan(&ScanRequest::new(0, 30_000)).unwrap();
/// println!("{} chunks over {} channels", extrema.n_chunks(), extrema.n_chan());
/// ```
pub fn open<P: AsRef<Path>>(bin_path: P) -> Result<Recording, SglxError> {
    Recording::open(bin_path)
}
