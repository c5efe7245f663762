use log::{debug, info, warn};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::meta::RecordingMeta;
use crate::reader::{self, MappedSource, SampleSource};
use crate::types::*;

/// A span of time within a recording, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start_secs: f64,
    /// `None` reads to the end of the recording.
    pub duration_secs: Option<f64>,
}

impl TimeWindow {
    pub fn new(start_secs: f64, duration_secs: f64) -> Self {
        TimeWindow {
            start_secs,
            duration_secs: Some(duration_secs),
        }
    }

    /// From `start_secs` to the end of the recording.
    pub fn from_start(start_secs: f64) -> Self {
        TimeWindow {
            start_secs,
            duration_secs: None,
        }
    }

    /// Converts the window to whole samples.
    ///
    /// The start rounds down and the duration rounds up, so the request
    /// always covers the whole window. With no duration, the remainder of
    /// `file_time_secs` is used when known, otherwise every remaining sample.
    pub fn to_request(
        &self,
        sample_rate: f64,
        file_time_secs: Option<f64>,
        chunk_size: usize,
    ) -> Result<ScanRequest, SglxError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(SglxError::InvalidArgument(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }
        if !self.start_secs.is_finite() {
            return Err(SglxError::InvalidArgument(format!(
                "start time must be finite, got {}",
                self.start_secs
            )));
        }

        let samp_0 = (self.start_secs * sample_rate).floor();
        let duration = match (self.duration_secs, file_time_secs) {
            (Some(d), _) if d.is_finite() => Some(d),
            (Some(d), _) if d.is_nan() => {
                return Err(SglxError::InvalidArgument(
                    "duration must not be NaN".to_string(),
                ))
            }
            (_, Some(total)) => Some(total - self.start_secs),
            _ => None,
        };

        match duration {
            Some(d) => ScanRequest::from_f64(samp_0, (d * sample_rate).ceil(), chunk_size),
            None => ScanRequest::from_f64(samp_0, 0.0, chunk_size).map(|request| ScanRequest {
                n_samp: i64::MAX,
                ..request
            }),
        }
    }
}

/// Extrema over a time window, with sample indices converted to seconds.
#[derive(Debug, Clone)]
pub struct WindowScan {
    pub extrema: Extrema,
    /// `extrema.indices / sample_rate`
    /// - Shape: [n_chan, 2 * n_chunks]
    pub sample_times: Array2<f64>,
}

impl WindowScan {
    /// Latest time at which any extremum occurred.
    pub fn last_time(&self) -> Option<f64> {
        self.sample_times.iter().copied().reduce(f64::max)
    }
}

/// A `.bin` recording together with its `.meta` sidecar.
///
/// The file is mapped once on open and unmapped on drop.
#[derive(Debug)]
pub struct Recording {
    pub meta: RecordingMeta,
    geometry: Geometry,
    source: MappedSource,
}

impl Recording {
    /// Opens `bin_path` and the `.meta` file beside it.
    ///
    /// The sample count comes from `fileSizeBytes`. A `.bin` that is smaller
    /// than that is rejected; a larger one (still being written) is accepted
    /// with a warning and only the described samples are visible.
    pub fn open<P: AsRef<Path>>(bin_path: P) -> Result<Self, SglxError> {
        let bin_path = bin_path.as_ref();
        let meta = RecordingMeta::read_for_bin(bin_path)?;
        let geometry = Geometry::from_meta(&meta)?;
        let source = MappedSource::open(bin_path)?;

        let actual = source.len_bytes();
        if actual != meta.file_size_bytes {
            warn!(
                "{}: fileSizeBytes is {} but file holds {} bytes",
                bin_path.display(),
                meta.file_size_bytes,
                actual
            );
        }
        if actual < geometry.expected_bytes() {
            return Err(SglxError::Truncated {
                expected: geometry.expected_bytes(),
                actual,
            });
        }

        debug!(
            "Opened {}: {} channels x {} samples",
            bin_path.display(),
            geometry.n_chan(),
            geometry.n_file_samp()
        );
        Ok(Recording {
            meta,
            geometry,
            source,
        })
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Sequential chunked scan.
    pub fn scan(&mut self, request: &ScanRequest) -> Result<Extrema, SglxError> {
        reader::scan(&mut self.source, &self.geometry, request)
    }

    /// Chunked scan spread across the rayon thread pool.
    pub fn scan_parallel(&self, request: &ScanRequest) -> Result<Extrema, SglxError> {
        reader::scan_parallel(self.source.as_bytes(), &self.geometry, request)
    }

    /// Scans a time window and converts the resulting indices to seconds.
    pub fn scan_window(
        &mut self,
        window: &TimeWindow,
        chunk_size: usize,
    ) -> Result<WindowScan, SglxError> {
        let sample_rate = self.meta.require_sample_rate()?;
        let request = window.to_request(sample_rate, self.meta.file_time_secs, chunk_size)?;
        let extrema = self.scan(&request)?;
        let sample_times = extrema.indices.mapv(|i| i as f64 / sample_rate);
        Ok(WindowScan {
            extrema,
            sample_times,
        })
    }

    /// Human-readable summary of the recording's metadata.
    pub fn describe(&self) -> String {
        let meta = &self.meta;
        let name = self
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut lines = vec![format!("{}: {}", meta.stream, name)];

        match (meta.file_time_secs, meta.sample_rate) {
            (Some(secs), Some(rate)) => lines.push(format!(
                "{:.2} seconds at {:.2}Hz over {} channels ({:.0} samples)",
                secs,
                rate,
                meta.n_saved_chans,
                meta.n_saved_chans as f64 * rate * secs
            )),
            (None, Some(rate)) => lines.push(format!(
                "{:.2}Hz over {} channels",
                rate, meta.n_saved_chans
            )),
            _ => lines.push(format!("{} channels", meta.n_saved_chans)),
        }

        lines.push(format!(
            "{} bytes at 2 bytes per sample ({} samples per channel)",
            meta.file_size_bytes,
            self.geometry.n_file_samp()
        ));
        if let Some(first) = meta.first_sample {
            lines.push(format!("First sample: {}", first));
        }
        if let Some(sync) = meta.sync_source {
            lines.push(format!("Sync source is {}", sync));
        }
        if let Some(notes) = meta.user_notes.as_deref().filter(|n| !n.is_empty()) {
            lines.push(format!("User notes: {}", notes));
        }
        lines.join("\n")
    }
}

/// Recursively finds `.bin` files under `dir`, sorted by file name.
pub fn find_bin_files<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>, SglxError> {
    let dir = dir.as_ref();
    let mut bin_files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| SglxError::Io(e.into()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "bin") {
            bin_files.push(path.to_path_buf());
        }
    }
    bin_files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    info!("Found {} .bin files in {}", bin_files.len(), dir.display());
    Ok(bin_files)
}
