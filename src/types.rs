use ndarray::{Array2, ArrayView1};
use serde::Serialize;
use std::io;
use thiserror::Error;

/// Number of bytes per stored sample value (signed 16-bit).
pub const BYTES_PER_SAMPLE: u64 = 2;

/// Default number of samples per chunk used when scanning.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Geometry of an interleaved sample matrix on disk.
///
/// Sample `s` of channel `c` lives at byte offset `(s * n_chan + c) * 2`.
/// Both fields are validated once at construction, so code that holds a
/// `Geometry` can rely on them being positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    n_chan: usize,
    n_file_samp: usize,
}

impl Geometry {
    /// Creates a geometry from an explicit channel and sample count.
    pub fn new(n_chan: usize, n_file_samp: usize) -> Result<Self, SglxError> {
        if n_chan == 0 {
            return Err(SglxError::InvalidArgument(
                "n_chan must be positive".to_string(),
            ));
        }
        if n_file_samp == 0 {
            return Err(SglxError::InvalidArgument(
                "n_file_samp must be positive".to_string(),
            ));
        }
        // Total bytes must be addressable as both usize and u64.
        let total_bytes = n_chan
            .checked_mul(n_file_samp)
            .and_then(|v| v.checked_mul(BYTES_PER_SAMPLE as usize))
            .filter(|&v| u64::try_from(v).is_ok());
        if total_bytes.is_none() {
            return Err(SglxError::InvalidArgument(format!(
                "{} channels x {} samples overflows the addressable size",
                n_chan, n_file_samp
            )));
        }
        Ok(Geometry { n_chan, n_file_samp })
    }

    /// Derives the sample count from a total file size in bytes.
    ///
    /// Trailing bytes that do not make up a whole sample frame are ignored.
    pub fn from_file_size(n_chan: usize, file_size_bytes: u64) -> Result<Self, SglxError> {
        if n_chan == 0 {
            return Err(SglxError::InvalidArgument(
                "n_chan must be positive".to_string(),
            ));
        }
        let frame_bytes = (n_chan as u64)
            .checked_mul(BYTES_PER_SAMPLE)
            .ok_or_else(|| {
                SglxError::InvalidArgument(format!("{} channels overflows frame size", n_chan))
            })?;
        let n_file_samp = usize::try_from(file_size_bytes / frame_bytes).map_err(|_| {
            SglxError::InvalidArgument(format!(
                "{} bytes holds more samples than can be addressed",
                file_size_bytes
            ))
        })?;
        Geometry::new(n_chan, n_file_samp)
    }

    /// Number of interleaved channels.
    pub fn n_chan(&self) -> usize {
        self.n_chan
    }

    /// Number of samples (frames) available in the file.
    pub fn n_file_samp(&self) -> usize {
        self.n_file_samp
    }

    /// Size in bytes of one frame (one sample across all channels).
    pub fn frame_bytes(&self) -> u64 {
        BYTES_PER_SAMPLE * self.n_chan as u64
    }

    /// Number of bytes the file must hold at minimum.
    pub fn expected_bytes(&self) -> u64 {
        self.frame_bytes() * self.n_file_samp as u64
    }

    /// Byte offset of the first value of sample `samp`.
    pub fn byte_offset(&self, samp: usize) -> u64 {
        samp as u64 * self.frame_bytes()
    }
}

/// A requested sample range and chunk size.
///
/// `samp_0` and `n_samp` are signed because requests are clamped to the file
/// rather than rejected: a negative start or an overlong count is legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    pub samp_0: i64,
    pub n_samp: i64,
    pub chunk_size: usize,
}

impl Default for ScanRequest {
    fn default() -> Self {
        ScanRequest {
            samp_0: 0,
            n_samp: i64::MAX,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ScanRequest {
    /// Creates a request with the default chunk size.
    pub fn new(samp_0: i64, n_samp: i64) -> Self {
        ScanRequest {
            samp_0,
            n_samp,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Requests every sample in the file.
    pub fn whole_file() -> Self {
        ScanRequest::default()
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Builds a request from floating-point sample positions.
    ///
    /// Both values must be finite and integral. Fractional positions are
    /// rejected instead of truncated.
    pub fn from_f64(samp_0: f64, n_samp: f64, chunk_size: usize) -> Result<Self, SglxError> {
        Ok(ScanRequest {
            samp_0: integral("samp_0", samp_0)?,
            n_samp: integral("n_samp", n_samp)?,
            chunk_size,
        })
    }
}

fn integral(name: &str, value: f64) -> Result<i64, SglxError> {
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(SglxError::InvalidArgument(format!(
            "{} must be an integer, got {}",
            name, value
        )));
    }
    if value < i64::MIN as f64 || value > i64::MAX as f64 {
        return Err(SglxError::InvalidArgument(format!(
            "{} is out of range: {}",
            name, value
        )));
    }
    Ok(value as i64)
}

/// One contiguous run of samples processed as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk in the output (column pair `2*index`, `2*index+1`).
    pub index: usize,
    /// Absolute index of the first sample in the chunk.
    pub start: usize,
    /// Number of samples in the chunk, never zero.
    pub len: usize,
}

impl Chunk {
    /// One past the last absolute sample index of the chunk.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// A clamped request partitioned into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// First sample after clamping.
    pub start: usize,
    /// Sample count after clamping (zero when nothing overlaps the file).
    pub len: usize,
    pub chunk_size: usize,
}

impl ChunkPlan {
    /// Clamps `request` to `geometry` and validates the chunk size.
    pub fn new(geometry: &Geometry, request: &ScanRequest) -> Result<Self, SglxError> {
        if request.chunk_size == 0 {
            return Err(SglxError::InvalidArgument(
                "chunk_size must be positive".to_string(),
            ));
        }

        // Intersect [samp_0, samp_0 + n_samp) with [0, n_file_samp).
        let n_file_samp = geometry.n_file_samp() as i64;
        let start = request.samp_0.clamp(0, n_file_samp);
        let end = request
            .samp_0
            .saturating_add(request.n_samp.max(0))
            .clamp(0, n_file_samp);

        Ok(ChunkPlan {
            start: start as usize,
            len: (end - start).max(0) as usize,
            chunk_size: request.chunk_size,
        })
    }

    /// Number of chunks, `ceil(len / chunk_size)`.
    pub fn n_chunks(&self) -> usize {
        self.len.div_ceil(self.chunk_size)
    }

    /// One past the last sample covered by the plan.
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Returns chunk `index`, or `None` when out of range.
    pub fn chunk(&self, index: usize) -> Option<Chunk> {
        if index >= self.n_chunks() {
            return None;
        }
        let start = self.start + index * self.chunk_size;
        Some(Chunk {
            index,
            start,
            len: self.chunk_size.min(self.end() - start),
        })
    }

    /// Iterates chunks in ascending sample order.
    pub fn chunks(&self) -> impl Iterator<Item = Chunk> + '_ {
        (0..self.n_chunks()).filter_map(move |i| self.chunk(i))
    }
}

/// Per-chunk, per-channel extrema.
///
/// Both matrices have shape `[n_chan, 2 * n_chunks]`. For chunk `i`, column
/// `2*i` holds the minimum and column `2*i + 1` the maximum. Values are raw
/// samples copied from the file; indices are absolute sample numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extrema {
    /// Raw minimum / maximum sample values
    /// - Shape: [n_chan, 2 * n_chunks]
    pub values: Array2<i16>,
    /// Absolute sample index of each value
    /// - Shape: [n_chan, 2 * n_chunks]
    pub indices: Array2<u64>,
}

impl Extrema {
    /// Allocates zeroed output for `n_chunks` chunks.
    pub fn zeros(n_chan: usize, n_chunks: usize) -> Self {
        Extrema {
            values: Array2::zeros((n_chan, 2 * n_chunks)),
            indices: Array2::zeros((n_chan, 2 * n_chunks)),
        }
    }

    pub fn n_chan(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_chunks(&self) -> usize {
        self.values.ncols() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.values.ncols() == 0
    }

    /// Minimum values of every chunk for channel `chan`.
    pub fn mins(&self, chan: usize) -> Vec<i16> {
        self.values.row(chan).iter().step_by(2).copied().collect()
    }

    /// Maximum values of every chunk for channel `chan`.
    pub fn maxes(&self, chan: usize) -> Vec<i16> {
        self.values.row(chan).iter().skip(1).step_by(2).copied().collect()
    }

    /// Overall (min, max) for channel `chan` across all chunks, with the
    /// sample index of each. `None` if the result is empty.
    pub fn channel_range(&self, chan: usize) -> Option<((i16, u64), (i16, u64))> {
        let values = self.values.row(chan);
        let indices = self.indices.row(chan);
        let min = first_extremum(values, indices, 0, |a, b| a < b)?;
        let max = first_extremum(values, indices, 1, |a, b| a > b)?;
        Some((min, max))
    }
}

fn first_extremum(
    values: ArrayView1<i16>,
    indices: ArrayView1<u64>,
    offset: usize,
    better: impl Fn(i16, i16) -> bool,
) -> Option<(i16, u64)> {
    let mut best: Option<(i16, u64)> = None;
    for col in (offset..values.len()).step_by(2) {
        let candidate = (values[col], indices[col]);
        best = match best {
            Some(current) if !better(candidate.0, current.0) => Some(current),
            _ => Some(candidate),
        };
    }
    best
}

/// Coarse classification of [`SglxError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    IoFailure,
    Cancelled,
}

/// Errors produced while reading metadata or scanning a recording.
#[derive(Error, Debug)]
pub enum SglxError {
    /// A caller-supplied value violates a precondition
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The backing file could not be opened or read
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// The backing file is shorter than its geometry implies
    #[error("File truncated: expected at least {expected} bytes, found {actual}")]
    Truncated { expected: u64, actual: u64 },
    /// A metadata key is missing or its value cannot be parsed
    #[error("Metadata error for '{key}': {reason}")]
    Meta { key: String, reason: String },
    /// The scan observed its cancellation flag
    #[error("Scan cancelled")]
    Cancelled,
}

impl SglxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SglxError::InvalidArgument(_) | SglxError::Meta { .. } => ErrorKind::InvalidArgument,
            SglxError::Io(_) | SglxError::Truncated { .. } => ErrorKind::IoFailure,
            SglxError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
