use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use log::{debug, info};
use memmap2::Mmap;
use ndarray::{ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::types::*;

// Percent of chunks between progress messages
const PRINT_PROGRESS_STEP: usize = 10;

// Scans shorter than this never report progress
const PROGRESS_MIN_CHUNKS: usize = 1000;

/// Random-access, read-only view of an interleaved int16 sample matrix.
pub trait SampleSource {
    /// Total number of bytes visible through this source.
    fn len_bytes(&self) -> u64;

    /// Fills `out` with consecutive little-endian int16 values starting at
    /// `byte_offset`.
    ///
    /// Fails with [`SglxError::Truncated`] if the requested range extends past
    /// the end of the source.
    fn read_samples(&mut self, byte_offset: u64, out: &mut [i16]) -> Result<(), SglxError>;
}

/// A read-only memory map of a binary recording.
///
/// The map is created once and released when the source is dropped. Reads
/// decode directly from the mapped pages, so only the pages a scan touches
/// become resident.
#[derive(Debug)]
pub struct MappedSource {
    path: PathBuf,
    mmap: Mmap,
}

impl MappedSource {
    /// Maps `path` read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SglxError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;

        // Safety: the map is read-only and never outlives `self`. Another
        // process truncating the file while mapped is outside our control, as
        // with any mapped reader.
        let mmap = unsafe { Mmap::map(&file)? };

        debug!("Mapped {} ({} bytes)", path.display(), mmap.len());
        Ok(MappedSource { path, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The mapped bytes, suitable for [`scan_parallel`].
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }
}

impl SampleSource for MappedSource {
    fn len_bytes(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn read_samples(&mut self, byte_offset: u64, out: &mut [i16]) -> Result<(), SglxError> {
        decode_samples(self.as_bytes(), byte_offset, out)
    }
}

/// Adapts any seekable reader, such as a `File` or an in-memory `Cursor`.
///
/// The length is measured once at construction and is not re-checked.
#[derive(Debug)]
pub struct StreamSource<R> {
    reader: R,
    len: u64,
}

impl<R: Read + Seek> StreamSource<R> {
    pub fn new(mut reader: R) -> Result<Self, SglxError> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(StreamSource { reader, len })
    }
}

impl StreamSource<BufReader<File>> {
    /// Opens `path` with a 64KB buffered reader.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SglxError> {
        let file = File::open(path.as_ref())?;
        StreamSource::new(BufReader::with_capacity(65536, file))
    }
}

impl<R: Read + Seek> SampleSource for StreamSource<R> {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_samples(&mut self, byte_offset: u64, out: &mut [i16]) -> Result<(), SglxError> {
        let end = byte_offset + out.len() as u64 * BYTES_PER_SAMPLE;
        if end > self.len {
            return Err(SglxError::Truncated {
                expected: end,
                actual: self.len,
            });
        }
        self.reader.seek(SeekFrom::Start(byte_offset))?;
        self.reader.read_i16_into::<LittleEndian>(out)?;
        Ok(())
    }
}

/// Decodes little-endian int16 values from a byte slice.
fn decode_samples(bytes: &[u8], byte_offset: u64, out: &mut [i16]) -> Result<(), SglxError> {
    let end = byte_offset + out.len() as u64 * BYTES_PER_SAMPLE;
    if end > bytes.len() as u64 {
        return Err(SglxError::Truncated {
            expected: end,
            actual: bytes.len() as u64,
        });
    }
    LittleEndian::read_i16_into(&bytes[byte_offset as usize..end as usize], out);
    Ok(())
}

/// Minimum and maximum of one channel within one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelExtrema {
    pub min: i16,
    /// Absolute sample index of `min`
    pub min_index: u64,
    pub max: i16,
    /// Absolute sample index of `max`
    pub max_index: u64,
}

/// Computes per-channel extrema of one chunk.
///
/// `chunk_data` has shape `[n_samples, n_chan]`, the on-disk layout.
/// `chunk_start` is added to the chunk-relative positions. Ties go to the
/// earliest sample.
pub fn chunk_extrema(chunk_data: ArrayView2<i16>, chunk_start: usize) -> Vec<ChannelExtrema> {
    chunk_data
        .axis_iter(Axis(1))
        .map(|samples| {
            let (min_pos, max_pos) = first_argmin_argmax(samples);
            ChannelExtrema {
                min: samples[min_pos],
                min_index: (chunk_start + min_pos) as u64,
                max: samples[max_pos],
                max_index: (chunk_start + max_pos) as u64,
            }
        })
        .collect()
}

// Caller guarantees at least one sample
fn first_argmin_argmax(samples: ArrayView1<i16>) -> (usize, usize) {
    let mut min_pos = 0;
    let mut max_pos = 0;
    for (pos, &value) in samples.iter().enumerate().skip(1) {
        if value < samples[min_pos] {
            min_pos = pos;
        }
        if value > samples[max_pos] {
            max_pos = pos;
        }
    }
    (min_pos, max_pos)
}

/// Writes one chunk's extrema into columns `2*index` and `2*index + 1`.
fn store_chunk(extrema: &mut Extrema, index: usize, channels: &[ChannelExtrema]) {
    let min_col = 2 * index;
    let max_col = min_col + 1;
    for (chan, ch) in channels.iter().enumerate() {
        extrema.values[[chan, min_col]] = ch.min;
        extrema.indices[[chan, min_col]] = ch.min_index;
        extrema.values[[chan, max_col]] = ch.max;
        extrema.indices[[chan, max_col]] = ch.max_index;
    }
}

fn chunk_view(
    samples: &[i16],
    len: usize,
    n_chan: usize,
) -> Result<ArrayView2<'_, i16>, SglxError> {
    ArrayView2::from_shape((len, n_chan), samples)
        .map_err(|e| SglxError::InvalidArgument(format!("chunk shape: {}", e)))
}

/// The source must hold every sample the geometry promises.
fn check_source_size(len_bytes: u64, geometry: &Geometry) -> Result<(), SglxError> {
    let expected = geometry.expected_bytes();
    if len_bytes < expected {
        return Err(SglxError::Truncated {
            expected,
            actual: len_bytes,
        });
    }
    Ok(())
}

struct Progress {
    n_chunks: usize,
    next_percent: usize,
}

impl Progress {
    fn new(n_chunks: usize) -> Self {
        Progress {
            n_chunks,
            next_percent: PRINT_PROGRESS_STEP,
        }
    }

    fn chunk_done(&mut self, index: usize) {
        if self.n_chunks < PROGRESS_MIN_CHUNKS {
            return;
        }
        let percent = (index + 1) * 100 / self.n_chunks;
        while percent >= self.next_percent && self.next_percent <= 100 {
            info!("{}% done...", self.next_percent);
            self.next_percent += PRINT_PROGRESS_STEP;
        }
    }
}

/// Scans `source` chunk by chunk and returns per-chunk, per-channel extrema.
///
/// The request is clamped to the file before it is partitioned. Memory use is
/// one chunk buffer of `chunk_size * n_chan` values plus the output.
///
/// # Examples
///
/// ```
/// use sglx_extrema::{scan, Geometry, ScanRequest, StreamSource};
/// use std::io::Cursor;
///
/// // Two channels, four samples: [[1, 5], [9, 2], [3, 7], [0, 4]]
/// let bytes: Vec<u8> = [1i16, 5, 9, 2, 3, 7, 0, 4]
///     .iter()
///     .flat_map(|v| v.to_le_bytes())
///     .collect();
/// let mut source = StreamSource::new(Cursor::new(bytes)).unwrap();
/// let geometry = Geometry::new(2, 4).unwrap();
///
/// let extrema = scan(&mut source, &geometry, &ScanRequest::new(0, 4).with_chunk_size(2)).unwrap();
/// assert_eq!(extrema.values.row(0).to_vec(), vec![1, 9, 0, 3]);
/// assert_eq!(extrema.indices.row(0).to_vec(), vec![0, 1, 3, 2]);
/// ```
pub fn scan<S: SampleSource + ?Sized>(
    source: &mut S,
    geometry: &Geometry,
    request: &ScanRequest,
) -> Result<Extrema, SglxError> {
    scan_cancellable(source, geometry, request, &AtomicBool::new(false))
}

/// Like [`scan`], but checks `cancel` before every chunk.
///
/// Returns [`SglxError::Cancelled`] once the flag is set; no partial result
/// is produced.
pub fn scan_cancellable<S: SampleSource + ?Sized>(
    source: &mut S,
    geometry: &Geometry,
    request: &ScanRequest,
    cancel: &AtomicBool,
) -> Result<Extrema, SglxError> {
    let tic = Instant::now();
    let plan = ChunkPlan::new(geometry, request)?;
    check_source_size(source.len_bytes(), geometry)?;

    let n_chan = geometry.n_chan();
    debug!(
        "Scanning samples {}..{} of {} in {} chunks of {} over {} channels",
        plan.start,
        plan.end(),
        geometry.n_file_samp(),
        plan.n_chunks(),
        plan.chunk_size,
        n_chan
    );

    let mut extrema = Extrema::zeros(n_chan, plan.n_chunks());
    let mut buffer = vec![0i16; plan.chunk_size.min(plan.len) * n_chan];
    let mut progress = Progress::new(plan.n_chunks());

    for chunk in plan.chunks() {
        if cancel.load(Ordering::Relaxed) {
            info!("Scan cancelled after {} of {} chunks", chunk.index, plan.n_chunks());
            return Err(SglxError::Cancelled);
        }

        let samples = &mut buffer[..chunk.len * n_chan];
        source.read_samples(geometry.byte_offset(chunk.start), samples)?;

        let channels = chunk_extrema(chunk_view(samples, chunk.len, n_chan)?, chunk.start);
        store_chunk(&mut extrema, chunk.index, &channels);
        progress.chunk_done(chunk.index);
    }

    debug!(
        "Scan done! Elapsed time: {:.3} seconds",
        tic.elapsed().as_secs_f64()
    );
    Ok(extrema)
}

/// Scans an in-memory or memory-mapped byte slice with chunks spread across
/// the rayon thread pool.
///
/// Each worker decodes its own chunk into a private buffer. The output is
/// identical to [`scan`] for the same request.
pub fn scan_parallel(
    bytes: &[u8],
    geometry: &Geometry,
    request: &ScanRequest,
) -> Result<Extrema, SglxError> {
    let tic = Instant::now();
    let plan = ChunkPlan::new(geometry, request)?;
    check_source_size(bytes.len() as u64, geometry)?;

    let n_chan = geometry.n_chan();
    let chunks: Vec<Chunk> = plan.chunks().collect();
    debug!(
        "Scanning samples {}..{} in {} parallel chunks",
        plan.start,
        plan.end(),
        chunks.len()
    );

    let per_chunk = chunks
        .par_iter()
        .map(|chunk| -> Result<Vec<ChannelExtrema>, SglxError> {
            let mut samples = vec![0i16; chunk.len * n_chan];
            decode_samples(bytes, geometry.byte_offset(chunk.start), &mut samples)?;
            Ok(chunk_extrema(
                chunk_view(&samples, chunk.len, n_chan)?,
                chunk.start,
            ))
        })
        .collect::<Result<Vec<_>, SglxError>>()?;

    let mut extrema = Extrema::zeros(n_chan, chunks.len());
    for (index, channels) in per_chunk.iter().enumerate() {
        store_chunk(&mut extrema, index, channels);
    }

    debug!(
        "Parallel scan done! Elapsed time: {:.3} seconds",
        tic.elapsed().as_secs_f64()
    );
    Ok(extrema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn to_bytes(samples: &[i16]) -> Vec<u8> {
        let mut bytes = vec![0u8; samples.len() * 2];
        LittleEndian::write_i16_into(samples, &mut bytes);
        bytes
    }

    fn source(samples: &[i16]) -> StreamSource<Cursor<Vec<u8>>> {
        StreamSource::new(Cursor::new(to_bytes(samples))).unwrap()
    }

    #[test]
    fn two_channel_scenario() {
        let samples = [1, 5, 9, 2, 3, 7, 0, 4];
        let geometry = Geometry::new(2, 4).unwrap();
        let request = ScanRequest::new(0, 4).with_chunk_size(2);

        let extrema = scan(&mut source(&samples), &geometry, &request).unwrap();

        assert_eq!(extrema.values.row(0).to_vec(), vec![1, 9, 0, 3]);
        assert_eq!(extrema.indices.row(0).to_vec(), vec![0, 1, 3, 2]);
        assert_eq!(extrema.values.row(1).to_vec(), vec![2, 5, 4, 7]);
        assert_eq!(extrema.indices.row(1).to_vec(), vec![1, 0, 3, 2]);
    }

    #[test]
    fn ties_resolve_to_first_occurrence() {
        let samples = [4, 4, -1, 4, -1, 2];
        let geometry = Geometry::new(1, 6).unwrap();
        let extrema = scan(
            &mut source(&samples),
            &geometry,
            &ScanRequest::new(0, 6).with_chunk_size(6),
        )
        .unwrap();

        assert_eq!(extrema.values.row(0).to_vec(), vec![-1, 4]);
        assert_eq!(extrema.indices.row(0).to_vec(), vec![2, 0]);
    }

    #[test]
    fn constant_chunk_reports_first_sample_for_both() {
        let samples = [7; 5];
        let geometry = Geometry::new(1, 5).unwrap();
        let extrema = scan(&mut source(&samples), &geometry, &ScanRequest::new(0, 5)).unwrap();
        assert_eq!(extrema.indices.row(0).to_vec(), vec![0, 0]);
    }

    #[test]
    fn single_sample_chunk_has_equal_min_and_max() {
        let samples = [3, -8, 6, 1, 0, 2];
        let geometry = Geometry::new(2, 3).unwrap();
        let extrema = scan(
            &mut source(&samples),
            &geometry,
            &ScanRequest::new(1, 1).with_chunk_size(10),
        )
        .unwrap();

        assert_eq!(extrema.values.row(0).to_vec(), vec![6, 6]);
        assert_eq!(extrema.values.row(1).to_vec(), vec![1, 1]);
        assert_eq!(extrema.indices.row(0).to_vec(), vec![1, 1]);
    }

    #[test]
    fn extreme_codes_survive_decoding() {
        let samples = [i16::MIN, 0, i16::MAX, -1];
        let geometry = Geometry::new(1, 4).unwrap();
        let extrema = scan(&mut source(&samples), &geometry, &ScanRequest::new(0, 4)).unwrap();
        assert_eq!(extrema.values.row(0).to_vec(), vec![i16::MIN, i16::MAX]);
    }

    #[test]
    fn empty_request_gives_empty_matrices() {
        let samples = [1, 2, 3, 4];
        let geometry = Geometry::new(2, 2).unwrap();
        let extrema = scan(&mut source(&samples), &geometry, &ScanRequest::new(5, 10)).unwrap();
        assert_eq!(extrema.values.dim(), (2, 0));
        assert_eq!(extrema.indices.dim(), (2, 0));
        assert!(extrema.is_empty());
    }

    #[test]
    fn short_source_is_io_failure() {
        let samples = [1, 2, 3];
        let geometry = Geometry::new(2, 2).unwrap();
        let err = scan(&mut source(&samples), &geometry, &ScanRequest::new(0, 1)).unwrap_err();
        assert!(matches!(
            err,
            SglxError::Truncated {
                expected: 8,
                actual: 6
            }
        ));
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn longer_source_is_accepted() {
        // Samples appended after the geometry was fixed are ignored.
        let samples = [1, 2, 3, 4, 100, 100];
        let geometry = Geometry::new(2, 2).unwrap();
        let extrema = scan(&mut source(&samples), &geometry, &ScanRequest::whole_file()).unwrap();
        assert_eq!(extrema.values.row(0).to_vec(), vec![1, 3]);
        assert_eq!(extrema.values.row(1).to_vec(), vec![2, 4]);
    }

    #[test]
    fn cancelled_flag_stops_scan() {
        let samples = [0i16; 20];
        let geometry = Geometry::new(1, 20).unwrap();
        let cancel = AtomicBool::new(true);
        let err = scan_cancellable(
            &mut source(&samples),
            &geometry,
            &ScanRequest::new(0, 20).with_chunk_size(5),
            &cancel,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn parallel_matches_sequential() {
        let n_chan = 3;
        let n_samp = 1037;
        let samples: Vec<i16> = (0..n_chan * n_samp)
            .map(|i| ((i * 7919 + 13) % 2003) as i16 - 1000)
            .collect();
        let bytes = to_bytes(&samples);
        let geometry = Geometry::new(n_chan, n_samp).unwrap();

        for request in [
            ScanRequest::whole_file(),
            ScanRequest::new(17, 500).with_chunk_size(33),
            ScanRequest::new(-40, 90).with_chunk_size(7),
            ScanRequest::new(1030, 100).with_chunk_size(1),
        ] {
            let mut stream = StreamSource::new(Cursor::new(bytes.clone())).unwrap();
            let sequential = scan(&mut stream, &geometry, &request).unwrap();
            let parallel = scan_parallel(&bytes, &geometry, &request).unwrap();
            assert_eq!(sequential, parallel, "{:?}", request);
        }
    }

    #[test]
    fn chunk_extrema_reads_sample_major_layout() {
        let data = ndarray::arr2(&[[3, -2], [1, 8], [3, -9]]);
        let channels = chunk_extrema(data.view(), 100);
        assert_eq!(
            channels[0],
            ChannelExtrema {
                min: 1,
                min_index: 101,
                max: 3,
                max_index: 100
            }
        );
        assert_eq!(
            channels[1],
            ChannelExtrema {
                min: -9,
                min_index: 102,
                max: 8,
                max_index: 101
            }
        );
    }
}
