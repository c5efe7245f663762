//! Key/value sidecar files.
//!
//! SpikeGLX writes a `.meta` file next to every `.bin`, one `key=value` pair
//! per line. Only the handful of fields needed to locate samples are given
//! typed accessors; everything else stays available as raw strings.

use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::types::{Geometry, SglxError};

/// Separator used by `.meta` files and CatGT "fyi" files.
pub const META_SEPARATOR: char = '=';

/// Separator used by CatGT "offsets" files.
pub const OFFSETS_SEPARATOR: char = ':';

/// Parses lines of `key<separator>value` into a sorted map.
///
/// Blank lines are skipped. Each line is split at the first separator only,
/// and both sides are trimmed. A later duplicate key replaces an earlier one.
pub fn parse_key_value_pairs(
    text: &str,
    separator: char,
) -> Result<BTreeMap<String, String>, SglxError> {
    let mut pairs = BTreeMap::new();
    for (line_number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (key, value) = line.split_once(separator).ok_or_else(|| SglxError::Meta {
            key: format!("line {}", line_number + 1),
            reason: format!("no '{}' separator in {:?}", separator, line.trim()),
        })?;
        pairs.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(pairs)
}

/// Reads and parses a key/value file from disk.
pub fn read_key_value_pairs<P: AsRef<Path>>(
    path: P,
    separator: char,
) -> Result<BTreeMap<String, String>, SglxError> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_key_value_pairs(&text, separator)
}

/// Reads a text file holding one floating-point value per line, such as the
/// event-time files exchanged with TPrime.
pub fn read_floats<P: AsRef<Path>>(path: P) -> Result<Vec<f64>, SglxError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<f64>().map_err(|e| SglxError::Meta {
                key: path.display().to_string(),
                reason: format!("{:?} is not a number: {}", line, e),
            })
        })
        .collect()
}

/// Returns the `.meta` sidecar path for a `.bin` file.
pub fn meta_path_for<P: AsRef<Path>>(bin_path: P) -> PathBuf {
    bin_path.as_ref().with_extension("meta")
}

/// Acquisition stream that produced a recording (`typeThis`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamType {
    /// National Instruments card
    Nidq,
    /// Imec probe
    Imec,
    /// OneBox
    Obx,
    Other(String),
}

impl StreamType {
    fn parse(value: &str) -> Self {
        match value {
            "nidq" => StreamType::Nidq,
            "imec" => StreamType::Imec,
            "obx" => StreamType::Obx,
            other => StreamType::Other(other.to_string()),
        }
    }

    /// Metadata key holding this stream's sample rate.
    pub fn sample_rate_key(&self) -> &'static str {
        match self {
            StreamType::Nidq => "niSampRate",
            StreamType::Obx => "obSampRate",
            StreamType::Imec | StreamType::Other(_) => "imSampRate",
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StreamType::Nidq => write!(f, "nidq"),
            StreamType::Imec => write!(f, "imec"),
            StreamType::Obx => write!(f, "obx"),
            StreamType::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Where the sync signal for a stream comes from (`syncSourceIdx`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSource {
    None,
    External,
    Ni,
    Im,
}

impl SyncSource {
    fn from_index(index: i64) -> Self {
        match index {
            0 => SyncSource::None,
            1 => SyncSource::External,
            2 => SyncSource::Ni,
            _ => SyncSource::Im,
        }
    }
}

impl fmt::Display for SyncSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyncSource::None => write!(f, "none"),
            SyncSource::External => write!(f, "external"),
            SyncSource::Ni => write!(f, "NI"),
            SyncSource::Im => write!(f, "IM"),
        }
    }
}

/// The parts of a `.meta` file needed to address samples in the `.bin`.
#[derive(Debug, Clone)]
pub struct RecordingMeta {
    /// Stream that wrote the file
    pub stream: StreamType,
    /// Number of interleaved int16 channels per sample (`nSavedChans`)
    pub n_saved_chans: usize,
    /// Size of the `.bin` when it was closed (`fileSizeBytes`)
    pub file_size_bytes: u64,
    /// Samples per second for this stream, if recorded
    pub sample_rate: Option<f64>,
    /// Recording duration in seconds (`fileTimeSecs`)
    pub file_time_secs: Option<f64>,
    /// Index of the first sample since the start of the run (`firstSample`)
    pub first_sample: Option<u64>,
    pub user_notes: Option<String>,
    pub sync_source: Option<SyncSource>,
    pairs: BTreeMap<String, String>,
}

impl RecordingMeta {
    /// Reads a `.meta` file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, SglxError> {
        let path = path.as_ref();
        debug!("Reading metadata from {}", path.display());
        RecordingMeta::from_pairs(read_key_value_pairs(path, META_SEPARATOR)?)
    }

    /// Reads the `.meta` sidecar that belongs to `bin_path`.
    pub fn read_for_bin<P: AsRef<Path>>(bin_path: P) -> Result<Self, SglxError> {
        RecordingMeta::read(meta_path_for(bin_path))
    }

    /// Builds typed metadata from already-parsed pairs.
    pub fn from_pairs(pairs: BTreeMap<String, String>) -> Result<Self, SglxError> {
        let stream = StreamType::parse(pairs.get("typeThis").map(String::as_str).unwrap_or(""));
        let n_saved_chans: usize = required(&pairs, "nSavedChans")?;
        if n_saved_chans == 0 {
            return Err(SglxError::Meta {
                key: "nSavedChans".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(RecordingMeta {
            n_saved_chans,
            file_size_bytes: required(&pairs, "fileSizeBytes")?,
            sample_rate: optional(&pairs, stream.sample_rate_key())?,
            file_time_secs: optional(&pairs, "fileTimeSecs")?,
            first_sample: optional(&pairs, "firstSample")?,
            user_notes: pairs.get("userNotes").cloned(),
            sync_source: optional::<i64>(&pairs, "syncSourceIdx")?.map(SyncSource::from_index),
            stream,
            pairs,
        })
    }

    /// Raw value for any key in the file.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs.get(key).map(String::as_str)
    }

    /// All raw pairs, sorted by key.
    pub fn pairs(&self) -> &BTreeMap<String, String> {
        &self.pairs
    }

    /// Sample geometry implied by `nSavedChans` and `fileSizeBytes`.
    pub fn geometry(&self) -> Result<Geometry, SglxError> {
        Geometry::from_file_size(self.n_saved_chans, self.file_size_bytes)
    }

    /// The sample rate, or an error naming the missing key.
    pub fn require_sample_rate(&self) -> Result<f64, SglxError> {
        match self.sample_rate {
            Some(rate) if rate > 0.0 => Ok(rate),
            Some(rate) => Err(SglxError::Meta {
                key: self.stream.sample_rate_key().to_string(),
                reason: format!("sample rate must be positive, got {}", rate),
            }),
            None => Err(SglxError::Meta {
                key: self.stream.sample_rate_key().to_string(),
                reason: "missing".to_string(),
            }),
        }
    }
}

impl Geometry {
    /// Shorthand for [`RecordingMeta::geometry`].
    pub fn from_meta(meta: &RecordingMeta) -> Result<Self, SglxError> {
        meta.geometry()
    }
}

fn required<T>(pairs: &BTreeMap<String, String>, key: &str) -> Result<T, SglxError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    optional(pairs, key)?.ok_or_else(|| SglxError::Meta {
        key: key.to_string(),
        reason: "missing".to_string(),
    })
}

fn optional<T>(pairs: &BTreeMap<String, String>, key: &str) -> Result<Option<T>, SglxError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    pairs
        .get(key)
        .map(|value| {
            value.parse::<T>().map_err(|e| SglxError::Meta {
                key: key.to_string(),
                reason: format!("cannot parse {:?}: {}", value, e),
            })
        })
        .transpose()
}
