/// Shared helpers for writing temporary recordings.
use byteorder::{ByteOrder, LittleEndian};
use std::fs;
use std::path::{Path, PathBuf};

/// A scratch directory removed when dropped.
pub struct Fixture {
    dir: PathBuf,
}

impl Fixture {
    pub fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "sglx_extrema_{}_{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create fixture dir");
        Fixture { dir }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.join(relative)
    }

    #[allow(unused)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes interleaved samples as little-endian int16.
    pub fn write_bin(&self, relative: &str, samples: &[i16]) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create bin parent");
        }
        fs::write(&path, to_bytes(samples)).expect("write bin");
        path
    }

    /// Writes a `.meta` beside `bin_path` whose `fileSizeBytes` matches the file.
    #[allow(unused)]
    pub fn write_meta(&self, bin_path: &Path, n_chan: usize, extra: &str) -> PathBuf {
        let size = fs::metadata(bin_path).expect("bin metadata").len();
        self.write_meta_with_size(bin_path, n_chan, size, extra)
    }

    #[allow(unused)]
    pub fn write_meta_with_size(
        &self,
        bin_path: &Path,
        n_chan: usize,
        file_size_bytes: u64,
        extra: &str,
    ) -> PathBuf {
        let path = bin_path.with_extension("meta");
        let text = format!(
            "nSavedChans={}\nfileSizeBytes={}\n{}",
            n_chan, file_size_bytes, extra
        );
        fs::write(&path, text).expect("write meta");
        path
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.dir);
    }
}

pub fn to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * 2];
    LittleEndian::write_i16_into(samples, &mut bytes);
    bytes
}

#[allow(unused)]
/// Deterministic pseudo-random interleaved samples covering the full int16 range.
pub fn synthetic_samples(n_chan: usize, n_samp: usize) -> Vec<i16> {
    let mut state: u32 = 0x2545_f491;
    (0..n_chan * n_samp)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 16) as u16 as i16
        })
        .collect()
}

#[allow(unused)]
/// Value of sample `samp`, channel `chan` in an interleaved buffer.
pub fn sample_at(samples: &[i16], n_chan: usize, samp: u64, chan: usize) -> i16 {
    samples[samp as usize * n_chan + chan]
}
