//! Random-hyperplane hash template
//!
//! The template owns the hyperplane family: `bands` files of `bits`
//! compacted-Gaussian vectors each, in encoder dimension. Files are
//! headerless little-endian u16 codes, written once and memory-mapped
//! read-only for signing. Band `i` draws from a PRNG seeded by the master
//! seed string and the band index, so regeneration from the same seed and
//! dimension is bit-identical.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use memmap2::Mmap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;

use crate::types::Signature;
use crate::vector::{band_value, compact, CompactSlice, SparseVector, Vector};
use crate::{Error, Result};

/// File name of one band's hyperplanes inside the template directory.
pub fn band_file_name(band: usize) -> String {
    format!("hash_{band:02x}")
}

/// FNV-1a over the seed string followed by the band index byte.
fn band_seed(seed: &str, band: usize) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut h = OFFSET;
    for &b in seed.as_bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(PRIME);
    }
    h ^= band as u64;
    h.wrapping_mul(PRIME)
}

/// A loaded hyperplane family. Read-only after load; share via `Arc`.
#[derive(Debug)]
pub struct Template {
    dimension: usize,
    bits: usize,
    bands: Vec<Band>,
}

#[derive(Debug)]
struct Band {
    map: Mmap,
}

impl Band {
    fn plane(&self, j: usize, dimension: usize) -> CompactSlice<'_> {
        let stride = dimension * 2;
        CompactSlice::new(&self.map[j * stride..(j + 1) * stride])
    }
}

impl Template {
    /// Generate the hyperplane files for a template of the given shape.
    /// Bands are written concurrently; each is deterministic in isolation.
    pub fn generate(
        dir: &Path,
        dimension: usize,
        bands: usize,
        bits: usize,
        seed: &str,
    ) -> Result<()> {
        check_shape(dimension, bands, bits)?;
        std::fs::create_dir_all(dir)?;
        (0..bands)
            .into_par_iter()
            .try_for_each(|band| write_band(dir, dimension, bits, seed, band))
    }

    /// Memory-map an existing template directory. The file lengths pin the
    /// shape; a mismatch means the template was generated for a different
    /// encoder.
    pub fn load(dir: &Path, dimension: usize, bands: usize, bits: usize) -> Result<Self> {
        check_shape(dimension, bands, bits)?;
        let expected = (bits * dimension * 2) as u64;
        let mut loaded = Vec::with_capacity(bands);
        for band in 0..bands {
            let path = dir.join(band_file_name(band));
            let file = File::open(&path).map_err(|e| {
                Error::store(format!("hash template {}: {e}", path.display()))
            })?;
            let len = file.metadata()?.len();
            if len != expected {
                return Err(Error::store(format!(
                    "hash template {}: expected {expected} bytes, found {len}",
                    path.display()
                )));
            }
            // Safety: the file is opened read-only and never truncated by
            // this process while mapped.
            let map = unsafe { Mmap::map(&file)? };
            loaded.push(Band { map });
        }
        Ok(Self {
            dimension,
            bits,
            bands: loaded,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn bands(&self) -> usize {
        self.bands.len()
    }

    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Sign a vector: one value per band, bit `j` set iff the vector lies
    /// on the non-negative side of hyperplane `j`.
    pub fn sign(&self, v: &SparseVector) -> Signature {
        assert_eq!(
            v.dimension(),
            self.dimension,
            "mismatched dimensions: {} and {}",
            v.dimension(),
            self.dimension
        );
        let values = self
            .bands
            .iter()
            .map(|band| {
                let planes: Vec<CompactSlice<'_>> = (0..self.bits)
                    .map(|j| band.plane(j, self.dimension))
                    .collect();
                band_value(v, &planes)
            })
            .collect();
        Signature::new(values)
    }
}

fn check_shape(dimension: usize, bands: usize, bits: usize) -> Result<()> {
    if dimension == 0 {
        return Err(Error::config("hash template dimension is zero"));
    }
    if bands == 0 || bands > 256 {
        return Err(Error::config(format!("band count {bands} not in 1..=256")));
    }
    if bits == 0 || bits > 16 {
        return Err(Error::config(format!("bits per band {bits} not in 1..=16")));
    }
    Ok(())
}

fn write_band(dir: &Path, dimension: usize, bits: usize, seed: &str, band: usize) -> Result<()> {
    let path: PathBuf = dir.join(band_file_name(band));
    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);
    let mut rng = ChaCha8Rng::seed_from_u64(band_seed(seed, band));
    for _ in 0..bits * dimension {
        let draw: f64 = rng.sample(StandardNormal);
        writer.write_u16::<LittleEndian>(compact(draw))?;
    }
    writer.flush()?;
    Ok(())
}
