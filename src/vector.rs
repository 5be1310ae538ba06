//! Vector algebra for the similarity pipeline
//!
//! Three representations share one read-side contract: dense `f64` vectors,
//! sparse vectors (sorted index/value pairs), and compacted-Gaussian vectors
//! whose components are 16-bit fixed-point codes. Random-projection sign
//! bits and band packing live here too.

use rand::Rng;
use rand_distr::StandardNormal;

/// Quantize to 12 fractional bits over `[-8, 8)`. Values outside the range
/// saturate; standard-normal draws land outside it with negligible
/// probability.
pub fn compact(x: f64) -> u16 {
    ((x + 8.0) * 4096.0).floor() as u16
}

pub fn uncompact(code: u16) -> f64 {
    (code as f64 / 4096.0) - 8.0
}

/// Read-side contract shared by all vector representations.
pub trait Vector {
    fn dimension(&self) -> usize;

    fn component(&self, i: usize) -> f64;

    fn norm(&self) -> f64 {
        let mut sum = 0.0;
        for i in 0..self.dimension() {
            let x = self.component(i);
            sum += x * x;
        }
        sum.sqrt()
    }
}

/// Dense real vector.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseVector(pub Vec<f64>);

impl Vector for DenseVector {
    fn dimension(&self) -> usize {
        self.0.len()
    }

    fn component(&self, i: usize) -> f64 {
        self.0[i]
    }
}

/// Owned compacted-Gaussian vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactVector(pub Vec<u16>);

impl CompactVector {
    /// Draw a standard-normal vector and store it compacted.
    pub fn random<R: Rng>(dimension: usize, rng: &mut R) -> Self {
        let codes = (0..dimension)
            .map(|_| compact(rng.sample(StandardNormal)))
            .collect();
        Self(codes)
    }
}

impl Vector for CompactVector {
    fn dimension(&self) -> usize {
        self.0.len()
    }

    fn component(&self, i: usize) -> f64 {
        uncompact(self.0[i])
    }
}

/// Compacted-Gaussian vector borrowed from a raw little-endian byte region,
/// e.g. one hyperplane inside a memory-mapped band file.
#[derive(Debug, Clone, Copy)]
pub struct CompactSlice<'a>(&'a [u8]);

impl<'a> CompactSlice<'a> {
    /// `bytes` must hold little-endian u16 codes; length must be even.
    pub fn new(bytes: &'a [u8]) -> Self {
        debug_assert!(bytes.len() % 2 == 0);
        Self(bytes)
    }
}

impl Vector for CompactSlice<'_> {
    fn dimension(&self) -> usize {
        self.0.len() / 2
    }

    fn component(&self, i: usize) -> f64 {
        uncompact(u16::from_le_bytes([self.0[2 * i], self.0[2 * i + 1]]))
    }
}

/// Sparse vector: a dimension plus strictly-increasing `(index, value)`
/// components. Produced per record by the encoder; never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    dimension: usize,
    components: Vec<(usize, f64)>,
}

impl SparseVector {
    /// `components` must be sorted by strictly increasing index.
    pub fn from_sorted(dimension: usize, components: Vec<(usize, f64)>) -> Self {
        debug_assert!(components.windows(2).all(|w| w[0].0 < w[1].0));
        debug_assert!(components.last().map_or(true, |c| c.0 < dimension));
        Self {
            dimension,
            components,
        }
    }

    pub fn components(&self) -> &[(usize, f64)] {
        &self.components
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Sparse × anything: walk our components and index into the other side.
    pub fn dot<V: Vector + ?Sized>(&self, other: &V) -> f64 {
        assert_eq!(
            self.dimension,
            other.dimension(),
            "mismatched dimensions: {} and {}",
            self.dimension,
            other.dimension()
        );
        self.components
            .iter()
            .map(|&(i, v)| v * other.component(i))
            .sum()
    }

    /// Sparse × sparse: two-pointer walk over the sorted component lists.
    pub fn dot_sparse(&self, other: &SparseVector) -> f64 {
        assert_eq!(
            self.dimension, other.dimension,
            "mismatched dimensions: {} and {}",
            self.dimension, other.dimension
        );
        let (mut a, mut b) = (0, 0);
        let mut sum = 0.0;
        while a < self.components.len() && b < other.components.len() {
            let (ai, av) = self.components[a];
            let (bi, bv) = other.components[b];
            if ai < bi {
                a += 1;
            } else if bi < ai {
                b += 1;
            } else {
                sum += av * bv;
                a += 1;
                b += 1;
            }
        }
        sum
    }

    pub fn cosine<V: Vector + ?Sized>(&self, other: &V) -> f64 {
        self.dot(other) / (self.norm() * other.norm())
    }
}

impl Vector for SparseVector {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn component(&self, i: usize) -> f64 {
        match self.components.binary_search_by_key(&i, |c| c.0) {
            Ok(pos) => self.components[pos].1,
            Err(_) => 0.0,
        }
    }

    fn norm(&self) -> f64 {
        self.components
            .iter()
            .map(|&(_, v)| v * v)
            .sum::<f64>()
            .sqrt()
    }
}

/// Dense × dense (general) dot product.
pub fn dot<A: Vector + ?Sized, B: Vector + ?Sized>(a: &A, b: &B) -> f64 {
    assert_eq!(
        a.dimension(),
        b.dimension(),
        "mismatched dimensions: {} and {}",
        a.dimension(),
        b.dimension()
    );
    (0..a.dimension()).map(|i| a.component(i) * b.component(i)).sum()
}

pub fn cosine<A: Vector + ?Sized, B: Vector + ?Sized>(a: &A, b: &B) -> f64 {
    dot(a, b) / (a.norm() * b.norm())
}

/// Random-projection sign bit: true iff `v` lies on the non-negative side
/// of the hyperplane.
pub fn sign_bit<V: Vector + ?Sized>(v: &SparseVector, hyperplane: &V) -> bool {
    v.dot(hyperplane) >= 0.0
}

/// Pack one band value from up to 16 hyperplanes, bit `j` set iff
/// `⟨v, hyperplanes[j]⟩ ≥ 0`. Bit order is least-significant-first and
/// stable for the lifetime of the loaded hyperplane family.
pub fn band_value<V: Vector>(v: &SparseVector, hyperplanes: &[V]) -> u16 {
    debug_assert!(hyperplanes.len() <= 16);
    let mut bits = 0u16;
    for (j, h) in hyperplanes.iter().enumerate() {
        if sign_bit(v, h) {
            bits |= 1 << j;
        }
    }
    bits
}


#[cfg(test)]
mod props {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::BTreeMap;

    const DIM: usize = 32;

    fn sparse_from(pairs: Vec<(usize, f64)>) -> SparseVector {
        let map: BTreeMap<usize, f64> = pairs.into_iter().collect();
        SparseVector::from_sorted(DIM, map.into_iter().collect())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Quantization error stays within one 12-fractional-bit step.
        #[test]
        fn prop_compact_round_trip(x in -8.0f64..8.0) {
            let err = (uncompact(compact(x)) - x).abs();
            prop_assert!(err <= 1.0 / 4096.0, "x={x} err={err}");
        }

        /// Sign bits depend only on direction, never on magnitude.
        /// Power-of-two scales keep the float arithmetic exact, so the
        /// assertion holds for every generated case rather than almost all.
        #[test]
        fn prop_band_value_scale_invariant(
            pairs in proptest::collection::vec((0..DIM, -10.0f64..10.0), 0..8),
            exponent in -8i32..9,
            seed in any::<u64>(),
        ) {
            let alpha = 2.0f64.powi(exponent);
            let v = sparse_from(pairs.clone());
            let scaled = sparse_from(
                pairs.into_iter().map(|(i, x)| (i, x * alpha)).collect(),
            );

            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let planes: Vec<CompactVector> =
                (0..16).map(|_| CompactVector::random(DIM, &mut rng)).collect();
            prop_assert_eq!(band_value(&v, &planes), band_value(&scaled, &planes));
        }

        /// The two-pointer sparse×sparse path agrees with the indexed walk.
        #[test]
        fn prop_sparse_dot_paths_agree(
            a in proptest::collection::vec((0..DIM, -10.0f64..10.0), 0..10),
            b in proptest::collection::vec((0..DIM, -10.0f64..10.0), 0..10),
        ) {
            let a = sparse_from(a);
            let b = sparse_from(b);
            prop_assert!((a.dot_sparse(&b) - a.dot(&b)).abs() < 1e-9);
            prop_assert!((a.dot_sparse(&b) - b.dot_sparse(&a)).abs() < 1e-9);
        }
    }
}
