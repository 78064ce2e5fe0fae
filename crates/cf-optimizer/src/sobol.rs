//! Sobol low-discrepancy sequence (Gray-code construction, Joe-Kuo direction numbers).

use cf_types::AlgorithmError;

const BITS: usize = 32;

/// `(s, a, m_1..m_s)` for dimensions 2 and up; dimension 1 uses all-ones.
const DIRECTION_NUMBERS: [(u32, u32, &[u32]); 20] = [
    (1, 0, &[1]),
    (2, 1, &[1, 3]),
    (3, 1, &[1, 3, 1]),
    (3, 2, &[1, 1, 1]),
    (4, 1, &[1, 1, 3, 3]),
    (4, 4, &[1, 3, 5, 13]),
    (5, 2, &[1, 1, 5, 5, 17]),
    (5, 4, &[1, 1, 5, 5, 5]),
    (5, 7, &[1, 1, 7, 11, 19]),
    (5, 11, &[1, 1, 5, 1, 1]),
    (5, 13, &[1, 1, 1, 3, 11]),
    (5, 14, &[1, 3, 5, 5, 31]),
    (6, 1, &[1, 3, 3, 9, 7, 49]),
    (6, 13, &[1, 1, 1, 15, 21, 21]),
    (6, 16, &[1, 3, 1, 13, 27, 49]),
    (6, 19, &[1, 1, 1, 15, 7, 5]),
    (6, 22, &[1, 3, 1, 15, 13, 25]),
    (6, 25, &[1, 1, 5, 5, 19, 61]),
    (7, 1, &[1, 3, 7, 11, 23, 15, 103]),
    (7, 4, &[1, 3, 7, 13, 13, 15, 69]),
];

/// Highest dimensionality the built-in direction numbers cover.
pub const MAX_SOBOL_DIMENSIONS: usize = DIRECTION_NUMBERS.len() + 1;

/// Generator of points in the unit hypercube `[0, 1)^d`.
///
/// The all-zero first point of the sequence is skipped.
#[derive(Debug, Clone)]
pub struct Sobol {
    directions: Vec<[u32; BITS]>,
    state: Vec<u32>,
    index: u64,
}

impl Sobol {
    pub fn new(dimensions: usize) -> Result<Self, AlgorithmError> {
        if dimensions == 0 {
            return Err(AlgorithmError::EmptyBounds { algorithm: "sobol" });
        }
        if dimensions > MAX_SOBOL_DIMENSIONS {
            return Err(AlgorithmError::UnsupportedDimension {
                algorithm: "sobol",
                dimensions,
                max: MAX_SOBOL_DIMENSIONS,
            });
        }

        let mut directions = Vec::with_capacity(dimensions);
        let mut first = [0u32; BITS];
        for (k, v) in first.iter_mut().enumerate() {
            *v = 1 << (BITS - 1 - k);
        }
        directions.push(first);

        for &(s, a, m) in DIRECTION_NUMBERS.iter().take(dimensions - 1) {
            let s = s as usize;
            let mut v = [0u32; BITS];
            for k in 0..BITS {
                if k < s {
                    v[k] = m[k] << (BITS - 1 - k);
                } else {
                    v[k] = v[k - s] ^ (v[k - s] >> s);
                    for i in 1..s {
                        if (a >> (s - 1 - i)) & 1 == 1 {
                            v[k] ^= v[k - i];
                        }
                    }
                }
            }
            directions.push(v);
        }

        Ok(Self {
            directions,
            state: vec![0; dimensions],
            index: 0,
        })
    }

    /// Next point of the sequence.
    pub fn next_point(&mut self) -> Vec<f64> {
        let c = (self.index.trailing_ones() as usize).min(BITS - 1);
        self.index += 1;
        for (x, v) in self.state.iter_mut().zip(&self.directions) {
            *x ^= v[c];
        }
        self.state
            .iter()
            .map(|&x| x as f64 / (1u64 << BITS) as f64)
            .collect()
    }
}
