//! Karlin-Altschul statistics for gapped local alignments.
//!
//! E-values are computed from raw Smith-Waterman scores with the
//! classic formula `E = K * m * n * exp(-lambda * S)`, using published
//! parameter sets for the supported scoring systems.

/// Karlin-Altschul statistical parameters for one scoring system.
#[derive(Debug, Clone, Copy)]
pub struct KarlinParams {
    /// Lambda parameter, in units of the *unscaled* score.
    pub lambda: f64,
    /// K parameter.
    pub k: f64,
    /// H parameter (relative entropy per aligned pair).
    pub h: f64,
}

/// Gapped parameters for BLOSUM62 with gap open 11 / extend 1.
pub const BLOSUM62_11_1: KarlinParams = KarlinParams {
    lambda: 0.267,
    k: 0.041,
    h: 0.14,
};

/// Ungapped parameters for BLOSUM62.
pub const BLOSUM62_UNGAPPED: KarlinParams = KarlinParams {
    lambda: 0.3176,
    k: 0.134,
    h: 0.4012,
};

/// Gapped parameters for the +2/-3 nucleotide matrix with gap open 5 /
/// extend 2.
pub const NUCLEOTIDE_2_3_5_2: KarlinParams = KarlinParams {
    lambda: 0.625,
    k: 0.41,
    h: 0.78,
};

impl KarlinParams {
    /// E-value of a raw score against a search space of `query_len`
    /// times `db_residues` residues. `scale` is the integer scaling
    /// factor the score matrix was built with; lambda is divided by it
    /// so that scaled scores can be passed in directly.
    pub fn evalue(&self, score: i32, query_len: usize, db_residues: u64, scale: f64) -> f64 {
        let lambda = self.lambda / scale;
        let space = query_len as f64 * db_residues as f64;
        self.k * space * (-lambda * score as f64).exp()
    }

    /// Bit score of a raw (scaled) score.
    pub fn bit_score(&self, score: i32, scale: f64) -> f64 {
        let lambda = self.lambda / scale;
        (lambda * score as f64 - self.k.ln()) / std::f64::consts::LN_2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evalue_decreases_with_score() {
        let e10 = BLOSUM62_11_1.evalue(10, 100, 10_000, 1.0);
        let e50 = BLOSUM62_11_1.evalue(50, 100, 10_000, 1.0);
        assert!(e50 < e10);
    }

    #[test]
    fn scale_is_compensated() {
        // A score of 40 on a 2x-scaled matrix must give the same
        // e-value as a score of 20 on the unscaled matrix.
        let unscaled = BLOSUM62_11_1.evalue(20, 200, 1_000_000, 1.0);
        let scaled = BLOSUM62_11_1.evalue(40, 200, 1_000_000, 2.0);
        assert!((unscaled - scaled).abs() < 1e-12 * unscaled.abs().max(1.0));
    }

    #[test]
    fn evalue_scales_with_search_space() {
        let small = NUCLEOTIDE_2_3_5_2.evalue(30, 50, 1_000, 1.0);
        let large = NUCLEOTIDE_2_3_5_2.evalue(30, 50, 1_000_000, 1.0);
        assert!((large / small - 1_000.0).abs() < 1e-6);
    }
}
