//! Built-in nucleotide scoring matrix.

use super::SubstitutionMatrix;
use crate::stats;

const ALPHABET: &[u8] = b"ACGTN";

const MATCH: i32 = 2;
const MISMATCH: i32 = -3;
/// Score for any pair involving the ambiguity code.
const AMBIGUOUS: i32 = -1;

const GAP_OPEN: i32 = 5;
const GAP_EXTEND: i32 = 2;

/// The +2/-3 nucleotide matrix with gap costs 5/2, unscaled.
pub fn nucleotide() -> SubstitutionMatrix {
    let n = ALPHABET.len();
    let mut raw = vec![0i32; n * n];
    for a in 0..n {
        for b in 0..n {
            let n_code = n - 1;
            raw[a * n + b] = if a == n_code || b == n_code {
                AMBIGUOUS
            } else if a == b {
                MATCH
            } else {
                MISMATCH
            };
        }
    }
    // Uniform base composition; N carries no weight.
    let mut background = vec![0.25; n];
    background[n - 1] = 0.0;

    SubstitutionMatrix::from_parts(
        "nucleotide",
        ALPHABET,
        &raw,
        background,
        0.0,
        1.0,
        stats::NUCLEOTIDE_2_3_5_2,
        GAP_OPEN,
        GAP_EXTEND,
        b'N',
    )
}
