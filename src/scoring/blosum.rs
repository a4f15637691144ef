//! BLOSUM62 scoring, built in and loadable from NCBI-format files.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use super::SubstitutionMatrix;
use crate::stats;

/// Gap costs used for protein alignment, in unscaled score units.
const GAP_OPEN: i32 = 11;
const GAP_EXTEND: i32 = 1;

/// Protein alphabet in BLOSUM62 matrix order, ambiguity codes last.
const ALPHABET: &[u8] = b"ARNDCQEGHILKMFPSTWYVBJZX";

/// BLOSUM62 scores over [`ALPHABET`], row-major.
#[rustfmt::skip]
const BLOSUM62: [i32; 24 * 24] = [
    //       A,  R,  N,  D,  C,  Q,  E,  G,  H,  I,  L,  K,  M,  F,  P,  S,  T,  W,  Y,  V,  B,  J,  Z,  X
    /*A*/    4, -1, -2, -2,  0, -1, -1,  0, -2, -1, -1, -1, -1, -2, -1,  1,  0, -3, -2,  0, -2, -1, -1, -1,
    /*R*/   -1,  5,  0, -2, -3,  1,  0, -2,  0, -3, -2,  2, -1, -3, -2, -1, -1, -3, -2, -3, -1, -2,  0, -1,
    /*N*/   -2,  0,  6,  1, -3,  0,  0,  0,  1, -3, -3,  0, -2, -3, -2,  1,  0, -4, -2, -3,  4, -3,  0, -1,
    /*D*/   -2, -2,  1,  6, -3,  0,  2, -1, -1, -3, -4, -1, -3, -3, -1,  0, -1, -4, -3, -3,  4, -3,  1, -1,
    /*C*/    0, -3, -3, -3,  9, -3, -4, -3, -3, -1, -1, -3, -1, -2, -3, -1, -1, -2, -2, -1, -3, -1, -3, -1,
    /*Q*/   -1,  1,  0,  0, -3,  5,  2, -2,  0, -3, -2,  1,  0, -3, -1,  0, -1, -2, -1, -2,  0, -2,  4, -1,
    /*E*/   -1,  0,  0,  2, -4,  2,  5, -2,  0, -3, -3,  1, -2, -3, -1,  0, -1, -3, -2, -2,  1, -3,  4, -1,
    /*G*/    0, -2,  0, -1, -3, -2, -2,  6, -2, -4, -4, -2, -3, -3, -2,  0, -2, -2, -3, -3, -1, -4, -2, -1,
    /*H*/   -2,  0,  1, -1, -3,  0,  0, -2,  8, -3, -3, -1, -2, -1, -2, -1, -2, -2,  2, -3,  0, -3,  0, -1,
    /*I*/   -1, -3, -3, -3, -1, -3, -3, -4, -3,  4,  2, -3,  1,  0, -3, -2, -1, -3, -1,  3, -3,  3, -3, -1,
    /*L*/   -1, -2, -3, -4, -1, -2, -3, -4, -3,  2,  4, -2,  2,  0, -3, -2, -1, -2, -1,  1, -4,  3, -3, -1,
    /*K*/   -1,  2,  0, -1, -3,  1,  1, -2, -1, -3, -2,  5, -1, -3, -1,  0, -1, -3, -2, -2,  0, -3,  1, -1,
    /*M*/   -1, -1, -2, -3, -1,  0, -2, -3, -2,  1,  2, -1,  5,  0, -2, -1, -1, -1, -1,  1, -3,  2, -1, -1,
    /*F*/   -2, -3, -3, -3, -2, -3, -3, -3, -1,  0,  0, -3,  0,  6, -4, -2, -2,  1,  3, -1, -3,  0, -3, -1,
    /*P*/   -1, -2, -2, -1, -3, -1, -1, -2, -2, -3, -3, -1, -2, -4,  7, -1, -1, -4, -3, -2, -2, -3, -1, -1,
    /*S*/    1, -1,  1,  0, -1,  0,  0,  0, -1, -2, -2,  0, -1, -2, -1,  4,  1, -3, -2, -2,  0, -2,  0, -1,
    /*T*/    0, -1,  0, -1, -1, -1, -1, -2, -2, -1, -1, -1, -1, -2, -1,  1,  5, -2, -2,  0, -1, -1, -1, -1,
    /*W*/   -3, -3, -4, -4, -2, -2, -3, -2, -2, -3, -2, -3, -1,  1, -4, -3, -2, 11,  2, -3, -4, -2, -2, -1,
    /*Y*/   -2, -2, -2, -3, -2, -1, -2, -3,  2, -1, -1, -2, -1,  3, -3, -2, -2,  2,  7, -1, -3, -1, -2, -1,
    /*V*/    0, -3, -3, -3, -1, -2, -2, -3, -3,  3,  1, -2,  1, -1, -2, -2,  0, -3, -1,  4, -3,  2, -2, -1,
    /*B*/   -2, -1,  4,  4, -3,  0,  1, -1,  0, -3, -4,  0, -3, -3, -2,  0, -1, -4, -3, -3,  4, -3,  0, -1,
    /*J*/   -1, -2, -3, -3, -1, -2, -3, -4, -3,  3,  3, -3,  2,  0, -3, -2, -1, -2, -1,  2, -3,  3, -3, -1,
    /*Z*/   -1,  0,  0,  1, -3,  4,  4, -2,  0, -3, -3,  1, -1, -3, -1,  0, -1, -2, -2, -2,  0, -3,  4, -1,
    /*X*/   -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1, -1,
];

/// Robinson-Robinson background frequencies for the 20 standard amino
/// acids; ambiguity codes get zero weight.
#[rustfmt::skip]
const BACKGROUND: [f64; 24] = [
    0.07805, 0.05129, 0.04487, 0.05364, 0.01925, 0.04264, 0.06295,
    0.07377, 0.02199, 0.05142, 0.09019, 0.05744, 0.02243, 0.03856,
    0.05203, 0.07120, 0.05841, 0.01330, 0.03216, 0.06441,
    0.0, 0.0, 0.0, 0.0,
];

/// Built-in BLOSUM62 with the given score bias and integer scale.
pub fn blosum62(bias: f64, scale: f64) -> SubstitutionMatrix {
    SubstitutionMatrix::from_parts(
        "blosum62",
        ALPHABET,
        &BLOSUM62,
        BACKGROUND.to_vec(),
        bias,
        scale,
        stats::BLOSUM62_11_1,
        GAP_OPEN,
        GAP_EXTEND,
        b'X',
    )
}

/// Load a protein matrix from an NCBI-format text file: `#` comment
/// lines, a header row of residue letters, then one score row per
/// residue. Alignment statistics fall back to the BLOSUM62 gapped
/// parameters, which is adequate for BLOSUM-family matrices.
pub fn from_file(path: &Path, bias: f64, scale: f64) -> Result<SubstitutionMatrix> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read substitution matrix {}", path.display()))?;

    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    let header = lines
        .next()
        .with_context(|| format!("substitution matrix {} is empty", path.display()))?;
    let mut alphabet: Vec<u8> = Vec::new();
    for tok in header.split_ascii_whitespace() {
        if tok.len() != 1 {
            bail!("invalid residue {:?} in matrix header", tok);
        }
        let c = tok.as_bytes()[0].to_ascii_uppercase();
        if c != b'*' {
            alphabet.push(c);
        }
    }
    let n = alphabet.len();
    if n == 0 || n > super::MAX_ALPHABET {
        bail!("unsupported alphabet size {} in {}", n, path.display());
    }

    let mut raw = vec![0i32; n * n];
    let mut seen = vec![false; n];
    for line in lines {
        let mut fields = line.split_ascii_whitespace();
        let row_char = fields
            .next()
            .map(|t| t.as_bytes()[0].to_ascii_uppercase())
            .context("missing row residue")?;
        if row_char == b'*' {
            continue;
        }
        let row = alphabet
            .iter()
            .position(|&c| c == row_char)
            .with_context(|| format!("row residue {} not in header", row_char as char))?;
        seen[row] = true;
        let mut col = 0usize;
        for (i, tok) in fields.enumerate() {
            // Columns past the declared alphabet belong to '*'.
            if i >= n + 1 {
                bail!("too many columns in matrix row {}", row_char as char);
            }
            if i >= n {
                continue;
            }
            raw[row * n + col] = tok
                .parse()
                .with_context(|| format!("invalid score {:?} in row {}", tok, row_char as char))?;
            col += 1;
        }
        if col != n {
            bail!(
                "matrix row {} has {} scores, expected {}",
                row_char as char,
                col,
                n
            );
        }
    }
    if let Some(missing) = seen.iter().position(|&s| !s) {
        bail!("matrix is missing the row for {}", alphabet[missing] as char);
    }

    let background: Vec<f64> = alphabet
        .iter()
        .map(|&c| {
            ALPHABET
                .iter()
                .position(|&b| b == c)
                .map(|i| BACKGROUND[i])
                .unwrap_or(0.0)
        })
        .collect();

    let fallback = if alphabet.contains(&b'X') { b'X' } else { alphabet[n - 1] };
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "custom".to_string());

    Ok(SubstitutionMatrix::from_parts(
        &name,
        &alphabet,
        &raw,
        background,
        bias,
        scale,
        stats::BLOSUM62_11_1,
        GAP_OPEN,
        GAP_EXTEND,
        fallback,
    ))
}
