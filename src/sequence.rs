//! Sequence types and the reusable encoded-sequence buffer.

use anyhow::{bail, Result};
use clap::ValueEnum;

use crate::scoring::SubstitutionMatrix;

/// Kind of sequence stored in a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeqType {
    /// Amino-acid sequences.
    AminoAcid,
    /// Nucleotide sequences.
    Nucleotide,
    /// Profile consensus sequences; scored like amino acids.
    Profile,
}

impl SeqType {
    /// Numeric tag used in `.dbtype` files.
    pub fn dbtype_code(self) -> u32 {
        match self {
            SeqType::AminoAcid => 0,
            SeqType::Nucleotide => 1,
            SeqType::Profile => 2,
        }
    }

    pub fn from_dbtype_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(SeqType::AminoAcid),
            1 => Some(SeqType::Nucleotide),
            2 => Some(SeqType::Profile),
            _ => None,
        }
    }

    /// Whether the protein scoring path applies.
    pub fn is_protein_like(self) -> bool {
        matches!(self, SeqType::AminoAcid | SeqType::Profile)
    }
}

/// A fixed-capacity encoded sequence, reused across records by one
/// worker. Mapping replaces the previous content.
pub struct Sequence {
    max_len: usize,
    data: Vec<u8>,
    db_key: u32,
}

impl Sequence {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            data: Vec::with_capacity(max_len.min(1 << 16)),
            db_key: 0,
        }
    }

    /// Encode `raw` into this buffer under the matrix alphabet.
    /// Whitespace bytes are skipped so records may carry trailing
    /// newlines. Fails if the encoded length exceeds the configured
    /// maximum sequence length.
    pub fn map(&mut self, db_key: u32, raw: &[u8], matrix: &SubstitutionMatrix) -> Result<()> {
        self.data.clear();
        self.db_key = db_key;
        for &c in raw {
            if c.is_ascii_whitespace() {
                continue;
            }
            if self.data.len() == self.max_len {
                bail!(
                    "sequence {} is longer than the configured maximum of {} residues",
                    db_key,
                    self.max_len
                );
            }
            self.data.push(matrix.encode(c));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Encoded residues.
    pub fn residues(&self) -> &[u8] {
        &self.data
    }

    pub fn db_key(&self) -> u32 {
        self.db_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring;

    #[test]
    fn map_skips_whitespace_and_reuses_buffer() {
        let m = scoring::nucleotide();
        let mut s = Sequence::new(100);
        s.map(7, b"ACGT\nACGT\n", &m).unwrap();
        assert_eq!(s.len(), 8);
        assert_eq!(s.db_key(), 7);

        s.map(8, b"GG", &m).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.residues(), &[m.encode(b'G'), m.encode(b'G')]);
    }

    #[test]
    fn map_rejects_oversized_input() {
        let m = scoring::nucleotide();
        let mut s = Sequence::new(4);
        assert!(s.map(1, b"ACGTA", &m).is_err());
    }

    #[test]
    fn dbtype_codes_roundtrip() {
        for t in [SeqType::AminoAcid, SeqType::Nucleotide, SeqType::Profile] {
            assert_eq!(SeqType::from_dbtype_code(t.dbtype_code()), Some(t));
        }
        assert_eq!(SeqType::from_dbtype_code(9), None);
    }
}
