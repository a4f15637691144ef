//! Alignment results, their total order and the record line format.

use std::cmp::Ordering;

use anyhow::{Context, Result};

/// Result of one query/target local alignment with full statistics.
#[derive(Debug, Clone)]
pub struct AlignmentResult {
    /// Key of the target sequence.
    pub db_key: u32,
    /// Raw (scaled) Smith-Waterman score.
    pub score: i32,
    /// Fraction of identical columns over the aligned length.
    pub seq_id: f32,
    /// E-value of the score.
    pub eval: f64,
    /// Query start position (0-based, inclusive).
    pub q_start: usize,
    /// Query end position (0-based, inclusive).
    pub q_end: usize,
    pub q_len: usize,
    /// Target start position (0-based, inclusive).
    pub db_start: usize,
    /// Target end position (0-based, inclusive).
    pub db_end: usize,
    pub db_len: usize,
    /// Fraction of the query covered by the alignment.
    pub q_cov: f32,
    /// Fraction of the target covered by the alignment.
    pub db_cov: f32,
    /// Run-length-encoded alignment operations, when requested.
    pub backtrace: Option<String>,
}

/// Edit operation of one alignment column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    /// Identical residues.
    Match,
    /// Differing residues.
    Mismatch,
    /// Column consumes the query only.
    Ins,
    /// Column consumes the target only.
    Del,
}

impl EditOp {
    fn letter(self) -> char {
        match self {
            EditOp::Match | EditOp::Mismatch => 'M',
            EditOp::Ins => 'I',
            EditOp::Del => 'D',
        }
    }
}

/// Compress an edit script to the run-length encoded `{M,I,D}` form,
/// e.g. `12M3I9M`. Match and mismatch columns both count as `M`.
pub fn compress_backtrace(ops: &[EditOp]) -> String {
    let mut out = String::new();
    let mut iter = ops.iter().map(|op| op.letter()).peekable();
    while let Some(letter) = iter.next() {
        let mut run = 1usize;
        while iter.peek() == Some(&letter) {
            iter.next();
            run += 1;
        }
        out.push_str(&run.to_string());
        out.push(letter);
    }
    out
}

/// Total order of hits within one query: score descending, ties broken
/// by target key ascending so output is stable across runs and worker
/// counts.
pub fn compare_hits(a: &AlignmentResult, b: &AlignmentResult) -> Ordering {
    match b.score.cmp(&a.score) {
        Ordering::Equal => a.db_key.cmp(&b.db_key),
        ord => ord,
    }
}

impl AlignmentResult {
    /// Append this hit as one record line. Sequence identity uses
    /// fixed notation with three fractional digits, the e-value
    /// scientific notation; the backtrace column is present only when
    /// one was computed.
    pub fn append_line(&self, out: &mut String) {
        out.push_str(&format!(
            "{}\t{}\t{:.3}\t{:.3e}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.db_key,
            self.score,
            self.seq_id,
            self.eval,
            self.q_start,
            self.q_end,
            self.q_len,
            self.db_start,
            self.db_end,
            self.db_len,
        ));
        if let Some(bt) = &self.backtrace {
            out.push('\t');
            out.push_str(bt);
        }
        out.push('\n');
    }

    /// Parse one record line produced by [`AlignmentResult::append_line`].
    /// Coverages are reconstructed from the positions.
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut f = line.trim_end_matches('\n').split('\t');
        let mut next = |name: &str| f.next().with_context(|| format!("missing {} column", name));

        let db_key = next("target key")?.parse()?;
        let score = next("score")?.parse()?;
        let seq_id: f32 = next("sequence identity")?.parse()?;
        let eval: f64 = next("e-value")?.parse()?;
        let q_start: usize = next("query start")?.parse()?;
        let q_end: usize = next("query end")?.parse()?;
        let q_len: usize = next("query length")?.parse()?;
        let db_start: usize = next("target start")?.parse()?;
        let db_end: usize = next("target end")?.parse()?;
        let db_len: usize = next("target length")?.parse()?;
        let backtrace = f.next().map(str::to_string);

        Ok(Self {
            db_key,
            score,
            seq_id,
            eval,
            q_start,
            q_end,
            q_len,
            db_start,
            db_end,
            db_len,
            q_cov: coverage(q_start, q_end, q_len),
            db_cov: coverage(db_start, db_end, db_len),
            backtrace,
        })
    }
}

/// Covered fraction of a sequence by an inclusive position range.
pub fn coverage(start: usize, end: usize, len: usize) -> f32 {
    if len == 0 || end < start {
        return 0.0;
    }
    (end - start + 1) as f32 / len as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_result(score: i32, db_key: u32) -> AlignmentResult {
        AlignmentResult {
            db_key,
            score,
            seq_id: 0.987,
            eval: 1.5e-42,
            q_start: 0,
            q_end: 99,
            q_len: 100,
            db_start: 10,
            db_end: 109,
            db_len: 200,
            q_cov: 1.0,
            db_cov: 0.5,
            backtrace: None,
        }
    }

    #[test]
    fn line_roundtrip() {
        let res = make_result(250, 42);
        let mut line = String::new();
        res.append_line(&mut line);
        assert_eq!(line, "42\t250\t0.987\t1.500e-42\t0\t99\t100\t10\t109\t200\n");

        let parsed = AlignmentResult::parse_line(&line).unwrap();
        let mut again = String::new();
        parsed.append_line(&mut again);
        assert_eq!(line, again);
        assert!((parsed.db_cov - 0.5).abs() < 1e-6);
    }

    #[test]
    fn line_roundtrip_with_backtrace() {
        let mut res = make_result(77, 3);
        res.backtrace = Some("50M2D48M".to_string());
        let mut line = String::new();
        res.append_line(&mut line);
        assert!(line.ends_with("\t50M2D48M\n"));

        let parsed = AlignmentResult::parse_line(&line).unwrap();
        assert_eq!(parsed.backtrace.as_deref(), Some("50M2D48M"));
        let mut again = String::new();
        parsed.append_line(&mut again);
        assert_eq!(line, again);
    }

    #[test]
    fn hits_order_score_desc_then_key_asc() {
        let mut hits = vec![make_result(100, 5), make_result(200, 9), make_result(100, 2)];
        hits.sort_by(compare_hits);
        let keys: Vec<u32> = hits.iter().map(|h| h.db_key).collect();
        assert_eq!(keys, vec![9, 2, 5]);
    }

    #[test]
    fn backtrace_compression() {
        use EditOp::*;
        let ops = [Match, Match, Mismatch, Ins, Ins, Ins, Match, Del];
        assert_eq!(compress_backtrace(&ops), "3M3I1M1D");
        assert_eq!(compress_backtrace(&[]), "");
    }

    #[test]
    fn coverage_of_full_and_empty_ranges() {
        assert!((coverage(0, 99, 100) - 1.0).abs() < 1e-6);
        assert!((coverage(10, 109, 200) - 0.5).abs() < 1e-6);
        assert_eq!(coverage(5, 4, 100), 0.0);
        assert_eq!(coverage(0, 0, 0), 0.0);
    }
}
