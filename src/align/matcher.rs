//! Per-worker aligner: query profile construction, composition-bias
//! correction, kernel dispatch by evaluation mode and e-value
//! attachment.

use super::result::{self, compress_backtrace, AlignmentResult};
use super::sw::{QueryProfile, SmithWaterman};
use super::AlignmentMode;
use crate::scoring::SubstitutionMatrix;
use crate::sequence::Sequence;

/// Window for the composition-bias correction, residues around each
/// query position.
const BIAS_WINDOW: usize = 40;

/// One aligner instance per worker. Holds the active query profile and
/// the kernel scratch; both are reused across targets.
pub struct Matcher<'m> {
    matrix: &'m SubstitutionMatrix,
    kernel: SmithWaterman,
    profile: QueryProfile,
    query: Vec<u8>,
    bias: Vec<i32>,
    comp_bias: bool,
    /// Total residue count of the target store; the search space for
    /// e-values.
    db_residues: u64,
}

impl<'m> Matcher<'m> {
    pub fn new(matrix: &'m SubstitutionMatrix, db_residues: u64, comp_bias: bool) -> Self {
        Self {
            matrix,
            kernel: SmithWaterman::new(),
            profile: QueryProfile::new(),
            query: Vec::new(),
            bias: Vec::new(),
            comp_bias,
            db_residues,
        }
    }

    /// Install a new query: copy its residues, recompute the bias
    /// corrections and rebuild the score profile.
    pub fn init_query(&mut self, query: &Sequence) {
        self.query.clear();
        self.query.extend_from_slice(query.residues());
        self.compute_bias();
        let m = self.matrix;
        self.profile.build(
            &self.query,
            m.alphabet_size(),
            |a, b| m.score(a, b),
            &self.bias,
            m.gap_open,
            m.gap_extend,
        );
    }

    /// Composition-bias correction per query position: the difference
    /// between the background-expected score of the residue and its
    /// mean score against a local window. Windows enriched in residues
    /// the position scores well against get penalized; compositionally
    /// average windows leave scores untouched.
    fn compute_bias(&mut self) {
        self.bias.clear();
        if !self.comp_bias {
            self.bias.resize(self.query.len(), 0);
            return;
        }
        let len = self.query.len();
        for i in 0..len {
            let lo = i.saturating_sub(BIAS_WINDOW / 2);
            let hi = (i + BIAS_WINDOW / 2).min(len);
            let mut sum = 0i64;
            let mut n = 0i64;
            for j in lo..hi {
                if j != i {
                    sum += self.matrix.score(self.query[i], self.query[j]) as i64;
                    n += 1;
                }
            }
            if n == 0 {
                self.bias.push(0);
                continue;
            }
            let window_mean = sum as f64 / n as f64;
            // expected_score is in scaled units already, as is the
            // window mean.
            let expected = self.matrix.expected_score(self.query[i]);
            self.bias.push((expected - window_mean).round() as i32);
        }
    }

    /// Align the current query against one target under the given
    /// evaluation mode.
    pub fn align(
        &mut self,
        target: &Sequence,
        mode: AlignmentMode,
        add_backtrace: bool,
    ) -> AlignmentResult {
        let q_len = self.query.len();
        let db_len = target.len();

        match mode {
            AlignmentMode::ScoreOnly => {
                let (score, q_end, db_end) =
                    self.kernel.score_only(&self.profile, target.residues());
                AlignmentResult {
                    db_key: target.db_key(),
                    score,
                    seq_id: 0.0,
                    eval: self.evalue(score, q_len),
                    q_start: 0,
                    q_end,
                    q_len,
                    db_start: 0,
                    db_end,
                    db_len,
                    q_cov: 0.0,
                    db_cov: 0.0,
                    backtrace: None,
                }
            }
            AlignmentMode::ScoreCov | AlignmentMode::ScoreCovSeqId => {
                let hit = self
                    .kernel
                    .align(&self.profile, &self.query, target.residues());
                let seq_id = if hit.aligned_cols == 0 {
                    0.0
                } else {
                    hit.matches as f32 / hit.aligned_cols as f32
                };
                let backtrace = (add_backtrace && mode == AlignmentMode::ScoreCovSeqId)
                    .then(|| compress_backtrace(&hit.ops));
                AlignmentResult {
                    db_key: target.db_key(),
                    score: hit.score,
                    seq_id,
                    eval: self.evalue(hit.score, q_len),
                    q_start: hit.q_start,
                    q_end: hit.q_end,
                    q_len,
                    db_start: hit.t_start,
                    db_end: hit.t_end,
                    db_len,
                    q_cov: result::coverage(hit.q_start, hit.q_end, q_len),
                    db_cov: result::coverage(hit.t_start, hit.t_end, db_len),
                    backtrace,
                }
            }
        }
    }

    fn evalue(&self, score: i32, q_len: usize) -> f64 {
        self.matrix
            .stats
            .evalue(score, q_len, self.db_residues, self.matrix.scale)
    }
}
