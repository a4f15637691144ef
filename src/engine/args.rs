//! Configuration of the alignment stage.

use std::path::PathBuf;

use clap::Args;

use crate::sequence::SeqType;

#[derive(Args, Debug, Clone)]
pub struct AlignArgs {
    /// Query sequence database
    #[arg(short, long)]
    pub query: PathBuf,

    /// Target sequence database
    #[arg(short, long)]
    pub target: PathBuf,

    /// Prefilter result database listing candidate targets per query
    #[arg(short, long)]
    pub prefilter: PathBuf,

    /// Output alignment database
    #[arg(short, long)]
    pub out: PathBuf,

    /// Minimum coverage of query and target by the alignment
    #[arg(short = 'c', long, default_value_t = 0.0)]
    pub cov: f32,

    /// Maximum e-value of accepted hits
    #[arg(short, long, default_value_t = 0.001)]
    pub evalue: f64,

    /// Minimum sequence identity of accepted hits
    #[arg(long, default_value_t = 0.0)]
    pub seq_id: f32,

    /// What to compute per pair: 0 = automatic from the thresholds,
    /// 1 = score only, 2 = score and coverage, 3 = score, coverage
    /// and sequence identity
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub alignment_mode: u8,

    /// Accept short high-identity hits covering nearly the whole
    /// target, for merging sequence fragments
    #[arg(long, default_value_t = false)]
    pub frag_merge: bool,

    /// Emit the compressed alignment backtrace column
    #[arg(short = 'a', long, default_value_t = false)]
    pub backtrace: bool,

    /// Capacity of the per-worker sequence buffers
    #[arg(long, default_value_t = 32768)]
    pub max_seq_len: usize,

    /// Worker threads (0 = all cores)
    #[arg(short = 'n', long, default_value_t = 0)]
    pub threads: usize,

    /// Correct alignment scores for locally biased residue composition
    #[arg(long, default_value_t = false)]
    pub comp_bias_corr: bool,

    /// Query sequence type; read from the .dbtype file when omitted
    #[arg(long, value_enum)]
    pub query_seq_type: Option<SeqType>,

    /// Target sequence type; read from the .dbtype file when omitted
    #[arg(long, value_enum)]
    pub target_seq_type: Option<SeqType>,

    /// Substitution matrix file in NCBI text format; the built-in
    /// BLOSUM62 is used when omitted
    #[arg(long)]
    pub sub_mat: Option<PathBuf>,

    /// Maximum accepted hits per query
    #[arg(long, default_value_t = 300)]
    pub max_accept: usize,

    /// Stop a query after this many consecutive rejections
    #[arg(long, default_value_t = 2147483647)]
    pub max_rejected: usize,

    /// Rank of this process in a distributed run
    #[arg(long, default_value_t = 0)]
    pub mpi_rank: u32,

    /// Number of processes in a distributed run
    #[arg(long, default_value_t = 1)]
    pub mpi_size: u32,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl AlignArgs {
    /// Arguments with the CLI defaults for the given databases;
    /// callers adjust individual fields from there.
    pub fn with_paths(query: PathBuf, target: PathBuf, prefilter: PathBuf, out: PathBuf) -> Self {
        Self {
            query,
            target,
            prefilter,
            out,
            cov: 0.0,
            evalue: 0.001,
            seq_id: 0.0,
            alignment_mode: 0,
            frag_merge: false,
            backtrace: false,
            max_seq_len: 32768,
            threads: 0,
            comp_bias_corr: false,
            query_seq_type: None,
            target_seq_type: None,
            sub_mat: None,
            max_accept: 300,
            max_rejected: 2147483647,
            mpi_rank: 0,
            mpi_size: 1,
            verbose: false,
        }
    }
}
