//! The alignment stage driver.
//!
//! Walks the prefilter database, aligns every query against its
//! candidate targets, filters the results by coverage, identity and
//! e-value and writes one sorted record per query to the output
//! database. Work is distributed over rayon workers in chunks of
//! contiguous ordinals; per-worker scratch (sequence buffers and the
//! aligner) lives in the worker state, and each worker appends to its
//! own output shard.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use super::args::AlignArgs;
use crate::align::{compare_hits, AlignmentMode, Matcher};
use crate::db::{self, DbReader, DbWriter};
use crate::prefilter::CandidateList;
use crate::scoring::{self, SubstitutionMatrix};
use crate::sequence::{SeqType, Sequence};
use crate::utils::{decompose_by_residue_load, tmp_part_names, NoBarrier, RankBarrier};

/// Ordinals per flush bucket. The prefilter mapping is re-established
/// after each bucket so resident memory stays bounded regardless of
/// input size.
const FLUSH_SIZE: usize = 1_000_000;

/// Contiguous ordinals handed to a worker at a time. Small enough for
/// dynamic balancing; per-query cost varies widely with the candidate
/// list length.
const CHUNK_SIZE: usize = 100;

/// Run summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlignStats {
    /// Alignments computed.
    pub alignments: u64,
    /// Pairs that passed the acceptance thresholds.
    pub passed: u64,
}

/// Resolve the effective evaluation mode from the requested one and
/// the thresholds. Backtrace output needs the full evaluation; with
/// automatic selection, the cheapest mode that can serve the
/// configured thresholds wins.
pub fn resolve_mode(
    requested: u8,
    cov_thr: f32,
    seq_id_thr: f32,
    fragment_merge: bool,
    add_backtrace: bool,
) -> Result<AlignmentMode> {
    let mode = if add_backtrace {
        AlignmentMode::ScoreCovSeqId
    } else {
        match requested {
            0 => {
                if cov_thr == 0.0 && seq_id_thr == 0.0 {
                    AlignmentMode::ScoreOnly
                } else if cov_thr > 0.0 && seq_id_thr == 0.0 {
                    AlignmentMode::ScoreCov
                } else {
                    AlignmentMode::ScoreCovSeqId
                }
            }
            1 => AlignmentMode::ScoreOnly,
            2 => AlignmentMode::ScoreCov,
            3 => AlignmentMode::ScoreCovSeqId,
            other => bail!("unknown alignment mode {}", other),
        }
    };
    if fragment_merge && mode == AlignmentMode::ScoreOnly {
        bail!("fragment merging needs coverage information; use alignment mode 2 or 3");
    }
    Ok(mode)
}

/// The configured alignment stage over three open databases.
pub struct Alignment {
    cov_thr: f32,
    eval_thr: f64,
    seq_id_thr: f32,
    fragment_merge: bool,
    add_backtrace: bool,
    comp_bias: bool,
    mode: AlignmentMode,
    max_seq_len: usize,
    threads: usize,
    max_accept: usize,
    max_rejected: usize,
    matrix: SubstitutionMatrix,
    qdbr: DbReader,
    tdbr: DbReader,
    prefdbr: DbReader,
    same_qt_db: bool,
    out_data: PathBuf,
    out_index: PathBuf,
    verbose: bool,
}

/// Per-worker scratch, built once per worker and reused across
/// queries.
struct Worker<'m> {
    query: Sequence,
    target: Sequence,
    matcher: Matcher<'m>,
}

impl Alignment {
    pub fn new(args: &AlignArgs) -> Result<Self> {
        let mode = resolve_mode(
            args.alignment_mode,
            args.cov,
            args.seq_id,
            args.frag_merge,
            args.backtrace,
        )?;

        let query_type = args
            .query_seq_type
            .or_else(|| db::read_dbtype(&args.query))
            .unwrap_or(SeqType::AminoAcid);
        let target_type = args
            .target_seq_type
            .or_else(|| db::read_dbtype(&args.target))
            .unwrap_or(query_type);
        if query_type.is_protein_like() != target_type.is_protein_like() {
            bail!("query and target databases have incompatible sequence types");
        }

        let matrix = if query_type.is_protein_like() {
            match &args.sub_mat {
                Some(path) => scoring::from_file(path, 0.0, 2.0)?,
                None => scoring::blosum62(0.0, 2.0),
            }
        } else {
            scoring::nucleotide()
        };

        let threads = if args.threads == 0 {
            num_cpus::get()
        } else {
            args.threads
        };

        if args.verbose {
            let what = match mode {
                AlignmentMode::ScoreOnly => "score only",
                AlignmentMode::ScoreCov => "score and coverage",
                AlignmentMode::ScoreCovSeqId => "score, coverage and sequence identity",
            };
            eprintln!("[INFO] Computing {} with {} threads", what, threads);
        }

        let qdbr = DbReader::open(&args.query)
            .with_context(|| format!("cannot open query database {}", args.query.display()))?;
        let mut tdbr = DbReader::open(&args.target)
            .with_context(|| format!("cannot open target database {}", args.target.display()))?;
        // The target store is hit once per candidate; keep it resident.
        tdbr.preload()?;
        let prefdbr = DbReader::open(&args.prefilter).with_context(|| {
            format!("cannot open prefilter database {}", args.prefilter.display())
        })?;
        let same_qt_db = args.query == args.target;

        Ok(Self {
            cov_thr: args.cov,
            eval_thr: args.evalue,
            seq_id_thr: args.seq_id,
            fragment_merge: args.frag_merge,
            add_backtrace: args.backtrace,
            comp_bias: args.comp_bias_corr,
            mode,
            max_seq_len: args.max_seq_len,
            threads,
            max_accept: args.max_accept,
            max_rejected: args.max_rejected,
            matrix,
            qdbr,
            tdbr,
            prefdbr,
            same_qt_db,
            out_data: args.out.clone(),
            out_index: db::index_path(&args.out),
            verbose: args.verbose,
        })
    }

    /// Align the whole prefilter database in this process.
    pub fn run(&mut self) -> Result<AlignStats> {
        let size = self.prefdbr.size();
        let (out_data, out_index) = (self.out_data.clone(), self.out_index.clone());
        self.run_range(&out_data, &out_index, 0, size)
    }

    /// Align this rank's share of the prefilter database, then let
    /// rank 0 merge all parts after the barrier.
    pub fn run_split(
        &mut self,
        rank: u32,
        ranks: u32,
        barrier: &dyn RankBarrier,
    ) -> Result<AlignStats> {
        let lens: Vec<usize> = (0..self.prefdbr.size())
            .map(|i| {
                self.qdbr
                    .record_by_key(self.prefdbr.key_at(i))
                    .map(|r| r.len())
                    .unwrap_or(0)
            })
            .collect();
        let (from, size) = decompose_by_residue_load(&lens, rank, ranks);
        if self.verbose {
            eprintln!(
                "[INFO] Rank {} aligns ordinals {} to {}",
                rank,
                from,
                from + size
            );
        }

        let (part_data, part_index) = tmp_part_names(&self.out_data, &self.out_index, rank);
        let stats = self.run_range(&part_data, &part_index, from, size)?;

        barrier.wait();

        if rank == 0 {
            let parts: Vec<(PathBuf, PathBuf)> = (0..ranks)
                .map(|r| tmp_part_names(&self.out_data, &self.out_index, r))
                .collect();
            for (data, index) in &parts {
                if !data.exists() || !index.exists() {
                    bail!(
                        "distributed part {} is missing; merge aborted",
                        data.display()
                    );
                }
            }
            DbWriter::merge_parts(&self.out_data, &self.out_index, &parts)?;
        }
        Ok(stats)
    }

    fn run_range(
        &mut self,
        out_data: &Path,
        out_index: &Path,
        db_from: usize,
        db_size: usize,
    ) -> Result<AlignStats> {
        let writer = DbWriter::create(out_data, out_index, self.threads)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .context("cannot build the worker pool")?;

        let alignments = AtomicU64::new(0);
        let passed = AtomicU64::new(0);
        let db_residues = self.tdbr.residue_count();

        let bar = if self.verbose {
            let bar = ProgressBar::new(db_size as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
                    .expect("static progress template"),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let buckets = db_size.div_ceil(FLUSH_SIZE);
        for bucket in 0..buckets {
            let start = db_from + bucket * FLUSH_SIZE;
            let bucket_size = (db_size - bucket * FLUSH_SIZE).min(FLUSH_SIZE);
            let chunk_starts: Vec<usize> = (start..start + bucket_size)
                .step_by(CHUNK_SIZE)
                .collect();

            {
                let this = &*self;
                let writer = &writer;
                let bar = &bar;
                let alignments = &alignments;
                let passed = &passed;
                pool.install(|| {
                    chunk_starts.par_iter().try_for_each_init(
                        || Worker {
                            query: Sequence::new(this.max_seq_len),
                            target: Sequence::new(this.max_seq_len),
                            matcher: Matcher::new(&this.matrix, db_residues, this.comp_bias),
                        },
                        |worker, &chunk_start| -> Result<()> {
                            let end = (chunk_start + CHUNK_SIZE).min(start + bucket_size);
                            let slot = rayon::current_thread_index().unwrap_or(0);
                            for ordinal in chunk_start..end {
                                this.process_query(
                                    worker, ordinal, writer, slot, alignments, passed,
                                )?;
                            }
                            bar.inc((end - chunk_start) as u64);
                            Ok(())
                        },
                    )
                })?;
            }

            // Release the prefilter pages this bucket touched.
            self.prefdbr.remap()?;
        }

        writer.close()?;
        bar.finish_and_clear();

        let stats = AlignStats {
            alignments: alignments.into_inner(),
            passed: passed.into_inner(),
        };
        if self.verbose {
            eprintln!("[INFO] All sequences processed");
            eprintln!("[INFO] {} alignments calculated", stats.alignments);
            eprintln!(
                "[INFO] {} pairs passed the thresholds ({:.4} of calculated)",
                stats.passed,
                if stats.alignments == 0 {
                    0.0
                } else {
                    stats.passed as f64 / stats.alignments as f64
                }
            );
            if db_size > 0 {
                eprintln!(
                    "[INFO] {:.2} hits per query sequence",
                    stats.passed as f64 / db_size as f64
                );
            }
        }
        Ok(stats)
    }

    /// Process one prefilter ordinal: parse its candidate list, align
    /// each candidate until the early-termination bounds fire, sort
    /// the accepted hits and append the serialized record under the
    /// query key.
    fn process_query(
        &self,
        worker: &mut Worker,
        ordinal: usize,
        writer: &DbWriter,
        slot: usize,
        alignments: &AtomicU64,
        passed: &AtomicU64,
    ) -> Result<()> {
        let query_key = self.prefdbr.key_at(ordinal);
        let pref_record = self.prefdbr.record_at(ordinal);

        let query_data = self.qdbr.record_by_key(query_key).ok_or_else(|| {
            anyhow!(
                "query sequence {} is listed in the prefilter result but missing \
                 from the query database; check your databases",
                query_key
            )
        })?;
        worker.query.map(query_key, query_data, &self.matrix)?;
        worker.matcher.init_query(&worker.query);

        let mut hits = Vec::new();
        let mut accepted = 0usize;
        let mut rejected = 0usize;

        for target_key in CandidateList::new(pref_record) {
            if accepted >= self.max_accept || rejected >= self.max_rejected {
                break;
            }
            // Exact self-hits must survive filtering when query and
            // target are the same database; short sequences otherwise
            // drop their own match to numerical artifacts.
            let is_identity = self.same_qt_db && target_key == query_key;

            let target_data = self.tdbr.record_by_key(target_key).ok_or_else(|| {
                anyhow!(
                    "target sequence {} is listed in the prefilter result but missing \
                     from the target database; check your databases",
                    target_key
                )
            })?;
            worker.target.map(target_key, target_data, &self.matrix)?;

            if !self.fragment_merge {
                let q_len = worker.query.len() as f32;
                let t_len = worker.target.len() as f32;
                if q_len / t_len < self.cov_thr || t_len / q_len < self.cov_thr {
                    rejected += 1;
                    continue;
                }
            }

            let mut res = worker
                .matcher
                .align(&worker.target, self.mode, self.add_backtrace);
            alignments.fetch_add(1, Ordering::Relaxed);

            if is_identity {
                res.q_cov = 1.0;
                res.db_cov = 1.0;
                res.seq_id = 1.0;
            }

            let general = res.eval <= self.eval_thr
                && res.seq_id >= self.seq_id_thr
                && res.q_cov >= self.cov_thr
                && res.db_cov >= self.cov_thr;
            let fragment = self.fragment_merge
                && matches!(
                    self.mode,
                    AlignmentMode::ScoreCov | AlignmentMode::ScoreCovSeqId
                )
                && res.db_cov >= 0.95
                && res.seq_id >= 0.9;

            if is_identity || general || fragment {
                hits.push(res);
                accepted += 1;
                passed.fetch_add(1, Ordering::Relaxed);
                rejected = 0;
            } else {
                rejected += 1;
            }
        }

        hits.sort_by(compare_hits);
        let mut record = String::new();
        for hit in &hits {
            hit.append_line(&mut record);
        }
        writer.write(query_key, record.as_bytes(), ordinal as u64, slot)
    }
}

/// Entry point of the `align` subcommand.
pub fn run(args: &AlignArgs) -> Result<AlignStats> {
    let mut alignment = Alignment::new(args)?;
    if args.mpi_size > 1 {
        alignment.run_split(args.mpi_rank, args.mpi_size, &NoBarrier)
    } else {
        alignment.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_resolution_table() {
        use AlignmentMode::*;
        // Automatic selection by thresholds.
        assert_eq!(resolve_mode(0, 0.0, 0.0, false, false).unwrap(), ScoreOnly);
        assert_eq!(resolve_mode(0, 0.5, 0.0, false, false).unwrap(), ScoreCov);
        assert_eq!(resolve_mode(0, 0.5, 0.3, false, false).unwrap(), ScoreCovSeqId);
        assert_eq!(resolve_mode(0, 0.0, 0.3, false, false).unwrap(), ScoreCovSeqId);
        // Explicit modes pass through.
        assert_eq!(resolve_mode(1, 0.9, 0.9, false, false).unwrap(), ScoreOnly);
        assert_eq!(resolve_mode(2, 0.0, 0.9, false, false).unwrap(), ScoreCov);
        assert_eq!(resolve_mode(3, 0.0, 0.0, false, false).unwrap(), ScoreCovSeqId);
    }

    #[test]
    fn backtrace_promotes_the_mode() {
        assert_eq!(
            resolve_mode(1, 0.0, 0.0, false, true).unwrap(),
            AlignmentMode::ScoreCovSeqId
        );
        // Promotion happens before the fragment-merge check.
        assert!(resolve_mode(1, 0.0, 0.0, true, true).is_ok());
    }

    #[test]
    fn fragment_merge_rejects_score_only() {
        assert!(resolve_mode(1, 0.0, 0.0, true, false).is_err());
        assert!(resolve_mode(0, 0.0, 0.0, true, false).is_err());
        assert!(resolve_mode(2, 0.0, 0.0, true, false).is_ok());
    }
}
