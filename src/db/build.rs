//! `mkdb`: build an indexed sequence database from a FASTA file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use bio::io::fasta;
use clap::{Args, ValueEnum};

use super::{index_path, lookup_path, write_dbtype, DbWriter};
use crate::sequence::SeqType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DbTypeChoice {
    /// Detect from the residue composition of the input.
    Auto,
    AminoAcid,
    Nucleotide,
}

#[derive(Args, Debug)]
pub struct MkdbArgs {
    /// Input FASTA file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output database path
    #[arg(short, long)]
    pub out: PathBuf,

    /// Sequence type recorded in the .dbtype file
    #[arg(long, value_enum, default_value_t = DbTypeChoice::Auto)]
    pub dbtype: DbTypeChoice,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

pub fn run(args: &MkdbArgs) -> Result<()> {
    let reader = fasta::Reader::from_file(&args.input)
        .with_context(|| format!("cannot open FASTA file {}", args.input.display()))?;

    let index = index_path(&args.out);
    let writer = DbWriter::create(&args.out, &index, 1)?;
    let mut lookup = BufWriter::new(
        File::create(lookup_path(&args.out)).context("cannot create lookup file")?,
    );

    let mut key = 0u32;
    let mut residues = 0u64;
    let mut nucleotide_votes = 0usize;
    let mut sampled = 0usize;
    for record in reader.records() {
        let record = record.with_context(|| format!("invalid FASTA record after key {}", key))?;
        let seq = record.seq();
        if seq.is_empty() {
            bail!("FASTA record {} has an empty sequence", record.id());
        }
        for &c in seq.iter().take(1000usize.saturating_sub(sampled)) {
            if matches!(c.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T' | b'U' | b'N') {
                nucleotide_votes += 1;
            }
            sampled += 1;
        }
        writer.write(key, seq, key as u64, 0)?;
        writeln!(lookup, "{}\t{}", key, record.id())?;
        residues += seq.len() as u64;
        key += 1;
    }
    writer.close()?;
    lookup.flush()?;

    let seq_type = match args.dbtype {
        DbTypeChoice::AminoAcid => SeqType::AminoAcid,
        DbTypeChoice::Nucleotide => SeqType::Nucleotide,
        DbTypeChoice::Auto => {
            if sampled > 0 && nucleotide_votes * 10 >= sampled * 9 {
                SeqType::Nucleotide
            } else {
                SeqType::AminoAcid
            }
        }
    };
    write_dbtype(&args.out, seq_type)?;

    if args.verbose {
        eprintln!(
            "[INFO] Wrote {} sequences ({} residues) to {}",
            key,
            residues,
            args.out.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::db::{read_dbtype, DbReader};

    fn build(fasta_text: &str, dbtype: DbTypeChoice) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let fasta_path = dir.path().join("in.fasta");
        fs::write(&fasta_path, fasta_text).unwrap();
        let out = dir.path().join("seqdb");
        run(&MkdbArgs {
            input: fasta_path,
            out: out.clone(),
            dbtype,
            verbose: false,
        })
        .unwrap();
        (dir, out)
    }

    #[test]
    fn builds_keyed_records_and_lookup() {
        let (_dir, out) = build(
            ">first description\nACGTACGT\n>second\nGGGG\nTTTT\n",
            DbTypeChoice::Auto,
        );
        let reader = DbReader::open(&out).unwrap();
        assert_eq!(reader.size(), 2);
        assert_eq!(reader.record_by_key(0), Some(b"ACGTACGT".as_slice()));
        // Multi-line sequences are joined.
        assert_eq!(reader.record_by_key(1), Some(b"GGGGTTTT".as_slice()));

        let lookup = fs::read_to_string(lookup_path(&out)).unwrap();
        assert_eq!(lookup, "0\tfirst\n1\tsecond\n");
        assert_eq!(read_dbtype(&out), Some(SeqType::Nucleotide));
    }

    #[test]
    fn protein_input_is_detected() {
        let (_dir, out) = build(">p1\nMKVLITTRWHEE\n>p2\nDDEEWWYYFFPP\n", DbTypeChoice::Auto);
        assert_eq!(read_dbtype(&out), Some(SeqType::AminoAcid));
    }
}
