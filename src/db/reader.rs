//! Read side of the indexed database format.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use memmap2::Mmap;
use rustc_hash::FxHashMap;

use super::index_path;

#[derive(Debug, Clone, Copy)]
pub struct IndexEntry {
    pub key: u32,
    pub offset: u64,
    /// Stored length including the `\0` terminator.
    pub length: u64,
}

enum Data {
    /// Backed by the OS page cache; dropped and re-established by
    /// [`DbReader::remap`].
    Mapped(Mmap),
    /// Fully resident copy, used for stores that are hit for every
    /// candidate.
    Loaded(Vec<u8>),
    Empty,
}

impl Data {
    fn bytes(&self) -> &[u8] {
        match self {
            Data::Mapped(m) => m,
            Data::Loaded(v) => v,
            Data::Empty => &[],
        }
    }
}

/// Memory-mapped reader over one `(data, index)` pair. Records are
/// addressable by ordinal (index order) and by key.
pub struct DbReader {
    data_path: PathBuf,
    data: Data,
    index: Vec<IndexEntry>,
    by_key: FxHashMap<u32, usize>,
}

impl DbReader {
    pub fn open(db: &Path) -> Result<Self> {
        let data_path = db.to_path_buf();
        let idx_path = index_path(db);
        let index_text = fs::read_to_string(&idx_path)
            .with_context(|| format!("cannot read index {}", idx_path.display()))?;

        let data = map_file(&data_path)?;
        let data_len = data.bytes().len() as u64;

        let mut index = Vec::new();
        let mut by_key = FxHashMap::default();
        for (lineno, line) in index_text.lines().enumerate() {
            let mut fields = line.split('\t');
            let parse = |field: Option<&str>, what: &str| -> Result<u64> {
                field
                    .with_context(|| format!("{}:{}: missing {}", idx_path.display(), lineno + 1, what))?
                    .parse()
                    .with_context(|| format!("{}:{}: invalid {}", idx_path.display(), lineno + 1, what))
            };
            let key = parse(fields.next(), "key")? as u32;
            let offset = parse(fields.next(), "offset")?;
            let length = parse(fields.next(), "length")?;
            if offset + length > data_len {
                bail!(
                    "{}:{}: record for key {} exceeds the data file",
                    idx_path.display(),
                    lineno + 1,
                    key
                );
            }
            by_key.insert(key, index.len());
            index.push(IndexEntry { key, offset, length });
        }

        Ok(Self {
            data_path,
            data,
            index,
            by_key,
        })
    }

    /// Number of records.
    pub fn size(&self) -> usize {
        self.index.len()
    }

    pub fn key_at(&self, ordinal: usize) -> u32 {
        self.index[ordinal].key
    }

    /// Record payload at an ordinal, without the terminator.
    pub fn record_at(&self, ordinal: usize) -> &[u8] {
        self.payload(&self.index[ordinal])
    }

    /// Record payload by key, without the terminator.
    pub fn record_by_key(&self, key: u32) -> Option<&[u8]> {
        self.by_key
            .get(&key)
            .map(|&ordinal| self.payload(&self.index[ordinal]))
    }

    /// Payload lengths per ordinal, terminators excluded.
    pub fn seq_lens(&self) -> Vec<usize> {
        self.index
            .iter()
            .map(|e| e.length.saturating_sub(1) as usize)
            .collect()
    }

    /// Total payload bytes across all records.
    pub fn residue_count(&self) -> u64 {
        self.index.iter().map(|e| e.length.saturating_sub(1)).sum()
    }

    /// Replace the mapping with a resident copy of the data file.
    pub fn preload(&mut self) -> Result<()> {
        self.data = Data::Loaded(self.data.bytes().to_vec());
        Ok(())
    }

    /// Drop the mapping and re-establish it, releasing the pages the
    /// previous mapping accumulated. No-op for preloaded stores.
    pub fn remap(&mut self) -> Result<()> {
        if matches!(self.data, Data::Mapped(_) | Data::Empty) {
            self.data = map_file(&self.data_path)?;
        }
        Ok(())
    }

    fn payload<'a>(&'a self, entry: &IndexEntry) -> &'a [u8] {
        let bytes = &self.data.bytes()[entry.offset as usize..(entry.offset + entry.length) as usize];
        match bytes.last() {
            Some(0) => &bytes[..bytes.len() - 1],
            _ => bytes,
        }
    }
}

fn map_file(path: &Path) -> Result<Data> {
    let file =
        File::open(path).with_context(|| format!("cannot open data file {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("cannot stat {}", path.display()))?
        .len();
    if len == 0 {
        return Ok(Data::Empty);
    }
    // The data file is never mutated while mapped; writers produce a
    // new file and rename nothing in place.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("cannot map data file {}", path.display()))?;
    Ok(Data::Mapped(mmap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbWriter;

    fn write_db(dir: &Path, name: &str, records: &[(u32, &[u8])]) -> PathBuf {
        let data = dir.join(name);
        let index = index_path(&data);
        let writer = DbWriter::create(&data, &index, 1).unwrap();
        for (ordinal, &(key, payload)) in records.iter().enumerate() {
            writer.write(key, payload, ordinal as u64, 0).unwrap();
        }
        writer.close().unwrap();
        data
    }

    #[test]
    fn reads_records_by_ordinal_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let db = write_db(
            dir.path(),
            "seqs",
            &[(3, b"ACGT".as_slice()), (7, b"GG".as_slice()), (9, b"".as_slice())],
        );
        let reader = DbReader::open(&db).unwrap();
        assert_eq!(reader.size(), 3);
        assert_eq!(reader.key_at(0), 3);
        assert_eq!(reader.record_at(0), b"ACGT");
        assert_eq!(reader.record_by_key(7), Some(b"GG".as_slice()));
        assert_eq!(reader.record_by_key(9), Some(b"".as_slice()));
        assert_eq!(reader.record_by_key(4), None);
        assert_eq!(reader.seq_lens(), vec![4, 2, 0]);
        assert_eq!(reader.residue_count(), 6);
    }

    #[test]
    fn preload_and_remap_keep_contents() {
        let dir = tempfile::tempdir().unwrap();
        let db = write_db(dir.path(), "seqs", &[(1, b"ACGTACGT".as_slice())]);
        let mut reader = DbReader::open(&db).unwrap();
        reader.remap().unwrap();
        assert_eq!(reader.record_at(0), b"ACGTACGT");
        reader.preload().unwrap();
        assert_eq!(reader.record_at(0), b"ACGTACGT");
    }

    #[test]
    fn rejects_index_past_end_of_data() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("broken");
        fs::write(&data, b"AB\0").unwrap();
        fs::write(index_path(&data), "1\t0\t99\n").unwrap();
        assert!(DbReader::open(&data).is_err());
    }

    #[test]
    fn empty_database_has_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("empty");
        fs::write(&data, b"").unwrap();
        fs::write(index_path(&data), "").unwrap();
        let reader = DbReader::open(&data).unwrap();
        assert_eq!(reader.size(), 0);
        assert_eq!(reader.residue_count(), 0);
    }
}
