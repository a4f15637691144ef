//! Write side of the indexed database format.
//!
//! Each worker appends to its own shard file, so the hot path takes no
//! shared lock. Closing the writer unifies the shards into the final
//! `(data, index)` pair in ascending ordinal order, which both keeps
//! the output in input order and makes the bytes independent of how
//! work was distributed over workers.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

use super::append_suffix;

struct Shard {
    path: PathBuf,
    writer: BufWriter<File>,
    entries: Vec<(u64, u32, u64, u64)>,
    offset: u64,
}

/// Sharded writer for one output database.
pub struct DbWriter {
    data_path: PathBuf,
    index_path: PathBuf,
    shards: Vec<Mutex<Shard>>,
}

impl DbWriter {
    /// Create the writer with one shard per worker. Shard files live
    /// next to the output as `<data>.<i>` until [`DbWriter::close`]
    /// removes them.
    pub fn create(data: &Path, index: &Path, workers: usize) -> Result<Self> {
        let mut shards = Vec::with_capacity(workers.max(1));
        for i in 0..workers.max(1) {
            let path = append_suffix(data, &format!(".{}", i));
            let file = File::create(&path)
                .with_context(|| format!("cannot create shard {}", path.display()))?;
            shards.push(Mutex::new(Shard {
                path,
                writer: BufWriter::new(file),
                entries: Vec::new(),
                offset: 0,
            }));
        }
        Ok(Self {
            data_path: data.to_path_buf(),
            index_path: index.to_path_buf(),
            shards,
        })
    }

    /// Append one record to the worker's shard. `ordinal` fixes the
    /// record's position in the final output independent of worker
    /// scheduling; `worker` must be the caller's own shard slot, which
    /// is never contended on the hot path.
    pub fn write(&self, key: u32, payload: &[u8], ordinal: u64, worker: usize) -> Result<()> {
        let mut shard = self.shards[worker % self.shards.len()]
            .lock()
            .expect("shard lock poisoned");
        shard
            .writer
            .write_all(payload)
            .with_context(|| format!("cannot append record {} to output shard", key))?;
        shard
            .writer
            .write_all(b"\0")
            .with_context(|| format!("cannot append record {} to output shard", key))?;
        let length = payload.len() as u64 + 1;
        let offset = shard.offset;
        shard.entries.push((ordinal, key, offset, length));
        shard.offset += length;
        Ok(())
    }

    /// Merge the shards into the final database, ordered by ordinal,
    /// and remove the shard files.
    pub fn close(self) -> Result<()> {
        let mut shards = Vec::new();
        for shard in self.shards {
            let mut shard = shard.into_inner().expect("shard lock poisoned");
            shard.writer.flush().context("cannot flush output shard")?;
            shards.push(shard);
        }

        let mut order: Vec<(u64, u32, usize, u64, u64)> = Vec::new();
        for (i, shard) in shards.iter().enumerate() {
            for &(ordinal, key, offset, length) in &shard.entries {
                order.push((ordinal, key, i, offset, length));
            }
        }
        order.sort();

        let mut readers: Vec<File> = shards
            .iter()
            .map(|s| {
                File::open(&s.path)
                    .with_context(|| format!("cannot reopen shard {}", s.path.display()))
            })
            .collect::<Result<_>>()?;

        let mut data = BufWriter::new(File::create(&self.data_path).with_context(|| {
            format!("cannot create output data file {}", self.data_path.display())
        })?);
        let mut index = BufWriter::new(File::create(&self.index_path).with_context(|| {
            format!("cannot create output index {}", self.index_path.display())
        })?);

        let mut out_offset = 0u64;
        let mut buf = Vec::new();
        for (_, key, shard_idx, offset, length) in order {
            let reader = &mut readers[shard_idx];
            reader.seek(SeekFrom::Start(offset))?;
            buf.resize(length as usize, 0);
            reader.read_exact(&mut buf)?;
            data.write_all(&buf)?;
            writeln!(index, "{}\t{}\t{}", key, out_offset, length)?;
            out_offset += length;
        }
        data.flush()?;
        index.flush()?;

        for shard in shards {
            fs::remove_file(&shard.path)
                .with_context(|| format!("cannot remove shard {}", shard.path.display()))?;
        }
        Ok(())
    }

    /// Merge already-closed databases (distributed-mode parts) into
    /// one: data files are concatenated in part order, index offsets
    /// rebased. Parts cover consecutive ordinal ranges, so
    /// concatenation preserves the global input order. Part files are
    /// removed on success.
    pub fn merge_parts(data: &Path, index: &Path, parts: &[(PathBuf, PathBuf)]) -> Result<()> {
        let mut out_data = BufWriter::new(
            File::create(data)
                .with_context(|| format!("cannot create merged data file {}", data.display()))?,
        );
        let mut out_index = BufWriter::new(
            File::create(index)
                .with_context(|| format!("cannot create merged index {}", index.display()))?,
        );

        let mut base = 0u64;
        for (part_data, part_index) in parts {
            let text = fs::read_to_string(part_index)
                .with_context(|| format!("cannot read part index {}", part_index.display()))?;
            for line in text.lines() {
                let mut f = line.split('\t');
                let key: u32 = f.next().context("missing key")?.parse()?;
                let offset: u64 = f.next().context("missing offset")?.parse()?;
                let length: u64 = f.next().context("missing length")?.parse()?;
                writeln!(out_index, "{}\t{}\t{}", key, base + offset, length)?;
            }
            let mut part = File::open(part_data)
                .with_context(|| format!("cannot open part {}", part_data.display()))?;
            base += std::io::copy(&mut part, &mut out_data)
                .with_context(|| format!("cannot merge part {}", part_data.display()))?;
        }
        out_data.flush()?;
        out_index.flush()?;

        for (part_data, part_index) in parts {
            fs::remove_file(part_data)?;
            fs::remove_file(part_index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{index_path, DbReader};

    #[test]
    fn records_merge_in_ordinal_order_regardless_of_shard() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("out");
        let index = index_path(&data);

        let writer = DbWriter::create(&data, &index, 3).unwrap();
        writer.write(9, b"nine", 2, 2).unwrap();
        writer.write(1, b"one", 0, 0).unwrap();
        writer.write(5, b"five", 1, 1).unwrap();
        writer.close().unwrap();

        let reader = DbReader::open(&data).unwrap();
        assert_eq!(
            (0..reader.size()).map(|i| reader.key_at(i)).collect::<Vec<_>>(),
            vec![1, 5, 9]
        );
        assert_eq!(reader.record_by_key(9), Some(b"nine".as_slice()));
        // Shard files are gone.
        assert!(!dir.path().join("out.0").exists());
        assert!(!dir.path().join("out.2").exists());
    }

    #[test]
    fn output_bytes_do_not_depend_on_shard_count() {
        let dir = tempfile::tempdir().unwrap();
        let mk = |name: &str, workers: usize, spread: bool| {
            let data = dir.path().join(name);
            let index = index_path(&data);
            let writer = DbWriter::create(&data, &index, workers).unwrap();
            for key in 0..20u32 {
                let shard = if spread { key as usize % workers } else { 0 };
                writer
                    .write(key, format!("rec{}", key).as_bytes(), key as u64, shard)
                    .unwrap();
            }
            writer.close().unwrap();
            (fs::read(&data).unwrap(), fs::read(&index).unwrap())
        };
        let one = mk("w1", 1, false);
        let four = mk("w4", 4, true);
        assert_eq!(one, four);
    }

    #[test]
    fn merge_parts_concatenates_and_rebases() {
        let dir = tempfile::tempdir().unwrap();
        let mut parts = Vec::new();
        for (i, keys) in [[0u32, 2], [4, 6]].iter().enumerate() {
            let data = dir.path().join(format!("part{}", i));
            let index = index_path(&data);
            let writer = DbWriter::create(&data, &index, 1).unwrap();
            for (n, &k) in keys.iter().enumerate() {
                writer
                    .write(k, format!("value-{}", k).as_bytes(), (i * 2 + n) as u64, 0)
                    .unwrap();
            }
            writer.close().unwrap();
            parts.push((data, index));
        }

        let merged = dir.path().join("merged");
        let merged_index = index_path(&merged);
        DbWriter::merge_parts(&merged, &merged_index, &parts).unwrap();

        let reader = DbReader::open(&merged).unwrap();
        assert_eq!(reader.size(), 4);
        assert_eq!(
            (0..4).map(|i| reader.key_at(i)).collect::<Vec<_>>(),
            vec![0, 2, 4, 6]
        );
        for k in [0u32, 2, 4, 6] {
            assert_eq!(
                reader.record_by_key(k),
                Some(format!("value-{}", k).as_bytes())
            );
        }
        // Parts were removed.
        assert!(!parts[0].0.exists());
        assert!(!parts[1].1.exists());
    }

    #[test]
    fn empty_payloads_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("out");
        let index = index_path(&data);
        let writer = DbWriter::create(&data, &index, 1).unwrap();
        writer.write(3, b"", 0, 0).unwrap();
        writer.close().unwrap();

        let reader = DbReader::open(&data).unwrap();
        assert_eq!(reader.record_by_key(3), Some(b"".as_slice()));
    }
}
