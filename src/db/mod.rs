//! Indexed key/value sequence databases.
//!
//! A database `<db>` is a pair of files: `<db>` holds the record
//! payloads, each terminated by a `\0` byte, and `<db>.index` holds
//! one `"<key>\t<offset>\t<length>\n"` line per record (length
//! includes the terminator). Ordinals are index-line order. Databases
//! may carry a `.dbtype` tag file and a `.lookup` name table.

pub mod build;
pub mod reader;
pub mod rmdb;
pub mod writer;

pub use reader::DbReader;
pub use writer::DbWriter;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::sequence::SeqType;

/// Path of the index file belonging to a database.
pub fn index_path(db: &Path) -> PathBuf {
    append_suffix(db, ".index")
}

/// Path of the `.dbtype` tag file belonging to a database.
pub fn dbtype_path(db: &Path) -> PathBuf {
    append_suffix(db, ".dbtype")
}

/// Path of the `.lookup` name table belonging to a database.
pub fn lookup_path(db: &Path) -> PathBuf {
    append_suffix(db, ".lookup")
}

pub(crate) fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Read the sequence type tag of a database, if one is present and
/// well-formed.
pub fn read_dbtype(db: &Path) -> Option<SeqType> {
    let bytes = fs::read(dbtype_path(db)).ok()?;
    let code = u32::from_le_bytes(bytes.get(..4)?.try_into().ok()?);
    SeqType::from_dbtype_code(code)
}

/// Write the sequence type tag of a database.
pub fn write_dbtype(db: &Path, seq_type: SeqType) -> Result<()> {
    let path = dbtype_path(db);
    fs::write(&path, seq_type.dbtype_code().to_le_bytes())
        .with_context(|| format!("cannot write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satellite_paths_append_suffixes() {
        let db = Path::new("/tmp/run/targets");
        assert_eq!(index_path(db), Path::new("/tmp/run/targets.index"));
        assert_eq!(dbtype_path(db), Path::new("/tmp/run/targets.dbtype"));
        assert_eq!(lookup_path(db), Path::new("/tmp/run/targets.lookup"));
    }

    #[test]
    fn dbtype_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("seqs");
        assert_eq!(read_dbtype(&db), None);
        write_dbtype(&db, SeqType::Nucleotide).unwrap();
        assert_eq!(read_dbtype(&db), Some(SeqType::Nucleotide));
    }
}
