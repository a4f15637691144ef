//! `rmdb`: remove a database and its satellite files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use super::{dbtype_path, index_path, lookup_path};

#[derive(Args, Debug)]
pub struct RmdbArgs {
    /// Database path to remove
    pub db: PathBuf,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

pub fn run(args: &RmdbArgs) -> Result<()> {
    let mut removed = 0usize;
    for path in files_for(&args.db)? {
        fs::remove_file(&path).with_context(|| format!("cannot remove {}", path.display()))?;
        removed += 1;
    }
    if args.verbose {
        eprintln!("[INFO] Removed {} files of {}", removed, args.db.display());
    }
    Ok(())
}

/// All files making up the database: the data file, any leftover
/// numeric-suffix shards, and the index/dbtype/lookup satellites that
/// exist.
fn files_for(db: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if db.exists() {
        files.push(db.to_path_buf());
    }
    for satellite in [index_path(db), dbtype_path(db), lookup_path(db)] {
        if satellite.exists() {
            files.push(satellite);
        }
    }

    let parent = match db.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if let Some(stem) = db.file_name().map(|n| n.to_string_lossy().into_owned()) {
        let prefix = format!("{}.", stem);
        if let Ok(dir) = fs::read_dir(&parent) {
            for entry in dir.flatten() {
                let name = entry.file_name().to_string_lossy().into_owned();
                if let Some(suffix) = name.strip_prefix(&prefix) {
                    if !suffix.is_empty() && suffix.bytes().all(|c| c.is_ascii_digit()) {
                        files.push(entry.path());
                    }
                }
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_database_shards_and_satellites() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("mydb");
        for name in ["mydb", "mydb.index", "mydb.dbtype", "mydb.lookup", "mydb.0", "mydb.12"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        // Not part of the database.
        fs::write(dir.path().join("mydb.bak"), b"x").unwrap();
        fs::write(dir.path().join("other"), b"x").unwrap();

        run(&RmdbArgs {
            db: db.clone(),
            verbose: false,
        })
        .unwrap();

        assert!(!db.exists());
        assert!(!dir.path().join("mydb.index").exists());
        assert!(!dir.path().join("mydb.0").exists());
        assert!(!dir.path().join("mydb.12").exists());
        assert!(dir.path().join("mydb.bak").exists());
        assert!(dir.path().join("other").exists());
    }

    #[test]
    fn succeeds_when_nothing_exists() {
        let dir = tempfile::tempdir().unwrap();
        run(&RmdbArgs {
            db: dir.path().join("ghost"),
            verbose: false,
        })
        .unwrap();
    }
}
