//! File-system helpers for rewriting a data file in place.
//!
//! - [`atomic_write`]: write a sibling temp file, sync it, rename it over the destination
//! - [`next_backup_path`]: the next free `name.~N~` backup name
//! - [`replace_with_backup`]: keep a numbered backup of the old file, then atomically write

#![forbid(unsafe_code)]

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtomicWriteError<E> {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("backup of `{path}` failed: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("write error: {0}")]
    Writer(#[source] E),
}

fn parent_dir_or_dot(path: &Path) -> &Path {
    // `Path::parent` is `Some("")` for bare file names.
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Atomically write `dest`: `write_fn` fills a temp file in the same directory, which is
/// flushed, synced and renamed into place.
///
/// If `write_fn` fails the destination is left untouched and the temp file is removed.
pub fn atomic_write<T, E>(
    dest: impl AsRef<Path>,
    write_fn: impl FnOnce(&mut File) -> Result<T, E>,
) -> Result<T, AtomicWriteError<E>> {
    let dest = dest.as_ref();
    let dir = parent_dir_or_dot(dest);
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    let out = write_fn(tmp.as_file_mut()).map_err(AtomicWriteError::Writer)?;

    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;

    let tmp_path = tmp.into_temp_path();
    fs::rename(&tmp_path, dest)?;

    if let Err(err) = sync_parent_dir(dest) {
        log::debug!("could not sync directory of {}: {err}", dest.display());
    }
    Ok(out)
}

fn sync_parent_dir(path: &Path) -> io::Result<()> {
    File::open(parent_dir_or_dot(path))?.sync_all()
}

fn backup_index(file_name: &str, stem: &str) -> Option<u64> {
    file_name
        .strip_prefix(stem)?
        .strip_prefix(".~")?
        .strip_suffix('~')?
        .parse()
        .ok()
}

/// `path.~N~`, with N one greater than the largest existing backup of `path`.
pub fn next_backup_path(path: impl AsRef<Path>) -> io::Result<PathBuf> {
    let path = path.as_ref();
    let dir = parent_dir_or_dot(path);
    let stem = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;

    let mut highest = 0u64;
    match fs::read_dir(dir) {
        Ok(entries) => {
            for entry in entries {
                let name = entry?.file_name();
                if let Some(n) = backup_index(&name.to_string_lossy(), &stem) {
                    highest = highest.max(n);
                }
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    Ok(dir.join(format!("{stem}.~{}~", highest + 1)))
}

/// Replace `dest` atomically, first copying any existing file to its next backup name.
///
/// Returns the backup path, if one was written, with `write_fn`'s result.
pub fn replace_with_backup<T, E>(
    dest: impl AsRef<Path>,
    write_fn: impl FnOnce(&mut File) -> Result<T, E>,
) -> Result<(T, Option<PathBuf>), AtomicWriteError<E>> {
    let dest = dest.as_ref();
    let backup = if dest.exists() {
        let backup = next_backup_path(dest)?;
        fs::copy(dest, &backup).map_err(|source| AtomicWriteError::Backup {
            path: dest.to_path_buf(),
            source,
        })?;
        Some(backup)
    } else {
        None
    };
    let out = atomic_write(dest, write_fn)?;
    Ok((out, backup))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn failed_write_leaves_destination_untouched() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("data.sdds");
        fs::write(&dest, b"original").expect("seed");

        let err = atomic_write(&dest, |file| {
            file.write_all(b"partial").expect("write temp");
            Err::<(), _>(io::Error::new(io::ErrorKind::Other, "simulated failure"))
        })
        .expect_err("writer failure is surfaced");
        assert!(matches!(err, AtomicWriteError::Writer(_)));

        assert_eq!(fs::read(&dest).expect("read"), b"original");
        assert_eq!(files_in(tmp.path()), vec!["data.sdds".to_string()]);
    }

    #[test]
    fn backups_are_numbered_monotonically() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("run.sdds");
        fs::write(&dest, b"v1").expect("seed");
        fs::write(tmp.path().join("run.sdds.~7~"), b"old").expect("old backup");
        fs::write(tmp.path().join("other.sdds.~9~"), b"other").expect("unrelated");

        let ((), backup) =
            replace_with_backup(&dest, |file| file.write_all(b"v2")).expect("replace");
        assert_eq!(backup, Some(tmp.path().join("run.sdds.~8~")));
        assert_eq!(fs::read(&dest).expect("read"), b"v2");
        assert_eq!(fs::read(tmp.path().join("run.sdds.~8~")).expect("backup"), b"v1");
        assert_eq!(
            next_backup_path(&dest).expect("next"),
            tmp.path().join("run.sdds.~9~")
        );
    }

    #[test]
    fn no_backup_for_a_new_file() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let dest = tmp.path().join("fresh.sdds");
        let (n, backup) = replace_with_backup(&dest, |file| {
            file.write_all(b"abc")?;
            Ok::<_, io::Error>(3)
        })
        .expect("write");
        assert_eq!((n, backup), (3, None));
        assert_eq!(files_in(tmp.path()), vec!["fresh.sdds".to_string()]);
    }
}
