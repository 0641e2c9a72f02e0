use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::EvalError;

pub const FILE_CAPACITY: usize = 100;

/// Environment variable holding whitespace-separated directories searched for input files.
pub const SEARCH_PATH_ENV: &str = "SDDS_SEARCH_PATH";

/// The search path from [`SEARCH_PATH_ENV`], if set.
pub fn search_path_from_env() -> Vec<PathBuf> {
    std::env::var(SEARCH_PATH_ENV)
        .map(|v| v.split_whitespace().map(PathBuf::from).collect())
        .unwrap_or_default()
}

/// Resolve `name` for reading: as given if it exists, else the first hit in `dirs`.
pub fn find_in_search_path(name: &str, dirs: &[PathBuf]) -> PathBuf {
    let direct = PathBuf::from(name);
    if direct.exists() || direct.is_absolute() {
        return direct;
    }
    dirs.iter()
        .map(|dir| dir.join(name))
        .find(|p| p.exists())
        .unwrap_or(direct)
}

enum Slot {
    Stdin,
    Stdout,
    Reader {
        reader: BufReader<File>,
    },
    Writer {
        writer: BufWriter<File>,
    },
}

/// Open files addressed by number; 0 is stdin and 1 is stdout.
pub struct FileRegistry {
    slots: Vec<Option<Slot>>,
    search_path: Vec<PathBuf>,
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl std::fmt::Debug for FileRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRegistry")
            .field("open", &self.slots.iter().filter(|s| s.is_some()).count())
            .field("search_path", &self.search_path)
            .finish()
    }
}

impl FileRegistry {
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self {
            slots: vec![Some(Slot::Stdin), Some(Slot::Stdout)],
            search_path,
        }
    }

    pub fn set_search_path(&mut self, dirs: Vec<PathBuf>) {
        self.search_path = dirs;
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Open `spec`, written `name[,mode]` with mode `r` (default), `w` or `a`.
    pub fn open(&mut self, spec: &str) -> Result<i64, EvalError> {
        let (name, mode) = match spec.rsplit_once(',') {
            Some((name, mode)) if matches!(mode, "r" | "w" | "a") => (name, mode),
            _ => (spec, "r"),
        };
        let slot = match mode {
            "r" => {
                let path = find_in_search_path(name, &self.search_path);
                let file = File::open(&path).map_err(|source| EvalError::OpenFile {
                    path: path.clone(),
                    source,
                })?;
                Slot::Reader {
                    reader: BufReader::new(file),
                }
            }
            _ => {
                let path = Path::new(name);
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .append(mode == "a")
                    .truncate(mode == "w")
                    .open(path)
                    .map_err(|source| EvalError::OpenFile {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Slot::Writer {
                    writer: BufWriter::new(file),
                }
            }
        };

        let number = match self.slots.iter().position(Option::is_none) {
            Some(free) => {
                self.slots[free] = Some(slot);
                free
            }
            None if self.slots.len() < FILE_CAPACITY => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
            None => return Err(EvalError::TooManyFiles),
        };
        Ok(number as i64)
    }

    fn slot_mut(&mut self, number: i64) -> Result<&mut Slot, EvalError> {
        usize::try_from(number)
            .ok()
            .and_then(|n| self.slots.get_mut(n))
            .and_then(Option::as_mut)
            .ok_or(EvalError::BadFileNumber(number))
    }

    pub fn close(&mut self, number: i64) -> Result<(), EvalError> {
        if number < 2 {
            // stdin/stdout stay open.
            return self.slot_mut(number).map(|_| ());
        }
        let slot = self.slot_mut(number)?;
        if let Slot::Writer { writer } = slot {
            writer.flush()?;
        }
        self.slots[number as usize] = None;
        Ok(())
    }

    /// Read one line without its terminator; `None` at end of file.
    pub fn gets(&mut self, number: i64) -> Result<Option<String>, EvalError> {
        let mut line = String::new();
        let read = match self.slot_mut(number)? {
            Slot::Stdin => io::stdin().lock().read_line(&mut line)?,
            Slot::Reader { reader } => reader.read_line(&mut line)?,
            _ => {
                return Err(EvalError::FileMode {
                    number,
                    mode: "reading",
                })
            }
        };
        if read == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    pub fn puts(&mut self, number: i64, text: &str) -> Result<(), EvalError> {
        match self.slot_mut(number)? {
            Slot::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(text.as_bytes())?;
                out.flush()?;
            }
            Slot::Writer { writer } => writer.write_all(text.as_bytes())?,
            _ => {
                return Err(EvalError::FileMode {
                    number,
                    mode: "writing",
                })
            }
        }
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<(), EvalError> {
        for slot in self.slots.iter_mut().flatten() {
            if let Slot::Writer { writer } = slot {
                writer.flush()?;
            }
        }
        Ok(())
    }
}

impl Drop for FileRegistry {
    fn drop(&mut self) {
        if let Err(err) = self.flush_all() {
            log::warn!("failed to flush RPN output files: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.txt");
        let spec = format!("{},w", path.display());

        let mut files = FileRegistry::default();
        let out = files.open(&spec).expect("open for writing");
        assert_eq!(out, 2);
        files.puts(out, "first\nsecond\n").expect("puts");
        files.close(out).expect("close");

        let input = files.open(&path.display().to_string()).expect("open for reading");
        assert_eq!(files.gets(input).expect("gets").as_deref(), Some("first"));
        assert_eq!(files.gets(input).expect("gets").as_deref(), Some("second"));
        assert_eq!(files.gets(input).expect("gets"), None);
        assert!(matches!(files.puts(input, "x"), Err(EvalError::FileMode { .. })));
        files.close(input).expect("close");
        assert!(matches!(files.gets(input), Err(EvalError::BadFileNumber(2))));
    }

    #[test]
    fn search_path_is_consulted() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("defs.rpn"), "1\n").expect("write");
        let found = find_in_search_path("defs.rpn", &[dir.path().to_path_buf()]);
        assert_eq!(found, dir.path().join("defs.rpn"));
    }
}
