//! Append-only archive file shared across workers.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::error::TournamentError;

/// Serialized writer for the tournament archive. Each `append` writes one
/// complete record under the lock so records from concurrent games never
/// interleave.
pub struct FileWriter {
    inner: Mutex<BufWriter<File>>,
}

impl FileWriter {
    pub fn create(path: &Path) -> Result<Self, TournamentError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(TournamentError::ArchiveWrite)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(TournamentError::ArchiveWrite)?;
        Ok(FileWriter {
            inner: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn append(&self, record: &str) -> Result<(), TournamentError> {
        let mut writer = self.inner.lock().unwrap();
        writer
            .write_all(record.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(TournamentError::ArchiveWrite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn appends_are_not_interleaved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.pgn");
        let writer = Arc::new(FileWriter::create(&path).unwrap());

        let mut handles = Vec::new();
        for i in 0..8 {
            let writer = Arc::clone(&writer);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    writer.append(&format!("record-{i} body-{i}\n")).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 400);
        for line in lines {
            let mut parts = line.split_whitespace();
            let a = parts.next().unwrap().strip_prefix("record-").unwrap();
            let b = parts.next().unwrap().strip_prefix("body-").unwrap();
            assert_eq!(a, b);
        }
    }
}
