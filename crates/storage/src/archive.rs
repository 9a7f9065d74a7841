//! In-memory zip archives of submission results.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A finished zip archive ready to be sent to a client.
#[derive(Debug, Clone)]
pub struct ResultArchive {
    /// Suggested download name, `<submission_id>.zip`.
    pub file_name: String,
    /// Raw zip bytes.
    pub bytes: Vec<u8>,
}

impl ResultArchive {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Incrementally builds a deflate-compressed zip in memory.
///
/// Every entry is placed under a `<submission_id>/` prefix, mirroring the
/// layout of a recursive download of the remote submission directory.
pub struct ArchiveBuilder {
    submission_id: String,
    writer: ZipWriter<Cursor<Vec<u8>>>,
    entries: usize,
}

impl ArchiveBuilder {
    pub fn new(submission_id: &str) -> Self {
        Self {
            submission_id: submission_id.to_string(),
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            entries: 0,
        }
    }

    /// Add a file at `relative_path` (forward-slash separated, relative to
    /// the submission directory).
    pub fn add_file(&mut self, relative_path: &str, data: &[u8]) -> Result<(), zip::result::ZipError> {
        let entry = format!(
            "{}/{}",
            self.submission_id,
            relative_path.trim_start_matches('/')
        );
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.writer.start_file(entry, options)?;
        self.writer.write_all(data)?;
        self.entries += 1;
        Ok(())
    }

    /// Number of files added so far.
    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn finish(self) -> Result<ResultArchive, zip::result::ZipError> {
        let cursor = self.writer.finish()?;
        Ok(ResultArchive {
            file_name: format!("{}.zip", self.submission_id),
            bytes: cursor.into_inner(),
        })
    }
}
