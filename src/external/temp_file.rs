// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A scoped, on-disk temp file whose `Drop` deletes it, even on error
//! paths: application-private, overwritten on creation, deleted on drop.

use crate::error::Result;
use std::fs::File;
use std::path::Path;
use tempfile::NamedTempFile;

/// Owns a private, overwritten-on-creation temp file and deletes it when
/// dropped. The external writer and sorter each hold exactly one of these.
pub struct TempTableFile {
    named: NamedTempFile,
}

impl TempTableFile {
    /// Creates a new private temp file rooted at `dir`.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let named = NamedTempFile::new_in(dir)?;
        Ok(Self { named })
    }

    /// Opens a second independent handle to the same file, for use by a
    /// reader while the writer's own handle stays open for appends.
    pub fn reopen(&self) -> Result<File> {
        Ok(self.named.reopen()?)
    }

    /// Borrows the primary file handle.
    pub fn file(&self) -> &File {
        self.named.as_file()
    }

    /// Mutably borrows the primary file handle.
    pub fn file_mut(&mut self) -> &mut File {
        self.named.as_file_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn file_is_deleted_on_drop() {
        let dir = std::env::temp_dir();
        let temp = TempTableFile::new(&dir).unwrap();
        let path = temp.named.path().to_path_buf();
        assert!(path.exists());
        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn reopen_yields_independent_handle() {
        let dir = std::env::temp_dir();
        let mut temp = TempTableFile::new(&dir).unwrap();
        use std::io::Write;
        temp.file_mut().write_all(b"hello").unwrap();
        temp.file_mut().sync_all().unwrap();

        use std::io::Read;
        let mut reopened = temp.reopen().unwrap();
        let mut buf = Vec::new();
        reopened.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }
}
