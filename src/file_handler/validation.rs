//! Opening paths for reading.
//!
//! Directories, sockets and other special files can sometimes be opened but
//! never hold readable content, so they are rejected up front.

use std::fs::File;
use std::io::{Error, ErrorKind};
use std::path::Path;

/// Open `path` for reading and make sure it is a regular file.
///
/// # Error Cases
/// - Path does not exist or is not readable
/// - Path points to a directory or other non-regular file
pub fn open_regular_file(path: &Path) -> std::io::Result<File> {
    let file = File::open(path)?;
    let metadata = file.metadata()?;

    if !metadata.is_file() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            format!("not a regular file: {}", path.display()),
        ));
    }

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_opens_regular_file() {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(b"content").expect("Failed to write test content");

        let opened = open_regular_file(file.path()).unwrap();
        assert_eq!(opened.metadata().unwrap().len(), 7);
    }

    #[test]
    fn test_empty_file_is_accepted() {
        let file = NamedTempFile::new().expect("Failed to create temp file");
        assert!(open_regular_file(file.path()).is_ok());
    }

    #[test]
    fn test_missing_file() {
        let err = open_regular_file(Path::new("/this/file/does/not/exist.gz")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_directory_is_rejected() {
        let dir = TempDir::new().expect("Failed to create temp directory");
        assert!(open_regular_file(dir.path()).is_err());
    }
}
