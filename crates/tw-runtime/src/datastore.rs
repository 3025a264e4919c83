use std::fs::File;
use std::io::{self, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

/// Random-access byte source handed to the host in place of a packaged asset.
pub trait DataStore: Send {
    fn read(&mut self, position: u64, buf: &mut [u8]) -> io::Result<usize>;
    fn size(&self) -> u64;
    fn close(&mut self) -> bool;
    fn good(&self) -> bool;

    fn is_asynchronous(&self) -> bool {
        false
    }
}

fn closed_store() -> io::Error {
    io::Error::new(ErrorKind::Other, "data store is closed")
}

#[derive(Debug)]
pub struct FileDataStore {
    file: Option<File>,
    size: u64,
}

impl FileDataStore {
    pub fn open(path: &Path) -> Option<Self> {
        let file = File::open(path).ok()?;
        let size = file.metadata().ok()?.len();
        Some(Self {
            file: Some(file),
            size,
        })
    }
}

impl DataStore for FileDataStore {
    fn read(&mut self, position: u64, buf: &mut [u8]) -> io::Result<usize> {
        let file = self.file.as_mut().ok_or_else(closed_store)?;
        file.seek(SeekFrom::Start(position))?;

        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(count) => filled += count,
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            }
        }
        Ok(filled)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn close(&mut self) -> bool {
        self.file.take().is_some()
    }

    fn good(&self) -> bool {
        self.file.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct StringDataStore {
    contents: Vec<u8>,
    open: bool,
}

impl StringDataStore {
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into().into_bytes(),
            open: true,
        }
    }
}

impl DataStore for StringDataStore {
    fn read(&mut self, position: u64, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open {
            return Err(closed_store());
        }
        let Ok(start) = usize::try_from(position) else {
            return Ok(0);
        };
        if start >= self.contents.len() {
            return Ok(0);
        }
        let count = buf.len().min(self.contents.len() - start);
        buf[..count].copy_from_slice(&self.contents[start..start + count]);
        Ok(count)
    }

    fn size(&self) -> u64 {
        self.contents.len() as u64
    }

    fn close(&mut self) -> bool {
        std::mem::replace(&mut self.open, false)
    }

    fn good(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn string_store_reads_from_offsets() {
        let mut store = StringDataStore::new("<unit name=\"x\"/>");
        assert_eq!(store.size(), 16);
        assert!(!store.is_asynchronous());

        let mut buf = [0u8; 4];
        assert_eq!(store.read(1, &mut buf).expect("read"), 4);
        assert_eq!(&buf, b"unit");
        assert_eq!(store.read(14, &mut buf).expect("read"), 2);
        assert_eq!(&buf[..2], b"/>");
        assert_eq!(store.read(100, &mut buf).expect("read"), 0);
    }

    #[test]
    fn string_store_refuses_reads_after_close() {
        let mut store = StringDataStore::new("abc");
        assert!(store.close());
        assert!(!store.close());
        assert!(!store.good());
        assert!(store.read(0, &mut [0u8; 2]).is_err());
    }

    #[test]
    fn file_store_opens_existing_files_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("override.xml");
        fs::write(&path, "<weapon/>").expect("write file");

        let mut store = FileDataStore::open(&path).expect("file should open");
        assert!(store.good());
        assert_eq!(store.size(), 9);
        let mut buf = vec![0u8; 32];
        let count = store.read(0, &mut buf).expect("read");
        assert_eq!(&buf[..count], b"<weapon/>");
        assert!(store.close());
        assert!(store.read(0, &mut buf).is_err());

        assert!(FileDataStore::open(&dir.path().join("missing.xml")).is_none());
    }
}
