//! Resource data dump files.
//!
//! Bytes are staged in a fixed 256-byte block and written out when the block
//! fills, after the resource header and when the card is finished. A failed
//! create or write only loses the file; decoding carries on.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

/// Size of the staging block flushed to a dump file.
pub const DUMP_BLOCK_LEN: usize = 256;

/// Where dump files are created.
pub trait DumpSink {
    type File: Write;

    fn create(&mut self, name: &str) -> io::Result<Self::File>;
}

impl<S: DumpSink + ?Sized> DumpSink for &mut S {
    type File = S::File;

    fn create(&mut self, name: &str) -> io::Result<Self::File> {
        (**self).create(name)
    }
}

/// Writes dumps as files inside one directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DumpSink for DirectorySink {
    type File = File;

    fn create(&mut self, name: &str) -> io::Result<File> {
        File::create(self.dir.join(name))
    }
}

/// Keeps dumps in memory; clones share the same file table.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

/// Handle to one in-memory dump.
#[derive(Debug)]
pub struct MemoryFile {
    name: String,
    files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(self.name.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DumpSink for MemorySink {
    type File = MemoryFile;

    fn create(&mut self, name: &str) -> io::Result<MemoryFile> {
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        files.insert(name.to_string(), Vec::new());
        Ok(MemoryFile {
            name: name.to_string(),
            files: Arc::clone(&self.files),
        })
    }
}

/// Staging buffer in front of an optional dump file.
#[derive(Debug)]
pub struct DumpWriter<W: Write> {
    name: String,
    file: Option<W>,
    block: [u8; DUMP_BLOCK_LEN],
    len: usize,
    total: usize,
    failed: bool,
}

impl<W: Write> DumpWriter<W> {
    /// Create the dump through `sink`. On failure the writer still counts
    /// bytes but persists nothing.
    pub fn create<S>(sink: &mut S, name: &str) -> Self
    where
        S: DumpSink<File = W> + ?Sized,
    {
        let file = match sink.create(name) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("File creation failed for {name}: {e}");
                None
            }
        };
        let failed = file.is_none();
        Self {
            name: name.to_string(),
            file,
            block: [0; DUMP_BLOCK_LEN],
            len: 0,
            total: 0,
            failed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&mut self, byte: u8) {
        if let Some(slot) = self.block.get_mut(self.len) {
            *slot = byte;
            self.len += 1;
            self.total += 1;
        }
        if self.len == DUMP_BLOCK_LEN {
            self.flush();
        }
    }

    /// Bytes pushed so far, persisted or not.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn flush(&mut self) {
        let pending = self.block.get(..self.len).unwrap_or_default();
        if let Some(file) = self.file.as_mut()
            && !pending.is_empty()
            && let Err(e) = file.write_all(pending)
        {
            warn!("File write failed for {}: {e}", self.name);
            self.file = None;
            self.failed = true;
        }
        self.len = 0;
    }

    /// Flush what is left and close the file. Returns the file name when
    /// every byte reached it.
    pub fn finish(mut self) -> Option<String> {
        self.flush();
        if let Some(mut file) = self.file.take()
            && let Err(e) = file.flush()
        {
            warn!("File write failed for {}: {e}", self.name);
            self.failed = true;
        }
        if self.failed {
            None
        } else {
            debug!("{} ({} bytes) written", self.name, self.total);
            Some(self.name)
        }
    }
}
