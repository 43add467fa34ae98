//! Splitting the input into chunks that hold only whole lines.

use std::fmt;
use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::ops::{Deref, Range};
use std::path::Path;
use std::sync::Arc;

use memchr::{memchr, memrchr};
use memmap2::Mmap;
use tracing::debug;

use crate::config::{IngestMode, PipelineConfig};
use crate::error::{PipelineError, Result};

/// An immutable run of complete lines. Only the very last chunk of an
/// input may end without a terminator.
pub struct ByteChunk {
    data: ChunkData,
}

enum ChunkData {
    Owned(Box<[u8]>),
    Mapped { map: Arc<Mmap>, range: Range<usize> },
}

impl ByteChunk {
    pub fn owned(bytes: impl Into<Box<[u8]>>) -> Self {
        Self {
            data: ChunkData::Owned(bytes.into()),
        }
    }

    fn mapped(map: Arc<Mmap>, range: Range<usize>) -> Self {
        Self {
            data: ChunkData::Mapped { map, range },
        }
    }
}

impl Deref for ByteChunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.data {
            ChunkData::Owned(bytes) => &bytes[..],
            ChunkData::Mapped { map, range } => &map[range.clone()],
        }
    }
}

impl fmt::Debug for ByteChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.data {
            ChunkData::Owned(_) => "owned",
            ChunkData::Mapped { .. } => "mapped",
        };
        f.debug_struct("ByteChunk")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

/// Reads `reader` sequentially in `block_size` blocks and yields whole-line
/// chunks. The bytes after the last terminator of a block are carried over
/// and prefixed onto the next chunk.
pub struct ChunkSplitter<R> {
    reader: R,
    scratch: Vec<u8>,
    leftover: Vec<u8>,
    offset: u64,
    finished: bool,
}

impl<R: Read> ChunkSplitter<R> {
    pub fn new(reader: R, block_size: usize) -> Self {
        Self {
            reader,
            scratch: vec![0; block_size],
            leftover: Vec::new(),
            offset: 0,
            finished: false,
        }
    }

    fn read_block(&mut self) -> Result<usize> {
        loop {
            match self.reader.read(&mut self.scratch) {
                Ok(n) => {
                    self.offset += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(PipelineError::Read {
                        offset: self.offset,
                        source,
                    })
                }
            }
        }
    }

    fn next_chunk(&mut self) -> Result<Option<ByteChunk>> {
        loop {
            let read = self.read_block()?;
            if read == 0 {
                self.finished = true;
                if self.leftover.is_empty() {
                    return Ok(None);
                }
                let tail = std::mem::take(&mut self.leftover);
                return Ok(Some(ByteChunk::owned(tail)));
            }

            let block = &self.scratch[..read];
            match memrchr(b'\n', block) {
                Some(last) => {
                    // The carry-over buffer becomes the chunk; the scratch
                    // block is copied out so it can be reused by the next read.
                    let mut data = std::mem::take(&mut self.leftover);
                    data.extend_from_slice(&block[..=last]);
                    self.leftover.extend_from_slice(&block[last + 1..]);
                    return Ok(Some(ByteChunk::owned(data)));
                }
                // A line longer than the block: keep accumulating.
                None => self.leftover.extend_from_slice(block),
            }
        }
    }
}

impl<R: Read> Iterator for ChunkSplitter<R> {
    type Item = Result<ByteChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_chunk() {
            Ok(chunk) => chunk.map(Ok),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Hands out line-aligned ranges of a memory map, each roughly
/// `block_size` bytes and never splitting a line.
pub struct MappedSplitter {
    map: Option<Arc<Mmap>>,
    pos: usize,
    block_size: usize,
}

impl MappedSplitter {
    fn new(map: Option<Mmap>, block_size: usize) -> Self {
        Self {
            map: map.map(Arc::new),
            pos: 0,
            block_size,
        }
    }
}

impl Iterator for MappedSplitter {
    type Item = Result<ByteChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        let map = self.map.as_ref()?;
        let len = map.len();
        if self.pos >= len {
            return None;
        }
        let start = self.pos;
        let limit = start.saturating_add(self.block_size).min(len);
        let end = if limit == len {
            len
        } else {
            match memrchr(b'\n', &map[start..limit]) {
                Some(i) => start + i + 1,
                None => match memchr(b'\n', &map[limit..]) {
                    Some(i) => limit + i + 1,
                    None => len,
                },
            }
        };
        self.pos = end;
        Some(Ok(ByteChunk::mapped(Arc::clone(map), start..end)))
    }
}

/// The chunk producer selected by [`IngestMode`].
pub enum ChunkSource {
    Buffered(ChunkSplitter<File>),
    Mapped(MappedSplitter),
}

impl ChunkSource {
    /// Opens `path`. Failing to open (or map) the file is reported here,
    /// before any pipeline thread is started.
    pub fn open(path: &Path, config: &PipelineConfig) -> Result<Self> {
        let file = File::open(path).map_err(|source| PipelineError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        match config.ingest {
            IngestMode::Buffered => Ok(ChunkSource::Buffered(ChunkSplitter::new(
                file,
                config.block_size,
            ))),
            IngestMode::Mapped => {
                let map = map_file(&file).map_err(|source| PipelineError::Map {
                    path: path.to_path_buf(),
                    source,
                })?;
                debug!(
                    path = %path.display(),
                    len = map.as_ref().map_or(0, |m| m.len()),
                    "mapped input"
                );
                Ok(ChunkSource::Mapped(MappedSplitter::new(
                    map,
                    config.block_size,
                )))
            }
        }
    }
}

fn map_file(file: &File) -> io::Result<Option<Mmap>> {
    // Zero-length maps are rejected by some platforms.
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    // SAFETY: the input is treated as read-only for the whole run; a
    // concurrent writer truncating the file is outside what we support.
    let map = unsafe { Mmap::map(file)? };
    Ok(Some(map))
}

impl Iterator for ChunkSource {
    type Item = Result<ByteChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            ChunkSource::Buffered(splitter) => splitter.next(),
            ChunkSource::Mapped(splitter) => splitter.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn split(input: &[u8], block_size: usize) -> Vec<Vec<u8>> {
        ChunkSplitter::new(Cursor::new(input.to_vec()), block_size)
            .map(|c| c.unwrap().to_vec())
            .collect()
    }

    /// Hands out at most `step` bytes per read, interrupting every other call.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
        interrupt: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::from(ErrorKind::Interrupted));
            }
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::Other, "disk on fire"))
        }
    }

    #[test]
    fn chunks_end_on_terminators() {
        let input = b"a;1.0\nbb;2.0\nccc;3.0\n";
        let chunks = split(input, 8);
        for chunk in &chunks {
            assert_eq!(chunk.last(), Some(&b'\n'));
        }
        assert_eq!(chunks.concat(), input);
    }

    #[test]
    fn block_smaller_than_a_line_accumulates() {
        let input = b"longstationname;12.3\nx;1.0\n";
        let chunks = split(input, 3);
        assert_eq!(chunks.concat(), input);
        assert!(chunks.iter().all(|c| c.last() == Some(&b'\n')));
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[test]
    fn block_larger_than_file_gives_one_chunk() {
        let input = b"a;1.0\nb;2.0\n";
        assert_eq!(split(input, 1 << 20), vec![input.to_vec()]);
    }

    #[test]
    fn unterminated_tail_is_emitted_last() {
        let chunks = split(b"a;1.0\nx;5.5", 6);
        assert_eq!(chunks, vec![b"a;1.0\n".to_vec(), b"x;5.5".to_vec()]);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(split(b"", 16).is_empty());
    }

    #[test]
    fn short_and_interrupted_reads_are_handled() {
        let input = b"alpha;1.0\nbeta;-2.5\ngamma;30.1\n".to_vec();
        let reader = Trickle {
            data: input.clone(),
            pos: 0,
            step: 4,
            interrupt: false,
        };
        let chunks: Vec<Vec<u8>> = ChunkSplitter::new(reader, 64)
            .map(|c| c.unwrap().to_vec())
            .collect();
        assert_eq!(chunks.concat(), input);
    }

    #[test]
    fn read_error_is_fatal_and_final() {
        let mut splitter = ChunkSplitter::new(Broken, 16);
        assert!(matches!(
            splitter.next(),
            Some(Err(PipelineError::Read { offset: 0, .. }))
        ));
        assert!(splitter.next().is_none());
    }

    #[test]
    fn owned_chunk_derefs_to_its_bytes() {
        let chunk = ByteChunk::owned(b"k;1.0\n".to_vec());
        assert_eq!(&*chunk, b"k;1.0\n");
        assert_eq!(format!("{chunk:?}"), "ByteChunk { kind: \"owned\", len: 6 }");
    }
}
