//! Boundary-aligned chunking of a byte stream.
//!
//! Raw fixed-size blocks almost never end on a line terminator. The reader
//! cuts each block after its last `\n` and carries the unterminated tail into
//! the next read, so every emitted chunk holds whole records only.

use std::io::{self, ErrorKind, Read};
use std::mem;
use std::ops::Deref;

use memchr::memrchr;

/// An owned slice of the source that ends on a record boundary.
///
/// Only the final chunk of a stream may lack a trailing `\n`, when the source
/// itself does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    bytes: Vec<u8>,
}

impl Chunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

impl Deref for Chunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Lazily splits a reader into [`Chunk`]s of roughly `chunk_size` bytes.
///
/// Concatenating every yielded chunk reproduces the source exactly. A read
/// error is yielded once and ends the iteration.
pub struct ChunkReader<R> {
    source: R,
    chunk_size: usize,
    carry: Vec<u8>,
    eof: bool,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(source: R, chunk_size: usize) -> Self {
        Self {
            source,
            chunk_size: chunk_size.max(1),
            carry: Vec::new(),
            eof: false,
        }
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = io::Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.eof {
                if self.carry.is_empty() {
                    return None;
                }
                return Some(Ok(Chunk::new(mem::take(&mut self.carry))));
            }

            let mut block = mem::take(&mut self.carry);
            let start = block.len();
            block.resize(start + self.chunk_size, 0);
            let filled = match read_full(&mut self.source, &mut block[start..]) {
                Ok(n) => n,
                Err(err) => {
                    self.eof = true;
                    return Some(Err(err));
                }
            };
            block.truncate(start + filled);
            if filled < self.chunk_size {
                self.eof = true;
            }

            // The carry never holds a terminator, only the fresh bytes need scanning.
            match memrchr(b'\n', &block[start..]) {
                Some(pos) => {
                    self.carry = block.split_off(start + pos + 1);
                    return Some(Ok(Chunk::new(block)));
                }
                None => self.carry = block,
            }
        }
    }
}

/// Reads until `buf` is full or the source reports end of stream.
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunks_of(input: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
        ChunkReader::new(input, chunk_size)
            .map(|chunk| chunk.expect("in-memory read").into_inner())
            .collect()
    }

    /// Yields at most `step` bytes per read, then fails once `fail_after` bytes were served.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
        fail_after: Option<usize>,
        served: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if let Some(limit) = self.fail_after {
                if self.served >= limit {
                    return Err(io::Error::new(ErrorKind::Other, "disk on fire"));
                }
            }
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            self.served += n;
            Ok(n)
        }
    }

    #[test]
    fn test_straddling_record_is_carried() {
        let input = b"NY;10.0\nLA;5.5\nSF;1.0\n";
        let chunks = chunks_of(input, 10);
        assert_eq!(
            chunks,
            vec![b"NY;10.0\n".to_vec(), b"LA;5.5\n".to_vec(), b"SF;1.0\n".to_vec()]
        );
    }

    #[test]
    fn test_missing_trailing_newline_emits_final_record() {
        let chunks = chunks_of(b"NY;10.0\nLA;5.5", 8);
        assert_eq!(chunks, vec![b"NY;10.0\n".to_vec(), b"LA;5.5".to_vec()]);
    }

    #[test]
    fn test_record_longer_than_block() {
        let input = b"Llanfairpwllgwyngyll;12.3\nA;1.0\n";
        let chunks = chunks_of(input, 4);
        assert_eq!(chunks[0], b"Llanfairpwllgwyngyll;12.3\n".to_vec());
        assert_eq!(chunks.concat(), input.to_vec());
    }

    #[test]
    fn test_empty_source() {
        assert!(chunks_of(b"", 16).is_empty());
    }

    #[test]
    fn test_short_reads_fill_block() {
        let input = b"AA;1.0\nBB;2.0\nCC;3.0\n";
        let reader = Trickle {
            data: input,
            step: 3,
            fail_after: None,
            served: 0,
        };
        let chunks: Vec<_> = ChunkReader::new(reader, 14)
            .map(|c| c.unwrap().into_inner())
            .collect();
        assert_eq!(chunks, vec![b"AA;1.0\nBB;2.0\n".to_vec(), b"CC;3.0\n".to_vec()]);
    }

    #[test]
    fn test_read_error_is_yielded_once() {
        let reader = Trickle {
            data: b"AA;1.0\nBB;2.0\nCC;3.0\n",
            step: 7,
            fail_after: Some(7),
            served: 0,
        };
        let mut chunks = ChunkReader::new(reader, 7);
        assert_eq!(chunks.next().unwrap().unwrap().as_bytes(), b"AA;1.0\n");
        let err = chunks.next().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "disk on fire");
        assert!(chunks.next().is_none());
    }

    proptest! {
        #[test]
        fn prop_chunks_reassemble_on_line_boundaries(
            lines in proptest::collection::vec("[a-z]{0,12};-?[0-9]{1,2}\\.[0-9]", 0..64),
            trailing_newline in any::<bool>(),
            chunk_size in 1usize..64,
        ) {
            let mut input = lines.join("\n");
            if trailing_newline && !input.is_empty() {
                input.push('\n');
            }
            let chunks = chunks_of(input.as_bytes(), chunk_size);

            prop_assert_eq!(chunks.concat(), input.as_bytes().to_vec());
            if let Some((_, init)) = chunks.split_last() {
                for chunk in init {
                    prop_assert_eq!(chunk.last(), Some(&b'\n'));
                }
            }
            for chunk in &chunks {
                prop_assert!(!chunk.is_empty());
            }
        }
    }
}
