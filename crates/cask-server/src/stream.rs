use std::io::{self, Read, Write};

use bytes::Bytes;

pub use crate::config::DEFAULT_CHUNK_SIZE;

/// Chunked iterator over an inclusive byte span of a reader.
///
/// Skips `start` bytes, then yields chunks of at most `chunk_size` bytes
/// until `end` (inclusive) is reached or the source is exhausted, whichever
/// comes first. Never reads past `end`. A short read simply produces a
/// shorter chunk; the span still completes over subsequent calls.
///
/// An I/O error ends the iteration after being yielded once: the transfer is
/// aborted with whatever was already written, and no resume is attempted.
pub struct SpanChunks<R> {
    reader: R,
    pending_skip: u64,
    remaining: u64,
    chunk_size: usize,
    failed: bool,
}

impl<R: Read> SpanChunks<R> {
    /// Span over `[start, end_inclusive]`. An inverted span is empty.
    pub fn new(reader: R, start: u64, end_inclusive: u64, chunk_size: usize) -> Self {
        Self {
            reader,
            pending_skip: start,
            remaining: end_inclusive.saturating_add(1).saturating_sub(start),
            chunk_size: chunk_size.max(1),
            failed: false,
        }
    }

    fn skip_to_start(&mut self) -> io::Result<()> {
        if self.pending_skip > 0 {
            let skipped = io::copy(
                &mut (&mut self.reader).take(self.pending_skip),
                &mut io::sink(),
            )?;
            // A source shorter than `start` just yields an empty span.
            if skipped < self.pending_skip {
                self.remaining = 0;
            }
            self.pending_skip = 0;
        }
        Ok(())
    }
}

impl<R: Read> Iterator for SpanChunks<R> {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        if let Err(e) = self.skip_to_start() {
            self.failed = true;
            return Some(Err(e));
        }
        if self.remaining == 0 {
            return None;
        }
        let want = self.remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; want];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => {
                    self.remaining = 0;
                    return None;
                }
                Ok(n) => {
                    buf.truncate(n);
                    self.remaining -= n as u64;
                    return Some(Ok(Bytes::from(buf)));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Copy the inclusive span `[start, end_inclusive]` from `reader` to
/// `writer` in chunks, returning the number of bytes written.
pub fn copy_span<R: Read, W: Write>(
    reader: R,
    start: u64,
    end_inclusive: u64,
    writer: &mut W,
    chunk_size: usize,
) -> io::Result<u64> {
    let mut written = 0u64;
    for chunk in SpanChunks::new(reader, start, end_inclusive, chunk_size) {
        let chunk = chunk?;
        writer.write_all(&chunk)?;
        written += chunk.len() as u64;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that yields at most `per_read` bytes per call, to exercise the
    /// short-read path.
    struct Dribble<R> {
        inner: R,
        per_read: usize,
    }

    impl<R: Read> Read for Dribble<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let cap = self.per_read.min(buf.len());
            self.inner.read(&mut buf[..cap])
        }
    }

    /// Reader that fails after a fixed number of bytes.
    struct FailAfter {
        served: usize,
        limit: usize,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served >= self.limit {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "source died"));
            }
            let n = buf.len().min(self.limit - self.served);
            buf[..n].fill(b'x');
            self.served += n;
            Ok(n)
        }
    }

    fn collect(reader: impl Read, start: u64, end: u64, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        copy_span(reader, start, end, &mut out, chunk).unwrap();
        out
    }

    #[test]
    fn full_span() {
        let data = b"0123456789";
        assert_eq!(collect(Cursor::new(data), 0, 9, 4), data);
    }

    #[test]
    fn middle_span_is_inclusive() {
        assert_eq!(collect(Cursor::new(b"0123456789"), 2, 5, 100), b"2345");
    }

    #[test]
    fn single_byte_span() {
        assert_eq!(collect(Cursor::new(b"0123456789"), 7, 7, 100), b"7");
    }

    #[test]
    fn never_reads_past_end() {
        let mut cursor = Cursor::new(b"0123456789".to_vec());
        let mut out = Vec::new();
        copy_span(&mut cursor, 2, 5, &mut out, 3).unwrap();
        assert_eq!(out, b"2345");
        // Position sits exactly one past the span's last byte.
        assert_eq!(cursor.position(), 6);
    }

    #[test]
    fn chunks_respect_chunk_size() {
        let data = vec![7u8; 2500];
        let chunks: Vec<_> = SpanChunks::new(Cursor::new(data), 0, 2499, DEFAULT_CHUNK_SIZE)
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[1].len(), 1000);
        assert_eq!(chunks[2].len(), 500);
    }

    #[test]
    fn tolerates_short_reads() {
        let reader = Dribble {
            inner: Cursor::new(b"0123456789".to_vec()),
            per_read: 3,
        };
        assert_eq!(collect(reader, 1, 8, 100), b"12345678");
    }

    #[test]
    fn source_exhausted_before_end_stops_cleanly() {
        assert_eq!(collect(Cursor::new(b"0123"), 0, 9, 100), b"0123");
    }

    #[test]
    fn start_past_source_yields_nothing() {
        assert_eq!(collect(Cursor::new(b"0123"), 10, 20, 100), b"");
    }

    #[test]
    fn inverted_span_is_empty() {
        assert_eq!(collect(Cursor::new(b"0123456789"), 5, 2, 100), b"");
    }

    #[test]
    fn error_mid_stream_aborts() {
        let reader = FailAfter { served: 0, limit: 5 };
        let mut out = Vec::new();
        let err = copy_span(reader, 0, 99, &mut out, 2).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        // The partial prefix was already delivered.
        assert_eq!(out, b"xxxxx");
    }

    #[test]
    fn iterator_ends_after_error() {
        let reader = FailAfter { served: 0, limit: 0 };
        let mut chunks = SpanChunks::new(reader, 0, 9, 4);
        assert!(chunks.next().unwrap().is_err());
        assert!(chunks.next().is_none());
    }

    #[test]
    fn error_during_skip_surfaces() {
        let reader = FailAfter { served: 0, limit: 3 };
        let mut chunks = SpanChunks::new(reader, 5, 9, 4);
        assert!(chunks.next().unwrap().is_err());
    }

    #[test]
    fn zero_chunk_size_is_clamped() {
        assert_eq!(collect(Cursor::new(b"0123"), 0, 3, 0), b"0123");
    }
}
