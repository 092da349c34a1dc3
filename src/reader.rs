//! Iterator-based readers for multi-record miniSEED data.
//!
//! Use [`MseedReader`] to iterate over concatenated records in a byte slice
//! and [`StreamReader`] for files and other [`Read`] sources. Both yield v2
//! and v3 records in any mix.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::decode;
use crate::record::{MseedRecord, ParseOptions};
use crate::{MseedError, Result};

const READ_CHUNK: usize = 8192;

/// Iterator over miniSEED records in a byte slice.
///
/// Each call to `next()` parses the next record and advances past it.
/// Iteration stops when the data is exhausted or after the first error.
/// With [`ParseOptions::skip_non_data`] set, bytes that cannot start a
/// record are skipped instead of ending iteration.
///
/// # Example
///
/// ```
/// use miniseed_trace::{MseedReader, MseedRecord, Samples, SourceId};
///
/// let mut data = Vec::new();
/// MseedRecord::new_v3()
///     .with_source_id(SourceId::parse("FDSN:XX_TEST__B_H_Z").unwrap())
///     .with_samples(Samples::Int(vec![1, 2, 3]))
///     .repack(|rec| data.extend_from_slice(rec))
///     .unwrap();
///
/// let records: Vec<_> = MseedReader::new(&data)
///     .collect::<Result<Vec<_>, _>>()
///     .unwrap();
/// assert_eq!(records.len(), 1);
/// ```
pub struct MseedReader<'a> {
    data: &'a [u8],
    offset: usize,
    last_offset: usize,
    options: ParseOptions,
    done: bool,
}

impl<'a> MseedReader<'a> {
    /// Create a new reader over the given byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_options(data, ParseOptions::default())
    }

    pub fn with_options(data: &'a [u8], options: ParseOptions) -> Self {
        Self {
            data,
            offset: 0,
            last_offset: 0,
            options,
            done: false,
        }
    }

    /// Byte offset of the record most recently returned.
    pub fn last_offset(&self) -> usize {
        self.last_offset
    }

    fn fail(&mut self, err: MseedError) -> Option<Result<MseedRecord>> {
        self.done = true;
        Some(Err(err))
    }
}

impl Iterator for MseedReader<'_> {
    type Item = Result<MseedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let data = self.data;
        while !self.done && self.offset < data.len() {
            let remaining = &data[self.offset..];
            match decode::detect(remaining) {
                Ok(Some((_, length))) => {
                    if remaining.len() < length {
                        return self.fail(MseedError::WrongLength {
                            expected: length,
                            actual: remaining.len(),
                        });
                    }
                    let parsed = MseedRecord::parse(&remaining[..length], &self.options);
                    if parsed.is_err() {
                        self.done = true;
                    }
                    self.last_offset = self.offset;
                    self.offset += length;
                    return Some(parsed);
                }
                Ok(None) => {
                    return self.fail(MseedError::WrongLength {
                        expected: remaining.len() + 1,
                        actual: remaining.len(),
                    });
                }
                Err(MseedError::NotSeedData) if self.options.skip_non_data => {
                    self.offset += 1;
                }
                Err(err) => return self.fail(err),
            }
        }
        None
    }
}

/// Iterator over miniSEED records read incrementally from a [`Read`] source.
///
/// Only the bytes of the record being parsed are buffered. A reader opened
/// with [`StreamReader::open`] owns its file and closes it when dropped.
pub struct StreamReader<R: Read> {
    inner: R,
    buf: Vec<u8>,
    offset: u64,
    last_offset: u64,
    options: ParseOptions,
    eof: bool,
    done: bool,
}

impl StreamReader<BufReader<File>> {
    /// Open a file for reading.
    pub fn open(path: impl AsRef<Path>, options: ParseOptions) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::with_options(BufReader::new(file), options))
    }
}

impl<R: Read> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_options(inner, ParseOptions::default())
    }

    pub fn with_options(inner: R, options: ParseOptions) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            offset: 0,
            last_offset: 0,
            options,
            eof: false,
            done: false,
        }
    }

    /// Byte offset of the record most recently returned.
    pub fn last_offset(&self) -> u64 {
        self.last_offset
    }

    /// Read more bytes; returns `false` at end of input.
    fn fill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let start = self.buf.len();
        self.buf.resize(start + READ_CHUNK, 0);
        let read = loop {
            match self.inner.read(&mut self.buf[start..]) {
                Ok(n) => break n,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.buf.truncate(start);
                    return Err(err.into());
                }
            }
        };
        self.buf.truncate(start + read);
        if read == 0 {
            self.eof = true;
        }
        Ok(read > 0)
    }

    fn consume(&mut self, count: usize) {
        self.buf.drain(..count);
        self.offset += count as u64;
    }

    fn read_next(&mut self) -> Result<Option<MseedRecord>> {
        loop {
            match decode::detect(&self.buf) {
                Ok(Some((_, length))) => {
                    if self.buf.len() < length {
                        if !self.fill()? {
                            return Err(MseedError::WrongLength {
                                expected: length,
                                actual: self.buf.len(),
                            });
                        }
                        continue;
                    }
                    let record = MseedRecord::parse(&self.buf[..length], &self.options)?;
                    self.last_offset = self.offset;
                    self.consume(length);
                    return Ok(Some(record));
                }
                Ok(None) => {
                    if !self.fill()? {
                        if self.buf.is_empty() {
                            return Ok(None);
                        }
                        return Err(MseedError::WrongLength {
                            expected: self.buf.len() + 1,
                            actual: self.buf.len(),
                        });
                    }
                }
                Err(MseedError::NotSeedData) if self.options.skip_non_data => {
                    self.consume(1);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<R: Read> Iterator for StreamReader<R> {
    type Item = Result<MseedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Samples;
    use crate::sid::SourceId;
    use crate::types::EncodingFormat;

    fn make_records() -> Vec<u8> {
        let mut data = Vec::new();
        for (station, channel) in [("ANMO", "BHZ"), ("ANMO", "BHN")] {
            MseedRecord::new()
                .with_source_id(SourceId::from_parts("IU", station, "00", channel).unwrap())
                .with_encoding(EncodingFormat::Steim1)
                .with_samples(Samples::Int(vec![1, 2, 3]))
                .repack(|rec| data.extend_from_slice(rec))
                .unwrap();
        }
        MseedRecord::new_v3()
            .with_source_id(SourceId::parse("FDSN:IU_ANMO_00_B_H_E").unwrap())
            .with_samples(Samples::Int(vec![4, 5]))
            .repack(|rec| data.extend_from_slice(rec))
            .unwrap();
        data
    }

    #[test]
    fn test_reader_mixed_versions() {
        let data = make_records();
        let mut reader = MseedReader::new(&data);
        let mut offsets = Vec::new();
        let mut sids = Vec::new();
        while let Some(record) = reader.next() {
            sids.push(record.unwrap().source_id.to_string());
            offsets.push(reader.last_offset());
        }
        assert_eq!(
            sids,
            [
                "FDSN:IU_ANMO_00_B_H_Z",
                "FDSN:IU_ANMO_00_B_H_N",
                "FDSN:IU_ANMO_00_B_H_E"
            ]
        );
        assert_eq!(offsets, [0, 512, 1024]);
    }

    #[test]
    fn test_reader_empty() {
        let data: &[u8] = &[];
        assert_eq!(MseedReader::new(data).count(), 0);
        assert_eq!(StreamReader::new(data).count(), 0);
    }

    #[test]
    fn test_reader_truncated_tail() {
        let data = make_records();
        let truncated = &data[..1000];
        let results: Vec<_> = MseedReader::new(truncated).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(MseedError::WrongLength { .. })));

        let results: Vec<_> = StreamReader::new(truncated).collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[1], Err(MseedError::WrongLength { .. })));
    }

    #[test]
    fn test_reader_garbage() {
        let mut data = b"garbage!".to_vec();
        data.extend(make_records());

        let first = MseedReader::new(&data).next().unwrap();
        assert!(matches!(first, Err(MseedError::NotSeedData)));

        let options = ParseOptions::default().with_skip_non_data(true);
        let records: Vec<_> = MseedReader::with_options(&data, options)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(records.len(), 3);

        let mut stream = StreamReader::with_options(data.as_slice(), options);
        let records: Vec<_> = stream.by_ref().collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(stream.last_offset(), 8 + 1024);
    }

    #[test]
    fn test_stream_reader_file() {
        let data = make_records();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.mseed");
        std::fs::write(&path, &data).unwrap();

        let options = ParseOptions::default().with_unpack_data(true);
        let records: Vec<_> = StreamReader::open(&path, options)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].samples, Some(Samples::Int(vec![4, 5])));
    }
}
