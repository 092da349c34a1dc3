//! Record reference lists: byte ranges of records whose samples are decoded
//! later, on request.
//!
//! A [`RecordPtr`] names one record inside a shared buffer or a file. A
//! [`RecordList`] is the ordered list of pointers backing one trace segment.

use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::record::{MseedRecord, ParseOptions, Samples};
use crate::time::NsTime;
use crate::{MseedError, Result};

/// Where a referenced record's bytes live.
#[derive(Debug, Clone)]
pub enum RecordSource {
    /// A shared in-memory buffer.
    Buffer(Arc<[u8]>),
    /// A file, reopened when the list is unpacked.
    File(Arc<PathBuf>),
}

impl RecordSource {
    fn path(&self) -> Option<&Path> {
        match self {
            RecordSource::File(path) => Some(path.as_path()),
            RecordSource::Buffer(_) => None,
        }
    }
}

/// Location and time coverage of one record.
#[derive(Debug, Clone)]
pub struct RecordPtr {
    pub source: RecordSource,
    /// Byte offset of the record within its source.
    pub offset: u64,
    /// Record length in bytes.
    pub length: usize,
    pub start_time: NsTime,
    pub end_time: NsTime,
}

impl RecordPtr {
    /// Point at `record`, found at `offset` within `source`.
    pub fn new(source: RecordSource, offset: u64, record: &MseedRecord) -> Self {
        Self {
            source,
            offset,
            length: record.record_length,
            start_time: record.start_time,
            end_time: record.endtime(),
        }
    }

    /// Read the record's bytes, borrowing from a buffer source.
    pub fn read_bytes(&self) -> Result<Cow<'_, [u8]>> {
        match &self.source {
            RecordSource::Buffer(buffer) => {
                let start = self.offset as usize;
                let end = start + self.length;
                if end > buffer.len() {
                    return Err(MseedError::WrongLength {
                        expected: end,
                        actual: buffer.len(),
                    });
                }
                Ok(Cow::Borrowed(&buffer[start..end]))
            }
            RecordSource::File(path) => {
                let mut file = File::open(path.as_path())?;
                Ok(Cow::Owned(self.read_from(&mut file)?))
            }
        }
    }

    fn read_from(&self, file: &mut File) -> Result<Vec<u8>> {
        file.seek(SeekFrom::Start(self.offset))?;
        let mut bytes = vec![0u8; self.length];
        file.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    /// Re-parse the referenced record.
    pub fn parse(&self, options: &ParseOptions) -> Result<MseedRecord> {
        MseedRecord::parse(&self.read_bytes()?, options)
    }
}

/// Ordered record references backing one trace segment.
#[derive(Debug, Clone, Default)]
pub struct RecordList {
    ptrs: Vec<RecordPtr>,
    validate_crc: bool,
}

impl RecordList {
    pub fn new(validate_crc: bool) -> Self {
        Self {
            ptrs: Vec::new(),
            validate_crc,
        }
    }

    pub fn push(&mut self, ptr: RecordPtr) {
        self.ptrs.push(ptr);
    }

    pub fn push_front(&mut self, ptr: RecordPtr) {
        self.ptrs.insert(0, ptr);
    }

    /// Move every entry of `other` to the end of this list.
    pub fn append(&mut self, other: &mut RecordList) {
        self.ptrs.append(&mut other.ptrs);
    }

    /// Move every entry of `other` to the front of this list.
    pub fn prepend(&mut self, other: &mut RecordList) {
        let tail = std::mem::take(&mut self.ptrs);
        self.ptrs.append(&mut other.ptrs);
        self.ptrs.extend(tail);
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordPtr> {
        self.ptrs.iter()
    }

    pub fn len(&self) -> usize {
        self.ptrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ptrs.is_empty()
    }

    pub fn first(&self) -> Option<&RecordPtr> {
        self.ptrs.first()
    }

    /// Decode every referenced record, appending samples to `dest`.
    ///
    /// An empty `dest` takes the sample type of the first record. Each file
    /// source is opened once per call. Returns the number of samples added.
    pub fn unpack_into(&self, dest: &mut Samples) -> Result<usize> {
        let options = ParseOptions::default()
            .with_unpack_data(true)
            .with_validate_crc(self.validate_crc);
        let mut open: Option<(&Path, File)> = None;
        let mut added = 0;

        for ptr in &self.ptrs {
            let bytes = match ptr.source.path() {
                None => ptr.read_bytes()?,
                Some(path) => {
                    let reuse = matches!(&open, Some((current, _)) if *current == path);
                    if !reuse {
                        open = Some((path, File::open(path)?));
                    }
                    match open.as_mut() {
                        Some((_, file)) => Cow::Owned(ptr.read_from(file)?),
                        None => ptr.read_bytes()?,
                    }
                }
            };
            let record = MseedRecord::parse(&bytes, &options)?;
            let Some(samples) = record.samples else {
                continue;
            };
            if dest.is_empty() && dest.sample_type() != samples.sample_type() {
                *dest = Samples::empty(samples.sample_type());
            }
            if dest.sample_type() != samples.sample_type() {
                return Err(MseedError::InvalidState(format!(
                    "record at offset {} holds {} samples, expected {}",
                    ptr.offset,
                    samples.sample_type(),
                    dest.sample_type()
                )));
            }
            added += samples.len();
            dest.extend_from(samples.as_slice())?;
        }

        Ok(added)
    }
}
