// EMFReader Module
// Header validation and record streaming for LinkServer energy measurement files

use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::iter::FusedIterator;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, trace};

use crate::field_reader::FieldReader;
use crate::report;

/// "$EMF"
pub const EMF_MAGIC: u32 = 0x2445_4D46;
pub const EMF_VERSION: u16 = 0x0001;
pub const HEADER_SIZE: usize = 22;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordFault {
    #[error("stream ended after {got} of {needed} bytes")]
    Truncated { got: usize, needed: usize },

    #[error("read failed after {got} of {needed} bytes: {kind}")]
    ReadFailed {
        got: usize,
        needed: usize,
        kind: ErrorKind,
    },

    #[error("timestamp {found} is earlier than previous timestamp {previous}")]
    NonMonotonicTimestamp { previous: u64, found: u64 },
}

#[derive(Error, Debug)]
pub enum EmfError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Truncated input: {field} needs a {bits}-bit field, only {got} bytes available")]
    TruncatedInput {
        field: &'static str,
        bits: u32,
        got: usize,
        /// Set when the source failed instead of reaching end of stream.
        io_error: Option<ErrorKind>,
    },

    #[error("Invalid magic number: expected 0x{expected:08X}, found 0x{found:08X}", expected = EMF_MAGIC)]
    InvalidMagic { found: u32 },

    #[error("Unsupported EMF version: expected 0x{expected:04X}, found 0x{found:04X}", expected = EMF_VERSION)]
    UnsupportedVersion { found: u16 },

    #[error("Corrupt record #{record_index} at field {field}: {fault}")]
    CorruptRecord {
        record_index: u64,
        field: &'static str,
        fault: RecordFault,
    },
}

pub type Result<T> = std::result::Result<T, EmfError>;

/// Validated EMF file header.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct EmfHeader {
    pub magic: u32,
    pub version: u16,
    /// Sampling interval that governs summary cadence.
    pub base: u32,
    /// Samples per summary window.
    pub step: u64,
    /// Opaque measurement channel identifier.
    pub source_id: u32,
}

impl EmfHeader {
    /// Read and validate the five header fields, failing on the first bad one.
    fn read_from<R: Read>(reader: &mut FieldReader<R>) -> Result<Self> {
        let magic = reader.read_u32("magic")?;
        if magic != EMF_MAGIC {
            return Err(EmfError::InvalidMagic { found: magic });
        }

        let version = reader.read_u16("version")?;
        if version != EMF_VERSION {
            return Err(EmfError::UnsupportedVersion { found: version });
        }

        let base = reader.read_u32("base")?;
        let step = reader.read_u64("step")?;
        let source_id = reader.read_u32("source_id")?;

        Ok(EmfHeader {
            magic,
            version,
            base,
            step,
            source_id,
        })
    }

    /// Magic number as text, "$EMF" for valid files.
    pub fn magic_str(&self) -> String {
        String::from_utf8_lossy(&self.magic.to_be_bytes()).into_owned()
    }
}

/// Min/average/max statistics attached to some records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SummaryBlock {
    pub min: u32,
    pub avg: u64,
    pub max: u32,
}

impl SummaryBlock {
    fn read_from<R: Read>(reader: &mut FieldReader<R>) -> Result<Self> {
        let min = reader.read_u32("summary.min")?;
        let avg = reader.read_u64("summary.avg")?;
        let max = reader.read_u32("summary.max")?;
        Ok(SummaryBlock { min, avg, max })
    }
}

/// One measurement record, in file order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataRecord {
    /// 1-based position in the record stream.
    pub index: u64,
    /// Microseconds.
    pub timestamp: u64,
    /// Raw ADC reading.
    pub value: u32,
    pub summary: Option<SummaryBlock>,
}

/// Which records carry a summary block.
///
/// The file itself does not flag summary presence, so the decoder has to be
/// told. `EveryBase` attaches a summary to record `i` when `i` is a multiple of
/// the header's `base`; with `base == 0` no record has one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum SummaryCadence {
    #[default]
    EveryBase,
    Always,
    Never,
}

impl SummaryCadence {
    pub fn has_summary(self, base: u32, index: u64) -> bool {
        match self {
            SummaryCadence::EveryBase => base != 0 && index % u64::from(base) == 0,
            SummaryCadence::Always => true,
            SummaryCadence::Never => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecoderOptions {
    pub cadence: SummaryCadence,
    /// Reject records whose timestamp goes backwards.
    pub check_monotonic: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderState {
    HeaderValidated,
    Streaming,
    Done,
    Failed,
}

/// Streaming decoder over an owned byte source.
///
/// Construction validates the header; iteration then yields records until the
/// stream ends at a record boundary (`Done`) or a record is cut short
/// (`Failed`). The source is dropped as soon as either terminal state is
/// reached.
#[derive(Debug)]
pub struct EmfDecoder<R> {
    reader: Option<FieldReader<R>>,
    header: EmfHeader,
    options: DecoderOptions,
    state: DecoderState,
    next_index: u64,
    last_timestamp: Option<u64>,
}

impl EmfDecoder<BufReader<File>> {
    /// Open an EMF file and validate its header.
    pub fn open<P: AsRef<Path>>(path: P, options: DecoderOptions) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened EMF file");
        Self::new(BufReader::new(file), options)
    }
}

impl<R: Read> EmfDecoder<R> {
    pub fn new(source: R, options: DecoderOptions) -> Result<Self> {
        let mut reader = FieldReader::new(source);
        let header = EmfHeader::read_from(&mut reader)?;
        debug!(
            base = header.base,
            step = header.step,
            source_id = header.source_id,
            "EMF header validated"
        );

        Ok(EmfDecoder {
            reader: Some(reader),
            header,
            options,
            state: DecoderState::HeaderValidated,
            next_index: 1,
            last_timestamp: None,
        })
    }

    pub fn header(&self) -> &EmfHeader {
        &self.header
    }

    pub fn options(&self) -> DecoderOptions {
        self.options
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Read the next record. `Ok(None)` means the stream ended cleanly before
    /// a new record began.
    fn next_record(&mut self) -> Result<Option<DataRecord>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let index = self.next_index;

        let timestamp = match reader.read_u64("timestamp") {
            Ok(ts) => ts,
            Err(EmfError::TruncatedInput {
                got: 0,
                io_error: None,
                ..
            }) => return Ok(None),
            Err(e) => return Err(corrupt_record(index, e)),
        };
        let value = reader
            .read_u32("value")
            .map_err(|e| corrupt_record(index, e))?;

        let summary = if self.options.cadence.has_summary(self.header.base, index) {
            Some(SummaryBlock::read_from(reader).map_err(|e| corrupt_record(index, e))?)
        } else {
            None
        };

        if self.options.check_monotonic {
            if let Some(previous) = self.last_timestamp {
                if timestamp < previous {
                    return Err(EmfError::CorruptRecord {
                        record_index: index,
                        field: "timestamp",
                        fault: RecordFault::NonMonotonicTimestamp {
                            previous,
                            found: timestamp,
                        },
                    });
                }
            }
        }

        self.last_timestamp = Some(timestamp);
        self.next_index += 1;

        Ok(Some(DataRecord {
            index,
            timestamp,
            value,
            summary,
        }))
    }

    fn finish(&mut self, state: DecoderState) {
        let consumed = self.reader.as_ref().map(|r| r.position()).unwrap_or(0);
        self.state = state;
        self.reader = None;
        debug!(
            ?state,
            records = self.next_index - 1,
            bytes = consumed,
            "EMF decoding finished"
        );
    }
}

fn corrupt_record(record_index: u64, err: EmfError) -> EmfError {
    match err {
        EmfError::TruncatedInput {
            field,
            bits,
            got,
            io_error,
        } => {
            let needed = bits as usize / 8;
            let fault = match io_error {
                None => RecordFault::Truncated { got, needed },
                Some(kind) => RecordFault::ReadFailed { got, needed, kind },
            };
            EmfError::CorruptRecord {
                record_index,
                field,
                fault,
            }
        }
        other => other,
    }
}

impl<R: Read> Iterator for EmfDecoder<R> {
    type Item = Result<DataRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, DecoderState::Done | DecoderState::Failed) {
            return None;
        }
        self.state = DecoderState::Streaming;

        match self.next_record() {
            Ok(Some(record)) => {
                trace!(index = record.index, timestamp = record.timestamp, "record decoded");
                Some(Ok(record))
            }
            Ok(None) => {
                self.finish(DecoderState::Done);
                None
            }
            Err(e) => {
                self.finish(DecoderState::Failed);
                Some(Err(e))
            }
        }
    }
}

impl<R: Read> FusedIterator for EmfDecoder<R> {}

/// Aggregate figures over a decoded record set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecordStats {
    pub count: usize,
    pub first_timestamp: u64,
    pub last_timestamp: u64,
    pub min_value: u32,
    pub max_value: u32,
    pub mean_value: f64,
    pub summary_count: usize,
}

impl RecordStats {
    pub fn from_records(records: &[DataRecord]) -> Option<Self> {
        let first = records.first()?;
        let last = records.last()?;

        let mut min_value = u32::MAX;
        let mut max_value = u32::MIN;
        let mut sum = 0u128;
        for record in records {
            min_value = min_value.min(record.value);
            max_value = max_value.max(record.value);
            sum += u128::from(record.value);
        }

        Some(RecordStats {
            count: records.len(),
            first_timestamp: first.timestamp,
            last_timestamp: last.timestamp,
            min_value,
            max_value,
            mean_value: sum as f64 / records.len() as f64,
            summary_count: records.iter().filter(|r| r.summary.is_some()).count(),
        })
    }

    /// Span between first and last timestamp, in microseconds.
    pub fn duration_us(&self) -> u64 {
        self.last_timestamp.saturating_sub(self.first_timestamp)
    }
}

/// Fully drained EMF capture.
///
/// `stream_error` holds the failure that cut the record stream short, if any;
/// `records` still contains everything decoded before it.
#[derive(Default, Debug)]
pub struct EmfFile {
    pub file_path: String,
    pub options: DecoderOptions,
    pub file_header: EmfHeader,
    pub records: Vec<DataRecord>,
    pub stream_error: Option<EmfError>,
}

impl EmfFile {
    pub fn new() -> Self {
        EmfFile::default()
    }

    pub fn with_options(options: DecoderOptions) -> Self {
        EmfFile {
            options,
            ..Default::default()
        }
    }

    /// Decode every record from `source`.
    pub fn from_reader<R: Read>(source: R, options: DecoderOptions) -> Result<Self> {
        let mut emf = EmfFile::with_options(options);
        emf.load_from(EmfDecoder::new(source, options)?);
        Ok(emf)
    }

    /// Load an EMF file from the given path.
    ///
    /// Open and header failures are returned as errors. A failure inside the
    /// record stream is stored in `stream_error` instead.
    pub fn load_file<P: AsRef<Path>>(&mut self, input_file: P) -> Result<()> {
        self.file_path = input_file.as_ref().to_string_lossy().to_string();
        self.file_header = EmfHeader::default();
        self.records.clear();
        self.stream_error = None;

        let decoder = EmfDecoder::open(&input_file, self.options)?;
        self.load_from(decoder);
        Ok(())
    }

    fn load_from<R: Read>(&mut self, mut decoder: EmfDecoder<R>) {
        self.file_header = decoder.header().clone();

        for item in &mut decoder {
            match item {
                Ok(record) => self.records.push(record),
                Err(e) => {
                    self.stream_error = Some(e);
                    break;
                }
            }
        }
    }

    /// True when the record stream ended cleanly.
    pub fn is_complete(&self) -> bool {
        self.stream_error.is_none()
    }

    pub fn statistics(&self) -> Option<RecordStats> {
        RecordStats::from_records(&self.records)
    }

    /// Write the decoded records to a CSV file.
    pub fn write_csv<P: AsRef<Path>>(&self, output_file: P) -> Result<()> {
        let file = File::create(output_file)?;
        let mut writer = BufWriter::new(file);
        report::write_csv(&mut writer, &self.records)?;
        writer.flush()?;
        Ok(())
    }
}
