// src/lib.rs
// EMF Reader Library - Public API

//! # EMF Reader
//!
//! A Rust library for reading Energy Measurement Files (EMF) exported by the
//! LinkServer energy measurement tooling.
//!
//! ## Features
//!
//! - Validate the `$EMF` header (magic, version, base, step, source ID)
//! - Stream timestamped raw ADC records lazily, one at a time
//! - Decode min/average/max summary blocks on a configurable cadence
//! - Keep every record decoded before a truncated tail
//! - Export records to CSV
//!
//! ## Summary cadence
//!
//! Records do not flag whether a summary block follows them. By default the
//! decoder expects one after every `base`-th record (1-based) and none at all
//! when `base` is zero. [`SummaryCadence::Always`] matches captures where
//! every record carries a summary.
//!
//! ## Example
//!
//! ```no_run
//! use emf_reader::{DecoderOptions, EmfDecoder};
//!
//! let decoder = EmfDecoder::open("rawData.bin", DecoderOptions::default())
//!     .expect("Failed to open file");
//! println!("Source: {}", decoder.header().source_id);
//!
//! for record in decoder {
//!     match record {
//!         Ok(r) => println!("{} us: {}", r.timestamp, r.value),
//!         Err(e) => {
//!             eprintln!("{}", e);
//!             break;
//!         }
//!     }
//! }
//! ```

mod emf_tools;
mod field_reader;
pub mod report;

pub use emf_tools::{
    DataRecord, DecoderOptions, DecoderState, EmfDecoder, EmfError, EmfFile, EmfHeader,
    RecordFault, RecordStats, Result, SummaryBlock, SummaryCadence, EMF_MAGIC, EMF_VERSION,
    HEADER_SIZE,
};
pub use field_reader::FieldReader;
