// tests/integration.rs
// Integration tests for EMF Reader

use std::fs;
use std::io::Write;
use std::path::Path;

use emf_reader::{
    DecoderOptions, DecoderState, EmfDecoder, EmfError, EmfFile, RecordFault, SummaryBlock,
    SummaryCadence, EMF_MAGIC, EMF_VERSION,
};
use tempfile::{tempdir, NamedTempFile};

/// Helper to create a test EMF file with `num_records` samples.
///
/// Records follow a slow sawtooth; every `base`-th record gets a summary over
/// the values since the previous summary.
fn create_test_emf_file(path: &Path, base: u32, num_records: u64) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;

    file.write_all(&EMF_MAGIC.to_be_bytes())?;
    file.write_all(&EMF_VERSION.to_be_bytes())?;
    file.write_all(&base.to_be_bytes())?;
    file.write_all(&u64::from(base).to_be_bytes())?;
    file.write_all(&0x0000_0002u32.to_be_bytes())?;

    let mut window: Vec<u32> = Vec::new();
    for i in 1..=num_records {
        let timestamp = i * 250;
        let value = 1000 + (i % 50) as u32 * 20;
        file.write_all(&timestamp.to_be_bytes())?;
        file.write_all(&value.to_be_bytes())?;
        window.push(value);

        if base != 0 && i % u64::from(base) == 0 {
            let min = *window.iter().min().unwrap();
            let max = *window.iter().max().unwrap();
            let avg = window.iter().map(|&v| u64::from(v)).sum::<u64>() / window.len() as u64;
            file.write_all(&min.to_be_bytes())?;
            file.write_all(&avg.to_be_bytes())?;
            file.write_all(&max.to_be_bytes())?;
            window.clear();
        }
    }

    Ok(())
}

#[test]
fn test_load_and_process_emf() {
    let dir = tempdir().unwrap();
    let test_file = dir.path().join("capture.emf");
    create_test_emf_file(&test_file, 10, 1000).expect("Failed to create test file");

    let mut emf = EmfFile::new();
    emf.load_file(&test_file).expect("Failed to load EMF file");

    assert!(emf.is_complete(), "unexpected error: {:?}", emf.stream_error);
    assert_eq!(emf.file_header.base, 10);
    assert_eq!(emf.file_header.step, 10);
    assert_eq!(emf.file_header.source_id, 2);
    assert_eq!(emf.records.len(), 1000);

    let stats = emf.statistics().unwrap();
    assert_eq!(stats.summary_count, 100);
    assert_eq!(stats.first_timestamp, 250);
    assert_eq!(stats.last_timestamp, 250_000);
    assert_eq!(stats.min_value, 1000);
    assert_eq!(stats.max_value, 1980);

    // Records 1..=10 are 1020..=1200 in steps of 20.
    assert_eq!(
        emf.records[9].summary,
        Some(SummaryBlock { min: 1020, avg: 1110, max: 1200 })
    );
    assert!(emf.records[8].summary.is_none());
}

#[test]
fn test_streaming_matches_bulk_load() {
    let dir = tempdir().unwrap();
    let test_file = dir.path().join("stream.emf");
    create_test_emf_file(&test_file, 4, 37).unwrap();

    let mut bulk = EmfFile::new();
    bulk.load_file(&test_file).unwrap();

    let decoder = EmfDecoder::open(&test_file, DecoderOptions::default()).unwrap();
    let streamed: Vec<_> = decoder.map(|r| r.unwrap()).collect();

    assert_eq!(streamed, bulk.records);
    // Decoding the same file twice gives the same sequence.
    let mut again = EmfFile::new();
    again.load_file(&test_file).unwrap();
    assert_eq!(again.records, bulk.records);
}

#[test]
fn test_csv_export() {
    let dir = tempdir().unwrap();
    let test_file = dir.path().join("export.emf");
    let csv_file = dir.path().join("output.csv");
    create_test_emf_file(&test_file, 3, 9).unwrap();

    let mut emf = EmfFile::new();
    emf.load_file(&test_file).unwrap();
    emf.write_csv(&csv_file).expect("Failed to write CSV");

    let csv_content = fs::read_to_string(&csv_file).expect("Failed to read CSV");
    let lines: Vec<&str> = csv_content.lines().collect();
    assert_eq!(lines.len(), 10); // Header + 9 records
    assert_eq!(lines[1], "1,250,1020,,,");
    assert_eq!(lines[3], "3,750,1060,1020,1040,1060");
}

#[test]
fn test_truncated_tail_keeps_records() {
    let dir = tempdir().unwrap();
    let test_file = dir.path().join("cut.emf");
    create_test_emf_file(&test_file, 2, 6).unwrap();

    // Chop the last summary in half.
    let bytes = fs::read(&test_file).unwrap();
    fs::write(&test_file, &bytes[..bytes.len() - 8]).unwrap();

    let mut emf = EmfFile::new();
    emf.load_file(&test_file).expect("header is intact");
    assert_eq!(emf.records.len(), 5);
    assert!(matches!(
        emf.stream_error,
        Some(EmfError::CorruptRecord {
            record_index: 6,
            field: "summary.avg",
            fault: RecordFault::Truncated { got: 4, needed: 8 },
        })
    ));
}

#[test]
fn test_decoder_stops_after_failure() {
    let dir = tempdir().unwrap();
    let test_file = dir.path().join("tail.emf");
    create_test_emf_file(&test_file, 1, 1).unwrap();
    fs::OpenOptions::new()
        .append(true)
        .open(&test_file)
        .unwrap()
        .write_all(&[0xFF; 5])
        .unwrap();

    let mut decoder = EmfDecoder::open(&test_file, DecoderOptions::default()).unwrap();
    assert!(decoder.next().unwrap().is_ok());
    assert!(matches!(
        decoder.next(),
        Some(Err(EmfError::CorruptRecord { record_index: 2, .. }))
    ));
    assert_eq!(decoder.state(), DecoderState::Failed);
    assert!(decoder.next().is_none());
}

#[test]
fn test_cadence_option() {
    let dir = tempdir().unwrap();
    let test_file = dir.path().join("flat.emf");
    create_test_emf_file(&test_file, 0, 20).unwrap();

    let mut emf = EmfFile::with_options(DecoderOptions {
        cadence: SummaryCadence::Never,
        check_monotonic: true,
    });
    emf.load_file(&test_file).unwrap();
    assert!(emf.is_complete());
    assert_eq!(emf.records.len(), 20);
    assert_eq!(emf.statistics().unwrap().summary_count, 0);
}

#[test]
fn test_failed_reload_clears_previous_capture() {
    let dir = tempdir().unwrap();
    let good_file = dir.path().join("good.emf");
    let bad_file = dir.path().join("bad.emf");
    create_test_emf_file(&good_file, 1, 1).unwrap();
    fs::write(&bad_file, b"GIF89a not a capture").unwrap();

    let mut emf = EmfFile::new();
    emf.load_file(&good_file).unwrap();
    assert_eq!(emf.records.len(), 1);

    let result = emf.load_file(&bad_file);
    assert!(matches!(result, Err(EmfError::InvalidMagic { .. })));
    assert_eq!(emf.file_path, bad_file.to_string_lossy());
    assert!(emf.records.is_empty());
    assert_eq!(emf.file_header.magic, 0);
    assert!(emf.statistics().is_none());

    // A missing file clears it too.
    emf.load_file(&good_file).unwrap();
    assert!(emf.load_file(dir.path().join("missing.emf")).is_err());
    assert!(emf.records.is_empty());
}

#[test]
fn test_error_handling() {
    // Test non-existent file
    let mut emf = EmfFile::new();
    let result = emf.load_file("non_existent.emf");
    assert!(matches!(result, Err(EmfError::Io(_))));

    // Test invalid EMF file
    let mut bad_file = NamedTempFile::new().unwrap();
    bad_file.write_all(b"This is not an EMF file").unwrap();
    bad_file.flush().unwrap();

    let mut emf = EmfFile::new();
    let result = emf.load_file(bad_file.path());
    assert!(matches!(result, Err(EmfError::InvalidMagic { found: 0x5468_6973 })));
    assert!(emf.records.is_empty());

    // Test short file
    let mut short_file = NamedTempFile::new().unwrap();
    short_file.write_all(&[0x24, 0x45, 0x4D]).unwrap();
    short_file.flush().unwrap();

    let result = EmfDecoder::open(short_file.path(), DecoderOptions::default());
    assert!(matches!(
        result,
        Err(EmfError::TruncatedInput { field: "magic", .. })
    ));
}
