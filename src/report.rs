// EMF Report Module
// Human-readable and CSV rendering of decode results

use std::io::{self, Write};

use crate::emf_tools::{DataRecord, EmfError, EmfHeader, RecordStats};

/// Header block for the `info` view.
pub fn write_header_info<W: Write>(out: &mut W, header: &EmfHeader) -> io::Result<()> {
    writeln!(out, "Header:")?;
    writeln!(out, "  Magic: 0x{:08X} ({})", header.magic, header.magic_str())?;
    writeln!(out, "  Version: 0x{:04X}", header.version)?;
    writeln!(out, "  Base: {}", header.base)?;
    writeln!(out, "  Step: {}", header.step)?;
    writeln!(out, "  Source ID: 0x{:08X}", header.source_id)?;
    Ok(())
}

pub fn write_statistics<W: Write>(out: &mut W, stats: Option<&RecordStats>) -> io::Result<()> {
    writeln!(out, "Records:")?;
    let Some(stats) = stats else {
        writeln!(out, "  Count: 0")?;
        return Ok(());
    };

    writeln!(out, "  Count: {}", stats.count)?;
    writeln!(out, "  With summary: {}", stats.summary_count)?;
    writeln!(
        out,
        "  Timestamps: {} us to {} us ({} us span)",
        stats.first_timestamp,
        stats.last_timestamp,
        stats.duration_us()
    )?;
    writeln!(
        out,
        "  Raw value: min={}, max={}, mean={:.3}",
        stats.min_value, stats.max_value, stats.mean_value
    )?;
    Ok(())
}

pub fn write_record_line<W: Write>(out: &mut W, record: &DataRecord) -> io::Result<()> {
    write!(
        out,
        "#{} t={}us value={}",
        record.index, record.timestamp, record.value
    )?;
    if let Some(summary) = &record.summary {
        write!(
            out,
            " summary[min={}, avg={}, max={}]",
            summary.min, summary.avg, summary.max
        )?;
    }
    writeln!(out)
}

/// Diagnostic line for a failure that stopped decoding.
pub fn write_failure<W: Write>(out: &mut W, decoded: usize, err: &EmfError) -> io::Result<()> {
    writeln!(out, "Decoding stopped after {} record(s): {}", decoded, err)
}

/// CSV with one row per record. Summary cells are empty when absent.
pub fn write_csv<W: Write>(out: &mut W, records: &[DataRecord]) -> io::Result<()> {
    writeln!(out, "index,timestamp_us,value,summary_min,summary_avg,summary_max")?;

    for record in records {
        write!(out, "{},{},{}", record.index, record.timestamp, record.value)?;
        match &record.summary {
            Some(s) => writeln!(out, ",{},{},{}", s.min, s.avg, s.max)?,
            None => writeln!(out, ",,,")?,
        }
    }
    Ok(())
}
