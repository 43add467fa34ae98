//! Line parsing and per-chunk partial aggregation.

use memchr::{memchr, memchr2_iter};

use crate::aggregate::{observe, PartialTable};
use crate::error::{LineFault, PipelineError, Result};

const FIELD_DELIMITER: u8 = b';';
const LINE_TERMINATOR: u8 = b'\n';

/// Parses every `key;value` line of `chunk` into a fresh table.
///
/// The chunk is scanned once. A delimiter closes the key field, a
/// terminator closes the value field and records the observation. A final
/// line without a terminator is still recorded. Blank lines are skipped;
/// any other malformed line aborts the whole chunk.
pub fn parse_chunk(chunk: &[u8]) -> Result<PartialTable> {
    let mut table = PartialTable::default();
    let mut line_start = 0;
    let mut field_start = 0;
    let mut key: Option<&[u8]> = None;

    for pos in memchr2_iter(FIELD_DELIMITER, LINE_TERMINATOR, chunk) {
        if chunk[pos] == FIELD_DELIMITER {
            if key.is_some() {
                let line_end =
                    memchr(LINE_TERMINATOR, &chunk[pos..]).map_or(chunk.len(), |i| pos + i);
                return Err(PipelineError::malformed(
                    LineFault::ExtraDelimiter,
                    &chunk[line_start..line_end],
                ));
            }
            key = Some(&chunk[field_start..pos]);
        } else {
            record(
                &mut table,
                key.take(),
                &chunk[field_start..pos],
                &chunk[line_start..pos],
            )?;
            line_start = pos + 1;
        }
        field_start = pos + 1;
    }

    if line_start < chunk.len() {
        record(&mut table, key, &chunk[field_start..], &chunk[line_start..])?;
    }
    Ok(table)
}

fn record(
    table: &mut PartialTable,
    key: Option<&[u8]>,
    value: &[u8],
    line: &[u8],
) -> Result<()> {
    let key = match key {
        Some(key) => key,
        None if line.is_empty() || line == b"\r" => return Ok(()),
        None => return Err(PipelineError::malformed(LineFault::MissingDelimiter, line)),
    };
    let value = value.strip_suffix(b"\r").unwrap_or(value);
    let value = parse_value(value)
        .ok_or_else(|| PipelineError::malformed(LineFault::InvalidNumber, line))?;

    if !table.contains_key(key) && std::str::from_utf8(key).is_err() {
        return Err(PipelineError::malformed(LineFault::InvalidUtf8Key, line));
    }
    observe(table, key, value);
    Ok(())
}

/// Parses a decimal value field. Empty, non-numeric and non-finite
/// values are rejected.
pub fn parse_value(field: &[u8]) -> Option<f64> {
    lexical_core::parse::<f64>(field).ok().filter(|v| v.is_finite())
}
