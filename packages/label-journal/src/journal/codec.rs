//! Record codec for the journal's delimited text format.
//!
//! Minimal quoting: a field is wrapped in `"` only when it contains the
//! delimiter, a quote, `\r` or `\n`. Inside a quoted field, quotes are
//! doubled. Records end at an unquoted `\n` (a preceding `\r` is dropped),
//! so a quoted field may span several physical lines.

use std::io::{self, Write};

use crate::error::{JournalError, Result};

pub const DELIMITER: u8 = b'\t';
pub const QUOTE: u8 = b'"';

fn needs_quoting(field: &str) -> bool {
    field
        .bytes()
        .any(|b| b == DELIMITER || b == QUOTE || b == b'\r' || b == b'\n')
}

fn push_field(out: &mut String, field: &str) {
    if !needs_quoting(field) {
        out.push_str(field);
        return;
    }
    out.push('"');
    for c in field.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
}

/// Encode one record as a single line, without the terminator.
pub fn encode_record(example_id: &str, field: &str) -> String {
    let mut out = String::with_capacity(example_id.len() + field.len() + 1);
    push_field(&mut out, example_id);
    out.push(DELIMITER as char);
    push_field(&mut out, field);
    out
}

/// Append one newline-terminated record in a single write.
pub fn write_record<W: Write>(writer: &mut W, example_id: &str, field: &str) -> io::Result<()> {
    let mut line = encode_record(example_id, field);
    line.push('\n');
    writer.write_all(line.as_bytes())
}

/// Decode a single line into `(example_id, field)`.
///
/// A trailing `\n` or `\r\n` is accepted. Anything that is not exactly one
/// two-field record fails with `MalformedRecord`.
pub fn decode_record(line: &str) -> Result<(String, String)> {
    let mut reader = RecordReader::new(line);
    let record = reader
        .next()
        .ok_or_else(|| JournalError::malformed(1, "empty line"))?;
    if let Some(extra) = reader.next() {
        return Err(JournalError::malformed(extra.line, "trailing data after record"));
    }
    record.outcome
}

/// One logical record scanned from a journal buffer.
#[derive(Debug)]
pub struct RawRecord {
    /// 1-based physical line the record starts on.
    pub line: usize,
    /// Byte offset just past the record (terminator included).
    pub end: usize,
    /// Whether the record was closed by a newline (false only at EOF).
    pub terminated: bool,
    pub outcome: Result<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FieldStart,
    Unquoted,
    Quoted,
    AfterQuote,
}

/// Iterator over the logical records of a journal buffer.
///
/// Scanning never stops at a malformed record: the reader resynchronizes at
/// the next newline so the caller can decide what a bad record means.
pub struct RecordReader<'a> {
    buf: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(buf: &'a str) -> Self {
        Self { buf, pos: 0, line: 1 }
    }

    /// Byte offset of the next unread record.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn scan(&mut self) -> RawRecord {
        let bytes = self.buf.as_bytes();
        let start_line = self.line;
        let mut fields: Vec<Vec<u8>> = Vec::with_capacity(2);
        let mut field: Vec<u8> = Vec::new();
        let mut state = State::FieldStart;
        let mut error: Option<String> = None;
        let mut terminated = false;
        let mut i = self.pos;

        while i < bytes.len() {
            let b = bytes[i];

            // Record terminator, honoured everywhere except inside quotes.
            let newline_len = match b {
                b'\n' => 1,
                b'\r' if bytes.get(i + 1) == Some(&b'\n') => 2,
                _ => 0,
            };
            if newline_len > 0 && state != State::Quoted {
                i += newline_len;
                self.line += 1;
                terminated = true;
                break;
            }

            if error.is_some() {
                // Skip the rest of a bad record.
                i += 1;
                continue;
            }

            match state {
                State::FieldStart => {
                    if b == QUOTE {
                        state = State::Quoted;
                    } else if b == DELIMITER {
                        fields.push(std::mem::take(&mut field));
                    } else {
                        field.push(b);
                        state = State::Unquoted;
                    }
                    i += 1;
                }
                State::Unquoted => {
                    if b == DELIMITER {
                        fields.push(std::mem::take(&mut field));
                        state = State::FieldStart;
                    } else {
                        field.push(b);
                    }
                    i += 1;
                }
                State::Quoted => {
                    if b == QUOTE {
                        if bytes.get(i + 1) == Some(&QUOTE) {
                            field.push(QUOTE);
                            i += 2;
                        } else {
                            state = State::AfterQuote;
                            i += 1;
                        }
                    } else {
                        if b == b'\n' {
                            self.line += 1;
                        }
                        field.push(b);
                        i += 1;
                    }
                }
                State::AfterQuote => {
                    if b == DELIMITER {
                        fields.push(std::mem::take(&mut field));
                        state = State::FieldStart;
                    } else {
                        error = Some(format!(
                            "unexpected character {:?} after closing quote",
                            b as char
                        ));
                    }
                    i += 1;
                }
            }
        }

        if error.is_none() && state == State::Quoted {
            error = Some("unterminated quoted field".to_string());
        }
        fields.push(field);
        self.pos = i;

        let outcome = match error {
            Some(reason) => Err(JournalError::malformed(start_line, reason)),
            None => into_pair(fields, start_line),
        };

        RawRecord {
            line: start_line,
            end: i,
            terminated,
            outcome,
        }
    }
}

fn into_pair(fields: Vec<Vec<u8>>, line: usize) -> Result<(String, String)> {
    if fields.len() != 2 {
        return Err(JournalError::malformed(
            line,
            format!("expected 2 fields, found {}", fields.len()),
        ));
    }
    let mut decoded = fields.into_iter().map(|bytes| {
        String::from_utf8(bytes).map_err(|_| JournalError::malformed(line, "invalid UTF-8"))
    });
    match (decoded.next(), decoded.next()) {
        (Some(id), Some(value)) => Ok((id?, value?)),
        _ => Err(JournalError::malformed(line, "expected 2 fields")),
    }
}

impl Iterator for RecordReader<'_> {
    type Item = RawRecord;

    fn next(&mut self) -> Option<RawRecord> {
        if self.pos >= self.buf.len() {
            return None;
        }
        Some(self.scan())
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_fields_are_not_quoted() {
        assert_eq!(encode_record("img_001", "cat"), "img_001\tcat");
        assert_eq!(encode_record("img_001", ""), "img_001\t");
    }

    #[test]
    fn test_special_characters_are_quoted() {
        assert_eq!(encode_record("a\tb", "x"), "\"a\tb\"\tx");
        assert_eq!(encode_record("id", "say \"hi\""), "id\t\"say \"\"hi\"\"\"");
        assert_eq!(encode_record("id", "two\nlines"), "id\t\"two\nlines\"");
    }

    #[test]
    fn test_decode_plain_and_tombstone() {
        assert_eq!(
            decode_record("img_001\tcat").unwrap(),
            ("img_001".to_string(), "cat".to_string())
        );
        assert_eq!(
            decode_record("img_001\t\n").unwrap(),
            ("img_001".to_string(), String::new())
        );
        assert_eq!(
            decode_record("img_001\tcat\r\n").unwrap(),
            ("img_001".to_string(), "cat".to_string())
        );
    }

    #[test]
    fn test_decode_wrong_field_count() {
        for line in ["only-one-field", "a\tb\tc", ""] {
            let err = decode_record(line).unwrap_err();
            assert!(
                matches!(err, JournalError::MalformedRecord { .. }),
                "line {:?} gave {:?}",
                line,
                err
            );
        }
    }

    #[test]
    fn test_decode_rejects_bad_quoting() {
        assert!(decode_record("\"open\tx").is_err());
        assert!(decode_record("\"closed\"junk\tx").is_err());
    }

    #[test]
    fn test_decode_rejects_two_records() {
        assert!(decode_record("a\tx\nb\ty\n").is_err());
    }

    #[test]
    fn test_reader_tracks_lines_and_offsets() {
        let buf = "a\tX\n\"multi\nline\"\tY\nb\tZ";
        let records: Vec<RawRecord> = RecordReader::new(buf).collect();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].line, 1);
        assert_eq!(records[0].end, 4);
        assert!(records[0].terminated);

        assert_eq!(records[1].line, 2);
        let (id, value) = records[1].outcome.as_ref().unwrap();
        assert_eq!(id, "multi\nline");
        assert_eq!(value, "Y");

        assert_eq!(records[2].line, 4);
        assert_eq!(records[2].end, buf.len());
        assert!(!records[2].terminated);
    }

    #[test]
    fn test_reader_resyncs_after_malformed_record() {
        let buf = "bad\nok\tX\n";
        let records: Vec<RawRecord> = RecordReader::new(buf).collect();
        assert_eq!(records.len(), 2);
        assert!(records[0].outcome.is_err());
        assert_eq!(records[1].outcome.as_ref().unwrap().1, "X");
    }

    #[test]
    fn test_write_record_appends_newline() {
        let mut out = Vec::new();
        write_record(&mut out, "a", "Z").unwrap();
        write_record(&mut out, "b", "").unwrap();
        assert_eq!(out, b"a\tZ\nb\t\n");
    }

    proptest! {
        #[test]
        fn prop_encode_decode_roundtrip(id in "\\PC*", value in "\\PC*") {
            let line = encode_record(&id, &value);
            let (got_id, got_value) = decode_record(&line).unwrap();
            prop_assert_eq!(got_id, id);
            prop_assert_eq!(got_value, value);
        }

        #[test]
        fn prop_roundtrip_with_control_characters(
            id in "[a-z\t\"\r\n]{0,12}",
            value in "[a-z\t\"\r\n]{0,12}",
        ) {
            let mut buf = Vec::new();
            write_record(&mut buf, &id, &value).unwrap();
            let text = String::from_utf8(buf).unwrap();
            let records: Vec<RawRecord> = RecordReader::new(&text).collect();
            prop_assert_eq!(records.len(), 1);
            let (got_id, got_value) = records[0].outcome.as_ref().unwrap();
            prop_assert_eq!(got_id, &id);
            prop_assert_eq!(got_value, &value);
        }
    }
}
