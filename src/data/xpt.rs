//! Reader for SAS transport (XPORT v5) files published by the survey
//!
//! A file is a sequence of 80-byte card records: a library header, then one
//! or more members. Each member carries a descriptor, a table of 140-byte
//! variable descriptors (namestrs) and packed fixed-width observations.
//! Numeric values are IBM/370 base-16 floating point.

use crate::data::Frame;
use anyhow::{Context, Result};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

const RECORD_LEN: usize = 80;

const LIBRARY_HEADER: &[u8] = b"HEADER RECORD*******LIBRARY HEADER RECORD!!!!!!!";
const MEMBER_HEADER: &[u8] = b"HEADER RECORD*******MEMBER  HEADER RECORD!!!!!!!";
const DESCRIPTOR_HEADER: &[u8] = b"HEADER RECORD*******DSCRPTR HEADER RECORD!!!!!!!";
const NAMESTR_HEADER: &[u8] = b"HEADER RECORD*******NAMESTR HEADER RECORD!!!!!!!";
const OBS_HEADER: &[u8] = b"HEADER RECORD*******OBS     HEADER RECORD!!!!!!!";

/// Transport decoding failure
#[derive(Debug, Error)]
pub enum XptError {
    #[error("file truncated at byte {0}")]
    Truncated(usize),

    #[error("expected {expected} at byte {offset}")]
    MissingHeader { expected: &'static str, offset: usize },

    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("variable {0} lies outside the observation record")]
    VariableOutOfBounds(String),
}

/// Storage type of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Numeric,
    Character,
}

/// Variable descriptor decoded from a namestr record
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub label: String,
    pub kind: VariableKind,
    /// Width in bytes inside an observation
    pub length: usize,
    /// Offset in bytes inside an observation
    pub position: usize,
}

/// Decoded cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(Option<f64>),
    Text(String),
}

impl Value {
    /// Numeric view; text is parsed when it looks like a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => *v,
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }
}

/// One dataset embedded in a transport file
#[derive(Debug, Clone)]
pub struct Member {
    pub name: String,
    pub variables: Vec<Variable>,
    pub rows: Vec<Vec<Value>>,
}

impl Member {
    /// Number of observations
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Convert to a numeric frame, keeping variable order
    pub fn to_frame(&self) -> Result<Frame> {
        let columns = self
            .variables
            .iter()
            .enumerate()
            .map(|(idx, var)| {
                let values = self.rows.iter().map(|row| row[idx].as_f64()).collect();
                (var.name.clone(), values)
            })
            .collect::<Vec<_>>();
        let mut frame = Frame::from_columns(columns)?;
        if frame.n_cols() == 0 {
            frame = Frame::with_rows(self.rows.len());
        }
        Ok(frame)
    }
}

/// Decode an IBM/370 floating point value of 2 to 8 bytes
///
/// Returns `None` for SAS missing values (`.`, `._` and `.A` to `.Z`).
pub fn ibm_to_f64(bytes: &[u8]) -> Option<f64> {
    let mut buf = [0u8; 8];
    let len = bytes.len().min(8);
    buf[..len].copy_from_slice(&bytes[..len]);

    let rest_zero = buf[1..].iter().all(|&b| b == 0);
    if rest_zero && (buf[0] == b'.' || buf[0] == b'_' || buf[0].is_ascii_uppercase()) {
        return None;
    }
    if rest_zero && buf[0] & 0x7F == 0 {
        return Some(0.0);
    }

    let sign = if buf[0] & 0x80 != 0 { -1.0 } else { 1.0 };
    let exponent = (buf[0] & 0x7F) as i32 - 64;
    let mut mantissa_bytes = [0u8; 8];
    mantissa_bytes[1..].copy_from_slice(&buf[1..]);
    let mantissa = u64::from_be_bytes(mantissa_bytes) as f64;

    Some(sign * mantissa * 2f64.powi(4 * exponent - 56))
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], XptError> {
        let end = self.offset + len;
        if end > self.bytes.len() {
            return Err(XptError::Truncated(self.bytes.len()));
        }
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn record(&mut self) -> Result<&'a [u8], XptError> {
        self.take(RECORD_LEN)
    }

    fn expect(&mut self, prefix: &[u8], expected: &'static str) -> Result<&'a [u8], XptError> {
        let offset = self.offset;
        let record = self.record()?;
        if !record.starts_with(prefix) {
            return Err(XptError::MissingHeader { expected, offset });
        }
        Ok(record)
    }

    fn at(&self, prefix: &[u8]) -> bool {
        self.bytes.len() >= self.offset + RECORD_LEN
            && self.bytes[self.offset..].starts_with(prefix)
    }

    fn align(&mut self) {
        let rem = self.offset % RECORD_LEN;
        if rem != 0 {
            self.offset = (self.offset + RECORD_LEN - rem).min(self.bytes.len());
        }
    }

    fn next_member_offset(&self) -> Option<usize> {
        (self.offset..self.bytes.len())
            .step_by(RECORD_LEN)
            .find(|&p| p + RECORD_LEN <= self.bytes.len() && self.bytes[p..].starts_with(MEMBER_HEADER))
    }
}

fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(|c: char| c == ' ' || c == '\0')
        .trim_start()
        .to_string()
}

fn numeric_field(bytes: &[u8], field: &'static str) -> Result<usize, XptError> {
    let text = ascii_field(bytes);
    text.parse::<usize>().map_err(|_| XptError::InvalidField { field, value: text })
}

fn parse_namestr(entry: &[u8]) -> Result<Variable, XptError> {
    let kind = match i16::from_be_bytes([entry[0], entry[1]]) {
        1 => VariableKind::Numeric,
        2 => VariableKind::Character,
        other => {
            return Err(XptError::InvalidField {
                field: "variable type",
                value: other.to_string(),
            })
        }
    };
    let length = i16::from_be_bytes([entry[4], entry[5]]);
    let name = ascii_field(&entry[8..16]);
    let position = i32::from_be_bytes([entry[84], entry[85], entry[86], entry[87]]);

    let valid_length = match kind {
        VariableKind::Numeric => (2..=8).contains(&length),
        VariableKind::Character => length > 0,
    };
    if !valid_length {
        return Err(XptError::InvalidField {
            field: "variable length",
            value: format!("{} ({})", length, name),
        });
    }
    if position < 0 {
        return Err(XptError::VariableOutOfBounds(name));
    }

    Ok(Variable {
        label: ascii_field(&entry[16..56]),
        name,
        kind,
        length: length as usize,
        position: position as usize,
    })
}

fn parse_member(reader: &mut Reader<'_>) -> Result<Member, XptError> {
    let header = reader.expect(MEMBER_HEADER, "member header")?;
    let namestr_len = numeric_field(&header[74..78], "namestr length")?;
    if namestr_len != 140 && namestr_len != 136 {
        return Err(XptError::InvalidField {
            field: "namestr length",
            value: namestr_len.to_string(),
        });
    }

    reader.expect(DESCRIPTOR_HEADER, "descriptor header")?;
    let descriptor = reader.record()?;
    let name = ascii_field(&descriptor[8..16]);
    reader.record()?;

    let namestr_header = reader.expect(NAMESTR_HEADER, "namestr header")?;
    let n_vars = numeric_field(&namestr_header[54..58], "variable count")?;
    let table = reader.take(n_vars * namestr_len)?;
    reader.align();
    let variables = table
        .chunks_exact(namestr_len)
        .map(parse_namestr)
        .collect::<Result<Vec<_>, _>>()?;

    reader.expect(OBS_HEADER, "observation header")?;

    let row_len = variables
        .iter()
        .map(|v| v.position + v.length)
        .max()
        .unwrap_or(0);
    let data_end = reader.next_member_offset().unwrap_or(reader.bytes.len());
    let data = &reader.bytes[reader.offset..data_end];
    reader.offset = data_end;

    let mut rows = Vec::new();
    if row_len > 0 {
        for chunk in data.chunks_exact(row_len) {
            let row = variables
                .iter()
                .map(|var| {
                    let cell = &chunk[var.position..var.position + var.length];
                    match var.kind {
                        VariableKind::Numeric => Value::Number(ibm_to_f64(cell)),
                        VariableKind::Character => Value::Text(ascii_field(cell)),
                    }
                })
                .collect::<Vec<_>>();
            rows.push((row, chunk.iter().all(|&b| b == b' ')));
        }
        // blank trailing observations are record padding
        while rows.last().map(|(_, blank)| *blank).unwrap_or(false) {
            rows.pop();
        }
    }

    debug!(
        "Decoded member {} with {} variables and {} rows",
        name,
        variables.len(),
        rows.len()
    );

    Ok(Member {
        name,
        variables,
        rows: rows.into_iter().map(|(row, _)| row).collect(),
    })
}

/// Decode every member of a transport file held in memory
pub fn parse(bytes: &[u8]) -> Result<Vec<Member>, XptError> {
    let mut reader = Reader::new(bytes);
    reader.expect(LIBRARY_HEADER, "library header")?;
    reader.record()?;
    reader.record()?;

    let mut members = Vec::new();
    while reader.at(MEMBER_HEADER) {
        members.push(parse_member(&mut reader)?);
    }
    if members.is_empty() {
        return Err(XptError::MissingHeader {
            expected: "member header",
            offset: reader.offset,
        });
    }
    Ok(members)
}

/// Decode a transport file from disk
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<Member>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    parse(&bytes).with_context(|| format!("Failed to decode {:?}", path))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Minimal transport writer for building fixtures

    fn padded(bytes: &[u8]) -> Vec<u8> {
        let mut record = bytes.to_vec();
        record.resize(super::RECORD_LEN, b' ');
        record
    }

    fn header(kind: &str, tail: &str) -> Vec<u8> {
        padded(format!("HEADER RECORD*******{:<8}HEADER RECORD!!!!!!!{}", kind, tail).as_bytes())
    }

    fn pad_block(block: &mut Vec<u8>) {
        let rem = block.len() % super::RECORD_LEN;
        if rem != 0 {
            block.resize(block.len() + super::RECORD_LEN - rem, b' ');
        }
    }

    /// Encode a number as an 8-byte IBM float (`None` becomes the `.` code)
    pub fn to_ibm(value: Option<f64>) -> [u8; 8] {
        let mut out = [0u8; 8];
        let v = match value {
            None => {
                out[0] = b'.';
                return out;
            }
            Some(v) if v == 0.0 => return out,
            Some(v) => v,
        };
        let sign = if v < 0.0 { 0x80u8 } else { 0 };
        let mut fraction = v.abs();
        let mut exponent: i32 = 0;
        while fraction >= 1.0 {
            fraction /= 16.0;
            exponent += 1;
        }
        while fraction < 1.0 / 16.0 {
            fraction *= 16.0;
            exponent -= 1;
        }
        let mantissa = (fraction * 2f64.powi(56)).round() as u64;
        out[0] = sign | (exponent + 64) as u8;
        out[1..].copy_from_slice(&mantissa.to_be_bytes()[1..]);
        out
    }

    /// Column of a fixture member
    pub enum Column<'a> {
        Numeric(&'a str, Vec<Option<f64>>),
        Text(&'a str, usize, Vec<&'a str>),
    }

    impl Column<'_> {
        fn name(&self) -> &str {
            match self {
                Column::Numeric(name, _) | Column::Text(name, _, _) => name,
            }
        }

        fn width(&self) -> usize {
            match self {
                Column::Numeric(..) => 8,
                Column::Text(_, width, _) => *width,
            }
        }

        fn len(&self) -> usize {
            match self {
                Column::Numeric(_, v) => v.len(),
                Column::Text(_, _, v) => v.len(),
            }
        }
    }

    fn member(name: &str, columns: &[Column<'_>]) -> Vec<u8> {
        let mut out = header("MEMBER", "000000000000000001600000000140");
        out.extend(header("DSCRPTR", "000000000000000000000000000000"));
        out.extend(padded(format!("SAS     {:<8}SASDATA 9.4", name).as_bytes()));
        out.extend(padded(b""));
        out.extend(header(
            "NAMESTR",
            &format!("000000{:04}00000000000000000000", columns.len()),
        ));

        let mut namestrs = Vec::new();
        let mut position = 0i32;
        for (idx, column) in columns.iter().enumerate() {
            let mut entry = vec![0u8; 140];
            let kind: i16 = match column {
                Column::Numeric(..) => 1,
                Column::Text(..) => 2,
            };
            entry[0..2].copy_from_slice(&kind.to_be_bytes());
            entry[4..6].copy_from_slice(&(column.width() as i16).to_be_bytes());
            entry[6..8].copy_from_slice(&((idx + 1) as i16).to_be_bytes());
            entry[8..16].copy_from_slice(format!("{:<8}", column.name()).as_bytes());
            entry[16..56].copy_from_slice(format!("{:<40}", column.name()).as_bytes());
            entry[84..88].copy_from_slice(&position.to_be_bytes());
            position += column.width() as i32;
            namestrs.extend(entry);
        }
        pad_block(&mut namestrs);
        out.extend(namestrs);
        out.extend(header("OBS", "000000000000000000000000000000"));

        let n_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        let mut data = Vec::new();
        for row in 0..n_rows {
            for column in columns {
                match column {
                    Column::Numeric(_, values) => data.extend(to_ibm(values[row])),
                    Column::Text(_, width, values) => {
                        let mut cell = values[row].as_bytes().to_vec();
                        cell.resize(*width, b' ');
                        data.extend(cell);
                    }
                }
            }
        }
        pad_block(&mut data);
        out.extend(data);
        out
    }

    /// Build a complete transport file with one or more members
    pub fn build(members: &[(&str, Vec<Column<'_>>)]) -> Vec<u8> {
        let mut out = header("LIBRARY", "000000000000000000000000000000");
        out.extend(padded(b"SAS     SAS     SASLIB  9.4     X64_10PR"));
        out.extend(padded(b"01JAN24:00:00:00"));
        for (name, columns) in members {
            out.extend(member(name, columns));
        }
        out
    }
}
