// Zeek (Bro) DNS log reader: TSV with #-directives, or one JSON object per line.
// Yields one raw record at a time; `DnsRecord::decode` turns it into a typed record
// or a `DecodeError` (missing field = skip, anything else = fatal for the unit).

mod header;

pub use header::Header;

use std::io::BufRead;

use serde_json::{Map, Value};

use crate::aggregator::SENTINEL;
use crate::error::DecodeError;
use crate::models::DnsRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Tsv,
    Json,
}

pub struct ZeekReader<R> {
    reader: R,
    line: String,
    line_no: u64,
    format: Option<Format>,
    header: Header,
}

/// One raw log record, borrowed from the reader until the next call to `next_record`.
pub enum ZeekRecord<'a> {
    Tsv {
        header: &'a Header,
        values: Vec<&'a str>,
    },
    Json(Map<String, Value>),
}

impl<R: BufRead> ZeekReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_no: 0,
            format: None,
            header: Header::default(),
        }
    }

    /// Current line number (1-based) of the last line read.
    pub fn line_no(&self) -> u64 {
        self.line_no
    }

    /// Next data record, or `Ok(None)` at end of stream. Header lines are consumed silently.
    pub fn next_record(&mut self) -> Result<Option<ZeekRecord<'_>>, DecodeError> {
        let format = loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let text = self.line.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                continue;
            }
            let format = *self.format.get_or_insert(if text.starts_with('{') {
                Format::Json
            } else {
                Format::Tsv
            });
            if format == Format::Tsv
                && let Some(directive) = text.strip_prefix('#')
            {
                self.header.apply(directive);
                continue;
            }
            break format;
        };

        let text = self.line.trim_end_matches(['\r', '\n']);
        let at = || format!("line {}", self.line_no);
        match format {
            Format::Json => {
                let object = serde_json::from_str::<Map<String, Value>>(text)
                    .map_err(|e| DecodeError::invalid(at(), e.to_string()))?;
                Ok(Some(ZeekRecord::Json(object)))
            }
            Format::Tsv => {
                if self.header.fields.is_empty() {
                    return Err(DecodeError::invalid(at(), "data before #fields header"));
                }
                let values: Vec<&str> = text.split(self.header.separator.as_str()).collect();
                if values.len() != self.header.fields.len() {
                    return Err(DecodeError::invalid(
                        at(),
                        format!(
                            "expected {} columns, got {}",
                            self.header.fields.len(),
                            values.len()
                        ),
                    ));
                }
                Ok(Some(ZeekRecord::Tsv {
                    header: &self.header,
                    values,
                }))
            }
        }
    }
}

impl ZeekRecord<'_> {
    pub fn get_float(&self, name: &str) -> Result<f64, DecodeError> {
        match self {
            ZeekRecord::Tsv { .. } => {
                let raw = self.tsv_scalar(name)?;
                raw.parse::<f64>()
                    .map_err(|e| DecodeError::invalid(name, format!("{raw:?}: {e}")))
            }
            ZeekRecord::Json(object) => match object.get(name) {
                None | Some(Value::Null) => Err(DecodeError::MissingField(name.to_owned())),
                Some(Value::Number(n)) => n
                    .as_f64()
                    .ok_or_else(|| DecodeError::invalid(name, format!("{n} is not a float"))),
                Some(Value::String(s)) => s
                    .parse::<f64>()
                    .map_err(|e| DecodeError::invalid(name, format!("{s:?}: {e}"))),
                Some(other) => Err(DecodeError::invalid(name, format!("unexpected {other}"))),
            },
        }
    }

    pub fn get_string(&self, name: &str) -> Result<String, DecodeError> {
        match self {
            ZeekRecord::Tsv { header, .. } => {
                let raw = self.tsv_scalar(name)?;
                if raw == header.empty_field {
                    Ok(String::new())
                } else {
                    Ok(raw.to_owned())
                }
            }
            ZeekRecord::Json(object) => match object.get(name) {
                None | Some(Value::Null) => Err(DecodeError::MissingField(name.to_owned())),
                Some(v) => json_text(name, v),
            },
        }
    }

    /// List field. The unset marker (or an absent JSON key) yields the single
    /// sentinel entry, the empty marker yields an empty list.
    pub fn get_string_list(&self, name: &str) -> Result<Vec<String>, DecodeError> {
        match self {
            ZeekRecord::Tsv { header, values } => {
                let idx = header
                    .index_of(name)
                    .ok_or_else(|| DecodeError::MissingField(name.to_owned()))?;
                let raw = values[idx];
                if raw == header.unset_field {
                    Ok(vec![SENTINEL.to_owned()])
                } else if raw == header.empty_field {
                    Ok(Vec::new())
                } else {
                    Ok(raw
                        .split(header.set_separator.as_str())
                        .map(str::to_owned)
                        .collect())
                }
            }
            ZeekRecord::Json(object) => match object.get(name) {
                None | Some(Value::Null) => Ok(vec![SENTINEL.to_owned()]),
                Some(Value::Array(items)) => items.iter().map(|v| json_text(name, v)).collect(),
                Some(v) => Ok(vec![json_text(name, v)?]),
            },
        }
    }

    fn tsv_scalar(&self, name: &str) -> Result<&str, DecodeError> {
        let ZeekRecord::Tsv { header, values } = self else {
            return Err(DecodeError::invalid(name, "not a TSV record"));
        };
        let idx = header
            .index_of(name)
            .ok_or_else(|| DecodeError::MissingField(name.to_owned()))?;
        let raw = values[idx];
        if raw == header.unset_field {
            return Err(DecodeError::MissingField(name.to_owned()));
        }
        Ok(raw)
    }
}

fn json_text(name: &str, v: &Value) -> Result<String, DecodeError> {
    match v {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(DecodeError::invalid(name, format!("unexpected {other}"))),
    }
}

impl DnsRecord {
    /// Decode the fields the aggregator needs from one raw log record.
    pub fn decode(rec: &ZeekRecord<'_>) -> Result<Self, DecodeError> {
        Ok(DnsRecord {
            ts: rec.get_float("ts")?,
            query: rec.get_string("query")?,
            qtype: rec.get_string("qtype_name")?,
            answers: rec.get_string_list("answers")?,
            ttls: rec.get_string_list("TTLs")?,
        })
    }
}
