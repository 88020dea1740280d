//! Text encodings used by the local schema: RFC 3339 timestamps, ISO dates,
//! lowercase enum labels and JSON arrays.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::str::FromStr;

use super::{LocalStoreError, Table};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn encode_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn encode_optional_date(date: &Option<NaiveDate>) -> Option<String> {
    date.as_ref().map(encode_date)
}

/// Decodes the columns of one row, attributing failures to that row.
pub struct RowDecoder<'a> {
    table: Table,
    id: &'a str,
}

impl<'a> RowDecoder<'a> {
    pub fn new(table: Table, id: &'a str) -> Self {
        Self { table, id }
    }

    fn corrupt(&self, detail: String) -> LocalStoreError {
        LocalStoreError::CorruptRow {
            table: self.table.name(),
            id: self.id.to_string(),
            detail,
        }
    }

    pub fn timestamp(&self, value: &str) -> Result<DateTime<Utc>, LocalStoreError> {
        DateTime::parse_from_rfc3339(value)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| self.corrupt(format!("bad timestamp '{}': {}", value, e)))
    }

    pub fn date(&self, value: &str) -> Result<NaiveDate, LocalStoreError> {
        NaiveDate::parse_from_str(value, DATE_FORMAT)
            .map_err(|e| self.corrupt(format!("bad date '{}': {}", value, e)))
    }

    pub fn optional_date(&self, value: Option<&str>) -> Result<Option<NaiveDate>, LocalStoreError> {
        match value {
            Some(v) if !v.is_empty() => self.date(v).map(Some),
            _ => Ok(None),
        }
    }

    pub fn label<E>(&self, value: &str) -> Result<E, LocalStoreError>
    where
        E: FromStr<Err = String>,
    {
        value.parse().map_err(|e: String| self.corrupt(e))
    }

    pub fn optional_label<E>(&self, value: Option<&str>) -> Result<Option<E>, LocalStoreError>
    where
        E: FromStr<Err = String>,
    {
        match value {
            Some(v) if !v.is_empty() => self.label(v).map(Some),
            _ => Ok(None),
        }
    }

    pub fn string_list(&self, value: &str) -> Result<Vec<String>, LocalStoreError> {
        serde_json::from_str(value).map_err(|e| self.corrupt(format!("bad list: {}", e)))
    }
}

/// Escapes `%`, `_` and `\` so user text is matched literally by
/// `LIKE ... ESCAPE '\'`.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
