//! Walk-file parser.
//!
//! A walk file is the text output of an `snmpwalk` run: one
//! `OID = TYPE: value` line per object. Parsing is recoverable per
//! line; bad lines are reported as warnings and skipped, never failing
//! the whole file.

use std::path::Path;

use regex::Regex;
use tracing::warn;

use crate::snmp::{Oid, TypedValue, ValueKind};

/// One successfully parsed walk line.
#[derive(Debug, Clone)]
pub struct WalkRecord {
    pub oid: Oid,
    pub declared_type: ValueKind,
    pub value: TypedValue,
}

/// A per-line parse problem. The line is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkWarning {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ParsedWalk {
    pub records: Vec<WalkRecord>,
    pub warnings: Vec<WalkWarning>,
}

impl ParsedWalk {
    /// Replace or add one record, e.g. a configured sysDescr override.
    pub fn upsert(&mut self, oid: Oid, declared_type: ValueKind, value: TypedValue) {
        match self.records.iter_mut().find(|r| r.oid == oid) {
            Some(record) => {
                record.declared_type = declared_type;
                record.value = value;
            }
            None => self.records.push(WalkRecord {
                oid,
                declared_type,
                value,
            }),
        }
    }
}

pub fn parse_file(path: &Path) -> std::io::Result<ParsedWalk> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_str(&contents))
}

pub fn parse_str(contents: &str) -> ParsedWalk {
    // `.1.3.6.1.2.1.1.1.0 = STRING: "..."` with the type token optional
    // (net-snmp omits it for empty strings).
    let line_re = Regex::new(r"^\s*(\.?[0-9][0-9.]*)\s*=\s*(?:([A-Za-z][A-Za-z0-9 \-]*?):\s*)?(.*)$")
        .expect("walk line regex");

    let mut parsed = ParsedWalk::default();
    for (idx, raw) in contents.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_end();
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let caps = match line_re.captures(line) {
            Some(caps) => caps,
            None => {
                parsed.warnings.push(WalkWarning {
                    line: line_no,
                    message: format!("unrecognized walk line: {:?}", line),
                });
                continue;
            }
        };
        let oid: Oid = match caps[1].parse() {
            Ok(oid) => oid,
            Err(e) => {
                parsed.warnings.push(WalkWarning {
                    line: line_no,
                    message: format!("bad OID: {}", e),
                });
                continue;
            }
        };
        let type_token = caps.get(2).map(|m| m.as_str()).unwrap_or("STRING");
        let value_text = caps.get(3).map(|m| m.as_str()).unwrap_or("");

        match parse_typed_value(type_token, value_text) {
            Ok((declared_type, value)) => parsed.records.push(WalkRecord {
                oid,
                declared_type,
                value,
            }),
            Err(message) => parsed.warnings.push(WalkWarning {
                line: line_no,
                message,
            }),
        }
    }

    for w in &parsed.warnings {
        warn!("walk line {}: {}", w.line, w.message);
    }
    parsed
}

fn parse_typed_value(
    type_token: &str,
    value_text: &str,
) -> Result<(ValueKind, TypedValue), String> {
    let normalized = type_token.trim().to_ascii_uppercase();
    match normalized.as_str() {
        "INTEGER" | "INTEGER32" => {
            let v = parse_integer_text(value_text)
                .ok_or_else(|| format!("bad INTEGER value: {:?}", value_text))?;
            Ok((ValueKind::Integer, TypedValue::Integer(v)))
        }
        "STRING" | "OCTET STRING" => Ok((
            ValueKind::OctetString,
            TypedValue::OctetString(unquote(value_text).into_bytes()),
        )),
        "HEX-STRING" => {
            let bytes = parse_hex_text(value_text)
                .ok_or_else(|| format!("bad Hex-STRING value: {:?}", value_text))?;
            Ok((ValueKind::OctetString, TypedValue::OctetString(bytes)))
        }
        "OID" | "OBJECT IDENTIFIER" => {
            let oid: Oid = value_text
                .trim()
                .parse()
                .map_err(|e| format!("bad OID value: {}", e))?;
            Ok((ValueKind::ObjectIdentifier, TypedValue::ObjectIdentifier(oid)))
        }
        "COUNTER32" => {
            let v = parse_unsigned_text(value_text)
                .ok_or_else(|| format!("bad Counter32 value: {:?}", value_text))?;
            let v = u32::try_from(v).map_err(|_| "Counter32 out of range".to_string())?;
            Ok((ValueKind::Counter32, TypedValue::Counter32(v)))
        }
        "COUNTER64" => {
            let v = parse_unsigned_text(value_text)
                .ok_or_else(|| format!("bad Counter64 value: {:?}", value_text))?;
            Ok((ValueKind::Counter64, TypedValue::Counter64(v)))
        }
        "GAUGE32" | "GAUGE" | "UNSIGNED32" => {
            let v = parse_unsigned_text(value_text)
                .ok_or_else(|| format!("bad Gauge32 value: {:?}", value_text))?;
            let v = u32::try_from(v).map_err(|_| "Gauge32 out of range".to_string())?;
            Ok((ValueKind::Gauge32, TypedValue::Gauge32(v)))
        }
        "TIMETICKS" => {
            let v = parse_timeticks_text(value_text)
                .ok_or_else(|| format!("bad Timeticks value: {:?}", value_text))?;
            Ok((ValueKind::TimeTicks, TypedValue::TimeTicks(v)))
        }
        "IPADDRESS" | "NETWORK ADDRESS" => {
            let ip = parse_ip_text(value_text)
                .ok_or_else(|| format!("bad IpAddress value: {:?}", value_text))?;
            Ok((ValueKind::IpAddress, TypedValue::IpAddress(ip)))
        }
        "OPAQUE" => Ok((
            ValueKind::Opaque,
            TypedValue::Opaque(value_text.as_bytes().to_vec()),
        )),
        "NULL" => Ok((ValueKind::Null, TypedValue::Null)),
        other => {
            // Unknown type tokens downgrade to STRING.
            warn!("unknown walk type token {:?}, treating as STRING", other);
            Ok((
                ValueKind::OctetString,
                TypedValue::OctetString(unquote(value_text).into_bytes()),
            ))
        }
    }
}

fn unquote(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

/// `17`, `-3`, or the enum rendering `up(1)`.
fn parse_integer_text(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(v);
    }
    if let (Some(open), Some(close)) = (trimmed.rfind('('), trimmed.rfind(')')) {
        if open < close {
            return trimmed[open + 1..close].trim().parse().ok();
        }
    }
    first_token(trimmed)?.parse().ok()
}

/// Leading number with trailing units tolerated (`57 percent`).
fn parse_unsigned_text(text: &str) -> Option<u64> {
    first_token(text.trim())?.parse().ok()
}

/// Plain tick count or net-snmp's `(1234567) 0:20:34.56`.
fn parse_timeticks_text(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    if let (Some(open), Some(close)) = (trimmed.find('('), trimmed.find(')')) {
        if open < close {
            return trimmed[open + 1..close].trim().parse().ok();
        }
    }
    first_token(trimmed)?.parse().ok()
}

fn parse_ip_text(text: &str) -> Option<[u8; 4]> {
    let mut parts = [0u8; 4];
    let mut count = 0;
    for part in text.trim().split('.') {
        if count == 4 {
            return None;
        }
        parts[count] = part.trim().parse().ok()?;
        count += 1;
    }
    (count == 4).then_some(parts)
}

fn parse_hex_text(text: &str) -> Option<Vec<u8>> {
    let mut bytes = Vec::new();
    for token in text.split(|c: char| c.is_whitespace() || c == ':') {
        if token.is_empty() {
            continue;
        }
        bytes.push(u8::from_str_radix(token, 16).ok()?);
    }
    Some(bytes)
}

fn first_token(text: &str) -> Option<&str> {
    text.split_whitespace().next()
}
