//! SNMP typed values and their BER wire tags.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::oid::Oid;

/// BER tag numbers for the SNMPv1/v2c grammar.
pub mod tag {
    pub const INTEGER: u8 = 0x02;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OBJECT_IDENTIFIER: u8 = 0x06;
    pub const SEQUENCE: u8 = 0x30;
    pub const IP_ADDRESS: u8 = 0x40;
    pub const COUNTER32: u8 = 0x41;
    pub const GAUGE32: u8 = 0x42;
    pub const TIMETICKS: u8 = 0x43;
    pub const OPAQUE: u8 = 0x44;
    pub const COUNTER64: u8 = 0x46;
    pub const NO_SUCH_OBJECT: u8 = 0x80;
    pub const NO_SUCH_INSTANCE: u8 = 0x81;
    pub const END_OF_MIB_VIEW: u8 = 0x82;
}

/// A decoded SNMP value, one variant per wire type plus the three v2c
/// exception markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedValue {
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectIdentifier(Oid),
    Null,
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Counter64(u64),
    IpAddress([u8; 4]),
    Opaque(Vec<u8>),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl TypedValue {
    pub fn wire_tag(&self) -> u8 {
        match self {
            TypedValue::Integer(_) => tag::INTEGER,
            TypedValue::OctetString(_) => tag::OCTET_STRING,
            TypedValue::ObjectIdentifier(_) => tag::OBJECT_IDENTIFIER,
            TypedValue::Null => tag::NULL,
            TypedValue::Counter32(_) => tag::COUNTER32,
            TypedValue::Gauge32(_) => tag::GAUGE32,
            TypedValue::TimeTicks(_) => tag::TIMETICKS,
            TypedValue::Counter64(_) => tag::COUNTER64,
            TypedValue::IpAddress(_) => tag::IP_ADDRESS,
            TypedValue::Opaque(_) => tag::OPAQUE,
            TypedValue::NoSuchObject => tag::NO_SUCH_OBJECT,
            TypedValue::NoSuchInstance => tag::NO_SUCH_INSTANCE,
            TypedValue::EndOfMibView => tag::END_OF_MIB_VIEW,
        }
    }

    /// True for the three per-varbind exception markers.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            TypedValue::NoSuchObject | TypedValue::NoSuchInstance | TypedValue::EndOfMibView
        )
    }

    pub fn kind(&self) -> Option<ValueKind> {
        Some(match self {
            TypedValue::Integer(_) => ValueKind::Integer,
            TypedValue::OctetString(_) => ValueKind::OctetString,
            TypedValue::ObjectIdentifier(_) => ValueKind::ObjectIdentifier,
            TypedValue::Null => ValueKind::Null,
            TypedValue::Counter32(_) => ValueKind::Counter32,
            TypedValue::Gauge32(_) => ValueKind::Gauge32,
            TypedValue::TimeTicks(_) => ValueKind::TimeTicks,
            TypedValue::Counter64(_) => ValueKind::Counter64,
            TypedValue::IpAddress(_) => ValueKind::IpAddress,
            TypedValue::Opaque(_) => ValueKind::Opaque,
            _ => return None,
        })
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Integer(v) => write!(f, "INTEGER: {}", v),
            TypedValue::OctetString(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => write!(f, "STRING: {:?}", s),
                Err(_) => {
                    write!(f, "Hex-STRING:")?;
                    for b in bytes {
                        write!(f, " {:02X}", b)?;
                    }
                    Ok(())
                }
            },
            TypedValue::ObjectIdentifier(oid) => write!(f, "OID: {}", oid),
            TypedValue::Null => write!(f, "NULL"),
            TypedValue::Counter32(v) => write!(f, "Counter32: {}", v),
            TypedValue::Gauge32(v) => write!(f, "Gauge32: {}", v),
            TypedValue::TimeTicks(v) => write!(f, "Timeticks: ({})", v),
            TypedValue::Counter64(v) => write!(f, "Counter64: {}", v),
            TypedValue::IpAddress(ip) => {
                write!(f, "IpAddress: {}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3])
            }
            TypedValue::Opaque(bytes) => write!(f, "Opaque: {} bytes", bytes.len()),
            TypedValue::NoSuchObject => write!(f, "No Such Object"),
            TypedValue::NoSuchInstance => write!(f, "No Such Instance"),
            TypedValue::EndOfMibView => write!(f, "End of MIB View"),
        }
    }
}

/// The declared type of a catalog entry. This is what response values
/// must be tagged as, independent of how the simulator computes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Integer,
    OctetString,
    ObjectIdentifier,
    Null,
    Counter32,
    Gauge32,
    TimeTicks,
    Counter64,
    IpAddress,
    Opaque,
}

impl ValueKind {
    pub fn wire_tag(&self) -> u8 {
        match self {
            ValueKind::Integer => tag::INTEGER,
            ValueKind::OctetString => tag::OCTET_STRING,
            ValueKind::ObjectIdentifier => tag::OBJECT_IDENTIFIER,
            ValueKind::Null => tag::NULL,
            ValueKind::Counter32 => tag::COUNTER32,
            ValueKind::Gauge32 => tag::GAUGE32,
            ValueKind::TimeTicks => tag::TIMETICKS,
            ValueKind::Counter64 => tag::COUNTER64,
            ValueKind::IpAddress => tag::IP_ADDRESS,
            ValueKind::Opaque => tag::OPAQUE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Integer => "INTEGER",
            ValueKind::OctetString => "STRING",
            ValueKind::ObjectIdentifier => "OID",
            ValueKind::Null => "Null",
            ValueKind::Counter32 => "Counter32",
            ValueKind::Gauge32 => "Gauge32",
            ValueKind::TimeTicks => "Timeticks",
            ValueKind::Counter64 => "Counter64",
            ValueKind::IpAddress => "IpAddress",
            ValueKind::Opaque => "Opaque",
        }
    }
}
