//! SNMP message and PDU structures.

use super::oid::Oid;
use super::value::TypedValue;

/// PDU-level error-status codes (v2c names, wire values).
pub mod error_status {
    pub const NO_ERROR: u32 = 0;
    pub const TOO_BIG: u32 = 1;
    pub const NO_SUCH_NAME: u32 = 2;
    pub const BAD_VALUE: u32 = 3;
    pub const READ_ONLY: u32 = 4;
    pub const GEN_ERR: u32 = 5;
}

/// Protocol version as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnmpVersion {
    V1,
    V2c,
}

impl SnmpVersion {
    pub fn from_wire(v: i64) -> Option<Self> {
        match v {
            0 => Some(SnmpVersion::V1),
            1 => Some(SnmpVersion::V2c),
            _ => None,
        }
    }

    pub fn to_wire(self) -> i64 {
        match self {
            SnmpVersion::V1 => 0,
            SnmpVersion::V2c => 1,
        }
    }
}

/// Context tags for the PDU choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    GetRequest,
    GetNextRequest,
    GetResponse,
    SetRequest,
    GetBulkRequest,
    InformRequest,
    TrapV2,
    Report,
}

impl PduType {
    /// All types sharing the standard request layout. The v1 Trap PDU
    /// (0xA4) has a different grammar and is rejected at decode.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xA0 => Some(PduType::GetRequest),
            0xA1 => Some(PduType::GetNextRequest),
            0xA2 => Some(PduType::GetResponse),
            0xA3 => Some(PduType::SetRequest),
            0xA5 => Some(PduType::GetBulkRequest),
            0xA6 => Some(PduType::InformRequest),
            0xA7 => Some(PduType::TrapV2),
            0xA8 => Some(PduType::Report),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            PduType::GetRequest => 0xA0,
            PduType::GetNextRequest => 0xA1,
            PduType::GetResponse => 0xA2,
            PduType::SetRequest => 0xA3,
            PduType::GetBulkRequest => 0xA5,
            PduType::InformRequest => 0xA6,
            PduType::TrapV2 => 0xA7,
            PduType::Report => 0xA8,
        }
    }
}

/// An `(OID, value)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: TypedValue,
}

impl VarBind {
    pub fn new(oid: Oid, value: TypedValue) -> Self {
        VarBind { oid, value }
    }

    pub fn null(oid: Oid) -> Self {
        VarBind {
            oid,
            value: TypedValue::Null,
        }
    }
}

/// A decoded PDU. For `GetBulkRequest` the two integer fields carry
/// `non-repeaters` and `max-repetitions` instead of the error fields,
/// matching the wire layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub pdu_type: PduType,
    pub request_id: i32,
    pub error_status: u32,
    pub error_index: u32,
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    pub fn request(pdu_type: PduType, request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Pdu {
            pdu_type,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    pub fn get_bulk(
        request_id: i32,
        non_repeaters: u32,
        max_repetitions: u32,
        varbinds: Vec<VarBind>,
    ) -> Self {
        Pdu {
            pdu_type: PduType::GetBulkRequest,
            request_id,
            error_status: non_repeaters,
            error_index: max_repetitions,
            varbinds,
        }
    }

    /// Response with the given varbinds and no error.
    pub fn response(request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Pdu {
            pdu_type: PduType::GetResponse,
            request_id,
            error_status: error_status::NO_ERROR,
            error_index: 0,
            varbinds,
        }
    }

    /// Error response echoing the given varbinds.
    pub fn error_response(
        request_id: i32,
        status: u32,
        index: u32,
        varbinds: Vec<VarBind>,
    ) -> Self {
        Pdu {
            pdu_type: PduType::GetResponse,
            request_id,
            error_status: status,
            error_index: index,
            varbinds,
        }
    }

    pub fn non_repeaters(&self) -> u32 {
        self.error_status
    }

    pub fn max_repetitions(&self) -> u32 {
        self.error_index
    }
}

/// A complete SNMPv1/v2c message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmpMessage {
    pub version: SnmpVersion,
    pub community: Vec<u8>,
    pub pdu: Pdu,
}

impl SnmpMessage {
    pub fn new(version: SnmpVersion, community: impl Into<Vec<u8>>, pdu: Pdu) -> Self {
        SnmpMessage {
            version,
            community: community.into(),
            pdu,
        }
    }

    /// Response message mirroring this request's version and community.
    pub fn reply_with(&self, pdu: Pdu) -> SnmpMessage {
        SnmpMessage {
            version: self.version,
            community: self.community.clone(),
            pdu,
        }
    }
}
