//! BER codec for the SNMPv1/v2c message grammar.
//!
//! `SEQUENCE { INTEGER version, OCTET STRING community, PDU }` where the
//! PDU is a context-tagged `SEQUENCE { request-id, error-status,
//! error-index, SEQUENCE OF SEQUENCE { OID, value } }` (GETBULK reuses
//! the two integer slots for non-repeaters / max-repetitions).
//!
//! The decoder is deliberately liberal: both short- and long-form
//! lengths are accepted, non-minimal integer encodings are tolerated,
//! and every read is bounds-checked so adversarial input of any length
//! fails with an error instead of a panic. The encoder always emits
//! shortest-form lengths and minimal two's-complement integers.

use thiserror::Error;

use super::oid::Oid;
use super::pdu::{Pdu, PduType, SnmpMessage, SnmpVersion, VarBind};
use super::value::{tag, TypedValue};

/// Maximum UDP payload: 65535 minus IP and UDP headers.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated message")]
    Truncated,
    #[error("invalid length encoding")]
    InvalidLength,
    #[error("expected tag 0x{expected:02X}, found 0x{found:02X}")]
    UnexpectedTag { expected: u8, found: u8 },
    #[error("integer out of range")]
    ValueOutOfRange,
    #[error("unsupported SNMP version {0}")]
    UnsupportedVersion(i64),
    #[error("unsupported PDU tag 0x{0:02X}")]
    UnsupportedPdu(u8),
    #[error("invalid object identifier")]
    InvalidOid,
    #[error("encoded message is {0} bytes, over the UDP payload limit")]
    TooBig(usize),
}

pub type Result<T> = std::result::Result<T, CodecError>;

// ==================== Decoding ====================

struct BerReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BerReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        BerReader { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn read_byte(&mut self) -> Result<u8> {
        let b = *self.buf.get(self.pos).ok_or(CodecError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn peek_byte(&self) -> Result<u8> {
        self.buf.get(self.pos).copied().ok_or(CodecError::Truncated)
    }

    /// Short form (< 128) or long form (0x81..0x84). Indefinite length
    /// (0x80) is not part of SNMP's BER subset.
    fn read_length(&mut self) -> Result<usize> {
        let first = self.read_byte()?;
        if first < 0x80 {
            return Ok(first as usize);
        }
        let count = (first & 0x7F) as usize;
        if count == 0 || count > 4 {
            return Err(CodecError::InvalidLength);
        }
        let mut len: usize = 0;
        for _ in 0..count {
            len = (len << 8) | self.read_byte()? as usize;
        }
        Ok(len)
    }

    fn read_content(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::Truncated)?;
        if end > self.buf.len() {
            return Err(CodecError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_tlv(&mut self, expected: u8) -> Result<&'a [u8]> {
        let found = self.read_byte()?;
        if found != expected {
            return Err(CodecError::UnexpectedTag { expected, found });
        }
        let len = self.read_length()?;
        self.read_content(len)
    }

    fn read_any_tlv(&mut self) -> Result<(u8, &'a [u8])> {
        let tag = self.read_byte()?;
        let len = self.read_length()?;
        Ok((tag, self.read_content(len)?))
    }

    fn read_integer(&mut self) -> Result<i64> {
        let content = self.read_tlv(tag::INTEGER)?;
        signed_from_bytes(content)
    }
}

fn signed_from_bytes(content: &[u8]) -> Result<i64> {
    if content.is_empty() {
        return Err(CodecError::ValueOutOfRange);
    }
    // Tolerate one byte of zero padding past 8 (unsigned values whose
    // high bit is set).
    if content.len() > 9 || (content.len() == 9 && content[0] != 0x00) {
        return Err(CodecError::ValueOutOfRange);
    }
    if content.len() == 9 {
        let mut v: u64 = 0;
        for &b in &content[1..] {
            v = (v << 8) | b as u64;
        }
        return i64::try_from(v).map_err(|_| CodecError::ValueOutOfRange);
    }
    let mut v: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in content {
        v = (v << 8) | b as i64;
    }
    Ok(v)
}

fn unsigned_from_bytes(content: &[u8]) -> Result<u64> {
    if content.is_empty() || content.len() > 9 {
        return Err(CodecError::ValueOutOfRange);
    }
    if content.len() == 9 && content[0] != 0x00 {
        return Err(CodecError::ValueOutOfRange);
    }
    if content.len() <= 8 && content[0] & 0x80 != 0 {
        // A negative two's-complement value is not a legal unsigned
        // application type.
        return Err(CodecError::ValueOutOfRange);
    }
    let mut v: u64 = 0;
    for &b in content {
        v = (v << 8) | b as u64;
    }
    Ok(v)
}

fn unsigned32_from_bytes(content: &[u8]) -> Result<u32> {
    u32::try_from(unsigned_from_bytes(content)?).map_err(|_| CodecError::ValueOutOfRange)
}

fn oid_from_bytes(content: &[u8]) -> Result<Oid> {
    if content.is_empty() {
        return Err(CodecError::InvalidOid);
    }
    let mut values: Vec<u64> = Vec::with_capacity(content.len() + 1);
    let mut acc: u64 = 0;
    let mut in_subid = false;
    for &b in content {
        acc = (acc << 7) | (b & 0x7F) as u64;
        // The first value packs the two leading components and may
        // reach 80 past the component range.
        if acc > u32::MAX as u64 + 80 {
            return Err(CodecError::InvalidOid);
        }
        if b & 0x80 != 0 {
            in_subid = true;
        } else {
            values.push(acc);
            acc = 0;
            in_subid = false;
        }
    }
    if in_subid {
        // Continuation bit set on the final byte.
        return Err(CodecError::InvalidOid);
    }

    let mut components = Vec::with_capacity(values.len() + 1);
    let head = values[0];
    if head < 40 {
        components.push(0);
        components.push(head as u32);
    } else if head < 80 {
        components.push(1);
        components.push((head - 40) as u32);
    } else {
        components.push(2);
        components.push((head - 80) as u32);
    }
    for &v in &values[1..] {
        components.push(u32::try_from(v).map_err(|_| CodecError::InvalidOid)?);
    }
    Ok(Oid::new(components))
}

fn value_from_tlv(value_tag: u8, content: &[u8]) -> Result<TypedValue> {
    Ok(match value_tag {
        tag::INTEGER => TypedValue::Integer(signed_from_bytes(content)?),
        tag::OCTET_STRING => TypedValue::OctetString(content.to_vec()),
        tag::OBJECT_IDENTIFIER => TypedValue::ObjectIdentifier(oid_from_bytes(content)?),
        tag::NULL => {
            if !content.is_empty() {
                return Err(CodecError::InvalidLength);
            }
            TypedValue::Null
        }
        tag::COUNTER32 => TypedValue::Counter32(unsigned32_from_bytes(content)?),
        tag::GAUGE32 => TypedValue::Gauge32(unsigned32_from_bytes(content)?),
        tag::TIMETICKS => TypedValue::TimeTicks(unsigned32_from_bytes(content)?),
        tag::COUNTER64 => TypedValue::Counter64(unsigned_from_bytes(content)?),
        tag::IP_ADDRESS => {
            let ip: [u8; 4] = content.try_into().map_err(|_| CodecError::InvalidLength)?;
            TypedValue::IpAddress(ip)
        }
        tag::OPAQUE => TypedValue::Opaque(content.to_vec()),
        tag::NO_SUCH_OBJECT => TypedValue::NoSuchObject,
        tag::NO_SUCH_INSTANCE => TypedValue::NoSuchInstance,
        tag::END_OF_MIB_VIEW => TypedValue::EndOfMibView,
        other => {
            return Err(CodecError::UnexpectedTag {
                expected: tag::NULL,
                found: other,
            })
        }
    })
}

/// Decode a datagram into an [`SnmpMessage`].
pub fn decode(bytes: &[u8]) -> Result<SnmpMessage> {
    let mut outer = BerReader::new(bytes);
    let body = outer.read_tlv(tag::SEQUENCE)?;

    let mut msg = BerReader::new(body);
    let version_raw = msg.read_integer()?;
    let version =
        SnmpVersion::from_wire(version_raw).ok_or(CodecError::UnsupportedVersion(version_raw))?;
    let community = msg.read_tlv(tag::OCTET_STRING)?.to_vec();

    let pdu_tag = msg.peek_byte()?;
    let pdu_type = PduType::from_tag(pdu_tag).ok_or(CodecError::UnsupportedPdu(pdu_tag))?;
    let (_, pdu_body) = msg.read_any_tlv()?;

    let mut pdu = BerReader::new(pdu_body);
    let request_id = pdu.read_integer()?;
    if request_id < i64::from(i32::MIN) || request_id > i64::from(i32::MAX) {
        return Err(CodecError::ValueOutOfRange);
    }
    let error_status = pdu.read_integer()?;
    let error_index = pdu.read_integer()?;
    if !(0..=i64::from(u32::MAX)).contains(&error_status)
        || !(0..=i64::from(u32::MAX)).contains(&error_index)
    {
        return Err(CodecError::ValueOutOfRange);
    }

    let list = pdu.read_tlv(tag::SEQUENCE)?;
    let mut varbinds = Vec::new();
    let mut bindings = BerReader::new(list);
    while !bindings.is_empty() {
        let entry = bindings.read_tlv(tag::SEQUENCE)?;
        let mut pair = BerReader::new(entry);
        let oid = oid_from_bytes(pair.read_tlv(tag::OBJECT_IDENTIFIER)?)?;
        let (value_tag, value_content) = pair.read_any_tlv()?;
        varbinds.push(VarBind::new(oid, value_from_tlv(value_tag, value_content)?));
    }

    Ok(SnmpMessage {
        version,
        community,
        pdu: Pdu {
            pdu_type,
            request_id: request_id as i32,
            error_status: error_status as u32,
            error_index: error_index as u32,
            varbinds,
        },
    })
}

// ==================== Encoding ====================

fn write_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xFF {
        out.push(0x81);
        out.push(len as u8);
    } else if len <= 0xFFFF {
        out.push(0x82);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    } else if len <= 0xFF_FFFF {
        out.push(0x83);
        out.push((len >> 16) as u8);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    } else {
        out.push(0x84);
        out.push((len >> 24) as u8);
        out.push((len >> 16) as u8);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    }
}

fn write_tlv(out: &mut Vec<u8>, tlv_tag: u8, content: &[u8]) {
    out.push(tlv_tag);
    write_length(out, content.len());
    out.extend_from_slice(content);
}

/// Minimal two's-complement content bytes.
fn signed_content(v: i64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let redundant = if v < 0 {
            bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0
        } else {
            bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0
        };
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

/// Minimal unsigned content: a leading 0x00 keeps high-bit values
/// positive.
fn unsigned_content(v: u64) -> Vec<u8> {
    let bytes = v.to_be_bytes();
    let mut start = 0;
    while start < 7 && bytes[start] == 0x00 {
        start += 1;
    }
    let mut content = Vec::with_capacity(9);
    if bytes[start] & 0x80 != 0 {
        content.push(0x00);
    }
    content.extend_from_slice(&bytes[start..]);
    content
}

fn push_subid(out: &mut Vec<u8>, mut v: u64) {
    let mut chunk = [0u8; 10];
    let mut idx = 9;
    chunk[idx] = (v & 0x7F) as u8;
    v >>= 7;
    while v > 0 {
        idx -= 1;
        chunk[idx] = (v & 0x7F) as u8 | 0x80;
        v >>= 7;
    }
    out.extend_from_slice(&chunk[idx..]);
}

fn oid_content(oid: &Oid) -> Result<Vec<u8>> {
    let components = oid.components();
    if components.len() < 2 {
        return Err(CodecError::InvalidOid);
    }
    let (a, b) = (components[0], components[1]);
    if a > 2 || (a < 2 && b >= 40) {
        return Err(CodecError::InvalidOid);
    }
    let mut content = Vec::with_capacity(components.len() + 4);
    push_subid(&mut content, a as u64 * 40 + b as u64);
    for &subid in &components[2..] {
        push_subid(&mut content, subid as u64);
    }
    Ok(content)
}

fn write_value(out: &mut Vec<u8>, value: &TypedValue) -> Result<()> {
    match value {
        TypedValue::Integer(v) => write_tlv(out, tag::INTEGER, &signed_content(*v)),
        TypedValue::OctetString(bytes) => write_tlv(out, tag::OCTET_STRING, bytes),
        TypedValue::ObjectIdentifier(oid) => {
            write_tlv(out, tag::OBJECT_IDENTIFIER, &oid_content(oid)?)
        }
        TypedValue::Null => write_tlv(out, tag::NULL, &[]),
        TypedValue::Counter32(v) => write_tlv(out, tag::COUNTER32, &unsigned_content(*v as u64)),
        TypedValue::Gauge32(v) => write_tlv(out, tag::GAUGE32, &unsigned_content(*v as u64)),
        TypedValue::TimeTicks(v) => write_tlv(out, tag::TIMETICKS, &unsigned_content(*v as u64)),
        TypedValue::Counter64(v) => write_tlv(out, tag::COUNTER64, &unsigned_content(*v)),
        TypedValue::IpAddress(ip) => write_tlv(out, tag::IP_ADDRESS, ip),
        TypedValue::Opaque(bytes) => write_tlv(out, tag::OPAQUE, bytes),
        TypedValue::NoSuchObject => write_tlv(out, tag::NO_SUCH_OBJECT, &[]),
        TypedValue::NoSuchInstance => write_tlv(out, tag::NO_SUCH_INSTANCE, &[]),
        TypedValue::EndOfMibView => write_tlv(out, tag::END_OF_MIB_VIEW, &[]),
    }
    Ok(())
}

/// Encode a message. Fails with [`CodecError::TooBig`] past the UDP
/// payload limit; callers that care about a smaller MTU check the
/// returned length themselves.
pub fn encode(msg: &SnmpMessage) -> Result<Vec<u8>> {
    let mut list = Vec::new();
    for vb in &msg.pdu.varbinds {
        let mut entry = Vec::new();
        write_tlv(&mut entry, tag::OBJECT_IDENTIFIER, &oid_content(&vb.oid)?);
        write_value(&mut entry, &vb.value)?;
        write_tlv(&mut list, tag::SEQUENCE, &entry);
    }

    let mut pdu_body = Vec::new();
    write_tlv(
        &mut pdu_body,
        tag::INTEGER,
        &signed_content(i64::from(msg.pdu.request_id)),
    );
    write_tlv(
        &mut pdu_body,
        tag::INTEGER,
        &signed_content(i64::from(msg.pdu.error_status)),
    );
    write_tlv(
        &mut pdu_body,
        tag::INTEGER,
        &signed_content(i64::from(msg.pdu.error_index)),
    );
    write_tlv(&mut pdu_body, tag::SEQUENCE, &list);

    let mut body = Vec::new();
    write_tlv(
        &mut body,
        tag::INTEGER,
        &signed_content(msg.version.to_wire()),
    );
    write_tlv(&mut body, tag::OCTET_STRING, &msg.community);
    write_tlv(&mut body, msg.pdu.pdu_type.tag(), &pdu_body);

    let mut out = Vec::with_capacity(body.len() + 4);
    write_tlv(&mut out, tag::SEQUENCE, &body);

    if out.len() > MAX_UDP_PAYLOAD {
        return Err(CodecError::TooBig(out.len()));
    }
    Ok(out)
}
