//! SNMP wire types and BER codec.
//!
//! Supports SNMP v1 and v2c with tight type fidelity: every value
//! round-trips through the codec bit-exact on tag and content.

pub mod codec;
pub mod oid;
pub mod pdu;
pub mod value;

pub use codec::{decode, encode, CodecError, MAX_UDP_PAYLOAD};
pub use oid::Oid;
pub use pdu::{error_status, Pdu, PduType, SnmpMessage, SnmpVersion, VarBind};
pub use value::{tag, TypedValue, ValueKind};
