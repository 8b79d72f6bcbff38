//! QR payload decoding and the redemption state machine.

mod payload;
mod service;

pub use payload::{encode_opaque, encode_signed, parse_payload, PayloadDecodeError, QrPayload};
pub use service::{
    RedemptionError, RedemptionResult, RedemptionService, RedemptionStatus, ScanRequest,
};
