//! Delivery acknowledgement codes
//!
//! The engine reports one integer ack per sent message. The mapping is fixed
//! by the web client and not documented anywhere official.

/// Delivery status of a sent message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    /// Send failed on the client side
    Error,
    /// Accepted by the server
    ServerAck,
    /// Delivered to the recipient's device
    DeliveryAck,
    /// Read by the recipient
    ReadAck,
    /// Played by the recipient (audio messages only)
    PlayedAck,
    /// Any code outside 0..=4
    Unknown,
}

impl AckStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => AckStatus::Error,
            1 => AckStatus::ServerAck,
            2 => AckStatus::DeliveryAck,
            3 => AckStatus::ReadAck,
            4 => AckStatus::PlayedAck,
            _ => AckStatus::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AckStatus::Error => "error",
            AckStatus::ServerAck => "accepted-by-server",
            AckStatus::DeliveryAck => "delivered-to-recipient",
            AckStatus::ReadAck => "read-by-recipient",
            AckStatus::PlayedAck => "played",
            AckStatus::Unknown => "unknown",
        }
    }
}

/// Translate a raw ack code to its label
pub fn describe_ack(code: i64) -> &'static str {
    AckStatus::from_code(code).label()
}
