//! Topic constants for command routing.
//!
//! Topics follow the pattern `wakebell.<domain>.<event>`.

/// Delivery commands consumed by the delivery worker (start, dismiss, auto-stop).
pub const DELIVERY_COMMAND: &str = "wakebell.delivery.command";
