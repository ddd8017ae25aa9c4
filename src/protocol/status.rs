//! Typed decode of the gateway status reply.
//!
//! The `get_status` reply data is validated up front: every flag must be
//! present and boolean, otherwise the decode fails with a JSON error instead
//! of surfacing a missing field at the call site.

use serde::Deserialize;

/// Health flags reported by the gateway's `get_status` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GatewayStatus {
    /// The gateway app finished initializing.
    pub app_initialized: bool,
    /// The gateway app is enabled.
    pub app_enabled: bool,
    /// All gateway-side plugins report healthy.
    pub plugins_good: bool,
    /// The gateway app itself reports healthy.
    pub app_good: bool,
    /// The bot account is online.
    pub online: bool,
    /// Overall health flag.
    pub good: bool,
}

impl GatewayStatus {
    /// Whether every individual flag is set.
    pub fn all_good(&self) -> bool {
        self.app_initialized
            && self.app_enabled
            && self.plugins_good
            && self.app_good
            && self.online
            && self.good
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    const HEALTHY: &[u8] = br#"{
        "app_initialized": true,
        "app_enabled": true,
        "plugins_good": true,
        "app_good": true,
        "online": true,
        "good": true
    }"#;

    #[test]
    fn test_decode_full_status() {
        let status: GatewayStatus = JsonCodec::decode(HEALTHY).unwrap();
        assert!(status.all_good());
    }

    #[test]
    fn test_partial_health() {
        let raw = br#"{
            "app_initialized": true,
            "app_enabled": true,
            "plugins_good": false,
            "app_good": true,
            "online": false,
            "good": false
        }"#;

        let status: GatewayStatus = JsonCodec::decode(raw).unwrap();
        assert!(!status.all_good());
        assert!(status.app_initialized);
        assert!(!status.online);
    }

    #[test]
    fn test_missing_flag_is_decode_error() {
        let raw = br#"{ "app_initialized": true, "good": true }"#;
        let result: crate::error::Result<GatewayStatus> = JsonCodec::decode(raw);
        assert!(result.is_err());
    }

    #[test]
    fn test_mistyped_flag_is_decode_error() {
        let raw = br#"{
            "app_initialized": "yes",
            "app_enabled": true,
            "plugins_good": true,
            "app_good": true,
            "online": true,
            "good": true
        }"#;
        let result: crate::error::Result<GatewayStatus> = JsonCodec::decode(raw);
        assert!(result.is_err());
    }
}
