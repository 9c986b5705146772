//! Configuration and constants

/// All configurable knobs for the gateway
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP API listens on
    pub port: u16,
    /// Base URL of the engine sidecar that drives the web client
    pub engine_url: String,
    /// Identifier under which the engine persists session credentials
    pub session_id: String,
    /// Country code prepended to bare national numbers
    pub country_code: String,
    /// Digit count of a national number that qualifies for prefixing
    pub national_number_len: usize,
    /// Routing suffix the engine expects on message targets
    pub address_suffix: String,
    /// Settle time between session teardown and re-initialization
    pub reconnect_delay_ms: u64,
    /// How many chats /chats returns
    pub chat_list_limit: usize,
    /// Character cap for last-message previews
    pub preview_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            engine_url: "http://127.0.0.1:3100".to_string(),
            session_id: "whatsapp-api-session".to_string(),
            country_code: "55".to_string(),
            national_number_len: 11,
            address_suffix: "c.us".to_string(),
            reconnect_delay_ms: 2000,
            chat_list_limit: 10,
            preview_len: 50,
        }
    }
}

impl Config {
    /// Create config for testing with a fast reconnect
    pub fn for_test() -> Self {
        Self {
            engine_url: "http://127.0.0.1:0".to_string(),
            reconnect_delay_ms: 10,
            ..Self::default()
        }
    }
}
