/// Client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the automation REST API (e.g. "http://localhost:3001/api")
    pub api_url: String,

    /// WebSocket endpoint for push events
    pub ws_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3001/api".to_string(),
            ws_url: "ws://localhost:3001".to_string(),
        }
    }
}

impl Config {
    /// Build a config from environment variables, falling back to defaults
    ///
    /// Recognized variables: `LUMI_CONSOLE_API_URL`, `LUMI_CONSOLE_WS_URL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("LUMI_CONSOLE_API_URL") {
            config.api_url = url;
        }
        if let Ok(url) = std::env::var("LUMI_CONSOLE_WS_URL") {
            config.ws_url = url;
        }
        config
    }
}
