use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8001";
pub const DEFAULT_GREETING: &str =
    "你好！我是 NexusAI 助手。你可以上传文档到知识库，然后在这里向我提问。";
pub const DEFAULT_ERROR_MESSAGE: &str = "抱歉，出错了。请检查后端服务是否运行。";

/// Configuration for the chat client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL, without a trailing slash.
    pub base_url: String,
    /// Key the history backend stores this conversation under.
    pub session_id: String,
    /// Text of the assistant turn a fresh session starts with.
    pub greeting: String,
    /// Text that replaces an in-flight answer when the transport fails.
    pub error_message: String,
    /// Maximum silence between two chunks. `None` waits forever; never zero.
    pub idle_timeout: Option<Duration>,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            session_id: "default".into(),
            greeting: DEFAULT_GREETING.into(),
            error_message: DEFAULT_ERROR_MESSAGE.into(),
            idle_timeout: Some(Duration::from_secs(120)),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `NEXUS_API_URL`, `NEXUS_SESSION_ID` and `NEXUS_IDLE_TIMEOUT_SECS`,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("NEXUS_API_URL") {
            config = config.with_base_url(url);
        }
        if let Ok(id) = std::env::var("NEXUS_SESSION_ID") {
            config = config.with_session_id(id);
        }
        if let Ok(raw) = std::env::var("NEXUS_IDLE_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => config = config.with_idle_timeout(Some(Duration::from_secs(secs))),
                Err(_) => {
                    tracing::warn!(value = %raw, "Ignoring invalid NEXUS_IDLE_TIMEOUT_SECS");
                }
            }
        }
        config
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = id.into();
        self
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    /// A zero duration disables the timeout, same as `None`.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout.filter(|limit| !limit.is_zero());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    pub fn history_url(&self) -> String {
        format!("{}/api/history/{}", self.base_url, self.session_id)
    }
}
