pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 100;

/// Requests served by one device identity before it is recycled
pub const DEFAULT_MAX_SESSION_USES: u32 = 50;

/// Conversational (session bootstrap) upstream
pub const CONVERSATIONAL_BASE_URL: &str = "https://ai-api.dangbei.net";
pub const CONVERSATIONAL_ORIGIN: &str = "https://ai.dangbei.com";
pub const CONVERSATION_CREATE_PATH: &str = "/ai-search/conversationApi/v1/create";
pub const CONVERSATION_CHAT_PATH: &str = "/ai-search/chatApi/v1/chat";
pub const BOT_CODE: &str = "AI_SEARCH";

/// Flat (message list) upstream
pub const FLAT_BASE_URL: &str = "https://mcp.scira.ai";
pub const FLAT_CHAT_PATH: &str = "/api/chat";
pub const FLAT_CHAT_ID: &str = "ZIWa36kd6MSqzw-ifXGzE";
pub const FLAT_USER_ID: &str = "2jFMDM1A1R_XxOTxPjhwe";

/// Line prefix of JSON server-sent events
pub const SSE_DATA_PREFIX: &str = "data:";
pub const SSE_DONE_SENTINEL: &str = "[DONE]";

/// Thinking-block delimiters
pub const REASONING_OPEN: &str = "<think>\n\n";
pub const REASONING_CLOSE: &str = "\n</think>";
pub const REASONING_SEPARATOR: &str = "\n\n";

/// Card item type tags
pub const CARD_KEYWORDS_TYPE: &str = "2001";
pub const CARD_RESULTS_TYPE: &str = "2002";

/// Trailing markers on the last user message that request web search
pub const ONLINE_SUFFIXES: &[&str] = &["@online", "@联网"];

pub const CONVERSATIONAL_MODELS: &[&str] = &["DeepSeek-R1", "DeepSeek-V3", "doubao", "qwen"];
pub const FLAT_MODELS: &[&str] = &[
    "qwen-qwq",
    "gemini-2.5-flash",
    "gpt-4.1-mini",
    "claude-3-7-sonnet",
];

/// Alphabet for device id suffixes and nonces
pub const URL_ALPHABET: &[u8] = b"useandom-26T198340PX75pxJACKVERYMINDBUSHWOLF_GQZbfghjklqvwyzrict";
pub const NONCE_LENGTH: usize = 21;
pub const DEVICE_SUFFIX_LENGTH: usize = 20;

pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:137.0) Gecko/20100101 Firefox/137.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

pub const MAX_STREAM_LINES: usize = 100_000;
