use crate::constants::{NONCE_LENGTH, URL_ALPHABET};

/// URL-safe random token drawn from [`URL_ALPHABET`]
pub fn nanoid(size: usize) -> String {
    (0..size)
        .map(|_| URL_ALPHABET[(fastrand::u8(..) & 63) as usize] as char)
        .collect()
}

/// Uppercase hex MD5 over `timestamp ‖ body ‖ nonce`.
///
/// `body` must be the exact serialized payload that goes on the wire.
pub fn signature(timestamp: &str, body: &str, nonce: &str) -> String {
    let digest = md5::compute(format!("{}{}{}", timestamp, body, nonce));
    format!("{:X}", digest)
}

/// Per-call authentication values sent as request headers
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub timestamp: String,
    pub nonce: String,
    pub sign: String,
}

impl SignedHeaders {
    pub fn for_body(body: &str) -> Self {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let nonce = nanoid(NONCE_LENGTH);
        let sign = signature(&timestamp, body, &nonce);
        Self {
            timestamp,
            nonce,
            sign,
        }
    }
}
