use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::constants::{CARD_KEYWORDS_TYPE, CARD_RESULTS_TYPE};
use crate::specs::conversational::{CardEnvelope, RawSearchResult};
use crate::types::{PrismError, Result};

lazy_static! {
    static ref SECTION_HEADER: Regex = Regex::new(r"\[(?:System Prompt|Chat History|Question)\]")
        .expect("Invalid section header regex");
    static ref ROLE_PREFIX: Regex =
        Regex::new(r"(?im)^\s*(?:user|assistant|system)\s*:\s*").expect("Invalid role prefix regex");
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").expect("Invalid whitespace regex");
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchResult {
    pub index: String,
    pub title: String,
    pub url: String,
    pub site_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct CardPayload {
    pub keywords: Vec<String>,
    pub results: Vec<SearchResult>,
}

impl CardPayload {
    /// Parse a raw card payload, normalizing keywords on the way in.
    pub fn parse(raw: &str) -> Result<Self> {
        let envelope: CardEnvelope = serde_json::from_str(raw)
            .map_err(|e| PrismError::Parse(format!("invalid card payload: {}", e)))?;

        let mut payload = CardPayload::default();
        let items = &envelope.card_info.card_items;

        if let Some(item) = items.iter().find(|i| i.kind_str() == CARD_KEYWORDS_TYPE) {
            let decoded = item
                .decoded_content()
                .map_err(|e| PrismError::Parse(format!("invalid card keywords: {}", e)))?;
            let raw_keywords: Vec<serde_json::Value> = serde_json::from_value(decoded)
                .map_err(|e| PrismError::Parse(format!("card keywords are not a list: {}", e)))?;
            payload.keywords = raw_keywords
                .iter()
                .filter_map(|k| match k {
                    serde_json::Value::String(s) => clean_keyword(s),
                    other => clean_keyword(&other.to_string()),
                })
                .collect();
        }

        if let Some(item) = items.iter().find(|i| i.kind_str() == CARD_RESULTS_TYPE) {
            let decoded = item
                .decoded_content()
                .map_err(|e| PrismError::Parse(format!("invalid card results: {}", e)))?;
            let raw_results: Vec<RawSearchResult> = serde_json::from_value(decoded)
                .map_err(|e| PrismError::Parse(format!("card results are not a list: {}", e)))?;
            payload.results = raw_results
                .into_iter()
                .enumerate()
                .map(|(pos, r)| SearchResult::from_raw(pos, r))
                .collect();
        }

        Ok(payload)
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.results.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::from("\n\n---\n\n");
        if !self.keywords.is_empty() {
            out.push_str(&format!("search keywords: {}\n", self.keywords.join("; ")));
        }
        for r in &self.results {
            match &r.site_name {
                Some(site) => out.push_str(&format!(
                    "[{}] [{}]({}) — source: {}\n",
                    r.index, r.title, r.url, site
                )),
                None => out.push_str(&format!("[{}] [{}]({})\n", r.index, r.title, r.url)),
            }
        }
        out
    }

    /// Dedup key: the result list, or the keywords for a results-less card.
    fn fingerprint(&self) -> Vec<u8> {
        let encoded = if self.results.is_empty() {
            serde_json::to_vec(&self.keywords)
        } else {
            serde_json::to_vec(&self.results)
        };
        let bytes = match encoded {
            Ok(b) => b,
            Err(_) => self.render().into_bytes(),
        };
        Sha256::digest(&bytes).to_vec()
    }
}

impl SearchResult {
    fn from_raw(position: usize, raw: RawSearchResult) -> Self {
        let index = match raw.id_index {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => (position + 1).to_string(),
        };
        let url = raw.url.unwrap_or_default();
        let title = match raw.name {
            Some(n) if !n.trim().is_empty() => n.trim().to_string(),
            _ => url.clone(),
        };
        Self {
            index,
            title,
            url,
            site_name: raw.site_name.filter(|s| !s.trim().is_empty()),
        }
    }
}

/// Strip prompt-formatting artifacts echoed back as search keywords.
pub fn clean_keyword(raw: &str) -> Option<String> {
    let stripped = SECTION_HEADER.replace_all(raw, " ");
    let stripped = ROLE_PREFIX.replace_all(&stripped, " ");
    let collapsed = WHITESPACE_RUN.replace_all(stripped.trim(), " ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.into_owned())
    }
}

/// Collects card renderings for one request, dropping repeats.
#[derive(Debug, Default)]
pub struct CardAggregator {
    seen: HashSet<Vec<u8>>,
    rendered: Vec<String>,
    dropped: usize,
}

impl CardAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the card was accepted for rendering.
    pub fn accept(&mut self, raw: &str) -> bool {
        let payload = match CardPayload::parse(raw) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("[⚙️ ] Skipping unparseable card: {}", e);
                self.dropped += 1;
                return false;
            }
        };

        if payload.is_empty() {
            tracing::debug!("[⚙️ ] Card carried no keywords or results");
            return false;
        }

        if !self.seen.insert(payload.fingerprint()) {
            tracing::info!(
                "[⚙️ ] Dropping duplicate card ({} results)",
                payload.results.len()
            );
            self.dropped += 1;
            return false;
        }

        self.rendered.push(payload.render());
        true
    }

    pub fn len(&self) -> usize {
        self.rendered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rendered.is_empty()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// All accepted renderings, concatenated in arrival order.
    pub fn take_markdown(&mut self) -> Option<String> {
        if self.rendered.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.rendered).concat())
    }
}
