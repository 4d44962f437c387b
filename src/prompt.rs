//! Request shaping for the conversational upstream, which takes one question
//! string instead of a message list.

use crate::constants::ONLINE_SUFFIXES;
use crate::types::{ChatMessage, Role};

const REASONING_MODEL: &str = "DeepSeek-R1";
const DEEPSEEK_ALIASES: &[&str] = &["DeepSeek-R1", "DeepSeek-V3"];

/// Flatten a message list into `[System Prompt]` / `[Chat History]` / `[Question]` sections.
pub fn build_full_prompt(messages: &[ChatMessage]) -> String {
    let mut system_prompt: Option<&str> = None;
    let mut history: Vec<String> = Vec::new();
    let mut last_user = "";

    for msg in messages {
        match msg.role {
            Role::System if system_prompt.is_none() => system_prompt = Some(&msg.content),
            Role::User => {
                history.push(format!("user: {}", msg.content));
                last_user = &msg.content;
            }
            Role::Assistant => history.push(format!("assistant: {}", msg.content)),
            _ => {}
        }
    }

    let mut sections = Vec::new();
    if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
        sections.push(format!("[System Prompt]\n{}", system));
    }
    if history.len() > 1 {
        sections.push(format!(
            "[Chat History]\n{}",
            history[..history.len() - 1].join("\n")
        ));
    }
    sections.push(format!("[Question]\n{}", last_user));
    sections.join("\n\n")
}

/// Upstream model id for a caller-facing model name
pub fn map_model(model: &str) -> &str {
    if DEEPSEEK_ALIASES.contains(&model) {
        "deepseek"
    } else {
        model
    }
}

/// `deep` for the reasoning model, `online` when the trailing message asks for web search.
pub fn user_action(model: &str, last_message: &str) -> String {
    let deep = model == REASONING_MODEL;
    let trimmed = last_message.trim();
    let online = ONLINE_SUFFIXES.iter().any(|s| trimmed.ends_with(s));

    match (deep, online) {
        (true, true) => "deep,online".to_string(),
        (true, false) => "deep".to_string(),
        (false, true) => "online".to_string(),
        (false, false) => String::new(),
    }
}
