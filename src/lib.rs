pub mod adapter;
pub mod cards;
pub mod constants;
pub mod emitter;
pub mod engine;
pub mod frame;
pub mod hardening;
pub mod health;
pub mod identity;
pub mod logging;
pub mod main_helper;
pub mod prompt;
pub mod redaction_layer;
pub mod segmenter;
pub mod sign;
pub mod specs;
pub mod str_utils;
pub mod streaming;
pub mod types;
pub mod upstream;

pub use types::*;

pub use main_helper::{AppState, Args};
