pub mod conversational;
pub mod flat;
pub mod openai;
