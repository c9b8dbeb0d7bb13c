//! Protocol module for chat-completion request structures
//!
//! These structures model only what the proxy needs to read or rewrite; all
//! other fields are carried through untouched.

pub mod types;

pub use types::{
    ChatRequest, Message, ModelInfo, ModelList, ROLE_ASSISTANT, ROLE_SYSTEM, ROLE_USER,
};
