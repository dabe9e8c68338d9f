//! Language-model provider implementations for SupportDesk.
//!
//! The chat and embedding client implements `supportdesk_core::Provider`;
//! [`RetryPolicy`] bounds every call made through it.

pub mod openai_compat;
pub mod retry;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryPolicy;
