//! Review Assist — marketplace review auto-responder.
//!
//! Polls the seller API for unanswered customer reviews, generates a reply
//! through an LLM completion backend, posts it back, and records the outcome
//! in a local ledger so each review is answered at most once.

pub mod config;
pub mod error;
pub mod ledger;
pub mod llm;
pub mod marketplace;
pub mod pipeline;
pub mod responder;
