//! Reply generation — tier-specific prompts with a canned fallback.
//!
//! `generate_reply` never fails: backend errors and empty completions
//! degrade to the rating tier's canned reply, so the pipeline always has a
//! non-empty text to post and needs no separate generation-failure branch.

use std::sync::Arc;

use tracing::warn;

use crate::llm::{CompletionRequest, TextGenerator};
use crate::marketplace::Review;

/// Output cap for a reply (the prompt targets 50-150 words).
const REPLY_MAX_TOKENS: u32 = 200;
/// Sampling temperature for replies.
const REPLY_TEMPERATURE: f32 = 0.7;

const SYSTEM_PROMPT: &str = "You are a professional customer service representative for an \
     online marketplace seller. Generate helpful, empathetic, and human-like responses to \
     customer reviews. Keep responses concise (50-150 words), professional, and focused on \
     customer satisfaction.";

/// Rating-derived bucket driving prompt and fallback selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingTier {
    Positive,
    Neutral,
    Negative,
}

impl RatingTier {
    /// Positive is 4 and up, neutral is exactly 3, negative is 2 and below.
    pub fn from_rating(rating: u8) -> Self {
        if rating >= 4 {
            Self::Positive
        } else if rating >= 3 {
            Self::Neutral
        } else {
            Self::Negative
        }
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }

    /// Canned reply used when generation fails.
    pub fn fallback_text(&self) -> &'static str {
        match self {
            Self::Positive => {
                "Thank you for your positive review! We're delighted that you're satisfied \
                 with your purchase. We look forward to serving you again!"
            }
            Self::Neutral => {
                "Thank you for your feedback. We appreciate your review and are always \
                 working to improve our products and service."
            }
            Self::Negative => {
                "Thank you for your feedback. We sincerely apologize for any inconvenience. \
                 Please contact our customer service team so we can resolve this issue for you."
            }
        }
    }
}

/// A reply ready to post. Always carries non-empty text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Text produced by the generation backend.
    Generated(String),
    /// Canned tier reply used because the backend failed.
    Fallback(String),
}

impl ReplyOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Generated(text) | Self::Fallback(text) => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// Turns a review into reply text via the generation backend.
pub struct Responder {
    generator: Arc<dyn TextGenerator>,
}

impl Responder {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Generate a reply for a review.
    ///
    /// Builds the tier-specific prompt, runs one bounded completion, and
    /// trims the result. Any backend error or empty completion yields the
    /// tier's canned fallback instead of an error.
    pub async fn generate_reply(&self, review: &Review) -> ReplyOutcome {
        let tier = RatingTier::from_rating(review.rating);
        let request = CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_reply_prompt(tier, review),
            max_tokens: REPLY_MAX_TOKENS,
            temperature: REPLY_TEMPERATURE,
        };

        match self.generator.generate(request).await {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    warn!(review_id = %review.id, tier = tier.label(), "Empty completion, using fallback reply");
                    ReplyOutcome::Fallback(tier.fallback_text().to_string())
                } else {
                    ReplyOutcome::Generated(trimmed.to_string())
                }
            }
            Err(e) => {
                warn!(
                    review_id = %review.id,
                    tier = tier.label(),
                    error = %e,
                    "Reply generation failed, using fallback reply"
                );
                ReplyOutcome::Fallback(tier.fallback_text().to_string())
            }
        }
    }
}

/// Build the tier-specific user prompt. Pure — no I/O.
fn build_reply_prompt(tier: RatingTier, review: &Review) -> String {
    let mut prompt = String::with_capacity(512);

    prompt.push_str(&format!(
        "Customer left a {} review (rating: {}/5):\n\"{}\"\n\n",
        tier.label(),
        review.rating,
        review.text
    ));

    match tier {
        RatingTier::Positive => {
            prompt.push_str(
                "Generate a grateful response that:\n\
                 - Thanks the customer for their positive feedback\n\
                 - Encourages them to shop again\n\
                 - Is warm and appreciative\n",
            );
        }
        RatingTier::Neutral => {
            prompt.push_str(
                "Generate a helpful response that:\n\
                 - Acknowledges their feedback\n\
                 - Offers assistance if needed\n\
                 - Shows commitment to improvement\n",
            );
        }
        RatingTier::Negative => {
            prompt.push_str(
                "Generate an empathetic response that:\n\
                 - Acknowledges their concerns\n\
                 - Apologizes for any inconvenience\n\
                 - Offers to resolve the issue\n\
                 - Provides contact information if needed\n",
            );
        }
    }

    prompt.push_str(&format!("Product SKU: {}", review.sku));
    prompt
}
