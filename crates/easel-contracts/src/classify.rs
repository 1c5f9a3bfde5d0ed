//! Maps a raw upstream failure message onto a user-facing category.
//!
//! The inference service does not return structured error codes we can rely
//! on, so this is substring matching over the rendered message. Any wording
//! change upstream falls through to [`ErrorCategory::Unknown`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Unauthorized,
    RateLimited,
    ModelLoading,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::ModelLoading => "model_loading",
            Self::Unknown => "unknown",
        }
    }

    pub fn headline(self) -> &'static str {
        match self {
            Self::Unauthorized => "Authentication failed!",
            Self::RateLimited => "Rate limit exceeded!",
            Self::ModelLoading => "Model is loading!",
            Self::Unknown => "Error generating image",
        }
    }

    pub fn guidance(self) -> &'static [&'static str] {
        match self {
            Self::Unauthorized => &[
                "Possible issues: invalid API token, missing permissions, or a revoked token.",
                "Go to https://huggingface.co/settings/tokens",
                "Create a token with Write permissions (or at minimum \"Make calls to the serverless Inference API\")",
                "Update HUGGINGFACE_TOKEN in your .env file with the new token",
            ],
            Self::RateLimited => &[
                "You've hit the API rate limit.",
                "Free tier has limited requests per hour",
                "Please wait a few minutes and try again",
                "Consider upgrading to HuggingFace Pro for higher limits",
            ],
            Self::ModelLoading => &[
                "The model is currently loading.",
                "This happens when the model hasn't been used recently",
                "Please wait 1-2 minutes and try again",
            ],
            Self::Unknown => &["Please try again or check your internet connection."],
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug)]
struct ClassifierRule {
    needles: &'static [&'static str],
    category: ErrorCategory,
}

/// Evaluated top to bottom; the first rule with a matching needle wins.
const RULES: &[ClassifierRule] = &[
    ClassifierRule {
        needles: &["401", "authentication"],
        category: ErrorCategory::Unauthorized,
    },
    ClassifierRule {
        needles: &["429", "rate limit"],
        category: ErrorCategory::RateLimited,
    },
    ClassifierRule {
        needles: &["503", "loading"],
        category: ErrorCategory::ModelLoading,
    },
];

pub fn classify(raw_message: &str) -> ErrorCategory {
    let lowered = raw_message.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.needles.iter().any(|needle| lowered.contains(needle)))
        .map(|rule| rule.category)
        .unwrap_or(ErrorCategory::Unknown)
}
