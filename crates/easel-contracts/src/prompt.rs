use serde::{Deserialize, Serialize};

use crate::error::ContractError;
use crate::styles::StyleCatalog;

/// One form submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub raw_prompt: String,
    pub style_name: Option<String>,
    pub apply_style: bool,
}

impl GenerationRequest {
    pub fn new(raw_prompt: impl Into<String>, style_name: Option<String>, apply_style: bool) -> Self {
        Self {
            raw_prompt: raw_prompt.into(),
            style_name,
            apply_style,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalPrompt {
    pub text: String,
    /// Modifier that was appended, if any.
    pub modifier: Option<String>,
}

impl FinalPrompt {
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl std::fmt::Display for FinalPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PromptComposer<'a> {
    catalog: &'a StyleCatalog,
}

impl<'a> PromptComposer<'a> {
    pub fn new(catalog: &'a StyleCatalog) -> Self {
        Self { catalog }
    }

    /// An unresolvable style name is skipped, not reported.
    pub fn compose(
        &self,
        raw_prompt: &str,
        style_name: Option<&str>,
        apply_style: bool,
    ) -> Result<FinalPrompt, ContractError> {
        if raw_prompt.trim().is_empty() {
            return Err(ContractError::EmptyPrompt);
        }
        let modifier = if apply_style {
            style_name.and_then(|name| self.catalog.lookup(name).ok())
        } else {
            None
        };
        let text = match modifier {
            Some(modifier) => format!("{raw_prompt}, {modifier}"),
            None => raw_prompt.to_string(),
        };
        Ok(FinalPrompt {
            text,
            modifier: modifier.map(str::to_string),
        })
    }

    pub fn compose_request(&self, request: &GenerationRequest) -> Result<FinalPrompt, ContractError> {
        self.compose(
            &request.raw_prompt,
            request.style_name.as_deref(),
            request.apply_style,
        )
    }
}
