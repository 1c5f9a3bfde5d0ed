use std::collections::VecDeque;

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::prompt::GenerationRequest;

pub const HISTORY_CAPACITY: usize = 10;

/// A successful generation. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub id: String,
    pub image_bytes: Vec<u8>,
    pub raw_prompt: String,
    pub final_prompt: String,
    pub style_name: Option<String>,
    pub apply_style: bool,
    pub model: String,
    pub created_at: DateTime<Local>,
}

impl GenerationResult {
    pub fn new(
        image_bytes: Vec<u8>,
        request: &GenerationRequest,
        final_prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            image_bytes,
            raw_prompt: request.raw_prompt.clone(),
            final_prompt: final_prompt.into(),
            style_name: request.style_name.clone(),
            apply_style: request.apply_style,
            model: model.into(),
            created_at: Local::now(),
        }
    }

    /// The request that produced this entry, as submitted.
    pub fn request(&self) -> GenerationRequest {
        GenerationRequest::new(
            self.raw_prompt.clone(),
            self.style_name.clone(),
            self.apply_style,
        )
    }
}

/// Newest-first record of past generations, capped at [`HISTORY_CAPACITY`].
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    entries: VecDeque<GenerationResult>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `result` as the newest entry, dropping whatever falls past
    /// the capacity.
    pub fn insert(&mut self, result: GenerationResult) -> &GenerationResult {
        self.entries.push_front(result);
        self.entries.truncate(HISTORY_CAPACITY);
        &self.entries[0]
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= HISTORY_CAPACITY
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn all(&self) -> impl ExactSizeIterator<Item = &GenerationResult> {
        self.entries.iter()
    }

    /// `0` is the newest entry.
    pub fn get(&self, index: usize) -> Option<&GenerationResult> {
        self.entries.get(index)
    }

    pub fn latest(&self) -> Option<&GenerationResult> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
