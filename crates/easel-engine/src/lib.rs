pub mod config;
pub mod export;
pub mod providers;

use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Result};
use easel_contracts::classify::ErrorCategory;
use easel_contracts::download::DownloadKind;
use easel_contracts::events::EventWriter;
use easel_contracts::history::{GenerationResult, HistoryStore};
use easel_contracts::prompt::{FinalPrompt, GenerationRequest, PromptComposer};
use easel_contracts::styles::StyleCatalog;
use easel_contracts::ContractError;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

pub use config::{ConfigError, Settings};
pub use export::{ensure_png, save_png, PngImage, SavedImage};
pub use providers::{
    DryrunProvider, HfInferenceProvider, ImageBytes, ImageProvider, ImageProviderRegistry,
    RemoteFailure, TextToImageRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationPhase {
    Idle,
    Composing,
    AwaitingRemote,
    Succeeded,
    Failed,
}

impl GenerationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Composing => "composing",
            Self::AwaitingRemote => "awaiting_remote",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    fn can_enter(self, next: GenerationPhase) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Composing)
                | (Self::Composing, Self::AwaitingRemote)
                | (Self::Composing, Self::Idle)
                | (Self::AwaitingRemote, Self::Succeeded)
                | (Self::AwaitingRemote, Self::Failed)
                | (Self::Succeeded, Self::Idle)
                | (Self::Failed, Self::Idle)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Local validation failed; nothing was sent.
    #[error(transparent)]
    Rejected(#[from] ContractError),

    #[error("no image provider handles model '{0}'")]
    NoProvider(String),

    #[error("{failure}")]
    Remote {
        category: ErrorCategory,
        failure: RemoteFailure,
    },
}

impl GenerationError {
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Remote { category, .. } => Some(*category),
            _ => None,
        }
    }
}

/// Session state behind the form: composes prompts, makes the remote call,
/// and owns the history. Submissions take `&mut self`, so one session never
/// has two calls in flight.
pub struct Studio {
    catalog: StyleCatalog,
    providers: ImageProviderRegistry,
    model: String,
    history: HistoryStore,
    phase: GenerationPhase,
    events: Option<EventWriter>,
    last_final_prompt: Option<FinalPrompt>,
}

impl Studio {
    pub fn new(
        catalog: StyleCatalog,
        providers: ImageProviderRegistry,
        model: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            providers,
            model: model.into(),
            history: HistoryStore::new(),
            phase: GenerationPhase::Idle,
            events: None,
            last_final_prompt: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self.emit(
            "session_started",
            json!({
                "model": self.model,
                "styles": self.catalog.names(),
                "providers": self.providers.names(),
            }),
        );
        self
    }

    pub fn catalog(&self) -> &StyleCatalog {
        &self.catalog
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn phase(&self) -> GenerationPhase {
        self.phase
    }

    pub fn last_final_prompt(&self) -> Option<&FinalPrompt> {
        self.last_final_prompt.as_ref()
    }

    pub fn compose(&self, request: &GenerationRequest) -> Result<FinalPrompt, ContractError> {
        PromptComposer::new(&self.catalog).compose_request(request)
    }

    /// Runs one submission end to end. On success the new entry is already
    /// at the front of the history.
    pub fn submit(
        &mut self,
        request: &GenerationRequest,
    ) -> Result<&GenerationResult, GenerationError> {
        self.transition(GenerationPhase::Composing);
        let final_prompt = match self.compose(request) {
            Ok(prompt) => prompt,
            Err(err) => {
                self.transition(GenerationPhase::Idle);
                return Err(err.into());
            }
        };
        self.last_final_prompt = Some(final_prompt.clone());

        let Some(provider) = self.providers.resolve(&self.model) else {
            advance_phase(&mut self.phase, self.events.as_ref(), GenerationPhase::Idle);
            return Err(GenerationError::NoProvider(self.model.clone()));
        };

        let remote_request = TextToImageRequest {
            prompt: final_prompt.text.clone(),
            model: self.model.clone(),
        };
        advance_phase(
            &mut self.phase,
            self.events.as_ref(),
            GenerationPhase::AwaitingRemote,
        );
        let started = Instant::now();
        let outcome = provider.generate(&remote_request);
        let elapsed_s = started.elapsed().as_secs_f64();

        match outcome {
            Ok(image) => {
                self.transition(GenerationPhase::Succeeded);
                let result = GenerationResult::new(
                    image.bytes,
                    request,
                    final_prompt.text,
                    self.model.clone(),
                );
                log::info!(
                    "generated {} bytes with {} in {:.1}s",
                    result.image_bytes.len(),
                    result.model,
                    elapsed_s
                );
                self.emit(
                    "generation_succeeded",
                    json!({
                        "entry_id": result.id,
                        "model": result.model,
                        "final_prompt": result.final_prompt,
                        "style": result.style_name,
                        "mime_type": image.mime_type,
                        "bytes": result.image_bytes.len(),
                        "image_sha256": sha256_hex(&result.image_bytes),
                        "latency_s": elapsed_s,
                        "evicts_oldest": self.history.is_full(),
                    }),
                );
                let entry = self.history.insert(result);
                advance_phase(&mut self.phase, self.events.as_ref(), GenerationPhase::Idle);
                Ok(entry)
            }
            Err(failure) => {
                self.transition(GenerationPhase::Failed);
                let category = failure.category();
                log::warn!("generation failed ({category}): {failure}");
                self.emit(
                    "generation_failed",
                    json!({
                        "model": self.model,
                        "provider": failure.provider,
                        "status": failure.status,
                        "category": category.as_str(),
                        "message": failure.message,
                        "latency_s": elapsed_s,
                    }),
                );
                self.transition(GenerationPhase::Idle);
                Err(GenerationError::Remote { category, failure })
            }
        }
    }

    /// Rebuilds the request that produced history entry `index`.
    pub fn reuse_request(&self, index: usize) -> Option<GenerationRequest> {
        self.history.get(index).map(GenerationResult::request)
    }

    pub fn clear_history(&mut self) {
        let cleared = self.history.len();
        self.history.clear();
        self.emit("history_cleared", json!({ "cleared": cleared }));
    }

    /// Saves the newest image under the primary download name, or history
    /// entry `index` under the history name.
    pub fn save(&self, index: Option<usize>, dir: &Path) -> Result<SavedImage> {
        let (entry, kind) = match index {
            Some(index) => (
                self.history
                    .get(index)
                    .ok_or_else(|| anyhow!("no history entry at index {index}"))?,
                DownloadKind::HistoryItem,
            ),
            None => (
                self.history
                    .latest()
                    .ok_or_else(|| anyhow!("nothing generated yet"))?,
                DownloadKind::Primary,
            ),
        };
        let saved = save_png(entry, kind, dir)?;
        self.emit(
            "image_saved",
            json!({
                "entry_id": entry.id,
                "path": saved.path.to_string_lossy(),
                "width": saved.width,
                "height": saved.height,
                "reencoded": saved.reencoded,
            }),
        );
        Ok(saved)
    }

    fn transition(&mut self, next: GenerationPhase) {
        advance_phase(&mut self.phase, self.events.as_ref(), next);
    }

    fn emit(&self, event_type: &str, payload: Value) {
        emit_event(self.events.as_ref(), event_type, payload);
    }
}

fn advance_phase(phase: &mut GenerationPhase, events: Option<&EventWriter>, next: GenerationPhase) {
    let previous = *phase;
    debug_assert!(
        previous.can_enter(next),
        "illegal phase change {} -> {}",
        previous.as_str(),
        next.as_str()
    );
    *phase = next;
    log::debug!("phase {} -> {}", previous.as_str(), next.as_str());
    emit_event(
        events,
        "phase_changed",
        json!({ "from": previous.as_str(), "to": next.as_str() }),
    );
}

/// Event log failures are logged and otherwise ignored.
fn emit_event(events: Option<&EventWriter>, event_type: &str, payload: Value) {
    let Some(events) = events else {
        return;
    };
    if let Err(err) = events.emit(event_type, map_object(payload)) {
        log::warn!("failed writing {event_type} event: {err:#}");
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use easel_contracts::history::HISTORY_CAPACITY;

    use super::*;

    fn dryrun_studio() -> Studio {
        let mut providers = ImageProviderRegistry::new();
        providers.register(DryrunProvider);
        Studio::new(StyleCatalog::default(), providers, "dryrun-image-1")
    }

    fn event_types(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    #[test]
    fn submit_records_result_and_returns_to_idle() -> anyhow::Result<()> {
        let mut studio = dryrun_studio();
        let request = GenerationRequest::new("boat", Some("Sketch".to_string()), true);
        let result = studio.submit(&request)?;
        assert_eq!(result.raw_prompt, "boat");
        assert_eq!(
            result.final_prompt,
            "boat, pencil sketch, hand drawn, artistic sketch, detailed linework"
        );
        assert_eq!(result.model, "dryrun-image-1");
        assert_eq!(studio.phase(), GenerationPhase::Idle);
        assert_eq!(studio.history().len(), 1);
        assert_eq!(
            studio.last_final_prompt().map(FinalPrompt::as_str),
            Some("boat, pencil sketch, hand drawn, artistic sketch, detailed linework")
        );
        Ok(())
    }

    #[test]
    fn empty_prompt_never_reaches_provider() {
        let mut studio = dryrun_studio();
        let err = studio
            .submit(&GenerationRequest::new("   ", Some("Anime".to_string()), true))
            .err();
        assert!(matches!(
            err,
            Some(GenerationError::Rejected(ContractError::EmptyPrompt))
        ));
        assert!(studio.history().is_empty());
        assert_eq!(studio.phase(), GenerationPhase::Idle);
        assert!(studio.last_final_prompt().is_none());
    }

    #[test]
    fn unknown_model_reports_no_provider() {
        let mut studio = dryrun_studio();
        studio.set_model("black-forest-labs/FLUX.1-schnell");
        let err = studio
            .submit(&GenerationRequest::new("boat", None, false))
            .err();
        assert!(matches!(err, Some(GenerationError::NoProvider(model)) if model == "black-forest-labs/FLUX.1-schnell"));
        assert!(studio.history().is_empty());
    }

    #[test]
    fn history_is_capped_across_submissions() -> anyhow::Result<()> {
        let mut studio = dryrun_studio();
        for idx in 0..(HISTORY_CAPACITY + 2) {
            studio.submit(&GenerationRequest::new(format!("boat {idx}"), None, false))?;
        }
        assert_eq!(studio.history().len(), HISTORY_CAPACITY);
        assert_eq!(
            studio.history().latest().map(|row| row.raw_prompt.as_str()),
            Some("boat 11")
        );
        assert_eq!(
            studio.history().get(HISTORY_CAPACITY - 1).map(|row| row.raw_prompt.as_str()),
            Some("boat 2")
        );
        Ok(())
    }

    #[test]
    fn reuse_request_restores_style_flag() -> anyhow::Result<()> {
        let mut studio = dryrun_studio();
        studio.submit(&GenerationRequest::new("plain", Some("Anime".to_string()), false))?;
        studio.submit(&GenerationRequest::new("styled", Some("Anime".to_string()), true))?;
        assert_eq!(
            studio.reuse_request(0),
            Some(GenerationRequest::new("styled", Some("Anime".to_string()), true))
        );
        assert_eq!(
            studio.reuse_request(1),
            Some(GenerationRequest::new("plain", Some("Anime".to_string()), false))
        );
        assert_eq!(studio.reuse_request(2), None);

        studio.submit(&GenerationRequest::new("unstyled", Some("Vaporwave".to_string()), true))?;
        assert_eq!(
            studio.reuse_request(0),
            Some(GenerationRequest::new("unstyled", Some("Vaporwave".to_string()), true))
        );
        Ok(())
    }

    #[test]
    fn save_writes_primary_and_history_names() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut studio = dryrun_studio();
        assert!(studio.save(None, temp.path()).is_err());

        studio.submit(&GenerationRequest::new("boat", None, false))?;
        let primary = studio.save(None, temp.path())?;
        let history = studio.save(Some(0), temp.path())?;
        let primary_name = primary.path.file_name().and_then(|name| name.to_str()).unwrap_or("");
        let history_name = history.path.file_name().and_then(|name| name.to_str()).unwrap_or("");
        assert!(primary_name.starts_with("ai_generated_") && primary_name.ends_with(".png"));
        assert!(history_name.starts_with("ai_img_") && history_name.ends_with(".png"));
        assert!(!primary.reencoded);
        assert!(studio.save(Some(1), temp.path()).is_err());
        Ok(())
    }

    #[test]
    fn clear_history_empties_store() -> anyhow::Result<()> {
        let mut studio = dryrun_studio();
        studio.submit(&GenerationRequest::new("boat", None, false))?;
        studio.clear_history();
        assert!(studio.history().is_empty());
        assert_eq!(studio.history().all().count(), 0);
        Ok(())
    }

    #[test]
    fn events_follow_phase_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let mut studio = dryrun_studio().with_events(EventWriter::new(&events_path, "session-1"));
        studio.submit(&GenerationRequest::new("boat", Some("Anime".to_string()), true))?;
        studio.clear_history();

        let types = event_types(&events_path);
        assert_eq!(types.first().map(String::as_str), Some("session_started"));
        let succeeded = types
            .iter()
            .position(|value| value == "generation_succeeded")
            .expect("missing generation_succeeded");
        let cleared = types
            .iter()
            .position(|value| value == "history_cleared")
            .expect("missing history_cleared");
        assert!(succeeded < cleared);
        assert_eq!(types.iter().filter(|value| *value == "phase_changed").count(), 4);
        Ok(())
    }

    #[test]
    fn phase_table_rejects_skipping_states() {
        assert!(GenerationPhase::Idle.can_enter(GenerationPhase::Composing));
        assert!(GenerationPhase::Composing.can_enter(GenerationPhase::Idle));
        assert!(!GenerationPhase::Idle.can_enter(GenerationPhase::AwaitingRemote));
        assert!(!GenerationPhase::Succeeded.can_enter(GenerationPhase::Failed));
        assert!(!GenerationPhase::Failed.can_enter(GenerationPhase::Composing));
    }
}
