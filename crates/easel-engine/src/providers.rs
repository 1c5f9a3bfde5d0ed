use std::collections::BTreeMap;
use std::io::Cursor;
use std::time::Duration;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use easel_contracts::classify::{classify, ErrorCategory};
use image::{ImageFormat, Rgb, RgbImage};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

pub const HF_INFERENCE_PROVIDER: &str = "hf-inference";
pub const DRYRUN_PROVIDER: &str = "dryrun";

const ERROR_BODY_MAX_CHARS: usize = 512;
const DRYRUN_IMAGE_SIZE: u32 = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextToImageRequest {
    pub prompt: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBytes {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Raw description of a failed remote call. Interpreting it is left to
/// [`RemoteFailure::category`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteFailure {
    pub provider: String,
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteFailure {
    pub fn new(provider: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            status,
            message: message.into(),
        }
    }

    fn transport(provider: &str, err: reqwest::Error) -> Self {
        // Without the URL: a port number in it could look like a status code
        // to the classifier.
        let err = anyhow::Error::new(err.without_url())
            .context(format!("{provider} request failed"));
        Self::new(provider, None, error_chain_text(&err, ERROR_BODY_MAX_CHARS))
    }

    pub fn category(&self) -> ErrorCategory {
        classify(&self.message)
    }
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn handles(&self, model: &str) -> bool;
    /// One best-effort attempt; never retried here.
    fn generate(&self, request: &TextToImageRequest) -> Result<ImageBytes, RemoteFailure>;
}

#[derive(Default)]
pub struct ImageProviderRegistry {
    providers: BTreeMap<String, Box<dyn ImageProvider>>,
}

impl ImageProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ImageProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn resolve(&self, model: &str) -> Option<&dyn ImageProvider> {
        self.providers
            .values()
            .find(|provider| provider.handles(model))
            .map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

impl std::fmt::Debug for ImageProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

pub fn default_provider_registry(
    api_base: &str,
    token: &str,
    timeout: Duration,
) -> anyhow::Result<ImageProviderRegistry> {
    let mut providers = ImageProviderRegistry::new();
    providers.register(DryrunProvider);
    providers.register(HfInferenceProvider::new(api_base, token, timeout)?);
    Ok(providers)
}

pub fn is_dryrun_model(model: &str) -> bool {
    model.trim().to_ascii_lowercase().starts_with(DRYRUN_PROVIDER)
}

/// Offline provider: a solid colour derived from the prompt.
pub struct DryrunProvider;

impl ImageProvider for DryrunProvider {
    fn name(&self) -> &str {
        DRYRUN_PROVIDER
    }

    fn handles(&self, model: &str) -> bool {
        is_dryrun_model(model)
    }

    fn generate(&self, request: &TextToImageRequest) -> Result<ImageBytes, RemoteFailure> {
        let (r, g, b) = color_from_prompt(&request.prompt);
        let image = RgbImage::from_pixel(DRYRUN_IMAGE_SIZE, DRYRUN_IMAGE_SIZE, Rgb([r, g, b]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|err| {
                RemoteFailure::new(DRYRUN_PROVIDER, None, format!("dryrun encode failed: {err}"))
            })?;
        Ok(ImageBytes {
            bytes,
            mime_type: Some("image/png".to_string()),
        })
    }
}

/// HuggingFace serverless inference, `POST <api_base>/<model>` with a bearer
/// token and `{"inputs": prompt}`.
pub struct HfInferenceProvider {
    api_base: String,
    token: String,
    http: HttpClient,
}

impl HfInferenceProvider {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("failed building HTTP client")?;
        Ok(Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            http,
        })
    }

    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/{}", self.api_base, model.trim().trim_start_matches('/'))
    }

    fn read_image(response: HttpResponse) -> Result<ImageBytes, RemoteFailure> {
        let code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default();
        let bytes = response
            .bytes()
            .map_err(|err| RemoteFailure::transport(HF_INFERENCE_PROVIDER, err))?
            .to_vec();

        let bytes = if content_type.starts_with("application/json") {
            let payload: Value = serde_json::from_slice(&bytes).map_err(|err| {
                RemoteFailure::new(
                    HF_INFERENCE_PROVIDER,
                    Some(code),
                    format!("{HF_INFERENCE_PROVIDER} returned invalid JSON payload: {err}"),
                )
            })?;
            decode_json_image(&payload).map_err(|err| {
                RemoteFailure::new(HF_INFERENCE_PROVIDER, Some(code), format!("{err:#}"))
            })?
        } else {
            bytes
        };
        verified_image(bytes, code, &content_type)
    }
}

/// Accepts only bytes that carry a known raster signature; the MIME type is
/// taken from the bytes, not the response header.
fn verified_image(bytes: Vec<u8>, code: u16, content_type: &str) -> Result<ImageBytes, RemoteFailure> {
    if bytes.is_empty() {
        return Err(RemoteFailure::new(
            HF_INFERENCE_PROVIDER,
            Some(code),
            format!("{HF_INFERENCE_PROVIDER} returned an empty image body"),
        ));
    }
    match image::guess_format(&bytes) {
        Ok(format) => Ok(ImageBytes {
            bytes,
            mime_type: Some(format.to_mime_type().to_string()),
        }),
        Err(_) => {
            let content_type = if content_type.is_empty() {
                "no content type"
            } else {
                content_type
            };
            Err(RemoteFailure::new(
                HF_INFERENCE_PROVIDER,
                Some(code),
                format!("{HF_INFERENCE_PROVIDER} returned a body that is not an image ({content_type})"),
            ))
        }
    }
}

impl ImageProvider for HfInferenceProvider {
    fn name(&self) -> &str {
        HF_INFERENCE_PROVIDER
    }

    fn handles(&self, model: &str) -> bool {
        !model.trim().is_empty() && !is_dryrun_model(model)
    }

    fn generate(&self, request: &TextToImageRequest) -> Result<ImageBytes, RemoteFailure> {
        let endpoint = self.endpoint(&request.model);
        log::debug!("POST {endpoint}");
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.token)
            .header(ACCEPT, "image/png")
            .json(&json!({ "inputs": request.prompt }))
            .send()
            .map_err(|err| RemoteFailure::transport(HF_INFERENCE_PROVIDER, err))?;

        let status = response.status();
        log::debug!("{HF_INFERENCE_PROVIDER} responded {}", status.as_u16());
        if !status.is_success() {
            let code = status.as_u16();
            let body = response.text().unwrap_or_default();
            return Err(RemoteFailure::new(
                HF_INFERENCE_PROVIDER,
                Some(code),
                format!(
                    "{HF_INFERENCE_PROVIDER} request failed ({code}): {}",
                    error_detail(&body)
                ),
            ));
        }
        Self::read_image(response)
    }
}

/// Prefers the service's `error` field; falls back to the raw body.
fn error_detail(body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|payload| {
            payload
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string());
    truncate_text(&detail, ERROR_BODY_MAX_CHARS)
}

fn decode_json_image(payload: &Value) -> anyhow::Result<Vec<u8>> {
    let image_b64 = payload
        .get("image")
        .or_else(|| payload.get("b64_json"))
        .or_else(|| {
            payload
                .as_array()
                .and_then(|rows| rows.first())
                .and_then(|row| row.get("image").or_else(|| row.get("b64_json")))
        })
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!("{HF_INFERENCE_PROVIDER} JSON response missing image bytes")
        })?;
    let image_b64 = image_b64
        .split_once(";base64,")
        .map(|(_, data)| data)
        .unwrap_or(image_b64);
    BASE64
        .decode(image_b64.as_bytes())
        .with_context(|| format!("{HF_INFERENCE_PROVIDER} image base64 decode failed"))
}

fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}
