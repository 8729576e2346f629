//! Remote emotion classification.
//!
//! [`InferenceClient::classify`] compresses one frame to JPEG, posts it as
//! base64 to the classification endpoint and turns whatever comes back into
//! an [`InferenceResult`]. A `503` whose body says the model is still loading
//! is retried after a constant delay, up to a fixed number of requests; every
//! other failure is reported on the first response.
//!
//! The HTTP layer sits behind the [`Transport`] trait so the retry policy can
//! be driven without a network.
//!
//! # Example
//!
//! ```no_run
//! use framemood::{ClientOptions, Credential, InferenceClient};
//!
//! let client = InferenceClient::new(ClientOptions::default())?;
//! let image = image::open("face.png")?;
//! let result = client.classify(&image, &Credential::new("hf_xxx"));
//! println!("{result:?}");
//! # Ok::<(), framemood::FramemoodError>(())
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    io::Cursor,
    time::Duration,
};

use base64::Engine;
use image::{DynamicImage, codecs::jpeg::JpegEncoder};
use reqwest::{blocking::Client, header::AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{FramemoodError, InferenceFailure};

/// Hosted facial-emotion model used when no endpoint is configured.
pub const DEFAULT_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/dima806/facial_emotions_image_detection";

/// Body text the endpoint uses while the model is cold.
pub const DEFAULT_LOADING_MARKER: &str = "currently loading";

const JPEG_QUALITY: u8 = 95;

/// One `(label, score)` pair as returned by the endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    /// Class name, e.g. `"happy"`.
    pub label: String,
    /// Probability in `[0, 1]`.
    pub score: f64,
}

/// Outcome of classifying one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceResult {
    /// Scores in the order the endpoint returned them.
    Success(Vec<LabelScore>),
    /// The frame could not be classified.
    Failure(InferenceFailure),
}

impl InferenceResult {
    /// `true` for [`InferenceResult::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, InferenceResult::Success(_))
    }
}

/// Bearer token for the endpoint. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// `true` when no token was supplied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("Credential(***)")
    }
}

/// Status and body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Body decoded as text.
    pub body: String,
}

/// Something that can POST a JSON body and hand back the raw response.
///
/// An `Err` means no response was received at all; its message becomes
/// [`InferenceFailure::TransportException`].
pub trait Transport {
    /// Send `payload` to `url` with the credential as bearer authorization.
    fn post_json(
        &self,
        url: &str,
        credential: &Credential,
        payload: &Value,
    ) -> Result<RawResponse, String>;
}

/// [`Transport`] backed by a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    /// Build a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FramemoodError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| FramemoodError::HttpClient(error.to_string()))?;
        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    fn post_json(
        &self,
        url: &str,
        credential: &Credential,
        payload: &Value,
    ) -> Result<RawResponse, String> {
        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, credential.bearer())
            .json(payload)
            .send()
            .map_err(|error| error.to_string())?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|error| error.to_string())?;
        Ok(RawResponse { status, body })
    }
}

/// Endpoint, retry and timeout settings for [`InferenceClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Classification URL.
    pub endpoint: String,
    /// Maximum number of requests per frame while the model is loading.
    pub max_retries: u32,
    /// Constant pause between two loading responses.
    pub retry_delay: Duration,
    /// Per-request timeout for the HTTP transport.
    pub timeout: Duration,
    /// Substring of a `503` body that marks the model as still loading.
    pub loading_marker: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_retries: 3,
            retry_delay: Duration::from_secs(20),
            timeout: Duration::from_secs(60),
            loading_marker: DEFAULT_LOADING_MARKER.to_string(),
        }
    }
}

impl ClientOptions {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the classification URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the request budget for a loading model. Zero sends nothing.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the pause between loading responses.
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Change the text that identifies a loading response.
    #[must_use]
    pub fn with_loading_marker(mut self, marker: impl Into<String>) -> Self {
        self.loading_marker = marker.into();
        self
    }
}

type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Classifies frames against the remote endpoint with bounded retry.
pub struct InferenceClient<T = HttpTransport> {
    transport: T,
    options: ClientOptions,
    sleeper: Sleeper,
}

impl<T> Debug for InferenceClient<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("InferenceClient")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl InferenceClient<HttpTransport> {
    /// Client over HTTPS with the given options.
    pub fn new(options: ClientOptions) -> Result<Self, FramemoodError> {
        let transport = HttpTransport::new(options.timeout)?;
        Ok(Self::with_transport(transport, options))
    }
}

impl<T: Transport> InferenceClient<T> {
    /// Client over an arbitrary transport.
    pub fn with_transport(transport: T, options: ClientOptions) -> Self {
        Self {
            transport,
            options,
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replace the blocking sleep used between retries.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Settings in effect.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Classify one image. Never panics and never returns early with `Err`:
    /// every failure is folded into [`InferenceResult::Failure`].
    pub fn classify(&self, image: &DynamicImage, credential: &Credential) -> InferenceResult {
        let encoded = match encode_image(image) {
            Ok(encoded) => encoded,
            Err(failure) => {
                log::warn!("{failure}");
                return InferenceResult::Failure(failure);
            }
        };
        let payload = json!({ "inputs": encoded });
        self.request(&payload, credential)
    }

    fn request(&self, payload: &Value, credential: &Credential) -> InferenceResult {
        let max_retries = self.options.max_retries;
        let mut attempts = 0;

        while attempts < max_retries {
            let response =
                match self
                    .transport
                    .post_json(&self.options.endpoint, credential, payload)
                {
                    Ok(response) => response,
                    Err(message) => {
                        log::warn!("Request to classification endpoint failed: {message}");
                        return InferenceResult::Failure(InferenceFailure::TransportException(
                            message,
                        ));
                    }
                };
            attempts += 1;

            match response.status {
                200 => return parse_scores(response),
                503 if response.body.contains(&self.options.loading_marker) => {
                    if attempts < max_retries {
                        log::info!(
                            "Model is loading, retrying in {:?} (attempt {attempts}/{max_retries})",
                            self.options.retry_delay
                        );
                        (self.sleeper)(self.options.retry_delay);
                    }
                }
                status => {
                    log::warn!(
                        "Classification endpoint returned {status}: {}",
                        response.body
                    );
                    return InferenceResult::Failure(InferenceFailure::HttpError {
                        status,
                        body: response.body,
                    });
                }
            }
        }

        log::warn!("Model still loading after {attempts} attempts, giving up on this frame");
        InferenceResult::Failure(InferenceFailure::TransientUnavailable { attempts })
    }
}

/// Success bodies come either flat or wrapped in a one-element batch.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScoresBody {
    Flat(Vec<LabelScore>),
    Batched(Vec<Vec<LabelScore>>),
}

fn parse_scores(response: RawResponse) -> InferenceResult {
    match serde_json::from_str::<ScoresBody>(&response.body) {
        Ok(ScoresBody::Flat(scores)) => InferenceResult::Success(scores),
        Ok(ScoresBody::Batched(batches)) => {
            InferenceResult::Success(batches.into_iter().next().unwrap_or_default())
        }
        Err(error) => {
            log::warn!("Unparseable classification response ({error}): {}", response.body);
            InferenceResult::Failure(InferenceFailure::HttpError {
                status: response.status,
                body: response.body,
            })
        }
    }
}

/// JPEG-compress an image and return it base64 encoded.
pub fn encode_image(image: &DynamicImage) -> Result<String, InferenceFailure> {
    if image.width() == 0 || image.height() == 0 {
        return Err(InferenceFailure::EncodeError(format!(
            "image has empty dimensions {}x{}",
            image.width(),
            image.height()
        )));
    }

    let rgb = image.to_rgb8();
    let mut jpeg = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|error| InferenceFailure::EncodeError(error.to_string()))?;

    Ok(base64::engine::general_purpose::STANDARD.encode(jpeg.into_inner()))
}
