//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use framemood::{
    ClientOptions, Credential, FrameReader, FramemoodError, InferenceClient, RawResponse,
    Transport,
};
use image::{DynamicImage, RgbImage};
use serde_json::Value;

/// One recorded request.
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub url: String,
    pub authorization: String,
    pub payload: Value,
}

/// Replays a fixed script of responses and records every request.
///
/// Once the script runs out the last entry repeats.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Result<RawResponse, String>>>>,
    last: Arc<Mutex<Option<Result<RawResponse, String>>>>,
    pub sent: Arc<Mutex<Vec<SentRequest>>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<RawResponse, String>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn post_json(
        &self,
        url: &str,
        credential: &Credential,
        payload: &Value,
    ) -> Result<RawResponse, String> {
        self.sent.lock().unwrap().push(SentRequest {
            url: url.to_string(),
            authorization: credential.bearer(),
            payload: payload.clone(),
        });
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err("script exhausted".to_string())),
        }
    }
}

pub fn ok(body: &str) -> Result<RawResponse, String> {
    status(200, body)
}

pub fn loading() -> Result<RawResponse, String> {
    status(
        503,
        r#"{"error":"Model dima806/facial_emotions_image_detection is currently loading","estimated_time":20.0}"#,
    )
}

pub fn status(code: u16, body: &str) -> Result<RawResponse, String> {
    Ok(RawResponse {
        status: code,
        body: body.to_string(),
    })
}

/// Client over `transport` that records sleeps instead of blocking.
pub fn client(
    transport: ScriptedTransport,
    max_retries: u32,
    retry_delay: Duration,
) -> (InferenceClient<ScriptedTransport>, Arc<Mutex<Vec<Duration>>>) {
    let sleeps = Arc::new(Mutex::new(Vec::new()));
    let recorder = sleeps.clone();
    let options = ClientOptions::new()
        .with_endpoint("http://classifier.test/models/emotions")
        .with_max_retries(max_retries)
        .with_retry_delay(retry_delay);
    let client = InferenceClient::with_transport(transport, options)
        .with_sleeper(move |delay| recorder.lock().unwrap().push(delay));
    (client, sleeps)
}

/// In-memory video of `available` small frames claiming `total` frames.
pub struct MemoryVideo {
    pub total: u64,
    pub available: u64,
    decoded: u64,
}

impl MemoryVideo {
    pub fn new(total: u64) -> Self {
        Self::truncated(total, total)
    }

    pub fn truncated(total: u64, available: u64) -> Self {
        Self {
            total,
            available,
            decoded: 0,
        }
    }
}

impl FrameReader for MemoryVideo {
    fn total_frames(&self) -> u64 {
        self.total
    }

    fn advance(&mut self) -> Result<bool, FramemoodError> {
        if self.decoded >= self.available {
            return Err(FramemoodError::VideoDecodeError("truncated stream".to_string()));
        }
        self.decoded += 1;
        Ok(true)
    }

    fn current_image(&mut self) -> Result<DynamicImage, FramemoodError> {
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            16,
            16,
            image::Rgb([120, 80, 40]),
        )))
    }
}
