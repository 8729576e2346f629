//! Retry and failure classification for the inference client.
//!
//! Every test runs against a scripted transport, so no network is needed.

mod common;

use std::time::Duration;

use base64::Engine;
use framemood::{Credential, Emotion, InferenceFailure, InferenceResult, LabelScore, to_row};
use image::{DynamicImage, RgbImage};

use common::{ScriptedTransport, client, loading, ok, status};

fn frame() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(24, 24, image::Rgb([200, 180, 160])))
}

fn token() -> Credential {
    Credential::new("hf_test_token")
}

// ── success ────────────────────────────────────────────────────────

#[test]
fn success_returns_scores_in_response_order() {
    let transport = ScriptedTransport::new(vec![ok(
        r#"[{"label":"happy","score":0.9},{"label":"sad","score":0.1}]"#,
    )]);
    let (client, sleeps) = client(transport.clone(), 3, Duration::ZERO);

    let result = client.classify(&frame(), &token());
    assert_eq!(
        result,
        InferenceResult::Success(vec![
            LabelScore {
                label: "happy".to_string(),
                score: 0.9,
            },
            LabelScore {
                label: "sad".to_string(),
                score: 0.1,
            },
        ])
    );
    assert_eq!(transport.calls(), 1);
    assert!(sleeps.lock().unwrap().is_empty());
}

#[test]
fn request_carries_bearer_token_and_base64_jpeg() {
    let transport = ScriptedTransport::new(vec![ok("[]")]);
    let (client, _) = client(transport.clone(), 3, Duration::ZERO);
    client.classify(&frame(), &token());

    let sent = transport.sent.lock().unwrap();
    assert_eq!(sent[0].url, "http://classifier.test/models/emotions");
    assert_eq!(sent[0].authorization, "Bearer hf_test_token");

    let inputs = sent[0].payload["inputs"]
        .as_str()
        .expect("payload should hold a base64 string under `inputs`");
    let jpeg = base64::engine::general_purpose::STANDARD
        .decode(inputs)
        .expect("inputs should be valid base64");
    let decoded = image::load_from_memory(&jpeg).expect("inputs should decode as an image");
    assert_eq!((decoded.width(), decoded.height()), (24, 24));
}

// ── loading retries ────────────────────────────────────────────────

#[test]
fn loading_twice_then_success_makes_three_calls() {
    let transport = ScriptedTransport::new(vec![
        loading(),
        loading(),
        ok(r#"[{"label":"neutral","score":1.0}]"#),
    ]);
    let (client, sleeps) = client(transport.clone(), 3, Duration::ZERO);

    let result = client.classify(&frame(), &token());
    assert_eq!(transport.calls(), 3);
    assert_eq!(sleeps.lock().unwrap().len(), 2);

    let row = to_row(0, &result);
    assert_eq!(row.score(Emotion::Neutral), 1.0);
    for emotion in Emotion::ALL.into_iter().filter(|e| *e != Emotion::Neutral) {
        assert_eq!(row.score(emotion), 0.0);
    }
}

#[test]
fn perpetual_loading_is_bounded_by_max_retries() {
    for max_retries in 1..=5u32 {
        let transport = ScriptedTransport::new(vec![loading()]);
        let (client, _) = client(transport.clone(), max_retries, Duration::ZERO);

        let result = client.classify(&frame(), &token());
        assert_eq!(transport.calls(), max_retries as usize);
        assert_eq!(
            result,
            InferenceResult::Failure(InferenceFailure::TransientUnavailable {
                attempts: max_retries,
            })
        );
    }
}

#[test]
fn sleeps_use_the_configured_constant_delay() {
    let transport = ScriptedTransport::new(vec![loading()]);
    let delay = Duration::from_millis(1500);
    let (client, sleeps) = client(transport, 3, delay);

    client.classify(&frame(), &token());
    let sleeps = sleeps.lock().unwrap();
    assert!(!sleeps.is_empty());
    assert!(sleeps.len() < 3, "no pause after the final attempt");
    assert!(sleeps.iter().all(|slept| *slept == delay));
}

#[test]
fn zero_max_retries_never_calls_or_sleeps() {
    let transport = ScriptedTransport::new(vec![loading()]);
    let (client, sleeps) = client(transport.clone(), 0, Duration::ZERO);

    let result = client.classify(&frame(), &token());
    assert_eq!(transport.calls(), 0);
    assert!(sleeps.lock().unwrap().is_empty());
    assert!(matches!(
        result,
        InferenceResult::Failure(InferenceFailure::TransientUnavailable { attempts: 0 })
    ));
}

#[test]
fn service_unavailable_without_loading_text_is_not_retried() {
    let transport = ScriptedTransport::new(vec![status(503, "upstream overloaded")]);
    let (client, sleeps) = client(transport.clone(), 3, Duration::ZERO);

    let result = client.classify(&frame(), &token());
    assert_eq!(transport.calls(), 1);
    assert!(sleeps.lock().unwrap().is_empty());
    assert_eq!(
        result,
        InferenceResult::Failure(InferenceFailure::HttpError {
            status: 503,
            body: "upstream overloaded".to_string(),
        })
    );
}

// ── non-retryable failures ─────────────────────────────────────────

#[test]
fn server_error_returns_zero_row_after_one_call() {
    let transport = ScriptedTransport::new(vec![status(500, "server error")]);
    let (client, sleeps) = client(transport.clone(), 3, Duration::from_secs(20));

    let result = client.classify(&frame(), &token());
    assert_eq!(transport.calls(), 1);
    assert!(sleeps.lock().unwrap().is_empty());
    assert_eq!(to_row(0, &result).scores(), &[0.0; 7]);
}

#[test]
fn client_errors_never_sleep() {
    for code in [400u16, 401, 403, 404, 429] {
        let transport = ScriptedTransport::new(vec![status(code, "currently loading")]);
        let (client, sleeps) = client(transport.clone(), 3, Duration::from_secs(20));

        let result = client.classify(&frame(), &token());
        assert_eq!(transport.calls(), 1, "status {code}");
        assert!(sleeps.lock().unwrap().is_empty(), "status {code}");
        assert!(matches!(
            result,
            InferenceResult::Failure(InferenceFailure::HttpError { status, .. }) if status == code
        ));
    }
}

#[test]
fn transport_fault_is_not_retried() {
    let transport = ScriptedTransport::new(vec![Err("connection reset by peer".to_string())]);
    let (client, sleeps) = client(transport.clone(), 3, Duration::ZERO);

    let result = client.classify(&frame(), &token());
    assert_eq!(transport.calls(), 1);
    assert!(sleeps.lock().unwrap().is_empty());
    assert_eq!(
        result,
        InferenceResult::Failure(InferenceFailure::TransportException(
            "connection reset by peer".to_string()
        ))
    );
}

#[test]
fn unparseable_success_body_is_an_http_error() {
    let transport = ScriptedTransport::new(vec![ok(r#"{"unexpected":"shape"}"#)]);
    let (client, _) = client(transport, 3, Duration::ZERO);

    let result = client.classify(&frame(), &token());
    assert!(matches!(
        result,
        InferenceResult::Failure(InferenceFailure::HttpError { status: 200, .. })
    ));
}

#[test]
fn empty_image_is_an_encode_error_without_network() {
    let transport = ScriptedTransport::new(vec![ok("[]")]);
    let (client, _) = client(transport.clone(), 3, Duration::ZERO);

    let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
    let result = client.classify(&empty, &token());
    assert_eq!(transport.calls(), 0);
    assert!(matches!(
        result,
        InferenceResult::Failure(InferenceFailure::EncodeError(_))
    ));
}

#[test]
fn each_classification_has_its_own_retry_budget() {
    let transport = ScriptedTransport::new(vec![
        loading(),
        loading(),
        ok(r#"[{"label":"fear","score":0.3}]"#),
        ok(r#"[{"label":"angry","score":0.6}]"#),
    ]);
    let (client, _) = client(transport.clone(), 2, Duration::ZERO);

    let first = client.classify(&frame(), &token());
    let second = client.classify(&frame(), &token());
    assert!(matches!(
        first,
        InferenceResult::Failure(InferenceFailure::TransientUnavailable { attempts: 2 })
    ));
    assert_eq!(to_row(1, &second).score(Emotion::Fear), 0.3);
    assert_eq!(transport.calls(), 3);
}
