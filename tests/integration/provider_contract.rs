//! ElevenLabs adapter driven through the full pipeline against a mock server.

use std::sync::Arc;

use lipsync::config::TtsConfig;
use lipsync::{ElevenLabsTts, LipSyncPipeline, MessageBatch};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{ScriptedRunner, config_in};

fn tts_for(server: &MockServer) -> ElevenLabsTts {
    let config = TtsConfig {
        api_base_url: server.uri(),
        voice_id: "narrator".to_owned(),
        ..TtsConfig::default()
    };
    ElevenLabsTts::new(config, "test-key").unwrap()
}

#[tokio::test]
async fn transient_429s_are_retried_until_audio_arrives() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/narrator"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(3)
        .with_priority(1)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/narrator"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3real".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let pipeline = LipSyncPipeline::new(
        &config_in(tmp.path()),
        Arc::new(tts_for(&server)),
        Arc::new(ScriptedRunner::new()),
    );

    let outcome = pipeline
        .process_with_report(MessageBatch::from_texts(["Hello"]))
        .await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.messages[0].audio.as_deref(), Some("SUQzcmVhbA=="));
}

#[tokio::test]
async fn auth_failure_is_recorded_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(serde_json::json!({"detail": {"message": "Invalid API key"}})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let pipeline = LipSyncPipeline::new(
        &config_in(tmp.path()),
        Arc::new(tts_for(&server)),
        Arc::new(ScriptedRunner::new()),
    );

    let outcome = pipeline
        .process_with_report(MessageBatch::from_texts(["a", "b"]))
        .await;

    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(outcome.enriched_count(), 0);
    for failure in &outcome.failures {
        assert_eq!(failure.code, "PROVIDER_ERROR");
        assert!(failure.error.contains("Invalid API key"));
        assert!(failure.error.contains("401"));
    }
}
