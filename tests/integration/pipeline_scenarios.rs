//! End-to-end batch behaviour with stubbed provider and tools.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use lipsync::pipeline::FailureStage;
use lipsync::tts::SynthesisError;
use lipsync::viseme::LipSyncTimeline;
use lipsync::{ArtifactNamespace, LipSyncPipeline, Message, MessageBatch};
use serde_json::json;

use crate::helpers::{
    STUB_AUDIO, STUB_TIMELINE, ScriptedRunner, StubTts, config_in, file_names, synthesized_path,
};

fn stub_timeline() -> LipSyncTimeline {
    LipSyncTimeline::from_json_str(STUB_TIMELINE).unwrap()
}

#[tokio::test]
async fn hello_world_batch_is_fully_enriched() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = LipSyncPipeline::new(
        &config_in(tmp.path()),
        Arc::new(StubTts::new()),
        Arc::new(ScriptedRunner::new()),
    );

    let messages = pipeline
        .process(MessageBatch::from_texts(["Hello", "World"]))
        .await;

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].text, "Hello");
    assert_eq!(messages[1].text, "World");
    for message in &messages {
        assert_eq!(message.audio.as_deref(), Some(STANDARD.encode(STUB_AUDIO).as_str()));
        assert_eq!(message.lipsync.as_ref(), Some(&stub_timeline()));
    }
}

#[tokio::test]
async fn provider_error_only_affects_its_message() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new());
    let tts = StubTts::new().failing("second", SynthesisError::provider(Some(400), "bad voice"));
    let pipeline = LipSyncPipeline::new(&config_in(tmp.path()), Arc::new(tts), runner.clone());

    let outcome = pipeline
        .process_with_report(MessageBatch::from_texts(["first", "second", "third"]))
        .await;

    assert_eq!(outcome.messages.len(), 3);
    assert!(outcome.messages[0].is_enriched());
    assert!(outcome.messages[1].audio.is_none());
    assert!(outcome.messages[1].lipsync.is_none());
    assert!(outcome.messages[2].is_enriched());

    assert_eq!(outcome.failures.len(), 1);
    let failure = &outcome.failures[0];
    assert_eq!(failure.index, 1);
    assert_eq!(failure.stage, FailureStage::Synthesis);
    assert_eq!(failure.code, "PROVIDER_ERROR");

    // Stage 2 never saw message 1.
    assert_eq!(runner.transcode_calls().len(), 2);
    assert!(
        runner
            .transcode_calls()
            .iter()
            .all(|c| !c.to_string().contains("message_1"))
    );
}

#[tokio::test]
async fn nine_rate_limits_still_enrich() {
    let tmp = tempfile::tempdir().unwrap();
    let tts = Arc::new(StubTts::new().rate_limited("busy", 9));
    let pipeline = LipSyncPipeline::new(
        &config_in(tmp.path()),
        tts.clone(),
        Arc::new(ScriptedRunner::new()),
    );

    let outcome = pipeline
        .process_with_report(MessageBatch::from_texts(["busy", "calm"]))
        .await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.enriched_count(), 2);
    assert_eq!(tts.calls_for("busy"), 10);
    assert_eq!(tts.calls_for("calm"), 1);
}

#[tokio::test]
async fn ten_rate_limits_fail_terminally() {
    let tmp = tempfile::tempdir().unwrap();
    let tts = Arc::new(StubTts::new().rate_limited("busy", 10));
    let pipeline = LipSyncPipeline::new(
        &config_in(tmp.path()),
        tts.clone(),
        Arc::new(ScriptedRunner::new()),
    );

    let outcome = pipeline
        .process_with_report(MessageBatch::from_texts(["calm", "busy"]))
        .await;

    assert!(outcome.messages[0].is_enriched());
    assert!(!outcome.messages[1].is_enriched());
    let failure = outcome.failure_for(1).unwrap();
    assert_eq!(failure.code, "RATE_LIMITED");
    assert_eq!(failure.stage, FailureStage::Synthesis);
    assert_eq!(tts.calls_for("busy"), 10);
}

#[tokio::test]
async fn missing_recognizer_falls_back_once() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        ScriptedRunner::new().primary_fails("Error: Could not find PocketSphinx acoustic model"),
    );
    let pipeline = LipSyncPipeline::new(
        &config_in(tmp.path()),
        Arc::new(StubTts::new()),
        runner.clone(),
    );

    let messages = pipeline.process(MessageBatch::from_texts(["Hello"])).await;

    assert!(messages[0].is_enriched());
    assert_eq!(messages[0].lipsync.as_ref(), Some(&stub_timeline()));
    let extractions = runner.extraction_calls();
    assert_eq!(extractions.len(), 2);
    assert!(extractions[0].has_arg("-r"));
    assert!(extractions[0].has_arg("phonetic"));
    assert!(!extractions[1].has_arg("-r"));
}

#[tokio::test]
async fn unrelated_extraction_failure_does_not_fall_back() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new().primary_fails("Error: unsupported sample format"));
    let pipeline = LipSyncPipeline::new(
        &config_in(tmp.path()),
        Arc::new(StubTts::new()),
        runner.clone(),
    );

    let outcome = pipeline
        .process_with_report(MessageBatch::from_texts(["Hello"]))
        .await;

    assert!(!outcome.messages[0].is_enriched());
    let failure = outcome.failure_for(0).unwrap();
    assert_eq!(failure.stage, FailureStage::Extraction);
    assert_eq!(failure.code, "EXTRACTION_FAILED");
    assert_eq!(runner.extraction_calls().len(), 1);
}

#[tokio::test]
async fn failing_fallback_is_extraction_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        ScriptedRunner::new()
            .primary_fails("speech recognition unavailable")
            .fallback_fails("segmentation fault"),
    );
    let pipeline = LipSyncPipeline::new(
        &config_in(tmp.path()),
        Arc::new(StubTts::new()),
        runner.clone(),
    );

    let outcome = pipeline
        .process_with_report(MessageBatch::from_texts(["Hello"]))
        .await;

    assert_eq!(outcome.failure_for(0).unwrap().code, "EXTRACTION_FAILED");
    assert_eq!(runner.extraction_calls().len(), 2);
}

#[tokio::test]
async fn transcode_failure_skips_extraction() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = Arc::new(ScriptedRunner::new().transcode_fails("Invalid data found"));
    let pipeline = LipSyncPipeline::new(
        &config_in(tmp.path()),
        Arc::new(StubTts::new()),
        runner.clone(),
    );

    let outcome = pipeline
        .process_with_report(MessageBatch::from_texts(["a", "b"]))
        .await;

    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(outcome.failures.len(), 2);
    assert!(
        outcome
            .failures
            .iter()
            .all(|f| f.stage == FailureStage::Transcode && f.code == "TRANSCODE_FAILED")
    );
    assert!(runner.extraction_calls().is_empty());
}

#[tokio::test]
async fn missing_extractor_degrades_every_message() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config_in(tmp.path());
    config.extractor.rhubarb_path = Some(tmp.path().join("nowhere").join("rhubarb"));
    config.extractor.local_install_dir = tmp.path().join("nowhere");
    config.extractor.tool_name = "lipsync-test-missing-rhubarb".to_owned();
    let runner = Arc::new(ScriptedRunner::new());
    let pipeline = LipSyncPipeline::new(&config, Arc::new(StubTts::new()), runner.clone());

    let outcome = pipeline
        .process_with_report(MessageBatch::from_texts(["a", "b"]))
        .await;

    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(outcome.enriched_count(), 0);
    assert!(outcome.failures.iter().all(|f| f.code == "TOOL_UNAVAILABLE"));
    assert!(runner.extraction_calls().is_empty());
}

#[tokio::test]
async fn rerun_in_same_namespace_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_in(tmp.path());
    let namespace = ArtifactNamespace::shared(&config.artifacts.root);
    let pipeline = LipSyncPipeline::new(
        &config,
        Arc::new(StubTts::new()),
        Arc::new(ScriptedRunner::new()),
    );
    let batch = MessageBatch::from_texts(["one", "two"]);

    let first = pipeline.process_in(&namespace, batch.clone()).await;
    let files_after_first = file_names(namespace.dir());
    let second = pipeline.process_in(&namespace, batch).await;

    assert_eq!(first, second);
    assert_eq!(file_names(namespace.dir()), files_after_first);
    assert_eq!(
        files_after_first,
        [
            "message_0.json",
            "message_0.mp3",
            "message_0.wav",
            "message_1.json",
            "message_1.mp3",
            "message_1.wav",
        ]
    );
    assert_eq!(
        std::fs::read(synthesized_path(namespace.dir(), 0)).unwrap(),
        STUB_AUDIO
    );
}

#[tokio::test]
async fn isolated_runs_do_not_share_files() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = config_in(tmp.path());
    config.artifacts.isolate_runs = true;
    let pipeline = LipSyncPipeline::new(
        &config,
        Arc::new(StubTts::new()),
        Arc::new(ScriptedRunner::new()),
    );

    let (a, b) = tokio::join!(
        pipeline.process_with_report(MessageBatch::from_texts(["x"])),
        pipeline.process_with_report(MessageBatch::from_texts(["y"])),
    );
    assert!(a.is_complete());
    assert!(b.is_complete());
    assert_eq!(file_names(&config.artifacts.root).len(), 2);
}

#[tokio::test]
async fn non_sequence_input_yields_empty_result() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = LipSyncPipeline::new(
        &config_in(tmp.path()),
        Arc::new(StubTts::new()),
        Arc::new(ScriptedRunner::new()),
    );

    for input in [json!("hello"), json!(3), json!({"text": "hi"}), json!(null)] {
        let messages = pipeline.process(MessageBatch::from_json(input)).await;
        assert!(messages.is_empty());
    }
}

#[tokio::test]
async fn unreadable_elements_fail_in_place() {
    let tmp = tempfile::tempdir().unwrap();
    let tts = Arc::new(StubTts::new());
    let pipeline = LipSyncPipeline::new(
        &config_in(tmp.path()),
        tts.clone(),
        Arc::new(ScriptedRunner::new()),
    );

    let batch = MessageBatch::from_json(json!([
        {"text": "Hello"},
        "stray string",
        {"text": 42, "animation": "Idle"},
        {"text": "World"}
    ]));
    let outcome = pipeline.process_with_report(batch).await;

    assert_eq!(outcome.messages.len(), 4);
    assert!(outcome.messages[0].is_enriched());
    assert!(outcome.messages[3].is_enriched());
    for index in [1, 2] {
        assert!(!outcome.messages[index].is_enriched());
        assert_eq!(outcome.failure_for(index).unwrap().stage, FailureStage::Synthesis);
    }
    assert_eq!(tts.calls_for(""), 0);

    let kept = serde_json::to_value(&outcome.messages[2]).unwrap();
    assert_eq!(kept, json!({"text": 42, "animation": "Idle"}));
}

#[tokio::test]
async fn wrapped_input_is_processed() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = LipSyncPipeline::new(
        &config_in(tmp.path()),
        Arc::new(StubTts::new()),
        Arc::new(ScriptedRunner::new()),
    );

    let batch = MessageBatch::from_json(json!({
        "messages": [
            {"text": "Hey there", "facialExpression": "smile", "animation": "Talking_0"}
        ]
    }));
    let messages = pipeline.process(batch).await;

    let out = serde_json::to_value(&messages[0]).unwrap();
    assert_eq!(out["text"], "Hey there");
    assert_eq!(out["facialExpression"], "smile");
    assert_eq!(out["animation"], "Talking_0");
    assert_eq!(out["audio"], STANDARD.encode(STUB_AUDIO));
    assert_eq!(out["lipsync"]["mouthCues"][1]["value"], "C");
}

#[tokio::test]
async fn order_is_preserved_when_completion_order_differs() {
    let tmp = tempfile::tempdir().unwrap();
    let tts = StubTts::new()
        .delayed("slow", Duration::from_millis(150))
        .delayed("medium", Duration::from_millis(50));
    let pipeline = LipSyncPipeline::new(
        &config_in(tmp.path()),
        Arc::new(tts),
        Arc::new(ScriptedRunner::new()),
    );

    let messages = pipeline
        .process(MessageBatch::from_texts(["slow", "medium", "fast"]))
        .await;

    let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["slow", "medium", "fast"]);
    let indices: Vec<usize> = messages.iter().map(|m| m.index).collect();
    assert_eq!(indices, [0, 1, 2]);
    assert!(messages.iter().all(Message::is_enriched));
}

#[tokio::test]
async fn synthesis_finishes_for_all_before_any_transcode() {
    let tmp = tempfile::tempdir().unwrap();
    let tts = StubTts::new()
        .delayed("slow", Duration::from_millis(200))
        .failing("broken", SynthesisError::transport("connection reset"));
    let counter = tts.completed_counter();
    let runner = Arc::new(ScriptedRunner::new().observe_synthesis(counter));
    let pipeline = LipSyncPipeline::new(&config_in(tmp.path()), Arc::new(tts), runner.clone());

    let outcome = pipeline
        .process_with_report(MessageBatch::from_texts(["fast", "slow", "broken"]))
        .await;

    assert_eq!(outcome.enriched_count(), 2);
    assert_eq!(outcome.failure_for(2).unwrap().code, "TRANSPORT_ERROR");
    assert_eq!(runner.synthesis_counts_at_transcode(), [3, 3]);
}

#[tokio::test]
async fn blank_text_is_not_sent_to_provider() {
    let tmp = tempfile::tempdir().unwrap();
    let tts = Arc::new(StubTts::new());
    let pipeline = LipSyncPipeline::new(
        &config_in(tmp.path()),
        tts.clone(),
        Arc::new(ScriptedRunner::new()),
    );

    let outcome = pipeline
        .process_with_report(MessageBatch::from_texts(["  ", "spoken"]))
        .await;

    assert_eq!(tts.calls_for("  "), 0);
    assert_eq!(outcome.failure_for(0).unwrap().stage, FailureStage::Synthesis);
    assert!(outcome.messages[1].is_enriched());
}
