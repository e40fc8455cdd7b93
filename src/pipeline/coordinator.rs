//! Batch orchestrator: synthesis for every message, then transcode, extract
//! and enrich for every message.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::artifacts::ArtifactNamespace;
use crate::config::{ArtifactConfig, LipSyncConfig};
use crate::enrich::MessageEnricher;
use crate::error::{LipSyncError, Result};
use crate::message::{Message, MessageBatch};
use crate::process::{ProcessRunner, SystemProcessRunner};
use crate::transcode::AudioTranscoder;
use crate::tts::{SpeechSynthesizer, SynthesisReport, TextToSpeech};
use crate::viseme::VisemeExtractor;

use super::outcome::{BatchOutcome, FailureStage, MessageFailure};

/// Drives a batch through both stages.
///
/// Stage 1 synthesizes every message concurrently and waits for all of them.
/// Stage 2 then runs transcode → extract → enrich for every message that
/// synthesized, again concurrently. A failure only affects its own message.
pub struct LipSyncPipeline {
    synthesizer: SpeechSynthesizer,
    transcoder: AudioTranscoder,
    extractor: VisemeExtractor,
    enricher: MessageEnricher,
    artifacts: ArtifactConfig,
    limiter: Option<Semaphore>,
    cancel: CancellationToken,
}

impl LipSyncPipeline {
    /// Create a pipeline from configuration and capabilities.
    pub fn new(
        config: &LipSyncConfig,
        tts: Arc<dyn TextToSpeech>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            synthesizer: SpeechSynthesizer::new(tts, config.retry.clone()),
            transcoder: AudioTranscoder::new(Arc::clone(&runner), &config.transcode),
            extractor: VisemeExtractor::new(runner, &config.extractor),
            enricher: MessageEnricher::new(),
            artifacts: config.artifacts.clone(),
            limiter: config.pipeline.max_concurrency.map(Semaphore::new),
            cancel: CancellationToken::new(),
        }
    }

    /// Create a pipeline that runs real ffmpeg/rhubarb processes, honouring
    /// `pipeline.process_timeout_secs`.
    pub fn with_system_tools(config: &LipSyncConfig, tts: Arc<dyn TextToSpeech>) -> Self {
        let runner = match config.pipeline.process_timeout_secs {
            Some(secs) => SystemProcessRunner::with_timeout(Duration::from_secs(secs)),
            None => SystemProcessRunner::new(),
        };
        Self::new(config, tts, Arc::new(runner))
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Get a clone of the cancellation token for external use.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel in-flight work. Unfinished messages are reported as cancelled.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Check that ffmpeg runs and the extraction tool can be located.
    ///
    /// # Errors
    ///
    /// Returns [`LipSyncError::ToolUnavailable`] for the first missing tool.
    pub async fn preflight(&self) -> Result<()> {
        self.transcoder.check_available().await?;
        let rhubarb = self.extractor.resolver().resolve().await?;
        info!(rhubarb = %rhubarb.display(), "preflight passed");
        Ok(())
    }

    /// Namespace for the next run: shared root, or a fresh run directory
    /// when `artifacts.isolate_runs` is set.
    pub fn namespace(&self) -> ArtifactNamespace {
        if self.artifacts.isolate_runs {
            ArtifactNamespace::fresh_run(&self.artifacts.root)
        } else {
            ArtifactNamespace::shared(&self.artifacts.root)
        }
    }

    /// Process a batch, returning every message in input order.
    ///
    /// Callers detect per-message failure by the absence of `audio` and
    /// `lipsync`.
    pub async fn process(&self, batch: MessageBatch) -> Vec<Message> {
        self.process_with_report(batch).await.messages
    }

    /// Process a batch in the configured namespace, with failure details.
    pub async fn process_with_report(&self, batch: MessageBatch) -> BatchOutcome {
        let namespace = self.namespace();
        self.process_in(&namespace, batch).await
    }

    /// Process a batch in an explicit artifact namespace.
    pub async fn process_in(&self, namespace: &ArtifactNamespace, batch: MessageBatch) -> BatchOutcome {
        let started = Instant::now();
        let mut messages = batch.into_messages();
        for message in &mut messages {
            message.audio = None;
            message.lipsync = None;
        }
        if messages.is_empty() {
            return BatchOutcome::default();
        }

        info!(
            messages = messages.len(),
            dir = %namespace.dir().display(),
            run_id = namespace.run_id().unwrap_or("shared"),
            "processing batch"
        );

        if let Err(e) = namespace.ensure_exists().await {
            let err = LipSyncError::Io(e);
            error!(dir = %namespace.dir().display(), error = %err, "cannot create artifact directory");
            let failures = messages
                .iter()
                .map(|m| MessageFailure::new(m.index, FailureStage::Synthesis, &err))
                .collect();
            return BatchOutcome { messages, failures };
        }

        let mut failures = Vec::new();

        // Stage 1: barrier over every synthesis.
        let synthesized = join_all(messages.iter().map(|m| self.synthesize_one(namespace, m))).await;
        let mut ready = Vec::with_capacity(messages.len());
        for (message, result) in messages.iter().zip(synthesized) {
            match result {
                Ok(_) => ready.push(true),
                Err(err) => {
                    record(&mut failures, message.index, FailureStage::Synthesis, &err);
                    ready.push(false);
                }
            }
        }

        // Stage 2: barrier over every transcode → extract → enrich chain.
        let chains = messages
            .iter_mut()
            .zip(&ready)
            .filter(|(_, ok)| **ok)
            .map(|(message, _)| self.enrich_one(namespace, message));
        for result in join_all(chains).await {
            if let Err((index, stage, err)) = result {
                record(&mut failures, index, stage, &err);
            }
        }

        failures.sort_by_key(|f| f.index);
        let outcome = BatchOutcome { messages, failures };
        info!(
            messages = outcome.messages.len(),
            enriched = outcome.enriched_count(),
            failed = outcome.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch complete"
        );
        outcome
    }

    async fn synthesize_one(&self, namespace: &ArtifactNamespace, message: &Message) -> Result<SynthesisReport> {
        let _permit = self.permit().await?;
        let target = namespace.message(message.index).synthesized;
        self.guarded(self.synthesizer.synthesize(&message.text, &target))
            .await
    }

    async fn enrich_one(
        &self,
        namespace: &ArtifactNamespace,
        message: &mut Message,
    ) -> std::result::Result<(), (usize, FailureStage, LipSyncError)> {
        let index = message.index;
        let artifacts = namespace.message(index);
        let _permit = self
            .permit()
            .await
            .map_err(|e| (index, FailureStage::Transcode, e))?;

        self.guarded(self.transcoder.transcode(&artifacts.synthesized, &artifacts.canonical))
            .await
            .map_err(|e| (index, FailureStage::Transcode, e))?;
        let mode = self
            .guarded(self.extractor.extract(&artifacts.canonical, &artifacts.timeline))
            .await
            .map_err(|e| (index, FailureStage::Extraction, e))?;
        self.guarded(self.enricher.enrich(message, &artifacts))
            .await
            .map_err(|e| (index, FailureStage::Enrichment, e))?;

        info!(index, mode = %mode, "message ready");
        Ok(())
    }

    async fn permit(&self) -> Result<Option<SemaphorePermit<'_>>> {
        match &self.limiter {
            Some(limiter) => tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(LipSyncError::Cancelled),
                permit = limiter.acquire() => permit.map(Some).map_err(|_| LipSyncError::Cancelled),
            },
            None => Ok(None),
        }
    }

    /// Run `work` unless the batch is cancelled first. Dropping the future
    /// kills any child process it spawned.
    async fn guarded<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(LipSyncError::Cancelled),
            result = work => result,
        }
    }
}

fn record(failures: &mut Vec<MessageFailure>, index: usize, stage: FailureStage, err: &LipSyncError) {
    error!(index, stage = %stage, code = err.code(), error = %err, "message failed");
    failures.push(MessageFailure::new(index, stage, err));
}
