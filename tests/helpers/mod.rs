//! Shared fixtures for the integration tests
//!
//! `TestEnv` wires an interpreter to a seeded in-memory store and a
//! `RecordingHost`. Filesystem settings (media, presets) point into a
//! temporary directory that lives as long as the environment.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tempfile::TempDir;

use dexscript::schema::{ModelDescriptor, ModelSchema};
use dexscript::store::{Condition, Fields, Record, StoreError};
use dexscript::{
    Attachment, DataStore, Host, HostError, InMemoryStore, Interpreter, Reply, RunReport,
    Settings,
};

pub const MODELS: &str = r#"
models:
  - name: Regime
    fields:
      - { name: id, type: int }
      - { name: name, type: char }
    seed:
      - { name: Democracy }
      - { name: Dictatorship }

  - name: Ball
    fields:
      - { name: id, type: int }
      - { name: country, type: char }
      - { name: health, type: int }
      - { name: rarity, type: float }
      - { name: enabled, type: bool, default: true }
      - { name: tradeable, type: bool }
      - { name: regime, type: foreign_key, references: Regime }
      - { name: wild_card, type: text, nullable: true }
      - { name: created_at, type: date_time }
    seed:
      - { country: France, health: 40, rarity: 1.5, tradeable: true, regime: 1, created_at: "2024-03-01 12:00:00" }
      - { country: Germany, health: 55, rarity: 1.2, tradeable: true, regime: 1, created_at: "2024-03-01 12:00:00" }
      - { country: Italy, health: 35, rarity: 2.0, tradeable: false, regime: 2, created_at: "2024-03-01 12:00:00" }

  - name: Trade
    fields:
      - { name: id, type: int }
      - { name: notes, type: text, nullable: true }
"#;

// =============================================================================
// RECORDING HOST
// =============================================================================

/// Host that records every reply and answers prompts from a script.
/// A prompt with no scripted answer left times out.
#[derive(Default)]
pub struct RecordingHost {
    replies: Mutex<Vec<Reply>>,
    prompts: Mutex<Vec<String>>,
    answers: Mutex<VecDeque<String>>,
    attachments: Mutex<Vec<Attachment>>,
    evaluated: Mutex<Vec<String>>,
    acknowledged: Mutex<usize>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(&self, text: &str) {
        self.answers.lock().unwrap().push_back(text.to_string());
    }

    pub fn attach(&self, filename: &str, data: &[u8]) {
        self.attachments
            .lock()
            .unwrap()
            .push(Attachment::new(filename, data.to_vec()));
    }

    pub fn replies(&self) -> Vec<Reply> {
        self.replies.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.replies().into_iter().map(|r| r.text).collect()
    }

    pub fn last_text(&self) -> String {
        self.texts().pop().unwrap_or_default()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn evaluated(&self) -> Vec<String> {
        self.evaluated.lock().unwrap().clone()
    }

    pub fn acknowledged(&self) -> usize {
        *self.acknowledged.lock().unwrap()
    }

    pub fn reset(&self) {
        self.replies.lock().unwrap().clear();
        self.prompts.lock().unwrap().clear();
        self.attachments.lock().unwrap().clear();
    }
}

#[async_trait]
impl Host for RecordingHost {
    async fn reply(&self, reply: Reply) -> Result<(), HostError> {
        self.replies.lock().unwrap().push(reply);
        Ok(())
    }

    async fn prompt_for_input(&self, prompt: &str, timeout: Duration) -> Result<String, HostError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(HostError::Timeout {
                seconds: timeout.as_secs(),
            })
    }

    fn attachments(&self) -> Vec<Attachment> {
        self.attachments.lock().unwrap().clone()
    }

    async fn evaluate(&self, body: &str) -> Result<String, HostError> {
        self.evaluated.lock().unwrap().push(body.to_string());
        Ok(format!("evaluated {} bytes", body.len()))
    }

    async fn acknowledge(&self) -> Result<(), HostError> {
        *self.acknowledged.lock().unwrap() += 1;
        Ok(())
    }
}

// =============================================================================
// FAULTY STORE
// =============================================================================

/// Store wrapper that can fail one chosen write. Reads always pass through.
pub struct FaultyStore {
    inner: Arc<InMemoryStore>,
    countdown: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            countdown: AtomicUsize::new(0),
        }
    }

    /// Fail the `nth` write from now (1 = the next one), once
    pub fn fail_write(&self, nth: usize) {
        self.countdown.store(nth, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), StoreError> {
        match self.countdown.load(Ordering::SeqCst) {
            0 => Ok(()),
            1 => {
                self.countdown.store(0, Ordering::SeqCst);
                Err(StoreError::Backend("connection reset".to_string()))
            }
            n => {
                self.countdown.store(n - 1, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl DataStore for FaultyStore {
    fn schemas(&self) -> Vec<ModelSchema> {
        self.inner.schemas()
    }

    async fn list_identifiers(&self, model: &ModelDescriptor) -> Result<Vec<String>, StoreError> {
        self.inner.list_identifiers(model).await
    }

    async fn fetch(
        &self,
        model: &ModelDescriptor,
        identifier: &str,
    ) -> Result<Option<Record>, StoreError> {
        self.inner.fetch(model, identifier).await
    }

    async fn get(&self, model: &ModelDescriptor, pk: i64) -> Result<Option<Record>, StoreError> {
        self.inner.get(model, pk).await
    }

    async fn create(&self, model: &ModelDescriptor, fields: Fields) -> Result<Record, StoreError> {
        self.check_write()?;
        self.inner.create(model, fields).await
    }

    async fn update(
        &self,
        model: &ModelDescriptor,
        pk: i64,
        field: &str,
        value: JsonValue,
    ) -> Result<JsonValue, StoreError> {
        self.check_write()?;
        self.inner.update(model, pk, field, value).await
    }

    async fn delete(&self, model: &ModelDescriptor, pk: i64) -> Result<Record, StoreError> {
        self.check_write()?;
        self.inner.delete(model, pk).await
    }

    async fn filter(
        &self,
        model: &ModelDescriptor,
        condition: &Condition,
    ) -> Result<Vec<Record>, StoreError> {
        self.inner.filter(model, condition).await
    }

    async fn first(&self, model: &ModelDescriptor) -> Result<Option<Record>, StoreError> {
        self.inner.first(model).await
    }
}

// =============================================================================
// TEST ENVIRONMENT
// =============================================================================

pub struct TestEnv {
    pub interpreter: Interpreter,
    pub store: Arc<InMemoryStore>,
    /// The interpreter's view of `store`
    pub faults: Arc<FaultyStore>,
    pub host: RecordingHost,
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    /// Build an environment, letting the caller adjust settings first
    pub fn with_settings(configure: impl FnOnce(&mut Settings)) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");

        let mut settings = Settings {
            media_path: dir.path().join("uploads").display().to_string(),
            presets_dir: dir.path().join("eval_presets").display().to_string(),
            ..Settings::default()
        };
        configure(&mut settings);

        let store = Arc::new(InMemoryStore::from_yaml(MODELS).expect("Invalid test models"));
        let faults = Arc::new(FaultyStore::new(store.clone()));
        let interpreter =
            Interpreter::new(faults.clone(), settings).expect("Failed to build interpreter");

        Self {
            interpreter,
            store,
            faults,
            host: RecordingHost::new(),
            dir,
        }
    }

    pub async fn run(&self, script: &str) -> RunReport {
        self.interpreter.run(&self.host, script).await
    }

    /// Run a script that must succeed
    pub async fn run_ok(&self, script: &str) -> RunReport {
        let report = self.run(script).await;
        if let Some(error) = &report.error {
            panic!("script failed on line {}: {}", error.line, error.error);
        }
        report
    }

    pub async fn record(&self, model: &str, identifier: &str) -> Option<Record> {
        let model = self
            .interpreter
            .models()
            .get(model)
            .expect("Unknown test model");
        self.store
            .fetch(&model, identifier)
            .await
            .expect("Store lookup failed")
    }

    pub async fn count(&self, model: &str) -> usize {
        self.store.count(model).await
    }

    pub fn path(&self, name: &str) -> String {
        self.dir.path().join(name).display().to_string()
    }
}
