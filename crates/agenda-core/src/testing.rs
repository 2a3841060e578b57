//! Scripted collaborators for unit tests.
#![allow(clippy::unwrap_used)]

use crate::llm::{LanguageModel, LlmRequest, Purpose};
use crate::store::{ContactStore, SchemaPreview, SqlOutcome};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Clone)]
enum Reply {
    Text(String),
    Fail,
}

/// Model that answers by purpose from queued replies; the last reply repeats.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<HashMap<Purpose, VecDeque<Reply>>>,
    prompts: Mutex<Vec<LlmRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, purpose: Purpose, text: impl Into<String>) -> Self {
        self.push(purpose, Reply::Text(text.into()));
        self
    }

    pub fn failing(self, purpose: Purpose) -> Self {
        self.push(purpose, Reply::Fail);
        self
    }

    fn push(&self, purpose: Purpose, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(purpose)
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self, purpose: Purpose) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.purpose == purpose)
            .count()
    }

    pub fn prompts(&self, purpose: Purpose) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.purpose == purpose)
            .map(|r| r.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        self.prompts.lock().unwrap().push(request.clone());
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            let queue = replies.get_mut(&request.purpose);
            match queue {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail) => Err(Error::Llm(format!("scripted failure for {}", request.purpose))),
            None => Err(Error::Llm(format!("no script for {}", request.purpose))),
        }
    }
}

/// Store returning queued outcomes; the last outcome repeats.
pub struct FakeStore {
    available: bool,
    outcomes: Mutex<VecDeque<Option<SqlOutcome>>>,
    executed: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            available: true,
            outcomes: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn returning(self, outcome: SqlOutcome) -> Self {
        self.outcomes.lock().unwrap().push_back(Some(outcome));
        self
    }

    pub fn failing(self) -> Self {
        self.outcomes.lock().unwrap().push_back(None);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContactStore for FakeStore {
    async fn check_available(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(Error::DataUnavailable("fake store offline".into()))
        }
    }

    async fn schema_preview(&self) -> Result<SchemaPreview> {
        Ok(SchemaPreview {
            columns: vec!["nombre_completo".into(), "telefono".into()],
            total_rows: 2,
            sample_names: vec!["PEREZ LUIS".into(), "MARTINEZ ANA".into()],
            sample_rows: Vec::new(),
        })
    }

    async fn run_sql(&self, sql: &str, _params: &[serde_json::Value]) -> Result<SqlOutcome> {
        self.executed.lock().unwrap().push(sql.to_string());
        let next = {
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.len() > 1 {
                outcomes.pop_front().flatten()
            } else {
                outcomes.front().cloned().flatten()
            }
        };
        next.ok_or_else(|| Error::Other("scripted query failure".into()))
    }
}
