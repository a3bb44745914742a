//! In-memory stores and broadcasters for service tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

use crate::{
    Error, Result,
    aggregate::SummaryPatch,
    broadcast::MessageBroadcaster,
    model::{CanonicalMessage, ConversationSummary, MessageStatus},
    service::{Inbox, InboxOptions},
    store::{ConversationStore, MessageStore},
    upsert::{MessagePatch, UpsertPlan, Upserted, plan_upsert, select_target},
};

#[derive(Default)]
pub struct MemoryStore {
    messages: Mutex<Vec<CanonicalMessage>>,
    summaries: Mutex<HashMap<String, ConversationSummary>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn fail_upserts_for(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn get_message(&self, identifier: &str) -> Option<CanonicalMessage> {
        let messages = self.messages.lock().unwrap();
        lookup(&messages, identifier).cloned()
    }

    pub fn get_summary(&self, wa_id: &str) -> Option<ConversationSummary> {
        self.summaries.lock().unwrap().get(wa_id).cloned()
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

fn lookup<'a>(messages: &'a [CanonicalMessage], identifier: &str) -> Option<&'a CanonicalMessage> {
    let lookup_key = MessagePatch {
        id: identifier.to_string(),
        ..Default::default()
    };
    select_target(&lookup_key, messages)
}

#[derive(Debug)]
struct InjectedFailure;

impl std::fmt::Display for InjectedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("injected failure")
    }
}

impl std::error::Error for InjectedFailure {}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn upsert(&self, patch: MessagePatch) -> Result<Upserted> {
        if self.failing.lock().unwrap().contains(&patch.id) {
            return Err(Error::storage("upsert message", InjectedFailure));
        }
        let mut messages = self.messages.lock().unwrap();
        let ids: Vec<String> = patch.identifiers().into_iter().map(str::to_string).collect();
        let candidates: Vec<CanonicalMessage> = messages
            .iter()
            .filter(|m| ids.iter().any(|id| m.matches(id)))
            .cloned()
            .collect();

        let plan = plan_upsert(patch, &candidates, Utc::now());
        match &plan {
            UpsertPlan::Insert(m) => messages.push(m.clone()),
            UpsertPlan::Update(m) => {
                if let Some(slot) = messages.iter_mut().find(|s| s.id == m.id) {
                    *slot = m.clone();
                }
            },
        }
        Ok(plan.into_upserted())
    }

    async fn update_status(
        &self,
        identifier: &str,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<CanonicalMessage>> {
        let mut messages = self.messages.lock().unwrap();
        let Some(id) = lookup(&messages, identifier).map(|m| m.id.clone()) else {
            return Ok(None);
        };
        let Some(slot) = messages.iter_mut().find(|m| m.id == id) else {
            return Ok(None);
        };
        slot.status = status;
        slot.status_updated_at = Some(at);
        slot.updated_at = at;
        Ok(Some(slot.clone()))
    }

    async fn list_newest_first(
        &self,
        wa_id: &str,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<CanonicalMessage>> {
        let mut rows: Vec<CanonicalMessage> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.wa_id == wa_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn apply(&self, patch: SummaryPatch) -> Result<ConversationSummary> {
        let mut summaries = self.summaries.lock().unwrap();
        let existing = summaries.remove(&patch.wa_id);
        let summary = patch.apply_to(existing, Utc::now());
        summaries.insert(summary.wa_id.clone(), summary.clone());
        Ok(summary)
    }

    async fn mark_read(&self, wa_id: &str) -> Result<()> {
        if let Some(summary) = self.summaries.lock().unwrap().get_mut(wa_id) {
            summary.unread_count = 0;
        }
        Ok(())
    }

    async fn list(&self, limit: u32) -> Result<Vec<ConversationSummary>> {
        let mut all: Vec<ConversationSummary> =
            self.summaries.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        all.truncate(limit as usize);
        Ok(all)
    }
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    published: Mutex<Vec<CanonicalMessage>>,
}

impl RecordingBroadcaster {
    pub fn published(&self) -> Vec<CanonicalMessage> {
        self.published.lock().unwrap().clone()
    }
}

impl MessageBroadcaster for RecordingBroadcaster {
    fn publish(&self, message: &CanonicalMessage) -> Result<usize> {
        self.published.lock().unwrap().push(message.clone());
        Ok(1)
    }
}

pub struct FailingBroadcaster;

impl MessageBroadcaster for FailingBroadcaster {
    fn publish(&self, _message: &CanonicalMessage) -> Result<usize> {
        Err(Error::broadcast("no transport"))
    }
}

pub fn memory_inbox() -> (Inbox, Arc<MemoryStore>, Arc<RecordingBroadcaster>) {
    let store = Arc::new(MemoryStore::default());
    let broadcaster = Arc::new(RecordingBroadcaster::default());
    let inbox = Inbox::new(
        store.clone(),
        store.clone(),
        broadcaster.clone(),
        InboxOptions::default(),
    );
    (inbox, store, broadcaster)
}
