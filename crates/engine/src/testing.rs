//! Shared test doubles for interpreter and runtime tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cadence_channels::{
    AiProvider, ChannelError, EmailMessage, EmailTransport, SmsMessage, SmsTransport,
    WebhookRequest, WebhookSender,
};

use crate::engine::interpreter::Collaborators;
use crate::store::memory::{MemorySubjectStore, MemoryTemplateStore};
use crate::store::SubjectStore;

/// Recording email transport with a failure toggle.
#[derive(Default)]
pub struct RecordingEmail {
    pub sent: Mutex<Vec<EmailMessage>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl EmailTransport for RecordingEmail {
    async fn send(&self, message: &EmailMessage) -> Result<(), ChannelError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::Http("smtp relay unavailable".into()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Recording SMS transport.
#[derive(Default)]
pub struct RecordingSms {
    pub sent: Mutex<Vec<SmsMessage>>,
}

#[async_trait]
impl SmsTransport for RecordingSms {
    async fn send(&self, message: &SmsMessage) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Recording webhook sender with a failure toggle.
#[derive(Default)]
pub struct RecordingWebhook {
    pub calls: Mutex<Vec<WebhookRequest>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl WebhookSender for RecordingWebhook {
    async fn call(&self, request: &WebhookRequest) -> Result<u16, ChannelError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::Http("endpoint unreachable".into()));
        }
        self.calls.lock().unwrap().push(request.clone());
        Ok(200)
    }
}

/// Canned AI provider with a quota-exhaustion toggle.
#[derive(Default)]
pub struct CannedAi {
    pub calls: AtomicUsize,
    pub exhausted: AtomicBool,
}

#[async_trait]
impl AiProvider for CannedAi {
    async fn generate(
        &self,
        prompt: &str,
        _context: &serde_json::Value,
    ) -> Result<String, ChannelError> {
        if self.exhausted.load(Ordering::SeqCst) {
            return Err(ChannelError::QuotaExceeded {
                limit: 60,
                window_secs: 60,
            });
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("generated: {}", prompt))
    }

    fn service_name(&self) -> &str {
        "test-model"
    }
}

/// Subject store wrapper counting saves.
#[derive(Default)]
pub struct CountingSubjectStore {
    pub inner: MemorySubjectStore,
    pub saves: AtomicUsize,
}

#[async_trait]
impl SubjectStore for CountingSubjectStore {
    async fn get(
        &self,
        tenant_id: uuid::Uuid,
        id: uuid::Uuid,
    ) -> crate::error::EngineResult<Option<crate::model::Subject>> {
        self.inner.get(tenant_id, id).await
    }

    async fn save(&self, subject: &crate::model::Subject) -> crate::error::EngineResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(subject).await
    }
}

/// Bundle of test channels plus accessors used by assertions.
pub struct TestChannels {
    pub email: Arc<RecordingEmail>,
    pub sms: Arc<RecordingSms>,
    pub webhook: Arc<RecordingWebhook>,
    pub ai: Arc<CannedAi>,
    pub subjects: Arc<CountingSubjectStore>,
    pub templates: Arc<MemoryTemplateStore>,
}

impl TestChannels {
    pub fn new() -> Self {
        Self {
            email: Arc::new(RecordingEmail::default()),
            sms: Arc::new(RecordingSms::default()),
            webhook: Arc::new(RecordingWebhook::default()),
            ai: Arc::new(CannedAi::default()),
            subjects: Arc::new(CountingSubjectStore::default()),
            templates: Arc::new(MemoryTemplateStore::new()),
        }
    }

    pub fn email_sent(&self) -> usize {
        self.email.sent.lock().unwrap().len()
    }

    pub fn sms_sent(&self) -> usize {
        self.sms.sent.lock().unwrap().len()
    }

    pub fn fail_email(&self) {
        self.email.fail.store(true, Ordering::SeqCst);
    }

    pub fn fail_webhook(&self) {
        self.webhook.fail.store(true, Ordering::SeqCst);
    }

    pub fn ai_calls(&self) -> usize {
        self.ai.calls.load(Ordering::SeqCst)
    }

    pub fn exhaust_ai_quota(&self) {
        self.ai.exhausted.store(true, Ordering::SeqCst);
    }

    pub fn restore_ai_quota(&self) {
        self.ai.exhausted.store(false, Ordering::SeqCst);
    }

    pub fn subjects_saved(&self) -> usize {
        self.subjects.saves.load(Ordering::SeqCst)
    }
}

/// Wire the test channels into an interpreter collaborator set.
pub fn collaborators(channels: &TestChannels) -> Collaborators {
    Collaborators {
        email: channels.email.clone(),
        sms: channels.sms.clone(),
        webhook: channels.webhook.clone(),
        ai: channels.ai.clone(),
        subjects: channels.subjects.clone(),
        templates: channels.templates.clone(),
    }
}
