//! Step interpreter.
//!
//! Given an execution record and the step at its current index, performs
//! exactly one step's side effect and reports how to continue. Dispatch is
//! over the typed [`Step`] sum; each handler touches nothing beyond the
//! execution record and its declared collaborators.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use cadence_channels::{
    AiProvider, EmailMessage, EmailTransport, SmsMessage, SmsTransport, WebhookRequest,
    WebhookSender,
};

use crate::engine::condition::{evaluate, resolve_field};
use crate::error::StepError;
use crate::model::{
    CallAiConfig, ConditionConfig, ExecutionRecord, SendEmailConfig, SendSmsConfig, Step, Subject,
    UpdateCrmConfig, WaitConfig, WebhookConfig,
};
use crate::store::{SubjectStore, TemplateStore};
use crate::template::TemplateRenderer;

/// What the processor should do after a step resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextAction {
    /// No further scheduling (terminal outcomes).
    None,
    /// Re-enqueue immediately.
    Continue,
    /// Re-enqueue no earlier than the given instant.
    ResumeAt(DateTime<Utc>),
}

/// Result of running one step. Transient failures are NOT expressed here;
/// they propagate as [`StepError::Transient`] so the dispatch layer can
/// retry the job.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub success: bool,
    pub message: String,
    pub next_action: NextAction,
    /// Explicit index override set by branching steps.
    pub next_index: Option<usize>,
}

impl StepOutcome {
    /// Successful step, sequential advance.
    pub fn advanced(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            next_action: NextAction::Continue,
            next_index: None,
        }
    }

    /// Successful branching step jumping to an explicit index.
    pub fn jump(message: impl Into<String>, next_index: usize) -> Self {
        Self {
            success: true,
            message: message.into(),
            next_action: NextAction::Continue,
            next_index: Some(next_index),
        }
    }

    /// Step is waiting; hold the index and resume at `at`.
    pub fn resume_at(message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            message: message.into(),
            next_action: NextAction::ResumeAt(at),
            next_index: None,
        }
    }

    /// Terminal step failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            next_action: NextAction::None,
            next_index: None,
        }
    }
}

/// External collaborators the interpreter may touch.
#[derive(Clone)]
pub struct Collaborators {
    pub email: Arc<dyn EmailTransport>,
    pub sms: Arc<dyn SmsTransport>,
    pub webhook: Arc<dyn WebhookSender>,
    pub ai: Arc<dyn AiProvider>,
    pub subjects: Arc<dyn SubjectStore>,
    pub templates: Arc<dyn TemplateStore>,
}

/// Runs one step of one execution.
pub struct StepInterpreter {
    collaborators: Collaborators,
    renderer: TemplateRenderer,
}

impl StepInterpreter {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            renderer: TemplateRenderer::new(),
        }
    }

    /// Execute the given step against the execution record.
    pub async fn run_step(
        &self,
        execution: &mut ExecutionRecord,
        mut subject: Option<&mut Subject>,
        step: &Step,
    ) -> Result<StepOutcome, StepError> {
        match step {
            Step::SendEmail(config) => {
                self.send_email(execution, subject.as_deref(), config).await
            }
            Step::SendSms(config) => self.send_sms(execution, subject.as_deref(), config).await,
            Step::Wait(config) => self.wait(execution, config),
            Step::Condition(config) => Ok(self.condition(execution, subject.as_deref(), config)),
            Step::CallAi(config) => self.call_ai(execution, subject.as_deref(), config).await,
            Step::UpdateCrm(config) => {
                self.update_crm(execution, subject.as_deref_mut(), config)
                    .await
            }
            Step::Webhook(config) => self.webhook(execution, config).await,
            Step::Unknown { kind } => Ok(StepOutcome::failed(format!(
                "Unknown step type: {}",
                kind
            ))),
        }
    }

    /// Combined `{contact, context}` document for template rendering.
    fn render_context(
        execution: &ExecutionRecord,
        subject: Option<&Subject>,
    ) -> serde_json::Value {
        serde_json::json!({
            "contact": subject.map(|s| s.as_context()).unwrap_or(serde_json::json!({})),
            "context": execution.context,
        })
    }

    async fn send_email(
        &self,
        execution: &mut ExecutionRecord,
        subject: Option<&Subject>,
        config: &SendEmailConfig,
    ) -> Result<StepOutcome, StepError> {
        let contact = subject
            .ok_or_else(|| StepError::Precondition("send_email requires a bound contact".into()))?;
        let to = contact
            .email
            .clone()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| StepError::Precondition("contact has no email address".into()))?;

        // Inline subject/body win over the named template.
        let (mut subject_line, mut body) = (config.subject.clone(), config.body.clone());
        if subject_line.is_none() || body.is_none() {
            if let Some(name) = &config.template {
                let template = self
                    .collaborators
                    .templates
                    .get(execution.tenant_id, name)
                    .await
                    .map_err(|e| StepError::Transient(e.to_string()))?
                    .ok_or_else(|| {
                        StepError::Config(format!("email template not found: {}", name))
                    })?;
                subject_line.get_or_insert(template.subject);
                body.get_or_insert(template.body);
            }
        }
        let subject_line = subject_line
            .ok_or_else(|| StepError::Config("send_email needs a subject or template".into()))?;
        let body =
            body.ok_or_else(|| StepError::Config("send_email needs a body or template".into()))?;

        let render_context = Self::render_context(execution, subject);
        let subject_line = self
            .renderer
            .render(&subject_line, &render_context)
            .map_err(|e| StepError::Config(e.to_string()))?;
        let body = self
            .renderer
            .render(&body, &render_context)
            .map_err(|e| StepError::Config(e.to_string()))?;

        let message = EmailMessage {
            to: to.clone(),
            subject: subject_line.clone(),
            body,
            from: None,
        };

        // Delivery is fire-and-forget: transport failure is logged, never
        // gates the step.
        if let Err(e) = self.collaborators.email.send(&message).await {
            tracing::warn!(to = %to, error = %e, "Email delivery failed");
        }

        execution.append_context(
            "emailsSent",
            serde_json::json!({
                "to": to,
                "subject": subject_line,
                "sentAt": Utc::now().to_rfc3339(),
            }),
        );

        Ok(StepOutcome::advanced(format!("Email sent to {}", to)))
    }

    async fn send_sms(
        &self,
        execution: &mut ExecutionRecord,
        subject: Option<&Subject>,
        config: &SendSmsConfig,
    ) -> Result<StepOutcome, StepError> {
        let contact = subject
            .ok_or_else(|| StepError::Precondition("send_sms requires a bound contact".into()))?;
        let to = contact
            .phone
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| StepError::Precondition("contact has no phone number".into()))?;

        let mut body = config.body.clone();
        if body.is_none() {
            if let Some(name) = &config.template {
                let template = self
                    .collaborators
                    .templates
                    .get(execution.tenant_id, name)
                    .await
                    .map_err(|e| StepError::Transient(e.to_string()))?
                    .ok_or_else(|| StepError::Config(format!("sms template not found: {}", name)))?;
                body = Some(template.body);
            }
        }
        let body =
            body.ok_or_else(|| StepError::Config("send_sms needs a body or template".into()))?;

        let render_context = Self::render_context(execution, subject);
        let body = self
            .renderer
            .render(&body, &render_context)
            .map_err(|e| StepError::Config(e.to_string()))?;

        let message = SmsMessage {
            to: to.clone(),
            body: body.clone(),
        };

        if let Err(e) = self.collaborators.sms.send(&message).await {
            tracing::warn!(to = %to, error = %e, "SMS delivery failed");
        }

        execution.append_context(
            "smsSent",
            serde_json::json!({
                "to": to,
                "body": body,
                "sentAt": Utc::now().to_rfc3339(),
            }),
        );

        Ok(StepOutcome::advanced(format!("SMS sent to {}", to)))
    }

    /// Resolve the wake time and either continue or suspend.
    ///
    /// A relative duration is pinned to an absolute instant the first time
    /// the step runs, so redelivery cannot re-arm the timer.
    fn wait(
        &self,
        execution: &mut ExecutionRecord,
        config: &WaitConfig,
    ) -> Result<StepOutcome, StepError> {
        let step_index = execution.current_step_index;
        let now = Utc::now();

        let target = match (config.until, config.duration_secs) {
            (Some(until), _) => until,
            (None, Some(secs)) => {
                if secs < 0 {
                    return Err(StepError::Config("wait duration must not be negative".into()));
                }
                match execution.wait_until(step_index) {
                    Some(recorded) => recorded,
                    None => {
                        let target = now + Duration::seconds(secs);
                        execution.set_wait_until(step_index, target);
                        target
                    }
                }
            }
            (None, None) => {
                return Err(StepError::Config(
                    "wait requires duration_secs or until".into(),
                ))
            }
        };

        if target <= now {
            Ok(StepOutcome::advanced("Wait elapsed"))
        } else {
            Ok(StepOutcome::resume_at(
                format!("Waiting until {}", target.to_rfc3339()),
                target,
            ))
        }
    }

    /// Evaluate a branch condition and pick the next step index.
    ///
    /// The one step type allowed to move the index non-monotonically.
    fn condition(
        &self,
        execution: &mut ExecutionRecord,
        subject: Option<&Subject>,
        config: &ConditionConfig,
    ) -> StepOutcome {
        let actual = resolve_field(&config.field, subject, &execution.context);
        let result = evaluate(config.operator, actual.as_ref(), &config.value);

        execution.set_context(
            "lastCondition",
            serde_json::json!({
                "field": config.field,
                "operator": config.operator.to_string(),
                "expected": config.value,
                "actual": actual.unwrap_or(serde_json::Value::Null),
                "result": result,
                "evaluatedAt": Utc::now().to_rfc3339(),
            }),
        );

        let branch = if result { config.if_true } else { config.if_false };
        let message = format!("Condition {} evaluated {}", config.field, result);

        match branch {
            Some(index) => StepOutcome::jump(message, index),
            None => StepOutcome::advanced(message),
        }
    }

    async fn call_ai(
        &self,
        execution: &mut ExecutionRecord,
        subject: Option<&Subject>,
        config: &CallAiConfig,
    ) -> Result<StepOutcome, StepError> {
        let render_context = Self::render_context(execution, subject);
        let prompt = self
            .renderer
            .render(&config.prompt, &render_context)
            .map_err(|e| StepError::Config(e.to_string()))?;

        // Provider faults (network, quota) bubble up transient: the job is
        // retried, the execution does not fail here.
        let response = self
            .collaborators
            .ai
            .generate(&prompt, &execution.context)
            .await?;

        execution.append_context(
            "aiResponses",
            serde_json::json!({
                "service": self.collaborators.ai.service_name(),
                "prompt": prompt,
                "response": response,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        );

        if let Some(key) = &config.output_key {
            execution.set_context(key, serde_json::Value::String(response));
        }

        Ok(StepOutcome::advanced("AI generation completed"))
    }

    async fn update_crm(
        &self,
        execution: &mut ExecutionRecord,
        subject: Option<&mut Subject>,
        config: &UpdateCrmConfig,
    ) -> Result<StepOutcome, StepError> {
        let contact = subject
            .ok_or_else(|| StepError::Precondition("update_crm requires a bound contact".into()))?;

        let mut applied = serde_json::Map::new();
        for (field, value) in &config.fields {
            if contact.apply_field(field, value) {
                applied.insert(field.clone(), value.clone());
            }
        }

        if !applied.is_empty() {
            contact.updated_at = Utc::now();
            self.collaborators
                .subjects
                .save(contact)
                .await
                .map_err(|e| StepError::Transient(e.to_string()))?;
        }

        let applied_count = applied.len();
        execution.append_context(
            "crmUpdates",
            serde_json::json!({
                "fields": applied,
                "updatedAt": Utc::now().to_rfc3339(),
            }),
        );

        Ok(StepOutcome::advanced(format!(
            "Updated {} contact field(s)",
            applied_count
        )))
    }

    async fn webhook(
        &self,
        execution: &mut ExecutionRecord,
        config: &WebhookConfig,
    ) -> Result<StepOutcome, StepError> {
        let request = WebhookRequest {
            url: config.url.clone(),
            method: config.method.clone(),
            headers: config.headers.clone(),
            payload: config.payload.clone(),
        };

        // Fire-and-forget with respect to the workflow: the call's own
        // outcome does not gate step success.
        let status = match self.collaborators.webhook.call(&request).await {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!(url = %config.url, error = %e, "Webhook delivery failed");
                None
            }
        };

        execution.append_context(
            "webhooks",
            serde_json::json!({
                "url": config.url,
                "method": config.method,
                "status": status,
                "sentAt": Utc::now().to_rfc3339(),
            }),
        );

        Ok(StepOutcome::advanced(format!("Webhook {} called", config.url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExecutionStatus, Operator, StepSpec};
    use crate::testing::{collaborators, TestChannels};
    use uuid::Uuid;

    fn execution() -> ExecutionRecord {
        ExecutionRecord::new(Uuid::new_v4(), Uuid::new_v4(), None)
    }

    fn contact(tenant_id: Uuid) -> Subject {
        let mut subject = Subject::new(tenant_id);
        subject.email = Some("ada@example.com".to_string());
        subject.phone = Some("+15550100".to_string());
        subject.first_name = Some("Ada".to_string());
        subject
    }

    #[tokio::test]
    async fn test_send_email_appends_context() {
        let (channels, interpreter) = interpreter();
        let mut execution = execution();
        let mut subject = contact(execution.tenant_id);

        let step = Step::parse(&StepSpec::new(
            "send_email",
            serde_json::json!({"subject": "Hi {{ contact.first_name }}", "body": "Welcome"}),
        ))
        .unwrap();

        let outcome = interpreter
            .run_step(&mut execution, Some(&mut subject), &step)
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.next_action, NextAction::Continue);
        assert_eq!(channels.email_sent(), 1);

        let sent = execution.context_get("emailsSent").unwrap();
        let entry = &sent.as_array().unwrap()[0];
        assert_eq!(entry.get("to").unwrap(), "ada@example.com");
        assert_eq!(entry.get("subject").unwrap(), "Hi Ada");
    }

    #[tokio::test]
    async fn test_send_email_without_subject_is_precondition_failure() {
        let (_, interpreter) = interpreter();
        let mut execution = execution();

        let step = Step::parse(&StepSpec::new(
            "send_email",
            serde_json::json!({"subject": "Hi", "body": "Welcome"}),
        ))
        .unwrap();

        let err = interpreter
            .run_step(&mut execution, None, &step)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_send_email_delivery_failure_does_not_fail_step() {
        let (channels, interpreter) = interpreter();
        channels.fail_email();
        let mut execution = execution();
        let mut subject = contact(execution.tenant_id);

        let step = Step::parse(&StepSpec::new(
            "send_email",
            serde_json::json!({"subject": "Hi", "body": "Welcome"}),
        ))
        .unwrap();

        let outcome = interpreter
            .run_step(&mut execution, Some(&mut subject), &step)
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(execution.context_get("emailsSent").is_some());
    }

    #[tokio::test]
    async fn test_send_sms_requires_phone() {
        let (_, interpreter) = interpreter();
        let mut execution = execution();
        let mut subject = contact(execution.tenant_id);
        subject.phone = None;

        let step = Step::parse(&StepSpec::new(
            "send_sms",
            serde_json::json!({"body": "Reminder"}),
        ))
        .unwrap();

        let err = interpreter
            .run_step(&mut execution, Some(&mut subject), &step)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_wait_zero_duration_continues() {
        let (_, interpreter) = interpreter();
        let mut execution = execution();

        let step = Step::parse(&StepSpec::new(
            "wait",
            serde_json::json!({"duration_secs": 0}),
        ))
        .unwrap();

        let outcome = interpreter
            .run_step(&mut execution, None, &step)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.next_action, NextAction::Continue);
    }

    #[tokio::test]
    async fn test_wait_future_time_suspends_and_pins_wake_time() {
        let (_, interpreter) = interpreter();
        let mut execution = execution();

        let step = Step::parse(&StepSpec::new(
            "wait",
            serde_json::json!({"duration_secs": 3600}),
        ))
        .unwrap();

        let outcome = interpreter
            .run_step(&mut execution, None, &step)
            .await
            .unwrap();
        let first_target = match outcome.next_action {
            NextAction::ResumeAt(t) => t,
            other => panic!("expected ResumeAt, got {:?}", other),
        };

        // Redelivery re-reads the recorded wake time instead of re-arming.
        let outcome = interpreter
            .run_step(&mut execution, None, &step)
            .await
            .unwrap();
        match outcome.next_action {
            NextAction::ResumeAt(t) => assert_eq!(t, first_target),
            other => panic!("expected ResumeAt, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wait_past_absolute_time_continues() {
        let (_, interpreter) = interpreter();
        let mut execution = execution();

        let step = Step::parse(&StepSpec::new(
            "wait",
            serde_json::json!({"until": "2020-01-01T00:00:00Z"}),
        ))
        .unwrap();

        let outcome = interpreter
            .run_step(&mut execution, None, &step)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.next_action, NextAction::Continue);
    }

    #[tokio::test]
    async fn test_condition_branches_and_records_evaluation() {
        let (_, interpreter) = interpreter();
        let mut execution = execution();
        execution.set_context("score", serde_json::json!(50));

        let step = Step::parse(&StepSpec::new(
            "condition",
            serde_json::json!({
                "field": "context.score",
                "operator": "equals",
                "value": 50,
                "if_true": 2,
                "if_false": 3
            }),
        ))
        .unwrap();

        let outcome = interpreter
            .run_step(&mut execution, None, &step)
            .await
            .unwrap();
        assert_eq!(outcome.next_index, Some(2));

        let last = execution.context_get("lastCondition").unwrap();
        assert_eq!(last.get("result").unwrap(), &serde_json::json!(true));
        assert_eq!(last.get("operator").unwrap(), "equals");
        assert_eq!(last.get("actual").unwrap(), &serde_json::json!(50));

        execution.set_context("score", serde_json::json!(10));
        let outcome = interpreter
            .run_step(&mut execution, None, &step)
            .await
            .unwrap();
        assert_eq!(outcome.next_index, Some(3));
    }

    #[tokio::test]
    async fn test_condition_without_branches_falls_through() {
        let (_, interpreter) = interpreter();
        let mut execution = execution();

        let step = Step::parse(&StepSpec::new(
            "condition",
            serde_json::json!({"field": "context.score", "operator": "is_empty"}),
        ))
        .unwrap();

        let outcome = interpreter
            .run_step(&mut execution, None, &step)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.next_index, None);
    }

    #[tokio::test]
    async fn test_call_ai_renders_prompt_and_logs_response() {
        let (channels, interpreter) = interpreter();
        let mut execution = execution();
        let mut subject = contact(execution.tenant_id);

        let step = Step::parse(&StepSpec::new(
            "call_ai",
            serde_json::json!({
                "prompt": "Draft a follow-up for {{ contact.first_name }}",
                "output_key": "followUpDraft"
            }),
        ))
        .unwrap();

        let outcome = interpreter
            .run_step(&mut execution, Some(&mut subject), &step)
            .await
            .unwrap();
        assert!(outcome.success);

        let responses = execution.context_get("aiResponses").unwrap();
        let entry = &responses.as_array().unwrap()[0];
        assert_eq!(
            entry.get("prompt").unwrap(),
            "Draft a follow-up for Ada"
        );
        assert!(execution.context_get("followUpDraft").is_some());
        assert_eq!(channels.ai_calls(), 1);
    }

    #[tokio::test]
    async fn test_call_ai_quota_exhaustion_is_transient() {
        let (channels, interpreter) = interpreter();
        channels.exhaust_ai_quota();
        let mut execution = execution();

        let step = Step::parse(&StepSpec::new(
            "call_ai",
            serde_json::json!({"prompt": "anything"}),
        ))
        .unwrap();

        let err = interpreter
            .run_step(&mut execution, None, &step)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        // Nothing was logged for the failed attempt.
        assert!(execution.context_get("aiResponses").is_none());
    }

    #[tokio::test]
    async fn test_update_crm_applies_known_fields_and_saves() {
        let (channels, interpreter) = interpreter();
        let mut execution = execution();
        let mut subject = contact(execution.tenant_id);

        let step = Step::parse(&StepSpec::new(
            "update_crm",
            serde_json::json!({"fields": {
                "first_name": "Grace",
                "leadScore": 90,
                "id": "must-not-apply"
            }}),
        ))
        .unwrap();

        let outcome = interpreter
            .run_step(&mut execution, Some(&mut subject), &step)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(subject.first_name.as_deref(), Some("Grace"));
        assert_eq!(subject.attributes.get("leadScore"), Some(&serde_json::json!(90)));

        let updates = execution.context_get("crmUpdates").unwrap();
        let fields = updates.as_array().unwrap()[0].get("fields").unwrap();
        assert!(fields.get("first_name").is_some());
        assert!(fields.get("id").is_none());
        assert_eq!(channels.subjects_saved(), 1);
    }

    #[tokio::test]
    async fn test_webhook_failure_does_not_fail_step() {
        let (channels, interpreter) = interpreter();
        channels.fail_webhook();
        let mut execution = execution();

        let step = Step::parse(&StepSpec::new(
            "webhook",
            serde_json::json!({"url": "https://example.com/hook", "payload": {"ping": true}}),
        ))
        .unwrap();

        let outcome = interpreter
            .run_step(&mut execution, None, &step)
            .await
            .unwrap();
        assert!(outcome.success);

        let hooks = execution.context_get("webhooks").unwrap();
        let entry = &hooks.as_array().unwrap()[0];
        assert_eq!(entry.get("url").unwrap(), "https://example.com/hook");
        assert!(entry.get("status").unwrap().is_null());
    }

    #[tokio::test]
    async fn test_unknown_step_fails_terminally() {
        let (_, interpreter) = interpreter();
        let mut execution = execution();

        let step = Step::parse(&StepSpec::new("nonexistent", serde_json::json!({}))).unwrap();
        let outcome = interpreter
            .run_step(&mut execution, None, &step)
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.message, "Unknown step type: nonexistent");
        assert_eq!(outcome.next_action, NextAction::None);
        assert_eq!(execution.status, ExecutionStatus::Active);
    }

    fn interpreter() -> (TestChannels, StepInterpreter) {
        let channels = TestChannels::new();
        let interpreter = StepInterpreter::new(collaborators(&channels));
        (channels, interpreter)
    }

    #[test]
    fn test_operator_display_used_in_log() {
        assert_eq!(Operator::GreaterThan.to_string(), "greater_than");
    }
}
