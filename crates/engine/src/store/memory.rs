//! In-memory store implementations for tests and local development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::EngineResult;
use crate::model::{ExecutionRecord, MessageTemplate, Subject, WorkflowDefinition};
use crate::store::{ExecutionStore, SubjectStore, TemplateStore, WorkflowStore};

/// In-memory workflow definitions, keyed by (tenant, id).
#[derive(Default)]
pub struct MemoryWorkflowStore {
    items: RwLock<HashMap<(Uuid, Uuid), WorkflowDefinition>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> EngineResult<Option<WorkflowDefinition>> {
        let items = self.items.read().expect("lock poisoned");
        Ok(items.get(&(tenant_id, id)).cloned())
    }

    async fn active_for_tenant(&self, tenant_id: Uuid) -> EngineResult<Vec<WorkflowDefinition>> {
        let items = self.items.read().expect("lock poisoned");
        let mut workflows: Vec<WorkflowDefinition> = items
            .values()
            .filter(|w| w.tenant_id == tenant_id && w.is_active)
            .cloned()
            .collect();
        workflows.sort_by_key(|w| w.created_at);
        Ok(workflows)
    }

    async fn put(&self, workflow: &WorkflowDefinition) -> EngineResult<()> {
        let mut items = self.items.write().expect("lock poisoned");
        items.insert((workflow.tenant_id, workflow.id), workflow.clone());
        Ok(())
    }
}

/// In-memory execution records.
#[derive(Default)]
pub struct MemoryExecutionStore {
    items: RwLock<HashMap<(Uuid, Uuid), ExecutionRecord>>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> EngineResult<Option<ExecutionRecord>> {
        let items = self.items.read().expect("lock poisoned");
        Ok(items.get(&(tenant_id, id)).cloned())
    }

    async fn create(&self, execution: &ExecutionRecord) -> EngineResult<()> {
        self.save(execution).await
    }

    async fn save(&self, execution: &ExecutionRecord) -> EngineResult<()> {
        let mut items = self.items.write().expect("lock poisoned");
        items.insert((execution.tenant_id, execution.id), execution.clone());
        Ok(())
    }
}

/// In-memory subjects.
#[derive(Default)]
pub struct MemorySubjectStore {
    items: RwLock<HashMap<(Uuid, Uuid), Subject>>,
}

impl MemorySubjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubjectStore for MemorySubjectStore {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> EngineResult<Option<Subject>> {
        let items = self.items.read().expect("lock poisoned");
        Ok(items.get(&(tenant_id, id)).cloned())
    }

    async fn save(&self, subject: &Subject) -> EngineResult<()> {
        let mut items = self.items.write().expect("lock poisoned");
        items.insert((subject.tenant_id, subject.id), subject.clone());
        Ok(())
    }
}

/// In-memory message templates, keyed by (tenant, name).
#[derive(Default)]
pub struct MemoryTemplateStore {
    items: RwLock<HashMap<(Uuid, String), MessageTemplate>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant_id: Uuid, template: MessageTemplate) {
        let mut items = self.items.write().expect("lock poisoned");
        items.insert((tenant_id, template.name.clone()), template);
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn get(&self, tenant_id: Uuid, name: &str) -> EngineResult<Option<MessageTemplate>> {
        let items = self.items.read().expect("lock poisoned");
        Ok(items.get(&(tenant_id, name.to_string())).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TriggerPredicate;

    #[tokio::test]
    async fn test_workflow_store_tenant_isolation() {
        let store = MemoryWorkflowStore::new();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        let workflow = WorkflowDefinition::new(
            tenant_a,
            "drip",
            TriggerPredicate {
                event_type: "contact_created".to_string(),
                conditions: vec![],
            },
            vec![],
        );
        store.put(&workflow).await.unwrap();

        assert!(store.get(tenant_a, workflow.id).await.unwrap().is_some());
        assert!(store.get(tenant_b, workflow.id).await.unwrap().is_none());
        assert_eq!(store.active_for_tenant(tenant_a).await.unwrap().len(), 1);
        assert!(store.active_for_tenant(tenant_b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_workflows_are_filtered() {
        let store = MemoryWorkflowStore::new();
        let tenant = Uuid::new_v4();

        let mut workflow = WorkflowDefinition::new(
            tenant,
            "paused-campaign",
            TriggerPredicate {
                event_type: "contact_created".to_string(),
                conditions: vec![],
            },
            vec![],
        );
        workflow.is_active = false;
        store.put(&workflow).await.unwrap();

        assert!(store.active_for_tenant(tenant).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execution_store_roundtrip() {
        let store = MemoryExecutionStore::new();
        let mut execution = ExecutionRecord::new(Uuid::new_v4(), Uuid::new_v4(), None);
        store.create(&execution).await.unwrap();

        execution.current_step_index = 2;
        store.save(&execution).await.unwrap();

        let restored = store
            .get(execution.tenant_id, execution.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(restored.current_step_index, 2);
    }

    #[tokio::test]
    async fn test_template_store_lookup() {
        let store = MemoryTemplateStore::new();
        let tenant = Uuid::new_v4();
        store.insert(
            tenant,
            MessageTemplate {
                name: "welcome".to_string(),
                subject: "Welcome".to_string(),
                body: "Hi {{ contact.first_name }}".to_string(),
            },
        );

        assert!(store.get(tenant, "welcome").await.unwrap().is_some());
        assert!(store.get(tenant, "missing").await.unwrap().is_none());
        assert!(store.get(Uuid::new_v4(), "welcome").await.unwrap().is_none());
    }
}
