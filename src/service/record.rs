//! Record service
//!
//! Wraps the [`Repository`] with access rules, payload validation, lifecycle
//! hooks and change broadcasts. Before-hooks may rewrite the record or abort
//! the operation; after-hook failures are logged and otherwise ignored.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, VaultError};
use crate::hooks::{HookPhase, HookRegistry};
use crate::realtime::{Broadcaster, ChangeAction, Message};
use crate::record::{ListParams, Record, RecordList};
use crate::repository::Repository;
use crate::rules::{EvaluationContext, authorize, evaluate};
use crate::schema::{Collection, RuleAction, SYSTEM_COLUMNS};
use crate::service::validator::validate_record;

pub struct RecordService {
    repo: Arc<Repository>,
    hooks: HookRegistry,
    broadcaster: Option<Arc<dyn Broadcaster>>,
}

impl RecordService {
    pub fn new(
        repo: Arc<Repository>,
        hooks: HookRegistry,
        broadcaster: Option<Arc<dyn Broadcaster>>,
    ) -> Self {
        Self {
            repo,
            hooks,
            broadcaster,
        }
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repo
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub async fn close(&self) {
        self.repo.close().await;
    }

    fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.repo
            .registry()
            .get_collection(name)
            .ok_or_else(|| VaultError::collection_not_found(name))
    }

    fn broadcast(&self, action: ChangeAction, record: &Record) {
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.broadcast(Message::new(action, record.clone()));
        }
    }

    fn run_after_hooks(&self, phase: HookPhase, record: &mut Record) {
        let collection = record.collection.clone();
        if let Err(e) = self.hooks.trigger(&collection, phase, record) {
            warn!(
                %collection,
                record_id = %record.id,
                %phase,
                error = %e,
                "after hook failed"
            );
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_record(
        &self,
        collection_name: &str,
        id: &str,
        ctx: &EvaluationContext,
    ) -> Result<Record> {
        let collection = self.collection(collection_name)?;
        let record = self.repo.find_record_by_id(collection_name, id).await?;

        let ctx = ctx.clone().with_record(record.to_context_map());
        authorize(&collection, RuleAction::View, &ctx)?;
        Ok(record)
    }

    /// List records, keeping only those the list rule allows
    ///
    /// `total_items` counts matching rows before the rule is applied.
    pub async fn list_records(
        &self,
        collection_name: &str,
        params: &ListParams,
        ctx: &EvaluationContext,
    ) -> Result<RecordList> {
        let collection = self.collection(collection_name)?;
        let mut list = self.repo.list_records(collection_name, params).await?;

        let rule = collection.rule(RuleAction::List).unwrap_or("");
        if ctx.is_admin || rule.is_empty() {
            return Ok(list);
        }

        list.items.retain(|record| {
            let ctx = ctx.clone().with_record(record.to_context_map());
            match evaluate(rule, &ctx) {
                Ok(allowed) => allowed,
                Err(e) => {
                    debug!(collection = %collection.name, error = %e, "list rule failed, hiding record");
                    false
                }
            }
        });
        Ok(list)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create a record with a fresh UUID id
    pub async fn create_record(
        &self,
        collection_name: &str,
        mut data: Map<String, Value>,
        ctx: &EvaluationContext,
    ) -> Result<Record> {
        let collection = self.collection(collection_name)?;

        let rule_ctx = ctx.clone().with_data(data.clone());
        authorize(&collection, RuleAction::Create, &rule_ctx)?;
        validate_record(&collection, &data)?;

        let id = Uuid::new_v4().to_string();
        data.insert("id".to_string(), Value::String(id.clone()));

        let mut record = Record::new(collection_name);
        record.id = id;
        record.data = data;
        self.hooks
            .trigger(collection_name, HookPhase::BeforeCreate, &mut record)?;

        // Hooks may have replaced the id
        record.data.insert("id".to_string(), Value::String(record.id.clone()));
        let mut created = self.repo.create_record(collection_name, record.data).await?;

        self.run_after_hooks(HookPhase::AfterCreate, &mut created);
        self.broadcast(ChangeAction::Create, &created);
        Ok(created)
    }

    /// Merge `data` into an existing record
    pub async fn update_record(
        &self,
        collection_name: &str,
        id: &str,
        data: Map<String, Value>,
        ctx: &EvaluationContext,
    ) -> Result<Record> {
        let collection = self.collection(collection_name)?;
        let mut record = self.repo.find_record_by_id(collection_name, id).await?;

        let rule_ctx = ctx
            .clone()
            .with_data(data.clone())
            .with_record(record.to_context_map());
        authorize(&collection, RuleAction::Update, &rule_ctx)?;

        for (key, value) in data {
            if !SYSTEM_COLUMNS.contains(&key.as_str()) {
                record.data.insert(key, value);
            }
        }
        validate_record(&collection, &record.data)?;

        self.hooks
            .trigger(collection_name, HookPhase::BeforeUpdate, &mut record)?;

        let mut updated = self
            .repo
            .update_record(collection_name, id, record.data)
            .await?;

        self.run_after_hooks(HookPhase::AfterUpdate, &mut updated);
        self.broadcast(ChangeAction::Update, &updated);
        Ok(updated)
    }

    pub async fn delete_record(
        &self,
        collection_name: &str,
        id: &str,
        ctx: &EvaluationContext,
    ) -> Result<()> {
        let collection = self.collection(collection_name)?;
        let mut record = self.repo.find_record_by_id(collection_name, id).await?;

        let rule_ctx = ctx.clone().with_record(record.to_context_map());
        authorize(&collection, RuleAction::Delete, &rule_ctx)?;

        self.hooks
            .trigger(collection_name, HookPhase::BeforeDelete, &mut record)?;
        self.repo.delete_record(collection_name, id).await?;

        self.run_after_hooks(HookPhase::AfterDelete, &mut record);
        self.broadcast(ChangeAction::Delete, &record);
        Ok(())
    }

    /// Delete several records, skipping any that cannot be deleted
    ///
    /// Returns the ids that were actually deleted.
    pub async fn delete_records(
        &self,
        collection_name: &str,
        ids: &[String],
        ctx: &EvaluationContext,
    ) -> Result<Vec<String>> {
        self.collection(collection_name)?;

        let mut deleted = Vec::with_capacity(ids.len());
        for id in ids {
            match self.delete_record(collection_name, id, ctx).await {
                Ok(()) => deleted.push(id.clone()),
                Err(e) => {
                    debug!(collection = collection_name, record_id = %id, error = %e, "skipping record in batch delete");
                }
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationEngine;
    use crate::realtime::Hub;
    use crate::registry::SchemaRegistry;
    use crate::types::{Field, FieldType};
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn notes() -> Collection {
        Collection::new("notes")
            .with_field(Field::new("body", FieldType::Text).required())
            .with_field(Field::new("owner", FieldType::Text))
            .with_field(Field::new("slug", FieldType::Text))
            .with_rule(RuleAction::Create, "@request.auth.id != ''")
            .with_rule(RuleAction::View, "owner = @request.auth.id")
            .with_rule(RuleAction::List, "owner = @request.auth.id")
            .with_rule(RuleAction::Update, "owner = @request.auth.id")
            .with_rule(RuleAction::Delete, "owner = @request.auth.id")
    }

    async fn service(hooks: HookRegistry, hub: Option<Arc<Hub>>) -> RecordService {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .expect("Should open in-memory database");
        let registry = Arc::new(SchemaRegistry::new(pool.clone(), "_collections"));
        MigrationEngine::new(pool, "_collections")
            .sync_collection(&notes())
            .await
            .expect("Should sync notes");
        registry.add_collection(notes());

        let broadcaster = hub.map(|h| h as Arc<dyn Broadcaster>);
        RecordService::new(Arc::new(Repository::new(registry)), hooks, broadcaster)
    }

    #[tokio::test]
    async fn test_create_assigns_uuid_and_broadcasts() {
        let hub = Arc::new(Hub::default());
        let mut rx = hub.subscribe();
        let svc = service(HookRegistry::new(), Some(Arc::clone(&hub))).await;

        let ctx = EvaluationContext::authenticated("u1");
        let record = svc
            .create_record("notes", data(json!({"body": "hi", "owner": "u1"})), &ctx)
            .await
            .expect("Should create note");
        assert!(Uuid::parse_str(&record.id).is_ok());

        let msg = rx.try_recv().expect("Should broadcast create");
        assert_eq!(msg.action, ChangeAction::Create);
        assert_eq!(msg.record.id, record.id);
    }

    #[tokio::test]
    async fn test_rules_are_enforced() {
        let svc = service(HookRegistry::new(), None).await;

        let anonymous = EvaluationContext::new();
        let err = svc
            .create_record("notes", data(json!({"body": "hi"})), &anonymous)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");

        let owner = EvaluationContext::authenticated("u1");
        let record = svc
            .create_record("notes", data(json!({"body": "hi", "owner": "u1"})), &owner)
            .await
            .unwrap();

        let stranger = EvaluationContext::authenticated("u2");
        assert!(svc.get_record("notes", &record.id, &owner).await.is_ok());
        assert_eq!(
            svc.get_record("notes", &record.id, &stranger)
                .await
                .unwrap_err()
                .code(),
            "FORBIDDEN"
        );
        assert!(
            svc.get_record("notes", &record.id, &EvaluationContext::admin())
                .await
                .is_ok()
        );

        let visible = svc
            .list_records("notes", &ListParams::new(), &stranger)
            .await
            .unwrap();
        assert!(visible.items.is_empty());
        assert_eq!(visible.total_items, 1);
    }

    #[tokio::test]
    async fn test_blank_list_rule_hides_records() {
        let svc = service(HookRegistry::new(), None).await;
        let owner = EvaluationContext::authenticated("u1");
        svc.create_record("notes", data(json!({"body": "hi", "owner": "u1"})), &owner)
            .await
            .unwrap();

        let blank = notes().with_rule(RuleAction::List, " ");
        svc.repository().registry().add_collection(blank);

        let visible = svc
            .list_records("notes", &ListParams::new(), &owner)
            .await
            .unwrap();
        assert!(visible.items.is_empty());
    }

    #[tokio::test]
    async fn test_validation_runs_before_insert() {
        let svc = service(HookRegistry::new(), None).await;
        let ctx = EvaluationContext::authenticated("u1");
        let err = svc
            .create_record("notes", data(json!({"owner": "u1"})), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert_eq!(svc.repository().query_count(), 0);
    }

    #[tokio::test]
    async fn test_before_hook_rewrites_and_aborts() {
        let mut hooks = HookRegistry::new();
        hooks.on_before_create("notes", |r| {
            let slug = r.get_string("body").to_lowercase().replace(' ', "-");
            r.data.insert("slug".into(), json!(slug));
            Ok(())
        });
        hooks.on_before_delete("notes", |_| Err(VaultError::hook("notes are permanent")));
        let svc = service(hooks, None).await;
        let ctx = EvaluationContext::authenticated("u1");

        let record = svc
            .create_record("notes", data(json!({"body": "Hello World", "owner": "u1"})), &ctx)
            .await
            .unwrap();
        assert_eq!(record.get_string("slug"), "hello-world");

        let err = svc.delete_record("notes", &record.id, &ctx).await.unwrap_err();
        assert_eq!(err.code(), "HOOK_FAILED");
        assert!(svc.get_record("notes", &record.id, &ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_after_hook_failure_is_not_an_error() {
        let mut hooks = HookRegistry::new();
        hooks.register("notes", HookPhase::AfterCreate, |_| {
            Err(VaultError::hook("mailer down"))
        });
        let svc = service(hooks, None).await;

        let result = svc
            .create_record(
                "notes",
                data(json!({"body": "x", "owner": "u1"})),
                &EvaluationContext::authenticated("u1"),
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_update_merges_and_revalidates() {
        let svc = service(HookRegistry::new(), None).await;
        let ctx = EvaluationContext::authenticated("u1");
        let record = svc
            .create_record("notes", data(json!({"body": "a", "owner": "u1"})), &ctx)
            .await
            .unwrap();

        let updated = svc
            .update_record("notes", &record.id, data(json!({"slug": "s"})), &ctx)
            .await
            .expect("Should update");
        assert_eq!(updated.get_string("body"), "a");
        assert_eq!(updated.get_string("slug"), "s");

        let err = svc
            .update_record("notes", &record.id, data(json!({"body": ""})), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn test_batch_delete_skips_failures() {
        let svc = service(HookRegistry::new(), None).await;
        let u1 = EvaluationContext::authenticated("u1");
        let u2 = EvaluationContext::authenticated("u2");

        let mine = svc
            .create_record("notes", data(json!({"body": "a", "owner": "u1"})), &u1)
            .await
            .unwrap();
        let theirs = svc
            .create_record("notes", data(json!({"body": "b", "owner": "u2"})), &u2)
            .await
            .unwrap();

        let ids = vec![mine.id.clone(), theirs.id.clone(), "missing".to_string()];
        let deleted = svc
            .delete_records("notes", &ids, &u1)
            .await
            .expect("Batch delete should not fail");
        assert_eq!(deleted, vec![mine.id.clone()]);
        assert!(svc.get_record("notes", &theirs.id, &u2).await.is_ok());
    }
}
