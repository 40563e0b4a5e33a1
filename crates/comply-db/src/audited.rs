//! Audited mutation executor.
//!
//! Every state change to users, institutions, compliance resources,
//! assignments and invites goes through [`AuditedExecutor::mutate`]:
//!
//! 1. the capability assertion runs against the caller's
//!    [`AccessContext`]; on failure nothing else happens;
//! 2. the mutation closure reads through the client and *stages* writes on
//!    a [`MutationTx`], declaring the old and new value of every field it
//!    touches;
//! 3. on success the staged writes, existence guards and one `audit_log`
//!    row per changed field are committed in a single SurrealDB
//!    transaction.
//!
//! Fields whose old and new values are equal are neither written nor
//! audited. A closure error discards everything staged; a failing
//! statement (guard, unique index, ASSERT) aborts the whole transaction.
//!
//! Reads made by the closure happen outside the commit transaction; two
//! concurrent mutations of the same row can both observe the same old
//! value.

use chrono::{DateTime, Utc};
use comply_core::context::AccessContext;
use comply_core::error::{ComplyError, ComplyResult};
use comply_core::models::audit::{AuditValue, ChangeType, EntityType};
use surrealdb::{Connection, Surreal};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, NOT_FOUND_MARKER};
use crate::repository::check_response;

/// What a mutation is about, recorded on every audit row it produces.
#[derive(Debug, Clone)]
pub struct MutationRequest {
    pub entity_type: EntityType,
    /// `None` when the id is generated inside the mutation.
    pub entity_id: Option<Uuid>,
    /// Default change type for staged writes.
    pub change_type: ChangeType,
    pub institution_id: Option<Uuid>,
    pub reason: Option<String>,
}

impl MutationRequest {
    pub fn new(entity_type: EntityType, change_type: ChangeType) -> Self {
        Self {
            entity_type,
            entity_id: None,
            change_type,
            institution_id: None,
            reason: None,
        }
    }

    pub fn entity(mut self, id: Uuid) -> Self {
        self.entity_id = Some(id);
        self
    }

    pub fn institution(mut self, institution_id: Option<Uuid>) -> Self {
        self.institution_id = institution_id;
        self
    }

    pub fn reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }
}

enum Param {
    Json(serde_json::Value),
    Date(DateTime<Utc>),
}

#[derive(Debug, Clone)]
struct FieldChange {
    entity_type: EntityType,
    entity_id: Uuid,
    field: String,
    old: Option<String>,
    new: Option<String>,
    change_type: ChangeType,
}

/// Staging area handed to a mutation closure.
pub struct MutationTx<C: Connection> {
    db: Surreal<C>,
    change_type: ChangeType,
    now: DateTime<Utc>,
    statements: Vec<String>,
    params: Vec<(String, Param)>,
    changes: Vec<FieldChange>,
}

impl<C: Connection> MutationTx<C> {
    fn new(db: Surreal<C>, change_type: ChangeType) -> Self {
        Self {
            db,
            change_type,
            now: Utc::now(),
            statements: Vec::new(),
            params: Vec::new(),
            changes: Vec::new(),
        }
    }

    /// Client for reads. Writes must be staged.
    pub fn client(&self) -> &Surreal<C> {
        &self.db
    }

    /// Commit timestamp shared by every write and audit row.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Bind a value under a fresh parameter name and return the name
    /// (with its `$`) for use in a raw statement.
    pub fn param(&mut self, value: impl Into<serde_json::Value>) -> String {
        self.push_param(Param::Json(value.into()))
    }

    pub fn date_param(&mut self, value: DateTime<Utc>) -> String {
        self.push_param(Param::Date(value))
    }

    fn push_param(&mut self, param: Param) -> String {
        let name = format!("p{}", self.params.len());
        let placeholder = format!("${name}");
        self.params.push((name, param));
        placeholder
    }

    /// SQL expression for a field value. `Null` is written as `NONE` so
    /// optional fields are cleared rather than set to JSON null.
    fn value_expr(&mut self, value: &AuditValue) -> String {
        match value {
            AuditValue::Null => "NONE".to_string(),
            AuditValue::Text(s) => self.param(s.clone()),
            AuditValue::Number(n) => self.param(serde_json::Value::Number(n.clone())),
            AuditValue::Bool(b) => self.param(*b),
            AuditValue::Date(d) => self.date_param(*d),
            AuditValue::Json(v) => self.param(v.clone()),
        }
    }

    /// Append a statement that is not field-audited by itself. Pair it
    /// with [`MutationTx::audit`] when it changes audited state.
    pub fn stage_raw(&mut self, statement: impl Into<String>) {
        self.statements.push(statement.into());
    }

    /// Record an audit entry for a change staged by hand.
    pub fn audit(
        &mut self,
        entity_type: EntityType,
        entity_id: Uuid,
        field: &str,
        old: impl Into<AuditValue>,
        new: impl Into<AuditValue>,
    ) {
        let change_type = self.change_type;
        self.audit_as(entity_type, entity_id, field, old.into(), new.into(), change_type);
    }

    fn audit_as(
        &mut self,
        entity_type: EntityType,
        entity_id: Uuid,
        field: &str,
        old: AuditValue,
        new: AuditValue,
        change_type: ChangeType,
    ) {
        self.changes.push(FieldChange {
            entity_type,
            entity_id,
            field: field.to_string(),
            old: old.to_audit_string(),
            new: new.to_audit_string(),
            change_type,
        });
    }

    fn guard_exists(&mut self, entity_type: EntityType, id: Uuid) {
        let table = entity_type.table();
        let id_param = self.param(id.to_string());
        self.statements.push(format!(
            "IF array::len((SELECT id FROM type::record('{table}', {id_param}) \
             WHERE deleted_at = NONE)) = 0 \
             {{ THROW \"{NOT_FOUND_MARKER}{table}:{id}\" }};"
        ));
    }

    /// Start an update of an existing, live row.
    pub fn update(&mut self, entity_type: EntityType, id: Uuid) -> UpdateBuilder<'_, C> {
        UpdateBuilder {
            change_type: self.change_type,
            tx: self,
            entity_type,
            id,
            fields: Vec::new(),
        }
    }

    /// Start the creation of a new row.
    pub fn create(&mut self, entity_type: EntityType, id: Uuid) -> CreateBuilder<'_, C> {
        CreateBuilder {
            tx: self,
            entity_type,
            id,
            fields: Vec::new(),
        }
    }

    /// Mark a live row deleted. Rows are never removed.
    pub fn soft_delete(&mut self, entity_type: EntityType, id: Uuid) {
        self.guard_exists(entity_type, id);
        let table = entity_type.table();
        let id_param = self.param(id.to_string());
        self.statements.push(format!(
            "UPDATE type::record('{table}', {id_param}) \
             SET deleted_at = $ts, updated_at = $ts;"
        ));
        let now = self.now;
        self.audit_as(
            entity_type,
            id,
            "deleted_at",
            AuditValue::Null,
            AuditValue::Date(now),
            ChangeType::Delete,
        );
    }

    fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.changes.is_empty()
    }
}

/// Field-level update staged on a [`MutationTx`].
pub struct UpdateBuilder<'t, C: Connection> {
    tx: &'t mut MutationTx<C>,
    entity_type: EntityType,
    id: Uuid,
    change_type: ChangeType,
    fields: Vec<(String, AuditValue, AuditValue)>,
}

impl<C: Connection> UpdateBuilder<'_, C> {
    pub fn set(
        mut self,
        field: &str,
        old: impl Into<AuditValue>,
        new: impl Into<AuditValue>,
    ) -> Self {
        self.fields.push((field.to_string(), old.into(), new.into()));
        self
    }

    pub fn change_type(mut self, change_type: ChangeType) -> Self {
        self.change_type = change_type;
        self
    }

    /// Stage the changed fields. Returns `false` when every field was
    /// unchanged and nothing was staged.
    pub fn stage(self) -> bool {
        let changed: Vec<_> = self
            .fields
            .into_iter()
            .filter(|(_, old, new)| old.to_audit_string() != new.to_audit_string())
            .collect();
        if changed.is_empty() {
            return false;
        }

        let tx = self.tx;
        tx.guard_exists(self.entity_type, self.id);

        let mut sets = Vec::with_capacity(changed.len() + 1);
        for (field, _, new) in &changed {
            let expr = tx.value_expr(new);
            sets.push(format!("{field} = {expr}"));
        }
        sets.push("updated_at = $ts".to_string());

        let table = self.entity_type.table();
        let id_param = tx.param(self.id.to_string());
        tx.statements.push(format!(
            "UPDATE type::record('{table}', {id_param}) SET {};",
            sets.join(", ")
        ));

        for (field, old, new) in changed {
            tx.audit_as(self.entity_type, self.id, &field, old, new, self.change_type);
        }
        true
    }
}

/// Row creation staged on a [`MutationTx`].
pub struct CreateBuilder<'t, C: Connection> {
    tx: &'t mut MutationTx<C>,
    entity_type: EntityType,
    id: Uuid,
    fields: Vec<(String, AuditValue, bool)>,
}

impl<C: Connection> CreateBuilder<'_, C> {
    pub fn field(mut self, field: &str, value: impl Into<AuditValue>) -> Self {
        self.fields.push((field.to_string(), value.into(), true));
        self
    }

    /// A field that is written but never copied into the audit log.
    pub fn secret_field(mut self, field: &str, value: impl Into<AuditValue>) -> Self {
        self.fields.push((field.to_string(), value.into(), false));
        self
    }

    pub fn stage(self) {
        let tx = self.tx;
        let mut sets = Vec::with_capacity(self.fields.len() + 2);
        for (field, value, _) in &self.fields {
            if value.is_null() {
                continue;
            }
            let expr = tx.value_expr(value);
            sets.push(format!("{field} = {expr}"));
        }
        sets.push("created_at = $ts".to_string());
        sets.push("updated_at = $ts".to_string());

        let table = self.entity_type.table();
        let id_param = tx.param(self.id.to_string());
        tx.statements.push(format!(
            "CREATE type::record('{table}', {id_param}) SET {};",
            sets.join(", ")
        ));

        for (field, value, audited) in self.fields {
            if audited && !value.is_null() {
                tx.audit_as(
                    self.entity_type,
                    self.id,
                    &field,
                    AuditValue::Null,
                    value,
                    ChangeType::Create,
                );
            }
        }
    }
}

/// Runs mutations with capability checks and field-level audit.
#[derive(Clone)]
pub struct AuditedExecutor<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> AuditedExecutor<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    pub fn client(&self) -> &Surreal<C> {
        &self.db
    }

    /// Assert, stage and commit one audited mutation.
    pub async fn mutate<T, A, M>(
        &self,
        ctx: &AccessContext,
        request: MutationRequest,
        assert_capability: A,
        mutation: M,
    ) -> ComplyResult<T>
    where
        A: AsyncFnOnce(&AccessContext) -> ComplyResult<()>,
        M: AsyncFnOnce(&mut MutationTx<C>) -> ComplyResult<T>,
    {
        if let Err(err) = assert_capability(ctx).await {
            debug!(
                user_id = %ctx.user_id,
                role = %ctx.role,
                entity_type = %request.entity_type,
                error = %err,
                "Mutation rejected by capability check"
            );
            return Err(err);
        }

        let mut tx = MutationTx::new(self.db.clone(), request.change_type);
        let value = mutation(&mut tx).await?;

        if tx.is_empty() {
            debug!(entity_type = %request.entity_type, "Mutation staged no changes");
            return Ok(value);
        }
        if tx.changes.is_empty() {
            return Err(ComplyError::Internal(format!(
                "{} mutation staged writes without audit entries",
                request.entity_type
            )));
        }

        let mutation_id = Uuid::new_v4();
        let entries = tx.changes.len();
        self.commit(ctx, &request, mutation_id, tx).await?;

        info!(
            mutation_id = %mutation_id,
            user_id = %ctx.user_id,
            entity_type = %request.entity_type,
            entity_id = ?request.entity_id,
            entries,
            "Audited mutation committed"
        );
        Ok(value)
    }

    async fn commit(
        &self,
        ctx: &AccessContext,
        request: &MutationRequest,
        mutation_id: Uuid,
        mut tx: MutationTx<C>,
    ) -> ComplyResult<()> {
        let institution = match request.institution_id {
            Some(id) => tx.param(id.to_string()),
            None => "NONE".to_string(),
        };
        let reason = match &request.reason {
            Some(r) => tx.param(r.clone()),
            None => "NONE".to_string(),
        };

        let changes = std::mem::take(&mut tx.changes);
        let mut audit_rows = Vec::with_capacity(changes.len());
        for change in changes {
            let row_id = tx.param(Uuid::new_v4().to_string());
            let entity_id = tx.param(change.entity_id.to_string());
            let field = tx.param(change.field);
            let old = match change.old {
                Some(v) => tx.param(v),
                None => "NONE".to_string(),
            };
            let new = match change.new {
                Some(v) => tx.param(v),
                None => "NONE".to_string(),
            };
            audit_rows.push(format!(
                "CREATE type::record('audit_log', {row_id}) SET mutation_id = $mutation_id, \
                 entity_type = '{}', entity_id = {entity_id}, \
                 field_name = {field}, old_value = {old}, new_value = {new}, \
                 changed_by = $changed_by, role_at_time = $role_at_time, \
                 change_type = '{}', institution_id = {institution}, \
                 reason = {reason}, timestamp = $ts;",
                change.entity_type.as_str(),
                change.change_type.as_str(),
            ));
        }

        let mut sql = String::from("BEGIN TRANSACTION;\n");
        for statement in tx.statements.iter().chain(audit_rows.iter()) {
            sql.push_str(statement);
            sql.push('\n');
        }
        sql.push_str("COMMIT TRANSACTION;");

        let mut query = self
            .db
            .query(sql)
            .bind(("ts", tx.now))
            .bind(("mutation_id", mutation_id.to_string()))
            .bind(("changed_by", ctx.user_id.to_string()))
            .bind(("role_at_time", ctx.role.as_str().to_string()));
        for (name, param) in tx.params {
            query = match param {
                Param::Json(v) => query.bind((name, v)),
                Param::Date(d) => query.bind((name, d)),
            };
        }

        let mut response = query.await.map_err(DbError::from)?;
        let Err(err) = check_response(&mut response) else {
            return Ok(());
        };
        match &err {
            DbError::NotFound { .. } | DbError::Conflict { .. } => {
                debug!(mutation_id = %mutation_id, error = %err, "Audited mutation aborted");
            }
            _ => warn!(mutation_id = %mutation_id, error = %err, "Audited mutation failed"),
        }
        Err(err.into())
    }
}
