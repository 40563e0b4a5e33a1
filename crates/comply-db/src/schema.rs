//! Schema definitions and migration runner for SurrealDB.
//!
//! All tables are SCHEMAFULL. UUIDs are stored as strings and enums as
//! their SCREAMING_SNAKE names with ASSERT constraints. Soft deletion is
//! an optional `deleted_at`; append-only tables refuse update and delete.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "principals_and_resources",
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        name: "invites_and_engagement",
        sql: SCHEMA_V2,
    },
    Migration {
        version: 3,
        name: "invite_dormant_from",
        sql: SCHEMA_V3,
    },
];

// -----------------------------------------------------------------------
// v1: principals, tenants, resources, assignments, audit
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Institutions
-- =======================================================================
DEFINE TABLE institution SCHEMAFULL;
DEFINE FIELD name ON TABLE institution TYPE string;
DEFINE FIELD province ON TABLE institution TYPE string;
DEFINE FIELD deleted_at ON TABLE institution TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE institution TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE institution TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_institution_province ON TABLE institution \
    COLUMNS province;

-- =======================================================================
-- Users
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD display_name ON TABLE user TYPE string;
DEFINE FIELD role ON TABLE user TYPE string \
    ASSERT $value IN ['PLATFORM_ADMIN', 'QCTO_SUPER_ADMIN', 'QCTO_ADMIN', \
    'QCTO_USER', 'QCTO_REVIEWER', 'QCTO_AUDITOR', 'QCTO_VIEWER', \
    'INSTITUTION_ADMIN', 'INSTITUTION_STAFF', 'STUDENT'];
DEFINE FIELD institution_id ON TABLE user TYPE option<string>;
DEFINE FIELD status ON TABLE user TYPE string \
    ASSERT $value IN ['ACTIVE', 'INACTIVE', 'SUSPENDED'];
DEFINE FIELD assigned_regions ON TABLE user TYPE array<string> \
    DEFAULT [];
DEFINE FIELD password_hash ON TABLE user TYPE string;
DEFINE FIELD deleted_at ON TABLE user TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_email ON TABLE user COLUMNS email UNIQUE;
DEFINE INDEX idx_user_institution ON TABLE user COLUMNS institution_id;

-- =======================================================================
-- Compliance resources (readiness, submissions, requests, attendance)
-- =======================================================================
DEFINE TABLE compliance_resource SCHEMAFULL;
DEFINE FIELD resource_type ON TABLE compliance_resource TYPE string \
    ASSERT $value IN ['READINESS', 'SUBMISSION', 'QCTO_REQUEST', \
    'ATTENDANCE'];
DEFINE FIELD institution_id ON TABLE compliance_resource TYPE string;
DEFINE FIELD title ON TABLE compliance_resource TYPE string;
DEFINE FIELD status ON TABLE compliance_resource TYPE string \
    ASSERT $value IN ['DRAFT', 'SUBMITTED', 'UNDER_REVIEW', 'APPROVED', \
    'REJECTED', 'RETURNED'];
DEFINE FIELD data ON TABLE compliance_resource TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD created_by ON TABLE compliance_resource TYPE string;
DEFINE FIELD deleted_at ON TABLE compliance_resource \
    TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE compliance_resource TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE compliance_resource TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_resource_institution ON TABLE compliance_resource \
    COLUMNS institution_id, resource_type;

-- =======================================================================
-- Reviewer/auditor assignments
-- =======================================================================
DEFINE TABLE assignment SCHEMAFULL;
DEFINE FIELD resource_type ON TABLE assignment TYPE string \
    ASSERT $value IN ['READINESS', 'SUBMISSION', 'QCTO_REQUEST', \
    'ATTENDANCE'];
DEFINE FIELD resource_id ON TABLE assignment TYPE string;
DEFINE FIELD assigned_to ON TABLE assignment TYPE string;
DEFINE FIELD assigned_by ON TABLE assignment TYPE string;
DEFINE FIELD assignment_role ON TABLE assignment TYPE string \
    ASSERT $value IN ['REVIEWER', 'AUDITOR'];
DEFINE FIELD status ON TABLE assignment TYPE string \
    ASSERT $value IN ['ACTIVE', 'REMOVED', 'COMPLETED'];
DEFINE FIELD created_at ON TABLE assignment TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE assignment TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_assignment_tuple ON TABLE assignment \
    COLUMNS resource_type, resource_id, assigned_to, assignment_role \
    UNIQUE;
DEFINE INDEX idx_assignment_assignee ON TABLE assignment \
    COLUMNS assigned_to, status;

-- =======================================================================
-- Audit log (append-only, one row per changed field)
-- =======================================================================
DEFINE TABLE audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD mutation_id ON TABLE audit_log TYPE string;
DEFINE FIELD entity_type ON TABLE audit_log TYPE string;
DEFINE FIELD entity_id ON TABLE audit_log TYPE string;
DEFINE FIELD field_name ON TABLE audit_log TYPE string;
DEFINE FIELD old_value ON TABLE audit_log TYPE option<string>;
DEFINE FIELD new_value ON TABLE audit_log TYPE option<string>;
DEFINE FIELD changed_by ON TABLE audit_log TYPE string;
DEFINE FIELD role_at_time ON TABLE audit_log TYPE string;
DEFINE FIELD change_type ON TABLE audit_log TYPE string \
    ASSERT $value IN ['CREATE', 'UPDATE', 'DELETE', 'STATUS_CHANGE'];
DEFINE FIELD institution_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD reason ON TABLE audit_log TYPE option<string>;
DEFINE FIELD timestamp ON TABLE audit_log TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_entity_time ON TABLE audit_log \
    COLUMNS entity_type, entity_id, timestamp;
DEFINE INDEX idx_audit_mutation ON TABLE audit_log \
    COLUMNS mutation_id;
DEFINE INDEX idx_audit_actor ON TABLE audit_log COLUMNS changed_by;
";

// -----------------------------------------------------------------------
// v2: invites, processed delivery events, engagement history
// -----------------------------------------------------------------------

const SCHEMA_V2: &str = "\
DEFINE TABLE invite SCHEMAFULL;
DEFINE FIELD email ON TABLE invite TYPE string;
DEFINE FIELD role ON TABLE invite TYPE string;
DEFINE FIELD institution_id ON TABLE invite TYPE option<string>;
DEFINE FIELD invited_by ON TABLE invite TYPE string;
DEFINE FIELD token_hash ON TABLE invite TYPE string;
DEFINE FIELD status ON TABLE invite TYPE string \
    ASSERT $value IN ['QUEUED', 'SENDING', 'SENT', 'DELIVERED', \
    'OPENED', 'ACCEPTED', 'FAILED', 'RETRYING', 'EXPIRED'];
DEFINE FIELD attempts ON TABLE invite TYPE int DEFAULT 0;
DEFINE FIELD max_attempts ON TABLE invite TYPE int;
DEFINE FIELD expires_at ON TABLE invite TYPE datetime;
DEFINE FIELD engagement_state ON TABLE invite TYPE string \
    ASSERT $value IN ['UNCONTACTED', 'CONTACTED', 'ENGAGED', \
    'EVALUATING', 'READY', 'ACTIVE', 'DORMANT'];
DEFINE FIELD engagement_score ON TABLE invite TYPE int DEFAULT 0;
DEFINE FIELD last_activity_at ON TABLE invite TYPE option<datetime>;
DEFINE FIELD accepted_user_id ON TABLE invite TYPE option<string>;
DEFINE FIELD created_at ON TABLE invite TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE invite TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_invite_token_hash ON TABLE invite \
    COLUMNS token_hash UNIQUE;
DEFINE INDEX idx_invite_email ON TABLE invite COLUMNS email;

-- Delivery events already applied, for replay detection.
DEFINE TABLE invite_event SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD invite_id ON TABLE invite_event TYPE string;
DEFINE FIELD event_type ON TABLE invite_event TYPE string \
    ASSERT $value IN ['SEND_STARTED', 'SENT', 'DELIVERED', 'OPENED', \
    'CLICKED', 'VIEWED', 'ACCEPTED', 'FAILED', 'BOUNCED'];
DEFINE FIELD occurred_at ON TABLE invite_event TYPE datetime;
DEFINE FIELD recorded_at ON TABLE invite_event TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_invite_event_unique ON TABLE invite_event \
    COLUMNS invite_id, event_type, occurred_at UNIQUE;

-- Engagement funnel history.
DEFINE TABLE engagement_transition SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD invite_id ON TABLE engagement_transition TYPE string;
DEFINE FIELD from_state ON TABLE engagement_transition TYPE string;
DEFINE FIELD to_state ON TABLE engagement_transition TYPE string;
DEFINE FIELD at ON TABLE engagement_transition TYPE datetime;
DEFINE FIELD reason ON TABLE engagement_transition TYPE string;
DEFINE FIELD seq ON TABLE engagement_transition TYPE int;
DEFINE INDEX idx_engagement_invite ON TABLE engagement_transition \
    COLUMNS invite_id, seq;
";

// -----------------------------------------------------------------------
// v3: funnel stage to resume from after dormancy
// -----------------------------------------------------------------------

const SCHEMA_V3: &str = "\
DEFINE FIELD dormant_from ON TABLE invite TYPE option<string> \
    ASSERT $value = NONE OR $value IN ['UNCONTACTED', 'CONTACTED', \
    'ENGAGED', 'EVALUATING', 'READY', 'ACTIVE'];
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates the `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the recorded maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );

        // Apply and record in one transaction so a half-applied version
        // is never marked done.
        let sql = format!(
            "BEGIN TRANSACTION;\n{}\nCREATE _migration SET version = $version, \
             name = $name;\nCOMMIT TRANSACTION;",
            migration.sql
        );
        db.query(sql)
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

        info!(version = migration.version, "Migration applied");
    }

    Ok(())
}

/// Highest schema version this build knows about.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}
