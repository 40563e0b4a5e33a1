//! Field-level audit log domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::resource::ResourceType;
use super::role::Role;
use crate::error::ComplyError;

/// Kinds of entity whose mutations are audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    User,
    Institution,
    Readiness,
    Submission,
    QctoRequest,
    Attendance,
    Assignment,
    Invite,
}

impl EntityType {
    pub const ALL: [EntityType; 8] = [
        EntityType::User,
        EntityType::Institution,
        EntityType::Readiness,
        EntityType::Submission,
        EntityType::QctoRequest,
        EntityType::Attendance,
        EntityType::Assignment,
        EntityType::Invite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::User => "USER",
            EntityType::Institution => "INSTITUTION",
            EntityType::Readiness => "READINESS",
            EntityType::Submission => "SUBMISSION",
            EntityType::QctoRequest => "QCTO_REQUEST",
            EntityType::Attendance => "ATTENDANCE",
            EntityType::Assignment => "ASSIGNMENT",
            EntityType::Invite => "INVITE",
        }
    }

    /// Storage table holding entities of this type.
    pub fn table(&self) -> &'static str {
        match self {
            EntityType::User => "user",
            EntityType::Institution => "institution",
            EntityType::Readiness
            | EntityType::Submission
            | EntityType::QctoRequest
            | EntityType::Attendance => "compliance_resource",
            EntityType::Assignment => "assignment",
            EntityType::Invite => "invite",
        }
    }
}

impl From<ResourceType> for EntityType {
    fn from(rt: ResourceType) -> Self {
        match rt {
            ResourceType::Readiness => EntityType::Readiness,
            ResourceType::Submission => EntityType::Submission,
            ResourceType::QctoRequest => EntityType::QctoRequest,
            ResourceType::Attendance => EntityType::Attendance,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ComplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ComplyError::validation(format!("unknown entity type: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    StatusChange,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "CREATE",
            ChangeType::Update => "UPDATE",
            ChangeType::Delete => "DELETE",
            ChangeType::StatusChange => "STATUS_CHANGE",
        }
    }
}

impl FromStr for ChangeType {
    type Err = ComplyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(ChangeType::Create),
            "UPDATE" => Ok(ChangeType::Update),
            "DELETE" => Ok(ChangeType::Delete),
            "STATUS_CHANGE" => Ok(ChangeType::StatusChange),
            other => Err(ComplyError::validation(format!("unknown change type: {other}"))),
        }
    }
}

/// A field value captured before or after a mutation.
///
/// `to_audit_string` is the only serialization used for audit rows, so
/// two values compare equal in the log exactly when they are equal here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AuditValue {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    Date(DateTime<Utc>),
    Null,
    Json(serde_json::Value),
}

impl AuditValue {
    /// Stable textual form; `Null` is stored as an absent value so it can
    /// never be confused with the text `"null"`.
    pub fn to_audit_string(&self) -> Option<String> {
        match self {
            AuditValue::Text(s) => Some(s.clone()),
            AuditValue::Number(n) => Some(n.to_string()),
            AuditValue::Bool(b) => Some(b.to_string()),
            AuditValue::Date(d) => Some(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            AuditValue::Null => None,
            // serde_json maps are ordered by key, so this is canonical.
            AuditValue::Json(v) => Some(v.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AuditValue::Null)
    }
}

impl From<&str> for AuditValue {
    fn from(s: &str) -> Self {
        AuditValue::Text(s.to_string())
    }
}

impl From<String> for AuditValue {
    fn from(s: String) -> Self {
        AuditValue::Text(s)
    }
}

impl From<bool> for AuditValue {
    fn from(b: bool) -> Self {
        AuditValue::Bool(b)
    }
}

impl From<i64> for AuditValue {
    fn from(n: i64) -> Self {
        AuditValue::Number(n.into())
    }
}

impl From<u32> for AuditValue {
    fn from(n: u32) -> Self {
        AuditValue::Number(n.into())
    }
}

impl From<Uuid> for AuditValue {
    fn from(id: Uuid) -> Self {
        AuditValue::Text(id.to_string())
    }
}

impl From<DateTime<Utc>> for AuditValue {
    fn from(d: DateTime<Utc>) -> Self {
        AuditValue::Date(d)
    }
}

impl From<serde_json::Value> for AuditValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => AuditValue::Null,
            other => AuditValue::Json(other),
        }
    }
}

impl From<Vec<String>> for AuditValue {
    fn from(items: Vec<String>) -> Self {
        AuditValue::Json(serde_json::Value::from(items))
    }
}

impl From<Role> for AuditValue {
    fn from(role: Role) -> Self {
        AuditValue::Text(role.as_str().to_string())
    }
}

impl<T: Into<AuditValue>> From<Option<T>> for AuditValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(AuditValue::Null)
    }
}

/// One immutable field-level change record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    /// Groups the entries written by a single audited mutation.
    pub mutation_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by: Uuid,
    pub role_at_time: Role,
    pub change_type: ChangeType,
    pub institution_id: Option<Uuid>,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn null_is_distinct_from_text_null() {
        assert_eq!(AuditValue::Null.to_audit_string(), None);
        assert_eq!(
            AuditValue::from("null").to_audit_string().as_deref(),
            Some("null")
        );
    }

    #[test]
    fn dates_use_millisecond_utc() {
        let d = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap();
        assert_eq!(
            AuditValue::from(d).to_audit_string().as_deref(),
            Some("2026-03-01T08:30:00.000Z")
        );
    }

    #[test]
    fn json_keys_are_sorted() {
        let v = serde_json::json!({"zeta": 1, "alpha": [true, null]});
        assert_eq!(
            AuditValue::from(v).to_audit_string().as_deref(),
            Some(r#"{"alpha":[true,null],"zeta":1}"#)
        );
    }

    #[test]
    fn lists_and_options() {
        let regions = vec!["Gauteng".to_string(), "Limpopo".to_string()];
        assert_eq!(
            AuditValue::from(regions).to_audit_string().as_deref(),
            Some(r#"["Gauteng","Limpopo"]"#)
        );
        assert_eq!(AuditValue::from(None::<Uuid>), AuditValue::Null);
        assert_eq!(AuditValue::from(serde_json::Value::Null), AuditValue::Null);
    }

    #[test]
    fn numbers_and_bools() {
        assert_eq!(AuditValue::from(3u32).to_audit_string().as_deref(), Some("3"));
        assert_eq!(AuditValue::from(-7i64).to_audit_string().as_deref(), Some("-7"));
        assert_eq!(AuditValue::from(false).to_audit_string().as_deref(), Some("false"));
    }

    #[test]
    fn resource_types_map_to_the_shared_table() {
        for rt in ResourceType::ALL {
            let et = EntityType::from(rt);
            assert_eq!(et.as_str(), rt.as_str());
            assert_eq!(et.table(), "compliance_resource");
        }
    }
}
