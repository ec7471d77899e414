//! Optimistic-update reconciliation for paginated list views.
//!
//! A list view keeps the mutations it has submitted but not yet seen echoed
//! back by the server as [`PendingMutation`]s. Every time a page arrives,
//! [`merge_optimistic`] folds them into the server list and reports which
//! ones are still unconfirmed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{Record, RecordId, is_truthy};

/// Default identity field of listing records.
pub const DEFAULT_ID_KEY: &str = "idProperty";

/// Default field the optional attachment (the cover image) is stored under.
pub const DEFAULT_ATTACHMENT_KEY: &str = "image";

/// A mutation applied locally before the server confirmed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PendingMutation {
    Created {
        #[serde(alias = "property")]
        entity: Record,
        #[serde(default, alias = "image", skip_serializing_if = "Option::is_none")]
        attachment: Option<Value>,
    },
    Updated {
        #[serde(alias = "property")]
        entity: Record,
        #[serde(default, alias = "image", skip_serializing_if = "Option::is_none")]
        attachment: Option<Value>,
    },
}

impl PendingMutation {
    pub fn created(entity: Record) -> Self {
        Self::Created {
            entity,
            attachment: None,
        }
    }

    pub fn updated(entity: Record) -> Self {
        Self::Updated {
            entity,
            attachment: None,
        }
    }

    /// Attach a value (usually the uploaded image) to this mutation.
    pub fn with_attachment(self, value: Value) -> Self {
        match self {
            Self::Created { entity, .. } => Self::Created {
                entity,
                attachment: Some(value),
            },
            Self::Updated { entity, .. } => Self::Updated {
                entity,
                attachment: Some(value),
            },
        }
    }

    pub fn entity(&self) -> &Record {
        match self {
            Self::Created { entity, .. } | Self::Updated { entity, .. } => entity,
        }
    }

    pub fn attachment(&self) -> Option<&Value> {
        match self {
            Self::Created { attachment, .. } | Self::Updated { attachment, .. } => {
                attachment.as_ref()
            }
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
        }
    }

    /// Identity of the target record under `id_key`, if it has one.
    pub fn id(&self, id_key: &str) -> Option<RecordId> {
        RecordId::of(self.entity(), id_key)
    }

    fn truthy_attachment(&self) -> Option<&Value> {
        self.attachment().filter(|value| is_truthy(value))
    }
}

/// Field names used while merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    pub id_key: String,
    pub attachment_key: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            id_key: DEFAULT_ID_KEY.to_string(),
            attachment_key: DEFAULT_ATTACHMENT_KEY.to_string(),
        }
    }
}

impl MergeOptions {
    pub fn with_id_key(id_key: impl Into<String>) -> Self {
        Self {
            id_key: id_key.into(),
            ..Self::default()
        }
    }
}

/// Result of [`merge_optimistic`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergeOutcome {
    /// The list to display.
    pub merged: Vec<Record>,
    /// Mutations the server has not reflected yet, in input order.
    pub remaining: Vec<PendingMutation>,
}

/// Merge pending mutations into an authoritative server list.
///
/// Mutations are processed in order:
///
/// - no id under `id_key`: kept in `remaining`, `merged` is untouched;
/// - id present in `server`: resolved and dropped from `remaining`; an
///   `Updated` mutation also overlays its fields onto the server record;
/// - otherwise: the record is shown in front of the server records (the
///   last processed mutation ends up first) and stays in `remaining`.
///
/// A mutation whose id was already put in front by an earlier mutation of the
/// same call is not inserted again; an `Updated` one overlays the front
/// record instead. Both stay in `remaining` until the server has the id.
pub fn merge_optimistic(
    server: &[Record],
    pending: &[PendingMutation],
    options: &MergeOptions,
) -> MergeOutcome {
    let id_key = options.id_key.as_str();
    let attachment_key = options.attachment_key.as_str();

    let mut confirmed: Vec<Record> = server.to_vec();
    let mut server_index: HashMap<RecordId, usize> = HashMap::with_capacity(server.len());
    for (pos, record) in server.iter().enumerate() {
        if let Some(id) = RecordId::of(record, id_key) {
            server_index.entry(id).or_insert(pos);
        }
    }

    // Kept in processing order, reversed when assembling `merged`.
    let mut optimistic: Vec<Record> = Vec::new();
    let mut optimistic_index: HashMap<RecordId, usize> = HashMap::new();
    let mut remaining = Vec::new();

    for mutation in pending {
        let Some(id) = mutation.id(id_key) else {
            remaining.push(mutation.clone());
            continue;
        };

        if let Some(&pos) = server_index.get(&id) {
            if let PendingMutation::Updated { entity, .. } = mutation {
                confirmed[pos] = overlay(
                    &confirmed[pos],
                    entity,
                    mutation.truthy_attachment(),
                    attachment_key,
                );
            }
            continue;
        }

        if let Some(&pos) = optimistic_index.get(&id) {
            if let PendingMutation::Updated { entity, .. } = mutation {
                optimistic[pos] = overlay(
                    &optimistic[pos],
                    entity,
                    mutation.truthy_attachment(),
                    attachment_key,
                );
            }
            remaining.push(mutation.clone());
            continue;
        }

        let mut record = mutation.entity().clone();
        record.insert(
            attachment_key.to_string(),
            mutation.truthy_attachment().cloned().unwrap_or(Value::Null),
        );
        optimistic_index.insert(id, optimistic.len());
        optimistic.push(record);
        remaining.push(mutation.clone());
    }

    let mut merged = Vec::with_capacity(optimistic.len() + confirmed.len());
    merged.extend(optimistic.into_iter().rev());
    merged.extend(confirmed);

    MergeOutcome { merged, remaining }
}

/// Shallow merge of `patch` over `base`. The attachment comes from the patch
/// when it is truthy and falls back to the base record's otherwise.
fn overlay(
    base: &Record,
    patch: &Record,
    attachment: Option<&Value>,
    attachment_key: &str,
) -> Record {
    let mut out = base.clone();
    for (key, value) in patch {
        out.insert(key.clone(), value.clone());
    }
    match attachment.or_else(|| base.get(attachment_key)) {
        Some(value) => {
            out.insert(attachment_key.to_string(), value.clone());
        }
        None => {
            out.remove(attachment_key);
        }
    }
    out
}
