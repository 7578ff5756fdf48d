// ============================================================================
// Product Catalog Entities
// ============================================================================
//
// Plans, features and the rate cards that price a feature within a plan.
//
//   Plan 1 ──< RateCard >── 0..1 Feature
//
// Deleting a plan removes its rate cards; deleting a feature detaches them.
//
// ============================================================================

pub mod objects;

pub use objects::{Price, PriceTier, TaxBehavior, TaxConfig};

use crate::core::{FieldType, Result, Value};
use crate::entity::{Entity, Record};
use crate::schema::validators::{self, key, namespace, not_empty, positive};
use crate::schema::{EdgeDescriptor, EntitySchema, FieldDescriptor, IdDescriptor, OnDelete};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as Json};

pub const PLAN_STATUSES: &[&str] = &["draft", "active", "archived"];
pub const RATE_CARD_KINDS: &[&str] = &["flat_fee", "usage_based"];

fn default_currency() -> Value {
    Value::from("USD")
}

fn default_version() -> Value {
    Value::Int(1)
}

fn default_status() -> Value {
    Value::from("draft")
}

const NAMESPACE: FieldDescriptor = FieldDescriptor::new("namespace", FieldType::Text)
    .immutable()
    .validate(namespace);
const CREATED_AT: FieldDescriptor = FieldDescriptor::new("created_at", FieldType::Time)
    .immutable()
    .default(validators::now);
const UPDATED_AT: FieldDescriptor = FieldDescriptor::new("updated_at", FieldType::Time)
    .default(validators::now)
    .update_default(validators::now);
const DELETED_AT: FieldDescriptor = FieldDescriptor::new("deleted_at", FieldType::Time).optional();

pub static PLAN: EntitySchema = EntitySchema {
    name: "Plan",
    table: "plans",
    id: IdDescriptor::uuid().assignable(),
    fields: &[
        NAMESPACE,
        FieldDescriptor::new("key", FieldType::Text).immutable().validate(key),
        FieldDescriptor::new("name", FieldType::Text).validate(not_empty),
        FieldDescriptor::new("description", FieldType::Text).optional(),
        FieldDescriptor::new("currency", FieldType::Text).default(default_currency),
        FieldDescriptor::new("version", FieldType::Int)
            .default(default_version)
            .validate(positive),
        FieldDescriptor::new("status", FieldType::Enum(PLAN_STATUSES)).default(default_status),
        FieldDescriptor::new("metadata", FieldType::Json).optional(),
        CREATED_AT,
        UPDATED_AT,
        DELETED_AT,
    ],
    edges: &[EdgeDescriptor::one_to_many("ratecards", "RateCard", "rate_cards", "plan_id")],
    unique_together: &[&["namespace", "key", "version"]],
    soft_delete: Some("deleted_at"),
};

pub static FEATURE: EntitySchema = EntitySchema {
    name: "Feature",
    table: "features",
    id: IdDescriptor::uuid().assignable(),
    fields: &[
        NAMESPACE,
        FieldDescriptor::new("key", FieldType::Text).immutable().validate(key),
        FieldDescriptor::new("name", FieldType::Text).validate(not_empty),
        FieldDescriptor::new("meter_slug", FieldType::Text).optional(),
        FieldDescriptor::new("metadata", FieldType::Json).optional(),
        CREATED_AT,
        UPDATED_AT,
        DELETED_AT,
    ],
    edges: &[EdgeDescriptor::one_to_many("ratecards", "RateCard", "rate_cards", "feature_id")],
    unique_together: &[&["namespace", "key"]],
    soft_delete: Some("deleted_at"),
};

pub static RATE_CARD: EntitySchema = EntitySchema {
    name: "RateCard",
    table: "rate_cards",
    id: IdDescriptor::uuid(),
    fields: &[
        NAMESPACE,
        FieldDescriptor::new("key", FieldType::Text).validate(key),
        FieldDescriptor::new("name", FieldType::Text).validate(not_empty),
        FieldDescriptor::new("kind", FieldType::Enum(RATE_CARD_KINDS)),
        FieldDescriptor::new("billing_cadence", FieldType::Text).optional(),
        FieldDescriptor::new("price", FieldType::Json)
            .optional()
            .validate(validators::object::<Price>),
        FieldDescriptor::new("tax_config", FieldType::Json)
            .optional()
            .validate(validators::object::<TaxConfig>),
        FieldDescriptor::new("metadata", FieldType::Json).optional(),
        CREATED_AT,
        UPDATED_AT,
        DELETED_AT,
    ],
    edges: &[
        EdgeDescriptor::many_to_one("plan", "Plan", "plans", "plan_id")
            .required()
            .on_delete(OnDelete::Cascade),
        EdgeDescriptor::many_to_one("feature", "Feature", "features", "feature_id")
            .on_delete(OnDelete::SetNull),
    ],
    unique_together: &[&["plan", "key"]],
    soft_delete: Some("deleted_at"),
};

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub id: String,
    pub namespace: String,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub currency: String,
    pub version: i64,
    pub status: String,
    pub metadata: Option<Map<String, Json>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for Plan {
    fn schema() -> &'static EntitySchema {
        &PLAN
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.id_string()?,
            namespace: record.string("namespace")?,
            key: record.string("key")?,
            name: record.string("name")?,
            description: record.opt_string("description")?,
            currency: record.string("currency")?,
            version: record.int("version")?,
            status: record.string("status")?,
            metadata: record.json_map("metadata")?,
            created_at: record.time("created_at")?,
            updated_at: record.time("updated_at")?,
            deleted_at: record.opt_time("deleted_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: String,
    pub namespace: String,
    pub key: String,
    pub name: String,
    pub meter_slug: Option<String>,
    pub metadata: Option<Map<String, Json>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for Feature {
    fn schema() -> &'static EntitySchema {
        &FEATURE
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.id_string()?,
            namespace: record.string("namespace")?,
            key: record.string("key")?,
            name: record.string("name")?,
            meter_slug: record.opt_string("meter_slug")?,
            metadata: record.json_map("metadata")?,
            created_at: record.time("created_at")?,
            updated_at: record.time("updated_at")?,
            deleted_at: record.opt_time("deleted_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateCard {
    pub id: String,
    pub namespace: String,
    pub key: String,
    pub name: String,
    pub kind: String,
    pub billing_cadence: Option<String>,
    pub price: Option<Price>,
    pub tax_config: Option<TaxConfig>,
    pub metadata: Option<Map<String, Json>>,
    pub plan_id: String,
    pub feature_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for RateCard {
    fn schema() -> &'static EntitySchema {
        &RATE_CARD
    }

    fn from_record(record: &Record) -> Result<Self> {
        let edge = |name: &str| -> Result<Option<String>> {
            Ok(record.edge_id(name)?.as_str().map(str::to_string))
        };
        Ok(Self {
            id: record.id_string()?,
            namespace: record.string("namespace")?,
            key: record.string("key")?,
            name: record.string("name")?,
            kind: record.string("kind")?,
            billing_cadence: record.opt_string("billing_cadence")?,
            price: Price::parse(record.field("price")?)?,
            tax_config: record.object("tax_config")?,
            metadata: record.json_map("metadata")?,
            plan_id: edge("plan")?.unwrap_or_default(),
            feature_id: edge("feature")?,
            created_at: record.time("created_at")?,
            updated_at: record.time("updated_at")?,
            deleted_at: record.opt_time("deleted_at")?,
        })
    }
}

/// Every schema of the catalog, parents first.
pub fn schemas() -> [&'static EntitySchema; 3] {
    [&PLAN, &FEATURE, &RATE_CARD]
}
