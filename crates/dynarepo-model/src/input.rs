//! Request types.
//!
//! All requests use `PascalCase` JSON field naming. Optional fields are
//! omitted when `None` and empty maps are omitted, producing minimal payloads.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::attribute_value::{AttributeValue, Item};
use crate::types::{AttributeDefinition, GlobalSecondaryIndex, KeySchemaElement};

// ---------------------------------------------------------------------------
// Table management
// ---------------------------------------------------------------------------

/// Input for creating a table on a local store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateTableInput {
    /// The name of the table to create.
    pub table_name: String,

    /// Partition key and optional sort key.
    pub key_schema: Vec<KeySchemaElement>,

    /// Types of every attribute used by the table or index key schemas.
    pub attribute_definitions: Vec<AttributeDefinition>,

    /// Global secondary indexes to create with the table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_secondary_indexes: Vec<GlobalSecondaryIndex>,
}

// ---------------------------------------------------------------------------
// Item operations
// ---------------------------------------------------------------------------

/// Input for an unconditional put (insert or replace).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutItemInput {
    /// The target table.
    pub table_name: String,

    /// The full item, key attributes included.
    pub item: Item,
}

/// Input for a point read by primary key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetItemInput {
    /// The table containing the item.
    pub table_name: String,

    /// The primary key attributes of the item.
    pub key: Item,

    /// If `true`, a strongly consistent read is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistent_read: Option<bool>,
}

// ---------------------------------------------------------------------------
// Query & Scan
// ---------------------------------------------------------------------------

/// Input for one page of a key-condition query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryInput {
    /// The table to query.
    pub table_name: String,

    /// The name of a secondary index to query instead of the table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,

    /// The condition selecting items by key.
    pub key_condition_expression: String,

    /// A condition applied to matched items before they are returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_expression: Option<String>,

    /// Bound parameter values referenced by both expressions (`:name`).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_values: HashMap<String, AttributeValue>,

    /// Ascending (`true`, the default) or descending sort-key order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_index_forward: Option<bool>,

    /// Maximum number of items to evaluate for this page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,

    /// Key of the last item of the previous page.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub exclusive_start_key: Item,

    /// If `true`, a strongly consistent read is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistent_read: Option<bool>,
}

/// Input for one page of a full-table scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanInput {
    /// The table to scan.
    pub table_name: String,

    /// The name of a secondary index to scan instead of the table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,

    /// A condition applied to scanned items before they are returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_expression: Option<String>,

    /// Bound parameter values referenced by the filter expression.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub expression_attribute_values: HashMap<String, AttributeValue>,

    /// Maximum number of items to evaluate for this page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,

    /// Key of the last item of the previous page.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub exclusive_start_key: Item,

    /// If `true`, a strongly consistent read is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistent_read: Option<bool>,
}
