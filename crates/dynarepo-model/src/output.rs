//! Response types.

use serde::{Deserialize, Serialize};

use crate::attribute_value::Item;

/// Output of a put. The store returns nothing beyond success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutItemOutput {}

/// Output of a point read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetItemOutput {
    /// The item, or `None` when no item exists for the key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,
}

/// One page of query results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryOutput {
    /// Items on this page that passed the filter expression.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Item>,

    /// Number of items returned.
    pub count: i32,

    /// Number of items evaluated before filtering.
    pub scanned_count: i32,

    /// Set when more items may follow; pass it back as the exclusive start
    /// key of the next request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluated_key: Option<Item>,
}

/// One page of scan results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanOutput {
    /// Items on this page that passed the filter expression.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Item>,

    /// Number of items returned.
    pub count: i32,

    /// Number of items evaluated before filtering.
    pub scanned_count: i32,

    /// Set when more items may follow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_evaluated_key: Option<Item>,
}

/// Output of table creation on a local store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateTableOutput {
    pub table_name: String,
}
