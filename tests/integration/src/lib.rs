//! Integration tests for dynarepo repositories.
//!
//! Tests over the in-memory client always run. Tests against a live
//! DynamoDB-compatible endpoint (`localhost:4566` by default, override with
//! `DYNAMODB_ENDPOINT_URL`) are marked `#[ignore]`.
//!
//! Run them with:
//! ```text
//! cargo test -p dynarepo-integration -- --ignored
//! ```

use std::sync::Arc;
use std::sync::Once;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_dynamodb::config::Region;

use dynarepo_core::memory::MemoryClient;
use dynarepo_model::input::CreateTableInput;
use dynarepo_model::types::{
    AttributeDefinition, GlobalSecondaryIndex, KeySchemaElement, ScalarAttributeType,
};


static INIT: Once = Once::new();

/// Name of the author index on the blog table.
pub const AUTHOR_INDEX: &str = "by-author";

/// Initialize tracing (once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Endpoint URL for the live server.
fn endpoint_url() -> String {
    std::env::var("DYNAMODB_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4566".to_owned())
}

/// Create a configured DynamoDB client pointing at the live server.
#[must_use]
pub fn dynamodb_client() -> aws_sdk_dynamodb::Client {
    init_tracing();

    let creds = Credentials::new("test", "test", None, None, "integration-test");

    let config = aws_sdk_dynamodb::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(creds)
        .endpoint_url(endpoint_url())
        .build();

    aws_sdk_dynamodb::Client::from_conf(config)
}

/// Generate a unique table name for a test.
#[must_use]
pub fn test_table_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Definition of the blog table: `pk`/`sk` string keys plus an
/// author index keyed by `author`/`sk`.
#[must_use]
pub fn blog_table(table_name: &str) -> CreateTableInput {
    CreateTableInput {
        table_name: table_name.to_owned(),
        key_schema: vec![KeySchemaElement::hash("pk"), KeySchemaElement::range("sk")],
        attribute_definitions: vec![
            AttributeDefinition::new("pk", ScalarAttributeType::S),
            AttributeDefinition::new("sk", ScalarAttributeType::S),
            AttributeDefinition::new("author", ScalarAttributeType::S),
        ],
        global_secondary_indexes: vec![GlobalSecondaryIndex {
            index_name: AUTHOR_INDEX.to_owned(),
            key_schema: vec![KeySchemaElement::hash("author"), KeySchemaElement::range("sk")],
        }],
    }
}

/// An in-memory client holding an empty blog table.
pub fn memory_client(table_name: &str) -> anyhow::Result<Arc<MemoryClient>> {
    init_tracing();
    let client = MemoryClient::new();
    client.create_table(&blog_table(table_name))?;
    tracing::debug!(table = table_name, "created in-memory blog table");
    Ok(Arc::new(client))
}

mod test_dynamodb;
mod test_pagination;
mod test_repository;
