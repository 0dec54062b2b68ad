//! DynamoDB storage client.
//!
//! [`DynamoDbClient`] forwards the four storage operations to an
//! `aws_sdk_dynamodb::Client`. SDK errors are returned unchanged as
//! [`aws_sdk_dynamodb::Error`]; retries and timeouts are whatever the SDK
//! client was configured with.

use std::collections::HashMap;

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue as SdkValue;
use bytes::Bytes;

use dynarepo_model::input::{GetItemInput, PutItemInput, QueryInput, ScanInput};
use dynarepo_model::output::{GetItemOutput, PutItemOutput, QueryOutput, ScanOutput};
use dynarepo_model::{AttributeValue, Item};

use crate::client::{StorageClient, StoreFuture};

/// Storage client backed by the AWS SDK.
#[derive(Debug, Clone)]
pub struct DynamoDbClient {
    inner: aws_sdk_dynamodb::Client,
}

impl DynamoDbClient {
    #[must_use]
    pub fn new(inner: aws_sdk_dynamodb::Client) -> Self {
        Self { inner }
    }

    /// Build a client from an already loaded SDK configuration.
    #[must_use]
    pub fn from_conf(conf: aws_sdk_dynamodb::Config) -> Self {
        Self::new(aws_sdk_dynamodb::Client::from_conf(conf))
    }

    #[must_use]
    pub fn inner(&self) -> &aws_sdk_dynamodb::Client {
        &self.inner
    }
}

impl StorageClient for DynamoDbClient {
    type Error = aws_sdk_dynamodb::Error;

    fn put_item(&self, input: PutItemInput) -> StoreFuture<'_, PutItemOutput, Self::Error> {
        Box::pin(async move {
            self.inner
                .put_item()
                .table_name(input.table_name)
                .set_item(Some(to_sdk_item(input.item)))
                .send()
                .await
                .map_err(aws_sdk_dynamodb::Error::from)?;
            Ok(PutItemOutput {})
        })
    }

    fn get_item(&self, input: GetItemInput) -> StoreFuture<'_, GetItemOutput, Self::Error> {
        Box::pin(async move {
            let output = self
                .inner
                .get_item()
                .table_name(input.table_name)
                .set_key(Some(to_sdk_item(input.key)))
                .set_consistent_read(input.consistent_read)
                .send()
                .await
                .map_err(aws_sdk_dynamodb::Error::from)?;
            Ok(GetItemOutput {
                item: output.item().map(from_sdk_item),
            })
        })
    }

    fn query(&self, input: QueryInput) -> StoreFuture<'_, QueryOutput, Self::Error> {
        Box::pin(async move {
            let output = self
                .inner
                .query()
                .table_name(input.table_name)
                .set_index_name(input.index_name)
                .key_condition_expression(input.key_condition_expression)
                .set_filter_expression(input.filter_expression)
                .set_expression_attribute_values(non_empty(input.expression_attribute_values))
                .set_scan_index_forward(input.scan_index_forward)
                .set_limit(input.limit)
                .set_exclusive_start_key(non_empty(input.exclusive_start_key))
                .set_consistent_read(input.consistent_read)
                .send()
                .await
                .map_err(aws_sdk_dynamodb::Error::from)?;
            Ok(QueryOutput {
                items: output.items().iter().map(from_sdk_item).collect(),
                count: output.count(),
                scanned_count: output.scanned_count(),
                last_evaluated_key: output.last_evaluated_key().map(from_sdk_item),
            })
        })
    }

    fn scan(&self, input: ScanInput) -> StoreFuture<'_, ScanOutput, Self::Error> {
        Box::pin(async move {
            let output = self
                .inner
                .scan()
                .table_name(input.table_name)
                .set_index_name(input.index_name)
                .set_filter_expression(input.filter_expression)
                .set_expression_attribute_values(non_empty(input.expression_attribute_values))
                .set_limit(input.limit)
                .set_exclusive_start_key(non_empty(input.exclusive_start_key))
                .set_consistent_read(input.consistent_read)
                .send()
                .await
                .map_err(aws_sdk_dynamodb::Error::from)?;
            Ok(ScanOutput {
                items: output.items().iter().map(from_sdk_item).collect(),
                count: output.count(),
                scanned_count: output.scanned_count(),
                last_evaluated_key: output.last_evaluated_key().map(from_sdk_item),
            })
        })
    }
}

// DynamoDB rejects empty attribute maps, so they are omitted instead.
fn non_empty(values: HashMap<String, AttributeValue>) -> Option<HashMap<String, SdkValue>> {
    (!values.is_empty()).then(|| to_sdk_item(values))
}

fn to_sdk_item(item: Item) -> HashMap<String, SdkValue> {
    item.into_iter().map(|(k, v)| (k, to_sdk(v))).collect()
}

fn from_sdk_item(item: &HashMap<String, SdkValue>) -> Item {
    item.iter().map(|(k, v)| (k.clone(), from_sdk(v))).collect()
}

/// Convert a model value into the SDK's representation.
#[must_use]
pub fn to_sdk(value: AttributeValue) -> SdkValue {
    match value {
        AttributeValue::S(s) => SdkValue::S(s),
        AttributeValue::N(n) => SdkValue::N(n),
        AttributeValue::B(b) => SdkValue::B(Blob::new(b.to_vec())),
        AttributeValue::Ss(ss) => SdkValue::Ss(ss),
        AttributeValue::Ns(ns) => SdkValue::Ns(ns),
        AttributeValue::Bs(bs) => {
            SdkValue::Bs(bs.into_iter().map(|b| Blob::new(b.to_vec())).collect())
        }
        AttributeValue::Bool(b) => SdkValue::Bool(b),
        AttributeValue::Null(n) => SdkValue::Null(n),
        AttributeValue::L(l) => SdkValue::L(l.into_iter().map(to_sdk).collect()),
        AttributeValue::M(m) => SdkValue::M(to_sdk_item(m)),
    }
}

/// Convert an SDK value into the model representation.
///
/// Variants unknown to this SDK version become `NULL`.
#[must_use]
pub fn from_sdk(value: &SdkValue) -> AttributeValue {
    match value {
        SdkValue::S(s) => AttributeValue::S(s.clone()),
        SdkValue::N(n) => AttributeValue::N(n.clone()),
        SdkValue::B(b) => AttributeValue::B(Bytes::copy_from_slice(b.as_ref())),
        SdkValue::Ss(ss) => AttributeValue::Ss(ss.clone()),
        SdkValue::Ns(ns) => AttributeValue::Ns(ns.clone()),
        SdkValue::Bs(bs) => AttributeValue::Bs(
            bs.iter()
                .map(|b| Bytes::copy_from_slice(b.as_ref()))
                .collect(),
        ),
        SdkValue::Bool(b) => AttributeValue::Bool(*b),
        SdkValue::Null(n) => AttributeValue::Null(*n),
        SdkValue::L(l) => AttributeValue::L(l.iter().map(from_sdk).collect()),
        SdkValue::M(m) => AttributeValue::M(from_sdk_item(m)),
        _ => AttributeValue::Null(true),
    }
}
