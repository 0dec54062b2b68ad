//! The validated repository.
//!
//! A [`Repository`] binds a shared [`StorageClient`], one table and one
//! [`Schema`]. Writes are validated before they reach the store and every
//! item read back is validated before it reaches the caller. `query` and
//! `scan` return lazy streams that fetch one page at a time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tracing::{debug, warn};

use dynarepo_model::input::{GetItemInput, PutItemInput, QueryInput, ScanInput};
use dynarepo_model::{AttributeValue, Item};

use crate::client::StorageClient;
use crate::compiler::{
    CompiledCondition, KeyConditions, compile_filter_condition, compile_key_condition,
};
use crate::config::RepositoryConfig;
use crate::error::{CompileError, RepositoryError};
use crate::paginate::{Page, paginate};
use crate::schema::{Key, Schema};

/// Stream of validated values returned by [`Repository::query`] and
/// [`Repository::scan`].
pub type ItemStream<T, E> = BoxStream<'static, Result<T, RepositoryError<E>>>;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Per-call settings for [`Repository::query`].
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Secondary index to query instead of the table.
    pub index: Option<String>,
    /// Conditions applied to matched items by the store.
    pub filter: Option<KeyConditions>,
    /// Items per page; overrides [`RepositoryConfig::page_size`].
    pub page_size: Option<u32>,
    /// Ascending sort-key order when `true`.
    pub scan_forward: bool,
    /// Overrides [`RepositoryConfig::consistent_read`].
    pub consistent_read: Option<bool>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            index: None,
            filter: None,
            page_size: None,
            scan_forward: true,
            consistent_read: None,
        }
    }
}

impl QueryOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: KeyConditions) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Return items in descending sort-key order.
    #[must_use]
    pub fn descending(mut self) -> Self {
        self.scan_forward = false;
        self
    }

    #[must_use]
    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = Some(consistent_read);
        self
    }
}

/// Per-call settings for [`Repository::scan`].
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub index: Option<String>,
    pub filter: Option<KeyConditions>,
    pub page_size: Option<u32>,
}

impl ScanOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: KeyConditions) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Schema-bound access to one table.
///
/// The client is shared, never owned: several repositories over different
/// tables or schemas can hold the same client. Cloning a repository is cheap.
pub struct Repository<C, S> {
    client: Arc<C>,
    table: String,
    schema: Arc<S>,
    config: RepositoryConfig,
}

impl<C, S> Clone for Repository<C, S> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            table: self.table.clone(),
            schema: Arc::clone(&self.schema),
            config: self.config.clone(),
        }
    }
}

impl<C, S> fmt::Debug for Repository<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("table", &self.table)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C, S> Repository<C, S>
where
    C: StorageClient,
    S: Schema,
{
    pub fn new(client: Arc<C>, table: impl Into<String>, schema: S) -> Self {
        Self {
            client,
            table: table.into(),
            schema: Arc::new(schema),
            config: RepositoryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: RepositoryConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn schema(&self) -> &S {
        &self.schema
    }

    #[must_use]
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    #[must_use]
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// The primary key of a validated value, as the schema lays it out.
    pub fn key_of(&self, output: &S::Output) -> Key {
        self.schema.key(output)
    }

    /// Validate `input` and write it, replacing any item with the same key.
    ///
    /// Returns the validated value, including defaults the schema filled in.
    /// Nothing is written when validation fails.
    pub async fn put(&self, input: S::Input) -> Result<S::Output, RepositoryError<C::Error>> {
        let output = self.schema.validate(input)?;
        let item = self.schema.to_item(&output)?;
        let key = self.schema.key(&output);

        self.client
            .put_item(PutItemInput {
                table_name: self.table.clone(),
                item,
            })
            .await
            .map_err(RepositoryError::Storage)?;
        debug!(table = %self.table, key = %key, "put item");
        Ok(output)
    }

    /// Read the item stored under `key`.
    ///
    /// Absence is [`RepositoryError::NotFound`]; a stored item that no longer
    /// satisfies the schema is [`RepositoryError::SchemaValidation`].
    pub async fn get(&self, key: Key) -> Result<S::Output, RepositoryError<C::Error>> {
        let output = self
            .client
            .get_item(GetItemInput {
                table_name: self.table.clone(),
                key: key.clone().into_item(),
                consistent_read: self.consistent_read(None),
            })
            .await
            .map_err(RepositoryError::Storage)?;

        let Some(item) = output.item else {
            debug!(table = %self.table, key = %key, "item not found");
            return Err(RepositoryError::NotFound {
                table: self.table.clone(),
                key,
            });
        };
        debug!(table = %self.table, key = %key, "got item");
        self.schema.parse(item).map_err(|violation| {
            warn!(table = %self.table, key = %key, error = %violation, "stored item failed validation");
            RepositoryError::SchemaValidation(violation)
        })
    }

    /// Lazily stream every item matching `key` (and the optional filter).
    ///
    /// Conditions are compiled up front; a compile error is the stream's
    /// only element. Pages are fetched as the stream is polled, and the
    /// stream ends after the first storage or validation error.
    pub fn query(
        &self,
        key: &KeyConditions,
        options: QueryOptions,
    ) -> ItemStream<S::Output, C::Error> {
        let condition = match compile_conditions(Some(key), options.filter.as_ref()) {
            Ok(condition) => condition,
            Err(e) => return failed(e),
        };
        let (key_condition, filter, values) = condition;

        let template = QueryInput {
            table_name: self.table.clone(),
            index_name: options.index,
            key_condition_expression: key_condition,
            filter_expression: filter,
            expression_attribute_values: values,
            scan_index_forward: Some(options.scan_forward),
            limit: self.limit(options.page_size),
            exclusive_start_key: Item::new(),
            consistent_read: self.consistent_read(options.consistent_read),
        };
        debug!(
            table = %self.table,
            index = template.index_name.as_deref().unwrap_or("-"),
            condition = %template.key_condition_expression,
            "query"
        );

        let client = Arc::clone(&self.client);
        let fetch = move |start: Option<Item>| {
            let client = Arc::clone(&client);
            let input = QueryInput {
                exclusive_start_key: start.unwrap_or_default(),
                ..template.clone()
            };
            async move {
                let output = client.query(input).await.map_err(RepositoryError::Storage)?;
                Ok::<_, RepositoryError<C::Error>>(Page {
                    items: output.items,
                    last_evaluated_key: output.last_evaluated_key,
                })
            }
        };
        paginate(fetch, self.parser()).boxed()
    }

    /// Lazily stream every item of the table or of `options.index`.
    pub fn scan(&self, options: ScanOptions) -> ItemStream<S::Output, C::Error> {
        let (_, filter, values) = match compile_conditions(None, options.filter.as_ref()) {
            Ok(condition) => condition,
            Err(e) => return failed(e),
        };

        let template = ScanInput {
            table_name: self.table.clone(),
            index_name: options.index,
            filter_expression: filter,
            expression_attribute_values: values,
            limit: self.limit(options.page_size),
            exclusive_start_key: Item::new(),
            consistent_read: self.consistent_read(None),
        };
        debug!(
            table = %self.table,
            index = template.index_name.as_deref().unwrap_or("-"),
            "scan"
        );

        let client = Arc::clone(&self.client);
        let fetch = move |start: Option<Item>| {
            let client = Arc::clone(&client);
            let input = ScanInput {
                exclusive_start_key: start.unwrap_or_default(),
                ..template.clone()
            };
            async move {
                let output = client.scan(input).await.map_err(RepositoryError::Storage)?;
                Ok::<_, RepositoryError<C::Error>>(Page {
                    items: output.items,
                    last_evaluated_key: output.last_evaluated_key,
                })
            }
        };
        paginate(fetch, self.parser()).boxed()
    }

    fn parser(
        &self,
    ) -> impl FnMut(Item) -> Result<S::Output, RepositoryError<C::Error>> + Send + 'static {
        let schema = Arc::clone(&self.schema);
        let table = self.table.clone();
        move |item: Item| {
            schema.parse(item).map_err(|violation| {
                warn!(table = %table, error = %violation, "stored item failed validation");
                RepositoryError::SchemaValidation(violation)
            })
        }
    }

    fn limit(&self, page_size: Option<u32>) -> Option<i32> {
        page_size
            .or(self.config.page_size)
            .map(|n| i32::try_from(n).unwrap_or(i32::MAX))
    }

    fn consistent_read(&self, requested: Option<bool>) -> Option<bool> {
        requested.or(self.config.consistent_read.then_some(true))
    }
}

/// Key condition expression, filter expression and the merged bindings of
/// both.
type Compiled = (String, Option<String>, HashMap<String, AttributeValue>);

fn compile_conditions(
    key: Option<&KeyConditions>,
    filter: Option<&KeyConditions>,
) -> Result<Compiled, CompileError> {
    let mut key = match key {
        Some(key) => compile_key_condition(key)?,
        None => CompiledCondition::default(),
    };
    let filter = compile_filter_condition(filter)?;
    key.merge_values(&filter)?;
    let filter_expression = filter.expression().map(str::to_owned);
    Ok((key.expression, filter_expression, key.values))
}

fn failed<T, E>(err: CompileError) -> BoxStream<'static, Result<T, RepositoryError<E>>>
where
    T: Send + 'static,
    E: Send + 'static,
{
    stream::once(async move { Err(RepositoryError::Condition(err)) }).boxed()
}
