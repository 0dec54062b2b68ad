//! In-process storage client.
//!
//! [`MemoryClient`] keeps tables in memory and evaluates key conditions and
//! filter expressions itself, so repositories can be exercised without a
//! running store. Clones share the same tables.

pub mod key_condition;
pub mod state;
pub mod storage;

use std::sync::Arc;

use tracing::debug;

use dynarepo_model::input::{CreateTableInput, GetItemInput, PutItemInput, QueryInput, ScanInput};
use dynarepo_model::output::{
    CreateTableOutput, GetItemOutput, PutItemOutput, QueryOutput, ScanOutput,
};
use dynarepo_model::{AttributeValue, Item, StoreError};

use self::key_condition::split_key_condition;
use self::state::{MemoryState, MemoryTable};
use self::storage::{KeySchema, Page, SortKey, View, page_of};
use crate::client::{StorageClient, StoreFuture};
use crate::config::MemoryStoreConfig;
use crate::expression::{Condition, EvalContext, ExpressionError, parse_condition};

/// Storage client backed by process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryClient {
    state: Arc<MemoryState>,
    config: MemoryStoreConfig,
}

impl MemoryClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            state: Arc::default(),
            config,
        }
    }

    /// Create a table. Fails if the name is taken or the key schema is
    /// malformed.
    pub fn create_table(&self, input: &CreateTableInput) -> Result<CreateTableOutput, StoreError> {
        let table = self.state.create_table(input)?;
        debug!(table = %table.name, indexes = table.indexes.len(), "created table");
        Ok(CreateTableOutput {
            table_name: table.name.clone(),
        })
    }

    /// Seed a table from a JSON array of items in attribute-value form.
    /// Returns the number of items written.
    pub fn load_items(&self, table: &str, json: &str) -> Result<usize, StoreError> {
        let items: Vec<Item> = serde_json::from_str(json).map_err(|e| {
            StoreError::serialization(format!("Failed to parse items for {table}: {e}"))
                .with_source(e)
        })?;
        let target = self.state.require_table(table)?;
        let count = items.len();
        for item in items {
            target.storage.put_item(item).map_err(storage_error)?;
        }
        debug!(table, count, "loaded items");
        Ok(count)
    }

    /// Number of items in a table.
    pub fn item_count(&self, table: &str) -> Result<usize, StoreError> {
        Ok(self.state.require_table(table)?.storage.item_count())
    }

    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.state.table_names()
    }

    fn handle_put_item(&self, input: PutItemInput) -> Result<PutItemOutput, StoreError> {
        let table = self.state.require_table(&input.table_name)?;
        table.storage.put_item(input.item).map_err(storage_error)?;
        Ok(PutItemOutput {})
    }

    fn handle_get_item(&self, input: &GetItemInput) -> Result<GetItemOutput, StoreError> {
        let table = self.state.require_table(&input.table_name)?;
        let expected = table.key_schema().attribute_names().len();
        if input.key.len() != expected {
            return Err(StoreError::validation(
                "The provided key element does not match the schema",
            ));
        }
        let item = table.storage.get_item(&input.key).map_err(storage_error)?;
        Ok(GetItemOutput { item })
    }

    fn handle_query(&self, input: &QueryInput) -> Result<QueryOutput, StoreError> {
        let table = self.state.require_table(&input.table_name)?;
        let limit = self.page_limit(input.limit)?;
        let filter = parse_filter(input.filter_expression.as_deref())?;
        let key_condition =
            parse_condition(&input.key_condition_expression).map_err(expression_error)?;
        let forward = input.scan_index_forward.unwrap_or(true);
        let start = start_key(&input.exclusive_start_key);

        let page = match input.index_name.as_deref() {
            None => {
                let (pk, sort) = split_key_condition(
                    &key_condition,
                    table.key_schema(),
                    &input.expression_attribute_values,
                )?;
                table
                    .storage
                    .query(&pk, sort.as_ref(), forward, limit, start)
                    .map_err(storage_error)?
            }
            Some(index) => {
                let index_schema = table.require_index(index)?;
                let (pk, sort) = split_key_condition(
                    &key_condition,
                    index_schema,
                    &input.expression_attribute_values,
                )?;
                let wanted = SortKey::from_value(&pk);
                let view = index_view(&table, index_schema, |position| {
                    position[0] == wanted
                        && sort.as_ref().is_none_or(|c| c.matches(&position[1]))
                });
                read_view(&table, index_schema, view, start, forward, limit)?
            }
        };

        let (items, scanned) =
            apply_filter(page.items, filter.as_ref(), &input.expression_attribute_values)?;
        debug!(
            table = %table.name,
            index = input.index_name.as_deref().unwrap_or("-"),
            scanned,
            count = items.len(),
            "query page"
        );
        Ok(QueryOutput {
            count: count_of(items.len()),
            scanned_count: count_of(scanned),
            items,
            last_evaluated_key: page.last_evaluated_key,
        })
    }

    fn handle_scan(&self, input: &ScanInput) -> Result<ScanOutput, StoreError> {
        let table = self.state.require_table(&input.table_name)?;
        let limit = self.page_limit(input.limit)?;
        let filter = parse_filter(input.filter_expression.as_deref())?;
        let start = start_key(&input.exclusive_start_key);

        let page = match input.index_name.as_deref() {
            None => table.storage.scan(limit, start).map_err(storage_error)?,
            Some(index) => {
                let index_schema = table.require_index(index)?;
                let view = index_view(&table, index_schema, |_| true);
                read_view(&table, index_schema, view, start, true, limit)?
            }
        };

        let (items, scanned) =
            apply_filter(page.items, filter.as_ref(), &input.expression_attribute_values)?;
        debug!(table = %table.name, scanned, count = items.len(), "scan page");
        Ok(ScanOutput {
            count: count_of(items.len()),
            scanned_count: count_of(scanned),
            items,
            last_evaluated_key: page.last_evaluated_key,
        })
    }

    fn page_limit(&self, limit: Option<i32>) -> Result<Option<usize>, StoreError> {
        match limit {
            Some(n) if n <= 0 => Err(StoreError::validation("Limit must be greater than 0")),
            Some(n) => Ok(usize::try_from(n).ok()),
            None => Ok(self.config.default_page_size),
        }
    }
}

impl StorageClient for MemoryClient {
    type Error = StoreError;

    fn put_item(&self, input: PutItemInput) -> StoreFuture<'_, PutItemOutput, StoreError> {
        Box::pin(async move { self.handle_put_item(input) })
    }

    fn get_item(&self, input: GetItemInput) -> StoreFuture<'_, GetItemOutput, StoreError> {
        Box::pin(async move { self.handle_get_item(&input) })
    }

    fn query(&self, input: QueryInput) -> StoreFuture<'_, QueryOutput, StoreError> {
        Box::pin(async move { self.handle_query(&input) })
    }

    fn scan(&self, input: ScanInput) -> StoreFuture<'_, ScanOutput, StoreError> {
        Box::pin(async move { self.handle_scan(&input) })
    }
}

// ---------------------------------------------------------------------------
// Index views
// ---------------------------------------------------------------------------

/// Items carrying the index key, ordered by index key then table key.
///
/// A position is `[index pk, index sk, table pk, table sk]`; `keep` sees it
/// before the item is cloned into the view.
fn index_view(
    table: &MemoryTable,
    index: &KeySchema,
    keep: impl Fn(&[SortKey]) -> bool,
) -> View {
    let table_schema = table.key_schema();
    let mut view = table.storage.view(|item| {
        let mut position = index.position(item).ok()?;
        position.extend(table_schema.position(item).ok()?);
        keep(position.as_slice()).then_some(position)
    });
    view.sort_by(|a, b| a.0.cmp(&b.0));
    view
}

fn read_view(
    table: &MemoryTable,
    index: &KeySchema,
    view: View,
    start: Option<&Item>,
    forward: bool,
    limit: Option<usize>,
) -> Result<Page, StoreError> {
    let table_schema = table.key_schema();
    let start = match start {
        Some(key) => {
            let mut position = index.position(key).map_err(storage_error)?;
            position.extend(table_schema.position(key).map_err(storage_error)?);
            Some(position)
        }
        None => None,
    };

    let (items, full) = page_of(view, start.as_deref(), forward, limit);
    let last_evaluated_key = full
        .then(|| {
            items.last().map(|item| {
                let mut key = table_schema.key_of(item);
                key.extend(index.key_of(item));
                key
            })
        })
        .flatten();
    Ok(Page {
        items,
        last_evaluated_key,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn start_key(key: &Item) -> Option<&Item> {
    (!key.is_empty()).then_some(key)
}

fn parse_filter(expression: Option<&str>) -> Result<Option<Condition>, StoreError> {
    expression
        .filter(|e| !e.trim().is_empty())
        .map(parse_condition)
        .transpose()
        .map_err(expression_error)
}

/// Keep items passing `filter`. Returns the survivors and how many were
/// evaluated.
fn apply_filter(
    items: Vec<Item>,
    filter: Option<&Condition>,
    values: &std::collections::HashMap<String, AttributeValue>,
) -> Result<(Vec<Item>, usize), StoreError> {
    let scanned = items.len();
    let Some(filter) = filter else {
        return Ok((items, scanned));
    };
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        if EvalContext::new(&item, values)
            .evaluate(filter)
            .map_err(expression_error)?
        {
            kept.push(item);
        }
    }
    Ok((kept, scanned))
}

fn count_of(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

#[allow(clippy::needless_pass_by_value)]
fn storage_error(e: storage::StorageError) -> StoreError {
    StoreError::validation(e.to_string())
}

#[allow(clippy::needless_pass_by_value)]
fn expression_error(e: ExpressionError) -> StoreError {
    StoreError::validation(format!("Invalid expression: {e}"))
}
