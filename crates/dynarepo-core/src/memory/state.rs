//! Table registry of the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use dynarepo_model::StoreError;
use dynarepo_model::input::CreateTableInput;
use dynarepo_model::types::{AttributeDefinition, KeySchemaElement, KeyType};

use super::storage::{KeyAttribute, KeySchema, TableStorage};

/// One table: its key layout, its secondary indexes and its items.
#[derive(Debug)]
pub struct MemoryTable {
    pub name: String,
    pub indexes: HashMap<String, KeySchema>,
    pub storage: TableStorage,
}

impl MemoryTable {
    #[must_use]
    pub fn key_schema(&self) -> &KeySchema {
        self.storage.key_schema()
    }

    pub fn require_index(&self, name: &str) -> Result<&KeySchema, StoreError> {
        self.indexes.get(name).ok_or_else(|| {
            StoreError::validation(format!(
                "The table does not have the specified index: {name}"
            ))
        })
    }
}

/// All tables keyed by name.
#[derive(Debug, Default)]
pub struct MemoryState {
    tables: DashMap<String, Arc<MemoryTable>>,
}

impl MemoryState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<Arc<MemoryTable>> {
        self.tables.get(name).map(|t| Arc::clone(t.value()))
    }

    /// Get a table or fail with `ResourceNotFoundException`.
    pub fn require_table(&self, name: &str) -> Result<Arc<MemoryTable>, StoreError> {
        self.get_table(name).ok_or_else(|| {
            StoreError::resource_not_found(format!(
                "Requested resource not found: Table: {name} not found"
            ))
        })
    }

    /// Validate the definition and register the table.
    pub fn create_table(&self, input: &CreateTableInput) -> Result<Arc<MemoryTable>, StoreError> {
        if input.table_name.is_empty() {
            return Err(StoreError::validation("TableName must not be empty"));
        }
        let key_schema = parse_key_schema(&input.key_schema, &input.attribute_definitions)?;
        let mut indexes = HashMap::with_capacity(input.global_secondary_indexes.len());
        for index in &input.global_secondary_indexes {
            let schema = parse_key_schema(&index.key_schema, &input.attribute_definitions)?;
            if indexes.insert(index.index_name.clone(), schema).is_some() {
                return Err(StoreError::validation(format!(
                    "Duplicate index name: {}",
                    index.index_name
                )));
            }
        }

        match self.tables.entry(input.table_name.clone()) {
            Entry::Occupied(e) => Err(StoreError::resource_in_use(format!(
                "Table already exists: {}",
                e.key()
            ))),
            Entry::Vacant(e) => {
                let table = Arc::new(MemoryTable {
                    name: input.table_name.clone(),
                    indexes,
                    storage: TableStorage::new(key_schema),
                });
                e.insert(Arc::clone(&table));
                Ok(table)
            }
        }
    }

    /// Table names, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }
}

fn parse_key_schema(
    elements: &[KeySchemaElement],
    definitions: &[AttributeDefinition],
) -> Result<KeySchema, StoreError> {
    let attribute = |element: &KeySchemaElement| -> Result<KeyAttribute, StoreError> {
        definitions
            .iter()
            .find(|d| d.attribute_name == element.attribute_name)
            .map(|d| KeyAttribute {
                name: d.attribute_name.clone(),
                attr_type: d.attribute_type,
            })
            .ok_or_else(|| {
                StoreError::validation(format!(
                    "Key attribute {} is not defined in AttributeDefinitions",
                    element.attribute_name
                ))
            })
    };

    match elements {
        [hash] if hash.key_type == KeyType::Hash => Ok(KeySchema {
            partition_key: attribute(hash)?,
            sort_key: None,
        }),
        [hash, range] if hash.key_type == KeyType::Hash && range.key_type == KeyType::Range => {
            if hash.attribute_name == range.attribute_name {
                return Err(StoreError::validation(
                    "Partition key and sort key must be different attributes",
                ));
            }
            Ok(KeySchema {
                partition_key: attribute(hash)?,
                sort_key: Some(attribute(range)?),
            })
        }
        _ => Err(StoreError::validation(
            "KeySchema must be one HASH element optionally followed by one RANGE element",
        )),
    }
}
