//! In-memory table storage.
//!
//! ```text
//! DashMap<partition value, BTreeMap<SortKey, Item>>
//! ```
//!
//! Partitions are independent shards of the `DashMap`; within a partition
//! items are kept in sort-key order so queries walk the `BTreeMap` directly.
//! Scans and index reads build an ordered view over all partitions instead.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use dynarepo_model::types::ScalarAttributeType;
use dynarepo_model::{AttributeValue, Item};

use crate::expression::number::{canonical_number, compare_numbers};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("missing required key attribute: {attr}")]
    MissingKeyAttribute { attr: String },
    #[error("key attribute '{attr}' has wrong type: expected {expected}, got {actual}")]
    InvalidKeyType {
        attr: String,
        expected: ScalarAttributeType,
        actual: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Key schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    pub name: String,
    pub attr_type: ScalarAttributeType,
}

impl KeyAttribute {
    fn read(&self, item: &Item) -> Result<SortKey, StorageError> {
        let value = item
            .get(&self.name)
            .ok_or_else(|| StorageError::MissingKeyAttribute {
                attr: self.name.clone(),
            })?;
        self.check(value)
    }

    /// Convert a key value, rejecting values of the wrong scalar type.
    pub fn check(&self, value: &AttributeValue) -> Result<SortKey, StorageError> {
        match (self.attr_type, value) {
            (ScalarAttributeType::S, AttributeValue::S(s)) => Ok(SortKey::S(s.clone())),
            (ScalarAttributeType::N, AttributeValue::N(n)) => Ok(SortKey::N(n.clone())),
            (ScalarAttributeType::B, AttributeValue::B(b)) => Ok(SortKey::B(b.clone())),
            (expected, other) => Err(StorageError::InvalidKeyType {
                attr: self.name.clone(),
                expected,
                actual: other.type_descriptor(),
            }),
        }
    }
}

/// Partition key plus optional sort key of a table or index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    pub partition_key: KeyAttribute,
    pub sort_key: Option<KeyAttribute>,
}

impl KeySchema {
    #[must_use]
    pub fn attribute_names(&self) -> Vec<&str> {
        std::iter::once(self.partition_key.name.as_str())
            .chain(self.sort_key.as_ref().map(|k| k.name.as_str()))
            .collect()
    }

    /// Read and type-check the key attributes of `item`.
    pub fn extract(&self, item: &Item) -> Result<(AttributeValue, SortKey), StorageError> {
        let pk = self.partition_key.read(item)?;
        let sk = match &self.sort_key {
            Some(attr) => attr.read(item)?,
            None => SortKey::Absent,
        };
        Ok((pk.into_value(), sk))
    }

    /// Key attributes of `item`, in the position order used by views.
    pub fn position(&self, item: &Item) -> Result<Vec<SortKey>, StorageError> {
        let (pk, sk) = self.extract(item)?;
        Ok(vec![SortKey::from_value(&pk), sk])
    }

    /// Copy only the key attributes out of `item`.
    #[must_use]
    pub fn key_of(&self, item: &Item) -> Item {
        self.attribute_names()
            .into_iter()
            .filter_map(|name| item.get(name).map(|v| (name.to_owned(), v.clone())))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// SortKey
// ---------------------------------------------------------------------------

/// A key value with store ordering: strings and binaries by bytes, numbers
/// numerically. `Absent` stands in for tables without a sort key.
#[derive(Debug, Clone)]
pub enum SortKey {
    Absent,
    S(String),
    N(String),
    B(Bytes),
}

impl SortKey {
    #[must_use]
    pub fn from_value(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::S(s) => Self::S(s.clone()),
            AttributeValue::N(n) => Self::N(n.clone()),
            AttributeValue::B(b) => Self::B(b.clone()),
            _ => Self::Absent,
        }
    }

    fn into_value(self) -> AttributeValue {
        match self {
            Self::S(s) => AttributeValue::S(s),
            Self::N(n) => AttributeValue::N(n),
            Self::B(b) => AttributeValue::B(b),
            Self::Absent => AttributeValue::Null(true),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Absent => 0,
            Self::S(_) => 1,
            Self::N(_) => 2,
            Self::B(_) => 3,
        }
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::S(a), Self::S(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Self::N(a), Self::N(b)) => compare_numbers(a, b).unwrap_or_else(|| a.cmp(b)),
            (Self::B(a), Self::B(b)) => a.as_ref().cmp(b.as_ref()),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

/// Sort-key predicate of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortCondition {
    Eq(SortKey),
    Lt(SortKey),
    Le(SortKey),
    Gt(SortKey),
    Ge(SortKey),
    Between(SortKey, SortKey),
    BeginsWith(SortKey),
}

impl SortCondition {
    #[must_use]
    pub fn matches(&self, key: &SortKey) -> bool {
        match self {
            Self::Eq(v) => key == v,
            Self::Lt(v) => key < v,
            Self::Le(v) => key <= v,
            Self::Gt(v) => key > v,
            Self::Ge(v) => key >= v,
            Self::Between(lo, hi) => key >= lo && key <= hi,
            Self::BeginsWith(SortKey::S(prefix)) => {
                matches!(key, SortKey::S(s) if s.starts_with(prefix.as_str()))
            }
            Self::BeginsWith(SortKey::B(prefix)) => {
                matches!(key, SortKey::B(b) if b.starts_with(prefix))
            }
            Self::BeginsWith(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// Items of one page plus the continuation key, set when the page was cut by
/// its limit.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Item>,
}

/// An ordered, materialized read view: position plus item.
pub type View = Vec<(Vec<SortKey>, Item)>;

/// Cut one page out of an ordered view.
///
/// Items at or before `start` (after it, when reading backwards) are skipped.
/// Returns the page and whether the limit was reached.
#[must_use]
pub fn page_of(
    view: View,
    start: Option<&[SortKey]>,
    forward: bool,
    limit: Option<usize>,
) -> (Vec<Item>, bool) {
    let limit = limit.unwrap_or(usize::MAX);
    let past_start = |position: &[SortKey]| match start {
        None => true,
        Some(start) if forward => position > start,
        Some(start) => position < start,
    };
    let ordered: Box<dyn Iterator<Item = (Vec<SortKey>, Item)>> = if forward {
        Box::new(view.into_iter())
    } else {
        Box::new(view.into_iter().rev())
    };
    let items: Vec<Item> = ordered
        .filter(|(position, _)| past_start(position.as_slice()))
        .take(limit)
        .map(|(_, item)| item)
        .collect();
    let full = items.len() == limit;
    (items, full)
}

// ---------------------------------------------------------------------------
// TableStorage
// ---------------------------------------------------------------------------

/// Hash key of a partition. Numbers are respelled so `1` and `1.0` share one.
fn partition_of(value: &AttributeValue) -> AttributeValue {
    match value {
        AttributeValue::N(n) => AttributeValue::N(canonical_number(n)),
        other => other.clone(),
    }
}

#[derive(Debug)]
pub struct TableStorage {
    partitions: DashMap<AttributeValue, BTreeMap<SortKey, Item>>,
    key_schema: KeySchema,
    item_count: AtomicUsize,
}

impl TableStorage {
    #[must_use]
    pub fn new(key_schema: KeySchema) -> Self {
        Self {
            partitions: DashMap::new(),
            key_schema,
            item_count: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn key_schema(&self) -> &KeySchema {
        &self.key_schema
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.item_count.load(AtomicOrdering::Relaxed)
    }

    /// Insert or replace. Returns the replaced item.
    pub fn put_item(&self, item: Item) -> Result<Option<Item>, StorageError> {
        let (pk, sk) = self.key_schema.extract(&item)?;
        let previous = self
            .partitions
            .entry(partition_of(&pk))
            .or_default()
            .insert(sk, item);
        if previous.is_some() {
            debug!("replaced existing item");
        } else {
            self.item_count.fetch_add(1, AtomicOrdering::Relaxed);
            debug!("inserted new item");
        }
        Ok(previous)
    }

    /// Look up an item by a map holding exactly its key attributes.
    pub fn get_item(&self, key: &Item) -> Result<Option<Item>, StorageError> {
        let (pk, sk) = self.key_schema.extract(key)?;
        Ok(self
            .partitions
            .get(&partition_of(&pk))
            .and_then(|partition| partition.get(&sk).cloned()))
    }

    /// Read one page of a partition in sort-key order.
    pub fn query(
        &self,
        partition_key: &AttributeValue,
        condition: Option<&SortCondition>,
        forward: bool,
        limit: Option<usize>,
        exclusive_start_key: Option<&Item>,
    ) -> Result<Page, StorageError> {
        let start = exclusive_start_key
            .map(|key| self.key_schema.extract(key).map(|(_, sk)| sk))
            .transpose()?;
        let Some(partition) = self.partitions.get(&partition_of(partition_key)) else {
            return Ok(Page::default());
        };

        let range = match (&start, forward) {
            (Some(sk), true) => (Bound::Excluded(sk.clone()), Bound::Unbounded),
            (Some(sk), false) => (Bound::Unbounded, Bound::Excluded(sk.clone())),
            (None, _) => (Bound::Unbounded, Bound::Unbounded),
        };
        let in_range = partition.range(range);
        let ordered: Box<dyn Iterator<Item = (&SortKey, &Item)>> = if forward {
            Box::new(in_range)
        } else {
            Box::new(in_range.rev())
        };

        let take = limit.unwrap_or(usize::MAX);
        let items: Vec<Item> = ordered
            .filter(|(sk, _)| condition.is_none_or(|c| c.matches(sk)))
            .take(take)
            .map(|(_, item)| item.clone())
            .collect();

        let last_evaluated_key = (items.len() == take)
            .then(|| items.last().map(|item| self.key_schema.key_of(item)))
            .flatten();
        Ok(Page {
            items,
            last_evaluated_key,
        })
    }

    /// Read one page of the whole table, partitions in key order.
    pub fn scan(
        &self,
        limit: Option<usize>,
        exclusive_start_key: Option<&Item>,
    ) -> Result<Page, StorageError> {
        let start = exclusive_start_key
            .map(|key| self.key_schema.position(key))
            .transpose()?;
        let mut view = self.view(|item| self.key_schema.position(item).ok());
        view.sort_by(|a, b| a.0.cmp(&b.0));

        let (items, full) = page_of(view, start.as_deref(), true, limit);
        let last_evaluated_key = full
            .then(|| items.last().map(|item| self.key_schema.key_of(item)))
            .flatten();
        Ok(Page {
            items,
            last_evaluated_key,
        })
    }

    /// Materialize every item for which `position` yields a position.
    pub fn view(&self, position: impl Fn(&Item) -> Option<Vec<SortKey>>) -> View {
        self.partitions
            .iter()
            .flat_map(|partition| {
                partition
                    .value()
                    .values()
                    .filter_map(|item| position(item).map(|p| (p, item.clone())))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
