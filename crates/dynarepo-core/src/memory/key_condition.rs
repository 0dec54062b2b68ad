//! Splits a parsed key condition into a partition value and a sort-key
//! predicate.
//!
//! A key condition is a conjunction of exactly one partition-key equality and
//! at most one sort-key condition, in either order.

use std::collections::HashMap;

use dynarepo_model::{AttributeValue, StoreError};

use super::storage::{KeyAttribute, KeySchema, SortCondition, SortKey};
use crate::expression::{Comparator, Condition, Function, Operand};

/// Extract the partition value and optional sort predicate.
pub fn split_key_condition(
    condition: &Condition,
    schema: &KeySchema,
    values: &HashMap<String, AttributeValue>,
) -> Result<(AttributeValue, Option<SortCondition>), StoreError> {
    let mut partition = None;
    let mut sort = None;

    for part in condition.conjuncts() {
        match key_attribute_of(part) {
            Some(name) if name == schema.partition_key.name => {
                if partition.is_some() {
                    return Err(StoreError::validation(format!(
                        "KeyConditionExpression names the partition key {name} more than once"
                    )));
                }
                partition = Some(partition_value(part, &schema.partition_key, values)?);
            }
            Some(name) if schema.sort_key.as_ref().is_some_and(|sk| sk.name == name) => {
                if sort.is_some() {
                    return Err(StoreError::validation(format!(
                        "KeyConditionExpression names the sort key {name} more than once"
                    )));
                }
                let attr = schema.sort_key.as_ref().ok_or_else(|| {
                    StoreError::internal_error("sort key vanished while reading condition")
                })?;
                sort = Some(sort_condition(part, attr, values)?);
            }
            Some(name) => {
                return Err(StoreError::validation(format!(
                    "Query key condition not supported: {name} is not a key attribute"
                )));
            }
            None => {
                return Err(StoreError::validation(
                    "Query key condition not supported: only AND of key comparisons, \
                     BETWEEN and begins_with is allowed",
                ));
            }
        }
    }

    let partition = partition.ok_or_else(|| {
        StoreError::validation(format!(
            "Query condition missed key schema element: {}",
            schema.partition_key.name
        ))
    })?;
    Ok((partition, sort))
}

/// The key attribute a leaf condition constrains, if it is a supported shape.
fn key_attribute_of(condition: &Condition) -> Option<&str> {
    match condition {
        Condition::Compare { left, right, op } if *op != Comparator::Ne => {
            left.attribute().or_else(|| right.attribute())
        }
        Condition::Between { value, .. } => value.attribute(),
        Condition::Call {
            function: Function::BeginsWith,
            args,
        } => args.first().and_then(Operand::attribute),
        _ => None,
    }
}

fn partition_value(
    condition: &Condition,
    attr: &KeyAttribute,
    values: &HashMap<String, AttributeValue>,
) -> Result<AttributeValue, StoreError> {
    let Condition::Compare {
        left,
        op: Comparator::Eq,
        right,
    } = condition
    else {
        return Err(StoreError::validation(format!(
            "Query key condition not supported: partition key {} requires an equality",
            attr.name
        )));
    };
    let operand = if left.attribute().is_some() { right } else { left };
    let value = param(operand, values)?;
    attr.check(value)
        .map_err(|e| StoreError::validation(e.to_string()))?;
    Ok(value.clone())
}

fn sort_condition(
    condition: &Condition,
    attr: &KeyAttribute,
    values: &HashMap<String, AttributeValue>,
) -> Result<SortCondition, StoreError> {
    let key = |operand: &Operand| -> Result<SortKey, StoreError> {
        attr.check(param(operand, values)?)
            .map_err(|e| StoreError::validation(e.to_string()))
    };

    match condition {
        Condition::Compare { left, op, right } => {
            // `:v < sk` reads as `sk > :v`.
            let (operand, op) = if left.attribute().is_some() {
                (right, *op)
            } else {
                (left, op.flipped())
            };
            let value = key(operand)?;
            Ok(match op {
                Comparator::Eq => SortCondition::Eq(value),
                Comparator::Lt => SortCondition::Lt(value),
                Comparator::Le => SortCondition::Le(value),
                Comparator::Gt => SortCondition::Gt(value),
                Comparator::Ge => SortCondition::Ge(value),
                Comparator::Ne => {
                    return Err(StoreError::validation(
                        "Unsupported operator on KeyConditionExpression: <>",
                    ));
                }
            })
        }
        Condition::Between { low, high, .. } => {
            let (low, high) = (key(low)?, key(high)?);
            if low > high {
                return Err(StoreError::validation(
                    "Invalid KeyConditionExpression: the BETWEEN lower bound is greater than the upper bound",
                ));
            }
            Ok(SortCondition::Between(low, high))
        }
        Condition::Call { args, .. } => {
            let prefix = args.get(1).ok_or_else(|| {
                StoreError::validation("begins_with requires a prefix argument")
            })?;
            match key(prefix)? {
                SortKey::N(_) => Err(StoreError::validation(
                    "Invalid KeyConditionExpression: begins_with is not supported on number keys",
                )),
                prefix => Ok(SortCondition::BeginsWith(prefix)),
            }
        }
        _ => Err(StoreError::validation(
            "Query key condition not supported on the sort key",
        )),
    }
}

fn param<'v>(
    operand: &Operand,
    values: &'v HashMap<String, AttributeValue>,
) -> Result<&'v AttributeValue, StoreError> {
    match operand {
        Operand::Param(name) => values.get(name).ok_or_else(|| {
            StoreError::validation(format!(
                "Value {name} not found in ExpressionAttributeValues"
            ))
        }),
        Operand::Path(_) => Err(StoreError::validation(format!(
            "Expected a value reference in key condition, found {operand}"
        ))),
    }
}
