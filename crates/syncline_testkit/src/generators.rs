//! Property-based test generators using proptest.

use proptest::prelude::*;
use serde_json::{Map, Value};
use syncline_protocol::{ConflictStrategy, OperationSpec, Priority};

/// Strategy for generating priorities.
pub fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Normal),
        Just(Priority::High),
        Just(Priority::Critical),
    ]
}

/// Strategy for generating conflict strategies.
pub fn conflict_strategy_strategy() -> impl Strategy<Value = ConflictStrategy> {
    prop_oneof![
        Just(ConflictStrategy::ServerWins),
        Just(ConflictStrategy::ClientWins),
        Just(ConflictStrategy::Merge),
        Just(ConflictStrategy::Manual),
    ]
}

/// Strategy for generating scalar JSON values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,24}".prop_map(Value::String),
    ]
}

/// Strategy for generating flat JSON object payloads.
pub fn payload_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z][a-zA-Z0-9]{0,11}", scalar_strategy(), 0..8)
        .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<String, Value>>()))
}

/// Strategy for generating resource endpoints.
pub fn endpoint_strategy() -> impl Strategy<Value = String> {
    ("[a-z]{1,10}", proptest::option::of(0u32..10_000)).prop_map(|(resource, id)| match id {
        Some(id) => format!("/{resource}/{id}"),
        None => format!("/{resource}"),
    })
}

/// Strategy for generating operation specs of any type and priority.
pub fn spec_strategy() -> impl Strategy<Value = OperationSpec> {
    (0u8..3, endpoint_strategy(), payload_strategy(), priority_strategy()).prop_map(
        |(kind, endpoint, data, priority)| {
            let spec = match kind {
                0 => OperationSpec::create(endpoint, data),
                1 => OperationSpec::update(endpoint, data),
                _ => OperationSpec::delete(endpoint),
            };
            spec.with_priority(priority)
        },
    )
}
