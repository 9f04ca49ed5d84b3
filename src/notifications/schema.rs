//! SQLite schema for the local notification state.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

/// Key-value slots holding the persisted feed and the polling high-water mark.
const LOCAL_STATE_TABLE_V1: Table = Table {
    name: "local_state",
    columns: &[
        sqlite_column!("key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
        sqlite_column!(
            "updated_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some("(datetime('now'))")
        ),
    ],
};

pub const LOCAL_STATE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[LOCAL_STATE_TABLE_V1],
    migration: None,
}];
