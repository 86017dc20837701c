//! SQLite schema definitions for the work database.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const WORKS_TABLE: Table = Table {
    name: "works",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text, non_null = true),
        sqlite_column!("normalized_title", &SqlType::Text, non_null = true),
        sqlite_column!("normalized_artist", &SqlType::Text, non_null = true),
        sqlite_column!("external_id", &SqlType::Text, is_unique = true),
        sqlite_column!("provenance", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[&["normalized_title", "normalized_artist"]],
};

const WORK_FK: ForeignKey = ForeignKey {
    foreign_table: "works",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ARRANGEMENTS_TABLE: Table = Table {
    name: "arrangements",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "work_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&WORK_FK)
        ),
        sqlite_column!("version", &SqlType::Integer, non_null = true),
        sqlite_column!("song_key", &SqlType::Text, non_null = true),
        sqlite_column!("tempo", &SqlType::Integer, non_null = true),
        sqlite_column!("time_signature", &SqlType::Text, non_null = true),
        sqlite_column!("sections", &SqlType::Text, non_null = true), // JSON array
        sqlite_column!("notes", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_arrangements_work", "work_id")],
    unique_constraints: &[&["work_id", "version"]],
};

pub const WORK_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[WORKS_TABLE, ARRANGEMENTS_TABLE],
    migration: None,
}];
