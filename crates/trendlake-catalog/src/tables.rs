//! Built-in table definitions for the two queryable tables.
//!
//! Column sets mirror the external catalog tables consumed by the SQL
//! engine. Both tables are partitioned by (`profile` string,
//! `processed_at` string); partition columns are not part of the data
//! columns, matching Hive-style external tables.

use serde::{Deserialize, Serialize};

/// A column in a catalog table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Data type (catalog type string, e.g. `string`, `bigint`,
    /// `array<string>`).
    pub data_type: String,
}

impl ColumnDef {
    /// Creates a column definition.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// A table registered in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Data columns in ordinal order.
    pub columns: Vec<ColumnDef>,
    /// Partition columns in ordinal order.
    pub partition_keys: Vec<ColumnDef>,
}

impl TableDef {
    /// Partition columns shared by all Trendlake tables.
    fn standard_partition_keys() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("profile", "string"),
            ColumnDef::new("processed_at", "string"),
        ]
    }

    /// The `metadata` table definition.
    #[must_use]
    pub fn metadata() -> Self {
        Self {
            name: "metadata".into(),
            columns: vec![
                ColumnDef::new("id", "string"),
                ColumnDef::new("title", "string"),
                ColumnDef::new("description", "string"),
                ColumnDef::new("upload_date", "timestamp"),
                ColumnDef::new("like_count", "bigint"),
                ColumnDef::new("repost_count", "bigint"),
                ColumnDef::new("comment_count", "bigint"),
                ColumnDef::new("view_count", "bigint"),
                ColumnDef::new("duration", "bigint"),
                ColumnDef::new("webpage_url", "string"),
                ColumnDef::new("channel", "string"),
                ColumnDef::new("timestamp", "bigint"),
                ColumnDef::new("track", "string"),
                ColumnDef::new("artists", "array<string>"),
                ColumnDef::new("artist", "string"),
                ColumnDef::new("uploader", "string"),
            ],
            partition_keys: Self::standard_partition_keys(),
        }
    }

    /// The `text_analysis` table definition.
    #[must_use]
    pub fn text_analysis() -> Self {
        Self {
            name: "text_analysis".into(),
            columns: vec![
                ColumnDef::new("id", "string"),
                ColumnDef::new("uploader", "string"),
                ColumnDef::new("description", "string"),
                ColumnDef::new("title", "string"),
                ColumnDef::new("transcript", "string"),
                ColumnDef::new("language", "string"),
                ColumnDef::new("category", "string"),
                ColumnDef::new("summary", "string"),
                ColumnDef::new("keywords", "array<string>"),
            ],
            partition_keys: Self::standard_partition_keys(),
        }
    }

    /// All built-in tables.
    #[must_use]
    pub fn builtin() -> Vec<Self> {
        vec![Self::metadata(), Self::text_analysis()]
    }
}
