//! SQL DDL for the plugin data store.

/// SQLite schema with:
/// - `(plugin, key)` as the primary key; one JSON blob per key
/// - `value` TEXT holding serialized JSON, rewritten wholesale
/// - `updated_at` TEXT (RFC3339)
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS plugin_data (
    plugin TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (plugin, key)
);

CREATE INDEX IF NOT EXISTS idx_plugin_data_plugin ON plugin_data(plugin);
"#;
