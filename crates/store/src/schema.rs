/// Idempotent DDL applied on every startup. One denormalised row per
/// span; `duration_ns` is materialised by the store and never inserted.
/// Parallel arrays (`key[i]` binds to `value[i]`) carry attributes, and
/// event attributes nest one level deeper as arrays-of-arrays.
pub const SCHEMA_SQL: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS denormalized_span
(
    trace_id String,
    span_id String,
    parent_span_id String,
    flags Int32,
    name String,
    start_time_unix_nano Int64,
    end_time_unix_nano Int64,
    duration_ns Int64 MATERIALIZED (end_time_unix_nano - start_time_unix_nano),
    scope_name String,
    resource_schema_url String,
    resource_id String,
    `resource_attributes.key` Array(String),
    `resource_attributes.value` Array(String),
    `span_attributes.key` Array(String),
    `span_attributes.value` Array(String),
    `events.time_unix_nano` Array(Int64),
    `events.name` Array(String),
    `events.attributes.key` Array(Array(String)),
    `events.attributes.value` Array(Array(String))
)
ENGINE = MergeTree
ORDER BY (start_time_unix_nano, trace_id)",
];
