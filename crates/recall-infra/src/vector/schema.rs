//! Arrow schema for the episodic memory table in LanceDB.
//!
//! Arrow versions MUST match lancedb's transitive dependency (57.3 for lancedb 0.26).

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// Table name used for episodic memories.
pub const MEMORY_TABLE: &str = "episodic_memory";

/// Schema for the episodic memory table.
///
/// `memory_date` is the `YYYY-MM-DD` event day so date filters can be pushed
/// down as string comparisons. `topics` and `provenance` are JSON text.
pub fn memory_schema(dimension: i32) -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("memory_type", DataType::Utf8, false),
        Field::new("importance", DataType::Float64, false),
        Field::new("repetitions", DataType::Int32, false),
        Field::new("access_count", DataType::Int32, false),
        Field::new("created_at", DataType::Utf8, false),
        Field::new("last_accessed", DataType::Utf8, false),
        Field::new("event_timestamp", DataType::Utf8, true),
        Field::new("memory_date", DataType::Utf8, false),
        Field::new("content_key", DataType::Utf8, false),
        Field::new("preserved", DataType::Boolean, false),
        Field::new("topics", DataType::Utf8, false),
        Field::new("provenance", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension,
            ),
            false,
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_schema_has_correct_fields() {
        let schema = memory_schema(256);
        assert_eq!(schema.fields().len(), 15);
        assert!(schema.field_with_name("content_key").is_ok());
        assert!(schema.field_with_name("memory_date").is_ok());
        assert!(schema.field_with_name("event_timestamp").unwrap().is_nullable());

        let vector_field = schema.field_with_name("vector").unwrap();
        match vector_field.data_type() {
            DataType::FixedSizeList(_, size) => assert_eq!(*size, 256),
            other => panic!("Expected FixedSizeList, got {:?}", other),
        }
    }
}
