//! SQLite schema definition.

/// Complete database schema for the record store.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Patient Records (latest result per patient, overwritten on every analysis)
-- ============================================================================

CREATE TABLE IF NOT EXISTS patient_records (
    patient_id TEXT PRIMARY KEY CHECK (length(trim(patient_id)) > 0),
    name TEXT NOT NULL,
    age INTEGER NOT NULL,
    last_prediction TEXT NOT NULL,               -- 'PCOS Detected' | 'No PCOS Detected'
    confidence REAL NOT NULL DEFAULT 0.0,        -- percentage 0-100
    follicle_count INTEGER NOT NULL DEFAULT 0 CHECK (follicle_count >= 0),
    last_update TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_records_last_update ON patient_records(last_update);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_blank_patient_id_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO patient_records (patient_id, name, age, last_prediction) VALUES ('  ', 'A', 30, 'PCOS Detected')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_follicle_count_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO patient_records (patient_id, name, age, last_prediction, follicle_count) VALUES ('P1', 'A', 30, 'PCOS Detected', -1)",
            [],
        );
        assert!(result.is_err());
    }
}
