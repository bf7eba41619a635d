//! Patient record database operations.

use rusqlite::types::ValueRef;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

use super::{Database, DbError, DbResult};
use crate::identity::{names_match, IdentityConflict};
use crate::models::{DiagnosticLabel, PatientRecord};

const SELECT_COLUMNS: &str = r#"
    SELECT patient_id, name, age, last_prediction, confidence,
           follicle_count, last_update
    FROM patient_records
"#;

impl Database {
    /// Get the record for a patient, if one exists.
    pub fn get_record(&self, patient_id: &str) -> DbResult<Option<PatientRecord>> {
        self.conn
            .query_row(
                &format!("{} WHERE patient_id = ?", SELECT_COLUMNS),
                [patient_id],
                RecordRow::from_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Insert or replace the record for `record.patient_id`.
    ///
    /// Runs as one IMMEDIATE transaction: the stored name is re-read and must
    /// match the supplied name before the row is replaced. `last_update` is set
    /// to the write time and the stored row is returned.
    pub fn upsert_record(&mut self, record: &PatientRecord) -> DbResult<PatientRecord> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored_name: Option<String> = tx
            .query_row(
                "SELECT name FROM patient_records WHERE patient_id = ?",
                [&record.patient_id],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(stored_name) = stored_name {
            if !names_match(&stored_name, &record.name) {
                return Err(IdentityConflict {
                    patient_id: record.patient_id.clone(),
                    stored_name,
                }
                .into());
            }
        }

        let mut stored = record.clone();
        stored.touch();

        tx.execute(
            r#"
            INSERT INTO patient_records (
                patient_id, name, age, last_prediction, confidence,
                follicle_count, last_update
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(patient_id) DO UPDATE SET
                name = excluded.name,
                age = excluded.age,
                last_prediction = excluded.last_prediction,
                confidence = excluded.confidence,
                follicle_count = excluded.follicle_count,
                last_update = excluded.last_update
            "#,
            params![
                stored.patient_id,
                stored.name,
                stored.age,
                stored.last_prediction.as_str(),
                stored.confidence,
                stored.follicle_count,
                stored.last_update,
            ],
        )?;
        tx.commit()?;

        Ok(stored)
    }

    /// List all records, most recently updated first.
    pub fn list_records(&self) -> DbResult<Vec<PatientRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{} ORDER BY last_update DESC, patient_id",
            SELECT_COLUMNS
        ))?;

        let rows = stmt.query_map([], RecordRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.try_into()?);
        }
        Ok(records)
    }

    /// Number of stored records.
    pub fn count_records(&self) -> DbResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM patient_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete a patient's record.
    pub fn delete_record(&self, patient_id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM patient_records WHERE patient_id = ?", [patient_id])?;
        Ok(rows_affected > 0)
    }
}

/// Internal row representation for database mapping.
struct RecordRow {
    patient_id: String,
    name: String,
    age: u32,
    last_prediction: String,
    confidence: f64,
    follicle_count: u32,
    last_update: String,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(RecordRow {
            patient_id: row.get(0)?,
            name: row.get(1)?,
            age: row.get(2)?,
            last_prediction: row.get(3)?,
            confidence: confidence_from_value(row.get_ref(4)?),
            follicle_count: row.get(5)?,
            last_update: row.get(6)?,
        })
    }
}

impl TryFrom<RecordRow> for PatientRecord {
    type Error = DbError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let last_prediction = row
            .last_prediction
            .parse::<DiagnosticLabel>()
            .map_err(|e| DbError::CorruptRecord {
                patient_id: row.patient_id.clone(),
                reason: e.to_string(),
            })?;

        Ok(PatientRecord {
            patient_id: row.patient_id,
            name: row.name,
            age: row.age,
            last_prediction,
            confidence: row.confidence,
            follicle_count: row.follicle_count,
            last_update: row.last_update,
        })
    }
}

/// Read a stored confidence, falling back to 0.0 when it is not numeric.
///
/// Confidence is display-only, so a bad value must not hide the rest of the
/// record.
fn confidence_from_value(value: ValueRef<'_>) -> f64 {
    match value {
        ValueRef::Real(v) => v,
        ValueRef::Integer(v) => v as f64,
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or_else(|| {
                tracing::warn!("stored confidence is not numeric; showing 0.0");
                0.0
            }),
        ValueRef::Null | ValueRef::Blob(_) => 0.0,
    }
}
