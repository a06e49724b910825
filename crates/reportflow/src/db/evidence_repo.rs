//! Evidence repository.
//!
//! Rows are append-only. Items stored by one collection share a
//! `created_at`, which identifies the latest collection of a section.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{format_timestamp, parse_column, parse_timestamp};
use super::DatabaseError;
use crate::model::{Evidence, EvidenceItem};

/// A raw evidence row from the database.
#[derive(Debug, Clone)]
pub struct EvidenceRow {
    pub id: String,
    pub report_id: String,
    pub section_id: String,
    pub job_id: String,
    pub source_type: String,
    pub title: String,
    pub locator: String,
    pub excerpt: String,
    pub created_at: String,
}

impl EvidenceRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            report_id: row.get("report_id")?,
            section_id: row.get("section_id")?,
            job_id: row.get("job_id")?,
            source_type: row.get("source_type")?,
            title: row.get("title")?,
            locator: row.get("locator")?,
            excerpt: row.get("excerpt")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn into_evidence(self) -> Result<Evidence, DatabaseError> {
        Ok(Evidence {
            source_type: parse_column("evidence.source_type", &self.source_type)?,
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            report_id: self.report_id,
            section_id: self.section_id,
            job_id: self.job_id,
            title: self.title,
            locator: self.locator,
            excerpt: self.excerpt,
        })
    }
}

/// Stores one collection for a section.
pub fn insert_collection(
    conn: &Connection,
    report_id: &str,
    section_id: &str,
    job_id: &str,
    items: &[EvidenceItem],
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let ts = format_timestamp(now);
    let mut stmt = conn.prepare(
        "INSERT INTO evidence (id, report_id, section_id, job_id, source_type, title, locator,
         excerpt, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for item in items {
        stmt.execute(params![
            uuid::Uuid::new_v4().to_string(),
            report_id,
            section_id,
            job_id,
            item.source_type.as_str(),
            item.title,
            item.locator,
            item.excerpt,
            ts,
        ])?;
    }
    Ok(items.len())
}

fn collect(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Evidence>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(args, EvidenceRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(EvidenceRow::into_evidence).collect()
}

/// The latest collection of one section.
pub fn latest_for_section(conn: &Connection, section_id: &str) -> Result<Vec<Evidence>, DatabaseError> {
    collect(
        conn,
        "SELECT * FROM evidence
         WHERE section_id = ?1
           AND created_at = (SELECT MAX(created_at) FROM evidence WHERE section_id = ?1)
         ORDER BY rowid",
        params![section_id],
    )
}

/// The latest collection of every other section of the report, in
/// section order.
pub fn latest_for_siblings(
    conn: &Connection,
    report_id: &str,
    section_id: &str,
) -> Result<Vec<Evidence>, DatabaseError> {
    collect(
        conn,
        "SELECT e.* FROM evidence e
         JOIN sections s ON s.id = e.section_id
         WHERE e.report_id = ?1 AND e.section_id != ?2
           AND e.created_at = (SELECT MAX(x.created_at) FROM evidence x
                               WHERE x.section_id = e.section_id)
         ORDER BY s.order_no, e.rowid",
        params![report_id, section_id],
    )
}
