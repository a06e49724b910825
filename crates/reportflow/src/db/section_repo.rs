//! Section repository: the per-report chapter rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_timestamp, parse_column, parse_timestamp};
use super::DatabaseError;
use crate::model::{taxonomy, EvidenceCounts, Section, SectionStatus};

/// A raw section row from the database.
#[derive(Debug, Clone)]
pub struct SectionRow {
    pub id: String,
    pub report_id: String,
    pub order_no: u32,
    pub title: String,
    pub status: String,
    pub evidence_internal: u32,
    pub evidence_video: u32,
    pub evidence_web: u32,
    pub body: Option<String>,
    pub updated_at: String,
}

impl SectionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            report_id: row.get("report_id")?,
            order_no: row.get("order_no")?,
            title: row.get("title")?,
            status: row.get("status")?,
            evidence_internal: row.get("evidence_internal")?,
            evidence_video: row.get("evidence_video")?,
            evidence_web: row.get("evidence_web")?,
            body: row.get("body")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn into_section(self) -> Result<Section, DatabaseError> {
        Ok(Section {
            status: parse_column("sections.status", &self.status)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            evidence: EvidenceCounts {
                internal: self.evidence_internal,
                video: self.evidence_video,
                web: self.evidence_web,
            },
            id: self.id,
            report_id: self.report_id,
            order_no: self.order_no,
            title: self.title,
            body: self.body,
        })
    }
}

/// Materializes the canonical sections for a report, all `planned`.
///
/// Existing rows are kept as they are. Returns the number of rows created.
pub fn ensure_skeleton(
    conn: &Connection,
    report_id: &str,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let ts = format_timestamp(now);
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO sections (id, report_id, order_no, title, status, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'planned', ?5)",
    )?;
    let mut created = 0;
    for (order_no, title) in taxonomy::sections() {
        let id = uuid::Uuid::new_v4().to_string();
        created += stmt.execute(params![id, report_id, order_no, title, ts])?;
    }
    Ok(created)
}

/// All sections of a report, ordered by `order_no`.
pub fn list_for_report(conn: &Connection, report_id: &str) -> Result<Vec<Section>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT * FROM sections WHERE report_id = ?1 ORDER BY order_no")?;
    let rows = stmt
        .query_map(params![report_id], SectionRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(SectionRow::into_section).collect()
}

pub fn find_by_order(
    conn: &Connection,
    report_id: &str,
    order_no: u32,
) -> Result<Option<Section>, DatabaseError> {
    conn.query_row(
        "SELECT * FROM sections WHERE report_id = ?1 AND order_no = ?2",
        params![report_id, order_no],
        SectionRow::from_row,
    )
    .optional()?
    .map(SectionRow::into_section)
    .transpose()
}

pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Section>, DatabaseError> {
    conn.query_row(
        "SELECT * FROM sections WHERE id = ?1",
        params![id],
        SectionRow::from_row,
    )
    .optional()?
    .map(SectionRow::into_section)
    .transpose()
}

fn require(conn: &Connection, id: &str) -> Result<Section, DatabaseError> {
    find_by_id(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity: "section",
        id: id.to_string(),
    })
}

/// Applies a state machine transition.
pub fn set_status(
    conn: &Connection,
    id: &str,
    next: SectionStatus,
    now: DateTime<Utc>,
) -> Result<Section, DatabaseError> {
    let section = require(conn, id)?;
    if !section.status.can_transition_to(next) {
        return Err(DatabaseError::InvalidTransition {
            entity: "section",
            id: id.to_string(),
            from: section.status.to_string(),
            to: next.to_string(),
        });
    }
    conn.execute(
        "UPDATE sections SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, next.as_str(), format_timestamp(now)],
    )?;
    require(conn, id)
}

/// Replaces the per-source counters with those of the latest collection.
pub fn set_evidence_counts(
    conn: &Connection,
    id: &str,
    counts: EvidenceCounts,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE sections SET evidence_internal = ?2, evidence_video = ?3, evidence_web = ?4,
         updated_at = ?5 WHERE id = ?1",
        params![
            id,
            counts.internal,
            counts.video,
            counts.web,
            format_timestamp(now)
        ],
    )?;
    Ok(())
}

pub fn set_body(
    conn: &Connection,
    id: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE sections SET body = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, body, format_timestamp(now)],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{report_repo, Database};

    fn with_report<F>(f: F)
    where
        F: FnOnce(&Connection) -> Result<(), DatabaseError>,
    {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            report_repo::insert(conn, "r1", "o", Utc::now())?;
            f(conn)
        })
        .unwrap();
    }

    #[test]
    fn test_skeleton_is_contiguous_and_idempotent() {
        with_report(|conn| {
            let now = Utc::now();
            assert_eq!(ensure_skeleton(conn, "r1", now)?, 8);
            assert_eq!(ensure_skeleton(conn, "r1", now)?, 0);

            let sections = list_for_report(conn, "r1")?;
            assert_eq!(sections.len(), 8);
            for (i, section) in sections.iter().enumerate() {
                assert_eq!(section.order_no, i as u32 + 1);
                assert_eq!(section.status, SectionStatus::Planned);
            }
            assert_eq!(sections[2].title, "Competitive landscape");
            Ok(())
        });
    }

    #[test]
    fn test_skeleton_keeps_existing_progress() {
        with_report(|conn| {
            let now = Utc::now();
            ensure_skeleton(conn, "r1", now)?;
            let first = find_by_order(conn, "r1", 1)?.unwrap();
            set_status(conn, &first.id, SectionStatus::Collecting, now)?;

            ensure_skeleton(conn, "r1", now)?;
            let again = find_by_order(conn, "r1", 1)?.unwrap();
            assert_eq!(again.id, first.id);
            assert_eq!(again.status, SectionStatus::Collecting);
            Ok(())
        });
    }

    #[test]
    fn test_transitions_are_enforced() {
        with_report(|conn| {
            let now = Utc::now();
            ensure_skeleton(conn, "r1", now)?;
            let id = find_by_order(conn, "r1", 1)?.unwrap().id;

            let err = set_status(conn, &id, SectionStatus::Completed, now).unwrap_err();
            assert!(matches!(err, DatabaseError::InvalidTransition { .. }));

            set_status(conn, &id, SectionStatus::Collecting, now)?;
            set_status(conn, &id, SectionStatus::Drafting, now)?;
            let done = set_status(conn, &id, SectionStatus::Completed, now)?;
            assert_eq!(done.status, SectionStatus::Completed);
            Ok(())
        });
    }

    #[test]
    fn test_counts_and_body() {
        with_report(|conn| {
            let now = Utc::now();
            ensure_skeleton(conn, "r1", now)?;
            let id = find_by_order(conn, "r1", 2)?.unwrap().id;

            let counts = EvidenceCounts {
                internal: 1,
                video: 0,
                web: 4,
            };
            set_evidence_counts(conn, &id, counts, now)?;
            set_body(conn, &id, "Market grows 12% a year.", now)?;

            let section = find_by_id(conn, &id)?.unwrap();
            assert_eq!(section.evidence, counts);
            assert_eq!(section.body.as_deref(), Some("Market grows 12% a year."));
            Ok(())
        });
    }

    #[test]
    fn test_unknown_section() {
        with_report(|conn| {
            assert!(find_by_order(conn, "r1", 1)?.is_none());
            let err = set_status(conn, "nope", SectionStatus::Collecting, Utc::now()).unwrap_err();
            assert!(matches!(err, DatabaseError::NotFound { entity: "section", .. }));
            Ok(())
        });
    }
}
