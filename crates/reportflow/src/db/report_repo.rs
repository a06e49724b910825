//! Report repository: the `reports` and `report_inputs` tables.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_timestamp, parse_column, parse_optional_timestamp, parse_timestamp};
use super::DatabaseError;
use crate::model::{FallbackPolicy, Report, ReportInput, ReportStatus, SourcePriority};

/// A raw report row from the database.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub id: String,
    pub status: String,
    pub owner: String,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl ReportRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            status: row.get("status")?,
            owner: row.get("owner")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    pub fn into_report(self) -> Result<Report, DatabaseError> {
        Ok(Report {
            status: parse_column("reports.status", &self.status)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            completed_at: parse_optional_timestamp(self.completed_at)?,
            id: self.id,
            owner: self.owner,
        })
    }
}

/// Report plus the theme it was requested for.
#[derive(Debug, Clone)]
pub struct ReportListing {
    pub report: Report,
    pub theme_text: String,
}

/// Query filter parameters for report listing.
#[derive(Debug, Default, Clone)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub owner: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new report in `queued`.
pub fn insert(
    conn: &Connection,
    id: &str,
    owner: &str,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let ts = format_timestamp(now);
    conn.execute(
        "INSERT INTO reports (id, status, owner, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![id, ReportStatus::Queued.as_str(), owner, ts],
    )?;
    Ok(())
}

/// Inserts the immutable input snapshot for a report.
pub fn insert_input(
    conn: &Connection,
    report_id: &str,
    input: &ReportInput,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let focus_points = serde_json::to_string(&input.focus_points).map_err(|e| {
        DatabaseError::Corrupt {
            column: "report_inputs.focus_points",
            value: e.to_string(),
        }
    })?;
    let source_priority = serde_json::to_string(&input.source_priority).map_err(|e| {
        DatabaseError::Corrupt {
            column: "report_inputs.source_priority",
            value: e.to_string(),
        }
    })?;

    conn.execute(
        "INSERT INTO report_inputs (report_id, theme_text, purpose, region, period, assumptions,
         focus_points, source_priority, auto_fallback, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            report_id,
            input.theme_text,
            input.purpose,
            input.region,
            input.period,
            input.assumptions,
            focus_points,
            source_priority,
            input.fallback.is_auto(),
            format_timestamp(now),
        ],
    )?;
    Ok(())
}

/// Finds a report by its ID.
pub fn find_by_id(conn: &Connection, id: &str) -> Result<Option<Report>, DatabaseError> {
    conn.query_row(
        "SELECT * FROM reports WHERE id = ?1",
        params![id],
        ReportRow::from_row,
    )
    .optional()?
    .map(ReportRow::into_report)
    .transpose()
}

/// Loads the input snapshot for a report.
pub fn find_input(conn: &Connection, report_id: &str) -> Result<Option<ReportInput>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT theme_text, purpose, region, period, assumptions, focus_points,
             source_priority, auto_fallback
             FROM report_inputs WHERE report_id = ?1",
            params![report_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, Option<String>>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, Option<String>>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, bool>(7)?,
                ))
            },
        )
        .optional()?;

    let Some((theme_text, purpose, region, period, assumptions, focus, priority, auto)) = row
    else {
        return Ok(None);
    };

    let focus_points: Vec<String> =
        serde_json::from_str(&focus).map_err(|_| DatabaseError::Corrupt {
            column: "report_inputs.focus_points",
            value: focus.clone(),
        })?;
    let source_priority: SourcePriority =
        serde_json::from_str(&priority).map_err(|_| DatabaseError::Corrupt {
            column: "report_inputs.source_priority",
            value: priority.clone(),
        })?;

    Ok(Some(ReportInput {
        theme_text,
        purpose,
        region,
        period,
        assumptions,
        focus_points,
        source_priority,
        fallback: FallbackPolicy::from_flag(auto),
    }))
}

/// Sets the aggregate status. `completed_at` is stamped on completion and
/// cleared when the report starts running again.
pub fn set_status(
    conn: &Connection,
    id: &str,
    status: ReportStatus,
    now: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let ts = format_timestamp(now);
    let completed_at = match status {
        ReportStatus::Completed => Some(ts.clone()),
        _ => None,
    };
    let changed = conn.execute(
        "UPDATE reports SET status = ?2, updated_at = ?3,
         completed_at = CASE WHEN ?2 = 'failed' THEN completed_at ELSE ?4 END
         WHERE id = ?1",
        params![id, status.as_str(), ts, completed_at],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity: "report",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Queries reports newest first, returning (rows, total_count).
pub fn query(
    conn: &Connection,
    filter: &ReportFilter,
) -> Result<(Vec<ReportListing>, u64), DatabaseError> {
    let mut conditions = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(status) = filter.status {
        conditions.push(format!("r.status = ?{}", param_values.len() + 1));
        param_values.push(Box::new(status.as_str()));
    }
    if let Some(ref owner) = filter.owner {
        conditions.push(format!("r.owner = ?{}", param_values.len() + 1));
        param_values.push(Box::new(owner.clone()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM reports r {}", where_clause);
    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

    let limit = filter.limit.unwrap_or(50) as i64;
    let offset = filter.offset.unwrap_or(0) as i64;
    param_values.push(Box::new(limit));
    param_values.push(Box::new(offset));
    let query_sql = format!(
        "SELECT r.*, i.theme_text FROM reports r
         JOIN report_inputs i ON i.report_id = r.id
         {} ORDER BY r.created_at DESC, r.rowid DESC LIMIT ?{} OFFSET ?{}",
        where_clause,
        param_values.len() - 1,
        param_values.len()
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&query_sql)?;
    let rows = stmt
        .query_map(params_ref.as_slice(), |r| {
            Ok((ReportRow::from_row(r)?, r.get::<_, String>("theme_text")?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let listings = rows
        .into_iter()
        .map(|(row, theme_text)| {
            Ok(ReportListing {
                report: row.into_report()?,
                theme_text,
            })
        })
        .collect::<Result<Vec<_>, DatabaseError>>()?;

    Ok((listings, total))
}
