// crates/counter-reports-store-sqlite/src/transaction.rs
// ============================================================================
// Module: SQLite Usage Transaction
// Description: UsageTransaction implementation over an open SQLite transaction.
// Purpose: Translate aggregation pipeline steps into SQL statements.
// Dependencies: counter-reports-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! [`SqliteUsageTransaction`] borrows the connection of an open `SQLite`
//! transaction; the owning [`crate::SqliteUsageStore`] decides whether to
//! commit. Identities are stored as their signed bit pattern, counters as
//! non-negative integers, and the unknown publication year as `0`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use counter_reports_core::AggregationScope;
use counter_reports_core::CountKey;
use counter_reports_core::Domain;
use counter_reports_core::ItemCounts;
use counter_reports_core::PublicationYearCounts;
use counter_reports_core::RequestClass;
use counter_reports_core::StoreError;
use counter_reports_core::TitleId;
use counter_reports_core::TitlePayload;
use counter_reports_core::TitleRecord;
use counter_reports_core::UsageTransaction;
use counter_reports_core::YearMonth;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use rusqlite::params_from_iter;

use crate::store::SqliteStoreError;
use crate::store::db_error;

// ============================================================================
// SECTION: Type Aggregate Tables
// ============================================================================

/// Column layout of the per-domain type aggregate tables.
pub(crate) struct TypeTable {
    /// Table name.
    pub(crate) table: &'static str,
    /// Counter columns paired with their classification keys.
    pub(crate) columns: &'static [(&'static str, CountKey)],
}

impl TypeTable {
    /// Returns the table layout for a domain.
    pub(crate) const fn for_domain(domain: Domain) -> Self {
        match domain {
            Domain::Book => Self {
                table: "book_type_aggregates",
                columns: &[("full_requests", CountKey::Full), ("section_requests", CountKey::Section)],
            },
            Domain::Journal => Self {
                table: "journal_type_aggregates",
                columns: &[
                    ("total_requests", CountKey::Total),
                    ("html_requests", CountKey::Html),
                    ("pdf_requests", CountKey::Pdf),
                ],
            },
        }
    }

    /// Returns the comma-separated counter column list.
    pub(crate) fn column_list(&self) -> String {
        self.columns.iter().map(|(column, _)| *column).collect::<Vec<_>>().join(", ")
    }

    /// Builds counters from the stored column values.
    pub(crate) fn counts_from_values(&self, values: &[i64]) -> Result<ItemCounts, SqliteStoreError> {
        let mut counts = ItemCounts::default();
        for ((_, key), value) in self.columns.iter().zip(values) {
            counts.set(*key, count_from_sql(*value)?);
        }
        Ok(counts)
    }
}

// ============================================================================
// SECTION: Transaction
// ============================================================================

/// Usage transaction bound to an open `SQLite` transaction.
pub(crate) struct SqliteUsageTransaction<'conn> {
    /// Connection of the open transaction.
    conn: &'conn Connection,
}

impl<'conn> SqliteUsageTransaction<'conn> {
    /// Wraps the connection of an open transaction.
    pub(crate) const fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
        }
    }
}

impl UsageTransaction for SqliteUsageTransaction<'_> {
    fn find_title(&mut self, id: TitleId) -> Result<Option<TitlePayload>, StoreError> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload_json FROM titles WHERE title_id = ?1",
                params![id.to_storage()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        bytes.map(|bytes| decode_payload(&bytes)).transpose().map_err(StoreError::from)
    }

    fn insert_title(&mut self, record: &TitleRecord) -> Result<(), StoreError> {
        let payload = encode_payload(&record.payload)?;
        self.conn
            .execute(
                "INSERT INTO titles (title_id, domain, name, payload_json) VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id.to_storage(),
                    record.payload.domain.as_str(),
                    record.payload.name,
                    payload
                ],
            )
            .map_err(db_error)?;
        Ok(())
    }

    fn mark_pending_requests(&mut self) -> Result<u64, StoreError> {
        let changed = self
            .conn
            .execute("UPDATE raw_requests SET in_aggregation = 1 WHERE in_aggregation = 0", params![])
            .map_err(db_error)?;
        Ok(row_count(changed)?)
    }

    fn pending_periods(&mut self) -> Result<Vec<YearMonth>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT DISTINCT year, month FROM raw_requests WHERE in_aggregation = 1 ORDER BY \
                 year, month",
            )
            .map_err(db_error)?;
        let rows = stmt
            .query_map(params![], |row| Ok((row.get::<_, i32>(0)?, row.get::<_, u8>(1)?)))
            .map_err(db_error)?;
        let mut periods = Vec::new();
        for row in rows {
            let (year, month) = row.map_err(db_error)?;
            periods.push(stored_period(year, month)?);
        }
        Ok(periods)
    }

    fn pending_titles(&mut self, scope: &AggregationScope) -> Result<Vec<TitleId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT DISTINCT title_id FROM raw_requests WHERE in_aggregation = 1 AND year = ?1 \
                 AND month = ?2 AND domain = ?3 AND publisher_involved = ?4 ORDER BY title_id",
            )
            .map_err(db_error)?;
        let rows = stmt
            .query_map(
                params![
                    scope.period.year(),
                    scope.period.month(),
                    scope.domain.as_str(),
                    scope.publisher_involved
                ],
                |row| row.get::<_, i64>(0),
            )
            .map_err(db_error)?;
        let mut titles = Vec::new();
        for row in rows {
            titles.push(TitleId::from_storage(row.map_err(db_error)?));
        }
        Ok(titles)
    }

    fn pending_request_counts(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<ItemCounts, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT request_class, COUNT(*) FROM raw_requests WHERE in_aggregation = 1 AND \
                 title_id = ?1 AND year = ?2 AND month = ?3 AND domain = ?4 AND \
                 publisher_involved = ?5 GROUP BY request_class",
            )
            .map_err(db_error)?;
        let rows = stmt
            .query_map(pending_params(title, scope), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(db_error)?;
        let mut counts = ItemCounts::zeroed(scope.domain.aggregate_keys());
        for row in rows {
            let (label, count) = row.map_err(db_error)?;
            let class = RequestClass::parse(&label).ok_or_else(|| {
                SqliteStoreError::Corrupt(format!("unknown request class: {label}"))
            })?;
            counts.record(class, count_from_sql(count)?);
        }
        Ok(counts)
    }

    fn pending_publication_year_counts(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<PublicationYearCounts, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT COALESCE(publication_year, 0), COUNT(*) FROM raw_requests WHERE \
                 in_aggregation = 1 AND title_id = ?1 AND year = ?2 AND month = ?3 AND domain = \
                 ?4 AND publisher_involved = ?5 GROUP BY 1",
            )
            .map_err(db_error)?;
        let rows = stmt
            .query_map(pending_params(title, scope), |row| {
                Ok((row.get::<_, i32>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(db_error)?;
        let mut counts = PublicationYearCounts::default();
        for row in rows {
            let (year, count) = row.map_err(db_error)?;
            counts.add(publication_year_from_sql(year), count_from_sql(count)?);
        }
        Ok(counts)
    }

    fn delete_pending_requests(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<u64, StoreError> {
        let deleted = self
            .conn
            .execute(
                "DELETE FROM raw_requests WHERE in_aggregation = 1 AND title_id = ?1 AND year = ?2 \
                 AND month = ?3 AND domain = ?4 AND publisher_involved = ?5",
                pending_params(title, scope),
            )
            .map_err(db_error)?;
        Ok(row_count(deleted)?)
    }

    fn load_type_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<Option<ItemCounts>, StoreError> {
        let layout = TypeTable::for_domain(scope.domain);
        let sql = format!(
            "SELECT {} FROM {} WHERE title_id = ?1 AND publisher_involved = ?2 AND year = ?3 AND \
             month = ?4",
            layout.column_list(),
            layout.table
        );
        let width = layout.columns.len();
        let values: Option<Vec<i64>> = self
            .conn
            .query_row(&sql, params_from_iter(aggregate_key(title, scope)), |row| {
                (0 .. width).map(|index| row.get::<_, i64>(index)).collect::<rusqlite::Result<Vec<i64>>>()
            })
            .optional()
            .map_err(db_error)?;
        values.map(|values| layout.counts_from_values(&values)).transpose().map_err(StoreError::from)
    }

    fn insert_type_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        counts: &ItemCounts,
    ) -> Result<(), StoreError> {
        let layout = TypeTable::for_domain(scope.domain);
        let placeholders = (0 .. layout.columns.len())
            .map(|index| format!("?{}", index + 5))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} (title_id, publisher_involved, year, month, {}) VALUES (?1, ?2, ?3, \
             ?4, {placeholders})",
            layout.table,
            layout.column_list()
        );
        let values = aggregate_values(&layout, title, scope, counts)?;
        self.conn.execute(&sql, params_from_iter(values)).map_err(db_error)?;
        Ok(())
    }

    fn update_type_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        counts: &ItemCounts,
    ) -> Result<(), StoreError> {
        let layout = TypeTable::for_domain(scope.domain);
        let assignments = layout
            .columns
            .iter()
            .enumerate()
            .map(|(index, (column, _))| format!("{column} = ?{}", index + 5))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE title_id = ?1 AND publisher_involved = ?2 AND year \
             = ?3 AND month = ?4",
            layout.table
        );
        let values = aggregate_values(&layout, title, scope, counts)?;
        let changed = self.conn.execute(&sql, params_from_iter(values)).map_err(db_error)?;
        if changed == 0 {
            return Err(StoreError::Invalid(format!(
                "type aggregate missing for title {title} in {}",
                scope.period
            )));
        }
        Ok(())
    }

    fn load_publication_year_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        publication_year: Option<i32>,
    ) -> Result<Option<u64>, StoreError> {
        let requests: Option<i64> = self
            .conn
            .query_row(
                "SELECT requests FROM journal_pubyear_aggregates WHERE title_id = ?1 AND \
                 publisher_involved = ?2 AND year = ?3 AND month = ?4 AND publication_year = ?5",
                params_from_iter(publication_year_key(title, scope, publication_year)),
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        requests.map(count_from_sql).transpose().map_err(StoreError::from)
    }

    fn insert_publication_year_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        publication_year: Option<i32>,
        requests: u64,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO journal_pubyear_aggregates (title_id, publisher_involved, year, \
                 month, publication_year, requests) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params_from_iter(
                    publication_year_key(title, scope, publication_year)
                        .into_iter()
                        .chain([count_to_sql(requests)?]),
                ),
            )
            .map_err(db_error)?;
        Ok(())
    }

    fn update_publication_year_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        publication_year: Option<i32>,
        requests: u64,
    ) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE journal_pubyear_aggregates SET requests = ?6 WHERE title_id = ?1 AND \
                 publisher_involved = ?2 AND year = ?3 AND month = ?4 AND publication_year = ?5",
                params_from_iter(
                    publication_year_key(title, scope, publication_year)
                        .into_iter()
                        .chain([count_to_sql(requests)?]),
                ),
            )
            .map_err(db_error)?;
        if changed == 0 {
            return Err(StoreError::Invalid(format!(
                "publication year aggregate missing for title {title} in {}",
                scope.period
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serializes a title payload for storage.
pub(crate) fn encode_payload(payload: &TitlePayload) -> Result<Vec<u8>, SqliteStoreError> {
    serde_json::to_vec(payload).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Deserializes a stored title payload.
pub(crate) fn decode_payload(bytes: &[u8]) -> Result<TitlePayload, SqliteStoreError> {
    serde_json::from_slice(bytes).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))
}

/// Converts a counter into its column value.
fn count_to_sql(value: u64) -> Result<i64, SqliteStoreError> {
    i64::try_from(value)
        .map_err(|_| SqliteStoreError::Invalid(format!("counter {value} exceeds column range")))
}

/// Converts a column value into a counter.
pub(crate) fn count_from_sql(value: i64) -> Result<u64, SqliteStoreError> {
    u64::try_from(value)
        .map_err(|_| SqliteStoreError::Corrupt(format!("negative counter value: {value}")))
}

/// Converts an affected-row count into a counter.
fn row_count(rows: usize) -> Result<u64, SqliteStoreError> {
    u64::try_from(rows).map_err(|_| SqliteStoreError::Corrupt("row count overflow".to_string()))
}

/// Maps the stored unknown publication year (`0`) back to `None`.
pub(crate) const fn publication_year_from_sql(value: i32) -> Option<i32> {
    if value == 0 { None } else { Some(value) }
}

/// Rebuilds a stored calendar month.
pub(crate) fn stored_period(year: i32, month: u8) -> Result<YearMonth, SqliteStoreError> {
    YearMonth::new(year, month).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))
}

/// Builds the bind parameters selecting a title's pending requests in a scope.
fn pending_params(
    title: TitleId,
    scope: &AggregationScope,
) -> (i64, i32, u8, &'static str, bool) {
    (
        title.to_storage(),
        scope.period.year(),
        scope.period.month(),
        scope.domain.as_str(),
        scope.publisher_involved,
    )
}

/// Builds the primary-key columns of an aggregate row.
fn aggregate_key(title: TitleId, scope: &AggregationScope) -> [i64; 4] {
    [
        title.to_storage(),
        i64::from(scope.publisher_involved),
        i64::from(scope.period.year()),
        i64::from(scope.period.month()),
    ]
}

/// Builds the bind parameters of a type aggregate write.
fn aggregate_values(
    layout: &TypeTable,
    title: TitleId,
    scope: &AggregationScope,
    counts: &ItemCounts,
) -> Result<Vec<i64>, SqliteStoreError> {
    let mut values = aggregate_key(title, scope).to_vec();
    for (_, key) in layout.columns {
        values.push(count_to_sql(counts.get(*key))?);
    }
    Ok(values)
}

/// Builds the primary-key columns of a publication-year aggregate row.
fn publication_year_key(
    title: TitleId,
    scope: &AggregationScope,
    publication_year: Option<i32>,
) -> [i64; 5] {
    let [title, publisher_involved, year, month] = aggregate_key(title, scope);
    [title, publisher_involved, year, month, i64::from(publication_year.unwrap_or(0))]
}
