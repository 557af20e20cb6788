// crates/counter-reports-store-sqlite/src/reports.rs
// ============================================================================
// Module: SQLite Report Reads
// Description: ReportSource implementation for the SQLite usage store.
// Purpose: Read report titles and counters in one consistent snapshot.
// Dependencies: counter-reports-core, rusqlite
// ============================================================================

//! ## Overview
//! Report reads run inside one `SQLite` transaction so the title list and
//! the counter stream agree. Both queries order by title name then stored
//! identity, which keeps counters grouped in title order for the merge-join
//! performed by report synthesis.

// ============================================================================
// SECTION: Imports
// ============================================================================

use counter_reports_core::AggregateSource;
use counter_reports_core::CountKey;
use counter_reports_core::CounterRow;
use counter_reports_core::Domain;
use counter_reports_core::ItemCounts;
use counter_reports_core::ReportPeriod;
use counter_reports_core::ReportQuery;
use counter_reports_core::ReportSnapshot;
use counter_reports_core::ReportSource;
use counter_reports_core::StoreError;
use counter_reports_core::TitleId;
use counter_reports_core::TitleRecord;
use rusqlite::Connection;
use rusqlite::params;

use crate::store::SqliteStoreError;
use crate::store::SqliteUsageStore;
use crate::store::db_error;
use crate::transaction::TypeTable;
use crate::transaction::count_from_sql;
use crate::transaction::decode_payload;
use crate::transaction::publication_year_from_sql;
use crate::transaction::stored_period;

// ============================================================================
// SECTION: Report Source
// ============================================================================

impl ReportSource for SqliteUsageStore {
    fn report_snapshot(&self, query: &ReportQuery) -> Result<ReportSnapshot, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction().map_err(db_error)?;
        let domain = query.kind.domain();
        let titles = load_titles(&tx, domain)?;
        let counters = match query.kind.source() {
            AggregateSource::TypeAggregates => load_type_counters(&tx, domain, &query.period)?,
            AggregateSource::PublicationYearAggregates => {
                load_publication_year_counters(&tx, &query.period)?
            }
        };
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(ReportSnapshot {
            titles,
            counters,
        })
    }
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Loads the catalog titles of a domain, rollups excluded, in report order.
fn load_titles(conn: &Connection, domain: Domain) -> Result<Vec<TitleRecord>, SqliteStoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT title_id, payload_json FROM titles WHERE domain = ?1 AND title_id NOT IN (?2, \
             ?3) ORDER BY name, title_id",
        )
        .map_err(db_error)?;
    let rows = stmt
        .query_map(
            params![
                domain.as_str(),
                TitleId::ALL_BOOKS.to_storage(),
                TitleId::ALL_JOURNALS.to_storage()
            ],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?)),
        )
        .map_err(db_error)?;
    let mut titles = Vec::new();
    for row in rows {
        let (id, payload) = row.map_err(db_error)?;
        let payload = decode_payload(&payload)?;
        if payload.domain != domain {
            return Err(SqliteStoreError::Corrupt(format!(
                "title {} payload domain does not match its row",
                TitleId::from_storage(id)
            )));
        }
        titles.push(TitleRecord {
            id: TitleId::from_storage(id),
            payload,
        });
    }
    Ok(titles)
}

/// Loads type aggregates recorded without publisher involvement.
fn load_type_counters(
    conn: &Connection,
    domain: Domain,
    period: &ReportPeriod,
) -> Result<Vec<CounterRow>, SqliteStoreError> {
    let layout = TypeTable::for_domain(domain);
    let columns = layout
        .columns
        .iter()
        .map(|(column, _)| format!("a.{column}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT a.title_id, a.year, a.month, {columns} FROM {} a JOIN titles t ON t.title_id = \
         a.title_id WHERE a.publisher_involved = 0 AND t.domain = ?1 AND t.title_id NOT IN (?2, \
         ?3) AND (a.year * 12 + a.month - 1) BETWEEN ?4 AND ?5 ORDER BY t.name, t.title_id, \
         a.year, a.month",
        layout.table
    );
    let width = layout.columns.len();
    let mut stmt = conn.prepare(&sql).map_err(db_error)?;
    let rows = stmt
        .query_map(
            params![
                domain.as_str(),
                TitleId::ALL_BOOKS.to_storage(),
                TitleId::ALL_JOURNALS.to_storage(),
                period.start().ordinal(),
                period.end().ordinal()
            ],
            |row| {
                let values = (0 .. width)
                    .map(|index| row.get::<_, i64>(index + 3))
                    .collect::<rusqlite::Result<Vec<i64>>>()?;
                Ok((row.get::<_, i64>(0)?, row.get::<_, i32>(1)?, row.get::<_, u8>(2)?, values))
            },
        )
        .map_err(db_error)?;
    let mut counters = Vec::new();
    for row in rows {
        let (id, year, month, values) = row.map_err(db_error)?;
        counters.push(CounterRow {
            title: TitleId::from_storage(id),
            period: stored_period(year, month)?,
            publication_year: None,
            counts: layout.counts_from_values(&values)?,
        });
    }
    Ok(counters)
}

/// Loads journal publication-year aggregates recorded without publisher
/// involvement.
fn load_publication_year_counters(
    conn: &Connection,
    period: &ReportPeriod,
) -> Result<Vec<CounterRow>, SqliteStoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT a.title_id, a.year, a.month, a.publication_year, a.requests FROM \
             journal_pubyear_aggregates a JOIN titles t ON t.title_id = a.title_id WHERE \
             a.publisher_involved = 0 AND t.domain = ?1 AND t.title_id NOT IN (?2, ?3) AND \
             (a.year * 12 + a.month - 1) BETWEEN ?4 AND ?5 ORDER BY t.name, t.title_id, a.year, \
             a.month, a.publication_year",
        )
        .map_err(db_error)?;
    let rows = stmt
        .query_map(
            params![
                Domain::Journal.as_str(),
                TitleId::ALL_BOOKS.to_storage(),
                TitleId::ALL_JOURNALS.to_storage(),
                period.start().ordinal(),
                period.end().ordinal()
            ],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, u8>(2)?,
                    row.get::<_, i32>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .map_err(db_error)?;
    let mut counters = Vec::new();
    for row in rows {
        let (id, year, month, publication_year, requests) = row.map_err(db_error)?;
        let mut counts = ItemCounts::default();
        counts.set(CountKey::Requests, count_from_sql(requests)?);
        counters.push(CounterRow {
            title: TitleId::from_storage(id),
            period: stored_period(year, month)?,
            publication_year: publication_year_from_sql(publication_year),
            counts,
        });
    }
    Ok(counters)
}
