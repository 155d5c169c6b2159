//! Property tests for the soft-delete lifecycle and archived-row filters.
//!
//! Covers: archive/unarchive round trip, the active/archived partition of a
//! table, and the bulk cap.

use fibertrack_core::archive::ArchiveService;
use fibertrack_core::audit::{AuditContext, AuditLogger};
use fibertrack_core::db::Database;
use fibertrack_core::db::query::{
    SelectQuery, fetch_records, include_archived, only_archived, without_archived,
};
use fibertrack_core::error::ServiceError;
use fibertrack_core::model::table::SoftDeleteTable;
use proptest::prelude::*;
use std::collections::HashSet;

fn staff_db(count: usize) -> Database {
    let db = Database::open_in_memory().expect("open db");
    db.with_conn(|conn| {
        for i in 0..count {
            conn.execute(
                "INSERT INTO staff (id, name) VALUES (?1, ?2)",
                [format!("s-{i}"), format!("Crew {i}")],
            )?;
        }
        Ok::<_, rusqlite::Error>(())
    })
    .expect("seed staff");
    db
}

fn ids_for(db: &Database, query: &SelectQuery) -> HashSet<String> {
    db.with_conn(|conn| fetch_records(conn, query))
        .expect("fetch records")
        .into_iter()
        .map(|record| record.id)
        .collect()
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(64))]

    #[test]
    fn archive_then_unarchive_restores_active(count in 1usize..12, pick in any::<prop::sample::Index>()) {
        let db = staff_db(count);
        let service = ArchiveService::new(&db, AuditLogger::default());
        let id = format!("s-{}", pick.index(count));
        let ctx = AuditContext::default();

        let archived = service.archive(SoftDeleteTable::Staff, &id, &ctx).expect("archive");
        prop_assert!(archived.rows[0].is_archived());

        let restored = service.unarchive(SoftDeleteTable::Staff, &id, &ctx).expect("unarchive");
        prop_assert!(!restored.rows[0].is_archived());
        prop_assert!(restored.rows[0].archived_at.is_none());
    }

    #[test]
    fn filters_partition_the_table(flags in prop::collection::vec(any::<bool>(), 1..40)) {
        let db = staff_db(flags.len());
        let service = ArchiveService::new(&db, AuditLogger::default());
        let to_archive: Vec<String> = flags
            .iter()
            .enumerate()
            .filter(|(_, archive)| **archive)
            .map(|(i, _)| format!("s-{i}"))
            .collect();
        if !to_archive.is_empty() {
            service
                .bulk_archive(SoftDeleteTable::Staff, &to_archive, &AuditContext::default())
                .expect("bulk archive");
        }

        let base = SelectQuery::from_table(SoftDeleteTable::Staff);
        let active = ids_for(&db, &without_archived(base.clone()));
        let archived = ids_for(&db, &only_archived(base.clone()));
        let all = ids_for(&db, &include_archived(base));

        prop_assert!(active.is_disjoint(&archived));
        prop_assert_eq!(active.len() + archived.len(), all.len());
        prop_assert_eq!(archived, to_archive.into_iter().collect::<HashSet<_>>());
    }

    #[test]
    fn bulk_over_cap_never_writes(extra in 1usize..20) {
        let db = staff_db(3);
        let service = ArchiveService::new(&db, AuditLogger::default());
        let ids: Vec<String> = (0..100 + extra).map(|i| format!("s-{}", i % 3)).collect();

        let result = service.bulk_archive(SoftDeleteTable::Staff, &ids, &AuditContext::default());
        let is_bulk_limit = matches!(result, Err(ServiceError::BulkLimit { .. }));
        prop_assert!(is_bulk_limit);
        let archived = ids_for(&db, &only_archived(SelectQuery::from_table(SoftDeleteTable::Staff)));
        prop_assert!(archived.is_empty());
    }
}

#[test]
fn bulk_at_cap_archives_exactly_one_hundred() {
    let db = staff_db(120);
    let service = ArchiveService::new(&db, AuditLogger::default());
    let ids: Vec<String> = (0..100).map(|i| format!("s-{i}")).collect();

    let outcome = service
        .bulk_archive(SoftDeleteTable::Staff, &ids, &AuditContext::default())
        .expect("bulk archive at cap");
    assert_eq!(outcome.rows.len(), 100);
    assert!(outcome.audit_logged);

    let archived = ids_for(
        &db,
        &only_archived(SelectQuery::from_table(SoftDeleteTable::Staff)),
    );
    assert_eq!(archived.len(), 100);
}

#[test]
fn bulk_over_cap_reports_limit_message() {
    let db = staff_db(1);
    let service = ArchiveService::new(&db, AuditLogger::default());
    let ids: Vec<String> = (0..101).map(|i| format!("s-{i}")).collect();
    let err = service
        .bulk_archive(SoftDeleteTable::Staff, &ids, &AuditContext::default())
        .expect_err("101 ids must be rejected");
    assert!(
        err.to_string()
            .contains("Bulk archive is limited to 100 records at a time")
    );
}
