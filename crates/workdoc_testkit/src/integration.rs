//! Cross-crate checkout scenarios.
//!
//! Provides a harness that runs an edit script through a full checkout and
//! records what the store saw, plus the scenario and property tests for the
//! work unit protocol.

use crate::fixtures::TestStore;
use crate::generators::{apply_script, Edit};
use workdoc_core::WorkDocResult;
use workdoc_storage::StatementStats;

/// What one checkout did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutReport {
    /// Statements executed during the checkout.
    pub statements: StatementStats,
    /// Change token persisted before the checkout.
    pub token_before: Option<String>,
    /// Change token persisted after the checkout.
    pub token_after: Option<String>,
    /// Change token the work unit reported after closing.
    pub work_token: Option<String>,
}

/// Opens `key`, applies `edits`, and closes it in one session.
///
/// # Errors
///
/// Returns the first error from open, the edits, or close.
pub fn checkout(store: &TestStore, key: &str, edits: &[Edit]) -> WorkDocResult<CheckoutReport> {
    let before = store.db.stats();
    let token_before = store.persisted_token(key);

    let session = store.db.session();
    let mut work = store.work_unit(key);
    work.with_open(&session, |doc| Ok(apply_script(doc, edits)?))?;

    let after = store.db.stats();
    Ok(CheckoutReport {
        statements: StatementStats {
            queries: after.queries - before.queries,
            inserts: after.inserts - before.inserts,
            updates: after.updates - before.updates,
        },
        token_before,
        token_after: store.persisted_token(key),
        work_token: work.change_token().map(str::to_owned),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{
        document_with_token, key_binds, locations, SnapshotFile, TestStore, TEST_TABLE,
    };
    use crate::generators::{edit_script_strategy, key_strategy, PropTestConfig};
    use proptest::prelude::*;
    use workdoc_core::{WorkDocError, WorkDocState, WriteBack, UNKNOWN_CHANGE_TOKEN};
    use workdoc_dom::AccessMode;
    use workdoc_storage::{LobCell, MemoryDatabase};

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn clean_checkout_writes_nothing(key in key_strategy()) {
            let store = TestStore::new();
            store.seed(&key);

            let report = checkout(&store, &key, &[]).unwrap();
            prop_assert_eq!(report.statements.inserts, 0);
            prop_assert_eq!(report.statements.updates, 0);
            prop_assert_eq!(&report.token_after, &report.token_before);
            prop_assert_eq!(&report.work_token, &report.token_before);
        }

        #[test]
        fn mutation_writes_exactly_once(script in edit_script_strategy(1, 12)) {
            let store = TestStore::new();
            store.seed("doc");

            let report = checkout(&store, "doc", &script).unwrap();
            prop_assert_eq!(report.statements.updates, 1);
            prop_assert_eq!(report.statements.inserts, 0);
            prop_assert!(report.token_after.is_some());
            prop_assert_ne!(&report.token_after, &report.token_before);
            prop_assert_eq!(&report.work_token, &report.token_after);
        }

        #[test]
        fn written_document_round_trips(script in edit_script_strategy(0, 12)) {
            let store = TestStore::new();
            let session = store.db.session();

            let mut writer = store.work_unit("doc");
            writer.with_open(&session, |doc| Ok(apply_script(doc, &script)?)).unwrap();

            let mut reader = store.work_unit("doc");
            reader.open(&session).unwrap();
            let written = writer.document().unwrap();
            let read = reader.document().unwrap();
            prop_assert!(read.content_eq(written));
            prop_assert_eq!(reader.change_token(), writer.change_token());
            reader.close(&session).unwrap();
        }
    }

    #[test]
    fn insert_then_reselect_creates_one_row() {
        let store = TestStore::new();
        let session = store.db.session();
        let mut work = store.work_unit("new");

        work.open(&session).unwrap();
        assert_eq!(store.row_count(), 1);
        assert_eq!(store.db.stats().inserts, 1);
        assert_eq!(
            store.db.lock_owner(TEST_TABLE, "new"),
            Some(session.transaction_id())
        );
        assert_eq!(work.change_token(), store.persisted_token("new").as_deref());
        work.close(&session).unwrap();
        assert_eq!(store.row_count(), 1);
    }

    #[test]
    fn missing_insert_template_creates_nothing() {
        let store = TestStore::with_location(locations::query_only());
        let session = store.db.session();
        let mut work = store.work_unit("new");

        let err = work.open(&session).unwrap_err();
        assert!(matches!(err, WorkDocError::Configuration { .. }));
        assert!(!err.is_retryable());
        assert_eq!(work.state(), WorkDocState::Unopened);
        assert_eq!(store.row_count(), 0);
        assert_eq!(session.outstanding_connections(), 0);
    }

    #[test]
    fn query_only_location_opens_existing_rows() {
        let store = TestStore::with_location(locations::query_only());
        store
            .db
            .write_out_of_band(TEST_TABLE, "a", LobCell::Data(document_with_token("seeded")))
            .unwrap();
        let session = store.db.session();
        let mut work = store.work_unit("a");

        work.open(&session).unwrap();
        assert_eq!(work.change_token(), Some("seeded"));
        let doc = work.document_mut().unwrap();
        let root = doc.root();
        doc.set_attr(root, "seen", "yes").unwrap();
        work.close(&session).unwrap();

        assert_eq!(store.db.stats().updates, 0);
        assert_eq!(work.change_token(), store.persisted_token("a").as_deref());
        assert_ne!(work.change_token(), Some("seeded"));
    }

    #[test]
    fn missing_root_name_creates_nothing() {
        let store = TestStore::with_location(locations::without_root());
        let session = store.db.session();
        let mut work = store.work_unit("new");

        assert!(matches!(
            work.open(&session),
            Err(WorkDocError::Configuration { .. })
        ));
        assert_eq!(store.row_count(), 0);
    }

    #[test]
    fn placeholder_row_gets_content_on_close() {
        let store = TestStore::with_location(locations::empty_placeholder());
        let session = store.db.session();
        let mut work = store.work_unit("new");

        work.open(&session).unwrap();
        assert_eq!(work.write_back(), WriteBack::Forced);
        assert_eq!(store.db.row(TEST_TABLE, "new"), Some(LobCell::empty()));
        work.close(&session).unwrap();

        assert_eq!(work.change_token(), store.persisted_token("new").as_deref());
        assert_eq!(work.write_back(), WriteBack::IfModified);
    }

    #[test]
    fn null_row_is_initialised_and_written() {
        let store = TestStore::new();
        store.db.write_out_of_band(TEST_TABLE, "a", LobCell::Null).unwrap();

        let report = checkout(&store, "a", &[]).unwrap();
        assert_eq!(report.token_before, None);
        assert_eq!(report.statements.updates, 1);
        assert!(report.token_after.is_some());
        assert_ne!(report.work_token.as_deref(), Some(UNKNOWN_CHANGE_TOKEN));
    }

    #[test]
    fn double_close_is_rejected() {
        let store = TestStore::new();
        let session = store.db.session();
        let mut work = store.work_unit("a");

        work.open(&session).unwrap();
        work.close(&session).unwrap();
        let err = work.close(&session).unwrap_err();
        assert!(matches!(err, WorkDocError::InvalidState { .. }));
        assert_eq!(work.state(), WorkDocState::Closed);
    }

    #[test]
    fn stale_update_is_a_consistency_error() {
        let store = TestStore::with_location(locations::stale_update());
        let mut binds = key_binds("a");
        binds.set_lob("stale", document_with_token("stale-token"));
        let session = store.db.session();
        let mut work = store.work_unit_with_binds(binds);

        work.open(&session).unwrap();
        let doc = work.document_mut().unwrap();
        let root = doc.root();
        doc.append_element(root, "LINE").unwrap();

        let err = work.close(&session).unwrap_err();
        assert!(matches!(err, WorkDocError::Consistency { .. }));
        assert!(!err.is_retryable());
        assert_eq!(work.state(), WorkDocState::Closed);
        assert_eq!(work.document().unwrap().mode(), AccessMode::ReadOnly);
        assert_eq!(store.db.lock_owner(TEST_TABLE, "a"), None);
        assert_eq!(session.outstanding_connections(), 0);
    }

    #[test]
    fn racing_writer_is_detected() {
        let store = TestStore::new();
        store.seed("a");
        let session = store.db.session();
        let mut work =
            store.racing_work_unit("a", LobCell::Data(document_with_token("intruder")));

        work.open(&session).unwrap();
        let doc = work.document_mut().unwrap();
        let root = doc.root();
        doc.set_attr(root, "status", "mine").unwrap();

        let err = work.close(&session).unwrap_err();
        assert!(matches!(err, WorkDocError::Consistency { .. }));
        assert!(err.to_string().contains("intruder"));
        assert!(work.accessor().has_raced());
        assert_eq!(store.db.lock_owner(TEST_TABLE, "a"), None);
        assert_eq!(store.persisted_token("a").as_deref(), Some("intruder"));
    }

    #[test]
    fn nulling_update_is_a_consistency_error() {
        let store = TestStore::with_location(locations::nulling_update());
        let session = store.db.session();
        let mut work = store.work_unit("a");

        work.open(&session).unwrap();
        let doc = work.document_mut().unwrap();
        let root = doc.root();
        doc.set_text(root, "body").unwrap();

        assert!(matches!(
            work.close(&session),
            Err(WorkDocError::Consistency { .. })
        ));
        assert_eq!(work.state(), WorkDocState::Closed);
    }

    #[test]
    fn corrupt_row_fails_open_and_releases_lock() {
        let store = TestStore::new();
        store
            .db
            .write_out_of_band(TEST_TABLE, "a", LobCell::Data(bytes::Bytes::from_static(b"\xffjunk")))
            .unwrap();
        let session = store.db.session();
        let mut work = store.work_unit("a");

        assert!(matches!(
            work.open(&session),
            Err(WorkDocError::Document(_))
        ));
        assert_eq!(work.state(), WorkDocState::Unopened);
        assert_eq!(store.db.lock_owner(TEST_TABLE, "a"), None);
    }

    #[test]
    fn deleted_row_fails_close_and_still_releases() {
        let store = TestStore::new();
        store.seed("a");
        let session = store.db.session();
        let mut work = store.work_unit("a");

        work.open(&session).unwrap();
        let doc = work.document_mut().unwrap();
        let root = doc.root();
        doc.set_attr(root, "x", "1").unwrap();
        store.db.delete_out_of_band(TEST_TABLE, "a").unwrap();

        let err = work.close(&session).unwrap_err();
        assert!(matches!(err, WorkDocError::Database { ref location, .. } if location == "test"));
        assert_eq!(work.state(), WorkDocState::Closed);
        assert_eq!(session.outstanding_connections(), 0);
    }

    #[test]
    fn checkout_survives_snapshot_reload() {
        let snapshot = SnapshotFile::new();
        let store = TestStore::new();
        let script = vec![
            Edit::SetAttr {
                name: "status".into(),
                value: "paid".into(),
            },
            Edit::Append {
                name: "line".into(),
                text: Some("widget".into()),
            },
        ];
        let written = checkout(&store, "a", &script).unwrap();
        store.db.save_snapshot(snapshot.path()).unwrap();

        let reloaded = TestStore {
            db: MemoryDatabase::load_snapshot(snapshot.path()).unwrap(),
            storage: store.storage.clone(),
            config: store.config.clone(),
        };
        let report = checkout(&reloaded, "a", &[]).unwrap();
        assert_eq!(report.token_before, written.token_after);
        assert_eq!(report.statements.updates, 0);

        let before = store.persisted("a").unwrap();
        let after = reloaded.persisted("a").unwrap();
        assert!(before.content_eq(&after));
    }
}
