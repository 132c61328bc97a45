use serde_json::json;

use statetable_kernel::catalog::{CatalogError, ColumnDef, ColumnType, TableDef};
use statetable_kernel::{
    install, Config, Database, InstallError, InstallOptions, Row, StorageError, TableRef, Value,
};

fn database() -> (Database, TableRef) {
    let mut db = Database::new(Config::default_config()).unwrap();
    let users = TableRef::new("public", "users");

    let mut tx = db.begin();
    tx.create_schema("public", true).unwrap();
    tx.create_table(TableDef::new(
        users.clone(),
        vec![
            ColumnDef::new("id", ColumnType::Int).not_null(),
            ColumnDef::new("name", ColumnType::Text),
        ],
    ))
    .unwrap();
    tx.commit();

    (db, users)
}

fn add_table(db: &mut Database, table: &TableRef) {
    let mut tx = db.begin();
    tx.create_schema(&table.schema, true).unwrap();
    tx.create_table(TableDef::new(
        table.clone(),
        vec![ColumnDef::new("id", ColumnType::Int)],
    ))
    .unwrap();
    tx.commit();
}

fn old_image() -> InstallOptions {
    InstallOptions {
        with_old_image: true,
        ..InstallOptions::default()
    }
}

fn log_rows(db: &Database, state: &TableRef) -> Vec<Row> {
    db.scan(state).unwrap().into_iter().map(|(_, row)| row).collect()
}

fn doc(value: serde_json::Value) -> Value {
    Value::Json(value)
}

#[test]
fn installed_table_is_discoverable() {
    let (mut db, users) = database();
    let state = db.install(&users, &InstallOptions::default()).unwrap();

    assert_eq!(state, TableRef::new("public", "users/state"));
    assert_eq!(db.registry().lookup(&users), Some(state));
}

#[test]
fn log_in_other_schema_keeps_base_name() {
    let (mut db, users) = database();
    let options = InstallOptions {
        log_schema: Some("audit".into()),
        ..old_image()
    };

    let state = db.install(&users, &options).unwrap();
    assert_eq!(state, TableRef::new("audit", "users"));
    assert!(db.catalog().has_schema("audit"));
}

#[test]
fn shadowing_location_fails_in_both_modes() {
    for with_old_image in [false, true] {
        let (mut db, users) = database();
        let options = InstallOptions {
            log_schema: Some("public".into()),
            log_name: Some("users".into()),
            with_old_image,
        };

        let err = db.install(&users, &options).unwrap_err();
        assert!(matches!(err, InstallError::Naming(_)), "got {err}");
        assert!(db.registry().log_tables().is_empty());
    }
}

#[test]
fn new_only_mode_records_after_images() {
    let (mut db, users) = database();
    let state = db.install(&users, &InstallOptions::default()).unwrap();

    let mut tx = db.begin();
    let id = tx.insert(&users, Row::new().with("id", 1).with("name", "ada")).unwrap();
    tx.commit();

    let mut tx = db.begin();
    tx.update(&users, id, &Row::new().with("name", "grace")).unwrap();
    tx.commit();

    let mut tx = db.begin();
    tx.delete(&users, id).unwrap();
    tx.commit();

    let rows = log_rows(&db, &state);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get("new"), Some(&doc(json!({ "id": 1, "name": "ada" }))));
    assert_eq!(rows[1].get("new"), Some(&doc(json!({ "id": 1, "name": "grace" }))));
    assert_eq!(rows[2].get("new"), Some(&Value::Null));
    assert!(rows.iter().all(|r| r.get("old").is_none()));
}

#[test]
fn new_and_old_mode_records_both_images() {
    let (mut db, users) = database();
    let state = db.install(&users, &old_image()).unwrap();

    let mut tx = db.begin();
    let id = tx.insert(&users, Row::new().with("id", 1).with("name", "ada")).unwrap();
    tx.update(&users, id, &Row::new().with("name", "grace")).unwrap();
    tx.delete(&users, id).unwrap();
    tx.commit();

    let ada = doc(json!({ "id": 1, "name": "ada" }));
    let grace = doc(json!({ "id": 1, "name": "grace" }));

    let rows = log_rows(&db, &state);
    assert_eq!(rows.len(), 3);

    assert_eq!(rows[0].get("new"), Some(&ada));
    assert_eq!(rows[0].get("old"), Some(&Value::Null));

    assert_eq!(rows[1].get("new"), Some(&grace));
    assert_eq!(rows[1].get("old"), Some(&ada));

    assert_eq!(rows[2].get("new"), Some(&Value::Null));
    assert_eq!(rows[2].get("old"), Some(&grace));
}

#[test]
fn second_install_fails_without_duplicates() {
    let (mut db, users) = database();
    db.install(&users, &InstallOptions::default()).unwrap();

    let err = db.install(&users, &InstallOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        InstallError::Storage(StorageError::Catalog(CatalogError::TableExists(_)))
    ));

    // A different location still collides on the recorder overload.
    let options = InstallOptions {
        log_schema: Some("audit".into()),
        ..InstallOptions::default()
    };
    let err = db.install(&users, &options).unwrap_err();
    assert!(matches!(
        err,
        InstallError::Storage(StorageError::Catalog(CatalogError::RoutineExists { .. }))
    ));

    assert!(!db.catalog().has_schema("audit"));
    assert_eq!(db.registry().log_tables().len(), 1);
    assert_eq!(db.catalog().overloads(&db.config().recorder_name()).len(), 1);
}

#[test]
fn log_table_count_matches_installs() {
    let (mut db, users) = database();
    let orders = TableRef::new("shop", "orders");
    let items = TableRef::new("shop", "items");
    add_table(&mut db, &orders);
    add_table(&mut db, &items);

    db.install(&users, &InstallOptions::default()).unwrap();
    db.install(&orders, &old_image()).unwrap();
    db.install(&items, &InstallOptions::default()).unwrap();
    assert!(db.install(&items, &InstallOptions::default()).is_err());

    let registry = db.registry();
    assert_eq!(registry.log_tables().len(), 3);
    assert_eq!(registry.associations().len(), 3);
    assert_eq!(registry.lookup(&orders), Some(TableRef::new("shop", "orders/state")));
}

#[test]
fn writes_to_distinct_tables_stay_in_their_own_logs() {
    let (mut db, users) = database();
    let orders = TableRef::new("public", "orders");
    add_table(&mut db, &orders);

    let users_state = db.install(&users, &InstallOptions::default()).unwrap();
    let orders_state = db.install(&orders, &InstallOptions::default()).unwrap();

    let mut tx = db.begin();
    tx.insert(&users, Row::new().with("id", 1)).unwrap();
    tx.insert(&orders, Row::new().with("id", 10)).unwrap();
    tx.insert(&orders, Row::new().with("id", 11)).unwrap();
    tx.commit();

    assert_eq!(log_rows(&db, &users_state).len(), 1);
    assert_eq!(log_rows(&db, &orders_state).len(), 2);
}

#[test]
fn rollback_discards_write_and_log_row() {
    let (mut db, users) = database();
    let state = db.install(&users, &InstallOptions::default()).unwrap();

    let mut tx = db.begin();
    tx.insert(&users, Row::new().with("id", 1)).unwrap();
    assert_eq!(tx.scan(&state).unwrap().len(), 1);
    tx.rollback();

    assert!(db.scan(&users).unwrap().is_empty());
    assert!(db.scan(&state).unwrap().is_empty());
}

#[test]
fn install_rolls_back_with_enclosing_transaction() {
    let (mut db, users) = database();

    {
        let mut tx = db.begin();
        let (state, batch) = install(&mut tx, &users, &InstallOptions::default()).unwrap();
        assert_eq!(state, TableRef::new("public", "users/state"));
        assert_eq!(batch.len(), 4);
    }

    assert!(db.registry().lookup(&users).is_none());
    assert!(db.catalog().hooks_on(&users).is_empty());
}

#[test]
fn failed_log_write_aborts_the_base_write() {
    let (mut db, users) = database();
    let state = db.install(&users, &InstallOptions::default()).unwrap();

    let mut tx = db.begin();
    tx.drop_table(&state).unwrap();

    let err = tx.insert(&users, Row::new().with("id", 1)).unwrap_err();
    assert!(matches!(
        err,
        StorageError::Catalog(CatalogError::TableNotFound(_))
    ));
    assert!(tx.scan(&users).unwrap().is_empty());
    tx.rollback();
}

#[test]
fn missing_recorder_fails_the_write() {
    let (mut db, users) = database();
    db.install(&users, &InstallOptions::default()).unwrap();
    let row_type = db.catalog().require_table(&users).unwrap().row_type;
    let recorder = db.config().recorder_name();

    let mut tx = db.begin();
    tx.drop_routine(&recorder, &[row_type, row_type]).unwrap();

    let err = tx.insert(&users, Row::new().with("id", 1)).unwrap_err();
    assert!(matches!(err, StorageError::RecorderMissing { .. }));
    assert!(tx.registry().lookup(&users).is_none());
}

#[test]
fn multi_row_writes_log_one_row_each() {
    let (mut db, users) = database();
    let state = db.install(&users, &InstallOptions::default()).unwrap();

    let mut tx = db.begin();
    for id in 1..=3 {
        tx.insert(&users, Row::new().with("id", id)).unwrap();
    }
    tx.commit();

    let mut tx = db.begin();
    let txid = tx.id() as i64;
    let updated = tx
        .update_where(&users, |_| true, &Row::new().with("name", "x"))
        .unwrap();
    assert_eq!(updated, 3);

    let by_txid = tx.lookup(&state, "txid", &Value::Int(txid)).unwrap();
    assert_eq!(by_txid.len(), 3);
    tx.commit();

    assert_eq!(log_rows(&db, &state).len(), 6);
}

#[test]
fn log_rows_follow_commit_order() {
    let (mut db, users) = database();
    let state = db.install(&users, &InstallOptions::default()).unwrap();

    for id in 0..5 {
        let mut tx = db.begin();
        tx.insert(&users, Row::new().with("id", id)).unwrap();
        tx.commit();
    }

    let txids: Vec<i64> = log_rows(&db, &state)
        .iter()
        .map(|r| match r.get("txid") {
            Some(Value::Int(t)) => *t,
            other => panic!("unexpected txid {other:?}"),
        })
        .collect();

    let mut sorted = txids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(txids, sorted);
}

#[test]
fn log_rows_cannot_be_updated_or_deleted() {
    let (mut db, users) = database();
    let state = db.install(&users, &InstallOptions::default()).unwrap();

    let mut tx = db.begin();
    tx.insert(&users, Row::new().with("id", 1)).unwrap();
    tx.commit();
    let before = log_rows(&db, &state);
    let (log_id, _) = db.scan(&state).unwrap()[0].clone();

    let mut tx = db.begin();
    let err = tx
        .update(&state, log_id, &Row::new().with("txid", 999))
        .unwrap_err();
    assert!(matches!(err, StorageError::AppendOnly(ref t) if *t == state));

    let err = tx.delete(&state, log_id).unwrap_err();
    assert!(matches!(err, StorageError::AppendOnly(_)));

    let err = tx.delete_where(&state, |_| true).unwrap_err();
    assert!(matches!(err, StorageError::AppendOnly(_)));

    let err = tx.update_where(&state, |_| true, &Row::new()).unwrap_err();
    assert!(matches!(err, StorageError::AppendOnly(_)));
    tx.commit();

    assert_eq!(log_rows(&db, &state), before);
}
