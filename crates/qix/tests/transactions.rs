#![allow(dead_code)]

use qix::{Ctx, Db, Entity, Model, OrmError, OrmResult, Record, Registry, SqliteSource};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Entity)]
#[orm(table = "ledger")]
struct Entry {
    #[orm(db = "id,pk,auto")]
    id: i64,
    label: String,
    amount: i64,
}

fn setup() -> Db {
    let source = SqliteSource::open_in_memory().unwrap();
    source
        .execute_batch(
            "CREATE TABLE ledger (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                label TEXT NOT NULL,
                amount INTEGER NOT NULL
            );",
        )
        .unwrap();
    Db::new(source).with_registry(Arc::new(Registry::new()))
}

fn entry(label: &str, amount: i64) -> Entry {
    Entry {
        label: label.to_string(),
        amount,
        ..Entry::default()
    }
}

fn labels(db: &Db, ctx: &Ctx) -> Vec<String> {
    let ledger = Model::<Entry>::new(db).unwrap();
    let mut labels: Vec<String> = ledger.all(ctx).unwrap().into_iter().map(|e| e.label).collect();
    labels.sort();
    labels
}

#[test]
fn committed_work_is_visible() {
    let db = setup();
    let ctx = Ctx::background();
    let ledger = Model::<Entry>::new(&db).unwrap();

    let id = ledger
        .transaction(&ctx, |tx| {
            let mut e = entry("deposit", 100);
            tx.create(&ctx, &mut e)?;
            Ok(e.id)
        })
        .unwrap();
    assert_eq!(id, 1);
    assert_eq!(labels(&db, &ctx), ["deposit"]);
}

#[test]
fn failed_work_is_rolled_back() {
    let db = setup();
    let ctx = Ctx::background();

    let err = db
        .transaction(&ctx, |tx| -> OrmResult<()> {
            tx.table("ledger")
                .insert(&ctx, &Record::new().set("label", "lost").set("amount", 1))?;
            Err(OrmError::configuration("abort"))
        })
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(labels(&db, &ctx).is_empty());

    // The connection is usable again afterwards.
    db.table("ledger")
        .insert(&ctx, &Record::new().set("label", "kept").set("amount", 1))
        .unwrap();
    assert_eq!(labels(&db, &ctx), ["kept"]);
}

#[test]
fn inner_savepoint_failure_keeps_outer_work() {
    let db = setup();
    let ctx = Ctx::background();
    let ledger = Model::<Entry>::new(&db).unwrap();

    ledger
        .transaction(&ctx, |outer| {
            outer.create(&ctx, &mut entry("outer", 10))?;
            let inner = outer.transaction(&ctx, |inner| -> OrmResult<()> {
                inner.create(&ctx, &mut entry("inner", 20))?;
                Err(OrmError::not_found("missing account"))
            });
            assert!(inner.unwrap_err().is_not_found());
            outer.transaction(&ctx, |inner| {
                inner.create(&ctx, &mut entry("retry", 30)).map(|_| ())
            })
        })
        .unwrap();

    assert_eq!(labels(&db, &ctx), ["outer", "retry"]);
}

#[test]
fn outer_failure_discards_released_savepoints() {
    let db = setup();
    let ctx = Ctx::background();

    let result = db.transaction(&ctx, |tx| -> OrmResult<()> {
        tx.transaction(&ctx, |inner| {
            inner
                .table("ledger")
                .insert(&ctx, &Record::new().set("label", "nested").set("amount", 5))
                .map(|_| ())
        })?;
        Err(OrmError::configuration("outer failed"))
    });
    assert!(result.is_err());
    assert!(labels(&db, &ctx).is_empty());
}

#[test]
fn transaction_handles_report_depth() {
    let db = setup();
    let ctx = Ctx::background();
    assert!(!db.in_transaction());
    db.transaction(&ctx, |tx| {
        assert_eq!(tx.depth(), 1);
        tx.transaction(&ctx, |inner| {
            assert_eq!(inner.depth(), 2);
            Ok(())
        })
    })
    .unwrap();
}
