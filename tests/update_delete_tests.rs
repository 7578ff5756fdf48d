/// Update, delete and soft delete tests
///
/// Run with: cargo test --test update_delete_tests
use meterstore::models::{self, PLAN};
use meterstore::predicate::{eq, gte};
use meterstore::schema::validators;
use meterstore::schema::{EntitySchema, FieldDescriptor, IdDescriptor};
use meterstore::{Conn, Context, FieldType, MemoryDriver, OrmError, Record, Session, SessionConfig, Value};

static METER: EntitySchema = EntitySchema {
    name: "Meter",
    table: "meters",
    id: IdDescriptor::serial(),
    fields: &[
        FieldDescriptor::new("slug", FieldType::Text).unique(),
        FieldDescriptor::new("aggregation", FieldType::Enum(&["sum", "count", "max"])),
        FieldDescriptor::new("window", FieldType::Int).optional(),
        FieldDescriptor::new("updated_at", FieldType::Time)
            .default(validators::now)
            .update_default(validators::now),
    ],
    edges: &[],
    unique_together: &[],
    soft_delete: None,
};

fn catalog() -> (Session, MemoryDriver) {
    let driver = MemoryDriver::new(&models::schemas());
    (Session::new(driver.clone()), driver)
}

async fn plan(session: &Session, key: &str, version: i64) -> Record {
    session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", key)
        .set("name", key.to_uppercase())
        .set("version", version)
        .save(&Context::background())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_update_one_returns_reread_record() {
    let (session, _) = catalog();
    let ctx = Context::background();
    let created = plan(&session, "pro", 1).await;

    let updated = session
        .update_one(&PLAN, created.id().clone())
        .set("name", "Professional")
        .set("description", "For teams")
        .save(&ctx)
        .await
        .unwrap();

    assert_eq!(updated.id(), created.id());
    assert_eq!(updated.field("name").unwrap(), &Value::from("Professional"));
    assert_eq!(updated.field("description").unwrap(), &Value::from("For teams"));
    assert_eq!(updated.field("created_at").unwrap(), created.field("created_at").unwrap());

    let before = created.field("updated_at").unwrap().as_time().unwrap();
    let after = updated.field("updated_at").unwrap().as_time().unwrap();
    assert!(after >= before);
}

#[tokio::test]
async fn test_clear_optional_field() {
    let (session, _) = catalog();
    let ctx = Context::background();
    let created = plan(&session, "pro", 1).await;
    session
        .update_one(&PLAN, created.id().clone())
        .set("description", "temporary")
        .exec(&ctx)
        .await
        .unwrap();

    let cleared = session
        .update_one(&PLAN, created.id().clone())
        .set("description", "ignored")
        .clear("description")
        .save(&ctx)
        .await
        .unwrap();
    assert!(cleared.field("description").unwrap().is_null());

    let err = session
        .update_one(&PLAN, created.id().clone())
        .clear("name")
        .exec(&ctx)
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("name"));
}

#[tokio::test]
async fn test_immutable_fields_cannot_change() {
    let (session, _) = catalog();
    let created = plan(&session, "pro", 1).await;

    let err = session
        .update_one(&PLAN, created.id().clone())
        .set("key", "renamed")
        .exec(&Context::background())
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(err.field(), Some("key"));
}

#[tokio::test]
async fn test_by_id_operations_report_not_found() {
    let (session, _) = catalog();
    let ctx = Context::background();

    let err = session
        .update_one(&PLAN, "missing")
        .set("name", "x")
        .save(&ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::NotFound { ref id, .. } if id == "missing"), "{}", err);

    let err = session.delete_one(&PLAN, "missing").exec(&ctx).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_update_and_delete_by_predicate() {
    let (session, driver) = catalog();
    let ctx = Context::background();
    for (key, version) in [("a", 1), ("b", 2), ("c", 3)] {
        plan(&session, key, version).await;
    }

    let affected = session
        .update(&PLAN)
        .filter(gte("version", 2))
        .set("status", "active")
        .exec(&ctx)
        .await
        .unwrap();
    assert_eq!(affected, 2);

    let active = session
        .query(&PLAN)
        .filter(eq("status", "active"))
        .count(&ctx)
        .await
        .unwrap();
    assert_eq!(active, 2);

    let removed = session
        .delete(&PLAN)
        .namespace("acme")
        .filter(eq("status", "draft"))
        .exec(&ctx)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(driver.row_count("plans").await.unwrap(), 2);

    let none = session
        .update(&PLAN)
        .filter(eq("key", "zzz"))
        .set("name", "nobody")
        .exec(&ctx)
        .await
        .unwrap();
    assert_eq!(none, 0);
}

#[tokio::test]
async fn test_soft_delete_and_restore() {
    let (session, driver) = catalog();
    let ctx = Context::background();
    let created = plan(&session, "pro", 1).await;
    plan(&session, "basic", 1).await;

    let deleted = session
        .update_one(&PLAN, created.id().clone())
        .soft_delete()
        .save(&ctx)
        .await
        .unwrap();
    assert!(deleted.field("deleted_at").unwrap().as_time().is_some());

    assert_eq!(session.query(&PLAN).count(&ctx).await.unwrap(), 1);
    assert_eq!(session.query(&PLAN).with_deleted().count(&ctx).await.unwrap(), 2);
    assert!(
        session
            .query(&PLAN)
            .get(&ctx, created.id().clone())
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert_eq!(driver.row_count("plans").await.unwrap(), 2);

    session
        .update_one(&PLAN, created.id().clone())
        .restore()
        .exec(&ctx)
        .await
        .unwrap();
    let restored = session.query(&PLAN).get(&ctx, created.id().clone()).await.unwrap();
    assert!(restored.field("deleted_at").unwrap().is_null());
}

#[tokio::test]
async fn test_soft_delete_filter_can_be_disabled() {
    let driver = MemoryDriver::new(&models::schemas());
    let session = Session::new(driver)
        .with_config(SessionConfig::new().exclude_soft_deleted(false))
        .unwrap();
    let ctx = Context::background();
    let created = plan(&session, "pro", 1).await;

    session
        .update_one(&PLAN, created.id().clone())
        .soft_delete()
        .exec(&ctx)
        .await
        .unwrap();
    assert_eq!(session.query(&PLAN).count(&ctx).await.unwrap(), 1);
}

#[tokio::test]
async fn test_serial_ids_and_schema_without_soft_delete() {
    let session = Session::new(MemoryDriver::new(&[&METER]));
    let ctx = Context::background();

    let first = session
        .create(&METER)
        .set("slug", "api_calls")
        .set("aggregation", "sum")
        .save(&ctx)
        .await
        .unwrap();
    let second = session
        .create(&METER)
        .set("slug", "tokens")
        .set("aggregation", "count")
        .set("window", 60)
        .save(&ctx)
        .await
        .unwrap();
    assert_eq!(first.id(), &Value::Int(1));
    assert_eq!(second.id(), &Value::Int(2));

    let err = session
        .update_one(&METER, 1)
        .soft_delete()
        .exec(&ctx)
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let err = session
        .update_one(&METER, 2)
        .set("slug", "api_calls")
        .exec(&ctx)
        .await
        .unwrap_err();
    assert!(err.is_constraint_violation());

    session.delete_one(&METER, 1).exec(&ctx).await.unwrap();
    let left = session.query(&METER).ids(&ctx).await.unwrap();
    assert_eq!(left, vec![Value::Int(2)]);
}
