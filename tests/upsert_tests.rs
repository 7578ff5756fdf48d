/// Insert-with-conflict-resolution tests
///
/// Run with: cargo test --test upsert_tests
use meterstore::models::{self, PLAN};
use meterstore::{
    Capabilities, ConflictTarget, Conn, Context, MemoryDriver, Record, Session, Value,
};

const PLAN_KEY: [&str; 3] = ["namespace", "key", "version"];

fn catalog() -> (Session, MemoryDriver) {
    let driver = MemoryDriver::new(&models::schemas());
    (Session::new(driver.clone()), driver)
}

async fn seed(session: &Session) -> Record {
    session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "pro")
        .set("name", "Pro")
        .set("description", "original")
        .save(&Context::background())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_default_policy_overwrites_new_values() {
    let (session, driver) = catalog();
    let ctx = Context::background();
    let existing = seed(&session).await;

    let id = session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "pro")
        .set("name", "Pro v2")
        .set("description", "rewritten")
        .on_conflict_columns(PLAN_KEY)
        .id(&ctx)
        .await
        .unwrap();
    assert_eq!(&id, existing.id());
    assert_eq!(driver.row_count("plans").await.unwrap(), 1);

    let stored = session.query(&PLAN).get(&ctx, id).await.unwrap();
    assert_eq!(stored.field("name").unwrap(), &Value::from("Pro v2"));
    assert_eq!(stored.field("description").unwrap(), &Value::from("rewritten"));
    assert_eq!(
        stored.field("created_at").unwrap(),
        existing.field("created_at").unwrap()
    );
}

#[tokio::test]
async fn test_upsert_inserts_when_nothing_conflicts() {
    let (session, driver) = catalog();
    let ctx = Context::background();
    seed(&session).await;

    let id = session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "pro")
        .set("version", 2)
        .set("name", "Pro 2")
        .on_conflict_columns(PLAN_KEY)
        .id(&ctx)
        .await
        .unwrap();
    assert_eq!(driver.row_count("plans").await.unwrap(), 2);
    let stored = session.query(&PLAN).get(&ctx, id).await.unwrap();
    assert_eq!(stored.field("version").unwrap(), &Value::Int(2));
}

#[tokio::test]
async fn test_ignore_columns_keeps_stored_values() {
    let (session, _) = catalog();
    let ctx = Context::background();
    let existing = seed(&session).await;

    session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "pro")
        .set("name", "Renamed")
        .set("description", "should not land")
        .on_conflict_columns(PLAN_KEY)
        .ignore_columns(["description"])
        .exec(&ctx)
        .await
        .unwrap();

    let stored = session.query(&PLAN).get(&ctx, existing.id().clone()).await.unwrap();
    assert_eq!(stored.field("name").unwrap(), &Value::from("Renamed"));
    assert_eq!(stored.field("description").unwrap(), &Value::from("original"));
}

#[tokio::test]
async fn test_ignore_reports_existing_row_untouched() {
    let (session, _) = catalog();
    let ctx = Context::background();
    let existing = seed(&session).await;

    let id = session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "pro")
        .set("name", "Ignored")
        .on_conflict_columns(PLAN_KEY)
        .ignore()
        .id(&ctx)
        .await
        .unwrap();
    assert_eq!(&id, existing.id());

    let stored = session.query(&PLAN).get(&ctx, id).await.unwrap();
    assert_eq!(stored, existing);
}

#[tokio::test]
async fn test_do_nothing_has_no_id() {
    let (session, driver) = catalog();
    let ctx = Context::background();
    seed(&session).await;

    let err = session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "pro")
        .set("name", "Skipped")
        .on_conflict_columns(PLAN_KEY)
        .do_nothing()
        .id(&ctx)
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{}", err);
    assert_eq!(driver.row_count("plans").await.unwrap(), 1);

    session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "pro")
        .set("name", "Skipped")
        .on_conflict_columns(PLAN_KEY)
        .do_nothing()
        .exec(&ctx)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_custom_resolution() {
    let (session, _) = catalog();
    let ctx = Context::background();
    let existing = seed(&session).await;

    let id = session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "pro")
        .set("name", "Incoming")
        .set("description", "incoming")
        .on_conflict_columns(PLAN_KEY)
        .resolve(|r| r.existing("name").value("status", "archived").new("description"))
        .id(&ctx)
        .await
        .unwrap();

    let stored = session.query(&PLAN).get(&ctx, id).await.unwrap();
    assert_eq!(stored.field("name").unwrap(), existing.field("name").unwrap());
    assert_eq!(stored.field("status").unwrap(), &Value::from("archived"));
    assert_eq!(stored.field("description").unwrap(), &Value::from("incoming"));

    let err = session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "pro")
        .set("name", "Incoming")
        .on_conflict_columns(PLAN_KEY)
        .resolve(|r| r.new("created_at"))
        .exec(&ctx)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(err.field(), Some("created_at"));
}

#[tokio::test]
async fn test_primary_key_target() {
    let (session, driver) = catalog();
    let ctx = Context::background();

    for name in ["First", "Second"] {
        session
            .create(&PLAN)
            .with_id("plan-fixed")
            .set("namespace", "acme")
            .set("key", "fixed")
            .set("name", name)
            .on_conflict(ConflictTarget::PrimaryKey)
            .exec(&ctx)
            .await
            .unwrap();
    }

    assert_eq!(driver.row_count("plans").await.unwrap(), 1);
    let stored = session.query(&PLAN).get(&ctx, "plan-fixed").await.unwrap();
    assert_eq!(stored.field("name").unwrap(), &Value::from("Second"));
}

#[tokio::test]
async fn test_text_id_needs_returning() {
    let driver = MemoryDriver::new(&models::schemas()).with_capabilities(Capabilities {
        returning: false,
        upsert: true,
    });
    let session = Session::new(driver.clone());

    let err = session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "pro")
        .set("name", "Pro")
        .on_conflict_columns(PLAN_KEY)
        .id(&Context::background())
        .await
        .unwrap_err();
    assert!(err.is_capability(), "{}", err);
    assert_eq!(driver.row_count("plans").await.unwrap(), 0);
}

#[tokio::test]
async fn test_backend_without_upsert() {
    let driver = MemoryDriver::new(&models::schemas())
        .with_backend("legacy")
        .with_capabilities(Capabilities {
            returning: true,
            upsert: false,
        });
    let session = Session::new(driver.clone());

    let err = session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "pro")
        .set("name", "Pro")
        .on_conflict_columns(PLAN_KEY)
        .exec(&Context::background())
        .await
        .unwrap_err();
    assert!(err.is_capability());
    assert!(err.to_string().contains("legacy"), "{}", err);
    assert_eq!(driver.row_count("plans").await.unwrap(), 0);
}
