/// Create and read-back tests
///
/// Run with: cargo test --test create_read_tests
use meterstore::models::{self, PLAN, Plan, RATE_CARD};
use meterstore::predicate::{self, contains, eq, gt, is_in, not};
use meterstore::{
    Aggregate, Conn, Context, MemoryDriver, Order, OrmError, Projection, Session, Value,
};

fn catalog() -> (Session, MemoryDriver) {
    let driver = MemoryDriver::new(&models::schemas());
    (Session::new(driver.clone()), driver)
}

async fn plan(session: &Session, ns: &str, key: &str, version: i64) -> meterstore::Record {
    session
        .create(&PLAN)
        .set("namespace", ns)
        .set("key", key)
        .set("name", format!("Plan {}", key))
        .set("version", version)
        .save(&Context::background())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_fills_defaults_and_generates_id() {
    let (session, _) = catalog();
    let record = plan(&session, "acme", "pro", 1).await;

    let id = record.id().as_str().unwrap().to_string();
    assert_eq!(id.len(), 36, "uuid v4 id expected, got {}", id);
    assert_eq!(record.field("currency").unwrap(), &Value::from("USD"));
    assert_eq!(record.field("status").unwrap(), &Value::from("draft"));
    assert!(record.field("description").unwrap().is_null());
    assert!(record.field("created_at").unwrap().as_time().is_some());
    assert!(record.field("metadata").unwrap().is_null());
}

#[tokio::test]
async fn test_create_then_get_returns_equal_record() {
    let (session, _) = catalog();
    let ctx = Context::background();
    let created = session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "starter")
        .set("name", "Starter")
        .set("metadata", serde_json::json!({"tier": "low", "seats": 3}))
        .save(&ctx)
        .await
        .unwrap();

    let found = session.query(&PLAN).get(&ctx, created.id().clone()).await.unwrap();
    assert_eq!(found, created);

    let typed: Plan = found.to().unwrap();
    assert_eq!(typed.key, "starter");
    assert_eq!(typed.version, 1);
    assert_eq!(typed.metadata.unwrap()["seats"], serde_json::json!(3));
}

#[tokio::test]
async fn test_explicit_id_on_assignable_entity() {
    let (session, _) = catalog();
    let record = session
        .create(&PLAN)
        .with_id("abc")
        .set("namespace", "acme")
        .set("key", "custom")
        .set("name", "Custom")
        .save(&Context::background())
        .await
        .unwrap();

    assert_eq!(record.id(), &Value::from("abc"));
}

#[tokio::test]
async fn test_explicit_id_rejected_when_not_assignable() {
    let (session, driver) = catalog();
    let err = session
        .create(&RATE_CARD)
        .with_id("rc-1")
        .save(&Context::background())
        .await
        .unwrap_err();

    assert!(err.is_validation(), "{}", err);
    assert_eq!(driver.row_count("rate_cards").await.unwrap(), 0);
}

#[tokio::test]
async fn test_validation_happens_before_io() {
    let (session, driver) = catalog();
    let ctx = Context::background();

    let missing = session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "pro")
        .save(&ctx)
        .await
        .unwrap_err();
    assert!(missing.is_validation());
    assert_eq!(missing.field(), Some("name"));

    let bad_namespace = session
        .create(&PLAN)
        .set("namespace", "Not Valid")
        .set("key", "pro")
        .set("name", "Pro")
        .save(&ctx)
        .await
        .unwrap_err();
    assert_eq!(bad_namespace.field(), Some("namespace"));

    let bad_enum = session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "pro")
        .set("name", "Pro")
        .set("status", "retired")
        .save(&ctx)
        .await
        .unwrap_err();
    assert_eq!(bad_enum.field(), Some("status"));

    let unknown = session
        .create(&PLAN)
        .set("colour", "blue")
        .save(&ctx)
        .await
        .unwrap_err();
    assert!(matches!(unknown, OrmError::UnknownField(ref f) if f == "colour"));

    assert_eq!(driver.row_count("plans").await.unwrap(), 0);
}

#[tokio::test]
async fn test_unique_together_is_a_constraint_violation() {
    let (session, _) = catalog();
    plan(&session, "acme", "pro", 1).await;
    plan(&session, "acme", "pro", 2).await;

    let err = session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "pro")
        .set("name", "Again")
        .save(&Context::background())
        .await
        .unwrap_err();
    assert!(err.is_constraint_violation(), "{}", err);
}

#[tokio::test]
async fn test_query_filters_order_and_paging() {
    let (session, _) = catalog();
    let ctx = Context::background();
    for (key, version) in [("basic", 1), ("pro", 2), ("enterprise", 3), ("pro_plus", 4)] {
        plan(&session, "acme", key, version).await;
    }
    plan(&session, "other", "basic", 1).await;

    let keys: Vec<String> = session
        .query(&PLAN)
        .namespace("acme")
        .filter(gt("version", 1))
        .order_by("version", Order::Desc)
        .limit(2)
        .all(&ctx)
        .await
        .unwrap()
        .iter()
        .map(|r| r.field("key").unwrap().as_str().unwrap().to_string())
        .collect();
    assert_eq!(keys, vec!["pro_plus", "enterprise"]);

    let page = session
        .query(&PLAN)
        .namespace("acme")
        .order_by("version", Order::Asc)
        .offset(3)
        .all(&ctx)
        .await
        .unwrap();
    assert_eq!(page.len(), 1);

    let pro_like = session
        .query(&PLAN)
        .filter(contains("key", "pro"))
        .count(&ctx)
        .await
        .unwrap();
    assert_eq!(pro_like, 2);

    let not_acme = session
        .query(&PLAN)
        .filter(not(eq("namespace", "acme")))
        .count(&ctx)
        .await
        .unwrap();
    assert_eq!(not_acme, 1);

    let listed = session
        .query(&PLAN)
        .filter(is_in("key", ["basic", "enterprise"]))
        .ids(&ctx)
        .await
        .unwrap();
    assert_eq!(listed.len(), 3);
}

#[tokio::test]
async fn test_first_only_and_exist() {
    let (session, _) = catalog();
    let ctx = Context::background();

    let err = session.query(&PLAN).first(&ctx).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(!session.query(&PLAN).exist(&ctx).await.unwrap());

    plan(&session, "acme", "a", 1).await;
    plan(&session, "acme", "b", 1).await;

    assert!(session.query(&PLAN).exist(&ctx).await.unwrap());
    let only = session
        .query(&PLAN)
        .filter(eq("key", "a"))
        .only(&ctx)
        .await
        .unwrap();
    assert_eq!(only.field("key").unwrap(), &Value::from("a"));

    let err = session.query(&PLAN).only(&ctx).await.unwrap_err();
    assert!(matches!(err, OrmError::NotSingular { count: 2, .. }), "{}", err);
}

#[tokio::test]
async fn test_aggregates() {
    let (session, _) = catalog();
    let ctx = Context::background();
    for (key, version) in [("a", 1), ("b", 5), ("c", 3)] {
        plan(&session, "acme", key, version).await;
    }

    let sum = session
        .query(&PLAN)
        .aggregate(&ctx, Aggregate::sum("version"))
        .await
        .unwrap();
    assert_eq!(sum, Value::Int(9));

    let max = session
        .query(&PLAN)
        .aggregate(&ctx, Aggregate::max("version"))
        .await
        .unwrap();
    assert_eq!(max, Value::Int(5));

    let min_key = session
        .query(&PLAN)
        .aggregate(&ctx, Aggregate::min("key"))
        .await
        .unwrap();
    assert_eq!(min_key, Value::from("a"));

    let err = session
        .query(&PLAN)
        .aggregate(&ctx, Aggregate::sum("name"))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    let nothing = session
        .query(&PLAN)
        .filter(eq("namespace", "nobody"))
        .aggregate(&ctx, Aggregate::sum("version"))
        .await
        .unwrap();
    assert!(nothing.is_null());

    let top_two = session
        .query(&PLAN)
        .order_by("version", Order::Desc)
        .limit(2)
        .aggregate(&ctx, Aggregate::sum("version"))
        .await
        .unwrap();
    assert_eq!(top_two, Value::Int(8));

    let counted = session.query(&PLAN).offset(1).count(&ctx).await.unwrap();
    assert_eq!(counted, 2);
}

#[tokio::test]
async fn test_projections_land_in_selected_values() {
    let (session, _) = catalog();
    let ctx = Context::background();
    plan(&session, "acme", "pro", 2).await;

    let record = session
        .query(&PLAN)
        .select_extra(Projection::field("key", "plan_key"))
        .select_extra(Projection::literal(42, "answer"))
        .first(&ctx)
        .await
        .unwrap();
    assert_eq!(record.get("plan_key").unwrap(), &Value::from("pro"));
    assert_eq!(record.get("answer").unwrap(), &Value::Int(42));
    assert!(matches!(
        record.get("missing").unwrap_err(),
        OrmError::UnknownField(_)
    ));

    let err = session
        .query(&PLAN)
        .select_extra(Projection::literal(1, "name"))
        .all(&ctx)
        .await
        .unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn test_null_predicates() {
    let (session, _) = catalog();
    let ctx = Context::background();
    plan(&session, "acme", "a", 1).await;
    session
        .create(&PLAN)
        .set("namespace", "acme")
        .set("key", "b")
        .set("name", "B")
        .set("description", "described")
        .exec(&ctx)
        .await
        .unwrap();

    let undescribed = session
        .query(&PLAN)
        .filter(predicate::is_null("description"))
        .count(&ctx)
        .await
        .unwrap();
    assert_eq!(undescribed, 1);

    let described = session
        .query(&PLAN)
        .filter(predicate::ne("description", Value::Null))
        .count(&ctx)
        .await
        .unwrap();
    assert_eq!(described, 1);

    let not_described = session
        .query(&PLAN)
        .filter(predicate::not(predicate::eq("description", "described")))
        .count(&ctx)
        .await
        .unwrap();
    assert_eq!(not_described, 0);

    let other = session
        .query(&PLAN)
        .filter(predicate::ne("description", "other"))
        .count(&ctx)
        .await
        .unwrap();
    assert_eq!(other, 1);
}
