use async_trait::async_trait;
use backhouse::analysis::{self, BRIEF_TITLE};
use backhouse::db::{self, NewInventoryItem, NewRecipeLine};
use backhouse::model::{NotificationKind, Unit};
use backhouse::suggest::SuggestionService;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

const DEFAULT_LOW_STOCK: f64 = 10.0;

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

#[derive(Clone, Default)]
struct RecordingSuggestions {
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingSuggestions {
    async fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl SuggestionService for RecordingSuggestions {
    async fn generate(&self, system_prompt: &str, user_query: &str) -> String {
        self.calls
            .lock()
            .await
            .push((system_prompt.to_string(), user_query.to_string()));
        "Push the specials today.".to_string()
    }
}

fn priced_item(name: &str, sku: &str, quantity: f64, unit: Unit) -> NewInventoryItem {
    let mut item = NewInventoryItem::basic(name, sku, quantity, unit);
    item.purchase_price = Some(10.0);
    item.purchase_unit = Some(unit);
    item.purchase_quantity = Some(10.0);
    item
}

async fn seed_dish(pool: &sqlx::SqlitePool, name: &str, price: f64, lines: &[(i64, &str, Unit, f64)]) -> i64 {
    let lines: Vec<NewRecipeLine> = lines
        .iter()
        .map(|(id, n, unit, qty)| NewRecipeLine {
            inventory_id: Some(*id),
            name: (*n).to_string(),
            unit: *unit,
            quantity_required: *qty,
        })
        .collect();
    db::insert_dish(pool, name, price, &lines).await.unwrap()
}

#[tokio::test]
async fn healthy_store_writes_nothing() {
    let pool = setup_pool().await;
    let svc = RecordingSuggestions::default();

    // Plenty of stock (20 servings), below the surplus bar, no expiry.
    let flour = db::insert_item(&pool, &priced_item("Flour", "FLR-1", 40.0, Unit::Kg))
        .await
        .unwrap();
    seed_dish(&pool, "Bread", 6.0, &[(flour, "Flour", Unit::Kg, 2.0)]).await;

    let outcome = analysis::run_analysis(&pool, &svc, DEFAULT_LOW_STOCK)
        .await
        .unwrap();
    assert_eq!(outcome.cannot_make, 0);
    assert_eq!(outcome.low_stock_dishes, 0);
    assert_eq!(outcome.expiring_items, 0);
    assert_eq!(outcome.surplus_items, 0);
    assert!(!outcome.brief_created);
    assert_eq!(outcome.sku_alerts_created, 0);

    assert!(svc.calls().await.is_empty());
    assert!(db::list_notifications(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn findings_create_one_brief_per_day() {
    let pool = setup_pool().await;
    let svc = RecordingSuggestions::default();

    // Out of stock entirely: the dish cannot be made.
    let bread = db::insert_item(&pool, &priced_item("Bread", "BRD-1", 0.0, Unit::Count))
        .await
        .unwrap();
    seed_dish(&pool, "Toast", 4.0, &[(bread, "Bread", Unit::Count, 1.0)]).await;

    let outcome = analysis::run_analysis(&pool, &svc, DEFAULT_LOW_STOCK)
        .await
        .unwrap();
    assert_eq!(outcome.cannot_make, 1);
    assert!(outcome.brief_created);
    assert!(!outcome.brief_deduped);

    let calls = svc.calls().await;
    assert_eq!(calls.len(), 1);
    assert!(calls[0].1.contains("Toast (Reason: Out of Bread)"));

    let all = db::list_notifications(&pool).await.unwrap();
    let briefs: Vec<_> = all.iter().filter(|n| n.title == BRIEF_TITLE).collect();
    assert_eq!(briefs.len(), 1);
    assert_eq!(briefs[0].kind, NotificationKind::MarketingSuggestion);
    assert_eq!(briefs[0].message, "Push the specials today.");
    assert_eq!(briefs[0].target_id, None);

    // Second run inside the window: no second brief, no second call.
    let outcome = analysis::run_analysis(&pool, &svc, DEFAULT_LOW_STOCK)
        .await
        .unwrap();
    assert!(!outcome.brief_created);
    assert!(outcome.brief_deduped);
    assert_eq!(svc.calls().await.len(), 1);
    let briefs = db::list_notifications(&pool)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.title == BRIEF_TITLE)
        .count();
    assert_eq!(briefs, 1);
}

#[tokio::test]
async fn per_sku_alerts_respect_thresholds_and_dedup() {
    let pool = setup_pool().await;
    let svc = RecordingSuggestions::default();

    // Quantity 5 against a per-item threshold of 10: alert expected.
    let mut salt = priced_item("Salt", "SLT-1", 5.0, Unit::G);
    salt.low_stock_threshold = Some(10.0);
    db::insert_item(&pool, &salt).await.unwrap();
    // Healthy against the default threshold: no alert.
    db::insert_item(&pool, &priced_item("Rice", "RCE-1", 30.0, Unit::G))
        .await
        .unwrap();

    let outcome = analysis::run_analysis(&pool, &svc, DEFAULT_LOW_STOCK)
        .await
        .unwrap();
    assert_eq!(outcome.sku_alerts_created, 1);

    let all = db::list_notifications(&pool).await.unwrap();
    let alerts: Vec<_> = all
        .iter()
        .filter(|n| n.kind == NotificationKind::StockAlert)
        .collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].target_id.as_deref(), Some("SLT-1"));
    assert!(alerts[0].message.contains("Salt (SLT-1) is low on stock"));

    // A rerun within 24 hours stays quiet.
    let outcome = analysis::run_analysis(&pool, &svc, DEFAULT_LOW_STOCK)
        .await
        .unwrap();
    assert_eq!(outcome.sku_alerts_created, 0);

    // Once the previous alert ages out, the item alerts again.
    sqlx::query("UPDATE notifications SET created_at = datetime('now', '-25 hours') WHERE kind = 'stock_alert'")
        .execute(&pool)
        .await
        .unwrap();
    let outcome = analysis::run_analysis(&pool, &svc, DEFAULT_LOW_STOCK)
        .await
        .unwrap();
    assert_eq!(outcome.sku_alerts_created, 1);
}

#[tokio::test]
async fn expiring_and_surplus_feed_ranked_promotions() {
    let pool = setup_pool().await;
    let svc = RecordingSuggestions::default();

    let mut milk = priced_item("Milk", "MLK-1", 20.0, Unit::L);
    milk.expires_in_days = Some(10);
    milk.date_received = Some(Utc::now() - Duration::days(7)); // 3 days left
    let milk_id = db::insert_item(&pool, &milk).await.unwrap();

    let tomato = db::insert_item(&pool, &priced_item("Tomato", "TMT-1", 80.0, Unit::Kg))
        .await
        .unwrap();

    // High-margin latte vs low-margin cocoa, both on the expiring milk.
    seed_dish(&pool, "Latte", 5.0, &[(milk_id, "Milk", Unit::Ml, 200.0)]).await;
    seed_dish(&pool, "Cocoa", 1.0, &[(milk_id, "Milk", Unit::Ml, 300.0)]).await;
    seed_dish(&pool, "Tomato Soup", 9.0, &[(tomato, "Tomato", Unit::G, 400.0)]).await;

    let outcome = analysis::run_analysis(&pool, &svc, DEFAULT_LOW_STOCK)
        .await
        .unwrap();
    assert_eq!(outcome.expiring_items, 1);
    assert_eq!(outcome.surplus_items, 1);
    assert!(outcome.brief_created);

    let calls = svc.calls().await;
    assert_eq!(calls.len(), 1);
    let query = &calls[0].1;
    assert!(query.contains("Milk (expires in 3 days)"));
    assert!(query.contains("Tomato (80 kg)"));
    // Latte outranks Cocoa for the expiring category.
    let latte = query.find("Latte").unwrap();
    let cocoa = query.find("Cocoa").unwrap();
    assert!(latte < cocoa);
    assert!(query.contains("Tomato Soup"));
}

#[tokio::test]
async fn unit_mismatch_blocks_the_dish_but_not_the_job() {
    let pool = setup_pool().await;
    let svc = RecordingSuggestions::default();

    let oil = db::insert_item(&pool, &priced_item("Oil", "OIL-1", 30.0, Unit::Ml))
        .await
        .unwrap();
    // Recipe asks for grams of a volume-stocked item.
    let menu_id = seed_dish(&pool, "Confit", 12.0, &[(oil, "Oil", Unit::G, 50.0)]).await;

    let outcome = analysis::run_analysis(&pool, &svc, DEFAULT_LOW_STOCK)
        .await
        .unwrap();
    assert_eq!(outcome.cannot_make, 1);
    assert!(outcome.brief_created);
    let calls = svc.calls().await;
    assert!(calls[0].1.contains("Unit mismatch for Oil"));

    // The interactive cost endpoint surfaces the same condition as an error.
    let err = analysis::dish_cost(&pool, menu_id).await.unwrap_err();
    assert!(err.to_string().contains("Incompatible recipe unit"));
}

#[tokio::test]
async fn dish_cost_reports_breakdown() {
    let pool = setup_pool().await;

    // $10 for a 5 kg bag stocked in grams: 200 g costs $0.40.
    let mut flour = NewInventoryItem::basic("Flour", "FLR-1", 5000.0, Unit::G);
    flour.purchase_price = Some(10.0);
    flour.purchase_unit = Some(Unit::Kg);
    flour.purchase_quantity = Some(5.0);
    let flour_id = db::insert_item(&pool, &flour).await.unwrap();

    let menu_id = seed_dish(&pool, "Flatbread", 5.0, &[(flour_id, "Flour", Unit::G, 200.0)]).await;

    let cost = analysis::dish_cost(&pool, menu_id).await.unwrap();
    assert_eq!(cost.menu_id, menu_id);
    assert!(!cost.missing_cost_data);
    assert!((cost.food_cost - 0.40).abs() < 1e-9);
    assert!((cost.profit - 4.60).abs() < 1e-9);
    assert_eq!(cost.breakdown.len(), 1);
    assert!(cost.breakdown[0].msg.is_none());

    let missing = analysis::dish_cost(&pool, 9999).await.unwrap_err();
    assert!(missing.to_string().contains("not found"));
}

#[tokio::test]
async fn item_suggestion_returns_and_persists() {
    let pool = setup_pool().await;
    let svc = RecordingSuggestions::default();

    let milk = db::insert_item(&pool, &priced_item("Milk", "MLK-1", 20.0, Unit::L))
        .await
        .unwrap();
    seed_dish(&pool, "Latte", 5.0, &[(milk, "Milk", Unit::Ml, 200.0)]).await;

    let out = analysis::suggest_for_item(&pool, &svc, "MLK-1").await.unwrap();
    assert_eq!(out.title, "Marketing Push: Milk");
    assert_eq!(out.suggestion, "Push the specials today.");

    let calls = svc.calls().await;
    assert_eq!(calls.len(), 1);
    assert!(calls[0].1.contains("Latte"));

    let all = db::list_notifications(&pool).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].kind, NotificationKind::MarketingSuggestion);
    assert_eq!(all[0].target_id.as_deref(), Some("MLK-1"));

    let err = analysis::suggest_for_item(&pool, &svc, "NOPE")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no inventory item"));
}
