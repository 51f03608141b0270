//! Alert derivation: scans dishes and inventory, derives operational
//! findings (cannot-make, low stock, expiring, surplus), ranks promotional
//! dish suggestions by profit margin, and persists notifications.
//!
//! The job is best-effort end to end: per-line problems become reason
//! strings, a failed notification write is logged and the remaining
//! categories still run, and the suggestion call degrades to fallback text
//! inside its own module.

use crate::costing::{self, DishCost};
use crate::db::{self, Pool};
use crate::model::{Dish, InventoryItem, NotificationKind, Unit};
use crate::suggest::SuggestionService;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

/// Below this many producible dishes an ingredient counts as scarce.
pub const LOW_STOCK_THRESHOLD: i64 = 10;
/// Above this on-hand quantity an item counts as surplus.
pub const HIGH_STOCK_THRESHOLD: f64 = 50.0;
pub const EXPIRY_WINDOW_DAYS: i64 = 7;
pub const DEDUP_WINDOW_HOURS: i64 = 24;
pub const BRIEF_TITLE: &str = "Daily Operations & Profit Brief";

const BRIEF_SYSTEM_PROMPT: &str = "You are an expert restaurant manager AI. Your goal is to write a concise daily brief for the restaurant owner. I will provide you with data.
Your brief must be actionable.
1. Start with the MOST URGENT \"CANNOT MAKE\" items.
2. List the \"LOW ON STOCK\" dishes.
3. For \"EXPIRING SOON\" items, strongly recommend pushing the suggested high-profit dishes to avoid waste.
4. For \"SURPLUS\" items, suggest promoting the related high-profit dishes.
Keep the entire brief under 100 words. Be professional and clear.
IMPORTANT: Do not use any markdown (like ** or *). Start with a capitalized title.";

const ITEM_SYSTEM_PROMPT: &str = "You are an expert restaurant manager AI. Write a short, upbeat marketing push (2-3 sentences) for the ingredient I describe, recommending the highest-margin dishes that use it. No markdown.";

/// Dish-first findings.
#[derive(Debug, Default, PartialEq)]
pub struct MenuAnalysis {
    pub low_stock: Vec<String>,
    pub cannot_make: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExpiringItem {
    pub name: String,
    pub sku: String,
    pub days_remaining: i64,
}

#[derive(Debug, Clone)]
pub struct SurplusItem {
    pub name: String,
    pub sku: String,
    pub quantity: f64,
    pub unit: Unit,
}

#[derive(Debug, Clone)]
pub struct DishSuggestion {
    pub name: String,
    pub profit_margin: f64,
}

/// Result of the per-SKU marketing trigger.
#[derive(Debug, Clone, Serialize)]
pub struct ItemSuggestion {
    pub title: String,
    pub suggestion: String,
}

/// What one job run did; returned for the one-shot CLI path and tests.
#[derive(Debug, Default)]
pub struct AnalysisOutcome {
    pub cannot_make: usize,
    pub low_stock_dishes: usize,
    pub expiring_items: usize,
    pub surplus_items: usize,
    pub brief_created: bool,
    pub brief_deduped: bool,
    pub sku_alerts_created: usize,
}

/// Walk every dish's recipe against current stock. A dish is `cannot_make`
/// when an ingredient is unlinked, unit-incompatible, or exhausted;
/// otherwise the scarcest ingredient decides whether it is low on stock.
pub fn analyze_dishes(dishes: &[Dish]) -> MenuAnalysis {
    let mut analysis = MenuAnalysis::default();

    for dish in dishes {
        if dish.recipe.is_empty() {
            continue;
        }

        let mut cannot_make_reason: Option<String> = None;
        let mut min_possible: Option<(i64, &str)> = None;

        for line in &dish.recipe {
            let Some(item) = line.item.as_ref() else {
                cannot_make_reason = Some(format!("{} not in inventory", line.name));
                break;
            };

            if item.unit.family() != line.unit.family() {
                cannot_make_reason = Some(format!(
                    "Unit mismatch for {} (Recipe needs {}, stock is {})",
                    line.name, line.unit, item.unit
                ));
                break;
            }

            if !(line.quantity_required > 0.0) {
                continue;
            }

            // Convert on-hand stock into recipe units before dividing.
            let stock_in_recipe_units =
                item.quantity * (item.unit.base_factor() / line.unit.base_factor());
            let possible = (stock_in_recipe_units / line.quantity_required).floor() as i64;

            if possible < 1 {
                cannot_make_reason = Some(format!("Out of {}", line.name));
                break;
            }
            if possible < LOW_STOCK_THRESHOLD
                && min_possible.map_or(true, |(min, _)| possible < min)
            {
                min_possible = Some((possible, line.name.as_str()));
            }
        }

        if let Some(reason) = cannot_make_reason {
            analysis
                .cannot_make
                .push(format!("{} (Reason: {})", dish.name, reason));
        } else if let Some((possible, ingredient)) = min_possible {
            analysis
                .low_stock
                .push(format!("{} (only {} left due to {})", dish.name, possible, ingredient));
        }
    }

    analysis
}

/// Inventory-first pass: items expiring within the window and items in
/// surplus.
pub fn scan_inventory(
    items: &[InventoryItem],
    now: DateTime<Utc>,
) -> (Vec<ExpiringItem>, Vec<SurplusItem>) {
    let mut expiring = Vec::new();
    let mut surplus = Vec::new();

    for item in items {
        if let (Some(days), Some(received)) = (item.expires_in_days, item.date_received) {
            let expiry = received + Duration::days(days);
            let seconds_left = (expiry - now).num_seconds();
            if seconds_left > 0 {
                let days_remaining = (seconds_left as f64 / 86_400.0).ceil() as i64;
                if days_remaining <= EXPIRY_WINDOW_DAYS {
                    expiring.push(ExpiringItem {
                        name: item.name.clone(),
                        sku: item.sku.clone(),
                        days_remaining,
                    });
                }
            }
        }
        let high_bar = item.high_stock_threshold.unwrap_or(HIGH_STOCK_THRESHOLD);
        if item.quantity > high_bar {
            surplus.push(SurplusItem {
                name: item.name.clone(),
                sku: item.sku.clone(),
                quantity: item.quantity,
                unit: item.unit,
            });
        }
    }

    (expiring, surplus)
}

/// Dishes using an expiring or surplus ingredient, ranked by profit margin
/// descending. Dishes with missing cost data are skipped.
pub fn rank_promotions(
    dishes: &[Dish],
    expiring: &[ExpiringItem],
    surplus: &[SurplusItem],
) -> (Vec<DishSuggestion>, Vec<DishSuggestion>) {
    let expiring_skus: HashSet<&str> = expiring.iter().map(|i| i.sku.as_str()).collect();
    let surplus_skus: HashSet<&str> = surplus.iter().map(|i| i.sku.as_str()).collect();

    let mut for_expiring = Vec::new();
    let mut for_surplus = Vec::new();

    for dish in dishes {
        if dish.recipe.is_empty() {
            continue;
        }
        let mut uses_expiring = false;
        let mut uses_surplus = false;
        for line in &dish.recipe {
            if let Some(item) = line.item.as_ref() {
                if expiring_skus.contains(item.sku.as_str()) {
                    uses_expiring = true;
                }
                if surplus_skus.contains(item.sku.as_str()) {
                    uses_surplus = true;
                }
            }
        }
        if !uses_expiring && !uses_surplus {
            continue;
        }

        let cost = costing::cost_dish(dish);
        if cost.missing_cost_data {
            continue;
        }
        let suggestion = DishSuggestion {
            name: dish.name.clone(),
            profit_margin: cost.profit_margin,
        };
        if uses_expiring {
            for_expiring.push(suggestion.clone());
        }
        if uses_surplus {
            for_surplus.push(suggestion);
        }
    }

    let by_margin_desc = |a: &DishSuggestion, b: &DishSuggestion| {
        b.profit_margin
            .partial_cmp(&a.profit_margin)
            .unwrap_or(std::cmp::Ordering::Equal)
    };
    for_expiring.sort_by(by_margin_desc);
    for_surplus.sort_by(by_margin_desc);
    (for_expiring, for_surplus)
}

fn join_or_none(parts: Vec<String>) -> String {
    if parts.is_empty() {
        "None".to_string()
    } else {
        parts.join(", ")
    }
}

/// Structured summary handed to the suggestion service, top 2 promotions
/// per category.
pub fn compose_user_query(
    analysis: &MenuAnalysis,
    expiring: &[ExpiringItem],
    expiring_suggestions: &[DishSuggestion],
    surplus: &[SurplusItem],
    surplus_suggestions: &[DishSuggestion],
) -> String {
    let expiring_items_text = join_or_none(
        expiring
            .iter()
            .map(|i| format!("{} (expires in {} days)", i.name, i.days_remaining))
            .collect(),
    );
    let expiring_dishes_text = join_or_none(
        expiring_suggestions
            .iter()
            .take(2)
            .map(|d| format!("{} ({:.0}% margin)", d.name, d.profit_margin))
            .collect(),
    );
    let surplus_items_text = join_or_none(
        surplus
            .iter()
            .map(|i| format!("{} ({} {})", i.name, i.quantity, i.unit))
            .collect(),
    );
    let surplus_dishes_text = join_or_none(
        surplus_suggestions
            .iter()
            .take(2)
            .map(|d| format!("{} ({:.0}% margin)", d.name, d.profit_margin))
            .collect(),
    );

    format!(
        "Here is my daily report:\n\
         - DISHES WE CANNOT MAKE: {}\n\
         - DISHES LOW ON STOCK: {}\n\
         - INVENTORY EXPIRING SOON: {}\n\
         - SUGGESTIONS FOR EXPIRING ITEMS: {}\n\
         - INVENTORY IN SURPLUS: {}\n\
         - SUGGESTIONS FOR SURPLUS ITEMS: {}",
        join_or_none(analysis.cannot_make.clone()),
        join_or_none(analysis.low_stock.clone()),
        expiring_items_text,
        expiring_dishes_text,
        surplus_items_text,
        surplus_dishes_text,
    )
}

/// One full job run. Errors reaching the caller are snapshot failures; all
/// downstream steps capture their own.
#[instrument(skip_all)]
pub async fn run_analysis(
    pool: &Pool,
    svc: &dyn SuggestionService,
    default_low_stock_threshold: f64,
) -> Result<AnalysisOutcome> {
    info!("running analysis job over menu, inventory, and profit");

    let dishes = db::list_dishes_resolved(pool).await?;
    let items = db::list_items(pool).await?;

    let analysis = analyze_dishes(&dishes);
    let (expiring, surplus) = scan_inventory(&items, Utc::now());
    let (expiring_suggestions, surplus_suggestions) =
        rank_promotions(&dishes, &expiring, &surplus);

    let mut outcome = AnalysisOutcome {
        cannot_make: analysis.cannot_make.len(),
        low_stock_dishes: analysis.low_stock.len(),
        expiring_items: expiring.len(),
        surplus_items: surplus.len(),
        ..Default::default()
    };

    let has_findings = !analysis.cannot_make.is_empty()
        || !analysis.low_stock.is_empty()
        || !expiring.is_empty()
        || !surplus.is_empty();

    if has_findings {
        match db::notification_exists_since(pool, BRIEF_TITLE, DEDUP_WINDOW_HOURS).await {
            Ok(true) => {
                info!("analysis complete; brief already sent within the window");
                outcome.brief_deduped = true;
            }
            Ok(false) => {
                let query = compose_user_query(
                    &analysis,
                    &expiring,
                    &expiring_suggestions,
                    &surplus,
                    &surplus_suggestions,
                );
                let suggestion = svc.generate(BRIEF_SYSTEM_PROMPT, &query).await;
                match db::create_notification(
                    pool,
                    NotificationKind::MarketingSuggestion,
                    BRIEF_TITLE,
                    &suggestion,
                    None,
                )
                .await
                {
                    Ok(id) => {
                        info!(id, "created operations brief notification");
                        outcome.brief_created = true;
                    }
                    Err(err) => warn!(?err, "failed to write operations brief; continuing"),
                }
            }
            Err(err) => warn!(?err, "brief dedup check failed; skipping brief"),
        }
    } else {
        info!("menu analysis complete; all stock levels are healthy");
    }

    // Per-SKU low-stock alerts run independently of the composite brief.
    match db::low_stock_items(pool, default_low_stock_threshold).await {
        Ok(low_items) => {
            for item in low_items {
                match db::stock_alert_exists_since(pool, &item.sku, DEDUP_WINDOW_HOURS).await {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(err) => {
                        warn!(?err, sku = %item.sku, "stock alert dedup check failed");
                        continue;
                    }
                }
                let threshold = item
                    .low_stock_threshold
                    .unwrap_or(default_low_stock_threshold);
                let message = format!(
                    "{} ({}) is low on stock: {} {} remaining (threshold {}).",
                    item.name, item.sku, item.quantity, item.unit, threshold
                );
                match db::create_notification(
                    pool,
                    NotificationKind::StockAlert,
                    "Low Stock Alert",
                    &message,
                    Some(&item.sku),
                )
                .await
                {
                    Ok(_) => outcome.sku_alerts_created += 1,
                    Err(err) => {
                        warn!(?err, sku = %item.sku, "failed to write stock alert; continuing")
                    }
                }
            }
        }
        Err(err) => warn!(?err, "low-stock listing failed; skipping per-SKU alerts"),
    }

    Ok(outcome)
}

/// Interactive per-dish cost lookup: unit-family violations are returned as
/// errors with the offending units named.
#[instrument(skip_all)]
pub async fn dish_cost(pool: &Pool, menu_id: i64) -> Result<DishCost> {
    let dish = db::get_dish_resolved(pool, menu_id)
        .await?
        .ok_or_else(|| anyhow!("menu item {} not found", menu_id))?;
    costing::cost_dish_strict(&dish).map_err(anyhow::Error::from)
}

/// On-demand marketing suggestion for one inventory item. The generated
/// text is also persisted as a notification targeted at the SKU.
#[instrument(skip_all)]
pub async fn suggest_for_item(
    pool: &Pool,
    svc: &dyn SuggestionService,
    sku: &str,
) -> Result<ItemSuggestion> {
    let item = db::get_item_by_sku(pool, sku)
        .await?
        .ok_or_else(|| anyhow!("no inventory item with SKU {}", sku))?;

    let dishes = db::list_dishes_resolved(pool).await?;
    let mut using: Vec<DishSuggestion> = dishes
        .iter()
        .filter(|d| {
            d.recipe
                .iter()
                .any(|l| l.item.as_ref().is_some_and(|i| i.sku == item.sku))
        })
        .filter_map(|d| {
            let cost = costing::cost_dish(d);
            (!cost.missing_cost_data).then(|| DishSuggestion {
                name: d.name.clone(),
                profit_margin: cost.profit_margin,
            })
        })
        .collect();
    using.sort_by(|a, b| {
        b.profit_margin
            .partial_cmp(&a.profit_margin)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let dishes_text = join_or_none(
        using
            .iter()
            .take(2)
            .map(|d| format!("{} ({:.0}% margin)", d.name, d.profit_margin))
            .collect(),
    );
    let query = format!(
        "Ingredient: {} ({} {} on hand). Dishes using it: {}",
        item.name, item.quantity, item.unit, dishes_text
    );

    let suggestion = svc.generate(ITEM_SYSTEM_PROMPT, &query).await;
    let title = format!("Marketing Push: {}", item.name);
    if let Err(err) = db::create_notification(
        pool,
        NotificationKind::MarketingSuggestion,
        &title,
        &suggestion,
        Some(&item.sku),
    )
    .await
    {
        warn!(?err, sku = %item.sku, "failed to persist item suggestion");
    }

    Ok(ItemSuggestion { title, suggestion })
}
