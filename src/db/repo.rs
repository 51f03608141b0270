use super::model::{NewInventoryItem, NewRecipeLine, ShiftDraft};
use crate::model::{
    Dish, InventoryItem, Notification, NotificationKind, NotificationStatus, RecipeLine, Role,
    Shift, Unit, User,
};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and make sure the
/// parent directory exists. In-memory URLs and other schemes pass through.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") || rest.is_empty() {
        return url.to_string();
    }

    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{expanded}");
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn parse_unit_col(s: &str) -> Result<Unit> {
    Unit::parse_unit(s).ok_or_else(|| anyhow!("unknown unit '{}' in database row", s))
}

// ---------------------------------------------------------------------------
// users

#[instrument(skip_all)]
pub async fn create_user(pool: &Pool, name: &str, email: &str, role: Role) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO users (name, email, role, created_at) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(email)
    .bind(role.as_str())
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        role: Role::parse_role(&role_str)
            .ok_or_else(|| anyhow!("unknown role '{}' in users row", role_str))?,
        created_at: row.get("created_at"),
    })
}

#[instrument(skip_all)]
pub async fn get_user(pool: &Pool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, name, email, role, created_at FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn list_admins(pool: &Pool) -> Result<Vec<User>> {
    let rows = sqlx::query(
        "SELECT id, name, email, role, created_at FROM users WHERE role = 'admin' ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(user_from_row).collect()
}

// ---------------------------------------------------------------------------
// inventory

#[instrument(skip_all)]
pub async fn insert_item(pool: &Pool, item: &NewInventoryItem) -> Result<i64> {
    let now = Utc::now();
    let rec = sqlx::query(
        "INSERT INTO inventory (name, sku, description, quantity, unit, purchase_price, \
         purchase_unit, purchase_quantity, low_stock_threshold, high_stock_threshold, \
         expires_in_days, date_received, last_restocked, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&item.name)
    .bind(&item.sku)
    .bind(&item.description)
    .bind(item.quantity)
    .bind(item.unit.as_str())
    .bind(item.purchase_price)
    .bind(item.purchase_unit.map(|u| u.as_str()))
    .bind(item.purchase_quantity)
    .bind(item.low_stock_threshold)
    .bind(item.high_stock_threshold)
    .bind(item.expires_in_days)
    .bind(item.date_received)
    .bind(now)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await
    .context("failed to insert inventory item")?;
    Ok(rec.get::<i64, _>("id"))
}

fn item_from_row(row: &SqliteRow) -> Result<InventoryItem> {
    let unit_str: String = row.get("unit");
    let purchase_unit = match row.try_get::<Option<String>, _>("purchase_unit")? {
        Some(s) => Some(parse_unit_col(&s)?),
        None => None,
    };
    Ok(InventoryItem {
        id: row.get("id"),
        name: row.get("name"),
        sku: row.get("sku"),
        description: row.try_get("description").ok().flatten(),
        quantity: row.get("quantity"),
        unit: parse_unit_col(&unit_str)?,
        purchase_price: row.try_get("purchase_price").ok().flatten(),
        purchase_unit,
        purchase_quantity: row.try_get("purchase_quantity").ok().flatten(),
        low_stock_threshold: row.try_get("low_stock_threshold").ok().flatten(),
        high_stock_threshold: row.try_get("high_stock_threshold").ok().flatten(),
        expires_in_days: row.try_get("expires_in_days").ok().flatten(),
        date_received: row.try_get("date_received").ok().flatten(),
        last_restocked: row.try_get("last_restocked").ok().flatten(),
    })
}

#[instrument(skip_all)]
pub async fn list_items(pool: &Pool) -> Result<Vec<InventoryItem>> {
    let rows = sqlx::query("SELECT * FROM inventory ORDER BY name ASC")
        .fetch_all(pool)
        .await?;
    rows.iter().map(item_from_row).collect()
}

#[instrument(skip_all)]
pub async fn get_item_by_sku(pool: &Pool, sku: &str) -> Result<Option<InventoryItem>> {
    let row = sqlx::query("SELECT * FROM inventory WHERE sku = ?")
        .bind(sku)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(item_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn update_item_quantity(pool: &Pool, sku: &str, quantity: f64) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE inventory SET quantity = ?, last_restocked = ?, updated_at = ? WHERE sku = ?",
    )
    .bind(quantity)
    .bind(Utc::now())
    .bind(Utc::now())
    .bind(sku)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn delete_item(pool: &Pool, sku: &str) -> Result<bool> {
    let res = sqlx::query("DELETE FROM inventory WHERE sku = ?")
        .bind(sku)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Items at or below their own threshold, or the given default when they
/// carry none. Sorted by name, matching the interactive low-stock listing.
#[instrument(skip_all)]
pub async fn low_stock_items(pool: &Pool, default_threshold: f64) -> Result<Vec<InventoryItem>> {
    let rows = sqlx::query(
        "SELECT * FROM inventory WHERE quantity <= COALESCE(low_stock_threshold, ?) ORDER BY name ASC",
    )
    .bind(default_threshold)
    .fetch_all(pool)
    .await?;
    rows.iter().map(item_from_row).collect()
}

// ---------------------------------------------------------------------------
// menu

#[instrument(skip_all)]
pub async fn insert_dish(
    pool: &Pool,
    name: &str,
    price: f64,
    lines: &[NewRecipeLine],
) -> Result<i64> {
    let mut tx = pool.begin().await?;
    let menu_id: i64 = sqlx::query(
        "INSERT INTO menus (name, price, created_at) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(price)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await
    .context("failed to insert dish")?
    .get("id");

    for (idx, line) in lines.iter().enumerate() {
        sqlx::query(
            "INSERT INTO recipe_lines (menu_id, inventory_id, name, unit, quantity_required, sequence) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(menu_id)
        .bind(line.inventory_id)
        .bind(&line.name)
        .bind(line.unit.as_str())
        .bind(line.quantity_required)
        .bind(idx as i64 + 1)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(menu_id)
}

#[instrument(skip_all)]
pub async fn update_dish_price(pool: &Pool, menu_id: i64, price: f64) -> Result<bool> {
    let res = sqlx::query("UPDATE menus SET price = ? WHERE id = ?")
        .bind(price)
        .bind(menu_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn delete_dish(pool: &Pool, menu_id: i64) -> Result<bool> {
    let res = sqlx::query("DELETE FROM menus WHERE id = ?")
        .bind(menu_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

fn line_from_row(row: &SqliteRow) -> Result<RecipeLine> {
    let unit_str: String = row.get("line_unit");
    let item = match row.try_get::<Option<i64>, _>("id")? {
        Some(_) => Some(item_from_row(row)?),
        None => None,
    };
    Ok(RecipeLine {
        name: row.get("line_name"),
        unit: parse_unit_col(&unit_str)?,
        quantity_required: row.get("quantity_required"),
        item,
    })
}

const RESOLVED_LINES_SQL: &str = "SELECT rl.menu_id, rl.name AS line_name, rl.unit AS line_unit, \
     rl.quantity_required, rl.sequence, i.* \
     FROM recipe_lines rl LEFT JOIN inventory i ON rl.inventory_id = i.id";

/// Snapshot every dish with its recipe lines resolved against inventory.
#[instrument(skip_all)]
pub async fn list_dishes_resolved(pool: &Pool) -> Result<Vec<Dish>> {
    let line_rows = sqlx::query(&format!(
        "{RESOLVED_LINES_SQL} ORDER BY rl.menu_id, rl.sequence"
    ))
    .fetch_all(pool)
    .await?;

    let mut lines_by_menu: HashMap<i64, Vec<RecipeLine>> = HashMap::new();
    for row in &line_rows {
        let menu_id: i64 = row.get("menu_id");
        lines_by_menu
            .entry(menu_id)
            .or_default()
            .push(line_from_row(row)?);
    }

    let menu_rows = sqlx::query("SELECT id, name, price FROM menus ORDER BY name ASC")
        .fetch_all(pool)
        .await?;
    let dishes = menu_rows
        .iter()
        .map(|row| {
            let id: i64 = row.get("id");
            Dish {
                id,
                name: row.get("name"),
                price: row.get("price"),
                recipe: lines_by_menu.remove(&id).unwrap_or_default(),
            }
        })
        .collect();
    Ok(dishes)
}

#[instrument(skip_all)]
pub async fn get_dish_resolved(pool: &Pool, menu_id: i64) -> Result<Option<Dish>> {
    let menu_row = sqlx::query("SELECT id, name, price FROM menus WHERE id = ?")
        .bind(menu_id)
        .fetch_optional(pool)
        .await?;
    let Some(menu_row) = menu_row else {
        return Ok(None);
    };

    let line_rows = sqlx::query(&format!(
        "{RESOLVED_LINES_SQL} WHERE rl.menu_id = ? ORDER BY rl.sequence"
    ))
    .bind(menu_id)
    .fetch_all(pool)
    .await?;
    let recipe = line_rows
        .iter()
        .map(line_from_row)
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(Dish {
        id: menu_row.get("id"),
        name: menu_row.get("name"),
        price: menu_row.get("price"),
        recipe,
    }))
}

// ---------------------------------------------------------------------------
// notifications

#[instrument(skip_all)]
pub async fn create_notification(
    pool: &Pool,
    kind: NotificationKind,
    title: &str,
    message: &str,
    target_id: Option<&str>,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO notifications (kind, title, message, target_id, status, created_at) \
         VALUES (?, ?, ?, ?, 'unread', ?) RETURNING id",
    )
    .bind(kind.as_str())
    .bind(title)
    .bind(message)
    .bind(target_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .context("failed to insert notification")?;
    Ok(rec.get::<i64, _>("id"))
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification> {
    let kind_str: String = row.get("kind");
    let status_str: String = row.get("status");
    Ok(Notification {
        id: row.get("id"),
        kind: NotificationKind::parse_kind(&kind_str)
            .ok_or_else(|| anyhow!("unknown notification kind '{}'", kind_str))?,
        title: row.get("title"),
        message: row.get("message"),
        target_id: row.try_get("target_id").ok().flatten(),
        status: NotificationStatus::parse_status(&status_str)
            .ok_or_else(|| anyhow!("unknown notification status '{}'", status_str))?,
        created_at: row.get("created_at"),
    })
}

/// Full feed, newest first.
#[instrument(skip_all)]
pub async fn list_notifications(pool: &Pool) -> Result<Vec<Notification>> {
    let rows = sqlx::query(
        "SELECT * FROM notifications ORDER BY datetime(created_at) DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(notification_from_row).collect()
}

/// Personal feed: targeted at this user or broadcast, newest first.
#[instrument(skip_all)]
pub async fn feed_for_user(pool: &Pool, user_id: i64) -> Result<Vec<Notification>> {
    let rows = sqlx::query(
        "SELECT * FROM notifications WHERE target_id = ? OR target_id IS NULL \
         ORDER BY datetime(created_at) DESC, id DESC LIMIT 20",
    )
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;
    rows.iter().map(notification_from_row).collect()
}

/// unread -> read; returns false when the id is unknown or already read.
#[instrument(skip_all)]
pub async fn mark_notification_read(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query("UPDATE notifications SET status = 'read' WHERE id = ? AND status = 'unread'")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn delete_notification(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query("DELETE FROM notifications WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Duplicate suppression for the composite brief: has a notification with
/// this exact title been created within the last `hours` hours?
#[instrument(skip_all)]
pub async fn notification_exists_since(pool: &Pool, title: &str, hours: i64) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE title = ? \
         AND datetime(created_at) >= datetime('now', '-' || ? || ' hours')",
    )
    .bind(title)
    .bind(hours)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Duplicate suppression for per-SKU stock alerts.
#[instrument(skip_all)]
pub async fn stock_alert_exists_since(pool: &Pool, sku: &str, hours: i64) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE kind = 'stock_alert' AND target_id = ? \
         AND datetime(created_at) >= datetime('now', '-' || ? || ' hours')",
    )
    .bind(sku)
    .bind(hours)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

// ---------------------------------------------------------------------------
// shifts

fn shift_from_row(row: &SqliteRow) -> Shift {
    Shift {
        id: row.get("id"),
        staff_id: row.get("staff_id"),
        date: row.get("date"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        shift_type: row.get("shift_type"),
        notes: row.try_get("notes").ok().flatten(),
        created_at: row.get("created_at"),
    }
}

#[instrument(skip_all)]
pub async fn insert_shift(pool: &Pool, draft: &ShiftDraft) -> Result<Shift> {
    let row = sqlx::query(
        "INSERT INTO shifts (staff_id, date, start_time, end_time, shift_type, notes, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(draft.staff_id)
    .bind(&draft.date)
    .bind(&draft.start_time)
    .bind(&draft.end_time)
    .bind(&draft.shift_type)
    .bind(&draft.notes)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .context("failed to insert shift")?;
    Ok(shift_from_row(&row))
}

#[instrument(skip_all)]
pub async fn update_shift_row(pool: &Pool, id: i64, draft: &ShiftDraft) -> Result<Option<Shift>> {
    let row = sqlx::query(
        "UPDATE shifts SET staff_id = ?, date = ?, start_time = ?, end_time = ?, \
         shift_type = ?, notes = ? WHERE id = ? RETURNING *",
    )
    .bind(draft.staff_id)
    .bind(&draft.date)
    .bind(&draft.start_time)
    .bind(&draft.end_time)
    .bind(&draft.shift_type)
    .bind(&draft.notes)
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(shift_from_row))
}

#[instrument(skip_all)]
pub async fn delete_shift_row(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query("DELETE FROM shifts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Shifts for one staff member on or after `from_date`, soonest first.
#[instrument(skip_all)]
pub async fn shifts_for_staff_from(
    pool: &Pool,
    staff_id: i64,
    from_date: &str,
) -> Result<Vec<Shift>> {
    let rows = sqlx::query(
        "SELECT * FROM shifts WHERE staff_id = ? AND date >= ? ORDER BY date ASC, start_time ASC",
    )
    .bind(staff_id)
    .bind(from_date)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(shift_from_row).collect())
}
