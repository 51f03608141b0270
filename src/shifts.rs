//! Shift mutations. Each write also notifies the assigned employee and
//! leaves an activity-log entry for every admin; notification failures are
//! logged and swallowed so the shift write itself always stands.

use crate::db::{self, Pool, ShiftDraft};
use crate::model::{NotificationKind, Shift};
use anyhow::Result;
use chrono::{NaiveDate, NaiveTime, Utc};
use tracing::{instrument, warn};

async fn display_name(pool: &Pool, user_id: i64, fallback: &str) -> String {
    match db::get_user(pool, user_id).await {
        Ok(Some(user)) => user.name,
        Ok(None) => fallback.to_string(),
        Err(err) => {
            warn!(?err, user_id, "could not fetch user name");
            fallback.to_string()
        }
    }
}

async fn notify_employee(pool: &Pool, shift: &Shift, title: &str, message: String) {
    if let Err(err) = db::create_notification(
        pool,
        NotificationKind::ShiftUpdate,
        title,
        &message,
        Some(&shift.staff_id.to_string()),
    )
    .await
    {
        warn!(?err, staff_id = shift.staff_id, "employee notification failed");
    }
}

async fn notify_admins(pool: &Pool, message: String) {
    let admins = match db::list_admins(pool).await {
        Ok(admins) => admins,
        Err(err) => {
            warn!(?err, "could not list admins for activity log");
            return;
        }
    };
    for admin in admins {
        if let Err(err) = db::create_notification(
            pool,
            NotificationKind::ShiftUpdate,
            "Activity Log",
            &message,
            Some(&admin.id.to_string()),
        )
        .await
        {
            warn!(?err, admin_id = admin.id, "admin notification failed");
        }
    }
}

fn notes_suffix(shift: &Shift) -> String {
    shift
        .notes
        .as_deref()
        .map(|n| format!(" Notes: \"{}\"", n))
        .unwrap_or_default()
}

#[instrument(skip_all)]
pub async fn create_shift(pool: &Pool, actor_id: i64, draft: &ShiftDraft) -> Result<Shift> {
    let shift = db::insert_shift(pool, draft).await?;

    let assigner = display_name(pool, actor_id, "a Manager").await;
    let staff = display_name(pool, shift.staff_id, "Staff Member").await;

    notify_employee(
        pool,
        &shift,
        "New Shift Assigned",
        format!(
            "You have been assigned a {} shift on {} from {} to {} by {}.",
            shift.shift_type, shift.date, shift.start_time, shift.end_time, assigner
        ),
    )
    .await;
    notify_admins(
        pool,
        format!(
            "{} assigned a shift to {} on {} ({}-{}).{}",
            assigner,
            staff,
            shift.date,
            shift.start_time,
            shift.end_time,
            notes_suffix(&shift)
        ),
    )
    .await;

    Ok(shift)
}

#[instrument(skip_all)]
pub async fn update_shift(
    pool: &Pool,
    actor_id: i64,
    shift_id: i64,
    draft: &ShiftDraft,
) -> Result<Option<Shift>> {
    let Some(shift) = db::update_shift_row(pool, shift_id, draft).await? else {
        return Ok(None);
    };

    let assigner = display_name(pool, actor_id, "a Manager").await;
    let staff = display_name(pool, shift.staff_id, "Staff Member").await;

    notify_employee(
        pool,
        &shift,
        "Shift Updated",
        format!(
            "Your {} shift on {} (from {} to {}) has been updated by {}.",
            shift.shift_type, shift.date, shift.start_time, shift.end_time, assigner
        ),
    )
    .await;
    notify_admins(
        pool,
        format!(
            "{} updated the shift for {} on {} ({}-{}).{}",
            assigner,
            staff,
            shift.date,
            shift.start_time,
            shift.end_time,
            notes_suffix(&shift)
        ),
    )
    .await;

    Ok(Some(shift))
}

#[instrument(skip_all)]
pub async fn delete_shift(pool: &Pool, shift_id: i64) -> Result<bool> {
    db::delete_shift_row(pool, shift_id).await
}

/// The staff member's next shift whose end time is still ahead of now.
/// Shifts with unparseable times are skipped.
#[instrument(skip_all)]
pub async fn next_upcoming_shift(pool: &Pool, staff_id: i64) -> Result<Option<Shift>> {
    let now = Utc::now().naive_utc();
    let today = now.date().format("%Y-%m-%d").to_string();
    let shifts = db::shifts_for_staff_from(pool, staff_id, &today).await?;

    for shift in shifts {
        let Ok(date) = NaiveDate::parse_from_str(&shift.date, "%Y-%m-%d") else {
            continue;
        };
        let Ok(end) = NaiveTime::parse_from_str(&shift.end_time, "%H:%M") else {
            continue;
        };
        if date.and_time(end) > now {
            return Ok(Some(shift));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use chrono::Duration;
    use sqlx::SqlitePool;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn draft(staff_id: i64, date: &str) -> ShiftDraft {
        ShiftDraft {
            staff_id,
            date: date.into(),
            start_time: "09:00".into(),
            end_time: "17:00".into(),
            shift_type: "morning".into(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn create_notifies_employee_and_admins() {
        let pool = setup_pool().await;
        let manager = db::create_user(&pool, "Mara", "mara@example.com", Role::Manager)
            .await
            .unwrap();
        let staff = db::create_user(&pool, "Sam", "sam@example.com", Role::Employee)
            .await
            .unwrap();
        let admin = db::create_user(&pool, "Ada", "ada@example.com", Role::Admin)
            .await
            .unwrap();

        let mut d = draft(staff, "2026-08-10");
        d.notes = Some("bring keys".into());
        let shift = create_shift(&pool, manager, &d).await.unwrap();
        assert_eq!(shift.staff_id, staff);

        let staff_feed = db::feed_for_user(&pool, staff).await.unwrap();
        assert_eq!(staff_feed.len(), 1);
        assert_eq!(staff_feed[0].title, "New Shift Assigned");
        assert!(staff_feed[0].message.contains("by Mara"));

        let admin_feed = db::feed_for_user(&pool, admin).await.unwrap();
        assert_eq!(admin_feed.len(), 1);
        assert_eq!(admin_feed[0].title, "Activity Log");
        assert!(admin_feed[0].message.contains("Mara assigned a shift to Sam"));
        assert!(admin_feed[0].message.contains("Notes: \"bring keys\""));
    }

    #[tokio::test]
    async fn unknown_actor_gets_fallback_name() {
        let pool = setup_pool().await;
        let staff = db::create_user(&pool, "Sam", "sam@example.com", Role::Employee)
            .await
            .unwrap();

        create_shift(&pool, 999, &draft(staff, "2026-08-10"))
            .await
            .unwrap();

        let feed = db::feed_for_user(&pool, staff).await.unwrap();
        assert!(feed[0].message.contains("by a Manager."));
    }

    #[tokio::test]
    async fn update_missing_shift_is_none() {
        let pool = setup_pool().await;
        let staff = db::create_user(&pool, "Sam", "sam@example.com", Role::Employee)
            .await
            .unwrap();
        assert!(update_shift(&pool, 1, 42, &draft(staff, "2026-08-10"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn next_upcoming_skips_finished_shifts() {
        let pool = setup_pool().await;
        let staff = db::create_user(&pool, "Sam", "sam@example.com", Role::Employee)
            .await
            .unwrap();

        let yesterday = (Utc::now() - Duration::days(1)).format("%Y-%m-%d").to_string();
        let tomorrow = (Utc::now() + Duration::days(1)).format("%Y-%m-%d").to_string();
        let next_week = (Utc::now() + Duration::days(7)).format("%Y-%m-%d").to_string();

        db::insert_shift(&pool, &draft(staff, &yesterday)).await.unwrap();
        let expected = db::insert_shift(&pool, &draft(staff, &tomorrow)).await.unwrap();
        db::insert_shift(&pool, &draft(staff, &next_week)).await.unwrap();

        let next = next_upcoming_shift(&pool, staff).await.unwrap().unwrap();
        assert_eq!(next.id, expected.id);

        assert!(delete_shift(&pool, expected.id).await.unwrap());
        assert!(!delete_shift(&pool, expected.id).await.unwrap());
    }
}
