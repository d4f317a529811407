//! Pure view projections over the reconciled order list.
//!
//! Nothing here does I/O or mutates the board; callers take a snapshot and
//! derive what the screen shows. Server-provided ordering is preserved, no
//! client-side re-sort.

use chrono::{DateTime, Datelike, Utc};

use crate::orders::{DeletedFrom, Order, OrderStatus};

/// Status filter row on the orders screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Confirmed,
    Deleted,
}

/// Date window selector on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateGrouping {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl DateGrouping {
    pub fn as_query(&self) -> &'static str {
        match self {
            DateGrouping::Daily => "daily",
            DateGrouping::Weekly => "weekly",
            DateGrouping::Monthly => "monthly",
            DateGrouping::Yearly => "yearly",
        }
    }
}

/// Where an order may appear. Every order lands in exactly one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Shown in the live/active view (and date-filtered views).
    Live,
    /// Shown only in the trash view.
    TrashOnly,
    /// Shown nowhere: active but older than the live window.
    Hidden,
}

/// Partition an order into its single visible home.
///
/// Admin deletions and order-card deletions both live in the trash; nothing
/// deleted ever shows in the live view, and nothing live ever shows in the
/// trash.
pub fn visibility(order: &Order, now: DateTime<Utc>) -> Visibility {
    if order.status == OrderStatus::Deleted {
        return Visibility::TrashOnly;
    }
    if order.is_within_live_window(now) {
        Visibility::Live
    } else {
        Visibility::Hidden
    }
}

/// Case-insensitive OR'd search over customer name, customer phone, and the
/// order id (which covers the `#XXXXXX` suffix shown on cards).
pub fn matches_search(order: &Order, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }

    if let Some(name) = order.customer_name() {
        if name.to_lowercase().contains(&query) {
            return true;
        }
    }
    if let Some(phone) = order.customer_phone() {
        if phone.to_lowercase().contains(&query) {
            return true;
        }
    }
    order.id.to_lowercase().contains(&query)
}

fn passes_status_filter(order: &Order, filter: StatusFilter) -> bool {
    match filter {
        StatusFilter::All => true,
        StatusFilter::Pending => order.status == OrderStatus::Pending,
        StatusFilter::Confirmed => order.status == OrderStatus::Confirmed,
        StatusFilter::Deleted => order.status == OrderStatus::Deleted,
    }
}

/// Live orders screen: deleted orders excluded regardless of origin, the
/// status filter and search applied, and everything restricted to the
/// rolling 24-hour window.
pub fn project_live<'a>(
    orders: &'a [Order],
    filter: StatusFilter,
    search: &str,
    now: DateTime<Utc>,
) -> Vec<&'a Order> {
    orders
        .iter()
        .filter(|o| o.status != OrderStatus::Deleted)
        .filter(|o| passes_status_filter(o, filter))
        .filter(|o| matches_search(o, search))
        .filter(|o| o.is_within_live_window(now))
        .collect()
}

/// Date-filtered "total orders" screen: admin deletions are hidden from
/// every filter; order-card deletions appear only under the Deleted filter.
pub fn project_range<'a>(orders: &'a [Order], filter: StatusFilter) -> Vec<&'a Order> {
    orders
        .iter()
        .filter(|o| {
            if o.status == OrderStatus::Deleted {
                match o.deleted_from {
                    Some(DeletedFrom::Admin) | None => return false,
                    Some(DeletedFrom::OrderCard) => return filter == StatusFilter::Deleted,
                }
            }
            passes_status_filter(o, filter)
        })
        .collect()
}

/// Trash screen contents.
pub fn project_trash<'a>(orders: &'a [Order]) -> Vec<&'a Order> {
    orders
        .iter()
        .filter(|o| o.status == OrderStatus::Deleted)
        .collect()
}

// ---------------------------------------------------------------------------
// Date grouping
// ---------------------------------------------------------------------------

/// Whether `date` falls in the same window as `reference` for a grouping.
/// Weekly uses ISO calendar weeks, so a window straddling a week boundary is
/// never silently truncated.
pub fn in_grouping(date: DateTime<Utc>, reference: DateTime<Utc>, grouping: DateGrouping) -> bool {
    match grouping {
        DateGrouping::Daily => date.date_naive() == reference.date_naive(),
        DateGrouping::Weekly => {
            let (a, b) = (date.iso_week(), reference.iso_week());
            a.year() == b.year() && a.week() == b.week()
        }
        DateGrouping::Monthly => date.year() == reference.year() && date.month() == reference.month(),
        DateGrouping::Yearly => date.year() == reference.year(),
    }
}

/// Restrict a fetched order set to the selected date window.
pub fn filter_by_date<'a>(
    orders: &'a [Order],
    reference: DateTime<Utc>,
    grouping: DateGrouping,
) -> Vec<&'a Order> {
    orders
        .iter()
        .filter(|o| in_grouping(o.created_at, reference, grouping))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::sample_order;
    use chrono::{Duration, TimeZone};

    fn deleted_order(id: &str, from: DeletedFrom) -> Order {
        let mut order = sample_order(id);
        order.status = OrderStatus::Deleted;
        order.deleted_from = Some(from);
        order
    }

    #[test]
    fn test_admin_deleted_hidden_outside_trash() {
        let orders = vec![deleted_order("42", DeletedFrom::Admin)];
        let now = Utc::now();

        assert!(project_live(&orders, StatusFilter::All, "", now).is_empty());
        assert!(project_range(&orders, StatusFilter::All).is_empty());
        assert!(project_range(&orders, StatusFilter::Deleted).is_empty());

        let trash = project_trash(&orders);
        assert_eq!(trash.len(), 1);
        assert_eq!(trash[0].id, "42");
    }

    #[test]
    fn test_card_deleted_shown_only_under_deleted_filter() {
        let orders = vec![deleted_order("7", DeletedFrom::OrderCard), sample_order("8")];

        assert!(project_live(&orders, StatusFilter::All, "", Utc::now())
            .iter()
            .all(|o| o.id != "7"));
        assert!(project_range(&orders, StatusFilter::All)
            .iter()
            .all(|o| o.id != "7"));

        let deleted_view = project_range(&orders, StatusFilter::Deleted);
        assert_eq!(deleted_view.len(), 1);
        assert_eq!(deleted_view[0].id, "7");
    }

    #[test]
    fn test_visibility_is_a_partition() {
        let now = Utc::now();
        let mut old = sample_order("old");
        old.created_at = now - Duration::hours(30);

        let orders = vec![
            sample_order("live"),
            old,
            deleted_order("trash-admin", DeletedFrom::Admin),
            deleted_order("trash-card", DeletedFrom::OrderCard),
        ];

        for order in &orders {
            let v = visibility(order, now);
            let in_live = !project_live(std::slice::from_ref(order), StatusFilter::All, "", now)
                .is_empty();
            let in_trash = !project_trash(std::slice::from_ref(order)).is_empty();

            // Exactly one home, and the projections agree with it.
            match v {
                Visibility::Live => assert!(in_live && !in_trash),
                Visibility::TrashOnly => assert!(!in_live && in_trash),
                Visibility::Hidden => assert!(!in_live && !in_trash),
            }
        }
    }

    #[test]
    fn test_live_window_excludes_old_orders() {
        let now = Utc::now();
        let mut fresh = sample_order("fresh");
        fresh.created_at = now - Duration::hours(2);
        let mut stale = sample_order("stale");
        stale.created_at = now - Duration::hours(25);

        let orders = vec![fresh, stale];
        let live = project_live(&orders, StatusFilter::All, "", now);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, "fresh");
    }

    #[test]
    fn test_search_matches_phone() {
        let mut a = sample_order("a");
        a.customer.as_mut().unwrap().phone = Some("555-1234".into());
        let mut b = sample_order("b");
        b.customer.as_mut().unwrap().phone = Some("999-0000".into());

        let orders = vec![a, b];
        let hits = project_live(&orders, StatusFilter::All, "555", Utc::now());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn test_search_is_case_insensitive_and_ord_by_id() {
        let mut a = sample_order("64ac01f2e3b9");
        a.customer.as_mut().unwrap().name = Some("Asha Sharma".into());

        let orders = vec![a];
        assert_eq!(project_live(&orders, StatusFilter::All, "ASHA", Utc::now()).len(), 1);
        assert_eq!(project_live(&orders, StatusFilter::All, "F2E3", Utc::now()).len(), 1);
        assert!(project_live(&orders, StatusFilter::All, "zzz", Utc::now()).is_empty());
    }

    #[test]
    fn test_status_filter_exact_match() {
        let mut confirmed = sample_order("c");
        confirmed.status = OrderStatus::Confirmed;
        let orders = vec![sample_order("p"), confirmed];

        let now = Utc::now();
        assert_eq!(project_live(&orders, StatusFilter::All, "", now).len(), 2);
        let pending = project_live(&orders, StatusFilter::Pending, "", now);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "p");
    }

    #[test]
    fn test_weekly_grouping_uses_calendar_weeks() {
        // 2026-07-05 is a Sunday, 2026-07-06 a Monday: adjacent days in
        // different ISO weeks.
        let sunday = Utc.with_ymd_and_hms(2026, 7, 5, 12, 0, 0).unwrap();
        let monday = Utc.with_ymd_and_hms(2026, 7, 6, 12, 0, 0).unwrap();
        let wednesday = Utc.with_ymd_and_hms(2026, 7, 8, 12, 0, 0).unwrap();

        assert!(!in_grouping(sunday, monday, DateGrouping::Weekly));
        assert!(in_grouping(wednesday, monday, DateGrouping::Weekly));

        // Same week across a month boundary.
        let jun_30 = Utc.with_ymd_and_hms(2026, 6, 30, 8, 0, 0).unwrap();
        let jul_1 = Utc.with_ymd_and_hms(2026, 7, 1, 8, 0, 0).unwrap();
        assert!(in_grouping(jun_30, jul_1, DateGrouping::Weekly));
        assert!(!in_grouping(jun_30, jul_1, DateGrouping::Monthly));
    }

    #[test]
    fn test_daily_and_yearly_grouping() {
        let morning = Utc.with_ymd_and_hms(2026, 3, 14, 6, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2026, 3, 14, 22, 0, 0).unwrap();
        let next_day = Utc.with_ymd_and_hms(2026, 3, 15, 1, 0, 0).unwrap();

        assert!(in_grouping(morning, evening, DateGrouping::Daily));
        assert!(!in_grouping(next_day, evening, DateGrouping::Daily));
        assert!(in_grouping(next_day, morning, DateGrouping::Yearly));
    }

    #[test]
    fn test_filter_by_date() {
        let reference = Utc.with_ymd_and_hms(2026, 7, 8, 12, 0, 0).unwrap();
        let mut in_window = sample_order("in");
        in_window.created_at = Utc.with_ymd_and_hms(2026, 7, 8, 9, 0, 0).unwrap();
        let mut out_of_window = sample_order("out");
        out_of_window.created_at = Utc.with_ymd_and_hms(2026, 7, 9, 9, 0, 0).unwrap();

        let orders = vec![in_window, out_of_window];
        let filtered = filter_by_date(&orders, reference, DateGrouping::Daily);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "in");
    }

    #[test]
    fn test_projection_preserves_server_order() {
        let orders = vec![sample_order("z"), sample_order("a"), sample_order("m")];
        let live = project_live(&orders, StatusFilter::All, "", Utc::now());
        let ids: Vec<&str> = live.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }
}
