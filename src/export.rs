//! CSV export of the currently filtered order list.
//!
//! Produces the same sheet the dashboard offers for download: one row per
//! order, items flattened into a single cell.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::orders::{Order, SizeVariant};

const HEADER: [&str; 10] = [
    "ID", "Name", "Phone", "Type", "Table", "Items", "Total", "Status", "Payment", "Date",
];

/// Quote a CSV value when it contains a comma, quote or newline; embedded
/// quotes are doubled.
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn size_label(size: Option<SizeVariant>) -> &'static str {
    match size {
        Some(SizeVariant::Half) => "half",
        Some(SizeVariant::Full) => "full",
        None => "-",
    }
}

/// `Momo(half)x2; Latte(full)x1` style item summary.
fn format_items(order: &Order) -> String {
    order
        .items
        .iter()
        .map(|item| format!("{}({})x{}", item.name, size_label(item.size), item.quantity))
        .collect::<Vec<_>>()
        .join("; ")
}

fn status_label(order: &Order) -> &'static str {
    match order.status {
        crate::orders::OrderStatus::Pending => "pending",
        crate::orders::OrderStatus::Confirmed => "confirmed",
        crate::orders::OrderStatus::Deleted => "deleted",
    }
}

/// Render orders to CSV, header row included.
pub fn orders_to_csv(orders: &[Order]) -> String {
    let mut rows = Vec::with_capacity(orders.len() + 1);
    rows.push(HEADER.join(","));

    for order in orders {
        let fields = [
            order.id.clone(),
            order.customer_name().unwrap_or("N/A").to_string(),
            order.customer_phone().unwrap_or("N/A").to_string(),
            order.order_type.clone().unwrap_or_default(),
            order.table_number.clone().unwrap_or_else(|| "-".into()),
            format_items(order),
            format!("{:.2}", order.display_total()),
            status_label(order).to_string(),
            order.payment_method.clone().unwrap_or_default(),
            order
                .created_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        ];
        rows.push(
            fields
                .iter()
                .map(|f| escape_csv(f))
                .collect::<Vec<_>>()
                .join(","),
        );
    }

    rows.join("\n")
}

/// Date-stamped export filename with filesystem-hostile characters replaced.
pub fn export_filename(date: DateTime<Utc>) -> String {
    let raw = format!("brewline_orders_{}.csv", date.format("%Y-%m-%d"));
    raw.chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::sample_order;
    use chrono::TimeZone;

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_csv_header_and_row() {
        let mut order = sample_order("ord-1");
        order.created_at = Utc.with_ymd_and_hms(2026, 7, 8, 9, 30, 0).unwrap();

        let csv = orders_to_csv(std::slice::from_ref(&order));
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "ID,Name,Phone,Type,Table,Items,Total,Status,Payment,Date"
        );

        let row = lines.next().unwrap();
        assert!(row.starts_with("ord-1,Asha,555-1234,dine-in,4,"));
        assert!(row.contains("Latte(full)x2"));
        assert!(row.contains("500.00"));
        assert!(row.contains("2026-07-08T09:30:00Z"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_csv_quotes_customer_names_with_commas() {
        let mut order = sample_order("ord-2");
        order.customer.as_mut().unwrap().name = Some("Shrestha, Asha".into());

        let csv = orders_to_csv(std::slice::from_ref(&order));
        assert!(csv.contains("\"Shrestha, Asha\""));
    }

    #[test]
    fn test_export_filename() {
        let date = Utc.with_ymd_and_hms(2026, 7, 8, 0, 0, 0).unwrap();
        assert_eq!(export_filename(date), "brewline_orders_2026-07-08.csv");
    }
}
