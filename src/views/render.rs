//! Plain-text rendering of the views.

use std::fmt::Write;

use chrono::{DateTime, Local, Utc};

use super::OrderListSnapshot;
use crate::domain::{format_money, Order, OrderItem, StatusAction, User};
use crate::router::Route;

pub const APP_TITLE: &str = "Grocery Order Management";
pub const NO_ORDERS: &str = "No orders found.";
pub const NO_ITEMS: &str = "No items in this order.";
pub const LOADING: &str = "Loading...";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Navigation chrome shown above every protected view.
pub fn render_header(user: &User, current: Route) -> String {
    let links: Vec<String> = Route::NAV
        .iter()
        .map(|route| {
            if *route == current {
                format!("[{}]", route.nav_label())
            } else {
                format!("{} ({})", route.nav_label(), route.path())
            }
        })
        .collect();
    format!(
        "== {} ==  signed in as {}\n{}  |  Sign out\n",
        APP_TITLE,
        user.email,
        links.join("  ")
    )
}

pub fn render_order_list(snapshot: &OrderListSnapshot) -> String {
    let mut out = String::from("Orders  (refresh)\n");
    if snapshot.loading {
        out.push_str(LOADING);
        out.push('\n');
        return out;
    }
    if snapshot.orders.is_empty() {
        out.push_str(NO_ORDERS);
        out.push('\n');
        return out;
    }
    for order in &snapshot.orders {
        out.push_str(&render_order_card(order, snapshot.props.show_actions));
    }
    out
}

pub fn render_order_card(order: &Order, show_actions: bool) -> String {
    let mut out = String::new();
    let actions: Vec<String> = StatusAction::available(order.status, show_actions)
        .iter()
        .map(|action| format!("[{}]", action.label()))
        .collect();

    let _ = write!(out, "┌ Order #{}", order.id);
    if !actions.is_empty() {
        let _ = write!(out, "   {}", actions.join(" "));
    }
    out.push('\n');
    let _ = writeln!(out, "│ {}", format_timestamp(order.created_at));
    let _ = writeln!(out, "│ {}", order.customer_name);
    let _ = writeln!(out, "│ {}", order.phone_number);
    let _ = writeln!(out, "│ {}", order.delivery_address);

    if order.order_items.is_empty() {
        let _ = writeln!(out, "│   {}", NO_ITEMS);
    }
    for item in &order.order_items {
        out.push_str(&render_line_item(item));
    }
    out.push_str("└\n");
    out
}

fn render_line_item(item: &OrderItem) -> String {
    format!(
        "│   ▣ {} <{}>\n│     {} × {}  {}\n",
        item.product.name,
        item.product.image_url,
        item.quantity,
        format_money(item.product.price),
        format_money(item.line_total())
    )
}
