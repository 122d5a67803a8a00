use chrono::{Datelike, NaiveDate};

use super::{Order, OrderStatus};

/// Order history filters. All present filters must match; absent filters
/// impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilters {
    pub status: Option<OrderStatus>,
    /// Case-insensitive substring of the table number.
    pub table_number: Option<String>,
    /// Case-insensitive substring of the order id.
    pub order_id: Option<String>,
    /// Calendar day (UTC) the order was created on.
    pub date: Option<NaiveDate>,
    /// Month (1-12) the order was created in; only applied together with `year`.
    pub month: Option<u32>,
    pub year: Option<i32>,
}

impl OrderFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_table_number(mut self, table: impl Into<String>) -> Self {
        self.table_number = Some(table.into());
        self
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_month(mut self, month: u32, year: i32) -> Self {
        self.month = Some(month);
        self.year = Some(year);
        self
    }

    /// Returns true if `order` satisfies every present filter.
    pub fn matches(&self, order: &Order) -> bool {
        if self.status.is_some_and(|s| s != order.status) {
            return false;
        }
        if let Some(table) = non_blank(&self.table_number)
            && !contains_ignore_case(order.table_number.as_str(), table)
        {
            return false;
        }
        if let Some(id) = non_blank(&self.order_id)
            && !contains_ignore_case(order.id.as_str(), id)
        {
            return false;
        }

        let created = order.created_at.date_naive();
        if self.date.is_some_and(|d| d != created) {
            return false;
        }
        if let (Some(month), Some(year)) = (self.month, self.year)
            && (created.month() != month || created.year() != year)
        {
            return false;
        }
        true
    }

    /// Returns the matching orders, preserving their order.
    pub fn apply<'a>(&self, orders: &'a [Order]) -> Vec<&'a Order> {
        orders.iter().filter(|o| self.matches(o)).collect()
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
