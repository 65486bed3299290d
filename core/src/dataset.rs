//! Dataset assembly: weekly batches → one ordered table.
//!
//! Rows are never merged across weeks. The requested column list is
//! checked up front; a column the simulator does not produce aborts
//! assembly before any row is built.

use crate::{
    error::{SimError, SimResult},
    simulator::{TransactionRecord, WeeklyBatch},
};
use std::fmt;

/// Column set of the flat-parameter dataset.
pub const BASELINE_COLUMNS: [&str; 21] = [
    "customer_id",
    "week",
    "store_id",
    "campaign_group",
    "store_location",
    "store_size_category",
    "avg_revenue_last_3_months",
    "monthly_active_customers",
    "customer_segment",
    "age",
    "gender",
    "visit_count",
    "products_ord",
    "new_collection_items",
    "other_products_ord",
    "discount",
    "gift_received",
    "used_loyalty_or_voucher",
    "promo_used",
    "revenue_before_discount",
    "revenue",
];

/// Column set of the per-campaign dataset.
pub const TUNED_COLUMNS: [&str; 22] = [
    "customer_id",
    "week",
    "store_id",
    "campaign_group",
    "store_location",
    "store_size_category",
    "avg_revenue_last_3_months",
    "monthly_active_customers",
    "customer_segment",
    "age",
    "gender",
    "visit_count",
    "products_ord",
    "new_collection_items",
    "other_products_ord",
    "discount",
    "gift_received",
    "used_loyalty_or_voucher",
    "promo_used",
    "revenue_before_discount",
    "revenue",
    "used_new_collection",
];

/// Columns that are produced but not part of either default set.
const EXTRA_COLUMNS: [&str; 1] = ["unit_price"];

pub fn is_known_column(name: &str) -> bool {
    TUNED_COLUMNS.contains(&name) || EXTRA_COLUMNS.contains(&name)
}

/// A single typed value in the output table.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    /// Missing value, e.g. no gift.
    Empty,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Int(v) => write!(f, "{v}"),
            // Whole floats keep a trailing ".0" so float columns stay floats.
            Cell::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Text(v) => f.write_str(v),
            Cell::Bool(true) => f.write_str("True"),
            Cell::Bool(false) => f.write_str("False"),
            Cell::Empty => Ok(()),
        }
    }
}

/// Look up one named field of a record. `None` means the column
/// is not something a transaction record carries.
pub fn record_cell(record: &TransactionRecord, column: &str) -> Option<Cell> {
    let cell = match column {
        "customer_id" => Cell::Int(record.customer_id as i64),
        "week" => Cell::Int(i64::from(record.week)),
        "store_id" => Cell::Text(record.store.store_id.clone()),
        "campaign_group" => Cell::Text(record.store.campaign_group.clone()),
        "store_location" => Cell::Text(record.store.location.clone()),
        "store_size_category" => Cell::Text(record.store.size_category.clone()),
        "avg_revenue_last_3_months" => Cell::Float(record.store.avg_revenue_last_3_months),
        "monthly_active_customers" => {
            Cell::Int(i64::from(record.store.monthly_active_customers))
        }
        "customer_segment" => Cell::Text(record.customer_segment.as_str().to_string()),
        "age" => Cell::Int(i64::from(record.age)),
        "gender" => Cell::Text(record.gender.clone()),
        "visit_count" => Cell::Int(i64::from(record.visit_count)),
        "products_ord" => Cell::Int(i64::from(record.products_ord)),
        "new_collection_items" => Cell::Int(i64::from(record.new_collection_items)),
        "other_products_ord" => Cell::Int(i64::from(record.other_products_ord)),
        "discount" => Cell::Float(record.treatment.discount),
        "gift_received" => match &record.treatment.gift {
            Some(gift) => Cell::Text(gift.clone()),
            None => Cell::Empty,
        },
        "used_loyalty_or_voucher" => Cell::Bool(record.treatment.used_loyalty_or_voucher),
        "promo_used" => Cell::Text(if record.promo_used { "Yes" } else { "No" }.to_string()),
        "unit_price" => Cell::Float(record.unit_price),
        "revenue_before_discount" => Cell::Float(record.revenue_before_discount),
        "revenue" => Cell::Float(record.revenue),
        "used_new_collection" => Cell::Bool(record.used_new_collection),
        _ => return None,
    };
    Some(cell)
}

/// The final table: header plus typed rows, in week order.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }
}

/// Concatenate weekly batches and project `columns` in order.
pub fn assemble(batches: &[WeeklyBatch], columns: &[String]) -> SimResult<Dataset> {
    if let Some(missing) = columns.iter().find(|c| !is_known_column(c)) {
        return Err(SimError::MissingColumn {
            column: missing.clone(),
        });
    }

    let total: usize = batches.iter().map(|b| b.records.len()).sum();
    let mut rows = Vec::with_capacity(total);
    for batch in batches {
        for record in &batch.records {
            let row = columns
                .iter()
                .map(|c| {
                    record_cell(record, c).ok_or_else(|| SimError::MissingColumn {
                        column: c.clone(),
                    })
                })
                .collect::<SimResult<Vec<_>>>()?;
            rows.push(row);
        }
    }

    log::info!(
        "dataset: {} rows x {} columns from {} weeks",
        rows.len(),
        columns.len(),
        batches.len()
    );
    Ok(Dataset {
        columns: columns.to_vec(),
        rows,
    })
}
