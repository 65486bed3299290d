//! Store directory and customer→store assignment.
//!
//! Stores are drawn column by column (all locations, then all sizes, ...)
//! from the stores stream; customers are then assigned uniformly from
//! the assignment stream. Both tables are immutable once built.

use crate::{
    config::{PopulationConfig, WeightedLabel},
    rng::{RngBank, StreamRng, StreamSlot},
    types::{CampaignId, CustomerId, StoreId},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreRecord {
    pub store_id: StoreId,
    pub location: String,
    pub size_category: String,
    pub avg_revenue_last_3_months: f64,
    pub monthly_active_customers: u32,
    pub campaign_group: CampaignId,
}

/// One customer joined to the full attributes of their store.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerAssignment {
    pub customer_id: CustomerId,
    pub store: StoreRecord,
}

#[derive(Debug, Clone)]
pub struct Population {
    pub stores: Vec<StoreRecord>,
    pub customers: Vec<CustomerAssignment>,
}

impl Population {
    pub fn customers_in_campaign(&self, campaign: &str) -> usize {
        self.customers
            .iter()
            .filter(|c| c.store.campaign_group == campaign)
            .count()
    }
}

pub fn build_population(config: &PopulationConfig, bank: &RngBank) -> Population {
    let mut rng = bank.for_stream(StreamSlot::Stores);
    let stores = generate_stores(config, &mut rng);

    let mut rng = bank.for_stream(StreamSlot::Assignment);
    let customers = assign_customers(config.num_customers, &stores, &mut rng);

    log::info!(
        "population: {} stores, {} customers",
        stores.len(),
        customers.len()
    );
    Population { stores, customers }
}

fn generate_stores(config: &PopulationConfig, rng: &mut StreamRng) -> Vec<StoreRecord> {
    let n = config.num_stores;
    let locations = pick_labels(&config.locations, n, rng);
    let sizes = pick_labels(&config.size_categories, n, rng);
    let revenues: Vec<f64> = (0..n)
        .map(|_| {
            rng.normal(config.store_revenue.mean, config.store_revenue.sd)
                .round()
        })
        .collect();
    let mac = config.monthly_active_customers;
    let actives: Vec<u32> = (0..n).map(|_| rng.range_inclusive(mac.min, mac.max)).collect();
    let campaigns = pick_labels(&config.campaign_shares, n, rng);

    locations
        .into_iter()
        .zip(sizes)
        .zip(revenues.into_iter().zip(actives))
        .zip(campaigns)
        .enumerate()
        .map(
            |(i, (((location, size_category), (revenue, active)), campaign_group))| StoreRecord {
                store_id: format!("S{:03}", i + 1),
                location,
                size_category,
                avg_revenue_last_3_months: revenue,
                monthly_active_customers: active,
                campaign_group,
            },
        )
        .collect()
}

fn assign_customers(
    num_customers: usize,
    stores: &[StoreRecord],
    rng: &mut StreamRng,
) -> Vec<CustomerAssignment> {
    if stores.is_empty() {
        return Vec::new();
    }
    (1..=num_customers as CustomerId)
        .map(|customer_id| CustomerAssignment {
            customer_id,
            store: rng.pick(stores).clone(),
        })
        .collect()
}

fn pick_labels(labels: &[WeightedLabel], n: usize, rng: &mut StreamRng) -> Vec<String> {
    let weights: Vec<f64> = labels.iter().map(|l| l.weight).collect();
    (0..n)
        .map(|_| labels[rng.weighted_index(&weights)].label.clone())
        .collect()
}
