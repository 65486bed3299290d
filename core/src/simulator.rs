//! Weekly transaction simulator — the core of the dataset.
//!
//! DRAW ORDER (fixed, documented, never reordered):
//!   1. Purchase trial          one draw per candidate
//!   2. Visit count             one draw per survivor
//!      Products ordered        one draw per survivor
//!   3. New-collection split    products_ord draws per survivor
//!   4. Treatment               per campaign in table order, eligible rows only
//!   5. Unit price              two draws per survivor
//!   6. Age                     two draws per survivor
//!      Gender                  one draw per survivor
//!   7. Segment                 one draw per survivor, week 1 only
//!   8. Derived flags           no draws
//!
//! Each step is a full pass over the surviving rows in row order.
//! Moving a draw between steps changes every later value for the seed.

use crate::{
    campaign::{is_eligible, CampaignPolicy, Treatment},
    config::BehaviorConfig,
    error::SimResult,
    population::{CustomerAssignment, StoreRecord},
    rng::StreamRng,
    types::{CustomerId, Week},
};
use serde::{Deserialize, Serialize};

/// Only week 1 may label a customer as new.
pub const FIRST_WEEK: Week = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    New,
    Returning,
}

impl Segment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Returning => "Returning",
        }
    }
}

/// One realised purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub customer_id: CustomerId,
    pub week: Week,
    /// Inherited unchanged from the customer's store.
    pub store: StoreRecord,
    pub age: u32,
    pub gender: String,
    pub customer_segment: Segment,
    pub visit_count: u32,
    pub products_ord: u32,
    pub new_collection_items: u32,
    pub other_products_ord: u32,
    pub treatment: Treatment,
    pub promo_used: bool,
    pub unit_price: f64,
    pub revenue_before_discount: f64,
    pub revenue: f64,
    pub used_new_collection: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeekStats {
    pub week: Week,
    pub candidates: usize,
    pub transactions: usize,
    pub eligible: usize,
    pub discounted: usize,
    pub gifted: usize,
    pub loyalty: usize,
    pub new_customers: usize,
    pub revenue: f64,
}

#[derive(Debug, Clone)]
pub struct WeeklyBatch {
    pub week: Week,
    pub records: Vec<TransactionRecord>,
    pub stats: WeekStats,
}

/// Round to cents.
pub fn round_cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// A surviving candidate while its fields are being drawn.
struct Draft<'a> {
    customer: &'a CustomerAssignment,
    campaign: usize,
    visit_count: u32,
    products_ord: u32,
    new_collection_items: u32,
    treatment: Treatment,
    unit_price: f64,
    age: u32,
    gender: &'a str,
    segment: Segment,
}

pub struct WeeklySimulator<'a> {
    policy: &'a CampaignPolicy,
    behavior: &'a BehaviorConfig,
}

impl<'a> WeeklySimulator<'a> {
    pub fn new(policy: &'a CampaignPolicy, behavior: &'a BehaviorConfig) -> Self {
        Self { policy, behavior }
    }

    /// Turn the full assignment table into this week's transactions.
    /// `customers` is read-only; nothing here outlives the call.
    pub fn simulate_week<'c>(
        &self,
        week: Week,
        customers: &'c [CustomerAssignment],
        rng: &mut StreamRng,
    ) -> SimResult<WeeklyBatch>
    where
        'a: 'c,
    {
        let b = self.behavior;

        // Resolve campaigns before any draw so a bad label fails the
        // week without consuming randomness.
        let campaigns = customers
            .iter()
            .map(|c| self.policy.index_of(&c.store.campaign_group))
            .collect::<SimResult<Vec<_>>>()?;

        // 1. Purchase trial.
        let mut drafts: Vec<Draft<'c>> = customers
            .iter()
            .zip(campaigns)
            .filter_map(|(customer, campaign)| {
                let p = self.policy.by_index(campaign).purchase_probability;
                rng.chance(p).then(|| Draft {
                    customer,
                    campaign,
                    visit_count: 0,
                    products_ord: 0,
                    new_collection_items: 0,
                    treatment: Treatment::default(),
                    unit_price: 0.0,
                    age: 0,
                    gender: "",
                    segment: Segment::Returning,
                })
            })
            .collect();

        // 2. Behavioural draws.
        for d in drafts.iter_mut() {
            d.visit_count = rng.range_inclusive(b.visit_count.min, b.visit_count.max);
        }
        for d in drafts.iter_mut() {
            d.products_ord = rng.range_inclusive(b.products_ord.min, b.products_ord.max);
        }

        // 3. Collection split, clipped to [0, products_ord].
        for d in drafts.iter_mut() {
            let rate = self.policy.by_index(d.campaign).collection_attach_rate;
            d.new_collection_items = rng.binomial(d.products_ord, rate).min(d.products_ord);
        }

        // 4. Treatment, one pass per campaign.
        for d in drafts.iter_mut() {
            d.treatment = Treatment::default();
        }
        for (idx, campaign) in self.policy.iter().enumerate() {
            let mut treated = 0usize;
            for d in drafts
                .iter_mut()
                .filter(|d| d.campaign == idx && is_eligible(d.new_collection_items))
            {
                d.treatment = campaign.treatment.apply(rng);
                if d.treatment.promo_used() {
                    treated += 1;
                }
            }
            log::debug!("week={week} treatment: campaign={} treated={treated}", campaign.id);
        }

        // 5. Pricing.
        for d in drafts.iter_mut() {
            let mean = self.policy.by_index(d.campaign).average_unit_price;
            d.unit_price = b.unit_price_range.clip(rng.normal(mean, b.unit_price_sd));
        }

        // 6. Demographics.
        for d in drafts.iter_mut() {
            d.age = b.age_range.clip(rng.normal(b.age.mean, b.age.sd)).round() as u32;
        }
        for d in drafts.iter_mut() {
            d.gender = rng.pick(&b.genders).as_str();
        }

        // 7. Segmentation.
        if week == FIRST_WEEK {
            for d in drafts.iter_mut() {
                let p_new = self.policy.by_index(d.campaign).segment_new_probability;
                d.segment = if rng.chance(p_new) {
                    Segment::New
                } else {
                    Segment::Returning
                };
            }
        }

        // 8. Derived fields.
        let records: Vec<TransactionRecord> =
            drafts.into_iter().map(|d| finish(week, d)).collect();

        let stats = week_stats(week, customers.len(), &records);
        log::info!(
            "week={week} {}: {}/{} transacted, revenue={:.2}, discounted={}, gifted={}, loyalty={}",
            rng.name,
            stats.transactions,
            stats.candidates,
            stats.revenue,
            stats.discounted,
            stats.gifted,
            stats.loyalty
        );
        Ok(WeeklyBatch {
            week,
            records,
            stats,
        })
    }
}

fn finish(week: Week, d: Draft<'_>) -> TransactionRecord {
    let revenue_before_discount = f64::from(d.products_ord) * d.unit_price;
    let revenue = round_cents(revenue_before_discount * (1.0 - d.treatment.discount));
    TransactionRecord {
        customer_id: d.customer.customer_id,
        week,
        store: d.customer.store.clone(),
        age: d.age,
        gender: d.gender.to_string(),
        customer_segment: d.segment,
        visit_count: d.visit_count,
        products_ord: d.products_ord,
        new_collection_items: d.new_collection_items,
        other_products_ord: d.products_ord - d.new_collection_items,
        promo_used: d.treatment.promo_used(),
        treatment: d.treatment,
        unit_price: d.unit_price,
        revenue_before_discount,
        revenue,
        used_new_collection: d.new_collection_items > 0,
    }
}

fn week_stats(week: Week, candidates: usize, records: &[TransactionRecord]) -> WeekStats {
    let mut stats = WeekStats {
        week,
        candidates,
        transactions: records.len(),
        ..WeekStats::default()
    };
    for r in records {
        stats.revenue += r.revenue;
        if is_eligible(r.new_collection_items) {
            stats.eligible += 1;
        }
        if r.treatment.discount > 0.0 {
            stats.discounted += 1;
        }
        if r.treatment.gift.is_some() {
            stats.gifted += 1;
        }
        if r.treatment.used_loyalty_or_voucher {
            stats.loyalty += 1;
        }
        if r.customer_segment == Segment::New {
            stats.new_customers += 1;
        }
    }
    stats
}
