use crate::{
    campaign::{check_probability, CampaignParams, TreatmentRule},
    dataset::{is_known_column, BASELINE_COLUMNS, TUNED_COLUMNS},
    error::{SimError, SimResult},
    types::Week,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const GIFT_CATALOG: [&str; 4] = ["Tote Bag", "Socks", "Keychain", "Stickers"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightedLabel {
    pub label: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NormalParams {
    pub mean: f64,
    pub sd: f64,
}

/// Inclusive integer range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntRange {
    pub min: u32,
    pub max: u32,
}

/// Inclusive clip bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FloatRange {
    pub min: f64,
    pub max: f64,
}

impl FloatRange {
    pub fn clip(&self, x: f64) -> f64 {
        x.clamp(self.min, self.max)
    }
}

// ── Population ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PopulationConfig {
    pub num_customers: usize,
    pub num_stores: usize,
    pub locations: Vec<WeightedLabel>,
    pub size_categories: Vec<WeightedLabel>,
    pub store_revenue: NormalParams,
    pub monthly_active_customers: IntRange,
    /// Share of stores assigned to each campaign label.
    pub campaign_shares: Vec<WeightedLabel>,
}

// ── Weekly behaviour constants ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorConfig {
    pub visit_count: IntRange,
    pub products_ord: IntRange,
    pub unit_price_sd: f64,
    pub unit_price_range: FloatRange,
    pub age: NormalParams,
    pub age_range: FloatRange,
    pub genders: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    pub columns: Vec<String>,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimConfig {
    pub population: PopulationConfig,
    pub weeks: Vec<Week>,
    pub behavior: BehaviorConfig,
    /// Ordered campaign table. Order fixes the treatment pass order.
    pub campaigns: Vec<CampaignParams>,
    pub output: OutputConfig,
}

impl SimConfig {
    /// Load and validate a JSON config file.
    /// In tests, use SimConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: SimConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject anything the simulator cannot run faithfully.
    /// Nothing is clamped: a bad value is an error.
    pub fn validate(&self) -> SimResult<()> {
        let pop = &self.population;
        if pop.num_stores == 0 && pop.num_customers > 0 {
            return Err(SimError::invalid(
                "population.num_stores",
                "customers cannot be assigned without stores",
            ));
        }
        check_weights("population.locations", &pop.locations)?;
        check_weights("population.size_categories", &pop.size_categories)?;
        check_weights("population.campaign_shares", &pop.campaign_shares)?;
        check_normal("population.store_revenue", pop.store_revenue)?;
        check_int_range("population.monthly_active_customers", pop.monthly_active_customers, 0)?;

        if self.campaigns.is_empty() {
            return Err(SimError::invalid("campaigns", "campaign table is empty"));
        }
        let mut seen = HashSet::new();
        for campaign in &self.campaigns {
            campaign.validate()?;
            if !seen.insert(campaign.id.as_str()) {
                return Err(SimError::invalid(
                    "campaigns",
                    format!("duplicate campaign '{}'", campaign.id),
                ));
            }
        }
        for share in &pop.campaign_shares {
            if !seen.contains(share.label.as_str()) {
                return Err(SimError::UnknownCampaign {
                    label: share.label.clone(),
                });
            }
        }

        if self.weeks.is_empty() {
            return Err(SimError::invalid("weeks", "no weeks to simulate"));
        }
        let mut weeks = HashSet::new();
        for &week in &self.weeks {
            if week == 0 {
                return Err(SimError::invalid("weeks", "weeks are 1-based"));
            }
            if !weeks.insert(week) {
                return Err(SimError::invalid("weeks", format!("duplicate week {week}")));
            }
        }

        let b = &self.behavior;
        check_int_range("behavior.visit_count", b.visit_count, 1)?;
        check_int_range("behavior.products_ord", b.products_ord, 1)?;
        check_sd("behavior.unit_price_sd", b.unit_price_sd)?;
        check_float_range("behavior.unit_price_range", b.unit_price_range)?;
        if b.unit_price_range.min <= 0.0 {
            return Err(SimError::invalid(
                "behavior.unit_price_range",
                "prices must stay positive",
            ));
        }
        check_normal("behavior.age", b.age)?;
        check_float_range("behavior.age_range", b.age_range)?;
        if b.genders.is_empty() {
            return Err(SimError::invalid("behavior.genders", "no gender labels"));
        }

        if self.output.columns.is_empty() {
            return Err(SimError::invalid("output.columns", "no output columns"));
        }
        for column in &self.output.columns {
            if !is_known_column(column) {
                return Err(SimError::invalid(
                    "output.columns",
                    format!("unknown column '{column}'"),
                ));
            }
        }
        if self.output.file_name.trim().is_empty() {
            return Err(SimError::invalid("output.file_name", "empty file name"));
        }
        Ok(())
    }

    /// Flat parameters shared by every campaign.
    pub fn baseline() -> Self {
        let campaigns = vec![
            flat_campaign("A", TreatmentRule::Discount { rate: 0.05 }),
            flat_campaign("B", gift_rule()),
            flat_campaign("C", loyalty_rule()),
        ];
        Self {
            population: default_population(30_000, 150),
            weeks: vec![1, 2, 3, 4],
            behavior: BehaviorConfig {
                visit_count: IntRange { min: 1, max: 2 },
                products_ord: IntRange { min: 1, max: 4 },
                unit_price_sd: 10.0,
                unit_price_range: FloatRange { min: 10.0, max: 100.0 },
                age: NormalParams { mean: 32.0, sd: 10.0 },
                age_range: FloatRange { min: 18.0, max: 60.0 },
                genders: vec!["Male".into(), "Female".into()],
            },
            campaigns,
            output: OutputConfig {
                columns: BASELINE_COLUMNS.iter().map(|c| c.to_string()).collect(),
                file_name: "ab_marketing_campaign_cleaned.csv".into(),
            },
        }
    }

    /// Per-campaign parameters: A converts best and sells pricier items.
    pub fn tuned() -> Self {
        let campaigns = vec![
            CampaignParams {
                id: "A".into(),
                purchase_probability: 0.7,
                collection_attach_rate: 0.3,
                segment_new_probability: 0.4,
                average_unit_price: 80.0,
                treatment: TreatmentRule::Discount { rate: 0.05 },
            },
            CampaignParams {
                id: "B".into(),
                purchase_probability: 0.5,
                collection_attach_rate: 0.14,
                segment_new_probability: 0.25,
                average_unit_price: 60.0,
                treatment: gift_rule(),
            },
            CampaignParams {
                id: "C".into(),
                purchase_probability: 0.3,
                collection_attach_rate: 0.07,
                segment_new_probability: 0.15,
                average_unit_price: 35.0,
                treatment: loyalty_rule(),
            },
        ];
        Self {
            population: default_population(30_000, 150),
            weeks: vec![1, 2, 3, 4],
            behavior: BehaviorConfig {
                visit_count: IntRange { min: 1, max: 2 },
                products_ord: IntRange { min: 1, max: 5 },
                unit_price_sd: 20.0,
                unit_price_range: FloatRange { min: 10.0, max: 120.0 },
                age: NormalParams { mean: 32.0, sd: 15.0 },
                age_range: FloatRange { min: 18.0, max: 65.0 },
                genders: vec!["Male".into(), "Female".into()],
            },
            campaigns,
            output: OutputConfig {
                columns: TUNED_COLUMNS.iter().map(|c| c.to_string()).collect(),
                file_name: "ab_marketing_campaign_updated.csv".into(),
            },
        }
    }

    /// Config with hardcoded defaults for use in unit tests.
    /// Baseline parameters over a small population.
    pub fn default_test() -> Self {
        let mut config = Self::baseline();
        config.population.num_customers = 500;
        config.population.num_stores = 12;
        config
    }

    /// Override every campaign's parameters in place.
    /// Used by tests and tooling to build edge-case scenarios.
    pub fn set_all_campaigns(&mut self, f: impl Fn(&mut CampaignParams)) {
        self.campaigns.iter_mut().for_each(f);
    }
}

fn default_population(num_customers: usize, num_stores: usize) -> PopulationConfig {
    PopulationConfig {
        num_customers,
        num_stores,
        locations: weighted(&[("Urban", 0.4), ("Suburban", 0.4), ("Rural", 0.2)]),
        size_categories: weighted(&[("Small", 0.3), ("Medium", 0.5), ("Large", 0.2)]),
        store_revenue: NormalParams {
            mean: 120_000.0,
            sd: 25_000.0,
        },
        monthly_active_customers: IntRange { min: 500, max: 2999 },
        campaign_shares: weighted(&[("A", 0.33), ("B", 0.34), ("C", 0.33)]),
    }
}

fn flat_campaign(id: &str, treatment: TreatmentRule) -> CampaignParams {
    CampaignParams {
        id: id.into(),
        purchase_probability: 0.8,
        collection_attach_rate: 0.6,
        segment_new_probability: 0.3,
        average_unit_price: 45.0,
        treatment,
    }
}

fn gift_rule() -> TreatmentRule {
    TreatmentRule::Gift {
        catalog: GIFT_CATALOG.iter().map(|g| g.to_string()).collect(),
    }
}

fn loyalty_rule() -> TreatmentRule {
    TreatmentRule::LoyaltyDiscount {
        trial_probability: 0.5,
        rate: 0.10,
    }
}

fn weighted(pairs: &[(&str, f64)]) -> Vec<WeightedLabel> {
    pairs
        .iter()
        .map(|(label, weight)| WeightedLabel {
            label: label.to_string(),
            weight: *weight,
        })
        .collect()
}

fn check_weights(field: &str, labels: &[WeightedLabel]) -> SimResult<()> {
    if labels.is_empty() {
        return Err(SimError::invalid(field, "no labels"));
    }
    for l in labels {
        check_probability(&format!("{field}.{}", l.label), l.weight)?;
    }
    let total: f64 = labels.iter().map(|l| l.weight).sum();
    if (total - 1.0).abs() > 1e-6 {
        return Err(SimError::invalid(
            field,
            format!("weights must sum to 1, got {total}"),
        ));
    }
    Ok(())
}

fn check_sd(field: &str, sd: f64) -> SimResult<()> {
    if !sd.is_finite() || sd < 0.0 {
        return Err(SimError::invalid(
            field,
            format!("standard deviation must be >= 0, got {sd}"),
        ));
    }
    Ok(())
}

fn check_normal(field: &str, params: NormalParams) -> SimResult<()> {
    if !params.mean.is_finite() {
        return Err(SimError::invalid(field, "mean must be finite"));
    }
    check_sd(field, params.sd)
}

fn check_int_range(field: &str, range: IntRange, floor: u32) -> SimResult<()> {
    if range.min < floor || range.min > range.max {
        return Err(SimError::invalid(
            field,
            format!("expected {floor} <= min <= max, got {}..={}", range.min, range.max),
        ));
    }
    Ok(())
}

fn check_float_range(field: &str, range: FloatRange) -> SimResult<()> {
    if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
        return Err(SimError::invalid(
            field,
            format!("expected min <= max, got {}..={}", range.min, range.max),
        ));
    }
    Ok(())
}
