//! Campaign treatment policy.
//!
//! Each campaign label maps to its simulation parameters and one
//! treatment rule. Rules only ever fire for eligible transactions
//! (at least one new-collection item). Adding a campaign is a config
//! change: a new entry in the table, no new code path.

use crate::{
    error::{SimError, SimResult},
    rng::StreamRng,
    types::CampaignId,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignParams {
    pub id: CampaignId,
    /// Weekly purchase trial success rate.
    pub purchase_probability: f64,
    /// Per-product chance of being a new-collection item.
    pub collection_attach_rate: f64,
    /// Week-1 chance of a "New" segment label.
    pub segment_new_probability: f64,
    /// Centre of the unit price distribution.
    pub average_unit_price: f64,
    pub treatment: TreatmentRule,
}

impl CampaignParams {
    pub fn validate(&self) -> SimResult<()> {
        let field = |name: &str| format!("campaigns.{}.{name}", self.id);
        if self.id.trim().is_empty() {
            return Err(SimError::invalid("campaigns.id", "campaign label is empty"));
        }
        check_probability(&field("purchase_probability"), self.purchase_probability)?;
        check_probability(&field("collection_attach_rate"), self.collection_attach_rate)?;
        check_probability(&field("segment_new_probability"), self.segment_new_probability)?;
        if !self.average_unit_price.is_finite() || self.average_unit_price <= 0.0 {
            return Err(SimError::invalid(
                field("average_unit_price"),
                format!("must be positive, got {}", self.average_unit_price),
            ));
        }
        self.treatment.validate(&field("treatment"))
    }
}

/// The promotional effect a campaign applies to eligible transactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreatmentRule {
    /// Flat discount on every eligible transaction.
    Discount { rate: f64 },
    /// One gift drawn uniformly from the catalog; no discount.
    Gift { catalog: Vec<String> },
    /// Independent second trial; winners use loyalty/voucher and get `rate` off.
    LoyaltyDiscount { trial_probability: f64, rate: f64 },
}

impl TreatmentRule {
    pub fn validate(&self, field: &str) -> SimResult<()> {
        match self {
            Self::Discount { rate } => check_rate(&format!("{field}.rate"), *rate),
            Self::Gift { catalog } => {
                if catalog.is_empty() {
                    return Err(SimError::invalid(
                        format!("{field}.catalog"),
                        "gift catalog is empty",
                    ));
                }
                Ok(())
            }
            Self::LoyaltyDiscount {
                trial_probability,
                rate,
            } => {
                check_probability(&format!("{field}.trial_probability"), *trial_probability)?;
                check_rate(&format!("{field}.rate"), *rate)
            }
        }
    }

    /// Draw the treatment for one eligible transaction.
    /// `Discount` consumes no randomness; the other rules consume one draw.
    pub fn apply(&self, rng: &mut StreamRng) -> Treatment {
        match self {
            Self::Discount { rate } => Treatment {
                discount: *rate,
                ..Treatment::default()
            },
            Self::Gift { catalog } => Treatment {
                gift: Some(rng.pick(catalog).clone()),
                ..Treatment::default()
            },
            Self::LoyaltyDiscount {
                trial_probability,
                rate,
            } => {
                if rng.chance(*trial_probability) {
                    Treatment {
                        discount: *rate,
                        gift: None,
                        used_loyalty_or_voucher: true,
                    }
                } else {
                    Treatment::default()
                }
            }
        }
    }
}

/// Promotional fields of one transaction. The default is "untreated".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Treatment {
    pub discount: f64,
    pub gift: Option<String>,
    pub used_loyalty_or_voucher: bool,
}

impl Treatment {
    pub fn promo_used(&self) -> bool {
        self.discount > 0.0 || self.gift.is_some()
    }
}

/// Eligibility gate shared by every campaign.
pub fn is_eligible(new_collection_items: u32) -> bool {
    new_collection_items > 0
}

/// Ordered lookup table: campaign label → parameters.
/// Table order is also the order campaigns are processed in a week.
#[derive(Debug, Clone)]
pub struct CampaignPolicy {
    campaigns: Vec<CampaignParams>,
}

impl CampaignPolicy {
    pub fn new(campaigns: Vec<CampaignParams>) -> Self {
        Self { campaigns }
    }

    pub fn get(&self, label: &str) -> SimResult<&CampaignParams> {
        self.campaigns
            .iter()
            .find(|c| c.id == label)
            .ok_or_else(|| SimError::UnknownCampaign {
                label: label.to_string(),
            })
    }

    pub fn index_of(&self, label: &str) -> SimResult<usize> {
        self.campaigns
            .iter()
            .position(|c| c.id == label)
            .ok_or_else(|| SimError::UnknownCampaign {
                label: label.to_string(),
            })
    }

    pub fn by_index(&self, index: usize) -> &CampaignParams {
        &self.campaigns[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &CampaignParams> {
        self.campaigns.iter()
    }
}

pub(crate) fn check_probability(field: &str, p: f64) -> SimResult<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(SimError::invalid(
            field,
            format!("probability must be within [0, 1], got {p}"),
        ));
    }
    Ok(())
}

fn check_rate(field: &str, rate: f64) -> SimResult<()> {
    if !(0.0..1.0).contains(&rate) {
        return Err(SimError::invalid(
            field,
            format!("discount rate must be within [0, 1), got {rate}"),
        ));
    }
    Ok(())
}
