//! Campaign treatment consistency across a full run.

use campaign_sim_core::{
    campaign::{CampaignParams, TreatmentRule},
    config::SimConfig,
    engine::SimEngine,
    simulator::TransactionRecord,
};

fn run_records(config: SimConfig, seed: u64) -> Vec<TransactionRecord> {
    let engine = SimEngine::new(format!("treatment-{seed}"), seed, config).unwrap();
    let population = engine.build_population();
    engine
        .simulate_weeks(&population)
        .unwrap()
        .into_iter()
        .flat_map(|b| b.records)
        .collect()
}

fn large_test() -> SimConfig {
    let mut config = SimConfig::default_test();
    config.population.num_customers = 2_000;
    config.population.num_stores = 60;
    config
}

#[test]
fn each_campaign_only_uses_its_own_treatment() {
    for r in run_records(large_test(), 42) {
        let t = &r.treatment;
        match r.store.campaign_group.as_str() {
            "A" => {
                assert!(t.gift.is_none());
                assert!(!t.used_loyalty_or_voucher);
                assert!(t.discount == 0.0 || t.discount == 0.05);
            }
            "B" => {
                assert_eq!(t.discount, 0.0);
                assert!(!t.used_loyalty_or_voucher);
            }
            "C" => {
                assert!(t.gift.is_none());
                assert_eq!(t.used_loyalty_or_voucher, t.discount == 0.10);
                assert!(t.discount == 0.0 || t.discount == 0.10);
            }
            other => panic!("unexpected campaign {other}"),
        }
    }
}

#[test]
fn ineligible_rows_are_never_treated() {
    for r in run_records(large_test(), 8).iter().filter(|r| r.new_collection_items == 0) {
        assert_eq!(r.treatment.discount, 0.0);
        assert!(r.treatment.gift.is_none());
        assert!(!r.treatment.used_loyalty_or_voucher);
        assert!(!r.promo_used);
    }
}

#[test]
fn eligible_discount_and_gift_rows_are_always_treated() {
    for r in run_records(large_test(), 13).iter().filter(|r| r.new_collection_items > 0) {
        match r.store.campaign_group.as_str() {
            "A" => assert_eq!(r.treatment.discount, 0.05),
            "B" => assert!(r.treatment.gift.is_some()),
            _ => {}
        }
    }
}

#[test]
fn loyalty_trial_is_a_separate_coin_flip() {
    // Even with every product in the new collection, only about half of
    // campaign C's eligible rows win the loyalty/voucher trial.
    let mut config = large_test();
    config.set_all_campaigns(|c| c.collection_attach_rate = 1.0);

    let c_rows: Vec<_> = run_records(config, 55)
        .into_iter()
        .filter(|r| r.store.campaign_group == "C")
        .collect();
    assert!(c_rows.len() > 500, "need enough C rows, got {}", c_rows.len());
    let winners = c_rows.iter().filter(|r| r.treatment.used_loyalty_or_voucher).count();
    let share = winners as f64 / c_rows.len() as f64;
    assert!((0.4..0.6).contains(&share), "loyalty share {share:.3}");
}

#[test]
fn a_fourth_campaign_is_configuration_only() {
    let mut config = large_test();
    config.campaigns.push(CampaignParams {
        id: "D".into(),
        purchase_probability: 1.0,
        collection_attach_rate: 1.0,
        segment_new_probability: 0.5,
        average_unit_price: 50.0,
        treatment: TreatmentRule::Discount { rate: 0.2 },
    });
    for share in config.population.campaign_shares.iter_mut() {
        share.weight = 0.25;
    }
    config.population.campaign_shares.push(campaign_sim_core::config::WeightedLabel {
        label: "D".into(),
        weight: 0.25,
    });

    let d_rows: Vec<_> = run_records(config, 4)
        .into_iter()
        .filter(|r| r.store.campaign_group == "D")
        .collect();
    assert!(!d_rows.is_empty());
    assert!(d_rows.iter().all(|r| r.treatment.discount == 0.2 && r.promo_used));
}
