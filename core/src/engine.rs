//! The simulation engine — one full dataset run.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Population builder     (stores stream, then assignment stream)
//!   2. Weekly simulator       (one stream per week, weeks in config order)
//!   3. Dataset assembler
//!   4. Sinks                  (only after the dataset is complete)
//!
//! RULES:
//!   - The customer table is read-only once built.
//!   - Each week fully materialises before the next begins.
//!   - All randomness flows through the RngBank.

use crate::{
    campaign::CampaignPolicy,
    config::SimConfig,
    dataset::{assemble, Dataset},
    error::SimResult,
    population::{build_population, Population},
    rng::RngBank,
    simulator::{WeekStats, WeeklyBatch, WeeklySimulator},
    sink::DatasetSink,
    types::RunId,
};

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: RunId,
    pub seed: u64,
    pub stores: usize,
    pub customers: usize,
    pub weeks: Vec<WeekStats>,
    pub total_rows: usize,
    pub total_revenue: f64,
}

pub struct RunOutput {
    pub population: Population,
    pub dataset: Dataset,
    pub summary: RunSummary,
}

pub struct SimEngine {
    pub run_id: RunId,
    pub rng_bank: RngBank,
    seed: u64,
    config: SimConfig,
    policy: CampaignPolicy,
}

impl SimEngine {
    /// Configs built in code are validated here as well as at load.
    pub fn new(run_id: RunId, seed: u64, config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        let policy = CampaignPolicy::new(config.campaigns.clone());
        Ok(Self {
            run_id,
            rng_bank: RngBank::new(seed),
            seed,
            config,
            policy,
        })
    }

    /// Small baseline engine for tests.
    pub fn build_test(run_id: RunId, seed: u64) -> SimResult<Self> {
        Self::new(run_id, seed, SimConfig::default_test())
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn build_population(&self) -> Population {
        build_population(&self.config.population, &self.rng_bank)
    }

    /// Simulate every configured week against a fixed population.
    pub fn simulate_weeks(&self, population: &Population) -> SimResult<Vec<WeeklyBatch>> {
        let simulator = WeeklySimulator::new(&self.policy, &self.config.behavior);
        let mut batches = Vec::with_capacity(self.config.weeks.len());
        for &week in &self.config.weeks {
            let mut rng = self.rng_bank.for_week(week);
            batches.push(simulator.simulate_week(week, &population.customers, &mut rng)?);
        }
        Ok(batches)
    }

    /// Generate the full dataset in memory. Nothing is written.
    pub fn run(&self) -> SimResult<RunOutput> {
        log::info!(
            "run={} seed={} weeks={:?} customers={} stores={}",
            self.run_id,
            self.seed,
            self.config.weeks,
            self.config.population.num_customers,
            self.config.population.num_stores
        );
        let population = self.build_population();
        let batches = self.simulate_weeks(&population)?;
        let dataset = assemble(&batches, &self.config.output.columns)?;

        let weeks: Vec<WeekStats> = batches.into_iter().map(|b| b.stats).collect();
        let summary = RunSummary {
            run_id: self.run_id.clone(),
            seed: self.seed,
            stores: population.stores.len(),
            customers: population.customers.len(),
            total_rows: dataset.len(),
            total_revenue: weeks.iter().map(|w| w.revenue).sum(),
            weeks,
        };
        Ok(RunOutput {
            population,
            dataset,
            summary,
        })
    }

    /// Run, then hand the finished dataset to each sink in order.
    /// Every sink is staged before any is committed; a staging failure
    /// aborts them all.
    pub fn run_to_sinks(&self, sinks: &mut [Box<dyn DatasetSink>]) -> SimResult<RunOutput> {
        let output = self.run()?;
        for i in 0..sinks.len() {
            log::debug!("run={} staging {} sink", self.run_id, sinks[i].name());
            if let Err(e) = sinks[i].stage(&output.dataset) {
                log::warn!("run={} {} sink failed: {e}", self.run_id, sinks[i].name());
                abort_all(sinks);
                return Err(e);
            }
        }
        for i in 0..sinks.len() {
            if let Err(e) = sinks[i].commit() {
                log::warn!("run={} {} sink commit failed: {e}", self.run_id, sinks[i].name());
                abort_all(&mut sinks[i..]);
                return Err(e);
            }
        }
        Ok(output)
    }
}

fn abort_all(sinks: &mut [Box<dyn DatasetSink>]) {
    for sink in sinks.iter_mut() {
        sink.abort();
    }
}
