//! Shared primitive types used across the entire simulation.

/// A simulation week. Weeks are 1-based; week 1 is the only week in
/// which a customer can be labelled "New".
pub type Week = u32;

/// Customer identifier, 1..=N.
pub type CustomerId = u64;

/// Store identifier, e.g. `S001`.
pub type StoreId = String;

/// Campaign label as configured, e.g. `A`.
pub type CampaignId = String;

/// The canonical run identifier.
pub type RunId = String;
