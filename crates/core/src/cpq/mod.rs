pub mod catalog;
pub mod pricing;

pub use catalog::{Catalog, CatalogError};
pub use pricing::{
    compute_totals, price_with_trace, selection_report, DeterministicPricingEngine, PricingConfig,
    PricingEngine, PricingResult, PricingTrace, PricingTraceStep, SelectionReport,
};
