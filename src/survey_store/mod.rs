//! Survey store module: the system of record for recordings, classification
//! outcomes, field observations and taxonomy rows.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::*;
pub use store::SqliteSurveyStore;
pub use trait_def::{
    ObservationStore, OutcomeStore, RecordingStore, StoreError, TaxonomyStore,
};
