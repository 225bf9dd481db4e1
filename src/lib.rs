pub mod blob_store;
pub mod classifier;
pub mod config;
pub mod jobs;
pub mod matcher;
pub mod normalizer;
pub mod report;
pub mod sqlite_persistence;
pub mod survey_store;
