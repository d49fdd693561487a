//! Integration tests for the examforge pipeline

mod test_utils;

mod batch;
mod cache_ttl;
mod config_integration;
mod persistence;
mod pipeline_dedup;
mod scenarios;
mod validation;
