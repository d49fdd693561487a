//! Property-based tests for fingerprinting, normalization and section allocation

mod fingerprint;
