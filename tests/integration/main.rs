//! Integration test harness

mod ingest_tests;
