//! Unit tests for the carrier adapters
