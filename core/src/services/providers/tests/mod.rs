//! Tests for the provider manager
