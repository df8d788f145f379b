//! Tests for the rate limiter

mod limiter_tests;
