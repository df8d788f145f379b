//! Tests for the OTP service
