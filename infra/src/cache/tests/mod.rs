//! Unit tests for the Redis cache layer
