//! End-to-end tests for the IoT Foundation client live under `tests/`.
