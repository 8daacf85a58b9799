//! End-to-end tests for the Kiln pipeline live in `tests/`.
