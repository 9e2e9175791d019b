//! Integration tests against a real Claude Code CLI.
//!
//! Run with `cargo test --features integration-tests --test integration`.
//! These make API calls and need an authenticated CLI on `PATH`.

mod test_live;
