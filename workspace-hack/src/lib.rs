// This is a dummy lib.rs managed by `cargo hakari`. See the crate's
// Cargo.toml for the unified dependency set.
