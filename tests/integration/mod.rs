//! Integration tests for the Canopy extension runtime

mod config_loading;
mod platform_lifecycle;
mod reconcile_policies;
mod resolver_offline;
mod state_store;
mod test_utils;
