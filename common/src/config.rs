pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Deployed ticket contract, fixed at startup and not user-editable at runtime
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0xc7dcddd4ac3c2a7df961d5ec8c93046e01f58026";
