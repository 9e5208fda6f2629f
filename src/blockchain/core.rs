// core.rs splits ledger responsibilities into submodules.
pub mod chain;
pub mod pool;
pub mod validation;

pub use chain::*;
pub use pool::*;
pub use validation::*;
