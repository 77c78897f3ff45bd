pub mod builder;
pub mod executor;

pub use builder::TradeBuilder;
pub use executor::TradeExecutor;
