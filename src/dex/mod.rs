pub mod quoter;
pub mod router;
pub mod traits;

pub use quoter::UniswapQuoter;
pub use router::SwapRouterClient;
pub use traits::{Broadcaster, PricingEngine};
