pub mod converter;
pub mod mock;
pub mod openrouter;

pub use mock::{MockModel, MockResponse};
pub use openrouter::{ClientConfig, OpenRouterClient};
