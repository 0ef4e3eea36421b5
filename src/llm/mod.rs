// Text and image provider layer

pub mod anthropic;
pub mod images;
pub mod openai;
pub mod provider;

#[cfg(test)]
pub(crate) mod testing;

pub use images::{GeneratedImage, ImageGenerator, OpenAIImageGenerator};
pub use provider::*;
