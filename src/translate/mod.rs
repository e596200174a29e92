mod device;
mod process;
mod subprocess;

use async_trait::async_trait;

pub use device::Device;
pub use subprocess::SubprocessEngine;

use crate::language::Language;

/// A pretrained text-to-text translation model.
#[async_trait]
pub trait TranslationEngine: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> color_eyre::Result<String>;
}
