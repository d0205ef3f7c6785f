// tara-common/src/traits/prompt_traits.rs

use async_trait::async_trait;
use crate::error::Error;

/// The human in the loop during interactive procedures such as calibration.
#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    /// Shows an instruction without waiting.
    fn announce(&self, message: &str);

    /// Shows `message` and resolves once the operator confirms.
    async fn wait_for_enter(&self, message: &str) -> Result<(), Error>;
}
