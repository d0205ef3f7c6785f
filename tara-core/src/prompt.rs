// tara-core/src/prompt.rs

use std::sync::Mutex;
use std::time::Duration;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use tara_common::traits::OperatorPrompt;
use crate::Error;

/// Talks to the operator on the terminal.
pub struct StdinPrompt;

#[async_trait]
impl OperatorPrompt for StdinPrompt {
    fn announce(&self, message: &str) {
        println!("{message}");
    }

    async fn wait_for_enter(&self, message: &str) -> Result<(), Error> {
        println!("{message}");
        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
        Ok(())
    }
}

/// Confirms every prompt after a fixed delay. Used for mock devices and
/// tests, where the delay stands in for the operator moving the arm.
pub struct ScriptedPrompt {
    delay: Duration,
    transcript: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(delay: Duration) -> Self {
        Self { delay, transcript: Mutex::new(Vec::new()) }
    }

    /// Every message shown so far.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn record(&self, message: &str) {
        if let Ok(mut t) = self.transcript.lock() {
            t.push(message.to_string());
        }
    }
}

#[async_trait]
impl OperatorPrompt for ScriptedPrompt {
    fn announce(&self, message: &str) {
        info!("{}", message);
        self.record(message);
    }

    async fn wait_for_enter(&self, message: &str) -> Result<(), Error> {
        info!("{} (auto-confirm in {:?})", message, self.delay);
        self.record(message);
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
