use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Externally settable stop request for a run.
///
/// Clones share the same flag. The first reason given wins.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
  token: CancellationToken,
  reason: Arc<OnceLock<String>>,
}

impl Interrupt {
  pub fn new() -> Self {
    Self::default()
  }

  /// Wrap an existing token, e.g. a child of a process-wide shutdown token.
  pub fn from_token(token: CancellationToken) -> Self {
    Self {
      token,
      reason: Arc::default(),
    }
  }

  pub fn trigger(&self, reason: impl Into<String>) {
    let _ = self.reason.set(reason.into());
    self.token.cancel();
  }

  pub fn is_triggered(&self) -> bool {
    self.token.is_cancelled()
  }

  pub fn reason(&self) -> String {
    self
      .reason
      .get()
      .cloned()
      .unwrap_or_else(|| "cancelled".to_string())
  }

  /// Resolves once the interrupt is triggered.
  pub async fn triggered(&self) {
    self.token.cancelled().await
  }
}
