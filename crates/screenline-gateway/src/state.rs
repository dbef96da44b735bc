//! Shared gateway state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use screenline_core::config::Config;

use crate::call_control::{CallControl, NoopCallControl, TwilioCallControl};

/// State shared across all HTTP and WebSocket handlers.
pub struct GatewayState {
    pub config: Config,
    pub call_control: Arc<dyn CallControl>,
    /// Active calls, keyed by call SID, value is the stream SID.
    calls: RwLock<HashMap<String, String>>,
}

impl GatewayState {
    pub fn new(config: Config) -> Self {
        let call_control: Arc<dyn CallControl> = match config
            .telephony
            .as_ref()
            .and_then(TwilioCallControl::from_config)
        {
            Some(control) => Arc::new(control),
            None => Arc::new(NoopCallControl),
        };
        Self {
            config,
            call_control,
            calls: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register_call(&self, call_sid: &str, stream_sid: &str) {
        self.calls
            .write()
            .await
            .insert(call_sid.to_string(), stream_sid.to_string());
    }

    pub async fn unregister_call(&self, call_sid: &str) {
        self.calls.write().await.remove(call_sid);
    }

    pub async fn active_calls(&self) -> usize {
        self.calls.read().await.len()
    }
}
