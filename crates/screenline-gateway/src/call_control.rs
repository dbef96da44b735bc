//! Terminating a call from our side via the telephony REST API.

use async_trait::async_trait;
use tracing::{info, warn};

use screenline_core::config::TelephonyConfig;

/// Seam for hanging up a call. The bridge only ever asks for
/// termination; how (or whether) that reaches a provider is behind
/// this trait.
#[async_trait]
pub trait CallControl: Send + Sync {
    /// Request termination of the given call. Best-effort: failures
    /// are logged, never retried, and never propagate to the bridge.
    async fn terminate(&self, call_sid: &str);
}

/// REST-backed termination: updates the call resource to `completed`.
pub struct TwilioCallControl {
    client: reqwest::Client,
    api_url: String,
    account_sid: String,
    auth_token: String,
}

impl TwilioCallControl {
    /// Build from config, or `None` when credentials are missing.
    pub fn from_config(config: &TelephonyConfig) -> Option<Self> {
        let account_sid = config.account_sid.clone()?;
        let auth_token = config.resolve_auth_token()?;
        Some(Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            account_sid,
            auth_token,
        })
    }
}

#[async_trait]
impl CallControl for TwilioCallControl {
    async fn terminate(&self, call_sid: &str) {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.api_url.trim_end_matches('/'),
            self.account_sid,
            call_sid
        );
        let result = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Status", "completed")])
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                info!(call_sid = %call_sid, "Call terminated");
            }
            Ok(resp) => {
                warn!(call_sid = %call_sid, status = %resp.status(), "Call termination rejected");
            }
            Err(e) => {
                warn!(call_sid = %call_sid, %e, "Call termination request failed");
            }
        }
    }
}

/// Used when no telephony credentials are configured. The provider
/// still closes the stream once the caller hangs up, so calls end;
/// they just cannot be cut short from our side.
pub struct NoopCallControl;

#[async_trait]
impl CallControl for NoopCallControl {
    async fn terminate(&self, call_sid: &str) {
        warn!(call_sid = %call_sid, "No telephony credentials; cannot terminate call");
    }
}
