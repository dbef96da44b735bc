//! Webhook response for inbound calls: tell the telephony provider to
//! open a media stream back to this gateway.

use anyhow::{bail, Result};

/// Derive the media-stream WebSocket URL from the public HTTP base URL.
pub fn stream_url(public_url: &str) -> Result<String> {
    let base = public_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        bail!("Public URL must start with http:// or https://: {public_url}");
    };
    Ok(format!("{ws_base}/media-stream"))
}

/// TwiML document connecting the call to a bidirectional stream.
pub fn connect_stream(stream_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
    <Connect>
        <Stream url="{stream_url}" />
    </Connect>
</Response>"#
    )
}
