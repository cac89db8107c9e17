//! LINE Notify style HTTP notifier.
//!
//! One form-encoded POST per message, authorized with a bearer token.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use url::Url;

use super::{Notifier, NotifyToken};

pub const DEFAULT_NOTIFY_ENDPOINT: &str = "https://notify-api.line.me/api/notify";
pub const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 10_000;

pub struct LineNotifier {
    endpoint: Url,
    agent: ureq::Agent,
}

impl LineNotifier {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = parse_endpoint(endpoint)?;
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self { endpoint, agent })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Notifier for LineNotifier {
    fn name(&self) -> &'static str {
        "line"
    }

    fn notify(&self, message: &str, token: &NotifyToken) -> Result<()> {
        let auth = format!("Bearer {}", token.expose());
        match self
            .agent
            .post(self.endpoint.as_str())
            .set("Authorization", &auth)
            .send_form(&[("message", message)])
        {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, _)) => Err(anyhow!(
                "notify endpoint {} answered HTTP {}",
                self.endpoint,
                code
            )),
            Err(err) => Err(err).with_context(|| format!("post to {}", self.endpoint)),
        }
    }
}

/// Accept only absolute http(s) URLs.
pub(crate) fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint).with_context(|| format!("parse notify endpoint {}", endpoint))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow!(
            "unsupported notify endpoint scheme '{}'; expected http(s)",
            other
        )),
    }
}
