use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::time::Duration;
use tracing::debug;

use super::Notifier;
use crate::config::TwilioConfig;
use crate::PlateError;
use crate::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// SMS through the Twilio Messages REST endpoint.
pub struct TwilioNotifier {
    agent: ureq::Agent,
    config: TwilioConfig,
}

impl TwilioNotifier {
    pub fn new(config: TwilioConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self { agent, config }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    fn authorization(&self) -> String {
        basic_auth(&self.config.account_sid, &self.config.auth_token)
    }
}

pub(crate) fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

impl Notifier for TwilioNotifier {
    fn send(&mut self, message: &str, destination: &str) -> Result<()> {
        let response = self
            .agent
            .post(&self.messages_url())
            .set("Authorization", &self.authorization())
            .send_form(&[
                ("To", destination),
                ("From", self.config.from_number.as_str()),
                ("Body", message),
            ]);

        match response {
            Ok(response) => {
                debug!(status = response.status(), %destination, "twilio accepted message");
                Ok(())
            }
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(PlateError::Http(format!("twilio returned {code}: {body}")))
            }
            Err(e) => Err(PlateError::Http(format!("twilio request failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TwilioConfig {
        TwilioConfig {
            account_sid: "AC123".to_string(),
            auth_token: "secret".to_string(),
            from_number: "+15550001111".to_string(),
            base_url: "https://api.twilio.com/".to_string(),
        }
    }

    #[test]
    fn messages_endpoint_is_per_account() {
        let notifier = TwilioNotifier::new(config());
        assert_eq!(
            notifier.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }

    #[test]
    fn authorization_is_basic_sid_and_token() {
        assert_eq!(basic_auth("AC123", "secret"), "Basic QUMxMjM6c2VjcmV0");
        assert_eq!(TwilioNotifier::new(config()).authorization(), "Basic QUMxMjM6c2VjcmV0");
    }

    #[test]
    fn unreachable_endpoint_is_an_http_error() {
        let mut notifier = TwilioNotifier::new(TwilioConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..config()
        });
        let result = notifier.send("hello", "+919876543210");
        assert!(matches!(result, Err(PlateError::Http(_))));
    }
}
