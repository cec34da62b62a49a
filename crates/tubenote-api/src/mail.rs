use serde::Serialize;
use tracing::{info, warn};

use crate::config::{Config, MailConfig};

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Delivers account emails. Without mail settings the message is only logged,
/// which is enough for local development.
pub enum Mailer {
    Log,
    Http {
        client: reqwest::Client,
        config: MailConfig,
    },
    #[cfg(test)]
    Capture(std::sync::Mutex<Vec<OutgoingMail>>),
}

#[derive(Serialize)]
struct MailApiRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl Mailer {
    pub fn from_config(config: &Config) -> Self {
        match &config.mail {
            Some(mail) => Self::Http {
                client: reqwest::Client::new(),
                config: mail.clone(),
            },
            None => Self::Log,
        }
    }

    pub async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        match self {
            Self::Log => {
                info!(to = %mail.to, subject = %mail.subject, "Mail transport not configured, logging instead:\n{}", mail.text);
                Ok(())
            }
            Self::Http { client, config } => {
                client
                    .post(&config.api_url)
                    .bearer_auth(&config.api_key)
                    .json(&MailApiRequest {
                        from: &config.from,
                        to: &mail.to,
                        subject: &mail.subject,
                        text: &mail.text,
                    })
                    .send()
                    .await?
                    .error_for_status()?;
                info!(to = %mail.to, subject = %mail.subject, "Mail sent");
                Ok(())
            }
            #[cfg(test)]
            Self::Capture(outbox) => {
                outbox.lock().unwrap().push(mail);
                Ok(())
            }
        }
    }

    /// Like `send`, but failures are only logged.
    pub async fn deliver(&self, mail: OutgoingMail) {
        let to = mail.to.clone();
        if let Err(e) = self.send(mail).await {
            warn!(to = %to, "Failed to send mail: {:#}", e);
        }
    }

    #[cfg(test)]
    pub fn sent(&self) -> Vec<OutgoingMail> {
        match self {
            Self::Capture(outbox) => outbox.lock().unwrap().clone(),
            _ => Vec::new(),
        }
    }
}

pub fn verification_mail(app_url: &str, to: &str, username: &str, token: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Verify your TubeNote email".into(),
        text: format!(
            "Hi {username},\n\n\
             Confirm your email address by opening this link:\n\n\
             {app_url}/verify-email?token={token}\n\n\
             The link expires in 24 hours. If you did not sign up for TubeNote, ignore this email.\n"
        ),
    }
}

pub fn password_reset_mail(app_url: &str, to: &str, username: &str, token: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Reset your TubeNote password".into(),
        text: format!(
            "Hi {username},\n\n\
             Someone asked to reset the password for your account. Choose a new one here:\n\n\
             {app_url}/reset-password?token={token}\n\n\
             The link expires in 1 hour. If it wasn't you, your password is unchanged.\n"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_carry_the_token() {
        let mail = verification_mail("https://tubenote.app", "a@example.com", "alice", "tok123");
        assert_eq!(mail.to, "a@example.com");
        assert!(mail.text.contains("https://tubenote.app/verify-email?token=tok123"));

        let mail = password_reset_mail("https://tubenote.app", "a@example.com", "alice", "tok456");
        assert!(mail.text.contains("https://tubenote.app/reset-password?token=tok456"));
    }

    #[tokio::test]
    async fn log_mailer_never_fails() {
        let mailer = Mailer::Log;
        let mail = verification_mail("http://localhost:3000", "a@example.com", "alice", "t");
        assert!(mailer.send(mail).await.is_ok());
    }
}
