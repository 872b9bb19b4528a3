use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::EmailSettings;

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Email API is not configured")]
    NotConfigured,
    #[error("Email request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Email API returned {0}")]
    Api(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Transactional email over the provider's HTTP API
#[derive(Clone)]
pub struct EmailService {
    client: Client,
    base_url: String,
    api_key: String,
    from_address: String,
}

impl std::fmt::Debug for EmailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailService")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl EmailService {
    pub fn new(settings: &EmailSettings) -> Result<Self, EmailError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            from_address: settings.from_address.clone(),
        })
    }

    pub async fn send(&self, to: &str, message: &EmailMessage) -> Result<(), EmailError> {
        if self.api_key.is_empty() {
            return Err(EmailError::NotConfigured);
        }

        let body = SendEmailBody {
            from: &self.from_address,
            to: [to],
            subject: &message.subject,
            html: &message.html,
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!("Email API error {}: {}", status, detail);
            return Err(EmailError::Api(status.as_u16()));
        }

        info!("Sent email \"{}\"", message.subject);
        Ok(())
    }

    /// Send without failing the caller; delivery problems are only logged
    pub async fn send_best_effort(&self, to: &str, message: &EmailMessage) {
        if let Err(e) = self.send(to, message).await {
            warn!("Email \"{}\" not sent: {}", message.subject, e);
        }
    }
}

/// Escape text interpolated into email HTML
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!doctype html><html lang=\"fr\"><body style=\"font-family:sans-serif;color:#1f2937\">\
         <h1 style=\"font-size:20px\">{}</h1>{}\
         <p style=\"color:#6b7280;font-size:12px\">Vous recevez cet e-mail car vous avez un compte sur notre application de coaching.</p>\
         </body></html>",
        escape_html(title),
        body
    )
}

pub mod templates {
    use super::{escape_html, layout, EmailMessage};

    pub fn subscription_confirmation(first_name: Option<&str>, app_url: &str) -> EmailMessage {
        let greeting = match first_name {
            Some(name) => format!("Bonjour {},", escape_html(name)),
            None => "Bonjour,".to_string(),
        };
        EmailMessage {
            subject: "Votre abonnement est actif".to_string(),
            html: layout(
                "Bienvenue dans l'abonnement Premium",
                &format!(
                    "<p>{}</p><p>Votre abonnement est maintenant actif : vos coachs IA et vos programmes hebdomadaires sont disponibles sans limite.</p>\
                     <p><a href=\"{}/dashboard\">Accéder à mon tableau de bord</a></p>",
                    greeting,
                    escape_html(app_url)
                ),
            ),
        }
    }

    pub fn password_recovery(action_link: &str) -> EmailMessage {
        EmailMessage {
            subject: "Réinitialisation de votre mot de passe".to_string(),
            html: layout(
                "Réinitialisation du mot de passe",
                &format!(
                    "<p>Un administrateur a demandé la réinitialisation de votre mot de passe.</p>\
                     <p><a href=\"{}\">Choisir un nouveau mot de passe</a></p>\
                     <p>Si vous n'êtes pas à l'origine de cette demande, ignorez cet e-mail.</p>",
                    escape_html(action_link)
                ),
            ),
        }
    }

    pub fn account_deleted() -> EmailMessage {
        EmailMessage {
            subject: "Votre compte a été supprimé".to_string(),
            html: layout(
                "Compte supprimé",
                "<p>Votre compte et l'ensemble de vos données ont été supprimés. Votre abonnement éventuel a été résilié.</p>\
                 <p>Merci de nous avoir fait confiance.</p>",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<script>alert('x')</script> & co"),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; co"
        );
    }

    #[test]
    fn test_subscription_template_escapes_name() {
        let message = templates::subscription_confirmation(Some("<b>Zoé</b>"), "https://app.example.fr");
        assert!(message.html.contains("Bonjour &lt;b&gt;Zoé&lt;/b&gt;,"));
        assert!(message.html.contains("https://app.example.fr/dashboard"));
    }

    #[test]
    fn test_recovery_template_contains_link() {
        let message = templates::password_recovery("https://auth.example.fr/verify?token=abc&type=recovery");
        assert!(message
            .html
            .contains("https://auth.example.fr/verify?token=abc&amp;type=recovery"));
    }
}
