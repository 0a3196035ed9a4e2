//! Message templates and the settings they depend on.

use crate::error::SubmitError;
use crate::message::{EmailMessage, MessageKind, TemplateArgs};

/// Sender identity and link base shared by all templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSettings {
    /// `From` header used for every message.
    pub from: String,
    /// Base URL of the frontend, without a trailing slash.
    pub frontend_url: String,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            from: "Auth App <auth@localhost>".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
        }
    }
}

impl MailSettings {
    /// Read `MAIL_FROM` (or `MAIL_DOMAIN`) and `FRONTEND_URL`.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let from = lookup("MAIL_FROM")
            .or_else(|| lookup("MAIL_DOMAIN").map(|domain| format!("Auth App <auth@{}>", domain)))
            .unwrap_or(defaults.from);
        let frontend_url = lookup("FRONTEND_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.frontend_url);
        Self { from, frontend_url }
    }
}

fn required<'a>(args: &'a TemplateArgs, name: &'static str) -> Result<&'a str, SubmitError> {
    args.get(name)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
        .ok_or(SubmitError::MissingArgument(name))
}

/// Render `kind` for `to`.
pub fn render(
    kind: MessageKind,
    to: &str,
    args: &TemplateArgs,
    settings: &MailSettings,
) -> Result<EmailMessage, SubmitError> {
    match kind {
        MessageKind::Verification => Ok(verification(to, required(args, "code")?)),
        MessageKind::PasswordReset => Ok(password_reset(
            to,
            required(args, "token")?,
            &settings.frontend_url,
        )),
    }
}

pub fn verification(to: &str, code: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "Verify your email".to_string(),
        html: format!("<p>Your verification code is: <strong>{}</strong></p>", code),
    }
}

pub fn password_reset(to: &str, token: &str, frontend_url: &str) -> EmailMessage {
    let reset_link = format!("{}/reset-password?token={}", frontend_url, token);
    EmailMessage {
        to: to.to_string(),
        subject: "Reset your password".to_string(),
        html: format!(
            "<p>Click the link below to reset your password: <a href=\"{}\">Click here</a></p>",
            reset_link
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> TemplateArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn verification_embeds_code() {
        let msg = render(
            MessageKind::Verification,
            "a@example.com",
            &args(&[("code", "482913")]),
            &MailSettings::default(),
        )
        .unwrap();
        assert_eq!(msg.to, "a@example.com");
        assert_eq!(msg.subject, "Verify your email");
        assert!(msg.html.contains("<strong>482913</strong>"));
    }

    #[test]
    fn password_reset_links_to_frontend() {
        let settings = MailSettings::from_lookup(|var| match var {
            "FRONTEND_URL" => Some("https://app.example.com/".to_string()),
            _ => None,
        });
        let msg = render(
            MessageKind::PasswordReset,
            "a@example.com",
            &args(&[("token", "t0k3n")]),
            &settings,
        )
        .unwrap();
        assert_eq!(msg.subject, "Reset your password");
        assert!(
            msg.html
                .contains("href=\"https://app.example.com/reset-password?token=t0k3n\"")
        );
    }

    #[test]
    fn missing_or_empty_argument_is_rejected() {
        let settings = MailSettings::default();
        assert!(matches!(
            render(MessageKind::Verification, "a@example.com", &args(&[]), &settings),
            Err(SubmitError::MissingArgument("code"))
        ));
        assert!(matches!(
            render(
                MessageKind::PasswordReset,
                "a@example.com",
                &args(&[("token", "")]),
                &settings
            ),
            Err(SubmitError::MissingArgument("token"))
        ));
    }

    #[test]
    fn sender_falls_back_to_mail_domain() {
        let settings = MailSettings::from_lookup(|var| match var {
            "MAIL_DOMAIN" => Some("example.com".to_string()),
            _ => None,
        });
        assert_eq!(settings.from, "Auth App <auth@example.com>");
        assert_eq!(settings.frontend_url, "http://localhost:3000");
    }
}
