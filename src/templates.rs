//! Welcome email rendering.
//!
//! HTML bodies go through a registry that escapes every `{{var}}`; subject and
//! plain-text bodies use a second registry with escaping turned off. Both run
//! in strict mode, so a template referencing an unknown variable fails to render.

use anyhow::{Error, Result, anyhow};
use chrono::{DateTime, Utc};
use handlebars::{Handlebars, no_escape};
use serde::Serialize;
use tracing::debug;

const WELCOME_SUBJECT: &str = "Welcome to {{app_name}}";

const WELCOME_HTML: &str = r#"<h1>Welcome, {{username}}!</h1>
<p>Thank you for registering with <strong>{{app_name}}</strong>.</p>
<p>Here are your registration details:</p>
<ul>
    <li><strong>Username:</strong> {{username}}</li>
    <li><strong>Email:</strong> {{email}}</li>
    <li><strong>Phone Number:</strong> {{phone_number}}</li>
</ul>
<p>You registered on: {{registered_at}}</p>
<p>If you have any questions, feel free to contact our support team.</p>
<p>Best regards,<br>{{app_name}} Team</p>
"#;

const WELCOME_TEXT: &str = "Welcome, {{username}}!

Thank you for registering with {{app_name}}.

Here are your registration details:
  Username: {{username}}
  Email: {{email}}
  Phone Number: {{phone_number}}

You registered on: {{registered_at}}

If you have any questions, feel free to contact our support team.

Best regards,
{{app_name}} Team
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

pub struct WelcomeDetails<'a> {
    pub app_name: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub phone_number: Option<&'a str>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct WelcomeEmailData<'a> {
    app_name: &'a str,
    username: &'a str,
    email: &'a str,
    phone_number: &'a str,
    registered_at: String,
}

impl<'a> WelcomeEmailData<'a> {
    fn from_details(details: &WelcomeDetails<'a>) -> Self {
        let username = if details.username.trim().is_empty() {
            details.email
        } else {
            details.username
        };

        Self {
            app_name: details.app_name,
            username,
            email: details.email,
            phone_number: details
                .phone_number
                .filter(|phone| !phone.trim().is_empty())
                .unwrap_or("not provided"),
            registered_at: details
                .registered_at
                .format("%A, %B %-d, %Y %H:%M UTC")
                .to_string(),
        }
    }
}

pub struct TemplateEngine {
    html: Handlebars<'static>,
    text: Handlebars<'static>,
}

impl TemplateEngine {
    pub fn new() -> Result<Self, Error> {
        let mut html = Handlebars::new();
        html.set_strict_mode(true);
        html.register_template_string("welcome_html", WELCOME_HTML)
            .map_err(|e| anyhow!("Failed to register welcome_html: {}", e))?;

        let mut text = Handlebars::new();
        text.set_strict_mode(true);
        text.register_escape_fn(no_escape);
        text.register_template_string("welcome_subject", WELCOME_SUBJECT)
            .map_err(|e| anyhow!("Failed to register welcome_subject: {}", e))?;
        text.register_template_string("welcome_text", WELCOME_TEXT)
            .map_err(|e| anyhow!("Failed to register welcome_text: {}", e))?;

        Ok(Self { html, text })
    }

    pub fn render_welcome(&self, details: &WelcomeDetails<'_>) -> Result<RenderedEmail, Error> {
        let data = WelcomeEmailData::from_details(details);

        debug!(username = %data.username, "Rendering welcome email");

        Ok(RenderedEmail {
            subject: render(&self.text, "welcome_subject", &data)?,
            html_body: render(&self.html, "welcome_html", &data)?,
            text_body: render(&self.text, "welcome_text", &data)?,
        })
    }
}

fn render<T: Serialize>(registry: &Handlebars<'_>, name: &str, data: &T) -> Result<String, Error> {
    registry
        .render(name, data)
        .map_err(|e| anyhow!("Failed to render {}: {}", name, e))
}
