// src/notify/email.rs
use anyhow::{Context, Result};
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{Address, AsyncTransport, Tokio1Executor};
use std::time::Duration;

use super::{Digest, Notifier};
use crate::config::WebhookConfig;

pub const SMTP_TIMEOUT: Duration = Duration::from_secs(30);
pub const SENDER_NAME: &str = "TrendRadar";
/// Titles per group in the HTML body.
pub const HTML_TITLES_PER_GROUP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Plain connect, then STARTTLS.
    StartTls,
    /// TLS from the first byte (SMTPS).
    Implicit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpEndpoint {
    pub host: String,
    pub port: u16,
    pub security: SmtpSecurity,
}

/// Known providers keyed by sender domain.
const SMTP_PRESETS: &[(&str, &str, u16, SmtpSecurity)] = &[
    ("gmail.com", "smtp.gmail.com", 587, SmtpSecurity::StartTls),
    ("qq.com", "smtp.qq.com", 465, SmtpSecurity::Implicit),
    ("outlook.com", "smtp-mail.outlook.com", 587, SmtpSecurity::StartTls),
    ("hotmail.com", "smtp-mail.outlook.com", 587, SmtpSecurity::StartTls),
    ("live.com", "smtp-mail.outlook.com", 587, SmtpSecurity::StartTls),
    ("163.com", "smtp.163.com", 465, SmtpSecurity::Implicit),
    ("126.com", "smtp.126.com", 465, SmtpSecurity::Implicit),
    ("sina.com", "smtp.sina.com", 465, SmtpSecurity::Implicit),
    ("sohu.com", "smtp.sohu.com", 465, SmtpSecurity::Implicit),
    ("189.cn", "smtp.189.cn", 465, SmtpSecurity::Implicit),
    ("aliyun.com", "smtp.aliyun.com", 465, SmtpSecurity::StartTls),
];

/// Explicit server and port win (587 means STARTTLS, anything else implicit TLS),
/// then the preset for the sender's domain, then `smtp.<domain>:587`.
pub fn resolve_smtp(from: &str, server: Option<&str>, port: Option<u16>) -> SmtpEndpoint {
    if let (Some(host), Some(port)) = (server.map(str::trim).filter(|s| !s.is_empty()), port) {
        let security = if port == 587 {
            SmtpSecurity::StartTls
        } else {
            SmtpSecurity::Implicit
        };
        return SmtpEndpoint {
            host: host.to_string(),
            port,
            security,
        };
    }

    let domain = from.rsplit('@').next().unwrap_or(from).to_lowercase();
    if let Some((_, host, port, security)) = SMTP_PRESETS.iter().find(|(d, ..)| *d == domain) {
        return SmtpEndpoint {
            host: host.to_string(),
            port: *port,
            security: *security,
        };
    }
    SmtpEndpoint {
        host: format!("smtp.{domain}"),
        port: 587,
        security: SmtpSecurity::StartTls,
    }
}

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub from: String,
    pub password: String,
    pub to: Vec<String>,
    pub endpoint: SmtpEndpoint,
}

impl EmailSettings {
    /// `None` unless sender, password and at least one recipient are present.
    pub fn from_webhooks(hooks: &WebhookConfig) -> Option<Self> {
        let from = hooks.email_from.trim();
        let password = hooks.email_password.trim();
        let to: Vec<String> = hooks
            .email_to
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if from.is_empty() || password.is_empty() || to.is_empty() {
            return None;
        }
        let endpoint = resolve_smtp(from, Some(&hooks.email_smtp_server), hooks.email_smtp_port);
        Some(Self {
            from: from.to_string(),
            password: password.to_string(),
            to,
            endpoint,
        })
    }
}

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    pub fn new(settings: EmailSettings) -> Result<Self> {
        let ep = &settings.endpoint;
        let builder = match ep.security {
            SmtpSecurity::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&ep.host),
            SmtpSecurity::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&ep.host),
        }
        .with_context(|| format!("invalid SMTP host {}", ep.host))?;

        let creds = Credentials::new(settings.from.clone(), settings.password.clone());
        let mailer = builder
            .port(ep.port)
            .credentials(creds)
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        let from_addr: Address = settings
            .from
            .parse()
            .with_context(|| format!("invalid sender address {}", settings.from))?;
        let from = Mailbox::new(Some(SENDER_NAME.to_string()), from_addr);
        let to = settings
            .to
            .iter()
            .map(|a| a.parse::<Mailbox>().with_context(|| format!("invalid recipient {a}")))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(host = %ep.host, port = ep.port, security = ?ep.security, recipients = to.len(), "email channel ready");
        Ok(Self { mailer, from, to })
    }

    pub fn build_message(&self, digest: &Digest) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(digest.headline());
        for rcpt in &self.to {
            builder = builder.to(rcpt.clone());
        }
        builder
            .multipart(MultiPart::alternative_plain_html(
                digest.text.clone(),
                render_html(digest),
            ))
            .context("build email")
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, digest: &Digest) -> Result<()> {
        let msg = self.build_message(digest)?;
        self.mailer.send(msg).await.context("send email")?;
        metrics::counter!("notify_batches_sent_total", "channel" => "email").increment(1);
        Ok(())
    }
}

/// Minimal HTML rendering of the digest, every dynamic string escaped.
pub fn render_html(digest: &Digest) -> String {
    use html_escape::{encode_double_quoted_attribute, encode_safe};

    let mut html = String::from(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>TrendRadar</title></head>\n<body style=\"font-family:sans-serif\">\n",
    );
    html.push_str(&format!(
        "<h2>TrendRadar report</h2>\n<p>Report type: {} &middot; Generated: {} &middot; Total titles: {}</p>\n",
        encode_safe(&digest.report_type),
        digest.generated_at.format("%Y-%m-%d %H:%M:%S"),
        digest.total_titles
    ));

    for stat in &digest.stats {
        html.push_str(&format!(
            "<h3>{} <small>({}, {:.2}%)</small></h3>\n<ol>\n",
            encode_safe(&stat.word),
            stat.count,
            stat.percentage
        ));
        for t in stat.titles.iter().take(HTML_TITLES_PER_GROUP) {
            let rank = t.best_rank().map(|r| format!(" [{r}]")).unwrap_or_default();
            let title = if t.url.is_empty() {
                encode_safe(&t.title).into_owned()
            } else {
                format!(
                    "<a href=\"{}\">{}</a>",
                    encode_double_quoted_attribute(&t.url),
                    encode_safe(&t.title)
                )
            };
            html.push_str(&format!(
                "<li>[{}] {}{}</li>\n",
                encode_safe(&t.source_name),
                title,
                rank
            ));
        }
        html.push_str("</ol>\n");
    }

    if !digest.failed_ids.is_empty() {
        let ids: Vec<String> = digest
            .failed_ids
            .iter()
            .map(|id| encode_safe(id).into_owned())
            .collect();
        html.push_str(&format!("<p>Failed sources: {}</p>\n", ids.join(", ")));
    }
    html.push_str("</body></html>\n");
    html
}
