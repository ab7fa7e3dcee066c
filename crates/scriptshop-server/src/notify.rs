//! Best-effort outbound notifications.
//!
//! Three channels: chat webhooks (new-release broadcast, uploader download
//! alerts), a chat bot direct message, and an email relay. Every delivery
//! is independent; callers log failures and carry on.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use scriptshop_shared::protocol::{DeliveryResult, NotifyNewReleaseResponse};
use scriptshop_shared::{AuthProvider, Identity};

use crate::config::NotifySettings;

const THANKS_COLOR: u32 = 0x3b82f6;
const DOWNLOAD_ALERT_COLOR: u32 = 0x00ff00;
const WEBHOOK_TEST_COLOR: u32 = 0x0099ff;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("no recipient: {0}")]
    NoRecipient(&'static str),
}

// ---------------------------------------------------------------------------
// Embed format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
    #[serde(skip_serializing_if = "no_embeds")]
    embeds: &'a [Embed],
}

fn no_embeds(embeds: &&[Embed]) -> bool {
    embeds.is_empty()
}

#[derive(Debug, Deserialize)]
struct DmChannel {
    id: String,
}

/// How a thank-you message was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThanksChannel {
    DirectMessage,
    Email,
    Skipped,
}

/// What the uploader's download alert describes.
#[derive(Debug, Clone)]
pub struct DownloadAlert<'a> {
    pub downloaded_by: &'a str,
    pub item_name: &'a str,
    pub category: Option<&'a str>,
}

pub struct Notifier {
    http: reqwest::Client,
    settings: NotifySettings,
}

impl Notifier {
    pub fn new(settings: NotifySettings) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, settings })
    }

    /// Post the release announcement to every webhook concurrently. One
    /// recipient failing never affects another.
    pub async fn broadcast_new_release(
        &self,
        item_name: &str,
        webhooks: &[String],
    ) -> NotifyNewReleaseResponse {
        if webhooks.is_empty() {
            return NotifyNewReleaseResponse {
                success: true,
                message: "No users with Discord webhooks found".to_string(),
                successful: 0,
                failed: 0,
                results: Vec::new(),
            };
        }

        let content = release_message(item_name);
        let message = WebhookMessage {
            content: Some(&content),
            username: Some(&self.settings.bot_name),
            avatar_url: self.settings.bot_avatar_url.as_deref(),
            embeds: &[],
        };

        let deliveries = webhooks.iter().map(|url| {
            let message = &message;
            async move {
                match self.post_json(url, message).await {
                    Ok(()) => DeliveryResult {
                        success: true,
                        webhook: url.clone(),
                        error: None,
                    },
                    Err(e) => {
                        warn!(webhook = %url, error = %e, "Release notification failed");
                        DeliveryResult {
                            success: false,
                            webhook: url.clone(),
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
        });
        let results = join_all(deliveries).await;

        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;
        info!(item = %item_name, successful, failed, "Release notifications sent");

        NotifyNewReleaseResponse {
            success: true,
            message: format!("Discord notifications sent to {successful} users ({failed} failed)"),
            successful,
            failed,
            results,
        }
    }

    /// Thank the downloader: a direct message for chat-platform accounts,
    /// an email otherwise.
    pub async fn send_download_thanks(
        &self,
        identity: &Identity,
        item_name: &str,
        image_url: Option<&str>,
    ) -> Result<ThanksChannel, NotifyError> {
        match identity.provider {
            AuthProvider::Discord => {
                let recipient = identity
                    .provider_id
                    .as_deref()
                    .ok_or(NotifyError::NoRecipient("chat account id"))?;
                self.send_direct_message(recipient, &self.thanks_embed(item_name, image_url))
                    .await?;
                Ok(ThanksChannel::DirectMessage)
            }
            _ => match identity.email.as_deref() {
                Some(email) => {
                    self.send_email(
                        email,
                        &format!("Thank You for Downloading {item_name}!"),
                        &self.thanks_html(item_name, image_url),
                    )
                    .await?;
                    Ok(ThanksChannel::Email)
                }
                None => {
                    debug!(user = %identity.id, "No email address, skipping thank-you");
                    Ok(ThanksChannel::Skipped)
                }
            },
        }
    }

    /// Tell an uploader that one of their items was downloaded.
    pub async fn send_download_alert(
        &self,
        webhook: &str,
        alert: &DownloadAlert<'_>,
    ) -> Result<(), NotifyError> {
        let embed = Embed {
            title: "🎉 New Resource Download!".to_string(),
            description: "A resource has been downloaded from your FiveM store".to_string(),
            color: DOWNLOAD_ALERT_COLOR,
            fields: vec![
                EmbedField {
                    name: "👤 Downloaded by".to_string(),
                    value: alert.downloaded_by.to_string(),
                    inline: true,
                },
                EmbedField {
                    name: "📦 Resource".to_string(),
                    value: alert.item_name.to_string(),
                    inline: true,
                },
                EmbedField {
                    name: "🏷️ Category".to_string(),
                    value: alert.category.unwrap_or("Uncategorized").to_string(),
                    inline: true,
                },
            ],
            image: None,
            footer: None,
            timestamp: now_iso(),
        };
        self.post_embed(webhook, &embed).await
    }

    /// Post a test embed to a user's own webhook. A non-2xx reply is an error.
    pub async fn send_webhook_test(&self, webhook: &str) -> Result<(), NotifyError> {
        let embed = Embed {
            title: "🧪 Test Notification".to_string(),
            description: format!(
                "This is a test message from your {} store",
                self.settings.store_name
            ),
            color: WEBHOOK_TEST_COLOR,
            fields: vec![EmbedField {
                name: "Status".to_string(),
                value: "Webhook is working correctly!".to_string(),
                inline: false,
            }],
            image: None,
            footer: None,
            timestamp: now_iso(),
        };
        self.post_embed(webhook, &embed).await?;
        debug!(webhook, "Webhook test delivered");
        Ok(())
    }

    async fn post_embed(&self, webhook: &str, embed: &Embed) -> Result<(), NotifyError> {
        let message = WebhookMessage {
            content: None,
            username: None,
            avatar_url: None,
            embeds: std::slice::from_ref(embed),
        };
        self.post_json(webhook, &message).await
    }

    async fn send_direct_message(&self, recipient: &str, embed: &Embed) -> Result<(), NotifyError> {
        let token = self
            .settings
            .discord_bot_token
            .as_deref()
            .ok_or(NotifyError::NotConfigured("DISCORD_BOT_TOKEN"))?;
        let auth = format!("Bot {token}");
        let api = &self.settings.discord_api_url;

        let response = self
            .http
            .post(format!("{api}/users/@me/channels"))
            .header("authorization", &auth)
            .json(&serde_json::json!({ "recipient_id": recipient }))
            .send()
            .await?;
        let channel: DmChannel = check_status(response).await?.json().await?;

        let response = self
            .http
            .post(format!("{api}/channels/{}/messages", channel.id))
            .header("authorization", &auth)
            .json(&serde_json::json!({ "embeds": [embed] }))
            .send()
            .await?;
        check_status(response).await?;

        debug!(recipient, "Direct message sent");
        Ok(())
    }

    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<(), NotifyError> {
        let key = self
            .settings
            .email_api_key
            .as_deref()
            .ok_or(NotifyError::NotConfigured("EMAIL_API_KEY"))?;

        let response = self
            .http
            .post(format!("{}/emails", self.settings.email_api_url))
            .bearer_auth(key)
            .json(&serde_json::json!({
                "from": self.settings.email_from,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await?;
        check_status(response).await?;

        debug!(to, "Email sent");
        Ok(())
    }

    async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<(), NotifyError> {
        let response = self.http.post(url).json(body).send().await?;
        check_status(response).await?;
        Ok(())
    }

    fn thanks_embed(&self, item_name: &str, image_url: Option<&str>) -> Embed {
        Embed {
            title: "🎉 Thank You for Your Download!".to_string(),
            description: format!(
                "Thank you for downloading **{item_name}**!\n\nWe hope you enjoy using this script. \
                 If you have any questions or need support, feel free to reach out to us."
            ),
            color: THANKS_COLOR,
            fields: Vec::new(),
            image: image_url.map(|url| EmbedImage {
                url: url.to_string(),
            }),
            footer: Some(EmbedFooter {
                text: format!("Best regards from {} Team", self.settings.store_name),
            }),
            timestamp: now_iso(),
        }
    }

    fn thanks_html(&self, item_name: &str, image_url: Option<&str>) -> String {
        let name = escape_html(item_name);
        let preview = image_url
            .map(|url| {
                format!(
                    r#"<div class="preview"><img src="{}" alt="{} Preview" style="max-width:100%;border-radius:8px"></div>"#,
                    escape_html(url),
                    name
                )
            })
            .unwrap_or_default();
        format!(
            r#"<!DOCTYPE html>
<html>
  <body style="font-family:sans-serif;background:#f3f4f6;margin:0;padding:0">
    <div style="max-width:600px;margin:0 auto;background:#ffffff;border-radius:8px;overflow:hidden">
      <div style="background:#3b82f6;padding:40px 20px;text-align:center;color:#ffffff">
        <h1 style="margin:0">🎉 Thank You!</h1>
      </div>
      <div style="padding:40px 30px;color:#4b5563">
        <h2 style="color:#1f2937">Thank you for downloading {name}!</h2>
        <p>We're excited to have you using our script. We hope it meets all your expectations.</p>
        {preview}
        <p>If you have any questions, need support, or want to share feedback, please reach out to us.</p>
      </div>
      <div style="background:#f9fafb;padding:30px;text-align:center;color:#6b7280">
        <p>We appreciate your trust in our products!</p>
        <strong style="color:#3b82f6">Best regards from {store} Team</strong>
      </div>
    </div>
  </body>
</html>"#,
            store = escape_html(&self.settings.store_name),
        )
    }
}

fn release_message(item_name: &str) -> String {
    format!(
        "🎉 **DEAR CUSTOMER WE ARE HAPPY TO ANNOUNCE THAT THERE IS NEW RELEASE HAVE BEEN UPLOADED IN OUR STORE** 🎉\n\n\
         📦 **New Release:** {item_name}\n\nVisit our store to check it out!"
    )
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, NotifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(NotifyError::Status {
        status: status.as_u16(),
        body,
    })
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
