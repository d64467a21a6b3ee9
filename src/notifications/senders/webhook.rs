use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use tera::{Context, Tera};

use super::{NotificationSender, SenderError};
use crate::notifications::models::ChannelConfig;

/// Delivers alerts to a user-configured HTTP endpoint. GET requests carry
/// nothing beyond what the configured URL encodes; POST requests render a
/// body from the channel's template, which sees the alert text as `message`
/// plus the monitor snapshot fields from the dispatch context.
pub struct WebhookSender {
    client: Client,
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookSender {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

fn parse_method(method: &str) -> Result<Method, SenderError> {
    match method.to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        other => Err(SenderError::InvalidConfiguration(format!(
            "Webhook method must be GET or POST, got {other}"
        ))),
    }
}

fn header_map_from_config(headers: &HashMap<String, String>) -> Result<HeaderMap, SenderError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            SenderError::InvalidConfiguration(format!("Bad header name {name:?}: {e}"))
        })?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| SenderError::InvalidConfiguration(format!("Bad header value: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// Renders the POST body. A channel without a template sends the alert text
/// as-is.
fn render_body(
    template: Option<&str>,
    message: &str,
    context: &HashMap<String, String>,
) -> Result<String, SenderError> {
    let Some(template) = template else {
        return Ok(message.to_string());
    };
    let mut tera_context = Context::new();
    tera_context.insert("message", message);
    for (key, value) in context {
        tera_context.insert(key, value);
    }
    Tera::one_off(template, &tera_context, true)
        .map_err(|e| SenderError::TemplatingError(e.to_string()))
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError> {
        let ChannelConfig::Webhook {
            url,
            method,
            headers,
            body_template,
        } = config
        else {
            return Err(SenderError::InvalidConfiguration(
                "Webhook sender received a non-webhook channel config".to_string(),
            ));
        };

        let method = parse_method(method)?;
        let mut request = self.client.request(method.clone(), url);
        if let Some(headers) = headers {
            request = request.headers(header_map_from_config(headers)?);
        }
        if method == Method::POST {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(render_body(body_template.as_deref(), message, context)?);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SenderError::SendFailed(format!(
                "Webhook endpoint returned {status}: {body}"
            )));
        }
        Ok(())
    }
}
