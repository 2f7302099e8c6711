//! Chatbot relay to an OpenAI-compatible chat-completions endpoint.
//!
//! A broken or slow upstream never fails the request: the user gets a short
//! apology instead.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::error::{AppError, AppResult};
use crate::session::SessionContext;

const SYSTEM_PREAMBLE: &str = "You are BookGenie, the assistant of an online bookstore. \
Help readers find books, authors and recommendations. Keep answers short and friendly.";

pub const FALLBACK_REPLY: &str =
    "Sorry, BookGenie is having trouble answering right now. Please try again in a moment.";

pub const EMPTY_MESSAGE_REPLY: &str =
    "Ask me about a book, an author or a genre and I will find something for you.";

#[derive(Clone)]
pub struct ChatRelay {
    client: Client,
    config: ChatConfig,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatRelay {
    pub fn new(config: ChatConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(ChatRelay { client, config })
    }

    pub async fn relay(&self, context: &SessionContext, message: &str) -> AppResult<String> {
        if self.config.require_login {
            context.require_identity()?;
        }
        let message = message.trim();
        let Some(url) = self.config.api_url.as_deref() else {
            return Ok(format!("You said: {message}. (Genie replying!)"));
        };
        if message.is_empty() {
            return Ok(EMPTY_MESSAGE_REPLY.to_string());
        }

        match self.complete(url, message).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                log::warn!("chat relay falling back: {}", e);
                Ok(FALLBACK_REPLY.to_string())
            }
        }
    }

    async fn complete(&self, url: &str, message: &str) -> AppResult<String> {
        let payload = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                Message { role: "system", content: SYSTEM_PREAMBLE },
                Message { role: "user", content: message },
            ],
        };

        let mut request = self.client.post(url).json(&payload);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalService(format!("upstream returned {status}")));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("unreadable response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AppError::ExternalService("response had no content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::tests::member;
    use actix_web::{web, App, HttpResponse, HttpServer};
    use serde_json::{json, Value};

    fn relay(api_url: Option<String>, require_login: bool) -> ChatRelay {
        ChatRelay::new(ChatConfig {
            api_url,
            api_key: Some("test-key".into()),
            timeout_secs: 2,
            require_login,
            ..ChatConfig::default()
        })
        .unwrap()
    }

    async fn fake_completion(body: web::Json<Value>) -> HttpResponse {
        let user = body["messages"][1]["content"].as_str().unwrap_or_default().to_string();
        HttpResponse::Ok().json(json!({
            "choices": [{ "message": { "role": "assistant", "content": format!("Try Dune, {user}") } }]
        }))
    }

    #[actix_web::test]
    async fn echoes_without_upstream() {
        let reply = relay(None, false)
            .relay(&SessionContext::default(), "hello")
            .await
            .unwrap();
        assert_eq!(reply, "You said: hello. (Genie replying!)");
    }

    #[actix_web::test]
    async fn empty_message_still_gets_a_reply() {
        let echo = relay(None, false).relay(&SessionContext::default(), "  ").await.unwrap();
        assert_eq!(echo, "You said: . (Genie replying!)");

        let upstream = relay(Some("http://127.0.0.1:9/v1/chat/completions".into()), false);
        let reply = upstream.relay(&SessionContext::default(), "").await.unwrap();
        assert_eq!(reply, EMPTY_MESSAGE_REPLY);
    }

    #[actix_web::test]
    async fn login_requirement_is_configurable() {
        let strict = relay(None, true);
        let err = strict.relay(&SessionContext::default(), "hi").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
        assert!(strict.relay(&member("a@x.io"), "hi").await.is_ok());
    }

    #[actix_web::test]
    async fn unreachable_upstream_falls_back() {
        let relay = relay(Some("http://127.0.0.1:9/v1/chat/completions".into()), false);
        let reply = relay.relay(&SessionContext::default(), "hello").await.unwrap();
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[actix_web::test]
    async fn relays_upstream_reply() {
        let server = HttpServer::new(|| {
            App::new().route("/v1/chat/completions", web::post().to(fake_completion))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        let relay = relay(Some(format!("http://{addr}/v1/chat/completions")), false);
        let reply = relay.relay(&SessionContext::default(), "reader").await.unwrap();
        assert_eq!(reply, "Try Dune, reader");

        handle.stop(false).await;
    }
}
