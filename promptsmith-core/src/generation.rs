//! Text-generation capability consumed by the orchestrator
//!
//! The language model is an opaque collaborator behind [`TextGenerator`].
//! Implementations report failures as [`Error::Generation`], marking whether
//! the failure is transient; [`generate_with_retry`] retries only those.

use crate::config::RetryPolicy;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Everything one generation call needs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    /// Name used in logs
    fn name(&self) -> &str {
        "text-generator"
    }
}

/// Call `generator`, retrying transient failures with bounded backoff.
pub async fn generate_with_retry(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
    policy: &RetryPolicy,
) -> Result<String> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match generator.generate(request).await {
            Ok(text) => {
                debug!("{} succeeded on attempt {}", generator.name(), attempt);
                return Ok(text);
            }
            Err(err) if err.is_recoverable() && attempt < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} attempt {}/{} failed: {}; retrying in {:?}",
                    generator.name(),
                    attempt,
                    attempts,
                    err,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_recoverable() {
                    warn!(
                        "{} exhausted {} attempts: {}",
                        generator.name(),
                        attempts,
                        err
                    );
                }
                return Err(match err {
                    Error::Generation { message, transient } => Error::Generation {
                        message: format!("{} (after {} attempt(s))", message, attempt),
                        transient,
                    },
                    other => other,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct Flaky {
        failures: Mutex<Vec<Error>>,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: Vec<Error>) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for Flaky {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.failures.lock().unwrap().pop();
            match next {
                Some(err) => Err(err),
                None => Ok("generated".to_string()),
            }
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_prompt: "You are a reviewer.".to_string(),
            messages: vec![ChatMessage::user("Review this")],
            temperature: 0.4,
            max_tokens: 100,
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let generator = Flaky::new(vec![Error::transient("503"), Error::transient("timeout")]);
        let text = generate_with_retry(&generator, &request(), &RetryPolicy::immediate(3))
            .await
            .unwrap();
        assert_eq!(text, "generated");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let generator = Flaky::new(vec![Error::permanent("401 unauthorized")]);
        let err = generate_with_retry(&generator, &request(), &RetryPolicy::immediate(3))
            .await
            .unwrap_err();
        assert!(!err.is_recoverable());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let generator = Flaky::new(vec![
            Error::transient("429"),
            Error::transient("429"),
            Error::transient("429"),
            Error::transient("429"),
        ]);
        let err = generate_with_retry(&generator, &request(), &RetryPolicy::immediate(3))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("after 3 attempt(s)"));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let generator = Flaky::new(vec![Error::transient("503")]);
        let policy = RetryPolicy::new(2, 1000, 2.0, 60_000).unwrap();
        let started = tokio::time::Instant::now();
        generate_with_retry(&generator, &request(), &policy)
            .await
            .unwrap();
        assert!(started.elapsed() >= std::time::Duration::from_millis(1000));
    }
}
