//! Shared fixtures for the engine integration tests
//!
//! - [`ScriptedGenerator`]: replays a fixed list of responses and failures
//! - canned agent responses that classify predictably
//! - orchestrator factories with immediate retries

#![allow(dead_code)]

use async_trait::async_trait;
use promptsmith_engine::core::config::{OrchestrationSettings, RetryPolicy};
use promptsmith_engine::core::generation::{GenerationRequest, TextGenerator};
use promptsmith_engine::core::{Error as CoreError, Result as CoreResult};
use promptsmith_engine::Orchestrator;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const REQUIREMENTS: &str =
    "Write a prompt for a recipe assistant that suggests dishes from available ingredients";

pub const PM_REQUIREMENTS: &str = "## Requirements\n\
The user needs a recipe assistant prompt. Key functionality: suggest dishes from the \
ingredients a customer has and explain every cooking step.";

pub const PM_CLARIFY: &str = "Before writing the requirements I have a clarifying question: \
who is the target audience for the recipe assistant?";

pub const DEV_SOLUTION: &str = "## Technical Solution\n\
The implementation approach is a system prompt that frames the recipe assistant role, \
lists constraints on ingredients and gives one worked example. This is feasible with any chat model.";

pub const TL_APPROVE: &str = "I approve this solution. Excellent work.\n\
# Final Prompt\n\
You are a recipe assistant that suggests dishes from the ingredients a user has.";

pub const TL_REJECT: &str = "I reject this draft: it is incomplete and needs work. \
Please improve the examples and add output constraints.";

pub const TL_REJECT_REQUIREMENTS: &str = "I reject this draft because the requirements are \
incomplete. Please improve them: what audience should the assistant serve?";

pub const TL_QUESTION: &str =
    "What tone should the assistant use? How formal should it be? Why mention nutrition at all?";

pub const TL_STRONG_REJECT: &str =
    "I cannot approve this. There are fundamental problems with the example format.";

pub const TL_MILD: &str = "Mostly fine, though the tone could be warmer in places.";

/// One scripted generator outcome
pub enum Step {
    Reply(&'static str),
    Fail(CoreError),
    /// Signal `entered`, wait for `release`, then reply
    Hold {
        entered: Arc<Notify>,
        release: Arc<Notify>,
        reply: &'static str,
    },
}

/// Text generator that replays a script in order
pub struct ScriptedGenerator {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<GenerationRequest>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedGenerator {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Self::with_delay(steps, Duration::ZERO)
    }

    pub fn replies(replies: &[&'static str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Step::Reply(*r)).collect())
    }

    pub fn with_delay(steps: Vec<Step>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> CoreResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let step = self.steps.lock().unwrap().pop_front();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match step {
            Some(Step::Reply(text)) => Ok(text.to_string()),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Hold {
                entered,
                release,
                reply,
            }) => {
                entered.notify_one();
                release.notified().await;
                Ok(reply.to_string())
            }
            None => Err(CoreError::permanent("script exhausted")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn settings(max_iterations: u32, max_interventions: u32, attempts: u32) -> OrchestrationSettings {
    OrchestrationSettings::builder()
        .max_iterations(max_iterations)
        .max_interventions(max_interventions)
        .retry(RetryPolicy::immediate(attempts))
        .build()
        .unwrap()
}

pub fn orchestrator(generator: Arc<ScriptedGenerator>) -> Orchestrator {
    Orchestrator::builder(generator)
        .settings(settings(3, 2, 1))
        .build()
        .unwrap()
}
