//! Test doubles shared by the workspace's test suites.
//!
//! Compiled only for this crate's own tests or when the `test-util` feature
//! is enabled (dependent crates turn it on from their dev-dependencies).

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::generator::{Availability, Generator};

/// A [`Generator`] that replays a fixed sequence of replies.
///
/// Once the script is exhausted the last reply repeats, so multi-round
/// callers (segmented streaming, tool orchestration) stay deterministic
/// without counting calls exactly.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    unavailable: Mutex<Option<String>>,
    /// Prompts seen by `generate`, for assertions on budgeting behavior.
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            last: Mutex::new(String::new()),
            unavailable: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn set_unavailable(&self, reason: &str) {
        *self.unavailable.lock().unwrap() = Some(reason.to_owned());
    }

    pub fn set_available(&self) {
        *self.unavailable.lock().unwrap() = None;
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn availability(&self) -> Availability {
        match self.unavailable.lock().unwrap().clone() {
            Some(reason) => Availability::Unavailable { reason },
            None => Availability::Ready,
        }
    }

    async fn generate(&self, _instructions: &str, prompt: &str) -> Result<String, CoreError> {
        self.prompts.lock().unwrap().push(prompt.to_owned());
        let mut replies = self.replies.lock().unwrap();
        match replies.pop_front() {
            Some(reply) => {
                *self.last.lock().unwrap() = reply.clone();
                Ok(reply)
            }
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }
}
