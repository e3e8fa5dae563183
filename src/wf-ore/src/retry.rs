// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository, or online at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Retry with exponential backoff and jitter.
//!
//! Mirrors the small builder used throughout this workspace to retry
//! fallible async operations: construct a [`Retry`], tune it, then call
//! [`Retry::retry_async`] with a closure that receives a [`RetryState`]
//! describing the attempt so far.

use std::time::Duration;

use rand::Rng;

/// The backoff schedule and limits for a retry loop.
#[derive(Debug, Clone, Copy)]
pub struct Retry {
    initial_backoff: Duration,
    multiplier: u32,
    max_backoff: Duration,
    max_tries: Option<usize>,
}

impl Default for Retry {
    fn default() -> Self {
        Retry {
            initial_backoff: Duration::from_millis(64),
            multiplier: 2,
            max_backoff: Duration::MAX,
            max_tries: None,
        }
    }
}

/// Information about the retry loop passed to each attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryState {
    /// The number of attempts made so far, including the current one.
    pub i: usize,
    /// The backoff that will be waited before the next attempt, or `None`
    /// if this was the last permitted attempt.
    pub next_backoff: Option<Duration>,
}

impl Retry {
    /// Caps the backoff between attempts at `max`.
    pub fn clamp_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = max;
        self
    }

    /// Sets the backoff used after the first failed attempt.
    pub fn initial_backoff(mut self, initial: Duration) -> Self {
        self.initial_backoff = initial;
        self
    }

    /// Limits the number of attempts. Without this, `retry_async` retries
    /// forever.
    pub fn max_tries(mut self, max_tries: usize) -> Self {
        self.max_tries = Some(max_tries);
        self
    }

    /// Retries `f` until it returns `Ok`, or until `max_tries` attempts have
    /// been made (if set), sleeping with jittered exponential backoff
    /// between attempts.
    pub async fn retry_async<F, Fut, T, E>(self, mut f: F) -> Result<T, E>
    where
        F: FnMut(RetryState) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut backoff = self.initial_backoff;
        let mut i = 0;
        loop {
            i += 1;
            let last_attempt = self.max_tries.map_or(false, |max| i >= max);
            let next_backoff = if last_attempt {
                None
            } else {
                Some(jittered(backoff.min(self.max_backoff)))
            };
            match f(RetryState { i, next_backoff }).await {
                Ok(t) => return Ok(t),
                Err(e) if last_attempt => return Err(e),
                Err(_) => {
                    tokio::time::sleep(next_backoff.expect("checked above")).await;
                    backoff = backoff.saturating_mul(self.multiplier).min(self.max_backoff);
                }
            }
        }
    }
}

fn jittered(d: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..1.0);
    d.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let attempts = AtomicUsize::new(0);
        let result = Retry::default()
            .initial_backoff(Duration::from_millis(1))
            .retry_async(|_state| {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err("not yet")
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn gives_up_after_max_tries() {
        let result: Result<(), _> = Retry::default()
            .initial_backoff(Duration::from_millis(1))
            .max_tries(3)
            .retry_async(|_state| async { Err::<(), _>("always fails") })
            .await;
        assert_eq!(result, Err("always fails"));
    }
}
