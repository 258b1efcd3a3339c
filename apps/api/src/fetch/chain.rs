use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::content::ContentError;
use crate::fetch::strategy::FetchStrategy;
use crate::fetch::{FetchError, SourceUnavailable, StrategyFailure};

/// Ordered fallback over fetch strategies for one content source.
///
/// Strategies run one at a time, each under its own timeout. The first
/// attempt whose payload is non-empty and accepted by the parser wins; its
/// result is returned whole. A failed attempt contributes nothing but its
/// error.
#[derive(Clone)]
pub struct FetchStrategyChain {
    source: String,
    strategies: Vec<Arc<dyn FetchStrategy>>,
    attempt_timeout: Duration,
}

impl FetchStrategyChain {
    pub fn new(
        source: impl Into<String>,
        strategies: Vec<Arc<dyn FetchStrategy>>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            source: source.into(),
            strategies,
            attempt_timeout,
        }
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs the chain for `target`, handing each payload to `parse`.
    pub async fn fetch<T, F>(&self, target: &str, parse: F) -> Result<T, SourceUnavailable>
    where
        F: Fn(&str) -> Result<T, ContentError>,
    {
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            match self.attempt(strategy.as_ref(), target, &parse).await {
                Ok(parsed) => {
                    info!(
                        source = %self.source,
                        strategy = strategy.name(),
                        failed_before = failures.len(),
                        "fetch succeeded"
                    );
                    return Ok(parsed);
                }
                Err(error) => {
                    warn!(
                        source = %self.source,
                        strategy = strategy.name(),
                        url = target,
                        error = %error,
                        "fetch strategy failed, trying next"
                    );
                    failures.push(StrategyFailure {
                        strategy: format!("{}/{}", self.source, strategy.name()),
                        error,
                    });
                }
            }
        }

        Err(SourceUnavailable::exhausted(failures))
    }

    async fn attempt<T, F>(
        &self,
        strategy: &dyn FetchStrategy,
        target: &str,
        parse: &F,
    ) -> Result<T, FetchError>
    where
        F: Fn(&str) -> Result<T, ContentError>,
    {
        let payload = tokio::time::timeout(self.attempt_timeout, strategy.fetch(target))
            .await
            .map_err(|_| FetchError::Timeout(self.attempt_timeout))??;

        if payload.trim().is_empty() {
            return Err(FetchError::EmptyPayload);
        }

        Ok(parse(&payload)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test double answering from a fixed script.
    pub(crate) struct ScriptedStrategy {
        pub name: &'static str,
        pub reply: Result<String, u16>,
        pub delay: Option<Duration>,
        pub calls: AtomicUsize,
    }

    impl ScriptedStrategy {
        pub(crate) fn ok(name: &'static str, body: &str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Ok(body.to_string()),
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn status(name: &'static str, status: u16) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Err(status),
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn slow(name: &'static str, body: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Ok(body.to_string()),
                delay: Some(delay),
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FetchStrategy for ScriptedStrategy {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self, _target: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.reply {
                Ok(body) => Ok(body.clone()),
                Err(status) => Err(FetchError::Status { status: *status }),
            }
        }
    }

    fn chain(strategies: Vec<Arc<ScriptedStrategy>>) -> FetchStrategyChain {
        let strategies = strategies
            .into_iter()
            .map(|s| s as Arc<dyn FetchStrategy>)
            .collect();
        FetchStrategyChain::new("feed", strategies, Duration::from_secs(1))
    }

    fn parse_number(payload: &str) -> Result<u32, ContentError> {
        payload
            .trim()
            .parse()
            .map_err(|_| ContentError::FeedMalformed(format!("not a number: {payload}")))
    }

    #[tokio::test]
    async fn test_first_success_wins_and_later_strategies_are_skipped() {
        let first = ScriptedStrategy::ok("direct", "7");
        let second = ScriptedStrategy::ok("relay", "9");
        let chain = chain(vec![first.clone(), second.clone()]);

        assert_eq!(chain.fetch("t", parse_number).await.unwrap(), 7);
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_past_status_empty_and_unparseable() {
        let chain = chain(vec![
            ScriptedStrategy::status("direct", 403),
            ScriptedStrategy::ok("relay", "   "),
            ScriptedStrategy::ok("alt-relay", "<html>blocked</html>"),
            ScriptedStrategy::ok("server-relay", "42"),
        ]);

        assert_eq!(chain.fetch("t", parse_number).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_all_failures_are_reported_in_order() {
        let chain = chain(vec![
            ScriptedStrategy::status("direct", 500),
            ScriptedStrategy::ok("relay", ""),
        ]);

        let err = chain.fetch("t", parse_number).await.unwrap_err();
        assert_eq!(err.reason, crate::fetch::UnavailableReason::Exhausted);
        assert_eq!(err.failures.len(), 2);
        assert_eq!(err.failures[0].strategy, "feed/direct");
        assert!(matches!(err.failures[0].error, FetchError::Status { status: 500 }));
        assert!(matches!(err.failures[1].error, FetchError::EmptyPayload));
    }

    #[tokio::test]
    async fn test_empty_chain_is_unavailable() {
        let err = chain(vec![]).fetch("t", parse_number).await.unwrap_err();
        assert!(err.failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_strategy_times_out_and_next_is_used() {
        let chain = chain(vec![
            ScriptedStrategy::slow("direct", "1", Duration::from_secs(30)),
            ScriptedStrategy::ok("relay", "2"),
        ]);

        assert_eq!(chain.fetch("t", parse_number).await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_recorded_as_failure() {
        let chain = chain(vec![ScriptedStrategy::slow(
            "direct",
            "1",
            Duration::from_secs(30),
        )]);

        let err = chain.fetch("t", parse_number).await.unwrap_err();
        assert!(matches!(err.failures[0].error, FetchError::Timeout(_)));
    }
}
