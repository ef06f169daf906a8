use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn, Instrument};

use crate::analyze::Analyzer;
use crate::cache::OutcomeCache;
use crate::client::{Client, ClientError};
use crate::config::ProtectorConfig;
use crate::domain::{Context, Decision, RequestDetails, RuleResult, RuleState};
use crate::observability::MetricsRegistry;
use crate::rules::{compose, ComposedRules, Rule, OVERLOAD_MESSAGE, UNKNOWN_PROBLEM};

use super::redact::redact;

/// Runs the configured rules against requests.
///
/// Cheap to clone; clones share the cache, client and metrics.
#[derive(Debug, Clone)]
pub struct Protector {
    config: ProtectorConfig,
    characteristics: Arc<[String]>,
    groups: Vec<Vec<Rule>>,
    rules: Arc<ComposedRules>,
    client: Arc<dyn Client>,
    analyzer: Arc<dyn Analyzer>,
    cache: Arc<OutcomeCache>,
    metrics: Arc<MetricsRegistry>,
}

impl Protector {
    /// Create a new protector from grouped rules.
    pub fn new(
        config: ProtectorConfig,
        groups: Vec<Vec<Rule>>,
        client: Arc<dyn Client>,
        analyzer: Arc<dyn Analyzer>,
        cache: Arc<OutcomeCache>,
    ) -> Self {
        let rules = Arc::new(compose(&groups));
        let characteristics = Arc::from(config.characteristics.clone());

        Protector {
            config,
            characteristics,
            groups,
            rules,
            client,
            analyzer,
            cache,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    /// A new protector with `rules` added as another group.
    ///
    /// `self` is left unchanged.
    pub fn with_rule(&self, rules: Vec<Rule>) -> Self {
        let mut groups = self.groups.clone();
        groups.push(rules);

        Protector {
            rules: Arc::new(compose(&groups)),
            groups,
            ..self.clone()
        }
    }

    /// Composed rules in execution order.
    pub fn rules(&self) -> &ComposedRules {
        &self.rules
    }

    pub fn cache(&self) -> &Arc<OutcomeCache> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Decide what to do with a request.
    ///
    /// Never fails: transport problems produce an ERROR decision, which
    /// callers should treat as allowed.
    pub async fn protect(&self, details: RequestDetails, body: Option<Arc<str>>) -> Decision {
        let start = Instant::now();
        let span = tracing::debug_span!(
            "protect",
            method = %details.method,
            path = %details.path,
        );

        let decision = self.run(details, body).instrument(span).await;

        self.metrics.record_decision(&decision);
        self.metrics.record_latency(start);

        debug!(
            id = decision.id(),
            conclusion = %decision.conclusion(),
            latency_ms = start.elapsed().as_millis(),
            "Decision completed"
        );

        decision
    }

    async fn run(&self, details: RequestDetails, body: Option<Arc<str>>) -> Decision {
        if details.ip.is_empty() {
            warn!("Request has no client IP; fingerprint will be degraded");
        }

        let fingerprint = self
            .analyzer
            .fingerprint(&details, &self.characteristics)
            .map_err(|e| e.to_string());

        if self.rules.is_overloaded() {
            warn!(rules = self.rules.len(), "Too many rules configured");
            let decision = Decision::error(OVERLOAD_MESSAGE, Vec::new());
            let ctx = self.context(fingerprint.unwrap_or_default(), body);
            let redacted = redact(&details, &self.rules.local_only_fields());
            self.report(ctx, redacted, decision.clone(), Arc::new(ComposedRules::default()));
            return decision;
        }

        let rules = self.rules.rules();
        let mut results: Vec<RuleResult> = rules.iter().map(|_| RuleResult::not_run()).collect();

        let fingerprint = match fingerprint {
            Ok(fp) => fp,
            Err(message) => {
                warn!(error = %message, "Failed to fingerprint request");
                return Decision::error(message, results);
            }
        };

        let ctx = self.context(fingerprint, body);
        let redacted = redact(&details, &self.rules.local_only_fields());

        if let Some((reason, ttl)) = self.cache.get(&ctx.fingerprint) {
            debug!(fingerprint = %ctx.fingerprint, ttl_ms = ttl, "Serving cached denial");
            self.metrics.record_cache_hit();
            let decision = Decision::deny(ttl, reason, results);
            self.report(ctx, redacted, decision.clone(), self.rules.clone());
            return decision;
        }

        for (idx, rule) in rules.iter().enumerate() {
            let Some(local) = rule.as_local() else {
                continue;
            };

            if let Err(e) = local.validate(&ctx, &details) {
                debug!(rule = %local.rule_type(), error = %e, "Rule validation failed");
                results[idx] = RuleResult::error(e.message());
                self.metrics.record_rule_evaluation(results[idx].conclusion);
                continue;
            }

            results[idx] = match local.protect(&ctx, &details).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(rule = %local.rule_type(), error = %e, "Rule failed");
                    RuleResult::error(e.message())
                }
            };
            self.metrics.record_rule_evaluation(results[idx].conclusion);

            if !results[idx].is_denied() {
                continue;
            }

            if local.mode().is_dry_run() {
                info!(
                    rule = %local.rule_type(),
                    "Dry run rule would have denied the request"
                );
                results[idx].state = RuleState::DryRun;
                continue;
            }

            let ttl = results[idx].ttl;
            let reason = results[idx].reason.clone();
            if ttl > 0 {
                self.cache.set(&ctx.fingerprint, reason.clone(), ttl);
            }

            let decision = Decision::deny(ttl, reason, results);
            self.report(ctx, redacted, decision.clone(), self.rules.clone());
            return decision;
        }

        let outcome = tokio::time::timeout(
            self.config.decide_timeout,
            self.client.decide(&ctx, &redacted, rules),
        )
        .await
        .unwrap_or(Err(ClientError::Timeout(self.config.decide_timeout)));

        match outcome {
            Ok(decision) => {
                self.metrics.record_remote_call(true);
                if decision.is_denied() && decision.ttl() > 0 {
                    self.cache
                        .set(&ctx.fingerprint, decision.reason().clone(), decision.ttl());
                }
                decision
            }
            Err(e) => {
                self.metrics.record_remote_call(false);
                warn!(error = %e, "Decide failed; failing open");
                let decision = Decision::error(error_message(&e), results);
                self.report(ctx, redacted, decision.clone(), self.rules.clone());
                decision
            }
        }
    }

    fn context(&self, fingerprint: String, body: Option<Arc<str>>) -> Context {
        Context::new(
            self.config.key.clone(),
            fingerprint,
            self.characteristics.clone(),
            self.cache.clone(),
            self.analyzer.clone(),
        )
        .with_body(body)
    }

    /// Send a locally made decision in the background.
    fn report(
        &self,
        ctx: Context,
        details: RequestDetails,
        decision: Decision,
        rules: Arc<ComposedRules>,
    ) {
        let client = self.client.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            match client.report(&ctx, &details, &decision, rules.rules()).await {
                Ok(()) => metrics.record_report(true),
                Err(e) => {
                    metrics.record_report(false);
                    warn!(id = decision.id(), error = %e, "Failed to report decision");
                }
            }
        });
    }
}

fn error_message(err: &ClientError) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        UNKNOWN_PROBLEM.to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{BasicAnalyzer, MockAnalyzer};
    use crate::client::{MockClient, WireRule};
    use crate::domain::{Conclusion, EmailType, Headers, IpDetails, Mode, Reason};
    use crate::filter::FILTER_LOCAL_KEY;
    use crate::observability::init_test_tracing;
    use crate::pipeline::REDACTED;
    use crate::rules::local::BOT_DENY_TTL_MS;
    use crate::rules::{BotRule, EmailRule, FilterRule, RemoteRule};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn config() -> ProtectorConfig {
        ProtectorConfig {
            key: "ajkey_test".to_string(),
            characteristics: Vec::new(),
            decide_timeout: Duration::from_millis(100),
        }
    }

    fn protector(groups: Vec<Vec<Rule>>, client: &Arc<MockClient>) -> Protector {
        Protector::new(
            config(),
            groups,
            client.clone(),
            Arc::new(MockAnalyzer::new()),
            Arc::new(OutcomeCache::new()),
        )
    }

    fn request(method: &str) -> RequestDetails {
        let mut headers = Headers::new();
        headers.append("user-agent", "curl/8.4.0");
        RequestDetails {
            ip: "198.51.100.23".to_string(),
            method: method.to_string(),
            protocol: "HTTP/1.1".to_string(),
            host: "example.com".to_string(),
            path: "/api/items".to_string(),
            headers,
            ..Default::default()
        }
    }

    fn filter(mode: Mode, deny: &[&str]) -> Rule {
        Rule::local(FilterRule::deny(mode, deny.iter().copied()).unwrap())
    }

    #[tokio::test]
    async fn test_overload_returns_error_and_reports_no_rules() {
        init_test_tracing();
        let client = Arc::new(MockClient::new());
        let groups: Vec<Vec<Rule>> = (0..11).map(|_| vec![filter(Mode::Live, &["ip.src.tor"])]).collect();
        let protector = protector(groups, &client);

        let decision = protector.protect(request("GET"), None).await;

        assert!(decision.is_errored());
        assert_eq!(decision.reason().message(), Some(OVERLOAD_MESSAGE));
        assert!(decision.results().is_empty());
        assert!(client.decide_calls().is_empty());

        let reports = client.wait_for_reports(1, WAIT).await;
        assert_eq!(reports.len(), 1);
        assert!(reports[0].rules.is_empty());
    }

    #[tokio::test]
    async fn test_allow_filter_by_method() {
        let client = Arc::new(MockClient::new());
        let rule = Rule::local(FilterRule::allow(Mode::Live, [r#"http.request.method == "GET""#]).unwrap());
        let protector = protector(vec![vec![rule]], &client);

        let decision = protector.protect(request("GET"), None).await;
        assert_eq!(decision.conclusion(), Conclusion::Allow);
        assert_eq!(client.decide_calls().len(), 1);

        let decision = protector.protect(request("POST"), None).await;
        assert_eq!(decision.conclusion(), Conclusion::Deny);
        assert_eq!(decision.ttl(), 0);
        assert_eq!(decision.reason(), &Reason::filter(vec![], vec![]));
        assert_eq!(client.decide_calls().len(), 1);
        assert!(protector.cache().is_empty());
    }

    #[tokio::test]
    async fn test_undetermined_filter_allows() {
        let client = Arc::new(MockClient::new());
        client.fail_with("offline");
        let rule = Rule::local(FilterRule::allow(Mode::Live, ["ip.src.vpn"]).unwrap());
        let protector = protector(vec![vec![rule]], &client);

        let decision = protector.protect(request("GET"), None).await;

        assert!(decision.is_allowed());
        let result = &decision.results()[0];
        assert_eq!(result.conclusion, Conclusion::Allow);
        assert_eq!(result.reason, Reason::filter(vec![], vec!["ip.src.vpn".to_string()]));
    }

    #[tokio::test]
    async fn test_dry_run_deny_falls_through_to_remote() {
        let client = Arc::new(MockClient::new());
        client.respond_with(Decision::challenge(0, Reason::Generic, vec![]));
        let protector = protector(
            vec![vec![filter(Mode::DryRun, &[r#"http.request.method == "POST""#])]],
            &client,
        );

        let decision = protector.protect(request("POST"), None).await;

        assert_eq!(decision.conclusion(), Conclusion::Challenge);
        let calls = client.decide_calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0].rules[0], WireRule::Filter { mode: Mode::DryRun, .. }));
    }

    #[tokio::test]
    async fn test_dry_run_slot_state() {
        let client = Arc::new(MockClient::new());
        client.fail_with("offline");
        let protector = protector(
            vec![vec![filter(Mode::DryRun, &[r#"http.request.method == "POST""#])]],
            &client,
        );

        let decision = protector.protect(request("POST"), None).await;

        let result = &decision.results()[0];
        assert_eq!(result.state, RuleState::DryRun);
        assert_eq!(result.conclusion, Conclusion::Deny);
    }

    #[tokio::test]
    async fn test_local_only_extra_is_redacted() {
        let client = Arc::new(MockClient::new());
        let protector = protector(vec![vec![filter(Mode::Live, &[r#"local["plan"] == "free""#])]], &client);

        let mut pro = request("GET");
        pro.extra.insert(FILTER_LOCAL_KEY.to_string(), r#"{"plan":"pro"}"#.to_string());
        pro.extra.insert("session".to_string(), "s1".to_string());
        let decision = protector.protect(pro, None).await;
        assert!(decision.is_allowed());

        let decide = client.decide_calls();
        assert_eq!(decide[0].details.extra[FILTER_LOCAL_KEY], REDACTED);
        assert_eq!(decide[0].details.extra["session"], "s1");

        let mut free = request("GET");
        free.extra.insert(FILTER_LOCAL_KEY.to_string(), r#"{"plan":"free"}"#.to_string());
        let decision = protector.protect(free, None).await;
        assert!(decision.is_denied());

        let reports = client.wait_for_reports(1, WAIT).await;
        assert_eq!(reports[0].details.extra[FILTER_LOCAL_KEY], REDACTED);
    }

    #[tokio::test]
    async fn test_unknown_identifier_contained_as_error_result() {
        let client = Arc::new(MockClient::new());
        client.fail_with("offline");
        let rule = Rule::local(FilterRule::allow(Mode::Live, [r#"http.blob ~ "x""#]).unwrap());
        let protector = protector(vec![vec![rule]], &client);

        let decision = protector.protect(request("GET"), None).await;

        let result = &decision.results()[0];
        assert_eq!(result.conclusion, Conclusion::Error);
        assert!(result.reason.message().unwrap().contains("unknown identifier"));
        assert_eq!(client.decide_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_deny_is_cached_until_expiry() {
        let client = Arc::new(MockClient::new());
        let reason = Reason::RateLimit {
            max: 1,
            remaining: 0,
            reset: 1,
            window: 1,
            reset_time: None,
        };
        client.respond_with(Decision::deny(150, reason.clone(), vec![]));
        let protector = protector(
            vec![vec![Rule::from(RemoteRule::fixed_window(Mode::Live, 1, 1).unwrap())]],
            &client,
        );

        let first = protector.protect(request("GET"), None).await;
        assert!(first.is_denied());
        assert_eq!(client.decide_calls().len(), 1);

        let second = protector.protect(request("GET"), None).await;
        assert!(second.is_denied());
        assert_eq!(second.reason(), &reason);
        assert!(second.ttl() <= 150);
        assert!(second.results().iter().all(|r| r.state == RuleState::NotRun));
        assert_eq!(client.decide_calls().len(), 1);
        assert_eq!(client.wait_for_reports(1, WAIT).await.len(), 1);
        assert_eq!(protector.metrics().cache_hits_total.load(Ordering::Relaxed), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        client.respond_with(Decision::allow(0, Reason::Generic, vec![]));

        let third = protector.protect(request("GET"), None).await;
        assert!(third.is_allowed());
        assert_eq!(client.decide_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_local_deny_stops_and_caches() {
        let client = Arc::new(MockClient::new());
        let analyzer = Arc::new(MockAnalyzer::new());
        analyzer.set_bots(&["CURL"]);
        let rules = vec![
            Rule::local(BotRule::new(Mode::Live, Some(vec![]), None).unwrap()),
            filter(Mode::Live, &["ip.src.tor"]),
        ];
        let protector = Protector::new(
            config(),
            vec![rules],
            client.clone(),
            analyzer,
            Arc::new(OutcomeCache::new()),
        );

        let decision = protector.protect(request("GET"), None).await;

        assert!(decision.is_denied());
        assert_eq!(decision.ttl(), BOT_DENY_TTL_MS);
        assert_eq!(decision.results()[0].state, RuleState::Run);
        assert_eq!(decision.results()[1].state, RuleState::NotRun);
        assert!(client.decide_calls().is_empty());
        assert!(protector.cache().get("fp::198.51.100.23").is_some());

        let reports = client.wait_for_reports(1, WAIT).await;
        assert_eq!(reports[0].decision.as_ref().map(Decision::conclusion), Some(Conclusion::Deny));
        assert_eq!(reports[0].rules.len(), 2);
    }

    #[tokio::test]
    async fn test_validation_error_is_contained() {
        let client = Arc::new(MockClient::new());
        let rule = Rule::local(EmailRule::new(Mode::Live, None, Some(vec![EmailType::Disposable])).unwrap());
        let protector = protector(vec![vec![rule]], &client);

        let decision = protector.protect(request("POST"), None).await;

        assert!(decision.is_allowed());
        assert_eq!(client.decide_calls().len(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(client.report_calls().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_fails_open() {
        let client = Arc::new(MockClient::new());
        client.fail_with("connection refused");
        let protector = protector(vec![vec![filter(Mode::Live, &["ip.src.tor"])]], &client);

        let mut details = request("GET");
        details.ip_details = Some(IpDetails {
            tor: Some(false),
            ..Default::default()
        });
        let decision = protector.protect(details, None).await;

        assert!(decision.is_errored());
        assert!(decision.is_allowed());
        assert_eq!(decision.reason().message(), Some("connection refused"));
        assert_eq!(decision.results()[0].state, RuleState::Run);
        assert_eq!(client.wait_for_reports(1, WAIT).await.len(), 1);
    }

    #[tokio::test]
    async fn test_decide_timeout() {
        let client = Arc::new(MockClient::new());
        client.hang();
        let protector = protector(vec![], &client);

        let decision = protector.protect(request("GET"), None).await;

        assert!(decision.is_errored());
        assert!(decision.reason().message().unwrap().contains("timed out"));
        assert_eq!(protector.metrics().remote_failures_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_report_failure_is_swallowed() {
        let client = Arc::new(MockClient::new());
        client.fail_reports();
        let protector = protector(vec![vec![filter(Mode::Live, &[r#"http.request.method == "GET""#])]], &client);

        let decision = protector.protect(request("GET"), None).await;

        assert!(decision.is_denied());
        assert_eq!(client.wait_for_reports(1, WAIT).await.len(), 1);
    }

    #[tokio::test]
    async fn test_with_rule_leaves_original_unchanged() {
        let client = Arc::new(MockClient::new());
        let base = protector(vec![vec![Rule::from(RemoteRule::shield(Mode::Live))]], &client);

        let extended = base.with_rule(vec![filter(Mode::Live, &["ip.src.tor"])]);

        assert_eq!(base.rules().len(), 1);
        assert_eq!(extended.rules().len(), 2);
    }

    #[tokio::test]
    async fn test_fingerprint_failure() {
        let client = Arc::new(MockClient::new());
        let protector = Protector::new(
            ProtectorConfig {
                characteristics: vec![r#"http.request.headers["x-user-id"]"#.to_string()],
                ..config()
            },
            vec![],
            client.clone(),
            Arc::new(BasicAnalyzer::new()),
            Arc::new(OutcomeCache::new()),
        );

        let decision = protector.protect(request("GET"), None).await;

        assert!(decision.is_errored());
        assert!(client.decide_calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_ip_is_not_fatal() {
        let client = Arc::new(MockClient::new());
        let protector = protector(vec![], &client);

        let mut details = request("GET");
        details.ip = String::new();
        let decision = protector.protect(details, None).await;

        assert_eq!(decision.conclusion(), Conclusion::Allow);
        assert_eq!(client.decide_calls()[0].fingerprint, "fp::");
    }

    #[tokio::test]
    async fn test_missing_ip_reaches_decide_with_basic_analyzer() {
        let client = Arc::new(MockClient::new());
        let protector = Protector::new(
            config(),
            vec![vec![filter(Mode::Live, &[r#"http.request.uri.path == "/admin""#])]],
            client.clone(),
            Arc::new(BasicAnalyzer::new()),
            Arc::new(OutcomeCache::new()),
        );

        let mut details = request("GET");
        details.ip = String::new();
        let decision = protector.protect(details, None).await;

        assert_eq!(decision.conclusion(), Conclusion::Allow);
        let calls = client.decide_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].fingerprint.starts_with("fp::2::"));
    }
}
