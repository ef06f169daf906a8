use async_trait::async_trait;
use chrono::Utc;
use reqwest::Response;
use tracing::debug;

use crate::config::ClientConfig;
use crate::domain::{Context, Decision, RequestDetails};
use crate::rules::Rule;

use super::traits::{Client, ClientError};
use super::wire::{DecideRequest, DecideResponse, ReportRequest, WireDecision, WireDetails};

const DECIDE_PATH: &str = "/proto.decide.v1alpha1.DecideService/Decide";
const REPORT_PATH: &str = "/proto.decide.v1alpha1.DecideService/Report";

/// JSON-over-HTTP client for the decision service.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("arcjet-protect/{}", config.sdk_version))
            .build()?;

        Ok(HttpClient { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn check_status(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Client for HttpClient {
    async fn decide(
        &self,
        ctx: &Context,
        details: &RequestDetails,
        rules: &[Rule],
    ) -> Result<Decision, ClientError> {
        let request = DecideRequest {
            sdk_stack: self.config.sdk_stack.clone(),
            sdk_version: self.config.sdk_version.clone(),
            fingerprint: ctx.fingerprint.clone(),
            details: WireDetails::from(details),
            rules: rules.iter().map(Rule::to_wire).collect(),
        };

        let response = self
            .client
            .post(self.url(DECIDE_PATH))
            .bearer_auth(&ctx.key)
            .timeout(self.config.decide_timeout)
            .json(&request)
            .send()
            .await?;

        let response: DecideResponse = Self::check_status(response).await?.json().await?;
        let decision = response.decision.ok_or(ClientError::MissingDecision)?;

        debug!(
            fingerprint = %ctx.fingerprint,
            id = %decision.id,
            conclusion = %decision.conclusion,
            "Decide call completed"
        );

        Ok(Decision::from(decision))
    }

    async fn report(
        &self,
        ctx: &Context,
        details: &RequestDetails,
        decision: &Decision,
        rules: &[Rule],
    ) -> Result<(), ClientError> {
        let request = ReportRequest {
            sdk_stack: self.config.sdk_stack.clone(),
            sdk_version: self.config.sdk_version.clone(),
            fingerprint: ctx.fingerprint.clone(),
            details: WireDetails::from(details),
            decision: WireDecision::from(decision),
            rules: rules.iter().map(Rule::to_wire).collect(),
            received_at: Utc::now(),
        };

        let response = self
            .client
            .post(self.url(REPORT_PATH))
            .bearer_auth(&ctx.key)
            .timeout(self.config.report_timeout)
            .json(&request)
            .send()
            .await?;

        Self::check_status(response).await?;

        debug!(fingerprint = %ctx.fingerprint, id = %decision.id(), "Report call completed");
        Ok(())
    }
}
