use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{Context, Decision, RequestDetails};
use crate::rules::Rule;

/// Errors talking to the remote decision service.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decision service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decide timed out after {0:?}")]
    Timeout(Duration),

    #[error("response did not contain a decision")]
    MissingDecision,

    #[error("{0}")]
    Other(String),
}

/// Remote decision service.
///
/// `decide` is authoritative for anything local rules did not deny.
/// `report` records a decision that was already made locally; callers treat
/// it as fire-and-forget.
#[async_trait]
pub trait Client: Send + Sync + Debug {
    async fn decide(
        &self,
        ctx: &Context,
        details: &RequestDetails,
        rules: &[Rule],
    ) -> Result<Decision, ClientError>;

    async fn report(
        &self,
        ctx: &Context,
        details: &RequestDetails,
        decision: &Decision,
        rules: &[Rule],
    ) -> Result<(), ClientError>;
}
