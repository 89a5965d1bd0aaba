//! Typed LLM modules.
//!
//! A [`Module`] turns typed signature inputs into typed outputs. [`Predict`]
//! is the implementation every agent runs: one signature, one model, with
//! retries.
//!
//! ```ignore
//! use claimcheck_core::module::{Module, Predict};
//!
//! let extractor = Predict::<ExtractClaims>::new(client).with_name("claims_extractor_agent");
//! let outputs = extractor
//!     .forward(ExtractClaimsInputs { text: article.to_string() })
//!     .await?;
//! ```

mod predict;

pub use predict::{Predict, PredictConfig};

use async_trait::async_trait;

use crate::error::Result;
use crate::signature::Signature;

/// Something that answers a [`Signature`].
#[async_trait]
pub trait Module: Send + Sync {
    type Sig: Signature;

    async fn forward(
        &self,
        inputs: <Self::Sig as Signature>::Inputs,
    ) -> Result<<Self::Sig as Signature>::Outputs>;

    /// Name used in logs and errors.
    fn name(&self) -> &str;
}
