pub mod attack_signature;
pub mod blacklist;
pub mod error_rate;
pub mod rate_limit;
pub mod statistical;

use async_trait::async_trait;

use crate::error::DetectorResult;
use crate::types::{Detection, RequestContext};

/// A single capability: given a request, optionally report a detection.
/// The engine holds a `Vec<Box<dyn Detector>>` and iterates it in order,
/// which is what lets rule detectors, the statistical detector, and the ML
/// detector sit side by side without the engine knowing their concrete
/// types.
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Most detectors report at most one detection; the attack-signature
    /// detector can report up to one per pattern family for a compound
    /// attack, so the contract returns a `Vec` rather than an `Option`.
    async fn evaluate(&self, ctx: &RequestContext) -> DetectorResult<Vec<Detection>>;
}
