use async_trait::async_trait;
use std::collections::HashMap;

use super::Detector;
use crate::error::DetectorResult;
use crate::store::Store;
use crate::types::{Detection, RequestContext};

/// Flags requests whose client IP has an active (non-expired) entry in
/// `ip_blacklist`. Always scores at `severity_weight` — blacklist hits are
/// binary, not graduated.
pub struct BlacklistDetector {
    store: Store,
    severity_weight: f64,
}

impl BlacklistDetector {
    pub fn new(store: Store, severity_weight: f64) -> Self {
        Self {
            store,
            severity_weight,
        }
    }
}

#[async_trait]
impl Detector for BlacklistDetector {
    fn name(&self) -> &'static str {
        "ip_blacklist"
    }

    async fn evaluate(&self, ctx: &RequestContext) -> DetectorResult<Vec<Detection>> {
        let Some(reason) = self.store.lookup_blacklist_entry(ctx.client_ip).await? else {
            return Ok(Vec::new());
        };

        let mut metadata = HashMap::new();
        metadata.insert("client_ip".to_string(), ctx.client_ip.to_string());

        let reason_text = reason
            .clone()
            .unwrap_or_else(|| format!("client ip {} is on the active blacklist", ctx.client_ip));
        if let Some(r) = reason {
            metadata.insert("blacklist_reason".to_string(), r);
        }

        Ok(vec![Detection {
            detector: "ip_blacklist",
            score: self.severity_weight,
            reason: reason_text,
            metadata,
        }])
    }
}
