use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::Detector;
use crate::error::DetectorResult;
use crate::types::{Detection, RequestContext};

/// One family of attack signatures, each pattern case-insensitive as in the
/// original catalogue.
struct AttackFamily {
    name: &'static str,
    patterns: Vec<Regex>,
}

fn compile(name: &'static str, raw: &[&str]) -> AttackFamily {
    let patterns = raw
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("attack pattern must compile"))
        .collect();
    AttackFamily { name, patterns }
}

static FAMILIES: Lazy<Vec<AttackFamily>> = Lazy::new(|| {
    vec![
        compile(
            "sql_injection",
            &[
                r"\bUNION\b.*\bSELECT\b",
                r"\bOR\b\s+\d+\s*=\s*\d+",
                r"';?\s*DROP\s+TABLE",
                r"--\s*$",
                r"/\*.*\*/",
            ],
        ),
        compile(
            "xss",
            &[
                r"<script[^>]*>.*?</script>",
                r"javascript:",
                r"onerror\s*=",
                r"onload\s*=",
            ],
        ),
        compile(
            "path_traversal",
            &[r"\.\./", r"\.\.\\", r"%2e%2e/", r"%2e%2e\\"],
        ),
        compile(
            "command_injection",
            &[r";\s*\w+", r"\|\s*\w+", r"`.*`", r"\$\(.*\)"],
        ),
    ]
});

/// Scans the endpoint and serialized headers for each attack family
/// independently, recording at most one detection per family — unlike a
/// short-circuiting single-match scan, a compound attack that trips two
/// families in the same request is reported as two detections.
pub struct AttackSignatureDetector {
    severity_weight: f64,
}

impl AttackSignatureDetector {
    pub fn new(severity_weight: f64) -> Self {
        Self { severity_weight }
    }

    fn haystack(ctx: &RequestContext) -> String {
        let headers = ctx
            .headers
            .as_ref()
            .map(|h| h.to_string())
            .unwrap_or_default();
        format!("{} {}", ctx.endpoint, headers)
    }
}

#[async_trait]
impl Detector for AttackSignatureDetector {
    fn name(&self) -> &'static str {
        "attack_signature"
    }

    async fn evaluate(&self, ctx: &RequestContext) -> DetectorResult<Vec<Detection>> {
        let haystack = Self::haystack(ctx);
        let mut detections = Vec::new();

        // Each family is checked independently against the same haystack,
        // rather than stopping at the first family to match, so a compound
        // attack (e.g. path traversal plus an XSS payload in one request)
        // yields one detection per family instead of just the first.
        for family in FAMILIES.iter() {
            if family.patterns.iter().any(|p| p.is_match(&haystack)) {
                let mut metadata = HashMap::new();
                metadata.insert("family".to_string(), family.name.to_string());

                detections.push(Detection {
                    detector: "attack_signature",
                    score: self.severity_weight,
                    reason: format!("matched {} signature in request", family.name),
                    metadata,
                });
            }
        }

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ctx(endpoint: &str) -> RequestContext {
        RequestContext {
            log_id: 1,
            api_id: 1,
            timestamp: Utc::now(),
            method: "GET".into(),
            endpoint: endpoint.into(),
            client_ip: "10.0.0.1".parse().unwrap(),
            status_code: Some(200),
            latency_ms: Some(10.0),
            headers: None,
            body_size: 0,
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn allows_benign_request() {
        let detector = AttackSignatureDetector::new(9.0);
        let result = detector.evaluate(&ctx("/v1/widgets?id=42")).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn flags_sql_injection() {
        let detector = AttackSignatureDetector::new(9.0);
        let result = detector
            .evaluate(&ctx("/v1/widgets?id=1 UNION SELECT password FROM users"))
            .await
            .unwrap();
        let detection = result.first().expect("expected sql injection detection");
        assert_eq!(detection.metadata.get("family").unwrap(), "sql_injection");
    }

    #[tokio::test]
    async fn flags_path_traversal() {
        let detector = AttackSignatureDetector::new(9.0);
        let result = detector
            .evaluate(&ctx("/v1/files?path=../../etc/passwd"))
            .await
            .unwrap();
        let detection = result.first().expect("expected path traversal detection");
        assert_eq!(
            detection.metadata.get("family").unwrap(),
            "path_traversal"
        );
    }

    #[tokio::test]
    async fn compound_attack_reports_every_family() {
        let detector = AttackSignatureDetector::new(9.0);
        let result = detector
            .evaluate(&ctx(
                "/v1/files?path=../../etc/passwd&q=<script>alert(1)</script>",
            ))
            .await
            .unwrap();
        let families: Vec<_> = result.iter().filter_map(|d| d.metadata.get("family")).collect();
        assert!(families.iter().any(|f| f.as_str() == "path_traversal"));
        assert!(families.iter().any(|f| f.as_str() == "xss"));
    }
}
