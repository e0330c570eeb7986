use chrono::{Datelike, Timelike};

use crate::types::RequestContext;

/// Six-dimensional feature vector matching the original model's shape:
/// latency, body size, error flag, endpoint length, hour-of-day,
/// day-of-week. Kept this small and cheap so per-request scoring never
/// becomes the bottleneck on the ingest hot path.
pub fn extract(ctx: &RequestContext) -> [f64; 6] {
    let is_error = ctx.status_code.map(|c| c >= 400).unwrap_or(false) as u8 as f64;
    [
        ctx.latency_ms.unwrap_or(0.0),
        ctx.body_size as f64,
        is_error,
        ctx.endpoint.len() as f64,
        ctx.timestamp.hour() as f64,
        ctx.timestamp.weekday().num_days_from_monday() as f64,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn extracts_six_features() {
        let ctx = RequestContext {
            log_id: 1,
            api_id: 1,
            timestamp: Utc::now(),
            method: "GET".into(),
            endpoint: "/v1/widgets".into(),
            client_ip: "10.0.0.1".parse().unwrap(),
            status_code: Some(500),
            latency_ms: Some(123.0),
            headers: None,
            body_size: 42,
            user_agent: None,
        };
        let features = extract(&ctx);
        assert_eq!(features[0], 123.0);
        assert_eq!(features[1], 42.0);
        assert_eq!(features[2], 1.0);
        assert_eq!(features[3], "/v1/widgets".len() as f64);
    }
}
