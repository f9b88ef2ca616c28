use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Database Metrics (MongoDB)
    pub static ref DB_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_operations_total",
        "Total number of database operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref DB_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_operation_duration_seconds",
        "Database operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Offline sync (client side)
    pub static ref SYNC_RECORDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "sync_records_total",
        "Records replayed by the sync coordinator",
        &["collection", "outcome"]
    )
    .unwrap();

    pub static ref SYNC_DRAINS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "sync_drains_total",
        "Drain cycles started by the sync coordinator",
        &["outcome"]
    )
    .unwrap();

    // Sync endpoints (server side)
    pub static ref SYNC_UPSERTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "sync_upserts_total",
        "Records accepted by the sync endpoints",
        &["collection", "result"]
    )
    .unwrap();

    // AI features
    pub static ref AI_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ai_requests_total",
        "Total number of generative AI requests",
        &["feature", "status"]
    )
    .unwrap();

    pub static ref AI_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "ai_request_duration_seconds",
        "Generative AI request duration in seconds",
        &["feature"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track database operation with metrics
pub async fn track_db_operation<F, T>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    DB_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    DB_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

/// Helper: track an AI provider call, labelled by feature
pub async fn track_ai_request<F, T, E>(feature: &str, future: F) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;

    let status = if result.is_ok() { "success" } else { "error" };
    AI_REQUESTS_TOTAL
        .with_label_values(&[feature, status])
        .inc();
    AI_REQUEST_DURATION_SECONDS
        .with_label_values(&[feature])
        .observe(start.elapsed().as_secs_f64());

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        SYNC_RECORDS_TOTAL
            .with_label_values(&["submissions", "synced"])
            .inc();

        let output = render_metrics().unwrap();
        assert!(output.contains("http_requests_total"));
        assert!(output.contains("sync_records_total"));
    }

    #[tokio::test]
    async fn track_ai_request_counts_errors() {
        let before = AI_REQUESTS_TOTAL
            .with_label_values(&["unit-test", "error"])
            .get();

        let result: Result<(), &str> = track_ai_request("unit-test", async { Err("boom") }).await;

        assert!(result.is_err());
        assert_eq!(
            AI_REQUESTS_TOTAL
                .with_label_values(&["unit-test", "error"])
                .get(),
            before + 1
        );
    }
}
