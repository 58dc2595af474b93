//! Prometheus metrics for social-service.
//!
//! Exposes interaction and feed collectors and an HTTP handler for the `/metrics` endpoint.

use actix_web::HttpResponse;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    /// Interaction toggles (like, save, follow, ...) segmented by outcome.
    pub static ref INTERACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "social_interactions_total",
        "Interaction attempts segmented by action and outcome",
        &["action", "outcome"]
    )
    .expect("failed to register social_interactions_total");

    /// Feed requests served, by feed.
    pub static ref FEED_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "social_feed_requests_total",
        "Feed requests segmented by feed",
        &["feed"]
    )
    .expect("failed to register social_feed_requests_total");

    /// Items returned per feed request.
    pub static ref FEED_ITEMS: HistogramVec = register_histogram_vec!(
        "social_feed_items",
        "Number of items returned per feed request",
        &["feed"],
        vec![0.0, 1.0, 5.0, 10.0, 20.0, 30.0, 50.0, 100.0, 250.0]
    )
    .expect("failed to register social_feed_items");

    /// Expired stories removed by the sweeper.
    pub static ref STORY_SWEEP_DELETED_TOTAL: IntCounter = register_int_counter!(
        "social_story_sweep_deleted_total",
        "Expired stories deleted by the story sweeper"
    )
    .expect("failed to register social_story_sweep_deleted_total");
}

pub fn record_interaction(action: &str, outcome: &str) {
    INTERACTIONS_TOTAL
        .with_label_values(&[action, outcome])
        .inc();
}

pub fn record_feed(feed: &str, items: usize) {
    FEED_REQUESTS_TOTAL.with_label_values(&[feed]).inc();
    FEED_ITEMS.with_label_values(&[feed]).observe(items as f64);
}

pub fn record_story_sweep(deleted: u64) {
    STORY_SWEEP_DELETED_TOTAL.inc_by(deleted);
}

/// Actix handler that renders Prometheus metrics in text format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
