use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::LazyLock;

pub static ORDERS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("storefront_orders_created_total", "Orders created from carts").unwrap()
});

pub static PAYMENT_INITIATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "storefront_payment_initiations_total",
        "Payment initiation requests",
        &["result"]
    )
    .unwrap()
});

pub static PAYMENT_INITIATION_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "storefront_payment_initiation_duration_seconds",
        "Payment initiation latency in seconds, gateway call included",
        &["result"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap()
});

pub static CALLBACKS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "storefront_payment_callbacks_total",
        "Payment provider callbacks by outcome",
        &["result"]
    )
    .unwrap()
});

pub static PAYMENTS_EXPIRED: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!(
        "storefront_payments_expired_total",
        "Payments expired by the background sweep"
    )
    .unwrap()
});

pub fn metrics_output() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
