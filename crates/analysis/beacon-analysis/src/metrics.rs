use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, opts, IntCounterVec};

lazy_static! {
    pub static ref ANALYSES_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            opts!("beacon_analysis_runs_total", "Cross-region analyses by outcome"),
            &["outcome"]
        ).unwrap();

    pub static ref SUMMARIES_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            opts!("beacon_analysis_summaries_total", "Rendered summaries by producing strategy"),
            &["source"]
        ).unwrap();

    pub static ref SUMMARY_FALLBACKS_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            opts!("beacon_analysis_summary_fallbacks_total", "Times the primary summary strategy was skipped"),
            &["reason"]
        ).unwrap();
}

pub fn record_analysis(outcome: &str) {
    ANALYSES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_summary(source: &str) {
    SUMMARIES_TOTAL.with_label_values(&[source]).inc();
}

pub fn record_summary_fallback(reason: &str) {
    SUMMARY_FALLBACKS_TOTAL.with_label_values(&[reason]).inc();
}
