use lazy_static::lazy_static;
use prometheus::{register_histogram, register_int_counter, register_int_counter_vec, opts};
use prometheus::{Histogram, IntCounter, IntCounterVec};

lazy_static! {
    pub static ref UNITS_FINISHED_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            opts!("beacon_runtime_units_finished_total", "Execution units reaching a terminal status"),
            &["status"]
        ).unwrap();

    pub static ref UNIT_RETRIES_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            opts!("beacon_runtime_unit_retries_total", "Unit retries by origin"),
            &["origin"]
        ).unwrap();

    pub static ref JOBS_FINISHED_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            opts!("beacon_runtime_jobs_finished_total", "Jobs reaching a terminal status"),
            &["status"]
        ).unwrap();

    pub static ref UNIT_PANICS_TOTAL: IntCounter =
        register_int_counter!(
            opts!("beacon_runtime_unit_panics_total", "Units whose execution panicked")
        ).unwrap();

    pub static ref UNIT_PERSIST_FAILURES_TOTAL: IntCounter =
        register_int_counter!(
            opts!("beacon_runtime_unit_persist_failures_total", "Unit writes rejected by the store")
        ).unwrap();

    pub static ref UNIT_DURATION_SECONDS: Histogram =
        register_histogram!(
            "beacon_runtime_unit_duration_seconds",
            "Wall time of one execution unit from start to terminal status",
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
        ).unwrap();
}

pub fn record_unit_finished(status: &str, duration_secs: Option<f64>) {
    UNITS_FINISHED_TOTAL.with_label_values(&[status]).inc();
    if let Some(secs) = duration_secs {
        UNIT_DURATION_SECONDS.observe(secs);
    }
}

/// `origin` is `inline` for executor retries and `explicit` for operator requests.
pub fn record_unit_retry(origin: &str) {
    UNIT_RETRIES_TOTAL.with_label_values(&[origin]).inc();
}

pub fn record_job_finished(status: &str) {
    JOBS_FINISHED_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_unit_panic() {
    UNIT_PANICS_TOTAL.inc();
}

pub fn record_persist_failure() {
    UNIT_PERSIST_FAILURES_TOTAL.inc();
}
