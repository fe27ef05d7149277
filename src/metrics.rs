use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Register metric descriptions with whatever recorder the host installed
/// (can be called multiple times safely)
pub fn init_metric_descriptions() {
    describe_counter!(
        "log_sink_records_written_total",
        "Total number of records persisted by the sink"
    );
    describe_counter!(
        "log_sink_records_dropped_total",
        "Records dropped for being below the minimum severity"
    );
    describe_counter!(
        "log_sink_write_errors_total",
        "Inserts rejected or failed by the store"
    );
    describe_counter!(
        "log_sink_sweeps_total",
        "Retention sweeps run, by outcome"
    );
    describe_counter!(
        "log_sink_records_pruned_total",
        "Records deleted by retention sweeps"
    );
    describe_counter!(
        "log_sink_poll_errors_total",
        "Failed tail poll iterations"
    );
    describe_counter!(
        "log_sink_records_tailed_total",
        "Records delivered to tail subscribers"
    );
    describe_gauge!(
        "log_sink_active_tails",
        "Currently running tail subscriptions"
    );
}

pub fn record_written(level: &str) {
    counter!("log_sink_records_written_total", "level" => level.to_string()).increment(1);
}

pub fn record_dropped(level: &str) {
    counter!("log_sink_records_dropped_total", "level" => level.to_string()).increment(1);
}

pub fn record_write_error() {
    counter!("log_sink_write_errors_total").increment(1);
}

/// Record a finished sweep; `outcome` is "ok" or "error"
pub fn record_sweep(outcome: &'static str, pruned: u64) {
    counter!("log_sink_sweeps_total", "outcome" => outcome).increment(1);
    if pruned > 0 {
        counter!("log_sink_records_pruned_total").increment(pruned);
    }
}

pub fn record_poll_error() {
    counter!("log_sink_poll_errors_total").increment(1);
}

pub fn record_tailed(count: u64) {
    counter!("log_sink_records_tailed_total").increment(count);
}

pub fn set_active_tails(count: usize) {
    gauge!("log_sink_active_tails").set(count as f64);
}
