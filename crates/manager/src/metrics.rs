//! Per-pipeline gauges registered into the process-wide `prometheus::Registry`.
//! The buffer and pipeline crates stay decoupled from `prometheus`; this
//! module is the only place that bridges pipeline state into metric families.

use prometheus::{IntGaugeVec, Opts, Registry};

/// Holds the metric handles registered for a manager's pipeline set.
/// `refresh` re-reads every pipeline's state and writes it into the gauges;
/// it is called after `start`/`shutdown` and may also be called by the
/// control API immediately before a scrape.
pub(crate) struct PipelineMetrics {
    running: IntGaugeVec,
    checkpointed: IntGaugeVec,
}

impl PipelineMetrics {
    pub(crate) fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let running = IntGaugeVec::new(
            Opts::new("prepper_pipeline_running", "1 if the pipeline is in the STARTED state, else 0"),
            &["pipeline"],
        )?;
        let checkpointed = IntGaugeVec::new(
            Opts::new("prepper_pipeline_records_checkpointed", "Total records checkpointed since the pipeline started"),
            &["pipeline"],
        )?;

        registry.register(Box::new(running.clone()))?;
        registry.register(Box::new(checkpointed.clone()))?;

        Ok(Self { running, checkpointed })
    }

    pub(crate) fn observe(&self, pipeline_name: &str, is_running: bool, records_checkpointed: u64) {
        self.running.with_label_values(&[pipeline_name]).set(i64::from(is_running));
        self.checkpointed
            .with_label_values(&[pipeline_name])
            .set(records_checkpointed as i64);
    }
}
