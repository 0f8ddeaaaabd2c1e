//! Minimal MLflow REST client, enough to record one training run:
//! resolve the experiment, create a run, log params/metrics/tags in one
//! batch, terminate the run.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct MlflowClient {
    base_url: String,
    experiment: String,
    http: reqwest::Client,
}

impl MlflowClient {
    pub fn new(base_url: impl Into<String>, experiment: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            experiment: experiment.into(),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{}", self.base_url, path)
    }

    async fn experiment_id(&self) -> Result<String> {
        let response = self
            .http
            .get(self.endpoint("experiments/get-by-name"))
            .query(&[("experiment_name", self.experiment.as_str())])
            .send()
            .await?;

        if response.status().is_success() {
            let body: Value = response.json().await?;
            if let Some(id) = body
                .pointer("/experiment/experiment_id")
                .and_then(|v| v.as_str())
            {
                return Ok(id.to_string());
            }
        }

        debug!("Experiment '{}' not found, creating it", self.experiment);
        let body: Value = self
            .http
            .post(self.endpoint("experiments/create"))
            .json(&json!({ "name": self.experiment }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        body.get("experiment_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| PipelineError::ApiFormat("experiment create returned no id".into()))
    }

    /// Records one finished run with the given params, metrics and tags.
    pub async fn log_run(
        &self,
        run_name: &str,
        params: &[(&str, String)],
        metrics: &[(&str, f64)],
        tags: &[(&str, &str)],
    ) -> Result<()> {
        let experiment_id = self.experiment_id().await?;
        let now = Utc::now().timestamp_millis();

        let body: Value = self
            .http
            .post(self.endpoint("runs/create"))
            .json(&json!({
                "experiment_id": experiment_id,
                "run_name": run_name,
                "start_time": now,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let run_id = body
            .pointer("/run/info/run_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::ApiFormat("run create returned no run_id".into()))?
            .to_string();

        let params: Vec<Value> = params
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": v }))
            .collect();
        let metrics: Vec<Value> = metrics
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": v, "timestamp": now, "step": 0 }))
            .collect();
        let tags: Vec<Value> = tags
            .iter()
            .map(|(k, v)| json!({ "key": k, "value": v }))
            .collect();

        self.http
            .post(self.endpoint("runs/log-batch"))
            .json(&json!({
                "run_id": run_id,
                "params": params,
                "metrics": metrics,
                "tags": tags,
            }))
            .send()
            .await?
            .error_for_status()?;

        self.http
            .post(self.endpoint("runs/update"))
            .json(&json!({
                "run_id": run_id,
                "status": "FINISHED",
                "end_time": Utc::now().timestamp_millis(),
            }))
            .send()
            .await?
            .error_for_status()?;

        info!("Logged training run '{}' to {}", run_name, self.base_url);
        Ok(())
    }
}
