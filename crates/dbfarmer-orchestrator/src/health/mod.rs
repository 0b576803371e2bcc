//! Cluster readiness checks.
//!
//! The coordinator is asked for the content id of every node it can reach.
//! [`HealthChecker`] repeats that query until it succeeds, sleeping a fixed
//! interval between attempts and never giving up on its own.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::command::{CommandRunner, CommandSpec, RetryPolicy};
use crate::error::{OrchestratorError, Result};

/// Query listing the content id of the coordinator and of every segment.
pub const CROSS_NODE_QUERY: &str = "SELECT gp_segment_id FROM gp_id \
     UNION ALL \
     SELECT gp_segment_id FROM gp_dist_random('gp_id');";

/// What counts as a ready cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReadinessPolicy {
    /// The query succeeds and reports exactly the expected content ids.
    #[default]
    AllNodes,

    /// The query succeeds.
    QuerySucceeds,
}

/// Queries a running cluster.
#[async_trait]
pub trait ClusterProbe: Send + Sync {
    /// Returns the content ids the coordinator at `address:port` reports.
    async fn content_ids(&self, address: &str, port: u16) -> Result<Vec<i32>>;

    /// Returns true if the probe does not contact a real cluster.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Probe that runs the cross-node query with `psql`.
pub struct PsqlProbe {
    runner: Arc<dyn CommandRunner>,
    database: String,
}

impl PsqlProbe {
    /// Creates a probe connecting to the `postgres` database.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            database: "postgres".to_string(),
        }
    }

    /// Returns the command for one probe.
    pub fn command(&self, address: &str, port: u16) -> CommandSpec {
        CommandSpec::new("psql")
            .arg(&self.database)
            .args(["-h", address, "-p"])
            .arg(port.to_string())
            .args(["-At", "-c", CROSS_NODE_QUERY])
    }
}

#[async_trait]
impl ClusterProbe for PsqlProbe {
    async fn content_ids(&self, address: &str, port: u16) -> Result<Vec<i32>> {
        let output = self
            .runner
            .run(&self.command(address, port), RetryPolicy::Never)
            .await?;
        parse_content_ids(&output.stdout)
    }

    fn is_dry_run(&self) -> bool {
        self.runner.is_dry_run()
    }
}

fn parse_content_ids(stdout: &str) -> Result<Vec<i32>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<i32>().map_err(|_| {
                OrchestratorError::serialization(format!("unexpected query output: {:?}", line))
            })
        })
        .collect()
}

/// Result of a successful readiness wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    /// Number of probes made, the successful one included.
    pub attempts: u32,

    /// Content ids reported by the successful probe.
    pub content_ids: Vec<i32>,
}

/// Polls a cluster until it is ready.
pub struct HealthChecker {
    probe: Arc<dyn ClusterProbe>,
    policy: ReadinessPolicy,
    retry_interval: Duration,
}

impl HealthChecker {
    /// Creates a checker with the default policy and a one second interval.
    pub fn new(probe: Arc<dyn ClusterProbe>) -> Self {
        Self {
            probe,
            policy: ReadinessPolicy::default(),
            retry_interval: Duration::from_secs(1),
        }
    }

    /// Sets the readiness policy.
    pub fn with_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the interval between attempts.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Returns the readiness policy.
    pub fn policy(&self) -> ReadinessPolicy {
        self.policy
    }

    /// Probes until the cluster is ready.
    ///
    /// Failed probes are retried without limit. The only error returned is a
    /// probe that cannot run at all, such as a missing `psql` binary.
    pub async fn wait_until_ready(
        &self,
        address: &str,
        port: u16,
        expected: &[i32],
    ) -> Result<HealthReport> {
        let expected: BTreeSet<i32> = expected.iter().copied().collect();
        let mut attempts = 0u32;

        info!(address, port, policy = ?self.policy, "Waiting for cluster");

        loop {
            attempts += 1;
            let failure = match self.probe.content_ids(address, port).await {
                Ok(ids) if self.probe.is_dry_run() => {
                    return Ok(HealthReport {
                        attempts,
                        content_ids: ids,
                    });
                }
                Ok(ids) => match self.check(&ids, &expected) {
                    None => {
                        info!(attempts, nodes = ids.len(), "Cluster is ready");
                        return Ok(HealthReport {
                            attempts,
                            content_ids: ids,
                        });
                    }
                    Some(reason) => reason,
                },
                Err(OrchestratorError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(OrchestratorError::Io(e));
                }
                Err(e) => e.to_string(),
            };

            warn!(attempts, reason = %failure, retry_in = ?self.retry_interval, "Cluster not ready");
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    fn check(&self, ids: &[i32], expected: &BTreeSet<i32>) -> Option<String> {
        match self.policy {
            ReadinessPolicy::QuerySucceeds => None,
            ReadinessPolicy::AllNodes => {
                let reported: BTreeSet<i32> = ids.iter().copied().collect();
                debug!(?reported, ?expected, "Comparing reported nodes");
                if reported == *expected && reported.len() == ids.len() {
                    None
                } else {
                    Some(format!("expected nodes {:?}, reported {:?}", expected, ids))
                }
            }
        }
    }
}
