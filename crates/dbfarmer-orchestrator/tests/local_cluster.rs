//! End-to-end runs of the local backend against throwaway node processes.

#![cfg(unix)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbfarmer_orchestrator::backend::{ClusterBackend, LocalBackend, LocalBackendConfig};
use dbfarmer_orchestrator::command::{CommandSpec, SystemCommandRunner};
use dbfarmer_orchestrator::health::{ClusterProbe, HealthChecker, PsqlProbe};
use dbfarmer_orchestrator::lifecycle::{ClusterLifecycle, Operation, Outcome};
use dbfarmer_orchestrator::process::{find_lock_files, read_lock_file, ProcessSupervisor, SupervisorConfig};
use dbfarmer_orchestrator::{ClusterSpec, PlanContext, Result};

/// Stands in for a node: records its pid in `$PGDATA` and sleeps.
fn fake_node() -> CommandSpec {
    CommandSpec::new("sh").arg("-c").arg(
        "mkdir -p \"$PGDATA\" && echo $$ > \"$PGDATA/postmaster.pid\" && exec sleep 30",
    )
}

/// Reports the content id of every data directory holding a readable lock file.
struct LockFileProbe {
    data_root: PathBuf,
}

#[async_trait]
impl ClusterProbe for LockFileProbe {
    async fn content_ids(&self, _address: &str, _port: u16) -> Result<Vec<i32>> {
        let mut ids = Vec::new();
        for path in find_lock_files(&self.data_root, "postmaster.pid").await? {
            // the node may not have written its pid yet
            if read_lock_file(&path).await.is_err() {
                continue;
            }
            let id = path
                .parent()
                .and_then(|dir| dir.file_name())
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix("primary_"))
                .and_then(|id| id.parse::<i32>().ok());
            ids.extend(id);
        }
        Ok(ids)
    }
}

#[tokio::test]
async fn test_supervised_cluster_start_and_teardown() {
    let root = tempfile::tempdir().unwrap();
    let data_root = root.path().join("pgdata");
    let config = SupervisorConfig::builder()
        .data_root(&data_root)
        .entrypoint(fake_node())
        .build();
    let supervisor = ProcessSupervisor::new(config, Arc::new(SystemCommandRunner::new()));
    let spec = ClusterSpec::new(12345, 2).unwrap();

    let mut handles = supervisor
        .start_cluster(&spec, &PlanContext::new("localhost"))
        .await
        .unwrap();
    assert_eq!(handles.len(), 3);

    let checker = HealthChecker::new(Arc::new(LockFileProbe {
        data_root: data_root.clone(),
    }))
    .with_retry_interval(Duration::from_millis(20));
    let report = checker
        .wait_until_ready("localhost", 12345, &spec.content_ids())
        .await
        .unwrap();
    assert_eq!(report.content_ids, vec![-1, 0, 1]);

    let first = supervisor.teardown(false).await.unwrap();
    assert_eq!(first.stopped.len(), 3);
    assert!(first.stale.is_empty());

    // reap the killed nodes so their pids disappear
    for handle in &mut handles {
        handle.wait().await.unwrap();
    }

    let second = supervisor.teardown(true).await.unwrap();
    assert!(second.stopped.is_empty());
    assert_eq!(second.stale.len(), 3);
    assert!(second.data_removed);
    assert!(!data_root.exists());
}

#[tokio::test]
async fn test_dry_run_lifecycle_touches_nothing() {
    let root = tempfile::tempdir().unwrap();
    let runner = Arc::new(SystemCommandRunner::dry_run());
    let data_root = root.path().join("pgdata");
    let backend = LocalBackend::new(
        LocalBackendConfig::builder()
            .coordinator_host("localhost")
            .prepare(LocalBackendConfig::install_extension(root.path()))
            .build(),
        SupervisorConfig::builder()
            .data_root(&data_root)
            .entrypoint(fake_node())
            .build(),
        HealthChecker::new(Arc::new(PsqlProbe::new(runner.clone()))),
        runner,
    );
    assert_eq!(backend.name(), "local");
    let lifecycle = ClusterLifecycle::new(Box::new(backend));

    let outcome = lifecycle
        .execute(Operation::Up(ClusterSpec::new(12345, 1).unwrap()))
        .await
        .unwrap();
    match outcome {
        Outcome::Deployed(deployment) => {
            assert_eq!(deployment.nodes.len(), 2);
            assert!(deployment.pids.is_empty());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!data_root.exists());

    let outcome = lifecycle
        .execute(Operation::Down { remove_data: true })
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::TornDown(_)));
}
