use std::collections::BTreeSet;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use fleetrun_core::*;
use fleetrun_exec::{ExecError, LocalExecutor, ReachabilityProbe, RemoteExecutor};

// Every host is served by the local shell
struct LocalFactory;

#[async_trait]
impl TransportFactory for LocalFactory {
    async fn create(
        &self,
        _host: &Host,
        _credential: &CredentialContext,
    ) -> Result<Arc<dyn RemoteExecutor>, ExecError> {
        Ok(Arc::new(LocalExecutor::new()))
    }
}

struct MockProbe {
    down: Vec<&'static str>,
}

#[async_trait]
impl ReachabilityProbe for MockProbe {
    async fn is_reachable(&self, host: &str, _timeout: Duration) -> bool {
        // later hosts answer sooner so completion order differs from host order
        let delay = match host {
            "alpha" => 150,
            "bravo" => 75,
            _ => 0,
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        !self.down.iter().any(|d| *d == host)
    }
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new(hosts: &str, bundle: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hosts.txt"), hosts).unwrap();
        let bundle_path = dir.path().join("cmds.sh");
        std::fs::write(&bundle_path, bundle).unwrap();
        std::fs::set_permissions(&bundle_path, std::fs::Permissions::from_mode(0o644)).unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        std::fs::create_dir(dir.path().join("remote")).unwrap();
        Self { dir }
    }

    fn out(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    fn config(&self) -> RunConfig {
        let mut config = RunConfig::new(
            self.dir.path().join("hosts.txt"),
            self.dir.path().join("cmds.sh"),
            self.out(),
        );
        config.rate = 100;
        config.run_id = "777".to_string();
        config.remote_tmp_dir = self.dir.path().join("remote").display().to_string();
        config
    }

    fn result(&self, host: &str) -> String {
        std::fs::read_to_string(self.out().join(format!("{host}.txt"))).unwrap()
    }

    fn result_files(&self) -> BTreeSet<String> {
        list(&self.out())
    }
}

fn list(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

fn credential() -> Arc<CredentialContext> {
    Arc::new(CredentialContext::PasswordlessPrivileged {
        user: "root".to_string(),
    })
}

async fn run(config: RunConfig, down: Vec<&'static str>) -> (RunSummary, String) {
    let mut console = Vec::new();
    let summary = Engine::new(config)
        .unwrap()
        .run(
            credential(),
            Arc::new(MockProbe { down }),
            Arc::new(LocalFactory),
            &mut console,
        )
        .await
        .unwrap();
    (summary, String::from_utf8(console).unwrap())
}

#[tokio::test]
async fn test_bundle_runs_and_is_removed() {
    let fixture = Fixture::new("alpha\nbravo\n", "#!/bin/sh\necho \"ran $0\" >&2\necho done\n");

    let (summary, _) = run(fixture.config(), vec![]).await;

    assert_eq!(summary.host_count, 2);
    assert_eq!(summary.failed, 0);
    for host in ["alpha", "bravo"] {
        let content = fixture.result(host);
        assert!(content.contains("done\n"), "{host}: {content}");
        assert!(content.contains("cmds.sh.777"), "{host}: {content}");
    }
    // the transferred copy is gone after execution
    assert!(list(&fixture.dir.path().join("remote")).is_empty());
}

#[tokio::test]
async fn test_exit_status_propagates_through_cleanup() {
    let fixture = Fixture::new("alpha\n", "#!/bin/sh\necho partial\nexit 9\n");

    let (summary, _) = run(fixture.config(), vec![]).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(fixture.result("alpha"), "partial\n");
    assert!(list(&fixture.dir.path().join("remote")).is_empty());
}

#[tokio::test]
async fn test_unreachable_host_gets_sentinel() {
    let fixture = Fixture::new("alpha\ncharlie\n", "#!/bin/sh\necho up\n");

    let (summary, _) = run(fixture.config(), vec!["charlie"]).await;

    assert_eq!(summary.unreachable, 1);
    assert_eq!(fixture.result("charlie"), "charlie Unreachable");
    assert_eq!(fixture.result("alpha"), "up\n");
}

#[tokio::test]
async fn test_transfer_failure_does_not_stop_other_hosts() {
    let fixture = Fixture::new("alpha\nbravo\n", "#!/bin/sh\necho up\n");
    let mut config = fixture.config();
    config.remote_tmp_dir = fixture.dir.path().join("no-such-dir").display().to_string();

    let (summary, _) = run(config, vec![]).await;

    assert_eq!(summary.host_count, 2);
    assert_eq!(summary.failed, 2);
    for host in ["alpha", "bravo"] {
        let content = fixture.result(host);
        assert!(content.starts_with("transfer to "), "{host}: {content}");
    }
}

#[tokio::test]
async fn test_aggregate_follows_host_order_not_completion_order() {
    let fixture = Fixture::new("charlie\nalpha\nbravo\n", "#!/bin/sh\necho ok\n");
    let mut config = fixture.config();
    config.rate = 0;
    config.aggregate = AggregateSinks {
        to_file: false,
        to_console: true,
    };

    let (_, console) = run(config, vec![]).await;

    assert_eq!(
        console,
        "----- alpha -----\nok\n\n----- bravo -----\nok\n\n----- charlie -----\nok\n\n"
    );
    assert!(!fixture.out().join("aggregate-777.txt").exists());
}

#[tokio::test]
async fn test_rerun_reproduces_same_result_files() {
    let fixture = Fixture::new("alpha\nbravo\n#charlie\n", "#!/bin/sh\necho ok\n");
    let mut config = fixture.config();
    config.aggregate = AggregateSinks {
        to_file: true,
        to_console: false,
    };

    run(config.clone(), vec![]).await;
    let first = fixture.result_files();
    run(config, vec![]).await;
    let second = fixture.result_files();

    assert_eq!(first, second);
    assert_eq!(
        first,
        BTreeSet::from([
            "aggregate-777.txt".to_string(),
            "alpha.txt".to_string(),
            "bravo.txt".to_string(),
        ])
    );
}
