//! Run orchestration: setup checks, dispatch, aggregation, summary

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use fleetrun_exec::ReachabilityProbe;
use nix::unistd::{AccessFlags, access};
use tracing::info;

use crate::aggregate::Aggregator;
use crate::config::RunConfig;
use crate::credential::CredentialContext;
use crate::dispatcher::{Dispatcher, LaunchRate};
use crate::error::CoreError;
use crate::registry::HostRegistry;
use crate::summary::RunSummary;
use crate::task::{HostTask, TaskContext, TransportFactory};

/// A validated run, ready to dispatch
#[derive(Debug)]
pub struct Engine {
    config: RunConfig,
    registry: HostRegistry,
}

impl Engine {
    /// Validate inputs and load the host list
    ///
    /// # Errors
    /// - `CoreError::Input` for a bad host list or command bundle
    /// - `CoreError::Permission` for an inaccessible output directory
    pub fn new(config: RunConfig) -> Result<Self, CoreError> {
        let registry = HostRegistry::load(&config.host_list)?;
        validate_bundle(&config.bundle)?;
        validate_output_dir(&config.output_dir)?;

        info!(
            hosts = registry.len(),
            bundle = %config.bundle.display(),
            output_dir = %config.output_dir.display(),
            run_id = %config.run_id,
            "run prepared"
        );

        Ok(Self { config, registry })
    }

    /// Hosts of this run
    #[must_use]
    pub fn registry(&self) -> &HostRegistry {
        &self.registry
    }

    /// Dispatch every host, aggregate, and summarize
    ///
    /// Host failures never produce an error here; they live in the result files.
    ///
    /// # Errors
    /// Returns `CoreError::Aggregate` or `CoreError::Input` if the requested
    /// aggregate cannot be produced
    pub async fn run(
        self,
        credential: Arc<CredentialContext>,
        probe: Arc<dyn ReachabilityProbe>,
        factory: Arc<dyn TransportFactory>,
        console: &mut dyn Write,
    ) -> Result<RunSummary, CoreError> {
        let ctx = Arc::new(TaskContext {
            bundle: self.config.bundle.clone(),
            credential,
            output_dir: self.config.output_dir.clone(),
            run_id: self.config.run_id.clone(),
            remote_tmp_dir: self.config.remote_tmp_dir.clone(),
            probe_timeout: self.config.probe_timeout,
            probe,
            factory,
        });

        let tasks = self
            .registry
            .iter()
            .map(|host| HostTask::new(host.clone(), ctx.clone()))
            .collect();

        let report = Dispatcher::new(LaunchRate::new(self.config.rate))
            .dispatch(tasks)
            .await;
        let summary = RunSummary::from_report(self.registry.len(), &report);

        if self.config.aggregate.any() {
            Aggregator::new(&self.config.output_dir, &self.config.host_list).emit(
                self.config.aggregate,
                &self.config.aggregate_prefix,
                &self.config.run_id,
                console,
            )?;
        }

        info!(
            hosts = summary.host_count,
            elapsed_seconds = summary.elapsed_seconds,
            unreachable = summary.unreachable,
            failed = summary.failed,
            "run complete"
        );

        Ok(summary)
    }
}

/// Bundle must be an existing, non-empty, readable file
///
/// # Errors
/// Returns `CoreError::Input` otherwise
pub fn validate_bundle(path: &Path) -> Result<(), CoreError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| CoreError::Input(format!("command bundle {}: {e}", path.display())))?;

    if !metadata.is_file() {
        return Err(CoreError::Input(format!(
            "command bundle {} is not a file",
            path.display()
        )));
    }
    if metadata.len() == 0 {
        return Err(CoreError::Input(format!(
            "command bundle {} is empty",
            path.display()
        )));
    }

    std::fs::File::open(path).map_err(|e| {
        CoreError::Input(format!("command bundle {} unreadable: {e}", path.display()))
    })?;

    Ok(())
}

/// Output directory must exist and accept new files
///
/// # Errors
/// Returns `CoreError::Permission` otherwise
pub fn validate_output_dir(path: &Path) -> Result<(), CoreError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| CoreError::Permission(format!("output directory {}: {e}", path.display())))?;

    if !metadata.is_dir() {
        return Err(CoreError::Permission(format!(
            "output directory {} is not a directory",
            path.display()
        )));
    }

    let writable = access(path, AccessFlags::W_OK | AccessFlags::X_OK).is_ok();
    if !writable {
        return Err(CoreError::Permission(format!(
            "output directory {} is not writable",
            path.display()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::PathBuf;

    use super::*;
    use crate::config::AggregateSinks;
    use crate::testing::{ScriptedFactory, StaticProbe, password_credential};

    struct Workspace {
        dir: tempfile::TempDir,
        out: PathBuf,
    }

    fn workspace(hosts: &str) -> Workspace {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hosts.txt"), hosts).unwrap();
        std::fs::write(dir.path().join("cmds.sh"), "#!/bin/sh\nuptime\n").unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        Workspace { dir, out }
    }

    fn config(ws: &Workspace) -> RunConfig {
        let mut config = RunConfig::new(
            ws.dir.path().join("hosts.txt"),
            ws.dir.path().join("cmds.sh"),
            &ws.out,
        );
        config.rate = 0;
        config.run_id = "31337".to_string();
        config
    }

    #[test]
    fn test_missing_bundle_is_input_error() {
        let ws = workspace("a\n");
        let mut config = config(&ws);
        config.bundle = ws.dir.path().join("missing.sh");
        assert!(matches!(Engine::new(config), Err(CoreError::Input(_))));
    }

    #[test]
    fn test_empty_bundle_is_input_error() {
        let ws = workspace("a\n");
        std::fs::write(ws.dir.path().join("cmds.sh"), "").unwrap();
        assert!(matches!(Engine::new(config(&ws)), Err(CoreError::Input(_))));
    }

    #[test]
    fn test_empty_host_list_is_input_error() {
        let ws = workspace("# nobody\n\n");
        assert!(matches!(Engine::new(config(&ws)), Err(CoreError::Input(_))));
    }

    #[test]
    fn test_missing_output_dir_is_permission_error() {
        let ws = workspace("a\n");
        let mut config = config(&ws);
        config.output_dir = ws.dir.path().join("nope");
        assert!(matches!(
            Engine::new(config),
            Err(CoreError::Permission(_))
        ));
    }

    #[test]
    fn test_output_dir_must_be_directory() {
        let ws = workspace("a\n");
        let mut config = config(&ws);
        config.output_dir = ws.dir.path().join("cmds.sh");
        assert!(matches!(
            Engine::new(config),
            Err(CoreError::Permission(_))
        ));
    }

    #[test]
    fn test_output_dir_write_access() {
        use std::os::unix::fs::PermissionsExt;

        let ws = workspace("a\n");
        assert!(validate_output_dir(&ws.out).is_ok());

        // root bypasses mode bits
        if nix::unistd::geteuid().is_root() {
            return;
        }
        std::fs::set_permissions(&ws.out, std::fs::Permissions::from_mode(0o555)).unwrap();
        let result = validate_output_dir(&ws.out);
        std::fs::set_permissions(&ws.out, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(matches!(result, Err(CoreError::Permission(_))));
    }

    #[tokio::test]
    async fn test_run_writes_one_file_per_host() {
        let ws = workspace("a\nb\na\n#c\nx\n");
        let engine = Engine::new(config(&ws)).unwrap();
        assert_eq!(engine.registry().len(), 3);

        let mut console = Vec::new();
        let summary = engine
            .run(
                password_credential(),
                Arc::new(StaticProbe::down(&["x"])),
                Arc::new(ScriptedFactory::default()),
                &mut console,
            )
            .await
            .unwrap();

        assert_eq!(summary.host_count, 3);
        assert_eq!(summary.unreachable, 1);
        assert_eq!(summary.failed, 0);
        assert!(console.is_empty());

        let files: HashSet<String> = std::fs::read_dir(&ws.out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            files,
            HashSet::from(["a.txt".into(), "b.txt".into(), "x.txt".into()])
        );
        assert_eq!(
            std::fs::read_to_string(ws.out.join("x.txt")).unwrap(),
            "x Unreachable"
        );
    }

    #[tokio::test]
    async fn test_run_aggregates_to_file_and_console() {
        let ws = workspace("b\na\n");
        let mut config = config(&ws);
        config.aggregate = AggregateSinks {
            to_file: true,
            to_console: true,
        };
        let factory = ScriptedFactory::default()
            .with_output("a", "A-out", 0)
            .with_output("b", "B-out", 0);

        let mut console = Vec::new();
        Engine::new(config)
            .unwrap()
            .run(
                password_credential(),
                Arc::new(StaticProbe::default()),
                Arc::new(factory),
                &mut console,
            )
            .await
            .unwrap();

        let expected = "----- a -----\nA-out\n\n----- b -----\nB-out\n\n";
        assert_eq!(
            std::fs::read_to_string(ws.out.join("aggregate-31337.txt")).unwrap(),
            expected
        );
        assert_eq!(String::from_utf8(console).unwrap(), expected);
    }
}
