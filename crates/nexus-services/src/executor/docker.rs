//! `bench` commands run inside the ERP backend container with `docker exec`
//!
//! Arguments are passed as an argv vector (no shell), with the bench directory as the
//! working directory, so site names and passwords are never interpolated into a script.

use async_trait::async_trait;
use nexus_core::{AppError, Config};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

use super::{SiteCreateOutcome, SiteExecutor, SiteSpec};

const DROP_SITE_TIMEOUT: Duration = Duration::from_secs(60);
const PROXY_TIMEOUT: Duration = Duration::from_secs(60);
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Captured result of one finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn combined_lowercase(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr).to_lowercase()
    }

    /// Last few hundred bytes of stderr, for error messages.
    fn stderr_tail(&self) -> String {
        let trimmed = self.stderr.trim();
        let start = trimmed
            .char_indices()
            .rev()
            .nth(299)
            .map(|(i, _)| i)
            .unwrap_or(0);
        trimmed[start..].to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to start command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("command timed out after {0:?}")]
    TimedOut(Duration),
}

impl From<CommandError> for AppError {
    fn from(err: CommandError) -> Self {
        AppError::Internal(format!("Executor command failed: {}", err))
    }
}

/// Classify a finished `bench new-site` run.
pub fn classify_new_site(output: &CommandOutput) -> SiteCreateOutcome {
    if output.success() {
        return SiteCreateOutcome::Created;
    }
    if output.combined_lowercase().contains("already exists") {
        return SiteCreateOutcome::AlreadyExists;
    }
    match output.exit_code {
        Some(code) => SiteCreateOutcome::Failed(format!(
            "bench new-site exited with {}: {}",
            code,
            output.stderr_tail()
        )),
        // Killed by a signal: the command may have been partway through.
        None => SiteCreateOutcome::Unknown(format!(
            "bench new-site was terminated: {}",
            output.stderr_tail()
        )),
    }
}

#[derive(Debug, Clone)]
pub struct DockerBenchExecutor {
    container: String,
    bench_path: String,
    db_root_password: String,
    site_create_timeout: Duration,
    app_install_timeout: Duration,
}

impl DockerBenchExecutor {
    pub fn new(config: &Config) -> Self {
        Self {
            container: config.backend_container().to_string(),
            bench_path: config.bench_path().to_string(),
            db_root_password: config.db_root_password().to_string(),
            site_create_timeout: config.site_create_timeout(),
            app_install_timeout: config.app_install_timeout(),
        }
    }

    fn docker_exec_args(&self, program: &str, args: &[&str]) -> Vec<String> {
        let mut argv = vec![
            "exec".to_string(),
            "-w".to_string(),
            self.bench_path.clone(),
            self.container.clone(),
            program.to_string(),
        ];
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }

    /// Run `program args..` in the container. `describe` is what gets logged in place of
    /// the argv, which may hold passwords.
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
        describe: &str,
    ) -> Result<CommandOutput, CommandError> {
        let start = Instant::now();
        tracing::debug!(container = %self.container, command = %describe, "Running container command");

        let child = Command::new("docker")
            .args(self.docker_exec_args(program, args))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let result = CommandOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                };
                tracing::debug!(
                    command = %describe,
                    exit_code = ?result.exit_code,
                    duration_ms = start.elapsed().as_millis(),
                    "Container command finished"
                );
                Ok(result)
            }
            Ok(Err(e)) => Err(CommandError::Spawn(e)),
            Err(_) => {
                tracing::warn!(command = %describe, timeout_secs = timeout.as_secs(), "Container command timed out");
                Err(CommandError::TimedOut(timeout))
            }
        }
    }

    async fn bench(
        &self,
        args: &[&str],
        timeout: Duration,
        describe: &str,
    ) -> Result<CommandOutput, CommandError> {
        self.run("bench", args, timeout, describe).await
    }
}

#[async_trait]
impl SiteExecutor for DockerBenchExecutor {
    #[tracing::instrument(skip(self, spec), fields(site = %spec.site_name))]
    async fn create_site(&self, spec: &SiteSpec) -> SiteCreateOutcome {
        let args = [
            "new-site",
            spec.site_name.as_str(),
            "--admin-password",
            spec.admin_password.as_str(),
            "--db-root-password",
            self.db_root_password.as_str(),
            "--no-mariadb-socket",
        ];
        let describe = format!("bench new-site {}", spec.site_name);

        match self.bench(&args, self.site_create_timeout, &describe).await {
            Ok(output) => classify_new_site(&output),
            // Nothing ran, so nothing was created.
            Err(CommandError::Spawn(e)) => {
                SiteCreateOutcome::Failed(format!("could not start docker exec: {}", e))
            }
            Err(err @ CommandError::TimedOut(_)) => SiteCreateOutcome::Unknown(err.to_string()),
        }
    }

    async fn site_exists(&self, site_name: &str) -> Result<bool, AppError> {
        let config_path = format!("sites/{}/site_config.json", site_name);
        let output = self
            .run(
                "test",
                &["-f", config_path.as_str()],
                PROBE_TIMEOUT,
                &format!("test -f {}", config_path),
            )
            .await?;
        match output.exit_code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            other => Err(AppError::Internal(format!(
                "Could not determine whether site {} exists (exit {:?}): {}",
                site_name,
                other,
                output.stderr_tail()
            ))),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn install_app(&self, site_name: &str, app: &str) -> Result<(), AppError> {
        let describe = format!("bench --site {} install-app {}", site_name, app);
        let output = self
            .bench(
                &["--site", site_name, "install-app", app],
                self.app_install_timeout,
                &describe,
            )
            .await?;
        if output.success() || output.combined_lowercase().contains("already installed") {
            return Ok(());
        }
        Err(AppError::Internal(format!(
            "install-app {} failed: {}",
            app,
            output.stderr_tail()
        )))
    }

    #[tracing::instrument(skip(self))]
    async fn drop_site(&self, site_name: &str) -> Result<(), AppError> {
        let describe = format!("bench drop-site {}", site_name);
        let output = self
            .bench(
                &[
                    "drop-site",
                    site_name,
                    "--db-root-password",
                    self.db_root_password.as_str(),
                    "--force",
                ],
                DROP_SITE_TIMEOUT,
                &describe,
            )
            .await?;
        if output.success() {
            tracing::info!(site = %site_name, "Site dropped");
            return Ok(());
        }
        Err(AppError::Internal(format!(
            "drop-site {} failed: {}",
            site_name,
            output.stderr_tail()
        )))
    }

    async fn reload_proxy(&self) -> Result<(), AppError> {
        let output = self
            .bench(&["setup", "nginx", "--yes"], PROXY_TIMEOUT, "bench setup nginx")
            .await?;
        if !output.success() {
            return Err(AppError::Internal(format!(
                "bench setup nginx failed: {}",
                output.stderr_tail()
            )));
        }
        let output = self
            .run(
                "sudo",
                &["nginx", "-s", "reload"],
                PROBE_TIMEOUT,
                "sudo nginx -s reload",
            )
            .await?;
        if !output.success() {
            return Err(AppError::Internal(format!(
                "nginx reload failed: {}",
                output.stderr_tail()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::ProvisionerConfig;

    fn output(exit_code: Option<i32>, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn classify_success() {
        assert_eq!(
            classify_new_site(&output(Some(0), "Site acme.localhost created", "")),
            SiteCreateOutcome::Created
        );
    }

    #[test]
    fn classify_existing_site() {
        assert_eq!(
            classify_new_site(&output(Some(1), "", "Site acme.localhost already exists")),
            SiteCreateOutcome::AlreadyExists
        );
    }

    #[test]
    fn classify_failure_and_signal() {
        assert!(matches!(
            classify_new_site(&output(Some(1), "", "Access denied for user 'root'")),
            SiteCreateOutcome::Failed(msg) if msg.contains("Access denied")
        ));
        assert!(matches!(
            classify_new_site(&output(None, "", "")),
            SiteCreateOutcome::Unknown(_)
        ));
    }

    #[test]
    fn stderr_tail_is_bounded() {
        let long = "é".repeat(1000);
        let tail = output(Some(1), "", &long).stderr_tail();
        assert_eq!(tail.chars().count(), 300);
    }

    #[test]
    fn argv_has_no_shell() {
        let config = Config::new(ProvisionerConfig {
            backend_container: "backend".to_string(),
            bench_path: "/bench".to_string(),
            ..Default::default()
        });
        let executor = DockerBenchExecutor::new(&config);
        let argv = executor.docker_exec_args("bench", &["new-site", "acme.localhost; rm -rf /"]);
        assert_eq!(
            argv,
            vec![
                "exec",
                "-w",
                "/bench",
                "backend",
                "bench",
                "new-site",
                "acme.localhost; rm -rf /"
            ]
        );
    }
}
