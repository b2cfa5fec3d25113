//! docker CLI wrapper bound to one registry endpoint

use crate::config::{CommandConfig, RegistryEndpoint};
use crate::docker::runner::{CommandRunner, CommandSpec};
use crate::error::{ReplicatorError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
pub struct DockerCli {
    runner: Arc<dyn CommandRunner>,
    endpoint: RegistryEndpoint,
    config: CommandConfig,
}

impl DockerCli {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        endpoint: RegistryEndpoint,
        config: CommandConfig,
    ) -> Self {
        Self {
            runner,
            endpoint,
            config,
        }
    }

    pub fn endpoint(&self) -> &RegistryEndpoint {
        &self.endpoint
    }

    /// Logs the local docker daemon in to this registry.
    ///
    /// The password goes through stdin so it never shows up in the process list.
    pub async fn login(&self, cancel: &CancellationToken) -> Result<()> {
        if !self.endpoint.has_credentials() {
            info!(registry = %self.endpoint.host(), "no credentials configured, skipping login");
            return Ok(());
        }

        let spec = self.login_command();
        self.runner
            .run(&spec, self.config.quick_timeout, cancel)
            .await
            .map_err(|e| ReplicatorError::Login {
                registry: self.endpoint.host().to_string(),
                source: Box::new(e),
            })?;
        info!(registry = %self.endpoint.host(), user = %self.endpoint.username(), "logged in");
        Ok(())
    }

    pub async fn pull(
        &self,
        repository: &str,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.action("pull", repository, tag, self.config.transfer_timeout, cancel)
            .await
    }

    pub async fn push(
        &self,
        repository: &str,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.action("push", repository, tag, self.config.transfer_timeout, cancel)
            .await
    }

    /// Tags the local image `source/repository:tag` as `repository:tag` on this registry
    pub async fn tag_from(
        &self,
        source: &RegistryEndpoint,
        repository: &str,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let spec = self.tag_command(source, repository, tag);
        info!(
            from = %source.image_reference(repository, tag),
            to = %self.endpoint.image_reference(repository, tag),
            "tag image"
        );
        self.runner
            .run(&spec, self.config.quick_timeout, cancel)
            .await
    }

    async fn action(
        &self,
        action: &str,
        repository: &str,
        tag: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let image = self.endpoint.image_reference(repository, tag);
        info!(%image, "{} image", action);
        let spec = CommandSpec::new(self.config.program.as_str(), [action, image.as_str()]);
        self.runner.run(&spec, timeout, cancel).await
    }

    fn login_command(&self) -> CommandSpec {
        CommandSpec::new(
            self.config.program.as_str(),
            [
                "login",
                "-u",
                self.endpoint.username(),
                "--password-stdin",
                self.endpoint.host(),
            ],
        )
        .with_stdin(self.endpoint.password())
    }

    fn tag_command(&self, source: &RegistryEndpoint, repository: &str, tag: &str) -> CommandSpec {
        CommandSpec::new(
            self.config.program.as_str(),
            [
                "tag".to_string(),
                source.image_reference(repository, tag),
                self.endpoint.image_reference(repository, tag),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scheme;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<(CommandSpec, Duration)>>,
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(
            &self,
            spec: &CommandSpec,
            timeout: Duration,
            _cancel: &CancellationToken,
        ) -> Result<()> {
            self.calls.lock().unwrap().push((spec.clone(), timeout));
            Ok(())
        }
    }

    fn endpoint(host: &str, user: &str) -> RegistryEndpoint {
        RegistryEndpoint::parse(host, user, "pw", Scheme::Https).unwrap()
    }

    fn cli(runner: Arc<RecordingRunner>, host: &str, user: &str) -> DockerCli {
        let config = CommandConfig {
            quick_timeout: Duration::from_secs(5),
            transfer_timeout: Duration::from_secs(600),
            ..CommandConfig::default()
        };
        DockerCli::new(runner, endpoint(host, user), config)
    }

    #[tokio::test]
    async fn test_login_uses_password_stdin() {
        let runner = Arc::new(RecordingRunner::default());
        let docker = cli(runner.clone(), "harbor.local", "admin");
        docker.login(&CancellationToken::new()).await.unwrap();

        let calls = runner.calls.lock().unwrap();
        let (spec, timeout) = &calls[0];
        assert_eq!(spec.to_string(), "docker login -u admin --password-stdin harbor.local");
        assert_eq!(spec.stdin.as_deref(), Some(b"pw".as_slice()));
        assert_eq!(*timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_login_without_credentials_is_skipped() {
        let runner = Arc::new(RecordingRunner::default());
        let docker = cli(runner.clone(), "harbor.local", "");
        docker.login(&CancellationToken::new()).await.unwrap();
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transfer_commands() {
        let runner = Arc::new(RecordingRunner::default());
        let source = cli(runner.clone(), "harbor.local", "admin");
        let remote = cli(runner.clone(), "mirror.example.com", "bot");
        let cancel = CancellationToken::new();

        source.pull("app/web", "v2", &cancel).await.unwrap();
        remote.tag_from(source.endpoint(), "app/web", "v2", &cancel).await.unwrap();
        remote.push("app/web", "v2", &cancel).await.unwrap();

        let calls = runner.calls.lock().unwrap();
        let printed: Vec<_> = calls.iter().map(|(s, t)| (s.to_string(), t.as_secs())).collect();
        assert_eq!(
            printed,
            vec![
                ("docker pull harbor.local/app/web:v2".to_string(), 600),
                ("docker tag harbor.local/app/web:v2 mirror.example.com/app/web:v2".to_string(), 5),
                ("docker push mirror.example.com/app/web:v2".to_string(), 600),
            ]
        );
    }
}
