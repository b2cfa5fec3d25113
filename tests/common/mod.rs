#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use harbor_replicator::config::{CommandConfig, RegistryEndpoint, Scheme};
use harbor_replicator::docker::{CommandRunner, CommandSpec};
use harbor_replicator::registry::{CatalogSource, Project, TagRecord};
use harbor_replicator::{ReplicatorError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
}

pub fn endpoint(host: &str) -> RegistryEndpoint {
    RegistryEndpoint::parse(host, "user", "pass", Scheme::Https).unwrap()
}

pub fn command_config() -> CommandConfig {
    CommandConfig {
        quick_timeout: Duration::from_secs(5),
        transfer_timeout: Duration::from_secs(30),
        ..CommandConfig::default()
    }
}

/// In-memory catalog whose content can change between detection cycles
#[derive(Default)]
pub struct FakeCatalog {
    projects: Mutex<Vec<(String, Vec<String>)>>,
    tags: Mutex<HashMap<String, Vec<TagRecord>>>,
    broken_projects: Mutex<HashSet<String>>,
    broken_repositories: Mutex<HashSet<String>>,
    broken_listing: AtomicBool,
}

impl FakeCatalog {
    pub fn add_project(&self, name: &str, repositories: &[&str]) {
        self.projects.lock().unwrap().push((
            name.to_string(),
            repositories.iter().map(|r| r.to_string()).collect(),
        ));
    }

    pub fn set_tags(&self, repository: &str, tags: &[(&str, DateTime<Utc>)]) {
        self.tags.lock().unwrap().insert(
            repository.to_string(),
            tags.iter().map(|(name, created)| TagRecord::new(*name, *created)).collect(),
        );
    }

    pub fn break_project(&self, name: &str, broken: bool) {
        let mut set = self.broken_projects.lock().unwrap();
        if broken {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    pub fn break_projects_listing(&self, broken: bool) {
        self.broken_listing.store(broken, Ordering::SeqCst);
    }

    pub fn break_repository(&self, name: &str, broken: bool) {
        let mut set = self.broken_repositories.lock().unwrap();
        if broken {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }
}

#[async_trait]
impl CatalogSource for FakeCatalog {
    async fn list_projects(&self) -> Result<Vec<Project>> {
        if self.broken_listing.load(Ordering::SeqCst) {
            return Err(ReplicatorError::Registry(
                "project listing unavailable".to_string(),
            ));
        }
        Ok(self
            .projects
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, (name, _))| Project {
                name: name.clone(),
                project_id: i as i64 + 1,
            })
            .collect())
    }

    async fn list_repositories(&self, project: &Project) -> Result<Vec<String>> {
        let project = project.name.as_str();
        if self.broken_projects.lock().unwrap().contains(project) {
            return Err(ReplicatorError::Registry(format!(
                "project {} unavailable",
                project
            )));
        }
        self.projects
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == project)
            .map(|(_, repositories)| repositories.clone())
            .ok_or_else(|| ReplicatorError::Registry(format!("Can't find project {}", project)))
    }

    async fn list_tags(&self, repository: &str) -> Result<Vec<TagRecord>> {
        if self.broken_repositories.lock().unwrap().contains(repository) {
            return Err(ReplicatorError::Parse(format!("malformed tags for {}", repository)));
        }
        Ok(self
            .tags
            .lock()
            .unwrap()
            .get(repository)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    Fail,
    /// Block until cancelled or timed out
    Hang,
}

/// Command runner that records invocations instead of spawning processes
#[derive(Default)]
pub struct ScriptedRunner {
    calls: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<String>>,
    rules: Mutex<Vec<(String, Behavior)>>,
}

impl ScriptedRunner {
    /// Commands whose printed form contains `needle` behave as `behavior`
    pub fn on(&self, needle: &str, behavior: Behavior) {
        self.rules.lock().unwrap().push((needle.to_string(), behavior));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }

    fn behavior_for(&self, command: &str) -> Behavior {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, behavior)| *behavior)
            .unwrap_or(Behavior::Succeed)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let command = spec.to_string();
        self.calls.lock().unwrap().push(command.clone());

        match self.behavior_for(&command) {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(ReplicatorError::Command {
                command,
                reason: "finished with exit status: 1".to_string(),
            }),
            Behavior::Hang => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.cancelled.lock().unwrap().push(command.clone());
                        Err(ReplicatorError::CommandCancelled { command })
                    }
                    _ = tokio::time::sleep(timeout) => {
                        Err(ReplicatorError::CommandTimeout { command, timeout })
                    }
                }
            }
        }
    }
}
