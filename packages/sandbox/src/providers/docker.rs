// ABOUTME: Docker runtime implementation for per-execution sandbox containers
// ABOUTME: Uses bollard library to create, feed, run, and tear down labelled containers

use super::{
    ContainerConfig, ContainerRuntime, OutputChunk, OutputStream, Result, RuntimeError,
    SourceFile, StreamType,
};
use async_trait::async_trait;
use bollard::{
    container::{
        AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
        ListContainersOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
        StopContainerOptions, UploadToContainerOptions, WaitContainerOptions,
    },
    image::CreateImageOptions,
    Docker,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

pub const MANAGED_LABEL: &str = "taskweave.sandbox.managed";

pub struct DockerRuntime {
    client: Docker,
    /// Cache of successfully pulled images to avoid redundant pulls
    /// Key: image name (e.g., "python:3.12-alpine"), Value: when it was pulled
    image_cache: Arc<RwLock<HashMap<String, Instant>>>,
    /// Timeout for image pull operations (default: 10 minutes)
    pull_timeout: Duration,
}

impl DockerRuntime {
    /// Create a new Docker runtime with default timeout (10 minutes)
    pub fn new() -> Result<Self> {
        Self::with_pull_timeout(Duration::from_secs(600))
    }

    /// Create a new Docker runtime with custom pull timeout
    pub fn with_pull_timeout(timeout: Duration) -> Result<Self> {
        let client = Docker::connect_with_defaults()
            .map_err(|e| RuntimeError::ConnectionError(format!("Docker: {}", e)))?;

        Ok(Self::with_client_and_timeout(client, timeout))
    }

    /// Create with a specific Docker connection and custom timeout
    pub fn with_client_and_timeout(client: Docker, timeout: Duration) -> Self {
        Self {
            client,
            image_cache: Arc::new(RwLock::new(HashMap::new())),
            pull_timeout: timeout,
        }
    }

    /// Convert our config to bollard config
    fn to_bollard_config(config: &ContainerConfig) -> Config<String> {
        let mut labels = config.labels.clone();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());

        let host_config = bollard::models::HostConfig {
            memory: Some(config.memory_bytes),
            // Swap equal to memory means no extra swap on top of the ceiling
            memory_swap: Some(config.memory_bytes),
            cpu_period: Some(config.cpu_period),
            cpu_quota: Some(config.cpu_quota),
            auto_remove: Some(config.auto_remove),
            network_mode: config.network_disabled.then(|| "none".to_string()),
            ..Default::default()
        };

        Config {
            image: Some(config.image.clone()),
            cmd: Some(config.command.clone()),
            working_dir: Some(config.working_dir.clone()),
            labels: Some(labels),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            network_disabled: Some(config.network_disabled),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.client.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(RuntimeError::ImageError(e.to_string())),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        info!(
            "Pulling image: {} (timeout: {:?})",
            image, self.pull_timeout
        );

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let stream = self.client.create_image(Some(options), None, None);

        let result = tokio::time::timeout(self.pull_timeout, async {
            let mut stream = stream;
            let mut last_status = String::new();

            while let Some(result) = stream.next().await {
                match result {
                    Ok(info) => {
                        if let Some(status) = &info.status {
                            if status != &last_status {
                                debug!("Pull status: {}", status);
                                last_status = status.clone();
                            }
                        }
                        if let Some(error) = info.error {
                            return Err(RuntimeError::ImageError(format!(
                                "Failed to pull image {}: {}",
                                image, error
                            )));
                        }
                    }
                    Err(e) => {
                        return Err(RuntimeError::ImageError(format!(
                            "Failed to pull image {}: {}",
                            image, e
                        )));
                    }
                }
            }

            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => {
                info!("Successfully pulled image: {}", image);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RuntimeError::ImageError(format!(
                "Timeout pulling image {} after {:?}",
                image, self.pull_timeout
            ))),
        }
    }
}

/// 404 becomes `NotFound` so cleanup can treat "already gone" as done
fn container_err(e: bollard::errors::Error) -> RuntimeError {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::NotFound(message),
        other => RuntimeError::ContainerError(other.to_string()),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn is_available(&self) -> Result<bool> {
        match self.client.ping().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Docker not available: {}", e);
                Ok(false)
            }
        }
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        {
            let cache = self.image_cache.read().await;
            if cache.contains_key(image) {
                debug!("Image {} found in cache, skipping pull", image);
                return Ok(());
            }
        }

        if !self.image_exists(image).await? {
            self.pull_image(image).await?;
        }

        let mut cache = self.image_cache.write().await;
        cache.insert(image.to_string(), Instant::now());
        Ok(())
    }

    async fn create_container(&self, config: &ContainerConfig) -> Result<String> {
        debug!("Creating container: {} ({})", config.name, config.image);

        let options = CreateContainerOptions {
            name: config.name.clone(),
            platform: None,
        };

        let container = self
            .client
            .create_container(Some(options), Self::to_bollard_config(config))
            .await
            .map_err(container_err)?;

        for warning in &container.warnings {
            warn!("Docker warning for {}: {}", config.name, warning);
        }

        Ok(container.id)
    }

    async fn copy_to_container(
        &self,
        container_id: &str,
        dest_dir: &str,
        files: &[SourceFile],
    ) -> Result<()> {
        debug!(
            "Copying {} file(s) to container {}:{}",
            files.len(),
            container_id,
            dest_dir
        );

        let tar_data = create_tar_archive(dest_dir, files)
            .map_err(|e| RuntimeError::InternalError(e.to_string()))?;

        // Unpacking at "/" lets the archive create the destination directory itself
        let options = UploadToContainerOptions {
            path: "/".to_string(),
            ..Default::default()
        };

        self.client
            .upload_to_container(container_id, Some(options), tar_data.into())
            .await
            .map_err(container_err)?;

        Ok(())
    }

    async fn attach_output(&self, container_id: &str) -> Result<OutputStream> {
        let options = AttachContainerOptions::<String> {
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(true),
            ..Default::default()
        };

        let AttachContainerResults { mut output, .. } = self
            .client
            .attach_container(container_id, Some(options))
            .await
            .map_err(container_err)?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let id = container_id.to_string();

        tokio::spawn(async move {
            while let Some(result) = output.next().await {
                match result {
                    Ok(log) => {
                        let (stream, data) = match log {
                            LogOutput::StdOut { message } => (StreamType::Stdout, message.to_vec()),
                            LogOutput::StdErr { message } => (StreamType::Stderr, message.to_vec()),
                            LogOutput::Console { message } => {
                                (StreamType::Stdout, message.to_vec())
                            }
                            _ => continue,
                        };

                        if tx.send(OutputChunk { stream, data }).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => {
                        error!("Error reading output of container {}: {}", id, e);
                        break;
                    }
                }
            }
        });

        Ok(OutputStream { receiver: rx })
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        debug!("Starting container: {}", container_id);

        self.client
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(container_err)?;

        Ok(())
    }

    async fn wait_container(&self, container_id: &str) -> Result<Option<i64>> {
        let options = WaitContainerOptions {
            condition: "not-running".to_string(),
        };

        let mut stream = self.client.wait_container(container_id, Some(options));
        match stream.next().await {
            Some(Ok(response)) => Ok(Some(response.status_code)),
            // bollard reports a non-zero exit as an error; it is still an exit
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                Ok(Some(code))
            }
            Some(Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                ..
            })) => {
                debug!("Container {} removed before wait returned", container_id);
                Ok(None)
            }
            Some(Err(e)) => Err(RuntimeError::ContainerError(e.to_string())),
            None => Ok(None),
        }
    }

    async fn stop_container(&self, container_id: &str, timeout_secs: u64) -> Result<()> {
        debug!(
            "Stopping container: {} (timeout: {}s)",
            container_id, timeout_secs
        );

        let options = StopContainerOptions {
            t: timeout_secs as i64,
        };

        match self.client.stop_container(container_id, Some(options)).await {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(container_err(e)),
        }
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        debug!("Removing container: {} (force: {})", container_id, force);

        let options = RemoveContainerOptions {
            force,
            v: true, // Remove volumes
            ..Default::default()
        };

        match self
            .client
            .remove_container(container_id, Some(options))
            .await
        {
            Ok(()) => Ok(()),
            // 409: auto-removal already in progress
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 409, ..
            }) => Ok(()),
            Err(e) => Err(container_err(e)),
        }
    }

    async fn count_managed(&self) -> Result<usize> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{}=true", MANAGED_LABEL)]);

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(container_err)?;

        Ok(containers.len())
    }
}

/// Build a tar archive placing `files` under `dest_dir`
fn create_tar_archive(dest_dir: &str, files: &[SourceFile]) -> std::io::Result<Vec<u8>> {
    use tar::{Builder, EntryType, Header};

    let dir = dest_dir.trim_matches('/');
    let mut archive = Builder::new(Vec::new());

    if !dir.is_empty() {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        header.set_cksum();
        archive.append_data(&mut header, format!("{}/", dir), std::io::empty())?;
    }

    for file in files {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(file.contents.len() as u64);
        header.set_cksum();

        let path = if dir.is_empty() {
            file.name.clone()
        } else {
            format!("{}/{}", dir, file.name)
        };
        archive.append_data(&mut header, path, file.contents.as_slice())?;
    }

    archive.into_inner()
}
