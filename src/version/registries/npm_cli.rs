//! npm registry queries through the `npm info` command

use tokio::process::Command;
use tracing::{debug, warn};

use crate::version::error::RegistryError;
use crate::version::registry::Registry;
use crate::version::types::{DependencyManifest, TimeIndex};

/// Registry implementation that shells out to `npm info <spec> <field> --json`
///
/// Uses whatever registry and credentials the local npm is configured with,
/// unless a registry is set with [`NpmCliRegistry::with_registry`].
pub struct NpmCliRegistry {
    program: String,
    leading_args: Vec<String>,
    registry: Option<String>,
}

impl NpmCliRegistry {
    pub fn new() -> Self {
        Self::with_command("npm", Vec::new())
    }

    /// Run a different executable, with `leading_args` placed before `info`
    pub fn with_command(program: impl Into<String>, leading_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            leading_args,
            registry: None,
        }
    }

    /// Query `url` instead of the registry from the npm configuration
    pub fn with_registry(mut self, url: &str) -> Self {
        self.registry = Some(url.to_string());
        self
    }

    /// Runs `npm info` and returns trimmed stdout
    async fn info(&self, spec: &str, field: &str) -> Result<String, RegistryError> {
        debug!("npm info {} {} --json", spec, field);

        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .args(["info", spec, field, "--json"]);
        if let Some(url) = &self.registry {
            command.args(["--registry", url.as_str()]);
        }

        let output = command
            .output()
            .await
            .map_err(|e| {
                RegistryError::Command(format!("failed to run {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!("npm info {} {} failed: {}", spec, field, stderr);
            if stderr.contains("E404") {
                return Err(RegistryError::NotFound(spec.to_string()));
            }
            return Err(RegistryError::Command(stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn parse<T: serde::de::DeserializeOwned>(stdout: &str) -> Result<T, RegistryError> {
        serde_json::from_str(stdout).map_err(|e| RegistryError::InvalidResponse(e.to_string()))
    }
}

impl Default for NpmCliRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Registry for NpmCliRegistry {
    async fn fetch_versions(&self, package_name: &str) -> Result<Vec<String>, RegistryError> {
        let stdout = self.info(package_name, "versions").await?;

        // npm prints a bare string when only one version exists
        match Self::parse::<serde_json::Value>(&stdout)? {
            serde_json::Value::String(version) => Ok(vec![version]),
            value => serde_json::from_value(value)
                .map_err(|e| RegistryError::InvalidResponse(e.to_string())),
        }
    }

    async fn fetch_times(&self, package_name: &str) -> Result<TimeIndex, RegistryError> {
        let stdout = self.info(package_name, "time").await?;
        let times: std::collections::HashMap<String, String> = Self::parse(&stdout)?;

        Ok(TimeIndex::from_raw(times))
    }

    async fn fetch_dependencies(
        &self,
        package_name: &str,
        version: &str,
    ) -> Result<Option<DependencyManifest>, RegistryError> {
        let spec = format!("{}@{}", package_name, version);
        let stdout = self.info(&spec, "dependencies").await?;

        // some published versions declare no dependencies at all
        if stdout.is_empty() {
            return Ok(None);
        }

        Self::parse(&stdout).map(Some)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FAKE_NPM: &str = r#"
case "$3" in
  versions)
    if [ "$2" = "solo" ]; then echo '"0.1.0"'; else echo '["1.0.0", "2.0.0"]'; fi ;;
  time)
    echo '{"created": "2016-01-01T00:00:00.000Z", "1.0.0": "2016-02-01T00:00:00.000Z"}' ;;
  dependencies)
    if [ "$2" = "parent@0.1.0" ]; then exit 0; fi
    echo '{"child": "^1.0.0"}' ;;
esac
"#;

    fn script(body: &str) -> (NamedTempFile, NpmCliRegistry) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        let path = file.path().to_string_lossy().to_string();
        (file, NpmCliRegistry::with_command("sh", vec![path]))
    }

    #[tokio::test]
    async fn fetch_versions_parses_array_output() {
        let (_file, registry) = script(FAKE_NPM);

        let versions = registry.fetch_versions("parent").await.unwrap();

        assert_eq!(versions, vec!["1.0.0", "2.0.0"]);
    }

    #[tokio::test]
    async fn fetch_versions_accepts_single_version_string() {
        let (_file, registry) = script(FAKE_NPM);

        let versions = registry.fetch_versions("solo").await.unwrap();

        assert_eq!(versions, vec!["0.1.0"]);
    }

    #[tokio::test]
    async fn fetch_times_filters_metadata_keys() {
        let (_file, registry) = script(FAKE_NPM);

        let index = registry.fetch_times("parent").await.unwrap();

        assert_eq!(index.versions(), vec!["1.0.0".to_string()]);
    }

    #[tokio::test]
    async fn fetch_dependencies_handles_empty_output() {
        let (_file, registry) = script(FAKE_NPM);

        assert!(
            registry
                .fetch_dependencies("parent", "0.1.0")
                .await
                .unwrap()
                .is_none()
        );
        let deps = registry
            .fetch_dependencies("parent", "1.0.0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(deps.get("child").map(String::as_str), Some("^1.0.0"));
    }

    #[tokio::test]
    async fn failing_command_surfaces_stderr() {
        let (_file, registry) = script("echo 'npm update check failed' >&2\nexit 1\n");

        let err = registry.fetch_versions("parent").await.unwrap_err();

        assert!(matches!(err, RegistryError::Command(_)));
        assert!(err.to_string().contains("npm update check failed"));
    }

    #[tokio::test]
    async fn configured_registry_is_passed_to_npm() {
        let (_file, registry) = script(r#"echo "[\"$5 $6\"]""#);
        let registry = registry.with_registry("http://localhost:4873");

        let versions = registry.fetch_versions("parent").await.unwrap();

        assert_eq!(versions, vec!["--registry http://localhost:4873"]);
    }

    #[tokio::test]
    async fn missing_package_maps_to_not_found() {
        let (_file, registry) = script("echo 'npm ERR! code E404' >&2\nexit 1\n");

        let err = registry.fetch_times("nope").await.unwrap_err();

        assert!(matches!(err, RegistryError::NotFound(_)));
    }
}
