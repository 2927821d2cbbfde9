use crate::env_resolver::EnvResolver;
use crate::error::{ConfigError, ConfigResult};
use crate::schema::{ConfigManifest, ReuseConfig};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;

/// Supported file formats for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    /// Detect file format from extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Ok(FileFormat::Yaml),
            Some("json") => Ok(FileFormat::Json),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::UnsupportedFormat("no extension".to_string())),
        }
    }
}

/// Reads device manifests, expanding environment placeholders before
/// deserializing and validating them.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    resolver: EnvResolver,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(resolver: EnvResolver) -> Self {
        Self { resolver }
    }

    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<ConfigManifest> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path)?;
        let content = fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), ?format, "loading device manifest");
        self.parse_content(&content, format)
    }

    pub fn parse_content(&self, content: &str, format: FileFormat) -> ConfigResult<ConfigManifest> {
        let raw: JsonValue = match format {
            FileFormat::Yaml => serde_yaml::from_str(content)?,
            FileFormat::Json => serde_json::from_str(content)?,
        };
        let resolved = self.resolver.resolve(&raw)?;
        let manifest: ConfigManifest = serde_json::from_value(resolved)?;
        self.validate(&manifest)?;
        Ok(manifest)
    }

    pub fn validate(&self, manifest: &ConfigManifest) -> ConfigResult<()> {
        if manifest.version != "v1" {
            return Err(ConfigError::Validation(format!(
                "unsupported manifest version '{}'",
                manifest.version
            )));
        }

        for (name, http) in &manifest.devices.http {
            let scope = format!("http device '{name}'");
            check_name(name)?;
            check_timeout(&scope, "connect_timeout_ms", http.connect_timeout_ms)?;
            check_timeout(&scope, "timeout_ms", http.timeout_ms)?;
            check_reuse(&scope, &http.reuse)?;
        }

        for (name, pg) in &manifest.devices.postgresql {
            let scope = format!("postgresql device '{name}'");
            check_name(name)?;
            if pg.conn_str.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{scope}: conn_str is empty")));
            }
            check_timeout(&scope, "connect_timeout_ms", pg.connect_timeout_ms)?;
            if let Some(pos) = pg.post_connect_queries.iter().position(|q| q.trim().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "{scope}: post_connect_queries[{pos}] is empty"
                )));
            }
            check_reuse(&scope, &pg.reuse)?;
        }

        for (name, redis) in &manifest.devices.redis {
            let scope = format!("redis device '{name}'");
            check_name(name)?;
            if redis.url.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{scope}: url is empty")));
            }
            check_timeout(&scope, "connect_timeout_ms", redis.connect_timeout_ms)?;
            check_reuse(&scope, &redis.reuse)?;
        }

        Ok(())
    }
}

fn check_name(name: &str) -> ConfigResult<()> {
    if name.trim().is_empty() {
        return Err(ConfigError::Validation("device name is empty".to_string()));
    }
    Ok(())
}

fn check_timeout(scope: &str, field: &str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::Validation(format!("{scope}: {field} must be positive")));
    }
    Ok(())
}

fn check_reuse(scope: &str, reuse: &ReuseConfig) -> ConfigResult<()> {
    if let (Some(min), Some(max)) = (reuse.min_queries_per_conn, reuse.max_queries_per_conn) {
        if min > max {
            return Err(ConfigError::Validation(format!(
                "{scope}: min_queries_per_conn ({min}) exceeds max_queries_per_conn ({max})"
            )));
        }
    }
    if reuse.max_queries_per_conn == Some(0) {
        return Err(ConfigError::Validation(format!(
            "{scope}: max_queries_per_conn must be positive"
        )));
    }
    if reuse.idle_timeout_ms == Some(0) {
        return Err(ConfigError::Validation(format!(
            "{scope}: idle_timeout_ms must be positive"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tether_core::ReuseCap;

    const MANIFEST: &str = r#"
version: v1
devices:
  http:
    api:
      connect_timeout_ms: 5000
      user_agent: "tether/0.1"
  postgresql:
    main:
      conn_str: "postgres://app@localhost/app"
      statement_timeout_ms: 15000
      post_connect_queries:
        - "SET application_name TO 'tether'"
      min_queries_per_conn: 50
      max_queries_per_conn: 100
      idle_timeout_ms: 60000
  redis:
    jobs:
      url: "redis://127.0.0.1/"
      max_queries_per_conn: 1000
"#;

    #[test]
    fn test_parse_yaml_manifest() {
        let manifest = ConfigLoader::new()
            .parse_content(MANIFEST, FileFormat::Yaml)
            .unwrap();

        let api = &manifest.devices.http["api"];
        assert_eq!(api.connect_timeout(), Duration::from_millis(5000));
        assert_eq!(api.timeout_ms, 60_000);
        assert!(api.follow_redirects);

        let main = &manifest.devices.postgresql["main"];
        assert_eq!(main.post_connect_queries.len(), 1);
        let policy = main.reuse.to_policy();
        assert_eq!(policy.idle_timeout, Some(Duration::from_secs(60)));
        assert_eq!(policy.min_queries_per_conn, Some(50));

        let jobs = manifest.devices.redis["jobs"].reuse.to_policy();
        assert_eq!(
            jobs.draw_cap(&mut rand::thread_rng()),
            ReuseCap::Limited(1000)
        );

        assert_eq!(
            manifest.devices.names(),
            vec![("http", "api"), ("postgresql", "main"), ("redis", "jobs")]
        );
    }

    #[test]
    fn test_parse_json_manifest_with_env() {
        std::env::set_var("TETHER_LOADER_PG", "postgres://env@db/app");
        let json = r#"{"devices": {"postgresql": {"main": {"conn_str": "${TETHER_LOADER_PG}"}}}}"#;
        let manifest = ConfigLoader::new()
            .parse_content(json, FileFormat::Json)
            .unwrap();
        assert_eq!(manifest.version, "v1");
        assert_eq!(
            manifest.devices.postgresql["main"].conn_str,
            "postgres://env@db/app"
        );
        std::env::remove_var("TETHER_LOADER_PG");
    }

    #[test]
    fn test_reject_inverted_reuse_bounds() {
        let yaml = r#"
devices:
  redis:
    jobs: { url: "redis://localhost", min_queries_per_conn: 10, max_queries_per_conn: 2 }
"#;
        let err = ConfigLoader::new()
            .parse_content(yaml, FileFormat::Yaml)
            .unwrap_err();
        assert!(err.to_string().contains("exceeds max_queries_per_conn"));
    }

    #[test]
    fn test_reject_empty_conn_str_and_zero_timeout() {
        let empty = r#"{"devices": {"postgresql": {"main": {"conn_str": "  "}}}}"#;
        assert!(matches!(
            ConfigLoader::new().parse_content(empty, FileFormat::Json),
            Err(ConfigError::Validation(_))
        ));

        let zero = r#"{"devices": {"http": {"api": {"timeout_ms": 0}}}}"#;
        assert!(matches!(
            ConfigLoader::new().parse_content(zero, FileFormat::Json),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            FileFormat::from_path("devices.toml"),
            Err(ConfigError::UnsupportedFormat(_))
        ));
        assert_eq!(FileFormat::from_path("a/b.yml").unwrap(), FileFormat::Yaml);
    }
}
