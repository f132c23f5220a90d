use radar_core::env::{self, ConfigError};
use radar_core::types::{ProjectId, UserId};

/// What the worker runs against and whether it launches a scan.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub project_id: ProjectId,
    /// Overrides the user id returned by the auth endpoint.
    pub user_id: Option<UserId>,
    /// Compile and dispatch a scan after recovery when nothing is running.
    pub auto_scan: bool,
    /// Ask the compiler to re-analyze the project instead of reusing its
    /// cached identity.
    pub force_analyze: bool,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var               | Default  |
    /// |-----------------------|----------|
    /// | `DATABASE_URL`        | required |
    /// | `RADAR_PROJECT_ID`    | required |
    /// | `RADAR_USER_ID`       | unset    |
    /// | `RADAR_AUTO_SCAN`     | `false`  |
    /// | `RADAR_FORCE_ANALYZE` | `false`  |
    pub fn from_env() -> Result<Self, ConfigError> {
        let project_raw = env::required("RADAR_PROJECT_ID")?;
        let project_id = parse_project_id(&project_raw)?;

        Ok(Self {
            database_url: env::required("DATABASE_URL")?,
            project_id,
            user_id: env::optional("RADAR_USER_ID")?,
            auto_scan: env::var_or("RADAR_AUTO_SCAN", false)?,
            force_analyze: env::var_or("RADAR_FORCE_ANALYZE", false)?,
        })
    }
}

fn parse_project_id(raw: &str) -> Result<ProjectId, ConfigError> {
    raw.parse::<ProjectId>()
        .ok()
        .filter(|id| !id.is_nil())
        .ok_or_else(|| ConfigError::Invalid {
            var: "RADAR_PROJECT_ID",
            value: raw.to_string(),
        })
}
