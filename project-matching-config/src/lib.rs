use core::fmt::{Debug, Display};
use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use project_matching_optimizer::solver::{SolveLimits, SolverKind, SolverPrograms};
use serde::{Deserialize, Serialize};

/// Settings shared by every worker invocation.
#[derive(Deserialize, Serialize, Clone)]
pub struct Config {
    pub database_url: String,
    /// backend used when a job does not name one
    pub solver: SolverKind,
    pub time_limit_secs: u64,
    pub relative_gap: f64,
    /// where offline models are written
    pub offline_dir: PathBuf,
    pub solver_programs: SolverPrograms,
    /// seconds before a repeated progress percentage is written again
    pub progress_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let limits = SolveLimits::default();
        Self {
            database_url: "postgres://localhost/project_matching".to_owned(),
            solver: SolverKind::default(),
            time_limit_secs: limits.time_limit.as_secs(),
            relative_gap: limits.relative_gap,
            offline_dir: PathBuf::from("offline"),
            solver_programs: SolverPrograms::default(),
            progress_interval_secs: 1,
        }
    }
}

impl Config {
    #[must_use]
    pub fn limits(&self) -> SolveLimits {
        SolveLimits {
            time_limit: Duration::from_secs(self.time_limit_secs),
            relative_gap: self.relative_gap,
        }
    }
}

// the url may carry a password
impl Debug for Config {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"<redacted>")
            .field("solver", &self.solver)
            .field("time_limit_secs", &self.time_limit_secs)
            .field("relative_gap", &self.relative_gap)
            .field("offline_dir", &self.offline_dir)
            .field("solver_programs", &self.solver_programs)
            .field("progress_interval_secs", &self.progress_interval_secs)
            .finish()
    }
}

#[derive(thiserror::Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Figment(#[from] figment::Error),
    #[error("relative gap must lie in [0, 1], got {0}")]
    Gap(f64),
    #[error("time limit must be positive")]
    TimeLimit,
}

impl Debug for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Display::fmt(self, f)
    }
}

/// Defaults, then `pm.toml` in the working directory, then `PM_` variables.
#[must_use]
pub fn figment() -> Figment {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file("pm.toml"))
        .merge(Env::prefixed("PM_").split("__"))
}

pub fn get_config() -> Result<Config, ConfigError> {
    from_figment(&figment())
}

pub fn from_figment(figment: &Figment) -> Result<Config, ConfigError> {
    let config: Config = figment.extract()?;
    if !(0.0..=1.0).contains(&config.relative_gap) {
        return Err(ConfigError::Gap(config.relative_gap));
    }
    if config.time_limit_secs == 0 {
        return Err(ConfigError::TimeLimit);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use figment::Jail;
    use project_matching_optimizer::solver::SolverKind;

    use super::{figment, from_figment, get_config, ConfigError};

    #[test]
    fn defaults_apply_without_any_source() {
        Jail::expect_with(|_jail| {
            let config = get_config().unwrap();
            assert_eq!(config.solver, SolverKind::MicroLp);
            assert_eq!(config.limits().time_limit, Duration::from_secs(3600));
            assert!((config.relative_gap - 0.25).abs() < f64::EPSILON);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_the_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "pm.toml",
                r#"
                database_url = "postgres://db/matching"
                solver = "cbc_command"
                time_limit_secs = 60

                [solver_programs]
                cbc = "/opt/cbc/bin/cbc"
                "#,
            )?;
            jail.set_env("PM_TIME_LIMIT_SECS", "120");
            jail.set_env("PM_SOLVER_PROGRAMS__HIGHS", "/usr/local/bin/highs");

            let config = get_config().unwrap();
            assert_eq!(config.database_url, "postgres://db/matching");
            assert_eq!(config.solver, SolverKind::CbcCommand);
            assert_eq!(config.time_limit_secs, 120);
            assert_eq!(config.solver_programs.cbc, PathBuf::from("/opt/cbc/bin/cbc"));
            assert_eq!(config.solver_programs.highs, PathBuf::from("/usr/local/bin/highs"));
            Ok(())
        });
    }

    #[test]
    fn nonsense_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("PM_RELATIVE_GAP", "2.5");
            assert!(matches!(from_figment(&figment()), Err(ConfigError::Gap(_))));
            jail.set_env("PM_RELATIVE_GAP", "0.1");
            jail.set_env("PM_TIME_LIMIT_SECS", "0");
            assert!(matches!(from_figment(&figment()), Err(ConfigError::TimeLimit)));
            jail.set_env("PM_SOLVER", "gurobi");
            assert!(matches!(from_figment(&figment()), Err(ConfigError::Figment(_))));
            Ok(())
        });
    }

    #[test]
    fn debug_output_hides_the_database_url() {
        Jail::expect_with(|jail| {
            jail.set_env("PM_DATABASE_URL", "postgres://user:secret@db/matching");
            let config = get_config().unwrap();
            assert!(!format!("{config:?}").contains("secret"));
            Ok(())
        });
    }
}
