use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use scaletrack_shared::OwnerId;
use serde::Deserialize;
use tracing::{
  debug,
  info,
  warn
};

use crate::backend::Session;
use crate::datetime::{
  Clock,
  DEFAULT_TIMEZONE
};
use crate::store::DEFAULT_UPCOMING_LIMIT;

const CONFIG_ENV_VAR: &str =
  "SCALETRACK_CONFIG";
const TIMEZONE_ENV_VAR: &str =
  "SCALETRACK_TIMEZONE";
const OWNER_ENV_VAR: &str =
  "SCALETRACK_OWNER";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
  tasks:   TasksSection,
  time:    TimeSection,
  storage: StorageSection,
  session: SessionSection
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TasksSection {
  upcoming_limit: Option<usize>
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TimeSection {
  timezone: Option<String>
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StorageSection {
  data_dir: Option<PathBuf>
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SessionSection {
  owner: Option<String>
}

#[derive(Debug, Clone)]
pub struct Config {
  pub upcoming_limit: usize,
  pub timezone:       String,
  pub data_dir:       Option<PathBuf>,
  pub owner:          Option<OwnerId>,
  pub loaded_files:   Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      upcoming_limit:
        DEFAULT_UPCOMING_LIMIT,
      timezone: DEFAULT_TIMEZONE
        .to_string(),
      data_dir: None,
      owner: None,
      loaded_files: vec![]
    }
  }
}

impl Config {
  /// Defaults, then the config file,
  /// then environment overrides.
  #[tracing::instrument(skip(
    path_override
  ))]
  pub fn load(
    path_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match resolve_config_path(
      path_override
    ) {
      | Some(path) if path.exists() => {
        info!(config = %path.display(), "loading config");
        cfg.load_file(&path)?;
      }
      | Some(path)
        if path_override.is_some() =>
      {
        return Err(anyhow!(
          "config file not found: {}",
          path.display()
        ));
      }
      | _ => {
        warn!(
          "no config file found; \
           using defaults"
        );
      }
    }

    cfg.apply_env(|key| {
      std::env::var(key).ok()
    })?;
    Ok(cfg)
  }

  pub fn from_toml_str(
    text: &str
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();
    cfg.merge_toml(text)?;
    Ok(cfg)
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    self.merge_toml(&text).with_context(
      || {
        format!(
          "invalid config {}",
          path.display()
        )
      }
    )?;
    self.loaded_files.push(path);
    Ok(())
  }

  fn merge_toml(
    &mut self,
    text: &str
  ) -> anyhow::Result<()> {
    let file: ConfigFile =
      toml::from_str(text)?;

    if let Some(limit) =
      file.tasks.upcoming_limit
    {
      self.upcoming_limit = limit;
    }
    if let Some(tz) = file.time.timezone
    {
      self.timezone = tz;
    }
    if let Some(dir) =
      file.storage.data_dir
    {
      self.data_dir =
        Some(expand_tilde(&dir));
    }
    if let Some(owner) =
      file.session.owner
    {
      self.owner =
        Some(parse_owner(&owner)?);
    }
    Ok(())
  }

  /// Applies `SCALETRACK_TIMEZONE` and
  /// `SCALETRACK_OWNER` through
  /// `lookup`.
  pub fn apply_env<F>(
    &mut self,
    lookup: F
  ) -> anyhow::Result<()>
  where
    F: Fn(&str) -> Option<String>
  {
    if let Some(tz) =
      lookup(TIMEZONE_ENV_VAR)
        .filter(|v| !v.trim().is_empty())
    {
      debug!(timezone = %tz, "timezone from environment");
      self.timezone = tz;
    }
    if let Some(owner) =
      lookup(OWNER_ENV_VAR)
        .filter(|v| !v.trim().is_empty())
    {
      self.owner = Some(
        parse_owner(&owner).context(
          "invalid SCALETRACK_OWNER"
        )?
      );
    }
    Ok(())
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) -> anyhow::Result<()>
  where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      debug!(key = %k, value = %v, "applying override");
      match k.trim() {
        | "tasks.upcoming_limit" => {
          self.upcoming_limit = v
            .trim()
            .parse()
            .with_context(|| {
              format!(
                "invalid upcoming \
                 limit: {v}"
              )
            })?;
        }
        | "time.timezone" => {
          self.timezone =
            v.trim().to_string();
        }
        | "storage.data_dir" => {
          self.data_dir = Some(
            expand_tilde(Path::new(
              v.trim()
            ))
          );
        }
        | "session.owner" => {
          self.owner =
            Some(parse_owner(&v)?);
        }
        | other => {
          return Err(anyhow!(
            "unknown config key: \
             {other}"
          ));
        }
      }
    }
    Ok(())
  }

  pub fn clock(
    &self
  ) -> anyhow::Result<Clock> {
    Clock::from_name(&self.timezone)
  }

  #[must_use]
  pub fn session(
    &self
  ) -> Option<Session> {
    self.owner.map(Session::new)
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.data_dir.as_ref()
  {
    cfg_value.clone()
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn resolve_config_path(
  override_path: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = override_path {
    return Some(path.to_path_buf());
  }

  if let Ok(raw) =
    std::env::var(CONFIG_ENV_VAR)
  {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  dirs::config_dir().map(|dir| {
    dir
      .join("scaletrack")
      .join("config.toml")
  })
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let base = dirs::data_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine data \
         directory"
      )
    })?;
  Ok(base.join("scaletrack"))
}

fn parse_owner(
  raw: &str
) -> anyhow::Result<OwnerId> {
  raw.parse::<OwnerId>().with_context(
    || {
      format!(
        "invalid owner id: {}",
        raw.trim()
      )
    }
  )
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}
