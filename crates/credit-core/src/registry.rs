use crate::error::ArtifactError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Model reference: either a registry URI `models:/<name>/<version>` with a
/// numeric version or `latest`, or a plain directory path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelUri {
    Registry { name: String, version: ModelVersion },
    Path(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVersion {
    Latest,
    Number(u32),
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelUri::Registry {
                name,
                version: ModelVersion::Latest,
            } => write!(f, "models:/{name}/latest"),
            ModelUri::Registry {
                name,
                version: ModelVersion::Number(v),
            } => write!(f, "models:/{name}/{v}"),
            ModelUri::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

impl ModelUri {
    pub fn parse(s: &str) -> Result<Self, ArtifactError> {
        let Some(rest) = s.strip_prefix("models:/") else {
            return Ok(ModelUri::Path(PathBuf::from(s)));
        };
        let bad = |reason: &str| ArtifactError::invalid(s, reason.to_string());

        let (name, version) = rest
            .split_once('/')
            .ok_or_else(|| bad("expected models:/<name>/<version|latest>"))?;
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(bad("invalid model name"));
        }
        let version = match version {
            "latest" => ModelVersion::Latest,
            v => ModelVersion::Number(v.parse().map_err(|_| bad("version must be a number or 'latest'"))?),
        };
        Ok(ModelUri::Registry {
            name: name.to_string(),
            version,
        })
    }

    /// Resolves to the model directory. Registry URIs live under
    /// `<root>/<name>/<version>/`; `latest` is the highest numeric version.
    pub fn resolve(&self, root: &Path) -> Result<PathBuf, ArtifactError> {
        let dir = match self {
            ModelUri::Path(p) => p.clone(),
            ModelUri::Registry {
                name,
                version: ModelVersion::Number(v),
            } => root.join(name).join(v.to_string()),
            ModelUri::Registry {
                name,
                version: ModelVersion::Latest,
            } => {
                let model_dir = root.join(name);
                let latest = select_latest_version(&model_dir)?;
                model_dir.join(latest.to_string())
            }
        };
        if !dir.is_dir() {
            return Err(ArtifactError::Missing {
                dir,
                expected: "a model version directory",
            });
        }
        Ok(dir)
    }
}

fn select_latest_version(dir: &Path) -> Result<u32, ArtifactError> {
    let rd = fs::read_dir(dir).map_err(|source| ArtifactError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut best: Option<u32> = None;
    for ent in rd.flatten() {
        let path = ent.path();
        if !path.is_dir() {
            continue;
        }
        // 只认纯数字目录名（1, 2, 17 ...）
        let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
        if let Ok(v) = name.parse::<u32>() {
            best = Some(best.map_or(v, |b| b.max(v)));
        }
    }
    best.ok_or_else(|| ArtifactError::Missing {
        dir: dir.to_path_buf(),
        expected: "at least one numeric version directory",
    })
}
