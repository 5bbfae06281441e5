use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 运行时配置：默认值 → 可选 JSON 文件 → 命令行/环境变量（server 层合并）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: String,

    /// `models:/<name>/<version|latest>` or a model directory path
    pub model_uri: String,

    /// Root directory that registry URIs resolve under
    pub model_root: PathBuf,

    /// Holds `encoder.json[.gz]` and `expected_columns.{json,txt}`
    pub artifact_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".into(),
            model_uri: "models:/credit_scoring/latest".into(),
            model_root: PathBuf::from("mlruns/models"),
            artifact_dir: PathBuf::from("models"),
        }
    }
}

impl Config {
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        let cfg = serde_json::from_str(&s)
            .with_context(|| format!("parse config: {}", path.display()))?;
        Ok(cfg)
    }
}
