use crate::error::{AlignError, ArtifactError};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// A single named row before alignment: numeric inputs, ratios, then the
/// one-hot block, in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    cols: Vec<(String, f64)>,
}

impl FeatureRow {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            cols: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        self.cols.push((name.into(), value));
    }

    pub fn extend(&mut self, cols: impl IntoIterator<Item = (String, f64)>) {
        self.cols.extend(cols);
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cols.iter().map(|(n, _)| n.as_str())
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.cols.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }
}

/// Row in model order. Only `ExpectedColumns::reindex` builds one, so the
/// names always equal the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRow {
    names: Vec<String>,
    values: Vec<f64>,
}

impl AlignedRow {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Ordered column list the model was fit on.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedColumns {
    names: Vec<String>,
}

impl ExpectedColumns {
    pub fn new(names: Vec<String>, origin: &Path) -> Result<Self, ArtifactError> {
        if names.is_empty() {
            return Err(ArtifactError::invalid(origin, "expected column list is empty"));
        }
        let mut seen = HashSet::with_capacity(names.len());
        for n in &names {
            if !seen.insert(n.as_str()) {
                return Err(ArtifactError::invalid(
                    origin,
                    format!("expected column '{n}' listed twice"),
                ));
            }
        }
        Ok(Self { names })
    }

    /// `expected_columns.json` (array of names) first, then
    /// `expected_columns.txt` (one name per line).
    pub fn load_from_dir(dir: &Path) -> Result<Self, ArtifactError> {
        let json_path = dir.join("expected_columns.json");
        if json_path.exists() {
            let s = fs::read_to_string(&json_path).map_err(|source| ArtifactError::Io {
                path: json_path.clone(),
                source,
            })?;
            let names: Vec<String> = serde_json::from_str(&s).map_err(|source| ArtifactError::Json {
                path: json_path.clone(),
                source,
            })?;
            return Self::new(names, &json_path);
        }

        let txt_path = dir.join("expected_columns.txt");
        if txt_path.exists() {
            let s = fs::read_to_string(&txt_path).map_err(|source| ArtifactError::Io {
                path: txt_path.clone(),
                source,
            })?;
            let names = s
                .lines()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            return Self::new(names, &txt_path);
        }

        Err(ArtifactError::Missing {
            dir: dir.to_path_buf(),
            expected: "expected_columns.json or expected_columns.txt",
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Expected columns that `produced` can never fill (always zero at
    /// inference), and produced columns the schema drops.
    pub fn coverage<'a>(&'a self, produced: &'a [String]) -> (Vec<&'a str>, Vec<&'a str>) {
        let have: HashSet<&str> = produced.iter().map(String::as_str).collect();
        let want: HashSet<&str> = self.names.iter().map(String::as_str).collect();
        let never_filled = self
            .names
            .iter()
            .map(String::as_str)
            .filter(|n| !have.contains(n))
            .collect();
        let dropped = produced
            .iter()
            .map(String::as_str)
            .filter(|n| !want.contains(n))
            .collect();
        (never_filled, dropped)
    }

    /// Reindexes `row` to exactly this schema: absent columns are 0.0,
    /// columns outside the schema are dropped.
    pub fn reindex(&self, row: &FeatureRow) -> Result<AlignedRow, AlignError> {
        let mut index: HashMap<&str, f64> = HashMap::with_capacity(row.len());
        for (name, v) in &row.cols {
            if index.insert(name.as_str(), *v).is_some() {
                return Err(AlignError::DuplicateColumn(name.clone()));
            }
        }

        let values = self
            .names
            .iter()
            .map(|n| index.get(n.as_str()).copied().unwrap_or(0.0))
            .collect();
        Ok(AlignedRow {
            names: self.names.clone(),
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(names: &[&str]) -> ExpectedColumns {
        ExpectedColumns::new(
            names.iter().map(|s| s.to_string()).collect(),
            Path::new("expected_columns.json"),
        )
        .unwrap()
    }

    fn row(cols: &[(&str, f64)]) -> FeatureRow {
        let mut r = FeatureRow::default();
        for (n, v) in cols {
            r.push(*n, *v);
        }
        r
    }

    #[test]
    fn test_reindex_fills_drops_and_orders() {
        let s = schema(&["c", "a", "missing"]);
        let r = row(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        let out = s.reindex(&r).unwrap();
        assert_eq!(out.names(), s.names());
        assert_eq!(out.values(), &[3.0, 1.0, 0.0]);
        assert_eq!(out.get("b"), None);
    }

    #[test]
    fn test_reindex_rejects_duplicate_labels() {
        let s = schema(&["a"]);
        let r = row(&[("a", 1.0), ("a", 2.0)]);
        assert_eq!(
            s.reindex(&r).unwrap_err(),
            AlignError::DuplicateColumn("a".into())
        );
    }

    #[test]
    fn test_schema_validation() {
        assert!(ExpectedColumns::new(vec![], Path::new("x")).is_err());
        assert!(ExpectedColumns::new(vec!["a".into(), "a".into()], Path::new("x")).is_err());
    }

    #[test]
    fn test_coverage() {
        let s = schema(&["a", "b"]);
        let produced = vec!["b".to_string(), "z".to_string()];
        let (never, dropped) = s.coverage(&produced);
        assert_eq!(never, vec!["a"]);
        assert_eq!(dropped, vec!["z"]);
    }

    #[test]
    fn test_load_txt_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("expected_columns.txt"), "a\n\n  b \n").unwrap();
        let s = ExpectedColumns::load_from_dir(dir.path()).unwrap();
        assert_eq!(s.names(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_json_preferred_over_txt() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("expected_columns.json"), r#"["x","y","z"]"#).unwrap();
        fs::write(dir.path().join("expected_columns.txt"), "a\n").unwrap();
        assert_eq!(ExpectedColumns::load_from_dir(dir.path()).unwrap().len(), 3);
    }
}
