//! File loading and JSON output shared by the subcommands.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Parse `path` as YAML when its extension says so, JSON otherwise.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
    if yaml {
        serde_yaml::from_str(&content).with_context(|| format!("invalid YAML in {}", path.display()))
    } else {
        serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
    }
}

/// Render `value` as pretty JSON with a trailing newline.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    let mut out = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    out.push('\n');
    Ok(out)
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    print!("{}", to_pretty_json(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        points: f64,
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn yaml_is_chosen_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "sample.yml", "name: alpha\npoints: 3\n");
        let s: Sample = load(&path).unwrap();
        assert_eq!(s, Sample { name: "alpha".into(), points: 3.0 });
    }

    #[test]
    fn other_extensions_parse_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "sample.json", r#"{"name": "beta", "points": 5}"#);
        let s: Sample = load(&path).unwrap();
        assert_eq!(s.name, "beta");

        let path = write_file(&dir, "sample.txt", "name: gamma\npoints: 1\n");
        assert!(load::<Sample>(&path).is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load::<Sample>(Path::new("/nonexistent/plan.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/plan.yaml"));
    }
}
