//! INI file configuration adapter.

use crate::domain::error::FutdataError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FutdataError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| FutdataError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, FutdataError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| FutdataError::ConfigParse {
                file: "<string>".into(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[postgres]
reference_conninfo = host=localhost dbname=reference

[fetch]
market = ChineseFuturesMarket
columns = HappenTime,LastPrice
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("postgres", "reference_conninfo"),
            Some("host=localhost dbname=reference".to_string())
        );
        assert_eq!(
            adapter.get_string("fetch", "columns"),
            Some("HappenTime,LastPrice".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[tick]\npath = ticks.db\n").unwrap();
        assert_eq!(adapter.get_string("tick", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_value_or_default() {
        let adapter =
            FileConfigAdapter::from_string("[tick]\npool_size = 8\n[fetch]\nquery_timeout_ms = abc\n")
                .unwrap();
        assert_eq!(adapter.get_int("tick", "pool_size", 4), 8);
        assert_eq!(adapter.get_int("reference", "pool_size", 4), 4);
        assert_eq!(adapter.get_int("fetch", "query_timeout_ms", 42), 42);
    }

    #[test]
    fn get_double_returns_value_or_default() {
        let adapter = FileConfigAdapter::from_string("[ema]\nperiod = 2.5\nbad = x\n").unwrap();
        assert_eq!(adapter.get_double("ema", "period", 0.0), 2.5);
        assert_eq!(adapter.get_double("ema", "bad", 9.9), 9.9);
        assert_eq!(adapter.get_double("ema", "missing", 9.9), 9.9);
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[fetch]\na = true\nb = yes\nc = 1\nd = false\ne = no\nf = 0\n",
        )
        .unwrap();
        for key in ["a", "b", "c"] {
            assert!(adapter.get_bool("fetch", key, false));
        }
        for key in ["d", "e", "f"] {
            assert!(!adapter.get_bool("fetch", key, true));
        }
        assert!(adapter.get_bool("fetch", "missing", true));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[cache]\npath = /var/cache/futdata.db\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("cache", "path"),
            Some("/var/cache/futdata.db".to_string())
        );
    }

    #[test]
    fn from_file_reports_missing_file_as_parse_error() {
        match FileConfigAdapter::from_file("/nonexistent/path/config.ini") {
            Err(FutdataError::ConfigParse { file, .. }) => {
                assert!(file.contains("config.ini"));
            }
            Err(other) => panic!("expected ConfigParse, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }
}
