//! `.env` loading: never overrides variables already set in the process.

use std::path::Path;

pub fn load_env_file(path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    for raw_line in content.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("export ") {
            line = rest.trim_start();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || std::env::var_os(key).is_some() {
            continue;
        }
        let mut value = value.trim();
        let bytes = value.as_bytes();
        if bytes.len() >= 2
            && bytes[0] == bytes[bytes.len() - 1]
            && (bytes[0] == b'"' || bytes[0] == b'\'')
        {
            value = &value[1..value.len() - 1];
        }
        std::env::set_var(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unique_temp_file(prefix: &str) -> PathBuf {
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        std::env::temp_dir().join(format!("swarm-env-{prefix}-{now}.env"))
    }

    #[test]
    fn loads_values_without_overriding_existing() {
        let path = unique_temp_file("basic");
        std::fs::write(
            &path,
            "# comment\nexport SWARM_ENV_TEST_A=alpha\nSWARM_ENV_TEST_B='beta'\nbroken line\n",
        )
        .expect("write env file");

        std::env::set_var("SWARM_ENV_TEST_B", "already-set");
        load_env_file(&path);

        assert_eq!(std::env::var("SWARM_ENV_TEST_A").unwrap(), "alpha");
        assert_eq!(std::env::var("SWARM_ENV_TEST_B").unwrap(), "already-set");

        std::env::remove_var("SWARM_ENV_TEST_A");
        std::env::remove_var("SWARM_ENV_TEST_B");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_is_a_no_op() {
        load_env_file(Path::new("/nonexistent/swarm.env"));
    }
}
