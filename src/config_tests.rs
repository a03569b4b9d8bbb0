//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.source.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.source.timeout_secs, 30);
        assert_eq!(config.optimizer.trading_days, 252.0);
        assert_eq!(config.optimizer.relaxation_step, 0.002);
        assert_eq!(config.optimizer.max_relaxations, 5000);
        assert_eq!(config.optimizer.max_iterations, 200_000);
        assert_eq!(config.optimizer.tolerance, 1e-12);
        assert_eq!(config.profiles.general, "Geral");
        assert_eq!(config.profiles.named, vec!["Conservador", "Moderado", "Sofisticado"]);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_partial_sections() {
        let toml_str = r#"
[optimizer]
relaxation_step = 0.005

[profiles]
named = ["Moderado"]
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.optimizer.relaxation_step, 0.005);
        assert_eq!(config.optimizer.max_relaxations, 5000);
        assert_eq!(config.profiles.general, "Geral");
        assert_eq!(config.profiles.named, vec!["Moderado"]);
    }

    #[test]
    fn test_relaxation_settings_from_optimizer() {
        let config: OptimizerConfig = toml::from_str(
            r#"
trading_days = 250
relaxation_step = 0.01
max_relaxations = 10
"#,
        )
        .unwrap();
        let settings = config.relaxation();
        assert_eq!(settings.trading_days, 250.0);
        assert_eq!(settings.step, 0.01);
        assert_eq!(settings.max_relaxations, 10);
    }

    #[test]
    fn test_server_bind_addr() {
        let config: ServerConfig = toml::from_str("host = \"127.0.0.1\"\nport = 9000").unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
        assert_eq!(ServerConfig::default().bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[source]
base_url = "http://localhost:5000/api/"
timeout_secs = 5

[server]
port = 3001
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.source.base_url, "http://localhost:5000/api/");
        assert_eq!(config.source.timeout().as_secs(), 5);
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.optimizer.max_relaxations, 5000);
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.profiles.named.len(), 3);
    }
}
