use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use taproot_assets::config::{Config, ConfigError};

#[test]
fn loads_courier_and_universe_sections() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(
        file,
        r#"
[courier]
receive_timeout_ms = 250
initial_backoff_ms = 5
max_backoff_ms = 80
num_tries = 4

[universe]
page_size = 16
"#
    )?;

    let config = Config::load(file.path())?;
    assert_eq!(config.courier.receive_timeout(), Duration::from_millis(250));
    let backoff = config.courier.backoff();
    assert_eq!(backoff.initial_backoff, Duration::from_millis(5));
    assert_eq!(backoff.max_backoff, Duration::from_millis(80));
    assert_eq!(backoff.num_tries, 4);
    assert_eq!(config.universe.page_size, 16);
    assert_eq!(config.universe.sync_page_size, 512);
    assert_eq!(config.archive, Default::default());
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = Config::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn unknown_values_are_rejected() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "[courier]\nnum_tries = -1")?;
    let err = Config::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
    Ok(())
}
