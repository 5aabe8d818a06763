use gallery::config::ConfigError;
use gallery::AppConfig;
use serial_test::serial;

const VARS: [&str; 5] = ["JWT_SECRET", "ROWS_PER_PAGE", "UPLOAD_EXTENSIONS", "STORAGE_DIR", "BOOTSTRAP_USER"];

fn clear() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn reads_the_environment() {
    clear();
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    std::env::set_var("ROWS_PER_PAGE", "5");
    std::env::set_var("UPLOAD_EXTENSIONS", "PNG, .mp4");
    std::env::set_var("STORAGE_DIR", "/srv/gallery");

    let cfg = AppConfig::from_env().unwrap();
    assert_eq!(cfg.rows_per_page, 5);
    assert_eq!(cfg.upload_extensions, vec![".png".to_string(), ".mp4".to_string()]);
    assert_eq!(cfg.storage.local_dir.as_deref(), Some(std::path::Path::new("/srv/gallery")));
    clear();
}

#[test]
#[serial]
fn secret_is_required() {
    clear();
    assert!(matches!(AppConfig::from_env(), Err(ConfigError::Missing("JWT_SECRET"))));
    std::env::set_var("JWT_SECRET", "short");
    assert!(matches!(AppConfig::from_env(), Err(ConfigError::WeakSecret)));
    clear();
}

#[test]
#[serial]
fn bootstrap_user_needs_a_password() {
    clear();
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    std::env::set_var("BOOTSTRAP_USER", "admin");
    std::env::remove_var("BOOTSTRAP_PASSWORD");
    assert!(matches!(AppConfig::from_env(), Err(ConfigError::Missing("BOOTSTRAP_PASSWORD"))));
    clear();
}
