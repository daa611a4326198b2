use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn theme_sync_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_theme-sync"));
    cmd.env_remove("THEME_SYNC_ROOT")
        .env_remove("SHOPIFY_SHOP")
        .env_remove("SHOPIFY_API_KEY")
        .env_remove("SHOPIFY_API_PASS")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let output = theme_sync_bin().arg("--help").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["init", "themes", "pull", "push", "link"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_pull_without_config_fails() {
    let tmp = TempDir::new().unwrap();
    let output = theme_sync_bin()
        .args(["--root", tmp.path().to_str().unwrap(), "pull", "1"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error"), "stderr: {stderr}");
}

#[test]
fn test_corrupt_config_fails() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join(".shopify-theme")).unwrap();
    fs::write(tmp.path().join(".shopify-theme/config.json"), "{ not json").unwrap();

    let output = theme_sync_bin()
        .args(["--root", tmp.path().to_str().unwrap(), "push", "1"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_init_rejects_bad_shop_name() {
    let tmp = TempDir::new().unwrap();
    let output = theme_sync_bin()
        .args([
            "--root",
            tmp.path().to_str().unwrap(),
            "init",
            "--shop",
            "not a shop!",
            "--api-key",
            "0123456789abcdef0123456789abcdef",
            "--api-pass",
            "0123456789abcdef0123456789abcdef",
        ])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(!tmp.path().join(".shopify-theme/config.json").exists());
}
