//! Integration tests for `demoserve config` output.

use std::process::Command;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "demoserve-cli", "--bin", "demoserve", "--"]);
    cmd
}

fn config_json(args: &[&str], cwd: &std::path::Path) -> serde_json::Value {
    let output = cargo_bin()
        .arg("config")
        .args(args)
        .arg("--cwd")
        .arg(cwd)
        .output()
        .expect("Failed to run config command");

    assert!(
        output.status.success(),
        "config failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("stdout should be valid JSON")
}

#[test]
fn test_demo_preset_json() {
    let dir = tempfile::tempdir().unwrap();
    let json = config_json(&["--demo"], dir.path());

    assert_eq!(json["clearScreen"], false);
    assert_eq!(json["build"]["minify"], false);
    assert_eq!(json["server"]["port"], 5174);
    assert_eq!(json["server"]["strictPort"], true);
    assert_eq!(json["server"]["fs"]["strict"], false);
    assert_eq!(json["plugins"][0]["name"], "vue");
    assert_eq!(json["plugins"][1]["name"], "vue-devtools");

    let site_api = &json["server"]["proxy"]["/site-api"];
    assert_eq!(site_api["target"], "http://localhost/");
    assert_eq!(site_api["changeOrigin"], true);

    let root = json["root"].as_str().unwrap();
    assert!(root.ends_with("src/components/_demo"), "root: {root}");
    assert!(json["resolve"]["alias"]["@"].as_str().unwrap().ends_with("src"));
    assert!(json["resolve"]["alias"]["~cmk-frontend"]
        .as_str()
        .unwrap()
        .ends_with("cmk-frontend"));
}

#[test]
fn test_config_output_reloads_to_same_config() {
    let dir = tempfile::tempdir().unwrap();
    let first = config_json(&["--demo"], dir.path());

    // Feed the printed config back in as a config file.
    let file = dir.path().join("demoserve.config.json");
    std::fs::write(&file, serde_json::to_string_pretty(&first).unwrap()).unwrap();
    let second = config_json(&[], dir.path());

    assert_eq!(first, second);
}

#[test]
fn test_js_config_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("vite.config.demo.js"),
        r"
// demo pages
export default {
  root: './pages/',
  server: {
    port: 6001,
    proxy: {
      '/site-api': {
        target: 'http://localhost:8080/',
        changeOrigin: true,
        rewrite: { from: '^/site-api', to: '' },
      },
    },
  },
};
",
    )
    .unwrap();

    let json = config_json(&[], dir.path());
    assert_eq!(json["server"]["port"], 6001);
    assert_eq!(json["server"]["strictPort"], false);
    assert_eq!(json["clearScreen"], true);
    assert_eq!(json["server"]["proxy"]["/site-api"]["rewrite"]["from"], "^/site-api");
    assert!(json["root"].as_str().unwrap().ends_with("pages"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = cargo_bin()
        .args(["config", "--config", "missing.json", "--cwd"])
        .arg(dir.path())
        .output()
        .expect("Failed to run config command");

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("DEV_CONFIG_NOT_FOUND"));
}
