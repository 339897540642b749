// tests/config_env.rs
use listfeed::config::{Config, ENV_CONFIG_PATH};
use std::{env, fs};

const KEYS: &[&str] = &[
    ENV_CONFIG_PATH,
    "LIST_IDS",
    "MAX_FEED_ENTRIES",
    "FILTER_REPLIES",
    "API_TOKEN",
    "UPDATE_INTERVAL_MINUTES",
];

fn clear_env() {
    for k in KEYS {
        env::remove_var(k);
    }
}

#[serial_test::serial]
#[test]
fn file_then_env_layering() {
    clear_env();
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();

    // 1) Nothing at all: defaults.
    let c = Config::load().unwrap();
    assert!(c.list_ids.is_empty());
    assert_eq!(c.feed_title, Config::default().feed_title);

    // 2) ./config/listfeed.toml is picked up.
    fs::create_dir_all(tmp.path().join("config")).unwrap();
    fs::write(
        tmp.path().join("config/listfeed.toml"),
        r#"
list_ids = ["111", "https://x.com/i/lists/222", "111"]
max_feed_entries = 50
feed_title = "From file"
"#,
    )
    .unwrap();
    let c = Config::load().unwrap();
    assert_eq!(c.list_ids, vec!["111".to_string(), "222".to_string()]);
    assert_eq!(c.max_feed_entries, 50);
    assert_eq!(c.feed_title, "From file");

    // 3) Env overrides the file; blank API_TOKEN means no gate.
    env::set_var("LIST_IDS", " 333 , ,444");
    env::set_var("MAX_FEED_ENTRIES", "7");
    env::set_var("FILTER_REPLIES", "yes");
    env::set_var("API_TOKEN", "   ");
    let c = Config::load().unwrap();
    assert_eq!(c.list_ids, vec!["333".to_string(), "444".to_string()]);
    assert_eq!(c.max_feed_entries, 7);
    assert!(c.filter_replies);
    assert_eq!(c.feed_title, "From file");
    assert_eq!(c.api_token(), None);

    clear_env();
    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn explicit_path_must_exist_and_parse() {
    clear_env();
    let tmp = tempfile::tempdir().unwrap();

    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml"));
    assert!(Config::load().is_err());

    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "max_feed_entries = \"lots\"").unwrap();
    env::set_var(ENV_CONFIG_PATH, &bad);
    assert!(Config::load().is_err());

    let good = tmp.path().join("good.toml");
    fs::write(&good, "update_interval_minutes = 0").unwrap();
    env::set_var(ENV_CONFIG_PATH, &good);
    env::set_var("UPDATE_INTERVAL_MINUTES", "not-a-number");
    let c = Config::load().unwrap();
    assert_eq!(c.update_interval_minutes, 1, "zero interval clamps to 1");

    clear_env();
}
