use std::io::Write;

use clap::Parser;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.backend.url = Some("https://file.example.supabase.co".to_string());
    raw.logging.level = Some("info".to_string());

    let overrides = GlobalOverrides {
        backend_url: Some("https://cli.example.supabase.co".to_string()),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(
        settings.backend.url.as_ref().map(Url::as_str),
        Some("https://cli.example.supabase.co/")
    );
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_match_site_policy() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(!settings.offline);
    assert_eq!(settings.cache.retry, 1);
    assert!(settings.cache.refetch_on_focus);
    assert_eq!(settings.cache.dashboard_refresh, Duration::from_secs(30));
    assert_eq!(settings.carousel.interval, Duration::from_millis(16));
    assert_eq!(settings.carousel.step, 1.0);
    assert_eq!(settings.backend.timeout, Duration::from_secs(30));
    assert!(settings.realtime.database_url.is_none());
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = GlobalOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_values_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.max_entries = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero capacity");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.max_entries",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.carousel.interval_ms = Some(0);
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.carousel.step = Some(-1.0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn blank_strings_count_as_unset() {
    let mut raw = RawSettings::default();
    raw.backend.anon_key = Some("   ".to_string());
    raw.realtime.database_url = Some(String::new());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.backend.anon_key.is_none());
    assert!(settings.realtime.database_url.is_none());
    assert!(matches!(
        settings.backend_endpoint(),
        Err(LoadError::Invalid {
            key: "backend.url",
            ..
        })
    ));
}

#[test]
fn invalid_backend_url_is_reported() {
    let mut raw = RawSettings::default();
    raw.backend.url = Some("not a url".to_string());
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "backend.url",
            ..
        })
    ));
}

#[test]
fn config_file_layer_is_read() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        "[backend]\nurl = \"https://project.supabase.co\"\nanon_key = \"anon\"\n\n[cache]\nretry = 0\n"
    )
    .expect("write config");

    let path = file.path().to_string_lossy().into_owned();
    let args = CliArgs::parse_from(["happylife", "--config-file", path.as_str(), "stats"]);
    let settings = load(&args).expect("settings");

    assert_eq!(settings.cache.retry, 0);
    let (url, key) = settings.backend_endpoint().expect("endpoint");
    assert_eq!(url.as_str(), "https://project.supabase.co/");
    assert_eq!(key, "anon");
}

#[test]
fn parse_watch_arguments() {
    let args = CliArgs::parse_from([
        "happylife",
        "watch",
        "blogs",
        "--search",
        "water",
        "--offline",
    ]);

    assert!(args.overrides.offline);
    match args.command {
        Command::Watch(watch) => {
            assert_eq!(watch.page, PageArg::Blogs);
            assert_eq!(watch.search.as_deref(), Some("water"));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_delete_arguments() {
    let id = uuid::Uuid::from_u128(42);
    let args = CliArgs::parse_from([
        "happylife",
        "delete",
        "donations",
        id.to_string().as_str(),
        "--email",
        "admin@example.org",
        "--password",
        "secret",
    ]);

    match &args.command {
        Command::Delete(delete) => {
            assert_eq!(delete.collection, happylife_types::Collection::Donations);
            assert_eq!(delete.id, id);
        }
        _ => panic!("wrong command parsed"),
    }
    let credentials = args.command.credentials().expect("credentials");
    assert_eq!(credentials.email.as_deref(), Some("admin@example.org"));
}

#[test]
fn parse_upload_and_realtime_arguments() {
    let args = CliArgs::parse_from(["happylife", "upload", "blog-images", "/tmp/cover.png"]);
    match args.command {
        Command::Upload(upload) => {
            assert_eq!(upload.bucket, crate::gateway::Bucket::Blogs);
            assert_eq!(upload.file, std::path::Path::new("/tmp/cover.png"));
        }
        _ => panic!("wrong command parsed"),
    }

    let args = CliArgs::parse_from(["happylife", "realtime", "install"]);
    assert!(matches!(
        args.command,
        Command::Realtime(RealtimeArgs {
            command: RealtimeCommand::Install
        })
    ));
}
