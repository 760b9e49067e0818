use super::*;
use blog_panel::config::HttpTimeouts;
use blog_panel::session::MemorySession;

#[test]
fn parses_friend_update_flags() {
    let cli = Cli::try_parse_from([
        "panel",
        "friend",
        "update",
        "12",
        "--description",
        "",
        "--status",
        "timeout",
        "--overwrite-if-blank",
    ])
    .unwrap();

    let Command::Friend(FriendCommand { command: FriendSubcommand::Update { id, description, status, overwrite_if_blank, .. } }) =
        cli.command
    else {
        panic!("expected friend update");
    };
    assert_eq!(id, 12);
    assert_eq!(description.as_deref(), Some(""));
    assert_eq!(status.as_deref(), Some("timeout"));
    assert!(overwrite_if_blank);
}

#[test]
fn parses_typed_enums() {
    let cli = Cli::try_parse_from(["panel", "moment", "list", "--status", "hidden", "--page", "2"]).unwrap();
    let Command::Moment(MomentCommand { command: MomentSubcommand::List { pages, status } }) = cli.command else {
        panic!("expected moment list");
    };
    assert_eq!(status, Some(MomentStatus::Hidden));
    assert_eq!((pages.page, pages.page_size), (2, 10));

    let cli = Cli::try_parse_from(["panel", "resource", "upload", "a.png", "--target", "oss"]).unwrap();
    let Command::Resource(ResourceCommand { command: ResourceSubcommand::Upload { target, overwrite, .. } }) =
        cli.command
    else {
        panic!("expected resource upload");
    };
    assert_eq!(target, UploadTarget::Oss);
    assert!(!overwrite);
}

#[test]
fn rejects_unknown_enum_values() {
    assert!(Cli::try_parse_from(["panel", "moment", "list", "--status", "gone"]).is_err());
    assert!(Cli::try_parse_from(["panel", "resource", "delete", "a", "--target", "s3"]).is_err());
}

#[test]
fn config_set_requires_assignments() {
    assert!(Cli::try_parse_from(["panel", "config", "set"]).is_err());
}

#[test]
fn media_flags_keep_type() {
    let media = collect_media(vec!["/a.png".into()], vec!["/b.mp4".into()]);
    assert_eq!(media.len(), 2);
    assert_eq!(media[0].media_type, MediaType::Image);
    assert_eq!(media[1].media_type, MediaType::Video);
}

#[test]
fn assignments_parse_or_fail_whole_batch() {
    let ok = parse_assignments(&["crawler_conf.concurrency=4".to_owned(), "oss_conf.bucket=media".to_owned()]).unwrap();
    assert_eq!(ok[0].value, serde_json::json!(4));
    assert_eq!(ok[1].value, serde_json::json!("media"));

    assert!(matches!(parse_assignments(&["novalue".to_owned()]), Err(CliError::Assignment(_))));
}

#[test]
fn upload_reads_file_name_and_bytes() {
    let dir = std::env::temp_dir().join(format!("panel-cli-upload-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join("logo.png");
    std::fs::write(&file, b"png").unwrap();

    let upload = read_upload(&file, Some("img".into()), true).unwrap();

    assert_eq!(upload.file_name, "logo.png");
    assert_eq!(upload.bytes, b"png");
    assert_eq!(upload.path.as_deref(), Some("img"));
    assert!(upload.overwrite);
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn missing_upload_file_is_reported_with_path() {
    let err = read_upload(Path::new("/definitely/not/here.png"), None, false).unwrap_err();
    assert!(err.to_string().contains("/definitely/not/here.png"));
}

// =============================================================================
// Guard gating
// =============================================================================

/// Context whose transport points at a closed local port, so any request fails.
fn offline_context(session: MemorySession) -> CliContext {
    let transport = ReqwestTransport::new("http://127.0.0.1:9", HttpTimeouts::default()).unwrap();
    CliContext::new(transport, Arc::new(session), "/panel")
}

#[test]
fn enter_protected_view_without_token_is_not_signed_in() {
    let ctx = offline_context(MemorySession::new());

    let err = ctx.enter("/friend").unwrap_err();

    assert!(matches!(err, CliError::NotSignedIn), "got {err:?}");
    assert!(ctx.history.current().unwrap().is_login());
}

#[test]
fn enter_protected_view_with_token_lands_there() {
    let ctx = offline_context(MemorySession::with_token("tok"));

    let route = ctx.enter("/friend").unwrap();

    assert_eq!(route.path, "/friend");
    assert_eq!(route.full_path, "/panel/friend");
}

#[tokio::test]
async fn login_while_signed_in_stops_before_any_request() {
    let ctx = offline_context(MemorySession::with_token("tok"));
    let args = LoginArgs { username: "admin".into(), password: "pw".into(), turnstile_token: None };

    // An attempted request would fail against the closed port.
    run_login(&ctx, args).await.unwrap();

    assert_eq!(ctx.history.current().unwrap().path, "/dashboard");
}

#[tokio::test]
async fn login_without_token_reaches_the_backend() {
    let ctx = offline_context(MemorySession::new());
    let args = LoginArgs { username: "admin".into(), password: "pw".into(), turnstile_token: None };

    let err = run_login(&ctx, args).await.unwrap_err();

    assert!(matches!(err, CliError::Api(ApiError::Network(_))), "got {err:?}");
}
