use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blog_panel::api::{auth, config, friend, image, moment, resource, rss, stats};
use blog_panel::config::ConfigError;
use blog_panel::model::auth::LoginRequest;
use blog_panel::model::config::{ConfigUpdate, InvalidAssignment};
use blog_panel::model::friend::{
    CreateFriendLinkPayload, FriendLinkListParams, FriendLinkPatch, UpdateFriendLinkPayload, UpdateOptions,
};
use blog_panel::model::image::{CreateImagePayload, ImageListParams, UpdateImagePayload};
use blog_panel::model::moment::{
    CreateMediaPayload, CreateMomentPayload, MediaType, MomentListParams, MomentStatus, NewMomentMedia,
    UpdateMomentPayload,
};
use blog_panel::model::resource::{UploadFile, UploadTarget};
use blog_panel::model::rss::RssPatch;
use blog_panel::net::{Notifier, ReqwestTransport, TransportError};
use blog_panel::router::{History, ResolvedRoute, RouteError, Router};
use blog_panel::session::{FileSession, SessionError, SessionStore};
use blog_panel::util::{Pagination, format_date};
use blog_panel::{ApiError, Gateway, PanelConfig};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("not signed in; run `panel login` first")]
    NotSignedIn,
    #[error(transparent)]
    Assignment(#[from] InvalidAssignment),
    #[error("file {}: {source}", path.display())]
    File { path: PathBuf, source: io::Error },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "panel", about = "Friend-link / RSS / moments admin panel")]
struct Cli {
    #[arg(long, env = "PANEL_API_ROOT")]
    api_root: Option<String>,

    #[arg(long, env = "PANEL_BASE_PATH")]
    base_path: Option<String>,

    #[arg(long, env = "PANEL_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login(LoginArgs),
    Logout,
    /// Dashboard counters and uptime.
    Status,
    Friend(FriendCommand),
    Image(ImageCommand),
    Moment(MomentCommand),
    Rss(RssCommand),
    Resource(ResourceCommand),
    Config(ConfigCommand),
    /// Show where a panel path lands under the current session.
    Route { path: String },
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[arg(long, env = "PANEL_USERNAME")]
    username: String,
    #[arg(long, env = "PANEL_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long)]
    turnstile_token: Option<String>,
}

#[derive(Args, Debug)]
struct PageArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = blog_panel::util::pagination::DEFAULT_PAGE_SIZE)]
    page_size: u32,
}

#[derive(Args, Debug)]
struct FriendCommand {
    #[command(subcommand)]
    command: FriendSubcommand,
}

#[derive(Subcommand, Debug)]
enum FriendSubcommand {
    List {
        #[command(flatten)]
        pages: PageArgs,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        died: Option<bool>,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        link: String,
        #[arg(long)]
        avatar: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        enable_rss: Option<bool>,
    },
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        link: Option<String>,
        #[arg(long)]
        avatar: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        enable_rss: Option<bool>,
        #[arg(long)]
        died: Option<bool>,
        #[arg(long)]
        email: Option<String>,
        /// Let empty values clear the stored field.
        #[arg(long, default_value_t = false)]
        overwrite_if_blank: bool,
    },
    Delete {
        id: i64,
    },
}

#[derive(Args, Debug)]
struct ImageCommand {
    #[command(subcommand)]
    command: ImageSubcommand,
}

#[derive(Subcommand, Debug)]
enum ImageSubcommand {
    List {
        #[command(flatten)]
        pages: PageArgs,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        search: Option<String>,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        local_path: Option<String>,
    },
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    Delete {
        id: i64,
    },
}

#[derive(Args, Debug)]
struct MomentCommand {
    #[command(subcommand)]
    command: MomentSubcommand,
}

#[derive(Subcommand, Debug)]
enum MomentSubcommand {
    List {
        #[command(flatten)]
        pages: PageArgs,
        #[arg(long)]
        status: Option<MomentStatus>,
    },
    Create {
        #[arg(long)]
        content: String,
        #[arg(long = "image")]
        images: Vec<String>,
        #[arg(long = "video")]
        videos: Vec<String>,
    },
    Update {
        id: i64,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        status: Option<MomentStatus>,
        #[arg(long)]
        message_link: Option<String>,
    },
    Delete {
        id: i64,
    },
    AddMedia {
        moment_id: i64,
        #[arg(long)]
        url: String,
        #[arg(long = "type", default_value = "image")]
        media_type: MediaType,
        #[arg(long)]
        name: Option<String>,
        /// The URL points at a file stored by this server.
        #[arg(long, default_value_t = false)]
        local: bool,
    },
    DeleteMedia {
        id: i64,
        /// Also remove the stored file.
        #[arg(long, default_value_t = false)]
        hard: bool,
    },
}

#[derive(Args, Debug)]
struct RssCommand {
    #[command(subcommand)]
    command: RssSubcommand,
}

#[derive(Subcommand, Debug)]
enum RssSubcommand {
    List {
        #[command(flatten)]
        pages: PageArgs,
    },
    Posts {
        rss_id: i64,
        #[command(flatten)]
        pages: PageArgs,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
    },
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    Delete {
        id: i64,
    },
}

#[derive(Args, Debug)]
struct ResourceCommand {
    #[command(subcommand)]
    command: ResourceSubcommand,
}

#[derive(Subcommand, Debug)]
enum ResourceSubcommand {
    List {
        #[arg(default_value = "")]
        path: String,
    },
    Read {
        path: String,
        #[arg(long, help = "Output file path; stdout when omitted")]
        output: Option<PathBuf>,
    },
    Upload {
        file: PathBuf,
        #[arg(long, default_value = "local")]
        target: UploadTarget,
        /// Directory under the resource root (local uploads only).
        #[arg(long)]
        path: Option<String>,
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    Delete {
        path: String,
        #[arg(long, default_value = "local")]
        target: UploadTarget,
    },
}

#[derive(Args, Debug)]
struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Subcommand, Debug)]
enum ConfigSubcommand {
    Show,
    /// Apply `key=value` assignments; values are read as JSON when they parse.
    Set {
        #[arg(required = true)]
        assignments: Vec<String>,
    },
}

/// Prints notices to stderr so stdout stays machine-readable.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn error(&self, message: &str) {
        eprintln!("error: {message}");
    }
}

struct CliContext {
    gateway: Gateway,
    history: Arc<History>,
}

impl CliContext {
    fn new(transport: ReqwestTransport, session: Arc<dyn SessionStore>, base_path: &str) -> Self {
        let router = Router::new(base_path);
        let login_route = router.login_path();
        let history = Arc::new(History::new(router, session.clone()));
        let gateway = Gateway::new(Arc::new(transport), session)
            .with_notifier(Arc::new(ConsoleNotifier))
            .with_navigator(history.clone())
            .with_login_route(login_route);
        Self { gateway, history }
    }

    /// Enter `path` through the guard; anything other than landing on it
    /// means the session cannot use that view.
    fn enter(&self, path: &str) -> Result<ResolvedRoute, CliError> {
        let route = self.history.push(path)?;
        if route.is_login() && !path.ends_with("/login") {
            return Err(CliError::NotSignedIn);
        }
        Ok(route)
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = build_context(&cli)?;

    match cli.command {
        Command::Login(args) => run_login(&ctx, args).await,
        Command::Logout => {
            auth::logout(&ctx.gateway)?;
            println!("signed out");
            Ok(())
        }
        Command::Status => run_status(&ctx).await,
        Command::Friend(cmd) => run_friend(&ctx, cmd).await,
        Command::Image(cmd) => run_image(&ctx, cmd).await,
        Command::Moment(cmd) => run_moment(&ctx, cmd).await,
        Command::Rss(cmd) => run_rss(&ctx, cmd).await,
        Command::Resource(cmd) => run_resource(&ctx, cmd).await,
        Command::Config(cmd) => run_config(&ctx, cmd).await,
        Command::Route { path } => print_json(&ctx.history.push(&path)?),
    }
}

fn build_context(cli: &Cli) -> Result<CliContext, CliError> {
    let mut cfg = PanelConfig::from_env()?;
    if let Some(root) = &cli.api_root {
        cfg = cfg.with_api_root(root)?;
    }
    if let Some(base) = &cli.base_path {
        cfg = cfg.with_base_path(base);
    }
    if let Some(path) = &cli.token_file {
        cfg = cfg.with_token_file(path);
    }
    let session = FileSession::open(&cfg.token_file)?;
    tracing::debug!(
        api_root = %cfg.api_root,
        base_path = %cfg.base_path,
        token_file = %session.path().display(),
        "panel config loaded"
    );

    let transport = ReqwestTransport::new(cfg.api_root.clone(), cfg.timeouts)?;
    Ok(CliContext::new(transport, Arc::new(session), &cfg.base_path))
}

async fn run_login(ctx: &CliContext, args: LoginArgs) -> Result<(), CliError> {
    let route = ctx.history.push("/login")?;
    if !route.is_login() {
        println!("already signed in");
        return Ok(());
    }

    let credentials = LoginRequest {
        username: args.username,
        password: args.password,
        turnstile_token: args.turnstile_token,
    };
    let envelope = auth::login(&ctx.gateway, &credentials).await?;
    let landing = ctx.history.push("/dashboard")?;
    println!("signed in until {}; now at {}", envelope.data.expires_at, landing.full_path);
    Ok(())
}

async fn run_status(ctx: &CliContext) -> Result<(), CliError> {
    ctx.enter("/dashboard")?;
    let status = stats::get_system_status(&ctx.gateway).await?.data;
    let counts = &status.status_data;
    println!("uptime:      {}", status.uptime);
    println!("server time: {}", format_date(status.time));
    println!("friends:     {}", counts.friend_link_count);
    println!("feeds:       {}", counts.rss_count);
    println!("posts:       {}", counts.rss_post_count);
    for slice in &counts.friend_link_status_pie {
        println!("  {:<10} {}", slice.status, slice.count);
    }
    Ok(())
}

async fn run_friend(ctx: &CliContext, cmd: FriendCommand) -> Result<(), CliError> {
    ctx.enter("/friend")?;
    match cmd.command {
        FriendSubcommand::List { pages, status, search, died } => {
            let mut pager = Pagination::new(pages.page_size);
            let page = pager
                .handle_page_change(pages.page, |q| {
                    let params = FriendLinkListParams {
                        page: Some(q.page),
                        page_size: Some(q.page_size),
                        is_died: died,
                        status,
                        search,
                    };
                    async move { friend::list(&ctx.gateway, &params).await }
                })
                .await?
                .data;
            pager.set_total(page.total);
            print_json(&page)?;
            print_page_footer(&pager);
            Ok(())
        }
        FriendSubcommand::Create { name, link, avatar, description, email, enable_rss } => {
            let payload = CreateFriendLinkPayload { name, link, avatar, description, email, enable_rss };
            print_json(&friend::create(&ctx.gateway, &payload).await?)
        }
        FriendSubcommand::Update {
            id,
            name,
            link,
            avatar,
            description,
            status,
            enable_rss,
            died,
            email,
            overwrite_if_blank,
        } => {
            let data = FriendLinkPatch {
                name,
                link,
                avatar,
                description,
                status: status.map(Into::into),
                enable_rss,
                is_died: died,
                email,
                times: None,
            };
            let opt = overwrite_if_blank.then_some(UpdateOptions { overwrite_if_blank });
            let payload = UpdateFriendLinkPayload { data, opt };
            print_json(&friend::update(&ctx.gateway, id, &payload).await?)
        }
        FriendSubcommand::Delete { id } => print_json(&friend::delete(&ctx.gateway, id).await?),
    }
}

async fn run_image(ctx: &CliContext, cmd: ImageCommand) -> Result<(), CliError> {
    ctx.enter("/image")?;
    match cmd.command {
        ImageSubcommand::List { pages, status, search } => {
            let params =
                ImageListParams { page: Some(pages.page), page_size: Some(pages.page_size), status, search };
            print_json(&image::list(&ctx.gateway, &params).await?.data)
        }
        ImageSubcommand::Create { name, url, local_path } => {
            let is_local = local_path.is_some().then_some(1);
            let payload = CreateImagePayload { name, url, local_path, is_local };
            print_json(&image::create(&ctx.gateway, &payload).await?)
        }
        ImageSubcommand::Update { id, name, url, status } => {
            let payload = UpdateImagePayload { name, url, status };
            print_json(&image::update(&ctx.gateway, id, &payload).await?)
        }
        ImageSubcommand::Delete { id } => print_json(&image::delete(&ctx.gateway, id).await?),
    }
}

async fn run_moment(ctx: &CliContext, cmd: MomentCommand) -> Result<(), CliError> {
    ctx.enter("/moments")?;
    match cmd.command {
        MomentSubcommand::List { pages, status } => {
            let params = MomentListParams { page: pages.page, page_size: pages.page_size, status };
            print_json(&moment::list(&ctx.gateway, &params).await?.data)
        }
        MomentSubcommand::Create { content, images, videos } => {
            let media = collect_media(images, videos);
            let payload = CreateMomentPayload { content, media, ..Default::default() };
            print_json(&moment::create(&ctx.gateway, &payload).await?)
        }
        MomentSubcommand::Update { id, content, status, message_link } => {
            let payload = UpdateMomentPayload { content, status, message_link };
            print_json(&moment::update(&ctx.gateway, id, &payload).await?)
        }
        MomentSubcommand::Delete { id } => print_json(&moment::delete(&ctx.gateway, id).await?),
        MomentSubcommand::AddMedia { moment_id, url, media_type, name, local } => {
            let payload = CreateMediaPayload { moment_id, name, media_url: url, media_type, is_local: i32::from(local) };
            print_json(&moment::create_media(&ctx.gateway, &payload).await?)
        }
        MomentSubcommand::DeleteMedia { id, hard } => print_json(&moment::delete_media(&ctx.gateway, id, hard).await?),
    }
}

fn collect_media(images: Vec<String>, videos: Vec<String>) -> Vec<NewMomentMedia> {
    let images = images.into_iter().map(|media_url| NewMomentMedia { media_url, media_type: MediaType::Image });
    let videos = videos.into_iter().map(|media_url| NewMomentMedia { media_url, media_type: MediaType::Video });
    images.chain(videos).collect()
}

async fn run_rss(ctx: &CliContext, cmd: RssCommand) -> Result<(), CliError> {
    ctx.enter("/rss")?;
    match cmd.command {
        RssSubcommand::List { pages } => print_json(&rss::list(&ctx.gateway, pages.page, pages.page_size).await?.data),
        RssSubcommand::Posts { rss_id, pages } => {
            print_json(&rss::posts_by_feed(&ctx.gateway, rss_id, pages.page, pages.page_size).await?.data)
        }
        RssSubcommand::Create { name, url } => print_json(&rss::create(&ctx.gateway, &name, &url).await?),
        RssSubcommand::Update { id, name, url, status } => {
            let patch = RssPatch { name, rss_url: url, status };
            print_json(&rss::update(&ctx.gateway, id, patch).await?)
        }
        RssSubcommand::Delete { id } => print_json(&rss::delete(&ctx.gateway, id).await?),
    }
}

async fn run_resource(ctx: &CliContext, cmd: ResourceCommand) -> Result<(), CliError> {
    ctx.enter("/image")?;
    match cmd.command {
        ResourceSubcommand::List { path } => print_json(&resource::list(&ctx.gateway, &path).await?.data),
        ResourceSubcommand::Read { path, output } => {
            let bytes = resource::read(&ctx.gateway, &path).await?;
            match output {
                Some(out) => std::fs::write(&out, &bytes).map_err(|source| CliError::File { path: out, source }),
                None => io::stdout()
                    .write_all(&bytes)
                    .map_err(|source| CliError::File { path: PathBuf::from("-"), source }),
            }
        }
        ResourceSubcommand::Upload { file, target, path, overwrite } => {
            let upload = read_upload(&file, path, overwrite)?;
            print_json(&resource::upload(&ctx.gateway, upload, target).await?)
        }
        ResourceSubcommand::Delete { path, target } => print_json(&resource::delete(&ctx.gateway, &path, target).await?),
    }
}

fn read_upload(file: &Path, path: Option<String>, overwrite: bool) -> Result<UploadFile, CliError> {
    let bytes = std::fs::read(file).map_err(|source| CliError::File { path: file.to_path_buf(), source })?;
    let file_name = file
        .file_name()
        .map_or_else(|| "upload".to_owned(), |name| name.to_string_lossy().into_owned());
    Ok(UploadFile { file_name, bytes, path, overwrite })
}

async fn run_config(ctx: &CliContext, cmd: ConfigCommand) -> Result<(), CliError> {
    ctx.enter("/settings")?;
    match cmd.command {
        ConfigSubcommand::Show => print_json(&config::get_system_config(&ctx.gateway).await?),
        ConfigSubcommand::Set { assignments } => {
            let updates = parse_assignments(&assignments)?;
            print_json(&config::update_system_config(&ctx.gateway, &updates).await?)
        }
    }
}

fn parse_assignments(raw: &[String]) -> Result<Vec<ConfigUpdate>, CliError> {
    raw.iter().map(|a| ConfigUpdate::parse_assignment(a).map_err(CliError::from)).collect()
}

fn print_page_footer(pager: &Pagination) {
    eprintln!("page {}, {} per page, {} total", pager.current_page(), pager.page_size(), pager.total());
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
