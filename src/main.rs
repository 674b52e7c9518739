use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use dreamsearch::config::{ClientConfig, ConfigError};
use dreamsearch::net::analysis::AnalysisService;
use dreamsearch::net::types::{CharacterId, ChatHistoryEntry, CurrentUser, SenderRole, TestResult};
use dreamsearch::net::users::UserService;
use dreamsearch::net::{ApiClient, ApiError};
use dreamsearch::persona::{self, DEFAULT_PERSONA_ID};
use dreamsearch::state::auth::{AuthError, AuthStore, token_from_callback};
use dreamsearch::state::chat::{ChatError, ChatSessionManager};
use dreamsearch::state::history::{HistoryError, HistoryPaginator, PageSource};
use dreamsearch::state::profile::{CheckOutcome, ProfileEditor, ProfileError};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("not signed in; run `dreamsearch login` first")]
    NotSignedIn,
    #[error("no access token found in callback URL")]
    NoCallbackToken,
    #[error("unknown character id {0}")]
    UnknownCharacter(CharacterId),
    #[error("nickname '{0}' is already taken")]
    NicknameTaken(String),
    #[error("nickname check failed: {0}")]
    CheckFailed(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "dreamsearch", about = "DreamSearch drawing-assessment and persona-chat client")]
struct Cli {
    #[arg(long, env = "DREAMSEARCH_API_URL")]
    base_url: Option<String>,

    /// Use this bearer token for one invocation instead of the stored one.
    #[arg(long, env = "DREAMSEARCH_TOKEN")]
    token: Option<String>,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store an access token from the sign-in flow.
    Login(LoginArgs),
    /// Finish first-login signup by choosing a nickname.
    Signup { nickname: String },
    Logout,
    Whoami,
    /// Chat with a persona interactively.
    Chat(ChatArgs),
    History(HistoryCommand),
    Profile(ProfileCommand),
    /// List the personas available for a test outcome.
    Personas {
        #[arg(long)]
        outcome: Option<String>,

        /// Also print a sample line in each persona's voice.
        #[arg(long, default_value_t = false)]
        samples: bool,
    },
    /// Upload a drawing and wait for its analysis.
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct LoginArgs {
    #[arg(long)]
    token: Option<String>,

    /// Redirect URL carrying `access_token` or `token`.
    #[arg(long)]
    callback: Option<String>,
}

#[derive(Args, Debug)]
struct ChatArgs {
    #[arg(long, default_value_t = DEFAULT_PERSONA_ID)]
    character: CharacterId,

    /// Resume an existing session instead of starting a new one.
    #[arg(long)]
    session: Option<Uuid>,
}

#[derive(Args, Debug)]
struct HistoryCommand {
    #[command(subcommand)]
    kind: HistoryKind,
}

#[derive(Subcommand, Debug)]
enum HistoryKind {
    Chats {
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    Tests {
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
}

#[derive(Args, Debug)]
struct ProfileCommand {
    #[command(subcommand)]
    command: ProfileSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProfileSubcommand {
    Show,
    Rename { name: String },
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    image: PathBuf,

    #[arg(long)]
    description: Option<String>,

    /// Return after the upload instead of polling for the result.
    #[arg(long, default_value_t = false)]
    no_wait: bool,
}

const SIGN_IN_HINT: &str = "signed out; run `dreamsearch login` to sign in again";

struct CliContext {
    auth: Arc<AuthStore>,
    api: ApiClient,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url)?;
    }
    let auth = Arc::new(match cli.token {
        Some(token) => AuthStore::in_memory(Some(token)),
        None => AuthStore::open(config.auth_file()),
    });
    let api = ApiClient::new(&config, Arc::clone(&auth))?;
    let ctx = CliContext { auth, api };

    match cli.command {
        Command::Login(args) => run_login(&ctx, args).await,
        Command::Signup { nickname } => {
            require_user(&ctx).await?;
            print_json(&ctx.api.complete_signup(&nickname).await?)
        }
        Command::Logout => {
            ctx.auth.sign_out()?;
            println!("signed out");
            Ok(())
        }
        Command::Whoami => print_json(&require_user(&ctx).await?),
        Command::Chat(args) => run_chat(&ctx, args).await,
        Command::History(history) => run_history(&ctx, history.kind).await,
        Command::Profile(profile) => run_profile(&ctx, profile.command).await,
        Command::Personas { outcome, samples } => {
            let mut rng = rand::rng();
            for p in persona::available_for(outcome.as_deref()) {
                println!("{}\t{} {}\t{}", p.id, p.avatar, p.name, p.description);
                if samples {
                    println!("\t\"{}\"", p.reply_line(&mut rng));
                }
            }
            Ok(())
        }
        Command::Analyze(args) => run_analyze(&ctx, args).await,
    }
}

async fn require_user(ctx: &CliContext) -> Result<CurrentUser, CliError> {
    if !ctx.auth.is_authenticated() {
        return Err(CliError::NotSignedIn);
    }
    Ok(ctx.api.current_user().await?)
}

async fn run_login(ctx: &CliContext, args: LoginArgs) -> Result<(), CliError> {
    let token = match (args.token, args.callback) {
        (Some(token), _) => token,
        (None, Some(url)) => {
            let found = token_from_callback(&url).ok_or(CliError::NoCallbackToken)?;
            println!("continue at {}", found.scrubbed_url);
            found.token
        }
        (None, None) => return Err(CliError::NoCallbackToken),
    };
    ctx.auth.sign_in(token, None)?;

    let user = ctx.api.current_user().await?;
    if user.is_first_login {
        println!("welcome! finish signing up with `dreamsearch signup <nickname>`");
    }
    print_json(&user)
}

async fn run_chat(ctx: &CliContext, args: ChatArgs) -> Result<(), CliError> {
    let user = require_user(ctx).await?;
    let character = persona::find(args.character).ok_or(CliError::UnknownCharacter(args.character))?;
    let chat = ChatSessionManager::new(Arc::new(ctx.api.clone()));

    match args.session {
        Some(session_id) => {
            chat.load_session(session_id).await?;
        }
        None => {
            let title = format!("{}와의 대화", character.name);
            chat.create_session(user.id, character.id, Some(&title)).await?;
        }
    }

    let state = chat.snapshot();
    for message in &state.messages {
        print_message(character.name, message.sender, &message.content);
    }
    if state.messages.is_empty() {
        if let Some(greeting) = chat.opening_line() {
            print_message(character.name, SenderRole::Assistant, &greeting);
        }
    }
    println!("(/end to finish, /clear to clear, /last to repeat the last reply, /quit to leave)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "/quit" => break,
            "/end" => {
                chat.end_conversation();
                println!("대화가 종료되었습니다");
            }
            "/clear" => chat.clear_messages(),
            "/last" => {
                if let Some(reply) = chat.snapshot().last_reply() {
                    print_message(character.name, reply.sender, &reply.content);
                }
            }
            _ => {
                chat.set_input(&line);
                match chat.submit_input().await {
                    Ok(reply) => print_message(character.name, reply.sender, &reply.content),
                    Err(ChatError::EmptyMessage) => {}
                    Err(ChatError::Api(e)) if e.is_auth() => {
                        eprintln!("error: {e}");
                        eprintln!("{SIGN_IN_HINT}");
                        break;
                    }
                    Err(e) => {
                        eprintln!("error: {e}");
                        if matches!(&e, ChatError::Api(api) if api.retryable()) {
                            eprintln!("the message was not delivered; send it again to retry");
                        }
                        chat.clear_error();
                    }
                }
            }
        }
    }

    chat.teardown();
    Ok(())
}

fn print_message(character: &str, sender: SenderRole, content: &str) {
    match sender {
        SenderRole::User => println!("나: {content}"),
        SenderRole::Assistant => println!("{character}: {content}"),
    }
}

async fn run_history(ctx: &CliContext, kind: HistoryKind) -> Result<(), CliError> {
    let user = require_user(ctx).await?;
    let users = UserService::new(ctx.api.clone());
    match kind {
        HistoryKind::Chats { pages } => {
            let entries = load_pages::<ChatHistoryEntry, _>(users.chat_history_source(user.id), pages).await?;
            print_json(&entries)
        }
        HistoryKind::Tests { pages } => {
            let analysis = AnalysisService::new(ctx.api.clone());
            let mut results = load_pages::<TestResult, _>(users.test_result_source(user.id), pages).await?;
            for result in &mut results {
                for image in &mut result.images {
                    let resolved = analysis.image_url(image);
                    *image = resolved;
                }
            }
            print_json(&results)
        }
    }
}

async fn load_pages<T, S>(source: S, pages: usize) -> Result<Vec<T>, CliError>
where
    T: Clone,
    S: PageSource<T>,
{
    let paginator = HistoryPaginator::new(Arc::new(source));
    for _ in 0..pages {
        if !paginator.has_more() {
            break;
        }
        if let Err(e) = paginator.load_more().await {
            if let HistoryError::Api(api) = &e {
                if api.is_auth() {
                    eprintln!("{SIGN_IN_HINT}");
                } else if api.retryable() && !paginator.items().is_empty() {
                    eprintln!("stopped early; run again to retry");
                    break;
                }
            }
            return Err(e.into());
        }
    }
    if paginator.has_more() {
        eprintln!("more records available; pass --pages to load further");
    }
    Ok(paginator.items())
}

async fn run_profile(ctx: &CliContext, command: ProfileSubcommand) -> Result<(), CliError> {
    let user = require_user(ctx).await?;
    let users = UserService::new(ctx.api.clone());
    let profile = users.profile(user.id).await?;

    match command {
        ProfileSubcommand::Show => print_json(&profile),
        ProfileSubcommand::Rename { name } => {
            let editor = ProfileEditor::new(Arc::new(users), profile);
            editor.begin_edit()?;
            editor.set_candidate(&name)?;
            match editor.check_now().await? {
                CheckOutcome::Available => {}
                CheckOutcome::Taken => return Err(CliError::NicknameTaken(name)),
                CheckOutcome::Failed => {
                    let reason = editor.snapshot().last_error.unwrap_or_default();
                    return Err(CliError::CheckFailed(reason));
                }
            }
            let saved = editor.save().await?;
            if let Some(notice) = editor.snapshot().notice {
                println!("{notice}");
            }
            print_json(&saved)
        }
    }
}

async fn run_analyze(ctx: &CliContext, args: AnalyzeArgs) -> Result<(), CliError> {
    require_user(ctx).await?;
    let analysis = AnalysisService::new(ctx.api.clone());
    let started = analysis.analyze_image(&args.image, args.description.as_deref()).await?;
    println!("test {}: {}", started.test_id, started.message);
    if args.no_wait {
        return Ok(());
    }

    let status = analysis
        .poll_status(started.test_id, |s| {
            eprintln!("[{}/{}] {}", s.completed_steps, s.total_steps, s.message);
        })
        .await?;
    if let Some(matched) = status.result.as_ref().and_then(|r| r.friends_type).and_then(persona::find) {
        println!("matched persona: {} {}", matched.avatar, matched.name);
    }
    print_json(&status)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
