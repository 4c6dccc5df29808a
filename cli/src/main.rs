use std::io::IsTerminal;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use taskboard::{
    ApiClient, ApiError, ClientConfig, ConfigError, GateDecision, MemoryNavigator, NewTask, Notification,
    NotificationLevel, Notifier, RoutePolicy, SessionContext, TaskFilter, TaskPatch, TracingNotifier,
};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("missing credentials; pass --username/--password or set TASKBOARD_USERNAME/TASKBOARD_PASSWORD")]
    MissingCredentials,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("api request failed: {0}")]
    Api(#[from] ApiError),
    #[error("signed in, but {route} still has no session")]
    NoSession { route: String },
    #[error("nothing to update; pass at least one of --title, --description, --due-date, --completed")]
    EmptyPatch,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "taskboard-cli", about = "Taskboard API CLI")]
struct Cli {
    /// Overrides `TASKBOARD_API_URL`.
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long, env = "TASKBOARD_USERNAME", global = true)]
    username: Option<String>,

    #[arg(long, env = "TASKBOARD_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Page the session is used from after sign-in.
    #[arg(long, default_value = "/tasks")]
    route: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account (does not sign in).
    Register {
        #[arg(long)]
        email: String,
    },
    /// Sign in and print the current user.
    Login,
    Logout,
    /// Print the user the session resolves to on `--route`.
    Me,
    Task(TaskCommand),
    /// Evaluate the route gate for a path.
    Gate {
        path: String,
        #[arg(long, default_value_t = false)]
        refresh_cookie: bool,
    },
}

#[derive(Args, Debug)]
struct TaskCommand {
    #[command(subcommand)]
    command: TaskSubcommand,
}

#[derive(Subcommand, Debug)]
enum TaskSubcommand {
    List {
        #[arg(long)]
        skip: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        completed: Option<bool>,
    },
    Create {
        #[arg(long)]
        title: String,
        #[command(flatten)]
        fields: TaskFields,
    },
    Get {
        id: i64,
    },
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        fields: TaskFields,
    },
    Delete {
        id: i64,
    },
}

#[derive(Args, Debug)]
struct TaskFields {
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    due_date: Option<String>,
    #[arg(long)]
    completed: Option<bool>,
}

/// Notifications go to stderr so stdout stays pure JSON.
struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Success => eprintln!("{}: {}", notification.title, notification.message),
            NotificationLevel::Error => eprintln!("{} ({})", notification.title, notification.message),
        }
    }
}

/// Plain lines for a person at a terminal; structured log events otherwise.
fn notifier() -> Arc<dyn Notifier> {
    if std::io::stderr().is_terminal() {
        Arc::new(StderrNotifier)
    } else {
        Arc::new(TracingNotifier)
    }
}

struct CliContext {
    navigator: Arc<MemoryNavigator>,
    session: SessionContext,
    username: Option<String>,
    password: Option<String>,
    route: String,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,taskboard=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings {
        base_url: cli.base_url,
        username: cli.username,
        password: cli.password,
        route: cli.route,
    };

    match cli.command {
        Command::Register { email } => run_register(&connect(settings)?, &email).await,
        Command::Login | Command::Me => {
            let user = sign_in(&connect(settings)?).await?;
            print_json(&user)
        }
        Command::Logout => run_logout(&connect(settings)?).await,
        Command::Task(task) => run_task(&connect(settings)?, task).await,
        Command::Gate { path, refresh_cookie } => {
            print_json(&gate_json(&RoutePolicy::default(), &path, refresh_cookie))
        }
    }
}

struct Settings {
    base_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    route: String,
}

/// Build the client and an empty session, parked on the sign-in page.
fn connect(settings: Settings) -> Result<CliContext, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = &settings.base_url {
        config = config.with_base_url(base_url)?;
    }
    tracing::debug!(base_url = %config.base_url, "client configured");

    let navigator = Arc::new(MemoryNavigator::new(RoutePolicy::default().sign_in()));
    let client = ApiClient::new(&config, navigator.clone())?;
    Ok(CliContext::new(client, navigator, settings))
}

impl CliContext {
    fn new(client: ApiClient, navigator: Arc<MemoryNavigator>, settings: Settings) -> Self {
        let client = Arc::new(client.with_routes(RoutePolicy::default()));
        Self {
            navigator,
            session: SessionContext::new(client, notifier()),
            username: settings.username,
            password: settings.password,
            route: settings.route,
        }
    }
}

fn credentials(ctx: &CliContext) -> Result<(&str, &str), CliError> {
    match (&ctx.username, &ctx.password) {
        (Some(username), Some(password)) => Ok((username.as_str(), password.as_str())),
        _ => Err(CliError::MissingCredentials),
    }
}

/// Sign in from the sign-in page, then move to `--route` and let the session
/// re-check identity there. Returns the signed-in user as JSON.
async fn sign_in(ctx: &CliContext) -> Result<Value, CliError> {
    let (username, password) = credentials(ctx)?;
    ctx.session.login(username, password).await?;

    ctx.navigator.visit(&ctx.route);
    let session = ctx.session.route_changed(&ctx.route).await;
    if ctx.session.client().routes().requires_session(&ctx.route) && !session.is_authenticated() {
        return Err(CliError::NoSession {
            route: ctx.route.clone(),
        });
    }
    Ok(serde_json::to_value(session.user)?)
}

async fn run_register(ctx: &CliContext, email: &str) -> Result<(), CliError> {
    let (username, password) = credentials(ctx)?;
    ctx.session.register(username, email, password).await?;
    print_json(&json!({ "username": username, "email": email, "registered": true }))
}

async fn run_logout(ctx: &CliContext) -> Result<(), CliError> {
    sign_in(ctx).await?;
    ctx.session.logout().await;
    let location = ctx.navigator.history().last().cloned();
    print_json(&json!({
        "signed_in": ctx.session.session().is_authenticated(),
        "location": location,
    }))
}

async fn run_task(ctx: &CliContext, task: TaskCommand) -> Result<(), CliError> {
    sign_in(ctx).await?;
    let client = ctx.session.client();
    let tasks = client.tasks();

    let value = match task.command {
        TaskSubcommand::List {
            skip,
            limit,
            completed,
        } => serde_json::to_value(tasks.list(TaskFilter { skip, limit, completed }).await?)?,
        TaskSubcommand::Create { title, fields } => {
            let new_task = NewTask {
                title,
                description: fields.description,
                completed: fields.completed,
                due_date: fields.due_date,
            };
            serde_json::to_value(tasks.create(&new_task).await?)?
        }
        TaskSubcommand::Get { id } => serde_json::to_value(tasks.get(id).await?)?,
        TaskSubcommand::Update { id, title, fields } => {
            let patch = TaskPatch {
                title,
                description: fields.description,
                completed: fields.completed,
                due_date: fields.due_date,
            };
            if patch.is_empty() {
                return Err(CliError::EmptyPatch);
            }
            serde_json::to_value(tasks.update(id, &patch).await?)?
        }
        TaskSubcommand::Delete { id } => serde_json::to_value(tasks.delete(id).await?)?,
    };
    print_json(&value)
}

fn gate_json(routes: &RoutePolicy, path: &str, refresh_cookie: bool) -> Value {
    match routes.gate(path, refresh_cookie) {
        GateDecision::Continue => json!({ "path": path, "decision": "continue" }),
        GateDecision::Redirect(target) => json!({ "path": path, "decision": "redirect", "location": target }),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
