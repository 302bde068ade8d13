use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Arc;

use anyhow::{Context as _, anyhow, bail};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tasklane_shared::{LoginArgs, SignupArgs, SortKey, StatusFilter};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cli::Invocation;
use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::error::TaskError;
use crate::gateway::{AuthGateway, HttpGateway, TaskGateway};
use crate::mutation::{Confirm, DeleteOutcome};
use crate::render::{Renderer, short_id};
use crate::session::{Session, SessionRecord};
use crate::view::ViewQuery;

pub struct Context {
    pub cfg: Config,
    pub session: Arc<Session>,
    pub gateway: Arc<HttpGateway>,
    pub renderer: Renderer,
}

impl Context {
    pub fn dashboard(&self, query: ViewQuery) -> anyhow::Result<Dashboard> {
        let gateway: Arc<dyn TaskGateway> = self.gateway.clone();
        Ok(Dashboard::with_query(
            self.session.clone(),
            gateway,
            self.cfg.search_debounce()?,
            query,
        ))
    }
}

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "delete", "edit", "help", "list", "login", "logout", "shell", "show", "signup",
        "stats", "toggle", "version", "whoami",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// True when the error chain carries a rejected credential.
pub fn requires_login(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<TaskError>()
            .is_some_and(TaskError::is_unauthorized)
    })
}

#[instrument(skip(ctx, inv), fields(command = %inv.command))]
pub async fn dispatch(ctx: &mut Context, inv: Invocation) -> anyhow::Result<()> {
    debug!(args = ?inv.command_args, "dispatching command");
    let args = inv.command_args.as_slice();

    match inv.command.as_str() {
        "list" => cmd_list(ctx, args).await,
        "show" => cmd_show(ctx, args).await,
        "add" => cmd_add(ctx, args).await,
        "edit" => cmd_edit(ctx, args).await,
        "toggle" => cmd_toggle(ctx, args).await,
        "delete" => cmd_delete(ctx, args).await,
        "stats" => cmd_stats(ctx, args).await,
        "shell" => crate::shell::run(ctx).await,
        "login" => cmd_login(ctx, args).await,
        "signup" => cmd_signup(ctx, args).await,
        "logout" => cmd_logout(ctx),
        "whoami" => cmd_whoami(ctx).await,
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

/// `key:value` modifiers recognised on the command line; every other token
/// is a plain word.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Mods {
    pub status: Option<StatusFilter>,
    pub sort: Option<SortKey>,
    pub search: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub yes: bool,
    pub words: Vec<String>,
}

/// Modifiers whose value keeps absorbing words until the next recognised
/// `key:` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextField {
    Search,
    Title,
    Description,
    Name,
}

impl Mods {
    pub fn text(&self) -> Option<String> {
        if self.words.is_empty() {
            None
        } else {
            Some(self.words.join(" "))
        }
    }

    pub fn view_query(&self) -> ViewQuery {
        ViewQuery {
            status_filter: self.status.unwrap_or_default(),
            sort_key: self.sort.unwrap_or_default(),
            search_text: self
                .search
                .clone()
                .or_else(|| self.text())
                .unwrap_or_default(),
        }
    }

    /// The single task id a command operates on; further plain words are an
    /// error so they are never dropped.
    pub fn task_token(&self, command: &str) -> anyhow::Result<&str> {
        match self.words.as_slice() {
            [] => Err(anyhow!("{command}: task id is required")),
            [token] => Ok(token),
            [_, extra @ ..] => Err(anyhow!(
                "{command}: unexpected words '{}'; put text after title: or desc:",
                extra.join(" ")
            )),
        }
    }

    fn slot(&mut self, field: TextField) -> &mut Option<String> {
        match field {
            TextField::Search => &mut self.search,
            TextField::Title => &mut self.title,
            TextField::Description => &mut self.description,
            TextField::Name => &mut self.name,
        }
    }
}

pub fn parse_mods(args: &[String]) -> anyhow::Result<Mods> {
    let mut mods = Mods::default();
    let mut literal = false;
    let mut open: Option<TextField> = None;

    for arg in args {
        if arg == "--" {
            literal = true;
            open = None;
            continue;
        }
        if literal {
            mods.words.push(arg.clone());
            continue;
        }
        if arg == "--yes" || arg == "-y" {
            mods.yes = true;
            continue;
        }

        let recognised = arg.split_once(':').and_then(|(key, value)| {
            let key = key.to_ascii_lowercase();
            matches!(
                key.as_str(),
                "status"
                    | "filter"
                    | "sort"
                    | "sort_by"
                    | "search"
                    | "title"
                    | "desc"
                    | "description"
                    | "email"
                    | "name"
            )
            .then_some((key, value))
        });

        let Some((key, value)) = recognised else {
            match open {
                Some(field) => {
                    let slot = mods.slot(field);
                    match slot.as_mut() {
                        Some(text) if !text.is_empty() => {
                            text.push(' ');
                            text.push_str(arg);
                        }
                        _ => *slot = Some(arg.clone()),
                    }
                }
                None => mods.words.push(arg.clone()),
            }
            continue;
        };

        open = None;
        match key.as_str() {
            "status" | "filter" => {
                mods.status = Some(value.parse().map_err(|e: String| anyhow!(e))?);
            }
            "sort" | "sort_by" => {
                mods.sort = Some(value.parse().map_err(|e: String| anyhow!(e))?);
            }
            "email" => mods.email = Some(value.to_string()),
            text_key => {
                let field = match text_key {
                    "search" => TextField::Search,
                    "title" => TextField::Title,
                    "name" => TextField::Name,
                    _ => TextField::Description,
                };
                *mods.slot(field) = Some(value.to_string());
                open = Some(field);
            }
        }
    }

    Ok(mods)
}

/// Accepts a full UUID or a unique prefix of one among the tasks the
/// dashboard currently displays.
pub async fn resolve_task_id(dashboard: &mut Dashboard, token: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(token) {
        return Ok(id);
    }

    let prefix = token.trim().to_ascii_lowercase().replace('-', "");
    if prefix.is_empty() {
        bail!("a task id is required");
    }

    if dashboard.store().is_loading() {
        dashboard.mount().await?;
    }

    let matches: Vec<Uuid> = dashboard
        .tasks()
        .iter()
        .filter(|task| task.id.simple().to_string().starts_with(&prefix))
        .map(|task| task.id)
        .collect();

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(anyhow!("no task id starts with '{token}'")),
        _ => Err(anyhow!(
            "task id prefix '{token}' is ambiguous ({} matches)",
            matches.len()
        )),
    }
}

#[instrument(skip(ctx, args))]
async fn cmd_list(ctx: &mut Context, args: &[String]) -> anyhow::Result<()> {
    let mods = parse_mods(args)?;
    let mut dashboard = ctx.dashboard(mods.view_query())?;
    let outcome = dashboard.mount().await?;
    if let Some(err) = outcome.error() {
        return Err(err.clone()).context("failed to list tasks");
    }
    ctx.renderer
        .print_task_table(dashboard.query(), dashboard.tasks())
}

#[instrument(skip(ctx, args))]
async fn cmd_show(ctx: &mut Context, args: &[String]) -> anyhow::Result<()> {
    let mods = parse_mods(args)?;
    let token = mods.task_token("show")?;
    let mut dashboard = ctx.dashboard(ViewQuery::default())?;
    let id = resolve_task_id(&mut dashboard, token).await?;
    let task = dashboard.get_task(id).await?;
    ctx.renderer.print_task_info(&task)
}

#[instrument(skip(ctx, args))]
async fn cmd_add(ctx: &mut Context, args: &[String]) -> anyhow::Result<()> {
    let mods = parse_mods(args)?;
    let title = mods.title.clone().or_else(|| mods.text()).unwrap_or_default();

    let mut dashboard = ctx.dashboard(ViewQuery::default())?;
    dashboard.open_create();
    dashboard.form_mut().set_title(title);
    if let Some(description) = mods.description.as_deref() {
        dashboard.form_mut().set_description(description);
    }

    let saved = dashboard.submit_form().await.context("add: task was not created")?;
    println!("Created task {}.", short_id(&saved.value));
    report_refresh(&saved.refresh);
    ctx.renderer
        .print_task_table(dashboard.query(), dashboard.tasks())
}

#[instrument(skip(ctx, args))]
async fn cmd_edit(ctx: &mut Context, args: &[String]) -> anyhow::Result<()> {
    let mods = parse_mods(args)?;
    let token = mods.task_token("edit")?;
    if mods.title.is_none() && mods.description.is_none() {
        bail!("edit: nothing to change; use title:<text> and/or desc:<text>");
    }

    let mut dashboard = ctx.dashboard(ViewQuery::default())?;
    let id = resolve_task_id(&mut dashboard, token).await?;
    dashboard.open_edit_remote(id).await?;
    if let Some(title) = mods.title.as_deref() {
        dashboard.form_mut().set_title(title);
    }
    if let Some(description) = mods.description.as_deref() {
        dashboard.form_mut().set_description(description);
    }

    let saved = dashboard.submit_form().await.context("edit: task was not saved")?;
    println!("Updated task {}.", short_id(&saved.value));
    report_refresh(&saved.refresh);
    ctx.renderer
        .print_task_table(dashboard.query(), dashboard.tasks())
}

#[instrument(skip(ctx, args))]
async fn cmd_toggle(ctx: &mut Context, args: &[String]) -> anyhow::Result<()> {
    let mods = parse_mods(args)?;
    let token = mods.task_token("toggle")?;

    let mut dashboard = ctx.dashboard(ViewQuery::default())?;
    let id = resolve_task_id(&mut dashboard, token).await?;
    let toggled = dashboard.toggle_complete(id).await?;
    println!(
        "Task {} is now {}.",
        short_id(&toggled.value),
        if toggled.value.completed { "completed" } else { "pending" }
    );
    report_refresh(&toggled.refresh);
    ctx.renderer
        .print_task_table(dashboard.query(), dashboard.tasks())
}

#[instrument(skip(ctx, args))]
async fn cmd_delete(ctx: &mut Context, args: &[String]) -> anyhow::Result<()> {
    let mods = parse_mods(args)?;
    let token = mods.task_token("delete")?;

    let mut dashboard = ctx.dashboard(ViewQuery::default())?;
    let id = resolve_task_id(&mut dashboard, token).await?;

    let skip_prompt = mods.yes || !ctx.cfg.confirmation()?;
    let outcome = if skip_prompt {
        dashboard.delete(id, &|_: &str| true).await?
    } else {
        dashboard.delete(id, &PromptConfirm).await?
    };

    match outcome {
        DeleteOutcome::Declined => println!("Task not deleted."),
        DeleteOutcome::Deleted(refresh) => {
            println!("Deleted task {}.", &id.simple().to_string()[..8]);
            report_refresh(&refresh);
            ctx.renderer
                .print_task_table(dashboard.query(), dashboard.tasks())?;
        }
    }
    Ok(())
}

#[instrument(skip(ctx, args))]
async fn cmd_stats(ctx: &mut Context, args: &[String]) -> anyhow::Result<()> {
    let mods = parse_mods(args)?;
    let mut dashboard = ctx.dashboard(mods.view_query())?;
    let outcome = dashboard.mount().await?;
    if let Some(err) = outcome.error() {
        return Err(err.clone()).context("failed to load tasks for stats");
    }
    ctx.renderer.print_stats(&dashboard.stats())
}

#[instrument(skip(ctx, args))]
async fn cmd_login(ctx: &mut Context, args: &[String]) -> anyhow::Result<()> {
    let mods = parse_mods(args)?;
    let email = match mods.email.clone().or_else(|| mods.words.first().cloned()) {
        Some(email) => email,
        None => prompt_line("email: ")?,
    };
    let password = read_password()?;

    let token = ctx
        .gateway
        .login(&LoginArgs { email, password })
        .await
        .context("login failed")?;
    let name = token.user.name.clone();
    ctx.session.establish(SessionRecord::from(token))?;
    info!("logged in");
    println!("Logged in as {name}.");
    Ok(())
}

#[instrument(skip(ctx, args))]
async fn cmd_signup(ctx: &mut Context, args: &[String]) -> anyhow::Result<()> {
    let mods = parse_mods(args)?;
    let email = match mods.email.clone().or_else(|| mods.words.first().cloned()) {
        Some(email) => email,
        None => prompt_line("email: ")?,
    };
    let name = match mods.name.clone() {
        Some(name) => name,
        None => prompt_line("name: ")?,
    };
    let password = read_password()?;

    let token = ctx
        .gateway
        .signup(&SignupArgs {
            email,
            password,
            name,
        })
        .await
        .context("signup failed")?;
    let name = token.user.name.clone();
    ctx.session.establish(SessionRecord::from(token))?;
    println!("Welcome, {name}. You are logged in.");
    Ok(())
}

fn cmd_logout(ctx: &mut Context) -> anyhow::Result<()> {
    ctx.session.teardown();
    println!("Logged out.");
    Ok(())
}

#[instrument(skip(ctx))]
async fn cmd_whoami(ctx: &mut Context) -> anyhow::Result<()> {
    let user = match ctx.gateway.me().await {
        Ok(user) => user,
        Err(err) => {
            if err.is_unauthorized() {
                ctx.session.teardown();
            }
            return Err(err).context("failed to load the current user");
        }
    };
    ctx.renderer.print_user(&user)
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "usage: tasklane [-v|-q] [--rc key=value] [--rc-file PATH] [--data DIR] <command> [args]\n\
         \n\
         commands:\n\
         \x20 list   [status:all|pending|completed] [sort:created_at|updated_at|title] [search:TEXT | TEXT]\n\
         \x20 show   ID\n\
         \x20 add    TITLE [desc:TEXT]\n\
         \x20 edit   ID [title:TEXT] [desc:TEXT]\n\
         \x20 toggle ID\n\
         \x20 delete ID [--yes]\n\
         \x20 stats  [status:..] [search:..]\n\
         \x20 shell\n\
         \x20 signup [email:ADDR] [name:NAME]\n\
         \x20 login  [email:ADDR]\n\
         \x20 logout | whoami | version | help\n\
         \n\
         IDs may be abbreviated to any unique prefix."
    );
    Ok(())
}

/// Logs a re-fetch that did not replace the displayed collection.
pub fn report_refresh(refresh: &crate::view::FetchOutcome) {
    if let Some(err) = refresh.error() {
        warn!(error = %err, "refresh after mutation failed; showing previous tasks");
        eprintln!("warning: could not refresh the task list: {err}");
    }
}

struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        match prompt_line(&format!("{prompt} [y/N] ")) {
            Ok(answer) => is_yes(&answer),
            Err(err) => {
                warn!(error = %err, "failed reading confirmation; treating as no");
                false
            }
        }
    }
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn prompt_line(prompt: &str) -> anyhow::Result<String> {
    let mut out = io::stdout().lock();
    write!(out, "{prompt}")?;
    out.flush()?;
    drop(out);

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed reading from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn read_password() -> anyhow::Result<String> {
    if let Ok(password) = std::env::var("TASKLANE_PASSWORD") {
        debug!("using password from TASKLANE_PASSWORD");
        return Ok(password);
    }
    let password = if io::stdin().is_terminal() {
        read_hidden("password: ")?
    } else {
        prompt_line("password: ")?
    };
    if password.is_empty() {
        bail!("password cannot be empty");
    }
    Ok(password)
}

/// Reads one line from the terminal without echoing it.
fn read_hidden(prompt: &str) -> anyhow::Result<String> {
    let mut out = io::stdout();
    write!(out, "{prompt}")?;
    out.flush()?;

    let mut secret = String::new();
    {
        terminal::enable_raw_mode().context("failed to turn off terminal echo")?;
        let _raw = RawModeGuard;
        loop {
            let Event::Key(key) = event::read().context("failed reading from terminal")? else {
                continue;
            };
            match secret_key(&mut secret, key) {
                SecretKey::Pending => {}
                SecretKey::Done => break,
                SecretKey::Cancelled => bail!("password entry cancelled"),
            }
        }
    }

    writeln!(out)?;
    Ok(secret)
}

#[derive(Debug, PartialEq, Eq)]
enum SecretKey {
    Pending,
    Done,
    Cancelled,
}

/// Applies one key event to a hidden input buffer.
fn secret_key(secret: &mut String, key: KeyEvent) -> SecretKey {
    if key.kind != KeyEventKind::Press {
        return SecretKey::Pending;
    }
    match key.code {
        KeyCode::Enter => SecretKey::Done,
        KeyCode::Esc => SecretKey::Cancelled,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            SecretKey::Cancelled
        }
        KeyCode::Backspace => {
            secret.pop();
            SecretKey::Pending
        }
        KeyCode::Char(ch) => {
            secret.push(ch);
            SecretKey::Pending
        }
        _ => SecretKey::Pending,
    }
}

struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = terminal::disable_raw_mode() {
            warn!(error = %err, "failed restoring terminal mode");
        }
    }
}
