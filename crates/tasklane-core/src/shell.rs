use std::time::Instant;

use anyhow::{anyhow, bail};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info, instrument};

use crate::commands::{Context, is_yes, parse_mods, report_refresh, requires_login, resolve_task_id};
use crate::dashboard::Dashboard;
use crate::form::FormMode;
use crate::mutation::DeleteOutcome;
use crate::render::short_id;
use crate::view::{FetchOutcome, ViewQuery};

type StdinLines = Lines<BufReader<Stdin>>;

enum Flow {
    Continue,
    Quit,
}

const SHELL_HELP: &str = "\
any text       search titles and descriptions (empty line clears)
:filter S      all | pending | completed
:sort K        created_at | updated_at | title
:add TITLE [desc:TEXT]
:edit ID [title:TEXT] [desc:TEXT]
:title TEXT    change the open form's title
:desc TEXT     change the open form's description
:save          submit the open form again
:cancel        discard the open form
:toggle ID
:delete ID
:stats
:help
:quit";

/// Interactive task view. Free text lines are search edits and go through
/// the debouncer; `:` lines are commands.
#[instrument(skip(ctx))]
pub async fn run(ctx: &mut Context) -> anyhow::Result<()> {
    let mut dashboard = ctx.dashboard(ViewQuery::default())?;
    let mounted = dashboard.mount().await?;
    show(ctx, &dashboard, &mounted)?;
    println!("type :help for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let deadline = dashboard.search_deadline();
        let wake = tokio::time::Instant::from_std(deadline.unwrap_or_else(Instant::now));

        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("stdin closed");
                    break;
                };
                match handle_line(ctx, &mut dashboard, &mut lines, &line).await {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => break,
                    Err(err) if requires_login(&err) => {
                        dashboard.unmount();
                        return Err(err);
                    }
                    Err(err) => eprintln!("error: {err:#}"),
                }
            }
            _ = tokio::time::sleep_until(wake), if deadline.is_some() => {
                if let Some(outcome) = dashboard.tick(Instant::now()).await? {
                    show(ctx, &dashboard, &outcome)?;
                }
            }
        }
    }

    dashboard.unmount();
    info!("shell closed");
    Ok(())
}

async fn handle_line(
    ctx: &mut Context,
    dashboard: &mut Dashboard,
    lines: &mut StdinLines,
    line: &str,
) -> anyhow::Result<Flow> {
    let Some(command) = line.strip_prefix(':') else {
        dashboard.type_search(line.trim(), Instant::now());
        return Ok(Flow::Continue);
    };

    let tokens: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    let Some((name, args)) = tokens.split_first() else {
        return Ok(Flow::Continue);
    };

    match name.as_str() {
        "q" | "quit" | "exit" => return Ok(Flow::Quit),
        "h" | "help" => println!("{SHELL_HELP}"),
        "f" | "filter" => {
            let value = args.first().ok_or_else(|| anyhow!(":filter needs a value"))?;
            let filter = value.parse().map_err(|e: String| anyhow!(e))?;
            if let Some(outcome) = dashboard.set_status_filter(filter).await? {
                show(ctx, dashboard, &outcome)?;
            }
        }
        "s" | "sort" => {
            let value = args.first().ok_or_else(|| anyhow!(":sort needs a value"))?;
            let key = value.parse().map_err(|e: String| anyhow!(e))?;
            if let Some(outcome) = dashboard.set_sort_key(key).await? {
                show(ctx, dashboard, &outcome)?;
            }
        }
        "a" | "add" => {
            let mods = parse_mods(args)?;
            dashboard.open_create();
            dashboard
                .form_mut()
                .set_title(mods.title.clone().or_else(|| mods.text()).unwrap_or_default());
            if let Some(description) = mods.description.as_deref() {
                dashboard.form_mut().set_description(description);
            }
            save_form(ctx, dashboard).await?;
        }
        "e" | "edit" => {
            let mods = parse_mods(args)?;
            let token = mods.task_token(":edit")?;
            let id = resolve_task_id(dashboard, token).await?;
            dashboard.open_edit_remote(id).await?;
            if let Some(title) = mods.title.as_deref() {
                dashboard.form_mut().set_title(title);
            }
            if let Some(description) = mods.description.as_deref() {
                dashboard.form_mut().set_description(description);
            }
            save_form(ctx, dashboard).await?;
        }
        "title" => {
            if !dashboard.form_mut().set_title(args.join(" ")) {
                bail!("no task form is open; start one with :add or :edit");
            }
        }
        "desc" => {
            if !dashboard.form_mut().set_description(args.join(" ")) {
                bail!("no task form is open; start one with :add or :edit");
            }
        }
        "save" => save_form(ctx, dashboard).await?,
        "cancel" => {
            dashboard.cancel_form();
            println!("Form discarded.");
        }
        "t" | "toggle" => {
            let token = args.first().ok_or_else(|| anyhow!(":toggle needs a task id"))?;
            let id = resolve_task_id(dashboard, token).await?;
            let toggled = dashboard.toggle_complete(id).await?;
            show(ctx, dashboard, &toggled.refresh)?;
        }
        "d" | "delete" => {
            let token = args.first().ok_or_else(|| anyhow!(":delete needs a task id"))?;
            let id = resolve_task_id(dashboard, token).await?;

            let answer = if ctx.cfg.confirmation()? {
                let title = dashboard
                    .store()
                    .find(id)
                    .map(|task| task.title.clone())
                    .unwrap_or_else(|| "this task".to_string());
                println!("Delete '{title}'? [y/N]");
                let reply = lines.next_line().await?.unwrap_or_default();
                is_yes(&reply)
            } else {
                true
            };

            match dashboard.delete(id, &move |_: &str| answer).await? {
                DeleteOutcome::Declined => println!("Task not deleted."),
                DeleteOutcome::Deleted(refresh) => show(ctx, dashboard, &refresh)?,
            }
        }
        "stats" => ctx.renderer.print_stats(&dashboard.stats())?,
        other => eprintln!("unknown shell command :{other} (try :help)"),
    }

    Ok(Flow::Continue)
}

/// Submits the open form. A rejected submit leaves the buffer exactly as
/// typed so it can be corrected with `:title`/`:desc` and retried with
/// `:save`.
async fn save_form(ctx: &mut Context, dashboard: &mut Dashboard) -> anyhow::Result<()> {
    let creating = dashboard
        .form()
        .buffer()
        .is_some_and(|buffer| buffer.mode == FormMode::Create);

    match dashboard.submit_form().await {
        Ok(saved) => {
            let verb = if creating { "Created" } else { "Updated" };
            println!("{verb} task {}.", short_id(&saved.value));
            show(ctx, dashboard, &saved.refresh)
        }
        Err(err) if err.is_unauthorized() => Err(err.into()),
        Err(err) => {
            if dashboard.form().is_open() {
                eprintln!("form kept: :title/:desc to change it, :save to retry, :cancel to discard");
            }
            Err(err.into())
        }
    }
}

fn show(ctx: &mut Context, dashboard: &Dashboard, outcome: &FetchOutcome) -> anyhow::Result<()> {
    match outcome {
        FetchOutcome::Applied { .. } => {
            ctx.renderer
                .print_task_table(dashboard.query(), dashboard.tasks())
        }
        FetchOutcome::Stale { .. } => Ok(()),
        FetchOutcome::Failed { .. } => {
            report_refresh(outcome);
            Ok(())
        }
    }
}
