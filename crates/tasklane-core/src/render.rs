use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use tasklane_shared::{TaskDto, UserDto};
use unicode_width::UnicodeWidthStr;

use crate::config::{Config, parse_switch};
use crate::stats::TaskStats;
use crate::view::ViewQuery;

pub const ID_PREFIX_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = parse_switch(&color_cfg)
            .ok_or_else(|| anyhow!("invalid color setting: {color_cfg}"))?;

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_task_table(&mut self, query: &ViewQuery, tasks: &[TaskDto]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_task_table(&mut out, query, tasks)
    }

    pub fn write_task_table<W: Write>(
        &self,
        mut out: W,
        query: &ViewQuery,
        tasks: &[TaskDto],
    ) -> anyhow::Result<()> {
        let search = if query.search_text.is_empty() {
            String::new()
        } else {
            format!(", search \"{}\"", query.search_text)
        };
        writeln!(
            out,
            "{} task(s) [{}, by {}{}]",
            tasks.len(),
            query.status_filter,
            query.sort_key,
            search
        )?;

        if tasks.is_empty() {
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Done".to_string(),
            "Title".to_string(),
            "Description".to_string(),
            "Updated".to_string(),
        ];

        let rows = tasks
            .iter()
            .map(|task| {
                let id = self.paint(&short_id(task), "33");
                let done = if task.completed {
                    self.paint("x", "32")
                } else {
                    String::new()
                };
                let description = task
                    .description
                    .as_deref()
                    .map(first_line)
                    .unwrap_or_default();
                vec![
                    id,
                    done,
                    task.title.clone(),
                    description,
                    display_timestamp(&task.updated_at),
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&mut self, task: &TaskDto) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(
            out,
            "status    {}",
            if task.completed { "completed" } else { "pending" }
        )?;
        writeln!(
            out,
            "desc      {}",
            task.description.clone().unwrap_or_default()
        )?;
        writeln!(out, "created   {}", display_timestamp(&task.created_at))?;
        writeln!(out, "updated   {}", display_timestamp(&task.updated_at))?;

        Ok(())
    }

    pub fn print_stats(&mut self, stats: &TaskStats) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "total      {}", stats.total)?;
        writeln!(out, "completed  {}", stats.completed)?;
        writeln!(out, "pending    {}", stats.pending)?;
        writeln!(out, "done       {}%", stats.completion_percent)?;
        Ok(())
    }

    pub fn print_user(&mut self, user: &UserDto) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "{} <{}>", user.name, user.email)?;
        writeln!(out, "id        {}", user.id)?;
        if !user.created_at.is_empty() {
            writeln!(out, "joined    {}", display_timestamp(&user.created_at))?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn short_id(task: &TaskDto) -> String {
    task.id.simple().to_string()[..ID_PREFIX_LEN].to_string()
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().to_string()
}

/// The service sends naive UTC timestamps; anything unparseable is shown
/// verbatim.
fn display_timestamp(raw: &str) -> String {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string();
    }
    raw.to_string()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use tasklane_shared::{SortKey, StatusFilter};
    use uuid::Uuid;

    use super::*;

    fn renderer() -> Renderer {
        Renderer { color: false }
    }

    #[test]
    fn table_pads_wide_titles_by_display_width() {
        let task = TaskDto {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            title: "牛乳を買う".to_string(),
            description: Some("two bottles\nsecond line".to_string()),
            completed: true,
            created_at: "2025-01-02T03:04:05".to_string(),
            updated_at: "not a timestamp".to_string(),
        };
        let query = ViewQuery {
            status_filter: StatusFilter::Completed,
            sort_key: SortKey::Title,
            search_text: "milk".to_string(),
        };

        let mut buf = Vec::new();
        renderer()
            .write_task_table(&mut buf, &query, &[task.clone()])
            .expect("render");
        let text = String::from_utf8(buf).expect("utf8");

        assert!(text.starts_with("1 task(s) [completed, by title, search \"milk\"]"));
        assert!(text.contains(&short_id(&task)));
        assert!(text.contains("two bottles"));
        assert!(!text.contains("second line"));
        assert!(text.contains("not a timestamp"));
    }

    #[test]
    fn empty_collection_renders_header_only() {
        let mut buf = Vec::new();
        renderer()
            .write_task_table(&mut buf, &ViewQuery::default(), &[])
            .expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(text, "0 task(s) [all, by created_at]\n");
    }

    #[test]
    fn strips_escape_sequences() {
        assert_eq!(strip_ansi("\x1b[33mabc\x1b[0m"), "abc");
    }
}
