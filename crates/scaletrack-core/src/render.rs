use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use scaletrack_shared::Task;
use unicode_width::UnicodeWidthStr;

use crate::classify::{DueState, due_state, effective_status, format_due_date, priority_badge};
use crate::group::TaskGroup;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// Colors only when stdout is a terminal and `NO_COLOR` is unset.
    #[must_use]
    pub fn detect() -> Self {
        let color = io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
        Self { color }
    }

    #[must_use]
    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, out, tasks))]
    pub fn write_task_table<W: Write>(
        &self,
        out: W,
        tasks: &[Task],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "ID".to_string(),
            "Due".to_string(),
            "Time".to_string(),
            "Pri".to_string(),
            "Status".to_string(),
            "Title".to_string(),
            "Related".to_string(),
        ];

        let rows = tasks
            .iter()
            .map(|task| {
                vec![
                    self.paint(&task.id.short(), "33"),
                    self.paint_due(task, today),
                    task.due_time.clone().unwrap_or_default(),
                    priority_badge(task.priority).to_string(),
                    effective_status(task, today).as_str().to_string(),
                    task.title.clone(),
                    related_cell(task),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, out, groups))]
    pub fn write_agenda<W: Write>(
        &self,
        mut out: W,
        groups: &[TaskGroup],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        if groups.is_empty() {
            writeln!(out, "No upcoming tasks.")?;
            return Ok(());
        }

        for (idx, group) in groups.iter().enumerate() {
            if idx > 0 {
                writeln!(out)?;
            }
            let header = match group.date {
                Some(date) if date < today => self.paint(&group.label, "31"),
                _ => self.paint(&group.label, "1"),
            };
            writeln!(out, "{header}")?;

            let rows = group
                .tasks
                .iter()
                .map(|task| {
                    vec![
                        format!("  {}", task.id.short()),
                        task.due_time.clone().unwrap_or_else(|| "--:--".to_string()),
                        priority_badge(task.priority).to_string(),
                        task.title.clone(),
                        related_cell(task),
                    ]
                })
                .collect();
            write_rows(&mut out, rows)?;
        }
        Ok(())
    }

    pub fn print_task_table(&self, tasks: &[Task], today: NaiveDate) -> anyhow::Result<()> {
        self.write_task_table(io::stdout().lock(), tasks, today)
    }

    pub fn print_agenda(&self, groups: &[TaskGroup], today: NaiveDate) -> anyhow::Result<()> {
        self.write_agenda(io::stdout().lock(), groups, today)
    }

    fn paint_due(&self, task: &Task, today: NaiveDate) -> String {
        let due = format_due_date(&task.due_date);
        match due_state(task, today) {
            DueState::Overdue => self.paint(&due, "31"),
            DueState::DueToday => self.paint(&due, "33"),
            _ => due,
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn related_cell(task: &Task) -> String {
    task.related
        .map(|related| related.kind.as_str().to_string())
        .unwrap_or_default()
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let widths = column_widths(std::iter::once(&headers).chain(rows.iter()), column_count);

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    write_padded(&mut writer, &rows, &widths)
}

fn write_rows<W: Write>(writer: &mut W, rows: Vec<Vec<String>>) -> anyhow::Result<()> {
    let column_count = rows.first().map(Vec::len).unwrap_or(0);
    let widths = column_widths(rows.iter(), column_count);
    write_padded(writer, &rows, &widths)
}

fn column_widths<'a, I>(rows: I, column_count: usize) -> Vec<usize>
where
    I: Iterator<Item = &'a Vec<String>>,
{
    let mut widths = vec![0usize; column_count];
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }
    widths
}

fn write_padded<W: Write>(
    writer: &mut W,
    rows: &[Vec<String>],
    widths: &[usize],
) -> anyhow::Result<()> {
    for row in rows {
        let mut line = String::new();
        for (cell, width) in row.iter().zip(widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            line.push_str(cell);
            line.push_str(&" ".repeat(padding));
            line.push(' ');
        }
        writeln!(writer, "{}", line.trim_end())?;
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
