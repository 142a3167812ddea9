use std::io::Stdout;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use sysinfo::Signal;

use crate::actions::{self, Helper};
use crate::alerts::{CPU_HOT, RSS_HOT_MB, SWAP_HOT_MB};
use crate::helpers::{gib, make_bar};
use crate::record::{GroupRecord, ProcRecord};
use crate::sampler::{Sampler, SystemStats};
use crate::session::{Session, View};

const MAX_APP_NAME: usize = 24;
const BAR_W: usize = 10;

type Term = Terminal<CrosstermBackend<Stdout>>;

/// Runs the interactive loop until the user quits, then hands the
/// session back so the caller can persist the adjusted settings.
pub fn run(mut session: Session, mut sampler: Sampler) -> Result<Session> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let back = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(back)?;

    let res = event_loop(&mut terminal, &mut session, &mut sampler);

    // restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res.map(|()| session)
}

fn event_loop(terminal: &mut Term, session: &mut Session, sampler: &mut Sampler) -> Result<()> {
    let mut last_sample: Option<Instant> = None;
    //Some while the user is typing a filter pattern
    let mut filter_entry: Option<String> = None;

    loop {
        let now = Instant::now();
        let due = last_sample
            .map_or(true, |t| now.duration_since(t).as_secs_f64() >= session.refresh_secs);
        if due {
            let rows = sampler.sample(session.filter.as_ref());
            session.apply_sample(rows);
            last_sample = Some(now);
        }
        let stats = sampler.stats();
        redraw(terminal, session, &stats, filter_entry.as_deref())?;

        //the bounded input wait doubles as the sampling cadence timer
        let timeout = Duration::from_secs_f64(session.refresh_secs);
        if !event::poll(timeout)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if let Some(entry) = filter_entry.as_mut() {
            match key.code {
                KeyCode::Enter => {
                    let text = entry.clone();
                    filter_entry = None;
                    session.set_filter(&text);
                    last_sample = None; //resample against the new filter
                }
                KeyCode::Esc => filter_entry = None,
                KeyCode::Backspace => {
                    entry.pop();
                }
                KeyCode::Char(c) => entry.push(c),
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Char('q') => return Ok(()),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(()),
            KeyCode::Esc => {
                if session.view == View::Detail {
                    session.leave_detail();
                } else {
                    return Ok(());
                }
            }
            KeyCode::Down | KeyCode::Char('j') => session.move_selection(1),
            KeyCode::Up => session.move_selection(-1),
            KeyCode::PageDown => session.move_selection(10),
            KeyCode::PageUp => session.move_selection(-10),
            KeyCode::Home => session.select_home(),
            KeyCode::End => session.select_end(),
            KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => session.enter_detail(),
            KeyCode::Char('h') | KeyCode::Left => session.leave_detail(),
            KeyCode::Char('t') => session.toggle_tree(),
            KeyCode::Char('s') => session.cycle_sort(),
            KeyCode::Char('+') => session.adjust_refresh(0.1),
            KeyCode::Char('-') => session.adjust_refresh(-0.1),
            KeyCode::Char('r') => {
                session.clear_filter();
                last_sample = None;
            }
            KeyCode::Char('f') => filter_entry = Some(String::new()),
            KeyCode::Char('k') => signal_selected(session, sampler, Signal::Term),
            KeyCode::Char('K') => signal_selected(session, sampler, Signal::Kill),
            KeyCode::Char('g') => {
                if session.view == View::Groups {
                    signal_selected(session, sampler, Signal::Term);
                }
            }
            KeyCode::Char('w') => remediate(terminal, session, &stats, Helper::SwapClean)?,
            KeyCode::Char('d') => remediate(terminal, session, &stats, Helper::DropCaches)?,
            _ => {}
        }
    }
}

fn sig_name(sig: Signal) -> &'static str {
    match sig {
        Signal::Kill => "KILL",
        _ => "TERM",
    }
}

//in detail view the target is the highlighted process (tree or flat);
//in groups view the whole selected application
fn signal_selected(session: &mut Session, sampler: &mut Sampler, sig: Signal) {
    match session.view {
        View::Detail => {
            let Some((pid, name)) = session.selected_process().map(|r| (r.pid, r.name.clone()))
            else {
                return;
            };
            let msg = if sampler.signal_pid(pid, sig) {
                format!("Sent {} to {pid} ({name})", sig_name(sig))
            } else {
                format!("Failed to signal {pid} ({name})")
            };
            session.status(msg);
        }
        View::Groups => {
            let Some(app) = session.selected_group().map(|g| g.app.clone()) else {
                return;
            };
            let (sent, denied) = sampler.signal_app(&app, sig);
            let mut msg = format!("Sent {} to '{app}' ({sent} procs)", sig_name(sig));
            if denied > 0 {
                msg.push_str(&format!(" [{denied} denied]"));
            }
            session.status(msg);
        }
    }
}

//the helper call blocks for seconds (sudo + swapoff); redraw with the
//"started" status first so the user sees feedback during the stall
fn remediate(
    terminal: &mut Term,
    session: &mut Session,
    stats: &SystemStats,
    helper: Helper,
) -> Result<()> {
    session.status(format!("{} started ...", helper.name()));
    redraw(terminal, session, stats, None)?;
    let msg = actions::run_helper(helper);
    session.status(msg);
    Ok(())
}

fn redraw(
    terminal: &mut Term,
    session: &mut Session,
    stats: &SystemStats,
    filter_entry: Option<&str>,
) -> Result<()> {
    let now = Instant::now();
    let alerts = session
        .alerts
        .collect(now, stats, &session.rows, &session.groups)
        .to_vec();
    terminal.draw(|f| draw(f, session, stats, &alerts, filter_entry, now))?;
    Ok(())
}

fn draw(
    f: &mut Frame,
    session: &Session,
    stats: &SystemStats,
    alerts: &[String],
    filter_entry: Option<&str>,
    now: Instant,
) {
    let area = f.area();
    if area.height < 6 {
        return;
    }

    draw_badges(f, session, stats);

    if let Some(entry) = filter_entry {
        let p = Paragraph::new(format!("Filter (regex): {entry}_"))
            .style(Style::default().bg(Color::Green).fg(Color::Black));
        f.render_widget(p, Rect::new(0, 1, area.width, 1));
    }

    //bottom-up: help line, status line, then the alert tail
    let help_y = area.height - 1;
    let status_y = area.height - 2;
    let max_alert_rows = (area.height / 3) as usize;
    let alert_rows = alerts.len().min(max_alert_rows);
    let alerts_y = status_y.saturating_sub(alert_rows as u16);

    let table_area = Rect::new(0, 2, area.width, alerts_y.saturating_sub(2));
    match session.view {
        View::Groups => draw_groups(f, session, table_area),
        View::Detail => draw_detail(f, session, table_area),
    }

    for (i, alert) in alerts[alerts.len() - alert_rows..].iter().enumerate() {
        let mut style = Style::default().fg(Color::Yellow);
        if alert.to_lowercase().contains("critical") {
            style = style.add_modifier(Modifier::BOLD);
        }
        let p = Paragraph::new(alert.as_str()).style(style);
        f.render_widget(p, Rect::new(0, alerts_y + i as u16, area.width, 1));
    }

    if let Some(msg) = session.status_line(now) {
        let p = Paragraph::new(msg).style(Style::default().fg(Color::Cyan));
        f.render_widget(p, Rect::new(0, status_y, area.width, 1));
    }

    let help = "↑/↓ PgUp/PgDn Home/End  Enter/l expand  h back  s sort  f filter  r reset  \
                +/- refresh  t tree  k/K kill  g kill-group  w swap-clean  d drop-caches  q quit";
    let p = Paragraph::new(help).style(Style::default().fg(Color::Green));
    f.render_widget(p, Rect::new(0, help_y, area.width, 1));
}

fn draw_badges(f: &mut Frame, session: &Session, stats: &SystemStats) {
    let label = Style::default().bg(Color::Blue).fg(Color::White).add_modifier(Modifier::BOLD);
    let neutral = Style::default().bg(Color::White).fg(Color::Black);
    let ok = Style::default().bg(Color::Green).fg(Color::Black).add_modifier(Modifier::BOLD);
    let warn = Style::default().bg(Color::Yellow).fg(Color::Black).add_modifier(Modifier::BOLD);
    let crit = Style::default().bg(Color::Red).fg(Color::White).add_modifier(Modifier::BOLD);
    let tier = |pct: f64, hi: f64, mid: f64| {
        if pct > hi {
            crit
        } else if pct > mid {
            warn
        } else {
            ok
        }
    };

    let mem_avail = gib(stats.mem_available);
    let mem_free = gib(stats.mem_free);
    let load_per_core = stats.load_one / stats.cpu_count as f64;

    let mut spans: Vec<Span> = vec![Span::styled(
        " apptop ",
        Style::default().bg(Color::Magenta).fg(Color::White).add_modifier(Modifier::BOLD),
    )];
    let mut badge = |label_txt: &str, value: String, vstyle: Style| {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(format!(" {label_txt} "), label));
        spans.push(Span::styled(format!(" {value} "), vstyle));
    };

    badge(
        "mem",
        format!("{:.1}/{:.1}G", gib(stats.mem_used), gib(stats.mem_total)),
        tier(stats.mem_pct, 90.0, 70.0),
    );
    badge("avl", format!("{mem_avail:.1}G"), if mem_avail > 2.0 { ok } else { warn });
    badge("free", format!("{mem_free:.1}G"), if mem_free > 1.0 { ok } else { warn });
    badge("buf", format!("{:.1}G", gib(stats.mem_buffers)), neutral);
    badge("cache", format!("{:.1}G", gib(stats.mem_cached)), neutral);
    badge(
        "swap",
        format!("{:.1}/{:.1}G", gib(stats.swap_used), gib(stats.swap_total)),
        tier(stats.swap_pct, 80.0, 50.0),
    );
    badge(
        "load",
        format!("{:.2} {:.2} {:.2}", stats.load_one, stats.load_five, stats.load_fifteen),
        tier(load_per_core * 100.0, 200.0, 100.0),
    );
    badge("sort", session.sort_key.label().to_string(), neutral);
    badge("ref", format!("{:.1}s", session.refresh_secs), neutral);
    badge(
        "filt",
        if session.filter_text.is_empty() {
            "-".to_string()
        } else {
            session.filter_text.clone()
        },
        neutral,
    );

    let p = Paragraph::new(Line::from(spans));
    f.render_widget(p, Rect::new(0, 0, f.area().width, 1));
}

fn group_style(g: &GroupRecord) -> Style {
    if g.cpu >= CPU_HOT * 2.0 || g.rss_mb >= RSS_HOT_MB * 2.0 || g.swap_mb >= SWAP_HOT_MB * 2.0 {
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
    } else if g.cpu >= CPU_HOT || g.rss_mb >= RSS_HOT_MB || g.swap_mb >= SWAP_HOT_MB {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn proc_style(r: &ProcRecord) -> Style {
    if r.cpu >= CPU_HOT * 2.0 || r.rss_mb >= RSS_HOT_MB * 2.0 || r.swap_mb >= SWAP_HOT_MB * 2.0 {
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
    } else if r.cpu >= CPU_HOT || r.rss_mb >= RSS_HOT_MB || r.swap_mb >= SWAP_HOT_MB {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn selection_style() -> Style {
    Style::default().bg(Color::Blue).fg(Color::White).add_modifier(Modifier::BOLD)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn draw_groups(f: &mut Frame, session: &Session, area: Rect) {
    let header = Row::new(vec![
        Cell::from("APP"),
        Cell::from(format!("{:>5}", "PROCS")),
        Cell::from(format!("{:>10}", "RSS(MiB)")),
        Cell::from(format!("{:>10}", "SWAP(MiB)")),
        Cell::from(format!("{:>7}", "%MEM")),
        Cell::from(format!("{:>BAR_W$}", "MEM")),
        Cell::from(format!("{:>7}", "%CPU")),
        Cell::from(format!("{:>BAR_W$}", "CPU")),
        Cell::from(format!("{:>7}", "IO_R")),
        Cell::from(format!("{:>7}", "IO_W")),
    ])
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = session
        .groups
        .iter()
        .map(|g| {
            Row::new(vec![
                Cell::from(truncate(&g.app, MAX_APP_NAME)),
                Cell::from(format!("{:>5}", g.procs)),
                Cell::from(format!("{:>10.1}", g.rss_mb)),
                Cell::from(format!("{:>10.1}", g.swap_mb)),
                Cell::from(format!("{:>7.1}", g.mem_pct)),
                Cell::from(make_bar(g.mem_pct, BAR_W)),
                Cell::from(format!("{:>7.1}", g.cpu)),
                Cell::from(make_bar(g.cpu.min(100.0), BAR_W)),
                Cell::from(format!("{:>7.1}", g.io_read_mb)),
                Cell::from(format!("{:>7.1}", g.io_write_mb)),
            ])
            .style(group_style(g))
        })
        .collect();

    let widths = [
        Constraint::Length(MAX_APP_NAME as u16),
        Constraint::Length(5),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(7),
        Constraint::Length(BAR_W as u16),
        Constraint::Length(7),
        Constraint::Length(BAR_W as u16),
        Constraint::Length(7),
        Constraint::Length(7),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .row_highlight_style(selection_style());
    let mut state = TableState::default();
    state.select(Some(session.sel));
    f.render_stateful_widget(table, area, &mut state);
}

fn draw_detail(f: &mut Frame, session: &Session, area: Rect) {
    if area.height < 2 {
        return;
    }
    let app = session.detail_app.as_deref().unwrap_or("?");
    let mode = if session.tree_mode { " [TREE]" } else { "" };
    let title = Paragraph::new(format!("App: {app}{mode}"))
        .style(Style::default().add_modifier(Modifier::BOLD));
    f.render_widget(title, Rect::new(area.x, area.y, area.width, 1));

    let table_area = Rect::new(area.x, area.y + 1, area.width, area.height - 1);
    if session.tree_mode {
        draw_detail_tree(f, session, table_area);
    } else {
        draw_detail_flat(f, session, table_area);
    }
}

fn draw_detail_flat(f: &mut Frame, session: &Session, area: Rect) {
    let header = Row::new(vec![
        Cell::from(format!("{:>7}", "PID")),
        Cell::from(format!("{:>7}", "PPID")),
        Cell::from(format!("{:>9}", "RSS(MiB)")),
        Cell::from(format!("{:>6}", "%CPU")),
        Cell::from(format!("{:>6}", "%MEM")),
        Cell::from(format!("{:>9}", "SWAP(MiB)")),
        Cell::from(format!("{:>7}", "IO_R")),
        Cell::from(format!("{:>7}", "IO_W")),
        Cell::from("CMD"),
    ])
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = session
        .detail_list
        .iter()
        .map(|r| {
            let cmd = if r.cmdline.is_empty() { &r.name } else { &r.cmdline };
            Row::new(vec![
                Cell::from(format!("{:>7}", r.pid)),
                Cell::from(format!("{:>7}", r.ppid)),
                Cell::from(format!("{:>9.1}", r.rss_mb)),
                Cell::from(format!("{:>6.1}", r.cpu)),
                Cell::from(format!("{:>6.1}", r.mem_pct)),
                Cell::from(format!("{:>9.1}", r.swap_mb)),
                Cell::from(format!("{:>7.1}", r.io_read_mb)),
                Cell::from(format!("{:>7.1}", r.io_write_mb)),
                Cell::from(cmd.clone()),
            ])
            .style(proc_style(r))
        })
        .collect();

    let widths = [
        Constraint::Length(7),
        Constraint::Length(7),
        Constraint::Length(9),
        Constraint::Length(6),
        Constraint::Length(6),
        Constraint::Length(9),
        Constraint::Length(7),
        Constraint::Length(7),
        Constraint::Min(10),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .row_highlight_style(selection_style());
    let mut state = TableState::default();
    state.select(Some(session.sel));
    f.render_stateful_widget(table, area, &mut state);
}

fn draw_detail_tree(f: &mut Frame, session: &Session, area: Rect) {
    let header = Row::new(vec![
        Cell::from(format!("{:>7}", "PID")),
        Cell::from(format!("{:>9}", "RSS(MiB)")),
        Cell::from(format!("{:>6}", "%CPU")),
        Cell::from(format!("{:>6}", "%MEM")),
        Cell::from(format!("{:>6}", "SWAP")),
        Cell::from("TREE"),
    ])
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = session
        .detail_tree
        .iter()
        .map(|n| {
            let r = &n.record;
            let cmd = if r.cmdline.is_empty() { &r.name } else { &r.cmdline };
            let tree = if n.depth == 0 {
                cmd.clone()
            } else {
                format!("{}{cmd}", n.prefix)
            };
            Row::new(vec![
                Cell::from(format!("{:>7}", r.pid)),
                Cell::from(format!("{:>9.1}", r.rss_mb)),
                Cell::from(format!("{:>6.1}", r.cpu)),
                Cell::from(format!("{:>6.1}", r.mem_pct)),
                Cell::from(format!("{:>6.1}", r.swap_mb)),
                Cell::from(tree),
            ])
            .style(proc_style(r))
        })
        .collect();

    let widths = [
        Constraint::Length(7),
        Constraint::Length(9),
        Constraint::Length(6),
        Constraint::Length(6),
        Constraint::Length(6),
        Constraint::Min(10),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .row_highlight_style(selection_style());
    let mut state = TableState::default();
    state.select(Some(session.sel));
    f.render_stateful_widget(table, area, &mut state);
}
