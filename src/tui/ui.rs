//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem, Wrap},
    style::{Color, Style, Modifier},
};
use crate::cpu::{MicroStep, RegisterId};
use super::app::DebuggerApp;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .split(frame.area());

    // Left side: code, registers and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(9),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: lines, memory, output and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),
            Constraint::Min(8),
            Constraint::Length(5),
            Constraint::Length(5),
        ])
        .split(chunks[1]);

    draw_lines(frame, right_chunks[0], app);
    draw_memory(frame, right_chunks[1], app);
    draw_output(frame, right_chunks[2], app);
    draw_help(frame, right_chunks[3]);
}

/// Draw disassembly view around PC.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let word = app.machine.memory().read(*addr);
            let text = format!("{}{:04X}: {:04X}  {}", prefix, addr, word, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

/// Draw registers, ALU status and the control unit.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let cpu = app.machine.cpu();
    let regs = cpu.registers();
    let value = |id: RegisterId| {
        Span::styled(format!("{:04X}", regs.value(id)), Style::default().fg(Color::White))
    };

    let mut content: Vec<Line> = regs
        .general()
        .chunks(2)
        .enumerate()
        .map(|(row, pair)| {
            Line::from(vec![
                Span::raw(format!("R{}: ", row * 2)),
                Span::styled(format!("{:04X}", pair[0]), Style::default().fg(Color::White)),
                Span::raw(format!("   R{}: ", row * 2 + 1)),
                Span::styled(format!("{:04X}", pair[1]), Style::default().fg(Color::White)),
            ])
        })
        .collect();

    content.push(Line::from(vec![
        Span::raw("IR: "),
        value(RegisterId::Ir),
        Span::raw("   PC: "),
        Span::styled(format!("{:04X}", regs.pc()), Style::default().fg(Color::Yellow)),
    ]));
    content.push(Line::from(vec![
        Span::raw("ALU: "),
        Span::styled(cpu.status().to_string(), Style::default().fg(Color::Cyan)),
        Span::raw("   Last: "),
        Span::raw(cpu.last_instruction().map(|i| i.to_string()).unwrap_or_else(|| "-".into())),
    ]));
    content.push(Line::from(vec![
        Span::raw("Ticks: "),
        Span::styled(app.machine.ticks().to_string(), Style::default().fg(Color::Cyan)),
        Span::raw("   Instr: "),
        Span::styled(cpu.retired().to_string(), Style::default().fg(Color::Cyan)),
    ]));
    content.push(Line::from(vec![
        Span::raw("Next: "),
        Span::styled(format!("{:?}", cpu.state()),
            if cpu.state() == MicroStep::Halted {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::Green)
            }),
    ]));

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

/// Draw signal line values.
fn draw_lines(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let spans: Vec<Span> = app
        .machine
        .simulation()
        .lines()
        .map(|(_, wire)| {
            let style = if wire.value() == 0 {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default().fg(Color::White)
            };
            Span::styled(format!("{}={:X}  ", wire.name(), wire.value()), style)
        })
        .collect();

    let paragraph = Paragraph::new(Line::from(spans))
        .wrap(Wrap { trim: true })
        .block(Block::default()
            .title(" Lines ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)));

    frame.render_widget(paragraph, area);
}

/// Draw memory view.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let pc = app.machine.cpu().registers().pc();
    let memory = app.machine.memory();

    let items: Vec<ListItem> = memory
        .dump(app.mem_scroll, visible_rows)
        .into_iter()
        .map(|(addr, value)| {
            let text = format!("{:04X}: {:04X}  {:>5}", addr, value, value);

            let style = if addr == pc {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if value != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

/// Draw program output.
fn draw_output(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let output = Paragraph::new(app.output.text())
        .wrap(Wrap { trim: false })
        .block(Block::default()
            .title(" Output ")
            .borders(Borders::ALL));

    frame.render_widget(output, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Status ")
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("t: Tick  s: Step  r: Run  p: Pause  b: Breakpoint"),
        Line::from("x: Reset  g: Mem@PC  i: Input  ↑↓/PgUp/PgDn  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}
