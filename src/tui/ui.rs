//! UI rendering for the stepper.

use ratatui::{
    prelude::*,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

use super::app::DebuggerApp;
use crate::cpu::{FReg, Flag, IReg, Reg};
use crate::value::Value;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(frame.area());

    // Left side: code, registers, status
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

    // Right side: recorded memory events and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(10), Constraint::Length(6)])
        .split(chunks[1]);

    draw_trace(frame, right_chunks[0], app);
    draw_help(frame, right_chunks[1]);
}

/// Draw the disassembly view around the program counter.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));
    let pc_block = app.pc().map(|(b, _)| b);

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(ofs, instr, is_current)| {
            let at_bp = pc_block.is_some_and(|b| app.breakpoints.contains(&(b, *ofs)));
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if at_bp { "●" } else { " " };
            let text = format!("{}{}{:4}  {}", bp, prefix, ofs, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if at_bp {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(list, area);
}

fn reg_span(name: &str, v: Value) -> Vec<Span<'static>> {
    let style = if v.is_undef() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::White)
    };
    vec![
        Span::raw(format!("{:>4}: ", name)),
        Span::styled(format!("{:<14}", v.to_string()), style),
    ]
}

/// Draw the register file and condition bits.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let rs = &app.machine.state.regs;

    let int_row = |regs: [IReg; 4]| {
        let mut spans = Vec::new();
        for r in regs {
            spans.extend(reg_span(&r.to_string(), rs.get(r)));
        }
        Line::from(spans)
    };

    let mut flag_spans = vec![Span::raw("flags: ")];
    for f in [Flag::ZF, Flag::CF, Flag::PF, Flag::SF, Flag::OF] {
        let (text, style) = match rs.get(f) {
            Value::Int(1) => (format!("{}=1 ", f), Style::default().fg(Color::Green)),
            Value::Int(0) => (format!("{}=0 ", f), Style::default().fg(Color::White)),
            _ => (format!("{}=? ", f), Style::default().fg(Color::DarkGray)),
        };
        flag_spans.push(Span::styled(text, style));
    }

    let mut misc = vec![Span::raw("  pc: ")];
    misc.push(Span::styled(
        rs.get(Reg::PC).to_string(),
        Style::default().fg(Color::Yellow),
    ));
    misc.push(Span::raw("   ra: "));
    misc.push(Span::raw(rs.get(Reg::RA).to_string()));
    misc.push(Span::raw("   st0: "));
    misc.push(Span::raw(rs.get(Reg::ST0).to_string()));

    let mut xmm = Vec::new();
    for r in [FReg::XMM0, FReg::XMM1, FReg::XMM2, FReg::XMM3] {
        xmm.extend(reg_span(&r.to_string(), rs.get(r)));
    }

    let steps_line = Line::from(vec![
        Span::raw("steps: "),
        Span::styled(app.machine.steps.to_string(), Style::default().fg(Color::Cyan)),
        Span::raw("   events: "),
        Span::styled(app.trace.len().to_string(), Style::default().fg(Color::Cyan)),
        Span::raw("   exit: "),
        match app.machine.exit_code() {
            Some(code) => Span::styled(code.to_string(), Style::default().fg(Color::Green)),
            None => Span::styled("-", Style::default().fg(Color::DarkGray)),
        },
    ]);

    let content = vec![
        int_row([IReg::EAX, IReg::EBX, IReg::ECX, IReg::EDX]),
        int_row([IReg::ESI, IReg::EDI, IReg::EBP, IReg::ESP]),
        Line::from(xmm),
        Line::from(flag_spans),
        Line::from(misc),
        steps_line,
    ];

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );

    frame.render_widget(paragraph, area);
}

/// Draw the recorded memory-event trace.
fn draw_trace(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let start = app.trace_scroll.min(app.trace.len().saturating_sub(visible_rows));
    let end = (start + visible_rows).min(app.trace.len());

    let items: Vec<ListItem> = app.trace[start..end]
        .iter()
        .enumerate()
        .map(|(i, ev)| {
            let text = format!("{:4}  {}", start + i, ev);
            ListItem::new(text).style(Style::default().fg(Color::White))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(format!(" Memory events ({}) ", app.trace.len()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );

    frame.render_widget(list, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default().title(" Status ").borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  p: Pause  b: Breakpoint"),
        Line::from("x: Reset  ↑↓: Scroll trace  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default().title(" Help ").borders(Borders::ALL));

    frame.render_widget(help, area);
}
