//! Terminal rendering.
//!
//! Reads the latest transport snapshot and spectrum frame from the app
//! and draws the whole screen once per tick. Nothing here mutates
//! playback state.

use std::time::Duration;

use ratatui::{
    Frame,
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};

use crate::analyzer::SpectrumFrame;
use crate::app::App;
use crate::config::SPECTRUM_BANDS;
use crate::player::PlaybackState;
use crate::source::AudioBackend;

const BAR_CHARS: &[char] = &[' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const PEAK_CHAR: char = '▬';

pub fn draw<B: AudioBackend>(frame: &mut Frame, app: &App<B>) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(8),
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Length(3),
    ])
    .split(frame.area());

    draw_now_playing(frame, chunks[0], app);
    draw_spectrum(frame, chunks[1], app);
    draw_progress(frame, chunks[2], app);
    draw_volume(frame, chunks[3], app);
    draw_controls(frame, chunks[4]);
}

fn state_badge(state: PlaybackState) -> Span<'static> {
    let bg = match state {
        PlaybackState::Playing => Color::Cyan,
        PlaybackState::Paused => Color::Yellow,
        PlaybackState::Loading => Color::Blue,
        PlaybackState::Stopped => Color::DarkGray,
    };
    Span::styled(format!(" {state} "), Style::default().fg(Color::Black).bg(bg))
}

fn draw_now_playing<B: AudioBackend>(frame: &mut Frame, area: Rect, app: &App<B>) {
    let transport = app.transport();
    let (index, count) = app.playlist_status();

    let mut spans = vec![state_badge(transport.state), Span::raw("  ")];
    if count > 0 {
        spans.push(Span::styled(
            format!("[{index}/{count}]"),
            Style::default().fg(Color::DarkGray),
        ));
        spans.push(Span::raw("  "));
    }
    spans.push(match transport.title {
        Some(title) => Span::styled(title, Style::default().fg(Color::White)),
        None => Span::styled("no track loaded", Style::default().fg(Color::DarkGray)),
    });

    let header = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(" Now Playing "),
    );
    frame.render_widget(header, area);
}

fn draw_spectrum<B: AudioBackend>(frame: &mut Frame, area: Rect, app: &App<B>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(" Spectrum ");

    let (_, count) = app.playlist_status();
    if count == 0 {
        let inner = block.inner(area);
        frame.render_widget(block, area);
        let hint = Paragraph::new(vec![
            Line::raw(""),
            Line::from(Span::styled(
                "no tracks found",
                Style::default().fg(Color::DarkGray),
            )),
            Line::from(Span::styled(
                "drop audio files into the music directory and press r",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .alignment(Alignment::Center);
        frame.render_widget(hint, inner);
        return;
    }

    let widget = SpectrumWidget::new(app.current_frame()).block(block);
    frame.render_widget(widget, area);
}

/// Stationary 64-bar spectrum with falling peak markers: bass on the
/// left, treble on the right.
struct SpectrumWidget<'a> {
    frame: SpectrumFrame,
    block: Option<Block<'a>>,
}

impl<'a> SpectrumWidget<'a> {
    fn new(frame: SpectrumFrame) -> Self {
        SpectrumWidget { frame, block: None }
    }

    fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }
}

impl Widget for SpectrumWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner = if let Some(block) = self.block {
            let inner = block.inner(area);
            block.render(area, buf);
            inner
        } else {
            area
        };

        if inner.width == 0 || inner.height == 0 {
            return;
        }

        let width = inner.width as usize;
        let max_height = inner.height as usize;
        let bar_width = (width / SPECTRUM_BANDS).max(1);
        // Spread the leftover columns over the leftmost bars so the bars
        // fill the whole width.
        let remainder = if width > SPECTRUM_BANDS { width % SPECTRUM_BANDS } else { 0 };

        let mut col = 0usize;
        for band in 0..SPECTRUM_BANDS {
            if col >= width {
                break;
            }
            let this_width = (bar_width + usize::from(band < remainder)).min(width - col);

            let value = self.frame.bars[band].clamp(0.0, 1.0);
            let total_eighths = (value * (max_height * 8) as f32) as usize;
            let full_rows = total_eighths / 8;
            let part = total_eighths % 8;

            let peak = self.frame.peaks[band].clamp(0.0, 1.0);
            let peak_row = (peak * max_height as f32).round() as usize;

            for w in 0..this_width {
                let x = inner.x + (col + w) as u16;
                for row in 0..max_height {
                    let y = inner.y + (max_height - 1 - row) as u16;
                    let ch = if row < full_rows {
                        '█'
                    } else if row == full_rows && part > 0 {
                        BAR_CHARS[part]
                    } else {
                        ' '
                    };

                    // Green at the base, yellow in the middle, red up top.
                    let color = if row < max_height / 3 {
                        Color::Green
                    } else if row < max_height * 2 / 3 {
                        Color::Yellow
                    } else {
                        Color::Red
                    };
                    buf[(x, y)].set_char(ch).set_fg(color);
                }

                // Peak marker floats above the bar once it has cleared it.
                if peak_row > full_rows + 1 && peak_row <= max_height {
                    let y = inner.y + (max_height - peak_row) as u16;
                    buf[(x, y)].set_char(PEAK_CHAR).set_fg(Color::Magenta);
                }
            }
            col += this_width;
        }
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn draw_progress<B: AudioBackend>(frame: &mut Frame, area: Rect, app: &App<B>) {
    let transport = app.transport();
    let label = match transport.duration {
        Some(total) if !total.is_zero() => format!(
            "{} / {}",
            format_duration(transport.position),
            format_duration(total)
        ),
        _ => format_duration(transport.position),
    };
    let ratio = transport
        .duration
        .map(|total| {
            if total.is_zero() {
                0.0
            } else {
                (transport.position.as_secs_f64() / total.as_secs_f64()).min(1.0)
            }
        })
        .unwrap_or(0.0);

    let gauge = RoundedGauge::new(ratio, Color::Cyan).label(label).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(" Progress "),
    );
    frame.render_widget(gauge, area);
}

fn draw_volume<B: AudioBackend>(frame: &mut Frame, area: Rect, app: &App<B>) {
    let volume = app.transport().volume;
    let gauge = RoundedGauge::new(volume as f64, Color::Green)
        .label(format!("{}%", (volume * 100.0).round() as u16))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .title(" Volume "),
        );
    frame.render_widget(gauge, area);
}

fn draw_controls(frame: &mut Frame, area: Rect) {
    let key_style = Style::default().fg(Color::Black).bg(Color::Yellow);
    let help = Paragraph::new(Line::from(vec![
        Span::styled(" Space ", key_style),
        Span::raw(" Play/Pause  "),
        Span::styled(" n/p ", key_style),
        Span::raw(" Next/Prev  "),
        Span::styled(" ←/→ ", key_style),
        Span::raw(" Seek ±10s  "),
        Span::styled(" ↑/↓ ", key_style),
        Span::raw(" Volume  "),
        Span::styled(" r ", key_style),
        Span::raw(" Reload  "),
        Span::styled(" q ", key_style),
        Span::raw(" Quit"),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(" Controls "),
    );
    frame.render_widget(help, area);
}

/// Single-row gauge drawn with heavy line segments and rounded caps. An
/// optional label lands right-aligned in the surrounding block's title
/// row, out of the way of the bar itself.
struct RoundedGauge<'a> {
    ratio: f64,
    filled_color: Color,
    label: Option<String>,
    block: Option<Block<'a>>,
}

impl<'a> RoundedGauge<'a> {
    fn new(ratio: f64, filled_color: Color) -> Self {
        RoundedGauge {
            ratio: ratio.clamp(0.0, 1.0),
            filled_color,
            label: None,
            block: None,
        }
    }

    fn label(mut self, label: String) -> Self {
        self.label = Some(label);
        self
    }

    fn block(mut self, block: Block<'a>) -> Self {
        self.block = Some(block);
        self
    }
}

impl Widget for RoundedGauge<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let inner = if let Some(mut block) = self.block {
            if let Some(label) = self.label {
                block = block.title(Line::from(format!(" {label} ")).alignment(Alignment::Right));
            }
            let inner = block.inner(area);
            block.render(area, buf);
            inner
        } else {
            area
        };

        if inner.width < 2 || inner.height == 0 {
            return;
        }

        let width = inner.width as usize;
        let filled = (self.ratio * width as f64).round() as usize;

        // Filled run and empty run, each with its own end caps.
        let mut done = String::with_capacity(filled * 3);
        for col in 0..filled {
            done.push(if col == 0 {
                '╺'
            } else if col + 1 == filled && filled < width {
                '╸'
            } else {
                '━'
            });
        }
        let mut todo = String::with_capacity((width - filled) * 3);
        for col in filled..width {
            todo.push(if col == 0 {
                '╶'
            } else if col + 1 == width {
                '╴'
            } else {
                '─'
            });
        }

        let line = Line::from(vec![
            Span::styled(done, Style::default().fg(self.filled_color)),
            Span::styled(todo, Style::default().fg(Color::DarkGray)),
        ]);
        buf.set_line(inner.x, inner.y, &line, inner.width);
    }
}
