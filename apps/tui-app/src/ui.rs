//! Draws the menu.

use ntfsmount_core::projector::{MenuItem, Projection, StatusIcon};
use ratatui::Frame;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Modifier, Style, Stylize};
use ratatui::text::Line;
use ratatui::widgets::{Block, List, ListItem, ListState, Paragraph};

use crate::app::App;

const IDLE_NOTICE: &str = "ntfsmount: no NTFS volumes attached (q to quit)";
const KEY_HELP: &str = "↑/↓ select · enter mount · r reload · R reset · q quit";

pub fn draw(frame: &mut Frame, app: &App) {
    let Some(projection) = app.projection().filter(|p| p.visible) else {
        frame.render_widget(Paragraph::new(IDLE_NOTICE).dim(), frame.area());
        return;
    };

    let [title, body, footer] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    frame.render_widget(
        Paragraph::new(format!("{} ntfsmount", icon_glyph(projection.icon))).bold(),
        title,
    );

    let width = usize::from(body.width.saturating_sub(2));
    let items: Vec<ListItem> = projection
        .items
        .iter()
        .map(|item| menu_line(item, width))
        .collect();
    let list = List::new(items)
        .block(Block::bordered())
        .highlight_style(Style::new().add_modifier(Modifier::REVERSED));
    let mut state = ListState::default().with_selected(app.selected());
    frame.render_stateful_widget(list, body, &mut state);

    frame.render_widget(Paragraph::new(footer_text(app, projection)).dim(), footer);
}

fn icon_glyph(icon: StatusIcon) -> &'static str {
    match icon {
        StatusIcon::Default => "●",
        StatusIcon::Busy => "◌",
        StatusIcon::Error => "✖",
    }
}

fn menu_line(item: &MenuItem, width: usize) -> ListItem<'static> {
    match item {
        MenuItem::Text(text) => ListItem::new(Line::from(text.clone()).dim()),
        MenuItem::Separator => ListItem::new(Line::from("─".repeat(width)).dim()),
        MenuItem::Volume(volume) => {
            let mark = if volume.checked { "✓" } else { " " };
            let line = Line::from(format!("{} {}", mark, volume.label));
            ListItem::new(if volume.enabled { line } else { line.dim() })
        }
        MenuItem::Reload => ListItem::new(ntfsmount_core::projector::RELOAD_LABEL),
        MenuItem::Quit => ListItem::new(ntfsmount_core::projector::QUIT_LABEL),
    }
}

/// Tooltip of the selected volume row, or the key help.
fn footer_text(app: &App, projection: &Projection) -> String {
    let tooltip = app.selected_item().and_then(|item| match item {
        MenuItem::Volume(volume) => Some(volume.tooltip()),
        _ => None,
    });
    // Disabled rows cannot be selected; show the status of busy rows instead.
    let busy = projection
        .volume_items()
        .find(|volume| !volume.enabled && !volume.checked)
        .map(|volume| volume.tooltip());

    tooltip.or(busy).unwrap_or(KEY_HELP).to_string()
}
