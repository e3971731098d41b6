//! Menu state: the latest projection plus the selected row.

use ntfsmount_core::Render;
use ntfsmount_core::projector::{MenuItem, Projection};
use ratatui::crossterm::event::KeyCode;

/// What a key press asks the host to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Mount(String),
    Reload,
    Reset,
    Quit,
}

#[derive(Debug, Default)]
pub struct App {
    projection: Option<Projection>,
    /// Index into `projection.items`; always a selectable row.
    selected: Option<usize>,
}

impl Render for App {
    fn render(&mut self, projection: &Projection) {
        let previous = self.selected_item().cloned();
        self.projection = Some(projection.clone());
        self.reselect(previous.as_ref());
    }
}

impl App {
    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_item(&self) -> Option<&MenuItem> {
        let index = self.selected?;
        self.projection.as_ref()?.items.get(index)
    }

    /// Whether the Reload row is currently offered.
    fn can_reload(&self) -> bool {
        self.projection
            .as_ref()
            .is_some_and(|p| p.items.contains(&MenuItem::Reload))
    }

    pub fn on_key(&mut self, code: KeyCode) -> Option<Action> {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
            KeyCode::Up | KeyCode::Char('k') => {
                self.step(false);
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.step(true);
                None
            }
            KeyCode::Char('r') if self.can_reload() => Some(Action::Reload),
            KeyCode::Char('R') => Some(Action::Reset),
            KeyCode::Enter => self.activate(),
            _ => None,
        }
    }

    fn activate(&self) -> Option<Action> {
        match self.selected_item()? {
            MenuItem::Volume(item) if item.enabled => Some(Action::Mount(item.volume_id.clone())),
            MenuItem::Reload => Some(Action::Reload),
            MenuItem::Quit => Some(Action::Quit),
            _ => None,
        }
    }

    fn selectable(&self) -> Vec<usize> {
        let Some(projection) = &self.projection else {
            return Vec::new();
        };
        projection
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| is_selectable(item))
            .map(|(index, _)| index)
            .collect()
    }

    fn step(&mut self, forward: bool) {
        let rows = self.selectable();
        let position = self
            .selected
            .and_then(|current| rows.iter().position(|&row| row == current));

        self.selected = match (position, forward) {
            (None, _) => rows.first().copied(),
            (Some(i), true) => rows.get(i + 1).or(rows.last()).copied(),
            (Some(i), false) => rows.get(i.saturating_sub(1)).copied(),
        };
    }

    /// Keeps the selection on the same row across projections when it is
    /// still selectable, otherwise falls back to the first selectable row.
    fn reselect(&mut self, previous: Option<&MenuItem>) {
        let rows = self.selectable();
        let Some(projection) = &self.projection else {
            return;
        };

        let same = previous.and_then(|previous| {
            rows.iter()
                .copied()
                .find(|&row| same_row(&projection.items[row], previous))
        });
        self.selected = same.or_else(|| rows.first().copied());
    }
}

fn is_selectable(item: &MenuItem) -> bool {
    match item {
        MenuItem::Volume(volume) => volume.enabled,
        MenuItem::Reload | MenuItem::Quit => true,
        MenuItem::Text(_) | MenuItem::Separator => false,
    }
}

fn same_row(a: &MenuItem, b: &MenuItem) -> bool {
    match (a, b) {
        (MenuItem::Volume(a), MenuItem::Volume(b)) => a.volume_id == b.volume_id,
        _ => a == b,
    }
}
