use crate::config::HotspotAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaneKind {
    Music,
    Shop,
    SkyEditor,
}

impl PaneKind {
    pub const ALL: [PaneKind; 3] = [PaneKind::Music, PaneKind::Shop, PaneKind::SkyEditor];

    fn slot(self) -> usize {
        match self {
            PaneKind::Music => 0,
            PaneKind::Shop => 1,
            PaneKind::SkyEditor => 2,
        }
    }
}

impl From<HotspotAction> for PaneKind {
    fn from(action: HotspotAction) -> Self {
        match action {
            HotspotAction::Music => PaneKind::Music,
            HotspotAction::Shop => PaneKind::Shop,
            HotspotAction::SkyEditor => PaneKind::SkyEditor,
        }
    }
}

/// Open/closed flags of the overlay panes. Panes are independent; any number
/// may be open at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayPanes {
    open: [bool; 3],
}

impl OverlayPanes {
    /// Returns true if the pane was closed before.
    pub fn open(&mut self, kind: PaneKind) -> bool {
        !std::mem::replace(&mut self.open[kind.slot()], true)
    }

    /// Returns true if the pane was open before.
    pub fn close(&mut self, kind: PaneKind) -> bool {
        std::mem::replace(&mut self.open[kind.slot()], false)
    }

    pub fn is_open(&self, kind: PaneKind) -> bool {
        self.open[kind.slot()]
    }

    pub fn any_open(&self) -> bool {
        self.open.iter().any(|open| *open)
    }

    /// Close everything; returns the panes that were open.
    pub fn close_all(&mut self) -> Vec<PaneKind> {
        if !self.any_open() {
            return Vec::new();
        }
        PaneKind::ALL
            .into_iter()
            .filter(|&kind| self.close(kind))
            .collect()
    }
}
