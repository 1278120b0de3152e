use crate::config::MusicConfig;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Unready,
    Ready,
    Playing,
    Paused,
}

/// Control surface of whatever actually plays the track.
pub trait MediaPlayer {
    fn play(&mut self);
    fn pause(&mut self);
    fn is_ready(&self) -> bool;
    fn state(&self) -> PlaybackState;
}

/// In-process player state machine: tracks readiness, play/pause and the
/// elapsed position of the configured track. Commands issued before the
/// player is ready are ignored.
#[derive(Debug, Clone)]
pub struct EmbeddedPlayer {
    track: MusicConfig,
    state: PlaybackState,
    position: Duration,
}

impl EmbeddedPlayer {
    pub fn new(track: MusicConfig) -> Self {
        Self {
            track,
            state: PlaybackState::Unready,
            position: Duration::ZERO,
        }
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    pub fn mark_ready(&mut self) {
        if self.state == PlaybackState::Unready {
            log::debug!("music player ready: {}", self.track.title);
            self.state = PlaybackState::Ready;
        }
    }

    pub fn advance(&mut self, dt: Duration) {
        // Paused and unready players hold their position.
        if self.state == PlaybackState::Playing {
            self.position += dt;
        }
    }
}

impl MediaPlayer for EmbeddedPlayer {
    fn play(&mut self) {
        if self.is_ready() {
            self.state = PlaybackState::Playing;
        }
    }

    fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    fn is_ready(&self) -> bool {
        self.state != PlaybackState::Unready
    }

    fn state(&self) -> PlaybackState {
        self.state
    }
}

/// What the pane asked for this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MusicPaneResponse {
    pub close: bool,
}

/// Closing the pane always pauses playback.
pub fn close_music<P: MediaPlayer + ?Sized>(player: &mut P) {
    player.pause();
}

pub fn show_music_pane<P: MediaPlayer>(
    ctx: &egui::Context,
    player: &mut P,
    track: &MusicConfig,
    position: Duration,
) -> MusicPaneResponse {
    let mut response = MusicPaneResponse::default();
    let mut open = true;
    egui::Window::new("Music")
        .id(egui::Id::new("music_pane"))
        .open(&mut open)
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-16.0, -16.0))
        .show(ctx, |ui| {
            ui.heading(&track.title);
            if !track.artist.is_empty() {
                ui.label(&track.artist);
            }
            if let Some(url) = &track.url {
                ui.small(url);
            }
            ui.separator();
            ui.horizontal(|ui| {
                let ready = player.is_ready();
                if ui.add_enabled(ready, egui::Button::new("Play")).clicked() {
                    player.play();
                }
                if ui.add_enabled(ready, egui::Button::new("Pause")).clicked() {
                    player.pause();
                }
                let secs = position.as_secs();
                ui.monospace(format!("{:02}:{:02}", secs / 60, secs % 60));
            });
            let status = match player.state() {
                PlaybackState::Unready => "loading player...",
                PlaybackState::Ready => "ready",
                PlaybackState::Playing => "playing",
                PlaybackState::Paused => "paused",
            };
            ui.weak(status);
        });
    if !open {
        response.close = true;
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_before_ready_are_ignored() {
        let mut player = EmbeddedPlayer::new(MusicConfig::default());
        player.play();
        assert_eq!(player.state(), PlaybackState::Unready);
        player.mark_ready();
        player.play();
        assert_eq!(player.state(), PlaybackState::Playing);
    }

    #[test]
    fn close_pauses_playback() {
        let mut player = EmbeddedPlayer::new(MusicConfig::default());
        player.mark_ready();
        player.play();
        player.advance(Duration::from_secs(3));
        close_music(&mut player);
        assert_eq!(player.state(), PlaybackState::Paused);
        player.advance(Duration::from_secs(3));
        assert_eq!(player.position(), Duration::from_secs(3));
    }

    #[test]
    fn pause_when_idle_keeps_state() {
        let mut player = EmbeddedPlayer::new(MusicConfig::default());
        player.mark_ready();
        player.pause();
        assert_eq!(player.state(), PlaybackState::Ready);
    }
}
