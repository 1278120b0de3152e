use crate::assets::loader::{LoadToken, SkyOutcome, SkyRequest};
use crate::assets::AssetError;
use crate::scene::EnvironmentHandle;
use crate::ui::skybox_editor::SkyState;
use crate::viewer::{BackendError, SceneBackend};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum SkyError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// What [`SkyBackdrop::begin`] needs before the candidate can be shown.
#[derive(Debug, Clone, PartialEq)]
pub enum SkyChange {
    /// Nothing to load: commit the state now.
    Ready(SkyState),
    /// The image must be fetched on the asset worker first.
    Fetch(SkyRequest),
}

/// Sky images uploaded so far, keyed by content digest so the same picture
/// under another name is not uploaded twice.
///
/// A candidate sky is held as pending until its image arrives; only then is
/// it handed back for the caller to commit.
#[derive(Debug, Default)]
pub struct SkyBackdrop {
    by_digest: HashMap<String, EnvironmentHandle>,
    active: Option<EnvironmentHandle>,
    shown_source: Option<String>,
    pending: Option<(LoadToken, SkyState)>,
    next_token: u64,
}

impl SkyBackdrop {
    pub fn active(&self) -> Option<EnvironmentHandle> {
        self.active
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Start showing `candidate`. Any earlier pending load is superseded.
    pub fn begin(&mut self, candidate: SkyState) -> SkyChange {
        self.next_token += 1;
        self.pending = None;
        match candidate.source.clone() {
            None => {
                self.active = None;
                self.shown_source = None;
                SkyChange::Ready(candidate)
            }
            // Same image, new rotation.
            Some(source) if self.active.is_some() && self.shown_source.as_ref() == Some(&source) => {
                SkyChange::Ready(candidate)
            }
            Some(source) => {
                let token = LoadToken(self.next_token);
                self.pending = Some((token, candidate));
                SkyChange::Fetch(SkyRequest { token, source })
            }
        }
    }

    /// Upload a finished sky image. Returns the state to commit, or `None`
    /// when the outcome was superseded. A failed load keeps the previous sky.
    pub fn complete<B: SceneBackend + ?Sized>(
        &mut self,
        outcome: SkyOutcome,
        backend: &mut B,
    ) -> Result<Option<SkyState>, SkyError> {
        if self.pending.as_ref().map(|(token, _)| *token) != Some(outcome.token) {
            log::debug!("discarding stale sky {} ({:?})", outcome.source, outcome.token);
            return Ok(None);
        }
        let Some((_, state)) = self.pending.take() else {
            return Ok(None);
        };
        // Pending is already cleared, so a failure leaves the previous sky live.
        let image = outcome.image?;
        let handle = match self.by_digest.get(&image.digest) {
            Some(&handle) => {
                log::debug!("sky {} already uploaded", outcome.source);
                handle
            }
            None => {
                let handle = backend.upload_environment(&image.map)?;
                self.by_digest.insert(image.digest, handle);
                handle
            }
        };
        self.active = Some(handle);
        self.shown_source = Some(outcome.source);
        Ok(Some(state))
    }
}

pub fn sky_yaw_radians(state: &SkyState) -> f32 {
    state.yaw_deg().to_radians()
}
