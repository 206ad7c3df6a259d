//! Display-side registry of characters for the current session.

use crate::character::{LocalCharacter, RemoteCharacter};
use log::{debug, info};
use shared::PlayerId;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Roster {
    local: Option<LocalCharacter>,
    remotes: HashMap<PlayerId, RemoteCharacter>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local(&self) -> Option<&LocalCharacter> {
        self.local.as_ref()
    }

    pub fn local_mut(&mut self) -> Option<&mut LocalCharacter> {
        self.local.as_mut()
    }

    pub fn local_id(&self) -> Option<&PlayerId> {
        self.local.as_ref().map(|c| c.id())
    }

    pub fn is_local(&self, id: &PlayerId) -> bool {
        self.local_id() == Some(id)
    }

    /// Installs the local character, returning whichever one it replaced.
    pub fn assign_local(&mut self, character: LocalCharacter) -> Option<LocalCharacter> {
        info!("Assigned local player ID: {}", character.id());
        self.remotes.remove(character.id());
        self.local.replace(character)
    }

    /// Adds a peer. Returns false, leaving the roster untouched, for the
    /// local id or an id already present.
    pub fn add_remote(&mut self, character: RemoteCharacter) -> bool {
        let id = character.id().clone();
        if self.is_local(&id) {
            debug!("Ignoring remote entry for local id {}", id);
            return false;
        }
        if self.remotes.contains_key(&id) {
            debug!("Remote {} already known", id);
            return false;
        }
        info!("Player {} joined", id);
        self.remotes.insert(id, character);
        true
    }

    pub fn remote(&self, id: &PlayerId) -> Option<&RemoteCharacter> {
        self.remotes.get(id)
    }

    pub fn remote_mut(&mut self, id: &PlayerId) -> Option<&mut RemoteCharacter> {
        self.remotes.get_mut(id)
    }

    pub fn remotes(&self) -> impl Iterator<Item = &RemoteCharacter> {
        self.remotes.values()
    }

    pub fn remotes_mut(&mut self) -> impl Iterator<Item = &mut RemoteCharacter> {
        self.remotes.values_mut()
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.is_local(id) || self.remotes.contains_key(id)
    }

    /// Removes a character of either kind.
    pub fn remove(&mut self, id: &PlayerId) -> bool {
        if self.is_local(id) {
            self.local = None;
            return true;
        }
        self.remotes.remove(id).is_some()
    }

    /// Drops every remote and returns their ids.
    pub fn clear_remotes(&mut self) -> Vec<PlayerId> {
        self.remotes.drain().map(|(id, _)| id).collect()
    }

    /// Drops everything, local character included.
    pub fn clear_all(&mut self) -> Vec<PlayerId> {
        let mut ids = self.clear_remotes();
        if let Some(local) = self.local.take() {
            ids.push(local.state.id);
        }
        ids
    }
}
