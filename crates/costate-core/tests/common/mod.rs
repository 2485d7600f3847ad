//! Shared fixtures: a playlist editor domain and a recording observer

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use costate_core::{
    Command, Component, ComponentKey, CostateError, HandlerContext, Kernel, KernelConfig, Result,
    StateObserver, StateRegistry,
};

/// Commands of a small playlist editor used across the integration suites
#[derive(Debug, Clone, PartialEq)]
pub enum PlaylistCommand {
    AddTrack(String),
    Rename(String),
    /// Adds the track, then fails
    AddTrackThenFail(String),
    /// Adds a track and renames the playlist as one undo step
    AddAndRename { track: String, title: String },
    /// Touches `tracks` without changing it
    Touch,
    /// No handler is ever registered for this one
    Shuffle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PlaylistKind {
    AddTrack,
    Rename,
    AddTrackThenFail,
    AddAndRename,
    Touch,
    Shuffle,
}

impl Command for PlaylistCommand {
    type Kind = PlaylistKind;

    fn kind(&self) -> PlaylistKind {
        match self {
            PlaylistCommand::AddTrack(_) => PlaylistKind::AddTrack,
            PlaylistCommand::Rename(_) => PlaylistKind::Rename,
            PlaylistCommand::AddTrackThenFail(_) => PlaylistKind::AddTrackThenFail,
            PlaylistCommand::AddAndRename { .. } => PlaylistKind::AddAndRename,
            PlaylistCommand::Touch => PlaylistKind::Touch,
            PlaylistCommand::Shuffle => PlaylistKind::Shuffle,
        }
    }

    fn undo_label(&self) -> Option<&str> {
        match self {
            PlaylistCommand::AddTrack(_) => Some("Add track"),
            PlaylistCommand::Rename(_) => Some("Rename playlist"),
            PlaylistCommand::AddAndRename { .. } => Some("Add and rename"),
            _ => None,
        }
    }
}

pub const TRACKS: &str = "tracks";
pub const TITLE: &str = "title";

/// Kernel with the playlist components and every handler but `Shuffle`
pub struct Playlist {
    pub kernel: Kernel<PlaylistCommand>,
    pub tracks: Component<Vec<String>>,
    pub title: Component<String>,
}

pub fn playlist(config: KernelConfig) -> Playlist {
    let mut kernel = Kernel::new(config).unwrap();
    let tracks = kernel.register_component(TRACKS, Vec::<String>::new()).unwrap();
    let title = kernel
        .register_component(TITLE, "Untitled".to_string())
        .unwrap();

    kernel
        .register_handler(PlaylistKind::AddTrack, add_track)
        .unwrap();
    kernel.register_handler(PlaylistKind::Rename, rename).unwrap();
    kernel
        .register_handler(PlaylistKind::AddTrackThenFail, add_track)
        .unwrap();
    kernel
        .register_handler(PlaylistKind::AddAndRename, add_and_rename)
        .unwrap();
    kernel.register_handler(PlaylistKind::Touch, touch).unwrap();

    Playlist {
        kernel,
        tracks,
        title,
    }
}

fn add_track(ctx: &HandlerContext<'_>, cmd: &PlaylistCommand) -> Result<()> {
    let (PlaylistCommand::AddTrack(track) | PlaylistCommand::AddTrackThenFail(track)) = cmd else {
        return Ok(());
    };
    let tracks = ctx.component::<Vec<String>>(TRACKS)?;
    {
        let mut undo = ctx.undo.begin_undo_scope()?;
        undo.save_state(&tracks, cmd.undo_label().unwrap_or("Add track"))?;
    }
    tracks.begin_update()?.push(track.clone());

    if matches!(cmd, PlaylistCommand::AddTrackThenFail(_)) {
        return Err(CostateError::handler_failure("AddTrackThenFail", "disk full"));
    }
    Ok(())
}

fn rename(ctx: &HandlerContext<'_>, cmd: &PlaylistCommand) -> Result<()> {
    let PlaylistCommand::Rename(name) = cmd else {
        return Ok(());
    };
    let title = ctx.component::<String>(TITLE)?;
    {
        let mut undo = ctx.undo.begin_undo_scope()?;
        undo.save_state(&title, "Rename playlist")?;
    }
    *title.begin_update()? = name.clone();
    Ok(())
}

fn add_and_rename(ctx: &HandlerContext<'_>, cmd: &PlaylistCommand) -> Result<()> {
    let PlaylistCommand::AddAndRename { track, title: name } = cmd else {
        return Ok(());
    };
    let tracks = ctx.component::<Vec<String>>(TRACKS)?;
    let title = ctx.component::<String>(TITLE)?;
    {
        let mut undo = ctx.undo.begin_undo_scope()?;
        undo.save_state(&tracks, "Add and rename")?;
        undo.save_state(&title, "Add and rename")?;
    }
    tracks.begin_update()?.push(track.clone());
    *title.begin_update()? = name.clone();
    Ok(())
}

fn touch(ctx: &HandlerContext<'_>, _cmd: &PlaylistCommand) -> Result<()> {
    let tracks = ctx.component::<Vec<String>>(TRACKS)?;
    let _scope = tracks.begin_update()?;
    Ok(())
}

/// Shared run log: one entry per `observe` call
pub type RunLog = Rc<RefCell<Vec<String>>>;

pub fn run_log() -> RunLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Observer that only records that it ran
pub struct RecordingObserver {
    name: String,
    observed: Vec<ComponentKey>,
    log: RunLog,
}

impl RecordingObserver {
    pub fn new(name: &str, observed: &[&str], log: &RunLog) -> Self {
        Self {
            name: name.to_string(),
            observed: observed.iter().map(|k| ComponentKey::from(*k)).collect(),
            log: Rc::clone(log),
        }
    }
}

impl StateObserver for RecordingObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn observed_components(&self) -> Vec<ComponentKey> {
        self.observed.clone()
    }

    fn observe(&mut self, _registry: &StateRegistry) -> Result<()> {
        self.log.borrow_mut().push(self.name.clone());
        Ok(())
    }
}

/// How many times `name` appears in the log
pub fn runs_of(log: &RunLog, name: &str) -> usize {
    log.borrow().iter().filter(|entry| *entry == name).count()
}
