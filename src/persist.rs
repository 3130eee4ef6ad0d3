use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bounded_cache::Dismissal;
use crate::http_cache::app_cache_dir;
use crate::notifications::Notification;
use crate::rate_limit::Clock;
use crate::state::AtlasState;

const SESSION_FILE: &str = "session.json";
const SESSION_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SessionFile {
    version: u32,
    #[serde(default)]
    dismissals: Vec<Dismissal>,
    #[serde(default)]
    notifications: Vec<Notification>,
}

pub fn session_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(SESSION_FILE))
}

/// Restores dismissals and notifications. A missing, unreadable or
/// outdated file leaves the state untouched.
pub fn load_into_state<C: Clock>(state: &mut AtlasState<C>, path: &Path) -> bool {
    let Some(file) = load_session_file(path) else {
        return false;
    };
    if file.version != SESSION_VERSION {
        return false;
    }

    let restored = file.dismissals.len();
    state.restore_session(file.dismissals, file.notifications);
    state.push_log(format!(
        "[INFO] Restored {restored} dismissals and {} notifications",
        state.notifications.len()
    ));
    true
}

pub fn save_from_state<C: Clock>(state: &AtlasState<C>, path: &Path) {
    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }
    let file = SessionFile {
        version: SESSION_VERSION,
        dismissals: state.dismissals.snapshot(),
        notifications: state.notifications.clone(),
    };
    if let Ok(json) = serde_json::to_string(&file) {
        let tmp = path.with_extension("json.tmp");
        if fs::write(&tmp, json).is_ok() {
            let _ = fs::rename(&tmp, path);
        }
    }
}

fn load_session_file(path: &Path) -> Option<SessionFile> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str::<SessionFile>(&raw).ok()
}
