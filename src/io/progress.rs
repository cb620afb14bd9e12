use std::sync::{Mutex, OnceLock};

#[derive(Clone, Debug, PartialEq)]
pub enum ExportProgress {
    Stage(&'static str),
    Stem {
        done: usize,
        total: usize,
        name: String,
    },
    Finished,
}

static EXPORT_PROGRESS_CB: OnceLock<Mutex<Option<Box<dyn Fn(ExportProgress) + Send + 'static>>>> =
    OnceLock::new();

pub fn set_export_progress_callback(cb: impl Fn(ExportProgress) + Send + 'static) {
    let slot = EXPORT_PROGRESS_CB.get_or_init(|| Mutex::new(None));
    if let Ok(mut g) = slot.lock() {
        *g = Some(Box::new(cb));
    }
}

pub fn emit_export_progress(p: ExportProgress) {
    if let Some(m) = EXPORT_PROGRESS_CB.get() {
        if let Ok(g) = m.lock() {
            if let Some(cb) = &*g {
                cb(p);
            }
        }
    }
}
