// Git auto-save: worker, commit labels, scheduler.

pub mod autosave;
pub mod message;
pub mod worker;
