//! Room history log
//!
//! Append-only transcript per room. Rooms append on every forward and read
//! the whole log when a member joins; rooms run concurrently, so
//! implementations serialize their own storage access.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crate::types::RoomName;

/// Storage for rendered room transcripts
///
/// Both methods are called inline from a room's control loop, which handles
/// nothing else until they return. Implementations must be quick; one backed
/// by slow or remote storage should hand the work to its own task.
pub trait History: Send + Sync {
    /// Append one rendered record to the room's log
    fn append(&self, room: &RoomName, record: &[u8]) -> io::Result<()>;

    /// Entire log for the room, or None if nothing was ever written
    fn read_all(&self, room: &RoomName) -> io::Result<Option<Vec<u8>>>;
}

/// One `history_<ROOM>` file per room inside a directory
#[derive(Debug)]
pub struct FileHistory {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    fn path_for(&self, room: &RoomName) -> PathBuf {
        self.dir.join(format!("history_{}", room))
    }
}

impl History for FileHistory {
    fn append(&self, room: &RoomName, record: &[u8]) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(room))?;
        file.write_all(record)
    }

    fn read_all(&self, room: &RoomName) -> io::Result<Option<Vec<u8>>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = match File::open(self.path_for(room)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)?;
        Ok(Some(contents))
    }
}
