use crate::error::{Result, SleepError};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Open a file and map it into memory (read-only)
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    if !path.is_file() {
        return Err(SleepError::FileNotFound(path.display().to_string()));
    }
    let file = File::open(path)?;
    // The dataset trees are treated as read-only while a reader is open
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}
