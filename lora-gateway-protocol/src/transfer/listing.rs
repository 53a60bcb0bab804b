//! File listing assembly
//!
//! `GET_FILES` is answered with `[FILES_START]`, zero or more `name,size`
//! lines and `[FILES_END]`. The working list is rebuilt from scratch on
//! every cycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// A file stored on the gateway
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Device-side path, may start with `/`
    pub name: String,
    /// Size in bytes
    pub size: u64,
}

impl FileDescriptor {
    /// Create a descriptor
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }

    /// Name without the leading `/`
    pub fn display_name(&self) -> &str {
        self.name.strip_prefix('/').unwrap_or(&self.name)
    }

    /// Human-readable size
    ///
    /// ```rust
    /// use lora_gateway_protocol::FileDescriptor;
    ///
    /// assert_eq!(FileDescriptor::new("a", 512).formatted_size(), "512 B");
    /// assert_eq!(FileDescriptor::new("a", 1536).formatted_size(), "1.50 KB");
    /// assert_eq!(FileDescriptor::new("a", 3 * 1024 * 1024).formatted_size(), "3.00 MB");
    /// ```
    pub fn formatted_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = 1024 * 1024;
        if self.size < KB {
            format!("{} B", self.size)
        } else if self.size < MB {
            format!("{:.2} KB", self.size as f64 / KB as f64)
        } else {
            format!("{:.2} MB", self.size as f64 / MB as f64)
        }
    }

    /// Lower-cased extension of the final path component, empty when none
    pub fn extension(&self) -> String {
        let file = self.name.rsplit('/').next().unwrap_or(&self.name);
        match file.rfind('.') {
            Some(dot) if dot > 0 => file[dot + 1..].to_lowercase(),
            _ => String::new(),
        }
    }
}

impl fmt::Display for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.formatted_size())
    }
}

/// Working list for one listing cycle
#[derive(Debug, Default)]
pub struct FileListing {
    entries: Vec<FileDescriptor>,
    active: bool,
}

impl FileListing {
    /// Create an idle listing
    pub fn new() -> Self {
        Self::default()
    }

    /// `[FILES_START]`: clear and start collecting
    pub fn begin(&mut self) {
        if self.active {
            warn!(
                "Listing restarted before [FILES_END], dropping {} entries",
                self.entries.len()
            );
        }
        self.entries.clear();
        self.active = true;
    }

    /// Add one parsed entry
    ///
    /// Entries outside a `[FILES_START]` … `[FILES_END]` bracket are ignored.
    pub fn push(&mut self, entry: FileDescriptor) -> bool {
        if !self.active {
            debug!("Ignoring file entry outside a listing: {}", entry.name);
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// `[FILES_END]`: publish the collected list
    pub fn finish(&mut self) -> Vec<FileDescriptor> {
        if !self.active {
            debug!("[FILES_END] without [FILES_START]");
        }
        self.active = false;
        std::mem::take(&mut self.entries)
    }

    /// Whether a listing cycle is open
    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_and_extension() {
        let file = FileDescriptor::new("/logs/Day1.CSV", 10);
        assert_eq!(file.display_name(), "logs/Day1.CSV");
        assert_eq!(file.extension(), "csv");

        assert_eq!(FileDescriptor::new("README", 1).extension(), "");
        assert_eq!(FileDescriptor::new(".hidden", 1).extension(), "");
        assert_eq!(FileDescriptor::new("/v1.2/data", 1).extension(), "");
    }

    #[test]
    fn test_formatted_size_boundaries() {
        assert_eq!(FileDescriptor::new("a", 0).formatted_size(), "0 B");
        assert_eq!(FileDescriptor::new("a", 1023).formatted_size(), "1023 B");
        assert_eq!(FileDescriptor::new("a", 1024).formatted_size(), "1.00 KB");
        assert_eq!(FileDescriptor::new("a", 1024 * 1024).formatted_size(), "1.00 MB");
    }

    #[test]
    fn test_listing_cycle() {
        let mut listing = FileListing::new();
        assert!(!listing.push(FileDescriptor::new("early.txt", 1)));

        listing.begin();
        assert!(listing.push(FileDescriptor::new("notes.txt", 1234)));
        assert!(listing.is_active());

        let files = listing.finish();
        assert_eq!(files, vec![FileDescriptor::new("notes.txt", 1234)]);
        assert!(!listing.is_active());

        // Next cycle starts empty
        listing.begin();
        assert!(listing.finish().is_empty());
    }
}
